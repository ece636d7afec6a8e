//! Background flattener: thin adapter over the external source-extraction
//! service. The service computes the smooth large-scale background
//! surface; this module only invokes it with the right configuration,
//! validates the returned map, and subtracts it.

use std::path::{Path, PathBuf};
use std::process::Command;

use ndarray::Array2;
use tracing::{debug, info};

use crate::config::BackgroundConfig;
use crate::consts::SUFFIX_BACKGROUND;
use crate::error::{Result, SkyError};
use crate::frame::Frame;
use crate::io::artifact_path;
use crate::io::container::ContainerReader;

/// Expand the command template into an argv.
fn build_argv(
    cfg: &BackgroundConfig,
    image: &Path,
    weight: &Path,
    background: &Path,
) -> Result<Vec<String>> {
    let rendered = cfg
        .command
        .replace("{image}", &image.to_string_lossy())
        .replace("{weight}", &weight.to_string_lossy())
        .replace("{background}", &background.to_string_lossy())
        .replace("{back_size}", &cfg.back_size.to_string())
        .replace("{back_filter}", &cfg.back_filter_size.to_string())
        .replace("{thresh}", &cfg.detect_thresh.to_string());

    let argv: Vec<String> = rendered.split_whitespace().map(str::to_string).collect();
    if argv.is_empty() {
        return Err(SkyError::ExternalService(
            "Background command template is empty".into(),
        ));
    }
    Ok(argv)
}

/// Invoke the external extractor and load the background map it wrote.
///
/// Any failure here -- non-zero exit, missing or malformed output,
/// dimension disagreement -- is `ExternalService`, fatal for the frame.
pub fn compute_background(
    image: &Path,
    weight: &Path,
    want_chips: usize,
    want_dims: (usize, usize),
    cfg: &BackgroundConfig,
) -> Result<(PathBuf, Vec<Array2<f32>>)> {
    let background = artifact_path(image, SUFFIX_BACKGROUND);
    let argv = build_argv(cfg, image, weight, &background)?;
    debug!(command = %argv.join(" "), "Invoking background extractor");

    let status = Command::new(&argv[0])
        .args(&argv[1..])
        .status()
        .map_err(|e| SkyError::ExternalService(format!("Failed to spawn {}: {e}", argv[0])))?;
    if !status.success() {
        return Err(SkyError::ExternalService(format!(
            "{} exited with {status}",
            argv[0]
        )));
    }

    let reader = ContainerReader::open(&background).map_err(|e| {
        SkyError::ExternalService(format!(
            "Background map {} unreadable: {e}",
            background.display()
        ))
    })?;
    if reader.chip_count() != want_chips || reader.dims() != want_dims {
        return Err(SkyError::ExternalService(format!(
            "Background map {} has {} chips of {:?}, expected {} of {:?}",
            background.display(),
            reader.chip_count(),
            reader.dims(),
            want_chips,
            want_dims
        )));
    }

    let planes = (0..want_chips)
        .map(|c| reader.read_plane_f32(c))
        .collect::<Result<Vec<_>>>()
        .map_err(|e| SkyError::ExternalService(format!("Malformed background map: {e}")))?;

    Ok((background, planes))
}

/// Subtract the extractor's background surface from every chip, in place.
/// Returns the background map planes for diagnostics.
pub fn flatten(
    frame: &mut Frame,
    image: &Path,
    weight: &Path,
    cfg: &BackgroundConfig,
) -> Result<Vec<Array2<f32>>> {
    let (path, planes) = compute_background(image, weight, frame.chip_count(), frame.dims(), cfg)?;
    for (chip, bg) in planes.iter().enumerate() {
        let plane = frame.chip_mut(chip)?;
        *plane -= bg;
    }
    frame.meta.push_history(format!(
        "Removed large-scale background (back_size {}, back_filtersize {})",
        cfg.back_size, cfg.back_filter_size
    ));
    info!(background = %path.display(), "Subtracted large-scale background");
    Ok(planes)
}
