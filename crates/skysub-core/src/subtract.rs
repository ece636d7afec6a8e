//! Sky subtraction and provenance.
//!
//! Applies a modeled sky pattern to the target frame, either against the
//! target's own median level (simple policy) or by swapping in an
//! instrument-level reference sky (reference-aware policy), then clips
//! extreme negative residuals at masked boundaries.

use ndarray::Array2;
use tracing::{debug, info};

use crate::config::SubtractConfig;
use crate::error::{Result, SkyError};
use crate::frame::{Frame, FrameMeta, Mask};
use crate::stats::{masked_mean_std, masked_median};

/// History prefix recording the candidates a sky was built from.
const PROVENANCE_PREFIX: &str = "SKYIM";

/// Sky level for one chip: the header value when present, otherwise the
/// masked median of the plane.
pub fn chip_level(plane: &Array2<f32>, mask: &Array2<u8>, meta: &FrameMeta, chip: usize) -> Result<f32> {
    if let Some(lvl) = meta.sky_level(chip) {
        return Ok(lvl);
    }
    masked_median(&plane.view(), &mask.view()).ok_or_else(|| SkyError::MissingMetadata {
        id: meta.exposure_id.clone(),
        field: "sky level",
    })
}

/// Subtract the modeled sky from every chip of the target, in place.
///
/// Simple policy: `corrected = target - median(target) - sky`.
/// Reference-aware (when `reference` is given): remove the target's own
/// level, reintroduce the reference sky's shape and level, then remove
/// the modeled local pattern:
/// `corrected = (target - target_level) + (reference - ref_level) - sky`.
///
/// Missing sky values (NaN) propagate into the output; they are never
/// treated as zero.
pub fn subtract_sky(
    target: &mut Frame,
    mask: &Mask,
    sky_planes: &[Array2<f32>],
    reference: Option<&Frame>,
    cfg: &SubtractConfig,
) -> Result<()> {
    if sky_planes.len() != target.chip_count() {
        return Err(SkyError::InvalidContainer(format!(
            "Sky has {} planes, target has {}",
            sky_planes.len(),
            target.chip_count()
        )));
    }

    let meta = target.meta.clone();
    for chip in 0..target.chip_count() {
        let mask_plane = mask.chip(chip)?;
        let plane = target.chip_mut(chip)?;
        let sky = &sky_planes[chip];
        if sky.dim() != plane.dim() {
            return Err(SkyError::DimensionMismatch {
                id: meta.exposure_id.clone(),
                got_rows: sky.dim().0,
                got_cols: sky.dim().1,
                want_rows: plane.dim().0,
                want_cols: plane.dim().1,
            });
        }

        match reference {
            None => {
                let level = masked_median(&plane.view(), &mask_plane.view())
                    .ok_or_else(|| SkyError::MissingMetadata {
                        id: meta.exposure_id.clone(),
                        field: "sky level",
                    })?;
                for (v, s) in plane.iter_mut().zip(sky.iter()) {
                    *v = *v - level - *s;
                }
            }
            Some(reference) => {
                let target_level = chip_level(plane, mask_plane, &meta, chip)?;
                let ref_plane = reference.chip(chip)?;
                if ref_plane.dim() != plane.dim() {
                    return Err(SkyError::DimensionMismatch {
                        id: reference.meta.exposure_id.clone(),
                        got_rows: ref_plane.dim().0,
                        got_cols: ref_plane.dim().1,
                        want_rows: plane.dim().0,
                        want_cols: plane.dim().1,
                    });
                }
                let ref_level = chip_level(ref_plane, mask_plane, &reference.meta, chip)?;
                for ((v, r), s) in plane.iter_mut().zip(ref_plane.iter()).zip(sky.iter()) {
                    *v = (*v - target_level) + (*r - ref_level) - *s;
                }
            }
        }

        clip_negatives(plane, mask_plane, cfg.clip_sigma, chip);
    }

    Ok(())
}

/// Clip residuals below `-k * sigma` of the chip's residual distribution
/// to zero. Suppresses subtraction artifacts at masked boundaries; the
/// correction is logged, never silent.
fn clip_negatives(plane: &mut Array2<f32>, mask: &Array2<u8>, k: f32, chip: usize) {
    let Some((mean, std)) = masked_mean_std(&plane.view(), &mask.view()) else {
        return;
    };
    let floor = -k * std;
    let mut clipped = 0usize;
    for v in plane.iter_mut() {
        if v.is_finite() && *v < floor {
            *v = 0.0;
            clipped += 1;
        }
    }
    debug!(chip, residual_mean = mean, residual_std = std, "Residual background after subtraction");
    if clipped > 0 {
        info!(chip, clipped, floor, "Clipped extreme negative residuals to zero");
    }
}

/// Record the identifiers of the candidates used to build a sky, for
/// auditability and re-run detection.
pub fn record_candidates(meta: &mut FrameMeta, ids: &[String]) {
    for (i, id) in ids.iter().enumerate() {
        meta.push_history(format!("{PROVENANCE_PREFIX}{i} {id}"));
    }
}

/// Candidate identifiers previously recorded in the history.
pub fn recorded_candidates(meta: &FrameMeta) -> Vec<String> {
    let mut out = Vec::new();
    for entry in &meta.history {
        if let Some(rest) = entry.strip_prefix(PROVENANCE_PREFIX) {
            if let Some((idx, id)) = rest.split_once(' ') {
                if idx.chars().all(|c| c.is_ascii_digit()) {
                    out.push(id.to_string());
                }
            }
        }
    }
    out
}

/// True when a sky was already built from exactly this candidate list, so
/// a re-run with identical inputs is detectable.
pub fn same_candidates(meta: &FrameMeta, ids: &[String]) -> bool {
    let recorded = recorded_candidates(meta);
    if recorded.len() != ids.len() {
        return false;
    }
    ids.iter().all(|id| recorded.contains(id))
}
