use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Full pipeline configuration. Immutable once built; every component
/// takes the section it needs by reference.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SkyConfig {
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub cube: CubeConfig,
    #[serde(default)]
    pub subtract: SubtractConfig,
    #[serde(default)]
    pub background: BackgroundConfig,
    #[serde(default)]
    pub destripe: DestripeConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Maximum |MJD difference| between target and candidate, in minutes.
    pub max_time_delta_min: f64,
    /// Maximum angular separation between pointings, in arcminutes.
    pub max_angular_distance_arcmin: f64,
    /// Minimum usable candidates; below this the frame is skipped.
    pub min_candidates: usize,
    /// Selection is truncated to this many nearest-in-time candidates.
    pub max_candidates: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            max_time_delta_min: 30.0,
            max_angular_distance_arcmin: 10.0,
            min_candidates: 4,
            max_candidates: 20,
        }
    }
}

/// How each candidate plane is normalized before stacking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizePolicy {
    /// candidate - candidate_level: removes the candidate's own sky level.
    Subtract,
    /// candidate * (target_level / candidate_level) - target_level:
    /// rescales the sky amplitude to the target's brightness first.
    Rescale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CubeMode {
    /// Masked median across the candidate axis.
    Median,
    /// Per-pixel linear regression against candidate sky levels.
    Regression,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CubeConfig {
    pub mode: CubeMode,
    pub policy: NormalizePolicy,
    /// Rejection threshold (in sigma) for the regression refit pass.
    pub nsig: f32,
    /// Also produce the per-pixel standard deviation map.
    pub with_rms: bool,
}

impl Default for CubeConfig {
    fn default() -> Self {
        Self {
            mode: CubeMode::Median,
            policy: NormalizePolicy::Subtract,
            nsig: 2.0,
            with_rms: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtractConfig {
    /// Residuals below -clip_sigma * local sigma are clipped to zero.
    pub clip_sigma: f32,
    /// Optional instrument-level reference sky (shape + known level) to
    /// reintroduce before removing the locally modeled pattern.
    pub reference: Option<PathBuf>,
}

impl Default for SubtractConfig {
    fn default() -> Self {
        Self {
            clip_sigma: 5.0,
            reference: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    pub enabled: bool,
    /// Command template for the external source extractor. Placeholders:
    /// {image} {weight} {background} {back_size} {back_filter} {thresh}.
    pub command: String,
    /// Smoothing mesh size, in pixels.
    pub back_size: u32,
    /// Smoothing filter size, in meshes.
    pub back_filter_size: u32,
    /// Detection/analysis threshold passed to the extractor.
    pub detect_thresh: f32,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "sex {image} -c bgsub.conf -CATALOG_TYPE NONE \
                      -CHECKIMAGE_TYPE -BACKGROUND -CHECKIMAGE_NAME {background} \
                      -BACK_SIZE {back_size} -BACK_FILTERSIZE {back_filter} \
                      -WEIGHT_IMAGE {weight} -DETECT_THRESH {thresh} \
                      -VERBOSE_TYPE QUIET"
                .into(),
            back_size: 256,
            back_filter_size: 3,
            detect_thresh: 2.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DestripeConfig {
    pub enabled: bool,
}

impl Default for DestripeConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}
