use ndarray::Array2;

use crate::error::{Result, SkyError};

/// A multi-chip exposure: K detector planes plus frame-global metadata.
/// Pixel values are f32 ADU; NaN marks a pixel with no usable value.
#[derive(Clone, Debug)]
pub struct Frame {
    /// One plane per chip, all with identical dimensions, row-major.
    pub planes: Vec<Array2<f32>>,
    pub meta: FrameMeta,
}

impl Frame {
    pub fn new(planes: Vec<Array2<f32>>, meta: FrameMeta) -> Self {
        Self { planes, meta }
    }

    pub fn chip_count(&self) -> usize {
        self.planes.len()
    }

    /// (rows, cols) of the chip planes.
    pub fn dims(&self) -> (usize, usize) {
        self.planes.first().map(|p| p.dim()).unwrap_or((0, 0))
    }

    pub fn chip(&self, index: usize) -> Result<&Array2<f32>> {
        self.planes.get(index).ok_or(SkyError::ChipIndexOutOfRange {
            index,
            total: self.planes.len(),
        })
    }

    pub fn chip_mut(&mut self, index: usize) -> Result<&mut Array2<f32>> {
        let total = self.planes.len();
        self.planes
            .get_mut(index)
            .ok_or(SkyError::ChipIndexOutOfRange { index, total })
    }
}

/// Frame-global metadata record. Position and timestamp may be absent in
/// raw headers; callers decide whether that is fatal for an operation.
#[derive(Clone, Debug, Default)]
pub struct FrameMeta {
    /// Exposure identifier, unique within a run.
    pub exposure_id: String,
    /// Filter band name.
    pub filter: String,
    /// Right ascension in degrees.
    pub ra_deg: Option<f64>,
    /// Declination in degrees.
    pub dec_deg: Option<f64>,
    /// Observation timestamp, modified Julian date.
    pub mjd: Option<f64>,
    /// Sky brightness level: one entry per chip, or a single global value.
    pub sky_levels: Vec<f32>,
    /// Append-only free-text history entries.
    pub history: Vec<String>,
}

impl FrameMeta {
    /// Ordered lookup of the sky level for a chip: per-chip value first,
    /// then a single global value, otherwise None (caller picks fallback).
    pub fn sky_level(&self, chip: usize) -> Option<f32> {
        match self.sky_levels.len() {
            0 => None,
            1 => Some(self.sky_levels[0]),
            n if chip < n => Some(self.sky_levels[chip]),
            _ => None,
        }
    }

    pub fn push_history(&mut self, entry: impl Into<String>) {
        self.history.push(entry.into());
    }
}

/// Per-chip validity planes paired 1:1 with a Frame. 1 = valid pixel,
/// 0 = invalid. Read-only during cube building.
#[derive(Clone, Debug)]
pub struct Mask {
    pub planes: Vec<Array2<u8>>,
}

impl Mask {
    pub fn new(planes: Vec<Array2<u8>>) -> Self {
        Self { planes }
    }

    /// An all-valid mask matching the given frame geometry.
    pub fn all_valid(chip_count: usize, dims: (usize, usize)) -> Self {
        Self {
            planes: (0..chip_count).map(|_| Array2::ones(dims)).collect(),
        }
    }

    pub fn chip(&self, index: usize) -> Result<&Array2<u8>> {
        self.planes.get(index).ok_or(SkyError::ChipIndexOutOfRange {
            index,
            total: self.planes.len(),
        })
    }

    pub fn chip_mut(&mut self, index: usize) -> Result<&mut Array2<u8>> {
        let total = self.planes.len();
        self.planes
            .get_mut(index)
            .ok_or(SkyError::ChipIndexOutOfRange { index, total })
    }
}

/// The per-chip product of the sky cube builder.
#[derive(Clone, Debug)]
pub struct SkyEstimate {
    /// Modeled sky pattern; NaN where no candidate contributed.
    pub sky: Array2<f32>,
    /// Number of candidates contributing to each pixel.
    pub count: Array2<u32>,
    /// Standard deviation across contributing candidates, when requested.
    pub rms: Option<Array2<f32>>,
}
