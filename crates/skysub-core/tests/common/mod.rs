#![allow(dead_code)]

use std::path::{Path, PathBuf};

use ndarray::Array2;
use skysub_core::consts::SUFFIX_MASK;
use skysub_core::frame::{Frame, FrameMeta, Mask};
use skysub_core::io::artifact_path;
use skysub_core::io::container::{write_frame, write_mask};
use skysub_core::select::PoolEntry;

pub fn meta(id: &str, filter: &str, ra: f64, dec: f64, mjd: f64, levels: &[f32]) -> FrameMeta {
    FrameMeta {
        exposure_id: id.to_string(),
        filter: filter.to_string(),
        ra_deg: Some(ra),
        dec_deg: Some(dec),
        mjd: Some(mjd),
        sky_levels: levels.to_vec(),
        history: Vec::new(),
    }
}

pub fn entry(id: &str, filter: &str, ra: f64, dec: f64, mjd: f64) -> PoolEntry {
    PoolEntry {
        id: id.to_string(),
        path: PathBuf::from(format!("{id}.mcf")),
        filter: filter.to_string(),
        ra_deg: Some(ra),
        dec_deg: Some(dec),
        mjd: Some(mjd),
        sky_levels: vec![],
    }
}

/// Frame with every chip plane uniform at `value`.
pub fn uniform_frame(chips: usize, dims: (usize, usize), value: f32, meta: FrameMeta) -> Frame {
    let planes = (0..chips).map(|_| Array2::from_elem(dims, value)).collect();
    Frame::new(planes, meta)
}

/// Write a frame and an all-valid companion mask; returns the frame path.
pub fn write_synthetic(dir: &Path, frame: &Frame) -> PathBuf {
    let path = dir.join(format!("{}.mcf", frame.meta.exposure_id));
    write_frame(&path, frame).unwrap();
    let mask = Mask::all_valid(frame.chip_count(), frame.dims());
    write_mask(&artifact_path(&path, SUFFIX_MASK), &mask, &frame.meta).unwrap();
    path
}

/// Write a frame with an explicit mask.
pub fn write_synthetic_masked(dir: &Path, frame: &Frame, mask: &Mask) -> PathBuf {
    let path = dir.join(format!("{}.mcf", frame.meta.exposure_id));
    write_frame(&path, frame).unwrap();
    write_mask(&artifact_path(&path, SUFFIX_MASK), mask, &frame.meta).unwrap();
    path
}
