//! Sky cube construction and reduction.
//!
//! Stacks the masked chip planes of the selected neighbors and reduces
//! them to one sky estimate per chip, either by masked median (default)
//! or by per-pixel linear regression against each candidate's sky level.
//! Masked pixels carry NaN through the cube; a pixel with no contributor
//! stays NaN in the estimate and zero in the count map.

use ndarray::Array2;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::{CubeConfig, CubeMode, NormalizePolicy};
use crate::consts::{EPSILON, PARALLEL_PIXEL_THRESHOLD, SUFFIX_MASK};
use crate::error::{Result, SkyError};
use crate::frame::SkyEstimate;
use crate::io::artifact_path;
use crate::io::container::ContainerReader;
use crate::select::PoolEntry;
use crate::stats::{finite_mean_std, masked_median, median_in_place};

/// One candidate's chip plane, masked (invalid pixels NaN), plus its sky
/// level for that chip.
#[derive(Clone, Debug)]
pub struct CandidatePlane {
    pub id: String,
    pub data: Array2<f32>,
    pub level: f32,
}

/// Load one candidate chip plane and apply its companion mask.
///
/// The sky level comes from the candidate's header when present,
/// otherwise from the masked median of the plane itself.
pub fn load_candidate_plane(
    entry: &PoolEntry,
    chip: usize,
    want_dims: (usize, usize),
) -> Result<CandidatePlane> {
    let reader = ContainerReader::open(&entry.path)?;
    let got = reader.dims();
    if got != want_dims {
        return Err(SkyError::DimensionMismatch {
            id: entry.id.clone(),
            got_rows: got.0,
            got_cols: got.1,
            want_rows: want_dims.0,
            want_cols: want_dims.1,
        });
    }
    let mut data = reader.read_plane_f32(chip)?;

    let mask_path = artifact_path(&entry.path, SUFFIX_MASK);
    let mask = ContainerReader::open(&mask_path)?.read_plane_u8(chip)?;
    if mask.dim() != want_dims {
        return Err(SkyError::DimensionMismatch {
            id: entry.id.clone(),
            got_rows: mask.dim().0,
            got_cols: mask.dim().1,
            want_rows: want_dims.0,
            want_cols: want_dims.1,
        });
    }

    let level = match entry.sky_level(chip) {
        Some(lvl) => lvl,
        None => {
            let measured = masked_median(&data.view(), &mask.view()).ok_or_else(|| {
                SkyError::MissingMetadata {
                    id: entry.id.clone(),
                    field: "sky level",
                }
            })?;
            debug!(id = %entry.id, chip, level = measured, "Measured candidate sky level");
            measured
        }
    };

    for (v, m) in data.iter_mut().zip(mask.iter()) {
        if *m == 0 {
            *v = f32::NAN;
        }
    }

    Ok(CandidatePlane {
        id: entry.id.clone(),
        data,
        level,
    })
}

/// Load all selected candidate planes for one chip.
///
/// A candidate whose dimensions disagree with the target is dropped with
/// a warning; if the survivors fall below `min_candidates` the drop
/// escalates to `InsufficientCandidates`.
pub fn load_candidate_planes(
    selected: &[&PoolEntry],
    chip: usize,
    want_dims: (usize, usize),
    min_candidates: usize,
) -> Result<Vec<CandidatePlane>> {
    let mut planes = Vec::with_capacity(selected.len());
    for entry in selected {
        match load_candidate_plane(entry, chip, want_dims) {
            Ok(plane) => planes.push(plane),
            Err(e @ SkyError::DimensionMismatch { .. }) => {
                warn!(id = %entry.id, chip, error = %e, "Dropping candidate from cube");
            }
            Err(e) => return Err(e),
        }
    }
    if planes.len() < min_candidates {
        return Err(SkyError::InsufficientCandidates {
            found: planes.len(),
            required: min_candidates,
        });
    }
    Ok(planes)
}

/// Reduce the candidate planes to a sky estimate for one chip.
pub fn build_sky(
    target_level: f32,
    candidates: &[CandidatePlane],
    cfg: &CubeConfig,
) -> SkyEstimate {
    match cfg.mode {
        CubeMode::Median => median_sky(target_level, candidates, cfg.policy, cfg.with_rms),
        CubeMode::Regression => regression_sky(target_level, candidates, cfg.nsig, cfg.with_rms),
    }
}

/// Normalization coefficients so that `normalized = v * scale + offset`.
fn normalize_coeffs(policy: NormalizePolicy, target_level: f32, level: f32) -> (f32, f32) {
    match policy {
        NormalizePolicy::Subtract => (1.0, -level),
        NormalizePolicy::Rescale => {
            if level.abs() < EPSILON {
                // degenerate level, fall back to plain subtraction
                (1.0, -level)
            } else {
                (target_level / level, -target_level)
            }
        }
    }
}

struct RowReduction {
    sky: Vec<f32>,
    count: Vec<u32>,
    rms: Option<Vec<f32>>,
}

fn reduce_median_row(
    row: usize,
    width: usize,
    candidates: &[CandidatePlane],
    coeffs: &[(f32, f32)],
    with_rms: bool,
) -> RowReduction {
    let n = candidates.len();
    let mut scratch = vec![0.0f32; n];
    let mut sky = vec![f32::NAN; width];
    let mut count = vec![0u32; width];
    let mut rms = with_rms.then(|| vec![f32::NAN; width]);

    for col in 0..width {
        let mut k = 0;
        for (cand, &(scale, offset)) in candidates.iter().zip(coeffs) {
            let v = cand.data[[row, col]];
            if v.is_finite() {
                scratch[k] = v * scale + offset;
                k += 1;
            }
        }
        count[col] = k as u32;
        if k > 0 {
            sky[col] = median_in_place(&mut scratch[..k]);
            if let Some(rms) = rms.as_mut() {
                if let Some((_, std)) = finite_mean_std(&scratch[..k]) {
                    rms[col] = std;
                }
            }
        }
    }

    RowReduction { sky, count, rms }
}

/// Masked median stack: normalize each candidate per the policy, stack,
/// and take the per-pixel median of the non-missing values.
pub fn median_sky(
    target_level: f32,
    candidates: &[CandidatePlane],
    policy: NormalizePolicy,
    with_rms: bool,
) -> SkyEstimate {
    let (h, w) = candidates
        .first()
        .map(|c| c.data.dim())
        .unwrap_or((0, 0));
    let coeffs: Vec<(f32, f32)> = candidates
        .iter()
        .map(|c| normalize_coeffs(policy, target_level, c.level))
        .collect();

    let rows: Vec<RowReduction> = if h * w >= PARALLEL_PIXEL_THRESHOLD && candidates.len() > 1 {
        (0..h)
            .into_par_iter()
            .map(|row| reduce_median_row(row, w, candidates, &coeffs, with_rms))
            .collect()
    } else {
        (0..h)
            .map(|row| reduce_median_row(row, w, candidates, &coeffs, with_rms))
            .collect()
    };

    assemble(h, w, rows, with_rms)
}

fn assemble(h: usize, w: usize, rows: Vec<RowReduction>, with_rms: bool) -> SkyEstimate {
    let mut sky = Array2::<f32>::from_elem((h, w), f32::NAN);
    let mut count = Array2::<u32>::zeros((h, w));
    let mut rms = with_rms.then(|| Array2::<f32>::from_elem((h, w), f32::NAN));

    for (row, reduced) in rows.into_iter().enumerate() {
        for (col, v) in reduced.sky.into_iter().enumerate() {
            sky[[row, col]] = v;
        }
        for (col, c) in reduced.count.into_iter().enumerate() {
            count[[row, col]] = c;
        }
        if let (Some(rms), Some(row_rms)) = (rms.as_mut(), reduced.rms) {
            for (col, v) in row_rms.into_iter().enumerate() {
                rms[[row, col]] = v;
            }
        }
    }

    SkyEstimate { sky, count, rms }
}

/// Centered least-squares fit of `y = a*x + b` over the finite y values.
///
/// Returns None when no value contributes. With a degenerate spread in x
/// the slope is zero and the intercept is the mean of y.
pub fn fit_pixel(xs: &[f32], ys: &[f32]) -> Option<(f32, f32)> {
    let mut sx = 0.0f64;
    let mut sy = 0.0f64;
    let mut n = 0u32;
    for (&x, &y) in xs.iter().zip(ys) {
        if y.is_finite() {
            sx += x as f64;
            sy += y as f64;
            n += 1;
        }
    }
    if n == 0 {
        return None;
    }
    let mean_x = sx / n as f64;
    let mean_y = sy / n as f64;

    let mut num = 0.0f64;
    let mut denom = 0.0f64;
    for (&x, &y) in xs.iter().zip(ys) {
        if y.is_finite() {
            let dx = x as f64 - mean_x;
            num += dx * (y as f64 - mean_y);
            denom += dx * dx;
        }
    }
    if denom < EPSILON as f64 {
        return Some((0.0, mean_y as f32));
    }
    let a = num / denom;
    let b = mean_y - a * mean_x;
    Some((a as f32, b as f32))
}

fn reduce_regression_row(
    row: usize,
    width: usize,
    candidates: &[CandidatePlane],
    levels: &[f32],
    target_level: f32,
    nsig: f32,
    with_rms: bool,
) -> RowReduction {
    let n = candidates.len();
    let mut ys = vec![0.0f32; n];
    let mut residuals = vec![f32::NAN; n];
    let mut sky = vec![f32::NAN; width];
    let mut count = vec![0u32; width];
    let mut rms = with_rms.then(|| vec![f32::NAN; width]);

    for col in 0..width {
        for (y, cand) in ys.iter_mut().zip(candidates) {
            *y = cand.data[[row, col]];
        }

        let Some((a, b)) = fit_pixel(levels, &ys) else {
            continue;
        };

        // One rejection pass: mask residuals beyond nsig sigma, refit.
        residuals.fill(f32::NAN);
        for i in 0..n {
            if ys[i].is_finite() {
                residuals[i] = ys[i] - (a * levels[i] + b);
            }
        }
        let (a, b) = match finite_mean_std(&residuals) {
            Some((_, std)) if std > EPSILON => {
                for i in 0..n {
                    if residuals[i].is_finite() && residuals[i].abs() > nsig * std {
                        ys[i] = f32::NAN;
                    }
                }
                fit_pixel(levels, &ys).unwrap_or((a, b))
            }
            _ => (a, b),
        };

        let mut k = 0u32;
        for &y in &ys {
            if y.is_finite() {
                k += 1;
            }
        }
        count[col] = k;
        if k == 0 {
            continue;
        }

        // Predict at the target's own level, then remove that level so the
        // estimate is a zero-centered pattern like the median-mode output.
        sky[col] = a * target_level + b - target_level;

        if let Some(rms) = rms.as_mut() {
            for i in 0..n {
                residuals[i] = if ys[i].is_finite() {
                    ys[i] - (a * levels[i] + b)
                } else {
                    f32::NAN
                };
            }
            if let Some((_, std)) = finite_mean_std(&residuals) {
                rms[col] = std;
            }
        }
    }

    RowReduction { sky, count, rms }
}

/// Per-pixel linear regression of observed values against candidate sky
/// levels, with one sigma-clipped rejection pass, predicted at the
/// target's own level.
pub fn regression_sky(
    target_level: f32,
    candidates: &[CandidatePlane],
    nsig: f32,
    with_rms: bool,
) -> SkyEstimate {
    let (h, w) = candidates
        .first()
        .map(|c| c.data.dim())
        .unwrap_or((0, 0));
    let levels: Vec<f32> = candidates.iter().map(|c| c.level).collect();

    let rows: Vec<RowReduction> = if h * w >= PARALLEL_PIXEL_THRESHOLD && candidates.len() > 1 {
        (0..h)
            .into_par_iter()
            .map(|row| {
                reduce_regression_row(row, w, candidates, &levels, target_level, nsig, with_rms)
            })
            .collect()
    } else {
        (0..h)
            .map(|row| {
                reduce_regression_row(row, w, candidates, &levels, target_level, nsig, with_rms)
            })
            .collect()
    };

    assemble(h, w, rows, with_rms)
}
