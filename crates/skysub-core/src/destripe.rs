//! Destriping: removal of additive row/column detector structure via two
//! sequential masked 1-D median projections. Columns first, then rows;
//! the order is a fixed convention (sky structure is more coherent along
//! one axis for a given optical design) and the passes do not commute.

use ndarray::Array2;

use crate::stats::median_in_place;

/// Mean of the subtracted column and row profiles, for diagnostics.
#[derive(Clone, Copy, Debug, Default)]
pub struct StripeProfile {
    pub col_mean: f32,
    pub row_mean: f32,
}

/// Masked median of each column (reduction along rows). Columns with no
/// valid pixel get a zero entry, leaving them untouched.
fn column_medians(plane: &Array2<f32>, mask: &Array2<u8>) -> Vec<f32> {
    let (h, w) = plane.dim();
    let mut medians = vec![0.0f32; w];
    let mut scratch = Vec::with_capacity(h);
    for col in 0..w {
        scratch.clear();
        for row in 0..h {
            let v = plane[[row, col]];
            if mask[[row, col]] != 0 && v.is_finite() {
                scratch.push(v);
            }
        }
        if !scratch.is_empty() {
            medians[col] = median_in_place(&mut scratch);
        }
    }
    medians
}

fn row_medians(plane: &Array2<f32>, mask: &Array2<u8>) -> Vec<f32> {
    let (h, w) = plane.dim();
    let mut medians = vec![0.0f32; h];
    let mut scratch = Vec::with_capacity(w);
    for row in 0..h {
        scratch.clear();
        for col in 0..w {
            let v = plane[[row, col]];
            if mask[[row, col]] != 0 && v.is_finite() {
                scratch.push(v);
            }
        }
        if !scratch.is_empty() {
            medians[row] = median_in_place(&mut scratch);
        }
    }
    medians
}

/// Destripe one chip plane in place.
///
/// Pass 1 subtracts the masked median of each column, broadcast across
/// all rows. Pass 2 recomputes the masked view on the updated plane and
/// subtracts the masked median of each row, broadcast across all columns.
/// Applying the procedure twice leaves the plane materially unchanged.
pub fn destripe(plane: &mut Array2<f32>, mask: &Array2<u8>) -> StripeProfile {
    let (h, w) = plane.dim();

    let col_profile = column_medians(plane, mask);
    for row in 0..h {
        for col in 0..w {
            plane[[row, col]] -= col_profile[col];
        }
    }

    let row_profile = row_medians(plane, mask);
    for row in 0..h {
        for col in 0..w {
            plane[[row, col]] -= row_profile[row];
        }
    }

    let mean = |v: &[f32]| {
        if v.is_empty() {
            0.0
        } else {
            v.iter().sum::<f32>() / v.len() as f32
        }
    };
    StripeProfile {
        col_mean: mean(&col_profile),
        row_mean: mean(&row_profile),
    }
}
