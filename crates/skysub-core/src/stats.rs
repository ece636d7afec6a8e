use ndarray::ArrayView2;

/// Median of a scratch slice, partitioning in place.
///
/// Uses `select_nth_unstable` for O(n) median without a full sort.
pub fn median_in_place(values: &mut [f32]) -> f32 {
    let n = values.len();
    if n == 0 {
        return f32::NAN;
    }
    if n == 1 {
        values[0]
    } else if n % 2 == 1 {
        let mid = n / 2;
        *values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b)).1
    } else {
        let mid = n / 2;
        values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
        values[..mid].select_nth_unstable_by(mid - 1, |a, b| a.total_cmp(b));
        (values[mid - 1] + values[mid]) / 2.0
    }
}

/// Median over valid (mask != 0), finite pixels. None if no pixel qualifies.
pub fn masked_median(plane: &ArrayView2<f32>, mask: &ArrayView2<u8>) -> Option<f32> {
    let mut values: Vec<f32> = plane
        .iter()
        .zip(mask.iter())
        .filter(|(v, m)| **m != 0 && v.is_finite())
        .map(|(v, _)| *v)
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(median_in_place(&mut values))
    }
}

/// Mean and standard deviation over valid, finite pixels.
pub fn masked_mean_std(plane: &ArrayView2<f32>, mask: &ArrayView2<u8>) -> Option<(f32, f32)> {
    let mut sum = 0.0f64;
    let mut count = 0u64;
    for (v, m) in plane.iter().zip(mask.iter()) {
        if *m != 0 && v.is_finite() {
            sum += *v as f64;
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    let mean = sum / count as f64;

    let mut var_sum = 0.0f64;
    for (v, m) in plane.iter().zip(mask.iter()) {
        if *m != 0 && v.is_finite() {
            let d = *v as f64 - mean;
            var_sum += d * d;
        }
    }
    Some((mean as f32, (var_sum / count as f64).sqrt() as f32))
}

/// Mean and standard deviation of the non-NaN entries of a pixel stack.
pub fn finite_mean_std(values: &[f32]) -> Option<(f32, f32)> {
    let mut sum = 0.0f32;
    let mut count = 0u32;
    for &v in values {
        if v.is_finite() {
            sum += v;
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    let mean = sum / count as f32;
    let mut var_sum = 0.0f32;
    for &v in values {
        if v.is_finite() {
            let d = v - mean;
            var_sum += d * d;
        }
    }
    Some((mean, (var_sum / count as f32).sqrt()))
}
