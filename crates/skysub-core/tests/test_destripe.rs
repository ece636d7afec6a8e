mod common;

use ndarray::Array2;
use skysub_core::destripe::destripe;
use skysub_core::frame::Mask;

const DIMS: (usize, usize) = (8, 8);

#[test]
fn removes_additive_row_and_column_structure() {
    // Pure stripe pattern: 2 ADU per column index plus 3 ADU per row index.
    let mut plane = Array2::from_shape_fn(DIMS, |(r, c)| 2.0 * c as f32 + 3.0 * r as f32);
    let mask = Mask::all_valid(1, DIMS);

    destripe(&mut plane, mask.chip(0).unwrap());

    for v in plane.iter() {
        assert!(v.abs() < 1e-4, "residual stripe {v}");
    }
}

#[test]
fn flat_plane_is_left_flat() {
    let mut plane = Array2::from_elem(DIMS, 5.0f32);
    let mask = Mask::all_valid(1, DIMS);

    let profile = destripe(&mut plane, mask.chip(0).unwrap());

    // The flat level itself is removed once (it is the column median) and
    // nothing further by the row pass.
    assert!((profile.col_mean - 5.0).abs() < 1e-6);
    assert!(profile.row_mean.abs() < 1e-6);
    for v in plane.iter() {
        assert!(v.abs() < 1e-6);
    }
}

#[test]
fn second_application_changes_nothing_material() {
    // Pure separable stripes destripe to zero, so a second pass is exact.
    let mut plane = Array2::from_shape_fn(DIMS, |(r, c)| 2.0 * c as f32 + 3.0 * r as f32);
    let mask = Mask::all_valid(1, DIMS);
    destripe(&mut plane, mask.chip(0).unwrap());
    let once = plane.clone();
    destripe(&mut plane, mask.chip(0).unwrap());
    for (a, b) in once.iter().zip(plane.iter()) {
        assert!((a - b).abs() < 1e-6, "destripe not idempotent: {a} vs {b}");
    }

    // With pixel noise on top, the second pass moves values by far less
    // than the stripe amplitude it was built to remove.
    let mut plane = Array2::from_shape_fn(DIMS, |(r, c)| {
        2.0 * c as f32 + 3.0 * r as f32 + ((r * 8 + c) % 5) as f32 * 0.1
    });
    destripe(&mut plane, mask.chip(0).unwrap());
    let once = plane.clone();
    destripe(&mut plane, mask.chip(0).unwrap());
    for (a, b) in once.iter().zip(plane.iter()) {
        assert!((a - b).abs() < 0.5, "second pass moved a pixel by {}", a - b);
    }
}

#[test]
fn masked_pixels_do_not_pollute_the_profiles() {
    let mut plane = Array2::<f32>::zeros(DIMS);
    // A masked bright source in column 3 must not drag that column down.
    plane[[4, 3]] = 1000.0;
    let mut mask = Mask::all_valid(1, DIMS);
    mask.chip_mut(0).unwrap()[[4, 3]] = 0;

    destripe(&mut plane, mask.chip(0).unwrap());

    assert!((plane[[0, 3]]).abs() < 1e-6);
    // The masked pixel itself still gets the (zero) profiles subtracted.
    assert!((plane[[4, 3]] - 1000.0).abs() < 1e-6);
}

#[test]
fn fully_masked_column_is_untouched() {
    let mut plane = Array2::from_elem(DIMS, 1.0f32);
    let mut mask = Mask::all_valid(1, DIMS);
    for r in 0..DIMS.0 {
        mask.chip_mut(0).unwrap()[[r, 5]] = 0;
    }
    plane.column_mut(5).fill(42.0);

    destripe(&mut plane, mask.chip(0).unwrap());

    // Column 5 has no valid pixel: its column profile entry is zero, so
    // only the row pass (median 1 per row elsewhere... masked medians are
    // computed from valid pixels only) touches it.
    for r in 0..DIMS.0 {
        assert!((plane[[r, 5]] - 42.0).abs() < 1e-6);
    }
}
