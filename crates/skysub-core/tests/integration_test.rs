mod common;

use std::path::{Path, PathBuf};

use common::{meta, uniform_frame, write_synthetic, write_synthetic_masked};
use ndarray::Array2;
use skysub_core::config::SkyConfig;
use skysub_core::consts::{SUFFIX_CLEAN, SUFFIX_COUNT, SUFFIX_SKY, SUFFIX_SUB};
use skysub_core::frame::{Frame, Mask};
use skysub_core::io::artifact_path;
use skysub_core::io::candidates::build_pool;
use skysub_core::io::container::{write_f32_planes, ContainerReader};
use skysub_core::pipeline::{make_sky, process_frame, run_batch, BatchSummary, Outcome};
use skysub_core::select::PoolEntry;
use tempfile::tempdir;

const DIMS: (usize, usize) = (8, 8);
const MINUTE: f64 = 1.0 / 24.0 / 60.0;

/// Checkerboard sky pattern with a zero median, shared by every exposure.
fn pattern(r: usize, c: usize) -> f32 {
    ((r + c) % 2) as f32 * 2.0 - 1.0
}

fn patterned_frame(chips: usize, id: &str, level: f32, mjd: f64) -> Frame {
    let m = meta(id, "Ks", 150.0, 2.2, mjd, &vec![level; chips]);
    let mut frame = uniform_frame(chips, DIMS, 0.0, m);
    for plane in frame.planes.iter_mut() {
        for ((r, c), v) in plane.indexed_iter_mut() {
            *v = level + pattern(r, c);
        }
    }
    frame
}

/// Five candidates around a target, all sharing the checkerboard pattern
/// on top of their own sky level. Returns (target path, pool).
fn night(dir: &Path, chips: usize) -> (PathBuf, Vec<PoolEntry>) {
    let levels = [100.0f32, 102.0, 98.0, 250.0, 101.0];
    let mut paths = Vec::new();
    for (i, &level) in levels.iter().enumerate() {
        let frame = patterned_frame(chips, &format!("cand{i}"), level, 60000.0 + (i + 1) as f64 * MINUTE);
        paths.push(write_synthetic(dir, &frame));
    }
    let target = patterned_frame(chips, "target", 105.0, 60000.0);
    let target_path = write_synthetic(dir, &target);
    paths.push(target_path.clone());

    let pool = build_pool(&paths).unwrap();
    (target_path, pool)
}

fn quiet_config() -> SkyConfig {
    let mut cfg = SkyConfig::default();
    cfg.background.enabled = false;
    cfg
}

#[test]
fn full_pipeline_produces_a_flat_cleaned_frame() {
    let dir = tempdir().unwrap();
    let (target, pool) = night(dir.path(), 2);
    let cfg = quiet_config();

    let clean = process_frame(&target, &pool, &cfg).unwrap();
    assert_eq!(clean, artifact_path(&target, SUFFIX_CLEAN));

    // Sky and count artifacts land next to the target.
    let sky = ContainerReader::open(&artifact_path(&target, SUFFIX_SKY))
        .unwrap()
        .read_frame()
        .unwrap();
    assert_eq!(sky.chip_count(), 2);
    // The modeled sky is the shared checkerboard pattern.
    assert!((sky.planes[0][[0, 0]] - pattern(0, 0)).abs() < 1e-4);
    assert!((sky.planes[0][[0, 1]] - pattern(0, 1)).abs() < 1e-4);
    // Provenance names all five candidates.
    assert_eq!(
        sky.meta.history.iter().filter(|h| h.starts_with("SKYIM")).count(),
        5
    );

    let cnt_reader = ContainerReader::open(&artifact_path(&target, SUFFIX_COUNT)).unwrap();
    let counts = cnt_reader.read_plane_u32(0).unwrap();
    assert!(counts.iter().all(|&c| c == 5));

    // Level and pattern both removed: the cleaned frame is flat zero.
    let cleaned = ContainerReader::open(&clean).unwrap().read_frame().unwrap();
    for plane in &cleaned.planes {
        for v in plane.iter() {
            assert!(v.abs() < 1e-3, "residual sky {v}");
        }
    }
    assert!(!cleaned.meta.history.is_empty());
}

#[test]
fn masked_candidate_pixels_lower_the_count() {
    let dir = tempdir().unwrap();
    let levels = [100.0f32, 102.0, 98.0, 101.0];
    let mut paths = Vec::new();
    for (i, &level) in levels.iter().enumerate() {
        let frame = patterned_frame(1, &format!("cand{i}"), level, 60000.0 + (i + 1) as f64 * MINUTE);
        if i == 0 {
            let mut mask = Mask::all_valid(1, DIMS);
            mask.planes[0][[2, 2]] = 0;
            paths.push(write_synthetic_masked(dir.path(), &frame, &mask));
        } else {
            paths.push(write_synthetic(dir.path(), &frame));
        }
    }
    let target = patterned_frame(1, "target", 105.0, 60000.0);
    let target_path = write_synthetic(dir.path(), &target);
    paths.push(target_path.clone());
    let pool = build_pool(&paths).unwrap();

    let products = make_sky(&target_path, &pool, &quiet_config()).unwrap();
    assert_eq!(products.counts[0][[2, 2]], 3);
    assert_eq!(products.counts[0][[0, 0]], 4);
}

#[test]
fn prior_target_history_is_not_duplicated() {
    let dir = tempdir().unwrap();
    let levels = [100.0f32, 102.0, 98.0, 101.0];
    let mut paths = Vec::new();
    for (i, &level) in levels.iter().enumerate() {
        let frame = patterned_frame(1, &format!("cand{i}"), level, 60000.0 + (i + 1) as f64 * MINUTE);
        paths.push(write_synthetic(dir.path(), &frame));
    }
    let mut target = patterned_frame(1, "target", 105.0, 60000.0);
    target.meta.push_history("Dark corrected");
    let target_path = write_synthetic(dir.path(), &target);
    paths.push(target_path.clone());
    let pool = build_pool(&paths).unwrap();

    let clean = process_frame(&target_path, &pool, &quiet_config()).unwrap();

    // The sky artifact logs only its own construction.
    let sky = ContainerReader::open(&artifact_path(&target_path, SUFFIX_SKY))
        .unwrap()
        .read_frame()
        .unwrap();
    assert!(sky.meta.history.iter().all(|h| h != "Dark corrected"));
    assert!(sky.meta.history.iter().any(|h| h.starts_with("SKYIM")));

    // The cleaned frame keeps each earlier entry exactly once, with the
    // sky provenance appended after it.
    let cleaned = ContainerReader::open(&clean).unwrap().read_frame().unwrap();
    assert_eq!(
        cleaned.meta.history.iter().filter(|h| *h == "Dark corrected").count(),
        1
    );
    assert_eq!(
        cleaned.meta.history.iter().filter(|h| h.starts_with("SKYIM")).count(),
        4
    );
}

#[test]
fn rebuild_with_identical_candidates_is_skipped() {
    let dir = tempdir().unwrap();
    let (target, pool) = night(dir.path(), 1);
    let cfg = quiet_config();

    make_sky(&target, &pool, &cfg).unwrap();

    // Tamper with the stored sky, keeping its provenance intact. A second
    // build must detect the identical candidate list and reuse the file.
    let sky_path = artifact_path(&target, SUFFIX_SKY);
    let stored = ContainerReader::open(&sky_path).unwrap().read_frame().unwrap();
    let mut planes = stored.planes.clone();
    planes[0][[0, 0]] = 777.0;
    write_f32_planes(&sky_path, &planes, &stored.meta).unwrap();

    let products = make_sky(&target, &pool, &cfg).unwrap();
    assert_eq!(products.sky.planes[0][[0, 0]], 777.0);
}

#[test]
fn batch_skips_undersized_frames_and_continues() {
    let dir = tempdir().unwrap();
    let (target, mut pool) = night(dir.path(), 1);

    // A second target observed hours later: no candidate survives the
    // time window, so it is skipped, not failed.
    let lonely = patterned_frame(1, "lonely", 103.0, 60000.0 + 0.5);
    let lonely_path = write_synthetic(dir.path(), &lonely);
    pool.extend(build_pool(&[lonely_path.clone()]).unwrap());

    let cfg = quiet_config();
    let targets = vec![target.clone(), lonely_path.clone()];
    let summary: BatchSummary = run_batch(&targets, &pool, &cfg, |path, outcome| {
        if path == lonely_path.as_path() {
            assert!(matches!(outcome, Outcome::Skipped(_)));
        } else {
            assert!(matches!(outcome, Outcome::Processed));
        }
    });

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);
    assert!(artifact_path(&target, SUFFIX_CLEAN).exists());
    assert!(!artifact_path(&lonely_path, SUFFIX_CLEAN).exists());
}

#[test]
fn external_flattener_output_is_subtracted() {
    let dir = tempdir().unwrap();
    let (target, pool) = night(dir.path(), 1);

    let mut cfg = SkyConfig::default();
    // Stand-in extractor: exits zero and touches nothing; the background
    // map it would have written is staged beforehand.
    cfg.background.command = "true {image} {weight} {background}".into();
    cfg.destripe.enabled = false;

    let sub_path = artifact_path(&target, SUFFIX_SUB);
    let bg_path = artifact_path(&sub_path, "_bg");
    let bg = vec![Array2::<f32>::from_elem(DIMS, 2.0)];
    write_f32_planes(&bg_path, &bg, &skysub_core::frame::FrameMeta::default()).unwrap();

    let clean = process_frame(&target, &pool, &cfg).unwrap();

    // Subtraction leaves zero; the flattener then removes its 2 ADU
    // surface, and no destriping runs to hide it.
    let cleaned = ContainerReader::open(&clean).unwrap().read_frame().unwrap();
    for v in cleaned.planes[0].iter() {
        assert!((v + 2.0).abs() < 1e-3, "unexpected residual {v}");
    }
    // The staging copy handed to the extractor is cleaned up.
    assert!(!sub_path.exists());
}

#[test]
fn failing_extractor_fails_the_frame_without_partial_output() {
    let dir = tempdir().unwrap();
    let (target, pool) = night(dir.path(), 1);

    let mut cfg = SkyConfig::default();
    cfg.background.command = "false {image}".into();

    let summary = run_batch(&[target.clone()], &pool, &cfg, |_, _| {});
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.processed, 0);

    assert!(!artifact_path(&target, SUFFIX_CLEAN).exists());
    assert!(!artifact_path(&target, SUFFIX_SUB).exists());
}
