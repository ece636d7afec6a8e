mod common;

use common::{entry, meta};
use skysub_core::config::SelectionConfig;
use skysub_core::error::SkyError;
use skysub_core::select::{candidates, select, SelectionConstraints};

fn constraints() -> SelectionConstraints {
    SelectionConstraints::from_config(&SelectionConfig::default())
}

// One night of exposures around RA 150, Dec 2.2, spaced one minute apart.
fn pool() -> Vec<skysub_core::select::PoolEntry> {
    const MINUTE: f64 = 1.0 / 24.0 / 60.0;
    (0..12)
        .map(|i| {
            entry(
                &format!("exp{i:03}"),
                "Ks",
                150.0 + 0.001 * i as f64,
                2.2,
                60000.0 + i as f64 * MINUTE,
            )
        })
        .collect()
}

#[test]
fn selection_is_deterministic() {
    let target = meta("target", "Ks", 150.0, 2.2, 60000.0 + 5.0 / 24.0 / 60.0, &[]);
    let pool = pool();
    let c = constraints();

    let first: Vec<String> = candidates(&target, &pool, &c)
        .iter()
        .map(|e| e.id.clone())
        .collect();
    let second: Vec<String> = candidates(&target, &pool, &c)
        .iter()
        .map(|e| e.id.clone())
        .collect();
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

#[test]
fn nearest_in_time_come_first() {
    const MINUTE: f64 = 1.0 / 24.0 / 60.0;
    let target = meta("target", "Ks", 150.0, 2.2, 60000.0 + 5.0 * MINUTE, &[]);
    let pool = pool();

    let selected = candidates(&target, &pool, &constraints());
    // exp005 is simultaneous with the target; deltas grow outward from it.
    assert_eq!(selected[0].id, "exp005");
    let deltas: Vec<f64> = selected
        .iter()
        .map(|e| (e.mjd.unwrap() - target.mjd.unwrap()).abs())
        .collect();
    for pair in deltas.windows(2) {
        assert!(pair[0] <= pair[1] + 1e-12);
    }
}

#[test]
fn equal_time_deltas_break_on_distance() {
    const MINUTE: f64 = 1.0 / 24.0 / 60.0;
    let target = meta("target", "Ks", 150.0, 2.2, 60000.0, &[]);
    let pool = vec![
        entry("far", "Ks", 150.1, 2.2, 60000.0 + MINUTE),
        entry("near", "Ks", 150.01, 2.2, 60000.0 + MINUTE),
    ];
    let mut c = constraints();
    c.min_candidates = 1;

    let selected = candidates(&target, &pool, &c);
    assert_eq!(selected[0].id, "near");
    assert_eq!(selected[1].id, "far");
}

#[test]
fn filter_mismatch_and_self_are_excluded() {
    let target = meta("exp003", "Ks", 150.0, 2.2, 60000.0, &[]);
    let mut pool = pool();
    pool.push(entry("jband", "J", 150.0, 2.2, 60000.0));

    let selected = candidates(&target, &pool, &constraints());
    assert!(selected.iter().all(|e| e.id != "exp003"));
    assert!(selected.iter().all(|e| e.filter == "Ks"));
}

#[test]
fn time_window_and_radius_cut() {
    let target = meta("target", "Ks", 150.0, 2.2, 60000.0, &[]);
    let pool = vec![
        entry("ok", "Ks", 150.0, 2.2, 60000.0 + 10.0 / 24.0 / 60.0),
        // Two hours away, outside the default 30 minute window.
        entry("stale", "Ks", 150.0, 2.2, 60000.0 + 2.0 / 24.0),
        // A degree away, outside the default 10 arcmin radius.
        entry("offfield", "Ks", 151.0, 2.2, 60000.0),
    ];
    let mut c = constraints();
    c.min_candidates = 1;

    let selected = candidates(&target, &pool, &c);
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].id, "ok");
}

#[test]
fn truncates_to_max_candidates() {
    let target = meta("target", "Ks", 150.0, 2.2, 60000.0 + 5.0 / 24.0 / 60.0, &[]);
    let pool = pool();
    let mut c = constraints();
    c.max_candidates = 3;

    let selected = candidates(&target, &pool, &c);
    assert_eq!(selected.len(), 3);
}

#[test]
fn missing_position_yields_no_candidates() {
    let mut target = meta("target", "Ks", 150.0, 2.2, 60000.0, &[]);
    target.ra_deg = None;
    let pool = pool();
    assert!(candidates(&target, &pool, &constraints()).is_empty());

    match select(&target, &pool, &constraints()) {
        Err(SkyError::MissingMetadata { field, .. }) => assert_eq!(field, "position"),
        other => panic!("expected MissingMetadata, got {other:?}"),
    }
}

#[test]
fn missing_timestamp_is_an_error() {
    let mut target = meta("target", "Ks", 150.0, 2.2, 60000.0, &[]);
    target.mjd = None;
    let pool = pool();
    match select(&target, &pool, &constraints()) {
        Err(SkyError::MissingMetadata { field, .. }) => assert_eq!(field, "timestamp"),
        other => panic!("expected MissingMetadata, got {other:?}"),
    }
}

#[test]
fn too_few_survivors_is_a_skip() {
    let target = meta("target", "Ks", 150.0, 2.2, 60000.0, &[]);
    let pool = vec![
        entry("a", "Ks", 150.0, 2.2, 60000.0),
        entry("b", "Ks", 150.0, 2.2, 60000.0),
    ];

    let err = select(&target, &pool, &constraints()).unwrap_err();
    match &err {
        SkyError::InsufficientCandidates { found, required } => {
            assert_eq!(*found, 2);
            assert_eq!(*required, 4);
        }
        other => panic!("expected InsufficientCandidates, got {other:?}"),
    }
    assert!(err.is_skip());
}

#[test]
fn minimum_boundary_is_inclusive() {
    let target = meta("target", "Ks", 150.0, 2.2, 60000.0, &[]);
    let pool: Vec<_> = (0..4)
        .map(|i| entry(&format!("c{i}"), "Ks", 150.0, 2.2, 60000.0))
        .collect();

    let selected = select(&target, &pool, &constraints()).unwrap();
    assert_eq!(selected.len(), 4);
}

#[test]
fn empty_pool_is_an_error() {
    let target = meta("target", "Ks", 150.0, 2.2, 60000.0, &[]);
    assert!(matches!(
        select(&target, &[], &constraints()),
        Err(SkyError::EmptyPool)
    ));
}
