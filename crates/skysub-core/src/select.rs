//! Spatio-temporal neighbor selection for sky estimation.
//!
//! Given a target frame's metadata and a pool of candidate headers, pick
//! an ordered, bounded list of usable neighbors: same filter, within a
//! time window and an angular radius, nearest in time first.

use std::path::PathBuf;

use crate::config::SelectionConfig;
use crate::error::{Result, SkyError};
use crate::frame::FrameMeta;

/// One candidate frame, built once per run from its header and read-only
/// afterward.
#[derive(Clone, Debug)]
pub struct PoolEntry {
    pub id: String,
    pub path: PathBuf,
    pub filter: String,
    pub ra_deg: Option<f64>,
    pub dec_deg: Option<f64>,
    pub mjd: Option<f64>,
    pub sky_levels: Vec<f32>,
}

impl PoolEntry {
    /// Ordered sky level lookup, same policy as FrameMeta.
    pub fn sky_level(&self, chip: usize) -> Option<f32> {
        match self.sky_levels.len() {
            0 => None,
            1 => Some(self.sky_levels[0]),
            n if chip < n => Some(self.sky_levels[chip]),
            _ => None,
        }
    }
}

/// Selection constraints in internal units (days, squared degrees).
#[derive(Clone, Debug)]
pub struct SelectionConstraints {
    pub max_time_delta_days: f64,
    pub max_dist2_deg2: f64,
    pub min_candidates: usize,
    pub max_candidates: usize,
}

impl SelectionConstraints {
    /// Convert from the configuration surface units (minutes, arcmin).
    pub fn from_config(cfg: &SelectionConfig) -> Self {
        let max_dist_deg = cfg.max_angular_distance_arcmin / 60.0;
        Self {
            max_time_delta_days: cfg.max_time_delta_min / 60.0 / 24.0,
            max_dist2_deg2: max_dist_deg * max_dist_deg,
            min_candidates: cfg.min_candidates,
            max_candidates: cfg.max_candidates,
        }
    }
}

/// Flat-sky squared angular separation proxy, in squared degrees.
fn dist2(ra0: f64, dec0: f64, ra: f64, dec: f64) -> f64 {
    let dra = (ra - ra0) * dec0.to_radians().cos();
    let ddec = dec - dec0;
    dra * dra + ddec * ddec
}

/// Candidates surviving the filter/position/time cuts, nearest in time
/// first, truncated to `max_candidates`. Returns an empty list when the
/// target's position or timestamp is absent.
pub fn candidates<'a>(
    target: &FrameMeta,
    pool: &'a [PoolEntry],
    constraints: &SelectionConstraints,
) -> Vec<&'a PoolEntry> {
    let (ra0, dec0, mjd0) = match (target.ra_deg, target.dec_deg, target.mjd) {
        (Some(ra), Some(dec), Some(mjd)) => (ra, dec, mjd),
        _ => return Vec::new(),
    };

    let mut survivors: Vec<(&PoolEntry, f64, f64)> = Vec::new();
    for entry in pool {
        if entry.id == target.exposure_id || entry.filter != target.filter {
            continue;
        }
        let (ra, dec, mjd) = match (entry.ra_deg, entry.dec_deg, entry.mjd) {
            (Some(ra), Some(dec), Some(mjd)) => (ra, dec, mjd),
            _ => continue,
        };
        let d2 = dist2(ra0, dec0, ra, dec);
        if d2 > constraints.max_dist2_deg2 {
            continue;
        }
        let dt = (mjd0 - mjd).abs();
        if dt > constraints.max_time_delta_days {
            continue;
        }
        survivors.push((entry, dt, d2));
    }

    // Nearest in time first; ties broken by angular separation, then by
    // identifier so the ordering is deterministic.
    survivors.sort_by(|a, b| {
        a.1.total_cmp(&b.1)
            .then(a.2.total_cmp(&b.2))
            .then_with(|| a.0.id.cmp(&b.0.id))
    });
    survivors.truncate(constraints.max_candidates);
    survivors.into_iter().map(|(e, _, _)| e).collect()
}

/// Select usable neighbors for a target frame.
///
/// Errors with `MissingMetadata` when the target has no position or
/// timestamp, and `InsufficientCandidates` when fewer than
/// `min_candidates` survive the cuts. Both are per-frame recoverable.
pub fn select<'a>(
    target: &FrameMeta,
    pool: &'a [PoolEntry],
    constraints: &SelectionConstraints,
) -> Result<Vec<&'a PoolEntry>> {
    if target.ra_deg.is_none() || target.dec_deg.is_none() {
        return Err(SkyError::MissingMetadata {
            id: target.exposure_id.clone(),
            field: "position",
        });
    }
    if target.mjd.is_none() {
        return Err(SkyError::MissingMetadata {
            id: target.exposure_id.clone(),
            field: "timestamp",
        });
    }
    if pool.is_empty() {
        return Err(SkyError::EmptyPool);
    }

    let found = candidates(target, pool, constraints);
    if found.len() < constraints.min_candidates {
        return Err(SkyError::InsufficientCandidates {
            found: found.len(),
            required: constraints.min_candidates,
        });
    }
    Ok(found)
}
