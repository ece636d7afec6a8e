//! Candidate list input and pool construction.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Result, SkyError};
use crate::io::container::ContainerReader;
use crate::io::frame_id;
use crate::select::PoolEntry;

/// Read a plain-text candidate list: one frame path per line, first
/// whitespace token used, the rest ignored. Blank lines and `#` comments
/// are skipped.
pub fn read_list(path: &Path) -> Result<Vec<PathBuf>> {
    let text = fs::read_to_string(path).map_err(|e| SkyError::CandidateList {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(token) = line.split_whitespace().next() {
            out.push(PathBuf::from(token));
        }
    }
    if out.is_empty() {
        return Err(SkyError::CandidateList {
            path: path.to_path_buf(),
            reason: "list is empty or contains no valid entries".into(),
        });
    }
    Ok(out)
}

/// Build the candidate pool by scanning frame headers. Unreadable entries
/// are dropped with a warning; the pool is read-only afterward.
pub fn build_pool(paths: &[PathBuf]) -> Result<Vec<PoolEntry>> {
    let mut pool = Vec::with_capacity(paths.len());
    for path in paths {
        match ContainerReader::open(path) {
            Ok(reader) => {
                let meta = &reader.header.meta;
                pool.push(PoolEntry {
                    id: if meta.exposure_id.is_empty() {
                        frame_id(path)
                    } else {
                        meta.exposure_id.clone()
                    },
                    path: path.clone(),
                    filter: meta.filter.clone(),
                    ra_deg: meta.ra_deg,
                    dec_deg: meta.dec_deg,
                    mjd: meta.mjd,
                    sky_levels: meta.sky_levels.clone(),
                });
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Dropping unreadable pool entry");
            }
        }
    }
    if pool.is_empty() {
        return Err(SkyError::EmptyPool);
    }
    Ok(pool)
}
