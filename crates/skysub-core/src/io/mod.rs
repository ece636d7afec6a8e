pub mod candidates;
pub mod container;

use std::path::{Path, PathBuf};

use crate::consts::CONTAINER_EXT;

/// Path of a suffix-named companion artifact next to a frame:
/// `v123.mcf` + `_sky` -> `v123_sky.mcf`.
pub fn artifact_path(frame: &Path, suffix: &str) -> PathBuf {
    let stem = frame
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    frame.with_file_name(format!("{stem}{suffix}.{CONTAINER_EXT}"))
}

/// Frame identifier derived from the path (file stem).
pub fn frame_id(frame: &Path) -> String {
    frame
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| frame.to_string_lossy().into_owned())
}
