use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, error, info};

use crate::error::StoreResult;

/// Delete every `*.tmp` file left in `dir` by an interrupted rewrite.
///
/// Must run once at boot, before any collection in `dir` is used. Files
/// that cannot be removed are logged and skipped. A missing directory
/// counts as clean. Returns the number of files removed.
pub fn sweep_temp_files(dir: &Path) -> StoreResult<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() || path.extension().map_or(true, |ext| ext != "tmp") {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed stale temp file");
                removed += 1;
            }
            Err(e) => error!(path = %path.display(), error = %e, "failed to remove temp file"),
        }
    }

    if removed > 0 {
        info!(dir = %dir.display(), removed, "startup sweep finished");
    }
    Ok(removed)
}
