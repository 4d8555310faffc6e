use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{info, warn};

use crate::error::StoreResult;
use crate::record::encode_line;

/// Convert a legacy `<name>.json` array file into `<name>.jsonl`.
///
/// Runs only when `path` has the `jsonl` extension, does not exist yet, and
/// a sibling `.json` file holding a JSON array does. Non-object elements are
/// dropped. The legacy file is left in place. Returns `true` when a
/// migration happened.
pub fn migrate_legacy_json(path: &Path) -> StoreResult<bool> {
    if path.extension().map_or(true, |ext| ext != "jsonl") || path.exists() {
        return Ok(false);
    }
    let legacy = path.with_extension("json");
    if !legacy.is_file() {
        return Ok(false);
    }

    let document: Value = serde_json::from_reader(BufReader::new(File::open(&legacy)?))?;
    let Value::Array(items) = document else {
        warn!(path = %legacy.display(), "legacy collection is not an array; not migrated");
        return Ok(false);
    };

    let mut temp = path.to_path_buf().into_os_string();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    let mut out = BufWriter::new(File::create(&temp)?);
    let mut migrated = 0usize;
    for item in items {
        match item {
            Value::Object(record) => {
                out.write_all(&encode_line(&record)?)?;
                migrated += 1;
            }
            other => warn!(value = %other, "dropping non-object legacy element"),
        }
    }
    let file = out.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    drop(file);
    fs::rename(&temp, path)?;

    info!(from = %legacy.display(), to = %path.display(), records = migrated, "legacy collection migrated");
    Ok(true)
}
