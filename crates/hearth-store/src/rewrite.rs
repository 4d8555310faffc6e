//! Update and delete by whole-file rewrite.
//!
//! Every line is streamed into `<file>.tmp`; the target record is edited
//! or dropped on the way through. When the target was found the temp file
//! is synced and renamed over the collection, which replaces it
//! atomically. A crash before the rename leaves the original untouched and
//! an inert temp file for the startup sweep; a crash after it leaves the
//! new content in place.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use hearth_cache::Cache;
use serde_json::Value;
use tracing::{debug, warn};

use crate::collection::Collection;
use crate::error::{StoreError, StoreResult};
use crate::record::{encode_line, next_line, parse_record, record_id, Record, ID_FIELD};

/// What to do with a record whose id matched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LineEdit {
    /// Write the (possibly modified) record back.
    Keep,
    /// Leave the record out.
    Omit,
}

/// A fully written temp file that has not replaced the collection yet.
#[derive(Debug)]
#[must_use = "a pending rewrite does nothing until committed"]
pub(crate) struct PendingRewrite {
    temp: PathBuf,
    target: PathBuf,
}

impl PendingRewrite {
    /// Rename the temp file over the collection.
    pub(crate) fn commit(self) -> StoreResult<()> {
        fs::rename(&self.temp, &self.target).map_err(|source| StoreError::Commit {
            path: self.target.clone(),
            source,
        })
    }
}

impl Collection {
    /// Stream the collection into its temp file, passing every record with
    /// id `id` through `edit`. Returns `None` (and removes the temp file)
    /// when no record matched or the collection does not exist.
    ///
    /// Lines that are not edited are copied verbatim, malformed ones included.
    pub(crate) fn rewrite<F>(&self, id: u64, mut edit: F) -> StoreResult<Option<PendingRewrite>>
    where
        F: FnMut(&mut Record) -> LineEdit,
    {
        let Some(mut reader) = self.open_reader()? else {
            return Ok(None);
        };
        let temp = self.temp_path();
        let mut out = BufWriter::new(File::create(&temp)?);
        let mut found = false;
        let mut line = Vec::new();

        while next_line(&mut reader, &mut line)? > 0 {
            let trimmed = line.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }
            let target = match parse_record(trimmed) {
                Ok(record) if record_id(&record) == Some(id) => Some(record),
                Ok(_) => None,
                Err(e) => {
                    warn!(collection = %self.name(), error = %e, "malformed record carried through rewrite");
                    None
                }
            };
            match target {
                None => {
                    out.write_all(trimmed)?;
                    out.write_all(b"\n")?;
                }
                Some(mut record) => {
                    found = true;
                    if edit(&mut record) == LineEdit::Keep {
                        out.write_all(&encode_line(&record)?)?;
                    }
                }
            }
        }
        drop(reader);

        let file = out.into_inner().map_err(|e| e.into_error())?;
        if !found {
            drop(file);
            fs::remove_file(&temp)?;
            return Ok(None);
        }
        file.sync_all()?;

        Ok(Some(PendingRewrite {
            temp,
            target: self.path().to_path_buf(),
        }))
    }

    /// Apply `mutate` to the record with id `id`. Returns `false` when no
    /// such record exists.
    ///
    /// The record keeps its id and field order; every other line is left
    /// byte-for-byte as it was.
    pub fn update<F>(&self, id: u64, mut mutate: F) -> StoreResult<bool>
    where
        F: FnMut(&mut Record),
    {
        let pending = self.rewrite(id, |record| {
            let original = record.get(ID_FIELD).cloned();
            mutate(record);
            if let Some(original) = original {
                record.insert(ID_FIELD.to_string(), original);
            }
            LineEdit::Keep
        })?;

        match pending {
            Some(pending) => {
                pending.commit()?;
                debug!(collection = %self.name(), id, "record updated");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove the record with id `id`. Returns `false` when no such record
    /// exists.
    ///
    /// A warm count slot is decremented; the max-id slot is always cleared
    /// since the removed record may have held the maximum.
    pub fn delete(&self, cache: &mut Cache, id: u64) -> StoreResult<bool> {
        let Some(pending) = self.rewrite(id, |_| LineEdit::Omit)? else {
            return Ok(false);
        };
        pending.commit()?;

        if let Some(count) = cache.get_u64(self.count_slot()) {
            cache.set_val(self.count_slot(), Value::from(count.saturating_sub(1)));
        }
        cache.invalidate(self.max_id_slot(), None);

        debug!(collection = %self.name(), id, "record deleted");
        Ok(true)
    }
}

/// Replace `path` with `contents` through a synced temp file and a rename.
pub fn write_atomically(path: &Path, contents: &[u8]) -> StoreResult<()> {
    let mut temp = path.to_path_buf().into_os_string();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    let mut file = File::create(&temp)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp, path).map_err(|source| StoreError::Commit {
        path: path.to_path_buf(),
        source,
    })
}
