use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use hearth_cache::{Cache, SlotSpec};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::migrate::migrate_legacy_json;
use crate::record::{encode_line, next_line, parse_record, record_id, Record};

/// Options applied when a collection is opened.
#[derive(Clone, Debug)]
pub struct CollectionOptions {
    /// Convert a sibling `<name>.json` array file on first open.
    pub migrate_legacy: bool,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        Self {
            migrate_legacy: true,
        }
    }
}

/// One append-only collection file holding a JSON object per line.
///
/// The file is created lazily by the first append; a missing file reads
/// as an empty collection. Max-id and record-count scans are memoized in
/// two scalar cache slots named after the file path.
#[derive(Debug)]
pub struct Collection {
    name: String,
    path: PathBuf,
    max_id_slot: String,
    count_slot: String,
}

impl Collection {
    /// Open a collection with default options, registering its cache slots.
    pub fn open(path: impl Into<PathBuf>, cache: &mut Cache) -> StoreResult<Self> {
        Self::open_with(path, cache, CollectionOptions::default())
    }

    pub fn open_with(
        path: impl Into<PathBuf>,
        cache: &mut Cache,
        options: CollectionOptions,
    ) -> StoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        if options.migrate_legacy {
            if let Err(e) = migrate_legacy_json(&path) {
                warn!(path = %path.display(), error = %e, "legacy migration failed");
            }
        }

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let max_id_slot = format!("db:{}:maxid", path.display());
        let count_slot = format!("db:{}:count", path.display());
        cache.register(max_id_slot.clone(), SlotSpec::scalar());
        cache.register(count_slot.clone(), SlotSpec::scalar());

        Ok(Self {
            name,
            path,
            max_id_slot,
            count_slot,
        })
    }

    /// Collection name, taken from the file stem.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the transient rewrite file, `<file>.tmp`.
    pub fn temp_path(&self) -> PathBuf {
        let mut os = self.path.clone().into_os_string();
        os.push(".tmp");
        PathBuf::from(os)
    }

    pub(crate) fn max_id_slot(&self) -> &str {
        &self.max_id_slot
    }

    pub(crate) fn count_slot(&self) -> &str {
        &self.count_slot
    }

    /// Open the collection for reading; `None` when it does not exist yet.
    pub(crate) fn open_reader(&self) -> StoreResult<Option<BufReader<File>>> {
        match File::open(&self.path) {
            Ok(file) => Ok(Some(BufReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Append a record as one line.
    ///
    /// The record must already carry its id; callers assign
    /// `get_max_id() + 1`. Warm count and max-id slots are updated in place.
    pub fn append(&self, cache: &mut Cache, record: &Record) -> StoreResult<()> {
        let id = record_id(record).ok_or(StoreError::MissingId)?;
        let line = encode_line(record)?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        if ends_mid_line(&mut file)? {
            warn!(collection = %self.name, "unterminated last line, closing it before append");
            file.write_all(b"\n")?;
        }
        file.write_all(&line)?;
        file.flush()?;

        if let Some(count) = cache.get_u64(&self.count_slot) {
            cache.set_val(&self.count_slot, Value::from(count + 1));
        }
        if let Some(max_id) = cache.get_u64(&self.max_id_slot) {
            if id > max_id {
                cache.set_val(&self.max_id_slot, Value::from(id));
            }
        }

        debug!(collection = %self.name, id, bytes = line.len(), "record appended");
        Ok(())
    }

    /// Highest id present in the collection, 0 when empty.
    ///
    /// Lines that fail to parse are skipped.
    pub fn get_max_id(&self, cache: &mut Cache) -> StoreResult<u64> {
        if let Some(max_id) = cache.get_u64(&self.max_id_slot) {
            return Ok(max_id);
        }

        let mut max_id = 0;
        if let Some(mut reader) = self.open_reader()? {
            let mut line = Vec::new();
            while next_line(&mut reader, &mut line)? > 0 {
                let trimmed = line.trim_ascii();
                if trimmed.is_empty() {
                    continue;
                }
                match parse_record(trimmed) {
                    Ok(record) => {
                        if let Some(id) = record_id(&record) {
                            max_id = max_id.max(id);
                        }
                    }
                    Err(e) => {
                        warn!(collection = %self.name, error = %e, "skipping malformed record");
                    }
                }
            }
        }

        cache.set_val(&self.max_id_slot, Value::from(max_id));
        Ok(max_id)
    }

    /// Number of non-blank lines. Counts without parsing.
    pub fn count(&self, cache: &mut Cache) -> StoreResult<u64> {
        if let Some(count) = cache.get_u64(&self.count_slot) {
            return Ok(count);
        }

        let mut count = 0;
        if let Some(mut reader) = self.open_reader()? {
            let mut line = Vec::new();
            while next_line(&mut reader, &mut line)? > 0 {
                if !line.trim_ascii().is_empty() {
                    count += 1;
                }
            }
        }

        cache.set_val(&self.count_slot, Value::from(count));
        Ok(count)
    }

    /// First record whose id equals `id`.
    pub fn get_by_id(&self, id: u64) -> StoreResult<Option<Record>> {
        for record in self.iter_records()? {
            if record_id(&record) == Some(id) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Stream the collection one parsed record at a time.
    pub fn iter_records(&self) -> StoreResult<Records> {
        Ok(Records {
            reader: self.open_reader()?,
            line: Vec::new(),
            name: self.name.clone(),
        })
    }
}

/// Lazy iterator over the records of one collection.
///
/// Malformed lines are skipped; a read error ends the iteration.
pub struct Records {
    reader: Option<BufReader<File>>,
    line: Vec<u8>,
    name: String,
}

impl Iterator for Records {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        let reader = self.reader.as_mut()?;
        loop {
            match next_line(reader, &mut self.line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(collection = %self.name, error = %e, "record iteration aborted");
                    break;
                }
            }
            let trimmed = self.line.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }
            match parse_record(trimmed) {
                Ok(record) => return Some(record),
                Err(e) => {
                    warn!(collection = %self.name, error = %e, "skipping malformed record");
                }
            }
        }
        self.reader = None;
        None
    }
}

/// True when a non-empty file does not end in a newline, as left behind by
/// an append torn off partway.
fn ends_mid_line(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}
