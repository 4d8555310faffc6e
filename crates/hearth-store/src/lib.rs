//! Append-only record collections for the hearth record server.
//!
//! A [`Collection`] is one flash-friendly file holding one JSON object per
//! line. Each record carries an integer `id` that callers assign from
//! [`Collection::get_max_id`] before appending.
//!
//! # Operations
//!
//! - [`Collection::append`] -- add one line, O(1)
//! - [`Collection::fetch_page`] -- paginate or search through an offset index
//! - [`Collection::update`] / [`Collection::delete`] -- whole-file rewrite
//! - [`Collection::get_by_id`], [`Collection::count`], [`Collection::iter_records`]
//!
//! # Design Rules
//!
//! 1. Nothing is held in memory but byte offsets and the page being served.
//! 2. A missing file is an empty collection, never an error.
//! 3. A malformed line is logged and skipped; it never fails a scan.
//! 4. Mutations become visible only through an atomic rename.
//! 5. A collection file is owned by exactly one [`Collection`].

pub mod collection;
pub mod error;
pub mod migrate;
pub mod page;
pub mod record;
pub mod rewrite;
pub mod sweep;

pub use collection::{Collection, CollectionOptions, Records};
pub use error::{StoreError, StoreResult};
pub use migrate::migrate_legacy_json;
pub use page::{Page, PageRequest};
pub use record::{record_id, Record, ID_FIELD};
pub use rewrite::write_atomically;
pub use sweep::sweep_temp_files;
