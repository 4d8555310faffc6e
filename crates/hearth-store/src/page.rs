//! Offset-indexed pagination and search.
//!
//! Every paginated read makes one pass to collect the byte offset of each
//! qualifying line, then seeks to just the offsets on the requested page.
//! Memory stays at one `u64` per record plus the parsed page.

use std::io::{BufRead, Seek, SeekFrom};

use serde::Serialize;
use tracing::{debug, warn};

use crate::collection::Collection;
use crate::error::{StoreError, StoreResult};
use crate::record::{next_line, parse_record, searchable_text, Record};

/// Which page of a collection to read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based page number.
    pub page: usize,
    /// Records per page, at least 1.
    pub limit: usize,
    /// Newest-appended first when `true`.
    pub reverse: bool,
    /// Case-insensitive substring matched against every field value.
    pub search: Option<String>,
}

impl PageRequest {
    /// Request in append order with no search.
    pub fn new(page: usize, limit: usize) -> Self {
        Self {
            page,
            limit,
            reverse: false,
            search: None,
        }
    }

    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    /// The search term, if one is set and non-empty.
    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().filter(|s| !s.is_empty())
    }

    fn validate(&self) -> StoreResult<()> {
        if self.page == 0 || self.limit == 0 {
            return Err(StoreError::InvalidPage {
                page: self.page,
                limit: self.limit,
            });
        }
        Ok(())
    }
}

/// One page of records plus the number of records that qualified.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Page {
    pub records: Vec<Record>,
    pub total: usize,
}

/// Byte offsets of record lines, built fresh for each query.
#[derive(Debug, Default)]
pub(crate) struct OffsetIndex {
    offsets: Vec<u64>,
}

impl OffsetIndex {
    /// Offsets of every non-blank line.
    pub(crate) fn build<R: BufRead>(reader: &mut R) -> StoreResult<Self> {
        let mut offsets = Vec::new();
        let mut line = Vec::new();
        let mut pos = 0;
        loop {
            let read = next_line(reader, &mut line)?;
            if read == 0 {
                break;
            }
            if !line.trim_ascii().is_empty() {
                offsets.push(pos);
            }
            pos += read;
        }
        Ok(Self { offsets })
    }

    /// Offsets of lines with a field value containing `term`.
    pub(crate) fn matching<R: BufRead>(reader: &mut R, term: &SearchTerm) -> StoreResult<Self> {
        let mut offsets = Vec::new();
        let mut line = Vec::new();
        let mut pos = 0;
        loop {
            let read = next_line(reader, &mut line)?;
            if read == 0 {
                break;
            }
            let trimmed = line.trim_ascii();
            if !trimmed.is_empty() && term.raw_may_match(trimmed) {
                match parse_record(trimmed) {
                    Ok(record) if term.matches(&record) => offsets.push(pos),
                    Ok(_) => {}
                    Err(e) => debug!(offset = pos, error = %e, "unparsable line skipped by search"),
                }
            }
            pos += read;
        }
        Ok(Self { offsets })
    }

    pub(crate) fn len(&self) -> usize {
        self.offsets.len()
    }

    pub(crate) fn reverse(&mut self) {
        self.offsets.reverse();
    }

    /// Offsets on page `page` of size `limit`.
    pub(crate) fn window(&self, page: usize, limit: usize) -> &[u64] {
        let start = page.saturating_sub(1).saturating_mul(limit);
        if start >= self.offsets.len() {
            return &[];
        }
        let end = start.saturating_add(limit).min(self.offsets.len());
        &self.offsets[start..end]
    }
}

/// A lowercased search needle.
#[derive(Debug)]
pub(crate) struct SearchTerm {
    needle: String,
    /// The raw-line prefilter is only sound when the needle has no
    /// characters JSON would escape.
    raw_prefilter: bool,
}

impl SearchTerm {
    pub(crate) fn new(term: &str) -> Self {
        let needle = term.to_lowercase();
        let raw_prefilter = !needle
            .chars()
            .any(|c| c == '"' || c == '\\' || c.is_control());
        Self {
            needle,
            raw_prefilter,
        }
    }

    /// Cheap containment test on the unparsed line. A `false` result means
    /// the record cannot match.
    pub(crate) fn raw_may_match(&self, line: &[u8]) -> bool {
        if !self.raw_prefilter {
            return true;
        }
        // any escape (\uXXXX, \/) can hide the characters it encodes
        if line.contains(&b'\\') {
            return true;
        }
        String::from_utf8_lossy(line).to_lowercase().contains(&self.needle)
    }

    /// Exact test against each field's value.
    pub(crate) fn matches(&self, record: &Record) -> bool {
        record
            .values()
            .any(|value| searchable_text(value).to_lowercase().contains(&self.needle))
    }
}

impl Collection {
    /// Read one page of records.
    ///
    /// Without a search term every record qualifies; with one, only records
    /// with a field value containing the term (case-insensitively). `total`
    /// counts all qualifying records, not just the page.
    pub fn fetch_page(&self, request: &PageRequest) -> StoreResult<Page> {
        request.validate()?;
        let Some(mut reader) = self.open_reader()? else {
            return Ok(Page::default());
        };

        let mut index = match request.search_term() {
            Some(term) => OffsetIndex::matching(&mut reader, &SearchTerm::new(term))?,
            None => OffsetIndex::build(&mut reader)?,
        };
        drop(reader);

        let total = index.len();
        if request.reverse {
            index.reverse();
        }
        let records = self.read_at(index.window(request.page, request.limit))?;
        debug!(
            collection = %self.name(),
            page = request.page,
            limit = request.limit,
            total,
            returned = records.len(),
            "page fetched"
        );
        Ok(Page { records, total })
    }

    /// Parse the lines starting at each offset, in the given order.
    fn read_at(&self, offsets: &[u64]) -> StoreResult<Vec<Record>> {
        if offsets.is_empty() {
            return Ok(Vec::new());
        }
        let Some(mut reader) = self.open_reader()? else {
            return Ok(Vec::new());
        };
        let mut records = Vec::with_capacity(offsets.len());
        let mut line = Vec::new();
        for &offset in offsets {
            reader.seek(SeekFrom::Start(offset))?;
            next_line(&mut reader, &mut line)?;
            match parse_record(line.trim_ascii()) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(collection = %self.name(), offset, error = %e, "skipping malformed record");
                }
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::tests::{rec, temp_collection};
    use crate::record::record_id;
    use hearth_cache::Cache;
    use proptest::prelude::*;
    use serde_json::json;
    use std::fs;

    fn ids(page: &Page) -> Vec<u64> {
        page.records.iter().filter_map(record_id).collect()
    }

    fn seed(cache: &mut Cache, coll: &Collection, n: u64) {
        for id in 1..=n {
            coll.append(cache, &rec(json!({"id": id, "title": format!("poem {id}")})))
                .unwrap();
        }
    }

    #[test]
    fn newest_first_then_delete() {
        let (_dir, mut cache, coll) = temp_collection();
        seed(&mut cache, &coll, 3);

        let request = PageRequest::new(1, 2).with_reverse(true);
        let page = coll.fetch_page(&request).unwrap();
        assert_eq!(ids(&page), vec![3, 2]);
        assert_eq!(page.total, 3);

        assert!(coll.delete(&mut cache, 2).unwrap());
        let page = coll.fetch_page(&request).unwrap();
        assert_eq!(ids(&page), vec![3, 1]);
        assert_eq!(page.total, 2);
    }

    #[test]
    fn missing_file_is_an_empty_page() {
        let (_dir, _cache, coll) = temp_collection();
        let page = coll.fetch_page(&PageRequest::new(1, 10)).unwrap();
        assert_eq!(page, Page::default());
    }

    #[test]
    fn invalid_requests_are_rejected() {
        let (_dir, _cache, coll) = temp_collection();
        assert!(matches!(
            coll.fetch_page(&PageRequest::new(0, 10)),
            Err(StoreError::InvalidPage { page: 0, .. })
        ));
        assert!(matches!(
            coll.fetch_page(&PageRequest::new(1, 0)),
            Err(StoreError::InvalidPage { limit: 0, .. })
        ));
    }

    #[test]
    fn page_past_the_end_is_empty_but_counts() {
        let (_dir, mut cache, coll) = temp_collection();
        seed(&mut cache, &coll, 4);
        let page = coll.fetch_page(&PageRequest::new(3, 2)).unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.total, 4);
    }

    #[test]
    fn blank_lines_are_not_indexed() {
        let (_dir, _cache, coll) = temp_collection();
        fs::write(coll.path(), "{\"id\":1}\n\n   \n{\"id\":2}\n").unwrap();
        let page = coll.fetch_page(&PageRequest::new(1, 10)).unwrap();
        assert_eq!(ids(&page), vec![1, 2]);
        assert_eq!(page.total, 2);
    }

    #[test]
    fn search_is_case_insensitive_and_counts_matches() {
        let (_dir, mut cache, coll) = temp_collection();
        for (id, title) in [(1, "Moon over Lake"), (2, "River"), (3, "moonrise"), (4, "Dawn")] {
            coll.append(&mut cache, &rec(json!({"id": id, "title": title}))).unwrap();
        }
        let request = PageRequest::new(1, 10).with_reverse(true).with_search("MOON");
        let page = coll.fetch_page(&request).unwrap();
        assert_eq!(ids(&page), vec![3, 1]);
        assert_eq!(page.total, 2);
    }

    #[test]
    fn search_ignores_field_names() {
        let (_dir, mut cache, coll) = temp_collection();
        coll.append(&mut cache, &rec(json!({"id": 1, "author": "Li Bai"}))).unwrap();
        coll.append(&mut cache, &rec(json!({"id": 2, "note": "author unknown"}))).unwrap();
        let page = coll
            .fetch_page(&PageRequest::new(1, 10).with_search("author"))
            .unwrap();
        assert_eq!(ids(&page), vec![2]);
    }

    #[test]
    fn search_matches_numbers_and_non_ascii() {
        let (_dir, mut cache, coll) = temp_collection();
        coll.append(&mut cache, &rec(json!({"id": 1, "title": "静夜思", "year": 742}))).unwrap();
        coll.append(&mut cache, &rec(json!({"id": 2, "title": "春晓", "year": 689}))).unwrap();

        let page = coll.fetch_page(&PageRequest::new(1, 10).with_search("夜")).unwrap();
        assert_eq!(ids(&page), vec![1]);
        let page = coll.fetch_page(&PageRequest::new(1, 10).with_search("68")).unwrap();
        assert_eq!(ids(&page), vec![2]);
    }

    #[test]
    fn search_sees_through_escapes() {
        let (_dir, _cache, coll) = temp_collection();
        fs::write(
            coll.path(),
            "{\"id\":1,\"title\":\"\\u9759\\u591c\"}\n{\"id\":2,\"quote\":\"say \\\"hi\\\"\"}\n{\"id\":3,\"url\":\"a\\/b\"}\n",
        )
        .unwrap();
        let page = coll.fetch_page(&PageRequest::new(1, 10).with_search("静")).unwrap();
        assert_eq!(ids(&page), vec![1]);
        let page = coll
            .fetch_page(&PageRequest::new(1, 10).with_search("\"hi\""))
            .unwrap();
        assert_eq!(ids(&page), vec![2]);
        let page = coll.fetch_page(&PageRequest::new(1, 10).with_search("a/b")).unwrap();
        assert_eq!(ids(&page), vec![3]);
    }

    #[test]
    fn search_matches_nested_values_by_rendering() {
        let (_dir, mut cache, coll) = temp_collection();
        coll.append(&mut cache, &rec(json!({"id": 1, "tags": ["autumn", "wind"]}))).unwrap();
        coll.append(&mut cache, &rec(json!({"id": 2, "tags": []}))).unwrap();
        let page = coll.fetch_page(&PageRequest::new(1, 10).with_search("wind")).unwrap();
        assert_eq!(ids(&page), vec![1]);
    }

    #[test]
    fn empty_search_term_means_no_search() {
        let (_dir, mut cache, coll) = temp_collection();
        seed(&mut cache, &coll, 3);
        let page = coll.fetch_page(&PageRequest::new(1, 10).with_search("")).unwrap();
        assert_eq!(page.total, 3);
    }

    #[test]
    fn window_bounds() {
        let index = OffsetIndex {
            offsets: vec![0, 10, 20, 30, 40],
        };
        assert_eq!(index.window(1, 2), &[0, 10]);
        assert_eq!(index.window(3, 2), &[40]);
        assert!(index.window(4, 2).is_empty());
        assert!(index.window(usize::MAX, usize::MAX).is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn pages_reconstruct_the_collection(n in 0u64..40, limit in 1usize..9) {
            let (_dir, mut cache, coll) = temp_collection();
            seed(&mut cache, &coll, n);

            let pages = (n as usize).div_ceil(limit);
            let mut seen = Vec::new();
            for page in 1..=pages {
                let got = coll.fetch_page(&PageRequest::new(page, limit)).unwrap();
                prop_assert_eq!(got.total, n as usize);
                seen.extend(ids(&got));
            }
            prop_assert_eq!(seen, (1..=n).collect::<Vec<_>>());
        }

        #[test]
        fn reverse_is_a_pure_reordering(n in 1u64..30, limit in 1usize..7, page in 1usize..6) {
            let (_dir, mut cache, coll) = temp_collection();
            seed(&mut cache, &coll, n);

            let forward: Vec<u64> = (1..=n).collect();
            let mirrored: Vec<u64> = forward.iter().rev().copied().collect();
            let start = (page - 1) * limit;
            let expected: Vec<u64> = mirrored.iter().skip(start).take(limit).copied().collect();

            let got = coll
                .fetch_page(&PageRequest::new(page, limit).with_reverse(true))
                .unwrap();
            prop_assert_eq!(ids(&got), expected);
            prop_assert_eq!(got.total, n as usize);
        }
    }
}
