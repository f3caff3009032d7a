//! Cache Snapshot Module
//!
//! Point-in-time view of a cache for administrative inspection: statistics
//! plus a filtered, sorted, capped listing of the current entries.

use std::cmp::Ordering;

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::store::stats::CacheStatistics;

// == Cache Entry ==
/// A single key/value entry as rendered in snapshots.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    /// Unix millis of the last successful load
    pub loaded_at_millis: u64,
    /// Successful lookups observed for this key
    pub access_count: u64,
}

// == Cache Snapshot ==
/// Statistics plus the entry listing that matched the snapshot query.
///
/// Entry collection and concurrent mutation are only consistent for the
/// initial map iteration; the result is best effort.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
    pub statistics: CacheStatistics,
    pub entries: Vec<CacheEntry>,
    /// Entries present before filtering
    pub total_entries: u64,
    /// Entries that matched the filter, before the limit was applied
    pub matched_entries: u64,
}

// == Query Parameters ==
/// Field an entry listing is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SortField {
    #[serde(rename = "key")]
    Key,
    #[serde(rename = "value")]
    Value,
    #[serde(rename = "loadedAt")]
    LoadedAt,
    #[serde(rename = "accessCount")]
    AccessCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SortDir {
    #[serde(rename = "asc")]
    Asc,
    #[serde(rename = "desc")]
    Desc,
}

/// Which entry fields the filter pattern is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum FilterScope {
    #[serde(rename = "key")]
    Key,
    #[serde(rename = "value")]
    Value,
    #[serde(rename = "both")]
    Both,
}

/// Snapshot request parameters, deserialized straight from the admin
/// endpoint's query string.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotQuery {
    /// Maximum entries returned; 0 means no cap
    pub limit: usize,
    pub sort_by: SortField,
    pub sort_dir: SortDir,
    /// Case-insensitive pattern; empty or absent means no filtering
    pub filter: Option<String>,
    pub filter_scope: FilterScope,
    /// Interpret the pattern as a regular expression instead of a literal
    /// substring
    pub filter_regex: bool,
}

impl Default for SnapshotQuery {
    fn default() -> Self {
        Self {
            limit: 1000,
            sort_by: SortField::Key,
            sort_dir: SortDir::Asc,
            filter: None,
            filter_scope: FilterScope::Key,
            filter_regex: false,
        }
    }
}

// == Snapshot Assembly ==
/// Filters, counts, sorts, and caps the collected entries.
pub fn apply(mut entries: Vec<CacheEntry>, query: &SnapshotQuery) -> Result<(Vec<CacheEntry>, u64)> {
    if let Some(pattern) = query.filter.as_deref().filter(|p| !p.is_empty()) {
        entries = filter_entries(entries, pattern, query.filter_scope, query.filter_regex)?;
    }
    let matched = entries.len() as u64;

    sort_entries(&mut entries, query.sort_by, query.sort_dir);

    if query.limit > 0 && entries.len() > query.limit {
        entries.truncate(query.limit);
    }
    Ok((entries, matched))
}

fn filter_entries(
    entries: Vec<CacheEntry>,
    pattern: &str,
    scope: FilterScope,
    as_regex: bool,
) -> Result<Vec<CacheEntry>> {
    let matcher: Box<dyn Fn(&str) -> bool> = if as_regex {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| CacheError::Validation(format!("invalid filter regex: {}", e)))?;
        Box::new(move |text: &str| regex.is_match(text))
    } else {
        let needle = pattern.to_lowercase();
        Box::new(move |text: &str| text.to_lowercase().contains(&needle))
    };

    Ok(entries
        .into_iter()
        .filter(|entry| match scope {
            FilterScope::Key => matcher(&entry.key),
            FilterScope::Value => matcher(&entry.value),
            FilterScope::Both => matcher(&entry.key) || matcher(&entry.value),
        })
        .collect())
}

fn sort_entries(entries: &mut [CacheEntry], field: SortField, dir: SortDir) {
    entries.sort_by(|a, b| {
        let ordering = match field {
            SortField::Key => compare_text(&a.key, &b.key),
            SortField::Value => compare_text(&a.value, &b.value),
            SortField::LoadedAt => a.loaded_at_millis.cmp(&b.loaded_at_millis),
            SortField::AccessCount => a.access_count.cmp(&b.access_count),
        };
        match dir {
            SortDir::Asc => ordering,
            SortDir::Desc => ordering.reverse(),
        }
    });
}

/// Case-insensitive comparison with the exact text as a tie breaker so the
/// ordering stays total.
fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}
