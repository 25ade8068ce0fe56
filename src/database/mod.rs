//! Catalog of diff managers keyed by (scraper, term).
//!
//! One instance per process. A single `RwLock` covers the whole catalog:
//! `ingest` is the only writer, readers take the shared lock just long enough
//! to clone `Arc` payloads out of the target manager. No I/O happens while
//! the lock is held.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diff::manager::{DiffManager, DiffSince};
use crate::diff::Tree;
use crate::utils::unix_timestamp;

/// One slot of a term sort key. Same-type slots compare natively; mixed-type
/// slots fall back to a stable type rank (bool < int < string) so ordering is
/// total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortKeyPart {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl SortKeyPart {
    fn type_rank(&self) -> u8 {
        match self {
            Self::Bool(_) => 0,
            Self::Int(_) => 1,
            Self::Str(_) => 2,
        }
    }
}

impl Ord for SortKeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl PartialOrd for SortKeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Identifies and orders an academic term. `term_sort_key` compares
/// lexicographically; the maximum across a scraper's terms is its "most
/// recent" term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermDescriptor {
    pub term_code: String,
    pub term_name: String,
    pub term_sort_key: Vec<SortKeyPart>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    /// The scraper has never delivered data.
    #[error("data not available yet")]
    Unavailable,
    #[error("no such scraper: {0}")]
    UnknownScraper(String),
    #[error("no such term: {0}")]
    UnknownTerm(String),
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub diff: DiffSince,
    pub term: TermDescriptor,
}

#[derive(Debug, Default)]
pub struct Database {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    managers: HashMap<String, HashMap<String, DiffManager>>,
    terms: HashMap<String, HashMap<String, TermDescriptor>>,
    most_recent: HashMap<String, TermDescriptor>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive course data from a scraper, stamped with the current UNIX
    /// time. Returns the age assigned to the snapshot.
    pub fn ingest(&self, scraper_id: &str, term: TermDescriptor, courses: Tree) -> i64 {
        self.ingest_at(unix_timestamp(), scraper_id, term, courses)
    }

    /// Clock-free variant of [`Database::ingest`], used by cache seeding and
    /// tests. The age is clamped to the manager's current age so a backwards
    /// wall clock degrades to an equal-age update instead of aborting.
    pub fn ingest_at(&self, age: i64, scraper_id: &str, term: TermDescriptor, courses: Tree) -> i64 {
        let mut inner = self.inner.write().expect("database lock poisoned");
        let manager = inner
            .managers
            .entry(scraper_id.to_owned())
            .or_default()
            .entry(term.term_code.clone())
            .or_default();
        let age = manager
            .get_snapshot()
            .map_or(age, |(current, _)| age.max(current));
        manager.set_current(age, courses);

        let terms = inner.terms.entry(scraper_id.to_owned()).or_default();
        terms.insert(term.term_code.clone(), term);
        let most_recent = terms
            .values()
            .max_by(|a, b| a.term_sort_key.cmp(&b.term_sort_key))
            .cloned()
            .expect("a term was just inserted");
        inner.most_recent.insert(scraper_id.to_owned(), most_recent);
        age
    }

    /// Resolve a client query to the right diff manager.
    ///
    /// The requested term defaults to the scraper's most recent one. A diff
    /// can only be served within a single term: when the client's current
    /// term differs from the requested term, `since` is dropped and the full
    /// snapshot is returned.
    pub fn query(
        &self,
        scraper_id: &str,
        since: Option<i64>,
        current_term_code: Option<&str>,
        requested_term_code: Option<&str>,
    ) -> Result<QueryResult, QueryError> {
        let inner = self.inner.read().expect("database lock poisoned");
        let most_recent = inner
            .most_recent
            .get(scraper_id)
            .ok_or(QueryError::Unavailable)?;
        let requested = requested_term_code.unwrap_or(&most_recent.term_code);
        let since = if current_term_code == Some(requested) {
            since
        } else {
            None
        };
        let manager = inner
            .managers
            .get(scraper_id)
            .ok_or_else(|| QueryError::UnknownScraper(scraper_id.to_owned()))?
            .get(requested)
            .ok_or_else(|| QueryError::UnknownTerm(requested.to_owned()))?;
        let diff = manager
            .get_diff_since(since)
            .ok_or(QueryError::Unavailable)?;
        let term = inner.terms[scraper_id][requested].clone();
        Ok(QueryResult { diff, term })
    }

    /// The current snapshot for one (scraper, term), used by the refresh
    /// worker to feed the previous tree to the scraper.
    pub fn get_snapshot(&self, scraper_id: &str, term_code: &str) -> Option<(i64, Arc<Tree>)> {
        let inner = self.inner.read().expect("database lock poisoned");
        inner
            .managers
            .get(scraper_id)?
            .get(term_code)?
            .get_snapshot()
    }
}
