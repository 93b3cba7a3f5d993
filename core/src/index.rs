//! Index store boundary.
//!
//! The index store is an external key-value service offering sets, sorted sets
//! (member → numeric score), string snapshots and atomic batch execution. The
//! shows projection built on it is derived and disposable: any of it may be
//! missing or stale, and callers must treat every [`IndexError`] as a reason to
//! fall back to the primary record store or to log and continue.
//!
//! # Key layout
//!
//! | Key                          | Structure  | Content                         |
//! |------------------------------|------------|---------------------------------|
//! | `shows:location:{location}`  | set        | ids at a lower-cased location   |
//! | `shows:price`                | sorted set | id → price                      |
//! | `shows:availability`         | sorted set | id → available tickets          |
//! | `shows:search:{token}`       | set        | ids whose name/details have it  |
//! | `shows:all`                  | set        | every indexed id                |
//! | `show:{id}`                  | string     | JSON [`ShowView`] snapshot      |
//!
//! [`ShowView`]: crate::show::ShowView

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

/// Error type for index store operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Store unreachable or command rejected
    #[error("Index store unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be interpreted
    #[error("Corrupt index data: {0}")]
    Corrupt(String),
}

/// Result type for index store operations.
pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// Boxed future returned by [`IndexStore`] methods.
pub type IndexFuture<'a, T> = Pin<Box<dyn Future<Output = IndexResult<T>> + Send + 'a>>;

/// Inclusive score interval for sorted-set range queries.
///
/// Missing bounds are infinite.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoreRange {
    /// Inclusive lower bound
    pub min: f64,
    /// Inclusive upper bound
    pub max: f64,
}

impl ScoreRange {
    /// `[min, max]` with either side optionally unbounded.
    #[must_use]
    pub fn between(min: Option<u32>, max: Option<u32>) -> Self {
        Self {
            min: min.map_or(f64::NEG_INFINITY, f64::from),
            max: max.map_or(f64::INFINITY, f64::from),
        }
    }

    /// `[min, +inf)`
    #[must_use]
    pub fn at_least(min: u32) -> Self {
        Self::between(Some(min), None)
    }

    /// Whether `score` lies inside the interval.
    #[must_use]
    pub fn contains(&self, score: f64) -> bool {
        self.min <= score && score <= self.max
    }
}

/// A single mutation inside an [`IndexBatch`].
#[derive(Clone, Debug, PartialEq)]
pub enum IndexOp {
    /// Add members to a set
    SetAdd {
        /// Set key
        key: String,
        /// Members to add
        members: Vec<String>,
    },
    /// Remove a member from a set
    SetRemove {
        /// Set key
        key: String,
        /// Member to remove
        member: String,
    },
    /// Insert or rescore a sorted-set member
    SortedUpsert {
        /// Sorted-set key
        key: String,
        /// Member
        member: String,
        /// New score
        score: f64,
    },
    /// Remove a sorted-set member
    SortedRemove {
        /// Sorted-set key
        key: String,
        /// Member
        member: String,
    },
    /// Write a string value
    Put {
        /// Key
        key: String,
        /// Value
        value: String,
    },
    /// Delete a key of any type
    Delete {
        /// Key
        key: String,
    },
}

/// Ordered list of mutations applied all-or-nothing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndexBatch {
    ops: Vec<IndexOp>,
}

impl IndexBatch {
    /// Create an empty batch
    #[must_use]
    pub const fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Add one member to a set.
    #[must_use]
    pub fn set_add(self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.push(IndexOp::SetAdd {
            key: key.into(),
            members: vec![member.into()],
        })
    }

    /// Remove one member from a set.
    #[must_use]
    pub fn set_remove(self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.push(IndexOp::SetRemove {
            key: key.into(),
            member: member.into(),
        })
    }

    /// Insert or rescore a sorted-set member.
    #[must_use]
    pub fn sorted_upsert(self, key: impl Into<String>, member: impl Into<String>, score: f64) -> Self {
        self.push(IndexOp::SortedUpsert {
            key: key.into(),
            member: member.into(),
            score,
        })
    }

    /// Remove a sorted-set member.
    #[must_use]
    pub fn sorted_remove(self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.push(IndexOp::SortedRemove {
            key: key.into(),
            member: member.into(),
        })
    }

    /// Write a string value.
    #[must_use]
    pub fn put(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(IndexOp::Put {
            key: key.into(),
            value: value.into(),
        })
    }

    /// Delete a key.
    #[must_use]
    pub fn delete(self, key: impl Into<String>) -> Self {
        self.push(IndexOp::Delete { key: key.into() })
    }

    /// Append an arbitrary operation.
    #[must_use]
    pub fn push(mut self, op: IndexOp) -> Self {
        self.ops.push(op);
        self
    }

    /// Operations in submission order.
    #[must_use]
    pub fn ops(&self) -> &[IndexOp] {
        &self.ops
    }

    /// Number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch has no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl IntoIterator for IndexBatch {
    type Item = IndexOp;
    type IntoIter = std::vec::IntoIter<IndexOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

/// Key-value index store: sets, sorted sets, strings and atomic batches.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `impl Future`
/// so that components can hold an `Arc<dyn IndexStore>` chosen by the
/// composition root (Redis in production, in-memory in tests).
pub trait IndexStore: Send + Sync {
    /// Members of a set (empty when the key does not exist).
    fn set_members<'a>(&'a self, key: &'a str) -> IndexFuture<'a, HashSet<String>>;

    /// Cardinality of a set.
    fn set_card<'a>(&'a self, key: &'a str) -> IndexFuture<'a, u64>;

    /// Intersection of several sets, computed store-side.
    ///
    /// An empty key list yields an empty set.
    fn intersect<'a>(&'a self, keys: &'a [String]) -> IndexFuture<'a, HashSet<String>>;

    /// Sorted-set members whose score lies in `range` (inclusive).
    fn range_by_score<'a>(&'a self, key: &'a str, range: ScoreRange) -> IndexFuture<'a, Vec<String>>;

    /// Scores of `members` in a sorted set, positional; `None` for absent members.
    fn scores<'a>(&'a self, key: &'a str, members: &'a [String]) -> IndexFuture<'a, Vec<Option<f64>>>;

    /// Cardinality of a sorted set.
    fn sorted_card<'a>(&'a self, key: &'a str) -> IndexFuture<'a, u64>;

    /// Read a string value.
    fn get<'a>(&'a self, key: &'a str) -> IndexFuture<'a, Option<String>>;

    /// Read many string values in one round trip; the result is positional.
    fn get_many<'a>(&'a self, keys: &'a [String]) -> IndexFuture<'a, Vec<Option<String>>>;

    /// Write a string value.
    fn put<'a>(&'a self, key: &'a str, value: &'a str) -> IndexFuture<'a, ()>;

    /// Delete a key.
    fn delete<'a>(&'a self, key: &'a str) -> IndexFuture<'a, ()>;

    /// Remove members from a set.
    fn set_remove<'a>(&'a self, key: &'a str, members: &'a [String]) -> IndexFuture<'a, ()>;

    /// All keys starting with `prefix`.
    fn scan_prefix<'a>(&'a self, prefix: &'a str) -> IndexFuture<'a, Vec<String>>;

    /// Apply every operation of `batch` atomically.
    fn execute(&self, batch: IndexBatch) -> IndexFuture<'_, ()>;
}

/// Key names for the shows projection.
pub mod keys {
    /// Set of every indexed show.
    pub const ALL_SHOWS: &str = "shows:all";
    /// Sorted set of shows by price.
    pub const PRICE: &str = "shows:price";
    /// Sorted set of shows by available tickets.
    pub const AVAILABILITY: &str = "shows:availability";
    /// Prefix of per-location sets.
    pub const LOCATION_PREFIX: &str = "shows:location:";
    /// Prefix of per-token sets.
    pub const TERM_PREFIX: &str = "shows:search:";
    /// Prefix of show snapshots.
    pub const SNAPSHOT_PREFIX: &str = "show:";

    /// Case-folded, trimmed location.
    #[must_use]
    pub fn normalize_location(location: &str) -> String {
        location.trim().to_lowercase()
    }

    /// Set key for a location (normalized here).
    #[must_use]
    pub fn location(location: &str) -> String {
        format!("{LOCATION_PREFIX}{}", normalize_location(location))
    }

    /// Set key for an already-normalized token.
    #[must_use]
    pub fn term(token: &str) -> String {
        format!("{TERM_PREFIX}{token}")
    }

    /// Snapshot key for a show id (typed or as stored in a set).
    #[must_use]
    pub fn snapshot(id: impl std::fmt::Display) -> String {
        format!("{SNAPSHOT_PREFIX}{id}")
    }
}
