//! In-memory index store testing utilities
//!
//! Provides fast, deterministic stand-ins for the key-value index store:
//! - [`InMemoryIndexStore`]: `HashMap`-backed sets, sorted sets and strings
//! - [`FlakyIndexStore`]: wraps a store and fails every call while switched off

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use theater_core::index::{
    IndexBatch, IndexError, IndexFuture, IndexOp, IndexStore, ScoreRange,
};

#[derive(Debug, Default)]
struct IndexData {
    sets: HashMap<String, HashSet<String>>,
    sorted: HashMap<String, HashMap<String, f64>>,
    strings: HashMap<String, String>,
}

impl IndexData {
    fn apply(&mut self, op: IndexOp) {
        match op {
            IndexOp::SetAdd { key, members } => {
                self.sets.entry(key).or_default().extend(members);
            }
            IndexOp::SetRemove { key, member } => self.set_remove(&key, &member),
            IndexOp::SortedUpsert { key, member, score } => {
                self.sorted.entry(key).or_default().insert(member, score);
            }
            IndexOp::SortedRemove { key, member } => {
                if let Some(entries) = self.sorted.get_mut(&key) {
                    entries.remove(&member);
                    if entries.is_empty() {
                        self.sorted.remove(&key);
                    }
                }
            }
            IndexOp::Put { key, value } => {
                self.strings.insert(key, value);
            }
            IndexOp::Delete { key } => {
                self.sets.remove(&key);
                self.sorted.remove(&key);
                self.strings.remove(&key);
            }
        }
    }

    // Empty collections disappear, as they do in Redis.
    fn set_remove(&mut self, key: &str, member: &str) {
        if let Some(members) = self.sets.get_mut(key) {
            members.remove(member);
            if members.is_empty() {
                self.sets.remove(key);
            }
        }
    }
}

/// In-memory index store for fast, deterministic testing.
///
/// Batches are applied under a single write lock, so they are atomic with
/// respect to every other call.
///
/// # Example
///
/// ```
/// use theater_testing::InMemoryIndexStore;
/// use theater_core::index::{IndexBatch, IndexStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryIndexStore::new();
///
/// store.execute(IndexBatch::new().set_add("shows:all", "42")).await?;
///
/// assert_eq!(store.members("shows:all"), vec!["42".to_string()]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryIndexStore {
    data: Arc<RwLock<IndexData>>,
}

impl InMemoryIndexStore {
    /// Create a new empty in-memory index store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every key (simulates a flushed index).
    pub fn clear(&self) {
        let mut data = self.data.write().unwrap();
        data.sets.clear();
        data.sorted.clear();
        data.strings.clear();
    }

    /// Check if a key of any type exists
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        let data = self.data.read().unwrap();
        data.sets.contains_key(key) || data.sorted.contains_key(key) || data.strings.contains_key(key)
    }

    /// Sorted members of a set (empty when absent).
    #[must_use]
    pub fn members(&self, key: &str) -> Vec<String> {
        let data = self.data.read().unwrap();
        let mut members: Vec<String> = data
            .sets
            .get(key)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Score of a sorted-set member.
    #[must_use]
    pub fn score(&self, key: &str, member: &str) -> Option<f64> {
        self.data
            .read()
            .unwrap()
            .sorted
            .get(key)
            .and_then(|entries| entries.get(member).copied())
    }

    /// Raw string value.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.data.read().unwrap().strings.get(key).cloned()
    }

    /// Every key, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let data = self.data.read().unwrap();
        let mut keys: Vec<String> = data
            .sets
            .keys()
            .chain(data.sorted.keys())
            .chain(data.strings.keys())
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

impl IndexStore for InMemoryIndexStore {
    fn set_members<'a>(&'a self, key: &'a str) -> IndexFuture<'a, HashSet<String>> {
        Box::pin(async move {
            Ok(self
                .data
                .read()
                .unwrap()
                .sets
                .get(key)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn set_card<'a>(&'a self, key: &'a str) -> IndexFuture<'a, u64> {
        Box::pin(async move {
            let data = self.data.read().unwrap();
            Ok(data.sets.get(key).map_or(0, |m| m.len() as u64))
        })
    }

    fn intersect<'a>(&'a self, keys: &'a [String]) -> IndexFuture<'a, HashSet<String>> {
        Box::pin(async move {
            let data = self.data.read().unwrap();
            let Some((first, rest)) = keys.split_first() else {
                return Ok(HashSet::new());
            };
            let mut result = data.sets.get(first).cloned().unwrap_or_default();
            for key in rest {
                match data.sets.get(key) {
                    Some(members) => result.retain(|m| members.contains(m)),
                    None => result.clear(),
                }
            }
            Ok(result)
        })
    }

    fn range_by_score<'a>(&'a self, key: &'a str, range: ScoreRange) -> IndexFuture<'a, Vec<String>> {
        Box::pin(async move {
            let data = self.data.read().unwrap();
            let mut hits: Vec<(f64, String)> = data
                .sorted
                .get(key)
                .map(|entries| {
                    entries
                        .iter()
                        .filter(|(_, score)| range.contains(**score))
                        .map(|(member, score)| (*score, member.clone()))
                        .collect()
                })
                .unwrap_or_default();
            hits.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
            Ok(hits.into_iter().map(|(_, member)| member).collect())
        })
    }

    fn scores<'a>(&'a self, key: &'a str, members: &'a [String]) -> IndexFuture<'a, Vec<Option<f64>>> {
        Box::pin(async move {
            let data = self.data.read().unwrap();
            let entries = data.sorted.get(key);
            Ok(members
                .iter()
                .map(|m| entries.and_then(|e| e.get(m).copied()))
                .collect())
        })
    }

    fn sorted_card<'a>(&'a self, key: &'a str) -> IndexFuture<'a, u64> {
        Box::pin(async move {
            let data = self.data.read().unwrap();
            Ok(data.sorted.get(key).map_or(0, |m| m.len() as u64))
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> IndexFuture<'a, Option<String>> {
        Box::pin(async move { Ok(self.data.read().unwrap().strings.get(key).cloned()) })
    }

    fn get_many<'a>(&'a self, keys: &'a [String]) -> IndexFuture<'a, Vec<Option<String>>> {
        Box::pin(async move {
            let data = self.data.read().unwrap();
            Ok(keys.iter().map(|k| data.strings.get(k).cloned()).collect())
        })
    }

    fn put<'a>(&'a self, key: &'a str, value: &'a str) -> IndexFuture<'a, ()> {
        Box::pin(async move {
            self.data
                .write()
                .unwrap()
                .strings
                .insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> IndexFuture<'a, ()> {
        Box::pin(async move {
            self.data.write().unwrap().apply(IndexOp::Delete {
                key: key.to_string(),
            });
            Ok(())
        })
    }

    fn set_remove<'a>(&'a self, key: &'a str, members: &'a [String]) -> IndexFuture<'a, ()> {
        Box::pin(async move {
            let mut data = self.data.write().unwrap();
            for member in members {
                data.set_remove(key, member);
            }
            Ok(())
        })
    }

    fn scan_prefix<'a>(&'a self, prefix: &'a str) -> IndexFuture<'a, Vec<String>> {
        Box::pin(async move {
            Ok(self
                .keys()
                .into_iter()
                .filter(|k| k.starts_with(prefix))
                .collect())
        })
    }

    fn execute(&self, batch: IndexBatch) -> IndexFuture<'_, ()> {
        Box::pin(async move {
            let mut data = self.data.write().unwrap();
            for op in batch {
                data.apply(op);
            }
            Ok(())
        })
    }
}

/// Index store that can be switched into a failing state.
///
/// While failing, every call returns [`IndexError::Unavailable`] without
/// touching the wrapped store. Useful for proving that searches fall back and
/// that writes never fail because indexing failed.
#[derive(Clone, Debug, Default)]
pub struct FlakyIndexStore {
    inner: InMemoryIndexStore,
    failing: Arc<AtomicBool>,
    rejected: Arc<AtomicU64>,
}

impl FlakyIndexStore {
    /// Wrap `inner`, initially healthy.
    #[must_use]
    pub fn new(inner: InMemoryIndexStore) -> Self {
        Self {
            inner,
            failing: Arc::new(AtomicBool::new(false)),
            rejected: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Switch failure mode on or off.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Calls rejected so far.
    #[must_use]
    pub fn rejected_calls(&self) -> u64 {
        self.rejected.load(Ordering::SeqCst)
    }

    /// The wrapped store, for assertions.
    #[must_use]
    pub const fn inner(&self) -> &InMemoryIndexStore {
        &self.inner
    }

    fn check(&self) -> Result<(), IndexError> {
        if self.failing.load(Ordering::SeqCst) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(IndexError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

impl IndexStore for FlakyIndexStore {
    fn set_members<'a>(&'a self, key: &'a str) -> IndexFuture<'a, HashSet<String>> {
        Box::pin(async move {
            self.check()?;
            self.inner.set_members(key).await
        })
    }

    fn set_card<'a>(&'a self, key: &'a str) -> IndexFuture<'a, u64> {
        Box::pin(async move {
            self.check()?;
            self.inner.set_card(key).await
        })
    }

    fn intersect<'a>(&'a self, keys: &'a [String]) -> IndexFuture<'a, HashSet<String>> {
        Box::pin(async move {
            self.check()?;
            self.inner.intersect(keys).await
        })
    }

    fn range_by_score<'a>(&'a self, key: &'a str, range: ScoreRange) -> IndexFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.check()?;
            self.inner.range_by_score(key, range).await
        })
    }

    fn scores<'a>(&'a self, key: &'a str, members: &'a [String]) -> IndexFuture<'a, Vec<Option<f64>>> {
        Box::pin(async move {
            self.check()?;
            self.inner.scores(key, members).await
        })
    }

    fn sorted_card<'a>(&'a self, key: &'a str) -> IndexFuture<'a, u64> {
        Box::pin(async move {
            self.check()?;
            self.inner.sorted_card(key).await
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> IndexFuture<'a, Option<String>> {
        Box::pin(async move {
            self.check()?;
            self.inner.get(key).await
        })
    }

    fn get_many<'a>(&'a self, keys: &'a [String]) -> IndexFuture<'a, Vec<Option<String>>> {
        Box::pin(async move {
            self.check()?;
            self.inner.get_many(keys).await
        })
    }

    fn put<'a>(&'a self, key: &'a str, value: &'a str) -> IndexFuture<'a, ()> {
        Box::pin(async move {
            self.check()?;
            self.inner.put(key, value).await
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> IndexFuture<'a, ()> {
        Box::pin(async move {
            self.check()?;
            self.inner.delete(key).await
        })
    }

    fn set_remove<'a>(&'a self, key: &'a str, members: &'a [String]) -> IndexFuture<'a, ()> {
        Box::pin(async move {
            self.check()?;
            self.inner.set_remove(key, members).await
        })
    }

    fn scan_prefix<'a>(&'a self, prefix: &'a str) -> IndexFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.check()?;
            self.inner.scan_prefix(prefix).await
        })
    }

    fn execute(&self, batch: IndexBatch) -> IndexFuture<'_, ()> {
        Box::pin(async move {
            self.check()?;
            self.inner.execute(batch).await
        })
    }
}
