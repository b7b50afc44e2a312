//! Response cache with dependency tags.
//!
//! Every entry may name one or more dependency tags; killing a tag drops all
//! entries stored under it. Writes to a resource kill its tag so that cached
//! reads never outlive the data they were built from.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bytes::Bytes;

/// Cache operations the service depends on.
pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Option<Bytes>;

    /// Stores `value` for `ttl` (zero means no expiry) under `dependencies`.
    fn set(&self, key: &str, value: Bytes, ttl: Duration, dependencies: &[&str]);

    fn exists(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Resets the time to live of an existing key. Returns false if absent.
    fn expire(&self, key: &str, ttl: Duration) -> bool;

    fn delete(&self, key: &str) -> bool;

    /// Drops every key stored under any of `dependencies`; returns how many.
    fn kill_by_dependency(&self, dependencies: &[&str]) -> usize;
}

struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
    tags: Vec<String>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    dependencies: HashMap<String, HashSet<String>>,
}

impl Inner {
    /// Removes `key` and unlinks it from its tags, dropping tags left empty.
    fn remove(&mut self, key: &str) -> bool {
        let Some(entry) = self.entries.remove(key) else {
            return false;
        };
        for tag in entry.tags {
            if let Some(keys) = self.dependencies.get_mut(&tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.dependencies.remove(&tag);
                }
            }
        }
        true
    }
}

/// Process-local [`Cache`].
#[derive(Default)]
pub struct MemoryCache {
    inner: Mutex<Inner>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic mid-update leaves at worst a stale entry.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().entries.values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn deadline(ttl: Duration) -> Option<Instant> {
    if ttl.is_zero() { None } else { Some(Instant::now() + ttl) }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<Bytes> {
        let mut inner = self.lock();
        let now = Instant::now();
        match inner.entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                inner.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: Bytes, ttl: Duration, dependencies: &[&str]) {
        let mut inner = self.lock();
        inner.remove(key);
        let tags = dependencies.iter().map(|d| (*d).to_owned()).collect();
        inner
            .entries
            .insert(key.to_owned(), Entry { value, expires_at: deadline(ttl), tags });
        for dependency in dependencies {
            inner
                .dependencies
                .entry((*dependency).to_owned())
                .or_default()
                .insert(key.to_owned());
        }
        tracing::trace!(key, ?dependencies, "cache set");
    }

    fn expire(&self, key: &str, ttl: Duration) -> bool {
        let mut inner = self.lock();
        let now = Instant::now();
        match inner.entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.expires_at = deadline(ttl);
                true
            }
            _ => false,
        }
    }

    fn delete(&self, key: &str) -> bool {
        self.lock().remove(key)
    }

    fn kill_by_dependency(&self, dependencies: &[&str]) -> usize {
        let mut inner = self.lock();
        let mut killed = 0;
        for dependency in dependencies {
            let Some(keys) = inner.dependencies.remove(*dependency) else {
                continue;
            };
            for key in keys {
                if inner.remove(&key) {
                    killed += 1;
                }
            }
        }
        tracing::debug!(?dependencies, killed, "cache dependencies killed");
        killed
    }
}
