//! # In-Memory Word Index
//!
//! Purpose: Back the mock server with a tiny collection → bucket → object
//! store where each object keeps the set of lower-cased words pushed for it.
//!
//! ## Design Principles
//! 1. **Single Lock**: One `parking_lot::RwLock` guards the whole tree; the
//!    server is a test double, not a search engine.
//! 2. **Deterministic Output**: Ordered maps keep query and suggest results
//!    stable across runs.
//!
//! ```text
//! Index
//!   └── collections: RwLock<BTreeMap<collection, Collection>>
//!         └── Collection = BTreeMap<bucket, Bucket>
//!               └── Bucket = BTreeMap<object, BTreeSet<word>>
//! ```

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;

type Bucket = BTreeMap<String, BTreeSet<String>>;
type Collection = BTreeMap<String, Bucket>;

#[derive(Debug, Default)]
pub struct Index {
    collections: RwLock<BTreeMap<String, Collection>>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the words of `text` to an object.
    pub fn push(&self, collection: &str, bucket: &str, object: &str, text: &str) {
        let words: Vec<String> = tokenize(text).collect();
        if words.is_empty() {
            return;
        }

        let mut collections = self.collections.write();
        collections
            .entry(collection.to_string())
            .or_default()
            .entry(bucket.to_string())
            .or_default()
            .entry(object.to_string())
            .or_default()
            .extend(words);
    }

    /// Removes the words of `text` from an object and returns how many were
    /// present. Emptied objects, buckets and collections disappear.
    pub fn pop(&self, collection: &str, bucket: &str, object: &str, text: &str) -> u64 {
        let mut collections = self.collections.write();
        let Some(buckets) = collections.get_mut(collection) else {
            return 0;
        };
        let Some(objects) = buckets.get_mut(bucket) else {
            return 0;
        };
        let Some(words) = objects.get_mut(object) else {
            return 0;
        };

        let removed = tokenize(text).filter(|word| words.remove(word)).count() as u64;

        if words.is_empty() {
            objects.remove(object);
        }
        if objects.is_empty() {
            buckets.remove(bucket);
        }
        if buckets.is_empty() {
            collections.remove(collection);
        }
        removed
    }

    /// Buckets in a collection, objects in a bucket or words in an object,
    /// depending on how deep the path goes.
    pub fn count(&self, collection: &str, bucket: Option<&str>, object: Option<&str>) -> u64 {
        let collections = self.collections.read();
        let Some(buckets) = collections.get(collection) else {
            return 0;
        };
        let Some(bucket) = bucket else {
            return buckets.len() as u64;
        };
        let Some(objects) = buckets.get(bucket) else {
            return 0;
        };
        match object {
            None => objects.len() as u64,
            Some(object) => objects.get(object).map_or(0, |words| words.len() as u64),
        }
    }

    /// Drops a collection; returns the number of objects it held.
    pub fn flush_collection(&self, collection: &str) -> u64 {
        self.collections
            .write()
            .remove(collection)
            .map_or(0, |buckets| buckets.values().map(|objects| objects.len() as u64).sum())
    }

    /// Drops a bucket; returns the number of objects it held.
    pub fn flush_bucket(&self, collection: &str, bucket: &str) -> u64 {
        let mut collections = self.collections.write();
        let Some(buckets) = collections.get_mut(collection) else {
            return 0;
        };
        let flushed = buckets.remove(bucket).map_or(0, |objects| objects.len() as u64);
        if buckets.is_empty() {
            collections.remove(collection);
        }
        flushed
    }

    /// Drops an object; returns the number of words it held.
    pub fn flush_object(&self, collection: &str, bucket: &str, object: &str) -> u64 {
        let mut collections = self.collections.write();
        let Some(buckets) = collections.get_mut(collection) else {
            return 0;
        };
        let Some(objects) = buckets.get_mut(bucket) else {
            return 0;
        };
        let flushed = objects.remove(object).map_or(0, |words| words.len() as u64);
        if objects.is_empty() {
            buckets.remove(bucket);
        }
        if buckets.is_empty() {
            collections.remove(collection);
        }
        flushed
    }

    /// Objects whose words include every word of `terms`, in object order.
    pub fn query(
        &self,
        collection: &str,
        bucket: &str,
        terms: &str,
        limit: usize,
        offset: usize,
    ) -> Vec<String> {
        let terms: Vec<String> = tokenize(terms).collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let collections = self.collections.read();
        let Some(objects) = collections.get(collection).and_then(|buckets| buckets.get(bucket))
        else {
            return Vec::new();
        };

        objects
            .iter()
            .filter(|(_, words)| terms.iter().all(|term| words.contains(term)))
            .map(|(object, _)| object.clone())
            .skip(offset)
            .take(limit)
            .collect()
    }

    /// Distinct indexed words starting with `prefix`, in lexical order.
    pub fn suggest(&self, collection: &str, bucket: &str, prefix: &str, limit: usize) -> Vec<String> {
        let Some(prefix) = tokenize(prefix).next() else {
            return Vec::new();
        };

        let collections = self.collections.read();
        let Some(objects) = collections.get(collection).and_then(|buckets| buckets.get(bucket))
        else {
            return Vec::new();
        };

        let matches: BTreeSet<&String> = objects
            .values()
            .flat_map(|words| words.iter())
            .filter(|word| word.starts_with(prefix.as_str()))
            .collect();
        matches.into_iter().take(limit).cloned().collect()
    }
}

/// Lower-cased alphanumeric runs of `text`.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
}
