/*
 * Copyright (C) 2026 Mark Wells Dev
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Bounded, timestamp-ordered cache of per-document token snapshots.

use std::collections::HashMap;
use std::time::Instant;

/// One cached tokenization result for a document at a specific version.
#[derive(Debug, Clone)]
pub struct TokenCacheEntry {
    /// Document version this entry was computed for.
    pub version: i64,
    /// The ordered token sequence.
    pub split_tokens: Vec<String>,
    timestamp: Instant,
}

/// An LRU-by-timestamp cache keyed by document URI.
pub struct TokenCache {
    entries: HashMap<String, TokenCacheEntry>,
    max_size: usize,
}

impl TokenCache {
    /// Creates an empty cache bounded to `max_size` entries.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_size,
        }
    }

    /// Returns the cached entry for `uri` if one exists and its stored
    /// version matches `version`. A version mismatch is treated as a miss:
    /// the caller must fall back to full tokenization.
    #[must_use]
    pub fn get(&self, uri: &str, version: i64) -> Option<&TokenCacheEntry> {
        self.entries
            .get(uri)
            .filter(|entry| entry.version == version)
    }

    /// Inserts or replaces the entry for `uri`, then evicts the
    /// oldest-timestamped entries until the cache is back within
    /// `max_size`.
    pub fn put(&mut self, uri: impl Into<String>, version: i64, split_tokens: Vec<String>) {
        self.entries.insert(
            uri.into(),
            TokenCacheEntry {
                version,
                split_tokens,
                timestamp: Instant::now(),
            },
        );
        self.evict_if_over_capacity();
    }

    fn evict_if_over_capacity(&mut self) {
        while self.entries.len() > self.max_size {
            let oldest_key = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.timestamp)
                .map(|(uri, _)| uri.clone());
            let Some(oldest_key) = oldest_key else {
                break;
            };
            self.entries.remove(&oldest_key);
        }
    }

    /// Removes the entry for `uri`, if any.
    pub fn invalidate(&mut self, uri: &str) {
        self.entries.remove(uri);
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache currently holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn get_returns_none_for_mismatched_version() {
        let mut cache = TokenCache::new(10);
        cache.put("file:///a.pike", 1, vec!["int".to_string()]);
        assert!(cache.get("file:///a.pike", 2).is_none());
        assert!(cache.get("file:///a.pike", 1).is_some());
    }

    #[test]
    fn invalidate_then_get_is_a_miss() {
        let mut cache = TokenCache::new(10);
        cache.put("file:///a.pike", 1, vec!["int".to_string()]);
        cache.invalidate("file:///a.pike");
        assert!(cache.get("file:///a.pike", 1).is_none());
    }

    #[test]
    fn invalidate_then_put_then_get_roundtrips() {
        let mut cache = TokenCache::new(10);
        cache.put("file:///a.pike", 1, vec!["int".to_string()]);
        cache.invalidate("file:///a.pike");
        cache.put("file:///a.pike", 2, vec!["float".to_string()]);
        let entry = cache.get("file:///a.pike", 2).expect("entry present");
        assert_eq!(entry.split_tokens, vec!["float".to_string()]);
    }

    #[test]
    fn evicts_oldest_entry_when_over_capacity() {
        let mut cache = TokenCache::new(3);
        cache.put("file:///a.pike", 1, vec![]);
        sleep(Duration::from_millis(2));
        cache.put("file:///b.pike", 1, vec![]);
        sleep(Duration::from_millis(2));
        cache.put("file:///c.pike", 1, vec![]);
        sleep(Duration::from_millis(2));
        cache.put("file:///d.pike", 1, vec![]);

        assert_eq!(cache.len(), 3);
        assert!(cache.get("file:///a.pike", 1).is_none());
        assert!(cache.get("file:///b.pike", 1).is_some());
        assert!(cache.get("file:///c.pike", 1).is_some());
        assert!(cache.get("file:///d.pike", 1).is_some());
    }

    #[test]
    fn clear_empties_the_cache() {
        let mut cache = TokenCache::new(10);
        cache.put("file:///a.pike", 1, vec![]);
        cache.clear();
        assert!(cache.is_empty());
    }
}
