// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::ids::ColumnId;
use crate::model::ColumnData;

pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, PartialEq)]
struct CacheEntry {
    data: ColumnData,
    captured_at: Instant,
}

/// Column values keyed by column name only. Entries are served while
/// younger than the TTL and evicted on the first access after that.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnCache {
    ttl: Duration,
    entries: BTreeMap<ColumnId, CacheEntry>,
}

impl Default for ColumnCache {
    fn default() -> Self {
        Self::new(CACHE_TTL)
    }
}

impl ColumnCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: BTreeMap::new(),
        }
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&mut self, column: &str, now: Instant) -> Option<&ColumnData> {
        let captured_at = self.entries.get(column)?.captured_at;
        if now.saturating_duration_since(captured_at) >= self.ttl {
            self.entries.remove(column);
            debug!(column, "column cache entry expired");
            return None;
        }
        self.entries.get(column).map(|entry| &entry.data)
    }

    pub fn is_valid(&mut self, column: &str, now: Instant) -> bool {
        self.get(column, now).is_some()
    }

    pub fn insert(&mut self, column: ColumnId, data: ColumnData, now: Instant) {
        self.entries.insert(
            column,
            CacheEntry {
                data,
                captured_at: now,
            },
        );
    }

    /// Drops one column, or everything when `column` is `None`.
    pub fn clear(&mut self, column: Option<&str>) {
        match column {
            Some(column) => {
                self.entries.remove(column);
            }
            None => self.entries.clear(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
