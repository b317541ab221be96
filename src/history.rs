//! Bounded per-URL price history.
//!
//! Locking is two-level: an outer `RwLock` over the URL map and one `Mutex`
//! per URL. Writers for an already-known URL only take the outer lock shared,
//! so records for different URLs never wait on each other; the outer lock is
//! taken exclusively only to insert a new URL. Entries for one URL are ordered
//! by the order `record` calls complete, which under concurrency may differ
//! from the order the requests were issued.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const DEFAULT_CAPACITY: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PriceHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub prices: Vec<String>,
}

type Ring = Arc<Mutex<VecDeque<PriceHistoryEntry>>>;

#[derive(Debug)]
pub struct PriceHistoryStore {
    capacity: usize,
    entries: RwLock<HashMap<String, Ring>>,
}

impl Default for PriceHistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PriceHistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn ring(&self, url: &str) -> Ring {
        if let Some(ring) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
        {
            return Arc::clone(ring);
        }

        let mut map = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            map.entry(url.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(VecDeque::with_capacity(self.capacity)))),
        )
    }

    /// Appends a timestamped entry. Empty price lists are ignored and never
    /// create a URL slot. Returns whether anything was recorded.
    pub fn record(&self, url: &str, prices: &[String]) -> bool {
        if prices.is_empty() {
            return false;
        }

        let ring = self.ring(url);
        let mut ring = ring.lock().unwrap_or_else(PoisonError::into_inner);
        ring.push_back(PriceHistoryEntry {
            timestamp: Utc::now(),
            prices: prices.to_vec(),
        });
        while ring.len() > self.capacity {
            ring.pop_front();
        }
        tracing::debug!("💰 Recorded {} prices for {} ({} entries)", prices.len(), url, ring.len());
        true
    }

    /// Oldest first. Unknown URLs yield an empty list.
    pub fn get(&self, url: &str) -> Vec<PriceHistoryEntry> {
        let ring = match self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
        {
            Some(ring) => Arc::clone(ring),
            None => return Vec::new(),
        };
        let ring = ring.lock().unwrap_or_else(PoisonError::into_inner);
        ring.iter().cloned().collect()
    }

    pub fn tracked_urls(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
