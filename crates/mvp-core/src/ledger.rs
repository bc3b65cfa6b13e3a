//! Announcement ledgers: which kills have already been announced.
//!
//! An [`AnnouncementLedger`] maps a deduplication key to the wall-clock time
//! the announcement was sent. Keys are inserted at most once; eviction is
//! purely by time since insertion, never by kill time.

use std::collections::BTreeMap;

use chrono::{NaiveDateTime, TimeDelta};

/// Set of announced keys with their send times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncementLedger<K: Ord> {
    entries: BTreeMap<K, NaiveDateTime>,
}

impl<K: Ord> Default for AnnouncementLedger<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord> AnnouncementLedger<K> {
    /// Create an empty ledger.
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Whether `key` has been announced and not yet evicted.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Record `key` as announced at `at`.
    ///
    /// Returns `false` and leaves the first send time untouched if the key
    /// is already present.
    pub fn insert(&mut self, key: K, at: NaiveDateTime) -> bool {
        match self.entries.entry(key) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(at);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Drop every entry announced more than `retention` before `now`.
    ///
    /// Returns the number of entries removed.
    pub fn evict_older_than(&mut self, now: NaiveDateTime, retention: TimeDelta) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, at| now.signed_duration_since(*at) <= retention);
        before.saturating_sub(self.entries.len())
    }

    /// Number of entries held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
