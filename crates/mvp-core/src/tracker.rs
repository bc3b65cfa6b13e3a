//! The event tracker: decides which kills to announce.
//!
//! For every sighting in a cycle the poll loop asks [`EventTracker::evaluate`]
//! for a [`Verdict`]. Evaluation never mutates state. Only after the bus
//! accepted a notification does the loop call [`EventTracker::confirm`],
//! which records it in the matching ledger. A failed send therefore leaves
//! the ledgers untouched and the same notification is produced again on the
//! next cycle.
//!
//! # Rules
//!
//! 1. **Death**: the kill happened less than the death window ago and its
//!    kill key is not in the death ledger. Announce the death and skip the
//!    spawn rule for this sighting.
//! 2. **Spawn**: `now` is at or past the spawn time. Announce if the kill
//!    time is not in the spawn ledger, otherwise the entity is still up.
//! 3. Otherwise the entity is counting down to its spawn.
//!
//! Per kill the lifecycle is `unseen -> death announced -> spawn announced`,
//! or straight from `unseen` to `spawn announced` when the kill was first
//! seen after the death window had passed.

use chrono::{NaiveDateTime, TimeDelta};
use mvp_types::{EntityDef, KillKey, KillRecord, Notification};

use crate::ledger::AnnouncementLedger;

/// Default freshness window for death announcements.
pub const DEFAULT_DEATH_WINDOW: TimeDelta = TimeDelta::minutes(2);

/// Default ledger retention.
pub const DEFAULT_RETENTION: TimeDelta = TimeDelta::hours(6);

/// Timing parameters for an [`EventTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSettings {
    /// A kill younger than this is eligible for a death announcement.
    pub death_window: TimeDelta,
    /// Ledger entries older than this are evicted on the next sweep.
    pub retention: TimeDelta,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            death_window: DEFAULT_DEATH_WINDOW,
            retention: DEFAULT_RETENTION,
        }
    }
}

/// What the tracker wants done with one sighting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Send this notification, then [`confirm`](EventTracker::confirm) it.
    Announce(Notification),
    /// Spawn time has passed and the spawn was already announced.
    StillUp {
        /// Respawn time.
        spawn_at: NaiveDateTime,
    },
    /// The entity has not respawned yet.
    CountingDown {
        /// Respawn time.
        spawn_at: NaiveDateTime,
    },
}

/// Entries removed by one eviction sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Entries removed from the death ledger.
    pub deaths: usize,
    /// Entries removed from the spawn ledger.
    pub spawns: usize,
}

impl EvictionReport {
    /// Total entries removed.
    pub const fn total(&self) -> usize {
        self.deaths.saturating_add(self.spawns)
    }
}

/// Deduplicating state machine over kill sightings.
///
/// Owns both announcement ledgers. The death ledger is keyed by the full
/// kill key; the spawn ledger by kill time alone, so one spawn announcement
/// covers a kill however many cycles it stays up.
#[derive(Debug, Clone, Default)]
pub struct EventTracker {
    settings: TrackerSettings,
    deaths: AnnouncementLedger<KillKey>,
    spawns: AnnouncementLedger<NaiveDateTime>,
}

impl EventTracker {
    /// Create a tracker with empty ledgers.
    pub const fn new(settings: TrackerSettings) -> Self {
        Self {
            settings,
            deaths: AnnouncementLedger::new(),
            spawns: AnnouncementLedger::new(),
        }
    }

    /// Decide what to do about `record` at `now`.
    pub fn evaluate(&self, record: &KillRecord, entity: &EntityDef, now: NaiveDateTime) -> Verdict {
        if record.since_death(now) < self.settings.death_window
            && !self.deaths.contains(&record.key())
        {
            return Verdict::Announce(Notification::Death {
                entity: record.entity.clone(),
                killed_at: record.killed_at,
            });
        }

        let spawn_at = record.spawn_at(entity).unwrap_or(NaiveDateTime::MAX);
        if now < spawn_at {
            return Verdict::CountingDown { spawn_at };
        }
        if self.spawns.contains(&record.killed_at) {
            return Verdict::StillUp { spawn_at };
        }
        Verdict::Announce(Notification::Spawn {
            entity: record.entity.clone(),
            map: entity.map.clone(),
            killed_at: record.killed_at,
        })
    }

    /// Record that `notification` was delivered at `now`.
    ///
    /// Returns `false` if it had already been recorded.
    pub fn confirm(&mut self, notification: &Notification, now: NaiveDateTime) -> bool {
        match notification {
            Notification::Death { .. } => self.deaths.insert(notification.kill_key(), now),
            Notification::Spawn { killed_at, .. } => self.spawns.insert(*killed_at, now),
        }
    }

    /// Drop ledger entries older than the retention window.
    pub fn evict(&mut self, now: NaiveDateTime) -> EvictionReport {
        let retention = self.settings.retention;
        EvictionReport {
            deaths: self.deaths.evict_older_than(now, retention),
            spawns: self.spawns.evict_older_than(now, retention),
        }
    }

    /// The tracker's timing parameters.
    pub const fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    /// Entries currently held in the death ledger.
    pub fn death_ledger_len(&self) -> usize {
        self.deaths.len()
    }

    /// Entries currently held in the spawn ledger.
    pub fn spawn_ledger_len(&self) -> usize {
        self.spawns.len()
    }
}
