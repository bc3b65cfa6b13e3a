//! Kill records and the deduplication key derived from them.
//!
//! The same kill shows up in every poll cycle until it scrolls off the
//! listing, so a record's identity is its `(entity, timestamp)` pair at
//! second precision rather than any incrementing ID.

use core::fmt;

use chrono::{NaiveDateTime, TimeDelta, Timelike};

use crate::entity::EntityDef;

/// Listing timestamp layout. Timestamps carry no timezone and are compared
/// against the local wall clock.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One observed kill of a tracked entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KillRecord {
    /// Canonical entity name (as configured, not as scraped).
    pub entity: String,
    /// Kill time, truncated to whole seconds.
    pub killed_at: NaiveDateTime,
}

impl KillRecord {
    /// Create a record, dropping any sub-second component of `killed_at`.
    pub fn new(entity: impl Into<String>, killed_at: NaiveDateTime) -> Self {
        Self {
            entity: entity.into(),
            killed_at: killed_at.with_nanosecond(0).unwrap_or(killed_at),
        }
    }

    /// The deduplication key for this kill.
    pub fn key(&self) -> KillKey {
        KillKey {
            entity: self.entity.clone(),
            killed_at: self.killed_at,
        }
    }

    /// When the entity respawns, or `None` if the sum overflows.
    pub fn spawn_at(&self, entity: &EntityDef) -> Option<NaiveDateTime> {
        self.killed_at.checked_add_signed(entity.respawn_interval())
    }

    /// Time elapsed between the kill and `now`. Negative when the listing
    /// clock runs ahead of ours.
    pub fn since_death(&self, now: NaiveDateTime) -> TimeDelta {
        now.signed_duration_since(self.killed_at)
    }
}

/// Identity of a kill: entity name plus kill time at second precision.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KillKey {
    /// Canonical entity name.
    pub entity: String,
    /// Kill time, whole seconds.
    pub killed_at: NaiveDateTime,
}

impl fmt::Display for KillKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.entity, self.killed_at.format(TIMESTAMP_FORMAT))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap()
    }

    #[test]
    fn key_formats_to_second_precision() {
        let record = KillRecord::new("Eddga", at("2024-01-01 10:00:00"));
        assert_eq!(record.key().to_string(), "Eddga_2024-01-01 10:00:00");
    }

    #[test]
    fn sub_second_noise_does_not_change_identity() {
        let base = at("2024-01-01 10:00:00");
        let noisy = base.with_nanosecond(250_000_000).unwrap();
        assert_eq!(
            KillRecord::new("Maya", base).key(),
            KillRecord::new("Maya", noisy).key()
        );
    }

    #[test]
    fn spawn_time_adds_respawn_interval() {
        let eddga = EntityDef::new("Eddga", "pay_fild11", 130);
        let record = KillRecord::new("Eddga", at("2024-01-01 10:00:00"));
        assert_eq!(record.spawn_at(&eddga), Some(at("2024-01-01 12:10:00")));
    }

    #[test]
    fn since_death_can_be_negative() {
        let record = KillRecord::new("Eddga", at("2024-01-01 10:00:30"));
        let elapsed = record.since_death(at("2024-01-01 10:00:00"));
        assert_eq!(elapsed, TimeDelta::seconds(-30));
    }
}
