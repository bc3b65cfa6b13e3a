//! Announcements the tracker sends to the bus.

use core::fmt;

use chrono::NaiveDateTime;

use crate::kill::KillKey;

/// A notification about one kill.
///
/// The [`Display`](fmt::Display) rendering is the exact text placed on the
/// wire (after the bus command prefix).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The entity was killed within the death window.
    Death {
        /// Canonical entity name.
        entity: String,
        /// Kill time.
        killed_at: NaiveDateTime,
    },
    /// The entity's respawn time has passed.
    Spawn {
        /// Canonical entity name.
        entity: String,
        /// Map the entity respawns on.
        map: String,
        /// Kill time of the death this spawn follows.
        killed_at: NaiveDateTime,
    },
}

impl Notification {
    /// Name of the entity this notification is about.
    pub fn entity(&self) -> &str {
        match self {
            Self::Death { entity, .. } | Self::Spawn { entity, .. } => entity,
        }
    }

    /// Kill time this notification refers to.
    pub const fn killed_at(&self) -> NaiveDateTime {
        match self {
            Self::Death { killed_at, .. } | Self::Spawn { killed_at, .. } => *killed_at,
        }
    }

    /// Identity of the underlying kill.
    pub fn kill_key(&self) -> KillKey {
        KillKey {
            entity: self.entity().to_owned(),
            killed_at: self.killed_at(),
        }
    }

    /// Short label for log fields.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Death { .. } => "death",
            Self::Spawn { .. } => "spawn",
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Death { entity, killed_at } => {
                write!(f, "DEAD: {entity} died at {}", killed_at.format("%H:%M:%S"))
            }
            Self::Spawn { entity, map, .. } => write!(f, "UP: {entity} is up at {map}"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::kill::TIMESTAMP_FORMAT;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap()
    }

    #[test]
    fn death_text() {
        let n = Notification::Death {
            entity: "Eddga".to_owned(),
            killed_at: at("2024-01-01 10:00:00"),
        };
        assert_eq!(n.to_string(), "DEAD: Eddga died at 10:00:00");
        assert_eq!(n.kind(), "death");
    }

    #[test]
    fn spawn_text() {
        let n = Notification::Spawn {
            entity: "Eddga".to_owned(),
            map: "pay_fild11".to_owned(),
            killed_at: at("2024-01-01 10:00:00"),
        };
        assert_eq!(n.to_string(), "UP: Eddga is up at pay_fild11");
        assert_eq!(n.kill_key().to_string(), "Eddga_2024-01-01 10:00:00");
    }
}
