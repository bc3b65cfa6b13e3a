//! Tracked entity definitions.
//!
//! An [`EntityDef`] is immutable for the lifetime of the process. The name is
//! the unique key and is matched case-insensitively against listing text.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// Built-in MVP table: `(name, map, respawn minutes)`.
const BUILTIN: &[(&str, &str, u32)] = &[
    ("Golden Thief Bug", "prt_sewb4", 70),
    ("Eddga", "pay_fild11", 130),
    ("Tao Gunka", "beach_dun", 310),
    ("Osiris", "moc_pryd04", 70),
    ("Phreeoni", "moc_fild17", 130),
    ("Mistress", "mjolnir_04", 130),
    ("Maya", "anthell02", 130),
    ("Drake", "treasure02", 130),
    ("Moonlight Flower", "pay_dun04", 70),
    ("Pharaoh", "in_sphinx5", 70),
    ("Orc Hero", "gef_fild14", 70),
    ("Orc Lord", "gef_fild10", 130),
    ("Stormy Knight", "xmas_dun02", 70),
    ("Hatii", "xmas_fild01", 130),
    ("Turtle General", "tur_dun04", 70),
    ("Baphomet", "prt_maze03", 130),
    ("Dark Lord", "gl_chyard", 70),
    ("Lord of Death", "niflheim", 133),
];

/// A trackable boss with its spawn map and respawn interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityDef {
    /// Display name, also the lookup key.
    pub name: String,
    /// Map identifier where the entity respawns.
    pub map: String,
    /// Minutes between a kill and the next spawn.
    pub respawn_minutes: u32,
}

impl EntityDef {
    /// Create a new entity definition.
    pub fn new(name: impl Into<String>, map: impl Into<String>, respawn_minutes: u32) -> Self {
        Self {
            name: name.into(),
            map: map.into(),
            respawn_minutes,
        }
    }

    /// Return the respawn interval as a [`TimeDelta`].
    pub fn respawn_interval(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.respawn_minutes))
    }

    /// Whether `text` names this entity, ignoring case.
    pub fn matches(&self, text: &str) -> bool {
        self.name.to_lowercase() == text.to_lowercase()
    }
}

/// Return the built-in MVP table used when configuration supplies none.
pub fn builtin_entities() -> Vec<EntityDef> {
    BUILTIN
        .iter()
        .map(|&(name, map, minutes)| EntityDef::new(name, map, minutes))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn matches_ignores_case() {
        let eddga = EntityDef::new("Eddga", "pay_fild11", 130);
        assert!(eddga.matches("eddga"));
        assert!(eddga.matches("EDDGA"));
        assert!(!eddga.matches("Eddga "));
        assert!(!eddga.matches("Maya"));
    }

    #[test]
    fn respawn_interval_in_minutes() {
        let lod = EntityDef::new("Lord of Death", "niflheim", 133);
        assert_eq!(lod.respawn_interval(), TimeDelta::minutes(133));
    }

    #[test]
    fn builtin_table_has_unique_names() {
        let entities = builtin_entities();
        assert_eq!(entities.len(), 18);
        let mut names: Vec<String> = entities.iter().map(|e| e.name.to_lowercase()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), entities.len());
    }

    #[test]
    fn deserializes_from_yaml() {
        let yaml = "name: Maya\nmap: anthell02\nrespawn_minutes: 130\n";
        let entity: EntityDef = serde_yml::from_str(yaml).unwrap();
        assert_eq!(entity, EntityDef::new("Maya", "anthell02", 130));
    }
}
