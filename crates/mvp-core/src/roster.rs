//! The validated table of tracked entities.
//!
//! Built once at startup from configuration and never mutated afterwards.

use mvp_types::EntityDef;

/// Errors that make an entity table unusable.
#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    /// No entities were configured.
    #[error("entity table is empty")]
    Empty,

    /// An entity has a blank name.
    #[error("entity with map {map:?} has an empty name")]
    EmptyName {
        /// Map of the nameless entry, to help find it in the file.
        map: String,
    },

    /// An entity respawns instantly, which would announce it forever.
    #[error("entity {name:?} has a zero respawn interval")]
    ZeroRespawn {
        /// Offending entity.
        name: String,
    },

    /// Two entries share a name, ignoring case.
    #[error("entity {name:?} is defined more than once")]
    Duplicate {
        /// Offending entity.
        name: String,
    },
}

/// Immutable lookup table of [`EntityDef`] values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTable {
    entities: Vec<EntityDef>,
}

impl EntityTable {
    /// Validate and wrap a list of entity definitions.
    ///
    /// # Errors
    ///
    /// Returns [`RosterError`] if the list is empty, a name is blank, a
    /// respawn interval is zero, or a name repeats (case-insensitively).
    pub fn new(entities: Vec<EntityDef>) -> Result<Self, RosterError> {
        if entities.is_empty() {
            return Err(RosterError::Empty);
        }
        for (i, entity) in entities.iter().enumerate() {
            if entity.name.trim().is_empty() {
                return Err(RosterError::EmptyName {
                    map: entity.map.clone(),
                });
            }
            if entity.respawn_minutes == 0 {
                return Err(RosterError::ZeroRespawn {
                    name: entity.name.clone(),
                });
            }
            if entities.iter().take(i).any(|other| other.matches(&entity.name)) {
                return Err(RosterError::Duplicate {
                    name: entity.name.clone(),
                });
            }
        }
        Ok(Self { entities })
    }

    /// Find the entity whose name matches `text`, ignoring case.
    pub fn lookup(&self, text: &str) -> Option<&EntityDef> {
        self.entities.iter().find(|e| e.matches(text))
    }

    /// Number of tracked entities.
    pub const fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the table is empty (never true for a validated table).
    pub const fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterate over all entities in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &EntityDef> {
        self.entities.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_is_valid() {
        let table = EntityTable::new(mvp_types::builtin_entities()).unwrap();
        assert_eq!(table.len(), 18);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let table = EntityTable::new(vec![EntityDef::new("Orc Hero", "gef_fild14", 70)]).unwrap();
        assert_eq!(
            table.lookup("orc hero").map(|e| e.map.as_str()),
            Some("gef_fild14")
        );
        assert!(table.lookup("Orc Lord").is_none());
    }

    #[test]
    fn rejects_duplicates_ignoring_case() {
        let result = EntityTable::new(vec![
            EntityDef::new("Maya", "anthell02", 130),
            EntityDef::new("MAYA", "anthell02", 130),
        ]);
        assert!(matches!(result, Err(RosterError::Duplicate { .. })));
    }

    #[test]
    fn rejects_zero_respawn_and_blank_names() {
        let zero = EntityTable::new(vec![EntityDef::new("Maya", "anthell02", 0)]);
        assert!(matches!(zero, Err(RosterError::ZeroRespawn { .. })));

        let blank = EntityTable::new(vec![EntityDef::new("  ", "anthell02", 130)]);
        assert!(matches!(blank, Err(RosterError::EmptyName { .. })));

        assert!(matches!(EntityTable::new(Vec::new()), Err(RosterError::Empty)));
    }
}
