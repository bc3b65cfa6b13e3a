//! Kill-record interpretation from listing cells.
//!
//! The listing collaborator hands over every table cell of one page as an
//! ordered list of trimmed strings. This module turns that flat list into
//! [`KillRecord`] values.
//!
//! # Precondition
//!
//! The listing places each kill's timestamp cell at most
//! [`TIMESTAMP_LOOKBACK`] cells before the cell naming the entity. Nothing
//! here can verify that layout; if the page changes shape, entities are
//! simply skipped and reported in [`Interpretation::skipped`].
//!
//! # Algorithm
//!
//! Cells are scanned left to right. The first cell matching an entity name
//! (case-insensitively) claims that entity for the cycle; later cells with the
//! same name are ignored even if the first one yields no record. From the name
//! cell, the preceding cells are searched nearest-first for one that looks
//! like a timestamp (contains both `-` and `:`), which is then parsed with
//! [`TIMESTAMP_FORMAT`].

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use mvp_types::{EntityDef, KillRecord, TIMESTAMP_FORMAT};

use crate::roster::EntityTable;

/// How many cells before a name cell are searched for its timestamp.
pub const TIMESTAMP_LOOKBACK: usize = 5;

/// A timestamp-shaped cell did not parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("timestamp {text:?} for {entity} is not YYYY-MM-DD HH:MM:SS: {source}")]
pub struct ParseError {
    /// Entity the timestamp belonged to.
    pub entity: String,
    /// The raw cell text.
    pub text: String,
    /// The underlying chrono error.
    #[source]
    pub source: chrono::ParseError,
}

/// Why an entity produced no record this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No timestamp-shaped cell within the lookback window.
    NoTimestamp,
    /// A timestamp-shaped cell was found but did not parse.
    BadTimestamp(ParseError),
}

/// An entity named in the listing that yielded no record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    /// Canonical entity name.
    pub entity: String,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// A kill record paired with the entity definition it refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sighting<'r> {
    /// The observed kill.
    pub record: KillRecord,
    /// Definition of the killed entity.
    pub entity: &'r EntityDef,
}

/// Result of interpreting one cycle's cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interpretation<'r> {
    /// At most one sighting per entity, in listing order.
    pub sightings: Vec<Sighting<'r>>,
    /// Entities that were named but yielded no record.
    pub skipped: Vec<Skipped>,
}

/// Extract kill records from one cycle's listing cells.
pub fn interpret<'r, S: AsRef<str>>(cells: &[S], roster: &'r EntityTable) -> Interpretation<'r> {
    let mut claimed: BTreeSet<&str> = BTreeSet::new();
    let mut out = Interpretation::default();

    for (index, cell) in cells.iter().enumerate() {
        let Some(entity) = roster.lookup(cell.as_ref().trim()) else {
            continue;
        };
        if !claimed.insert(entity.name.as_str()) {
            continue;
        }

        match find_timestamp(cells, index) {
            None => out.skipped.push(Skipped {
                entity: entity.name.clone(),
                reason: SkipReason::NoTimestamp,
            }),
            Some(text) => match parse_timestamp(&entity.name, text) {
                Ok(killed_at) => out.sightings.push(Sighting {
                    record: KillRecord::new(entity.name.clone(), killed_at),
                    entity,
                }),
                Err(e) => out.skipped.push(Skipped {
                    entity: entity.name.clone(),
                    reason: SkipReason::BadTimestamp(e),
                }),
            },
        }
    }

    out
}

/// Whether a cell plausibly holds a timestamp.
pub fn looks_like_timestamp(text: &str) -> bool {
    text.contains('-') && text.contains(':')
}

/// Nearest timestamp-shaped cell among the [`TIMESTAMP_LOOKBACK`] cells
/// preceding `index`.
fn find_timestamp<S: AsRef<str>>(cells: &[S], index: usize) -> Option<&str> {
    (1..=TIMESTAMP_LOOKBACK)
        .filter_map(|offset| index.checked_sub(offset))
        .filter_map(|i| cells.get(i))
        .map(|cell| cell.as_ref().trim())
        .find(|text| looks_like_timestamp(text))
}

fn parse_timestamp(entity: &str, text: &str) -> Result<NaiveDateTime, ParseError> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT).map_err(|source| ParseError {
        entity: entity.to_owned(),
        text: text.to_owned(),
        source,
    })
}
