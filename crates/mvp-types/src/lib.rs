//! Shared type definitions for the MVP tracker.
//!
//! Every crate in the workspace speaks in terms of these types: the static
//! [`EntityDef`] table loaded at startup, the [`KillRecord`] values rebuilt
//! from the listing on every poll cycle, and the [`Notification`] values the
//! tracker decides to announce on the bus.
//!
//! # Modules
//!
//! - [`entity`] -- Entity definitions and the built-in MVP table
//! - [`kill`] -- Kill records and their deduplication key
//! - [`notification`] -- Death and spawn announcements

pub mod entity;
pub mod kill;
pub mod notification;

// Re-export all public types at crate root for convenience.
pub use entity::{EntityDef, builtin_entities};
pub use kill::{KillKey, KillRecord, TIMESTAMP_FORMAT};
pub use notification::Notification;
