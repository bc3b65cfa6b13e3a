//! Decision logic for the MVP tracker.
//!
//! Everything here is synchronous and clock-free: callers pass `now` in, so
//! the whole pipeline from listing cells to announcements can be driven from
//! tests with fixed timestamps.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `mvp-tracker.yaml` into
//!   strongly-typed structs.
//! - [`roster`] -- [`EntityTable`], the validated set of tracked entities.
//! - [`interpreter`] -- Turns one page of listing cells into kill records.
//! - [`ledger`] -- Time-bounded sets of already-announced keys.
//! - [`tracker`] -- [`EventTracker`], which decides death and spawn
//!   announcements and deduplicates them.
//!
//! [`EntityTable`]: roster::EntityTable
//! [`EventTracker`]: tracker::EventTracker

pub mod config;
pub mod interpreter;
pub mod ledger;
pub mod roster;
pub mod tracker;
