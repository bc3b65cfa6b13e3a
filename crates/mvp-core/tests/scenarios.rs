//! End-to-end decision scenarios: listing cells in, announcements out.
#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use chrono::NaiveDateTime;
use mvp_core::interpreter::interpret;
use mvp_core::roster::EntityTable;
use mvp_core::tracker::{EventTracker, Verdict};
use mvp_types::{EntityDef, Notification, TIMESTAMP_FORMAT};

const CELLS: [&str; 4] = ["2024-01-01 10:00:00", "Eddga", "2024-01-01 09:00:00", "Maya"];

fn at(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap()
}

fn roster() -> EntityTable {
    EntityTable::new(vec![
        EntityDef::new("Eddga", "pay_fild11", 130),
        EntityDef::new("Maya", "anthell02", 130),
    ])
    .unwrap()
}

/// Run one cycle the way the daemon does, assuming every send succeeds.
fn cycle(tracker: &mut EventTracker, roster: &EntityTable, now: NaiveDateTime) -> Vec<Notification> {
    let mut sent = Vec::new();
    for sighting in interpret(&CELLS, roster).sightings {
        if let Verdict::Announce(notification) = tracker.evaluate(&sighting.record, sighting.entity, now) {
            tracker.confirm(&notification, now);
            sent.push(notification);
        }
    }
    sent
}

#[test]
fn fresh_kill_announces_death_and_nothing_else() {
    let roster = roster();
    let mut tracker = EventTracker::default();

    let sent = cycle(&mut tracker, &roster, at("2024-01-01 10:01:00"));

    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to_string(), "DEAD: Eddga died at 10:00:00");
}

#[test]
fn spawn_is_announced_once() {
    let roster = roster();
    let mut tracker = EventTracker::default();

    assert_eq!(cycle(&mut tracker, &roster, at("2024-01-01 10:01:00")).len(), 1);
    assert!(cycle(&mut tracker, &roster, at("2024-01-01 10:02:00")).is_empty());

    // Maya respawns at 11:10, Eddga at 12:10.
    let maya = cycle(&mut tracker, &roster, at("2024-01-01 11:10:00"));
    assert_eq!(maya.len(), 1);
    assert_eq!(maya[0].to_string(), "UP: Maya is up at anthell02");

    let eddga = cycle(&mut tracker, &roster, at("2024-01-01 12:15:00"));
    assert_eq!(eddga.len(), 1);
    assert_eq!(eddga[0].to_string(), "UP: Eddga is up at pay_fild11");

    assert!(cycle(&mut tracker, &roster, at("2024-01-01 12:16:00")).is_empty());
}

#[test]
fn first_sighting_after_both_respawns_announces_two_spawns() {
    let roster = roster();
    let mut tracker = EventTracker::default();

    let sent = cycle(&mut tracker, &roster, at("2024-01-01 12:15:00"));
    let kinds: Vec<&str> = sent.iter().map(Notification::kind).collect();
    assert_eq!(kinds, ["spawn", "spawn"]);

    assert!(cycle(&mut tracker, &roster, at("2024-01-01 12:16:00")).is_empty());
}

#[test]
fn entries_expire_after_retention() {
    let roster = roster();
    let mut tracker = EventTracker::default();

    cycle(&mut tracker, &roster, at("2024-01-01 12:15:00"));
    let report = tracker.evict(at("2024-01-01 18:16:00"));
    assert_eq!(report.spawns, 2);

    // Still listed, so both spawns are announced again.
    assert_eq!(cycle(&mut tracker, &roster, at("2024-01-01 18:17:00")).len(), 2);
}
