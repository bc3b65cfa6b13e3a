//! The poll loop: one fetch, interpret, decide, announce pass per cycle.
//!
//! Cycles run on a fixed cadence and strictly one after another. The loop
//! owns the only bus session, the event tracker, and the entity table, so
//! there is no shared state and no locking.
//!
//! Per cycle:
//! 1. If disconnected, wait the reconnect delay, try to reconnect, and end
//!    the cycle.
//! 2. Sweep the tracker's ledgers if the sweep interval has elapsed.
//! 3. Fetch the listing cells. A fetch failure ends the cycle.
//! 4. Interpret the cells and ask the tracker about every sighting.
//! 5. Send each announcement; confirm it only after the send succeeded. The
//!    first send failure drops the session and defers the rest of the cycle's
//!    announcements to later cycles.
//! 6. If a send failed, reconnect at once so the next cycle retries on a live
//!    session while a fresh death is still inside its window.

use std::future::Future;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, TimeDelta};
use mvp_bus::{BusSession, SessionConfig};
use mvp_core::config::{ConfigError, TrackerConfig};
use mvp_core::interpreter::{SkipReason, interpret};
use mvp_core::roster::EntityTable;
use mvp_core::tracker::{EventTracker, Verdict};
use mvp_types::Notification;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::source::CellSource;

/// Clock format used in log fields.
const CLOCK_FORMAT: &str = "%H:%M:%S";

/// Timing and connection parameters for a [`PollLoop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    /// `host:port` of the bus.
    pub bus_addr: String,
    /// Handshake name and socket deadlines.
    pub session: SessionConfig,
    /// Pause before a reconnect attempt.
    pub reconnect_delay: Duration,
    /// Cadence of poll cycles.
    pub poll_interval: Duration,
    /// Minimum spacing of ledger sweeps.
    pub sweep_interval: TimeDelta,
}

impl PollSettings {
    /// Derive loop settings from the daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the sweep interval is out of range.
    pub fn from_config(config: &TrackerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            bus_addr: config.bus.address(),
            session: SessionConfig {
                client_name: config.bus.client_name.clone(),
                connect_timeout: config.bus.connect_timeout(),
                send_timeout: config.bus.send_timeout(),
            },
            reconnect_delay: config.bus.reconnect_delay(),
            poll_interval: config.tracker.poll_interval(),
            sweep_interval: config.tracker.sweep_interval()?,
        })
    }
}

/// Counters for one completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Entities matched in the listing with a usable kill time.
    pub matched: usize,
    /// Notifications delivered to the bus.
    pub sent: usize,
    /// Announcements left for a later cycle because the bus was lost.
    pub deferred: usize,
    /// Entities named in the listing that yielded no record.
    pub skipped: usize,
    /// Entities past their spawn time whose spawn was already announced.
    pub still_up: usize,
    /// Entities not yet respawned.
    pub counting_down: usize,
    /// Ledger entries removed by this cycle's sweep.
    pub evicted: usize,
}

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The bus was down and the reconnect attempt succeeded.
    Reconnected,
    /// The bus was down and is still down.
    Disconnected,
    /// The listing could not be fetched.
    FetchFailed,
    /// The full cycle ran.
    Completed(CycleReport),
}

/// The sequential poll loop.
pub struct PollLoop<S> {
    source: S,
    roster: EntityTable,
    tracker: EventTracker,
    settings: PollSettings,
    session: Option<BusSession>,
    last_sweep: NaiveDateTime,
}

impl<S: CellSource> PollLoop<S> {
    /// Create a disconnected loop. `now` starts the sweep clock.
    pub const fn new(
        source: S,
        roster: EntityTable,
        tracker: EventTracker,
        settings: PollSettings,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            source,
            roster,
            tracker,
            settings,
            session: None,
            last_sweep: now,
        }
    }

    /// Whether a bus session is currently open.
    pub const fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// The tracker's current state.
    pub const fn tracker(&self) -> &EventTracker {
        &self.tracker
    }

    /// Try to open a bus session. Failure is logged and leaves the loop
    /// disconnected.
    pub async fn connect(&mut self) -> bool {
        match BusSession::connect(&self.settings.bus_addr, &self.settings.session).await {
            Ok(session) => {
                self.session = Some(session);
                true
            }
            Err(e) => {
                warn!(addr = self.settings.bus_addr, error = %e, "bus connection failed");
                false
            }
        }
    }

    /// Run cycles on the configured cadence until `shutdown` resolves.
    ///
    /// Shutdown is only observed between cycles.
    pub async fn run_until<F: Future<Output = ()>>(&mut self, shutdown: F) {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            poll_interval_secs = self.settings.poll_interval.as_secs(),
            death_window_secs = self.tracker.settings().death_window.num_seconds(),
            retention_secs = self.tracker.settings().retention.num_seconds(),
            entities = self.roster.len(),
            "poll loop started"
        );
        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!("shutdown requested, leaving poll loop");
                    return;
                }
                _ = ticker.tick() => {}
            }
            let outcome = self.run_cycle(Local::now().naive_local()).await;
            if outcome == CycleOutcome::Reconnected {
                // Run the real cycle now instead of a full interval later.
                ticker.reset_immediately();
            }
        }
    }

    /// Run one cycle as of `now`.
    pub async fn run_cycle(&mut self, now: NaiveDateTime) -> CycleOutcome {
        if self.session.is_none() {
            warn!(
                addr = self.settings.bus_addr,
                delay_secs = self.settings.reconnect_delay.as_secs(),
                "bus disconnected, attempting reconnect"
            );
            tokio::time::sleep(self.settings.reconnect_delay).await;
            return if self.connect().await {
                CycleOutcome::Reconnected
            } else {
                CycleOutcome::Disconnected
            };
        }

        let mut report = CycleReport {
            evicted: self.sweep_if_due(now),
            ..CycleReport::default()
        };

        debug!(at = %now.format(CLOCK_FORMAT), "fetching listing");
        let cells = match self.source.fetch_cells().await {
            Ok(cells) => cells,
            Err(e) => {
                warn!(error = %e, "listing fetch failed");
                return CycleOutcome::FetchFailed;
            }
        };

        let interpretation = interpret(&cells, &self.roster);
        report.matched = interpretation.sightings.len();
        report.skipped = interpretation.skipped.len();
        for skipped in &interpretation.skipped {
            match &skipped.reason {
                SkipReason::NoTimestamp => {
                    warn!(entity = skipped.entity, "no kill time near entity name, skipping");
                }
                SkipReason::BadTimestamp(e) => {
                    warn!(entity = skipped.entity, error = %e, "unparseable kill time, skipping");
                }
            }
        }

        for sighting in &interpretation.sightings {
            let record = &sighting.record;
            match self.tracker.evaluate(record, sighting.entity, now) {
                Verdict::Announce(notification) => {
                    if deliver(&mut self.session, &notification).await {
                        self.tracker.confirm(&notification, now);
                        report.sent = report.sent.saturating_add(1);
                    } else {
                        debug!(entity = record.entity, kind = notification.kind(), "announcement deferred");
                        report.deferred = report.deferred.saturating_add(1);
                    }
                }
                Verdict::StillUp { .. } => {
                    debug!(entity = record.entity, map = sighting.entity.map, "still up");
                    report.still_up = report.still_up.saturating_add(1);
                }
                Verdict::CountingDown { spawn_at } => {
                    debug!(
                        entity = record.entity,
                        spawn_at = %spawn_at.format(CLOCK_FORMAT),
                        killed_at = %record.killed_at.format(CLOCK_FORMAT),
                        "awaiting respawn"
                    );
                    report.counting_down = report.counting_down.saturating_add(1);
                }
            }
        }

        info!(
            matched = report.matched,
            sent = report.sent,
            deferred = report.deferred,
            skipped = report.skipped,
            "cycle complete"
        );

        if report.deferred > 0 && self.session.is_none() {
            info!(
                addr = self.settings.bus_addr,
                deferred = report.deferred,
                "reconnecting after send failure"
            );
            self.connect().await;
        }
        CycleOutcome::Completed(report)
    }

    /// Evict old ledger entries if a sweep is due. Returns entries removed.
    fn sweep_if_due(&mut self, now: NaiveDateTime) -> usize {
        if now.signed_duration_since(self.last_sweep) < self.settings.sweep_interval {
            return 0;
        }
        self.last_sweep = now;
        let evicted = self.tracker.evict(now);
        if evicted.total() > 0 {
            info!(
                deaths = evicted.deaths,
                spawns = evicted.spawns,
                "evicted old announcements"
            );
        }
        evicted.total()
    }
}

/// Send `notification` on `session`, dropping the session on failure.
///
/// Returns `false` without sending if there is no session.
async fn deliver(session: &mut Option<BusSession>, notification: &Notification) -> bool {
    let Some(active) = session.as_mut() else {
        return false;
    };
    let text = notification.to_string();
    match active.send_notification(&text).await {
        Ok(()) => {
            info!(entity = notification.entity(), kind = notification.kind(), text = %text, "notification sent");
            true
        }
        Err(e) => {
            warn!(peer = active.peer(), error = %e, "bus send failed, dropping session");
            *session = None;
            false
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use mvp_bus::Frame;
    use mvp_bus::codec::{decode, frame_len};
    use mvp_types::{EntityDef, TIMESTAMP_FORMAT};
    use tokio::io::AsyncReadExt as _;
    use tokio::net::{TcpListener, TcpStream};

    use super::*;
    use crate::error::SourceError;

    /// Returns the same cells every cycle.
    struct StaticSource(Vec<String>);

    impl CellSource for StaticSource {
        async fn fetch_cells(&self) -> Result<Vec<String>, SourceError> {
            Ok(self.0.clone())
        }
    }

    /// Always fails.
    struct BrokenSource;

    impl CellSource for BrokenSource {
        async fn fetch_cells(&self) -> Result<Vec<String>, SourceError> {
            Err(SourceError::Selector("broken".to_owned()))
        }
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap()
    }

    fn listing() -> StaticSource {
        StaticSource(
            ["2024-01-01 10:00:00", "Eddga", "2024-01-01 09:00:00", "Maya"]
                .map(str::to_owned)
                .to_vec(),
        )
    }

    fn roster() -> EntityTable {
        EntityTable::new(vec![
            EntityDef::new("Eddga", "pay_fild11", 130),
            EntityDef::new("Maya", "anthell02", 130),
        ])
        .unwrap()
    }

    fn settings(bus_addr: String) -> PollSettings {
        PollSettings {
            bus_addr,
            session: SessionConfig::default(),
            reconnect_delay: Duration::ZERO,
            poll_interval: Duration::from_secs(60),
            sweep_interval: TimeDelta::hours(1),
        }
    }

    fn poll_loop<S: CellSource>(source: S, bus_addr: String) -> PollLoop<S> {
        PollLoop::new(
            source,
            roster(),
            EventTracker::default(),
            settings(bus_addr),
            at("2024-01-01 10:00:00"),
        )
    }

    async fn read_frame(stream: &mut TcpStream) -> Frame {
        let mut prefix = [0u8; 4];
        stream.read_exact(&mut prefix).await.unwrap();
        let mut frame = prefix.to_vec();
        frame.resize(frame_len(&prefix).unwrap(), 0);
        stream.read_exact(&mut frame[4..]).await.unwrap();
        decode(&frame).unwrap()
    }

    /// Bind a bus peer that accepts one connection and collects `count`
    /// frames after the handshake.
    async fn bus_peer(count: usize) -> (String, tokio::task::JoinHandle<Vec<Frame>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let hello = read_frame(&mut stream).await;
            assert_eq!(hello.message_id, "HELLO");
            let mut frames = Vec::new();
            for _ in 0..count {
                frames.push(read_frame(&mut stream).await);
            }
            frames
        });
        (addr, handle)
    }

    async fn unused_addr() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    }

    /// Bind a bus peer that hangs up right after the first handshake. If
    /// `count` is set it then accepts a second connection and collects that
    /// many frames from it; otherwise it stops listening.
    async fn hangup_peer(count: Option<usize>) -> (String, tokio::task::JoinHandle<Vec<Frame>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (mut first, _) = listener.accept().await.unwrap();
            read_frame(&mut first).await;
            drop(first);
            let Some(count) = count else {
                return Vec::new();
            };
            let (mut second, _) = listener.accept().await.unwrap();
            assert_eq!(read_frame(&mut second).await.message_id, "HELLO");
            let mut frames = Vec::new();
            for _ in 0..count {
                frames.push(read_frame(&mut second).await);
            }
            frames
        });
        (addr, handle)
    }

    /// Write on the open session until the peer's hangup surfaces, so the
    /// loop's next send is certain to fail.
    async fn wait_for_hangup<S>(poll: &mut PollLoop<S>) {
        let session = poll.session.as_mut().unwrap();
        for _ in 0..50 {
            if session.send_notification("ping").await.is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("peer hangup never surfaced");
    }

    #[tokio::test]
    async fn fresh_kill_is_announced_on_the_bus() {
        let (addr, peer) = bus_peer(1).await;
        let mut poll = poll_loop(listing(), addr);
        assert!(poll.connect().await);

        let outcome = poll.run_cycle(at("2024-01-01 10:01:00")).await;
        let CycleOutcome::Completed(report) = outcome else {
            panic!("expected a completed cycle, got {outcome:?}");
        };
        assert_eq!(report.matched, 2);
        assert_eq!(report.sent, 1);
        assert_eq!(report.counting_down, 1);

        let frames = peer.await.unwrap();
        assert_eq!(frames[0].message_id, "busComm");
        assert_eq!(frames[0].get("player"), Some("all"));
        assert_eq!(frames[0].get("comm"), Some("p DEAD: Eddga died at 10:00:00"));
        assert_eq!(poll.tracker().death_ledger_len(), 1);
    }

    #[tokio::test]
    async fn spawn_is_sent_once_across_cycles() {
        let (addr, peer) = bus_peer(2).await;
        let mut poll = poll_loop(listing(), addr);
        assert!(poll.connect().await);

        let mut sent = 0;
        for now in ["2024-01-01 12:15:00", "2024-01-01 12:16:00", "2024-01-01 12:17:00"] {
            if let CycleOutcome::Completed(report) = poll.run_cycle(at(now)).await {
                sent += report.sent;
            }
        }
        assert_eq!(sent, 2);

        let frames = peer.await.unwrap();
        let comms: Vec<&str> = frames.iter().filter_map(|f| f.get("comm")).collect();
        assert_eq!(
            comms,
            ["p UP: Eddga is up at pay_fild11", "p UP: Maya is up at anthell02"]
        );
    }

    #[tokio::test]
    async fn disconnected_cycle_only_reconnects() {
        let mut poll = poll_loop(listing(), unused_addr().await);
        let outcome = poll.run_cycle(at("2024-01-01 10:01:00")).await;
        assert_eq!(outcome, CycleOutcome::Disconnected);
        assert!(!poll.is_connected());
        assert_eq!(poll.tracker().death_ledger_len(), 0);
    }

    #[tokio::test]
    async fn reconnect_cycle_skips_announcements() {
        let (addr, peer) = bus_peer(1).await;
        let mut poll = poll_loop(listing(), addr);

        let first = poll.run_cycle(at("2024-01-01 10:00:30")).await;
        assert_eq!(first, CycleOutcome::Reconnected);
        assert_eq!(poll.tracker().death_ledger_len(), 0);

        let second = poll.run_cycle(at("2024-01-01 10:01:30")).await;
        assert!(matches!(second, CycleOutcome::Completed(r) if r.sent == 1));
        assert_eq!(peer.await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_death_notice_is_retried_next_cycle() {
        let (addr, peer) = hangup_peer(Some(1)).await;
        let mut poll = poll_loop(listing(), addr);
        assert!(poll.connect().await);
        wait_for_hangup(&mut poll).await;

        let CycleOutcome::Completed(first) = poll.run_cycle(at("2024-01-01 10:00:30")).await else {
            panic!("expected a completed cycle");
        };
        assert_eq!(first.sent, 0);
        assert_eq!(first.deferred, 1);
        assert_eq!(poll.tracker().death_ledger_len(), 0);
        assert!(poll.is_connected());

        // One interval later the kill is still inside the death window.
        let second = poll.run_cycle(at("2024-01-01 10:01:30")).await;
        assert!(matches!(second, CycleOutcome::Completed(r) if r.sent == 1 && r.deferred == 0));
        assert_eq!(poll.tracker().death_ledger_len(), 1);

        let frames = peer.await.unwrap();
        assert_eq!(frames[0].get("comm"), Some("p DEAD: Eddga died at 10:00:00"));
    }

    #[tokio::test]
    async fn send_failure_defers_the_rest_of_the_cycle() {
        let (addr, peer) = hangup_peer(Some(2)).await;
        let mut poll = poll_loop(listing(), addr);
        assert!(poll.connect().await);
        wait_for_hangup(&mut poll).await;

        // Both spawns are due; the first send fails and the second is not tried.
        let CycleOutcome::Completed(first) = poll.run_cycle(at("2024-01-01 12:15:00")).await else {
            panic!("expected a completed cycle");
        };
        assert_eq!(first.sent, 0);
        assert_eq!(first.deferred, 2);
        assert_eq!(poll.tracker().spawn_ledger_len(), 0);

        let second = poll.run_cycle(at("2024-01-01 12:16:00")).await;
        assert!(matches!(second, CycleOutcome::Completed(r) if r.sent == 2));

        let frames = peer.await.unwrap();
        let comms: Vec<&str> = frames.iter().filter_map(|f| f.get("comm")).collect();
        assert_eq!(
            comms,
            ["p UP: Eddga is up at pay_fild11", "p UP: Maya is up at anthell02"]
        );
    }

    #[tokio::test]
    async fn send_failure_with_bus_gone_leaves_loop_disconnected() {
        let (addr, peer) = hangup_peer(None).await;
        let mut poll = poll_loop(listing(), addr);
        assert!(poll.connect().await);
        wait_for_hangup(&mut poll).await;
        // The peer task owns the listener; once it returns nothing is listening.
        assert!(peer.await.unwrap().is_empty());

        let CycleOutcome::Completed(first) = poll.run_cycle(at("2024-01-01 10:00:30")).await else {
            panic!("expected a completed cycle");
        };
        assert_eq!(first.deferred, 1);
        assert!(!poll.is_connected());
        assert_eq!(poll.tracker().death_ledger_len(), 0);

        let second = poll.run_cycle(at("2024-01-01 10:01:30")).await;
        assert_eq!(second, CycleOutcome::Disconnected);
    }

    #[tokio::test]
    async fn fetch_failure_keeps_the_session() {
        let (addr, _peer) = bus_peer(0).await;
        let mut poll = poll_loop(BrokenSource, addr);
        assert!(poll.connect().await);

        let outcome = poll.run_cycle(at("2024-01-01 10:01:00")).await;
        assert_eq!(outcome, CycleOutcome::FetchFailed);
        assert!(poll.is_connected());
    }

    #[tokio::test]
    async fn sweep_runs_once_the_interval_elapses() {
        let (addr, _peer) = bus_peer(2).await;
        let mut poll = poll_loop(listing(), addr);
        assert!(poll.connect().await);

        // Both spawns announced at 12:15.
        poll.run_cycle(at("2024-01-01 12:15:00")).await;
        assert_eq!(poll.tracker().spawn_ledger_len(), 2);

        // The 12:15 cycle swept an empty tracker; none is due a minute later.
        let CycleOutcome::Completed(report) = poll.run_cycle(at("2024-01-01 12:16:00")).await else {
            panic!("expected a completed cycle");
        };
        assert_eq!(report.evicted, 0);
        assert_eq!(report.still_up, 2);

        assert_eq!(poll.sweep_if_due(at("2024-01-01 18:16:00")), 2);
        assert_eq!(poll.sweep_if_due(at("2024-01-01 18:17:00")), 0);
    }

    #[tokio::test]
    async fn run_until_returns_on_shutdown() {
        let mut poll = poll_loop(listing(), unused_addr().await);
        poll.run_until(std::future::ready(())).await;
        assert!(!poll.is_connected());
    }

    #[test]
    fn settings_follow_configuration() {
        let config = TrackerConfig::default();
        let settings = PollSettings::from_config(&config).unwrap();
        assert_eq!(settings.bus_addr, "127.0.0.1:6950");
        assert_eq!(settings.reconnect_delay, Duration::from_secs(10));
        assert_eq!(settings.sweep_interval, TimeDelta::hours(1));
        assert_eq!(settings.session, SessionConfig::default());
    }
}
