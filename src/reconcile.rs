use crate::ledger::Ledger;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Stable peer identifier (a WireGuard public key in practice).
/// Comparison is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PeerId(String);

impl PeerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of a poll: a peer and the unix time of its last handshake.
/// A peer absent from a snapshot means "not observed this poll", not removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRecord {
    pub peer: PeerId,
    pub last_handshake: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Connected,
    Disconnected,
}

/// Produced and consumed within one cycle; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionEvent {
    pub kind: Transition,
    pub peer: PeerId,
    pub elapsed_secs: u64,
}

/// Diffs one handshake snapshot against the previously persisted ledger.
///
/// Connectivity is a strict function of `now` and `threshold` over the
/// current snapshot only; `previous` decides which transitions are new.
/// The returned ledger replaces the previous one wholesale. Running again
/// with the returned ledger and the same snapshot emits zero events.
///
/// A handshake exactly `threshold` seconds old classifies as disconnected.
/// Duplicate peers in the snapshot: the last record wins.
pub fn reconcile(
    snapshot: &[HandshakeRecord],
    previous: &Ledger,
    now: u64,
    threshold: u64,
) -> (Vec<TransitionEvent>, Ledger) {
    let mut handshakes: BTreeMap<PeerId, u64> = BTreeMap::new();
    for record in snapshot {
        handshakes.insert(record.peer.clone(), record.last_handshake);
    }

    let mut connected: BTreeSet<PeerId> = BTreeSet::new();
    let mut events = Vec::new();
    let mut seen: BTreeSet<PeerId> = BTreeSet::new();

    for record in snapshot {
        if !seen.insert(record.peer.clone()) {
            continue;
        }
        let last = handshakes[&record.peer];
        let elapsed = now.saturating_sub(last);
        if elapsed < threshold {
            connected.insert(record.peer.clone());
            if !previous.connected.contains(&record.peer) {
                events.push(TransitionEvent {
                    kind: Transition::Connected,
                    peer: record.peer.clone(),
                    elapsed_secs: elapsed,
                });
            }
        }
    }

    for peer in &previous.connected {
        if !connected.contains(peer) {
            let last = previous.last_handshake.get(peer).copied().unwrap_or(0);
            events.push(TransitionEvent {
                kind: Transition::Disconnected,
                peer: peer.clone(),
                elapsed_secs: now.saturating_sub(last),
            });
        }
    }

    let next = Ledger {
        connected,
        last_handshake: handshakes,
    };
    (events, next)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;
    const THRESHOLD: u64 = 120;

    fn record(peer: &str, last_handshake: u64) -> HandshakeRecord {
        HandshakeRecord {
            peer: PeerId::from(peer),
            last_handshake,
        }
    }

    fn ledger(connected: &[&str], handshakes: &[(&str, u64)]) -> Ledger {
        Ledger {
            connected: connected.iter().map(|p| PeerId::from(*p)).collect(),
            last_handshake: handshakes
                .iter()
                .map(|(p, t)| (PeerId::from(*p), *t))
                .collect(),
        }
    }

    #[test]
    fn test_fresh_peer_connects() {
        let previous = Ledger::default();
        let snapshot = vec![record("A", NOW - 10)];

        let (events, next) = reconcile(&snapshot, &previous, NOW, THRESHOLD);

        assert_eq!(
            events,
            vec![TransitionEvent {
                kind: Transition::Connected,
                peer: PeerId::from("A"),
                elapsed_secs: 10,
            }]
        );
        assert!(next.connected.contains(&PeerId::from("A")));
        assert_eq!(next.last_handshake[&PeerId::from("A")], NOW - 10);
    }

    #[test]
    fn test_vanished_peer_disconnects() {
        let previous = ledger(&["A"], &[("A", NOW - 500)]);

        let (events, next) = reconcile(&[], &previous, NOW, THRESHOLD);

        assert_eq!(
            events,
            vec![TransitionEvent {
                kind: Transition::Disconnected,
                peer: PeerId::from("A"),
                elapsed_secs: 500,
            }]
        );
        assert!(next.connected.is_empty());
        assert!(next.last_handshake.is_empty());
    }

    #[test]
    fn test_still_connected_is_silent() {
        let t0 = NOW - 40;
        let previous = ledger(&["A"], &[("A", t0)]);
        let snapshot = vec![record("A", t0 + 30)];

        let (events, next) = reconcile(&snapshot, &previous, NOW, THRESHOLD);

        assert!(events.is_empty());
        assert!(next.connected.contains(&PeerId::from("A")));
    }

    #[test]
    fn test_threshold_boundary_is_disconnected() {
        let previous = ledger(&["A"], &[("A", NOW - THRESHOLD)]);
        let snapshot = vec![record("A", NOW - THRESHOLD)];

        let (events, next) = reconcile(&snapshot, &previous, NOW, THRESHOLD);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, Transition::Disconnected);
        assert!(!next.connected.contains(&PeerId::from("A")));
        // the stale handshake is still recorded
        assert_eq!(next.last_handshake[&PeerId::from("A")], NOW - THRESHOLD);
    }

    #[test]
    fn test_one_below_threshold_is_connected() {
        let previous = Ledger::default();
        let snapshot = vec![record("A", NOW - (THRESHOLD - 1))];

        let (events, next) = reconcile(&snapshot, &previous, NOW, THRESHOLD);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, Transition::Connected);
        assert_eq!(events[0].elapsed_secs, THRESHOLD - 1);
        assert!(next.connected.contains(&PeerId::from("A")));
    }

    #[test]
    fn test_idempotent_second_pass() {
        let previous = ledger(&["C"], &[("C", NOW - 700)]);
        let snapshot = vec![record("A", NOW - 5), record("B", NOW - 3000)];

        let (first_events, next) = reconcile(&snapshot, &previous, NOW, THRESHOLD);
        assert_eq!(first_events.len(), 2); // A connects, C disconnects

        let (second_events, again) = reconcile(&snapshot, &next, NOW, THRESHOLD);
        assert!(second_events.is_empty());
        assert_eq!(again, next);
    }

    #[test]
    fn test_no_peer_gets_both_events() {
        let previous = ledger(&["A", "B"], &[("A", NOW - 60), ("B", NOW - 60)]);
        let snapshot = vec![
            record("A", NOW - 10),
            record("B", NOW - 900),
            record("C", NOW - 20),
        ];

        let (events, _) = reconcile(&snapshot, &previous, NOW, THRESHOLD);

        let mut peers_seen = BTreeSet::new();
        for event in &events {
            assert!(peers_seen.insert(event.peer.clone()), "duplicate event for {}", event.peer);
        }
        assert_eq!(events.len(), 2); // C connects, B disconnects
    }

    #[test]
    fn test_connected_events_precede_disconnected() {
        let previous = ledger(&["Z"], &[("Z", NOW - 600)]);
        let snapshot = vec![record("A", NOW - 1)];

        let (events, _) = reconcile(&snapshot, &previous, NOW, THRESHOLD);

        assert_eq!(events[0].kind, Transition::Connected);
        assert_eq!(events[1].kind, Transition::Disconnected);
    }

    #[test]
    fn test_disconnect_without_prior_handshake_reports_now() {
        // connected set can outlive its handshake record across generations
        let previous = ledger(&["A"], &[]);

        let (events, _) = reconcile(&[], &previous, NOW, THRESHOLD);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].elapsed_secs, NOW);
    }

    #[test]
    fn test_duplicate_peer_last_wins() {
        let previous = Ledger::default();
        let snapshot = vec![record("A", NOW - 10), record("A", NOW - 900)];

        let (events, next) = reconcile(&snapshot, &previous, NOW, THRESHOLD);

        // the later, stale record wins: no connect, stale timestamp stored
        assert!(events.is_empty());
        assert!(!next.connected.contains(&PeerId::from("A")));
        assert_eq!(next.last_handshake[&PeerId::from("A")], NOW - 900);

        let snapshot = vec![record("A", NOW - 900), record("A", NOW - 10)];
        let (events, next) = reconcile(&snapshot, &previous, NOW, THRESHOLD);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, Transition::Connected);
        assert_eq!(events[0].elapsed_secs, 10);
        assert!(next.connected.contains(&PeerId::from("A")));
    }

    #[test]
    fn test_never_handshaked_peer_stays_disconnected() {
        // wg reports 0 for peers that never completed a handshake
        let previous = Ledger::default();
        let snapshot = vec![record("A", 0)];

        let (events, next) = reconcile(&snapshot, &previous, NOW, THRESHOLD);

        assert!(events.is_empty());
        assert!(next.connected.is_empty());
        assert_eq!(next.last_handshake[&PeerId::from("A")], 0);
    }

    #[test]
    fn test_empty_previous_yields_no_disconnects() {
        let previous = Ledger::default();
        let snapshot = vec![record("A", NOW - 5000), record("B", NOW - 9000)];

        let (events, _) = reconcile(&snapshot, &previous, NOW, THRESHOLD);

        assert!(events.is_empty());
    }

    #[test]
    fn test_ledger_is_replaced_not_merged() {
        let previous = ledger(&["A"], &[("A", NOW - 10), ("B", NOW - 20)]);
        let snapshot = vec![record("C", NOW - 1)];

        let (_, next) = reconcile(&snapshot, &previous, NOW, THRESHOLD);

        // nothing from the previous generation survives
        assert_eq!(next.last_handshake.len(), 1);
        assert!(next.last_handshake.contains_key(&PeerId::from("C")));
        assert_eq!(next.connected.len(), 1);
    }
}
