//! Statistics for signaling sessions

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live per-session signaling counters
///
/// Updated from the connection task and the media event task of the same
/// session, so every counter is an independent atomic.
#[derive(Debug)]
pub struct SignalingStats {
    started_at: Instant,
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
    offers_ignored: AtomicU64,
    negotiations: AtomicU64,
    stale_negotiations: AtomicU64,
    candidates_applied: AtomicU64,
    failures: AtomicU64,
}

impl SignalingStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            messages_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            offers_ignored: AtomicU64::new(0),
            negotiations: AtomicU64::new(0),
            stale_negotiations: AtomicU64::new(0),
            candidates_applied: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub(crate) fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn offer_ignored(&self) {
        self.offers_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn negotiation_started(&self) {
        self.negotiations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn negotiation_stale(&self) {
        self.stale_negotiations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn candidate_applied(&self) {
        self.candidates_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> SignalingSnapshot {
        SignalingSnapshot {
            duration: self.started_at.elapsed(),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            offers_ignored: self.offers_ignored.load(Ordering::Relaxed),
            negotiations: self.negotiations.load(Ordering::Relaxed),
            stale_negotiations: self.stale_negotiations.load(Ordering::Relaxed),
            candidates_applied: self.candidates_applied.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for SignalingStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Session-level statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalingSnapshot {
    /// Time since the session was created
    pub duration: Duration,
    /// Signaling frames received from the peer
    pub messages_received: u64,
    /// Signaling frames queued to the peer
    pub messages_sent: u64,
    /// Incoming offers dropped by the glare rule
    pub offers_ignored: u64,
    /// Local offers started
    pub negotiations: u64,
    /// Negotiation-needed events superseded by a newer one
    pub stale_negotiations: u64,
    /// Remote candidates accepted by the engine
    pub candidates_applied: u64,
    /// Decode or engine failures
    pub failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = SignalingStats::new();
        let snapshot = stats.snapshot();

        assert_eq!(snapshot.messages_received, 0);
        assert_eq!(snapshot.messages_sent, 0);
        assert_eq!(snapshot.offers_ignored, 0);
        assert_eq!(snapshot.negotiations, 0);
        assert_eq!(snapshot.stale_negotiations, 0);
        assert_eq!(snapshot.candidates_applied, 0);
        assert_eq!(snapshot.failures, 0);
    }

    #[test]
    fn test_stats_counters() {
        let stats = SignalingStats::new();

        stats.message_received();
        stats.message_received();
        stats.message_sent();
        stats.offer_ignored();
        stats.negotiation_started();
        stats.negotiation_stale();
        stats.negotiation_stale();
        stats.candidate_applied();
        stats.failure();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.messages_received, 2);
        assert_eq!(snapshot.messages_sent, 1);
        assert_eq!(snapshot.offers_ignored, 1);
        assert_eq!(snapshot.negotiations, 1);
        assert_eq!(snapshot.stale_negotiations, 2);
        assert_eq!(snapshot.candidates_applied, 1);
        assert_eq!(snapshot.failures, 1);
    }
}
