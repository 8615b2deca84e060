use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// Point-in-time copy of relay counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStatsSnapshot {
    /// Total number of sessions (A) or logical frames (B) started
    pub total_sessions: u64,
    /// Currently active sessions
    pub active_sessions: u64,
    /// Sentinels written to the link
    pub sentinels_sent: u64,
    /// Sentinels read from the link
    pub sentinels_received: u64,
    /// Backend dials that failed (B only)
    pub dial_failures: u64,
    /// Bytes written to the link
    pub bytes_to_link: u64,
    /// Bytes read from the link
    pub bytes_from_link: u64,
    /// Unix timestamp when the tracker was created
    pub start_time: u64,
}

/// Shared counters for one side of the tunnel
#[derive(Debug, Clone)]
pub struct RelayStats {
    total_sessions: Arc<AtomicU64>,
    active_sessions: Arc<AtomicU64>,
    sentinels_sent: Arc<AtomicU64>,
    sentinels_received: Arc<AtomicU64>,
    dial_failures: Arc<AtomicU64>,
    bytes_to_link: Arc<AtomicU64>,
    bytes_from_link: Arc<AtomicU64>,
    start_time: u64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            total_sessions: Arc::new(AtomicU64::new(0)),
            active_sessions: Arc::new(AtomicU64::new(0)),
            sentinels_sent: Arc::new(AtomicU64::new(0)),
            sentinels_received: Arc::new(AtomicU64::new(0)),
            dial_failures: Arc::new(AtomicU64::new(0)),
            bytes_to_link: Arc::new(AtomicU64::new(0)),
            bytes_from_link: Arc::new(AtomicU64::new(0)),
            start_time: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        }
    }

    /// Count a new session and return a guard that marks it ended on drop
    pub fn session_started(&self) -> SessionGuard {
        self.total_sessions.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
        SessionGuard {
            stats: self.clone(),
        }
    }

    pub fn sentinel_sent(&self) {
        self.sentinels_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sentinel_received(&self) {
        self.sentinels_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dial_failed(&self) {
        self.dial_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_to_link(&self, bytes: u64) {
        self.bytes_to_link.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_bytes_from_link(&self, bytes: u64) {
        self.bytes_from_link.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Get current snapshot of stats
    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            total_sessions: self.total_sessions.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            sentinels_sent: self.sentinels_sent.load(Ordering::Relaxed),
            sentinels_received: self.sentinels_received.load(Ordering::Relaxed),
            dial_failures: self.dial_failures.load(Ordering::Relaxed),
            bytes_to_link: self.bytes_to_link.load(Ordering::Relaxed),
            bytes_from_link: self.bytes_from_link.load(Ordering::Relaxed),
            start_time: self.start_time,
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard to automatically decrement active sessions count
pub struct SessionGuard {
    stats: RelayStats,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.stats.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_guard_tracks_active() {
        let stats = RelayStats::new();
        {
            let _a = stats.session_started();
            let _b = stats.session_started();
            assert_eq!(stats.snapshot().active_sessions, 2);
        }
        let snap = stats.snapshot();
        assert_eq!(snap.active_sessions, 0);
        assert_eq!(snap.total_sessions, 2);
    }

    #[test]
    fn test_counters_shared_between_clones() {
        let stats = RelayStats::new();
        let other = stats.clone();

        other.sentinel_sent();
        other.add_bytes_to_link(4096);
        stats.add_bytes_from_link(10);
        stats.dial_failed();

        let snap = stats.snapshot();
        assert_eq!(snap.sentinels_sent, 1);
        assert_eq!(snap.bytes_to_link, 4096);
        assert_eq!(snap.bytes_from_link, 10);
        assert_eq!(snap.dial_failures, 1);
        assert_eq!(snap.sentinels_received, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(RelayStats::new().snapshot()).unwrap();
        assert_eq!(json["total_sessions"], 0);
        assert!(json["start_time"].as_u64().is_some());
    }
}
