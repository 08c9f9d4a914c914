//! In-memory occupancy store with lazy session expiry
//!
//! Tracks which users are currently checked in. This is the single source of
//! truth for the live headcount shown at the door.
//!
//! Key behaviors:
//! - Check-in creates or refreshes a session (re-check-in resets the clock)
//! - Check-out removes the session if present, otherwise no-op
//! - A session is expired once `now - checked_in_at > session_timeout`
//! - Expired sessions are purged on every access; there is no background timer
//! - Capacity is advisory and never enforced here

use crate::infra::{Config, Metrics};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Session state for a single checked-in user
#[derive(Debug, Clone, Copy)]
struct ActiveSession {
    checked_in_at: Instant,
}

pub struct OccupancyStore {
    /// sessions[user_id] = ActiveSession
    sessions: Mutex<FxHashMap<String, ActiveSession>>,
    session_timeout: Duration,
    capacity: usize,
    metrics: Option<Arc<Metrics>>,
}

impl OccupancyStore {
    pub fn new(capacity: usize, session_timeout: Duration) -> Self {
        Self { sessions: Mutex::new(FxHashMap::default()), session_timeout, capacity, metrics: None }
    }

    pub fn from_config(config: &Config, metrics: Arc<Metrics>) -> Self {
        Self::new(config.capacity(), config.session_timeout()).with_metrics(metrics)
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record a check-in and return the active count
    pub fn check_in(&self, user_id: &str) -> usize {
        self.check_in_at(user_id, Instant::now())
    }

    pub fn check_in_at(&self, user_id: &str, now: Instant) -> usize {
        let mut sessions = self.sessions.lock();
        self.purge_expired(&mut sessions, now);

        sessions.insert(user_id.to_string(), ActiveSession { checked_in_at: now });
        let count = sessions.len();

        if let Some(metrics) = &self.metrics {
            metrics.record_check_in();
            metrics.set_occupancy(count);
        }
        count
    }

    /// Remove a session and return the active count. Unknown ids are a no-op.
    pub fn check_out(&self, user_id: &str) -> usize {
        self.check_out_at(user_id, Instant::now())
    }

    pub fn check_out_at(&self, user_id: &str, now: Instant) -> usize {
        let mut sessions = self.sessions.lock();
        self.purge_expired(&mut sessions, now);

        let removed = sessions.remove(user_id).is_some();
        let count = sessions.len();

        if let Some(metrics) = &self.metrics {
            if removed {
                metrics.record_check_out();
            }
            metrics.set_occupancy(count);
        }
        count
    }

    pub fn current_count(&self) -> usize {
        self.current_count_at(Instant::now())
    }

    pub fn current_count_at(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.lock();
        self.purge_expired(&mut sessions, now);
        sessions.len()
    }

    pub fn is_active(&self, user_id: &str) -> bool {
        self.is_active_at(user_id, Instant::now())
    }

    pub fn is_active_at(&self, user_id: &str, now: Instant) -> bool {
        let mut sessions = self.sessions.lock();
        self.purge_expired(&mut sessions, now);
        sessions.contains_key(user_id)
    }

    /// Drop every session whose age strictly exceeds the timeout
    fn purge_expired(&self, sessions: &mut FxHashMap<String, ActiveSession>, now: Instant) {
        let before = sessions.len();
        let timeout = self.session_timeout;
        sessions.retain(|_, session| now.saturating_duration_since(session.checked_in_at) <= timeout);

        let expired = before - sessions.len();
        if expired > 0 {
            debug!(expired = %expired, remaining = %sessions.len(), "sessions_expired");
            if let Some(metrics) = &self.metrics {
                metrics.record_sessions_expired(expired);
                metrics.set_occupancy(sessions.len());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(90 * 60);

    fn store() -> OccupancyStore {
        OccupancyStore::new(10, TIMEOUT)
    }

    #[test]
    fn test_check_in_and_out() {
        let store = store();
        let t0 = Instant::now();

        assert_eq!(store.check_in_at("alice", t0), 1);
        assert_eq!(store.check_in_at("bob", t0), 2);
        assert!(store.is_active_at("alice", t0));

        assert_eq!(store.check_out_at("alice", t0), 1);
        assert!(!store.is_active_at("alice", t0));
        assert_eq!(store.current_count_at(t0), 1);
    }

    #[test]
    fn test_check_out_unknown_is_noop() {
        let store = store();
        let t0 = Instant::now();
        store.check_in_at("alice", t0);

        assert_eq!(store.check_out_at("nobody", t0), 1);
    }

    #[test]
    fn test_recheck_in_keeps_count_and_resets_clock() {
        let store = store();
        let t0 = Instant::now();

        store.check_in_at("alice", t0);
        let t1 = t0 + Duration::from_secs(60 * 60);
        assert_eq!(store.check_in_at("alice", t1), 1);

        // Would have expired from t0, but the clock restarted at t1
        let t2 = t0 + TIMEOUT + Duration::from_secs(60);
        assert!(store.is_active_at("alice", t2));
        assert!(!store.is_active_at("alice", t1 + TIMEOUT + Duration::from_millis(1)));
    }

    #[test]
    fn test_session_active_at_exact_timeout() {
        let store = store();
        let t0 = Instant::now();
        store.check_in_at("alice", t0);

        assert!(store.is_active_at("alice", t0 + TIMEOUT));
        assert_eq!(store.current_count_at(t0 + TIMEOUT), 1);
    }

    #[test]
    fn test_session_expired_just_past_timeout() {
        let store = store();
        let t0 = Instant::now();
        store.check_in_at("alice", t0);

        let later = t0 + TIMEOUT + Duration::from_millis(1);
        assert_eq!(store.current_count_at(later), 0);
        assert!(!store.is_active_at("alice", later));
    }

    #[test]
    fn test_check_out_purges_expired_first() {
        let store = store();
        let t0 = Instant::now();
        store.check_in_at("alice", t0);
        store.check_in_at("bob", t0 + Duration::from_secs(60 * 60));

        let later = t0 + TIMEOUT + Duration::from_secs(1);
        assert_eq!(store.check_out_at("nobody", later), 1);
    }

    #[test]
    fn test_capacity_is_not_enforced() {
        let store = store();
        let t0 = Instant::now();

        for i in 0..10 {
            store.check_in_at(&format!("user-{i}"), t0);
        }
        assert_eq!(store.capacity(), 10);
        assert_eq!(store.check_in_at("user-10", t0), 11);
    }

    #[test]
    fn test_metrics_track_expiry_and_occupancy() {
        let metrics = Arc::new(Metrics::new());
        let store = store().with_metrics(metrics.clone());
        let t0 = Instant::now();

        store.check_in_at("alice", t0);
        store.check_in_at("bob", t0);
        assert_eq!(metrics.occupancy(), 2);

        store.current_count_at(t0 + TIMEOUT + Duration::from_secs(1));
        assert_eq!(metrics.sessions_expired_total(), 2);
        assert_eq!(metrics.occupancy(), 0);
        assert_eq!(metrics.check_ins_total(), 2);
    }

    #[test]
    fn test_concurrent_check_ins() {
        let store = store();
        let t0 = Instant::now();

        std::thread::scope(|s| {
            for worker in 0..8 {
                let store = &store;
                s.spawn(move || {
                    for i in 0..50 {
                        store.check_in_at(&format!("w{worker}-u{i}"), t0);
                    }
                });
            }
        });

        assert_eq!(store.current_count_at(t0), 400);
    }
}
