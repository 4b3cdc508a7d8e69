//! IP Reputation Tracker
//!
//! Sharded per-IP map. Each operation takes the shard entry for one IP, so
//! reads/writes for an address are linearizable while different addresses
//! rarely contend. Callers only see cloned records, never the map.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::logic::policy::config::ReputationPolicy;
use super::types::{IpReputationRecord, Observation, Outcome, ReputationStats, SubmissionMark};

#[derive(Default)]
pub struct IpReputationTracker {
    records: DashMap<String, IpReputationRecord>,
}

impl IpReputationTracker {
    pub fn new() -> Self {
        Self { records: DashMap::new() }
    }

    /// Current record, creating a neutral one on first sighting
    pub fn get(&self, ip: &str, now: DateTime<Utc>, policy: &ReputationPolicy) -> IpReputationRecord {
        self.records
            .entry(ip.to_string())
            .or_insert_with(|| IpReputationRecord::new(ip, policy.initial_risk, now))
            .clone()
    }

    /// Record without creating one
    pub fn peek(&self, ip: &str) -> Option<IpReputationRecord> {
        self.records.get(ip).map(|r| r.value().clone())
    }

    /// Apply one observed outcome: EMA on risk, counters, rate-limit history
    pub fn update(&self, ip: &str, obs: &Observation, policy: &ReputationPolicy) -> IpReputationRecord {
        let mut record = self
            .records
            .entry(ip.to_string())
            .or_insert_with(|| IpReputationRecord::new(ip, policy.initial_risk, obs.at));

        if !record.flagged {
            let observed = obs.score.clamp(0.0, 1.0);
            let next = policy.alpha * observed + (1.0 - policy.alpha) * record.risk_score;
            record.set_risk(next);
        }

        record.submission_count += 1;
        if obs.outcome == Outcome::Blocked {
            record.block_count += 1;
        }
        if obs.at > record.last_seen {
            record.last_seen = obs.at;
        }
        record.push_mark(
            SubmissionMark { at: obs.at, endpoint: obs.endpoint.clone() },
            policy.history_len,
            Duration::seconds(policy.history_window_secs as i64),
        );

        record.clone()
    }

    /// Count a honeypot hit; at the threshold the IP is flagged for good
    pub fn record_honeypot_violation(
        &self,
        ip: &str,
        now: DateTime<Utc>,
        policy: &ReputationPolicy,
    ) -> IpReputationRecord {
        let mut record = self
            .records
            .entry(ip.to_string())
            .or_insert_with(|| IpReputationRecord::new(ip, policy.initial_risk, now));

        record.honeypot_violations += 1;
        if !record.flagged && record.honeypot_violations >= policy.honeypot_flag_threshold {
            record.flag();
            log::warn!(
                "IP {} flagged malicious after {} honeypot violations",
                ip,
                record.honeypot_violations
            );
        }

        record.clone()
    }

    /// Operator flag
    pub fn flag(&self, ip: &str, now: DateTime<Utc>, policy: &ReputationPolicy) -> IpReputationRecord {
        let mut record = self
            .records
            .entry(ip.to_string())
            .or_insert_with(|| IpReputationRecord::new(ip, policy.initial_risk, now));
        record.flag();
        log::info!("IP {} manually flagged malicious", ip);
        record.clone()
    }

    pub fn forget(&self, ip: &str) -> bool {
        self.records.remove(ip).is_some()
    }

    /// Evict records idle longer than the TTL. Flagged records stay.
    pub fn sweep(&self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let before = self.records.len();
        self.records.retain(|_, r| r.flagged || now - r.last_seen < ttl);
        let evicted = before.saturating_sub(self.records.len());
        if evicted > 0 {
            log::debug!("Reputation sweep evicted {} idle records", evicted);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stats(&self) -> ReputationStats {
        use super::types::ReputationTier::*;

        let mut stats = ReputationStats::default();
        for entry in self.records.iter() {
            stats.total += 1;
            match entry.tier {
                Good => stats.good += 1,
                Neutral => stats.neutral += 1,
                Suspicious => stats.suspicious += 1,
                Malicious => stats.malicious += 1,
            }
            if entry.flagged {
                stats.flagged += 1;
            }
        }
        stats
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::reputation::types::ReputationTier;
    use std::sync::Arc;

    fn obs(outcome: Outcome, score: f64, at: DateTime<Utc>) -> Observation {
        Observation { endpoint: "/submit".to_string(), outcome, score, at }
    }

    #[test]
    fn test_first_sighting_is_neutral() {
        let tracker = IpReputationTracker::new();
        let policy = ReputationPolicy::default();
        let rec = tracker.get("192.0.2.1", Utc::now(), &policy);
        assert_eq!(rec.tier, ReputationTier::Neutral);
        assert_eq!(rec.submission_count, 0);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_ema_update() {
        let tracker = IpReputationTracker::new();
        let policy = ReputationPolicy::default();
        let now = Utc::now();

        // 0.5 * 1.0 + 0.5 * 0.3 = 0.65
        let rec = tracker.update("192.0.2.1", &obs(Outcome::Blocked, 1.0, now), &policy);
        assert!((rec.risk_score - 0.65).abs() < 1e-9);
        assert_eq!(rec.tier, ReputationTier::Suspicious);
        assert_eq!(rec.block_count, 1);
        assert_eq!(rec.submission_count, 1);

        // 0.5 * 0.0 + 0.5 * 0.65 = 0.325
        let rec = tracker.update("192.0.2.1", &obs(Outcome::Allowed, 0.0, now), &policy);
        assert!((rec.risk_score - 0.325).abs() < 1e-9);
        assert_eq!(rec.block_count, 1);
        assert_eq!(rec.recent.len(), 2);
    }

    #[test]
    fn test_honeypot_flag_is_permanent() {
        let tracker = IpReputationTracker::new();
        let policy = ReputationPolicy::default();
        let now = Utc::now();
        let ip = "198.51.100.9";

        tracker.record_honeypot_violation(ip, now, &policy);
        let rec = tracker.record_honeypot_violation(ip, now, &policy);
        assert!(!rec.flagged);

        let rec = tracker.record_honeypot_violation(ip, now, &policy);
        assert!(rec.flagged);
        assert_eq!(rec.risk_score, 1.0);

        for _ in 0..20 {
            tracker.update(ip, &obs(Outcome::Allowed, 0.0, now), &policy);
        }
        let rec = tracker.get(ip, now, &policy);
        assert_eq!(rec.risk_score, 1.0);
        assert_eq!(rec.tier, ReputationTier::Malicious);
    }

    #[test]
    fn test_sweep_evicts_idle_but_keeps_flagged() {
        let tracker = IpReputationTracker::new();
        let policy = ReputationPolicy::default();
        let old = Utc::now() - Duration::hours(30);

        tracker.get("192.0.2.1", old, &policy);
        tracker.flag("192.0.2.2", old, &policy);
        tracker.get("192.0.2.3", Utc::now(), &policy);

        let evicted = tracker.sweep(Utc::now(), Duration::hours(24));
        assert_eq!(evicted, 1);
        assert!(tracker.peek("192.0.2.1").is_none());
        assert!(tracker.peek("192.0.2.2").is_some());
        assert!(tracker.peek("192.0.2.3").is_some());
    }

    #[test]
    fn test_stats_and_forget() {
        let tracker = IpReputationTracker::new();
        let policy = ReputationPolicy::default();
        let now = Utc::now();
        tracker.get("192.0.2.1", now, &policy);
        tracker.flag("192.0.2.2", now, &policy);

        let stats = tracker.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.neutral, 1);
        assert_eq!(stats.malicious, 1);
        assert_eq!(stats.flagged, 1);

        assert!(tracker.forget("192.0.2.1"));
        assert!(!tracker.forget("192.0.2.1"));
    }

    #[test]
    fn test_concurrent_updates_same_ip() {
        let tracker = Arc::new(IpReputationTracker::new());
        let policy = ReputationPolicy::default();
        let now = Utc::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        tracker.update("192.0.2.50", &obs(Outcome::Allowed, 0.2, now), &policy);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let rec = tracker.get("192.0.2.50", now, &policy);
        assert_eq!(rec.submission_count, 400);
    }
}
