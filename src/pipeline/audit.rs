// src/pipeline/audit.rs
//
// Per-job record of every skip/suppress decision, with enough context
// (fight, fighter, time range, reason) to audit a run without reprocessing.
// Owned by one fight job; bounded, oldest entries dropped when full.

use crate::error::MinerError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub fight_id: String,
    pub fighter_id: Option<String>,
    pub start_ts: f64,
    pub end_ts: f64,
    /// Error kind, e.g. `corrupt_frame_batch`
    pub kind: String,
    pub reason: String,
}

pub struct AuditLog {
    fight_id: String,
    records: VecDeque<AuditRecord>,
    capacity: usize,
    dropped: u64,
}

impl AuditLog {
    pub fn new(fight_id: &str, capacity: usize) -> Self {
        Self {
            fight_id: fight_id.to_string(),
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Record a skip/suppress decision and log it. Expected, routine drops
    /// (low confidence, thin samples) log at debug; the rest at warn.
    pub fn record(&mut self, fighter_id: Option<&str>, start_ts: f64, end_ts: f64, err: &MinerError) {
        let fighter = fighter_id.unwrap_or("-");
        match err {
            MinerError::LowConfidenceSkip { .. } | MinerError::InsufficientSample { .. } => debug!(
                fight = %self.fight_id,
                fighter = %fighter,
                start_ts,
                end_ts,
                kind = err.kind(),
                "{}",
                err
            ),
            _ => warn!(
                fight = %self.fight_id,
                fighter = %fighter,
                start_ts,
                end_ts,
                kind = err.kind(),
                "{}",
                err
            ),
        }

        if self.records.len() >= self.capacity {
            self.records.pop_front();
            self.dropped += 1;
            if self.dropped == 1 {
                warn!(
                    fight = %self.fight_id,
                    "audit log full ({} records), dropping oldest",
                    self.capacity
                );
            }
        }
        self.records.push_back(AuditRecord {
            fight_id: self.fight_id.clone(),
            fighter_id: fighter_id.map(str::to_string),
            start_ts,
            end_ts,
            kind: err.kind().to_string(),
            reason: err.to_string(),
        });
    }

    pub fn count_kind(&self, kind: &str) -> usize {
        self.records.iter().filter(|r| r.kind == kind).count()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<AuditRecord> {
        self.records.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_carry_context() {
        let mut log = AuditLog::new("ufc300-1", 10);
        log.record(
            Some("red"),
            1.0,
            1.5,
            &MinerError::CorruptFrameBatch {
                window_id: 7,
                start_frame: 30,
                end_frame: 46,
                reason: "bad logits".into(),
            },
        );
        let records = log.into_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fight_id, "ufc300-1");
        assert_eq!(records[0].fighter_id.as_deref(), Some("red"));
        assert_eq!(records[0].kind, "corrupt_frame_batch");
        assert!(records[0].reason.contains("window 7"));
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut log = AuditLog::new("f", 2);
        for i in 0..3 {
            log.record(None, i as f64, i as f64, &MinerError::Cancelled);
        }
        assert_eq!(log.len(), 2);
        assert_eq!(log.dropped(), 1);
        assert_eq!(log.into_records()[0].start_ts, 1.0);
    }
}
