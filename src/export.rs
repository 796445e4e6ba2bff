// src/export.rs
//
// Versioned JSON-lines event log, the terminal output of a run.
//
//   line 1:  {"schema_version":1,"generated_at":"..."}
//   line 2+: {"kind":"strike","record":{...}}   one entity per line
//
// Records are ordered by (fight_id, fighter_id, timestamp). Aggregates with
// no timestamp of their own (pressure, combos, findings, profiles, job
// summaries) follow the fighter's timed records in insertion order.

use crate::error::{MinerError, MinerResult};
use crate::pipeline::audit::AuditRecord;
use crate::pipeline::fight_job::JobSummary;
use crate::types::{
    ClipReference, ComboPattern, PressureSample, StateSegment, StrikeEvent, StyleProfile, VulnerabilityFinding,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogHeader {
    pub schema_version: u32,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum EventRecord {
    Strike(StrikeEvent),
    Segment(StateSegment),
    Pressure(PressureSample),
    Combo(ComboPattern),
    Vulnerability(VulnerabilityFinding),
    Style(StyleProfile),
    Clip(ClipReference),
    Audit(AuditRecord),
    Job(JobSummary),
}

impl EventRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Strike(_) => "strike",
            Self::Segment(_) => "segment",
            Self::Pressure(_) => "pressure",
            Self::Combo(_) => "combo",
            Self::Vulnerability(_) => "vulnerability",
            Self::Style(_) => "style",
            Self::Clip(_) => "clip",
            Self::Audit(_) => "audit",
            Self::Job(_) => "job",
        }
    }

    pub fn fight_id(&self) -> &str {
        match self {
            Self::Strike(r) => &r.fight_id,
            Self::Segment(r) => &r.fight_id,
            Self::Pressure(r) => &r.fight_id,
            Self::Combo(r) => &r.fight_id,
            Self::Vulnerability(r) => &r.fight_id,
            Self::Style(_) => "",
            Self::Clip(r) => &r.fight_id,
            Self::Audit(r) => &r.fight_id,
            Self::Job(r) => &r.fight_id,
        }
    }

    pub fn fighter_id(&self) -> &str {
        match self {
            Self::Strike(r) => &r.fighter_id,
            Self::Segment(r) => &r.fighter_id,
            Self::Pressure(r) => &r.fighter_id,
            Self::Combo(r) => &r.fighter_id,
            Self::Vulnerability(r) => &r.fighter_id,
            Self::Style(r) => &r.fighter_id,
            Self::Clip(r) => &r.fighter_id,
            Self::Audit(r) => r.fighter_id.as_deref().unwrap_or(""),
            Self::Job(_) => "",
        }
    }

    pub fn timestamp(&self) -> Option<f64> {
        match self {
            Self::Strike(r) => Some(r.timestamp),
            Self::Segment(r) => Some(r.start_ts),
            Self::Clip(r) => Some(r.start_ts),
            Self::Audit(r) => Some(r.start_ts),
            _ => None,
        }
    }
}

fn compare_records(a: &EventRecord, b: &EventRecord) -> Ordering {
    (a.fight_id(), a.fighter_id())
        .cmp(&(b.fight_id(), b.fighter_id()))
        .then_with(|| match (a.timestamp(), b.timestamp()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
}

/// Stable sort into log order.
pub fn order_records(records: &mut [EventRecord]) {
    records.sort_by(compare_records);
}

pub struct EventLogWriter {
    out: BufWriter<File>,
    written: usize,
}

impl EventLogWriter {
    pub fn create(path: &Path) -> MinerResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(path)?);
        let header = LogHeader {
            schema_version: SCHEMA_VERSION,
            generated_at: Utc::now(),
        };
        serde_json::to_writer(&mut out, &header)?;
        out.write_all(b"\n")?;
        Ok(Self { out, written: 0 })
    }

    /// Append one block of records (callers append fights in fight-id order).
    pub fn append(&mut self, mut records: Vec<EventRecord>) -> MinerResult<()> {
        order_records(&mut records);
        for r in &records {
            serde_json::to_writer(&mut self.out, r)?;
            self.out.write_all(b"\n")?;
        }
        self.written += records.len();
        Ok(())
    }

    pub fn finish(mut self) -> MinerResult<usize> {
        self.out.flush()?;
        info!("event log: {} records written", self.written);
        Ok(self.written)
    }
}

/// Read a log back, rejecting any schema version this build does not know.
pub fn read_event_log(path: &Path) -> MinerResult<(LogHeader, Vec<EventRecord>)> {
    let mut lines = BufReader::new(File::open(path)?).lines();
    let first = match lines.next() {
        Some(line) => line?,
        None => return Err(MinerError::InvalidInput(format!("{} is empty", path.display()))),
    };
    let header: LogHeader = serde_json::from_str(&first)?;
    if header.schema_version != SCHEMA_VERSION {
        return Err(MinerError::Schema {
            expected: SCHEMA_VERSION,
            found: header.schema_version,
        });
    }

    let mut records = Vec::new();
    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok((header, records))
}
