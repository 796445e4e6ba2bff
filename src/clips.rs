// src/clips.rs
//
// Clip reference resolution and hand-off to the media I/O collaborator.
//
// Events of interest (top combos, top vulnerabilities) → padded windows
// [ts - pre, ts + post] clamped to the fight → windows of the same
// fight/fighter closer than `merge_gap_secs` are merged.
// The result depends only on the event set, never on request order.

use crate::config::ClipConfig;
use crate::error::MinerResult;
use crate::types::{ClipReference, ComboPattern, EventId, StrikeEvent, VulnerabilityFinding};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// One event the clip resolver should cover.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipRequest {
    pub fight_id: String,
    /// Fighter the clip is about (thrower for combos, defender for findings)
    pub fighter_id: String,
    pub event_id: EventId,
    pub timestamp: f64,
}

/// Requests for every strike supporting the given combos and findings.
pub fn clip_requests(
    strikes: &[StrikeEvent],
    combos: &[ComboPattern],
    findings: &[VulnerabilityFinding],
) -> Vec<ClipRequest> {
    let by_id: HashMap<EventId, &StrikeEvent> = strikes.iter().map(|e| (e.event_id, e)).collect();
    let mut requests = Vec::new();

    let sources = combos
        .iter()
        .map(|c| (&c.fight_id, &c.fighter_id, &c.supporting_event_ids))
        .chain(findings.iter().map(|f| (&f.fight_id, &f.fighter_id, &f.supporting_event_ids)));
    for (fight_id, fighter_id, ids) in sources {
        for id in ids {
            if let Some(e) = by_id.get(id) {
                requests.push(ClipRequest {
                    fight_id: fight_id.clone(),
                    fighter_id: fighter_id.clone(),
                    event_id: *id,
                    timestamp: e.timestamp,
                });
            }
        }
    }
    requests
}

pub struct ClipResolver {
    config: ClipConfig,
}

impl ClipResolver {
    pub fn new(config: &ClipConfig) -> Self {
        Self { config: config.clone() }
    }

    /// `durations` maps fight id to fight length; unknown fights are only
    /// clamped at zero.
    pub fn resolve(&self, requests: &[ClipRequest], durations: &HashMap<String, f64>) -> Vec<ClipReference> {
        // Dedup and fix the order so repeated or shuffled requests agree
        let mut keyed: Vec<(&str, &str, f64, EventId)> = requests
            .iter()
            .map(|r| (r.fight_id.as_str(), r.fighter_id.as_str(), r.timestamp, r.event_id))
            .collect();
        keyed.sort_by(|a, b| {
            (a.0, a.1)
                .cmp(&(b.0, b.1))
                .then_with(|| a.2.total_cmp(&b.2))
                .then_with(|| a.3.cmp(&b.3))
        });
        keyed.dedup_by(|a, b| a.0 == b.0 && a.1 == b.1 && a.3 == b.3);

        let mut clips: Vec<ClipReference> = Vec::new();
        for (fight_id, fighter_id, ts, event_id) in keyed {
            let end_limit = durations.get(fight_id).copied().unwrap_or(f64::INFINITY);
            let start = (ts - self.config.pre_pad_secs).max(0.0);
            let end = (ts + self.config.post_pad_secs).min(end_limit);
            if end <= start {
                continue;
            }

            match clips.last_mut() {
                Some(prev)
                    if prev.fight_id == fight_id
                        && prev.fighter_id == fighter_id
                        && start - prev.end_ts <= self.config.merge_gap_secs =>
                {
                    prev.end_ts = prev.end_ts.max(end);
                    if !prev.source_event_ids.contains(&event_id) {
                        prev.source_event_ids.push(event_id);
                    }
                }
                _ => clips.push(ClipReference {
                    fight_id: fight_id.to_string(),
                    fighter_id: fighter_id.to_string(),
                    start_ts: start,
                    end_ts: end,
                    source_event_id: event_id,
                    source_event_ids: vec![event_id],
                }),
            }
        }

        debug!("resolved {} requests into {} clips", requests.len(), clips.len());
        clips
    }
}

// ============================================================================
// MEDIA I/O
// ============================================================================

/// The media cutter. Takes `(video_id, start, end)`, returns an artifact reference.
pub trait MediaSink {
    fn submit(&mut self, video_id: &str, clip: &ClipReference) -> MinerResult<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub artifact: String,
    pub video_id: String,
    pub fight_id: String,
    pub fighter_id: String,
    pub start_ts: f64,
    pub end_ts: f64,
    pub source_event_ids: Vec<EventId>,
}

/// Collects cut requests and writes them as one JSON manifest for the
/// external cutter.
#[derive(Debug, Default)]
pub struct ManifestSink {
    entries: Vec<ManifestEntry>,
    seen: BTreeSet<String>,
}

impl ManifestSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn write(&self, path: &Path) -> MinerResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&self.entries)?)?;
        info!("clip manifest: {} entries → {}", self.entries.len(), path.display());
        Ok(())
    }
}

impl MediaSink for ManifestSink {
    fn submit(&mut self, video_id: &str, clip: &ClipReference) -> MinerResult<String> {
        // Media fragment URI; identical clips map to one entry
        let artifact = format!("{}#t={:.3},{:.3}", video_id, clip.start_ts, clip.end_ts);
        if self.seen.insert(artifact.clone()) {
            self.entries.push(ManifestEntry {
                artifact: artifact.clone(),
                video_id: video_id.to_string(),
                fight_id: clip.fight_id.clone(),
                fighter_id: clip.fighter_id.clone(),
                start_ts: clip.start_ts,
                end_ts: clip.end_ts,
                source_event_ids: clip.source_event_ids.clone(),
            });
        }
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StrikeEvent, StrikeType};

    fn request(fighter: &str, ts: f64) -> ClipRequest {
        ClipRequest {
            fight_id: "f".into(),
            fighter_id: fighter.into(),
            event_id: StrikeEvent::derive_id("f", fighter, StrikeType::Jab, ts),
            timestamp: ts,
        }
    }

    fn durations() -> HashMap<String, f64> {
        HashMap::from([("f".to_string(), 60.0)])
    }

    #[test]
    fn test_nearby_events_merge_into_one_clip() {
        let resolver = ClipResolver::new(&ClipConfig::default());
        // 10.0 → [8.0, 11.5]; 12.5 → [10.5, 14.0]; 30.0 stands alone
        let requests = vec![request("red", 12.5), request("red", 10.0), request("red", 30.0)];
        let clips = resolver.resolve(&requests, &durations());

        assert_eq!(clips.len(), 2);
        assert_eq!((clips[0].start_ts, clips[0].end_ts), (8.0, 14.0));
        assert_eq!(clips[0].source_event_ids.len(), 2);
        assert_eq!(clips[0].source_event_id, request("red", 10.0).event_id);
        assert_eq!((clips[1].start_ts, clips[1].end_ts), (28.0, 31.5));
    }

    #[test]
    fn test_fighters_never_share_a_clip() {
        let resolver = ClipResolver::new(&ClipConfig::default());
        let clips = resolver.resolve(&[request("red", 10.0), request("blue", 10.2)], &durations());
        assert_eq!(clips.len(), 2);
    }

    #[test]
    fn test_resolution_is_idempotent_and_clamped() {
        let resolver = ClipResolver::new(&ClipConfig::default());
        let requests = vec![request("red", 0.5), request("red", 59.5), request("red", 0.5)];
        let once = resolver.resolve(&requests, &durations());
        let mut reversed = requests.clone();
        reversed.reverse();
        assert_eq!(once, resolver.resolve(&reversed, &durations()));
        assert_eq!(once[0].start_ts, 0.0);
        assert_eq!(once[0].source_event_ids.len(), 1);
        assert_eq!(once[1].end_ts, 60.0);
    }

    #[test]
    fn test_manifest_sink_dedups_and_writes() {
        let resolver = ClipResolver::new(&ClipConfig::default());
        let clips = resolver.resolve(&[request("red", 10.0)], &durations());
        let mut sink = ManifestSink::new();
        let a = sink.submit("vid", &clips[0]).unwrap();
        let b = sink.submit("vid", &clips[0]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "vid#t=8.000,11.500");
        assert_eq!(sink.entries().len(), 1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clips/manifest.json");
        sink.write(&path).unwrap();
        let back: Vec<ManifestEntry> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, sink.entries());
    }
}
