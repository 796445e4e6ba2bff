// src/main.rs
//
// Batch run: every fight JSON under io.input_dir → fight jobs (concurrent,
// independent) → corpus rows → style book → clips → event log.

use anyhow::{Context, Result};
use fight_miner::clips::{ClipResolver, ManifestSink, MediaSink};
use fight_miner::config::Config;
use fight_miner::export::{EventLogWriter, EventRecord};
use fight_miner::fight_source::FightSource;
use fight_miner::inference::LogitPoolingScorer;
use fight_miner::pipeline::{run_fight, AnalysisContext, CancelToken, FightReport};
use fight_miner::style::{load_corpus, load_outcomes, write_record, ExemplarSet, StyleBook};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path)?,
        None if Path::new("config.yaml").exists() => Config::load("config.yaml")?,
        None => Config::default(),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fight_miner={}", config.logging.level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🥊 Fight pattern miner starting");
    info!(
        "Thresholds: nms_overlap={:.2}s, floor={:.2}, guard_dwell={}f, vuln_min_n={}, vuln_min_effect={:.2}",
        config.nms.overlap_secs,
        config.nms.confidence_floor,
        config.smoother.guard.min_dwell_frames,
        config.vulnerability.min_sample_size,
        config.vulnerability.min_effect_size
    );

    let fight_files = FightSource::new(&config.io).find_fight_files()?;
    if fight_files.is_empty() {
        error!("No fight files found in {}", config.io.input_dir);
        return Ok(());
    }

    let output_dir = PathBuf::from(&config.io.output_dir);
    fs::create_dir_all(&output_dir).with_context(|| format!("creating {}", output_dir.display()))?;

    let ctx = Arc::new(AnalysisContext::new(config.clone(), Arc::new(LogitPoolingScorer::new())));
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling fight jobs");
                cancel.cancel();
            }
        });
    }

    let reports = run_all(&ctx, fight_files, &cancel, config.io.max_concurrent_fights).await;
    info!("✓ {} fight jobs finished", reports.len());

    // Corpus rows from this run, then re-cluster over the whole corpus
    let corpus_dir = PathBuf::from(&config.io.corpus_dir);
    for report in &reports {
        for record in &report.features {
            if let Err(e) = write_record(&corpus_dir, record) {
                error!("Failed to write corpus record for {}: {}", record.fighter_id, e);
            }
        }
    }
    let style_book = build_style_book(&config, &corpus_dir)?;
    let book_path = output_dir.join("style_book.json");
    fs::write(&book_path, serde_json::to_string_pretty(&style_book)?)
        .with_context(|| format!("writing {}", book_path.display()))?;
    info!("✓ Style book: {} profiles → {}", style_book.profiles.len(), book_path.display());

    // Clips for top combos and findings
    let resolver = ClipResolver::new(&config.clips);
    let durations: HashMap<String, f64> = reports.iter().map(|r| (r.fight_id.clone(), r.duration)).collect();
    let mut sink = ManifestSink::new();
    let mut clips_by_fight = HashMap::new();
    for report in &reports {
        let clips = resolver.resolve(&report.clip_requests(), &durations);
        for clip in &clips {
            sink.submit(&report.video_id, clip)?;
        }
        clips_by_fight.insert(report.fight_id.clone(), clips);
    }
    sink.write(&output_dir.join("clips_manifest.json"))?;

    // Event log: style profiles (no fight id) first, then fights in id order
    let log_path = output_dir.join("events.jsonl");
    let mut log = EventLogWriter::create(&log_path)?;
    log.append(style_book.profiles.iter().cloned().map(EventRecord::Style).collect())?;
    for report in &reports {
        let mut records = report.to_records();
        if let Some(clips) = clips_by_fight.remove(&report.fight_id) {
            records.extend(clips.into_iter().map(EventRecord::Clip));
        }
        log.append(records)?;
    }
    let written = log.finish()?;
    info!("✓ Event log: {} records → {}", written, log_path.display());

    for report in &reports {
        if !report.status().is_complete() {
            warn!("  ⚠️  {} ended partial: {:?}", report.fight_id, report.status());
        }
    }

    match Arc::try_unwrap(ctx) {
        Ok(ctx) => {
            let summary = ctx.shutdown().await;
            info!("Run summary: {}", serde_json::to_string(&summary)?);
        }
        Err(_) => warn!("Analysis context still shared at exit; pool not drained"),
    }

    Ok(())
}

/// Run every fight, at most `max_concurrent` at a time. Fights that fail to
/// load or validate are logged and left out.
async fn run_all(
    ctx: &Arc<AnalysisContext>,
    fight_files: Vec<PathBuf>,
    cancel: &CancelToken,
    max_concurrent: usize,
) -> Vec<FightReport> {
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let total = fight_files.len();

    let mut handles = Vec::with_capacity(total);
    for (idx, path) in fight_files.into_iter().enumerate() {
        let ctx = Arc::clone(ctx);
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            info!("Processing fight {}/{}: {}", idx + 1, total, path.display());
            let fight = match FightSource::load(&path) {
                Ok(f) => f,
                Err(e) => {
                    error!("Failed to load {}: {}", path.display(), e);
                    return None;
                }
            };
            match run_fight(&ctx, fight, cancel).await {
                Ok(report) => Some(report),
                Err(e) => {
                    error!("Fight {} rejected: {}", path.display(), e);
                    None
                }
            }
        }));
    }

    let mut reports = Vec::with_capacity(total);
    for handle in handles {
        match handle.await {
            Ok(Some(report)) => reports.push(report),
            Ok(None) => {}
            Err(e) => error!("Fight task ended abnormally: {}", e),
        }
    }
    reports.sort_by(|a, b| a.fight_id.cmp(&b.fight_id));
    reports
}

fn build_style_book(config: &Config, corpus_dir: &Path) -> Result<StyleBook> {
    let corpus = load_corpus(corpus_dir)?;
    let exemplars = ExemplarSet::load(Path::new(&config.io.exemplars_path))?;
    let book = StyleBook::build(&corpus, &exemplars, &config.style);

    Ok(match &config.io.outcomes_path {
        Some(path) => {
            let outcomes = load_outcomes(Path::new(path)).with_context(|| format!("loading outcomes {}", path))?;
            book.with_outcomes(&corpus, &outcomes, &config.style)
        }
        None => book,
    })
}
