//! Submission Shield - line-oriented host
//!
//! Reads one JSON object per line on stdin and writes one JSON line per
//! input on stdout:
//! - a `SubmissionContext` → its `DecisionResult`
//! - `{"op": "label", ...}` → the recorded `TrainingExample`
//! - `{"op": "review", ...}` → the closed `QuarantineRecord`
//! - `{"op": "stats"}` → `EngineStats`
//!
//! Logs go to stderr (`RUST_LOG`, default `info`).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use submission_shield::constants::{self, APP_NAME, APP_VERSION, QUARANTINE_DB_FILE};
use submission_shield::logic::dataset::{dataset_dir, load_examples, DatasetWriter};
use submission_shield::logic::events::ChannelNotifier;
use submission_shield::logic::feedback::FeedbackLoop;
use submission_shield::logic::maintenance::{self, MaintenanceIntervals};
use submission_shield::logic::policy::load_policy_file;
use submission_shield::logic::quarantine::{MemoryQuarantineStore, SqliteQuarantineStore};
use submission_shield::{
    Label, LabelSource, Policy, PolicyStore, QuarantineStore, ReviewVerdict, ShieldEngine, ShieldError,
    ShieldResult, SubmissionContext,
};

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Command {
    Label {
        submission_id: Uuid,
        label: Label,
        #[serde(default = "default_source")]
        source: LabelSource,
        #[serde(default = "full_confidence")]
        confidence: f64,
    },
    Review {
        record_id: Uuid,
        verdict: ReviewVerdict,
        reviewer: String,
        #[serde(default)]
        notes: Option<String>,
    },
    Stats,
}

fn default_source() -> LabelSource {
    LabelSource::UserFeedback
}

fn full_confidence() -> f64 {
    1.0
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Starting {} v{}...", APP_NAME, APP_VERSION);

    let data_dir = constants::get_data_dir();
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        log::warn!("Cannot create data directory {}: {}", data_dir.display(), e);
    }
    log::info!("Data directory: {}", data_dir.display());

    // Policy (+ hot reload)
    let policy_path = constants::get_policy_path();
    let store = match init_policy(policy_path.as_deref()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            log::error!("Cannot build a valid policy: {}", e);
            std::process::exit(1);
        }
    };
    let _watcher = policy_path.as_deref().and_then(|path| match store.watch(path) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            log::warn!("Policy hot reload disabled: {}", e);
            None
        }
    });
    let policy = store.current().policy.clone();

    // Quarantine log
    let quarantine: Arc<dyn QuarantineStore> =
        match SqliteQuarantineStore::open(&data_dir.join(QUARANTINE_DB_FILE), policy.quarantine.max_records) {
            Ok(sqlite) => Arc::new(sqlite),
            Err(e) => {
                log::warn!("SQLite quarantine unavailable ({}), keeping records in memory", e);
                Arc::new(MemoryQuarantineStore::new(policy.quarantine.max_records))
            }
        };

    // Decision events
    let (notifier, mut events) = ChannelNotifier::new();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log::warn!(
                "[submission {}] {} ({}) score={:.2} ip={}",
                event.submission_id,
                event.event,
                event.action,
                event.score,
                event.ip
            );
        }
    });

    // Feedback loop + engine
    let mut engine = ShieldEngine::new(Arc::clone(&store), quarantine, Arc::new(notifier)).with_data_dir(&data_dir);
    if constants::is_learning_enabled() {
        engine = engine.with_feedback(init_feedback(&data_dir, &policy));
    }
    if let Some(ms) = constants::get_captcha_timeout_ms() {
        engine = engine.with_captcha_timeout(Duration::from_millis(ms));
    }
    engine.load_snapshots();
    let engine = Arc::new(engine);

    let jobs = if constants::is_learning_enabled() {
        maintenance::spawn(Arc::clone(&engine), MaintenanceIntervals::from_env())
    } else {
        Vec::new()
    };

    if let Err(e) = serve(&engine).await {
        log::error!("Input loop stopped: {}", e);
    }

    for job in jobs {
        job.abort();
    }
    if let Err(e) = engine.persist_snapshots() {
        log::error!("Failed to persist snapshots: {}", e);
    }
    let stats = engine.stats();
    log::info!(
        "Shutting down: {} evaluated ({} allowed, {} challenged, {} quarantined, {} blocked)",
        stats.evaluated,
        stats.allowed,
        stats.challenged,
        stats.quarantined,
        stats.blocked
    );
}

fn init_policy(path: Option<&Path>) -> ShieldResult<PolicyStore> {
    let Some(path) = path else {
        log::info!("No policy file configured, using defaults");
        return PolicyStore::new(Policy::default());
    };
    match load_policy_file(path).and_then(PolicyStore::new) {
        Ok(store) => {
            log::info!("Policy v{} loaded from {}", store.version(), path.display());
            Ok(store)
        }
        Err(e) => {
            log::error!("Policy file {} rejected ({}), using defaults", path.display(), e);
            PolicyStore::new(Policy::default())
        }
    }
}

fn init_feedback(data_dir: &Path, policy: &Policy) -> FeedbackLoop {
    let dir = dataset_dir(data_dir);
    let feedback = FeedbackLoop::new(&policy.learning);

    match load_examples(&dir, policy.learning.window_size) {
        Ok(examples) if !examples.is_empty() => feedback.preload(examples),
        Ok(_) => {}
        Err(e) => log::warn!("Cannot read training dataset {}: {}", dir.display(), e),
    }

    match DatasetWriter::from_path(dir.clone()) {
        Ok(writer) => feedback.with_dataset(writer),
        Err(e) => {
            log::warn!("Training dataset disabled ({}): {}", dir.display(), e);
            feedback
        }
    }
}

async fn serve(engine: &Arc<ShieldEngine>) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let reply = match handle(engine, line).await {
            Ok(value) => value,
            Err(e) => serde_json::json!({ "error": e.to_string(), "kind": e.kind() }),
        };
        stdout.write_all(reply.to_string().as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}

async fn handle(engine: &ShieldEngine, line: &str) -> ShieldResult<serde_json::Value> {
    let value: serde_json::Value =
        serde_json::from_str(line).map_err(|e| ShieldError::Input(format!("malformed JSON line: {}", e)))?;

    if value.get("op").is_none() {
        let ctx: SubmissionContext = serde_json::from_value(value)
            .map_err(|e| ShieldError::Input(format!("malformed submission: {}", e)))?;
        return Ok(serde_json::to_value(engine.evaluate(ctx).await)?);
    }

    let command: Command =
        serde_json::from_value(value).map_err(|e| ShieldError::Input(format!("malformed command: {}", e)))?;
    let reply = match command {
        Command::Label { submission_id, label, source, confidence } => {
            serde_json::to_value(engine.record_label(submission_id, label, source, confidence)?)?
        }
        Command::Review { record_id, verdict, reviewer, notes } => {
            serde_json::to_value(engine.review(record_id, verdict, &reviewer, notes.as_deref())?)?
        }
        Command::Stats => serde_json::to_value(engine.stats())?,
    };
    Ok(reply)
}
