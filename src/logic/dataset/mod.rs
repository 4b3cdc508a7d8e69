//! Dataset Module - training example log
//!
//! Every established label is appended to a rotating JSONL log so the
//! feedback window survives restarts. On startup the newest examples are
//! read back into the feedback loop.

pub mod writer;


use std::fs;
use std::path::{Path, PathBuf};

use crate::logic::error::ShieldResult;
use crate::logic::feedback::types::TrainingExample;
pub use writer::{list_dataset_files, DatasetStats, DatasetWriter};

/// Dataset directory under a data root
pub fn dataset_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("dataset")
}

/// Read back the newest examples: at most `limit` classifier-eligible ones
/// and at most `limit` automated ones, matching the feedback windows.
/// Files are read newest first and reading stops once both are full.
/// Malformed lines are skipped and counted in the log.
pub fn load_examples(dir: &Path, limit: usize) -> ShieldResult<Vec<TrainingExample>> {
    let mut labeled = Vec::new();
    let mut automated = Vec::new();
    let mut skipped = 0usize;

    'files: for path in list_dataset_files(dir)?.iter().rev() {
        if labeled.len() >= limit && automated.len() >= limit {
            break;
        }
        let content = fs::read_to_string(path)?;
        for line in content.lines().rev().filter(|l| !l.trim().is_empty()) {
            let example = match serde_json::from_str::<TrainingExample>(line) {
                Ok(example) => example,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };
            let window = if example.source.trains_classifier() { &mut labeled } else { &mut automated };
            if window.len() < limit {
                window.push(example);
            }
            if labeled.len() >= limit && automated.len() >= limit {
                break 'files;
            }
        }
    }

    if skipped > 0 {
        log::warn!("Skipped {} malformed dataset lines in {}", skipped, dir.display());
    }

    // collected newest first; restore write order before merging
    labeled.reverse();
    automated.reverse();
    let mut examples: Vec<TrainingExample> = labeled.into_iter().chain(automated).collect();
    examples.sort_by_key(|e| e.recorded_at);
    Ok(examples)
}
