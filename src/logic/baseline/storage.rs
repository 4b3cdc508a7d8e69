use std::fs;
use std::path::Path;

use crate::logic::error::{ShieldError, ShieldResult};
use super::types::BehavioralBaseline;
use super::validate::validate_baseline;

pub const BASELINE_FILE: &str = "baseline_v1.json";

/// Save baseline to disk
pub fn save_baseline(baseline: &BehavioralBaseline, path: &Path) -> ShieldResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_vec_pretty(baseline)?;
    fs::write(path, json)?;
    Ok(())
}

/// Load baseline from disk with validation
pub fn load_baseline(path: &Path) -> ShieldResult<BehavioralBaseline> {
    if !path.exists() {
        return Err(ShieldError::Storage(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "baseline file not found",
        )));
    }

    let data = fs::read(path)?;
    let baseline: BehavioralBaseline = serde_json::from_slice(&data)?;

    validate_baseline(&baseline)?;

    Ok(baseline)
}
