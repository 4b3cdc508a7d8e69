//! Classifier persistence
//!
//! The model is written as `{checksum, payload}` where `payload` is the model
//! JSON as a string and `checksum` its hex SHA-256. Hashing the exact stored
//! text keeps verification independent of float formatting.

use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::logic::error::{ShieldError, ShieldResult};
use super::classifier::ClassifierModel;

#[derive(Debug, Serialize, Deserialize)]
struct ModelEnvelope {
    checksum: String,
    payload: String,
}

fn checksum(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

pub const MODEL_FILE: &str = "classifier_v1.json";

pub fn save_model(model: &ClassifierModel, path: &Path) -> ShieldResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let payload = serde_json::to_string(model)?;
    let envelope = ModelEnvelope { checksum: checksum(&payload), payload };
    fs::write(path, serde_json::to_vec_pretty(&envelope)?)?;
    Ok(())
}

/// Load and verify a persisted model. Any mismatch rejects the file.
pub fn load_model(path: &Path) -> ShieldResult<ClassifierModel> {
    let data = fs::read(path)?;
    let envelope: ModelEnvelope = serde_json::from_slice(&data)?;

    let actual = checksum(&envelope.payload);
    if actual != envelope.checksum {
        return Err(ShieldError::InvalidSnapshot(format!(
            "classifier checksum mismatch: expected {}, got {}",
            envelope.checksum, actual
        )));
    }

    let model: ClassifierModel = serde_json::from_str(&envelope.payload)?;
    if !model.is_consistent() {
        return Err(ShieldError::InvalidSnapshot("classifier model is inconsistent".to_string()));
    }
    Ok(model)
}
