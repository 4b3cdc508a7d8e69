//! Policy Store - hot-reloadable active policy
//!
//! The active policy is an `Arc<CompiledPolicy>`; a reload compiles and
//! validates the candidate first and only then swaps the pointer. A rejected
//! candidate leaves the previous policy and version in place.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use notify::{EventKind, RecursiveMode, Watcher};
use parking_lot::RwLock;

use crate::logic::error::{ShieldError, ShieldResult};
use super::config::Policy;
use super::validate::CompiledPolicy;

pub struct PolicyStore {
    active: RwLock<Arc<CompiledPolicy>>,
}

impl PolicyStore {
    pub fn new(policy: Policy) -> ShieldResult<Self> {
        let compiled = CompiledPolicy::compile(policy)?;
        Ok(Self { active: RwLock::new(Arc::new(compiled)) })
    }

    pub fn current(&self) -> Arc<CompiledPolicy> {
        self.active.read().clone()
    }

    pub fn version(&self) -> u64 {
        self.active.read().version()
    }

    /// Validate and activate `policy`, returning the new version
    pub fn reload(&self, mut policy: Policy) -> ShieldResult<u64> {
        let mut active = self.active.write();
        policy.version = policy.version.max(active.version() + 1);

        let compiled = match CompiledPolicy::compile(policy) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Policy reload rejected, keeping v{}: {}", active.version(), e);
                return Err(e);
            }
        };

        let version = compiled.version();
        *active = Arc::new(compiled);
        log::info!("Policy v{} activated", version);
        Ok(version)
    }

    pub fn reload_from_file(&self, path: &Path) -> ShieldResult<u64> {
        let policy = load_policy_file(path)?;
        self.reload(policy)
    }

    /// Reload whenever `path` changes. The returned watcher must be kept
    /// alive for as long as reloads are wanted.
    pub fn watch(self: &Arc<Self>, path: &Path) -> ShieldResult<notify::RecommendedWatcher> {
        let target: PathBuf = path.to_path_buf();
        let file_name = target.file_name().map(|n| n.to_os_string());
        let dir = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let store = Arc::clone(self);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    log::warn!("Policy watcher error: {}", e);
                    return;
                }
            };
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                return;
            }
            let touches_target = event
                .paths
                .iter()
                .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
            if touches_target {
                // errors are already logged by reload; the old policy stays active
                if let Err(e) = store.reload_from_file(&target) {
                    log::debug!("Policy file change ignored: {}", e);
                }
            }
        })?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        log::info!("Watching policy file {}", path.display());
        Ok(watcher)
    }
}

/// Read a JSON policy file. Missing sections take their defaults.
pub fn load_policy_file(path: &Path) -> ShieldResult<Policy> {
    let data = fs::read_to_string(path)?;
    serde_json::from_str(&data)
        .map_err(|e| ShieldError::Config(format!("{}: {}", path.display(), e)))
}

// ============================================================================
// TESTS
// ============================================================================
