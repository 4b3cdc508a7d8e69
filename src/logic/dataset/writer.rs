use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use parking_lot::Mutex;
use chrono::Utc;
use serde::Serialize;

use crate::logic::feedback::types::TrainingExample;

const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10 MB
const MAX_FILES: usize = 20;
const FILE_PREFIX: &str = "training-";
const FILE_EXT: &str = "jsonl";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatasetStats {
    pub total_files: usize,
    pub total_size_bytes: u64,
    pub current_file: Option<String>,
}

/// Append-only JSONL log of training examples with size-based rotation.
/// At most `max_files` files are kept; the oldest are deleted on rotation.
pub struct DatasetWriter {
    file: Mutex<Option<File>>,
    base_dir: PathBuf,
    max_file_size: u64,
    max_files: usize,
}

impl DatasetWriter {
    pub fn from_path(base_dir: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&base_dir)?;
        Ok(Self {
            file: Mutex::new(None),
            base_dir,
            max_file_size: MAX_FILE_SIZE,
            max_files: MAX_FILES,
        })
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes.max(1);
        self
    }

    pub fn with_max_files(mut self, files: usize) -> Self {
        self.max_files = files.max(1);
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Append one example. Handles file rotation automatically.
    pub fn append(&self, example: &TrainingExample) -> io::Result<()> {
        let mut file_guard = self.file.lock();

        // Not open yet: continue the latest file unless it is already full
        if file_guard.is_none() {
            let reopened = match self.find_latest_file()? {
                Some(path) => {
                    let f = OpenOptions::new().create(true).append(true).open(&path)?;
                    (f.metadata()?.len() < self.max_file_size).then_some(f)
                }
                None => None,
            };
            *file_guard = Some(match reopened {
                Some(f) => f,
                None => self.create_new_file()?,
            });
        }

        let should_rotate = match file_guard.as_ref() {
            Some(f) => f.metadata()?.len() >= self.max_file_size,
            None => false,
        };
        if should_rotate {
            *file_guard = Some(self.create_new_file()?);
        }

        if let Some(file) = file_guard.as_mut() {
            let json = serde_json::to_string(example)?;
            writeln!(file, "{}", json)?;
        }

        Ok(())
    }

    pub fn get_stats(&self) -> io::Result<DatasetStats> {
        let files = list_dataset_files(&self.base_dir)?;
        let mut stats = DatasetStats { total_files: files.len(), ..Default::default() };
        for path in &files {
            if let Ok(meta) = fs::metadata(path) {
                stats.total_size_bytes += meta.len();
            }
        }
        stats.current_file = files
            .last()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .map(str::to_string);
        Ok(stats)
    }

    fn create_new_file(&self) -> io::Result<File> {
        let files = list_dataset_files(&self.base_dir)?;
        let seq = files.last().and_then(|p| file_sequence(p)).unwrap_or(0) + 1;
        // sequence first so lexical order is write order
        let filename = format!(
            "{}{:06}-{}.{}",
            FILE_PREFIX,
            seq,
            Utc::now().format("%Y-%m-%d-%H%M%S"),
            FILE_EXT
        );
        let file = OpenOptions::new().create(true).append(true).open(self.base_dir.join(filename))?;

        // the new file counts against the cap
        let excess = (files.len() + 1).saturating_sub(self.max_files);
        for old in files.iter().take(excess) {
            match fs::remove_file(old) {
                Ok(()) => log::info!("Dataset retention: removed {}", old.display()),
                Err(e) => log::warn!("Dataset retention: cannot remove {}: {}", old.display(), e),
            }
        }
        Ok(file)
    }

    fn find_latest_file(&self) -> io::Result<Option<PathBuf>> {
        Ok(list_dataset_files(&self.base_dir)?.pop())
    }
}

fn file_sequence(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    name.strip_prefix(FILE_PREFIX)?.split('-').next()?.parse().ok()
}

/// Dataset files in write order
pub fn list_dataset_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut entries = fs::read_dir(dir)?
        .filter_map(|res| res.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map_or(false, |ext| ext == FILE_EXT))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with(FILE_PREFIX))
        })
        .collect::<Vec<_>>();
    entries.sort();
    Ok(entries)
}
