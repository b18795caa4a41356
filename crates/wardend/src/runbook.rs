//! Runbook persistence: the append-only precedent corpus.
//!
//! Every resolved incident is appended here with its raw logs and final
//! diagnosis; the similarity retriever reads the whole corpus on the next
//! incident. Appends are read-modify-write of the full file under one lock,
//! so two runs resolving at the same moment never lose each other's entry.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::{info, warn};
use warden_common::Precedent;

pub struct Runbook {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Runbook {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the full corpus. A missing, empty, or malformed file is an empty
    /// corpus - losing retrieval context must never fail a run.
    pub fn load(&self) -> Vec<Precedent> {
        load_corpus(&self.path)
    }

    /// Append one precedent and persist the whole corpus back. The lock is
    /// held across the read-modify-write cycle.
    pub async fn append(&self, entry: Precedent) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let mut entries = load_corpus(&self.path);
        entries.push(entry);

        let json = serde_json::to_string_pretty(&entries)?;
        std::fs::write(&self.path, json + "\n")
            .with_context(|| format!("writing {}", self.path.display()))?;

        info!("Runbook updated - {} entries total", entries.len());
        Ok(entries.len())
    }
}

fn load_corpus(path: &Path) -> Vec<Precedent> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => return Vec::new(),
    };
    if raw.trim().len() < 3 {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<Precedent>>(&raw) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Runbook load failed ({}), treating as empty", e);
            Vec::new()
        }
    }
}
