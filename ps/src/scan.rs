//! Recovery scan over a runs directory
//!
//! After a crash the host needs to know which run files hold a non-terminal
//! checkpoint. The scan opens each `*.sqlite` file read-only and reports the
//! stored status plus the latest checkpoint cycle.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::RunStore;

/// Summary of one run file found on disk
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub plan_id: Option<String>,
    pub status: String,
    pub latest_cycle: Option<u64>,
    pub path: PathBuf,
}

impl RunSummary {
    /// A run is resumable when it was interrupted mid-flight
    pub fn is_resumable(&self) -> bool {
        matches!(self.status.as_str(), "running" | "paused" | "interrupted")
    }
}

/// Scan a directory for run store files
pub fn scan_runs(runs_dir: &Path) -> Result<Vec<RunSummary>, StoreError> {
    let mut summaries = Vec::new();

    if !runs_dir.exists() {
        debug!(dir = %runs_dir.display(), "Runs directory does not exist, nothing to scan");
        return Ok(summaries);
    }

    for entry in std::fs::read_dir(runs_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("sqlite") {
            continue;
        }

        match RunStore::open(&path) {
            Ok(store) => {
                let status = store.meta("status")?.unwrap_or_else(|| "interrupted".to_string());
                let plan_id = store.meta("plan_id")?;
                let latest_cycle = store.latest_checkpoint()?.map(|c| c.cycle);
                summaries.push(RunSummary {
                    run_id: store.run_id().to_string(),
                    plan_id,
                    status,
                    latest_cycle,
                    path,
                });
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable run file");
            }
        }
    }

    summaries.sort_by(|a, b| a.run_id.cmp(&b.run_id));
    Ok(summaries)
}
