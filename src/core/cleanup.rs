//! Purpose: Remove extracted libraries left behind by earlier processes.
//! Exports: `CleanupReport`, `cleanup_stale_artifacts`.
//! Role: Stale Artifact Cleaner; best-effort housekeeping before the first resolution.
//! Invariants: Only `library-{version}-*` entries of the current version are considered.
//! Invariants: An entry whose `.lck` marker exists is never deleted.
//! Invariants: Failures are logged and reported, never returned as errors.
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::core::extract::{LOCK_EXT, artifact_prefix};
use crate::core::version::VersionTag;

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub kept: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

pub fn cleanup_stale_artifacts(temp_dir: &Path, version: &VersionTag) -> CleanupReport {
    let mut report = CleanupReport::default();
    let prefix = artifact_prefix(version);

    let entries = match fs::read_dir(temp_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return report,
        Err(err) => {
            warn!(dir = %temp_dir.display(), error = %err, "failed to open temp directory");
            return report;
        }
    };

    for entry in entries.filter_map(|entry| entry.ok()) {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.starts_with(&prefix) || name.ends_with(LOCK_EXT) {
            continue;
        }

        let path = entry.path();
        let lock = temp_dir.join(format!("{name}{LOCK_EXT}"));
        if lock.exists() {
            report.kept.push(path);
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed stale native library");
                report.removed.push(path);
            }
            // Released by its owner between listing and deletion.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to delete old native library");
                report.failed.push(path);
            }
        }
    }

    report.removed.sort();
    report.kept.sort();
    report.failed.sort();
    report
}
