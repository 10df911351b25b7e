use crate::fetch::PARTIAL_PREFIX;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    /// Paths that could not be deleted, with the I/O error.
    pub failed: Vec<(PathBuf, String)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Best-effort delete of every staged path. Missing files are ignored, other
/// failures are logged and collected.
pub fn remove_staged<'a>(paths: impl IntoIterator<Item = &'a PathBuf>) -> CleanupReport {
    let mut report = CleanupReport::default();
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => {
                info!(path = %path.display(), "deleted staged file");
                report.removed.push(path.clone());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to delete staged file");
                report.failed.push((path.clone(), e.to_string()));
            }
        }
    }
    report
}

/// Delete download leftovers (files named with [`PARTIAL_PREFIX`]) from `dir`,
/// recording them in `report` like any other staged file.
pub fn sweep_partials(dir: &Path, report: &mut CleanupReport) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "could not list staging dir");
            report.failed.push((dir.to_path_buf(), e.to_string()));
            return;
        }
    };
    let partials: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(PARTIAL_PREFIX))
        .map(|entry| entry.path())
        .collect();
    if partials.is_empty() {
        return;
    }

    info!(count = partials.len(), "removing partial downloads");
    let swept = remove_staged(&partials);
    report.removed.extend(swept.removed);
    report.failed.extend(swept.failed);
}
