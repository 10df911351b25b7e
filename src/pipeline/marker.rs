use crate::{
    config::ImportConfig,
    error::{ImportError, Result},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::{debug, warn};

/// Written to the staging dir when a run starts, removed when cleanup finishes.
/// Finding one at startup means the previous run stopped before cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMarker {
    pub started_at: DateTime<Utc>,
    pub datasets: Vec<String>,
}

impl RunMarker {
    pub fn for_config(config: &ImportConfig) -> Self {
        Self {
            started_at: Utc::now(),
            datasets: config.datasets().map(|d| d.id.clone()).collect(),
        }
    }
}

/// Returns the marker left by an unfinished run, if any. An unreadable marker
/// still counts as unfinished.
pub fn leftover(path: &Path) -> Option<RunMarker> {
    if !path.exists() {
        return None;
    }
    match fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_json::from_str::<RunMarker>(&s).ok())
    {
        Some(m) => Some(m),
        None => {
            warn!(path = %path.display(), "unreadable run marker");
            Some(RunMarker {
                started_at: DateTime::<Utc>::UNIX_EPOCH,
                datasets: Vec::new(),
            })
        }
    }
}

pub fn write(path: &Path, marker: &RunMarker) -> Result<()> {
    let body = serde_json::to_string_pretty(marker)
        .map_err(|e| ImportError::fs(path, std::io::Error::other(e)))?;
    fs::write(path, body).map_err(|e| ImportError::fs(path, e))?;
    debug!(path = %path.display(), "run marker written");
    Ok(())
}

pub fn clear(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ImportError::fs(path, e)),
    }
}
