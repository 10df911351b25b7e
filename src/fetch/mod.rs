// src/fetch/mod.rs

use crate::error::{ImportError, Result};
use reqwest::Client;
use std::{
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Name prefix of in-flight download files. A crash mid-download can leave
/// one behind; cleanup sweeps them.
pub const PARTIAL_PREFIX: &str = ".partial-";

/// Where a staged file came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Url(String),
    ArchiveMember { archive: PathBuf, entry: String },
}

/// A file sitting in the staging directory, waiting to be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: PathBuf,
    pub origin: Origin,
    /// True when this run produced the file, false when it was already there.
    pub fresh: bool,
}

impl StagedFile {
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

/// Download `url` to `dest` unless `dest` already exists.
///
/// An existing destination is returned untouched and no request is made.
/// The body is written to a [`PARTIAL_PREFIX`] temp file next to `dest` and
/// renamed into place, so a partial file is never mistaken for a download.
#[instrument(level = "info", skip(client, dest), fields(dest = %dest.as_ref().display()))]
pub async fn fetch(client: &Client, url: &str, dest: impl AsRef<Path>) -> Result<StagedFile> {
    let dest = dest.as_ref();
    let origin = Origin::Url(url.to_string());

    if dest.exists() {
        info!("already staged, skipping download");
        return Ok(StagedFile {
            path: dest.to_path_buf(),
            origin,
            fresh: false,
        });
    }

    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| ImportError::fs(&dir, e))?;

    let fetch_err = |source: reqwest::Error| ImportError::Fetch {
        url: url.to_string(),
        source,
    };
    debug!("GET {}", url);
    let bytes = client
        .get(url)
        .send()
        .await
        .map_err(fetch_err)?
        .error_for_status()
        .map_err(fetch_err)?
        .bytes()
        .await
        .map_err(fetch_err)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(PARTIAL_PREFIX)
        .tempfile_in(&dir)
        .map_err(|e| ImportError::fs(&dir, e))?;
    tmp.write_all(&bytes)
        .map_err(|e| ImportError::fs(tmp.path(), e))?;
    tmp.persist(dest)
        .map_err(|e| ImportError::fs(dest, e.error))?;

    info!(bytes = bytes.len(), "downloaded");
    Ok(StagedFile {
        path: dest.to_path_buf(),
        origin,
        fresh: true,
    })
}
