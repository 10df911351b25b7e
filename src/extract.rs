use crate::error::{ImportError, Result};
use std::{
    collections::{BTreeSet, HashSet},
    fs::{self, File},
    io,
    path::Path,
};
use tracing::{debug, info, instrument, warn};
use zip::ZipArchive;

/// Extract the `wanted` members of the ZIP at `archive_path` into `dest_dir`.
///
/// Names missing from the archive are skipped. Returns the names that were
/// actually written.
#[instrument(level = "info", skip(archive_path, dest_dir, wanted), fields(archive = %archive_path.as_ref().display()))]
pub fn extract_members<P: AsRef<Path>, Q: AsRef<Path>>(
    archive_path: P,
    dest_dir: Q,
    wanted: &[String],
) -> Result<BTreeSet<String>> {
    let archive_path = archive_path.as_ref();
    let dest_dir = dest_dir.as_ref();
    let zip_err = |source: zip::result::ZipError| ImportError::Archive {
        path: archive_path.to_path_buf(),
        source,
    };

    let file = File::open(archive_path).map_err(|e| ImportError::fs(archive_path, e))?;
    let mut archive = ZipArchive::new(file).map_err(zip_err)?;
    fs::create_dir_all(dest_dir).map_err(|e| ImportError::fs(dest_dir, e))?;

    let present: HashSet<String> = archive.file_names().map(str::to_string).collect();
    let mut extracted = BTreeSet::new();

    for name in wanted {
        if !present.contains(name) {
            debug!(entry = %name, "not in archive");
            continue;
        }

        let mut entry = archive.by_name(name).map_err(zip_err)?;
        if !entry.is_file() {
            debug!(entry = %name, "not a regular file");
            continue;
        }
        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = %name, "member path escapes destination, skipping");
            continue;
        };

        let out_path = dest_dir.join(relative);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ImportError::fs(parent, e))?;
        }
        let mut out = File::create(&out_path).map_err(|e| ImportError::fs(&out_path, e))?;
        let bytes = io::copy(&mut entry, &mut out).map_err(|e| ImportError::fs(&out_path, e))?;

        info!(entry = %name, bytes, "extracted");
        extracted.insert(name.clone());
    }

    Ok(extracted)
}
