// src/pipeline/mod.rs
//
// fetch registry -> fetch archive -> extract -> load x4 -> cleanup

use crate::{
    config::{DatasetSpec, ImportConfig},
    error::{ImportError, Result},
    extract::extract_members,
    fetch::{fetch, Origin, StagedFile},
    load::load,
    store::Store,
};
use reqwest::Client;
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{error, info, instrument, warn};

pub mod cleanup;
pub mod marker;

pub use cleanup::CleanupReport;

/// What happened to one dataset file during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Loaded { rows: usize },
    /// The staged file was not there to load.
    SkippedMissing,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetOutcome {
    pub dataset: String,
    pub table: String,
    pub staged: PathBuf,
    pub outcome: FileOutcome,
    /// The staged file is gone after cleanup.
    pub cleaned: bool,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcomes: Vec<DatasetOutcome>,
    /// Archive members written during this run.
    pub extracted: Vec<StagedFile>,
    /// A marker from an unfinished earlier run was found.
    pub resumed: bool,
    pub cleanup: CleanupReport,
}

impl RunReport {
    pub fn outcome_for(&self, dataset: &str) -> Option<&FileOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.dataset == dataset)
            .map(|o| &o.outcome)
    }

    pub fn loaded(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Loaded { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::SkippedMissing))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.outcome)).count()
    }

    pub fn log_summary(&self) {
        for o in &self.outcomes {
            match &o.outcome {
                FileOutcome::Loaded { rows } => {
                    info!(dataset = %o.dataset, table = %o.table, rows, "loaded")
                }
                FileOutcome::SkippedMissing => {
                    info!(dataset = %o.dataset, table = %o.table, "skipped, file missing")
                }
                FileOutcome::Failed(reason) => {
                    error!(dataset = %o.dataset, table = %o.table, %reason, "failed")
                }
            }
        }
        info!(
            loaded = self.loaded(),
            skipped = self.skipped(),
            failed = self.failed(),
            removed = self.cleanup.removed.len(),
            "run finished"
        );
    }
}

pub struct Pipeline {
    config: ImportConfig,
    client: Client,
    store: Store,
}

impl Pipeline {
    pub fn new(config: ImportConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_client(config, Client::new()))
    }

    pub fn with_client(config: ImportConfig, client: Client) -> Self {
        let store = Store::open(&config.store_path);
        Self {
            config,
            client,
            store,
        }
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Run the whole import once.
    ///
    /// Only a failed download aborts (the archive one only when
    /// `archive_required`). Load failures are recorded per dataset and the
    /// staged files are deleted regardless.
    #[instrument(level = "info", skip(self), fields(staging = %self.config.staging_dir.display()))]
    pub async fn run(&self) -> Result<RunReport> {
        let cfg = &self.config;
        let start = Instant::now();

        fs::create_dir_all(&cfg.staging_dir).map_err(|e| ImportError::fs(&cfg.staging_dir, e))?;
        let marker_path = cfg.marker_path();
        let resumed = match marker::leftover(&marker_path) {
            Some(prev) => {
                warn!(started_at = %prev.started_at, "previous run did not finish, archive will be re-extracted");
                true
            }
            None => false,
        };
        marker::write(&marker_path, &marker::RunMarker::for_config(cfg))?;

        // ─── 1) registry CSV (fatal) ─────────────────────────────────────
        let registry = fetch(&self.client, &cfg.registry.url, cfg.registry_path()).await?;

        // ─── 2) archive ──────────────────────────────────────────────────
        let archive = match fetch(&self.client, &cfg.archive.url, cfg.archive_path()).await {
            Ok(staged) => Ok(staged),
            Err(e) if !cfg.archive_required => {
                warn!(error = %e, "archive unavailable, continuing with the registry only");
                Err(e.to_string())
            }
            Err(e) => return Err(e),
        };

        // ─── 3) extract wanted members ───────────────────────────────────
        let extracted = match &archive {
            Ok(staged) if staged.fresh || resumed => self.extract(staged),
            Ok(_) => {
                info!("archive was already staged, extraction skipped");
                Vec::new()
            }
            Err(_) => Vec::new(),
        };

        // ─── 4) + 5) load ────────────────────────────────────────────────
        let mut outcomes = Vec::with_capacity(1 + cfg.archive.members.len());
        outcomes.push(self.load_one(&cfg.registry.dataset, &registry.path));
        for member in &cfg.archive.members {
            let path = cfg.member_path(member);
            let outcome = match &archive {
                Ok(_) => self.load_one(member, &path),
                Err(reason) => DatasetOutcome {
                    dataset: member.id.clone(),
                    table: member.table.clone(),
                    staged: path,
                    outcome: FileOutcome::Failed(format!("archive unavailable: {reason}")),
                    cleaned: false,
                },
            };
            outcomes.push(outcome);
        }

        // ─── 6) cleanup ──────────────────────────────────────────────────
        let mut staged = vec![registry.path.clone(), cfg.archive_path()];
        staged.extend(cfg.archive.members.iter().map(|m| cfg.member_path(m)));
        let mut cleanup = cleanup::remove_staged(&staged);
        cleanup::sweep_partials(&cfg.staging_dir, &mut cleanup);
        for o in &mut outcomes {
            o.cleaned = !o.staged.exists();
        }
        if let Err(e) = marker::clear(&marker_path) {
            warn!(error = %e, "could not remove run marker");
        }

        info!(elapsed = ?start.elapsed(), "import complete");
        Ok(RunReport {
            outcomes,
            extracted,
            resumed,
            cleanup,
        })
    }

    fn extract(&self, archive: &StagedFile) -> Vec<StagedFile> {
        let cfg = &self.config;
        let wanted = cfg.archive.wanted_entries();
        let names = match extract_members(&archive.path, &cfg.staging_dir, &wanted) {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "could not extract archive");
                BTreeSet::new()
            }
        };
        for name in wanted.iter().filter(|w| !names.contains(*w)) {
            info!(entry = %name, "not present in archive");
        }

        names
            .into_iter()
            .map(|entry| StagedFile {
                path: cfg.staging_dir.join(&entry),
                origin: Origin::ArchiveMember {
                    archive: archive.path.clone(),
                    entry,
                },
                fresh: true,
            })
            .collect()
    }

    fn load_one(&self, dataset: &DatasetSpec, path: &Path) -> DatasetOutcome {
        let outcome = if !path.is_file() {
            warn!(dataset = %dataset.id, path = %path.display(), "staged file not found, skipping");
            FileOutcome::SkippedMissing
        } else {
            match load(path, &self.store, &dataset.table) {
                Ok(rows) => FileOutcome::Loaded { rows },
                Err(e) => {
                    error!(dataset = %dataset.id, error = %e, "load failed");
                    FileOutcome::Failed(e.to_string())
                }
            }
        };

        DatasetOutcome {
            dataset: dataset.id.clone(),
            table: dataset.table.clone(),
            staged: path.to_path_buf(),
            outcome,
            cleaned: false,
        }
    }
}
