use crate::error::{ImportError, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};
use url::Url;

const REGISTRY_URL: &str = "https://dados.cvm.gov.br/dados/CIA_ABERTA/CAD/DADOS/cad_cia_aberta.csv";
const FRE_ARCHIVE_URL: &str =
    "https://dados.cvm.gov.br/dados/CIA_ABERTA/DOC/FRE/DADOS/fre_cia_aberta_2024.zip";

/// Name of the file that marks a run as started but not yet cleaned up.
pub const RUN_MARKER_FILE: &str = ".import-in-progress";

/// One dataset: an identifier, the staged file (or archive member) it is read
/// from, and the table it lands in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub id: String,
    pub source: String,
    pub table: String,
}

impl DatasetSpec {
    pub fn new(id: &str, source: &str, table: &str) -> Self {
        Self {
            id: id.to_string(),
            source: source.to_string(),
            table: table.to_string(),
        }
    }
}

/// A CSV downloaded as-is. `dataset.source` is the staged file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectDataset {
    pub url: String,
    pub dataset: DatasetSpec,
}

/// A ZIP archive whose wanted members each become one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveDataset {
    pub url: String,
    pub file_name: String,
    pub members: Vec<DatasetSpec>,
}

impl ArchiveDataset {
    pub fn wanted_entries(&self) -> Vec<String> {
        self.members.iter().map(|m| m.source.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub staging_dir: PathBuf,
    pub store_path: PathBuf,
    pub registry: DirectDataset,
    pub archive: ArchiveDataset,
    /// When false, a failed archive download is recorded against the archive
    /// members and the registry still loads.
    pub archive_required: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from("data"),
            store_path: PathBuf::from("database.db"),
            registry: DirectDataset {
                url: REGISTRY_URL.to_string(),
                dataset: DatasetSpec::new(
                    "companhias_abertas",
                    "cad_cia_aberta.csv",
                    "companhias_abertas",
                ),
            },
            archive: ArchiveDataset {
                url: FRE_ARCHIVE_URL.to_string(),
                file_name: "fre_cia_aberta_2024.zip".to_string(),
                members: vec![
                    DatasetSpec::new(
                        "faixa_etaria",
                        "fre_cia_aberta_empregado_local_faixa_etaria_2024.csv",
                        "faixa_etaria_2024",
                    ),
                    DatasetSpec::new(
                        "declaracao_raca",
                        "fre_cia_aberta_empregado_local_declaracao_raca_2024.csv",
                        "declaracao_raca_2024",
                    ),
                    DatasetSpec::new(
                        "declaracao_genero",
                        "fre_cia_aberta_empregado_local_declaracao_genero_2024.csv",
                        "declaracao_genero_2024",
                    ),
                ],
            },
            archive_required: true,
        }
    }
}

impl ImportConfig {
    /// Load from YAML; absent top-level keys keep their defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ImportError::fs(path, e))?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let cfg: ImportConfig = serde_yaml::from_str(text)
            .map_err(|e| ImportError::config(format!("YAML: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Same plan, rooted at another staging dir and store. Used by tests and
    /// ad-hoc runs.
    pub fn with_paths(
        mut self,
        staging_dir: impl Into<PathBuf>,
        store_path: impl Into<PathBuf>,
    ) -> Self {
        self.staging_dir = staging_dir.into();
        self.store_path = store_path.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        for url in [&self.registry.url, &self.archive.url] {
            Url::parse(url).map_err(|e| ImportError::config(format!("bad URL {url}: {e}")))?;
        }

        let mut ids = HashSet::new();
        let mut tables = HashSet::new();
        for ds in self.datasets() {
            if ds.table.trim().is_empty() || ds.source.trim().is_empty() {
                return Err(ImportError::config(format!(
                    "dataset '{}' needs a source and a table",
                    ds.id
                )));
            }
            if !ids.insert(ds.id.as_str()) {
                return Err(ImportError::config(format!("duplicate dataset id '{}'", ds.id)));
            }
            if !tables.insert(ds.table.as_str()) {
                return Err(ImportError::config(format!("table '{}' mapped twice", ds.table)));
            }
        }

        let mut entries = HashSet::new();
        for m in &self.archive.members {
            if !entries.insert(m.source.as_str()) {
                return Err(ImportError::config(format!("archive member '{}' listed twice", m.source)));
            }
        }
        if self.archive.file_name == self.registry.dataset.source {
            return Err(ImportError::config("registry and archive share a staged file name"));
        }
        // the staging dir only ever holds transient files
        if self.store_path.starts_with(&self.staging_dir) {
            return Err(ImportError::config(format!(
                "store {} is inside the staging dir {}",
                self.store_path.display(),
                self.staging_dir.display()
            )));
        }
        Ok(())
    }

    /// Registry first, then archive members in configured order.
    pub fn datasets(&self) -> impl Iterator<Item = &DatasetSpec> {
        std::iter::once(&self.registry.dataset).chain(self.archive.members.iter())
    }

    pub fn table_for(&self, dataset_id: &str) -> Option<&str> {
        self.datasets()
            .find(|d| d.id == dataset_id)
            .map(|d| d.table.as_str())
    }

    pub fn registry_path(&self) -> PathBuf {
        self.staging_dir.join(&self.registry.dataset.source)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.staging_dir.join(&self.archive.file_name)
    }

    pub fn member_path(&self, member: &DatasetSpec) -> PathBuf {
        self.staging_dir.join(&member.source)
    }

    pub fn marker_path(&self) -> PathBuf {
        self.staging_dir.join(RUN_MARKER_FILE)
    }
}
