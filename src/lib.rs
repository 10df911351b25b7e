pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod load;
pub mod pipeline;
pub mod store;

pub use config::{ArchiveDataset, DatasetSpec, ImportConfig};
pub use error::{ImportError, Result};
pub use fetch::{fetch, Origin, StagedFile};
pub use pipeline::{DatasetOutcome, FileOutcome, Pipeline, RunReport};
pub use store::{Record, Store, Table, Value};
