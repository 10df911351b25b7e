// src/load/mod.rs
use crate::{error::Result, store::Store};
use std::{path::Path, time::Instant};
use tracing::{info, instrument};

pub mod infer;
pub mod parse;

pub use parse::{read_delimited, DELIMITER};

/// Name of the synthetic key column prepended to every loaded table.
pub const ID_COLUMN: &str = "id";

/// Parse `csv_path`, number its rows from 1 and replace `table` in `store`
/// with the result. Returns the number of rows loaded.
#[instrument(level = "info", skip(csv_path, store), fields(path = %csv_path.as_ref().display()))]
pub fn load<P: AsRef<Path>>(csv_path: P, store: &Store, table: &str) -> Result<usize> {
    let start = Instant::now();
    let parsed = read_delimited(csv_path.as_ref())?.with_synthetic_id(ID_COLUMN);
    let rows = store.replace_table(table, &parsed)?;
    info!(rows, elapsed = ?start.elapsed(), "loaded");
    Ok(rows)
}
