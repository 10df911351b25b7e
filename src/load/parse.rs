use super::{infer, ID_COLUMN};
use crate::{
    error::{ImportError, Result},
    store::Table,
};
use csv::{ReaderBuilder, StringRecord};
use std::{collections::HashSet, fs, path::Path};
use tracing::{debug, instrument};

/// Field separator used by the regulator's CSV exports.
pub const DELIMITER: u8 = b';';

/// The exports are ISO-8859-1; every byte maps to the code point of the same value.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Read a semicolon-delimited Latin-1 file into a typed [`Table`].
///
/// The first record is the header. Short rows are padded with nulls, long rows
/// are rejected.
#[instrument(level = "debug", skip(path), fields(path = %path.display()))]
pub fn read_delimited(path: &Path) -> Result<Table> {
    let bytes = fs::read(path).map_err(|e| ImportError::fs(path, e))?;
    let table = parse_delimited(&decode_latin1(&bytes)).map_err(|reason| ImportError::parse(path, reason))?;
    debug!(rows = table.len(), columns = table.columns().len(), "parsed");
    Ok(table)
}

fn parse_delimited(text: &str) -> std::result::Result<Table, String> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut records = rdr.records();

    let header = match records.next() {
        Some(r) => r.map_err(|e| format!("header: {e}"))?,
        None => return Err("file has no header row".to_string()),
    };
    let columns = header_columns(&header)?;
    let width = columns.len();

    let mut raw: Vec<Vec<String>> = Vec::new();
    for result in records {
        let record = result.map_err(|e| e.to_string())?;
        if record.len() > width {
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            return Err(format!(
                "line {line}: expected {width} fields, saw {}",
                record.len()
            ));
        }
        raw.push(record.iter().map(str::to_string).collect());
    }

    Ok(infer::typed_table(columns, raw))
}

/// Header names in file order. Blank names become `Unnamed: <i>`, repeats get
/// a `.1`, `.2`, ... suffix.
fn header_columns(header: &StringRecord) -> std::result::Result<Vec<String>, String> {
    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(header.len());

    for (i, name) in header.iter().enumerate() {
        if name == ID_COLUMN {
            return Err(format!("header already has an '{ID_COLUMN}' column"));
        }
        let base = if name.is_empty() {
            format!("Unnamed: {i}")
        } else {
            name.to_string()
        };
        let mut candidate = base.clone();
        let mut n = 1;
        while !seen.insert(candidate.clone()) {
            candidate = format!("{base}.{n}");
            n += 1;
        }
        columns.push(candidate);
    }
    Ok(columns)
}
