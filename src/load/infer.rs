use crate::store::{ColumnKind, Table, Value};

/// Pick the narrowest kind every non-empty cell fits: integer, then real, then
/// text. `None` when the column has no non-empty cell at all.
pub fn infer_kind<'a>(cells: impl IntoIterator<Item = &'a str>) -> Option<ColumnKind> {
    let mut kind = None;
    for cell in cells {
        let s = cell.trim();
        if s.is_empty() {
            continue;
        }
        if kind != Some(ColumnKind::Real) && s.parse::<i64>().is_ok() {
            kind = Some(ColumnKind::Integer);
        } else if s.parse::<f64>().is_ok() {
            kind = Some(ColumnKind::Real);
        } else {
            return Some(ColumnKind::Text);
        }
    }
    kind
}

/// Convert one raw cell under the column's inferred kind. Empty cells are null.
pub fn to_value(cell: &str, kind: ColumnKind) -> Value {
    if cell.trim().is_empty() {
        return Value::Null;
    }
    match kind {
        ColumnKind::Integer => cell.trim().parse().map(Value::Integer).unwrap_or(Value::Null),
        ColumnKind::Real => cell.trim().parse().map(Value::Real).unwrap_or(Value::Null),
        ColumnKind::Text => Value::Text(cell.to_string()),
    }
}

/// Build a typed table from raw string rows, inferring each column separately.
/// Columns with nothing in them are declared TEXT.
pub fn typed_table(columns: Vec<String>, raw: Vec<Vec<String>>) -> Table {
    let kinds: Vec<ColumnKind> = (0..columns.len())
        .map(|i| {
            infer_kind(raw.iter().filter_map(|r| r.get(i).map(String::as_str)))
                .unwrap_or(ColumnKind::Text)
        })
        .collect();

    let mut table = Table::with_kinds(columns, kinds.iter().copied().map(Some).collect());
    for row in raw {
        let values = row
            .iter()
            .zip(&kinds)
            .map(|(cell, kind)| to_value(cell, *kind))
            .collect();
        table.push_row(values);
    }
    table
}
