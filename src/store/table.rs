use std::fmt;

/// A single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

/// Declared SQL type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Real,
    Text,
}

impl ColumnKind {
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Integer => "INTEGER",
            ColumnKind::Real => "REAL",
            ColumnKind::Text => "TEXT",
        }
    }

    /// Map a declared type back to a kind. Unknown or empty types give `None`.
    pub fn from_sql_type(decl: &str) -> Option<Self> {
        match decl.trim().to_ascii_uppercase().as_str() {
            "INTEGER" | "INT" => Some(ColumnKind::Integer),
            "REAL" | "FLOAT" | "DOUBLE" => Some(ColumnKind::Real),
            "TEXT" => Some(ColumnKind::Text),
            _ => None,
        }
    }
}

/// Column names plus rows of values, every row as wide as the header.
///
/// Each column may carry a declared kind. Columns without one take their kind
/// from the values they hold.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    kinds: Vec<Option<ColumnKind>>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        let kinds = vec![None; columns.len()];
        Self {
            columns,
            kinds,
            rows: Vec::new(),
        }
    }

    /// Like [`Table::new`] with declared kinds; missing entries stay undeclared.
    pub fn with_kinds(columns: Vec<String>, mut kinds: Vec<Option<ColumnKind>>) -> Self {
        kinds.resize(columns.len(), None);
        Self {
            columns,
            kinds,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row, padding with `Null` or truncating to the header width.
    pub fn push_row(&mut self, mut values: Vec<Value>) {
        values.resize(self.columns.len(), Value::Null);
        self.rows.push(values);
    }

    pub fn remove_row(&mut self, index: usize) -> Option<Vec<Value>> {
        (index < self.rows.len()).then(|| self.rows.remove(index))
    }

    pub fn record(&self, index: usize) -> Option<Record<'_>> {
        self.rows.get(index).map(|values| Record {
            columns: &self.columns,
            values,
        })
    }

    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(move |values| Record {
            columns: &self.columns,
            values,
        })
    }

    /// Values of one column, top to bottom.
    pub fn column(&self, index: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().filter_map(move |r| r.get(index))
    }

    /// Declared kind if there is one, otherwise the narrowest kind the values fit.
    pub fn column_kind(&self, index: usize) -> ColumnKind {
        if let Some(kind) = self.kinds.get(index).copied().flatten() {
            return kind;
        }
        let mut kind = None;
        for v in self.column(index) {
            match v {
                Value::Null => {}
                Value::Integer(_) => {
                    kind.get_or_insert(ColumnKind::Integer);
                }
                Value::Real(_) => kind = Some(ColumnKind::Real),
                Value::Text(_) => return ColumnKind::Text,
            }
        }
        // all-null and empty columns fall back to TEXT
        kind.unwrap_or(ColumnKind::Text)
    }

    /// Prepend an `id` column numbered 1..=len in current row order.
    pub fn with_synthetic_id(mut self, id_column: &str) -> Self {
        self.columns.insert(0, id_column.to_string());
        self.kinds.insert(0, Some(ColumnKind::Integer));
        for (i, row) in self.rows.iter_mut().enumerate() {
            row.insert(0, Value::Integer(i as i64 + 1));
        }
        self
    }
}

/// One row viewed as column name → value.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> Record<'a> {
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}
