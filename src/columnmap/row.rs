//! Positional decoding of raw spreadsheet rows.
//!
//! A row arrives in one of three shapes depending on the upstream
//! automation: an ordered cell array, one comma-delimited string, or an
//! object keyed by numeric column position (Make.com also injects
//! `__`-prefixed metadata keys that carry no cell data). All three are
//! decoded once, at the boundary, into a plain ordered cell vector; nothing
//! downstream branches on the original shape.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::columnmap::ColumnMap;

/// Upper bound on accepted column positions. Real sheets top out in the
/// low hundreds; an object row keyed far beyond that is upstream garbage,
/// and sizing the cell vector from it would allocate unboundedly.
pub const MAX_ROW_CELLS: usize = 10_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawRow {
    Cells(Vec<Value>),
    Delimited(String),
    Indexed(serde_json::Map<String, Value>),
}

fn cell_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

impl RawRow {
    /// Flatten into an ordered cell vector. Object rows are sorted by their
    /// numeric key after dropping metadata keys; gaps become empty cells so
    /// column indices keep their meaning. Keys at or past [`MAX_ROW_CELLS`]
    /// are dropped like the metadata keys, since the cell vector is sized
    /// from the largest surviving key.
    pub fn into_cells(self) -> Vec<String> {
        match self {
            RawRow::Cells(values) => values.iter().map(cell_to_string).collect(),
            RawRow::Delimited(line) => {
                line.split(',').map(|cell| cell.to_string()).collect()
            }
            RawRow::Indexed(map) => {
                let mut indexed: Vec<(usize, String)> = map
                    .iter()
                    .filter(|(key, _)| !key.starts_with("__"))
                    .filter_map(|(key, value)| {
                        key.parse::<usize>().ok().map(|i| (i, cell_to_string(value)))
                    })
                    .filter(|(i, _)| *i < MAX_ROW_CELLS)
                    .collect();
                indexed.sort_by_key(|(i, _)| *i);

                let len = indexed.last().map(|(i, _)| i + 1).unwrap_or(0);
                let mut cells = vec![String::new(); len];
                for (i, value) in indexed {
                    cells[i] = value;
                }
                cells
            }
        }
    }
}

/// Map an ordered cell vector through the sheet's column map. Only fields
/// whose trimmed cell value is non-empty appear in the output; indices past
/// the end of the row are treated as empty. Pure positional decoding, no
/// entity lookups.
pub fn transform_row(cells: &[String], map: &[ColumnMap]) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for entry in map {
        if entry.column_index < 0 {
            continue;
        }
        let Some(raw) = cells.get(entry.column_index as usize) else {
            continue;
        };
        let value = raw.trim();
        if !value.is_empty() {
            fields.insert(entry.field_name.clone(), value.to_string());
        }
    }
    fields
}
