//! Flatten a batch into a table and serialize it as CSV.
//!
//! Each item of each record becomes one row, with the record's file name
//! attached to every row so rows stand on their own. The header is
//! `fileName` followed by the sorted union of every item's keys; cells for
//! keys an item lacks are empty.
//!
//! Quoting follows RFC 4180: data cells are always wrapped in double quotes
//! with inner quotes doubled, header cells only when they need it. Rows are
//! separated by `\n`. [`parse_csv`] reads the format back.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::models::BatchResult;

/// Name of the leading column.
pub const FILE_NAME_COLUMN: &str = "fileName";

/// A flattened batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell at `row` under `column`, if both exist.
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(col).map(String::as_str)
    }
}

/// One row per item, file name on every row.
pub fn flatten(batch: &BatchResult) -> Table {
    let mut keys = BTreeSet::new();
    let mut maps: Vec<BTreeMap<String, String>> = Vec::with_capacity(batch.item_count());

    for record in batch.records() {
        for item in &record.items {
            let mut map = BTreeMap::new();
            for (key, value) in item.fields() {
                // The record's file name always wins over an item field of the same name.
                if key == FILE_NAME_COLUMN {
                    continue;
                }
                keys.insert(key.clone());
                map.insert(key, value);
            }
            map.insert(FILE_NAME_COLUMN.to_string(), record.file_name.clone());
            maps.push(map);
        }
    }

    let mut columns = Vec::with_capacity(keys.len() + 1);
    columns.push(FILE_NAME_COLUMN.to_string());
    columns.extend(keys);

    let rows = maps
        .into_iter()
        .map(|mut map| {
            columns
                .iter()
                .map(|c| map.remove(c).unwrap_or_default())
                .collect()
        })
        .collect();

    Table { columns, rows }
}

/// Serialize a table. An empty table yields an empty string.
pub fn to_csv(table: &Table) -> String {
    if table.is_empty() {
        return String::new();
    }

    let mut lines = Vec::with_capacity(table.rows.len() + 1);
    lines.push(
        table
            .columns
            .iter()
            .map(|c| quote_if_needed(c))
            .collect::<Vec<_>>()
            .join(","),
    );
    for row in &table.rows {
        lines.push(row.iter().map(|c| quote(c)).collect::<Vec<_>>().join(","));
    }
    lines.join("\n")
}

fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

fn quote_if_needed(cell: &str) -> String {
    if cell.contains(&[',', '"', '\n', '\r'][..]) {
        quote(cell)
    } else {
        cell.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CsvError {
    #[error("unterminated quoted field starting on line {line}")]
    UnterminatedQuote { line: usize },

    #[error("unexpected character {ch:?} on line {line}")]
    UnexpectedCharacter { line: usize, ch: char },
}

/// Parse CSV text into records of fields. Accepts `\n` and `\r\n`.
pub fn parse_csv(text: &str) -> Result<Vec<Vec<String>>, CsvError> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut closed_quote = false;
    let mut line = 1;
    let mut quote_line = 1;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => {
                    in_quotes = false;
                    closed_quote = true;
                }
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() && !closed_quote => {
                in_quotes = true;
                quote_line = line;
            }
            ',' => {
                record.push(std::mem::take(&mut field));
                closed_quote = false;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
                closed_quote = false;
                line += 1;
            }
            _ if closed_quote || c == '"' => {
                return Err(CsvError::UnexpectedCharacter { line, ch: c });
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(CsvError::UnterminatedQuote { line: quote_line });
    }
    if !field.is_empty() || !record.is_empty() || closed_quote {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

/// Parse CSV text whose first record is the header.
pub fn parse_table(text: &str) -> Result<Table, CsvError> {
    let mut records = parse_csv(text)?.into_iter();
    let columns = records.next().unwrap_or_default();
    Ok(Table {
        columns,
        rows: records.collect(),
    })
}
