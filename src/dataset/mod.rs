//! Schema-less tabular datasets.
//!
//! A [`Dataset`] is a header plus rows of raw text cells. Nothing is typed up
//! front: instants and numbers are projected from the text on demand by the
//! components that need them. Empty cells are treated as nulls everywhere.

mod scan;

pub use scan::{open_source, scan_file, Scan, ScanStats};

use csv::StringRecord;

/// An immutable flat table; every row has exactly `columns().len()` cells.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<StringRecord>,
}

impl Dataset {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a dataset from literal rows. Rows of the wrong width are dropped.
    pub fn from_rows<R, C>(columns: &[&str], rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        let mut dataset = Self::new(columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            let record: StringRecord = row.into_iter().collect();
            dataset.push(record);
        }
        dataset
    }

    /// Append a row. Returns `false` (and drops the row) when its width does
    /// not match the header.
    pub fn push(&mut self, record: StringRecord) -> bool {
        if record.len() != self.columns.len() {
            return false;
        }
        self.rows.push(record);
        true
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Exact column lookup.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Case-insensitive column lookup; the first match in file order wins.
    pub fn column_index_ci(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Cell text, or `None` for an empty cell.
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        non_empty(self.rows.get(row)?.get(column)?)
    }

    pub fn record(&self, row: usize) -> RecordRef<'_> {
        RecordRef {
            columns: &self.columns,
            record: &self.rows[row],
        }
    }

    pub fn records(&self) -> impl Iterator<Item = RecordRef<'_>> {
        self.rows.iter().map(move |record| RecordRef {
            columns: &self.columns,
            record,
        })
    }

    /// New dataset holding the given rows in the given order.
    pub fn select(&self, rows: &[usize]) -> Dataset {
        Dataset {
            columns: self.columns.clone(),
            rows: rows.iter().map(|&idx| self.rows[idx].clone()).collect(),
        }
    }

    pub(crate) fn raw_row(&self, row: usize) -> &StringRecord {
        &self.rows[row]
    }

    pub(crate) fn into_parts(self) -> (Vec<String>, Vec<StringRecord>) {
        (self.columns, self.rows)
    }

    pub(crate) fn from_parts(columns: Vec<String>, rows: Vec<StringRecord>) -> Self {
        Self { columns, rows }
    }
}

/// Borrowed view of one row.
#[derive(Debug, Clone, Copy)]
pub struct RecordRef<'a> {
    columns: &'a [String],
    record: &'a StringRecord,
}

impl<'a> RecordRef<'a> {
    /// Value of the named column (exact name), `None` when empty or absent.
    pub fn get(&self, name: &str) -> Option<&'a str> {
        let idx = self.columns.iter().position(|c| c == name)?;
        self.cell(idx)
    }

    pub fn cell(&self, idx: usize) -> Option<&'a str> {
        non_empty(self.record.get(idx)?)
    }

    /// `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, Option<&'a str>)> + 'a {
        let record = self.record;
        self.columns
            .iter()
            .enumerate()
            .map(move |(idx, name)| (name.as_str(), record.get(idx).and_then(non_empty)))
    }
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_of_wrong_width_are_dropped() {
        let dataset = Dataset::from_rows(
            &["a", "b"],
            vec![vec!["1", "2"], vec!["3"], vec!["4", "5"]],
        );
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.cell(1, 0), Some("4"));
    }

    #[test]
    fn empty_cells_read_as_null() {
        let dataset = Dataset::from_rows(&["User", "Host"], vec![vec!["", "ws01"]]);
        let record = dataset.record(0);
        assert_eq!(record.get("User"), None);
        assert_eq!(record.get("Host"), Some("ws01"));
        assert_eq!(record.get("Missing"), None);
    }

    #[test]
    fn case_insensitive_lookup_prefers_file_order() {
        let dataset = Dataset::from_rows(&["level", "Level"], Vec::<Vec<&str>>::new());
        assert_eq!(dataset.column_index_ci("LEVEL"), Some(0));
        assert_eq!(dataset.column_index("Level"), Some(1));
    }
}
