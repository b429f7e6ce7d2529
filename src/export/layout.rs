use std::borrow::Cow;

use crate::config::EngineConfig;
use crate::export::ExportOptions;
use crate::query::View;
use crate::sequence::{Sequenced, ID_COLUMN};

/// Header of the sequence id column in exports.
pub const ROW_NUMBER_HEADER: &str = "No.";

/// Characters kept from timestamp display columns (`YYYY-mm-dd HH:MM:SS`).
const TIMESTAMP_DISPLAY_CHARS: usize = 19;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputColumn {
    RowNumber,
    Cell {
        index: usize,
        name: String,
        /// Keep at most this many characters.
        truncate: Option<usize>,
    },
}

impl OutputColumn {
    pub fn header(&self) -> &str {
        match self {
            OutputColumn::RowNumber => ROW_NUMBER_HEADER,
            OutputColumn::Cell { name, .. } => name,
        }
    }
}

/// Which columns an export writes, in which order, and how each cell is
/// rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportLayout {
    columns: Vec<OutputColumn>,
}

impl ExportLayout {
    /// Row number first, then the dataset columns in file order minus the
    /// configured redundant ones, then the request's projection and
    /// empty-column pruning.
    pub fn plan(
        seq: &Sequenced,
        view: &View,
        config: &EngineConfig,
        options: &ExportOptions,
    ) -> Self {
        let mut columns = vec![OutputColumn::RowNumber];
        for (index, name) in seq.dataset().columns().iter().enumerate() {
            let redundant = config
                .redundant_export_columns
                .iter()
                .any(|r| r.eq_ignore_ascii_case(name));
            let shadows_id = name.eq_ignore_ascii_case(ID_COLUMN)
                || name.eq_ignore_ascii_case(ROW_NUMBER_HEADER);
            if redundant || shadows_id {
                continue;
            }
            let truncate = config
                .timestamp_display_columns
                .iter()
                .any(|c| c == name)
                .then_some(TIMESTAMP_DISPLAY_CHARS);
            columns.push(OutputColumn::Cell {
                index,
                name: name.clone(),
                truncate,
            });
        }

        let mut layout = Self { columns };
        if !options.visible_columns.is_empty() {
            layout.retain(|column| {
                options.visible_columns.iter().any(|v| {
                    v == column.header()
                        || (column == &OutputColumn::RowNumber && v == ID_COLUMN)
                })
            });
        }
        if options.drop_empty_columns {
            layout.retain(|column| match column {
                OutputColumn::RowNumber => true,
                OutputColumn::Cell { index, .. } => view.rows().iter().any(|&row| {
                    seq.dataset()
                        .cell(row, *index)
                        .map_or(false, |cell| !cell.trim().is_empty())
                }),
            });
        }
        layout
    }

    /// Keep the columns matching `keep`, unless that would keep none.
    fn retain(&mut self, keep: impl Fn(&OutputColumn) -> bool) {
        let kept: Vec<OutputColumn> = self.columns.iter().filter(|c| keep(c)).cloned().collect();
        if kept.is_empty() {
            log::debug!("column pruning would remove every column; keeping all");
        } else {
            self.columns = kept;
        }
    }

    pub fn columns(&self) -> &[OutputColumn] {
        &self.columns
    }

    pub fn header(&self) -> Vec<&str> {
        self.columns.iter().map(OutputColumn::header).collect()
    }

    /// Rendered cells of one row. Empty cells render as empty strings.
    pub fn values(&self, seq: &Sequenced, row: usize) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| self.value(column, seq, row).into_owned())
            .collect()
    }

    pub fn value<'a>(&self, column: &OutputColumn, seq: &'a Sequenced, row: usize) -> Cow<'a, str> {
        match column {
            OutputColumn::RowNumber => Cow::Owned(seq.id_of(row).to_string()),
            OutputColumn::Cell {
                index, truncate, ..
            } => {
                let cell = seq.dataset().cell(row, *index).unwrap_or("");
                match truncate {
                    Some(limit) => Cow::Borrowed(truncate_chars(cell, *limit)),
                    None => Cow::Borrowed(cell),
                }
            }
        }
    }
}

fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::dataset::Dataset;
    use crate::sequence::sequence;
    use crate::temporal::ResolverPolicy;

    fn seq() -> Sequenced {
        let dataset = Dataset::from_rows(
            &["Timestamp", "User", "LineNumber", "Empty", "_id"],
            vec![
                vec!["2024-01-01 09:00:00.999", "alice", "7", " ", "x"],
                vec!["2024-01-01T10:00:00", "", "8", "", "y"],
            ],
        );
        sequence(dataset, &ResolverPolicy::sequencing(), &CancelToken::new()).unwrap()
    }

    #[test]
    fn default_layout_drops_redundant_columns() {
        let seq = seq();
        let layout = ExportLayout::plan(&seq, &View::all(&seq), &EngineConfig::default(), &ExportOptions::default());
        assert_eq!(layout.header(), vec!["No.", "Timestamp", "User", "Empty"]);
        assert_eq!(layout.values(&seq, 0), vec!["1", "2024-01-01 09:00:00", "alice", " "]);
        assert_eq!(layout.values(&seq, 1)[2], "");
    }

    #[test]
    fn empty_columns_can_be_dropped() {
        let seq = seq();
        let options = ExportOptions {
            drop_empty_columns: true,
            ..ExportOptions::default()
        };
        let layout = ExportLayout::plan(&seq, &View::all(&seq), &EngineConfig::default(), &options);
        assert_eq!(layout.header(), vec!["No.", "Timestamp", "User"]);
    }

    #[test]
    fn visible_columns_project_and_never_empty_the_layout() {
        let seq = seq();
        let options = ExportOptions {
            visible_columns: vec!["User".to_string(), "_id".to_string()],
            ..ExportOptions::default()
        };
        let layout = ExportLayout::plan(&seq, &View::all(&seq), &EngineConfig::default(), &options);
        assert_eq!(layout.header(), vec!["No.", "User"]);

        let options = ExportOptions {
            visible_columns: vec!["Nope".to_string()],
            ..ExportOptions::default()
        };
        let layout = ExportLayout::plan(&seq, &View::all(&seq), &EngineConfig::default(), &options);
        assert_eq!(layout.columns().len(), 4);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("ab", 5), "ab");
    }
}
