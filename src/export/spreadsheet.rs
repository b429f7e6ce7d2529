use rust_xlsxwriter::{Format, Workbook};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::export::ExportLayout;
use crate::query::View;
use crate::sequence::Sequenced;

/// Rows per worksheet, header included.
pub const MAX_SHEET_ROWS: usize = 1_048_576;

pub const SHEET_NAME: &str = "Timeline";

const COLUMN_WIDTH: f64 = 18.0;

/// Render `view` as an xlsx workbook with a frozen, filterable header row.
pub fn render(
    seq: &Sequenced,
    view: &View,
    layout: &ExportLayout,
    cancel: &CancelToken,
) -> Result<Vec<u8>> {
    if view.len() + 1 > MAX_SHEET_ROWS {
        return Err(Error::Spreadsheet(format!(
            "{} rows exceed the sheet limit of {}",
            view.len(),
            MAX_SHEET_ROWS - 1
        )));
    }
    let columns = layout.columns();
    if columns.len() > u16::MAX as usize {
        return Err(Error::Spreadsheet(format!(
            "{} columns exceed the sheet limit",
            columns.len()
        )));
    }

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;
    let bold = Format::new().set_bold();

    for (col, column) in columns.iter().enumerate() {
        let col = col as u16;
        sheet.write_string_with_format(0, col, column.header(), &bold)?;
        sheet.set_column_width(col, COLUMN_WIDTH)?;
    }

    for (n, &row) in view.rows().iter().enumerate() {
        cancel.checkpoint(n)?;
        let sheet_row = n as u32 + 1;
        for (col, column) in columns.iter().enumerate() {
            let value = layout.value(column, seq, row);
            if !value.is_empty() {
                sheet.write_string(sheet_row, col as u16, &*value)?;
            }
        }
    }

    if !columns.is_empty() {
        sheet.set_freeze_panes(1, 0)?;
        sheet.autofilter(0, 0, view.len() as u32, columns.len() as u16 - 1)?;
    }
    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::dataset::Dataset;
    use crate::export::ExportOptions;
    use crate::sequence::sequence;
    use crate::temporal::ResolverPolicy;

    #[test]
    fn renders_a_zip_container() {
        let dataset = Dataset::from_rows(
            &["Timestamp", "User"],
            vec![vec!["2024-01-01 09:00:00", "alice"], vec!["", "bob"]],
        );
        let seq = sequence(dataset, &ResolverPolicy::sequencing(), &CancelToken::new()).unwrap();
        let view = View::all(&seq);
        let layout = ExportLayout::plan(&seq, &view, &EngineConfig::default(), &ExportOptions::default());
        let bytes = render(&seq, &view, &layout, &CancelToken::new()).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }
}
