use std::io::{BufWriter, Write};
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use time::macros::datetime;
use time::{Duration, PrimitiveDateTime};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};

/// Day zero of spreadsheet serial dates.
const SERIAL_EPOCH: PrimitiveDateTime = datetime!(1899-12-30 00:00);

/// Write the first worksheet as CSV. Its first row is the header; every
/// following row counts as a record.
pub fn workbook_to_csv<W: Write>(source: &Path, out: W, cancel: &CancelToken) -> Result<u64> {
    let mut workbook = open_workbook_auto(source)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| Error::Spreadsheet("workbook has no worksheets".to_string()))??;

    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(BufWriter::new(out));
    let mut record: Vec<String> = Vec::with_capacity(range.width());
    let mut lines: u64 = 0;
    for row in range.rows() {
        cancel.checkpoint(lines as usize)?;
        record.clear();
        record.extend(row.iter().map(cell_text));
        writer.write_record(&record)?;
        lines += 1;
    }
    writer.flush()?;
    Ok(lines.saturating_sub(1))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::DateTime(serial) => serial_to_text(serial.as_f64()),
        other => other.to_string(),
    }
}

fn serial_to_text(serial: f64) -> String {
    let millis = (serial * 86_400_000.0).round() as i64;
    SERIAL_EPOCH
        .checked_add(Duration::milliseconds(millis))
        .map(|at| {
            format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                at.year(),
                u8::from(at.month()),
                at.day(),
                at.hour(),
                at.minute(),
                at.second()
            )
        })
        .unwrap_or_else(|| serial.to_string())
}
