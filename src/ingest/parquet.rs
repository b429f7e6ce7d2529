use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use arrow::array::Array;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::cancel::CancelToken;
use crate::error::Result;

/// Write every column of a Parquet file as text. Nulls become empty cells.
pub fn parquet_to_csv<W: Write>(source: &Path, out: W, cancel: &CancelToken) -> Result<u64> {
    let file = File::open(source)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?.with_batch_size(8192);
    let header: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build()?;

    let mut writer = csv::Writer::from_writer(BufWriter::new(out));
    writer.write_record(&header)?;

    let options = FormatOptions::default();
    let mut rows: u64 = 0;
    for batch in reader {
        let batch = batch?;
        cancel.check()?;
        let formatters = batch
            .columns()
            .iter()
            .map(|column| ArrayFormatter::try_new(column.as_ref(), &options))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut record = Vec::with_capacity(formatters.len());
        for i in 0..batch.num_rows() {
            record.clear();
            for (column, formatter) in batch.columns().iter().zip(&formatters) {
                if column.is_null(i) {
                    record.push(String::new());
                } else {
                    record.push(formatter.value(i).to_string());
                }
            }
            writer.write_record(&record)?;
        }
        rows += batch.num_rows() as u64;
    }
    writer.flush()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn columns_are_rendered_as_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.parquet");
        let schema = Arc::new(Schema::new(vec![
            Field::new("EventID", DataType::Int64, true),
            Field::new("User", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            Arc::clone(&schema),
            vec![
                Arc::new(Int64Array::from(vec![Some(4624), None])),
                Arc::new(StringArray::from(vec![Some("alice"), Some("bob")])),
            ],
        )
        .unwrap();
        let mut writer = ArrowWriter::try_new(File::create(&path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let mut out = Vec::new();
        let rows = parquet_to_csv(&path, &mut out, &CancelToken::new()).unwrap();
        assert_eq!(rows, 2);
        assert_eq!(String::from_utf8(out).unwrap(), "EventID,User\n4624,alice\n,bob\n");
    }
}
