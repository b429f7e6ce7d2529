//! Byte-bounded splitting of CSV output into header-prefixed parts.

use std::io::{Seek, Write};

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::Result;

/// Receives the parts produced by a [`Splitter`], one at a time.
pub trait ChunkSink {
    /// Start part `index` (1-based).
    fn begin_part(&mut self, index: usize) -> Result<()>;

    /// Append bytes to the current part.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    fn end_part(&mut self) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes each part as a deflated `Part_<n>.csv` zip entry.
pub struct ZipChunkSink<W: Write + Seek> {
    zip: ZipWriter<W>,
    options: FileOptions,
}

impl<W: Write + Seek> ZipChunkSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            zip: ZipWriter::new(writer),
            options: FileOptions::default().compression_method(CompressionMethod::Deflated),
        }
    }

    /// Write the central directory and return the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        Ok(self.zip.finish()?)
    }
}

impl<W: Write + Seek> ChunkSink for ZipChunkSink<W> {
    fn begin_part(&mut self, index: usize) -> Result<()> {
        self.zip.start_file(format!("Part_{index}.csv"), self.options)?;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.zip.write_all(bytes)?;
        Ok(())
    }
}

/// Keeps every part in memory.
#[derive(Debug, Default)]
pub struct MemoryChunkSink {
    pub parts: Vec<Vec<u8>>,
}

impl ChunkSink for MemoryChunkSink {
    fn begin_part(&mut self, _index: usize) -> Result<()> {
        self.parts.push(Vec::new());
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if let Some(part) = self.parts.last_mut() {
            part.extend_from_slice(bytes);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitSummary {
    pub parts: usize,
    pub rows: u64,
}

/// Streams encoded rows into parts of at most `budget` bytes.
///
/// Every part starts with the header. A part is sealed before the row that
/// would push it past the budget, so rows are never split; a single row
/// larger than the budget gets a part of its own.
pub struct Splitter<S: ChunkSink> {
    sink: S,
    budget: u64,
    header: Vec<u8>,
    part: usize,
    part_bytes: u64,
    part_rows: u64,
    rows: u64,
}

impl<S: ChunkSink> Splitter<S> {
    pub fn new(sink: S, budget: u64, header: Vec<u8>) -> Self {
        Self {
            sink,
            budget,
            header,
            part: 0,
            part_bytes: 0,
            part_rows: 0,
            rows: 0,
        }
    }

    pub fn push_row(&mut self, row: &[u8]) -> Result<()> {
        let len = row.len() as u64;
        if self.part_rows > 0 && self.part_bytes + len > self.budget {
            self.seal()?;
        }
        if self.part_rows == 0 {
            self.part += 1;
            self.sink.begin_part(self.part)?;
            self.sink.write(&self.header)?;
            self.part_bytes = self.header.len() as u64;
        }
        self.sink.write(row)?;
        self.part_bytes += len;
        self.part_rows += 1;
        self.rows += 1;
        Ok(())
    }

    fn seal(&mut self) -> Result<()> {
        self.sink.end_part()?;
        log::debug!(
            "sealed part {} ({} rows, {} bytes)",
            self.part,
            self.part_rows,
            self.part_bytes
        );
        self.part_rows = 0;
        self.part_bytes = 0;
        Ok(())
    }

    /// Seal the open part and return the sink. An input without rows
    /// produces no parts.
    pub fn finish(mut self) -> Result<(S, SplitSummary)> {
        if self.part_rows > 0 {
            self.seal()?;
        }
        self.sink.finish()?;
        let summary = SplitSummary {
            parts: self.part,
            rows: self.rows,
        };
        Ok((self.sink, summary))
    }
}
