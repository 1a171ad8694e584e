//! Chunked GCode stream conversion
//!
//! The source is read in fixed-size chunks that need not end on a line
//! boundary; the unterminated tail of a chunk is carried into the next one.
//! Converted text accumulates in memory and is flushed to the sink once it
//! grows past [`FLUSH_THRESHOLD`].

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::time::Instant;

use bridge_config::BridgeSettings;
use errors::{BridgeError, BridgeResult};
use tracing::{debug, info};

use crate::transform::LineTransformer;

/// Source read size
pub const CHUNK_SIZE: usize = 4096;

/// Longest accepted source line, bytes
pub const MAX_LINE_LENGTH: usize = 4 * CHUNK_SIZE;

/// Output buffered before it is written to the sink
pub const FLUSH_THRESHOLD: usize = CHUNK_SIZE * 16 * 8;

/// Summary of one conversion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionStats {
    pub source_lines: usize,
    pub output_lines: usize,
    pub bytes_read: usize,
    pub bytes_written: usize,
}

/// Incremental converter: feed chunks, then finish
#[derive(Debug)]
pub struct StreamConverter {
    transformer: LineTransformer,
    close_macro: String,
    /// Unterminated tail of the previous chunk
    carry: Vec<u8>,
    buffer: String,
    scratch: String,
    max_line_length: usize,
    produced: bool,
    bytes_read: usize,
    bytes_written: usize,
}

impl StreamConverter {
    pub fn new(settings: &BridgeSettings) -> BridgeResult<Self> {
        Ok(Self {
            transformer: LineTransformer::new(settings)?,
            close_macro: settings.macros.close_port.clone(),
            carry: Vec::new(),
            buffer: String::with_capacity(CHUNK_SIZE * 16),
            scratch: String::with_capacity(512),
            max_line_length: MAX_LINE_LENGTH,
            produced: false,
            bytes_read: 0,
            bytes_written: 0,
        })
    }

    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    /// Convert every line completed by `chunk`
    pub fn feed<W: Write>(&mut self, chunk: &[u8], sink: &mut W) -> BridgeResult<()> {
        self.bytes_read += chunk.len();
        let mut rest = chunk;

        if !self.carry.is_empty() {
            match rest.iter().position(|&b| b == b'\n') {
                Some(end) => {
                    self.carry.extend_from_slice(&rest[..end]);
                    self.check_line_length(self.carry.len())?;
                    let line = std::mem::take(&mut self.carry);
                    self.process_line(&line, sink)?;
                    rest = &rest[end + 1..];
                },
                None => {
                    self.carry.extend_from_slice(rest);
                    return self.check_line_length(self.carry.len());
                },
            }
        }

        while let Some(end) = rest.iter().position(|&b| b == b'\n') {
            self.check_line_length(end)?;
            self.process_line(&rest[..end], sink)?;
            rest = &rest[end + 1..];
        }

        self.check_line_length(rest.len())?;
        self.carry.extend_from_slice(rest);
        Ok(())
    }

    /// Convert the unterminated last line, close the port and flush everything
    pub fn finish<W: Write>(mut self, sink: &mut W) -> BridgeResult<ConversionStats> {
        if !self.carry.is_empty() {
            let line = std::mem::take(&mut self.carry);
            self.process_line(&line, sink)?;
        }

        if self.produced {
            let tail = format!("{}{}", self.close_macro, self.transformer.terminator());
            self.append(&tail, sink)?;
        }

        self.flush(sink)?;
        sink.flush()?;

        Ok(ConversionStats {
            source_lines: self.transformer.source_lines(),
            output_lines: self.transformer.output_lines() + usize::from(self.produced),
            bytes_read: self.bytes_read,
            bytes_written: self.bytes_written,
        })
    }

    fn check_line_length(&self, len: usize) -> BridgeResult<()> {
        if len > self.max_line_length {
            return Err(BridgeError::LineTooLong {
                line: self.transformer.source_lines() + 1,
                max: self.max_line_length,
            });
        }
        Ok(())
    }

    fn process_line<W: Write>(&mut self, raw: &[u8], sink: &mut W) -> BridgeResult<()> {
        let line = String::from_utf8_lossy(raw);
        let mut converted = std::mem::take(&mut self.scratch);
        converted.clear();
        self.transformer.transform_line(&line, &mut converted);

        let result = self.append(&converted, sink);
        self.scratch = converted;
        result
    }

    fn append<W: Write>(&mut self, text: &str, sink: &mut W) -> BridgeResult<()> {
        if text.is_empty() {
            return Ok(());
        }
        if self.buffer.len() + text.len() * 3 > FLUSH_THRESHOLD {
            self.flush(sink)?;
        }
        self.buffer.push_str(text);
        self.produced = true;
        Ok(())
    }

    fn flush<W: Write>(&mut self, sink: &mut W) -> BridgeResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        sink.write_all(self.buffer.as_bytes())?;
        self.bytes_written += self.buffer.len();
        debug!("Flushed {} bytes of converted program", self.buffer.len());
        self.buffer.clear();
        Ok(())
    }
}

/// Convert `source` into `destination`
///
/// Fails before touching either file when no axis is enabled. The destination
/// is replaced.
pub fn convert_file(
    settings: &BridgeSettings,
    source: &Path,
    destination: &Path,
) -> BridgeResult<ConversionStats> {
    let mut converter = StreamConverter::new(settings)?;
    let started = Instant::now();

    let mut reader = File::open(source)?;
    let mut writer = BufWriter::new(File::create(destination)?);
    let mut chunk = vec![0u8; CHUNK_SIZE];

    loop {
        let read = reader.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        converter.feed(&chunk[..read], &mut writer)?;
    }
    let stats = converter.finish(&mut writer)?;

    info!(
        "Converted {} ({} lines) to {} ({} lines) in {:.2}ms",
        source.display(),
        stats.source_lines,
        destination.display(),
        stats.output_lines,
        started.elapsed().as_secs_f64() * 1000.0
    );
    Ok(stats)
}

/// Convert a whole program held in memory
pub fn convert_str(settings: &BridgeSettings, source: &str) -> BridgeResult<String> {
    let mut converter = StreamConverter::new(settings)?;
    let mut output = Vec::new();
    converter.feed(source.as_bytes(), &mut output)?;
    converter.finish(&mut output)?;
    String::from_utf8(output).map_err(|e| BridgeError::Conversion(e.to_string()))
}
