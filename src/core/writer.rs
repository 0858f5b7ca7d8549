//! Purpose: Format-polymorphic streaming record writers (JSON array, CSV).
//! Exports: `ExportFormat`, `RecordWriter`, `JsonRecordWriter`, `CsvRecordWriter`, `for_format`.
//! Role: One `start/write_record/finish` contract selected once by format.
//! Invariants: Records are written incrementally; the full set is never buffered.
//! Invariants: Encode failures surface as `ErrorKind::Encode`; stream failures as `Io`.
//! Invariants: JSON output is a single valid array; CSV emits its header exactly once.
use std::io::Write;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::core::error::{Error, ErrorKind};
use crate::core::flatten;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    /// File extension; matches `as_str` for both formats.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unsupported export format '{other}'"))
                .with_hint("Use --format json or --format csv.")),
        }
    }
}

/// Streaming writer contract: `start` once, `write_record` per record,
/// `finish` once. Implementations own only the output handle and their
/// framing flags.
pub trait RecordWriter {
    fn start(&mut self) -> Result<(), Error>;
    fn write_record(&mut self, record: &Map<String, Value>) -> Result<(), Error>;
    fn finish(&mut self) -> Result<(), Error>;
}

/// Select a writer for the format over an arbitrary byte sink.
pub fn for_format<'a, W: Write + 'a>(format: ExportFormat, writer: W) -> Box<dyn RecordWriter + 'a> {
    match format {
        ExportFormat::Json => Box::new(JsonRecordWriter::new(writer)),
        ExportFormat::Csv => Box::new(CsvRecordWriter::new(writer)),
    }
}

pub struct JsonRecordWriter<W: Write> {
    writer: W,
    first: bool,
}

impl<W: Write> JsonRecordWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            first: true,
        }
    }
}

fn io_error(err: std::io::Error, message: &str) -> Error {
    Error::new(ErrorKind::Io)
        .with_message(message)
        .with_source(err)
}

impl<W: Write> RecordWriter for JsonRecordWriter<W> {
    fn start(&mut self) -> Result<(), Error> {
        self.writer
            .write_all(b"[")
            .map_err(|err| io_error(err, "failed to write array opening"))
    }

    fn write_record(&mut self, record: &Map<String, Value>) -> Result<(), Error> {
        let encoded = serde_json::to_vec(record).map_err(|err| {
            Error::new(ErrorKind::Encode)
                .with_message("failed to encode record json")
                .with_source(err)
        })?;
        if !self.first {
            self.writer
                .write_all(b",\n")
                .map_err(|err| io_error(err, "failed to write record separator"))?;
        }
        self.writer
            .write_all(&encoded)
            .map_err(|err| io_error(err, "failed to write record"))?;
        self.first = false;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), Error> {
        self.writer
            .write_all(b"]")
            .map_err(|err| io_error(err, "failed to write array closing"))?;
        self.writer
            .flush()
            .map_err(|err| io_error(err, "failed to flush output"))
    }
}

pub struct CsvRecordWriter<W: Write> {
    writer: csv::Writer<W>,
    headed: bool,
}

impl<W: Write> CsvRecordWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
            headed: false,
        }
    }
}

fn csv_error(err: csv::Error) -> Error {
    match err.into_kind() {
        csv::ErrorKind::Io(io_err) => io_error(io_err, "failed to write csv row"),
        other => Error::new(ErrorKind::Encode)
            .with_message(format!("failed to encode csv row: {other:?}")),
    }
}

impl<W: Write> RecordWriter for CsvRecordWriter<W> {
    fn start(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn write_record(&mut self, record: &Map<String, Value>) -> Result<(), Error> {
        let fields = flatten::flatten(record);
        if !self.headed {
            self.writer
                .write_record(fields.iter().map(|field| field.path.as_str()))
                .map_err(csv_error)?;
            self.headed = true;
        }
        self.writer
            .write_record(fields.iter().map(|field| flatten::render(field.value)))
            .map_err(csv_error)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), Error> {
        self.writer
            .flush()
            .map_err(|err| io_error(err, "failed to flush csv output"))
    }
}
