//! Purpose: Paginated export driver feeding entities through the writers.
//! Exports: `EntitySource`, `ExportConfig`, `ExportOutcome`, `RecordFailure`, `export_kind`.
//! Role: Owns page lifetime and output-file lifecycle; callers observe via callbacks.
//! Invariants: Memory is bounded by one page; pages are never retained across iterations.
//! Invariants: Output streams into a `.partial` sibling and is renamed only after `finish`.
//! Invariants: Source and stream errors are fatal; encode failures skip one record.
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::entity::Entity;
use crate::core::error::{Error, ErrorKind};
use crate::core::writer::{self, ExportFormat, RecordWriter};

pub const EXPORT_PAGE_SIZE: u64 = 1000;

/// Paginated query capability over one kind in one namespace. A returned
/// empty page signals the end of the dataset.
pub trait EntitySource {
    fn fetch_page(
        &self,
        kind: &str,
        namespace: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Entity>, Error>;
}

#[derive(Clone, Debug)]
pub struct ExportConfig {
    pub kind: String,
    pub namespace: String,
    pub format: ExportFormat,
    pub out_dir: PathBuf,
    pub page_size: u64,
}

impl ExportConfig {
    pub fn new(kind: impl Into<String>, format: ExportFormat) -> Self {
        Self {
            kind: kind.into(),
            namespace: String::new(),
            format,
            out_dir: PathBuf::from("exports"),
            page_size: EXPORT_PAGE_SIZE,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_out_dir(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.out_dir = out_dir.into();
        self
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct ExportOutcome {
    pub fetched: u64,
    pub written: u64,
    pub skipped: u64,
    pub path: PathBuf,
}

/// One skipped record, reported through the `on_skip` callback.
#[derive(Clone, Debug)]
pub struct RecordFailure {
    pub index: u64,
    pub message: String,
    pub error_kind: String,
}

/// Export one kind to a freshly named file under `config.out_dir`.
///
/// `on_page` receives the running record total after each fetched page;
/// `on_skip` receives every record dropped for an encode failure. Source and
/// stream errors abort the export and remove the partial file best-effort.
pub fn export_kind<S, P, N>(
    source: &S,
    config: &ExportConfig,
    mut on_page: P,
    mut on_skip: N,
) -> Result<ExportOutcome, Error>
where
    S: EntitySource + ?Sized,
    P: FnMut(u64),
    N: FnMut(&RecordFailure),
{
    fs::create_dir_all(&config.out_dir).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to create export directory")
            .with_path(&config.out_dir)
            .with_source(err)
    })?;

    let final_path = config.out_dir.join(export_file_name(&config.kind, config.format));
    let partial = partial_path(&final_path);
    let file = File::create(&partial).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to create export file")
            .with_path(&partial)
            .with_source(err)
    })?;

    let mut outcome = ExportOutcome::default();
    let mut writer = writer::for_format(config.format, file);
    let result = run_export(
        source,
        config,
        writer.as_mut(),
        &mut outcome,
        &mut on_page,
        &mut on_skip,
    );
    drop(writer);

    if let Err(err) = result {
        let _ = fs::remove_file(&partial);
        return Err(err);
    }

    fs::rename(&partial, &final_path).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to finalize export file")
            .with_path(&final_path)
            .with_source(err)
    })?;
    outcome.path = final_path;
    Ok(outcome)
}

fn run_export<S>(
    source: &S,
    config: &ExportConfig,
    writer: &mut dyn RecordWriter,
    outcome: &mut ExportOutcome,
    on_page: &mut dyn FnMut(u64),
    on_skip: &mut dyn FnMut(&RecordFailure),
) -> Result<(), Error>
where
    S: EntitySource + ?Sized,
{
    writer.start()?;

    let mut offset = 0u64;
    loop {
        let page = source.fetch_page(&config.kind, &config.namespace, offset, config.page_size)?;
        if page.is_empty() {
            break;
        }
        for (position, entity) in page.iter().enumerate() {
            let index = offset + position as u64;
            let record = entity.export_record();
            match writer.write_record(&record) {
                Ok(()) => outcome.written += 1,
                Err(err) if err.kind() == ErrorKind::Encode => {
                    outcome.skipped += 1;
                    on_skip(&RecordFailure {
                        index,
                        message: err.to_string(),
                        error_kind: format!("{:?}", err.kind()),
                    });
                }
                Err(err) => return Err(err.with_offset(index)),
            }
        }
        offset += page.len() as u64;
        outcome.fetched = offset;
        on_page(offset);
    }

    writer.finish()
}

/// `export_<kind>_<timestamp>.<ext>`, second-resolution RFC3339 timestamp with
/// colons replaced so the name is portable.
pub fn export_file_name(kind: &str, format: ExportFormat) -> String {
    format!("export_{kind}_{}.{}", file_timestamp(), format.extension())
}

fn file_timestamp() -> String {
    let now = OffsetDateTime::now_utc();
    let now = now.replace_nanosecond(0).unwrap_or(now);
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
        .replace(':', "-")
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}
