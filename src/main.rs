//! Purpose: `dsadmin` CLI entry point and command dispatch.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Command results are single JSON envelopes on stdout.
//! Invariants: Human progress and non-fatal notices go to stderr only.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `core::error::to_exit_code`.
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

use dsadmin::api::DatastoreClient;
use dsadmin::core::delete::{KeyStore, delete_all};
use dsadmin::core::error::{Error, ErrorKind, to_exit_code};
use dsadmin::core::export::{ExportConfig, RecordFailure, export_kind};
use dsadmin::core::writer::ExportFormat;
use dsadmin::notice::{Notice, notice_json};

#[derive(Parser)]
#[command(
    name = "dsadmin",
    version,
    about = "Operator commands for Google Cloud Datastore"
)]
struct Cli {
    /// Override the Datastore API endpoint (emulator, testing).
    #[arg(long, global = true, value_name = "URL")]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export every entity of one kind to a JSON or CSV file.
    ExportKind {
        /// Project to be used.
        #[arg(short = 'p', long)]
        project: String,
        /// Namespace to get data from (default namespace when omitted).
        #[arg(short = 'n', long, default_value = "")]
        namespace: String,
        /// Kind to export.
        #[arg(short = 'k', long)]
        kind: String,
        /// Output format.
        #[arg(long, value_enum, default_value_t = FormatArg::Json)]
        format: FormatArg,
        /// Directory export files are written into.
        #[arg(long, default_value = "exports", value_name = "DIR")]
        out_dir: PathBuf,
    },
    /// Delete all entities inside the given namespaces and kinds.
    DeleteAll {
        /// Project to be used.
        #[arg(short = 'p', long)]
        project: String,
        /// Comma-separated namespaces to clean up (discovered when omitted).
        #[arg(short = 'n', long)]
        namespaces: Option<String>,
        /// Comma-separated kinds to clean up (discovered when omitted).
        #[arg(short = 'k', long)]
        kinds: Option<String>,
        /// Clean every discovered namespace without prompting.
        #[arg(long)]
        yes: bool,
    },
    /// Generate shell completions.
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum FormatArg {
    Json,
    Csv,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => ExportFormat::Json,
            FormatArg::Csv => ExportFormat::Csv,
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<RunOutcome, Error> {
    match cli.command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "dsadmin", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::ExportKind {
            project,
            namespace,
            kind,
            format,
            out_dir,
        } => {
            let client = DatastoreClient::connect(&project, cli.endpoint.as_deref())?;
            run_export(&client, &project, namespace, kind, format.into(), out_dir)
        }
        Command::DeleteAll {
            project,
            namespaces,
            kinds,
            yes,
        } => {
            let client = DatastoreClient::connect(&project, cli.endpoint.as_deref())?;
            run_delete(&client, namespaces, kinds, yes)
        }
    }
}

fn run_export(
    client: &DatastoreClient,
    project: &str,
    namespace: String,
    kind: String,
    format: ExportFormat,
    out_dir: PathBuf,
) -> Result<RunOutcome, Error> {
    eprintln!("Exporting '{kind}' from '{project}/{namespace}'");

    let config = ExportConfig::new(&kind, format)
        .with_namespace(&namespace)
        .with_out_dir(out_dir);
    let outcome = export_kind(
        client,
        &config,
        |total| eprintln!("Exporting {kind} - {total}"),
        |failure| emit_notice(&skip_notice(&kind, failure)),
    )?;

    emit_json(json!({
        "export": {
            "kind": kind,
            "namespace": namespace,
            "format": format.as_str(),
            "fetched": outcome.fetched,
            "written": outcome.written,
            "skipped": outcome.skipped,
            "path": outcome.path.display().to_string(),
        }
    }));
    Ok(RunOutcome::ok())
}

fn run_delete(
    client: &DatastoreClient,
    namespaces: Option<String>,
    kinds: Option<String>,
    yes: bool,
) -> Result<RunOutcome, Error> {
    let namespaces = match namespaces {
        Some(raw) => split_csv(&raw),
        None => {
            let discovered = client.namespaces()?;
            if discovered.is_empty() {
                vec![String::new()]
            } else if yes {
                discovered
            } else {
                choose_namespaces(&discovered)?
            }
        }
    };
    let kinds = kinds.map(|raw| split_csv(&raw));

    let outcome = delete_all(client, &namespaces, kinds.as_deref(), |ns, kind, count| {
        let label = if ns.is_empty() { "(default)" } else { ns };
        eprintln!("Deleting {label}/{kind} ... keys: {count}");
    })?;

    eprintln!("All entities have been deleted.");
    eprintln!("Emptied namespaces clean up automatically within 48 hours.");
    emit_json(json!({
        "deleted": {
            "namespaces": namespaces,
            "kinds_cleared": outcome.kinds_cleared,
            "keys_deleted": outcome.keys_deleted,
        }
    }));
    Ok(RunOutcome::ok())
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',').map(|part| part.trim().to_string()).collect()
}

/// Offer the discovered namespaces on stderr and read one choice from stdin.
/// Empty input and "all" select every namespace.
fn choose_namespaces(discovered: &[String]) -> Result<Vec<String>, Error> {
    eprintln!("Entities from the following namespaces will be deleted:");
    for namespace in discovered {
        let label = if namespace.is_empty() {
            "(default)"
        } else {
            namespace
        };
        eprintln!("  {label}");
    }
    eprint!("Choose a namespace to clean up [all]: ");

    let mut line = String::new();
    io::stdin().read_line(&mut line).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read namespace choice")
            .with_source(err)
    })?;
    let choice = line.trim();
    if choice.is_empty() || choice == "all" {
        return Ok(discovered.to_vec());
    }
    let resolved = if choice == "(default)" { "" } else { choice };
    if discovered.iter().any(|namespace| namespace == resolved) {
        return Ok(vec![resolved.to_string()]);
    }
    Err(Error::new(ErrorKind::Usage)
        .with_message(format!("unknown namespace '{choice}'"))
        .with_hint("Answer with one of the listed namespaces, or \"all\"."))
}

fn skip_notice(kind: &str, failure: &RecordFailure) -> Notice {
    let mut details = Map::new();
    details.insert("index".to_string(), Value::from(failure.index));
    details.insert(
        "error_kind".to_string(),
        Value::from(failure.error_kind.clone()),
    );
    Notice {
        kind: "skip".to_string(),
        time: notice_time_now().unwrap_or_default(),
        cmd: "export-kind".to_string(),
        entity_kind: kind.to_string(),
        message: failure.message.clone(),
        details,
    }
}

fn notice_time_now() -> Option<String> {
    use time::format_description::well_known::Rfc3339;
    let duration = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
    let ts = time::OffsetDateTime::from_unix_timestamp_nanos(duration.as_nanos() as i128).ok()?;
    ts.format(&Rfc3339).ok()
}

fn emit_json(value: Value) {
    println!(
        "{}",
        serde_json::to_string(&value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn emit_notice(notice: &Notice) {
    if io::stderr().is_terminal() {
        eprintln!("notice: {} (kind: {})", notice.message, notice.entity_kind);
        return;
    }
    let json = serde_json::to_string(&notice_json(notice))
        .unwrap_or_else(|_| "{\"notice\":{}}".to_string());
    eprintln!("{json}");
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    if let Some(message) = err.message() {
        inner.insert("message".to_string(), json!(message));
    }
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(offset) = err.offset() {
        inner.insert("offset".to_string(), json!(offset));
    }
    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("error: {err}");
        if let Some(hint) = err.hint() {
            eprintln!("hint: {hint}");
        }
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}
