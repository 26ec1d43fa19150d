//! simprov CLI: record, inspect and exchange workbench provenance.
//!
//! Usage:
//!   simprov [--config file] [--db path] [--session name] record upload|copy ...
//!   simprov export [--format turtle|ntriples] [--output file]
//!   simprov import <file>
//!   simprov show | lineage <entity> | sessions
//!   simprov test-connection --host <host> --username <name>

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use simprov::config::{ConfigError, WorkbenchConfig};
use simprov::provenance::{record_copy, record_upload, FileTransfer};
use simprov::rdf::{from_ntriples_with_namespaces, to_ntriples, to_turtle};
use simprov::remote::{is_valid_username, ConnectionTester};
use simprov::{Namespaces, NodeKind, OpenStore, ProvenanceEngine, SessionId, SqliteStore};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Environment variable read for the connection test password
const PASSWORD_ENV: &str = "SIMPROV_PASSWORD";

#[derive(Parser)]
#[command(
    name = "simprov",
    version,
    about = "Provenance ledger for simulation workbench file transfers"
)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Path to SQLite database file (overrides the config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Workbench session whose ledger to use
    #[arg(long, global = true, default_value = "default")]
    session: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a file operation
    Record {
        #[command(subcommand)]
        operation: Operation,
    },
    /// Write the session ledger as RDF
    Export {
        #[arg(long, value_enum, default_value_t = Format::Turtle)]
        format: Format,
        /// Output file (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Load an N-Triples ledger into a new session
    Import {
        /// N-Triples file to read
        file: PathBuf,
    },
    /// Summarize the session ledger
    Show,
    /// Trace where an entity came from
    Lineage {
        /// Entity identifier (short or full)
        entity: String,
    },
    /// List sessions in the database
    Sessions,
    /// Check that a remote host accepts SSH credentials
    ///
    /// The password is read from SIMPROV_PASSWORD, or from the first line of
    /// stdin when that is unset.
    TestConnection {
        #[arg(long)]
        host: String,
        #[arg(long)]
        username: String,
        /// Overrides connect_timeout_ms from the config file
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

#[derive(Subcommand)]
enum Operation {
    /// Upload of a local file to a remote host
    Upload {
        #[command(flatten)]
        transfer: TransferArgs,
        /// Remote host the file was uploaded to
        #[arg(long)]
        remote: String,
    },
    /// Copy between two local locations
    Copy {
        #[command(flatten)]
        transfer: TransferArgs,
    },
}

#[derive(clap::Args)]
struct TransferArgs {
    /// Source file identifier (e.g. local:sim.cfg)
    #[arg(long)]
    source: String,
    /// Destination file identifier (e.g. remote:sim.cfg)
    #[arg(long)]
    destination: String,
    /// Label shared by both files
    #[arg(long)]
    label: String,
    /// Activity identifier (e.g. act:upload1)
    #[arg(long)]
    activity: String,
    /// When the transfer started (RFC 3339, defaults to now)
    #[arg(long, value_parser = parse_time)]
    started_at: Option<DateTime<Utc>>,
    /// When the transfer reportedly ended (RFC 3339)
    #[arg(long, value_parser = parse_time)]
    ended_at: Option<DateTime<Utc>>,
}

impl TransferArgs {
    fn into_transfer(self) -> FileTransfer {
        let mut transfer = FileTransfer::new(self.source, self.destination, self.label, self.activity);
        if let Some(at) = self.started_at {
            transfer = transfer.with_started_at(at);
        }
        if let Some(at) = self.ended_at {
            transfer = transfer.with_ended_at(at);
        }
        transfer
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Turtle,
    Ntriples,
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp: {}", e))
}

fn load_config(path: Option<&PathBuf>) -> Result<WorkbenchConfig, ConfigError> {
    match path {
        Some(path) => WorkbenchConfig::load(path),
        None => Ok(WorkbenchConfig::default()),
    }
}

fn open_engine(config: &WorkbenchConfig, db: Option<PathBuf>) -> Result<ProvenanceEngine, String> {
    let db_path = db.unwrap_or_else(|| config.database_path());
    let store = SqliteStore::open(&db_path).map_err(|e| format!("Failed to open database: {}", e))?;
    let engine = ProvenanceEngine::with_store(Arc::new(store)).with_local_namespace(&config.local_namespace);
    engine.load_all().map_err(|e| format!("Failed to load sessions: {}", e))?;
    Ok(engine)
}

/// Open the ledger and run a command against it
fn with_engine(config: &WorkbenchConfig, db: Option<PathBuf>, run: impl FnOnce(&ProvenanceEngine) -> i32) -> i32 {
    match open_engine(config, db) {
        Ok(engine) => run(&engine),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_record(engine: &ProvenanceEngine, session: &SessionId, operation: Operation) -> i32 {
    let result = match operation {
        Operation::Upload { transfer, remote } => {
            let transfer = transfer.into_transfer();
            engine.record(session, |graph| record_upload(graph, &transfer, &remote))
        }
        Operation::Copy { transfer } => {
            let transfer = transfer.into_transfer();
            engine.record(session, |graph| record_copy(graph, &transfer))
        }
    };
    match result {
        Ok(activity) => {
            println!("Recorded {} in session '{}'", activity, session);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_export(engine: &ProvenanceEngine, session: &SessionId, format: Format, output: Option<PathBuf>) -> i32 {
    let Some(graph) = engine.get_graph(session) else {
        eprintln!("Error: session '{}' not found", session);
        return 1;
    };
    let text = match format {
        Format::Turtle => to_turtle(&graph),
        Format::Ntriples => to_ntriples(&graph),
    };
    let written = match &output {
        Some(path) => std::fs::write(path, text),
        None => std::io::stdout().write_all(text.as_bytes()),
    };
    match written {
        Ok(()) => {
            if let Some(path) = output {
                println!("Wrote session '{}' to {}", session, path.display());
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_import(engine: &ProvenanceEngine, config: &WorkbenchConfig, session: &SessionId, file: &PathBuf) -> i32 {
    let text = match std::fs::read_to_string(file) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error: cannot read '{}': {}", file.display(), e);
            return 1;
        }
    };
    let graph = match from_ntriples_with_namespaces(&text, Namespaces::new(config.local_namespace.clone())) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("Error: {}: {}", file.display(), e);
            return 1;
        }
    };
    let (nodes, relations) = (graph.node_count(), graph.relation_count());
    match engine.insert_graph(session, graph) {
        Ok(()) => {
            println!(
                "Imported {} nodes and {} relations into session '{}'",
                nodes, relations, session
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_show(engine: &ProvenanceEngine, session: &SessionId) -> i32 {
    let Some(graph) = engine.get_graph(session) else {
        eprintln!("Error: session '{}' not found", session);
        return 1;
    };
    println!(
        "Session '{}': {} entities, {} activities, {} agents, {} relations",
        session,
        graph.count(NodeKind::Entity),
        graph.count(NodeKind::Activity),
        graph.count(NodeKind::Agent),
        graph.relation_count()
    );
    println!("{:<8}  {:<48}  {:<16}  {}", "KIND", "ID", "LABEL", "LOCATION");
    println!("{}", "-".repeat(88));
    for node in graph.nodes() {
        println!(
            "{:<8}  {:<48}  {:<16}  {}",
            node.kind.as_str(),
            node.id.as_str(),
            node.label.as_deref().unwrap_or("-"),
            node.location.as_deref().unwrap_or("-")
        );
    }
    0
}

fn cmd_lineage(engine: &ProvenanceEngine, session: &SessionId, entity: &str) -> i32 {
    let Some(graph) = engine.get_graph(session) else {
        eprintln!("Error: session '{}' not found", session);
        return 1;
    };
    let Some(entity) = graph.entity(entity) else {
        eprintln!("Error: entity '{}' not found in session '{}'", entity, session);
        return 1;
    };
    println!("{}", entity);
    for activity in graph.generated_by(&entity) {
        let times = graph.activity_times(activity.id());
        let label = graph.get(activity.id()).and_then(|n| n.label.as_deref()).unwrap_or("-");
        match (times.started, times.ended) {
            (Some(started), Some(ended)) => {
                println!("  generated by {} ({}) {} .. {}", activity, label, started, ended)
            }
            _ => println!("  generated by {} ({})", activity, label),
        }
    }
    for source in graph.derivation_chain(&entity) {
        println!("  derived from {}", source);
    }
    0
}

fn cmd_sessions(engine: &ProvenanceEngine) -> i32 {
    let mut ids = engine.list_sessions();
    if ids.is_empty() {
        println!("No sessions recorded.");
        return 0;
    }
    ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    println!("{:<36}  {:>6}  {:>10}", "SESSION", "NODES", "RELATIONS");
    println!("{}", "-".repeat(56));
    for id in ids {
        if let Some(graph) = engine.get_graph(&id) {
            println!("{:<36}  {:>6}  {:>10}", id, graph.node_count(), graph.relation_count());
        }
    }
    0
}

/// Read the password without echoing it into logs
fn read_password() -> std::io::Result<Vec<u8>> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password.into_bytes());
    }
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.into_bytes())
}

fn cmd_test_connection(config: &WorkbenchConfig, host: &str, username: &str, timeout_ms: Option<u64>) -> i32 {
    if !is_valid_username(username) {
        eprintln!("Error: '{}' is not a valid user name", username);
        return 1;
    }
    let mut password = match read_password() {
        Ok(password) => password,
        Err(e) => {
            eprintln!("Error: cannot read password: {}", e);
            return 1;
        }
    };
    let len = password
        .iter()
        .rposition(|b| *b != b'\n' && *b != b'\r')
        .map_or(0, |i| i + 1);

    let timeout = timeout_ms
        .map(std::time::Duration::from_millis)
        .unwrap_or_else(|| config.connect_timeout());
    let reachable = ConnectionTester::new()
        .with_default_port(config.ssh_port)
        .test(timeout, host, username, &password[..len]);
    password.fill(0);

    if reachable {
        println!("{}@{}: connection OK", username, host);
        0
    } else {
        println!("{}@{}: connection failed", username, host);
        1
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();
    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let session = SessionId::from(cli.session);
    let code = match cli.command {
        Commands::TestConnection {
            host,
            username,
            timeout_ms,
        } => cmd_test_connection(&config, &host, &username, timeout_ms),
        Commands::Record { operation } => with_engine(&config, cli.db, |engine| cmd_record(engine, &session, operation)),
        Commands::Export { format, output } => {
            with_engine(&config, cli.db, |engine| cmd_export(engine, &session, format, output))
        }
        Commands::Import { file } => with_engine(&config, cli.db, |engine| cmd_import(engine, &config, &session, &file)),
        Commands::Show => with_engine(&config, cli.db, |engine| cmd_show(engine, &session)),
        Commands::Lineage { entity } => with_engine(&config, cli.db, |engine| cmd_lineage(engine, &session, &entity)),
        Commands::Sessions => with_engine(&config, cli.db, cmd_sessions),
    };
    std::process::exit(code);
}
