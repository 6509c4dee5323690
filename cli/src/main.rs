//! tsbridge CLI - runs one bridge command against a file and prints what an
//! editor would show.
//!
//! # Architecture
//!
//! The editor is played by [`MemoryHost`]: the file becomes the current
//! buffer, the cursor goes to `--line`/`--offset`, and the lists and
//! messages the bridge produces are printed.
//!
//! ```text
//! main() -> Session::open() -> Bridge::start() -> command -> Session::finish()
//!                                   |                             |
//!                                   v                             v
//!                          tsserver over stdio           messages to stderr
//! ```
//!
//! Results go to stdout, status messages to stderr. Logs go to
//! `~/.tsbridge/logs/tsbridge.log` and never to the terminal.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use tsbridge_client::query_version;
use tsbridge_config::{BridgeConfig, log_dir, persist_server_path_to};
use tsbridge_editor::{EchoLevel, ListKind, MemoryHost, current_line};
use tsbridge_engine::{Bridge, completion_prefix};

/// Wide enough that hover text is never shortened.
const CLI_MESSAGE_WIDTH: usize = 4096;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // Stdout carries results; no log file means no logs.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.tsbridge/logs/tsbridge.log
    if let Some(dir) = log_dir() {
        candidates.push(dir.join("tsbridge.log"));
    }

    // Fallback: ./.tsbridge/logs/tsbridge.log
    candidates.push(PathBuf::from(".tsbridge").join("logs").join("tsbridge.log"));

    candidates
}

#[derive(Parser)]
#[command(name = "tsbridge")]
#[command(about = "Query a TypeScript analysis server from the command line")]
struct Cli {
    /// Config file to use instead of ~/.tsbridge/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Server executable, overriding the config
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// A file and a 1-based position in it.
#[derive(Args)]
struct Position {
    file: PathBuf,

    #[arg(long, default_value_t = 1)]
    line: u32,

    #[arg(long, default_value_t = 1)]
    offset: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the file's diagnostics
    Diagnostics { file: PathBuf },
    /// Print the type of the symbol at a position
    Quickinfo(Position),
    /// Print where the symbol at a position is defined
    Definition(Position),
    /// Print every reference to the symbol at a position
    References(Position),
    /// Print the file's symbols
    Symbols { file: PathBuf },
    /// Search symbols across the file's project
    WorkspaceSymbols { file: PathBuf, query: String },
    /// Print completions at a position
    Complete(Position),
    /// Print the server's version
    Version,
    /// Edit the config file
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Save the server executable path
    SetServerPath { path: String },
}

/// What to run once a session is open on a file.
enum FileCommand {
    Diagnostics,
    Quickinfo,
    Definition,
    References,
    Symbols,
    WorkspaceSymbols(String),
    Complete,
}

/// One bridge over one file.
struct Session {
    bridge: Bridge<MemoryHost>,
    /// Messages already printed.
    seen: usize,
}

impl Session {
    async fn open(mut config: BridgeConfig, file: &Path, line: u32, offset: u32) -> Result<Self> {
        let path = fs::canonicalize(file)
            .with_context(|| format!("Failed to resolve {}", file.display()))?;
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let host = Arc::new(MemoryHost::new());
        host.open_buffer(path.to_string_lossy(), &text);
        host.move_cursor(line, offset);
        host.set_message_width(CLI_MESSAGE_WIDTH);

        // Commands ask for diagnostics themselves.
        config.diagnostics.enable = false;
        let mut session = Self {
            bridge: Bridge::new(host, config),
            seen: 0,
        };
        if let Err(e) = session.bridge.start().await {
            session.print_messages(&mut io::stderr())?;
            return Err(e).context("Failed to start analysis server");
        }
        session.seen = session.bridge.host().messages().len();
        Ok(session)
    }

    async fn execute(&mut self, command: FileCommand) -> Result<()> {
        match command {
            FileCommand::Diagnostics => {
                self.bridge.diagnostics().await?;
                self.print_list(ListKind::Location);
            }
            FileCommand::Quickinfo => {
                if let Some(info) = self.bridge.show_type().await? {
                    println!("{}", info.display_string);
                    if !info.documentation.is_empty() {
                        println!("\n{}", info.documentation);
                    }
                }
            }
            FileCommand::Definition => {
                if let Some(target) = self.bridge.goto_definition().await? {
                    println!(
                        "{}:{}:{}",
                        target.file, target.start.line, target.start.offset
                    );
                }
            }
            FileCommand::References => {
                if self.bridge.references().await? > 0 {
                    self.print_list(ListKind::Quickfix);
                }
            }
            FileCommand::Symbols => {
                if self.bridge.document_symbols().await? > 0 {
                    self.print_list(ListKind::Location);
                }
            }
            FileCommand::WorkspaceSymbols(query) => {
                if self.bridge.workspace_symbols(&query).await? > 0 {
                    self.print_list(ListKind::Location);
                }
            }
            FileCommand::Complete => {
                let (line, cursor) = current_line(self.bridge.host()).await?;
                let prefix = completion_prefix(&line, cursor.offset);
                for item in self.bridge.complete(&prefix).await? {
                    let menu = item.menu.unwrap_or_default();
                    println!("{}\t{}\t{menu}", item.word, item.kind);
                }
            }
        }
        Ok(())
    }

    fn print_list(&self, kind: ListKind) {
        let Some(list) = self.bridge.host().list(kind) else {
            return;
        };
        for entry in list.entries {
            match entry.kind {
                Some(kind) => println!(
                    "{}:{}:{}: {kind} {}",
                    entry.filename, entry.lnum, entry.col, entry.text
                ),
                None => println!(
                    "{}:{}:{}: {}",
                    entry.filename, entry.lnum, entry.col, entry.text
                ),
            }
        }
    }

    /// Write the status messages not printed yet.
    fn print_messages(&mut self, out: &mut impl Write) -> io::Result<()> {
        let messages = self.bridge.host().messages();
        for (level, message) in messages.iter().skip(self.seen) {
            let label = match level {
                EchoLevel::Info => "info",
                EchoLevel::Warning => "warning",
                EchoLevel::Error => "error",
            };
            writeln!(out, "{label}: {message}")?;
        }
        self.seen = messages.len();
        Ok(())
    }

    /// Print what the bridge reported, stop the server and hand back
    /// `outcome`. Runs whether or not the command succeeded.
    async fn finish(mut self, outcome: Result<()>, out: &mut impl Write) -> Result<()> {
        self.bridge.poll_events(usize::MAX).await;
        self.print_messages(out)?;
        let stopped = self.bridge.stop().await;
        outcome?;
        stopped.context("Failed to stop analysis server")
    }
}

fn load_config(path: Option<&Path>, server: Option<String>) -> Result<BridgeConfig> {
    let mut config = match path {
        Some(path) => BridgeConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => BridgeConfig::load()
            .context("Failed to load config")?
            .unwrap_or_default(),
    };
    if let Some(server) = server {
        config.server.path = server;
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let Cli {
        config: config_path,
        server,
        command,
    } = cli;
    // Loaded per command so a broken config file can still be repaired.
    let load = || load_config(config_path.as_deref(), server.clone());

    let start_of_file = |file: PathBuf| Position {
        file,
        line: 1,
        offset: 1,
    };
    let (at, command) = match command {
        Commands::Diagnostics { file } => (start_of_file(file), FileCommand::Diagnostics),
        Commands::Quickinfo(at) => (at, FileCommand::Quickinfo),
        Commands::Definition(at) => (at, FileCommand::Definition),
        Commands::References(at) => (at, FileCommand::References),
        Commands::Symbols { file } => (start_of_file(file), FileCommand::Symbols),
        Commands::WorkspaceSymbols { file, query } => {
            (start_of_file(file), FileCommand::WorkspaceSymbols(query))
        }
        Commands::Complete(at) => (at, FileCommand::Complete),
        Commands::Version => {
            let server = load()?.server.resolved_path();
            let version = query_version(&server)
                .await
                .with_context(|| format!("Failed to query the version of {server}"))?;
            println!("{version}");
            return Ok(());
        }
        Commands::Config {
            command: ConfigCommand::SetServerPath { path },
        } => {
            let written = match config_path.as_deref() {
                Some(file) => {
                    persist_server_path_to(file, &path)?;
                    file.to_path_buf()
                }
                None => BridgeConfig::persist_server_path(&path)?,
            };
            println!("Server path saved to {}", written.display());
            return Ok(());
        }
    };

    let mut session = Session::open(load()?, &at.file, at.line, at.offset).await?;
    let outcome = session.execute(command).await;
    session.finish(outcome, &mut io::stderr()).await
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    run(Cli::parse()).await
}
