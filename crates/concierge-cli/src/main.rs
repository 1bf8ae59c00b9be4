use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use concierge_core::agents::display_name;
use concierge_core::{AssistantEvent, TurnSink, spawn_turn_journal};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod bootstrap;
mod config;

use bootstrap::Runtime;
use config::{ConciergeConfig, shellexpand};

#[derive(Parser)]
#[command(name = "concierge")]
#[command(version)]
#[command(about = "Concierge: a personal assistant that routes requests to specialist agents")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive conversation (default)
    Chat,

    /// Send a one-shot message to the assistant
    Ask {
        /// The message to send
        message: String,
    },

    /// List agent toggles and whether each has a live specialist
    Agents,

    /// Initialize config directory, router prompt and agent profiles
    Init,

    /// Show current configuration
    Config,
}

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");
const ROUTER_PROMPT: &str = include_str!("../../../config/router.yaml");
const AGENT_PROFILES: &[(&str, &str)] = &[
    ("generalist_agent.yaml", include_str!("../../../config/agents/generalist_agent.yaml")),
    ("search_agent.yaml", include_str!("../../../config/agents/search_agent.yaml")),
    ("note_agent.yaml", include_str!("../../../config/agents/note_agent.yaml")),
    ("todo_agent.yaml", include_str!("../../../config/agents/todo_agent.yaml")),
    ("file_agent.yaml", include_str!("../../../config/agents/file_agent.yaml")),
    ("system_agent.yaml", include_str!("../../../config/agents/system_agent.yaml")),
    ("writing_agent.yaml", include_str!("../../../config/agents/writing_agent.yaml")),
    ("webscraping_agent.yaml", include_str!("../../../config/agents/webscraping_agent.yaml")),
];

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so answers on stdout stay clean
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => cmd_chat(&cli.config).await,
        Commands::Ask { message } => cmd_ask(&cli.config, &message).await,
        Commands::Agents => cmd_agents(&cli.config).await,
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config).await,
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    let agents_dir = config_dir.join("agents");
    tokio::fs::create_dir_all(&agents_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", agents_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        tokio::fs::write(&config_path, DEFAULT_CONFIG).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600)).await?;
        }
        info!("Created default config at {}", config_path.display());
    }

    write_if_missing(&config_dir.join("router.yaml"), ROUTER_PROMPT).await?;
    for (file, content) in AGENT_PROFILES {
        write_if_missing(&agents_dir.join(file), content).await?;
    }

    println!("Concierge initialized at {}", config_dir.display());
    println!("Edit {} to choose a provider and agents.", config_path.display());
    Ok(())
}

async fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Created {}", path.display());
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = ConciergeConfig::load(config_path)?;
    println!("{:#?}", cfg);
    Ok(())
}

async fn cmd_agents(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = ConciergeConfig::load(config_path)?;
    bootstrap::check_layout(&cfg)?;
    let runtime = Runtime::build(&cfg)?;

    for (toggle, enabled) in &cfg.agents {
        let name = display_name(toggle);
        let state = match (*enabled, runtime.specialists.contains(&name)) {
            (false, _) => "disabled",
            (true, true) => "ready",
            (true, false) => "enabled, no profile",
        };
        println!("{:<20} {}", name, state);
    }
    Ok(())
}

async fn cmd_ask(config_path: &Option<PathBuf>, message: &str) -> Result<()> {
    let cfg = ConciergeConfig::load(config_path)?;
    bootstrap::check_layout(&cfg)?;
    let journal = Journal::start(&cfg);
    let runtime = with_journal(Runtime::build(&cfg)?, &journal);
    let mut assistant = runtime.assistant();

    let (tx, rx) = mpsc::channel(16);
    let printer = tokio::spawn(render_events(rx));
    assistant.process(message, &tx).await;
    drop(tx);
    printer.await?;

    drop(assistant);
    drop(runtime);
    if let Some(journal) = journal {
        journal.finish().await;
    }
    Ok(())
}

async fn cmd_chat(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = ConciergeConfig::load(config_path)?;
    bootstrap::check_layout(&cfg)?;
    let journal = Journal::start(&cfg);
    let runtime = with_journal(Runtime::build(&cfg)?, &journal);
    let mut assistant = runtime.assistant();

    println!("Concierge is ready. Type 'exit' or 'quit' to leave.\n");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        eprint!("You: ");
        let line = tokio::select! {
            _ = signal::ctrl_c() => break,
            line = lines.next_line() => line.context("Failed to read from stdin")?,
        };
        let Some(line) = line else { break };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query.to_lowercase().as_str(), "exit" | "quit") {
            break;
        }

        let (tx, rx) = mpsc::channel(16);
        let printer = tokio::spawn(render_events(rx));
        let interrupted = tokio::select! {
            _ = signal::ctrl_c() => true,
            _ = assistant.process(query, &tx) => false,
        };
        drop(tx);
        printer.await?;
        if interrupted {
            warn!("Interrupted while answering; the last question has no reply in history");
            break;
        }
    }

    println!("Goodbye!");
    drop(assistant);
    drop(runtime);
    if let Some(journal) = journal {
        journal.finish().await;
    }
    Ok(())
}

/// Status to stderr, the final answer to stdout
async fn render_events(mut rx: mpsc::Receiver<AssistantEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            AssistantEvent::Status(text) => eprintln!("  {}", text),
            AssistantEvent::FinalAnswer(text) => println!("\n{}\n", text),
        }
    }
}

/// Background writer for completed turns
struct Journal {
    sink: TurnSink,
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl Journal {
    fn start(cfg: &ConciergeConfig) -> Option<Self> {
        if !cfg.journal.enabled {
            return None;
        }
        let (sink, rx) = TurnSink::channel(64);
        let cancel = CancellationToken::new();
        let handle = spawn_turn_journal(shellexpand(&cfg.journal.path), rx, cancel.clone());
        Some(Self { sink, handle, cancel })
    }

    /// Let queued turns drain, then stop the writer
    async fn finish(self) {
        drop(self.sink);
        let mut handle = self.handle;
        if tokio::time::timeout(Duration::from_secs(2), &mut handle).await.is_err() {
            self.cancel.cancel();
            let _ = handle.await;
        }
    }
}

fn with_journal(runtime: Runtime, journal: &Option<Journal>) -> Runtime {
    match journal {
        Some(j) => runtime.with_turn_sink(j.sink.clone()),
        None => runtime,
    }
}
