use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lm_client::LearnMateClient;
use lm_core::{ChatMessage, ChatRequest, ChatTransport, SplitterConfig, StreamSplitter};

mod chat;
mod config;
mod exchange_log;
mod render;
mod setup;
mod split;

use config::Config;
use exchange_log::ExchangeLog;
use render::TerminalRenderer;

/// Log level for tracing output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Most verbose: every fragment and SSE event
    Trace,
    /// Verbose: per-fragment split results, requests
    Debug,
    /// Standard: exchange summaries
    Info,
    /// Quiet: only warnings and errors
    Warn,
    /// Minimal: only errors
    Error,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Parser)]
#[command(name = "lm")]
#[command(author, version, about = "LearnMate: stream answers and reasoning from the LearnMate backend", long_about = None)]
pub struct Cli {
    /// Backend URL (overrides config)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Bearer token (overrides config)
    #[arg(long, global = true, env = "LEARNMATE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Do not print the model's reasoning
    #[arg(long, global = true)]
    pub hide_thinking: bool,

    /// Disable dimmed reasoning output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Keep leading whitespace of reasoning and answer
    #[arg(long, global = true)]
    pub raw: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, value_enum, default_value = "warn")]
    pub log_level: LogLevel,

    /// Enable debug logging (shorthand for --log-level debug)
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Write logs to file (JSON-lines format)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Append a JSON-lines trace of every exchange to this file
    #[arg(long, global = true)]
    pub trace_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message into a conversation and stream the reply
    Ask {
        /// Conversation id
        conversation_id: String,
        /// Message text
        message: String,
    },
    /// Stateless chat with the assistant
    Chat {
        /// Message text
        message: String,
        /// System prompt
        #[arg(short, long)]
        system: Option<String>,
    },
    /// Split a saved transcript into reasoning and answer
    Split {
        /// Input file (stdin when omitted)
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Feed the input in chunks of this many characters
        #[arg(short, long)]
        chunk_size: Option<usize>,
        /// Print a JSON report instead of rendered text
        #[arg(long)]
        json: bool,
    },
    /// Check that the backend is reachable
    Health,
    /// Show current configuration
    Config,
    /// Initialize the configuration file in ~/.config/learnmate
    Setup,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Resolve log level: --debug overrides --log-level
    let log_level = if cli.debug {
        LogLevel::Debug
    } else {
        cli.log_level
    };

    let filter = EnvFilter::new(log_level.as_filter());

    if let Some(log_path) = &cli.log_file {
        // Log file specified: write JSON to file
        let file = std::fs::File::create(log_path)
            .with_context(|| format!("Failed to create log file: {:?}", log_path))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::sync::Mutex::new(file)))
            .init();
    } else {
        // Logs go to stderr so stdout carries only the answer
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    // Handle setup before config is required
    if matches!(&cli.command, Commands::Setup) {
        return setup::run();
    }

    let config = Config::load()?;

    match &cli.command {
        Commands::Ask {
            conversation_id,
            message,
        } => {
            let request = ChatRequest::conversation(conversation_id.as_str(), message.as_str());
            stream_mode(&cli, &config, request).await
        }
        Commands::Chat { message, system } => {
            let mut messages = Vec::new();
            if let Some(system) = system {
                messages.push(ChatMessage::system(system.as_str()));
            }
            messages.push(ChatMessage::user(message.as_str()));
            stream_mode(&cli, &config, ChatRequest::chat(messages)).await
        }
        Commands::Split {
            file,
            chunk_size,
            json,
        } => split_mode(&cli, &config, file.as_deref(), *chunk_size, *json),
        Commands::Health => health_mode(&cli, &config).await,
        Commands::Config => show_config(&cli, &config),
        Commands::Setup => unreachable!(),
    }
}

/// Output settings after applying CLI flags to the config.
struct DisplaySettings {
    show_thinking: bool,
    color: bool,
}

fn display_settings(cli: &Cli, config: &Config) -> DisplaySettings {
    DisplaySettings {
        show_thinking: config.display.show_thinking && !cli.hide_thinking,
        color: config.display.color && !cli.no_color && atty::is(atty::Stream::Stdout),
    }
}

fn splitter_config(cli: &Cli, config: &Config) -> SplitterConfig {
    let mut splitter = config.splitter.clone();
    if cli.raw {
        splitter.trim_leading_whitespace = false;
    }
    splitter
}

fn build_client(cli: &Cli, config: &Config) -> Result<LearnMateClient> {
    // Resolve base URL: CLI > config
    let base_url = cli.base_url.clone().unwrap_or_else(|| config.base_url.clone());
    let client = LearnMateClient::new(base_url)
        .with_timeout(Duration::from_secs(config.timeout_secs));

    // Resolve token: CLI/env > config
    let token = match &cli.token {
        Some(token) => Some(token.clone()),
        None => config.resolve_token()?,
    };

    Ok(match token {
        Some(token) => client.with_token(token),
        None => {
            tracing::debug!("No token configured, sending unauthenticated requests");
            client
        }
    })
}

async fn stream_mode(cli: &Cli, config: &Config, request: ChatRequest) -> Result<()> {
    let client = build_client(cli, config)?;
    let display = display_settings(cli, config);

    let exchange_log = match &cli.trace_file {
        Some(path) => Some(
            ExchangeLog::new(path)
                .with_context(|| format!("Failed to open trace file: {:?}", path))?,
        ),
        None => None,
    };

    let mut splitter = StreamSplitter::with_config(splitter_config(cli, config));
    let mut renderer = TerminalRenderer::new(std::io::stdout(), display.show_thinking, display.color);

    chat::run_streamed(
        &client,
        request,
        &mut splitter,
        &mut renderer,
        exchange_log.as_ref(),
    )
    .await?;

    Ok(())
}

fn split_mode(
    cli: &Cli,
    config: &Config,
    file: Option<&std::path::Path>,
    chunk_size: Option<usize>,
    json: bool,
) -> Result<()> {
    let input = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read stdin")?;
            input
        }
    };

    let report = split::split_text(&input, chunk_size, splitter_config(cli, config));
    tracing::debug!(
        chunks = report.chunks,
        deltas = report.deltas.len(),
        "Transcript split"
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let display = display_settings(cli, config);
    let mut renderer = TerminalRenderer::new(std::io::stdout(), display.show_thinking, display.color);
    for delta in &report.deltas {
        renderer.render(delta)?;
    }
    renderer.finish()?;
    Ok(())
}

async fn health_mode(cli: &Cli, config: &Config) -> Result<()> {
    let client = build_client(cli, config)?;
    if client.health().await {
        println!("{}: healthy", client.base_url());
        Ok(())
    } else {
        anyhow::bail!("{}: unreachable or unhealthy", client.base_url())
    }
}

fn show_config(cli: &Cli, config: &Config) -> Result<()> {
    let display = display_settings(cli, config);
    let splitter = splitter_config(cli, config);

    println!("Configuration:");
    println!("  File: {}", Config::config_path()?.display());
    println!(
        "  Base URL: {}",
        cli.base_url.as_deref().unwrap_or(&config.base_url)
    );
    println!("  Timeout: {}s", config.timeout_secs);
    if cli.token.is_some() || config.token.is_some() {
        println!("  Token: (configured)");
    } else if let Some(token_file) = &config.token_file {
        println!("  Token file: {}", config::expand_path(token_file).display());
    } else {
        println!("  Token: (none)");
    }

    println!("\nDisplay:");
    println!("  Show thinking: {}", display.show_thinking);
    println!("  Color: {}", display.color);

    println!("\nSplitter:");
    println!("  Trim leading whitespace: {}", splitter.trim_leading_whitespace);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_parse_ask() {
        let cli = parse(&["lm", "ask", "conv-1", "hello", "--hide-thinking"]);
        assert!(cli.hide_thinking);
        match cli.command {
            Commands::Ask {
                conversation_id,
                message,
            } => {
                assert_eq!(conversation_id, "conv-1");
                assert_eq!(message, "hello");
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_parse_split() {
        let cli = parse(&["lm", "--raw", "split", "--chunk-size", "4", "--json"]);
        assert!(cli.raw);
        assert!(matches!(
            cli.command,
            Commands::Split {
                file: None,
                chunk_size: Some(4),
                json: true
            }
        ));
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = parse(&["lm", "--raw", "--hide-thinking", "health"]);
        let config = Config::default();

        assert!(!splitter_config(&cli, &config).trim_leading_whitespace);
        assert!(!display_settings(&cli, &config).show_thinking);

        let defaults = parse(&["lm", "health"]);
        assert!(splitter_config(&defaults, &config).trim_leading_whitespace);
    }

    #[test]
    fn test_log_level_filter() {
        assert_eq!(LogLevel::Trace.as_filter(), "trace");
        assert_eq!(LogLevel::Warn.as_filter(), "warn");
    }
}
