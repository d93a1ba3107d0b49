//! gofigure - plain-language shell planner
//!
//! CLI entry point: single-shot when a query is given, interactive TUI
//! otherwise.

use std::fs;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, FromArgMatches};
use eyre::{Context, Result};
use colored::Colorize;
use tracing::{debug, info, warn};

use gofigure::cli::{Cli, generate_after_help, help_config};
use gofigure::config::Config;
use gofigure::exec::{BashRunner, FileSink, Gateway, Mode};
use gofigure::history::HistoryLedger;
use gofigure::llm::create_client;
use gofigure::oneshot::{self, LinePrompter, Prompter, ReadlinePrompter};
use gofigure::planner::LlmPlanner;
use gofigure::session::Controller;
use gofigure::tui;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gofigure")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level).map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("gofigure.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args_os().map(|a| a.to_string_lossy().into_owned()).collect();
    let resolved = help_config(&args);
    let after_help = generate_after_help(&resolved.llm.api_key_env, &resolved.history.path);
    let cmd = Cli::command().after_help(after_help);
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(path) = cli.history.clone() {
        config.history.path = path;
    }
    if let Some(path) = cli.file.clone() {
        config.output.path = path;
    }
    info!(model = %config.llm.model, history = %config.history.path.display(), "gofigure loaded config");

    // Missing credential is the one failure that stops startup
    config.validate().context("Cannot start gofigure")?;

    let stdin = io::stdin();
    let query = cli
        .resolve_query(stdin.is_terminal(), stdin.lock())
        .context("Failed to read query from stdin")?;

    let controller = build_controller(&config)?;

    match query {
        Some(query) => {
            debug!(%query, "main: single-shot");
            // Without query words the query came through stdin, which is now spent
            let stdin_piped = cli.query.is_empty();
            cmd_oneshot(controller, &query, cli.mode, stdin_piped).await
        }
        None => {
            debug!("main: interactive");
            tui::run(controller).await
        }
    }
}

fn build_controller(config: &Config) -> Result<Controller> {
    let llm = create_client(&config.llm).context("Failed to create LLM client")?;
    let planner = Arc::new(LlmPlanner::new(llm, config.llm.max_tokens));
    let ledger = Arc::new(HistoryLedger::load_on_start(&config.history.path));
    let gateway = Gateway::new(Arc::new(BashRunner::from_config(&config.exec)));
    let sink = Box::new(FileSink::new(&config.output.path));
    Ok(Controller::new(ledger, planner, gateway, sink))
}

async fn cmd_oneshot(mut controller: Controller, query: &str, mode: Mode, stdin_piped: bool) -> Result<()> {
    let mut prompter: Box<dyn Prompter> = if stdin_piped {
        match LinePrompter::tty() {
            Ok(prompter) => Box::new(prompter),
            Err(e) => {
                warn!(error = %e, "No controlling terminal for step confirmation");
                eprintln!("{}", "No terminal to confirm steps on; showing the plan only.".yellow());
                Box::new(ReadlinePrompter::new()?)
            }
        }
    } else {
        Box::new(ReadlinePrompter::new()?)
    };
    let mut stdout = io::stdout();
    oneshot::run(&mut controller, query, mode, prompter.as_mut(), &mut stdout).await
}
