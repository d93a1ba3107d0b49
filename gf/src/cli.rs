//! CLI argument definitions

use clap::Parser;
use std::io::Read;
use std::path::PathBuf;
use tracing::debug;

use crate::config::Config;
use crate::exec::Mode;

/// gofigure - ask for a shell plan, confirm each step
#[derive(Debug, Parser)]
#[command(
    name = "gf",
    about = "Turn a plain-language request into shell steps and run them one confirmation at a time",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)")]
    pub log_level: Option<String>,

    /// What to do with approved commands in single-shot mode
    #[arg(short, long, default_value = "execute", help = "execute | write-to-file")]
    pub mode: Mode,

    /// File approved commands are appended to in write-to-file mode
    #[arg(short, long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// History ledger file
    #[arg(long, value_name = "PATH")]
    pub history: Option<PathBuf>,

    /// Query for single-shot mode; omit to start the interactive session
    #[arg(trailing_var_arg = true, value_name = "QUERY")]
    pub query: Vec<String>,
}

impl Cli {
    /// The single-shot query, if one was supplied
    ///
    /// Words on the command line win. Without them, a piped stdin is read in
    /// full; an interactive terminal means no query.
    pub fn resolve_query(&self, stdin_is_terminal: bool, stdin: impl Read) -> std::io::Result<Option<String>> {
        debug!(words = self.query.len(), stdin_is_terminal, "Cli::resolve_query: called");
        resolve_query(&self.query, stdin_is_terminal, stdin)
    }
}

fn resolve_query(words: &[String], stdin_is_terminal: bool, mut stdin: impl Read) -> std::io::Result<Option<String>> {
    let joined = words.join(" ");
    if !joined.trim().is_empty() {
        return Ok(Some(joined.trim().to_string()));
    }
    if stdin_is_terminal {
        return Ok(None);
    }

    let mut buf = String::new();
    stdin.read_to_string(&mut buf)?;
    let trimmed = buf.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

/// Config as `--help` should describe it, resolved before clap parses
///
/// Honors `-c/--config` and `--history` in `args`. A config that fails to
/// load falls back to defaults; the real load reports the error.
pub fn help_config(args: &[String]) -> Config {
    let config_path = peek_path_flag(args, Some('c'), "config");
    let mut config = Config::load(config_path.as_ref()).unwrap_or_default();
    if let Some(path) = peek_path_flag(args, None, "history") {
        config.history.path = path;
    }
    config
}

/// Value of a path option in raw `args` (program name first)
fn peek_path_flag(args: &[String], short: Option<char>, long: &str) -> Option<PathBuf> {
    let long_flag = format!("--{}", long);
    let long_eq = format!("--{}=", long);
    let short_flag = short.map(|c| format!("-{}", c));

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }
        if let Some(value) = arg.strip_prefix(long_eq.as_str()) {
            return Some(PathBuf::from(value));
        }
        if *arg == long_flag || short_flag.as_deref() == Some(arg.as_str()) {
            return iter.next().map(PathBuf::from);
        }
        // -cPATH and -c=PATH
        if let Some(flag) = short_flag.as_deref()
            && !arg.starts_with("--")
            && let Some(value) = arg.strip_prefix(flag)
        {
            let value = value.strip_prefix('=').unwrap_or(value);
            if !value.is_empty() {
                return Some(PathBuf::from(value));
            }
        }
    }
    None
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gofigure")
        .join("logs")
        .join("gofigure.log")
}

/// Generate the after_help text with credential status and file locations
pub fn generate_after_help(api_key_env: &str, history_path: &std::path::Path) -> String {
    debug!(%api_key_env, "generate_after_help: called");
    let key_set = std::env::var(api_key_env).is_ok_and(|v| !v.trim().is_empty());
    let icon = if key_set { "\u{2705}" } else { "\u{274C}" };

    let mut help = String::new();
    help.push_str("Credentials:\n");
    help.push_str(&format!("  {} {}\n", icon, api_key_env));
    help.push('\n');
    help.push_str("Files:\n");
    help.push_str(&format!("  history  {}\n", history_path.display()));
    help.push_str(&format!("  logs     {}\n", get_log_path().display()));
    help
}
