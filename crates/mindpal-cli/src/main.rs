//! MindPal session tool - inspect and drive the local login session.
//!
//! Durable session data lives in the user's data directory; the pending
//! return destination lives in the runtime directory and disappears with
//! the login session.

mod commands;
mod config;
mod navigator;

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mindpal_core::{FileStore, SessionStore, DEFAULT_MAX_AGE_HOURS};
use tracing::{debug, error};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::LoginArgs;
use config::Config;
use navigator::TerminalNavigator;

/// Default log file name when `log_file` names a directory
const LOG_FILE_NAME: &str = "mindpal.log";

#[derive(Parser)]
#[command(name = "mindpal")]
#[command(about = "Inspect and manage the local MindPal login session")]
#[command(version)]
struct Cli {
    /// Directory holding the durable session store
    #[arg(long, global = true, env = "MINDPAL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Directory holding the transient (per-login-session) store
    #[arg(long, global = true, env = "MINDPAL_TRANSIENT_DIR")]
    transient_dir: Option<PathBuf>,

    /// Never wait for Enter after a notice
    #[arg(long, global = true)]
    no_wait: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show login state, credential and session age
    Status,

    /// Record a successful login
    Login {
        /// Phone number identifying the user
        #[arg(long)]
        phone: Option<String>,

        /// Extra user field as key=value (repeatable)
        #[arg(long = "field", value_name = "KEY=VALUE")]
        fields: Vec<String>,

        /// Token issued by the backend
        #[arg(long)]
        token: Option<String>,

        /// Backend login response JSON file
        #[arg(long, conflicts_with_all = ["phone", "fields", "token"])]
        response: Option<PathBuf>,
    },

    /// Clear all session data
    Logout,

    /// Print the credential to present to the backend
    Token,

    /// Print the stored user record
    User,

    /// Succeed if logged in; otherwise remember RETURN_URL and redirect
    Require {
        return_url: Option<String>,
    },

    /// Print and forget the pending return destination
    ReturnUrl,

    /// Succeed if the session is older than the allowed age
    Expired {
        #[arg(long, default_value_t = DEFAULT_MAX_AGE_HOURS, value_parser = parse_max_age_hours)]
        max_age_hours: f64,
    },

    /// Print the effective configuration
    Config {
        /// Also write it to the config file
        #[arg(long)]
        write: bool,
    },
}

/// Session age thresholds must be finite and non-negative.
fn parse_max_age_hours(raw: &str) -> Result<f64, String> {
    let hours: f64 = raw
        .parse()
        .map_err(|_| format!("'{}' is not a number of hours", raw))?;
    if !hours.is_finite() || hours < 0.0 {
        return Err(format!("'{}' must be a finite, non-negative number of hours", raw));
    }
    Ok(hours)
}

/// Initialize the tracing subscriber for logging
fn init_tracing(verbose: u8, log_file: Option<&Path>) -> Option<WorkerGuard> {
    // RUST_LOG wins over -v
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let (dir, name) = if path.is_dir() {
                (path, Path::new(LOG_FILE_NAME))
            } else {
                (
                    path.parent().unwrap_or_else(|| Path::new(".")),
                    path.file_name().map(Path::new).unwrap_or(Path::new(LOG_FILE_NAME)),
                )
            };
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(ref dir) = cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    if let Some(ref dir) = cli.transient_dir {
        config.transient_dir = Some(dir.clone());
    }

    let _guard = init_tracing(cli.verbose, config.log_file.as_deref());

    match run(cli, config) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, config: Config) -> Result<ExitCode> {
    let durable = FileStore::new(config.durable_path()?);
    let transient = FileStore::new(config.transient_path());
    debug!(
        durable = %durable.path().display(),
        transient = %transient.path().display(),
        "Opening session stores"
    );

    let interactive = !cli.no_wait && io::stdin().is_terminal();
    let session = SessionStore::new(durable, transient, TerminalNavigator::new(interactive))
        .with_config(config.session.clone());

    let code = match cli.command {
        Command::Status => commands::status(&session),
        Command::Login {
            ref phone,
            ref fields,
            ref token,
            ref response,
        } => commands::login(
            &session,
            LoginArgs {
                phone: phone.as_deref(),
                fields: fields.as_slice(),
                token: token.as_deref(),
                response: response.as_deref(),
            },
        )?,
        Command::Logout => commands::logout(&session)?,
        Command::Token => commands::token(&session),
        Command::User => commands::user(&session)?,
        Command::Require { ref return_url } => commands::require(&session, return_url.as_deref()),
        Command::ReturnUrl => commands::return_url(&session),
        Command::Expired { max_age_hours } => commands::expired(&session, max_age_hours),
        Command::Config { write } => commands::show_config(&config, write)?,
    };
    Ok(code)
}
