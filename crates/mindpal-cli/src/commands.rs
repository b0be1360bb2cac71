//! Subcommand handlers. Each maps onto one `SessionStore` operation.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use mindpal_core::{KeyValueStore, LoginResponse, Navigator, SessionStore};
use serde_json::{Map, Value};
use tracing::info;

use crate::config::Config;

/// Exit code for "no" answers (logged out, no token, fresh session).
const EXIT_NO: u8 = 1;

fn yes_no(answer: bool) -> ExitCode {
    if answer {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_NO)
    }
}

pub fn status<D, T, N>(session: &SessionStore<D, T, N>) -> ExitCode
where
    D: KeyValueStore,
    T: KeyValueStore,
    N: Navigator,
{
    let logged_in = session.is_logged_in();
    println!("logged in: {}", if logged_in { "yes" } else { "no" });

    if let Some(user) = session.current_user() {
        println!("phone:     {}", user.phone().as_deref().unwrap_or("-"));
        println!("login:     {}", user.login_time_raw().unwrap_or("-"));
        println!("age:       {}", user.age_display());
    }
    println!(
        "token:     {}",
        session.auth_token().as_deref().unwrap_or("-")
    );
    println!(
        "expired:   {}",
        if session.is_session_expired() { "yes" } else { "no" }
    );

    yes_no(logged_in)
}

pub struct LoginArgs<'a> {
    pub phone: Option<&'a str>,
    pub fields: &'a [String],
    pub token: Option<&'a str>,
    pub response: Option<&'a Path>,
}

pub fn login<D, T, N>(session: &SessionStore<D, T, N>, args: LoginArgs<'_>) -> Result<ExitCode>
where
    D: KeyValueStore,
    T: KeyValueStore,
    N: Navigator,
{
    if let Some(path) = args.response {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read login response: {}", path.display()))?;
        let response = LoginResponse::from_json(&raw)?;
        session.commit_login_response(response)?;
    } else {
        let user = build_user(args.phone, args.fields)?;
        session.commit_login(user, args.token)?;
    }

    info!("Logged in");
    if let Some(url) = session.consume_return_url() {
        session.navigator().navigate_to(&url);
    }
    Ok(ExitCode::SUCCESS)
}

pub fn logout<D, T, N>(session: &SessionStore<D, T, N>) -> Result<ExitCode>
where
    D: KeyValueStore,
    T: KeyValueStore,
    N: Navigator,
{
    session.clear_session()?;
    Ok(ExitCode::SUCCESS)
}

pub fn token<D, T, N>(session: &SessionStore<D, T, N>) -> ExitCode
where
    D: KeyValueStore,
    T: KeyValueStore,
    N: Navigator,
{
    print_optional(session.auth_token())
}

pub fn user<D, T, N>(session: &SessionStore<D, T, N>) -> Result<ExitCode>
where
    D: KeyValueStore,
    T: KeyValueStore,
    N: Navigator,
{
    match session.current_user() {
        Some(user) => {
            println!("{}", serde_json::to_string_pretty(&user)?);
            Ok(ExitCode::SUCCESS)
        }
        None => Ok(ExitCode::from(EXIT_NO)),
    }
}

pub fn require<D, T, N>(session: &SessionStore<D, T, N>, return_url: Option<&str>) -> ExitCode
where
    D: KeyValueStore,
    T: KeyValueStore,
    N: Navigator,
{
    yes_no(session.require_login(return_url))
}

pub fn return_url<D, T, N>(session: &SessionStore<D, T, N>) -> ExitCode
where
    D: KeyValueStore,
    T: KeyValueStore,
    N: Navigator,
{
    print_optional(session.consume_return_url())
}

/// Succeeds when the session is expired, so `if mindpal expired; then ...`
/// reads naturally.
pub fn expired<D, T, N>(session: &SessionStore<D, T, N>, max_age_hours: f64) -> ExitCode
where
    D: KeyValueStore,
    T: KeyValueStore,
    N: Navigator,
{
    let expired = session.is_session_expired_with(max_age_hours);
    println!("{}", if expired { "expired" } else { "valid" });
    yes_no(expired)
}

pub fn show_config(config: &Config, write: bool) -> Result<ExitCode> {
    if write {
        let path = config.save()?;
        eprintln!("Wrote {}", path.display());
    }
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(ExitCode::SUCCESS)
}

fn print_optional(value: Option<String>) -> ExitCode {
    match value {
        Some(value) => {
            println!("{}", value);
            ExitCode::SUCCESS
        }
        None => ExitCode::from(EXIT_NO),
    }
}

/// Build backend-style user data from `--phone` and `--field key=value`.
///
/// Field values that parse as JSON (numbers, booleans, objects) keep their
/// type; anything else is stored as a string.
fn build_user(phone: Option<&str>, fields: &[String]) -> Result<Map<String, Value>> {
    let mut user = Map::new();
    for field in fields {
        let (key, value) = parse_field(field)?;
        user.insert(key, value);
    }
    if let Some(phone) = phone {
        user.insert("phone".to_string(), Value::String(phone.to_string()));
    }
    Ok(user)
}

fn parse_field(field: &str) -> Result<(String, Value)> {
    let (key, raw) = field
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Field must be key=value, got '{}'", field))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("Field name is empty in '{}'", field);
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}
