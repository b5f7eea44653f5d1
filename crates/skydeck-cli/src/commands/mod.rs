//! CLI command implementations.

pub mod auth;
pub mod password;

use anyhow::Result;
use skydeck_auth::{ApiClient, RefreshSchedule, RetryPolicy, Session};
use skydeck_core::{Config, Paths};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

/// Build a session from config and on-disk credentials.
pub(crate) fn build_session(config: &Config, paths: &Paths) -> Result<Arc<Session>> {
    paths.ensure_dirs()?;

    let vault = skydeck_vault::open_vault(paths.credentials_file())?;

    let api = ApiClient::builder()
        .base_url(&config.api_url)
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()?;

    let schedule = RefreshSchedule {
        lead: Duration::from_secs(config.refresh_lead_secs),
        fallback_interval: Duration::from_secs(config.refresh_interval_secs),
        ..RefreshSchedule::default()
    };

    Ok(Session::with_options(
        vault,
        api,
        RetryPolicy::default(),
        schedule,
    ))
}

/// Prompt for a line of input on stdout.
pub(crate) fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut value = String::new();
    io::stdin().read_line(&mut value)?;
    Ok(value.trim().to_string())
}
