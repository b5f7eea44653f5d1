//! Password management commands.

use super::build_session;
use crate::output::{self, OutputFormat};
use crate::validate;
use anyhow::Result;
use skydeck_core::{Config, Paths};

/// Request a password-reset email.
pub async fn reset(
    config: &Config,
    paths: &Paths,
    email: &str,
    format: &OutputFormat,
) -> Result<()> {
    if let Some(issue) = validate::validate_email(email) {
        output::print_error(&issue, format);
        return Ok(());
    }

    let session = build_session(config, paths)?;

    match session.request_password_reset(email).await {
        Ok(()) => {
            output::print_success(&format!("Password reset email sent to {}", email), format);
        }
        Err(error) => {
            output::print_error(&format!("Password reset failed: {}", error), format);
        }
    }

    Ok(())
}

/// Confirm a password reset with the emailed token.
pub async fn confirm(
    config: &Config,
    paths: &Paths,
    token: &str,
    format: &OutputFormat,
) -> Result<()> {
    let password = rpassword::prompt_password("New password: ")?;
    let confirm = rpassword::prompt_password("Confirm new password: ")?;

    let mut issues = validate::password_issues(&password);
    if password != confirm {
        issues.push("Passwords do not match".to_string());
    }
    if !issues.is_empty() {
        for issue in &issues {
            output::print_error(issue, format);
        }
        return Ok(());
    }

    let session = build_session(config, paths)?;

    match session.confirm_password_reset(token, &password).await {
        Ok(()) => {
            output::print_success("Password updated, you can sign in now", format);
        }
        Err(error) => {
            output::print_error(&format!("Password reset failed: {}", error), format);
        }
    }

    Ok(())
}

/// Change the password of the signed-in user.
pub async fn change(config: &Config, paths: &Paths, format: &OutputFormat) -> Result<()> {
    let session = build_session(config, paths)?;

    if !matches!(session.resume().await, Ok(true)) {
        output::print_error("Not signed in", format);
        return Ok(());
    }

    let current = rpassword::prompt_password("Current password: ")?;
    let password = rpassword::prompt_password("New password: ")?;
    let confirm = rpassword::prompt_password("Confirm new password: ")?;

    let mut issues = validate::password_issues(&password);
    if password != confirm {
        issues.push("Passwords do not match".to_string());
    }
    if !issues.is_empty() {
        for issue in &issues {
            output::print_error(issue, format);
        }
        return Ok(());
    }

    match session.change_password(&current, &password).await {
        Ok(()) => {
            output::print_success("Password changed", format);
        }
        Err(error) => {
            output::print_error(&format!("Password change failed: {}", error), format);
        }
    }

    Ok(())
}
