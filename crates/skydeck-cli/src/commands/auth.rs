//! Authentication commands.

use super::{build_session, prompt};
use crate::output::{self, OutputFormat};
use crate::validate;
use anyhow::Result;
use skydeck_core::{Config, Paths};

/// Sign in with email and password.
pub async fn login(config: &Config, paths: &Paths, format: &OutputFormat) -> Result<()> {
    let session = build_session(config, paths)?;

    // A stored session that still resumes means we're already signed in
    if matches!(session.resume().await, Ok(true)) {
        let who = session
            .current_user()
            .map(|user| user.email)
            .unwrap_or_else(|| "unknown".to_string());
        output::print_success(&format!("Already signed in as {}", who), format);
        return Ok(());
    }

    let email = prompt("Email")?;
    if email.is_empty() {
        output::print_error("Email is required", format);
        return Ok(());
    }

    let password = rpassword::prompt_password("Password: ")?;
    if password.is_empty() {
        output::print_error("Password is required", format);
        return Ok(());
    }

    println!("Signing in...");

    match session.sign_in(&email, &password).await {
        Ok(user) => {
            output::print_success(&format!("Signed in as {}", user.email), format);
        }
        Err(error) => {
            output::print_error(&format!("Sign in failed: {}", error), format);
        }
    }

    Ok(())
}

/// Create an account and sign in.
pub async fn signup(config: &Config, paths: &Paths, format: &OutputFormat) -> Result<()> {
    let session = build_session(config, paths)?;

    let name = prompt("Name")?;
    let email = prompt("Email")?;
    let password = rpassword::prompt_password("Password: ")?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;

    let issues = validate::signup_issues(&name, &email, &password, &confirm);
    if !issues.is_empty() {
        for issue in &issues {
            output::print_error(issue, format);
        }
        return Ok(());
    }

    println!("Creating account...");

    match session.sign_up(&name, &email, &password).await {
        Ok(user) => {
            output::print_success(&format!("Account created, signed in as {}", user.email), format);
        }
        Err(error) => {
            output::print_error(&format!("Signup failed: {}", error), format);
        }
    }

    Ok(())
}

/// Sign out and clear stored credentials.
pub async fn logout(config: &Config, paths: &Paths, format: &OutputFormat) -> Result<()> {
    let session = build_session(config, paths)?;

    if !session.has_valid_tokens()? {
        output::print_success("Not signed in", format);
        return Ok(());
    }

    session.sign_out().await?;
    output::print_success("Signed out", format);

    Ok(())
}

/// Show session status.
pub async fn status(config: &Config, paths: &Paths, format: &OutputFormat) -> Result<()> {
    let session = build_session(config, paths)?;

    let resumed = session.resume().await.unwrap_or(false);
    let snapshot = session.snapshot()?;

    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "authenticated": resumed && snapshot.authenticated,
                "state": snapshot.state,
                "user_id": snapshot.user_id,
                "email": snapshot.email,
                "expires_at": snapshot.expires_at.map(|at| at.to_rfc3339()),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            if resumed && snapshot.authenticated {
                println!("Signed in");
                if let Some(email) = &snapshot.email {
                    output::print_row("Email", email);
                }
                if let Some(user_id) = snapshot.user_id {
                    output::print_row("User ID", &user_id.to_string());
                }
                if let Some(expires_at) = snapshot.expires_at {
                    output::print_row("Token expires", &expires_at.to_rfc3339());
                }
            } else {
                println!("Not signed in");
            }
        }
    }

    Ok(())
}

/// Show the signed-in user profile.
pub async fn whoami(config: &Config, paths: &Paths, format: &OutputFormat) -> Result<()> {
    let session = build_session(config, paths)?;

    if !matches!(session.resume().await, Ok(true)) {
        output::print_error("Not signed in", format);
        return Ok(());
    }

    let Some(user) = session.current_user() else {
        output::print_error("Not signed in", format);
        return Ok(());
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        OutputFormat::Text => {
            output::print_row("Name", &user.name);
            output::print_row("Email", &user.email);
            output::print_row("User ID", &user.id.to_string());
        }
    }

    Ok(())
}
