//! Skydeck CLI - Command-line client for the Skydeck admin console.

mod commands;
mod output;
mod validate;

use anyhow::Result;
use clap::{Parser, Subcommand};
use skydeck_core::{init_logging, Config, Paths};

/// Skydeck CLI - Manage your Skydeck session from the terminal.
#[derive(Parser)]
#[command(name = "skydeck")]
#[command(about = "Skydeck CLI for authentication and session management")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login,

    /// Create an account and sign in
    Signup,

    /// Sign out and clear stored credentials
    Logout,

    /// Check session status
    Status,

    /// Show the signed-in user profile
    Whoami,

    /// Manage passwords
    Password {
        #[command(subcommand)]
        command: PasswordCommands,
    },
}

#[derive(Subcommand)]
enum PasswordCommands {
    /// Request a password-reset email
    Reset {
        /// Account email address
        email: String,
    },
    /// Confirm a password reset with the emailed token
    Confirm {
        /// Reset token from the email
        token: String,
    },
    /// Change the password of the signed-in user
    Change,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = Paths::new()?;
    let config = Config::load(&paths)?;

    let log_level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging(log_level);

    tracing::debug!(api_url = %config.api_url, "Skydeck CLI starting");

    match cli.command {
        Commands::Login => commands::auth::login(&config, &paths, &cli.format).await,
        Commands::Signup => commands::auth::signup(&config, &paths, &cli.format).await,
        Commands::Logout => commands::auth::logout(&config, &paths, &cli.format).await,
        Commands::Status => commands::auth::status(&config, &paths, &cli.format).await,
        Commands::Whoami => commands::auth::whoami(&config, &paths, &cli.format).await,
        Commands::Password { command } => match command {
            PasswordCommands::Reset { email } => {
                commands::password::reset(&config, &paths, &email, &cli.format).await
            }
            PasswordCommands::Confirm { token } => {
                commands::password::confirm(&config, &paths, &token, &cli.format).await
            }
            PasswordCommands::Change => {
                commands::password::change(&config, &paths, &cli.format).await
            }
        },
    }
}
