//! Masjid CLI - Admin directory and backend maintenance tools.
//!
//! # Usage
//!
//! ```bash
//! # Grant admin rights to an existing Supabase user
//! masjid-cli admin grant -u 6f1c2a9e-3b4d-4e5f-8a7b-9c0d1e2f3a4b -e admin@example.com -r admin
//!
//! # Revoke admin rights
//! masjid-cli admin revoke -u 6f1c2a9e-3b4d-4e5f-8a7b-9c0d1e2f3a4b
//!
//! # List admin records
//! masjid-cli admin list
//!
//! # Copy today's calendar entry into current_prayer_times
//! masjid-cli prayer-times refresh
//! ```
//!
//! # Commands
//!
//! - `admin grant` / `admin revoke` / `admin list` - Manage the admin directory
//! - `prayer-times refresh` - Run the daily prayer times edge function

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "masjid-cli")]
#[command(author, version, about = "Masjid portal CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage admin users
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Manage prayer times
    PrayerTimes {
        #[command(subcommand)]
        action: PrayerTimesAction,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Grant admin rights to an existing user
    Grant {
        /// Supabase auth user id
        #[arg(short, long)]
        user_id: String,

        /// Admin email address
        #[arg(short, long)]
        email: String,

        /// Admin role (`super_admin`, `admin`)
        #[arg(short, long, default_value = "admin")]
        role: String,
    },
    /// Deactivate a user's admin record
    Revoke {
        /// Supabase auth user id
        #[arg(short, long)]
        user_id: String,
    },
    /// List admin records
    List,
}

#[derive(Subcommand)]
enum PrayerTimesAction {
    /// Refresh today's prayer times
    Refresh,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Admin { action } => match action {
            AdminAction::Grant {
                user_id,
                email,
                role,
            } => {
                commands::admin::grant(&user_id, &email, &role).await?;
            }
            AdminAction::Revoke { user_id } => commands::admin::revoke(&user_id).await?,
            AdminAction::List => commands::admin::list().await?,
        },
        Commands::PrayerTimes { action } => match action {
            PrayerTimesAction::Refresh => commands::prayer_times::refresh().await?,
        },
    }
    Ok(())
}
