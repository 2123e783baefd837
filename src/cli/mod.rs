//! Operator command-line interface.

mod commands;

use clap::{Parser, Subcommand};

/// Quizgate - subscription-gated quiz backend
#[derive(Parser)]
#[command(name = "quizgate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve,

    /// Ensure a live claim token exists for an email and print its link
    IssueToken {
        /// Email the token is bound to
        email: String,
    },

    /// Inspect or toggle a paid profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
}

#[derive(Subcommand)]
pub enum ProfileCommands {
    /// Show the profile for an email
    Show { email: String },
    /// Clear the disabled flag
    Enable { email: String },
    /// Revoke access without touching the expiry
    Disable { email: String },
}

pub use commands::*;
