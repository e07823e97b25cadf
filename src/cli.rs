//! Command-line interface for the RideDesk back-office service.

use clap::{Parser, Subcommand};

/// RideDesk - ride operations back office
#[derive(Parser)]
#[command(name = "ridedesk")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve,

    /// Create a default config file
    Init,

    /// Reset an operator's password to a generated temporary one
    #[command(name = "reset-password")]
    ResetPassword {
        /// Email of the account to reset
        email: String,
    },
}
