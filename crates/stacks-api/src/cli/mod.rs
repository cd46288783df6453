//! CLI command definitions for the `stacks` binary.
//!
//! Uses clap derive macros for argument parsing. Subcommands follow a
//! noun-verb pattern (e.g., `stacks user add`, `stacks session issue`).

pub mod session;
pub mod user;

use clap::{Parser, Subcommand};

use stacks_types::identity::{Role, UserId};

/// Real-time reference chat between library patrons and librarians.
#[derive(Parser)]
#[command(name = "stacks", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP and WebSocket server.
    Serve {
        /// Port to listen on (overrides config.toml).
        #[arg(long, short)]
        port: Option<u16>,

        /// Host to bind to (overrides config.toml).
        #[arg(long)]
        host: Option<String>,
    },

    /// Manage users.
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Manage session tokens.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
pub enum UserAction {
    /// Create a patron or librarian account.
    Add {
        /// Display name shown on messages.
        #[arg(long)]
        name: String,

        /// Role: user (patron) or librarian.
        #[arg(long, default_value = "user")]
        role: Role,
    },
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// Issue a session token for a user. The token is printed once.
    Issue {
        /// User id to issue the token for.
        #[arg(long)]
        user: UserId,

        /// Token lifetime in hours.
        #[arg(long, default_value_t = 24 * 30)]
        ttl_hours: i64,
    },

    /// Revoke a session token.
    Revoke {
        /// The token to revoke.
        token: String,
    },
}

/// Log filter derived from the global verbosity flags.
pub fn verbosity_filter(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "info,stacks_core=debug,stacks_infra=debug,stacks_api=debug",
        _ => "trace",
    }
}
