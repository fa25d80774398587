use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "chatstore", version, about = "Chat session storage server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file path globally
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server
    Serve,

    /// Manage chat sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// Create a new session
    Create {
        /// The owning user id
        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        name: String,
    },

    /// List sessions for a user
    List {
        #[arg(short, long)]
        user: String,

        /// Page number (0-based)
        #[arg(long, default_value_t = 0)]
        page: usize,

        /// Page size
        #[arg(long, default_value_t = 20)]
        size: usize,
    },

    /// Rename a session
    Rename {
        /// The UUID of the session to rename
        id: Uuid,

        #[arg(short, long)]
        name: String,
    },

    /// Mark or unmark a session as favorite
    Favorite {
        /// The UUID of the session to update
        id: Uuid,

        /// false to unmark
        #[arg(long, default_value_t = true)]
        value: bool,
    },

    /// Delete a session and its messages
    Delete {
        id: Uuid,
    },
}
