use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use drowsy_core::cache::ReadPolicy;
use drowsy_core::remote::FetchSchema;

#[derive(Parser)]
#[command(name = "drowsy")]
#[command(about = "Record fatigue readings locally and sync them when online")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the engine config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record fatigue readings directly
    #[command(alias = "add")]
    Capture {
        /// Scores, or `epoch_ms,score` pairs (stdin lines when omitted)
        readings: Vec<String>,
    },
    /// List stored readings, newest first
    List {
        /// Number of readings to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Where readings may come from
        #[arg(long, value_enum, default_value_t = PolicyArg::LocalFirst)]
        policy: PolicyArg,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show readings within a time range, oldest first
    Range {
        /// Range start (epoch ms or RFC 3339)
        #[arg(long)]
        from: String,
        /// Range end, inclusive (epoch ms or RFC 3339)
        #[arg(long)]
        to: String,
        /// Where readings may come from
        #[arg(long, value_enum, default_value_t = PolicyArg::LocalFirst)]
        policy: PolicyArg,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Summarize scores within a time range
    Stats {
        /// Range start (epoch ms or RFC 3339)
        #[arg(long)]
        from: String,
        /// Range end, inclusive (epoch ms or RFC 3339)
        #[arg(long)]
        to: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Upload pending readings now
    Sync,
    /// Feed a live score stream from stdin through the capture policy
    Watch {
        /// Override the configured threshold
        #[arg(long)]
        threshold: Option<f32>,
        /// Skip background sync even when a backend is configured
        #[arg(long)]
        offline: bool,
    },
    /// Delete one reading
    Delete {
        /// Local reading id
        id: String,
    },
    /// Delete every stored reading
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
    /// Manage engine configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Manage the bearer token used for the backend
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum PolicyArg {
    LocalFirst,
    LocalOnly,
    CloudOnly,
}

impl From<PolicyArg> for ReadPolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::LocalFirst => Self::LocalFirst,
            PolicyArg::LocalOnly => Self::LocalOnly,
            PolicyArg::CloudOnly => Self::CloudOnly,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum SchemaArg {
    Legacy,
    Member,
}

impl From<SchemaArg> for FetchSchema {
    fn from(value: SchemaArg) -> Self {
        match value {
            SchemaArg::Legacy => Self::Legacy,
            SchemaArg::Member => Self::Member,
        }
    }
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Create or update the config file
    Init {
        /// Backend base URL
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Subject id sent with uploads
        #[arg(long, value_name = "ID")]
        subject_id: Option<String>,
        /// Integer member id for the member fetch schema
        #[arg(long, value_name = "ID")]
        member_id: Option<i64>,
        /// Range fetch schema spoken by the backend
        #[arg(long, value_enum)]
        fetch_schema: Option<SchemaArg>,
        /// Capture threshold score
        #[arg(long)]
        threshold: Option<f32>,
        /// Minimum milliseconds between threshold captures
        #[arg(long, value_name = "MS")]
        cooldown_ms: Option<u64>,
        /// Maximum milliseconds between any two captures
        #[arg(long, value_name = "MS")]
        periodic_interval_ms: Option<u64>,
    },
    /// Print the effective configuration
    Show,
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Store a bearer token in the OS keychain
    SetToken {
        /// Token value (read from stdin when omitted)
        token: Option<String>,
    },
    /// Show whether a token is available
    Status,
    /// Remove the stored token
    Clear,
}
