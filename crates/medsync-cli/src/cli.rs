use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use medsync_core::RecordKind;

#[derive(Parser)]
#[command(name = "medsync")]
#[command(about = "Track medications, supplements, diet and doctors offline, sync when online")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name for remote sync configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// Owner whose records are read and written
    #[arg(long, global = true, value_name = "OWNER")]
    pub owner: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a record from `field=value` pairs or a JSON object
    #[command(alias = "new")]
    Add {
        /// Record kind
        #[arg(value_parser = parse_kind)]
        kind: RecordKind,
        /// Fields such as `name=Aspirin dosage=81mg`, or one JSON object
        fields: Vec<String>,
    },
    /// List recent records of one kind
    List {
        #[arg(value_parser = parse_kind)]
        kind: RecordKind,
        /// Number of records to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one record
    Show {
        #[arg(value_parser = parse_kind)]
        kind: RecordKind,
        /// Record ID or unique ID prefix
        id: String,
    },
    /// Change fields of an existing record
    #[command(alias = "edit")]
    Update {
        #[arg(value_parser = parse_kind)]
        kind: RecordKind,
        /// Record ID or unique ID prefix
        id: String,
        /// Fields to change; opens $EDITOR when omitted
        fields: Vec<String>,
    },
    /// Delete a record (propagated on the next sync)
    Delete {
        #[arg(value_parser = parse_kind)]
        kind: RecordKind,
        /// Record ID or unique ID prefix
        id: String,
    },
    /// Push local changes to the remote store
    Sync {
        /// Also pull remote changes after pushing
        #[arg(long)]
        full: bool,
    },
    /// Pull every remote record for the owner
    Pull,
    /// Show pending changes and remote reachability
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recently resolved sync conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the sync engine in the foreground until interrupted
    Watch,
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update a profile
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Remote document store base URL
        #[arg(long, value_name = "URL")]
        remote_url: Option<String>,
        /// Bearer token for the remote store
        #[arg(long, value_name = "TOKEN")]
        auth_token: Option<String>,
        /// Owner id used for records and remote paths
        #[arg(long = "owner-id", value_name = "OWNER")]
        owner_id: Option<String>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the resolved profile
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_kind(value: &str) -> Result<RecordKind, String> {
    value.parse::<RecordKind>().map_err(|error| error.to_string())
}
