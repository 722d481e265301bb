use crate::config::{
    DEFAULT_BATCH_SIZE, DEFAULT_DATA_DIR, DEFAULT_DB_PATH, DEFAULT_TIMEOUT_MS, SelfLoopPolicy,
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "msggraph", version, about = "Social graph store with a message dataset importer")]
pub struct Cli {
    /// Graph store file
    #[arg(long, env = "MSGGRAPH_DB", default_value = DEFAULT_DB_PATH, global = true)]
    pub db: PathBuf,

    /// How long to wait on a locked store, in milliseconds
    #[arg(long, env = "MSGGRAPH_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS, global = true)]
    pub timeout_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args)]
pub struct LoadArgs {
    /// Directory holding users.csv and follows.csv
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Rows per store transaction
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
}

#[derive(Args)]
pub struct Credentials {
    #[arg(long)]
    pub username: String,

    #[arg(long, env = "MSGGRAPH_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Subcommand)]
pub enum Command {
    /// Parse a SRC DST TIMESTAMP dataset, stage it and load it
    Import {
        dataset: PathBuf,
        #[command(flatten)]
        load: LoadArgs,
        #[arg(long, value_enum, default_value_t = SelfLoopPolicy::Keep)]
        self_loops: SelfLoopPolicy,
    },
    /// Load previously staged users.csv and follows.csv
    LoadStaged {
        #[command(flatten)]
        load: LoadArgs,
    },
    /// Declare constraints and indexes, then list them
    Schema,
    /// Node and relationship counts
    Stats,
    /// Write a random dataset in the import format
    Generate {
        out: PathBuf,
        #[arg(long, default_value_t = 1_899)]
        users: u32,
        #[arg(long, default_value_t = 59_835)]
        events: u64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Create an account, or claim an imported user with --dataset-id
    Register {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        bio: String,
        #[arg(long)]
        dataset_id: Option<String>,
    },
    Login {
        #[command(flatten)]
        credentials: Credentials,
    },
    Profile {
        #[command(flatten)]
        credentials: Credentials,
    },
    EditProfile {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        bio: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    Follow {
        #[command(flatten)]
        credentials: Credentials,
        target: String,
    },
    Unfollow {
        #[command(flatten)]
        credentials: Credentials,
        target: String,
    },
    /// Who a user follows and who follows them
    Connections { username: String },
    /// Users followed by both
    Mutual { first: String, second: String },
    /// Substring search on username or name
    Search {
        term: String,
        #[arg(long)]
        exclude: Option<String>,
    },
}
