//! Command-line surface: harvest into a store, export it, or migrate
//! between stores.

use clap::{Args, Parser, Subcommand};

/// Incremental harvester for clustered news feeds.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// A store is either an embedded SQLite file or a networked Postgres
/// database described by a YAML config; exactly one must be given.
#[derive(Args, Debug)]
pub struct StoreArgs {
    /// Path to an embedded SQLite store (created if missing)
    #[arg(long)]
    pub db: Option<String>,

    /// Path to a YAML file with Postgres connection parameters
    #[arg(long)]
    pub pg_config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Poll the configured feeds once (or forever) and reconcile each
    /// scraped cluster into the store
    Fetch {
        #[command(flatten)]
        store: StoreArgs,

        /// Path to the feed configuration YAML (feed URLs, pacing, proxy)
        #[arg(long, env = "NEWSREEL_FEEDS")]
        feeds: String,

        /// How to resolve a batch overlapping stored clusters:
        /// 'newest' renames stored labels, 'keep-existing' keeps them
        #[arg(long, default_value = "newest")]
        label_policy: String,

        /// Keep polling forever instead of a single pass
        #[arg(long)]
        forever: bool,

        /// Pause between polling passes, seconds
        #[arg(long, default_value_t = 600)]
        interval_secs: u64,
    },

    /// Export every stored item as CSV
    Export {
        #[command(flatten)]
        store: StoreArgs,

        /// Output file path
        #[arg(long)]
        out: String,
    },

    /// Copy all items from one store into another, skipping duplicates
    Migrate {
        /// Source SQLite store
        #[arg(long)]
        from_db: Option<String>,

        /// Source Postgres config YAML
        #[arg(long)]
        from_pg_config: Option<String>,

        /// Destination SQLite store
        #[arg(long)]
        to_db: Option<String>,

        /// Destination Postgres config YAML
        #[arg(long)]
        to_pg_config: Option<String>,
    },
}
