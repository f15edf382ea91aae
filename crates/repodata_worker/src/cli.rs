use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};

#[derive(Parser, Debug)]
#[command(name = "repodata-worker", about = "incremental repodata mirror and publish loop")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the incremental ingest/rebuild/publish loop.
    Run {
        /// Maximum time to run, in seconds, before exiting cleanly.
        time_limit: u64,

        /// Publish rebuilt repodata/channeldata as a new release.
        #[arg(long)]
        make_releases: bool,

        /// Only sync and rebuild the `main` label.
        #[arg(long)]
        main_only: bool,

        /// Dump in-memory state to the working directory on exit.
        #[arg(long)]
        debug: bool,

        /// This process's rank, in `[0, n_ranks)`.
        #[arg(long, default_value_t = 0)]
        rank: u32,

        /// Number of cooperating processes sharing the sync workload.
        #[arg(long = "n-ranks", default_value_t = 1)]
        n_ranks: u32,

        /// Start from an empty Link Table when releases are enabled but no
        /// prior one can be found, instead of refusing to start. Only safe
        /// on a channel's very first run.
        #[arg(long)]
        allow_unsafe: bool,
    },

    /// Rewrite shards for newly-undistributable packages back to their
    /// upstream URL.
    Sweep {
        /// This process's rank, in `[0, n_ranks)`.
        #[arg(long, default_value_t = 0)]
        rank: u32,

        /// Number of cooperating processes sharing the sweep workload.
        #[arg(long = "n-ranks", default_value_t = 1)]
        n_ranks: u32,
    },
}
