mod cli;
mod loop_runner;
mod sweep;

use std::time::Duration;

use clap::Parser;
use cli::{Cli, Command};
use repodata_config::{telemetry, WorkerConfig};
use repodata_shards::ShardStore;
use repodata_sync::Rank;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.verbose.tracing_level_filter().to_string().as_str());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4))
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> anyhow::Result<()> {
    let config = WorkerConfig::from_env();

    match cli.command {
        Command::Run { time_limit, make_releases, main_only, debug, rank, n_ranks, allow_unsafe } => {
            let options = loop_runner::RunOptions {
                time_limit: Duration::from_secs(time_limit),
                make_releases,
                main_only,
                debug,
                rank: Rank::new(rank, n_ranks),
                allow_unsafe,
            };
            loop_runner::run(options, config).await?;
        }
        Command::Sweep { rank, n_ranks } => {
            let store = ShardStore::new(config.shards_repo_path.clone().unwrap_or_else(|| ".".to_string()));
            let denylist = loop_runner::load_denylist(config.denylist_path.as_deref());
            let swept = sweep::run(&store, &denylist, Rank::new(rank, n_ranks))?;
            tracing::info!(swept, "undistributable sweep complete");
        }
    }

    Ok(())
}
