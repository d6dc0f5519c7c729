use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

use newsreel::cli::{Cli, Command, StoreArgs};
use newsreel::db::{PgConfig, Store};
use newsreel::error::{ConfigError, OpenError};
use newsreel::feed::source::RssFeedSource;
use newsreel::feed::FeedConfig;
use newsreel::logging::configure_logging;
use newsreel::model::ColumnLimits;
use newsreel::reconcile::{LabelPolicy, Reconciler};

// Startup failures get distinct exit codes so wrappers can tell a bad
// config from an unreachable store.
const EXIT_CONFIG: i32 = 2;
const EXIT_OPEN: i32 = 3;

#[tokio::main]
async fn main() {
    let _log_guard = configure_logging();
    let cli = Cli::parse();

    let code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            error!("{:#}", err);
            if err.downcast_ref::<ConfigError>().is_some() {
                EXIT_CONFIG
            } else if err.downcast_ref::<OpenError>().is_some() {
                EXIT_OPEN
            } else {
                1
            }
        }
    };
    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Fetch {
            store,
            feeds,
            label_policy,
            forever,
            interval_secs,
        } => {
            let policy: LabelPolicy = label_policy
                .parse()
                .map_err(|msg: String| anyhow::anyhow!(msg))?;
            let store = open_store(&store).await?;
            let feed_config = FeedConfig::load(&feeds)?;
            let source = RssFeedSource::new(feed_config)?;
            run_polling(&store, &source, policy, forever, interval_secs).await
        }
        Command::Export { store, out } => {
            let store = open_store(&store).await?;
            let mut file = std::fs::File::create(&out)
                .with_context(|| format!("cannot create export file '{}'", out))?;
            let exported = store.export_csv(&mut file).await?;
            info!("Exported {} items to {}", exported, out);
            Ok(())
        }
        Command::Migrate {
            from_db,
            from_pg_config,
            to_db,
            to_pg_config,
        } => {
            let source = open_store(&StoreArgs {
                db: from_db,
                pg_config: from_pg_config,
            })
            .await
            .context("opening source store")?;
            let dest = open_store(&StoreArgs {
                db: to_db,
                pg_config: to_pg_config,
            })
            .await
            .context("opening destination store")?;
            let copied = dest.copy_from(&source).await?;
            info!("Migrated {} items", copied);
            Ok(())
        }
    }
}

async fn open_store(args: &StoreArgs) -> Result<Store> {
    let limits = ColumnLimits::default();
    match (&args.db, &args.pg_config) {
        (Some(path), None) => Ok(Store::open_sqlite(path, limits).await?),
        (None, Some(config_path)) => {
            let config = PgConfig::load(config_path)?;
            Ok(Store::open_postgres(&config, limits).await?)
        }
        _ => bail!("specify exactly one of --db or --pg-config per store"),
    }
}

/// Drive polling passes. Per-batch failures are logged and the pass moves
/// on; one bad cluster must not halt the run.
async fn run_polling(
    store: &Store,
    source: &RssFeedSource,
    policy: LabelPolicy,
    forever: bool,
    interval_secs: u64,
) -> Result<()> {
    let reconciler = Reconciler::new(store, policy);

    loop {
        let batches = source.poll().await;
        info!("Polling pass produced {} batches", batches.len());

        for batch in batches {
            match reconciler.apply_batch(&batch.label, batch.items).await {
                Ok(outcome) => {
                    if outcome.inserted > 0 || !outcome.renamed_from.is_empty() {
                        info!(
                            "Cluster '{}': {} new items, {} labels folded",
                            outcome.label,
                            outcome.inserted,
                            outcome.renamed_from.len()
                        );
                    }
                }
                Err(err) => {
                    error!("Batch '{}' failed, continuing: {}", batch.label, err);
                }
            }
        }

        if !forever {
            return Ok(());
        }
        sleep(Duration::from_secs(interval_secs)).await;
    }
}
