use std::{sync::Arc, time::Duration};

use air4thai_core::PartitionStore;
use daemon::{
    get_config_info, run_cycle, setup_logger, AqiFetcher, Cli, CycleOutcome, Normalizer,
    PartitionWriter,
};
use slog::{error, info, Logger};
use tokio::time::interval;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = get_config_info();
    let logger = setup_logger(&cli);

    let dataset = cli.dataset()?;
    let index = cli.index_column()?;
    let policy = cli.coercion_policy()?;

    info!(logger, "Air4Thai Daemon starting...");
    info!(logger, "  API URL: {}", cli.api_url());
    info!(logger, "  Dataset: {}", dataset);
    info!(logger, "  Index column: {}", index.column_name());
    info!(logger, "  Fetch interval: {} seconds", cli.sleep_interval());

    let store = cli.open_dataset(&logger).await?;

    let fetcher = AqiFetcher::new(logger.clone(), cli.api_url(), cli.user_agent(), cli.timeout())?;
    let normalizer = Normalizer::new(index, policy);
    let writer = PartitionWriter::new(logger.clone(), store.clone(), normalizer.index_column());

    if cli.once {
        let outcome = run_cycle(&logger, &fetcher, &normalizer, &writer).await?;
        log_outcome(&logger, &outcome);
        return Ok(());
    }

    process_snapshots_hourly(cli, logger, store, fetcher, normalizer, writer).await;
    Ok(())
}

async fn process_snapshots_hourly(
    cli: Cli,
    logger: Logger,
    store: Arc<dyn PartitionStore>,
    fetcher: AqiFetcher,
    normalizer: Normalizer,
    writer: PartitionWriter,
) {
    let sleep_between_checks = cli.sleep_interval();
    info!(
        logger,
        "Wait time between data pulls: {} seconds", sleep_between_checks
    );
    info!(logger, "Writing to {}", store.location(""));

    let mut check_interval = interval(Duration::from_secs(sleep_between_checks));
    loop {
        tokio::select! {
            _ = check_interval.tick() => {
                match run_cycle(&logger, &fetcher, &normalizer, &writer).await {
                    Ok(outcome) => {
                        log_outcome(&logger, &outcome);
                        info!(logger, "waiting {} seconds for next run", sleep_between_checks);
                    }
                    Err(err) => error!(&logger, "Error processing snapshot: {}", err)
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!(logger, "Shutting down");
                break;
            }
        }
    }
}

fn log_outcome(logger: &Logger, outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Written {
            snapshot,
            rows,
            files,
        } => info!(
            logger,
            "stored {} rows of snapshot {} in {} file(s)",
            rows,
            snapshot,
            files.len()
        ),
        CycleOutcome::WriteFailed { snapshot, reason } => {
            error!(logger, "snapshot {} dropped: {}", snapshot, reason)
        }
    }
}
