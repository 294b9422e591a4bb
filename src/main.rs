//! memboost - Main Entry Point

use clap::Parser;
use memboost::cli::{cmd_inspect, cmd_train, Cli, Commands, TrainArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memboost=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            data,
            date_column,
            target_column,
            exclude,
            test_size,
            max_memory_mb,
            no_waterfalls,
            threads,
            output,
            plots_dir,
        } => {
            cmd_train(TrainArgs {
                data,
                date_column,
                target_column,
                exclude,
                test_size,
                max_memory_mb,
                multiple_waterfall_plots: !no_waterfalls,
                threads,
                output,
                plots_dir,
            })
            .await?;
        }
        Commands::Inspect { data, max_memory_mb, test_size } => {
            cmd_inspect(&data, max_memory_mb, test_size)?;
        }
    }

    Ok(())
}
