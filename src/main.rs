use clap::Parser;
use poly_mirror::cli::{Cli, Commands};
use poly_mirror::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .map_err(|e| anyhow::anyhow!("Could not load config from {}: {}", cli.config, e))?;

    poly_mirror::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            args.execute(config).await?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  Reference: {}", config.accounts.reference_address);
            println!("  Follower:  {}", config.accounts.follower_address);
            println!(
                "  Thresholds: {} shares / ${}",
                config.replication.min_share_threshold, config.replication.min_dollar_threshold
            );
            println!(
                "  Chase: {} attempts, ladder {:?}",
                config.execution.max_chase_attempts, config.execution.slippage_ladder
            );
            println!("  Search terms: {:?}", config.markets.search_terms);
        }
    }

    Ok(())
}
