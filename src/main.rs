use std::path::PathBuf;

use dayroll::config::DayrollConfig;
use dayroll::server::DayrollServer;
use dayroll::Tracker;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // `--config <path>` overrides the default location.
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(DayrollConfig::default_path);

    let mut config = DayrollConfig::load(&config_path)?;
    config.apply_env();

    dayroll::logging::install("dayroll", config.debug_logging)?;
    log::info!("Starting with config {}", config_path.display());

    let tracker = Tracker::from_config(&config)?;

    // Roll the day over once at startup; the API exposes it for later days.
    match tracker.carry_over().await {
        Ok(outcome) if !outcome.carried.is_empty() => {
            log::info!("Startup carry-over moved {} task(s)", outcome.carried.len())
        }
        Ok(_) => {}
        Err(e) => log::error!("Startup carry-over failed: {}", e),
    }

    let server = DayrollServer::start(tracker, &config.server).await?;
    println!("dayroll listening on http://{}", server.addr());

    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down");
    server.shutdown();
    Ok(())
}
