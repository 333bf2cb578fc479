//! spindownd — watch block-device I/O and spin idle disks down.

use std::process::ExitCode;

use clap::Parser;

use spindown_cli::config::{self, Config};
use spindown_cli::service::DiskMonitoringService;
use spindown_core::{DEFAULT_POLLING_INTERVAL, Error, ProcDiskStatsSource, Scheduler, duration};

#[derive(Parser)]
#[command(name = "spindownd")]
#[command(about = "Watch block-device I/O and spin idle disks down after a configurable delay")]
#[command(version = spindown_core::VERSION)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the stats polling interval, e.g. "30s" or "2m"
    #[arg(long)]
    poll_interval: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("{error}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Error> {
    let config_path = config::resolve_config_path(cli.config.as_deref())?;
    let config = Config::load(&config_path)?;
    log::info!(
        "loaded {} with {} profiles",
        config_path.display(),
        config.profiles.len()
    );
    if config.profiles.is_empty() {
        log::warn!("configuration defines no profiles; nothing will spin down");
    }

    let polling_interval = match &cli.poll_interval {
        Some(value) => duration::parse(value)
            .map_err(|error| Error::Usage(format!("bad --poll-interval: {error}")))?,
        None => DEFAULT_POLLING_INTERVAL,
    };

    let scheduler = Scheduler::new();
    let stop = scheduler.stop_handle();
    ctrlc::set_handler(move || stop.stop())
        .map_err(|error| Error::Usage(format!("cannot install signal handler: {error}")))?;

    let _service = DiskMonitoringService::new(
        &scheduler,
        config,
        Box::new(ProcDiskStatsSource::new()),
        polling_interval,
    );

    log::info!("spindownd {} started", spindown_core::VERSION);
    scheduler.run();
    log::info!("shutting down");
    Ok(())
}
