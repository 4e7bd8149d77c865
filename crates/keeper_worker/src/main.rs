mod platform;

use std::process::ExitCode;

use clap::Parser;
use engine_logging::{engine_error, LogDestination};

use platform::{Cli, WorkerConfig};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match WorkerConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("link-keeper: {err}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if let Some(path) = cli.log_file {
        config.log_file = Some(path);
    }

    let destination = match &config.log_file {
        Some(path) => LogDestination::Both(path.clone()),
        None => LogDestination::Terminal,
    };
    engine_logging::initialize(&destination, engine_logging::parse_level(&config.log_level));

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("link-keeper: failed to start the async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(platform::execute(cli.command, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            engine_error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
