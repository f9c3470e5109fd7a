use clap::Parser;
use hpc_eval::{
    commands::{report, Cli},
    components::{
        self,
        logging::{Logger, LoggerConfig},
        Component,
    },
};
use std::process::ExitCode;
use tracing::error;
use tracing_unwrap::ResultExt;

fn main() -> ExitCode {
    let cli = Cli::parse();
    components::register_types();

    let loader = components::config_loader().unwrap_or_log();

    // the logger section comes from the loaded file
    let loaded = cli.load_config(&loader);
    let logger = loaded
        .as_ref()
        .ok()
        .and_then(|config| config.section::<LoggerConfig>(Logger::KEY).ok())
        .unwrap_or_default();

    if let Err(err) = Logger::init(&logger) {
        eprintln!("{}", report(&err));
        return ExitCode::FAILURE;
    }

    let config = match loaded {
        Ok(config) => config,
        Err(err) => {
            error!("{}", report(&err));
            return ExitCode::FAILURE;
        }
    };

    match cli.command.execute(&loader, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", report(&err));
            ExitCode::FAILURE
        }
    }
}
