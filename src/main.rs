mod app_logic;
mod cli;
mod core;

use clap::Parser;
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};
use std::process::ExitCode;

/*
 * Installs the stderr logger. A second call is a no-op, which lets every test
 * call `initialize_logging` without coordinating.
 */
fn init_logging(level: LevelFilter) {
    let config = ConfigBuilder::new()
        .set_time_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .build();
    let _ = TermLogger::init(level, config, TerminalMode::Stderr, ColorChoice::Auto);
}

#[cfg(test)]
pub fn initialize_logging() {
    init_logging(LevelFilter::Debug);
}

fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    init_logging(cli.log_level());
    log::debug!("Main: Running {:?}", cli.command);

    match cli::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                log::debug!("Main: Caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
