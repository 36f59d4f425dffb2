//! `fluxgrid`: run a grid fluid simulation from a description or a save.

mod args;
mod driver;

use std::io;
use std::process::ExitCode;

use args::Cli;
use clap::Parser;
use driver::RunError;
use fluxgrid_data::{RunConfig, load_config};

fn run(cli: Cli) -> Result<(), RunError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RunConfig::default(),
    };
    cli.apply(&mut config);

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    driver::run(&config, &mut out)?;
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("error: {e}");
            if matches!(e, RunError::Config(_)) {
                eprintln!("run with --help for usage");
            }
            ExitCode::FAILURE
        }
    }
}
