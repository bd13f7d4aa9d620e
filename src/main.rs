use clap::Parser;
use color_eyre::eyre::{Report, Result};
use log::debug;
use tipsample::{cli::Command, cut, name, sample, Cli};

fn main() -> Result<(), Report> {
    // ------------------------------------------------------------------------
    // CLI Setup

    // Parse CLI parameters
    let args = Cli::parse();

    // initialize color_eyre crate for colorized logs
    color_eyre::install()?;

    // Set logging/verbosity level via RUST_LOG
    std::env::set_var("RUST_LOG", args.verbosity.to_string());

    // initialize env_logger crate for logging/verbosity level
    env_logger::init();
    debug!("Command-line arguments:\n{}", serde_json::to_string_pretty(&args)?);

    // check which CLI command we're running (subsample, name, cut)
    match args.command {
        Command::Subsample(args) => _ = sample::run(&args)?,
        Command::Name(args) => name::run(&args)?,
        Command::Cut(args) => cut::run(&args)?,
    }

    Ok(())
}
