//! [Command-line interface](Cli) (CLI) of the main binary.

use crate::{cut, name, sample};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::default::Default;

// ----------------------------------------------------------------------------
// CLI Entry Point
// ----------------------------------------------------------------------------

/// The command-line interface (CLI).
/// ---
/// The CLI is intended for parsing user input from the command-line in the main function.
/// This is achieved with the `parse` function, which parses the command line arguments from
/// [`std::env::args`](https://doc.rust-lang.org/std/env/fn.args.html).
/// ```no_run
/// use clap::Parser;
/// let args = tipsample::Cli::parse();
/// ```
/// Here is a manual example of setting the command-line input:
/// ```rust
/// # use clap::Parser;
/// use tipsample::cli::{Command, Verbosity};
///
/// let input = ["tipsample", "subsample", "--tree", "in.nwk", "--output", "out.nwk", "--seed", "1", "-v", "debug"];
/// let args = tipsample::Cli::parse_from(input);
/// assert_eq!(args.verbosity, Verbosity::Debug);
/// let Command::Subsample(subsample) = &args.command else { panic!() };
/// assert_eq!(subsample.seed, Some(1));
/// serde_json::to_string_pretty(&args)?;
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
#[derive(Debug, Deserialize, Parser, Serialize)]
#[clap(name = "tipsample", author, version)]
#[clap(about = "tipsample subsamples dated phylogenetic trees, balancing tip states and sampling years.")]
pub struct Cli {
    #[clap(subcommand)]
    /// Pass CLI arguments to a particular [Command].
    #[clap(help = "Set the command.")]
    pub command: Command,

    /// Set the output [Verbosity] level.
    #[clap(short = 'v', long)]
    #[clap(value_enum, default_value_t = Verbosity::default())]
    #[clap(hide_possible_values = false)]
    #[clap(global = true)]
    #[clap(help = "Set the output verbosity level.")]
    pub verbosity: Verbosity,
}

/// CLI [commands](#variants), each one passes its arguments to a runtime module.
#[derive(Debug, Deserialize, Serialize, Subcommand)]
pub enum Command {
    /// Pass CLI arguments to [sample::run].
    #[clap(about = "Subsample tips, balancing states and sampling years.")]
    Subsample(sample::Args),
    /// Pass CLI arguments to [name::run].
    #[clap(about = "Give every node a unique name.")]
    Name(name::Args),
    /// Pass CLI arguments to [cut::run].
    #[clap(about = "Cut a tree at a date into a forest.")]
    Cut(cut::Args),
}

// -----------------------------------------------------------------------------
// Verbosity
// -----------------------------------------------------------------------------

/// The output verbosity level.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize, ValueEnum)]
pub enum Verbosity {
    #[default]
    Info,
    Warn,
    Debug,
    Error,
}

impl std::fmt::Display for Verbosity {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        // lowercase for the RUST_LOG env var
        let lowercase = format!("{self:?}").to_lowercase();
        write!(f, "{lowercase}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_display() {
        assert_eq!(Verbosity::default().to_string(), "info");
        assert_eq!(Verbosity::Warn.to_string(), "warn");
    }

    #[test]
    fn parse_commands() {
        let args = Cli::parse_from(["tipsample", "cut", "-t", "a.nwk", "-o", "b.nwk", "--root-date", "1980", "--cutoff", "1996.5"]);
        match args.command {
            Command::Cut(cut) => {
                assert_eq!(cut.cutoff, 1996.5);
                assert_eq!(cut.stem_name, "stem");
            }
            command => panic!("unexpected command: {command:?}"),
        }
        assert!(Cli::try_parse_from(["tipsample", "name", "-t", "a.nwk"]).is_err());
        assert!(Cli::try_parse_from(["tipsample", "subsample", "-t", "a", "-o", "b", "--special-state", "X", "--no-special-state"]).is_err());
    }
}
