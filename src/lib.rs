#![doc = include_str!("../README.md")]

pub mod cli;
pub mod config;
pub mod cut;
pub mod dates;
pub mod name;
pub mod sample;
pub mod utils;

#[doc(inline)]
pub use crate::cli::Cli;
#[doc(inline)]
pub use crate::config::Config;
#[doc(inline)]
pub use utils::table::Table;
