//! Sampling roles of the category labels, read from JSON.

use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::Path;

/// Which annotation column holds the tip states, and which states play a special role.
///
/// Missing keys in a JSON file fall back to the [`Default`] values.
///
/// ```json
/// {
///   "column": "highlow_prevalence",
///   "reference_states": ["Low", "High"],
///   "special_state": "External"
/// }
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Config {
    /// NHX feature holding the tip states, multiple states are separated by `|`.
    pub column: String,
    /// States whose earliest sampling year marks the onset year.
    pub reference_states: Vec<String>,
    /// State sampled preferentially from the onset year onwards, [`None`] to disable.
    pub special_state: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            column: "highlow_prevalence".to_string(),
            reference_states: vec!["Low".to_string(), "High".to_string()],
            special_state: Some("External".to_string()),
        }
    }
}

impl Config {
    /// Reads a [`Config`] from a JSON file.
    pub fn read<P>(path: &P) -> Result<Config, Report>
    where
        P: AsRef<Path> + Debug,
    {
        let input = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read sampling config: {path:?}."))?;
        let config: Config = serde_json::from_str(&input)
            .wrap_err_with(|| format!("Failed to deserialize sampling config: {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the config can drive a sampling run.
    pub fn validate(&self) -> Result<(), Report> {
        if self.column.is_empty() {
            return Err(eyre!("The state column name is empty."))
                .suggestion("Set \"column\" to the NHX feature holding the tip states.");
        }
        if self.reference_states.is_empty() {
            return Err(eyre!("No reference states were configured."))
                .suggestion("Set \"reference_states\" to the states that mark the onset year.");
        }
        Ok(())
    }
}
