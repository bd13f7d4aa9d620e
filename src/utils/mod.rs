//! File helpers shared by the commands.

pub mod table;

use color_eyre::eyre::{eyre, ContextCompat, Report, Result, WrapErr};
use color_eyre::Help;
use log::debug;
use std::fmt::Debug;
use std::path::Path;
use tipsample_phylo::{newick, Branch, Node, Phylogeny};

/// Get delimiter based on file extension.
///
/// - `.tsv` => `\t`
/// - `.txt` => `\t`
/// - `.csv` => `,`
///
/// Note that `.txt` is assumed to be tab-delimited!
///
/// ```rust
/// use tipsample::utils::get_delimiter;
///
/// assert_eq!(get_delimiter(&"file.tsv")?, '\t');
/// assert_eq!(get_delimiter(&"file.csv")?, ',');
/// assert_eq!(get_delimiter(&"file.txt")?, '\t');
/// assert!(get_delimiter(&"file").is_err());
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
pub fn get_delimiter<P>(path: &P) -> Result<char, Report>
where
    P: AsRef<Path> + Debug,
{
    let ext = path
        .as_ref()
        .extension()
        .wrap_err_with(|| format!("Failed to get file extension: {path:?}"))?
        .to_str()
        .wrap_err_with(|| format!("Failed to convert file extension to str: {path:?}"))?;
    // convert extension to the expected delimiter
    match ext {
        "tsv" | "txt" => Ok('\t'),
        "csv" => Ok(','),
        _ext => {
            Err(eyre!("Unknown file extension: {_ext:?}").suggestion("Options: tsv, csv, or txt"))
        }
    }
}

/// Create the parent directory of a file path, if it doesn't exist yet.
pub fn create_parent_dir<P>(path: &P) -> Result<(), Report>
where
    P: AsRef<Path> + Debug,
{
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("Failed to create directory: {parent:?}"))?;
        }
    }
    Ok(())
}

/// Read the first tree of a Newick (NHX) file.
pub fn read_tree<P>(path: &P) -> Result<Phylogeny<Node, Branch>, Report>
where
    P: AsRef<Path> + Debug,
{
    debug!("Reading tree: {path:?}");
    let input =
        std::fs::read_to_string(path).wrap_err_with(|| format!("Failed to read tree: {path:?}"))?;
    let mut forest = newick::str_to_forest(&input)
        .wrap_err_with(|| format!("Failed to parse newick tree: {path:?}"))?;
    match forest.is_empty() {
        true => Err(eyre!("No tree was found in file: {path:?}")),
        false => Ok(forest.remove(0)),
    }
}

/// Write text to a file, creating the parent directory if needed.
pub fn write_file<P>(path: &P, content: &str) -> Result<(), Report>
where
    P: AsRef<Path> + Debug,
{
    create_parent_dir(path)?;
    std::fs::write(path, content).wrap_err_with(|| format!("Failed to write file: {path:?}"))?;
    Ok(())
}
