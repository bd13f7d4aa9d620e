//! Cut a tree at a date into a forest of the clades living after it.

use crate::utils;
use clap::Parser;
use color_eyre::eyre::{eyre, Report, Result};
use itertools::Itertools;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tipsample_phylo::{Branch, Node, Phylogeny, ToNewick};

/// Cut a tree at a date, keeping the clades that start at or after it.
#[derive(Clone, Debug, Deserialize, Parser, Serialize)]
pub struct Args {
    /// Input tree (Newick).
    #[clap(short = 't', long, required = true)]
    pub tree: PathBuf,

    /// Output forest, one Newick tree per line.
    #[clap(short = 'o', long, required = true)]
    pub output: PathBuf,

    /// Date of the root.
    #[clap(long, required = true, allow_negative_numbers = true)]
    pub root_date: f64,

    /// Date at which the tree is cut.
    #[clap(long, required = true, allow_negative_numbers = true)]
    pub cutoff: f64,

    /// Name of the new root placed above each cut clade.
    #[clap(long, default_value = "stem")]
    pub stem_name: String,
}

/// Returns the clades crossing or starting after the `cutoff` date, in preorder.
///
/// Node dates are the `root_date` plus the branch lengths from the root. The first node
/// of a path dated at or after the cutoff is placed, with its whole clade, below a new
/// root named `stem_name`, on a branch covering the time from the cutoff to the node.
/// Clades ending before the cutoff are dropped.
///
/// ## Examples
///
/// ```rust
/// use tipsample::cut::cut_by_date;
/// use tipsample_phylo::{Branch, FromNewick, Node, Phylogeny, ToNewick};
///
/// let phylo: Phylogeny<Node, Branch> = Phylogeny::from_newick("((A:1,B:3)C:2,D:0.5)R;")?;
/// let forest = cut_by_date(&phylo, 2000.0, 2002.5, "stem")?;
/// let newicks = forest.iter().map(|tree| tree.to_newick()).collect::<Result<Vec<_>, _>>()?;
/// assert_eq!(newicks, ["(A:0.5)stem:0;", "(B:2.5)stem:0;"]);
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
pub fn cut_by_date(
    phylo: &Phylogeny<Node, Branch>,
    root_date: f64,
    cutoff: f64,
    stem_name: &str,
) -> Result<Vec<Phylogeny<Node, Branch>>, Report> {
    if !root_date.is_finite() || !cutoff.is_finite() {
        return Err(eyre!("Root date ({root_date}) and cutoff ({cutoff}) must be finite numbers."));
    }

    let mut forest = Vec::new();
    let mut todo = vec![(phylo.get_root_index()?, root_date)];

    while let Some((node_index, date)) = todo.pop() {
        if date < cutoff {
            // reversed, so that children are popped in order
            for child in phylo.get_children_indices(&node_index)?.into_iter().rev() {
                let branch = phylo.get_branch(&child)?.map(|b| b.length).unwrap_or_default();
                todo.push((child, date + branch));
            }
        } else {
            let mut tree = Phylogeny::new();
            let stem = tree.add_node(Node::new(stem_name));
            tree.graft(&stem, &phylo.get_subtree(&node_index)?, Branch { length: date - cutoff })?;
            forest.push(tree);
        }
    }

    Ok(forest)
}

/// Cut the input tree and write the forest.
pub fn run(args: &Args) -> Result<(), Report> {
    let phylo = utils::read_tree(&args.tree)?;
    info!("Root date is {}, cutting at {}.", args.root_date, args.cutoff);

    let forest = cut_by_date(&phylo, args.root_date, args.cutoff, &args.stem_name)?;
    if forest.is_empty() {
        warn!("No clade reaches the cutoff date {}, the forest is empty.", args.cutoff);
    }
    let newicks = forest.iter().map(|tree| tree.to_newick()).collect::<Result<Vec<_>, _>>()?;
    let output = newicks.iter().map(|newick| format!("{newick}\n")).join("");
    utils::write_file(&args.output, &output)?;
    info!("Wrote {} trees to: {:?}", forest.len(), args.output);
    Ok(())
}
