//! Give every node of a tree a unique name.

use crate::dates::{DATE, DATE_CI};
use crate::utils;
use clap::Parser;
use color_eyre::eyre::{Report, Result};
use itertools::Itertools;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use tipsample_phylo::{Branch, Node, Phylogeny};

/// Name of an unnamed root.
pub const ROOT_NAME: &str = "root";

/// Name the unnamed and duplicate-named nodes of a tree.
#[derive(Clone, Debug, Deserialize, Parser, Serialize)]
pub struct Args {
    /// Input tree (Newick).
    #[clap(short = 't', long, required = true)]
    pub tree: PathBuf,

    /// Output named tree.
    #[clap(short = 'o', long, required = true)]
    pub output: PathBuf,

    /// NHX features written to the output tree.
    #[clap(long, value_delimiter = ',', default_values_t = [DATE.to_string(), DATE_CI.to_string()])]
    pub features: Vec<String>,
}

/// Rename nodes so that every name is unique and non-empty, returns the number of renamed nodes.
///
/// Nodes are visited in level order. An unnamed root becomes [`ROOT_NAME`], the first node
/// carrying a name keeps it, and every other node is named `n{i}`, skipping names already taken.
///
/// ## Examples
///
/// ```rust
/// use tipsample::name::name_tree;
/// use tipsample_phylo::{Branch, FromNewick, Node, Phylogeny, ToNewick};
///
/// let mut phylo: Phylogeny<Node, Branch> = Phylogeny::from_newick("((A:1,:1):1,(A:1,n1:1)B:1);")?;
/// assert_eq!(name_tree(&mut phylo)?, 4);
/// assert_eq!(phylo.to_newick()?, "((A:1,n2:1)n0:1,(n3:1,n1:1)B:1)root:0;");
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
pub fn name_tree(phylo: &mut Phylogeny<Node, Branch>) -> Result<usize, Report> {
    let mut taken: HashSet<String> =
        phylo.get_nodes()?.into_iter().filter(|n| !n.name.is_empty()).map(|n| n.name.clone()).collect();
    let mut seen = HashSet::new();
    let mut counter = 0;
    let mut renamed = 0;

    let root = phylo.get_root_index()?;
    for node_index in phylo.get_levelorder()? {
        let node = phylo.get_node_mut(&node_index)?;
        if !node.name.is_empty() && seen.insert(node.name.clone()) {
            continue;
        }

        let name = match node_index == root && !taken.contains(ROOT_NAME) {
            true => ROOT_NAME.to_string(),
            false => loop {
                let name = format!("n{counter}");
                counter += 1;
                if !taken.contains(&name) {
                    break name;
                }
            },
        };
        debug!("Renaming node {:?} to {name:?}", node.name);
        taken.insert(name.clone());
        seen.insert(name.clone());
        node.name = name;
        renamed += 1;
    }

    Ok(renamed)
}

/// Name the nodes of the input tree and write it.
pub fn run(args: &Args) -> Result<(), Report> {
    let mut phylo = utils::read_tree(&args.tree)?;
    let renamed = name_tree(&mut phylo)?;
    info!("Named {renamed} nodes.");

    let features = args.features.iter().map(String::as_str).collect_vec();
    utils::write_file(&args.output, &format!("{}\n", phylo.to_nhx(&features)?))?;
    info!("Wrote named tree to: {:?}", args.output);
    Ok(())
}
