//! Resolve a numeric date on every node of a tree.

use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use log::{debug, warn};
use tipsample_phylo::{Branch, Node, Phylogeny, VALUE_SEPARATOR};

/// NHX feature holding the node date (ex. `2001.5`).
pub const DATE: &str = "date";
/// NHX feature holding the date confidence interval (ex. `2000.9|2002.1`).
pub const DATE_CI: &str = "date_CI";

/// Annotate every node with a [`DATE`] feature.
///
/// - A node with a parseable date keeps it, normalized to a number.
/// - An undated root gets `root_date`, or 0 if none was given.
/// - Any other undated node gets the date of its parent plus its branch length.
/// - A [`DATE_CI`] feature is kept only if it is a `lower|upper` pair of numbers.
///
/// ## Examples
///
/// ```rust
/// use tipsample::dates::{annotate_dates, get_date};
/// use tipsample_phylo::{Branch, FromNewick, Node, Phylogeny};
///
/// let mut phylo: Phylogeny<Node, Branch> =
///     Phylogeny::from_newick("((A:1.5,B:2[&&NHX:date=2003])C:1,D:0.25)root;")?;
/// annotate_dates(&mut phylo, Some(2000.0))?;
/// let dates = phylo.get_tips()?.into_iter().map(get_date).collect::<Result<Vec<_>, _>>()?;
/// assert_eq!(dates, [2002.5, 2003.0, 2000.25]);
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
pub fn annotate_dates(phylo: &mut Phylogeny<Node, Branch>, root_date: Option<f64>) -> Result<(), Report> {
    let mut inferred = 0;

    for node_index in phylo.get_preorder()? {
        let parent = phylo.get_parent_index(&node_index)?;
        let branch = phylo.get_branch(&node_index)?.map(|b| b.length).unwrap_or_default();
        let parent_date = match parent {
            Some(parent) => Some(get_date(phylo.get_node(&parent)?)?),
            None => None,
        };

        let node = phylo.get_node_mut(&node_index)?;
        let date = match node.get_feature(DATE).map(|d| d.trim().parse::<f64>()) {
            Some(Ok(date)) => date,
            invalid => {
                if let Some(Err(_)) = invalid {
                    warn!("Ignoring unparseable date of node {:?}: {:?}", node.name, node.get_feature(DATE));
                }
                inferred += 1;
                match parent_date {
                    Some(parent_date) => parent_date + branch,
                    None => root_date.unwrap_or_default(),
                }
            }
        };
        node.set_feature(DATE, date);

        if let Some(ci) = node.get_feature(DATE_CI) {
            if parse_date_ci(ci).is_none() {
                debug!("Removing date confidence interval of node {:?}: {ci:?}", node.name);
                node.remove_feature(DATE_CI);
            }
        }
    }

    debug!("Inferred {inferred} node dates from branch lengths.");
    Ok(())
}

/// Returns the [`DATE`] of a node, which must have been annotated.
pub fn get_date(node: &Node) -> Result<f64, Report> {
    let date = node
        .get_feature(DATE)
        .ok_or_else(|| eyre!("Node {:?} has no {DATE} annotation.", node.name))?;
    date.trim()
        .parse()
        .wrap_err_with(|| format!("Failed to parse {DATE} of node {:?}: {date:?}", node.name))
}

/// Parse a `lower|upper` confidence interval.
fn parse_date_ci(ci: &str) -> Option<(f64, f64)> {
    let (lower, upper) = ci.split_once(VALUE_SEPARATOR)?;
    Some((lower.trim().parse().ok()?, upper.trim().parse().ok()?))
}
