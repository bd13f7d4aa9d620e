use crate::{FromNewick, Phylogeny};
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use num_traits::AsPrimitive;
use petgraph::graph::NodeIndex;
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// A clade as written in the Newick text, before conversion into nodes (`N`) and branches (`B`).
///
/// Clades are stored flat in preorder, each one pointing to the position of its parent.
#[derive(Debug, Default)]
struct Clade {
    /// Node label text, including NHX comments (ex. `A[&&NHX:date=2001]`).
    node: String,
    /// Branch text (ex. `:0.5`), empty when no length was given.
    branch: String,
    /// Position of the parent clade, [`None`] for the root.
    parent: Option<usize>,
}

/// Returns a [`Phylogeny`] from a single Newick tree.
///
/// # Arguments
///
/// - `newick` - A Newick [`str`] (ex. `"(A,B);"`)
///
/// # Examples
///
/// From a Newick string with only tip names.
///
/// ```rust
/// use tipsample_phylo::{newick, Branch, Node, Phylogeny};
/// let phylo: Phylogeny<Node, Branch> = newick::str_to_phylogeny("(A,B);")?;
/// let names: Vec<_> = phylo.get_nodes()?.into_iter().map(|n| n.name.as_str()).collect();
/// assert_eq!(names, ["", "A", "B"]);
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
///
/// From a Newick string with internal node names, branch lengths and NHX features.
///
/// ```rust
/// use tipsample_phylo::{newick, Branch, Node, Phylogeny};
/// let nwk = "(A:0.1[&&NHX:date=2001.5],B:0.2,(C:0.3,D:0.4)E:0.5)F;";
/// let phylo: Phylogeny<Node, Branch> = newick::str_to_phylogeny(nwk)?;
/// let names: Vec<_> = phylo.get_nodes()?.into_iter().map(|n| n.name.as_str()).collect();
/// assert_eq!(names, ["F", "A", "B", "E", "C", "D"]);
/// let a = phylo.get_tip_indices()?[0];
/// assert_eq!(phylo.get_node(&a)?.get_feature("date"), Some("2001.5"));
/// assert_eq!(phylo.get_branch(&a)?, Some(&Branch { length: 0.1 }));
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
pub fn str_to_phylogeny<N, B>(newick: &str) -> Result<Phylogeny<N, B>, Report>
where
    N: Clone + Debug + Display + Eq + Hash + PartialEq + FromNewick,
    B: AsPrimitive<f64> + Debug + Display + FromNewick,
{
    let mut forest = str_to_forest(newick)?;
    match forest.len() {
        1 => Ok(forest.remove(0)),
        0 => Err(eyre!("Failed to find a tree in newick string: {newick:?}")),
        n => Err(eyre!("Expected a single tree in newick string, but found {n} trees.")),
    }
}

/// Returns every [`Phylogeny`] in a Newick forest, where trees are terminated by `;`.
///
/// ```rust
/// use tipsample_phylo::{newick, Branch, Node, Phylogeny};
/// let forest: Vec<Phylogeny<Node, Branch>> = newick::str_to_forest("(A,B)C;\n(D,E)F;\n")?;
/// assert_eq!(forest.len(), 2);
/// assert_eq!(forest[1].get_root()?.name, "F");
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
pub fn str_to_forest<N, B>(newick: &str) -> Result<Vec<Phylogeny<N, B>>, Report>
where
    N: Clone + Debug + Display + Eq + Hash + PartialEq + FromNewick,
    B: AsPrimitive<f64> + Debug + Display + FromNewick,
{
    let mut reader = Reader::new(newick);
    let mut forest = Vec::new();

    while reader.skip_whitespace() {
        let clades = reader.read_tree()?;
        reader.skip_whitespace();
        match reader.next() {
            Some(';') | None => (),
            Some(c) => Err(eyre!(
                "Unexpected character {c:?} at position {} of newick string.",
                reader.pos - 1
            ))?,
        }

        let mut phylo = Phylogeny::new();
        let mut indices: Vec<NodeIndex> = Vec::with_capacity(clades.len());
        for clade in clades {
            let node = N::from_newick(&clade.node)
                .wrap_err_with(|| eyre!("Failed to parse newick node: {}", clade.node))?;
            let branch = B::from_newick(&clade.branch)
                .wrap_err_with(|| eyre!("Failed to parse newick branch of node: {}", clade.node))?;
            let node_index = match clade.parent {
                Some(parent) => phylo.add_child(&indices[parent], node, branch)?,
                // the root has no incoming branch, its length is only validated
                None => phylo.add_node(node),
            };
            indices.push(node_index);
        }
        forest.push(phylo);
    }

    Ok(forest)
}

/// Character-level reader over a Newick string.
struct Reader {
    chars: Vec<char>,
    pos: usize,
}

impl Reader {
    fn new(newick: &str) -> Self {
        Reader { chars: newick.chars().collect(), pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek();
        self.pos += 1;
        c
    }

    /// Skip whitespace, returns `true` if there is content left.
    fn skip_whitespace(&mut self) -> bool {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.peek().is_some()
    }

    /// Read one tree, returns its clades in preorder.
    ///
    /// Clades whose children are still being read are kept on a stack, so deep trees
    /// do not grow the call stack.
    fn read_tree(&mut self) -> Result<Vec<Clade>, Report> {
        let mut clades: Vec<Clade> = Vec::new();
        let mut open: Vec<usize> = Vec::new();

        loop {
            // start a new clade
            self.skip_whitespace();
            let position = clades.len();
            clades.push(Clade { parent: open.last().copied(), ..Default::default() });
            if self.peek() == Some('(') {
                self.pos += 1;
                open.push(position);
                continue;
            }
            (clades[position].node, clades[position].branch) = self.read_label()?;

            // close clades until the next sibling starts
            loop {
                let Some(&parent) = open.last() else {
                    return Ok(clades);
                };
                self.skip_whitespace();
                match self.next() {
                    Some(',') => break,
                    Some(')') => {
                        open.pop();
                        (clades[parent].node, clades[parent].branch) = self.read_label()?;
                    }
                    Some(c) => Err(eyre!(
                        "Unexpected character {c:?} at position {} of newick string.",
                        self.pos - 1
                    ))?,
                    None => Err(eyre!("Failed to find matching closing parenthesis in newick string."))?,
                }
            }
        }
    }

    /// Read the text after a clade up to the next `,`, `)` or `;`.
    ///
    /// Bracketed comments go to the node text wherever they appear, so that NHX
    /// features written after the branch length stay with their node.
    fn read_label(&mut self) -> Result<(String, String), Report> {
        let (mut node, mut branch) = (String::new(), String::new());
        let (mut in_quote, mut in_comment, mut in_branch) = (false, false, false);

        while let Some(c) = self.peek() {
            if in_comment {
                node.push(c);
                in_comment = c != ']';
            } else if in_quote {
                node.push(c);
                in_quote = c != '\'';
            } else {
                match c {
                    ',' | ')' | ';' => break,
                    '(' => Err(eyre!(
                        "Unexpected opening parenthesis at position {} of newick string.",
                        self.pos
                    ))?,
                    '[' => {
                        in_comment = true;
                        node.push(c);
                    }
                    '\'' if !in_branch => {
                        in_quote = true;
                        node.push(c);
                    }
                    ':' if !in_branch => {
                        in_branch = true;
                        branch.push(c);
                    }
                    _ if in_branch => branch.push(c),
                    _ => node.push(c),
                }
            }
            self.pos += 1;
        }

        match in_comment || in_quote {
            true => Err(eyre!("Unterminated comment or quote in newick node: {node}")),
            false => Ok((node, branch)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{newick, Branch, Node, Phylogeny, ToNewick};
    use color_eyre::eyre::{Report, Result};

    type Tree = Phylogeny<Node, Branch>;

    #[test]
    fn nhx_after_branch_length() -> Result<(), Report> {
        let nwk = "(A:1.5[&&NHX:date=2001.5:state=High|Low],B:0.5[&&NHX:date=2000])root:0[&&NHX:date=1999];";
        let phylo: Tree = newick::str_to_phylogeny(nwk)?;
        let tips = phylo.get_tips()?;
        assert_eq!(tips[0].get_feature("date"), Some("2001.5"));
        assert_eq!(tips[0].get_labels("state").len(), 2);
        assert_eq!(phylo.get_root()?.get_feature("date"), Some("1999"));
        let expected = "(A:1.5[&&NHX:date=2001.5],B:0.5[&&NHX:date=2000])root:0[&&NHX:date=1999];";
        assert_eq!(phylo.to_nhx(&["date"])?, expected);
        Ok(())
    }

    #[test]
    fn whitespace_and_quotes() -> Result<(), Report> {
        let phylo: Tree = newick::str_to_phylogeny(" ( 'tip, one' : 1 ,\n B:2 ) ;\n")?;
        let names: Vec<_> = phylo.get_tips()?.into_iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["tip, one", "B"]);
        assert_eq!(phylo.to_newick()?, "('tip, one':1,B:2):0;");
        Ok(())
    }

    #[test]
    fn single_node() -> Result<(), Report> {
        let phylo: Tree = newick::str_to_phylogeny("A:3;")?;
        assert_eq!(phylo.get_tips()?, [&Node::new("A")]);
        assert_eq!(phylo.to_newick()?, "A:0;");
        Ok(())
    }

    #[test]
    fn deep_ladder() -> Result<(), Report> {
        let depth = 50_000;
        let nwk = format!("{}A:1{};", "(".repeat(depth), (0..depth).map(|i| format!(",T{i}:1)")).collect::<String>());
        let phylo: Tree = newick::str_to_phylogeny(&nwk)?;
        assert_eq!(phylo.get_tips()?.len(), depth + 1);
        // unnamed internal nodes are written with a zero branch
        assert_eq!(phylo.to_newick()?.len(), nwk.len() + 2 * depth);
        let pruned = phylo.retain_tips(|n| n.name != "T0")?;
        assert_eq!(pruned.get_tips()?.len(), depth);
        Ok(())
    }

    #[test]
    fn malformed() {
        assert!(newick::str_to_phylogeny::<Node, Branch>("((A,B);").is_err());
        assert!(newick::str_to_phylogeny::<Node, Branch>("(A,B));").is_err());
        assert!(newick::str_to_phylogeny::<Node, Branch>("(A:x,B);").is_err());
        assert!(newick::str_to_phylogeny::<Node, Branch>("(A[&&NHX:date=1,B);").is_err());
        assert!(newick::str_to_phylogeny::<Node, Branch>("(A,B);(C,D);").is_err());
        assert!(newick::str_to_phylogeny::<Node, Branch>("  ").is_err());
    }
}
