use crate::{newick, Branch, FromNewick, Node, ToNewick};

use color_eyre::eyre::{eyre, Report, Result};
use itertools::Itertools;
use num_traits::AsPrimitive;
use petgraph::graph::{Graph, NodeIndex};
use petgraph::visit::IntoNodeReferences;
use petgraph::Direction;
use std::collections::{HashSet, VecDeque};
use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::ops::Add;

/// A rooted [`Phylogeny`] as a directed graph of parents and children.
///
/// ## Introduction
///
/// - The nodes (`N`) can be a wide variety of types (ex. [`str`], [`String`], [`Node`](crate::Node), etc.).
/// - The branches (`B`) must be a type that can be cast into an [`f64`] for the length.
/// - Every node except the root has exactly one incoming branch, the root has none.
/// - Children keep the order in which they were added, which is the Newick order when parsed.
///
#[derive(Clone, Debug)]
pub struct Phylogeny<N, B> {
    /// Directed graph of parents and children, `N` are nodes and `B` are the branches into children.
    pub graph: Graph<N, B>,
}

impl<N, B> Default for Phylogeny<N, B>
where
    N: Clone + Debug + Display + Eq + Hash + PartialEq,
    B: AsPrimitive<f64> + Debug + Display,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<N, B> Phylogeny<N, B>
where
    N: Clone + Debug + Display + Eq + Hash + PartialEq,
    B: AsPrimitive<f64> + Debug + Display,
{
    /// Returns a new empty [`Phylogeny`] with nodes (`N`) and branches (`B`).
    ///
    /// ## Examples
    ///
    /// Manually specify the types at creation, with [`str`] nodes (`N`) and [`f64`] branches (`B`).
    ///
    /// ```rust
    /// use tipsample_phylo::Phylogeny;
    /// let mut phylo: Phylogeny<&str, f64> = Phylogeny::new();
    /// let root = phylo.add_node("root");
    /// phylo.add_child(&root, "A", 1.5)?;
    /// # assert_eq!(phylo.get_nodes()?, [&"root", &"A"]);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn new() -> Self {
        Phylogeny { graph: Graph::new() }
    }

    /// Adds a new node (`N`) to the [`Phylogeny`] and returns the [`NodeIndex`].
    ///
    /// Nodes are not deduplicated, two unnamed internal nodes are different nodes.
    /// A node added without a parent is a root, a [`Phylogeny`] should only have one.
    pub fn add_node(&mut self, node: N) -> NodeIndex {
        self.graph.add_node(node)
    }

    /// Adds a child node (`N`) below a parent, connected by a branch (`B`), and returns the child [`NodeIndex`].
    ///
    /// ## Examples
    ///
    /// ```rust
    /// use tipsample_phylo::Phylogeny;
    /// use petgraph::graph::NodeIndex;
    ///
    /// let mut phylo: Phylogeny<&str, f64> = Phylogeny::new();
    /// let root = phylo.add_node("root");
    /// let a = phylo.add_child(&root, "A", 1.0)?;
    /// assert_eq!(phylo.get_parent_index(&a)?, Some(root));
    ///
    /// // the parent must already exist
    /// assert!(phylo.add_child(&NodeIndex::new(10), "B", 1.0).is_err());
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn add_child(&mut self, parent: &NodeIndex, node: N, branch: B) -> Result<NodeIndex, Report> {
        self.get_node(parent)?;
        let child = self.graph.add_node(node);
        self.graph.add_edge(*parent, child, branch);
        Ok(child)
    }

    /// Returns the branch (`B`) leading into a node, [`None`] for the root.
    pub fn get_branch(&self, node_index: &NodeIndex) -> Result<Option<&B>, Report> {
        self.get_node(node_index)?;
        let branch = self
            .graph
            .edges_directed(*node_index, Direction::Incoming)
            .next()
            .map(|edge| edge.weight());
        Ok(branch)
    }

    /// Returns the [`NodeIndex`] of the immediate children of a node, in the order they were added.
    pub fn get_children_indices(&self, node_index: &NodeIndex) -> Result<Vec<NodeIndex>, Report> {
        self.get_node(node_index)?;
        let mut children = self.graph.neighbors_directed(*node_index, Direction::Outgoing).collect_vec();
        // children order is last added to first added, reverse this
        children.reverse();
        Ok(children)
    }

    /// Returns immediate child nodes (`N`) of the requested node (`N`).
    ///
    /// ## Examples
    ///
    /// ```rust
    /// use tipsample_phylo::{Branch, FromNewick, Node, Phylogeny};
    /// let phylo: Phylogeny<Node, Branch> = Phylogeny::from_newick("((A,B)C,D)E;")?;
    /// let c = phylo.get_children(&Node::new("E"))?;
    /// assert_eq!(c, [&Node::new("C"), &Node::new("D")]);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn get_children(&self, node: &N) -> Result<Vec<&N>, Report> {
        let node_index = self.get_node_index(node)?;
        self.get_children_indices(&node_index)?.iter().map(|i| self.get_node(i)).collect()
    }

    /// Returns the node (`N`) that corresponds to the [`NodeIndex`].
    pub fn get_node(&self, node_index: &NodeIndex) -> Result<&N, Report> {
        self.graph
            .node_weight(*node_index)
            .ok_or_else(|| eyre!("Failed to get node data for node index {node_index:?}"))
    }

    /// Returns a mutable reference to the node (`N`) that corresponds to the [`NodeIndex`].
    pub fn get_node_mut(&mut self, node_index: &NodeIndex) -> Result<&mut N, Report> {
        self.graph
            .node_weight_mut(*node_index)
            .ok_or_else(|| eyre!("Failed to get node data for node index {node_index:?}"))
    }

    /// Returns the node index that corresponds to the node data.
    ///
    /// If several nodes are equal, the first one added is returned.
    pub fn get_node_index(&self, node: &N) -> Result<NodeIndex, Report> {
        self.graph
            .node_references()
            .filter_map(|(i, n)| (*n == *node).then_some(i))
            .next()
            .ok_or_else(|| eyre!("Failed to get node index of node {node}"))
    }

    /// Returns all nodes (`N`) in the [`Phylogeny`], in preorder from the root.
    ///
    /// ## Examples
    ///
    /// ```rust
    /// use tipsample_phylo::{Branch, FromNewick, Node, Phylogeny};
    /// let phylo: Phylogeny<Node, Branch> = Phylogeny::from_newick("((A,B)C,(D,E)F)G;")?;
    /// let names: Vec<_> = phylo.get_nodes()?.into_iter().map(|n| n.name.as_str()).collect();
    /// assert_eq!(names, ["G", "C", "A", "B", "F", "D", "E"]);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn get_nodes(&self) -> Result<Vec<&N>, Report> {
        self.get_preorder()?.iter().map(|i| self.get_node(i)).collect()
    }

    /// Returns the [`NodeIndex`] of all nodes in preorder (parents before children) from the root.
    pub fn get_preorder(&self) -> Result<Vec<NodeIndex>, Report> {
        let mut order = Vec::with_capacity(self.graph.node_count());
        let mut stack = vec![self.get_root_index()?];
        while let Some(node_index) = stack.pop() {
            order.push(node_index);
            // push in reverse so the first child is visited first
            stack.extend(self.get_children_indices(&node_index)?.into_iter().rev());
        }
        Ok(order)
    }

    /// Returns the [`NodeIndex`] of all nodes in level order (breadth-first) from the root.
    ///
    /// ```rust
    /// use tipsample_phylo::{Branch, FromNewick, Node, Phylogeny};
    /// let phylo: Phylogeny<Node, Branch> = Phylogeny::from_newick("((A,B)C,(D,E)F)G;")?;
    /// let names = phylo
    ///     .get_levelorder()?
    ///     .iter()
    ///     .map(|i| Ok(phylo.get_node(i)?.name.as_str()))
    ///     .collect::<Result<Vec<_>, color_eyre::eyre::Report>>()?;
    /// assert_eq!(names, ["G", "C", "F", "A", "B", "D", "E"]);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn get_levelorder(&self) -> Result<Vec<NodeIndex>, Report> {
        let mut order = Vec::with_capacity(self.graph.node_count());
        let mut queue = VecDeque::from([self.get_root_index()?]);
        while let Some(node_index) = queue.pop_front() {
            order.push(node_index);
            queue.extend(self.get_children_indices(&node_index)?);
        }
        Ok(order)
    }

    /// Returns the [`NodeIndex`] of the parent of a node, [`None`] for the root.
    pub fn get_parent_index(&self, node_index: &NodeIndex) -> Result<Option<NodeIndex>, Report> {
        self.get_node(node_index)?;
        Ok(self.graph.neighbors_directed(*node_index, Direction::Incoming).next())
    }

    pub fn get_root(&self) -> Result<&N, Report> {
        let root_index = self.get_root_index()?;
        self.get_node(&root_index)
    }

    pub fn get_root_index(&self) -> Result<NodeIndex, Report> {
        if self.is_empty() {
            Err(eyre!("Failed to locate root node index in phylogeny as graph is empty!."))?
        }

        // get all nodes with no parents, could be root
        let root_indices: Vec<_> = self
            .graph
            .node_indices()
            .filter(|i| 0 == self.graph.edges_directed(*i, Direction::Incoming).count())
            .collect();

        match root_indices.len() {
            0 => Err(eyre!("Failed to locate root node index in phylogeny."))?,
            1 => Ok(root_indices[0]),
            _ => Err(eyre!("Failed to locate root node index in phylogeny, multiple roots found: {root_indices:?}"))?
        }
    }

    /// Returns the [`NodeIndex`] of all tips (nodes without children), in preorder.
    pub fn get_tip_indices(&self) -> Result<Vec<NodeIndex>, Report> {
        let tips = self.get_preorder()?.into_iter().filter(|i| self.is_tip(i)).collect();
        Ok(tips)
    }

    /// Returns all tip nodes (`N`), in preorder.
    ///
    /// ```rust
    /// use tipsample_phylo::{Branch, FromNewick, Node, Phylogeny};
    /// let phylo: Phylogeny<Node, Branch> = Phylogeny::from_newick("((A,B)C,D)E;")?;
    /// assert_eq!(phylo.get_tips()?, [&Node::new("A"), &Node::new("B"), &Node::new("D")]);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn get_tips(&self) -> Result<Vec<&N>, Report> {
        self.get_tip_indices()?.iter().map(|i| self.get_node(i)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn is_tip(&self, node_index: &NodeIndex) -> bool {
        self.graph.neighbors_directed(*node_index, Direction::Outgoing).next().is_none()
    }

    /// Returns a copy of the clade below (and including) a node, rooted at that node.
    ///
    /// ```rust
    /// use tipsample_phylo::{Branch, FromNewick, Node, Phylogeny, ToNewick};
    /// let phylo: Phylogeny<Node, Branch> = Phylogeny::from_newick("((A:1,B:2)C:3,D:4)E;")?;
    /// let c = phylo.get_node_index(&Node::new("C"))?;
    /// assert_eq!(phylo.get_subtree(&c)?.to_newick()?, "(A:1,B:2)C:0;");
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn get_subtree(&self, node_index: &NodeIndex) -> Result<Phylogeny<N, B>, Report>
    where
        B: Clone,
    {
        let mut subtree = Phylogeny::new();
        let root = subtree.add_node(self.get_node(node_index)?.clone());
        self.copy_children(node_index, &mut subtree, &root)?;
        Ok(subtree)
    }

    /// Attaches a copy of another [`Phylogeny`] below a parent node, connected by a branch (`B`).
    ///
    /// Returns the [`NodeIndex`] of the grafted root.
    ///
    /// ```rust
    /// use tipsample_phylo::{Branch, FromNewick, Node, Phylogeny, ToNewick};
    /// let clade: Phylogeny<Node, Branch> = Phylogeny::from_newick("(A:1,B:2)C;")?;
    /// let mut phylo: Phylogeny<Node, Branch> = Phylogeny::new();
    /// let stem = phylo.add_node(Node::new("stem"));
    /// phylo.graft(&stem, &clade, Branch { length: 0.5 })?;
    /// assert_eq!(phylo.to_newick()?, "((A:1,B:2)C:0.5)stem:0;");
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn graft(
        &mut self,
        parent: &NodeIndex,
        clade: &Phylogeny<N, B>,
        branch: B,
    ) -> Result<NodeIndex, Report>
    where
        B: Clone,
    {
        let clade_root = clade.get_root_index()?;
        let grafted = self.add_child(parent, clade.get_node(&clade_root)?.clone(), branch)?;
        clade.copy_children(&clade_root, self, &grafted)?;
        Ok(grafted)
    }

    /// Copy the descendants of `source` into `target` below `parent`.
    fn copy_children(
        &self,
        source: &NodeIndex,
        target: &mut Phylogeny<N, B>,
        parent: &NodeIndex,
    ) -> Result<(), Report>
    where
        B: Clone,
    {
        let mut stack = vec![(*source, *parent)];
        while let Some((source, parent)) = stack.pop() {
            for child in self.get_children_indices(&source)? {
                let node = self.get_node(&child)?.clone();
                let copied = target.add_child(&parent, node, self.branch_or_err(&child)?)?;
                stack.push((child, copied));
            }
        }
        Ok(())
    }

    /// Returns a new [`Phylogeny`] with only the tips that satisfy the predicate.
    ///
    /// - Internal nodes left without tips are removed.
    /// - Internal nodes that lost all but one child are merged into that child, summing the branches.
    /// - If the root lost all but one child, that child becomes the new root.
    /// - Nodes that had a single child to begin with are kept.
    /// - If no tips are kept, returns an Error.
    ///
    /// ## Examples
    ///
    /// ```rust
    /// use tipsample_phylo::{Branch, FromNewick, Node, Phylogeny, ToNewick};
    /// let phylo: Phylogeny<Node, Branch> = Phylogeny::from_newick("((A:1,B:2)C:3,(D:4,E:5)F:6)G;")?;
    ///
    /// let pruned = phylo.retain_tips(|n| n.name != "B")?;
    /// assert_eq!(pruned.to_newick()?, "(A:4,(D:4,E:5)F:6)G:0;");
    ///
    /// // the root collapses into its only remaining child
    /// let pruned = phylo.retain_tips(|n| n.name == "D" || n.name == "E")?;
    /// assert_eq!(pruned.to_newick()?, "(D:4,E:5)F:0;");
    ///
    /// assert!(phylo.retain_tips(|_| false).is_err());
    ///
    /// // a stem above the clade is only merged when the clade loses a tip
    /// let stemmed: Phylogeny<Node, Branch> = Phylogeny::from_newick("((A:1,B:1)C:2)stem;")?;
    /// assert_eq!(stemmed.retain_tips(|_| true)?.to_newick()?, "((A:1,B:1)C:2)stem:0;");
    /// assert_eq!(stemmed.retain_tips(|n| n.name == "A")?.to_newick()?, "(A:3)stem:0;");
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn retain_tips<F>(&self, keep: F) -> Result<Phylogeny<N, B>, Report>
    where
        B: Clone + Add<Output = B>,
        F: Fn(&N) -> bool,
    {
        // nodes with at least one retained tip below them, filled from the tips up
        let mut retained: HashSet<NodeIndex> = HashSet::new();
        for node_index in self.get_preorder()?.into_iter().rev() {
            let keep_node = match self.is_tip(&node_index) {
                true => keep(self.get_node(&node_index)?),
                false => self.get_children_indices(&node_index)?.iter().any(|c| retained.contains(c)),
            };
            if keep_node {
                retained.insert(node_index);
            }
        }

        let root = self.get_root_index()?;
        if !retained.contains(&root) {
            return Err(eyre!("Failed to prune phylogeny, no tips were retained."));
        }

        // source node, with the retained ancestor in `pruned` and the branch accumulated since it
        let mut pruned = Phylogeny::new();
        let mut stack: Vec<(NodeIndex, Option<(NodeIndex, B)>)> = vec![(root, None)];
        while let Some((node_index, parent)) = stack.pop() {
            let children = self.get_children_indices(&node_index)?;
            let kept = children.iter().filter(|c| retained.contains(*c)).copied().collect_vec();

            if kept.len() == 1 && children.len() > 1 {
                let parent = match parent {
                    Some((p, branch)) => Some((p, branch + self.branch_or_err(&kept[0])?)),
                    // the root is dropped, the child's own branch is dropped with it
                    None => None,
                };
                stack.push((kept[0], parent));
                continue;
            }

            let placed = self.place(self.get_node(&node_index)?, &mut pruned, parent)?;
            // reversed, so that children are placed in order
            for child in kept.into_iter().rev() {
                stack.push((child, Some((placed, self.branch_or_err(&child)?))));
            }
        }

        Ok(pruned)
    }

    /// Add a node to `target`, below `parent` if there is one, otherwise as the root.
    fn place(
        &self,
        node: &N,
        target: &mut Phylogeny<N, B>,
        parent: Option<(NodeIndex, B)>,
    ) -> Result<NodeIndex, Report> {
        match parent {
            Some((p, branch)) => target.add_child(&p, node.clone(), branch),
            None => Ok(target.add_node(node.clone())),
        }
    }

    fn branch_or_err(&self, node_index: &NodeIndex) -> Result<B, Report>
    where
        B: Clone,
    {
        self.get_branch(node_index)?
            .cloned()
            .ok_or_else(|| eyre!("Failed to get branch into node index {node_index:?}"))
    }

    /// Write the Newick string of the whole tree, with `annotate` appended after each branch.
    fn write_newick<F>(&self, annotate: &F) -> Result<String, Report>
    where
        N: ToNewick,
        B: Default + ToNewick,
        F: Fn(&N) -> String,
    {
        let label = |node_index: &NodeIndex| -> Result<String, Report> {
            let node = self.get_node(node_index)?;
            let branch = match self.get_branch(node_index)? {
                Some(branch) => branch.to_newick()?,
                None => B::default().to_newick()?,
            };
            Ok(format!("{}{branch}{}", node.to_newick()?, annotate(node)))
        };

        let mut newick = String::new();
        let mut stack = vec![Visit::Enter(self.get_root_index()?)];
        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(node_index) => {
                    let children = self.get_children_indices(&node_index)?;
                    if children.is_empty() {
                        newick.push_str(&label(&node_index)?);
                        continue;
                    }
                    newick.push('(');
                    stack.push(Visit::Exit(node_index));
                    // reversed, so that children are written in order
                    for (i, child) in children.into_iter().enumerate().rev() {
                        stack.push(Visit::Enter(child));
                        if i > 0 {
                            stack.push(Visit::Separator);
                        }
                    }
                }
                Visit::Separator => newick.push(','),
                Visit::Exit(node_index) => {
                    newick.push(')');
                    newick.push_str(&label(&node_index)?);
                }
            }
        }

        Ok(newick)
    }
}

/// Steps of the Newick writer walk.
enum Visit {
    Enter(NodeIndex),
    Separator,
    Exit(NodeIndex),
}

impl Phylogeny<Node, Branch> {
    /// Returns the Newick string of the phylogeny, with the requested NHX features of every node.
    ///
    /// ```rust
    /// use tipsample_phylo::{Branch, FromNewick, Node, Phylogeny};
    /// let phylo: Phylogeny<Node, Branch> =
    ///     Phylogeny::from_newick("(A:1[&&NHX:date=2001:state=High],B:2[&&NHX:date=2002])C[&&NHX:date=2000];")?;
    /// assert_eq!(
    ///     phylo.to_nhx(&["date"])?,
    ///     "(A:1[&&NHX:date=2001],B:2[&&NHX:date=2002])C:0[&&NHX:date=2000];"
    /// );
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn to_nhx(&self, features: &[&str]) -> Result<String, Report> {
        let newick = self.write_newick(&|node: &Node| node.to_nhx(features))?;
        Ok(format!("{newick};"))
    }
}

impl<N, B> FromNewick for Phylogeny<N, B>
where
    N: Clone + Debug + Display + Eq + Hash + PartialEq + FromNewick,
    B: AsPrimitive<f64> + Debug + Display + FromNewick,
{
    fn from_newick(newick: &str) -> Result<Phylogeny<N, B>, Report> {
        newick::str_to_phylogeny(newick)
    }
}

impl<N, B> ToNewick for Phylogeny<N, B>
where
    N: Clone + Debug + Display + Eq + Hash + PartialEq + ToNewick,
    B: AsPrimitive<f64> + Debug + Display + Default + ToNewick,
{
    fn to_newick(&self) -> Result<String, Report> {
        let newick = self.write_newick(&|_: &N| String::new())?;
        Ok(format!("{newick};"))
    }
}
