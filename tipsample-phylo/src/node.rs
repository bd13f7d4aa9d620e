use crate::{FromNewick, ToNewick};
use color_eyre::eyre::{eyre, Report, Result};
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet};
use std::default::Default;
use std::fmt::{Display, Formatter};
use std::hash::Hash;

/// Characters that force a Newick label to be quoted.
const NEWICK_METACHARACTERS: &[char] = &['(', ')', '[', ']', '\'', ':', ';', ',', ' ', '\t'];

/// Separator between the values of a multi-valued feature (ex. `High|Low`).
pub const VALUE_SEPARATOR: char = '|';

/// A [`Node`] in the [`Phylogeny`](crate::Phylogeny) graph.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Node {
    /// [`Node`] name, empty when the Newick node was unnamed.
    pub name: String,
    /// [NHX](https://en.wikipedia.org/wiki/Newick_format#New_Hampshire_X_format) features (ex. `date=2001.5`).
    pub features: BTreeMap<String, String>,
}

#[rustfmt::skip]
impl Display for Node { fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.name) } }

impl Node {
    /// Returns a [`Node`] with a name and no features.
    pub fn new(name: &str) -> Self {
        Node { name: name.to_string(), features: BTreeMap::new() }
    }

    /// Returns the raw value of a feature, if present.
    pub fn get_feature(&self, key: &str) -> Option<&str> {
        self.features.get(key).map(String::as_str)
    }

    pub fn set_feature(&mut self, key: &str, value: impl ToString) {
        self.features.insert(key.to_string(), value.to_string());
    }

    pub fn remove_feature(&mut self, key: &str) -> Option<String> {
        self.features.remove(key)
    }

    /// Returns the set of labels stored under a feature key.
    ///
    /// A multi-valued feature (`High|Low`) yields several labels, a missing or empty
    /// feature yields none.
    ///
    /// ## Examples
    ///
    /// ```rust
    /// use tipsample_phylo::{Node, FromNewick};
    /// let node = Node::from_newick("A[&&NHX:state=High|Low:country=]")?;
    /// assert_eq!(node.get_labels("state").into_iter().collect::<Vec<_>>(), ["High", "Low"]);
    /// assert!(node.get_labels("country").is_empty());
    /// assert!(node.get_labels("missing").is_empty());
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn get_labels(&self, key: &str) -> BTreeSet<&str> {
        self.get_feature(key)
            .map(|value| {
                value.split(VALUE_SEPARATOR).map(str::trim).filter(|v| !v.is_empty()).collect()
            })
            .unwrap_or_default()
    }

    /// Returns the requested features as an NHX comment, or an empty string if none are present.
    ///
    /// ```rust
    /// use tipsample_phylo::{Node, FromNewick};
    /// let node = Node::from_newick("A[&&NHX:date=2001.5:state=High:date_CI=2001|2002]")?;
    /// assert_eq!(node.to_nhx(&["date", "date_CI"]), "[&&NHX:date=2001.5:date_CI=2001|2002]");
    /// assert_eq!(node.to_nhx(&["missing"]), "");
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn to_nhx(&self, features: &[&str]) -> String {
        let pairs = features
            .iter()
            .filter_map(|key| self.features.get(*key).map(|value| format!("{key}={value}")))
            .collect_vec();
        match pairs.is_empty() {
            true => String::new(),
            false => format!("[&&NHX:{}]", pairs.join(":")),
        }
    }
}

impl FromNewick for Node {
    /// Returns a [`Node`] created from a [Newick](https://en.wikipedia.org/wiki/Newick_format) node [`str`].
    ///
    /// ## Examples
    ///
    /// Just a node name.
    ///
    /// ```rust
    /// use tipsample_phylo::{Node, FromNewick};
    /// let node = Node::from_newick(&"A;")?;
    /// assert_eq!(node, Node::new("A"));
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    ///
    /// A quoted node name, branch length, and NHX features.
    ///
    /// ```rust
    /// use tipsample_phylo::{Node, FromNewick};
    /// let node = Node::from_newick(&"'tip ''1'''[&&NHX:date=2001.5]:2")?;
    /// assert_eq!(node.name, "tip '1'");
    /// assert_eq!(node.get_feature("date"), Some("2001.5"));
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    fn from_newick(newick: &str) -> Result<Self, Report> {
        let newick = newick.trim().trim_end_matches(';');
        let mut node = Node::default();

        // separate bracketed comments from the label
        let mut label = String::new();
        let mut comment = String::new();
        let mut in_comment = false;
        let mut in_quote = false;
        for c in newick.chars() {
            match c {
                '\'' if !in_comment => {
                    in_quote = !in_quote;
                    label.push(c);
                }
                '[' if !in_quote => in_comment = true,
                ']' if !in_quote => {
                    in_comment = false;
                    parse_nhx(&comment, &mut node.features);
                    comment.clear();
                }
                _ if in_comment => comment.push(c),
                _ => label.push(c),
            }
        }
        if in_comment || in_quote {
            return Err(eyre!("Failed to create Node from newick string, unterminated comment or quote: {newick}"));
        }

        // the name ends at the first branch length separator outside of quotes
        let mut in_quote = false;
        let end = label
            .char_indices()
            .find(|(_, c)| {
                if *c == '\'' {
                    in_quote = !in_quote;
                }
                *c == ':' && !in_quote
            })
            .map(|(i, _)| i)
            .unwrap_or(label.len());
        node.name = unquote(label[..end].trim());

        Ok(node)
    }
}

impl ToNewick for Node {
    /// Returns the node name, quoted when it contains Newick metacharacters.
    ///
    /// ```rust
    /// use tipsample_phylo::{Node, ToNewick};
    /// assert_eq!(Node::new("A").to_newick()?, "A");
    /// assert_eq!(Node::new("tip 1").to_newick()?, "'tip 1'");
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    fn to_newick(&self) -> Result<String, Report> {
        match self.name.contains(NEWICK_METACHARACTERS) {
            true => Ok(format!("'{}'", self.name.replace('\'', "''"))),
            false => Ok(self.name.clone()),
        }
    }
}

/// Parse the content of an NHX comment (`&&NHX:k=v:k=v`) into features.
///
/// Comments that are not NHX are ignored.
fn parse_nhx(comment: &str, features: &mut BTreeMap<String, String>) {
    let Some(content) = comment.trim().strip_prefix("&&NHX") else { return };
    content.split(':').filter(|kv| !kv.is_empty()).for_each(|kv| {
        let (key, value) = kv.split_once('=').unwrap_or((kv, ""));
        features.insert(key.trim().to_string(), value.trim().to_string());
    });
}

/// Remove surrounding single quotes, collapsing escaped ('') quotes.
fn unquote(label: &str) -> String {
    match label.len() >= 2 && label.starts_with('\'') && label.ends_with('\'') {
        true => label[1..label.len() - 1].replace("''", "'"),
        false => label.to_string(),
    }
}
