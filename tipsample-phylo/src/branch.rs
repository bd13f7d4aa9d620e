use crate::{FromNewick, ToNewick};

use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use num_traits::AsPrimitive;
use std::default::Default;
use std::fmt::{Display, Formatter};
use std::ops::Add;

/// A [`Branch`] in the [`Phylogeny`](crate::Phylogeny), leading into a child node.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Branch {
    /// [`Branch`] length (ex. 0.25 years).
    pub length: f64,
}

#[rustfmt::skip]
impl AsPrimitive<f64> for Branch { fn as_(self) -> f64 { self.length } }
#[rustfmt::skip]
impl Default for Branch { fn default() -> Self { Self::new() } }
#[rustfmt::skip]
impl Display for Branch { fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.length) } }
#[rustfmt::skip]
impl Branch { pub fn new() -> Self { Branch { length: 0.0 } } }
#[rustfmt::skip]
impl Add for Branch { type Output = Branch; fn add(self, other: Branch) -> Branch { Branch { length: self.length + other.length } } }

impl FromNewick for Branch {
    /// Returns a [`Branch`] created from a [Newick](https://en.wikipedia.org/wiki/Newick_format) node [`str`].
    ///
    /// # Examples
    ///
    /// Just a node name, the length defaults to zero.
    ///
    /// ```rust
    /// use tipsample_phylo::{Branch, FromNewick};
    ///
    /// let branch = Branch::from_newick(&"A")?;
    /// assert_eq!(branch, Branch { length: 0.0 });
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    ///
    /// A node name and branch length.
    ///
    /// ```rust
    /// # use tipsample_phylo::{Branch, FromNewick};
    /// let branch = Branch::from_newick(&"A:2.5")?;
    /// assert_eq!(branch, Branch { length: 2.5 });
    /// let branch = Branch::from_newick(&":1e-3")?;
    /// assert_eq!(branch, Branch { length: 0.001 });
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    fn from_newick(newick: &str) -> Result<Branch, Report> {
        let attributes: Vec<_> = newick.replace(';', "").split(':').map(String::from).collect();
        let length = match attributes.len() >= 2 && !attributes[1].trim().is_empty() {
            true => attributes[1]
                .trim()
                .parse()
                .wrap_err_with(|| eyre!("Failed to parse branch length from newick: {newick}"))?,
            false => 0.0,
        };

        Ok(Branch { length })
    }
}

impl ToNewick for Branch {
    /// Returns the branch length as a Newick suffix.
    ///
    /// ```rust
    /// use tipsample_phylo::{Branch, ToNewick};
    /// assert_eq!(Branch { length: 0.5 }.to_newick()?, ":0.5");
    /// assert_eq!(Branch { length: 2.0 }.to_newick()?, ":2");
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    fn to_newick(&self) -> Result<String, Report> {
        Ok(format!(":{}", self.length))
    }
}
