use crate::utils;
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use itertools::Itertools;
use std::default::Default;
use std::fmt::{Debug, Display};
use std::path::Path;

/// A row-based [`Table`] of generic data, for summaries written next to the outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Table<T> {
    /// Names of the table columns.
    pub headers: Vec<T>,
    /// Rows of table values.
    pub rows: Vec<Vec<T>>,
}

impl<T> Default for Table<T>
where
    T: Display,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Table<T>
where
    T: Display,
{
    pub fn new() -> Self {
        Table { headers: Vec::new(), rows: Vec::new() }
    }

    /// Add a new row to the table.
    ///
    /// Returns an Error if the row length doesn't match the headers.
    ///
    /// ```rust
    /// let mut table = tipsample::Table::new();
    /// table.headers = vec!["state", "year"];
    /// table.add_row(["High", "2001"])?;
    /// assert!(table.add_row(["Low"]).is_err());
    /// # assert_eq!(table.rows, [["High", "2001"]]);
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn add_row<I>(&mut self, row: I) -> Result<(), Report>
    where
        I: IntoIterator<Item = T>,
    {
        let row = row.into_iter().collect_vec();
        if row.len() != self.headers.len() {
            return Err(eyre!(
                "New row size ({}) does not match the table headers ({}).",
                row.len(),
                self.headers.len()
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Write to a delimited file, the delimiter is chosen from the extension.
    pub fn write<P>(&self, path: &P) -> Result<(), Report>
    where
        P: AsRef<Path> + Debug,
    {
        // Parse line delimiter from file extension
        let delim = utils::get_delimiter(path)?.to_string();

        let mut output = format!("{}\n", self.headers.iter().join(&delim));
        for row in &self.rows {
            output.push_str(&format!("{}\n", row.iter().join(&delim)));
        }

        utils::write_file(path, &output).wrap_err_with(|| format!("Unable to write table: {path:?}"))
    }

    /// Convert table to markdown format
    pub fn to_markdown(&self) -> Result<String, Report> {
        // get the maximum width of each column, +2 to add space on either side
        let col_widths = self
            .headers
            .iter()
            .enumerate()
            .map(|(col_i, header)| {
                self.rows
                    .iter()
                    .map(|row| row[col_i].to_string().len())
                    .chain([header.to_string().len()])
                    .max()
                    .unwrap_or_default()
                    + 2
            })
            .collect_vec();

        let line = |cells: &[T]| {
            let cells = cells
                .iter()
                .zip(col_widths.iter())
                .map(|(cell, &width)| format!("{:^width$}", cell.to_string()))
                .join("|");
            format!("|{cells}|\n")
        };

        let mut markdown = line(&self.headers);
        // frame in between headers and rows
        let frame = col_widths.iter().map(|width| "-".repeat(*width)).join("|");
        markdown.push_str(&format!("|{frame}|\n"));
        self.rows.iter().for_each(|row| markdown.push_str(&line(row)));

        Ok(markdown)
    }
}
