//! Subsample tips so that every state is equally represented, balancing the years within each state.

#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::dates::{self, annotate_dates, DATE, DATE_CI};
use crate::utils::{self, table::Table};
use clap::Parser;
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use itertools::Itertools;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tipsample_phylo::{Branch, Node, Phylogeny};

// ----------------------------------------------------------------------------
// Args

/// Subsample a dated tree so that every state has the same number of tips.
#[derive(Clone, Debug, Deserialize, Parser, Serialize)]
#[clap(verbatim_doc_comment)]
pub struct Args {
    /// Input tree (Newick), with tips annotated with states and dates (NHX).
    #[clap(short = 't', long, required = true)]
    pub tree: PathBuf,

    /// Output subsampled tree.
    #[clap(short = 'o', long, required = true)]
    pub output: PathBuf,

    /// Sampling config (JSON), the options below override its values.
    #[clap(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// NHX feature holding the tip states.
    #[clap(long)]
    pub column: Option<String>,

    /// States whose earliest sampling year marks the onset year.
    #[clap(long, value_delimiter = ',')]
    pub reference_states: Option<Vec<String>>,

    /// State sampled preferentially from the onset year onwards.
    #[clap(long, conflicts_with = "no_special_state")]
    pub special_state: Option<String>,

    /// Sample every state the same way, without a special state.
    #[clap(long)]
    pub no_special_state: bool,

    /// Date of the root, used when the root has no date annotation.
    #[clap(long)]
    pub root_date: Option<f64>,

    /// Seed for the random number generator, for reproducible subsamples.
    #[clap(short = 's', long)]
    pub seed: Option<u64>,

    /// NHX features written to the output tree.
    #[clap(long, value_delimiter = ',', default_values_t = [DATE.to_string(), DATE_CI.to_string()])]
    pub features: Vec<String>,

    /// Optional table (.tsv or .csv) of available and sampled tips per state and year.
    #[clap(long)]
    pub summary: Option<PathBuf>,
}

impl Args {
    /// Returns the sampling [`Config`], from the config file (or default) with command-line overrides.
    pub fn get_config(&self) -> Result<Config, Report> {
        let mut config = match &self.config {
            Some(path) => Config::read(path)?,
            None => Config::default(),
        };
        if let Some(column) = &self.column {
            config.column = column.clone();
        }
        if let Some(reference_states) = &self.reference_states {
            config.reference_states = reference_states.clone();
        }
        if let Some(special_state) = &self.special_state {
            config.special_state = Some(special_state.clone());
        }
        if self.no_special_state {
            config.special_state = None;
        }
        config.validate()?;
        Ok(config)
    }
}

// ----------------------------------------------------------------------------
// Pools

/// Tips of one state, grouped by year.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatePool {
    /// Tip names of each year bucket.
    pub years: BTreeMap<i64, Vec<String>>,
}

impl StatePool {
    pub fn add(&mut self, year: i64, tip: &str) {
        self.years.entry(year).or_default().push(tip.to_string());
    }

    /// Total number of tips over all years.
    pub fn total(&self) -> usize {
        self.years.values().map(Vec::len).sum()
    }

    pub fn min_year(&self) -> Option<i64> {
        self.years.keys().next().copied()
    }

    /// Number of tips in each year bucket, in year order.
    pub fn counts(&self) -> Vec<(i64, usize)> {
        self.years.iter().map(|(year, tips)| (*year, tips.len())).collect()
    }
}

/// Tips eligible for sampling, by state and then by year.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pools {
    pub states: BTreeMap<String, StatePool>,
    /// Number of tips without exactly one state.
    pub excluded: usize,
}

impl Pools {
    /// Group the tips with exactly one state by state and year of their date.
    ///
    /// Tips with no state or several states are excluded. The tree must have been dated
    /// (see [`annotate_dates`]).
    pub fn from_phylogeny(phylo: &Phylogeny<Node, Branch>, column: &str) -> Result<Pools, Report> {
        let mut pools = Pools::default();
        let mut seen = BTreeSet::new();

        for tip in phylo.get_tips()? {
            let labels = tip.get_labels(column);
            let Some(state) = labels.iter().exactly_one().ok() else {
                pools.excluded += 1;
                continue;
            };
            if tip.name.is_empty() {
                return Err(eyre!("Found an unnamed tip with state {state:?}."))
                    .suggestion("Name the tips first, for example with: tipsample name");
            }
            if !seen.insert(tip.name.as_str()) {
                warn!("Tip name {:?} is not unique, its copies are sampled together.", tip.name);
            }
            let year = dates::get_date(tip)?.trunc() as i64;
            pools.states.entry(state.to_string()).or_default().add(year, &tip.name);
        }

        // tree order does not matter
        pools.states.values_mut().flat_map(|pool| pool.years.values_mut()).for_each(|tips| tips.sort());

        debug!(
            "Built pools of {} states, excluded {} tips without exactly one {column:?} state.",
            pools.states.len(),
            pools.excluded
        );
        Ok(pools)
    }

    /// Returns the number of tips to sample from every state: the size of the smallest state pool.
    pub fn target_size(&self) -> Result<usize, Report> {
        self.states
            .values()
            .map(StatePool::total)
            .min()
            .filter(|size| *size > 0)
            .ok_or_else(|| eyre!("No tips with exactly one state were found, there is nothing to balance."))
            .suggestion("Check that the state column is annotated on the tips.")
    }

    /// Returns the earliest year in which any of the reference states has a tip.
    ///
    /// Every reference state must have at least one tip.
    pub fn onset_year(&self, reference_states: &[String]) -> Result<i64, Report> {
        if reference_states.is_empty() {
            return Err(eyre!("No reference states were configured to compute the onset year."));
        }
        reference_states
            .iter()
            .map(|state| {
                self.states.get(state).and_then(StatePool::min_year).ok_or_else(|| {
                    eyre!("Reference state {state:?} has no tips with exactly one state.")
                        .suggestion(format!(
                            "Observed states: {}",
                            self.states.keys().map(|s| format!("{s:?}")).join(", ")
                        ))
                })
            })
            .collect::<Result<Vec<_>, Report>>()
            .map(|years| years.into_iter().min().unwrap_or_default())
    }
}

// ----------------------------------------------------------------------------
// Sampling

/// Returns how many tips to take from each year bucket to fill a quota.
///
/// Buckets are visited from the smallest to the largest (ties by year). Each bucket is asked
/// for an even share of the remaining quota over the remaining buckets, rounded half to even,
/// and gives at most what it has. A shortfall left by small buckets is not made up afterwards.
///
/// ## Examples
///
/// ```rust
/// use tipsample::sample::allocate;
///
/// assert_eq!(allocate(&[(2002, 7), (2000, 3)], 10), [(2000, 3), (2002, 7)]);
/// // 10 / 3 rounds to 3 for the first bucket, which only has one tip
/// assert_eq!(allocate(&[(2000, 1), (2001, 20), (2002, 20)], 9), [(2000, 1), (2001, 4), (2002, 4)]);
/// ```
pub fn allocate(buckets: &[(i64, usize)], quota: usize) -> Vec<(i64, usize)> {
    let buckets = buckets.iter().copied().sorted_by_key(|(year, available)| (*available, *year)).collect_vec();
    let n = buckets.len();
    let mut left = quota;

    buckets
        .into_iter()
        .enumerate()
        .map(|(i, (year, available))| {
            let like_to_take = (left as f64 / (n - i) as f64).round_ties_even() as usize;
            let can_take = like_to_take.min(available);
            left -= can_take;
            (year, can_take)
        })
        .collect()
}

/// Draw the tips of one state.
///
/// With an `onset` year (special state only), tips from the onset year onwards are preferred:
/// if they alone fill the quota only they are sampled, otherwise they are all taken and the
/// rest of the quota is sampled from the earlier years.
pub fn draw_state<R>(pool: &StatePool, size: usize, onset: Option<i64>, rng: &mut R) -> Vec<String>
where
    R: Rng + ?Sized,
{
    let mut drawn = Vec::new();
    let mut quota = size;
    let mut buckets = pool.counts();

    if let Some(onset) = onset {
        let not_before_onset: usize =
            buckets.iter().filter(|(year, _)| *year >= onset).map(|(_, n)| n).sum();
        if not_before_onset >= size {
            buckets.retain(|(year, _)| *year >= onset);
        } else {
            pool.years.range(onset..).for_each(|(_, tips)| drawn.extend(tips.iter().cloned()));
            quota -= not_before_onset;
            buckets.retain(|(year, _)| *year < onset);
        }
    }

    allocate(&buckets, quota).into_iter().filter(|(_, take)| *take > 0).for_each(|(year, take)| {
        if let Some(tips) = pool.years.get(&year) {
            drawn.extend(tips.choose_multiple(rng, take).cloned());
        }
    });

    drawn
}

/// A balanced selection of tips.
#[derive(Clone, Debug, PartialEq)]
pub struct Subsample {
    /// Number of tips requested from every state.
    pub size: usize,
    /// Earliest year of the reference states.
    pub onset_year: i64,
    /// Names of the selected tips.
    pub selected: BTreeSet<String>,
}

/// Select tips from every state pool, see [`draw_state`].
pub fn subsample<R>(pools: &Pools, config: &Config, rng: &mut R) -> Result<Subsample, Report>
where
    R: Rng + ?Sized,
{
    let size = pools.target_size()?;
    let onset_year = pools.onset_year(&config.reference_states)?;
    info!("Subsampling {size} tips of each state.");
    info!("Sampling in the reference states started in {onset_year}.");

    if let Some(special) = &config.special_state {
        if !pools.states.contains_key(special) {
            debug!("Special state {special:?} has no tips.");
        }
    }

    let mut selected = BTreeSet::new();
    for (state, pool) in &pools.states {
        let onset = (config.special_state.as_ref() == Some(state)).then_some(onset_year);
        let drawn = draw_state(pool, size, onset, rng);
        match drawn.len() < size {
            true => warn!(
                "State {state:?}: {} of {size} tips were drawn, some years had too few tips.",
                drawn.len()
            ),
            false => debug!("State {state:?}: {} of {} tips were drawn.", drawn.len(), pool.total()),
        }
        selected.extend(drawn);
    }

    Ok(Subsample { size, onset_year, selected })
}

/// Returns a table of available and sampled tips for every state and year.
pub fn summarize(pools: &Pools, selected: &BTreeSet<String>) -> Result<Table<String>, Report> {
    let mut table = Table::new();
    table.headers = ["state", "year", "available", "sampled"].map(String::from).to_vec();
    for (state, pool) in &pools.states {
        for (year, tips) in &pool.years {
            let sampled = tips.iter().filter(|tip| selected.contains(*tip)).count();
            table.add_row([state.clone(), year.to_string(), tips.len().to_string(), sampled.to_string()])?;
        }
    }
    Ok(table)
}

// ----------------------------------------------------------------------------
// Run

/// Subsample the input tree and write the pruned tree (and optional summary).
pub fn run(args: &Args) -> Result<Subsample, Report> {
    let config = args.get_config()?;
    debug!("Sampling config: {config:?}");

    let mut phylo = utils::read_tree(&args.tree)?;
    annotate_dates(&mut phylo, args.root_date)?;

    let pools = Pools::from_phylogeny(&phylo, &config.column)?;
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let subsample = subsample(&pools, &config, &mut rng)?;

    // a tip is kept only if it was drawn and has exactly one state
    let pruned = phylo
        .retain_tips(|n| subsample.selected.contains(&n.name) && n.get_labels(&config.column).len() == 1)
        .wrap_err("Failed to prune the tree to the subsampled tips.")?;
    let features = args.features.iter().map(String::as_str).collect_vec();
    let newick = pruned.to_nhx(&features)?;

    let table = summarize(&pools, &subsample.selected)?;
    debug!("Sampled tips per state and year:\n{}", table.to_markdown()?);

    utils::write_file(&args.output, &format!("{newick}\n"))?;
    info!("Wrote {} tips to: {:?}", pruned.get_tip_indices()?.len(), args.output);
    if let Some(path) = &args.summary {
        table.write(path)?;
        info!("Wrote sampling summary to: {path:?}");
    }

    Ok(subsample)
}
