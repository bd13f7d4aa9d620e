use crate::config::Config;
use crate::dates::annotate_dates;
use crate::sample::*;
use clap::Parser;
use color_eyre::eyre::{Report, Result};
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeSet;
use tempfile::TempDir;
use tipsample_phylo::{Branch, FromNewick, Node, Phylogeny};

/// A star tree of tips `(name, state, date)`, annotated in the `state` column.
fn star_tree(tips: &[(&str, &str, f64)]) -> Result<Phylogeny<Node, Branch>, Report> {
    let tips = tips
        .iter()
        .map(|(name, state, date)| format!("{name}:1[&&NHX:state={state}:date={date}]"))
        .join(",");
    let mut phylo = Phylogeny::from_newick(&format!("({tips})root;"))?;
    annotate_dates(&mut phylo, None)?;
    Ok(phylo)
}

/// `n` tips of a state in a year, named `{prefix}{year}_{i}`.
fn tips(prefix: &str, state: &'static str, year: i64, n: usize) -> Vec<(String, &'static str, f64)> {
    (0..n).map(|i| (format!("{prefix}{year}_{i}"), state, year as f64 + 0.5)).collect()
}

fn to_refs<'a>(tips: &'a [(String, &'static str, f64)]) -> Vec<(&'a str, &'a str, f64)> {
    tips.iter().map(|(name, state, date)| (name.as_str(), *state, *date)).collect()
}

fn config(reference_states: &[&str], special_state: Option<&str>) -> Config {
    Config {
        column: "state".to_string(),
        reference_states: reference_states.iter().map(|s| s.to_string()).collect(),
        special_state: special_state.map(String::from),
    }
}

fn count_prefix(selected: &BTreeSet<String>, prefix: &str) -> usize {
    selected.iter().filter(|tip| tip.starts_with(prefix)).count()
}

// ----------------------------------------------------------------------------
// Allocate

#[test]
fn allocate_even() {
    assert_eq!(allocate(&[(2000, 5), (2001, 5)], 10), [(2000, 5), (2001, 5)]);
}

#[test]
fn allocate_smallest_first() {
    assert_eq!(allocate(&[(2002, 7), (2000, 3)], 10), [(2000, 3), (2002, 7)]);
    // equal counts are visited in year order
    assert_eq!(allocate(&[(2005, 4), (2001, 4), (2003, 1)], 6), [(2003, 1), (2001, 2), (2005, 3)]);
}

#[test]
fn allocate_rounds_half_to_even() {
    // 5 / 2 = 2.5 rounds down to 2, the last bucket takes the remaining 3
    assert_eq!(allocate(&[(2000, 10), (2001, 10)], 5), [(2000, 2), (2001, 3)]);
    // 3 / 2 = 1.5 rounds up to 2
    assert_eq!(allocate(&[(2000, 10), (2001, 10)], 3), [(2000, 2), (2001, 1)]);
}

#[test]
fn allocate_shortfall() {
    // small buckets leave part of the quota unfilled
    let allocated = allocate(&[(2000, 1), (2001, 1)], 10);
    assert_eq!(allocated, [(2000, 1), (2001, 1)]);
    // but later buckets are asked for a share of what is left
    let allocated = allocate(&[(2000, 1), (2001, 20), (2002, 20)], 9);
    assert_eq!(allocated.iter().map(|(_, n)| n).sum::<usize>(), 9);
}

#[test]
fn allocate_empty() {
    assert!(allocate(&[], 10).is_empty());
    assert_eq!(allocate(&[(2000, 3)], 0), [(2000, 0)]);
}

// ----------------------------------------------------------------------------
// Pools

#[test]
fn pools_exclude_ambiguous() -> Result<(), Report> {
    let nwk = "(A:1[&&NHX:state=Low:date=2001.9],B:1[&&NHX:state=High|Low:date=2002],\
               C:1[&&NHX:date=2002],D:1[&&NHX:state=Low:date=2003.1],E:1[&&NHX:state=High:date=2003])root;";
    let mut phylo = Phylogeny::from_newick(nwk)?;
    annotate_dates(&mut phylo, None)?;
    let pools = Pools::from_phylogeny(&phylo, "state")?;

    assert_eq!(pools.excluded, 2);
    assert_eq!(pools.states.keys().collect_vec(), ["High", "Low"]);
    assert_eq!(pools.states["Low"].counts(), [(2001, 1), (2003, 1)]);
    assert_eq!(pools.states["High"].years[&2003], ["E"]);
    assert_eq!(pools.target_size()?, 1);
    Ok(())
}

#[test]
fn pools_inferred_dates() -> Result<(), Report> {
    // tip dates come from the root date and branch lengths
    let mut phylo = Phylogeny::from_newick("(A:1.5[&&NHX:state=Low],B:3[&&NHX:state=Low])root;")?;
    annotate_dates(&mut phylo, Some(2000.0))?;
    let pools = Pools::from_phylogeny(&phylo, "state")?;
    assert_eq!(pools.states["Low"].counts(), [(2001, 1), (2003, 1)]);
    Ok(())
}

#[test]
fn pools_ignore_tree_order() -> Result<(), Report> {
    let all = [tips("a", "A", 2000, 3), tips("b", "B", 2001, 2), tips("a", "A", 2002, 2)].concat();
    let forward = star_tree(&to_refs(&all))?;
    let reversed = all.iter().rev().cloned().collect_vec();
    let reversed = star_tree(&to_refs(&reversed))?;
    assert_eq!(Pools::from_phylogeny(&forward, "state")?, Pools::from_phylogeny(&reversed, "state")?);
    Ok(())
}

#[test]
fn pools_unnamed_tip() -> Result<(), Report> {
    let mut phylo = Phylogeny::from_newick("(A:1[&&NHX:state=Low],:1[&&NHX:state=Low])root;")?;
    annotate_dates(&mut phylo, None)?;
    assert!(Pools::from_phylogeny(&phylo, "state").is_err());
    Ok(())
}

#[test]
fn onset_year() -> Result<(), Report> {
    let phylo = star_tree(&[("A", "Low", 2012.2), ("B", "High", 2013.0), ("C", "External", 2001.0)])?;
    let pools = Pools::from_phylogeny(&phylo, "state")?;
    let reference = ["Low".to_string(), "High".to_string()];
    assert_eq!(pools.onset_year(&reference)?, 2012);

    let reference = ["Low".to_string(), "Medium".to_string()];
    assert!(pools.onset_year(&reference).is_err());
    assert!(pools.onset_year(&[]).is_err());
    Ok(())
}

#[test]
fn target_size_empty() {
    assert!(Pools::default().target_size().is_err());
}

// ----------------------------------------------------------------------------
// Subsample

#[test]
fn subsample_balanced() -> Result<(), Report> {
    let all = [tips("a", "A", 2000, 5), tips("a", "A", 2001, 5), tips("b", "B", 2000, 3), tips("b", "B", 2002, 7)]
        .concat();
    let phylo = star_tree(&to_refs(&all))?;
    let pools = Pools::from_phylogeny(&phylo, "state")?;
    let mut rng = StdRng::seed_from_u64(0);
    let subsample = subsample(&pools, &config(&["A", "B"], None), &mut rng)?;

    assert_eq!(subsample.size, 10);
    assert_eq!(subsample.onset_year, 2000);
    assert_eq!(subsample.selected.len(), 20);
    Ok(())
}

#[test]
fn subsample_years_balanced() -> Result<(), Report> {
    let all = [
        tips("a", "A", 2000, 4),
        tips("a", "A", 2001, 2),
        tips("a", "A", 2002, 20),
        tips("b", "B", 2000, 6),
    ]
    .concat();
    let phylo = star_tree(&to_refs(&all))?;
    let pools = Pools::from_phylogeny(&phylo, "state")?;
    let mut rng = StdRng::seed_from_u64(1);
    let subsample = subsample(&pools, &config(&["A", "B"], None), &mut rng)?;

    // 2001 (2 tips) takes round(6/3) = 2, 2000 takes round(4/2) = 2, 2002 takes the last 2
    assert_eq!(subsample.size, 6);
    assert_eq!(count_prefix(&subsample.selected, "a2000"), 2);
    assert_eq!(count_prefix(&subsample.selected, "a2001"), 2);
    assert_eq!(count_prefix(&subsample.selected, "a2002"), 2);
    assert_eq!(count_prefix(&subsample.selected, "b"), 6);
    Ok(())
}

#[test]
fn special_state_after_onset_only() -> Result<(), Report> {
    let all = [
        tips("ext", "External", 2010, 2),
        tips("ext", "External", 2015, 8),
        tips("low", "Low", 2012, 5),
        tips("high", "High", 2013, 6),
    ]
    .concat();
    let phylo = star_tree(&to_refs(&all))?;
    let pools = Pools::from_phylogeny(&phylo, "state")?;
    let mut rng = StdRng::seed_from_u64(2);
    let subsample = subsample(&pools, &config(&["Low", "High"], Some("External")), &mut rng)?;

    assert_eq!(subsample.size, 5);
    assert_eq!(subsample.onset_year, 2012);
    assert_eq!(count_prefix(&subsample.selected, "ext2010"), 0);
    assert_eq!(count_prefix(&subsample.selected, "ext2015"), 5);
    assert_eq!(count_prefix(&subsample.selected, "low"), 5);
    assert_eq!(count_prefix(&subsample.selected, "high"), 5);
    Ok(())
}

#[test]
fn special_state_forced_after_onset() -> Result<(), Report> {
    let all = [
        tips("ext", "External", 2005, 10),
        tips("ext", "External", 2015, 2),
        tips("low", "Low", 2012, 5),
        tips("high", "High", 2013, 6),
    ]
    .concat();
    let phylo = star_tree(&to_refs(&all))?;
    let pools = Pools::from_phylogeny(&phylo, "state")?;
    let mut rng = StdRng::seed_from_u64(3);
    let subsample = subsample(&pools, &config(&["Low", "High"], Some("External")), &mut rng)?;

    // both late tips are forced in, the earlier years fill the rest
    assert_eq!(count_prefix(&subsample.selected, "ext2015"), 2);
    assert_eq!(count_prefix(&subsample.selected, "ext2005"), 3);
    Ok(())
}

#[test]
fn special_state_disabled() -> Result<(), Report> {
    let all = [
        tips("ext", "External", 2010, 5),
        tips("ext", "External", 2015, 5),
        tips("low", "Low", 2012, 2),
        tips("high", "High", 2013, 2),
    ]
    .concat();
    let phylo = star_tree(&to_refs(&all))?;
    let pools = Pools::from_phylogeny(&phylo, "state")?;
    let mut rng = StdRng::seed_from_u64(4);
    let subsample = subsample(&pools, &config(&["Low", "High"], None), &mut rng)?;

    // without a special state, years before the onset are sampled like any other
    assert_eq!(count_prefix(&subsample.selected, "ext2010"), 1);
    assert_eq!(count_prefix(&subsample.selected, "ext2015"), 1);
    Ok(())
}

#[test]
fn subsample_missing_reference_state() -> Result<(), Report> {
    let phylo = star_tree(&[("A", "Low", 2012.0), ("B", "External", 2013.0)])?;
    let pools = Pools::from_phylogeny(&phylo, "state")?;
    let mut rng = StdRng::seed_from_u64(5);
    assert!(subsample(&pools, &config(&["Low", "High"], Some("External")), &mut rng).is_err());
    Ok(())
}

#[test]
fn subsample_seeded() -> Result<(), Report> {
    let all = [tips("a", "A", 2000, 30), tips("a", "A", 2001, 7), tips("b", "B", 2003, 9)].concat();
    let phylo = star_tree(&to_refs(&all))?;
    let pools = Pools::from_phylogeny(&phylo, "state")?;
    let config = config(&["A", "B"], None);

    let first = subsample(&pools, &config, &mut StdRng::seed_from_u64(42))?;
    let second = subsample(&pools, &config, &mut StdRng::seed_from_u64(42))?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn subsample_invariants() -> Result<(), Report> {
    use rand::Rng;

    let states = ["External", "High", "Low", "Medium"];
    for seed in 0..20 {
        let mut rng = StdRng::seed_from_u64(seed);
        let all = (0..rng.gen_range(10..60))
            .map(|i| {
                let state = match rng.gen_range(0..6) {
                    4 => "High|Low",
                    5 => "Low",
                    s => states[s],
                };
                (format!("t{i}"), state, rng.gen_range(2000.0..2020.0))
            })
            .collect_vec();
        let all = all.iter().map(|(name, state, date)| (name.as_str(), *state, *date)).collect_vec();
        let phylo = star_tree(&all)?;
        let pools = Pools::from_phylogeny(&phylo, "state")?;
        let Ok(subsample) = subsample(&pools, &config(&["Low", "High"], Some("External")), &mut rng) else {
            continue;
        };

        for (state, pool) in &pools.states {
            let drawn = pool.years.values().flatten().filter(|tip| subsample.selected.contains(*tip)).count();
            assert!(drawn <= subsample.size, "seed {seed}, state {state}");
        }
        // ambiguous tips are never drawn
        let ambiguous = all.iter().filter(|(_, state, _)| state.contains('|')).map(|(name, _, _)| *name);
        ambiguous.for_each(|name| assert!(!subsample.selected.contains(name)));
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Run

#[test]
fn run_writes_pruned_tree() -> Result<(), Report> {
    let dir = TempDir::new()?;
    let tree = dir.path().join("input.nwk");
    let output = dir.path().join("output.nwk");
    let summary = dir.path().join("summary.tsv");

    let nwk = "((A:1[&&NHX:state=Low],B:2[&&NHX:state=Low])n1:1,\
               (C:1[&&NHX:state=High],D:1[&&NHX:state=High|Low])n2:1[&&NHX:date_CI=2000|2001],\
               E:3[&&NHX:state=External])root[&&NHX:date=2000];\n";
    std::fs::write(&tree, nwk)?;

    let args = Args::parse_from([
        "subsample",
        "--tree",
        tree.to_str().unwrap_or_default(),
        "--output",
        output.to_str().unwrap_or_default(),
        "--column",
        "state",
        "--seed",
        "7",
        "--summary",
        summary.to_str().unwrap_or_default(),
    ]);
    let subsample = run(&args)?;
    assert_eq!(subsample.size, 1);
    assert_eq!(subsample.onset_year, 2002);

    // Low: round(1 / 2) = 0 from 2002, so B (2003) is drawn
    let written = crate::utils::read_tree(&output)?;
    let tips = written.get_tips()?.into_iter().map(|n| n.name.as_str()).collect_vec();
    assert_eq!(tips, ["B", "C", "E"]);
    // dates are written, states are not
    assert!(written.get_tips()?.iter().all(|n| n.get_feature("date").is_some()));
    assert!(written.get_tips()?.iter().all(|n| n.get_feature("state").is_none()));

    let summary = std::fs::read_to_string(&summary)?;
    assert!(summary.starts_with("state\tyear\tavailable\tsampled\n"));
    assert!(summary.contains("Low\t2002\t1\t0\n"));
    assert!(summary.contains("Low\t2003\t1\t1\n"));
    Ok(())
}

#[test]
fn run_config_overrides() -> Result<(), Report> {
    let dir = TempDir::new()?;
    let config = dir.path().join("config.json");
    std::fs::write(&config, r#"{ "column": "risk", "reference_states": ["A"] }"#)?;
    let config = config.to_str().unwrap_or_default();

    let args = Args::parse_from(["subsample", "-t", "in.nwk", "-o", "out.nwk", "-c", config]);
    let expected = Config { column: "risk".to_string(), reference_states: vec!["A".to_string()], ..Default::default() };
    assert_eq!(args.get_config()?, expected);

    let args = Args::parse_from([
        "subsample",
        "-t",
        "in.nwk",
        "-o",
        "out.nwk",
        "-c",
        config,
        "--reference-states",
        "B,C",
        "--no-special-state",
    ]);
    let config = args.get_config()?;
    assert_eq!(config.reference_states, ["B", "C"]);
    assert_eq!(config.special_state, None);
    assert_eq!(args.features, ["date", "date_CI"]);
    Ok(())
}
