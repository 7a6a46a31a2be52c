//! Tab-separated report rendering for classification runs

use anyhow::Result;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::bio::taxonomy::{Lineage, TaxonId, TaxonomicRank};
use crate::core::consensus::{ConsensusRow, DistinctPathRow, HitAuditRow, RankScores};
use crate::core::normalizer::RemapEvent;
use crate::core::pipeline::RunSummary;

/// Output files derived from one prefix
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub classification: PathBuf,
    pub hits: PathBuf,
    pub distinct: PathBuf,
    pub unresolved: PathBuf,
    pub remapped: PathBuf,
}

impl ReportPaths {
    pub fn for_prefix(prefix: &Path) -> Self {
        let with_suffix = |suffix: &str| {
            let mut name = prefix.as_os_str().to_os_string();
            name.push(suffix);
            PathBuf::from(name)
        };
        Self {
            classification: with_suffix(".classification.tsv"),
            hits: with_suffix(".hits.tsv"),
            distinct: with_suffix(".distinct.tsv"),
            unresolved: with_suffix(".unresolved.tsv"),
            remapped: with_suffix(".remapped.tsv"),
        }
    }
}

/// Write all report tables for a finished run
pub fn write_run(prefix: &Path, summary: &RunSummary) -> Result<()> {
    let paths = ReportPaths::for_prefix(prefix);

    fs::write(&paths.classification, classification_table(&summary.consensus)?)?;
    fs::write(&paths.hits, hits_table(&summary.audit)?)?;
    fs::write(&paths.distinct, distinct_table(&summary.distinct)?)?;
    fs::write(&paths.unresolved, unresolved_table(&summary.unresolved)?)?;
    fs::write(&paths.remapped, remap_table(&summary.remap_events)?)?;

    Ok(())
}

/// Create the header-only classification table that marks an aborted run
pub fn write_empty_marker(prefix: &Path) -> Result<()> {
    let paths = ReportPaths::for_prefix(prefix);
    fs::write(&paths.classification, classification_table(&[])?)?;
    Ok(())
}

pub fn classification_table(rows: &[ConsensusRow]) -> Result<String> {
    let mut output = String::new();

    writeln!(
        &mut output,
        "query_id\t{}\t{}\talternatives",
        rank_columns(""),
        rank_columns("_score")
    )?;

    for row in rows {
        writeln!(
            &mut output,
            "{}\t{}\t{}\t{}",
            row.query_id,
            lineage_columns(&row.lineage),
            score_columns(&row.scores),
            row.alternatives
        )?;
    }

    Ok(output)
}

pub fn hits_table(rows: &[HitAuditRow]) -> Result<String> {
    let mut output = String::new();

    writeln!(
        &mut output,
        "query_id\tsubject_id\ttaxon_id\tpercent_identity\tevalue\tweight\t{}\t{}",
        rank_columns(""),
        rank_columns("_score")
    )?;

    for row in rows {
        writeln!(
            &mut output,
            "{}\t{}\t{}\t{:.1}\t{:e}\t{:.2}\t{}\t{}",
            row.query_id,
            row.subject_id,
            row.taxon_id,
            row.percent_identity,
            row.evalue,
            row.weight,
            lineage_columns(&row.lineage),
            score_columns(&row.scores)
        )?;
    }

    Ok(output)
}

pub fn distinct_table(rows: &[DistinctPathRow]) -> Result<String> {
    let mut output = String::new();

    writeln!(
        &mut output,
        "query_id\t{}\t{}",
        rank_columns(""),
        rank_columns("_score")
    )?;

    for row in rows {
        writeln!(
            &mut output,
            "{}\t{}\t{}",
            row.query_id,
            lineage_columns(&row.lineage),
            score_columns(&row.scores)
        )?;
    }

    Ok(output)
}

pub fn unresolved_table(ids: &BTreeSet<TaxonId>) -> Result<String> {
    let mut output = String::new();

    writeln!(&mut output, "taxon_id")?;
    for id in ids {
        writeln!(&mut output, "{}", id)?;
    }

    Ok(output)
}

pub fn remap_table(events: &[RemapEvent]) -> Result<String> {
    let mut output = String::new();

    writeln!(&mut output, "query_id\told_taxon_id\tnew_taxon_id")?;
    for event in events {
        writeln!(&mut output, "{}\t{}\t{}", event.query_id, event.old_id, event.new_id)?;
    }

    Ok(output)
}

fn rank_columns(suffix: &str) -> String {
    TaxonomicRank::ALL
        .iter()
        .map(|r| format!("{}{}", r.label(), suffix))
        .collect::<Vec<_>>()
        .join("\t")
}

fn lineage_columns(lineage: &Lineage) -> String {
    TaxonomicRank::ALL
        .iter()
        .map(|&r| lineage.rank(r))
        .collect::<Vec<_>>()
        .join("\t")
}

fn score_columns(scores: &RankScores) -> String {
    scores
        .iter()
        .map(|s| format!("{:.2}", s))
        .collect::<Vec<_>>()
        .join("\t")
}
