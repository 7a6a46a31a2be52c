//! Evalue-weighted consensus scoring across taxonomic ranks
//!
//! Each upper hit carries a weight proportional to the reciprocal of its
//! evalue, normalized to 100 per query. Weights aggregate along path
//! prefixes: a hit supports a candidate at every rank where their
//! lineages agree from kingdom down. Candidates are ranked by the
//! kingdom-first score tuple, so strong agreement at a coarse rank beats
//! disagreement further down, which is what makes the result behave like
//! a soft lowest-common-ancestor estimate.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::bio::taxonomy::{Lineage, TaxonId, TaxonomicRank};
use crate::core::filter::{FilteredGroup, TaggedHit};

/// Scores for the seven ranks, kingdom first
pub type RankScores = [f64; 7];

/// Final classification for one query
#[derive(Debug, Clone)]
pub struct ConsensusRow {
    pub query_id: String,
    pub lineage: Lineage,
    pub scores: RankScores,
    pub alternatives: String,
}

/// Audit row: one scored hit with its weight and the agreement scores of
/// its own lineage
#[derive(Debug, Clone)]
pub struct HitAuditRow {
    pub query_id: String,
    pub subject_id: String,
    pub taxon_id: TaxonId,
    pub percent_identity: f64,
    pub evalue: f64,
    pub weight: f64,
    pub lineage: Lineage,
    pub scores: RankScores,
}

/// One distinct candidate path of a query with its scores
#[derive(Debug, Clone)]
pub struct DistinctPathRow {
    pub query_id: String,
    pub lineage: Lineage,
    pub scores: RankScores,
}

/// Everything the scorer produces for one query
#[derive(Debug)]
pub struct QueryConsensus {
    pub row: ConsensusRow,
    pub audit: Vec<HitAuditRow>,
    pub distinct: Vec<DistinctPathRow>,
}

pub struct ConsensusScorer {
    min_evalue: f64,
}

impl ConsensusScorer {
    pub fn new(min_evalue: f64) -> Self {
        Self { min_evalue }
    }

    /// Score one filtered query group. `lineages` is the read-only cache
    /// of resolved paths; hits whose taxon is absent fall back to a
    /// species-only path built from their own scientific name.
    pub fn score(
        &self,
        query_id: &str,
        group: &FilteredGroup,
        lineages: &HashMap<TaxonId, Lineage>,
    ) -> QueryConsensus {
        let upper: Vec<&TaggedHit> = group.upper().collect();
        debug_assert!(!upper.is_empty(), "empty groups are skipped upstream");

        let weights = self.weights(&upper);
        let weighted: Vec<(Lineage, f64)> = upper
            .iter()
            .zip(&weights)
            .map(|(h, &w)| (lineage_for(h, lineages), w))
            .collect();

        // Distinct candidate paths, first-seen order
        let mut candidates: Vec<&Lineage> = Vec::new();
        for (lineage, _) in &weighted {
            if !candidates.contains(&lineage) {
                candidates.push(lineage);
            }
        }

        let distinct: Vec<DistinctPathRow> = candidates
            .iter()
            .map(|&lineage| DistinctPathRow {
                query_id: query_id.to_string(),
                lineage: lineage.clone(),
                scores: rank_scores(lineage, &weighted),
            })
            .collect();

        // Kingdom-first tuple comparison; identical tuples fall back to
        // the path names so the winner never depends on input order
        let winner = distinct
            .iter()
            .max_by(|a, b| {
                rank_tuple_cmp(&a.scores, &b.scores)
                    .then_with(|| lineage_name_cmp(&b.lineage, &a.lineage))
            })
            .expect("at least one candidate per scored query");

        let audit: Vec<HitAuditRow> = upper
            .iter()
            .zip(&weighted)
            .map(|(h, (lineage, weight))| HitAuditRow {
                query_id: query_id.to_string(),
                subject_id: h.hit.subject_id.clone(),
                taxon_id: h.taxon_id,
                percent_identity: h.hit.percent_identity,
                evalue: h.hit.evalue,
                weight: *weight,
                lineage: lineage.clone(),
                scores: rank_scores(lineage, &weighted),
            })
            .collect();

        let row = ConsensusRow {
            query_id: query_id.to_string(),
            lineage: winner.lineage.clone(),
            scores: winner.scores,
            alternatives: self.alternatives(group, lineages),
        };

        QueryConsensus { row, audit, distinct }
    }

    /// Reciprocal-evalue weights over the upper hits, normalized to 100
    fn weights(&self, upper: &[&TaggedHit]) -> Vec<f64> {
        let reciprocals: Vec<f64> = upper
            .iter()
            .map(|h| 1.0 / h.hit.evalue.max(self.min_evalue))
            .collect();
        let total: f64 = reciprocals.iter().sum();
        reciprocals.into_iter().map(|r| 100.0 * r / total).collect()
    }

    /// All distinct (species, identity) pairs among the retained hits,
    /// strongest first
    fn alternatives(&self, group: &FilteredGroup, lineages: &HashMap<TaxonId, Lineage>) -> String {
        let mut pairs: Vec<(String, f64)> = Vec::new();
        for h in &group.hits {
            let species = lineage_for(h, lineages).species;
            let entry = (species, h.hit.percent_identity);
            if !pairs
                .iter()
                .any(|(name, pid)| *name == entry.0 && format_identity(*pid) == format_identity(entry.1))
            {
                pairs.push(entry);
            }
        }

        pairs.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        pairs
            .iter()
            .map(|(name, pid)| format!("{} ({}%)", name, format_identity(*pid)))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

fn lineage_for(hit: &TaggedHit, lineages: &HashMap<TaxonId, Lineage>) -> Lineage {
    lineages
        .get(&hit.taxon_id)
        .cloned()
        .unwrap_or_else(|| Lineage::species_only(&hit.hit.scientific_name))
}

/// Sum, at each rank, the weights of hits agreeing with `target` on every
/// rank from kingdom down to that rank
fn rank_scores(target: &Lineage, weighted: &[(Lineage, f64)]) -> RankScores {
    let mut scores = [0.0; 7];
    for (lineage, weight) in weighted {
        for (depth, &rank) in TaxonomicRank::ALL.iter().enumerate() {
            if lineage.rank(rank) == target.rank(rank) {
                scores[depth] += weight;
            } else {
                // prefix agreement: a mismatch here rules out every
                // finer rank as well
                break;
            }
        }
    }
    scores
}

fn rank_tuple_cmp(a: &RankScores, b: &RankScores) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        match x.partial_cmp(y) {
            Some(Ordering::Equal) | None => continue,
            Some(ord) => return ord,
        }
    }
    Ordering::Equal
}

fn lineage_name_cmp(a: &Lineage, b: &Lineage) -> Ordering {
    for rank in TaxonomicRank::ALL {
        match a.rank(rank).cmp(b.rank(rank)) {
            Ordering::Equal => continue,
            ord => return ord,
        }
    }
    Ordering::Equal
}

fn format_identity(pid: f64) -> String {
    format!("{:.1}", pid)
}
