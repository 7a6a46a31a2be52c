//! Per-query hit filtering and margin tagging
//!
//! The acceptance window is adaptive: it widens to the identity spread of
//! the best-matching taxon, so a query hitting a taxon with high
//! intraspecific variability keeps all of that taxon's hits instead of
//! being cut by a fixed threshold. A wider, configured margin below that
//! keeps near-miss hits visible as reported alternatives.

use std::cmp::Ordering;

use crate::bio::hits::Hit;
use crate::bio::taxonomy::TaxonId;

/// Inclusion tag for a retained hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginTag {
    /// Within the adaptive margin of the best hit; scored
    Upper,
    /// Within the configured lower margin; reported as alternative only
    Lower,
}

/// Hit with its remap-normalized taxon id. `taxon_id` is None when the
/// search engine reported no usable id for the subject.
#[derive(Debug, Clone)]
pub struct NormalizedHit {
    pub hit: Hit,
    pub taxon_id: Option<TaxonId>,
}

/// A hit that survived filtering
#[derive(Debug, Clone)]
pub struct TaggedHit {
    pub hit: Hit,
    pub taxon_id: TaxonId,
    pub tag: MarginTag,
}

/// Margins derived for one query group
#[derive(Debug, Clone, Copy)]
pub struct GroupMargins {
    pub best_percent_identity: f64,
    pub best_taxon_min_identity: f64,
    pub adaptive_upper_margin: f64,
}

/// One query group after filtering
#[derive(Debug)]
pub struct FilteredGroup {
    pub margins: GroupMargins,
    pub hits: Vec<TaggedHit>,
}

impl FilteredGroup {
    pub fn upper(&self) -> impl Iterator<Item = &TaggedHit> {
        self.hits.iter().filter(|h| h.tag == MarginTag::Upper)
    }
}

pub struct HitFilter {
    excluded_names: Vec<String>,
    lower_margin: f64,
}

impl HitFilter {
    pub fn new(excluded_names: &[String], lower_margin: f64) -> Self {
        Self {
            excluded_names: excluded_names.iter().map(|n| n.to_lowercase()).collect(),
            lower_margin,
        }
    }

    /// Filter and tag one query group.
    ///
    /// Returns None when nothing classifiable remains; the caller skips
    /// the query and reports it, other queries are unaffected.
    pub fn filter(&self, group: &[NormalizedHit]) -> Option<FilteredGroup> {
        // Hits without a usable taxon id cannot be classified
        let valid: Vec<&NormalizedHit> =
            group.iter().filter(|h| h.taxon_id.is_some()).collect();
        if valid.is_empty() {
            return None;
        }

        // The name filter only applies while it leaves more than one hit;
        // collapsing a group to a single candidate loses more than a bad
        // name costs
        let mut name_filter_applied = false;
        let retained: Vec<&NormalizedHit> = if self.excluded_names.is_empty() {
            valid.clone()
        } else {
            let kept: Vec<&NormalizedHit> = valid
                .iter()
                .copied()
                .filter(|h| !self.name_excluded(&h.hit.scientific_name))
                .collect();
            if kept.len() > 1 {
                name_filter_applied = kept.len() != valid.len();
                kept
            } else {
                valid.clone()
            }
        };

        // The margin comes from the identity spread of the best taxon.
        // When the name filter removed the overall best hit, the margin
        // and reference identity are taken from the unfiltered group so
        // the window is not re-anchored on a weaker survivor.
        let margins = {
            let retained_margins = margins_of(&retained);
            if name_filter_applied {
                let unfiltered_best = best_hit_of(&valid).hit.percent_identity;
                if unfiltered_best > retained_margins.best_percent_identity {
                    margins_of(&valid)
                } else {
                    retained_margins
                }
            } else {
                retained_margins
            }
        };

        let upper_cut = margins.best_percent_identity - margins.adaptive_upper_margin;
        let lower_cut = margins.best_percent_identity - self.lower_margin;

        let mut tagged = Vec::new();
        for h in &retained {
            let pid = h.hit.percent_identity;
            if pid < lower_cut {
                continue;
            }
            let tag = if pid >= upper_cut {
                MarginTag::Upper
            } else {
                MarginTag::Lower
            };
            tagged.push(TaggedHit {
                hit: h.hit.clone(),
                taxon_id: h.taxon_id.expect("validity-filtered hit"),
                tag,
            });
        }

        if tagged.is_empty() {
            return None;
        }

        Some(FilteredGroup {
            margins,
            hits: tagged,
        })
    }

    fn name_excluded(&self, scientific_name: &str) -> bool {
        let name = scientific_name.to_lowercase();
        self.excluded_names.iter().any(|term| name.contains(term))
    }
}

/// First hit attaining the group's best identity (input order breaks ties)
fn best_hit_of<'a>(hits: &[&'a NormalizedHit]) -> &'a NormalizedHit {
    let mut best = hits[0];
    for &h in &hits[1..] {
        if h.hit.percent_identity > best.hit.percent_identity {
            best = h;
        }
    }
    best
}

fn margins_of(hits: &[&NormalizedHit]) -> GroupMargins {
    let best = best_hit_of(hits);
    let best_percent_identity = best.hit.percent_identity;

    // Identity range of the sub-group sharing the best hit's taxon
    let best_taxon_min_identity = hits
        .iter()
        .filter(|h| {
            h.taxon_id == best.taxon_id && h.hit.scientific_name == best.hit.scientific_name
        })
        .map(|h| h.hit.percent_identity)
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
        .unwrap_or(best_percent_identity);

    GroupMargins {
        best_percent_identity,
        best_taxon_min_identity,
        adaptive_upper_margin: best_percent_identity - best_taxon_min_identity,
    }
}
