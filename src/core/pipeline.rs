//! End-to-end classification: normalize, filter, resolve, score
//!
//! Hits are grouped by query in a single pass over the input table; each
//! later stage works on the indexed groups instead of rescanning the
//! table. Taxon ids are deduplicated globally before resolution because
//! many queries hit the same taxa. After resolution, per-query scoring is
//! independent and runs in parallel against the read-only lineage cache.

use indexmap::IndexMap;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashSet};
use tracing::{info, warn};

use crate::bio::hits::Hit;
use crate::bio::taxonomy::{LineageProvider, TaxonId};
use crate::core::config::ClassifyConfig;
use crate::core::consensus::{ConsensusRow, ConsensusScorer, DistinctPathRow, HitAuditRow};
use crate::core::filter::{FilteredGroup, HitFilter, NormalizedHit};
use crate::core::normalizer::{IdRemapTable, RemapEvent};
use crate::core::resolver::LineageResolver;

/// A query that produced no classification, with the reason
#[derive(Debug, Clone)]
pub struct SkippedQuery {
    pub query_id: String,
    pub reason: String,
}

/// Everything a classification run produces
#[derive(Debug, Default)]
pub struct RunSummary {
    pub consensus: Vec<ConsensusRow>,
    pub audit: Vec<HitAuditRow>,
    pub distinct: Vec<DistinctPathRow>,
    pub unresolved: BTreeSet<TaxonId>,
    pub remap_events: Vec<RemapEvent>,
    pub skipped: Vec<SkippedQuery>,
}

pub struct ClassificationPipeline<'a> {
    config: &'a ClassifyConfig,
    remap: &'a IdRemapTable,
    provider: &'a dyn LineageProvider,
}

impl<'a> ClassificationPipeline<'a> {
    pub fn new(
        config: &'a ClassifyConfig,
        remap: &'a IdRemapTable,
        provider: &'a dyn LineageProvider,
    ) -> Self {
        Self {
            config,
            remap,
            provider,
        }
    }

    pub fn run(&self, hits: Vec<Hit>) -> RunSummary {
        let mut summary = RunSummary::default();

        let groups = self.group_and_normalize(hits, &mut summary.remap_events);
        info!("classifying {} queries", groups.len());

        let filter = HitFilter::new(
            &self.config.filter.excluded_names,
            self.config.filter.lower_margin,
        );

        let mut filtered: Vec<(String, FilteredGroup)> = Vec::new();
        for (query_id, group) in groups {
            match filter.filter(&group) {
                Some(f) if f.upper().next().is_some() => filtered.push((query_id, f)),
                Some(_) => {
                    warn!("query {} has no hit within the scoring margin", query_id);
                    summary.skipped.push(SkippedQuery {
                        query_id,
                        reason: "no hit within the scoring margin".to_string(),
                    });
                }
                None => {
                    warn!("query {} has no classifiable hit", query_id);
                    summary.skipped.push(SkippedQuery {
                        query_id,
                        reason: "no classifiable hit".to_string(),
                    });
                }
            }
        }

        // Global dedup: one lookup per unique taxon across all queries
        let unique_ids: BTreeSet<TaxonId> = filtered
            .iter()
            .flat_map(|(_, group)| group.hits.iter().map(|h| h.taxon_id))
            .collect();
        let resolver = LineageResolver::new(self.provider, &self.config.resolver);
        let resolved = resolver.resolve(&unique_ids);
        summary.unresolved = resolved.unresolved;

        let scorer = ConsensusScorer::new(self.config.scoring.min_evalue);
        let results: Vec<_> = filtered
            .par_iter()
            .map(|(query_id, group)| scorer.score(query_id, group, &resolved.lineages))
            .collect();

        for result in results {
            summary.consensus.push(result.row);
            summary.audit.extend(result.audit);
            summary.distinct.extend(result.distinct);
        }

        info!(
            "classified {} queries ({} skipped, {} unresolved taxa)",
            summary.consensus.len(),
            summary.skipped.len(),
            summary.unresolved.len()
        );

        summary
    }

    /// One pass over the table: group hits by query id (first-appearance
    /// order) and normalize deprecated taxon ids on the way through
    fn group_and_normalize(
        &self,
        hits: Vec<Hit>,
        remap_events: &mut Vec<RemapEvent>,
    ) -> IndexMap<String, Vec<NormalizedHit>> {
        let mut groups: IndexMap<String, Vec<NormalizedHit>> = IndexMap::new();
        let mut warned: HashSet<(TaxonId, TaxonId)> = HashSet::new();

        for hit in hits {
            let taxon_id = hit.taxon_id.map(|id| {
                let current = self.remap.normalize(id);
                if current != id {
                    if warned.insert((id, current)) {
                        warn!("taxon id {} is merged into {}", id, current);
                    }
                    remap_events.push(RemapEvent {
                        query_id: hit.query_id.clone(),
                        old_id: id,
                        new_id: current,
                    });
                }
                current
            });

            groups
                .entry(hit.query_id.clone())
                .or_default()
                .push(NormalizedHit { hit, taxon_id });
        }

        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bio::taxonomy::{Lineage, TableLineageProvider, TaxonomicRank};
    use crate::core::config::ClassifyConfig;

    fn hit(query: &str, identity: f64, evalue: f64, taxid: Option<u32>, name: &str) -> Hit {
        Hit {
            query_id: query.to_string(),
            subject_id: format!("ref_{}", taxid.unwrap_or(0)),
            percent_identity: identity,
            evalue,
            query_coverage: 100.0,
            taxon_id: taxid.map(TaxonId),
            scientific_name: name.to_string(),
        }
    }

    fn lineage(names: [&str; 7]) -> Lineage {
        let mut l = Lineage::unresolved();
        for (&rank, name) in TaxonomicRank::ALL.iter().zip(names) {
            l.set(rank, name.to_string());
        }
        l
    }

    fn cod_provider() -> TableLineageProvider {
        let mut provider = TableLineageProvider::new();
        provider.insert(
            TaxonId(8049),
            lineage(["Metazoa", "Chordata", "Actinopteri", "Gadiformes", "Gadidae", "Gadus", "Gadus morhua"]),
        );
        provider.insert(
            TaxonId(8056),
            lineage(["Metazoa", "Chordata", "Actinopteri", "Gadiformes", "Gadidae", "Gadus", "Gadus macrocephalus"]),
        );
        provider
    }

    fn fast_config() -> ClassifyConfig {
        let mut config = ClassifyConfig::default();
        config.resolver.max_retries = 0;
        config.resolver.retry_backoff_ms = 1;
        config
    }

    #[test]
    fn test_remapped_hit_is_scored_under_current_id() {
        let config = fast_config();
        // 9999 was merged into 8049 (which the provider knows)
        let remap = IdRemapTable::from_pairs([(9999, 8049)]);
        let provider = cod_provider();
        let pipeline = ClassificationPipeline::new(&config, &remap, &provider);

        let summary = pipeline.run(vec![
            hit("otu1", 99.0, 1e-60, Some(9999), "Gadus morhua"),
            hit("otu1", 98.9, 1e-58, Some(8056), "Gadus macrocephalus"),
        ]);

        assert_eq!(summary.consensus.len(), 1);
        assert_eq!(summary.consensus[0].lineage.genus, "Gadus");
        assert_eq!(
            summary.remap_events,
            vec![RemapEvent {
                query_id: "otu1".to_string(),
                old_id: TaxonId(9999),
                new_id: TaxonId(8049),
            }]
        );
        // the retired id never reaches the resolver
        assert!(!summary.unresolved.contains(&TaxonId(9999)));
    }

    #[test]
    fn test_unclassifiable_query_is_skipped_not_fatal() {
        let config = fast_config();
        let remap = IdRemapTable::new();
        let provider = cod_provider();
        let pipeline = ClassificationPipeline::new(&config, &remap, &provider);

        let summary = pipeline.run(vec![
            hit("otu1", 99.0, 1e-60, Some(8049), "Gadus morhua"),
            hit("otu2", 97.0, 1e-50, None, "uncultured organism"),
        ]);

        assert_eq!(summary.consensus.len(), 1);
        assert_eq!(summary.consensus[0].query_id, "otu1");
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].query_id, "otu2");
    }

    #[test]
    fn test_unresolved_taxon_reported_and_species_falls_back() {
        let config = fast_config();
        let remap = IdRemapTable::new();
        let provider = cod_provider();
        let pipeline = ClassificationPipeline::new(&config, &remap, &provider);

        let summary = pipeline.run(vec![
            hit("otu1", 99.0, 1e-60, Some(424242), "Gadus sp. ZMUB 2544"),
            hit("otu1", 98.8, 1e-58, Some(424242), "Gadus sp. ZMUB 2544"),
        ]);

        assert_eq!(summary.unresolved, [TaxonId(424242)].into_iter().collect());
        assert_eq!(summary.consensus.len(), 1);
        let row = &summary.consensus[0];
        assert_eq!(row.lineage.species, "Gadus sp. ZMUB 2544");
        assert_eq!(row.lineage.kingdom, crate::bio::taxonomy::UNRESOLVED);
    }

    #[test]
    fn test_queries_share_the_resolution_cache() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingProvider {
            inner: TableLineageProvider,
            calls: AtomicUsize,
        }

        impl LineageProvider for CountingProvider {
            fn lineage(&self, id: TaxonId) -> anyhow::Result<Option<Lineage>> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.inner.lineage(id)
            }
        }

        let config = fast_config();
        let remap = IdRemapTable::new();
        let provider = CountingProvider {
            inner: cod_provider(),
            calls: AtomicUsize::new(0),
        };
        let pipeline = ClassificationPipeline::new(&config, &remap, &provider);

        // four queries, hundreds of hits, but only two distinct taxa
        let mut hits = Vec::new();
        for query in ["otu1", "otu2", "otu3", "otu4"] {
            for i in 0..50 {
                let taxid = if i % 2 == 0 { 8049 } else { 8056 };
                let name = if i % 2 == 0 { "Gadus morhua" } else { "Gadus macrocephalus" };
                hits.push(hit(query, 99.0 - 0.001 * i as f64, 1e-60, Some(taxid), name));
            }
        }

        let summary = pipeline.run(hits);
        assert_eq!(summary.consensus.len(), 4);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_audit_weights_sum_to_100_per_query() {
        let config = fast_config();
        let remap = IdRemapTable::new();
        let provider = cod_provider();
        let pipeline = ClassificationPipeline::new(&config, &remap, &provider);

        let summary = pipeline.run(vec![
            hit("otu1", 99.0, 1e-60, Some(8049), "Gadus morhua"),
            hit("otu1", 98.9, 1e-55, Some(8056), "Gadus macrocephalus"),
            hit("otu2", 97.0, 1e-45, Some(8056), "Gadus macrocephalus"),
        ]);

        for query in ["otu1", "otu2"] {
            let total: f64 = summary
                .audit
                .iter()
                .filter(|r| r.query_id == query)
                .map(|r| r.weight)
                .sum();
            assert!((total - 100.0).abs() < 1e-6, "query {}: {}", query, total);
        }
    }
}
