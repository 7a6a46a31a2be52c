//! Batch lineage resolution
//!
//! Many hits share a taxon id, so resolution works on the deduplicated id
//! set: each unique id is looked up exactly once per run. Lookups are
//! independent and idempotent, which makes the batch safe to parallelize;
//! the only ordering requirement is that the whole batch completes before
//! scoring reads the cache.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

use crate::bio::taxonomy::{Lineage, LineageProvider, TaxonId};
use crate::core::config::ResolverConfig;

/// Outcome of one batch resolution pass
#[derive(Debug, Default)]
pub struct ResolvedLineages {
    /// Write-once cache: unique taxon id to its lineage
    pub lineages: HashMap<TaxonId, Lineage>,
    /// Ids the service could not name, kept for operator review
    pub unresolved: BTreeSet<TaxonId>,
}

impl ResolvedLineages {
    pub fn get(&self, id: TaxonId) -> Option<&Lineage> {
        self.lineages.get(&id)
    }
}

pub struct LineageResolver<'a> {
    provider: &'a dyn LineageProvider,
    max_retries: u32,
    retry_backoff: Duration,
    rate_limit: Duration,
}

impl<'a> LineageResolver<'a> {
    pub fn new(provider: &'a dyn LineageProvider, config: &ResolverConfig) -> Self {
        Self {
            provider,
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            rate_limit: Duration::from_millis(config.rate_limit_ms),
        }
    }

    /// Resolve every id in the set, once each.
    ///
    /// Transient lookup errors are retried with exponential backoff; an id
    /// still failing after the retry budget, or answered with no usable
    /// classification, lands in `unresolved` instead of failing the run.
    pub fn resolve(&self, ids: &BTreeSet<TaxonId>) -> ResolvedLineages {
        if ids.is_empty() {
            return ResolvedLineages::default();
        }

        let pb = ProgressBar::new(ids.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.green} {pos}/{len} taxa")
                .unwrap(),
        );

        let results: Vec<(TaxonId, Option<Lineage>)> = ids
            .par_iter()
            .map(|&id| {
                let lineage = self.lookup_with_retry(id);
                pb.inc(1);
                (id, lineage)
            })
            .collect();
        pb.finish_and_clear();

        let mut resolved = ResolvedLineages::default();
        for (id, lineage) in results {
            match lineage {
                Some(lineage) => {
                    resolved.lineages.insert(id, lineage);
                }
                None => {
                    resolved.unresolved.insert(id);
                }
            }
        }

        if !resolved.unresolved.is_empty() {
            warn!(
                "{} of {} taxa could not be resolved",
                resolved.unresolved.len(),
                ids.len()
            );
        }

        resolved
    }

    fn lookup_with_retry(&self, id: TaxonId) -> Option<Lineage> {
        let mut backoff = self.retry_backoff;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                std::thread::sleep(backoff);
                backoff *= 2;
            }

            match self.provider.lineage(id) {
                Ok(Some(lineage)) if !lineage.is_unresolved() => {
                    self.throttle();
                    return Some(lineage);
                }
                // A definite "no classification available" is not retried
                Ok(_) => {
                    debug!("no classification available for taxon {}", id);
                    self.throttle();
                    return None;
                }
                Err(e) => {
                    warn!(
                        "lookup for taxon {} failed (attempt {}/{}): {}",
                        id,
                        attempt + 1,
                        self.max_retries + 1,
                        e
                    );
                }
            }
        }

        warn!("taxon {} recorded as unresolved after {} retries", id, self.max_retries);
        None
    }

    fn throttle(&self) {
        if !self.rate_limit.is_zero() {
            std::thread::sleep(self.rate_limit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider that counts lookups per call and can fail the first N
    struct CountingProvider {
        calls: AtomicUsize,
        failures_before_success: usize,
        known: HashMap<TaxonId, Lineage>,
    }

    impl CountingProvider {
        fn with_taxa(ids: &[u32]) -> Self {
            let known = ids
                .iter()
                .map(|&id| {
                    let mut lineage = Lineage::species_only(&format!("Taxon {}", id));
                    lineage.kingdom = "Metazoa".to_string();
                    (TaxonId(id), lineage)
                })
                .collect();
            Self {
                calls: AtomicUsize::new(0),
                failures_before_success: 0,
                known,
            }
        }
    }

    impl LineageProvider for CountingProvider {
        fn lineage(&self, id: TaxonId) -> anyhow::Result<Option<Lineage>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                return Err(anyhow!("transient failure"));
            }
            Ok(self.known.get(&id).cloned())
        }
    }

    fn fast_config(max_retries: u32) -> ResolverConfig {
        ResolverConfig {
            max_retries,
            retry_backoff_ms: 1,
            rate_limit_ms: 0,
            ..ResolverConfig::default()
        }
    }

    #[test]
    fn test_each_unique_id_looked_up_once() {
        let provider = CountingProvider::with_taxa(&[1, 2, 3]);
        let resolver = LineageResolver::new(&provider, &fast_config(3));

        let ids: BTreeSet<TaxonId> = [1, 2, 3].into_iter().map(TaxonId).collect();
        let resolved = resolver.resolve(&ids);

        assert_eq!(resolved.lineages.len(), 3);
        assert!(resolved.unresolved.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_not_found_is_not_retried() {
        let provider = CountingProvider::with_taxa(&[]);
        let resolver = LineageResolver::new(&provider, &fast_config(5));

        let ids: BTreeSet<TaxonId> = [42].into_iter().map(TaxonId).collect();
        let resolved = resolver.resolve(&ids);

        assert!(resolved.lineages.is_empty());
        assert_eq!(resolved.unresolved, [TaxonId(42)].into_iter().collect());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let mut provider = CountingProvider::with_taxa(&[7]);
        provider.failures_before_success = 2;
        let resolver = LineageResolver::new(&provider, &fast_config(3));

        let ids: BTreeSet<TaxonId> = [7].into_iter().map(TaxonId).collect();
        let resolved = resolver.resolve(&ids);

        assert_eq!(resolved.lineages.len(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_exhausted_retries_record_unresolved() {
        let mut provider = CountingProvider::with_taxa(&[7]);
        provider.failures_before_success = usize::MAX;
        let resolver = LineageResolver::new(&provider, &fast_config(2));

        let ids: BTreeSet<TaxonId> = [7].into_iter().map(TaxonId).collect();
        let resolved = resolver.resolve(&ids);

        assert!(resolved.lineages.is_empty());
        assert_eq!(resolved.unresolved.len(), 1);
        // initial attempt plus two retries
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_empty_set_short_circuits() {
        let provider = CountingProvider::with_taxa(&[]);
        let resolver = LineageResolver::new(&provider, &fast_config(0));

        let resolved = resolver.resolve(&BTreeSet::new());
        assert!(resolved.lineages.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
