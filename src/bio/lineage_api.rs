/// REST client for the external taxonomic classification service
use crate::bio::taxonomy::{Lineage, LineageProvider, TaxonId, TaxonomicRank};
use crate::core::config::ResolverConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Wire shape of one lookup response
#[derive(Debug, Deserialize)]
struct LineageResponse {
    taxon_id: u32,
    #[serde(default)]
    ranks: HashMap<String, String>,
}

/// Classification service client
pub struct LineageApiClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl LineageApiClient {
    /// Create a new client against the configured service endpoint
    pub fn new(config: &ResolverConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("linnaea/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

impl LineageProvider for LineageApiClient {
    /// Fetch the lineage for one taxon id.
    ///
    /// HTTP 404 is the service's not-found signal and maps to `Ok(None)`;
    /// other non-success statuses are errors so the resolver can retry.
    fn lineage(&self, id: TaxonId) -> Result<Option<Lineage>> {
        let url = format!("{}/tax-id/{}", self.base_url, id);

        let response = self
            .client
            .get(&url)
            .send()
            .with_context(|| format!("lineage lookup failed for taxon {}", id))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            anyhow::bail!(
                "taxonomy service returned status {} for taxon {}",
                response.status(),
                id
            );
        }

        let payload: LineageResponse = response
            .json()
            .with_context(|| format!("malformed lineage payload for taxon {}", id))?;
        if payload.taxon_id != id.value() {
            debug!(
                "taxonomy service answered for taxon {} when asked about {}",
                payload.taxon_id, id
            );
        }

        let mut lineage = Lineage::unresolved();
        for (rank, name) in payload.ranks {
            if let Some(rank) = TaxonomicRank::parse(&rank) {
                lineage.set(rank, name);
            }
        }

        if lineage.is_unresolved() {
            Ok(None)
        } else {
            Ok(Some(lineage))
        }
    }
}
