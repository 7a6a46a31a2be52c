use clap::Args;
use std::path::PathBuf;

use crate::bio::lineage_api::LineageApiClient;
use crate::bio::taxonomy::{LineageProvider, TableLineageProvider, TaxonId, TaxonomicRank};
use crate::core::config::ResolverConfig;
use crate::core::normalizer::IdRemapTable;

#[derive(Args, Debug)]
pub struct LineageArgs {
    /// Taxon id to resolve
    #[arg(value_name = "TAXON_ID")]
    pub taxon_id: u32,

    /// Old-to-new taxon id remap table, applied before the lookup
    #[arg(short = 'm', long, value_name = "FILE")]
    pub remap_table: Option<PathBuf>,

    /// Base URL of the taxonomy lookup service
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Resolve from a local taxid-to-lineage table instead of the
    /// remote service
    #[arg(long, value_name = "FILE")]
    pub lineage_table: Option<PathBuf>,
}

pub fn run(args: LineageArgs) -> anyhow::Result<()> {
    let mut id = TaxonId(args.taxon_id);

    if let Some(path) = &args.remap_table {
        let remap = IdRemapTable::load(path)?;
        let current = remap.normalize(id);
        if current != id {
            println!("{} is merged into {}", id, current);
            id = current;
        }
    }

    let provider: Box<dyn LineageProvider> = match &args.lineage_table {
        Some(path) => Box::new(TableLineageProvider::load(path)?),
        None => {
            let mut config = ResolverConfig::default();
            if let Some(base_url) = &args.base_url {
                config.base_url = base_url.clone();
            }
            Box::new(LineageApiClient::new(&config)?)
        }
    };

    match provider.lineage(id)? {
        Some(lineage) => {
            for rank in TaxonomicRank::ALL {
                println!("{:<8} {}", rank.label(), lineage.rank(rank));
            }
        }
        None => println!("No classification available for taxon {}", id),
    }

    Ok(())
}
