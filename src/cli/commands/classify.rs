use clap::Args;
use std::path::PathBuf;
use tracing::info;

use crate::bio::hits::read_hit_table;
use crate::bio::lineage_api::LineageApiClient;
use crate::bio::taxonomy::{LineageProvider, TableLineageProvider};
use crate::core::config::{load_config, ClassifyConfig};
use crate::core::normalizer::IdRemapTable;
use crate::core::pipeline::ClassificationPipeline;
use crate::report;
use crate::LinnaeaError;

#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Tabular hit file (BLAST outfmt 6 with qlen, qcovs, staxids and
    /// sscinames appended)
    #[arg(value_name = "HITS")]
    pub hits: PathBuf,

    /// Old-to-new taxon id remap table (plain pairs or merged.dmp)
    #[arg(short = 'm', long, value_name = "FILE")]
    pub remap_table: PathBuf,

    /// Output prefix for the report tables
    #[arg(short, long, value_name = "PREFIX")]
    pub output: PathBuf,

    /// Configuration file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Identity margin below the best hit for reported alternatives
    #[arg(long, value_name = "POINTS")]
    pub lower_margin: Option<f64>,

    /// Scientific-name term to exclude from candidates
    /// (case-insensitive substring, repeatable)
    #[arg(long = "exclude-name", value_name = "TERM")]
    pub excluded_names: Vec<String>,

    /// Base URL of the taxonomy lookup service
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Resolve lineages from a local taxid-to-lineage table instead of
    /// the remote service
    #[arg(long, value_name = "FILE")]
    pub lineage_table: Option<PathBuf>,
}

pub fn run(args: ClassifyArgs) -> anyhow::Result<()> {
    let config = build_config(&args)?;

    let remap = IdRemapTable::load(&args.remap_table)?;
    info!(
        "loaded {} id remaps from {}",
        remap.len(),
        args.remap_table.display()
    );

    let hits = match read_hit_table(&args.hits) {
        Ok(hits) => hits,
        Err(e @ LinnaeaError::FatalInput(_)) => {
            // Leave the header-only marker so downstream steps see the
            // run happened and produced nothing
            report::write_empty_marker(&args.output)?;
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };
    info!("read {} full-coverage hits from {}", hits.len(), args.hits.display());

    let provider: Box<dyn LineageProvider> = match &args.lineage_table {
        Some(path) => {
            let table = TableLineageProvider::load(path)?;
            info!("resolving against local table with {} lineages", table.len());
            Box::new(table)
        }
        None => Box::new(LineageApiClient::new(&config.resolver)?),
    };

    let pipeline = ClassificationPipeline::new(&config, &remap, provider.as_ref());
    let summary = pipeline.run(hits);

    report::write_run(&args.output, &summary)?;

    println!(
        "Classified {} queries ({} skipped)",
        summary.consensus.len(),
        summary.skipped.len()
    );
    if !summary.unresolved.is_empty() {
        println!(
            "{} taxa could not be resolved, see {}",
            summary.unresolved.len(),
            report::ReportPaths::for_prefix(&args.output).unresolved.display()
        );
    }
    if !summary.remap_events.is_empty() {
        println!("{} hits carried deprecated taxon ids", summary.remap_events.len());
    }

    Ok(())
}

fn build_config(args: &ClassifyArgs) -> anyhow::Result<ClassifyConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ClassifyConfig::default(),
    };

    if let Some(lower_margin) = args.lower_margin {
        config.filter.lower_margin = lower_margin;
    }
    if !args.excluded_names.is_empty() {
        config.filter.excluded_names = args.excluded_names.clone();
    }
    if let Some(base_url) = &args.base_url {
        config.resolver.base_url = base_url.clone();
    }

    config.validate()?;
    Ok(config)
}
