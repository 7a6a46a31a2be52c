pub mod hits;
pub mod lineage_api;
pub mod taxonomy;

pub use hits::{read_hit_table, Hit};
pub use taxonomy::{Lineage, LineageProvider, TableLineageProvider, TaxonId, TaxonomicRank};
