/// Taxonomy types and lookup traits for hit classification
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::LinnaeaError;

/// Taxonomy ID type - newtype pattern for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(Default)]
pub struct TaxonId(pub u32);

impl TaxonId {
    /// Create a new TaxonId
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the inner value
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for TaxonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TaxonId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<TaxonId> for u32 {
    fn from(taxon: TaxonId) -> Self {
        taxon.0
    }
}

/// Name reported for a rank the classification service could not fill in
pub const UNRESOLVED: &str = "unresolved";

/// The seven ranks reported in a consensus classification, coarsest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaxonomicRank {
    Kingdom,
    Phylum,
    Class,
    Order,
    Family,
    Genus,
    Species,
}

impl TaxonomicRank {
    /// All ranks, kingdom down to species
    pub const ALL: [TaxonomicRank; 7] = [
        Self::Kingdom,
        Self::Phylum,
        Self::Class,
        Self::Order,
        Self::Family,
        Self::Genus,
        Self::Species,
    ];

    /// Parse a rank name as reported by taxonomy services
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "kingdom" | "superkingdom" => Some(Self::Kingdom),
            "phylum" => Some(Self::Phylum),
            "class" => Some(Self::Class),
            "order" => Some(Self::Order),
            "family" => Some(Self::Family),
            "genus" => Some(Self::Genus),
            "species" => Some(Self::Species),
            _ => None,
        }
    }

    /// Column/field label for reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::Kingdom => "kingdom",
            Self::Phylum => "phylum",
            Self::Class => "class",
            Self::Order => "order",
            Self::Family => "family",
            Self::Genus => "genus",
            Self::Species => "species",
        }
    }

    /// Get rank depth (0 = kingdom .. 6 = species)
    pub fn depth(&self) -> usize {
        match self {
            Self::Kingdom => 0,
            Self::Phylum => 1,
            Self::Class => 2,
            Self::Order => 3,
            Self::Family => 4,
            Self::Genus => 5,
            Self::Species => 6,
        }
    }
}

/// Full kingdom-to-species path for one taxon
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lineage {
    pub kingdom: String,
    pub phylum: String,
    pub class: String,
    pub order: String,
    pub family: String,
    pub genus: String,
    pub species: String,
}

impl Lineage {
    /// A lineage with every rank unresolved
    pub fn unresolved() -> Self {
        Self {
            kingdom: UNRESOLVED.to_string(),
            phylum: UNRESOLVED.to_string(),
            class: UNRESOLVED.to_string(),
            order: UNRESOLVED.to_string(),
            family: UNRESOLVED.to_string(),
            genus: UNRESOLVED.to_string(),
            species: UNRESOLVED.to_string(),
        }
    }

    /// Fallback path for taxa the service has no classification for:
    /// the species slot carries the hit's own scientific name, every
    /// coarser rank stays unresolved rather than being fabricated.
    pub fn species_only(scientific_name: &str) -> Self {
        let mut lineage = Self::unresolved();
        lineage.species = scientific_name.to_string();
        lineage
    }

    /// Name at a rank
    pub fn rank(&self, rank: TaxonomicRank) -> &str {
        match rank {
            TaxonomicRank::Kingdom => &self.kingdom,
            TaxonomicRank::Phylum => &self.phylum,
            TaxonomicRank::Class => &self.class,
            TaxonomicRank::Order => &self.order,
            TaxonomicRank::Family => &self.family,
            TaxonomicRank::Genus => &self.genus,
            TaxonomicRank::Species => &self.species,
        }
    }

    /// Set the name at a rank
    pub fn set(&mut self, rank: TaxonomicRank, name: String) {
        match rank {
            TaxonomicRank::Kingdom => self.kingdom = name,
            TaxonomicRank::Phylum => self.phylum = name,
            TaxonomicRank::Class => self.class = name,
            TaxonomicRank::Order => self.order = name,
            TaxonomicRank::Family => self.family = name,
            TaxonomicRank::Genus => self.genus = name,
            TaxonomicRank::Species => self.species = name,
        }
    }

    /// True when no rank carries a usable name
    pub fn is_unresolved(&self) -> bool {
        TaxonomicRank::ALL
            .iter()
            .all(|&rank| self.rank(rank) == UNRESOLVED)
    }

    /// True when both lineages agree on every rank from kingdom down to
    /// `rank` inclusive
    pub fn agrees_through(&self, other: &Self, rank: TaxonomicRank) -> bool {
        TaxonomicRank::ALL
            .iter()
            .take(rank.depth() + 1)
            .all(|&r| self.rank(r) == other.rank(r))
    }
}

impl fmt::Display for Lineage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = TaxonomicRank::ALL.iter().map(|&r| self.rank(r)).collect();
        write!(f, "{}", names.join(";"))
    }
}

/// Narrow lookup capability over the external classification service:
/// a taxon id resolves to a lineage, or to nothing
pub trait LineageProvider: Send + Sync {
    fn lineage(&self, id: TaxonId) -> Result<Option<Lineage>>;
}

/// Lineage lookups backed by a local table instead of the remote service.
///
/// Expects eight tab-separated columns per row:
/// `taxid kingdom phylum class order family genus species`
/// An empty or `NA` column is treated as unresolved.
#[derive(Debug, Default)]
pub struct TableLineageProvider {
    lineages: HashMap<TaxonId, Lineage>,
}

impl TableLineageProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            LinnaeaError::Config(format!("cannot open lineage table {}: {}", path.display(), e))
        })?;
        let reader = BufReader::new(file);

        let mut provider = Self::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let lineno = idx + 1;
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
            if fields.len() != 8 {
                return Err(LinnaeaError::Parse(format!(
                    "lineage table line {}: expected 8 tab-separated fields, found {}",
                    lineno,
                    fields.len()
                )));
            }

            let id: u32 = fields[0].parse().map_err(|_| {
                LinnaeaError::Parse(format!(
                    "lineage table line {}: invalid taxon id `{}`",
                    lineno, fields[0]
                ))
            })?;

            let mut lineage = Lineage::unresolved();
            for (&rank, &name) in TaxonomicRank::ALL.iter().zip(&fields[1..]) {
                if !name.is_empty() && name != "NA" {
                    lineage.set(rank, name.to_string());
                }
            }
            provider.insert(TaxonId(id), lineage);
        }

        Ok(provider)
    }

    pub fn insert(&mut self, id: TaxonId, lineage: Lineage) {
        self.lineages.insert(id, lineage);
    }

    pub fn len(&self) -> usize {
        self.lineages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lineages.is_empty()
    }
}

impl LineageProvider for TableLineageProvider {
    fn lineage(&self, id: TaxonId) -> Result<Option<Lineage>> {
        Ok(self.lineages.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn lineage(names: [&str; 7]) -> Lineage {
        let mut l = Lineage::unresolved();
        for (&rank, name) in TaxonomicRank::ALL.iter().zip(names) {
            l.set(rank, name.to_string());
        }
        l
    }

    #[test]
    fn test_rank_parse_roundtrip() {
        for rank in TaxonomicRank::ALL {
            assert_eq!(TaxonomicRank::parse(rank.label()), Some(rank));
        }
        assert_eq!(TaxonomicRank::parse("superkingdom"), Some(TaxonomicRank::Kingdom));
        assert_eq!(TaxonomicRank::parse("no rank"), None);
    }

    #[test]
    fn test_species_only_fallback() {
        let l = Lineage::species_only("Gadus morhua");
        assert_eq!(l.species, "Gadus morhua");
        assert_eq!(l.kingdom, UNRESOLVED);
        assert!(!l.is_unresolved());
        assert!(Lineage::unresolved().is_unresolved());
    }

    #[test]
    fn test_agrees_through_prefix() {
        let a = lineage(["Metazoa", "Chordata", "Actinopteri", "Gadiformes", "Gadidae", "Gadus", "Gadus morhua"]);
        let b = lineage(["Metazoa", "Chordata", "Actinopteri", "Gadiformes", "Gadidae", "Gadus", "Gadus macrocephalus"]);

        assert!(a.agrees_through(&b, TaxonomicRank::Genus));
        assert!(!a.agrees_through(&b, TaxonomicRank::Species));
        assert!(a.agrees_through(&a, TaxonomicRank::Species));
    }

    #[test]
    fn test_table_provider_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# taxid\tlineage").unwrap();
        writeln!(
            file,
            "8049\tMetazoa\tChordata\tActinopteri\tGadiformes\tGadidae\tGadus\tGadus morhua"
        )
        .unwrap();
        writeln!(file, "8050\tMetazoa\tChordata\tActinopteri\tNA\tNA\tNA\tNA").unwrap();

        let provider = TableLineageProvider::load(file.path()).unwrap();
        assert_eq!(provider.len(), 2);

        let cod = provider.lineage(TaxonId(8049)).unwrap().unwrap();
        assert_eq!(cod.species, "Gadus morhua");

        let partial = provider.lineage(TaxonId(8050)).unwrap().unwrap();
        assert_eq!(partial.class, "Actinopteri");
        assert_eq!(partial.species, UNRESOLVED);

        assert!(provider.lineage(TaxonId(1)).unwrap().is_none());
    }

    #[test]
    fn test_table_provider_rejects_short_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "8049\tMetazoa\tChordata").unwrap();

        let err = TableLineageProvider::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
