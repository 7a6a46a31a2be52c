//! Deprecated taxon id remapping
//!
//! Taxonomy databases merge identifiers over time; hit tables produced
//! against an older reference can still carry the retired ids. The remap
//! table (NCBI `merged.dmp` semantics) maps each retired id to its
//! current one. An id absent from the table is already current.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::bio::taxonomy::TaxonId;
use crate::{LinnaeaError, Result};

/// Audit record for one remapped hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapEvent {
    pub query_id: String,
    pub old_id: TaxonId,
    pub new_id: TaxonId,
}

/// Static old-id to current-id lookup table
#[derive(Debug, Default)]
pub struct IdRemapTable {
    merged: HashMap<TaxonId, TaxonId>,
}

impl IdRemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from pairs, mainly for tests and embedding
    pub fn from_pairs<I: IntoIterator<Item = (u32, u32)>>(pairs: I) -> Self {
        Self {
            merged: pairs
                .into_iter()
                .map(|(old, new)| (TaxonId(old), TaxonId(new)))
                .collect(),
        }
    }

    /// Load a remap table from disk.
    ///
    /// Accepts both a plain two-column layout (`old<TAB>new`) and the
    /// NCBI merged.dmp field layout (`old\t|\tnew\t|`).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            LinnaeaError::Config(format!("cannot open remap table {}: {}", path.display(), e))
        })?;
        let reader = BufReader::new(file);

        let mut merged = HashMap::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let lineno = idx + 1;
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line
                .split('\t')
                .map(str::trim)
                .filter(|f| !f.is_empty() && *f != "|")
                .collect();
            if fields.len() != 2 {
                return Err(LinnaeaError::Parse(format!(
                    "remap table line {}: expected an old/new id pair, found {} fields",
                    lineno,
                    fields.len()
                )));
            }

            let old: u32 = parse_id(fields[0], lineno)?;
            let new: u32 = parse_id(fields[1], lineno)?;
            merged.insert(TaxonId(old), TaxonId(new));
        }

        Ok(Self { merged })
    }

    /// Map a deprecated id to its current id; identity when unmapped
    pub fn normalize(&self, id: TaxonId) -> TaxonId {
        self.merged.get(&id).copied().unwrap_or(id)
    }

    pub fn len(&self) -> usize {
        self.merged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merged.is_empty()
    }
}

fn parse_id(raw: &str, lineno: usize) -> Result<u32> {
    raw.parse().map_err(|_| {
        LinnaeaError::Parse(format!("remap table line {}: invalid taxon id `{}`", lineno, raw))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_unmapped_id_passes_through() {
        let table = IdRemapTable::from_pairs([(9606, 9607)]);
        assert_eq!(table.normalize(TaxonId(9606)), TaxonId(9607));
        assert_eq!(table.normalize(TaxonId(8049)), TaxonId(8049));
    }

    #[test]
    fn test_load_plain_two_column_layout() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# old\tnew").unwrap();
        writeln!(file, "9606\t9607").unwrap();
        writeln!(file, "12\t74109").unwrap();

        let table = IdRemapTable::load(file.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.normalize(TaxonId(12)), TaxonId(74109));
    }

    #[test]
    fn test_load_merged_dmp_layout() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "12\t|\t74109\t|").unwrap();
        writeln!(file, "30\t|\t29\t|").unwrap();

        let table = IdRemapTable::load(file.path()).unwrap();
        assert_eq!(table.normalize(TaxonId(12)), TaxonId(74109));
        assert_eq!(table.normalize(TaxonId(30)), TaxonId(29));
    }

    #[test]
    fn test_malformed_line_is_reported_with_line_number() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "9606\t9607").unwrap();
        writeln!(file, "only_one_field").unwrap();

        match IdRemapTable::load(file.path()) {
            Err(LinnaeaError::Parse(msg)) => assert!(msg.contains("line 2")),
            other => panic!("expected Parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_table_is_a_config_error() {
        match IdRemapTable::load("/nonexistent/merged.dmp") {
            Err(LinnaeaError::Config(msg)) => assert!(msg.contains("remap table")),
            other => panic!("expected Config error, got {:?}", other),
        }
    }
}
