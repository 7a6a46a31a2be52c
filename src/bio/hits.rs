//! Tabular hit file parsing
//!
//! Consumes the similarity-search output produced upstream of the
//! classifier: BLAST tabular format with taxonomy columns appended
//! (`-outfmt "6 std qlen qcovs staxids sscinames"`).

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use crate::bio::taxonomy::TaxonId;
use crate::{LinnaeaError, Result};

/// Number of tab-separated fields expected per row
const HIT_COLUMNS: usize = 16;

/// One similarity-search result row.
///
/// Only the columns the classifier consumes are retained; the remaining
/// alignment columns are validated at parse time and dropped.
#[derive(Debug, Clone)]
pub struct Hit {
    pub query_id: String,
    pub subject_id: String,
    pub percent_identity: f64,
    pub evalue: f64,
    pub query_coverage: f64,
    pub taxon_id: Option<TaxonId>,
    pub scientific_name: String,
}

/// Read a hit table, keeping only rows at full query coverage.
///
/// The adaptive-margin model assumes every scored hit spans the whole
/// query, so partial-coverage rows are dropped at the door. When nothing
/// survives, the run cannot classify anything and aborts with
/// `FatalInput`.
pub fn read_hit_table<P: AsRef<Path>>(path: P) -> Result<Vec<Hit>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut hits = Vec::new();
    let mut total_rows = 0usize;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let lineno = idx + 1;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != HIT_COLUMNS {
            return Err(LinnaeaError::Parse(format!(
                "{}: line {}: expected {} tab-separated fields, found {}",
                path.display(),
                lineno,
                HIT_COLUMNS,
                fields.len()
            )));
        }
        total_rows += 1;

        // Alignment columns we do not retain still have to be well-formed
        for (pos, name) in [
            (3usize, "length"),
            (4, "mismatch"),
            (5, "gapopen"),
            (6, "qstart"),
            (7, "qend"),
            (8, "sstart"),
            (9, "send"),
            (12, "qlen"),
        ] {
            parse_field::<i64>(fields[pos], lineno, name)?;
        }
        parse_field::<f64>(fields[11], lineno, "bitscore")?;

        let percent_identity: f64 = parse_field(fields[2], lineno, "percent_identity")?;
        let evalue: f64 = parse_field(fields[10], lineno, "evalue")?;
        let query_coverage: f64 = parse_field(fields[13], lineno, "query_coverage")?;

        let hit = Hit {
            query_id: fields[0].trim().to_string(),
            subject_id: fields[1].trim().to_string(),
            percent_identity,
            evalue,
            query_coverage,
            taxon_id: parse_taxon_field(fields[14]),
            scientific_name: fields[15].trim().to_string(),
        };

        if hit.query_coverage >= 100.0 {
            hits.push(hit);
        }
    }

    if hits.is_empty() {
        return Err(LinnaeaError::FatalInput(format!(
            "{}: no hit with full query coverage among {} rows",
            path.display(),
            total_rows
        )));
    }

    Ok(hits)
}

fn parse_field<T: FromStr>(raw: &str, lineno: usize, field: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| {
        LinnaeaError::Parse(format!("line {}: invalid {} `{}`", lineno, field, raw.trim()))
    })
}

/// Parse the `staxids` cell. The search engine reports "N/A" for subjects
/// without taxonomy, and a `;`-separated list when an accession maps to
/// several taxa; the first id is the subject's primary taxon.
fn parse_taxon_field(raw: &str) -> Option<TaxonId> {
    let first = raw.split(';').next().unwrap_or("").trim();
    match first {
        "" | "N/A" | "n/a" | "0" => None,
        s => s.parse::<u32>().ok().map(TaxonId),
    }
}
