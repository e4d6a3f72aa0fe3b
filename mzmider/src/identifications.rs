//! Loading the identification table into validated [`IdentificationRecord`]s
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::Path;

use flate2::read::MultiGzDecoder;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use mzmid::{IdentificationRecord, SpectralIndex};

use crate::args::RetentionTimeUnit;
use crate::progress::ProgressRecord;

#[derive(Debug, Error)]
pub enum IdentificationLoadError {
    #[error("Failed to read the identification table: {0}")]
    IOError(
        #[source]
        #[from]
        io::Error,
    ),
    #[error("Failed to parse the identification table: {0}")]
    CSVError(
        #[source]
        #[from]
        csv::Error,
    ),
    #[error("The identification table is missing a {0:?} column")]
    MissingColumn(&'static str),
    #[error("Row {row} could not be parsed: {source}")]
    MalformedRow {
        row: usize,
        #[source]
        source: csv::Error,
    },
    #[error("Row {row} has an empty peptide sequence")]
    EmptySequence { row: usize },
    #[error("Row {row} has neither a retention time nor a scan ID that could be resolved")]
    MissingRetentionTime { row: usize },
}

/// A row of the identification table as written, before validation.
///
/// Column names of common search engine outputs are accepted as aliases.
#[derive(Debug, Clone, Deserialize)]
struct RawIdentification {
    #[serde(alias = "peptide")]
    sequence: String,
    #[serde(alias = "z")]
    charge: i32,
    #[serde(default)]
    formula: Option<String>,
    #[serde(default, alias = "calcmass")]
    mass: Option<f64>,
    #[serde(default, alias = "rt")]
    retention_time: Option<f64>,
    #[serde(default, alias = "scannr", alias = "scan")]
    scan_id: Option<String>,
    #[serde(default, alias = "spectrum_q", alias = "q")]
    q_value: Option<f64>,
    #[serde(default, alias = "filename")]
    sample: Option<String>,
    #[serde(default, alias = "proteins")]
    protein: Option<String>,
}

const SEQUENCE_COLUMNS: &[&str] = &["sequence", "peptide"];
const CHARGE_COLUMNS: &[&str] = &["charge", "z"];

/// Split a protein column value into its accessions. Search engines separate the proteins
/// of a shared peptide with `;`, some with `,`.
fn accessions(protein: &str) -> impl Iterator<Item = &str> {
    protein
        .split([';', ','])
        .map(str::trim)
        .filter(|a| !a.is_empty())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let v = v.trim();
        (!v.is_empty()).then(|| v.to_string())
    })
}

/// How identification rows are turned into records
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub retention_time_unit: RetentionTimeUnit,
    /// Rows with a larger q-value are dropped
    pub q_value_threshold: f64,
    /// The sample name given to rows without one
    pub default_sample: String,
    /// Drop peptides that map to more than one protein
    pub unique_only: bool,
}

impl LoadOptions {
    fn validate(
        &self,
        row: usize,
        raw: RawIdentification,
        index: &SpectralIndex,
    ) -> Result<IdentificationRecord, IdentificationLoadError> {
        let sequence = raw.sequence.trim().to_string();
        if sequence.is_empty() {
            return Err(IdentificationLoadError::EmptySequence { row });
        }
        let scan_id = non_empty(raw.scan_id);
        let retention_time = match raw.retention_time {
            Some(rt) => self.retention_time_unit.to_minutes(rt),
            None => scan_id
                .as_deref()
                .and_then(|id| index.time_of_scan(id))
                .ok_or(IdentificationLoadError::MissingRetentionTime { row })?,
        };

        let mut record = IdentificationRecord::new(row, sequence, raw.charge, retention_time)
            .with_q_value(raw.q_value.unwrap_or_default())
            .with_sample(non_empty(raw.sample).unwrap_or_else(|| self.default_sample.clone()));
        if let Some(formula) = non_empty(raw.formula) {
            record = record.with_formula(formula);
        } else if let Some(mass) = raw.mass {
            record = record.with_mass(mass);
        }
        if let Some(protein) = non_empty(raw.protein) {
            record = record.with_protein(protein);
        }
        if let Some(scan_id) = scan_id {
            record = record.with_scan_id(scan_id);
        }
        Ok(record)
    }

    /// Read identifications from a tab-separated table.
    ///
    /// Rows that cannot be parsed or validated are logged and skipped, as are rows whose
    /// q-value exceeds the threshold. Records are numbered by their row in the table.
    pub fn read_identifications<R: io::Read>(
        &self,
        reader: R,
        index: &SpectralIndex,
    ) -> Result<(Vec<IdentificationRecord>, ProgressRecord), IdentificationLoadError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let has_column = |names: &[&str]| headers.iter().any(|h| names.contains(&h));
        if !has_column(SEQUENCE_COLUMNS) {
            return Err(IdentificationLoadError::MissingColumn("sequence"));
        }
        if !has_column(CHARGE_COLUMNS) {
            return Err(IdentificationLoadError::MissingColumn("charge"));
        }

        let mut progress = ProgressRecord::default();
        let mut records = Vec::new();
        for (row, raw) in reader.deserialize::<RawIdentification>().enumerate() {
            progress.identifications_read += 1;
            let validated = raw
                .map_err(|source| IdentificationLoadError::MalformedRow { row, source })
                .and_then(|raw| self.validate(row, raw, index));
            match validated {
                Ok(record) if record.q_value > self.q_value_threshold => {
                    debug!(
                        "Row {row} ({}) has q-value {} above the threshold",
                        record.sequence, record.q_value
                    );
                    progress.identifications_filtered += 1;
                }
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!("Skipping identification: {e}");
                    progress.identifications_skipped += 1;
                }
            }
        }
        if self.unique_only {
            let before = records.len();
            records = retain_unique(records);
            progress.identifications_shared += before - records.len();
        }
        Ok((records, progress))
    }

    /// Read identifications from `path`, decompressing it if it ends in `.gz`
    pub fn read_identifications_path<P: AsRef<Path>>(
        &self,
        path: P,
        index: &SpectralIndex,
    ) -> Result<(Vec<IdentificationRecord>, ProgressRecord), IdentificationLoadError> {
        let path = path.as_ref();
        let handle = io::BufReader::new(fs::File::open(path)?);
        if path.extension().is_some_and(|ext| ext == "gz") {
            self.read_identifications(MultiGzDecoder::new(handle), index)
        } else {
            self.read_identifications(handle, index)
        }
    }
}

/// Keep the records whose peptide sequence is attributed to exactly one protein accession
/// across the whole table. Records without a protein are kept.
fn retain_unique(records: Vec<IdentificationRecord>) -> Vec<IdentificationRecord> {
    let mut proteins_of: HashMap<&str, HashSet<&str>> = HashMap::new();
    for record in records.iter() {
        if let Some(protein) = record.protein.as_deref() {
            proteins_of
                .entry(record.sequence.as_str())
                .or_default()
                .extend(accessions(protein));
        }
    }
    let shared: HashSet<String> = proteins_of
        .into_iter()
        .filter(|(_, proteins)| proteins.len() > 1)
        .map(|(sequence, _)| sequence.to_string())
        .collect();
    records
        .into_iter()
        .filter(|record| {
            let keep = !shared.contains(&record.sequence);
            if !keep {
                debug!("Dropping shared peptide {}", record.sequence);
            }
            keep
        })
        .collect()
}

#[cfg(test)]
mod test {
    use mzmid::{Composition, Scan};

    use super::*;

    fn index() -> SpectralIndex {
        (0..5)
            .map(|i| Scan::new(i, format!("scan={}", i + 1), 10.0 + i as f64, vec![]))
            .collect()
    }

    fn options() -> LoadOptions {
        LoadOptions {
            retention_time_unit: RetentionTimeUnit::Minutes,
            q_value_threshold: 0.01,
            default_sample: "run".to_string(),
            unique_only: false,
        }
    }

    #[test]
    fn test_read_table() {
        let table = "sequence\tcharge\tretention_time\tscan_id\tq_value\tformula\tmass\textra\n\
                     PEPTIDE\t2\t12.5\t\t0.001\t\t\tx\n\
                     PEPTIDE\t3\t\tscan=3\t0.002\tC34H53N7O15\t\tx\n\
                     SAMPLER\t2\t11\t\t0.5\t\t\tx\n\
                     SAMPLER\t2\t11\t\t\t\t800.5\tx\n\
                     SAMPLER\ttwo\t11\t\t0.001\t\t\tx\n\
                     SAMPLER\t2\t\tscan=99\t0.001\t\t\tx\n";
        let (records, progress) = options()
            .read_identifications(table.as_bytes(), &index())
            .unwrap();
        assert_eq!(progress.identifications_read, 6);
        assert_eq!(progress.identifications_filtered, 1);
        assert_eq!(progress.identifications_skipped, 2);
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].index, 0);
        assert_eq!(records[0].composition, Composition::Peptide("PEPTIDE".into()));
        assert_eq!(records[0].sample, "run");
        assert_eq!(records[0].retention_time, 12.5);

        assert_eq!(records[1].index, 1);
        assert_eq!(records[1].retention_time, 12.0);
        assert_eq!(records[1].scan_id.as_deref(), Some("scan=3"));
        assert_eq!(
            records[1].composition,
            Composition::Formula("C34H53N7O15".into())
        );

        assert_eq!(records[2].index, 3);
        assert_eq!(records[2].composition, Composition::Mass(800.5));
        assert_eq!(records[2].q_value, 0.0);
    }

    #[test]
    fn test_search_engine_columns() {
        let table = "peptide\tcharge\trt\tspectrum_q\tfilename\tproteins\n\
                     PEPTIDE\t2\t630.0\t0.001\tday-1.mzML\tsp|P1|X\n";
        let opts = LoadOptions {
            retention_time_unit: RetentionTimeUnit::Seconds,
            ..options()
        };
        let (records, _) = opts.read_identifications(table.as_bytes(), &index()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].retention_time, 10.5);
        assert_eq!(records[0].sample, "day-1.mzML");
        assert_eq!(records[0].protein.as_deref(), Some("sp|P1|X"));
    }

    #[test]
    fn test_unique_only() {
        let table = "sequence\tcharge\tretention_time\tprotein\n\
                     PEPTIDE\t2\t11\tsp|P1|A\n\
                     SAMPLER\t2\t11\tsp|P1|A;sp|P2|B\n\
                     ELVISK\t2\t11\tsp|P1|A\n\
                     ELVISK\t3\t11\tsp|P3|C\n\
                     LIVESK\t2\t11\t\n\
                     PEPTIDE\t3\t12\tsp|P1|A\n";

        let (records, progress) = options()
            .read_identifications(table.as_bytes(), &index())
            .unwrap();
        assert_eq!(records.len(), 6);
        assert_eq!(progress.identifications_shared, 0);

        let opts = LoadOptions {
            unique_only: true,
            ..options()
        };
        let (records, progress) = opts.read_identifications(table.as_bytes(), &index()).unwrap();
        let kept: Vec<(&str, i32)> = records
            .iter()
            .map(|r| (r.sequence.as_str(), r.charge))
            .collect();
        assert_eq!(kept, [("PEPTIDE", 2), ("LIVESK", 2), ("PEPTIDE", 3)]);
        assert_eq!(progress.identifications_shared, 3);
        assert_eq!(progress.identifications_read, 6);
    }

    #[test]
    fn test_missing_columns() {
        let table = "sequence\tretention_time\nPEPTIDE\t10\n";
        assert!(matches!(
            options().read_identifications(table.as_bytes(), &index()),
            Err(IdentificationLoadError::MissingColumn("charge"))
        ));
    }
}
