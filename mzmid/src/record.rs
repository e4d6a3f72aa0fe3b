//! The input and output records of the extraction engine
use std::fmt::Display;

use mzpeaks::coordinate::Span1D;

/// How the neutral monoisotopic mass of a peptide is determined.
///
/// An explicit formula takes precedence over an explicit mass, which takes precedence over
/// the residue composition of the peptide sequence.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Composition {
    /// An elemental formula such as `C43H68N12O14`, which may include isotope
    /// specifications like `C[13]6`
    Formula(String),
    /// A precomputed neutral monoisotopic mass
    Mass(f64),
    /// A peptide sequence, possibly with flanking residues and bracketed mass
    /// modifications, e.g. `K.PEPTIDEK[+8.0142].R`
    Peptide(String),
}

/// A validated peptide identification, the unit of work of the extraction engine.
///
/// Retention times are in minutes, the unit of [`SpectralIndex`](crate::spectral_index::SpectralIndex).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IdentificationRecord {
    /// The position of this record in the identification table, the output key
    pub index: usize,
    pub sequence: String,
    pub composition: Composition,
    pub charge: i32,
    pub retention_time: f64,
    /// The q-value or comparable confidence score, lower is better
    pub q_value: f64,
    pub sample: String,
    pub protein: Option<String>,
    /// The native ID or scan number of the spectrum the peptide was identified from
    pub scan_id: Option<String>,
}

impl IdentificationRecord {
    /// Create a record whose mass is derived from its peptide sequence
    pub fn new(index: usize, sequence: impl Into<String>, charge: i32, retention_time: f64) -> Self {
        let sequence: String = sequence.into();
        Self {
            index,
            composition: Composition::Peptide(sequence.clone()),
            sequence,
            charge,
            retention_time,
            q_value: 0.0,
            sample: String::new(),
            protein: None,
            scan_id: None,
        }
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.composition = Composition::Formula(formula.into());
        self
    }

    pub fn with_mass(mut self, neutral_mass: f64) -> Self {
        self.composition = Composition::Mass(neutral_mass);
        self
    }

    pub fn with_q_value(mut self, q_value: f64) -> Self {
        self.q_value = q_value;
        self
    }

    pub fn with_sample(mut self, sample: impl Into<String>) -> Self {
        self.sample = sample.into();
        self
    }

    pub fn with_protein(mut self, protein: impl Into<String>) -> Self {
        self.protein = Some(protein.into());
        self
    }

    pub fn with_scan_id(mut self, scan_id: impl Into<String>) -> Self {
        self.scan_id = Some(scan_id.into());
        self
    }
}

/// The outcome of extracting a single record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MidStatus {
    #[default]
    Ok,
    /// The retention time window held no scans or was outside of the run
    InsufficientData,
    /// There was no monoisotopic signal to anchor the peak on
    NoPeakFound,
    /// A peak was found but every isotopologue integrated to zero
    ZeroArea,
    /// The charge, composition or retention time of the record was unusable
    InvalidInput,
    Cancelled,
}

impl MidStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::InsufficientData => "insufficient_data",
            Self::NoPeakFound => "no_peak_found",
            Self::ZeroArea => "zero_area",
            Self::InvalidInput => "invalid_input",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Display for MidStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The elution span a peak was integrated over, anchored on the apex of the
/// monoisotopic channel.
///
/// The indices are positions in the [`Chromatogram`](crate::chromatogram::Chromatogram)
/// the boundary was found in, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeakBoundary {
    pub start_time: f64,
    pub apex_time: f64,
    pub end_time: f64,
    pub start_index: usize,
    pub apex_index: usize,
    pub end_index: usize,
}

impl PeakBoundary {
    pub fn width(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// The number of chromatogram points inside the boundary
    pub fn len(&self) -> usize {
        self.end_index - self.start_index + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Span1D for PeakBoundary {
    type DimType = f64;

    fn start(&self) -> Self::DimType {
        self.start_time
    }

    fn end(&self) -> Self::DimType {
        self.end_time
    }
}

/// The mass isotopomer distribution of one identification record.
///
/// Built once at the end of a record's pipeline and never modified afterwards. Records that
/// failed extraction keep the identity fields, carry zero-filled vectors, and have
/// [`MidRecord::valid`] unset.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MidRecord {
    pub index: usize,
    pub sequence: String,
    pub charge: i32,
    pub retention_time: f64,
    pub q_value: f64,
    pub sample: String,
    pub protein: Option<String>,
    /// Integrated area of isotopologues `0..=k`
    pub raw_areas: Vec<f64>,
    /// `raw_areas` divided by their sum
    pub abundances: Vec<f64>,
    pub labeling: Option<f64>,
    pub valid: bool,
    pub status: MidStatus,
    pub message: Option<String>,
    pub boundary: Option<PeakBoundary>,
    /// The number of scans in the retention time window
    pub n_scans: usize,
}

impl MidRecord {
    /// Create an unfilled, invalid record carrying the identity of `record`
    pub fn empty(record: &IdentificationRecord, isotopologue_count: usize) -> Self {
        Self {
            index: record.index,
            sequence: record.sequence.clone(),
            charge: record.charge,
            retention_time: record.retention_time,
            q_value: record.q_value,
            sample: record.sample.clone(),
            protein: record.protein.clone(),
            raw_areas: vec![0.0; isotopologue_count],
            abundances: vec![0.0; isotopologue_count],
            labeling: None,
            valid: false,
            status: MidStatus::Ok,
            message: None,
            boundary: None,
            n_scans: 0,
        }
    }

    /// Create an invalid record flagged with the status of `error`
    pub fn failed(
        record: &IdentificationRecord,
        isotopologue_count: usize,
        error: &crate::error::ExtractionError,
    ) -> Self {
        let mut this = Self::empty(record, isotopologue_count);
        this.status = error.status();
        this.message = Some(error.to_string());
        this
    }

    pub fn isotopologue_count(&self) -> usize {
        self.raw_areas.len()
    }

    pub fn total_area(&self) -> f64 {
        self.raw_areas.iter().sum()
    }

    pub fn is_valid(&self) -> bool {
        self.valid && matches!(self.status, MidStatus::Ok)
    }
}
