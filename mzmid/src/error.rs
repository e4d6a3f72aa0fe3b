//! Error types for the extraction engine.
//!
//! Every variant of [`ExtractionError`] is local to a single identification record. The
//! pipeline converts them into flagged [`MidRecord`](crate::record::MidRecord)s instead of
//! propagating them out of a batch.
use thiserror::Error;

use crate::record::MidStatus;

/// Failures to turn a formula, peptide sequence or mass into a neutral monoisotopic mass
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompositionError {
    #[error("Failed to parse chemical formula {formula:?}: {reason}")]
    MalformedFormula { formula: String, reason: String },
    #[error("Unknown residue {residue:?} in peptide {sequence:?}")]
    UnknownResidue { residue: char, sequence: String },
    #[error("Malformed modification {modification:?} in peptide {sequence:?}")]
    MalformedModification {
        modification: String,
        sequence: String,
    },
    #[error("The composition is empty")]
    Empty,
    #[error("The neutral mass {0} is not a positive, finite value")]
    InvalidMass(f64),
}

/// Failures to answer a retention time range query against a
/// [`SpectralIndex`](crate::spectral_index::SpectralIndex)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndexError {
    #[error("The spectral index holds no scans")]
    Empty,
    #[error("The time window {start:0.3}-{end:0.3} is not a valid interval")]
    InvalidWindow { start: f64, end: f64 },
    #[error(
        "Retention time window {start:0.3}-{end:0.3} lies outside of the spectral source's span {span_start:0.3}-{span_end:0.3}"
    )]
    OutOfRange {
        start: f64,
        end: f64,
        span_start: f64,
        span_end: f64,
    },
}

/// The error taxonomy of the per-record extraction pipeline
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractionError {
    #[error("Charge state {0} is not a positive integer")]
    InvalidCharge(i32),
    #[error("The composition could not be resolved to a mass: {0}")]
    InvalidComposition(
        #[source]
        #[from]
        CompositionError,
    ),
    #[error("Retention time {0} is not a finite value")]
    InvalidRetentionTime(f64),
    #[error(
        "Retention time window {start:0.3}-{end:0.3} lies outside of the spectral source's span {span_start:0.3}-{span_end:0.3}"
    )]
    OutOfRange {
        start: f64,
        end: f64,
        span_start: f64,
        span_end: f64,
    },
    #[error("The spectral index holds no scans")]
    EmptyIndex,
    #[error("No signal was found for the monoisotopic peak between {start:0.3} and {end:0.3}")]
    NoPeakFound { start: f64, end: f64 },
    #[error("The extraction was cancelled")]
    Cancelled,
}

impl From<IndexError> for ExtractionError {
    fn from(value: IndexError) -> Self {
        match value {
            IndexError::Empty => Self::EmptyIndex,
            IndexError::InvalidWindow { start, .. } => Self::InvalidRetentionTime(start),
            IndexError::OutOfRange {
                start,
                end,
                span_start,
                span_end,
            } => Self::OutOfRange {
                start,
                end,
                span_start,
                span_end,
            },
        }
    }
}

impl ExtractionError {
    /// The output flag a record failing with this error carries
    pub fn status(&self) -> MidStatus {
        match self {
            Self::InvalidCharge(_)
            | Self::InvalidComposition(_)
            | Self::InvalidRetentionTime(_) => MidStatus::InvalidInput,
            Self::OutOfRange { .. } | Self::EmptyIndex => MidStatus::InsufficientData,
            Self::NoPeakFound { .. } => MidStatus::NoPeakFound,
            Self::Cancelled => MidStatus::Cancelled,
        }
    }
}

/// Extraction parameters that cannot describe a run
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("The mass tolerance must be a positive number of ppm, got {0}")]
    MassTolerance(f64),
    #[error("The retention time margin must be a positive number of minutes, got {0}")]
    RetentionTimeMargin(f64),
    #[error("The peak boundary fraction must lie in [0, 1], got {0}")]
    BoundaryFraction(f64),
    #[error("The apex window half-width must be a positive number of minutes, got {0}")]
    ApexWindow(f64),
    #[error("The labeling channel {index} is not tracked when only {channels} isotopologues are extracted")]
    LabelingChannel { index: usize, channels: usize },
}
