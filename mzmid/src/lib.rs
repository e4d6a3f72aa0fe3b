//! Extract mass isotopomer distributions of identified peptides from LC-MS runs.
//!
//! For each [`IdentificationRecord`], the engine derives the m/z of every isotopologue
//! ([`isotopic_model`]), sums their signal in each scan of a retention time window
//! ([`extract`], [`chromatogram`]), integrates the resulting chromatograms over the elution
//! span of the monoisotopic peak ([`integrate`]) and normalizes the areas into fractional
//! abundances ([`normalize`]). [`MidExtractor`] runs these stages for a batch of records in
//! parallel against a shared [`SpectralIndex`].
pub mod chromatogram;
pub mod error;
pub mod extract;
pub mod integrate;
pub mod isotopic_model;
pub mod normalize;
pub mod pipeline;
pub mod record;
pub mod spectral_index;

pub use chromatogram::{Chromatogram, ChromatogramBuilder};
pub use error::{CompositionError, ExtractionError, IndexError, ParameterError};
pub use extract::{extract, ExtractedSample, OverlapPolicy, WindowExtractor};
pub use integrate::{BoundaryPolicy, IntegratedPeak, PeakIntegrator};
pub use isotopic_model::{isotopologue_specs, IsotopeModel, IsotopologueSpec, LabelSpacing};
pub use normalize::{normalize, LabelingMetric, Normalized};
pub use pipeline::{CancellationToken, ExtractionParams, MidExtractor, RunSummary};
pub use record::{Composition, IdentificationRecord, MidRecord, MidStatus, PeakBoundary};
pub use spectral_index::{Scan, ScanRange, SpectralIndex, SpectralIndexBuilder, SpectrumType};
