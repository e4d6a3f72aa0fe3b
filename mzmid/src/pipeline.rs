//! Per-record orchestration of the extraction engine and its parallel batch driver
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, instrument, trace};

use crate::chromatogram::ChromatogramBuilder;
use crate::error::{ExtractionError, ParameterError};
use crate::extract::{OverlapPolicy, WindowExtractor};
use crate::integrate::{BoundaryPolicy, PeakIntegrator};
use crate::isotopic_model::{IsotopeModel, LabelSpacing};
use crate::normalize::{normalize, LabelingMetric};
use crate::record::{IdentificationRecord, MidRecord, MidStatus};
use crate::spectral_index::SpectralIndex;

/// The tunable parameters of an extraction run
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct ExtractionParams {
    /// The highest isotopologue index tracked. Every record carries this many channels plus one.
    pub isotopologue_count: usize,
    pub mass_tolerance_ppm: f64,
    /// Half-width of the retention time window searched around each identification, in minutes
    pub retention_time_margin: f64,
    pub peak_boundary_fraction: f64,
    /// When set, integrate a fixed span of this many minutes on either side of the apex
    /// instead of walking down to `peak_boundary_fraction` of it
    pub apex_window: Option<f64>,
    /// The largest q-value an identification may have to be extracted
    #[cfg_attr(feature = "serde", serde(alias = "min_confidence"))]
    pub q_value_threshold: f64,
    pub overlap_policy: OverlapPolicy,
    pub label_spacing: LabelSpacing,
    pub labeling_metric: LabelingMetric,
}

impl Default for ExtractionParams {
    fn default() -> Self {
        Self {
            isotopologue_count: 5,
            mass_tolerance_ppm: 20.0,
            retention_time_margin: 1.0,
            peak_boundary_fraction: 0.05,
            apex_window: None,
            q_value_threshold: 0.01,
            overlap_policy: OverlapPolicy::default(),
            label_spacing: LabelSpacing::default(),
            labeling_metric: LabelingMetric::default(),
        }
    }
}

impl ExtractionParams {
    pub fn validate(&self) -> Result<(), ParameterError> {
        if !(self.mass_tolerance_ppm > 0.0 && self.mass_tolerance_ppm.is_finite()) {
            return Err(ParameterError::MassTolerance(self.mass_tolerance_ppm));
        }
        if !(self.retention_time_margin > 0.0 && self.retention_time_margin.is_finite()) {
            return Err(ParameterError::RetentionTimeMargin(
                self.retention_time_margin,
            ));
        }
        if !(0.0..=1.0).contains(&self.peak_boundary_fraction) {
            return Err(ParameterError::BoundaryFraction(self.peak_boundary_fraction));
        }
        if let Some(half_width) = self.apex_window {
            if !(half_width > 0.0 && half_width.is_finite()) {
                return Err(ParameterError::ApexWindow(half_width));
            }
        }
        if let LabelingMetric::ChannelFraction { index } = self.labeling_metric {
            if index > self.isotopologue_count {
                return Err(ParameterError::LabelingChannel {
                    index,
                    channels: self.channels(),
                });
            }
        }
        Ok(())
    }

    pub fn channels(&self) -> usize {
        self.isotopologue_count + 1
    }

    pub fn boundary_policy(&self) -> BoundaryPolicy {
        match self.apex_window {
            Some(half_width) => BoundaryPolicy::ApexWindow { half_width },
            None => BoundaryPolicy::ApexFraction {
                fraction: self.peak_boundary_fraction,
            },
        }
    }

    pub fn isotope_model(&self) -> IsotopeModel {
        IsotopeModel::new(self.isotopologue_count, self.label_spacing)
    }

    pub fn window_extractor(&self) -> WindowExtractor {
        WindowExtractor::new(self.mass_tolerance_ppm, self.overlap_policy)
    }

    pub fn chromatogram_builder(&self) -> ChromatogramBuilder {
        ChromatogramBuilder::new(self.window_extractor(), self.retention_time_margin)
    }

    pub fn integrator(&self) -> PeakIntegrator {
        PeakIntegrator::new(self.boundary_policy())
    }
}

/// A flag shared between a running batch and whoever may want to stop it
#[derive(Debug, Default, Clone)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Counts of how each record of a batch was disposed of
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunSummary {
    pub ok: usize,
    /// Records whose peak was found but whose areas summed to zero
    pub invalid_abundance: usize,
    pub insufficient_data: usize,
    pub no_peak_found: usize,
    pub invalid_input: usize,
    /// Records not meeting the q-value threshold
    pub filtered: usize,
    pub cancelled: usize,
}

impl RunSummary {
    fn filtered() -> Self {
        Self {
            filtered: 1,
            ..Default::default()
        }
    }

    fn cancelled() -> Self {
        Self {
            cancelled: 1,
            ..Default::default()
        }
    }

    fn from_record(record: &MidRecord) -> Self {
        let mut this = Self::default();
        match record.status {
            MidStatus::Ok if record.valid => this.ok += 1,
            MidStatus::Ok | MidStatus::ZeroArea => this.invalid_abundance += 1,
            MidStatus::InsufficientData => this.insufficient_data += 1,
            MidStatus::NoPeakFound => this.no_peak_found += 1,
            MidStatus::InvalidInput => this.invalid_input += 1,
            MidStatus::Cancelled => this.cancelled += 1,
        }
        this
    }

    /// The number of records that produced an output row
    pub fn written(&self) -> usize {
        self.ok
            + self.invalid_abundance
            + self.insufficient_data
            + self.no_peak_found
            + self.invalid_input
    }

    pub fn total(&self) -> usize {
        self.written() + self.filtered + self.cancelled
    }
}

impl Add for RunSummary {
    type Output = RunSummary;

    fn add(self, rhs: Self) -> Self::Output {
        let mut dup = self;
        dup += rhs;
        dup
    }
}

impl AddAssign for RunSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.ok += rhs.ok;
        self.invalid_abundance += rhs.invalid_abundance;
        self.insufficient_data += rhs.insufficient_data;
        self.no_peak_found += rhs.no_peak_found;
        self.invalid_input += rhs.invalid_input;
        self.filtered += rhs.filtered;
        self.cancelled += rhs.cancelled;
    }
}

impl Sum for RunSummary {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |a, b| a + b)
    }
}

enum Outcome {
    Filtered,
    Cancelled,
    Done(MidRecord),
}

impl Outcome {
    fn summary(&self) -> RunSummary {
        match self {
            Self::Filtered => RunSummary::filtered(),
            Self::Cancelled => RunSummary::cancelled(),
            Self::Done(record) => RunSummary::from_record(record),
        }
    }
}

/// Turns [`IdentificationRecord`]s into [`MidRecord`]s against a shared [`SpectralIndex`].
///
/// Records are independent of one another, so batches are processed in parallel on the
/// current rayon thread pool.
#[derive(Debug, Clone)]
pub struct MidExtractor<'a> {
    index: &'a SpectralIndex,
    params: ExtractionParams,
    model: IsotopeModel,
    chromatograms: ChromatogramBuilder,
    integrator: PeakIntegrator,
    token: CancellationToken,
}

impl<'a> MidExtractor<'a> {
    pub fn new(index: &'a SpectralIndex, params: ExtractionParams) -> Self {
        Self {
            index,
            params,
            model: params.isotope_model(),
            chromatograms: params.chromatogram_builder(),
            integrator: params.integrator(),
            token: CancellationToken::default(),
        }
    }

    /// Share `token` with this extractor so another thread can stop it
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn params(&self) -> &ExtractionParams {
        &self.params
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether `record` is confident enough to be extracted
    pub fn accepts(&self, record: &IdentificationRecord) -> bool {
        record.q_value <= self.params.q_value_threshold
    }

    fn check_cancelled(&self) -> Result<(), ExtractionError> {
        if self.token.is_cancelled() {
            Err(ExtractionError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run every stage of the extraction on `record`.
    ///
    /// A window without scans is not an error here, it yields a record flagged
    /// [`MidStatus::InsufficientData`].
    #[instrument(level = "debug", skip_all, fields(index = record.index, sequence = %record.sequence))]
    pub fn try_process(&self, record: &IdentificationRecord) -> Result<MidRecord, ExtractionError> {
        self.check_cancelled()?;
        let specs = self.model.specs(&record.composition, record.charge)?;

        self.check_cancelled()?;
        let chromatogram = self.chromatograms.try_build(record, &specs, self.index)?;
        let mut mid = MidRecord::empty(record, specs.len());
        mid.n_scans = chromatogram.len();
        if chromatogram.insufficient_data {
            mid.status = MidStatus::InsufficientData;
            mid.message = Some(format!(
                "No scans between {:0.3} and {:0.3}",
                record.retention_time - self.params.retention_time_margin,
                record.retention_time + self.params.retention_time_margin
            ));
            return Ok(mid);
        }

        self.check_cancelled()?;
        let peak = self.integrator.integrate(&chromatogram)?;
        let normalized = normalize(&peak.areas);
        let m0_weight = specs.first().map(|s| s.weight);
        mid.labeling = self.params.labeling_metric.compute(&normalized, m0_weight);
        mid.valid = normalized.valid;
        if !mid.valid {
            mid.status = MidStatus::ZeroArea;
            mid.message = Some("The integrated areas sum to zero".to_string());
        }
        mid.raw_areas = peak.areas;
        mid.abundances = normalized.fractions;
        mid.boundary = Some(peak.boundary);
        trace!(
            "Integrated {} from {:0.3} to {:0.3}: {:?}",
            record.sequence,
            peak.boundary.start_time,
            peak.boundary.end_time,
            mid.abundances
        );
        Ok(mid)
    }

    /// Process `record`, converting any per-record failure into a flagged [`MidRecord`].
    ///
    /// Returns `None` only when the run was cancelled before the record was complete.
    pub fn process(&self, record: &IdentificationRecord) -> Option<MidRecord> {
        match self.try_process(record) {
            Ok(mid) => Some(mid),
            Err(ExtractionError::Cancelled) => None,
            Err(e) => {
                debug!("Record {} ({}) failed: {e}", record.index, record.sequence);
                Some(MidRecord::failed(record, self.params.channels(), &e))
            }
        }
    }

    fn outcome(&self, record: &IdentificationRecord) -> Outcome {
        if self.token.is_cancelled() {
            Outcome::Cancelled
        } else if !self.accepts(record) {
            Outcome::Filtered
        } else {
            match self.process(record) {
                Some(mid) => Outcome::Done(mid),
                None => Outcome::Cancelled,
            }
        }
    }

    /// Process every record in parallel, returning the output rows in input order
    pub fn run_batch(&self, records: &[IdentificationRecord]) -> (Vec<MidRecord>, RunSummary) {
        let outcomes: Vec<Outcome> = records.par_iter().map(|r| self.outcome(r)).collect();
        let summary: RunSummary = outcomes.iter().map(Outcome::summary).sum();
        let rows = outcomes
            .into_iter()
            .filter_map(|o| match o {
                Outcome::Done(mid) => Some(mid),
                _ => None,
            })
            .collect();
        (rows, summary)
    }

    /// Process every record in parallel, handing each output row to `sink` as soon as it
    /// is complete along with its position in `records`. Rows arrive in no particular order.
    pub fn run_batch_with<F>(&self, records: &[IdentificationRecord], sink: F) -> RunSummary
    where
        F: Fn(usize, MidRecord) + Send + Sync,
    {
        records
            .par_iter()
            .enumerate()
            .map(|(i, record)| {
                let outcome = self.outcome(record);
                let summary = outcome.summary();
                if let Outcome::Done(mid) = outcome {
                    sink(i, mid);
                }
                summary
            })
            .sum()
    }
}
