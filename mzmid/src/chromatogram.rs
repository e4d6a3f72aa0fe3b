//! Extracted ion chromatograms of every isotopologue over a retention time window
use mzpeaks::coordinate::{SimpleInterval, Span1D};
use tracing::debug;

use crate::error::ExtractionError;
use crate::extract::WindowExtractor;
use crate::isotopic_model::IsotopologueSpec;
use crate::record::IdentificationRecord;
use crate::spectral_index::SpectralIndex;

/// One intensity trace per isotopologue over a shared, strictly increasing time axis.
///
/// Scans with the same start time are merged by summing their extracted intensities.
#[derive(Debug, Clone)]
pub struct Chromatogram {
    pub times: Vec<f64>,
    /// `channels[i][j]` is the intensity of isotopologue `i` at `times[j]`
    pub channels: Vec<Vec<f64>>,
    pub window: SimpleInterval<f64>,
    /// Set when the window held no scans
    pub insufficient_data: bool,
}

impl Chromatogram {
    pub fn empty(window: SimpleInterval<f64>, n_channels: usize) -> Self {
        Self {
            times: Vec::new(),
            channels: vec![Vec::new(); n_channels],
            window,
            insufficient_data: true,
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> Option<&[f64]> {
        self.channels.get(index).map(|c| c.as_slice())
    }

    /// Append the intensities of a scan at `time`, summing into the last point if the
    /// time is not past it
    pub fn push(&mut self, time: f64, intensities: &[f64]) {
        match self.times.last().copied() {
            Some(last) if time <= last => {
                self.channels
                    .iter_mut()
                    .zip(intensities)
                    .for_each(|(c, v)| {
                        if let Some(last) = c.last_mut() {
                            *last += *v;
                        }
                    });
            }
            _ => {
                self.times.push(time);
                self.channels
                    .iter_mut()
                    .zip(intensities)
                    .for_each(|(c, v)| c.push(*v));
                self.insufficient_data = false;
            }
        }
    }

    /// Iterate over (time, intensity) pairs of a single channel
    pub fn trace(&self, index: usize) -> impl Iterator<Item = (f64, f64)> + '_ {
        let channel = self.channels.get(index).map(|c| c.as_slice()).unwrap_or(&[]);
        self.times.iter().copied().zip(channel.iter().copied())
    }
}

/// Builds [`Chromatogram`]s around identified retention times
#[derive(Debug, Clone, Copy)]
pub struct ChromatogramBuilder {
    pub extractor: WindowExtractor,
    /// Half-width of the retention time window, in minutes
    pub margin: f64,
}

impl ChromatogramBuilder {
    pub fn new(extractor: WindowExtractor, margin: f64) -> Self {
        Self { extractor, margin }
    }

    pub fn window_for(&self, retention_time: f64) -> SimpleInterval<f64> {
        SimpleInterval::new(retention_time - self.margin, retention_time + self.margin)
    }

    /// Build the chromatogram of `specs` around `record`'s retention time, failing if the
    /// window is outside of `index`.
    pub fn try_build(
        &self,
        record: &IdentificationRecord,
        specs: &[IsotopologueSpec],
        index: &SpectralIndex,
    ) -> Result<Chromatogram, ExtractionError> {
        if !record.retention_time.is_finite() {
            return Err(ExtractionError::InvalidRetentionTime(record.retention_time));
        }
        let window = self.window_for(record.retention_time);
        let (start, end) = (window.start(), window.end());
        let scans = index.try_scans_in_range(start, end)?;
        let mut chromatogram = Chromatogram::empty(window, specs.len());
        for scan in scans {
            let intensities = self.extractor.extract(scan, specs);
            chromatogram.push(scan.time, &intensities);
        }
        if chromatogram.insufficient_data {
            debug!(
                "No scans between {start:0.3} and {end:0.3} for record {}",
                record.index
            );
        }
        Ok(chromatogram)
    }

    /// As [`ChromatogramBuilder::try_build`], but any failure yields an empty chromatogram
    /// flagged as having insufficient data
    pub fn build(
        &self,
        record: &IdentificationRecord,
        specs: &[IsotopologueSpec],
        index: &SpectralIndex,
    ) -> Chromatogram {
        match self.try_build(record, specs, index) {
            Ok(chrom) => chrom,
            Err(e) => {
                debug!("Failed to build chromatogram for record {}: {e}", record.index);
                Chromatogram::empty(self.window_for(record.retention_time), specs.len())
            }
        }
    }
}
