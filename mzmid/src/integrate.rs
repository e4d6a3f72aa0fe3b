//! Apex-anchored chromatographic peak boundaries and trapezoidal integration
use itertools::Itertools;
use mzpeaks::coordinate::Span1D;

use crate::chromatogram::Chromatogram;
use crate::error::ExtractionError;
use crate::record::PeakBoundary;

/// How the elution span is found around the apex of the monoisotopic channel
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum BoundaryPolicy {
    /// Walk outward from the apex while the intensity stays at or above
    /// `fraction * apex`. A fraction of zero spans the whole chromatogram.
    ApexFraction { fraction: f64 },
    /// A fixed span of `half_width` minutes on either side of the apex, clipped to the
    /// chromatogram
    ApexWindow { half_width: f64 },
}

impl Default for BoundaryPolicy {
    fn default() -> Self {
        Self::ApexFraction { fraction: 0.05 }
    }
}

/// Integrate `values` over `times` with the trapezoidal rule. Spacing may be uneven, and
/// fewer than two points integrate to zero.
pub fn trapezoid(times: &[f64], values: &[f64]) -> f64 {
    times
        .iter()
        .zip(values)
        .tuple_windows()
        .map(|((t0, v0), (t1, v1))| (t1 - t0) * (v0 + v1) / 2.0)
        .sum()
}

/// The integrated areas of every channel over a shared boundary
#[derive(Debug, Clone, PartialEq)]
pub struct IntegratedPeak {
    pub areas: Vec<f64>,
    pub boundary: PeakBoundary,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PeakIntegrator {
    pub policy: BoundaryPolicy,
}

impl PeakIntegrator {
    pub fn new(policy: BoundaryPolicy) -> Self {
        Self { policy }
    }

    /// Find the apex of channel 0, the earliest point if several share the maximum
    fn apex(channel: &[f64]) -> Option<(usize, f64)> {
        channel
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (i, v)| match best {
                Some((_, b)) if b >= v => best,
                _ => Some((i, v)),
            })
    }

    /// Locate the shared elution span in `chromatogram`, anchored on the apex of the
    /// monoisotopic channel
    pub fn find_boundary(&self, chromatogram: &Chromatogram) -> Result<PeakBoundary, ExtractionError> {
        let no_peak = || ExtractionError::NoPeakFound {
            start: chromatogram.window.start(),
            end: chromatogram.window.end(),
        };
        let channel = chromatogram.channel(0).ok_or_else(no_peak)?;
        let (apex_index, apex) = Self::apex(channel).ok_or_else(no_peak)?;
        if apex <= 0.0 || !apex.is_finite() {
            return Err(no_peak());
        }
        let times = &chromatogram.times;

        let (start_index, end_index) = match self.policy {
            BoundaryPolicy::ApexFraction { fraction } => {
                let threshold = fraction * apex;
                let mut start = apex_index;
                while start > 0 && channel[start - 1] >= threshold {
                    start -= 1;
                }
                let mut end = apex_index;
                while end + 1 < channel.len() && channel[end + 1] >= threshold {
                    end += 1;
                }
                (start, end)
            }
            BoundaryPolicy::ApexWindow { half_width } => {
                let apex_time = times[apex_index];
                let start = times.partition_point(|t| *t < apex_time - half_width);
                let end = times
                    .partition_point(|t| *t <= apex_time + half_width)
                    .saturating_sub(1);
                (start.min(apex_index), end.max(apex_index))
            }
        };

        Ok(PeakBoundary {
            start_time: times[start_index],
            apex_time: times[apex_index],
            end_time: times[end_index],
            start_index,
            apex_index,
            end_index,
        })
    }

    /// Integrate every channel of `chromatogram` over the boundary of its monoisotopic peak.
    ///
    /// Areas are never negative, and a boundary covering a single point has zero area.
    pub fn integrate(&self, chromatogram: &Chromatogram) -> Result<IntegratedPeak, ExtractionError> {
        let boundary = self.find_boundary(chromatogram)?;
        let span = boundary.start_index..=boundary.end_index;
        let times = &chromatogram.times[span.clone()];
        let areas = chromatogram
            .channels
            .iter()
            .map(|channel| trapezoid(times, &channel[span.clone()]).max(0.0))
            .collect();
        Ok(IntegratedPeak { areas, boundary })
    }
}
