//! Turning integrated isotopologue areas into fractional abundances
use tracing::trace;

/// A summary of label incorporation derived from a normalized distribution
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum LabelingMetric {
    /// `1 - a0 / sum`, the depletion of the unlabeled isotopologue
    #[default]
    UnlabeledDepletion,
    /// `1 - (a0 / sum) / w0` where `w0` is the theoretical natural-abundance fraction of the
    /// monoisotopic peak, clamped to `[0, 1]`
    NaturalAbundanceCorrected,
    /// The fraction of a single isotopologue, `a_i / sum`
    ChannelFraction { index: usize },
}

impl LabelingMetric {
    /// Compute the metric from normalized `fractions`. Returns `None` when the distribution
    /// carries no signal or the metric's inputs are unavailable.
    pub fn compute(&self, normalized: &Normalized, m0_weight: Option<f64>) -> Option<f64> {
        if !normalized.valid {
            return None;
        }
        let fractions = &normalized.fractions;
        match self {
            Self::UnlabeledDepletion => fractions.first().map(|f0| 1.0 - f0),
            Self::NaturalAbundanceCorrected => {
                let f0 = *fractions.first()?;
                let w0 = m0_weight.filter(|w| *w > 0.0)?;
                Some((1.0 - f0 / w0).clamp(0.0, 1.0))
            }
            Self::ChannelFraction { index } => fractions.get(*index).copied(),
        }
    }
}

/// Fractional abundances that sum to 1, or all zeros flagged invalid when there was no
/// signal to normalize
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Normalized {
    pub fractions: Vec<f64>,
    pub valid: bool,
}

/// Divide each area by the total area
pub fn normalize(raw_areas: &[f64]) -> Normalized {
    let total: f64 = raw_areas.iter().sum();
    if total > 0.0 && total.is_finite() {
        Normalized {
            fractions: raw_areas.iter().map(|a| a / total).collect(),
            valid: true,
        }
    } else {
        trace!("Cannot normalize areas summing to {total}");
        Normalized {
            fractions: vec![0.0; raw_areas.len()],
            valid: false,
        }
    }
}
