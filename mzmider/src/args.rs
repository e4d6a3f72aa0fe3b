use std::fmt::Display;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use mzmid::{LabelSpacing, LabelingMetric, OverlapPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArgOverlapPolicy {
    #[default]
    /// Add a peak's intensity to every isotopologue window it falls in
    DoubleCount,
    /// Divide a peak's intensity evenly among the windows it falls in
    Split,
    /// Give a peak's intensity to the window whose target m/z is closest
    Nearest,
}

impl From<ArgOverlapPolicy> for OverlapPolicy {
    fn from(value: ArgOverlapPolicy) -> Self {
        match value {
            ArgOverlapPolicy::DoubleCount => OverlapPolicy::DoubleCount,
            ArgOverlapPolicy::Split => OverlapPolicy::Split,
            ArgOverlapPolicy::Nearest => OverlapPolicy::Nearest,
        }
    }
}

impl Display for ArgOverlapPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArgLabelSpacing {
    #[default]
    /// Space isotopologues by the carbon-13 neutron shift
    Carbon13,
    /// Space isotopologues by the deuterium mass defect, for heavy water labeling
    Deuterium,
}

impl From<ArgLabelSpacing> for LabelSpacing {
    fn from(value: ArgLabelSpacing) -> Self {
        match value {
            ArgLabelSpacing::Carbon13 => LabelSpacing::Carbon13,
            ArgLabelSpacing::Deuterium => LabelSpacing::Deuterium,
        }
    }
}

impl Display for ArgLabelSpacing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArgLabelingMetric {
    #[default]
    /// One minus the fraction of the unlabeled isotopologue
    UnlabeledDepletion,
    /// The depletion of the unlabeled isotopologue relative to its natural abundance
    NaturalAbundanceCorrected,
    /// The fraction of the isotopologue given by `--labeling-channel`
    ChannelFraction,
}

impl ArgLabelingMetric {
    pub fn to_metric(self, channel: usize) -> LabelingMetric {
        match self {
            Self::UnlabeledDepletion => LabelingMetric::UnlabeledDepletion,
            Self::NaturalAbundanceCorrected => LabelingMetric::NaturalAbundanceCorrected,
            Self::ChannelFraction => LabelingMetric::ChannelFraction { index: channel },
        }
    }
}

impl Display for ArgLabelingMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The unit retention times are given in by the identification table
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetentionTimeUnit {
    #[default]
    Minutes,
    Seconds,
}

impl RetentionTimeUnit {
    /// Convert `value` in this unit to minutes
    pub fn to_minutes(&self, value: f64) -> f64 {
        match self {
            Self::Minutes => value,
            Self::Seconds => value / 60.0,
        }
    }
}

impl Display for RetentionTimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
