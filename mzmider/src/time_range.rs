use std::{num::ParseFloatError, ops::Range, str::FromStr};

use mzpeaks::coordinate::Span1D;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A retention time interval in minutes, open ended by default
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }
}

impl Span1D for TimeRange {
    type DimType = f64;

    fn start(&self) -> Self::DimType {
        self.start
    }

    fn end(&self) -> Self::DimType {
        self.end
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self {
            start: 0.0,
            end: f64::INFINITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimeRangeParseError {
    #[error("Failed to parse time range start {0}")]
    MalformedStart(#[source] ParseFloatError),
    #[error("Failed to parse time range end {0}")]
    MalformedEnd(#[source] ParseFloatError),
    #[error("A time range must be denoted (start?)-(stop?), got {0:?}")]
    MissingSeparator(String),
    #[error("The time range start {start} is after its end {end}")]
    Inverted { start: f64, end: f64 },
}

impl FromStr for TimeRange {
    type Err = TimeRangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let separator = [' ', ':', '-']
            .into_iter()
            .find(|c| s.contains(*c))
            .ok_or_else(|| TimeRangeParseError::MissingSeparator(s.to_string()))?;
        let (start_s, end_s) = s
            .split_once(separator)
            .ok_or_else(|| TimeRangeParseError::MissingSeparator(s.to_string()))?;

        let start = if start_s.is_empty() {
            0.0
        } else {
            start_s.parse().map_err(TimeRangeParseError::MalformedStart)?
        };
        let end = if end_s.is_empty() {
            f64::INFINITY
        } else {
            end_s.parse().map_err(TimeRangeParseError::MalformedEnd)?
        };
        if start > end {
            return Err(TimeRangeParseError::Inverted { start, end });
        }
        Ok(TimeRange { start, end })
    }
}

impl From<Range<f64>> for TimeRange {
    fn from(value: Range<f64>) -> Self {
        Self::new(value.start, value.end)
    }
}

impl From<(f64, f64)> for TimeRange {
    fn from(value: (f64, f64)) -> Self {
        Self::new(value.0, value.1)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_time_fromstr() -> Result<(), TimeRangeParseError> {
        let t: TimeRange = "52.0-".parse()?;
        assert_eq!(t.start(), 52.0);
        assert_eq!(t.end(), f64::INFINITY);

        let t: TimeRange = "-52.0".parse()?;
        assert_eq!(t.start(), 0.0);
        assert_eq!(t.end(), 52.0);

        let t: TimeRange = "32-52.0".parse()?;
        assert_eq!(t.start(), 32.0);
        assert_eq!(t.end(), 52.0);

        let t: TimeRange = "10.5:12".parse()?;
        assert_eq!(t, TimeRange::new(10.5, 12.0));

        let t: TimeRange = "-".parse()?;
        assert_eq!(t, TimeRange::default());

        Ok(())
    }

    #[test]
    fn test_time_fromstr_malformed() {
        assert!(matches!(
            "a-".parse::<TimeRange>(),
            Err(TimeRangeParseError::MalformedStart(_))
        ));
        assert!(matches!(
            "-b".parse::<TimeRange>(),
            Err(TimeRangeParseError::MalformedEnd(_))
        ));
        // Both ends are wrong, the start is reported first
        assert!(matches!(
            "a-b".parse::<TimeRange>(),
            Err(TimeRangeParseError::MalformedStart(_))
        ));
        assert!(matches!(
            "52".parse::<TimeRange>(),
            Err(TimeRangeParseError::MissingSeparator(_))
        ));
        assert!(matches!(
            "20-10".parse::<TimeRange>(),
            Err(TimeRangeParseError::Inverted { .. })
        ));
    }
}
