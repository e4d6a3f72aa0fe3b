//! Per-scan, per-isotopologue intensity extraction within m/z tolerance windows
use std::ops::Range;

use mzpeaks::Tolerance;

use crate::isotopic_model::IsotopologueSpec;
use crate::spectral_index::Scan;

/// How a peak that falls inside more than one isotopologue's window is attributed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum OverlapPolicy {
    /// The peak's full intensity is added to every window containing it
    #[default]
    DoubleCount,
    /// A peak inside `n` windows contributes `1/n` of its intensity to each
    Split,
    /// The peak contributes only to the window with the closest target m/z, ties going to
    /// the lower isotopologue
    Nearest,
}

/// The summed intensity of one isotopologue in one scan
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ExtractedSample {
    pub retention_time: f64,
    pub isotopologue_index: usize,
    pub summed_intensity: f64,
}

/// Sums the signal of each isotopologue's m/z window in a scan
#[derive(Debug, Clone, Copy)]
pub struct WindowExtractor {
    pub tolerance: Tolerance,
    pub overlap_policy: OverlapPolicy,
}

impl Default for WindowExtractor {
    fn default() -> Self {
        Self::new(20.0, OverlapPolicy::DoubleCount)
    }
}

impl WindowExtractor {
    pub fn new(tolerance_ppm: f64, overlap_policy: OverlapPolicy) -> Self {
        Self {
            tolerance: Tolerance::PPM(tolerance_ppm),
            overlap_policy,
        }
    }

    fn windows(&self, scan: &Scan, specs: &[IsotopologueSpec]) -> Vec<Range<usize>> {
        specs
            .iter()
            .map(|spec| {
                let (low, high) = self.tolerance.bounds(spec.mz);
                scan.search(low, high)
            })
            .collect()
    }

    /// Compute the summed intensity of each spec's window in `scan`, in spec order.
    /// Windows without any peaks sum to zero.
    pub fn extract(&self, scan: &Scan, specs: &[IsotopologueSpec]) -> Vec<f64> {
        let windows = self.windows(scan, specs);
        match self.overlap_policy {
            OverlapPolicy::DoubleCount => windows
                .iter()
                .map(|iv| {
                    scan.intensity[iv.clone()]
                        .iter()
                        .map(|i| *i as f64)
                        .sum()
                })
                .collect(),
            OverlapPolicy::Split => windows
                .iter()
                .map(|iv| {
                    iv.clone()
                        .map(|j| {
                            let shared = windows.iter().filter(|w| w.contains(&j)).count();
                            scan.intensity[j] as f64 / shared as f64
                        })
                        .sum()
                })
                .collect(),
            OverlapPolicy::Nearest => {
                let mut totals = vec![0.0; specs.len()];
                for (i, iv) in windows.iter().enumerate() {
                    for j in iv.clone() {
                        let mz = scan.mz[j];
                        let owner = windows
                            .iter()
                            .enumerate()
                            .filter(|(_, w)| w.contains(&j))
                            .map(|(k, _)| (k, (specs[k].mz - mz).abs()))
                            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
                            .map(|(k, _)| k);
                        if owner == Some(i) {
                            totals[i] += scan.intensity[j] as f64;
                        }
                    }
                }
                totals
            }
        }
    }

    /// As [`WindowExtractor::extract`], labeling each value with its scan time and isotopologue
    pub fn samples(&self, scan: &Scan, specs: &[IsotopologueSpec]) -> Vec<ExtractedSample> {
        self.extract(scan, specs)
            .into_iter()
            .zip(specs)
            .map(|(summed_intensity, spec)| ExtractedSample {
                retention_time: scan.time,
                isotopologue_index: spec.index,
                summed_intensity,
            })
            .collect()
    }
}

/// Sum the intensities of the peaks within `tolerance_ppm` of each spec's m/z, counting
/// peaks inside overlapping windows once per window
pub fn extract(scan: &Scan, specs: &[IsotopologueSpec], tolerance_ppm: f64) -> Vec<(usize, f64)> {
    WindowExtractor::new(tolerance_ppm, OverlapPolicy::DoubleCount)
        .extract(scan, specs)
        .into_iter()
        .zip(specs)
        .map(|(total, spec)| (spec.index, total))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn spec(index: usize, mz: f64) -> IsotopologueSpec {
        IsotopologueSpec {
            index,
            mz_offset: 0.0,
            mz,
            weight: 0.0,
        }
    }

    #[test]
    fn test_inclusive_bounds() {
        let (low, high) = Tolerance::PPM(20.0).bounds(500.0);
        let scan = Scan::new(
            0,
            "s",
            1.0,
            vec![
                (low, 1.0),
                (500.0, 10.0),
                (high, 100.0),
                (high + 1e-4, 1000.0),
                (low - 1e-4, 1000.0),
            ],
        );
        let values = extract(&scan, &[spec(0, 500.0)], 20.0);
        assert_eq!(values, vec![(0, 111.0)]);
    }

    #[test]
    fn test_empty_window() {
        let scan = Scan::new(0, "s", 1.0, vec![(600.0, 10.0)]);
        let values = extract(&scan, &[spec(0, 500.0), spec(1, 500.5)], 20.0);
        assert_eq!(values, vec![(0, 0.0), (1, 0.0)]);

        let scan = Scan::new(0, "s", 1.0, vec![]);
        let values = extract(&scan, &[spec(0, 500.0)], 20.0);
        assert_eq!(values, vec![(0, 0.0)]);
    }

    #[test]
    fn test_overlap_policies() {
        // Two targets 0.004 apart with 10 ppm (0.005) windows share the peak at 500.003
        let specs = [spec(0, 500.0), spec(1, 500.004)];
        let scan = Scan::new(0, "s", 1.0, vec![(500.003, 100.0)]);

        let double = WindowExtractor::new(10.0, OverlapPolicy::DoubleCount).extract(&scan, &specs);
        assert_eq!(double, vec![100.0, 100.0]);

        let split = WindowExtractor::new(10.0, OverlapPolicy::Split).extract(&scan, &specs);
        assert_eq!(split, vec![50.0, 50.0]);

        let nearest = WindowExtractor::new(10.0, OverlapPolicy::Nearest).extract(&scan, &specs);
        assert_eq!(nearest, vec![0.0, 100.0]);

        let tied = Scan::new(0, "s", 1.0, vec![(500.002, 100.0)]);
        let nearest = WindowExtractor::new(10.0, OverlapPolicy::Nearest).extract(&tied, &specs);
        assert_eq!(nearest.iter().sum::<f64>(), 100.0);
    }

    #[test]
    fn test_high_charge_overlap() {
        use crate::isotopic_model::{IsotopeModel, LabelSpacing};
        use crate::record::Composition;

        // At charge 20 isotopologues are ~0.05 m/z apart, so a window as wide as that
        // spacing reaches into the neighboring target
        let specs = IsotopeModel::new(2, LabelSpacing::Carbon13)
            .specs(&Composition::Mass(5000.0), 20)
            .unwrap();
        assert_eq!(specs.len(), 3);
        let spacing = specs[1].mz - specs[0].mz;
        assert!((spacing - 1.00335 / 20.0).abs() < 1e-4);
        let ppm = spacing / specs[0].mz * 1e6;

        let scan = Scan::new(0, "s", 1.0, vec![(specs[0].mz + 0.4 * spacing, 100.0)]);

        let double = WindowExtractor::new(ppm, OverlapPolicy::DoubleCount).extract(&scan, &specs);
        assert_eq!(double, vec![100.0, 100.0, 0.0]);

        let split = WindowExtractor::new(ppm, OverlapPolicy::Split).extract(&scan, &specs);
        assert_eq!(split, vec![50.0, 50.0, 0.0]);

        let nearest = WindowExtractor::new(ppm, OverlapPolicy::Nearest).extract(&scan, &specs);
        assert_eq!(nearest, vec![100.0, 0.0, 0.0]);
    }

    #[test]
    fn test_samples() {
        let scan = Scan::new(3, "s", 12.5, vec![(500.0, 10.0), (500.5, 4.0)]);
        let samples = WindowExtractor::default().samples(&scan, &[spec(0, 500.0), spec(1, 500.5)]);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].retention_time, 12.5);
        assert_eq!(samples[1].isotopologue_index, 1);
        assert_eq!(samples[1].summed_intensity, 4.0);
    }
}
