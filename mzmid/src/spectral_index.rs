//! A retention time ordered store of MS1 scans that supports range queries.
//!
//! The index is built once, single-threaded, from any source of spectra and is read-only
//! afterwards, so a shared reference can be handed to every worker thread.
use std::collections::HashMap;
use std::ops::Range;

use mzdata::prelude::*;
use mzdata::spectrum::bindata::ArrayRetrievalError;
use mzdata::spectrum::{MultiLayerSpectrum, SignalContinuity};
use mzpeaks::coordinate::{SimpleInterval, Span1D};
use mzpeaks::{CentroidPeak, DeconvolutedPeak};

use thiserror::Error;
use tracing::{debug, warn};

use crate::error::IndexError;

/// The spectrum type the index is usually built from
pub type SpectrumType = MultiLayerSpectrum<CentroidPeak, DeconvolutedPeak>;

#[derive(Debug, Error)]
pub enum ScanConversionError {
    #[error("Failed to retrieve signal arrays for {id}: {source}")]
    ArrayRetrieval {
        id: String,
        #[source]
        source: ArrayRetrievalError,
    },
    #[error("Spectrum {id} has {mz} m/z values but {intensity} intensity values")]
    LengthMismatch {
        id: String,
        mz: usize,
        intensity: usize,
    },
    #[error("Failed to pick peaks for {id}: {reason}")]
    PeakPicking { id: String, reason: String },
}

/// A single MS1 scan, its signal held as parallel arrays sorted by m/z
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Scan {
    /// The position of the spectrum in its source
    pub index: usize,
    /// The native ID of the spectrum in its source
    pub id: String,
    /// The scan start time in minutes
    pub time: f64,
    pub mz: Vec<f64>,
    pub intensity: Vec<f32>,
}

impl Scan {
    /// Create a scan from unordered (m/z, intensity) pairs
    pub fn new(index: usize, id: impl Into<String>, time: f64, mut points: Vec<(f64, f32)>) -> Self {
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (mz, intensity) = points.into_iter().unzip();
        Self {
            index,
            id: id.into(),
            time,
            mz,
            intensity,
        }
    }

    pub fn len(&self) -> usize {
        self.mz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz.is_empty()
    }

    /// The indices of the points whose m/z lies within `[low, high]`, inclusive on both ends
    pub fn search(&self, low: f64, high: f64) -> Range<usize> {
        let start = self.mz.partition_point(|mz| *mz < low);
        let end = self.mz.partition_point(|mz| *mz <= high);
        start..end.max(start)
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f32)> + '_ {
        self.mz.iter().copied().zip(self.intensity.iter().copied())
    }

    fn ensure_sorted(&mut self) {
        if self.mz.windows(2).any(|w| w[0] > w[1]) {
            let points = self.iter().collect();
            *self = Self::new(self.index, std::mem::take(&mut self.id), self.time, points);
        }
    }
}

impl TryFrom<&SpectrumType> for Scan {
    type Error = ScanConversionError;

    fn try_from(spectrum: &SpectrumType) -> Result<Self, Self::Error> {
        let id = spectrum.id().to_string();
        let mut scan = if let Some(peaks) = spectrum.peaks.as_ref() {
            let mut mz = Vec::with_capacity(peaks.len());
            let mut intensity = Vec::with_capacity(peaks.len());
            for p in peaks.iter() {
                mz.push(p.mz());
                intensity.push(p.intensity());
            }
            Self {
                index: spectrum.index(),
                id,
                time: spectrum.start_time(),
                mz,
                intensity,
            }
        } else if let Some(arrays) = spectrum.arrays.as_ref() {
            let retrieval = |source| ScanConversionError::ArrayRetrieval {
                id: id.clone(),
                source,
            };
            let mz = arrays.mzs().map_err(retrieval)?.to_vec();
            let intensity = arrays.intensities().map_err(retrieval)?.to_vec();
            if mz.len() != intensity.len() {
                return Err(ScanConversionError::LengthMismatch {
                    id,
                    mz: mz.len(),
                    intensity: intensity.len(),
                });
            }
            Self {
                index: spectrum.index(),
                id,
                time: spectrum.start_time(),
                mz,
                intensity,
            }
        } else {
            Self {
                index: spectrum.index(),
                id,
                time: spectrum.start_time(),
                ..Default::default()
            }
        };
        scan.ensure_sorted();
        Ok(scan)
    }
}

/// Extract the scan number from a native ID like `controllerType=0 controllerNumber=1 scan=42`
pub fn scan_number_of(native_id: &str) -> Option<u64> {
    native_id
        .split_ascii_whitespace()
        .find_map(|token| token.strip_prefix("scan="))
        .and_then(|n| n.parse().ok())
}

/// A restartable iterator over a contiguous, time-ordered run of [`Scan`]s
#[derive(Debug, Clone)]
pub struct ScanRange<'a> {
    scans: &'a [Scan],
    position: usize,
}

impl<'a> ScanRange<'a> {
    pub fn new(scans: &'a [Scan]) -> Self {
        Self { scans, position: 0 }
    }

    pub fn empty() -> Self {
        Self::new(&[])
    }

    pub fn as_slice(&self) -> &'a [Scan] {
        self.scans
    }

    /// Rewind the iterator to the first scan of the range
    pub fn restart(&mut self) {
        self.position = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }
}

impl<'a> Iterator for ScanRange<'a> {
    type Item = &'a Scan;

    fn next(&mut self) -> Option<Self::Item> {
        let scan = self.scans.get(self.position)?;
        self.position += 1;
        Some(scan)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.scans.len().saturating_sub(self.position);
        (n, Some(n))
    }
}

impl ExactSizeIterator for ScanRange<'_> {}

/// Collects scans from a spectrum source into a [`SpectralIndex`]
#[derive(Debug, Clone)]
pub struct SpectralIndexBuilder {
    scans: Vec<Scan>,
    ms_level: u8,
    pick_peaks: bool,
    time_range: Option<SimpleInterval<f64>>,
    id_times: HashMap<String, f64>,
    scan_number_times: HashMap<u64, f64>,
    skipped: usize,
}

impl Default for SpectralIndexBuilder {
    fn default() -> Self {
        Self {
            scans: Vec::new(),
            ms_level: 1,
            pick_peaks: false,
            time_range: None,
            id_times: HashMap::new(),
            scan_number_times: HashMap::new(),
            skipped: 0,
        }
    }
}

impl SpectralIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Centroid profile spectra before indexing them
    pub fn pick_peaks(mut self, pick_peaks: bool) -> Self {
        self.pick_peaks = pick_peaks;
        self
    }

    /// Only index scans whose start time lies in `[start, end]`
    pub fn time_range(mut self, start: f64, end: f64) -> Self {
        self.time_range = Some(SimpleInterval::new(start, end));
        self
    }

    pub fn ms_level(mut self, ms_level: u8) -> Self {
        self.ms_level = ms_level;
        self
    }

    pub fn len(&self) -> usize {
        self.scans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }

    /// Add an already converted scan
    pub fn push_scan(&mut self, scan: Scan) {
        self.record_time(&scan.id, scan.index, scan.time);
        self.scans.push(scan);
    }

    fn record_time(&mut self, id: &str, index: usize, time: f64) {
        self.id_times.insert(id.to_string(), time);
        let scan_number = scan_number_of(id).unwrap_or(index as u64 + 1);
        self.scan_number_times.insert(scan_number, time);
    }

    /// Add a spectrum, keeping it only if it is of the indexed MS level and inside the
    /// time range. Every spectrum's time is remembered for scan ID lookups.
    ///
    /// Returns whether the spectrum was indexed.
    pub fn push_spectrum(&mut self, mut spectrum: SpectrumType) -> Result<bool, ScanConversionError> {
        let time = spectrum.start_time();
        self.record_time(spectrum.id(), spectrum.index(), time);
        if spectrum.ms_level() != self.ms_level {
            return Ok(false);
        }
        if let Some(range) = self.time_range.as_ref() {
            if !range.contains(&time) {
                self.skipped += 1;
                return Ok(false);
            }
        }
        if self.pick_peaks
            && spectrum.signal_continuity() == SignalContinuity::Profile
            && spectrum.peaks.is_none()
        {
            spectrum
                .pick_peaks(1.0)
                .map_err(|e| ScanConversionError::PeakPicking {
                    id: spectrum.id().to_string(),
                    reason: format!("{e:?}"),
                })?;
        }
        let scan = Scan::try_from(&spectrum)?;
        self.scans.push(scan);
        Ok(true)
    }

    /// Add every spectrum from `source`, logging and skipping those that fail to convert
    pub fn extend_from_spectra<I: IntoIterator<Item = SpectrumType>>(&mut self, source: I) -> usize {
        let mut added = 0;
        for spectrum in source {
            match self.push_spectrum(spectrum) {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Skipping spectrum: {e}");
                    self.skipped += 1;
                }
            }
        }
        added
    }

    pub fn build(self) -> SpectralIndex {
        let mut scans = self.scans;
        scans.sort_by(|a, b| a.time.total_cmp(&b.time).then(a.index.cmp(&b.index)));
        debug!(
            "Indexed {} scans, skipped {}",
            scans.len(),
            self.skipped
        );
        SpectralIndex {
            scans,
            id_times: self.id_times,
            scan_number_times: self.scan_number_times,
        }
    }
}

/// A read-only, retention time sorted collection of [`Scan`]s
#[derive(Debug, Default, Clone)]
pub struct SpectralIndex {
    scans: Vec<Scan>,
    id_times: HashMap<String, f64>,
    scan_number_times: HashMap<u64, f64>,
}

impl FromIterator<Scan> for SpectralIndex {
    fn from_iter<T: IntoIterator<Item = Scan>>(iter: T) -> Self {
        let mut builder = SpectralIndexBuilder::new();
        for scan in iter {
            builder.push_scan(scan);
        }
        builder.build()
    }
}

impl SpectralIndex {
    pub fn builder() -> SpectralIndexBuilder {
        SpectralIndexBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.scans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }

    pub fn scans(&self) -> &[Scan] {
        &self.scans
    }

    /// The first and last scan start times of the index
    pub fn time_span(&self) -> Option<SimpleInterval<f64>> {
        let first = self.scans.first()?;
        let last = self.scans.last()?;
        Some(SimpleInterval::new(first.time, last.time))
    }

    /// Find an indexed scan by its native ID
    pub fn find_by_id(&self, id: &str) -> Option<&Scan> {
        self.scans.iter().find(|s| s.id == id)
    }

    /// Look up the start time of any spectrum seen while building the index, by native ID
    /// or by scan number
    pub fn time_of_scan(&self, scan_id: &str) -> Option<f64> {
        let scan_id = scan_id.trim();
        if let Some(t) = self.id_times.get(scan_id) {
            return Some(*t);
        }
        scan_number_of(scan_id)
            .or_else(|| scan_id.parse().ok())
            .and_then(|n| self.scan_number_times.get(&n).copied())
    }

    /// The positions of the scans whose times lie in `[start, end]`
    fn bounds(&self, start: f64, end: f64) -> Range<usize> {
        let lo = self.scans.partition_point(|s| s.time < start);
        let hi = self.scans.partition_point(|s| s.time <= end);
        lo..hi.max(lo)
    }

    /// Get the scans whose start times lie within `[start, end]` in ascending time order.
    ///
    /// A window that overlaps the index's span only partially is clamped to it. A window
    /// entirely outside of the span is an error.
    pub fn try_scans_in_range(&self, start: f64, end: f64) -> Result<ScanRange<'_>, IndexError> {
        if !start.is_finite() || !end.is_finite() || start > end {
            return Err(IndexError::InvalidWindow { start, end });
        }
        let span = self.time_span().ok_or(IndexError::Empty)?;
        if end < span.start() || start > span.end() {
            return Err(IndexError::OutOfRange {
                start,
                end,
                span_start: span.start(),
                span_end: span.end(),
            });
        }
        let range = self.bounds(start, end);
        Ok(ScanRange::new(&self.scans[range]))
    }

    /// As [`SpectralIndex::try_scans_in_range`], but logging failures and returning an empty
    /// range instead
    pub fn scans_in_range(&self, start: f64, end: f64) -> ScanRange<'_> {
        match self.try_scans_in_range(start, end) {
            Ok(range) => range,
            Err(e) => {
                warn!("{e}");
                ScanRange::empty()
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn make_index() -> SpectralIndex {
        (0..10)
            .rev()
            .map(|i| {
                Scan::new(
                    i,
                    format!("controllerType=0 controllerNumber=1 scan={}", i * 2 + 1),
                    10.0 + i as f64 * 0.1,
                    vec![(500.0, 10.0), (400.0, 5.0)],
                )
            })
            .collect()
    }

    #[test]
    fn test_sorted() {
        let index = make_index();
        assert_eq!(index.len(), 10);
        assert!(index.scans().windows(2).all(|w| w[0].time < w[1].time));
        assert!(index.scans().iter().all(|s| s.mz == vec![400.0, 500.0]));
        let span = index.time_span().unwrap();
        assert_eq!(span.start(), 10.0);
        assert!((span.end() - 10.9).abs() < 1e-9);
    }

    #[test]
    fn test_range_query() {
        let index = make_index();
        let range = index.try_scans_in_range(10.15, 10.45).unwrap();
        let times: Vec<_> = range.clone().map(|s| s.index).collect();
        assert_eq!(times, vec![2, 3, 4]);

        let mut range = range;
        assert_eq!(range.len(), 3);
        range.next();
        range.next();
        assert_eq!(range.len(), 1);
        range.restart();
        assert_eq!(range.count(), 3);

        // Inclusive bounds
        let range = index.try_scans_in_range(10.0, 10.0).unwrap();
        assert_eq!(range.len(), 1);

        // Partial overlap is clamped
        let range = index.try_scans_in_range(10.85, 20.0).unwrap();
        assert_eq!(range.len(), 1);

        // Inside the span but between scans
        let range = index.try_scans_in_range(10.11, 10.12).unwrap();
        assert!(range.is_empty());
    }

    #[test]
    fn test_out_of_range() {
        let index = make_index();
        assert!(matches!(
            index.try_scans_in_range(30.0, 31.0),
            Err(IndexError::OutOfRange { .. })
        ));
        assert!(matches!(
            index.try_scans_in_range(11.0, 10.0),
            Err(IndexError::InvalidWindow { .. })
        ));
        assert_eq!(index.scans_in_range(1.0, 2.0).len(), 0);

        let empty = SpectralIndex::default();
        assert!(matches!(
            empty.try_scans_in_range(1.0, 2.0),
            Err(IndexError::Empty)
        ));
    }

    #[test]
    fn test_scan_lookup() {
        let index = make_index();
        assert_eq!(scan_number_of("controllerType=0 controllerNumber=1 scan=7"), Some(7));
        assert_eq!(scan_number_of("index=7"), None);
        let t = index.time_of_scan("7").unwrap();
        assert!((t - 10.3).abs() < 1e-9);
        let t = index
            .time_of_scan("controllerType=0 controllerNumber=1 scan=7")
            .unwrap();
        assert!((t - 10.3).abs() < 1e-9);
        assert!(index.time_of_scan("8").is_none());
        assert!(index
            .find_by_id("controllerType=0 controllerNumber=1 scan=1")
            .is_some());
    }

    #[test]
    fn test_mz_search() {
        let scan = Scan::new(0, "a", 1.0, vec![(100.0, 1.0), (100.5, 2.0), (101.0, 3.0)]);
        assert_eq!(scan.search(100.0, 100.5), 0..2);
        assert_eq!(scan.search(100.6, 100.9), 2..2);
        assert_eq!(scan.search(99.0, 200.0), 0..3);
    }
}
