use std::ops::{Add, AddAssign};

use mzmid::RunSummary;

/// Counters for the input and output stages of a run
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ProgressRecord {
    pub spectra_read: usize,
    pub ms1_spectra: usize,
    pub identifications_read: usize,
    pub identifications_skipped: usize,
    pub identifications_filtered: usize,
    /// Identifications dropped because their peptide maps to more than one protein
    pub identifications_shared: usize,
    pub rows_written: usize,
}

impl ProgressRecord {
    pub fn log_summary(&self, summary: &RunSummary) {
        tracing::info!(
            "Spectra: {} | MS1 Spectra: {}",
            self.spectra_read,
            self.ms1_spectra
        );
        tracing::info!(
            "Identifications: {} | Skipped: {} | Below Confidence Threshold: {} | Shared Peptides: {}",
            self.identifications_read,
            self.identifications_skipped,
            self.identifications_filtered + summary.filtered,
            self.identifications_shared
        );
        tracing::info!(
            "Extracted: {} | Zero Area: {} | Insufficient Data: {} | No Peak Found: {} | Invalid Input: {} | Cancelled: {}",
            summary.ok,
            summary.invalid_abundance,
            summary.insufficient_data,
            summary.no_peak_found,
            summary.invalid_input,
            summary.cancelled
        );
        tracing::info!("Rows Written: {}", self.rows_written);
    }
}

impl Add for ProgressRecord {
    type Output = ProgressRecord;

    fn add(self, rhs: Self) -> Self::Output {
        let mut dup = self;
        dup += rhs;
        dup
    }
}

impl AddAssign for ProgressRecord {
    fn add_assign(&mut self, rhs: Self) {
        self.spectra_read += rhs.spectra_read;
        self.ms1_spectra += rhs.ms1_spectra;
        self.identifications_read += rhs.identifications_read;
        self.identifications_skipped += rhs.identifications_skipped;
        self.identifications_filtered += rhs.identifications_filtered;
        self.identifications_shared += rhs.identifications_shared;
        self.rows_written += rhs.rows_written;
    }
}
