use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use mzdata::io::MassSpectrometryFormat;

use mzmid::{
    CancellationToken, ExtractionParams, IdentificationRecord, MidExtractor, ParameterError,
    SpectralIndex,
};

use crate::args::{ArgLabelSpacing, ArgLabelingMetric, ArgOverlapPolicy, RetentionTimeUnit};
use crate::identifications::{IdentificationLoadError, LoadOptions};
use crate::spectra::load_spectral_index;
use crate::time_range::TimeRange;
use crate::write::{write_output, MidTableWriter};

pub const BUFFER_SIZE: usize = 1000;

fn non_negative_float_f64(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|e| e.to_string())?;
    if value < 0.0 {
        Err(format!("`{s}` is less than zero"))
    } else {
        Ok(value)
    }
}

#[derive(Debug, Error)]
pub enum MZMiderError {
    #[error("An IO error occurred: {0}")]
    IOError(
        #[source]
        #[from]
        io::Error,
    ),
    #[error("The input file format for {0} was either unknown or not supported ({1:?})")]
    FormatUnknownOrNotSupportedError(String, MassSpectrometryFormat),
    #[error("The input file format from STDIN was either unknown or not supported ({0:?})")]
    FormatUnknownOrNotSupportedErrorStdIn(MassSpectrometryFormat),
    #[error("{0}")]
    IdentificationError(
        #[source]
        #[from]
        IdentificationLoadError,
    ),
    #[error("Invalid configuration: {0}")]
    ConfigurationError(
        #[source]
        #[from]
        ParameterError,
    ),
    #[error("The output writer failed: {0}")]
    WriterPanicked(String),
    #[error("Failed to build the thread pool: {0}")]
    ThreadPoolError(
        #[source]
        #[from]
        rayon::ThreadPoolBuildError,
    ),
}

/// Extract mass isotopomer distributions of identified peptides from mass spectrometry files.
///
/// Read the MS1 spectra of a run and a table of peptide identifications, integrate the
/// isotopologues of every identified peptide around its retention time, and write a table of
/// their fractional abundances.
#[derive(Parser, Debug, Clone, Deserialize, Serialize)]
#[command(author, version)]
#[serde(default)]
pub struct MZMider {
    /// The path to read the input spectra from, or if '-' is passed, read from STDIN
    #[arg()]
    pub input_file: String,

    /// The tab-separated table of peptide identifications to extract.
    ///
    /// It must have `sequence` and `charge` columns, and may have `formula`, `mass`,
    /// `retention_time`, `scan_id`, `q_value`, `sample` and `protein` columns.
    #[arg()]
    pub identification_file: PathBuf,

    /// The path to write the output table to, or if '-' is passed, write to STDOUT.
    ///
    /// If the path ends with `.gz`, the table is gzip compressed.
    #[arg(short = 'o', long = "output-file", default_value = "-")]
    pub output_file: PathBuf,

    /// The path to write a log file to, in addition to STDERR
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// A TOML configuration file to read additional parameters from.
    ///
    /// Configurations are also read from `mzmider.toml` in the working directory.
    /// Environment variables prefixed with `MZMIDER_` will be read too.
    #[arg(long = "config-file")]
    pub config_file: Option<PathBuf>,

    /// The size of the buffer for queueing writing of results to the output stream
    #[arg(short = 'w', long = "write-buffer-size", default_value_t = BUFFER_SIZE)]
    pub write_buffer_size: usize,

    /// The number of threads to use, passing a value < 1 to use all available threads
    #[arg(short = 't', long = "threads", default_value_t = -1)]
    pub threads: i32,

    /// The time range of MS1 spectra to read, denoted (start?)-(stop?)
    #[arg(
        short='r',
        long="time-range",
        value_parser=TimeRange::from_str,
        value_name="BEGIN-END",
        long_help=r#"The time range of MS1 spectra to read, denoted (start?)-(stop?)

If a start is not specified, reading begins from the start of the run.
If a stop is not specified, reading stops at the end of the run.
"#
    )]
    pub time_range: Option<TimeRange>,

    /// Centroid profile spectra before extracting isotopologue intensities
    #[arg(short = 'p', long = "pick-peaks")]
    pub pick_peaks: bool,

    /// The highest isotopologue to extract, 0 being the monoisotopic peak
    #[arg(short = 'k', long = "isotopologue-count", default_value_t = 5)]
    pub isotopologue_count: usize,

    /// The mass accuracy of isotopologue windows, in parts-per-million
    #[arg(short = 'e', long = "mass-tolerance", default_value_t = 20.0, value_parser = non_negative_float_f64)]
    pub mass_tolerance_ppm: f64,

    /// The number of minutes to search on either side of each identification's retention time
    #[arg(short = 'm', long = "retention-time-margin", default_value_t = 1.0, value_parser = non_negative_float_f64)]
    pub retention_time_margin: f64,

    /// The fraction of the apex intensity at which the elution peak boundary is drawn
    #[arg(short = 'f', long = "peak-boundary-fraction", default_value_t = 0.05)]
    pub peak_boundary_fraction: f64,

    /// Integrate a fixed number of minutes on either side of the apex instead
    #[arg(long = "apex-window", value_parser = non_negative_float_f64)]
    pub apex_window: Option<f64>,

    /// The largest q-value an identification may have to be extracted
    #[arg(short = 'q', long = "q-value-threshold", alias = "min-confidence", default_value_t = 0.01)]
    pub q_value_threshold: f64,

    /// How to attribute a peak that falls within more than one isotopologue window
    #[arg(long = "overlap-policy", default_value = "double-count")]
    pub overlap_policy: ArgOverlapPolicy,

    /// The mass spacing between isotopologues
    #[arg(long = "label-spacing", default_value = "carbon13")]
    pub label_spacing: ArgLabelSpacing,

    /// The label incorporation summary to report
    #[arg(long = "labeling-metric", default_value = "unlabeled-depletion")]
    pub labeling_metric: ArgLabelingMetric,

    /// The isotopologue used by the `channel-fraction` labeling metric
    #[arg(long = "labeling-channel", default_value_t = 1)]
    pub labeling_channel: usize,

    /// The unit of the identification table's retention times
    #[arg(long = "retention-time-unit", default_value = "minutes")]
    pub retention_time_unit: RetentionTimeUnit,

    /// Only extract peptides that map to a single protein
    #[arg(short = 'u', long = "unique-only")]
    pub unique_only: bool,
}

impl Default for MZMider {
    fn default() -> Self {
        let params = ExtractionParams::default();
        Self {
            input_file: String::new(),
            identification_file: PathBuf::new(),
            output_file: PathBuf::from("-"),
            log_file: None,
            config_file: None,
            write_buffer_size: BUFFER_SIZE,
            threads: -1,
            time_range: None,
            pick_peaks: false,
            isotopologue_count: params.isotopologue_count,
            mass_tolerance_ppm: params.mass_tolerance_ppm,
            retention_time_margin: params.retention_time_margin,
            peak_boundary_fraction: params.peak_boundary_fraction,
            apex_window: params.apex_window,
            q_value_threshold: params.q_value_threshold,
            overlap_policy: ArgOverlapPolicy::default(),
            label_spacing: ArgLabelSpacing::default(),
            labeling_metric: ArgLabelingMetric::default(),
            labeling_channel: 1,
            retention_time_unit: RetentionTimeUnit::default(),
            unique_only: false,
        }
    }
}

impl MZMider {
    fn create_threadpool(&self) -> Result<rayon::ThreadPool, MZMiderError> {
        let num_threads = if self.threads > 0 {
            self.threads as usize
        } else {
            thread::available_parallelism()?.into()
        };
        debug!("Using {} cores", num_threads);
        Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()?)
    }

    pub fn extraction_params(&self) -> ExtractionParams {
        ExtractionParams {
            isotopologue_count: self.isotopologue_count,
            mass_tolerance_ppm: self.mass_tolerance_ppm,
            retention_time_margin: self.retention_time_margin,
            peak_boundary_fraction: self.peak_boundary_fraction,
            apex_window: self.apex_window,
            q_value_threshold: self.q_value_threshold,
            overlap_policy: self.overlap_policy.into(),
            label_spacing: self.label_spacing.into(),
            labeling_metric: self.labeling_metric.to_metric(self.labeling_channel),
        }
    }

    fn load_options(&self) -> LoadOptions {
        let default_sample = if self.input_file == "-" {
            "stdin".to_string()
        } else {
            PathBuf::from(&self.input_file)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default()
        };
        LoadOptions {
            retention_time_unit: self.retention_time_unit,
            q_value_threshold: self.q_value_threshold,
            default_sample,
            unique_only: self.unique_only,
        }
    }

    pub fn main(&self) -> Result<(), MZMiderError> {
        info!(
            "mzmider v{}",
            option_env!("CARGO_PKG_VERSION").unwrap_or("unknown")
        );
        info!("Spectra: {}", self.input_file);
        info!("Identifications: {}", self.identification_file.display());
        info!("Output: {}", self.output_file.display());
        let params = self.extraction_params();
        params.validate()?;
        self.create_threadpool()?
            .install(|| self.run_workflow(params))
    }

    fn run_workflow(&self, params: ExtractionParams) -> Result<(), MZMiderError> {
        let start = Instant::now();
        let mut builder = SpectralIndex::builder().pick_peaks(self.pick_peaks);
        if let Some(time_range) = self.time_range {
            builder = builder.time_range(time_range.start, time_range.end);
        }
        let (index, mut progress) = load_spectral_index(&self.input_file, builder)?;

        let (records, id_progress) = self
            .load_options()
            .read_identifications_path(&self.identification_file, &index)?;
        progress += id_progress;
        info!("Loaded {} identifications to extract", records.len());

        let writer = MidTableWriter::create(&self.output_file, params.channels())?;
        let (summary, rows_written) = self.extract_and_write(&index, &records, params, writer)?;
        progress.rows_written = rows_written;
        progress.log_summary(&summary);

        let elapsed = Instant::now() - start;
        info!("Total Elapsed Time: {:0.3?}", elapsed);
        Ok(())
    }

    fn extract_and_write(
        &self,
        index: &SpectralIndex,
        records: &[IdentificationRecord],
        params: ExtractionParams,
        writer: MidTableWriter,
    ) -> Result<(mzmid::RunSummary, usize), MZMiderError> {
        let (sender, receiver) = crossbeam_channel::bounded(self.write_buffer_size.max(1));
        let token = CancellationToken::new();
        let extractor = MidExtractor::new(index, params).with_cancellation(token.clone());

        let write_task = thread::spawn(move || write_output(writer, receiver));

        let summary = extractor.run_batch_with(records, |position, record| {
            if let Err(e) = sender.send((position, record)) {
                if !token.is_cancelled() {
                    warn!("The writer hung up, cancelling extraction: {e}");
                    token.cancel();
                }
            }
        });
        drop(sender);

        let rows_written = join_writer(write_task)?;
        Ok((summary, rows_written))
    }
}

/// Wait for the writer thread, treating a panic as a failed run since the output is
/// incomplete
fn join_writer(handle: JoinHandle<io::Result<usize>>) -> Result<usize, MZMiderError> {
    match handle.join() {
        Ok(result) => Ok(result?),
        Err(e) => {
            let message = e
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| e.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| format!("{e:?}"));
            Err(MZMiderError::WriterPanicked(message))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_join_writer() {
        let handle = thread::spawn(|| -> io::Result<usize> { Ok(3) });
        assert_eq!(join_writer(handle).unwrap(), 3);

        let handle = thread::spawn(|| -> io::Result<usize> { Err(io::Error::other("disk full")) });
        assert!(matches!(join_writer(handle), Err(MZMiderError::IOError(_))));

        let handle = thread::spawn(|| -> io::Result<usize> { panic!("row out of order") });
        let err = join_writer(handle).unwrap_err();
        assert!(matches!(err, MZMiderError::WriterPanicked(_)));
        assert_eq!(err.to_string(), "The output writer failed: row out of order");
    }

    #[test]
    fn test_unique_only_flag() {
        let args = MZMider::parse_from(["mzmider", "run.mzML", "ids.tsv", "--unique-only"]);
        assert!(args.unique_only);
        assert!(args.load_options().unique_only);
        let args = MZMider::parse_from(["mzmider", "run.mzML", "ids.tsv"]);
        assert!(!args.load_options().unique_only);
        assert_eq!(args.load_options().default_sample, "run");
    }
}
