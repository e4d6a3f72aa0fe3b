use std::fs;
use std::io;
use std::time::Instant;

use tracing::{debug, info, warn};

use mzdata::prelude::*;
#[cfg(feature = "mzmlb")]
use mzdata::io::mzmlb::MzMLbReaderType;
#[cfg(feature = "thermo")]
use mzdata::io::thermo::ThermoRawReaderType;
use mzdata::io::{
    infer_format, infer_from_stream, mgf::MGFReaderType, mzml::MzMLReaderType,
    MassSpectrometryFormat, PreBufferedStream, RestartableGzDecoder, StreamingSpectrumIterator,
};
use mzpeaks::coordinate::Span1D;

use mzmid::{SpectralIndex, SpectralIndexBuilder, SpectrumType};

use crate::driver::MZMiderError;
use crate::progress::ProgressRecord;

fn index_from<I: Iterator<Item = SpectrumType>>(
    reader: I,
    builder: &mut SpectralIndexBuilder,
) -> ProgressRecord {
    let mut spectra_read = 0usize;
    let ms1_spectra = builder.extend_from_spectra(reader.inspect(|_| spectra_read += 1));
    ProgressRecord {
        spectra_read,
        ms1_spectra,
        ..Default::default()
    }
}

/// Read the MS1 scans of `input_file` into a [`SpectralIndex`], or from STDIN if `-` is
/// passed.
pub fn load_spectral_index(
    input_file: &str,
    mut builder: SpectralIndexBuilder,
) -> Result<(SpectralIndex, ProgressRecord), MZMiderError> {
    let start = Instant::now();
    let progress = if input_file == "-" {
        let mut buffered = PreBufferedStream::new_with_buffer_size(io::stdin(), 2usize.pow(20))?;
        let (ms_format, compressed) = infer_from_stream(&mut buffered)?;
        debug!("Detected {ms_format:?} from STDIN (compressed? {compressed})");
        match ms_format {
            MassSpectrometryFormat::MGF => {
                if compressed {
                    let reader = StreamingSpectrumIterator::new(MGFReaderType::new(
                        RestartableGzDecoder::new(io::BufReader::new(buffered)),
                    ));
                    index_from(reader, &mut builder)
                } else {
                    let reader = StreamingSpectrumIterator::new(MGFReaderType::new(buffered));
                    index_from(reader, &mut builder)
                }
            }
            MassSpectrometryFormat::MzML => {
                if compressed {
                    let reader = StreamingSpectrumIterator::new(MzMLReaderType::new(
                        RestartableGzDecoder::new(io::BufReader::new(buffered)),
                    ));
                    index_from(reader, &mut builder)
                } else {
                    let reader = StreamingSpectrumIterator::new(MzMLReaderType::new(buffered));
                    index_from(reader, &mut builder)
                }
            }
            _ => return Err(MZMiderError::FormatUnknownOrNotSupportedErrorStdIn(ms_format)),
        }
    } else {
        let (ms_format, compressed) = infer_format(input_file)?;
        debug!("Detected {ms_format:?} from path (compressed? {compressed})");
        match ms_format {
            MassSpectrometryFormat::MGF => {
                if compressed {
                    let fh = RestartableGzDecoder::new(io::BufReader::new(fs::File::open(
                        input_file,
                    )?));
                    let reader = StreamingSpectrumIterator::new(MGFReaderType::new(fh));
                    index_from(reader, &mut builder)
                } else {
                    let reader = MGFReaderType::open_path(input_file)?;
                    index_from(reader, &mut builder)
                }
            }
            MassSpectrometryFormat::MzML => {
                if compressed {
                    let fh = RestartableGzDecoder::new(io::BufReader::new(fs::File::open(
                        input_file,
                    )?));
                    let reader = StreamingSpectrumIterator::new(MzMLReaderType::new(fh));
                    index_from(reader, &mut builder)
                } else {
                    let reader = MzMLReaderType::open_path(input_file)?;
                    index_from(reader, &mut builder)
                }
            }
            #[cfg(feature = "mzmlb")]
            MassSpectrometryFormat::MzMLb => {
                let reader = MzMLbReaderType::open_path(input_file)?;
                index_from(reader, &mut builder)
            }
            #[cfg(feature = "thermo")]
            MassSpectrometryFormat::ThermoRaw => {
                let reader = ThermoRawReaderType::open_path(input_file)?;
                index_from(reader, &mut builder)
            }
            _ => {
                return Err(MZMiderError::FormatUnknownOrNotSupportedError(
                    input_file.to_string(),
                    ms_format,
                ))
            }
        }
    };

    let index = builder.build();
    match index.time_span() {
        Some(span) => info!(
            "Indexed {} MS1 scans from {:0.3} to {:0.3} minutes in {:0.3?}",
            index.len(),
            span.start(),
            span.end(),
            Instant::now() - start
        ),
        None => warn!("No MS1 scans were read from {input_file}"),
    }
    Ok((index, progress))
}
