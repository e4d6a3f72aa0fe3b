use std::fs;
use std::io;
use std::path::Path;
use std::time::Instant;

use crossbeam_channel::Receiver;
use flate2::write::GzEncoder;
use flate2::Compression;
use itertools::Itertools;
use mzdata::spectrum::utils::Collator;
use tracing::{debug, info};

use mzmid::MidRecord;

fn csv_to_io(err: csv::Error) -> io::Error {
    match err.into_kind() {
        csv::ErrorKind::Io(e) => e,
        kind => io::Error::new(io::ErrorKind::Other, format!("{kind:?}")),
    }
}

fn format_float(value: f64) -> String {
    format!("{value}")
}

fn format_optional(value: Option<f64>) -> String {
    value.map(format_float).unwrap_or_default()
}

/// Writes [`MidRecord`]s as rows of a tab-separated table with one column per isotopologue
pub struct MidTableWriter {
    writer: csv::Writer<Box<dyn io::Write + Send>>,
    isotopologue_count: usize,
    rows_written: usize,
}

impl MidTableWriter {
    pub fn new(handle: Box<dyn io::Write + Send>, isotopologue_count: usize) -> Self {
        let writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(handle);
        Self {
            writer,
            isotopologue_count,
            rows_written: 0,
        }
    }

    /// Open a writer on `path`, or on STDOUT if it is `-`. A `.gz` suffix compresses the
    /// output.
    pub fn create<P: AsRef<Path>>(path: P, isotopologue_count: usize) -> io::Result<Self> {
        let path = path.as_ref();
        let handle: Box<dyn io::Write + Send> = if path == Path::new("-") {
            Box::new(io::BufWriter::new(io::stdout()))
        } else {
            let handle = io::BufWriter::new(fs::File::create(path)?);
            if path.extension().is_some_and(|ext| ext == "gz") {
                Box::new(GzEncoder::new(handle, Compression::best()))
            } else {
                Box::new(handle)
            }
        };
        Ok(Self::new(handle, isotopologue_count))
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn header(&self) -> Vec<String> {
        let mut header: Vec<String> = [
            "index",
            "sequence",
            "charge",
            "retention_time",
            "q_value",
            "sample",
            "protein",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        header.extend((0..self.isotopologue_count).map(|i| format!("area_{i}")));
        header.extend((0..self.isotopologue_count).map(|i| format!("fraction_{i}")));
        header.extend(
            [
                "labeling", "valid", "status", "rt_start", "rt_apex", "rt_end", "n_scans",
            ]
            .into_iter()
            .map(String::from),
        );
        header
    }

    pub fn write_header(&mut self) -> io::Result<()> {
        let header = self.header();
        self.writer.write_record(&header).map_err(csv_to_io)
    }

    fn row(&self, record: &MidRecord) -> Vec<String> {
        let mut row = vec![
            record.index.to_string(),
            record.sequence.clone(),
            record.charge.to_string(),
            format_float(record.retention_time),
            format_float(record.q_value),
            record.sample.clone(),
            record.protein.clone().unwrap_or_default(),
        ];
        let pad = |values: &[f64]| -> Vec<String> {
            (0..self.isotopologue_count)
                .map(|i| format_float(values.get(i).copied().unwrap_or_default()))
                .collect()
        };
        row.extend(pad(&record.raw_areas));
        row.extend(pad(&record.abundances));
        row.push(format_optional(record.labeling));
        row.push(record.valid.to_string());
        row.push(record.status.to_string());
        let boundary = record.boundary.as_ref();
        row.push(format_optional(boundary.map(|b| b.start_time)));
        row.push(format_optional(boundary.map(|b| b.apex_time)));
        row.push(format_optional(boundary.map(|b| b.end_time)));
        row.push(record.n_scans.to_string());
        row
    }

    pub fn write(&mut self, record: &MidRecord) -> io::Result<()> {
        let row = self.row(record);
        self.writer.write_record(&row).map_err(csv_to_io)?;
        self.rows_written += 1;
        Ok(())
    }

    /// Flush the table and finish any compression stream
    pub fn close(mut self) -> io::Result<usize> {
        self.writer.flush()?;
        let handle = self.writer.into_inner().map_err(|e| e.into_error())?;
        drop(handle);
        Ok(self.rows_written)
    }
}

/// Receive records tagged with their position in the batch and write them in that order.
///
/// Positions left unfilled when the channel closes are skipped over, and anything still
/// waiting is written out in order.
pub fn write_output(
    mut writer: MidTableWriter,
    receiver: Receiver<(usize, MidRecord)>,
) -> io::Result<usize> {
    let mut collator: Collator<MidRecord> = Collator::default();
    let mut last_report = Instant::now();
    writer.write_header()?;
    while let Ok((position, record)) = receiver.recv() {
        collator.receive(position, record);
        while let Some((_, record)) = collator.try_next() {
            writer.write(&record)?;
        }
        if (Instant::now() - last_report).as_secs_f64() > 10.0 {
            info!(
                "Wrote {} rows | {} waiting | {} items in the write queue",
                writer.rows_written(),
                collator.waiting.len(),
                receiver.len()
            );
            last_report = Instant::now();
        }
    }
    collator.done = true;
    let n = collator.waiting.len();
    if n > 0 {
        debug!("Draining output queue, {n} items");
        let waiting_items = std::mem::take(&mut collator.waiting)
            .into_iter()
            .sorted_by_key(|(i, _)| *i);
        for (_, record) in waiting_items {
            writer.write(&record)?;
        }
    }
    writer.close()
}

#[cfg(test)]
mod test {
    use mzmid::{IdentificationRecord, MidStatus, PeakBoundary};

    use super::*;

    fn record(index: usize) -> MidRecord {
        let id = IdentificationRecord::new(index, "PEPTIDE", 2, 10.0).with_sample("s1");
        let mut mid = MidRecord::empty(&id, 3);
        if index % 2 == 0 {
            mid.raw_areas = vec![2.0, 1.0, 1.0];
            mid.abundances = vec![0.5, 0.25, 0.25];
            mid.labeling = Some(0.5);
            mid.valid = true;
            mid.boundary = Some(PeakBoundary {
                start_time: 9.5,
                apex_time: 10.0,
                end_time: 10.5,
                start_index: 0,
                apex_index: 5,
                end_index: 10,
            });
            mid.n_scans = 11;
        } else {
            mid.status = MidStatus::NoPeakFound;
        }
        mid
    }

    #[test]
    fn test_collated_output() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("mid.tsv");
        let writer = MidTableWriter::create(&path, 3)?;
        let (sender, receiver) = crossbeam_channel::bounded(4);
        let handle = std::thread::spawn(move || write_output(writer, receiver));
        // Out of order, with position 3 missing
        for i in [2usize, 0, 4, 1] {
            sender.send((i, record(i))).unwrap();
        }
        drop(sender);
        let written = handle.join().unwrap()?;
        assert_eq!(written, 4);

        let text = fs::read_to_string(&path)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("index\tsequence\tcharge"));
        assert!(lines[0].contains("area_2\tfraction_0"));
        assert!(lines[0].ends_with("rt_end\tn_scans"));
        let indices: Vec<&str> = lines[1..]
            .iter()
            .map(|l| l.split('\t').next().unwrap())
            .collect();
        assert_eq!(indices, vec!["0", "1", "2", "4"]);
        assert!(lines[1].contains("\t0.5\t0.25\t0.25\t0.5\ttrue\tok\t9.5\t10\t10.5\t11"));
        assert!(lines[2].contains("\tfalse\tno_peak_found\t\t\t\t0"));
        Ok(())
    }

    #[test]
    fn test_gzip_output() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("mid.tsv.gz");
        let mut writer = MidTableWriter::create(&path, 3)?;
        writer.write_header()?;
        writer.write(&record(0))?;
        assert_eq!(writer.close()?, 1);

        let mut decoder = flate2::read::GzDecoder::new(fs::File::open(&path)?);
        let mut text = String::new();
        io::Read::read_to_string(&mut decoder, &mut text)?;
        assert_eq!(text.lines().count(), 2);
        Ok(())
    }
}
