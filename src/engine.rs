use std::fs::{File, Metadata};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;

use flate2::read::GzDecoder;
use tracing::{debug, info};

use crate::config::IndexerSettings;
use crate::error::{IndexError, Result};
use crate::output;
use crate::pipeline::{self, PipelineContext, PipelineStats, RunOutcome};

const OUTPUT_BUFFER_SIZE: usize = 1024 * 1024;
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Which pipeline flavor handled a file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    Serial,
    Parallel { workers: usize },
}

/// Result of indexing one input
#[derive(Clone, Copy, Debug)]
pub struct FileSummary {
    pub records: u64,
    pub mode: RunMode,
    pub stats: PipelineStats,
}

/// Top-level indexing facade
///
/// Owns the shared quit flag and the global line counter; each input file
/// gets its own dictionary and is emitted to completion before the next
/// one starts.
pub struct Indexer {
    ctx: PipelineContext,
}

impl Indexer {
    pub fn new(settings: IndexerSettings) -> Self {
        Self {
            ctx: PipelineContext::new(settings),
        }
    }

    /// Flag checked between pipeline iterations; set it from a signal
    /// handler to stop cleanly with a partial index
    pub fn quit_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.ctx.quit)
    }

    /// Lines processed across all inputs, for progress reporting
    pub fn line_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.ctx.line_counter)
    }

    /// Index one path; write the records to `<path>.lpi` when
    /// `write_index_file` is set, to stdout otherwise
    pub fn index_file(&self, path: &Path, write_index_file: bool) -> Result<FileSummary> {
        let (outcome, mode) = self.run_path(path)?;

        if write_index_file {
            let out_name = format!("{}.lpi", path.display());
            info!("writing index to [{}]", out_name);
            let file = File::create(&out_name).map_err(|source| IndexError::Output {
                path: out_name.clone(),
                source,
            })?;
            let mut out = BufWriter::with_capacity(OUTPUT_BUFFER_SIZE, file);
            let records = output::write_index(outcome.dictionary, &mut out).map_err(|e| {
                match e {
                    IndexError::Io(source) => IndexError::Output {
                        path: out_name.clone(),
                        source,
                    },
                    other => other,
                }
            })?;
            Ok(summary(records, mode, outcome.stats))
        } else {
            let stdout = io::stdout();
            let mut out = BufWriter::with_capacity(OUTPUT_BUFFER_SIZE, stdout.lock());
            let records = output::write_index(outcome.dictionary, &mut out)?;
            Ok(summary(records, mode, outcome.stats))
        }
    }

    /// Index stdin (always serial) to stdout
    pub fn index_stdin(&self) -> Result<FileSummary> {
        let stdin = io::stdin();
        let outcome = pipeline::run_serial(stdin.lock(), &self.ctx)?;
        let stdout = io::stdout();
        let mut out = BufWriter::with_capacity(OUTPUT_BUFFER_SIZE, stdout.lock());
        let records = output::write_index(outcome.dictionary, &mut out)?;
        Ok(summary(records, RunMode::Serial, outcome.stats))
    }

    /// Index one path into an arbitrary writer
    pub fn index_path_to<W: Write>(&self, path: &Path, out: &mut W) -> Result<FileSummary> {
        let (outcome, mode) = self.run_path(path)?;
        let records = output::write_index(outcome.dictionary, out)?;
        Ok(summary(records, mode, outcome.stats))
    }

    /// Index an already-open reader (always serial) into a writer
    pub fn index_reader_to<R: BufRead, W: Write>(
        &self,
        reader: R,
        out: &mut W,
    ) -> Result<FileSummary> {
        let outcome = pipeline::run_serial(reader, &self.ctx)?;
        let records = output::write_index(outcome.dictionary, out)?;
        Ok(summary(records, RunMode::Serial, outcome.stats))
    }

    fn run_path(&self, path: &Path) -> Result<(RunOutcome, RunMode)> {
        info!("opening [{}] for read", path.display());
        let file = File::open(path)?;
        let metadata = file.metadata()?;

        let is_gz = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("gz"));
        if is_gz {
            // the parallel dispatcher needs random access; compressed
            // streams are always serial
            debug!("compressed input, forcing serial mode");
            let reader = BufReader::with_capacity(READ_BUFFER_SIZE, GzDecoder::new(file));
            let outcome = pipeline::run_serial(reader, &self.ctx)?;
            return Ok((outcome, RunMode::Serial));
        }

        if self.should_parallelize(&metadata) {
            let workers = self.ctx.settings.pipeline.worker_count(num_cpus::get());
            let outcome = pipeline::run_parallel(file, workers, &self.ctx)?;
            return Ok((outcome, RunMode::Parallel { workers }));
        }

        let reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
        let outcome = pipeline::run_serial(reader, &self.ctx)?;
        Ok((outcome, RunMode::Serial))
    }

    fn should_parallelize(&self, metadata: &Metadata) -> bool {
        let pipeline = &self.ctx.settings.pipeline;
        !pipeline.force_serial
            && metadata.is_file()
            && metadata.len() > pipeline.min_parallel_size
            && num_cpus::get() > 1
    }
}

fn summary(records: u64, mode: RunMode, stats: PipelineStats) -> FileSummary {
    FileSummary {
        records,
        mode,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn index_str(input: &str, settings: IndexerSettings) -> String {
        let indexer = Indexer::new(settings);
        let mut out = Vec::new();
        indexer
            .index_reader_to(Cursor::new(input.to_string()), &mut out)
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_tiny_ipv4_serial() {
        let out = index_str("a 10.0.0.1 b\nc 10.0.0.1 d\n", IndexerSettings::default());
        assert_eq!(out, "10.0.0.1,2,1:2,2:2\n");
    }

    #[test]
    fn test_mixed_types_ordering() {
        let out = index_str(
            "u 192.168.1.1 v aa:bb:cc:dd:ee:ff w ::1 x\ny 192.168.1.1 z\n",
            IndexerSettings::default(),
        );
        assert_eq!(
            out,
            "192.168.1.1,2,1:2,2:2\n::1,1,1:6\naa:bb:cc:dd:ee:ff,1,1:4\n"
        );
    }

    #[test]
    fn test_no_trailing_newline() {
        let out = index_str("10.0.0.1", IndexerSettings::default());
        assert_eq!(out, "10.0.0.1,1,1:1\n");
    }

    #[test]
    fn test_empty_input_empty_output() {
        let out = index_str("", IndexerSettings::default());
        assert_eq!(out, "");
    }

    #[test]
    fn test_no_addresses_zero_records() {
        let out = index_str("nothing to see here\n", IndexerSettings::default());
        assert_eq!(out, "");
    }

    #[test]
    fn test_parallel_path_selected_for_large_regular_files() {
        let mut settings = IndexerSettings::default();
        settings.pipeline.min_parallel_size = 0;
        let indexer = Indexer::new(settings);

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "a 10.0.0.1 b").unwrap();
        tmp.flush().unwrap();

        let mut out = Vec::new();
        let summary = indexer.index_path_to(tmp.path(), &mut out).unwrap();
        if num_cpus::get() > 1 {
            assert!(matches!(summary.mode, RunMode::Parallel { .. }));
        }
        assert_eq!(String::from_utf8(out).unwrap(), "10.0.0.1,1,1:2\n");
    }

    #[test]
    fn test_serial_forced() {
        let mut settings = IndexerSettings::default();
        settings.pipeline.min_parallel_size = 0;
        settings.pipeline.force_serial = true;
        let indexer = Indexer::new(settings);

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "a 10.0.0.1 b").unwrap();
        tmp.flush().unwrap();

        let mut out = Vec::new();
        let summary = indexer.index_path_to(tmp.path(), &mut out).unwrap();
        assert_eq!(summary.mode, RunMode::Serial);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let indexer = Indexer::new(IndexerSettings::default());
        let mut out = Vec::new();
        assert!(indexer
            .index_path_to(Path::new("/no/such/file"), &mut out)
            .is_err());
    }
}
