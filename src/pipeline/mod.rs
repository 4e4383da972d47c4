//! The parallel indexing pipeline
//!
//! One dispatcher reads line-aligned chunks, N workers parse them against
//! the shared dictionary, and a single writer applies insertions. Control
//! flow joins the stages in pipeline order: dispatcher, workers, writer.

mod chunk;
mod dispatcher;
mod progress;
mod serial;
mod worker;
mod writer;

use std::fs::File;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::bounded;
use tracing::debug;

pub use chunk::Chunk;
pub use dispatcher::ChunkDispatcher;
pub use progress::ProgressMonitor;
pub use serial::run_serial;
pub use worker::{Worker, WorkerStats};
pub use writer::{run_writer, InsertionRequest, WriterStats};

use crate::config::IndexerSettings;
use crate::error::{IndexError, Result};
use crate::index::AddressDictionary;
use crate::parser::AddressParser;
use crate::tokenizer::FieldTokenizer;

/// Shared state threaded through both pipeline flavors
pub struct PipelineContext {
    pub settings: IndexerSettings,
    pub quit: Arc<AtomicBool>,
    pub line_counter: Arc<AtomicU64>,
}

impl PipelineContext {
    pub fn new(settings: IndexerSettings) -> Self {
        Self {
            settings,
            quit: Arc::new(AtomicBool::new(false)),
            line_counter: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// Counters accumulated across all stages of one file
#[derive(Clone, Copy, Debug, Default)]
pub struct PipelineStats {
    pub lines: u64,
    pub addresses: u64,
    pub new_addresses: u64,
    pub updated_addresses: u64,
    pub dropped_locations: u64,
    pub chunks: u64,
}

/// A fully indexed file, ready for the output stage
pub struct RunOutcome {
    pub dictionary: AddressDictionary,
    pub stats: PipelineStats,
}

/// Run the parallel pipeline over a seekable regular file
pub fn run_parallel(file: File, workers: usize, ctx: &PipelineContext) -> Result<RunOutcome> {
    let pipeline = &ctx.settings.pipeline;
    let chunk_size = pipeline.effective_chunk_size();
    let slab_capacity = chunk_size + pipeline.carry_forward_capacity;

    let (chunk_tx, chunk_rx) = bounded::<Chunk>(pipeline.chunk_queue_capacity);
    let (insert_tx, insert_rx) = bounded::<Vec<InsertionRequest>>(pipeline.insertion_queue_capacity);
    let dictionary = AddressDictionary::new(ctx.settings.dictionary.clone()).into_shared();
    let tokenizer = FieldTokenizer::new(
        &ctx.settings.tokenizer,
        AddressParser::new(&ctx.settings.parser),
    );

    debug!(workers, chunk_size, "starting parallel pipeline");

    let quit = Arc::clone(&ctx.quit);
    let dispatcher_handle = thread::Builder::new()
        .name("dispatcher".into())
        .spawn(move || -> Result<u64> {
            let mut dispatcher = ChunkDispatcher::new(file, chunk_size);
            let mut chunks = 0u64;
            while !quit.load(Ordering::Relaxed) {
                match dispatcher.next_chunk()? {
                    Some(chunk) => {
                        if chunk_tx.send(chunk).is_err() {
                            break;
                        }
                        chunks += 1;
                    }
                    None => break,
                }
            }
            Ok(chunks)
        })?;

    let worker_handles: Vec<_> = (0..workers)
        .map(|id| {
            let worker = Worker::new(
                id,
                Arc::clone(&dictionary),
                tokenizer.clone(),
                insert_tx.clone(),
                pipeline.insertion_batch_size,
                Arc::clone(&ctx.line_counter),
                Arc::clone(&ctx.quit),
            );
            let rx = chunk_rx.clone();
            thread::Builder::new()
                .name(format!("worker-{id}"))
                .spawn(move || worker.run(rx, slab_capacity))
        })
        .collect::<std::io::Result<_>>()?;
    drop(insert_tx);
    drop(chunk_rx);

    let writer_dictionary = Arc::clone(&dictionary);
    let writer_handle = thread::Builder::new()
        .name("writer".into())
        .spawn(move || run_writer(writer_dictionary, insert_rx, workers))?;

    // join order mirrors the data flow
    let chunks = dispatcher_handle
        .join()
        .map_err(|_| IndexError::WorkerPanic)??;

    let mut stats = PipelineStats {
        chunks,
        ..PipelineStats::default()
    };
    for handle in worker_handles {
        let worker_stats = handle.join().map_err(|_| IndexError::WorkerPanic)?;
        stats.lines += worker_stats.lines;
        stats.addresses += worker_stats.addresses;
        stats.dropped_locations += worker_stats.dropped_locations;
    }

    let writer_stats = writer_handle
        .join()
        .map_err(|_| IndexError::WorkerPanic)??;
    stats.new_addresses = writer_stats.inserted;
    stats.updated_addresses = writer_stats.updated;
    stats.dropped_locations += writer_stats.dropped_locations;

    let dictionary = Arc::try_unwrap(dictionary)
        .map_err(|_| IndexError::Internal("dictionary still shared after join".into()))?
        .into_inner();

    Ok(RunOutcome { dictionary, stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parallel_outcome(input: &[u8], workers: usize, chunk_size: usize) -> RunOutcome {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(input).unwrap();
        tmp.flush().unwrap();

        let mut settings = IndexerSettings::default();
        settings.pipeline.target_chunk_size = chunk_size;
        settings.pipeline.min_chunk_size = 1;
        let ctx = PipelineContext::new(settings);
        run_parallel(tmp.reopen().unwrap(), workers, &ctx).unwrap()
    }

    #[test]
    fn test_parallel_matches_expected_counts() {
        let mut input = Vec::new();
        for i in 0..200 {
            writeln!(input, "host 10.0.0.{} up", i % 4).unwrap();
        }
        let outcome = parallel_outcome(&input, 4, 64);
        assert_eq!(outcome.stats.lines, 200);
        assert_eq!(outcome.dictionary.len(), 4);
        for i in 0..4 {
            let record = outcome
                .dictionary
                .lookup(&format!("10.0.0.{i}"))
                .unwrap();
            assert_eq!(record.authoritative_count(), 50);
        }
    }

    #[test]
    fn test_parallel_empty_file() {
        let outcome = parallel_outcome(b"", 2, 64);
        assert_eq!(outcome.stats.lines, 0);
        assert!(outcome.dictionary.is_empty());
    }

    #[test]
    fn test_parallel_unterminated_tail() {
        let outcome = parallel_outcome(b"x 10.0.0.1", 2, 64);
        assert_eq!(outcome.stats.lines, 1);
        let record = outcome.dictionary.lookup("10.0.0.1").unwrap();
        assert_eq!(record.authoritative_count(), 1);
    }
}
