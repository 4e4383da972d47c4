use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::{Receiver, Sender};
use memchr::memchr;
use tracing::{debug, warn};

use super::chunk::Chunk;
use super::writer::InsertionRequest;
use crate::index::SharedDictionary;
use crate::tokenizer::FieldTokenizer;

/// Counters kept by one worker
#[derive(Clone, Copy, Debug, Default)]
pub struct WorkerStats {
    pub lines: u64,
    pub addresses: u64,
    pub chunks: u64,
    pub dropped_locations: u64,
}

/// One parallel consumer of the chunk queue
///
/// Existing addresses are appended to this worker's own location slot with
/// no cross-thread contention; only first-seen addresses travel to the
/// writer as insertion requests.
pub struct Worker {
    id: usize,
    dictionary: SharedDictionary,
    tokenizer: FieldTokenizer,
    insert_tx: Sender<Vec<InsertionRequest>>,
    batch: Vec<InsertionRequest>,
    batch_size: usize,
    line_counter: Arc<AtomicU64>,
    quit: Arc<AtomicBool>,
    stats: WorkerStats,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        dictionary: SharedDictionary,
        tokenizer: FieldTokenizer,
        insert_tx: Sender<Vec<InsertionRequest>>,
        batch_size: usize,
        line_counter: Arc<AtomicU64>,
        quit: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            dictionary,
            tokenizer,
            insert_tx,
            batch: Vec::with_capacity(batch_size),
            batch_size,
            line_counter,
            quit,
            stats: WorkerStats::default(),
        }
    }

    /// Consume chunks until the queue closes or quit is raised
    pub fn run(mut self, chunks: Receiver<Chunk>, slab_capacity: usize) -> WorkerStats {
        let mut slab: Vec<u8> = Vec::with_capacity(slab_capacity);

        while let Ok(chunk) = chunks.recv() {
            if self.quit.load(Ordering::Relaxed) {
                break;
            }
            slab.clear();
            slab.extend_from_slice(&chunk.buffer);
            let first_line = chunk.start_line + chunk.carry_forward_lines;
            drop(chunk);

            self.process_buffer(&slab, first_line);
            if !self.flush_batch() {
                break;
            }
            self.stats.chunks += 1;
        }

        self.flush_batch();
        debug!(
            worker = self.id,
            lines = self.stats.lines,
            chunks = self.stats.chunks,
            addresses = self.stats.addresses,
            "worker finished"
        );
        self.stats
    }

    /// Index every line in `buffer`; a trailing unterminated segment is a
    /// line too (the final chunk of a file may end mid-newline)
    fn process_buffer(&mut self, buffer: &[u8], first_line: u64) {
        let mut local_lines = 0u64;
        let mut rest = buffer;
        while !self.quit.load(Ordering::Relaxed) {
            match memchr(b'\n', rest) {
                Some(nl) => {
                    self.index_line(&rest[..nl], first_line + local_lines);
                    local_lines += 1;
                    self.line_counter.fetch_add(1, Ordering::Relaxed);
                    self.stats.lines += 1;
                    rest = &rest[nl + 1..];
                }
                None => {
                    if !rest.is_empty() {
                        self.index_line(rest, first_line + local_lines);
                        self.line_counter.fetch_add(1, Ordering::Relaxed);
                        self.stats.lines += 1;
                    }
                    break;
                }
            }
        }
    }

    fn index_line(&mut self, line: &[u8], absolute_line: u64) {
        for field in self.tokenizer.tagged_fields(line) {
            self.stats.addresses += 1;

            // a pending insertion for this address must reach the writer
            // before we consult the dictionary again
            if self.batch.iter().any(|r| r.address == field.canonical) && !self.flush_batch() {
                return;
            }

            let existing = self.dictionary.read().lookup(&field.canonical);
            match existing {
                Some(record) => {
                    if !record.record(self.id, absolute_line, field.index) {
                        self.note_drop(&field.canonical);
                    }
                }
                None => {
                    self.batch.push(InsertionRequest {
                        address: field.canonical,
                        line: absolute_line,
                        field: field.index,
                        worker: self.id,
                    });
                    if self.batch.len() >= self.batch_size && !self.flush_batch() {
                        return;
                    }
                }
            }
        }
    }

    /// Send the pending batch; false when the writer is gone
    fn flush_batch(&mut self) -> bool {
        if self.batch.is_empty() {
            return true;
        }
        self.insert_tx
            .send(std::mem::take(&mut self.batch))
            .is_ok()
    }

    fn note_drop(&mut self, address: &str) {
        self.stats.dropped_locations += 1;
        if self.stats.dropped_locations == 1 {
            warn!(
                worker = self.id,
                address, "location array at ceiling, dropping locations"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DictionarySettings, ParserSettings, TokenizerSettings};
    use crate::index::AddressDictionary;
    use crate::parser::AddressParser;
    use crossbeam::channel::bounded;

    fn test_tokenizer() -> FieldTokenizer {
        FieldTokenizer::new(
            &TokenizerSettings::default(),
            AddressParser::new(&ParserSettings::default()),
        )
    }

    #[test]
    fn test_worker_appends_to_existing_and_requests_new() {
        let dictionary = AddressDictionary::new(DictionarySettings::default()).into_shared();
        {
            let mut dict = dictionary.write();
            let record = Arc::new(crate::index::AddressRecord::new(2));
            dict.insert("10.0.0.1", record).unwrap();
        }

        let (insert_tx, insert_rx) = bounded(16);
        let (chunk_tx, chunk_rx) = bounded(4);
        let worker = Worker::new(
            1,
            dictionary.clone(),
            test_tokenizer(),
            insert_tx,
            5,
            Arc::new(AtomicU64::new(0)),
            Arc::new(AtomicBool::new(false)),
        );

        chunk_tx
            .send(Chunk {
                id: 0,
                start_offset: 0,
                end_offset: 0,
                start_line: 10,
                carry_forward_lines: 0,
                buffer: b"a 10.0.0.1 b\nc 10.9.9.9 d\n".to_vec(),
            })
            .unwrap();
        drop(chunk_tx);

        let stats = worker.run(chunk_rx, 1024);
        assert_eq!(stats.lines, 2);
        assert_eq!(stats.addresses, 2);

        // known address went straight to this worker's slot
        let record = dictionary.read().lookup("10.0.0.1").unwrap();
        assert_eq!(record.threads()[1].count(), 1);
        let locations = record.threads()[1].take().unwrap();
        assert_eq!(locations.as_slice()[0].line, 10);
        assert_eq!(locations.as_slice()[0].field, 2);

        // unknown address became an insertion request
        let batches: Vec<_> = insert_rx.iter().collect();
        let requests: Vec<_> = batches.into_iter().flatten().collect();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].address, "10.9.9.9");
        assert_eq!(requests[0].line, 11);
        assert_eq!(requests[0].worker, 1);
    }

    #[test]
    fn test_duplicate_new_address_flushes_pending_batch() {
        let dictionary = AddressDictionary::new(DictionarySettings::default()).into_shared();
        let (insert_tx, insert_rx) = bounded(16);
        let (chunk_tx, chunk_rx) = bounded(4);
        let worker = Worker::new(
            0,
            dictionary,
            test_tokenizer(),
            insert_tx,
            5,
            Arc::new(AtomicU64::new(0)),
            Arc::new(AtomicBool::new(false)),
        );

        chunk_tx
            .send(Chunk {
                id: 0,
                start_offset: 0,
                end_offset: 0,
                start_line: 0,
                carry_forward_lines: 0,
                buffer: b"10.0.0.7\n10.0.0.7\n".to_vec(),
            })
            .unwrap();
        drop(chunk_tx);

        worker.run(chunk_rx, 1024);

        // the second sighting forces the first batch out, then queues again
        let batches: Vec<_> = insert_rx.iter().collect();
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b[0].address == "10.0.0.7"));
    }

    #[test]
    fn test_carry_forward_lines_shift_numbering() {
        let dictionary = AddressDictionary::new(DictionarySettings::default()).into_shared();
        let (insert_tx, insert_rx) = bounded(16);
        let (chunk_tx, chunk_rx) = bounded(4);
        let worker = Worker::new(
            0,
            dictionary,
            test_tokenizer(),
            insert_tx,
            5,
            Arc::new(AtomicU64::new(0)),
            Arc::new(AtomicBool::new(false)),
        );

        chunk_tx
            .send(Chunk {
                id: 3,
                start_offset: 0,
                end_offset: 0,
                start_line: 100,
                carry_forward_lines: 2,
                buffer: b"10.1.1.1\n".to_vec(),
            })
            .unwrap();
        drop(chunk_tx);
        worker.run(chunk_rx, 1024);

        let requests: Vec<_> = insert_rx.iter().flatten().collect();
        assert_eq!(requests[0].line, 102);
    }
}
