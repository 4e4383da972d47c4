use std::sync::Arc;

use crossbeam::channel::Receiver;
use tracing::{debug, warn};

use crate::error::Result;
use crate::index::{AddressRecord, SharedDictionary};

/// A worker's request to insert a first-seen address
///
/// Carries the originating location so the writer can seed the new record.
#[derive(Clone, Debug)]
pub struct InsertionRequest {
    pub address: String,
    pub line: u64,
    pub field: u16,
    pub worker: usize,
}

/// Counters kept by the writer stage
#[derive(Clone, Copy, Debug, Default)]
pub struct WriterStats {
    pub inserted: u64,
    pub updated: u64,
    pub dropped_locations: u64,
}

/// Single consumer of the insertion queue; the only dictionary mutator
///
/// A worker may observe a missing address, enqueue an insertion, and lose
/// the race to another worker's identical request. The re-check under the
/// write lock below is what makes that duplicate harmless: it turns into a
/// plain location append for the requesting worker.
pub fn run_writer(
    dictionary: SharedDictionary,
    requests: Receiver<Vec<InsertionRequest>>,
    pool_size: usize,
) -> Result<WriterStats> {
    let mut stats = WriterStats::default();

    for batch in requests.iter() {
        for request in batch {
            let mut dict = dictionary.write();
            match dict.lookup(&request.address) {
                Some(record) => {
                    drop(dict);
                    if record.record(request.worker, request.line, request.field) {
                        stats.updated += 1;
                    } else {
                        note_drop(&mut stats, &request.address);
                    }
                }
                None => {
                    let record = Arc::new(AddressRecord::new(pool_size));
                    record.record(request.worker, request.line, request.field);
                    dict.insert(&request.address, record)?;
                    stats.inserted += 1;
                }
            }
        }
    }

    debug!(
        inserted = stats.inserted,
        updated = stats.updated,
        "writer drained"
    );
    Ok(stats)
}

fn note_drop(stats: &mut WriterStats, address: &str) {
    stats.dropped_locations += 1;
    if stats.dropped_locations == 1 {
        warn!(address, "location array at ceiling, dropping locations");
    }
}
