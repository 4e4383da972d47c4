use std::io::BufRead;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::warn;

use super::{PipelineContext, PipelineStats, RunOutcome};
use crate::error::Result;
use crate::index::{AddressDictionary, AddressRecord};
use crate::parser::AddressParser;
use crate::tokenizer::FieldTokenizer;

/// Degenerate single-thread pipeline: one worker, no queues
///
/// Records are created with a single thread slot, so the output stage's
/// N-way merge reduces to one array traversal. Semantics are identical to
/// the parallel path.
pub fn run_serial<R: BufRead>(mut reader: R, ctx: &PipelineContext) -> Result<RunOutcome> {
    let tokenizer = FieldTokenizer::new(
        &ctx.settings.tokenizer,
        AddressParser::new(&ctx.settings.parser),
    );
    let mut dictionary = AddressDictionary::new(ctx.settings.dictionary.clone());
    let mut stats = PipelineStats::default();
    let mut dropped_warned = false;

    let mut line = Vec::new();
    let mut line_no = 0u64;
    loop {
        if ctx.quit.load(Ordering::Relaxed) {
            break;
        }
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        let content = match line.last() {
            Some(b'\n') => &line[..line.len() - 1],
            _ => &line[..],
        };

        for field in tokenizer.tagged_fields(content) {
            stats.addresses += 1;
            match dictionary.lookup(&field.canonical) {
                Some(record) => {
                    if record.record(0, line_no, field.index) {
                        stats.updated_addresses += 1;
                    } else {
                        stats.dropped_locations += 1;
                        if !dropped_warned {
                            warn!(
                                address = %field.canonical,
                                "location array at ceiling, dropping locations"
                            );
                            dropped_warned = true;
                        }
                    }
                }
                None => {
                    let record = Arc::new(AddressRecord::new(1));
                    record.record(0, line_no, field.index);
                    dictionary.insert(&field.canonical, record)?;
                    stats.new_addresses += 1;
                }
            }
        }

        line_no += 1;
        stats.lines += 1;
        ctx.line_counter.fetch_add(1, Ordering::Relaxed);
    }

    Ok(RunOutcome { dictionary, stats })
}
