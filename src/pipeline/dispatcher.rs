use std::io::Read;

use memchr::{memchr_iter, memrchr};

use super::chunk::Chunk;
use crate::error::Result;

/// Single producer of line-aligned chunks
///
/// Each step prepends the partial line carried from the previous chunk,
/// reads up to the target size, and splits at the last newline. Everything
/// after that newline becomes the next carry-forward. Line accounting
/// advances only by lines whose newline first appeared in this chunk.
pub struct ChunkDispatcher<R> {
    input: R,
    target_chunk_size: usize,
    carry: Vec<u8>,
    next_line: u64,
    next_id: u64,
    offset: u64,
    eof: bool,
}

impl<R: Read> ChunkDispatcher<R> {
    pub fn new(input: R, target_chunk_size: usize) -> Self {
        Self {
            input,
            target_chunk_size: target_chunk_size.max(1),
            carry: Vec::new(),
            next_line: 0,
            next_id: 0,
            offset: 0,
            eof: false,
        }
    }

    /// Produce the next chunk, or None at end of input
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        if self.eof && self.carry.is_empty() {
            return Ok(None);
        }

        let mut buffer = std::mem::take(&mut self.carry);
        let carried = buffer.len();
        let carry_forward_lines = memchr_iter(b'\n', &buffer).count() as u64;
        let start_offset = self.offset.saturating_sub(carried as u64);

        buffer.resize(carried + self.target_chunk_size, 0);
        let mut filled = carried;
        while filled < buffer.len() {
            let n = self.input.read(&mut buffer[filled..])?;
            if n == 0 {
                self.eof = true;
                break;
            }
            filled += n;
            self.offset += n as u64;
        }
        buffer.truncate(filled);

        if buffer.is_empty() {
            return Ok(None);
        }

        if !self.eof {
            match memrchr(b'\n', &buffer) {
                Some(last_newline) => {
                    self.carry = buffer.split_off(last_newline + 1);
                }
                None => {
                    // a single line longer than the target: emit what we
                    // have rather than starving the workers
                    self.carry.clear();
                }
            }
        }
        // at EOF a buffer not ending in '\n' is emitted as-is

        let lines_in_chunk = memchr_iter(b'\n', &buffer).count() as u64;
        let chunk = Chunk {
            id: self.next_id,
            start_offset,
            end_offset: start_offset + buffer.len() as u64,
            start_line: self.next_line,
            carry_forward_lines,
            buffer,
        };
        self.next_id += 1;
        self.next_line += lines_in_chunk - carry_forward_lines;
        Ok(Some(chunk))
    }
}
