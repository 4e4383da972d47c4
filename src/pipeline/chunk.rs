/// A line-aligned contiguous byte range of the input
///
/// The buffer ends on a newline except for the final chunk of a file,
/// which may end mid-line and is processed verbatim. The first
/// `carry_forward_lines` line boundaries inside the buffer belong to lines
/// that start before `start_line` and must not re-advance line accounting.
#[derive(Clone, Debug)]
pub struct Chunk {
    pub id: u64,
    pub start_offset: u64,
    pub end_offset: u64,
    /// Absolute 0-based line index of the first byte of the buffer
    pub start_line: u64,
    /// Newlines in the prepended carry-forward portion, already counted
    /// against the previous chunk
    pub carry_forward_lines: u64,
    pub buffer: Vec<u8>,
}
