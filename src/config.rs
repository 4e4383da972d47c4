use serde::{Deserialize, Serialize};

/// Tokenizer configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenizerSettings {
    /// Treat quote characters as ordinary content instead of field grouping
    pub greedy: bool,
    /// Maximum fields recognized per line; later bytes are ignored
    pub max_fields: usize,
}

impl Default for TokenizerSettings {
    fn default() -> Self {
        Self {
            greedy: false,
            max_fields: 1024,
        }
    }
}

/// Address parser configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ParserSettings {
    /// Reject IPv4 octets written with leading zeros
    pub strict_ipv4: bool,
}

/// Address dictionary sizing and caps
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DictionarySettings {
    /// Requested initial slot count, rounded up to a prime from the growth table
    pub initial_size: usize,
    /// Largest table size that will still grow; at or above this, warn and degrade
    pub max_table_size: usize,
    /// Hard cap on distinct addresses; exceeding it fails the file
    pub max_entries: usize,
    /// Evaluate load factor every this many inserts
    pub growth_check_interval: usize,
}

impl Default for DictionarySettings {
    fn default() -> Self {
        Self {
            initial_size: 96,
            max_table_size: 1_000_000,
            max_entries: 10_000_000,
            growth_check_interval: 4096,
        }
    }
}

/// Pipeline geometry: chunk sizes, queue depths, worker bounds
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Target chunk size in bytes
    pub target_chunk_size: usize,
    /// Lower clamp for the target chunk size
    pub min_chunk_size: usize,
    /// Capacity reserved for a partial line carried between chunks
    pub carry_forward_capacity: usize,
    /// Bounded chunk queue depth
    pub chunk_queue_capacity: usize,
    /// Bounded insertion queue depth, in request batches
    pub insertion_queue_capacity: usize,
    /// Flush a worker's new-address batch at this many entries
    pub insertion_batch_size: usize,
    /// Inputs below this byte size are processed serially
    pub min_parallel_size: u64,
    /// Force the serial path regardless of input size
    pub force_serial: bool,
    /// Upper bound on worker threads
    pub max_workers: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            target_chunk_size: 128 * 1024 * 1024,
            min_chunk_size: 1024 * 1024,
            carry_forward_capacity: 64 * 1024,
            chunk_queue_capacity: 16,
            insertion_queue_capacity: 8192,
            insertion_batch_size: 5,
            min_parallel_size: 100 * 1024 * 1024,
            force_serial: false,
            max_workers: 8,
        }
    }
}

impl PipelineSettings {
    /// Worker count for the parallel path on a machine with `cores` CPUs
    pub fn worker_count(&self, cores: usize) -> usize {
        (cores / 2).clamp(2, self.max_workers.max(2))
    }

    /// Target chunk size with the lower clamp applied
    pub fn effective_chunk_size(&self) -> usize {
        self.target_chunk_size.max(self.min_chunk_size)
    }
}

/// Top-level indexer settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IndexerSettings {
    pub tokenizer: TokenizerSettings,
    pub parser: ParserSettings,
    pub dictionary: DictionarySettings,
    pub pipeline: PipelineSettings,
}

impl IndexerSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable greedy tokenization (quotes are ordinary bytes)
    pub fn with_greedy(mut self, greedy: bool) -> Self {
        self.tokenizer.greedy = greedy;
        self
    }

    /// Force the serial pipeline
    pub fn with_serial(mut self, serial: bool) -> Self {
        self.pipeline.force_serial = serial;
        self
    }

    /// Override the parallel worker bound
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.pipeline.max_workers = workers.max(1);
        self
    }

    /// Override the target chunk size
    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.pipeline.target_chunk_size = bytes;
        self
    }

    /// Override the parallel-mode input size threshold
    pub fn with_min_parallel_size(mut self, bytes: u64) -> Self {
        self.pipeline.min_parallel_size = bytes;
        self
    }
}
