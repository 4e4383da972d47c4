use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::record::AddressRecord;
use crate::config::DictionarySettings;
use crate::error::{IndexError, Result};

/// Hash table sizes, approximately doubling primes
const GROWTH_PRIMES: &[usize] = &[
    53,
    97,
    193,
    389,
    769,
    1543,
    3079,
    6151,
    12289,
    24593,
    49157,
    98317,
    196613,
    393241,
    786433,
    1572869,
    3145739,
    6291469,
    12582917,
    25165843,
    50331653,
    100663319,
    201326611,
    402653189,
    805306457,
    1610612741,
];

/// Rehash when live entries exceed this fraction of the table size
const MAX_LOAD_FACTOR: f64 = 0.8;

/// FNV-1a, computed once per address and stored for O(1) rehash
pub fn fnv1a32(key: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 2_166_136_261;
    const PRIME: u32 = 16_777_619;
    let mut hash = OFFSET_BASIS;
    for &b in key {
        hash ^= b as u32;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Smallest growth-table prime at or above `requested`
fn prime_at_least(requested: usize) -> usize {
    GROWTH_PRIMES
        .iter()
        .copied()
        .find(|&p| p >= requested)
        .unwrap_or(GROWTH_PRIMES[GROWTH_PRIMES.len() - 1])
}

struct DictEntry {
    key: Box<str>,
    hash: u32,
    record: Arc<AddressRecord>,
    next: Option<Box<DictEntry>>,
}

/// Open-chained map from canonical address to its record
///
/// Readers probe under a shared lock; the single writer inserts and
/// rehashes under the exclusive lock. The table never shrinks.
pub struct AddressDictionary {
    buckets: Vec<Option<Box<DictEntry>>>,
    total_records: usize,
    max_chain_depth: usize,
    inserts_since_check: usize,
    table_maxed_warned: bool,
    settings: DictionarySettings,
}

/// The dictionary as shared between workers and the writer
pub type SharedDictionary = Arc<RwLock<AddressDictionary>>;

impl AddressDictionary {
    pub fn new(settings: DictionarySettings) -> Self {
        let size = prime_at_least(settings.initial_size);
        Self {
            buckets: (0..size).map(|_| None).collect(),
            total_records: 0,
            max_chain_depth: 0,
            inserts_since_check: 0,
            table_maxed_warned: false,
            settings,
        }
    }

    pub fn into_shared(self) -> SharedDictionary {
        Arc::new(RwLock::new(self))
    }

    /// Current table size (always a prime from the growth table)
    pub fn size(&self) -> usize {
        self.buckets.len()
    }

    pub fn len(&self) -> usize {
        self.total_records
    }

    pub fn is_empty(&self) -> bool {
        self.total_records == 0
    }

    pub fn max_chain_depth(&self) -> usize {
        self.max_chain_depth
    }

    /// Probe for an address; cheap enough to run under the shared lock on
    /// every token
    pub fn lookup(&self, key: &str) -> Option<Arc<AddressRecord>> {
        let hash = fnv1a32(key.as_bytes());
        let bucket = hash as usize % self.buckets.len();
        let mut entry = self.buckets[bucket].as_deref();
        while let Some(e) = entry {
            if e.hash == hash && &*e.key == key {
                return Some(Arc::clone(&e.record));
            }
            entry = e.next.as_deref();
        }
        None
    }

    /// Insert a new address; single writer only
    ///
    /// The caller must have verified the key is absent. Load factor is
    /// evaluated every `growth_check_interval` inserts; a table at
    /// `max_table_size` degrades with a warning, while `max_entries` is a
    /// hard failure.
    pub fn insert(&mut self, key: &str, record: Arc<AddressRecord>) -> Result<()> {
        let hash = fnv1a32(key.as_bytes());
        let bucket = hash as usize % self.buckets.len();
        let entry = Box::new(DictEntry {
            key: key.into(),
            hash,
            record,
            next: self.buckets[bucket].take(),
        });
        self.buckets[bucket] = Some(entry);
        self.total_records += 1;
        self.inserts_since_check += 1;

        let mut depth = 0;
        let mut cursor = self.buckets[bucket].as_deref();
        while let Some(e) = cursor {
            depth += 1;
            cursor = e.next.as_deref();
        }
        self.max_chain_depth = self.max_chain_depth.max(depth);

        if self.inserts_since_check >= self.settings.growth_check_interval {
            self.inserts_since_check = 0;
            self.maybe_grow()?;
        }
        Ok(())
    }

    /// Rehash to the next prime when the load factor is exceeded
    fn maybe_grow(&mut self) -> Result<()> {
        let load = self.total_records as f64 / self.buckets.len() as f64;
        if load <= MAX_LOAD_FACTOR {
            return Ok(());
        }
        if self.total_records >= self.settings.max_entries {
            return Err(IndexError::EntryCapExceeded(self.settings.max_entries));
        }
        if self.buckets.len() >= self.settings.max_table_size {
            if !self.table_maxed_warned {
                warn!(
                    size = self.buckets.len(),
                    "hash table at maximum size, performance may degrade"
                );
                self.table_maxed_warned = true;
            }
            return Ok(());
        }
        self.rehash();
        Ok(())
    }

    /// Redistribute all entries into the next prime-sized bucket array,
    /// reusing the stored hashes
    fn rehash(&mut self) {
        let new_size = match GROWTH_PRIMES
            .iter()
            .copied()
            .find(|&p| p > self.buckets.len())
        {
            Some(p) => p,
            None => return,
        };
        debug!(
            from = self.buckets.len(),
            to = new_size,
            records = self.total_records,
            "growing address dictionary"
        );

        let mut new_buckets: Vec<Option<Box<DictEntry>>> = (0..new_size).map(|_| None).collect();
        for slot in self.buckets.iter_mut() {
            let mut entry = slot.take();
            while let Some(mut e) = entry {
                entry = e.next.take();
                let bucket = e.hash as usize % new_size;
                e.next = new_buckets[bucket].take();
                new_buckets[bucket] = Some(e);
            }
        }
        self.buckets = new_buckets;
    }

    /// Drain every (address, record) pair for the output stage
    pub fn into_entries(mut self) -> Vec<(Box<str>, Arc<AddressRecord>)> {
        let mut entries = Vec::with_capacity(self.total_records);
        for slot in self.buckets.iter_mut() {
            let mut entry = slot.take();
            while let Some(e) = entry {
                entries.push((e.key, e.record));
                entry = e.next;
            }
        }
        entries
    }
}
