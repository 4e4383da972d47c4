use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Smallest capacity a location array is created with
const LOCATION_ARRAY_FLOOR: usize = 64;

/// Above this many entries, growth switches from doubling to +25%
const DOUBLING_LIMIT: usize = 1 << 20;

/// Hard per-array entry ceiling; appends beyond it are dropped
pub const LOCATION_ARRAY_CEILING: usize = 1 << 31;

/// One occurrence of an address: absolute 0-based line, 1-based field
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Location {
    pub line: u64,
    pub field: u16,
}

/// Append-only growable sequence of locations
///
/// Entries are stable until the array is consumed at output time. Growth is
/// conservative for large arrays so a single address recurring hundreds of
/// millions of times cannot exhaust memory.
#[derive(Debug)]
pub struct LocationArray {
    entries: Vec<Location>,
}

impl LocationArray {
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(initial_capacity.max(LOCATION_ARRAY_FLOOR)),
        }
    }

    /// Append without growing; false when the array is at capacity
    pub fn push(&mut self, location: Location) -> bool {
        if self.entries.len() == self.entries.capacity() {
            return false;
        }
        self.entries.push(location);
        true
    }

    /// Reallocate to at least `new_capacity` entries
    pub fn grow(&mut self, new_capacity: usize) -> bool {
        if new_capacity < self.entries.capacity() || new_capacity > LOCATION_ARRAY_CEILING {
            return false;
        }
        self.entries.reserve_exact(new_capacity - self.entries.len());
        true
    }

    /// Next capacity step: double below `DOUBLING_LIMIT`, +25% above
    pub fn next_capacity(capacity: usize) -> usize {
        if capacity < DOUBLING_LIMIT {
            capacity * 2
        } else {
            capacity + capacity / 4
        }
    }

    /// Append, growing per policy; false when the ceiling is reached and
    /// the location must be dropped
    pub fn append(&mut self, location: Location) -> bool {
        if self.push(location) {
            return true;
        }
        let next = Self::next_capacity(self.entries.capacity()).min(LOCATION_ARRAY_CEILING);
        if !self.grow(next) {
            return false;
        }
        self.push(location)
    }

    /// Sort entries by (line, field) ascending for output
    pub fn sort_for_output(&mut self) {
        self.entries.sort_unstable();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    pub fn as_slice(&self) -> &[Location] {
        &self.entries
    }
}

/// One worker's locations for one address
///
/// The array is created lazily on the owner worker's first append. The
/// mutex is uncontended on the hot path: a given slot is written only by
/// its owner worker (or by the writer thread on that worker's behalf, which
/// never runs concurrently with an append for the same slot in practice);
/// it exists so growth can never race a reader.
#[derive(Debug, Default)]
pub struct ThreadLocations {
    locations: Mutex<Option<LocationArray>>,
    count: AtomicU64,
}

impl ThreadLocations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a location, creating or growing the array as needed;
    /// false when the array ceiling forces the location to be dropped
    pub fn append(&self, line: u64, field: u16) -> bool {
        let mut guard = self.locations.lock();
        let array = guard.get_or_insert_with(|| LocationArray::new(LOCATION_ARRAY_FLOOR));
        if array.append(Location { line, field }) {
            self.count.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// This worker's location count for the address
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Remove the array for output-time consumption
    pub fn take(&self) -> Option<LocationArray> {
        self.locations.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_floor() {
        let array = LocationArray::new(1);
        assert!(array.capacity() >= 64);
    }

    #[test]
    fn test_push_honors_capacity() {
        let mut array = LocationArray::new(64);
        for line in 0..array.capacity() as u64 {
            assert!(array.push(Location { line, field: 1 }));
        }
        assert!(!array.push(Location { line: 999, field: 1 }));
        // state unchanged on refusal
        assert_eq!(array.len(), array.capacity());
    }

    #[test]
    fn test_growth_policy_steps() {
        assert_eq!(LocationArray::next_capacity(64), 128);
        assert_eq!(LocationArray::next_capacity(1 << 19), 1 << 20);
        // at the doubling limit, growth drops to 25%
        assert_eq!(
            LocationArray::next_capacity(1 << 20),
            (1 << 20) + (1 << 18)
        );
    }

    #[test]
    fn test_append_grows() {
        let mut array = LocationArray::new(64);
        for line in 0..1000u64 {
            assert!(array.append(Location { line, field: 1 }));
        }
        assert_eq!(array.len(), 1000);
    }

    #[test]
    fn test_grow_rejects_shrink() {
        let mut array = LocationArray::new(128);
        assert!(!array.grow(64));
    }

    #[test]
    fn test_sort_for_output() {
        let mut array = LocationArray::new(64);
        array.push(Location { line: 5, field: 2 });
        array.push(Location { line: 1, field: 3 });
        array.push(Location { line: 5, field: 1 });
        array.sort_for_output();
        let lines: Vec<(u64, u16)> = array.as_slice().iter().map(|l| (l.line, l.field)).collect();
        assert_eq!(lines, vec![(1, 3), (5, 1), (5, 2)]);
    }

    #[test]
    fn test_thread_locations_lazy_and_counted() {
        let slot = ThreadLocations::new();
        assert_eq!(slot.count(), 0);
        assert!(slot.append(7, 3));
        assert!(slot.append(9, 1));
        assert_eq!(slot.count(), 2);
        let array = slot.take().unwrap();
        assert_eq!(array.len(), 2);
        assert!(slot.take().is_none());
    }
}
