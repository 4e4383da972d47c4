//! Deterministic index emission
//!
//! Records are sorted by (count desc, address asc) and each record's
//! per-thread location arrays are merged into one increasing stream, so the
//! output is byte-identical regardless of worker count or scheduling.

use std::io::Write;
use std::sync::Arc;

use crate::error::Result;
use crate::index::{AddressDictionary, AddressRecord, Location, LocationArray};

/// Write every record of `dictionary` to `out` as
/// `ADDRESS,COUNT,LINE:FIELD,...` lines; returns the record count
///
/// Line numbers are 1-based in the output; fields are as tagged by the
/// tokenizer. Each record's data is freed as soon as it has been written.
pub fn write_index<W: Write>(dictionary: AddressDictionary, out: &mut W) -> Result<u64> {
    let mut records: Vec<(Box<str>, u64, Arc<AddressRecord>)> = dictionary
        .into_entries()
        .into_iter()
        .map(|(address, record)| {
            let count = record.authoritative_count();
            (address, count, record)
        })
        .collect();
    records.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut written = 0u64;
    for (address, count, record) in records {
        let mut arrays: Vec<LocationArray> = record
            .threads()
            .iter()
            .filter_map(|slot| slot.take())
            .collect();
        for array in &mut arrays {
            array.sort_for_output();
        }

        write!(out, "{address},{count}")?;
        merge_locations(&arrays, out)?;
        out.write_all(b"\n")?;
        written += 1;
        drop(record);
    }

    out.flush()?;
    Ok(written)
}

/// N-way merge over sorted per-thread arrays
///
/// Linear scan per emitted pair; N is bounded by the worker count, so no
/// heap or auxiliary allocation is warranted.
fn merge_locations<W: Write>(arrays: &[LocationArray], out: &mut W) -> Result<()> {
    let mut cursors = vec![0usize; arrays.len()];
    loop {
        let mut best: Option<(usize, Location)> = None;
        for (i, array) in arrays.iter().enumerate() {
            if let Some(&location) = array.as_slice().get(cursors[i]) {
                if best.map_or(true, |(_, current)| location < current) {
                    best = Some((i, location));
                }
            }
        }
        match best {
            Some((i, location)) => {
                cursors[i] += 1;
                write!(out, ",{}:{}", location.line + 1, location.field)?;
            }
            None => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DictionarySettings;

    fn dict_with(entries: &[(&str, &[(usize, u64, u16)])]) -> AddressDictionary {
        let mut dictionary = AddressDictionary::new(DictionarySettings::default());
        for (address, locations) in entries {
            let max_worker = locations.iter().map(|l| l.0).max().unwrap_or(0);
            let record = Arc::new(AddressRecord::new(max_worker + 1));
            for &(worker, line, field) in *locations {
                record.record(worker, line, field);
            }
            dictionary.insert(address, record).unwrap();
        }
        dictionary
    }

    fn render(dictionary: AddressDictionary) -> String {
        let mut out = Vec::new();
        write_index(dictionary, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_empty_dictionary() {
        let dictionary = AddressDictionary::new(DictionarySettings::default());
        assert_eq!(render(dictionary), "");
    }

    #[test]
    fn test_single_record_format() {
        let dictionary = dict_with(&[("10.0.0.1", &[(0, 0, 2), (0, 1, 2)])]);
        assert_eq!(render(dictionary), "10.0.0.1,2,1:2,2:2\n");
    }

    #[test]
    fn test_records_sorted_by_count_then_address() {
        let dictionary = dict_with(&[
            ("aa:bb:cc:dd:ee:ff", &[(0, 0, 4)]),
            ("192.168.1.1", &[(0, 0, 2), (0, 1, 2)]),
            ("::1", &[(0, 0, 6)]),
        ]);
        assert_eq!(
            render(dictionary),
            "192.168.1.1,2,1:2,2:2\n::1,1,1:6\naa:bb:cc:dd:ee:ff,1,1:4\n"
        );
    }

    #[test]
    fn test_frequency_ties_break_by_address_bytes() {
        let dictionary = dict_with(&[("10.0.0.2", &[(0, 5, 1)]), ("10.0.0.10", &[(0, 3, 1)])]);
        // byte-lexicographic: "10.0.0.10" < "10.0.0.2"
        assert_eq!(render(dictionary), "10.0.0.10,1,4:1\n10.0.0.2,1,6:1\n");
    }

    #[test]
    fn test_merge_interleaves_thread_arrays() {
        let dictionary = dict_with(&[(
            "10.0.0.1",
            &[(1, 4, 1), (0, 1, 1), (2, 2, 1), (0, 3, 1), (1, 0, 1)],
        )]);
        assert_eq!(render(dictionary), "10.0.0.1,5,1:1,2:1,3:1,4:1,5:1\n");
    }

    #[test]
    fn test_same_line_ties_break_by_field() {
        let dictionary = dict_with(&[("10.0.0.1", &[(1, 7, 5), (0, 7, 2)])]);
        assert_eq!(render(dictionary), "10.0.0.1,2,8:2,8:5\n");
    }
}
