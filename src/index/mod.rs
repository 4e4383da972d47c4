//! The in-memory inverted index: per-address location storage and the
//! shared address dictionary.

mod dictionary;
mod locations;
mod record;

pub use dictionary::{fnv1a32, AddressDictionary, SharedDictionary};
pub use locations::{Location, LocationArray, ThreadLocations, LOCATION_ARRAY_CEILING};
pub use record::AddressRecord;
