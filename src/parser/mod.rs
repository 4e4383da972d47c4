//! Network address extraction
//!
//! Candidate discovery is anchor-driven: dots suggest IPv4, colons and
//! dashes suggest IPv6 or MAC. Each anchor seeds a backward walk to the
//! start of a legal run, then a type-specific validator runs forward.

mod address;

pub use address::{AddrCandidate, AddrKind, AddressParser};
