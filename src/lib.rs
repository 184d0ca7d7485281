//! mmdb-reader - Reader for MaxMind DB files
//!
//! Reads the MaxMind DB format used by GeoIP2, GeoLite2 and compatible
//! databases: a binary search tree over IP address bits, a section of typed
//! records and a metadata block describing both.
//!
//! # Quick Start
//!
//! ```no_run
//! use mmdb_reader::{DataValue, NetworkOptions, Reader};
//!
//! let reader = Reader::open("GeoLite2-City.mmdb")?;
//!
//! // Address lookup
//! let result = reader.lookup("81.2.69.142".parse().unwrap());
//! if let Some(record) = result.decode::<DataValue>()? {
//!     println!("{}: {:?}", result.prefix().unwrap(), record.get("city"));
//! }
//!
//! // Every network in the database
//! for network in reader.networks(NetworkOptions::new()) {
//!     println!("{}", network.prefix().unwrap());
//! }
//! # Ok::<(), mmdb_reader::MmdbError>(())
//! ```
//!
//! # Decoding
//!
//! Records bind into any type implementing [`serde::Deserialize`]. Strings
//! and byte arrays can be borrowed straight from the database, and only
//! the fields the target asks for are decoded. For a single value deep in
//! a record use [`LookupResult::decode_path`]; to stream a record without
//! building anything use [`RecordVisitor`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  Database File Format                │
//! ├──────────────────────────────────────┤
//! │  1. Search Tree (binary trie)        │
//! │  2. 16-byte separator                │
//! │  3. Data Section (typed records)     │
//! │  4. Metadata marker + metadata map   │
//! └──────────────────────────────────────┘
//!          ↓ mmap() or read into memory
//! ┌──────────────────────────────────────┐
//! │  Reader (immutable, Send + Sync)     │
//! │  lookups borrow, nothing is copied   │
//! └──────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Data section decoding
pub mod data_section;
/// Database reader
pub mod database;
/// Serde deserializer over the data section
pub mod de;
/// Error types
pub mod error;
/// Typed GeoIP2 records
pub mod geoip2;
pub mod mmap;
/// MMDB format implementation
pub mod mmdb;
/// Network enumeration
pub mod networks;
/// Path-based partial decoding
pub mod path;
/// IP network prefixes
pub mod prefix;
/// Lookup results
pub mod result;
#[cfg(test)]
mod test_util;
/// Streaming record visitor
pub mod visitor;

// Re-exports for Rust consumers

/// Database reader and data-section scan
pub use crate::database::{DataRecord, DataRecords, Reader};

/// Decoded values and the decoder
pub use crate::data_section::{DataType, DataValue, Decoder};

pub use crate::de::Offset;
pub use crate::error::{MmdbError, Result};
pub use crate::mmap::Source;
pub use crate::mmdb::{IpVersion, Metadata, RecordSize};
pub use crate::networks::{NetworkOptions, Networks};
pub use crate::path::PathElement;
pub use crate::prefix::IpPrefix;
pub use crate::result::LookupResult;
pub use crate::visitor::RecordVisitor;

// Version information
/// Library version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
