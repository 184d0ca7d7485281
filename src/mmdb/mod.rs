//! MaxMind DB (MMDB) binary format
//!
//! The MMDB format uses a binary search tree for efficient IP address
//! lookups. Records are stored in the data section format implemented by
//! [`crate::data_section`].
//!
//! ## Architecture
//!
//! - **types**: MMDB-specific types and constants
//! - **format**: Metadata location and section boundaries
//! - **tree**: Node reading and search tree traversal

pub mod format;
pub(crate) mod tree;
pub mod types;

// Re-export key types
pub use format::{find_metadata_start, Metadata};
pub use types::{IpVersion, RecordSize, METADATA_MARKER};
