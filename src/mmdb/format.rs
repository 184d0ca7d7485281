//! MMDB Binary Format Parsing
//!
//! Locates the metadata block at the end of the file, binds it to
//! [`Metadata`] and derives the section boundaries every query needs.
//!
//! Layout:
//!
//! ```text
//! [ search tree ][ 16 zero bytes ][ data section ][ marker ][ metadata ]
//! ```
//!
//! Only the marker search touches the whole buffer; everything after
//! that is offset arithmetic.

use super::types::{IpVersion, RecordSize, DATA_SECTION_SEPARATOR_SIZE, METADATA_MARKER};
use crate::data_section::Decoder;
use crate::error::{MmdbError, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Database metadata, decoded from the map that follows the marker
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Metadata {
    /// Number of nodes in the search tree
    pub node_count: u32,
    /// Record size in bits (24, 28, or 32)
    pub record_size: u16,
    /// IP version of the search tree (4 or 6)
    pub ip_version: u16,
    /// Major version of the binary format (always 2)
    pub binary_format_major_version: u16,
    /// Minor version of the binary format
    pub binary_format_minor_version: u16,
    /// Build time as seconds since the Unix epoch
    pub build_epoch: u64,
    /// Database type, e.g. `GeoIP2-City`
    pub database_type: String,
    /// Locale codes for which the records may contain localized data
    pub languages: Vec<String>,
    /// Description keyed by language code
    pub description: HashMap<String, String>,
}

impl Metadata {
    /// Build time of the database
    pub fn build_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.build_epoch)
    }

    /// Description for `language`, if the database carries one
    pub fn description_for(&self, language: &str) -> Option<&str> {
        self.description.get(language).map(String::as_str)
    }

    /// Descriptions sorted by language code
    pub fn descriptions(&self) -> BTreeMap<&str, &str> {
        self.description
            .iter()
            .map(|(lang, text)| (lang.as_str(), text.as_str()))
            .collect()
    }
}

/// Section boundaries derived from the metadata
///
/// Everything a query needs to slice the buffer, validated once at open.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Layout {
    /// Number of nodes in the search tree
    pub node_count: u32,
    /// Record size in bits (24, 28, or 32)
    pub record_size: RecordSize,
    /// IP version (4 or 6)
    pub ip_version: IpVersion,
    /// Size of the search tree in bytes
    pub tree_size: usize,
    /// First byte of the data section
    pub data_start: usize,
    /// One past the last byte of the data section (the marker position)
    pub data_end: usize,
}

impl Layout {
    /// Parse the metadata of a complete MMDB buffer
    pub fn parse(data: &[u8]) -> Result<(Metadata, Layout)> {
        let marker_start = find_metadata_start(data)?;
        let metadata_bytes = &data[marker_start + METADATA_MARKER.len()..];

        // Pointers inside the metadata are relative to the metadata block.
        let metadata: Metadata = Decoder::new(metadata_bytes).decode(0)?;
        let layout = Layout::from_metadata(&metadata, marker_start, data.len())?;
        Ok((metadata, layout))
    }

    fn from_metadata(metadata: &Metadata, marker_start: usize, buffer_len: usize) -> Result<Self> {
        if metadata.binary_format_major_version != 2 {
            return Err(MmdbError::invalid_database(format!(
                "unsupported binary format major version: {}",
                metadata.binary_format_major_version
            )));
        }
        let record_size = RecordSize::from_bits(metadata.record_size)?;
        let ip_version = IpVersion::from_number(metadata.ip_version)?;

        let tree_size = (metadata.node_count as u64) * (record_size.node_bytes() as u64);
        let data_start = tree_size + DATA_SECTION_SEPARATOR_SIZE as u64;
        if data_start > marker_start as u64 || marker_start > buffer_len {
            return Err(MmdbError::invalid_database(
                "the MaxMind DB contains invalid metadata",
            ));
        }

        Ok(Layout {
            node_count: metadata.node_count,
            record_size,
            ip_version,
            tree_size: tree_size as usize,
            data_start: data_start as usize,
            data_end: marker_start,
        })
    }
}

/// Find the start of the LAST metadata marker in an MMDB buffer
///
/// Record payloads may legitimately contain the marker bytes, so the
/// search runs backward from the end of the file.
pub fn find_metadata_start(data: &[u8]) -> Result<usize> {
    memchr::memmem::rfind(data, METADATA_MARKER).ok_or_else(|| {
        MmdbError::invalid_database("error opening database: invalid MaxMind DB file")
    })
}
