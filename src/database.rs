//! Database reader
//!
//! [`Reader`] owns the bytes of one MaxMind DB file and answers every query
//! against them: address lookups, network enumeration, offset lookups and
//! a scan of the data section. Queries only borrow the reader, so one
//! reader can serve any number of threads.
//!
//! # Examples
//!
//! ```no_run
//! use mmdb_reader::Reader;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Record<'a> {
//!     #[serde(borrow)]
//!     country: Country<'a>,
//! }
//!
//! #[derive(Deserialize)]
//! struct Country<'a> {
//!     iso_code: &'a str,
//! }
//!
//! let reader = Reader::open("GeoLite2-Country.mmdb")?;
//! let result = reader.lookup("81.2.69.142".parse().unwrap());
//! if let Some(record) = result.decode::<Record>()? {
//!     println!("{} is in {}", result.prefix().unwrap(), record.country.iso_code);
//! }
//! # Ok::<(), mmdb_reader::MmdbError>(())
//! ```

use crate::data_section::Decoder;
use crate::error::{MmdbError, Result};
use crate::mmap::Source;
use crate::mmdb::format::{Layout, Metadata};
use crate::mmdb::tree::{ip_bits, SearchTree};
use crate::mmdb::types::IpVersion;
use crate::networks::{NetworkOptions, Networks};
use crate::prefix::IpPrefix;
use crate::result::LookupResult;
use crate::visitor::RecordVisitor;
use log::debug;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};

/// A MaxMind DB file opened for reading
pub struct Reader {
    /// `None` once closed
    source: Option<Source>,
    path: Option<PathBuf>,
    metadata: Metadata,
    layout: Layout,
    /// IPv4 start node and its depth, found once at open
    ipv4_start: (u32, usize),
}

impl Reader {
    /// Open a database file, memory-mapping it where the platform allows
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is empty, or is not a
    /// valid MaxMind DB.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = Self::from_source(Source::open(path)?)?;
        reader.path = Some(path.to_path_buf());
        Ok(reader)
    }

    /// Read a database from bytes already in memory
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_source(Source::Owned(data))
    }

    /// Read a database from an opened [`Source`]
    pub fn from_source(source: Source) -> Result<Self> {
        let (metadata, layout) = Layout::parse(&source)?;
        let tree = SearchTree::new(
            &source[..layout.tree_size],
            layout.record_size,
            layout.node_count,
            layout.ip_version,
        );
        let ipv4_start = tree.ipv4_start_with_depth();

        debug!(
            "opened {} database: {} nodes, {}-bit records, IPv{}, {} data bytes, mapped: {}",
            if metadata.database_type.is_empty() {
                "untyped"
            } else {
                metadata.database_type.as_str()
            },
            layout.node_count,
            metadata.record_size,
            metadata.ip_version,
            layout.data_end - layout.data_start,
            source.is_mapped()
        );

        Ok(Self {
            source: Some(source),
            path: None,
            metadata,
            layout,
            ipv4_start,
        })
    }

    /// Database metadata
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Path the database was opened from, if it came from a file
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Release the underlying bytes, unmapping the file
    ///
    /// Further queries fail with a closed-database error. Closing again
    /// does nothing.
    pub fn close(&mut self) -> Result<()> {
        if let Some(source) = self.source.take() {
            debug!(
                "closing database{}",
                self.path
                    .as_deref()
                    .map(|p| format!(" {}", p.display()))
                    .unwrap_or_default()
            );
            drop(source);
        }
        Ok(())
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    fn parts(&self) -> Option<(SearchTree<'_>, Decoder<'_>)> {
        let buf = self.source.as_deref()?;
        let tree = SearchTree::with_ipv4_start(
            &buf[..self.layout.tree_size],
            self.layout.record_size,
            self.layout.node_count,
            self.layout.ip_version,
            self.ipv4_start,
        );
        let decoder = Decoder::new(&buf[self.layout.data_start..self.layout.data_end]);
        Some((tree, decoder))
    }

    /// Look up the record for an address
    ///
    /// Errors, including lookups on a closed database and IPv6 lookups in
    /// an IPv4 database, travel with the result; see [`LookupResult::err`].
    pub fn lookup(&self, ip: IpAddr) -> LookupResult<'_> {
        let Some((tree, decoder)) = self.parts() else {
            return LookupResult::error(
                MmdbError::Closed("cannot call Lookup on a closed database"),
                Some(ip),
                0,
            );
        };

        let (found, depth) = tree.lookup(ip);
        match found {
            Ok(None) => LookupResult::empty(ip, depth),
            Ok(Some(record)) => match tree.resolve_data_pointer(record, decoder.len()) {
                Ok(offset) => LookupResult::with_record(decoder, ip, depth, offset),
                Err(err) => LookupResult::error(err, Some(ip), depth),
            },
            Err(err) => LookupResult::error(err, Some(ip), depth),
        }
    }

    /// A result for the record at a data-section offset
    ///
    /// Offsets come from [`LookupResult::offset`] or
    /// [`DataRecord::offset`]; the result has no address or prefix.
    pub fn lookup_offset(&self, offset: usize) -> LookupResult<'_> {
        match self.parts() {
            Some((_, decoder)) => LookupResult::at_offset(decoder, offset),
            None => LookupResult::error(
                MmdbError::Closed("cannot call Decode on a closed database"),
                None,
                0,
            ),
        }
    }

    /// Iterate over every network in the database
    pub fn networks(&self, options: NetworkOptions) -> Networks<'_> {
        let all = match self.layout.ip_version {
            IpVersion::V4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpVersion::V6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        self.networks_within(IpPrefix::all(all), options)
    }

    /// Iterate over the networks inside `prefix`
    ///
    /// When `prefix` lies inside a single network of the database, that
    /// containing network is the only one yielded.
    pub fn networks_within(&self, prefix: IpPrefix, options: NetworkOptions) -> Networks<'_> {
        let Some((tree, decoder)) = self.parts() else {
            return Networks::failed(MmdbError::Closed(
                "cannot call Networks on a closed database",
            ));
        };

        if tree.ip_version() == IpVersion::V4 && !prefix.is_ipv4() {
            return Networks::failed(MmdbError::IpVersionMismatch(format!(
                "error getting networks with '{}': you attempted to use an IPv6 network in an IPv4-only database",
                prefix
            )));
        }

        let ip = prefix.addr();
        let mut stop_bit = prefix.prefix_len() as usize;
        if ip.is_ipv4() {
            stop_bit += 96;
        }

        let (pointer, bit) = tree.traverse(ip, stop_bit);
        let mask = u128::MAX.checked_shl(128 - bit as u32).unwrap_or(0);
        Networks::new(tree, decoder, options, (ip_bits(ip) & mask, bit, pointer))
    }

    /// Iterate over the records of the data section in storage order
    pub fn data(&self) -> DataRecords<'_> {
        match self.parts() {
            Some((_, decoder)) => DataRecords {
                decoder: Some(decoder),
                offset: 0,
                pending_error: None,
            },
            None => DataRecords {
                decoder: None,
                offset: 0,
                pending_error: Some(MmdbError::Closed("cannot call Data on a closed database")),
            },
        }
    }
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("path", &self.path)
            .field("database_type", &self.metadata.database_type)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Iterator over the top-level values of the data section
///
/// A decode error is yielded once and ends the iteration.
pub struct DataRecords<'a> {
    decoder: Option<Decoder<'a>>,
    offset: usize,
    pending_error: Option<MmdbError>,
}

impl<'a> Iterator for DataRecords<'a> {
    type Item = Result<DataRecord<'a>>;

    fn next(&mut self) -> Option<Result<DataRecord<'a>>> {
        if let Some(err) = self.pending_error.take() {
            return Some(Err(err));
        }
        let decoder = self.decoder?;
        if self.offset >= decoder.len() {
            return None;
        }

        match decoder.skip(self.offset) {
            Ok(next) => {
                let record = DataRecord {
                    decoder,
                    offset: self.offset,
                };
                self.offset = next;
                Some(Ok(record))
            }
            Err(err) => {
                self.decoder = None;
                Some(Err(err))
            }
        }
    }
}

/// One value of the data section
#[derive(Debug, Clone, Copy)]
pub struct DataRecord<'a> {
    decoder: Decoder<'a>,
    offset: usize,
}

impl<'a> DataRecord<'a> {
    /// Offset of the value within the data section
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bind the value into `T`
    pub fn decode<T: Deserialize<'a>>(&self) -> Result<T> {
        self.decoder.decode(self.offset)
    }

    /// Feed the value to `visitor`
    pub fn decode_with<V>(&self, visitor: &mut V) -> Result<()>
    where
        V: RecordVisitor<'a> + ?Sized,
    {
        self.decoder.walk(self.offset, visitor).map(|_| ())
    }
}
