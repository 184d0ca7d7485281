//! Lookup results

use crate::data_section::Decoder;
use crate::error::{MmdbError, Result};
use crate::path::PathElement;
use crate::prefix::IpPrefix;
use crate::visitor::RecordVisitor;
use serde::Deserialize;
use std::net::{IpAddr, Ipv6Addr};

/// Outcome of a lookup, a network enumeration step or an offset lookup
///
/// Nothing is decoded until [`decode`](Self::decode) (or one of its
/// variants) is called. Errors found during the lookup travel with the
/// result and are returned again by every decode call.
#[derive(Debug, Clone)]
pub struct LookupResult<'a> {
    decoder: Option<Decoder<'a>>,
    ip: Option<IpAddr>,
    /// Bits consumed on the 128-bit scale
    prefix_len: usize,
    offset: Option<usize>,
    err: Option<MmdbError>,
}

impl<'a> LookupResult<'a> {
    pub(crate) fn with_record(decoder: Decoder<'a>, ip: IpAddr, prefix_len: usize, offset: usize) -> Self {
        Self {
            decoder: Some(decoder),
            ip: Some(ip),
            prefix_len,
            offset: Some(offset),
            err: None,
        }
    }

    pub(crate) fn empty(ip: IpAddr, prefix_len: usize) -> Self {
        Self {
            decoder: None,
            ip: Some(ip),
            prefix_len,
            offset: None,
            err: None,
        }
    }

    pub(crate) fn at_offset(decoder: Decoder<'a>, offset: usize) -> Self {
        Self {
            decoder: Some(decoder),
            ip: None,
            prefix_len: 0,
            offset: Some(offset),
            err: None,
        }
    }

    pub(crate) fn error(err: MmdbError, ip: Option<IpAddr>, prefix_len: usize) -> Self {
        Self {
            decoder: None,
            ip,
            prefix_len,
            offset: None,
            err: Some(err),
        }
    }

    /// The error encountered during the lookup, if any
    pub fn err(&self) -> Option<&MmdbError> {
        self.err.as_ref()
    }

    /// Whether the address or network has a record
    pub fn found(&self) -> bool {
        self.err.is_none() && self.offset.is_some()
    }

    /// Data-section offset of the record, `None` when there is no record
    ///
    /// Records shared by several networks have the same offset, so the
    /// offset can key a cache of decoded records.
    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    /// The address that was looked up, or the network address for
    /// enumeration results
    pub fn ip(&self) -> Option<IpAddr> {
        self.ip
    }

    /// The network in the database containing the address
    ///
    /// IPv4 addresses are reported as IPv4 networks, except when the IPv4
    /// subtree of an IPv6 database is itself covered by a shorter IPv6
    /// network, in which case that network is returned. `None` for offset
    /// lookups.
    pub fn prefix(&self) -> Option<IpPrefix> {
        let ip = self.ip?;
        let len = u8::try_from(self.prefix_len).ok()?;
        match ip {
            IpAddr::V4(_) if len < 96 => IpPrefix::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), len).ok(),
            IpAddr::V4(_) => IpPrefix::new(ip, len - 96).ok(),
            IpAddr::V6(_) => IpPrefix::new(ip, len).ok(),
        }
    }

    fn target(&self) -> Result<Option<(Decoder<'a>, usize)>> {
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        Ok(self.decoder.zip(self.offset))
    }

    /// Bind the record into `T`; `Ok(None)` when there is no record
    pub fn decode<T: Deserialize<'a>>(&self) -> Result<Option<T>> {
        match self.target()? {
            Some((decoder, offset)) => decoder.decode(offset).map(Some),
            None => Ok(None),
        }
    }

    /// Bind the value selected by `path` into `T`
    ///
    /// `Ok(None)` when there is no record or the path selects nothing.
    ///
    /// ```no_run
    /// # use mmdb_reader::{PathElement, Reader};
    /// # let reader = Reader::open("GeoLite2-City.mmdb")?;
    /// let result = reader.lookup("81.2.69.142".parse().unwrap());
    /// let name: Option<&str> = result.decode_path(&[
    ///     PathElement::Key("city"),
    ///     PathElement::Key("names"),
    ///     PathElement::Key("en"),
    /// ])?;
    /// # Ok::<(), mmdb_reader::MmdbError>(())
    /// ```
    pub fn decode_path<T: Deserialize<'a>>(&self, path: &[PathElement<'_>]) -> Result<Option<T>> {
        let Some((decoder, offset)) = self.target()? else {
            return Ok(None);
        };
        match decoder.locate(offset, path)? {
            Some(offset) => decoder.decode(offset).map(Some),
            None => Ok(None),
        }
    }

    /// Feed the record to `visitor`; returns whether there was a record
    pub fn decode_with<V>(&self, visitor: &mut V) -> Result<bool>
    where
        V: RecordVisitor<'a> + ?Sized,
    {
        match self.target()? {
            Some((decoder, offset)) => {
                decoder.walk(offset, visitor)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
