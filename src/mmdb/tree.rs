//! MMDB Search Tree Traversal
//!
//! Implements binary search tree traversal for IP address lookups.
//! The tree uses a compact binary representation where each node contains
//! two records (left and right) that point to either:
//! - Another node (continue traversal)
//! - A data section offset (found)
//! - A "not found" marker (the record equals `node_count`)
//!
//! IPv4 addresses are walked as `::a.b.c.d`. In IPv6 trees the node reached
//! after 96 zero bits is found once at open, so IPv4 lookups start there.

use super::types::{IpVersion, RecordSize, DATA_SECTION_SEPARATOR_SIZE};
use crate::error::{MmdbError, Result};
use std::net::IpAddr;

/// Reads child records out of the packed node array
///
/// The slice is exactly `node_count * node_bytes` long and callers only
/// pass indices below `node_count`, so indexing cannot go out of range.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NodeReader<'a> {
    nodes: &'a [u8],
    record_size: RecordSize,
}

impl<'a> NodeReader<'a> {
    pub fn new(nodes: &'a [u8], record_size: RecordSize) -> Self {
        Self { nodes, record_size }
    }

    /// Read the record followed for a 0 bit
    #[inline]
    pub fn read_left(&self, node: u32) -> u32 {
        let base = node as usize * self.record_size.node_bytes();
        let b = &self.nodes[base..base + self.record_size.node_bytes()];
        match self.record_size {
            RecordSize::Bits24 => be24(b[0], b[1], b[2]),
            // Middle byte holds the high nibble of the left record
            RecordSize::Bits28 => (((b[3] & 0xF0) as u32) << 20) | be24(b[0], b[1], b[2]),
            RecordSize::Bits32 => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        }
    }

    /// Read the record followed for a 1 bit
    #[inline]
    pub fn read_right(&self, node: u32) -> u32 {
        let base = node as usize * self.record_size.node_bytes();
        let b = &self.nodes[base..base + self.record_size.node_bytes()];
        match self.record_size {
            RecordSize::Bits24 => be24(b[3], b[4], b[5]),
            RecordSize::Bits28 => (((b[3] & 0x0F) as u32) << 24) | be24(b[4], b[5], b[6]),
            RecordSize::Bits32 => u32::from_be_bytes([b[4], b[5], b[6], b[7]]),
        }
    }

    /// Read the record selected by `bit`
    #[inline]
    pub fn read(&self, node: u32, bit: u8) -> u32 {
        if bit == 0 {
            self.read_left(node)
        } else {
            self.read_right(node)
        }
    }
}

#[inline]
fn be24(b0: u8, b1: u8, b2: u8) -> u32 {
    ((b0 as u32) << 16) | ((b1 as u32) << 8) | (b2 as u32)
}

/// Search tree for IP address lookups
#[derive(Debug, Clone, Copy)]
pub(crate) struct SearchTree<'a> {
    nodes: NodeReader<'a>,
    node_count: u32,
    ip_version: IpVersion,
    ipv4_start: u32,
    ipv4_start_bit_depth: usize,
}

impl<'a> SearchTree<'a> {
    /// Create a search tree, locating the IPv4 start node
    pub fn new(nodes: &'a [u8], record_size: RecordSize, node_count: u32, ip_version: IpVersion) -> Self {
        let reader = NodeReader::new(nodes, record_size);
        let start = find_ipv4_start(&reader, node_count, ip_version);
        Self::with_ipv4_start(nodes, record_size, node_count, ip_version, start)
    }

    /// Create a search tree with an IPv4 start node found earlier by
    /// [`SearchTree::new`]
    pub fn with_ipv4_start(
        nodes: &'a [u8],
        record_size: RecordSize,
        node_count: u32,
        ip_version: IpVersion,
        (ipv4_start, ipv4_start_bit_depth): (u32, usize),
    ) -> Self {
        Self {
            nodes: NodeReader::new(nodes, record_size),
            node_count,
            ip_version,
            ipv4_start,
            ipv4_start_bit_depth,
        }
    }

    pub fn nodes(&self) -> &NodeReader<'a> {
        &self.nodes
    }

    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    pub fn ip_version(&self) -> IpVersion {
        self.ip_version
    }

    /// Node where IPv4 lookups begin (0 for IPv4 trees)
    pub fn ipv4_start(&self) -> u32 {
        self.ipv4_start
    }

    /// IPv4 start node with the depth at which it sits
    pub fn ipv4_start_with_depth(&self) -> (u32, usize) {
        (self.ipv4_start, self.ipv4_start_bit_depth)
    }

    /// Walk the tree for `ip` until `stop_bit` bits are consumed or a
    /// non-node record is reached
    ///
    /// Returns the final record value and the number of bits consumed, on
    /// the 128-bit scale.
    pub fn traverse(&self, ip: IpAddr, stop_bit: usize) -> (u32, usize) {
        let bits = ip_bits(ip);
        let (mut node, mut depth) = match ip {
            IpAddr::V4(_) => (self.ipv4_start, self.ipv4_start_bit_depth),
            IpAddr::V6(_) => (0, 0),
        };

        while depth < stop_bit && node < self.node_count {
            let bit = ((bits >> (127 - depth)) & 1) as u8;
            node = self.nodes.read(node, bit);
            depth += 1;
        }

        (node, depth)
    }

    /// Look up an IP address
    ///
    /// Returns the record found at the end of the walk (`None` when the
    /// prefix is empty) together with the number of bits walked on the
    /// 128-bit scale. The depth is reported even when the walk fails.
    pub fn lookup(&self, ip: IpAddr) -> (Result<Option<u32>>, usize) {
        if ip.is_ipv6() && self.ip_version == IpVersion::V4 {
            let err = MmdbError::IpVersionMismatch(format!(
                "error looking up '{}': you attempted to look up an IPv6 address in an IPv4-only database",
                ip
            ));
            return (Err(err), 0);
        }

        let (record, depth) = self.traverse(ip, 128);
        let found = if record == self.node_count {
            Ok(None)
        } else if record > self.node_count {
            Ok(Some(record))
        } else {
            Err(MmdbError::invalid_database("invalid node in search tree"))
        };
        (found, depth)
    }

    /// Convert a data record into an offset relative to the data section
    pub fn resolve_data_pointer(&self, record: u32, data_len: usize) -> Result<usize> {
        let offset = (record as usize)
            .checked_sub(self.node_count as usize + DATA_SECTION_SEPARATOR_SIZE)
            .filter(|&offset| offset < data_len);

        offset.ok_or_else(|| {
            MmdbError::invalid_database("the MaxMind DB file's search tree is corrupt")
        })
    }
}

/// Walk the left spine of an IPv6 tree for up to 96 bits
fn find_ipv4_start(nodes: &NodeReader<'_>, node_count: u32, ip_version: IpVersion) -> (u32, usize) {
    if ip_version == IpVersion::V4 {
        return (0, 96);
    }

    let mut node = 0u32;
    let mut depth = 0usize;
    while depth < 96 && node < node_count {
        node = nodes.read_left(node);
        depth += 1;
    }
    (node, depth)
}

/// The address as a 128-bit integer, IPv4 in the `::a.b.c.d` position
pub(crate) fn ip_bits(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u32::from(v4) as u128,
        IpAddr::V6(v6) => u128::from(v6),
    }
}
