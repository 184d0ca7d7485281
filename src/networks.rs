//! Network enumeration
//!
//! [`Networks`] walks every leaf under a starting node of the search tree
//! with an explicit stack, so memory use is bounded by the tree depth and
//! dropping the iterator stops the walk.

use crate::data_section::Decoder;
use crate::error::MmdbError;
use crate::mmdb::tree::SearchTree;
use crate::result::LookupResult;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Options for [`Reader::networks`](crate::Reader::networks) and
/// [`Reader::networks_within`](crate::Reader::networks_within)
///
/// ```
/// use mmdb_reader::NetworkOptions;
///
/// let options = NetworkOptions::new()
///     .include_aliased_networks(true)
///     .include_networks_without_data(true);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkOptions {
    include_aliased_networks: bool,
    include_networks_without_data: bool,
}

impl NetworkOptions {
    /// Default options: aliases pruned, empty networks skipped
    pub fn new() -> Self {
        Self::default()
    }

    /// Also yield the IPv4 subtree where IPv6 databases alias it, such as
    /// `::ffff:0:0/96`, `2001::/32` and `2002::/16`
    pub fn include_aliased_networks(mut self, include: bool) -> Self {
        self.include_aliased_networks = include;
        self
    }

    /// Also yield networks that have no record
    pub fn include_networks_without_data(mut self, include: bool) -> Self {
        self.include_networks_without_data = include;
        self
    }
}

/// A subtree still to be visited
#[derive(Debug, Clone, Copy)]
struct NetNode {
    /// Network address on the 128-bit scale
    ip: u128,
    /// Bits of `ip` fixed so far
    bit: usize,
    pointer: u32,
}

/// Iterator over the networks of a database
///
/// Yields one [`LookupResult`] per network. A corrupt tree yields a single
/// error result and ends the iteration.
pub struct Networks<'a> {
    tree: Option<SearchTree<'a>>,
    decoder: Option<Decoder<'a>>,
    options: NetworkOptions,
    stack: Vec<NetNode>,
    pending_error: Option<MmdbError>,
}

impl<'a> Networks<'a> {
    pub(crate) fn new(
        tree: SearchTree<'a>,
        decoder: Decoder<'a>,
        options: NetworkOptions,
        start: (u128, usize, u32),
    ) -> Self {
        let (ip, bit, pointer) = start;
        let mut stack = Vec::with_capacity(64);
        stack.push(NetNode { ip, bit, pointer });
        Self {
            tree: Some(tree),
            decoder: Some(decoder),
            options,
            stack,
            pending_error: None,
        }
    }

    /// An iterator yielding `err` once
    pub(crate) fn failed(err: MmdbError) -> Self {
        Self {
            tree: None,
            decoder: None,
            options: NetworkOptions::default(),
            stack: Vec::new(),
            pending_error: Some(err),
        }
    }

    fn finish(&mut self) {
        self.stack = Vec::new();
        self.tree = None;
    }
}

impl<'a> Iterator for Networks<'a> {
    type Item = LookupResult<'a>;

    fn next(&mut self) -> Option<LookupResult<'a>> {
        if let Some(err) = self.pending_error.take() {
            return Some(LookupResult::error(err, None, 0));
        }
        let tree = self.tree?;
        let decoder = self.decoder?;
        let node_count = tree.node_count();
        let ipv4_start = tree.ipv4_start();

        while let Some(mut node) = self.stack.pop() {
            loop {
                if node.pointer == node_count {
                    if self.options.include_networks_without_data {
                        return Some(LookupResult::empty(unmap(node.ip), node.bit));
                    }
                    break;
                }

                // The IPv4 subtree is reachable from aliases outside ::/96
                if !self.options.include_aliased_networks
                    && ipv4_start != 0
                    && node.pointer == ipv4_start
                    && !in_ipv4_subtree(node.ip)
                {
                    break;
                }

                if node.pointer > node_count {
                    let ip = unmap(node.ip);
                    return Some(match tree.resolve_data_pointer(node.pointer, decoder.len()) {
                        Ok(offset) => LookupResult::with_record(decoder, ip, node.bit, offset),
                        Err(err) => LookupResult::error(err, Some(ip), node.bit),
                    });
                }

                if node.bit >= 128 {
                    self.finish();
                    let ip = unmap(node.ip);
                    let prefix = LookupResult::empty(ip, node.bit)
                        .prefix()
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| ip.to_string());
                    return Some(LookupResult::error(
                        MmdbError::invalid_database(format!("invalid search tree at {}", prefix)),
                        Some(ip),
                        node.bit,
                    ));
                }

                let right_ip = node.ip | (1u128 << (127 - node.bit));
                let left = tree.nodes().read_left(node.pointer);
                let right = tree.nodes().read_right(node.pointer);
                node.bit += 1;
                self.stack.push(NetNode {
                    ip: right_ip,
                    bit: node.bit,
                    pointer: right,
                });
                node.pointer = left;
            }
        }

        self.finish();
        None
    }
}

/// Whether `ip` lies in `::0.0.0.0/96`
fn in_ipv4_subtree(ip: u128) -> bool {
    ip <= u32::MAX as u128
}

/// Report addresses in the IPv4 subtree as IPv4
fn unmap(ip: u128) -> IpAddr {
    if in_ipv4_subtree(ip) {
        IpAddr::V4(Ipv4Addr::from(ip as u32))
    } else {
        IpAddr::V6(Ipv6Addr::from(ip))
    }
}
