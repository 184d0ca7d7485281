//! In-memory database writer for tests
//!
//! Builds complete MaxMind DB files: an arena-allocated search tree, a data
//! section with every wire type (pointers included) and a metadata map.
//! Longer prefixes win regardless of insertion order.

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

pub const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

/// A value as written to the data section
#[derive(Debug, Clone, PartialEq)]
pub enum Wire {
    Str(String),
    Double(f64),
    Bytes(Vec<u8>),
    U16(u16),
    U32(u32),
    Map(Vec<(Wire, Wire)>),
    I32(i32),
    U64(u64),
    U128(u128),
    Array(Vec<Wire>),
    Bool(bool),
    Float(f32),
    /// Pointer to an offset already written to the data section
    Pointer(u32),
}

impl Wire {
    pub fn str(s: &str) -> Self {
        Wire::Str(s.to_string())
    }

    pub fn map<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Wire)>,
    {
        Wire::Map(
            entries
                .into_iter()
                .map(|(key, value)| (Wire::str(key), value))
                .collect(),
        )
    }

    pub fn names(names: &[(&str, &str)]) -> Self {
        Wire::map(names.iter().map(|(k, v)| (*k, Wire::str(v))))
    }
}

/// Encode a value, appending to `out`
pub fn encode(value: &Wire, out: &mut Vec<u8>) {
    match value {
        Wire::Pointer(target) => encode_pointer(*target, out),
        Wire::Str(s) => {
            control(2, s.len(), out);
            out.extend_from_slice(s.as_bytes());
        }
        Wire::Double(v) => {
            control(3, 8, out);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Wire::Bytes(b) => {
            control(4, b.len(), out);
            out.extend_from_slice(b);
        }
        Wire::U16(v) => uint(5, *v as u128, out),
        Wire::U32(v) => uint(6, *v as u128, out),
        Wire::Map(entries) => {
            control(7, entries.len(), out);
            for (key, value) in entries {
                encode(key, out);
                encode(value, out);
            }
        }
        Wire::I32(v) => {
            if *v < 0 {
                control(8, 4, out);
                out.extend_from_slice(&v.to_be_bytes());
            } else {
                uint(8, *v as u128, out);
            }
        }
        Wire::U64(v) => uint(9, *v as u128, out),
        Wire::U128(v) => uint(10, *v, out),
        Wire::Array(items) => {
            control(11, items.len(), out);
            for item in items {
                encode(item, out);
            }
        }
        Wire::Bool(v) => control(14, *v as usize, out),
        Wire::Float(v) => {
            control(15, 4, out);
            out.extend_from_slice(&v.to_be_bytes());
        }
    }
}

pub fn encode_to_vec(value: &Wire) -> Vec<u8> {
    let mut out = Vec::new();
    encode(value, &mut out);
    out
}

/// Unsigned integers use the fewest bytes that hold the value
fn uint(type_id: u8, value: u128, out: &mut Vec<u8>) {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    control(type_id, bytes.len() - skip, out);
    out.extend_from_slice(&bytes[skip..]);
}

/// Control byte (plus extended type byte) and size field
pub fn control(type_id: u8, size: usize, out: &mut Vec<u8>) {
    let (size_bits, extra): (u8, Vec<u8>) = if size < 29 {
        (size as u8, Vec::new())
    } else if size < 29 + 256 {
        (29, vec![(size - 29) as u8])
    } else if size < 285 + 65_536 {
        (30, ((size - 285) as u16).to_be_bytes().to_vec())
    } else {
        (31, ((size - 65_821) as u32).to_be_bytes()[1..].to_vec())
    };

    if type_id <= 7 {
        out.push((type_id << 5) | size_bits);
    } else {
        out.push(size_bits);
        out.push(type_id - 7);
    }
    out.extend_from_slice(&extra);
}

fn encode_pointer(target: u32, out: &mut Vec<u8>) {
    if target < 2048 {
        out.push(0x20 | ((target >> 8) & 0x07) as u8);
        out.push(target as u8);
    } else if target < 526_336 {
        let v = target - 2048;
        out.push(0x20 | (1 << 3) | ((v >> 16) & 0x07) as u8);
        out.extend_from_slice(&(v as u16).to_be_bytes());
    } else if target < 526_336 + (1 << 27) {
        let v = target - 526_336;
        out.push(0x20 | (2 << 3) | ((v >> 24) & 0x07) as u8);
        out.extend_from_slice(&v.to_be_bytes()[1..]);
    } else {
        out.push(0x20 | (3 << 3));
        out.extend_from_slice(&target.to_be_bytes());
    }
}

/// Child of a tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Node(u32),
    /// Data offset and the prefix length it was inserted with
    Data(u32, usize),
    /// Written as-is, for corrupt trees
    Raw(u32),
    Empty,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    left: Edge,
    right: Edge,
}

const EMPTY_NODE: Node = Node {
    left: Edge::Empty,
    right: Edge::Empty,
};

/// Builds a database in memory
pub struct MmdbWriter {
    ip_version: u16,
    record_size: u16,
    nodes: Vec<Node>,
    data: Vec<u8>,
    dedup: HashMap<Vec<u8>, u32>,
    database_type: String,
    languages: Vec<String>,
    description: Vec<(String, String)>,
    build_epoch: u64,
}

impl MmdbWriter {
    pub fn new(ip_version: u16, record_size: u16) -> Self {
        Self {
            ip_version,
            record_size,
            nodes: vec![EMPTY_NODE],
            data: Vec::new(),
            dedup: HashMap::new(),
            database_type: "Test".to_string(),
            languages: Vec::new(),
            description: Vec::new(),
            build_epoch: 1_700_000_000,
        }
    }

    pub fn database_type(mut self, database_type: &str) -> Self {
        self.database_type = database_type.to_string();
        self
    }

    pub fn languages(mut self, languages: &[&str]) -> Self {
        self.languages = languages.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn description(mut self, language: &str, text: &str) -> Self {
        self.description.push((language.to_string(), text.to_string()));
        self
    }

    pub fn build_epoch(mut self, epoch: u64) -> Self {
        self.build_epoch = epoch;
        self
    }

    /// Append a value without deduplication, returning its offset
    pub fn add_value(&mut self, value: &Wire) -> u32 {
        let offset = self.data.len() as u32;
        encode(value, &mut self.data);
        offset
    }

    /// Append raw bytes to the data section, returning their offset
    pub fn add_raw(&mut self, bytes: &[u8]) -> u32 {
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(bytes);
        offset
    }

    /// Write `value` once and point `network` at it
    pub fn insert(&mut self, network: &str, value: &Wire) -> u32 {
        let encoded = encode_to_vec(value);
        let offset = match self.dedup.get(&encoded) {
            Some(&offset) => offset,
            None => {
                let offset = self.add_raw(&encoded);
                self.dedup.insert(encoded, offset);
                offset
            }
        };
        self.insert_offset(network, offset);
        offset
    }

    /// Point `network` at a data offset
    pub fn insert_offset(&mut self, network: &str, offset: u32) {
        let (bits, len) = self.network_bits(network);
        self.insert_edge(bits, len, Edge::Data(offset, len));
    }

    /// Write an arbitrary record value for `network`
    pub fn insert_raw_record(&mut self, network: &str, record: u32) {
        let (bits, len) = self.network_bits(network);
        self.insert_edge(bits, len, Edge::Raw(record));
    }

    /// Point `::ffff:0:0/96`, `2001::/32` and `2002::/16` at the IPv4
    /// subtree, the way GeoIP2 databases do
    pub fn alias_ipv4(&mut self) {
        assert_eq!(self.ip_version, 6, "aliases need an IPv6 tree");
        let mut node = 0u32;
        for _ in 0..96 {
            match self.nodes[node as usize].left {
                Edge::Node(child) => node = child,
                _ => return,
            }
        }

        for (prefix, len) in [("::ffff:0:0", 96), ("2001::", 32), ("2002::", 16)] {
            let bits = u128::from(prefix.parse::<std::net::Ipv6Addr>().unwrap());
            self.insert_edge(bits, len, Edge::Node(node));
        }
    }

    fn network_bits(&self, network: &str) -> (u128, usize) {
        let (addr, len) = network.split_once('/').expect("network needs a prefix length");
        let addr: IpAddr = addr.parse().expect("bad network address");
        let len: usize = len.parse().expect("bad prefix length");

        match (addr, self.ip_version) {
            (IpAddr::V4(v4), 4) => ((u32::from(v4) as u128) << 96, len),
            (IpAddr::V4(v4), _) => (u32::from(v4) as u128, 96 + len),
            (IpAddr::V6(v6), 6) => (u128::from(v6), len),
            (IpAddr::V6(_), _) => panic!("IPv6 network in an IPv4 tree"),
        }
    }

    fn allocate(&mut self) -> u32 {
        self.nodes.push(EMPTY_NODE);
        (self.nodes.len() - 1) as u32
    }

    fn edge_mut(&mut self, node: u32, bit: u8) -> &mut Edge {
        let node = &mut self.nodes[node as usize];
        if bit == 0 {
            &mut node.left
        } else {
            &mut node.right
        }
    }

    fn insert_edge(&mut self, bits: u128, len: usize, edge: Edge) {
        assert!(len > 0 && len <= 128, "prefix length {} out of range", len);
        let mut node = 0u32;

        for depth in 0..len {
            let bit = ((bits >> (127 - depth)) & 1) as u8;
            let current = *self.edge_mut(node, bit);

            if depth + 1 == len {
                match (current, edge) {
                    // More specific networks already live below
                    (Edge::Node(child), Edge::Data(..)) => self.backfill(child, edge),
                    _ => *self.edge_mut(node, bit) = edge,
                }
                return;
            }

            node = match current {
                Edge::Node(child) => child,
                Edge::Empty => {
                    let child = self.allocate();
                    *self.edge_mut(node, bit) = Edge::Node(child);
                    child
                }
                // Split a shorter network so both halves keep its record
                Edge::Data(..) | Edge::Raw(_) => {
                    let child = self.allocate();
                    self.nodes[child as usize] = Node {
                        left: current,
                        right: current,
                    };
                    *self.edge_mut(node, bit) = Edge::Node(child);
                    child
                }
            };
        }
    }

    fn backfill(&mut self, node: u32, edge: Edge) {
        let Edge::Data(_, len) = edge else { return };
        for bit in [0u8, 1] {
            match *self.edge_mut(node, bit) {
                Edge::Empty => *self.edge_mut(node, bit) = edge,
                Edge::Data(_, existing) if existing < len => *self.edge_mut(node, bit) = edge,
                Edge::Node(child) => self.backfill(child, edge),
                _ => {}
            }
        }
    }

    fn record_value(&self, edge: Edge) -> u32 {
        let node_count = self.nodes.len() as u32;
        match edge {
            Edge::Node(id) => id,
            Edge::Data(offset, _) => node_count + 16 + offset,
            Edge::Raw(value) => value,
            Edge::Empty => node_count,
        }
    }

    pub fn node_count(&self) -> u32 {
        self.nodes.len() as u32
    }

    fn write_tree(&self) -> Vec<u8> {
        let mut tree = Vec::new();
        for node in &self.nodes {
            let left = self.record_value(node.left);
            let right = self.record_value(node.right);
            match self.record_size {
                24 => {
                    tree.extend_from_slice(&left.to_be_bytes()[1..]);
                    tree.extend_from_slice(&right.to_be_bytes()[1..]);
                }
                28 => {
                    tree.extend_from_slice(&left.to_be_bytes()[1..]);
                    tree.push((((left >> 24) & 0x0F) << 4) as u8 | ((right >> 24) & 0x0F) as u8);
                    tree.extend_from_slice(&right.to_be_bytes()[1..]);
                }
                32 => {
                    tree.extend_from_slice(&left.to_be_bytes());
                    tree.extend_from_slice(&right.to_be_bytes());
                }
                other => panic!("unsupported record size {}", other),
            }
        }
        tree
    }

    pub fn metadata(&self) -> Wire {
        Wire::map([
            ("binary_format_major_version", Wire::U16(2)),
            ("binary_format_minor_version", Wire::U16(0)),
            ("build_epoch", Wire::U64(self.build_epoch)),
            ("database_type", Wire::str(&self.database_type)),
            (
                "description",
                Wire::Map(
                    self.description
                        .iter()
                        .map(|(k, v)| (Wire::str(k), Wire::str(v)))
                        .collect(),
                ),
            ),
            ("ip_version", Wire::U16(self.ip_version)),
            (
                "languages",
                Wire::Array(self.languages.iter().map(|l| Wire::str(l)).collect()),
            ),
            ("node_count", Wire::U32(self.node_count())),
            ("record_size", Wire::U16(self.record_size)),
        ])
    }

    /// The complete database file
    pub fn build(&self) -> Vec<u8> {
        let mut out = self.write_tree();
        out.extend_from_slice(&[0u8; 16]);
        out.extend_from_slice(&self.data);
        out.extend_from_slice(METADATA_MARKER);
        encode(&self.metadata(), &mut out);
        out
    }
}

pub const IPV4_NETWORKS: [&str; 6] = [
    "1.1.1.1/32",
    "1.1.1.2/31",
    "1.1.1.4/30",
    "1.1.1.8/29",
    "1.1.1.16/28",
    "1.1.1.32/32",
];

pub const IPV6_NETWORKS: [&str; 5] = [
    "::1:ffff:ffff/128",
    "::2:0:0/122",
    "::2:0:40/124",
    "::2:0:50/125",
    "::2:0:58/127",
];

fn network_record(network: &str) -> Wire {
    let addr = network.split('/').next().unwrap();
    Wire::map([("ip", Wire::str(addr))])
}

/// IPv4 database with six networks, each holding `{"ip": <network address>}`
pub fn ipv4_database(record_size: u16) -> Vec<u8> {
    let mut writer = MmdbWriter::new(4, record_size)
        .database_type("Test")
        .languages(&["en", "zh"])
        .description("en", "Test Database")
        .description("zh", "Test Database Chinese");
    for network in IPV4_NETWORKS {
        writer.insert(network, &network_record(network));
    }
    writer.build()
}

/// IPv6 database with five networks, each holding `{"ip": <network address>}`
pub fn ipv6_database(record_size: u16) -> Vec<u8> {
    let mut writer = MmdbWriter::new(6, record_size).database_type("Test");
    for network in IPV6_NETWORKS {
        writer.insert(network, &network_record(network));
    }
    writer.build()
}

/// IPv6 database holding both network lists, with the IPv4 subtree aliased
pub fn mixed_database(record_size: u16) -> Vec<u8> {
    let mut writer = MmdbWriter::new(6, record_size).database_type("Test");
    for network in IPV4_NETWORKS.iter().chain(IPV6_NETWORKS.iter()) {
        writer.insert(network, &network_record(network));
    }
    writer.alias_ipv4();
    writer.build()
}

/// IPv6 database whose only network is `::/64`, so there is no IPv4 subtree
pub fn no_ipv4_search_tree_database() -> Vec<u8> {
    let mut writer = MmdbWriter::new(6, 24).database_type("MaxMind DB No IPv4 Search Tree");
    writer.insert("::/64", &Wire::str("::0/64"));
    writer.build()
}

/// The record stored in [`decoder_database`]
pub fn decoder_record() -> Wire {
    Wire::map([
        (
            "array",
            Wire::Array(vec![Wire::U32(1), Wire::U32(2), Wire::U32(3)]),
        ),
        ("boolean", Wire::Bool(true)),
        ("bytes", Wire::Bytes(vec![0x00, 0x00, 0x00, 0x2a])),
        ("double", Wire::Double(42.123456)),
        ("float", Wire::Float(1.1)),
        ("int32", Wire::I32(-268_435_456)),
        (
            "map",
            Wire::map([(
                "mapX",
                Wire::map([
                    (
                        "arrayX",
                        Wire::Array(vec![Wire::U32(7), Wire::U32(8), Wire::U32(9)]),
                    ),
                    ("utf8_stringX", Wire::str("hello")),
                ]),
            )]),
        ),
        ("uint128", Wire::U128(1u128 << 120)),
        ("uint16", Wire::U16(100)),
        ("uint32", Wire::U32(268_435_456)),
        ("uint64", Wire::U64(1u64 << 60)),
        ("utf8_string", Wire::str("unicode! ☯ - ♫")),
    ])
}

/// The record stored for `::0.0.0.0/120` in [`decoder_database`]: every type at
/// its zero value
pub fn zero_record() -> Wire {
    Wire::map([
        ("array", Wire::Array(vec![])),
        ("boolean", Wire::Bool(false)),
        ("bytes", Wire::Bytes(vec![])),
        ("double", Wire::Double(0.0)),
        ("float", Wire::Float(0.0)),
        ("int32", Wire::I32(0)),
        ("map", Wire::Map(vec![])),
        ("uint128", Wire::U128(0)),
        ("uint16", Wire::U16(0)),
        ("uint32", Wire::U32(0)),
        ("uint64", Wire::U64(0)),
        ("utf8_string", Wire::str("")),
    ])
}

/// IPv6 database with every data type at `::1.1.1.0/120` and zero values
/// at `::0.0.0.0/120`
pub fn decoder_database() -> Vec<u8> {
    let mut writer = MmdbWriter::new(6, 24).database_type("MaxMind DB Decoder Test");
    writer.insert("1.1.1.0/24", &decoder_record());
    writer.insert("0.0.0.0/24", &zero_record());
    writer.build()
}

/// Seeded random IPv4 networks for benches: (network, prefix length)
pub fn random_ipv4_networks(seed: u64, count: usize) -> Vec<(Ipv4Addr, u8)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let len: u8 = rng.random_range(8..=32);
            let addr = rng.random::<u32>() & (u32::MAX << (32 - len as u32));
            (Ipv4Addr::from(addr), len)
        })
        .collect()
}
