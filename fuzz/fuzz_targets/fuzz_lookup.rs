#![no_main]
use libfuzzer_sys::fuzz_target;
use mmdb_reader::{IpPrefix, NetworkOptions, Reader};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use serde::Deserialize;
use std::sync::OnceLock;

#[path = "../../tests/common/mod.rs"]
mod common;

#[derive(Deserialize)]
#[allow(dead_code)]
struct IpRecord {
    ip: String,
}

// One mixed database with IPv4 aliases, built on first use
fn reader() -> &'static Reader {
    static READER: OnceLock<Reader> = OnceLock::new();
    READER.get_or_init(|| {
        Reader::from_bytes(common::mixed_database(28)).expect("fixture database loads")
    })
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 17 {
        return;
    }
    let reader = reader();

    let mut v6 = [0u8; 16];
    v6.copy_from_slice(&data[..16]);
    let ip = if data[16] & 0x80 == 0 {
        IpAddr::V4(Ipv4Addr::new(v6[0], v6[1], v6[2], v6[3]))
    } else {
        IpAddr::V6(Ipv6Addr::from(v6))
    };

    let result = reader.lookup(ip);
    if let Some(prefix) = result.prefix() {
        assert!(prefix.contains(ip) || ip.is_ipv4() != prefix.is_ipv4());
    }

    // Enumerate under a fuzzed prefix of the same family
    let len = data[16] & 0x7f;
    if let Ok(prefix) = IpPrefix::new(ip, len) {
        for network in reader.networks_within(prefix, NetworkOptions::new()).take(64) {
            let _ = network.decode::<IpRecord>();
        }
    }
});

