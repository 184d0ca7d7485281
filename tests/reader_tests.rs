//! Integration tests for opening databases and looking up addresses
//!
//! Databases are written in memory by the fixture writer in `common`, in
//! all three record sizes where the layout matters.

mod common;

use common::{MmdbWriter, Wire};
use mmdb_reader::{DataValue, MmdbError, Reader};
use serde::Deserialize;
use std::io::Write;
use std::net::IpAddr;
use std::sync::Arc;
use std::thread;
use tempfile::NamedTempFile;

const RECORD_SIZES: [u16; 3] = [24, 28, 32];

#[derive(Debug, Deserialize)]
struct IpRecord<'a> {
    ip: &'a str,
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn assert_lookup(reader: &Reader, addr: &str, record_ip: &str, prefix: &str) {
    let result = reader.lookup(ip(addr));
    assert!(result.err().is_none(), "{}: {:?}", addr, result.err());
    assert!(result.found(), "{} should be found", addr);
    let record: IpRecord = result.decode().unwrap().unwrap();
    assert_eq!(record.ip, record_ip, "record for {}", addr);
    assert_eq!(result.prefix().unwrap().to_string(), prefix, "prefix for {}", addr);
}

fn assert_not_found(reader: &Reader, addr: &str, prefix: &str) {
    let result = reader.lookup(ip(addr));
    assert!(result.err().is_none(), "{}: {:?}", addr, result.err());
    assert!(!result.found(), "{} should not be found", addr);
    assert_eq!(result.offset(), None);
    assert!(result.decode::<IpRecord>().unwrap().is_none());
    assert_eq!(result.prefix().unwrap().to_string(), prefix, "prefix for {}", addr);
}

#[test]
fn test_metadata() {
    for record_size in RECORD_SIZES {
        let reader = Reader::from_bytes(common::ipv4_database(record_size)).unwrap();
        let metadata = reader.metadata();

        assert_eq!(metadata.binary_format_major_version, 2);
        assert_eq!(metadata.binary_format_minor_version, 0);
        assert_eq!(metadata.build_epoch, 1_700_000_000);
        assert_eq!(metadata.database_type, "Test");
        assert_eq!(metadata.ip_version, 4);
        assert_eq!(metadata.record_size, record_size);
        assert_eq!(metadata.languages, vec!["en", "zh"]);
        assert_eq!(metadata.description_for("en"), Some("Test Database"));
        assert_eq!(metadata.description_for("zh"), Some("Test Database Chinese"));
        assert!(metadata.node_count > 0);
    }
}

#[test]
fn test_ipv4_lookups() {
    for record_size in RECORD_SIZES {
        let reader = Reader::from_bytes(common::ipv4_database(record_size)).unwrap();

        assert_lookup(&reader, "1.1.1.1", "1.1.1.1", "1.1.1.1/32");
        assert_lookup(&reader, "1.1.1.2", "1.1.1.2", "1.1.1.2/31");
        assert_lookup(&reader, "1.1.1.3", "1.1.1.2", "1.1.1.2/31");
        assert_lookup(&reader, "1.1.1.7", "1.1.1.4", "1.1.1.4/30");
        assert_lookup(&reader, "1.1.1.9", "1.1.1.8", "1.1.1.8/29");
        assert_lookup(&reader, "1.1.1.15", "1.1.1.8", "1.1.1.8/29");
        assert_lookup(&reader, "1.1.1.17", "1.1.1.16", "1.1.1.16/28");
        assert_lookup(&reader, "1.1.1.31", "1.1.1.16", "1.1.1.16/28");
        assert_lookup(&reader, "1.1.1.32", "1.1.1.32", "1.1.1.32/32");

        assert_not_found(&reader, "1.1.1.33", "1.1.1.33/32");
        assert_not_found(&reader, "255.254.253.123", "128.0.0.0/1");
    }
}

#[test]
fn test_ipv6_lookups() {
    for record_size in RECORD_SIZES {
        let reader = Reader::from_bytes(common::ipv6_database(record_size)).unwrap();

        assert_lookup(&reader, "::1:ffff:ffff", "::1:ffff:ffff", "::1:ffff:ffff/128");
        assert_lookup(&reader, "::2:0:0", "::2:0:0", "::2:0:0/122");
        assert_lookup(&reader, "::2:0:1", "::2:0:0", "::2:0:0/122");
        assert_lookup(&reader, "::2:0:33", "::2:0:0", "::2:0:0/122");
        assert_lookup(&reader, "::2:0:40", "::2:0:40", "::2:0:40/124");
        assert_lookup(&reader, "::2:0:41", "::2:0:40", "::2:0:40/124");
        assert_lookup(&reader, "::2:0:50", "::2:0:50", "::2:0:50/125");
        assert_lookup(&reader, "::2:0:52", "::2:0:50", "::2:0:50/125");
        assert_lookup(&reader, "::2:0:58", "::2:0:58", "::2:0:58/127");
        assert_lookup(&reader, "::2:0:59", "::2:0:58", "::2:0:58/127");

        assert_not_found(&reader, "::2:0:5a", "::2:0:5a/127");
        assert_not_found(&reader, "8000::", "8000::/1");
    }
}

#[test]
fn test_mixed_database_lookups() {
    for record_size in RECORD_SIZES {
        let reader = Reader::from_bytes(common::mixed_database(record_size)).unwrap();
        assert_eq!(reader.metadata().ip_version, 6);

        // IPv4 addresses are reported as IPv4 networks
        assert_lookup(&reader, "1.1.1.1", "1.1.1.1", "1.1.1.1/32");
        assert_lookup(&reader, "1.1.1.3", "1.1.1.2", "1.1.1.2/31");
        assert_lookup(&reader, "::1:ffff:ffff", "::1:ffff:ffff", "::1:ffff:ffff/128");
        assert_lookup(&reader, "::2:0:59", "::2:0:58", "::2:0:58/127");

        // Aliases of the IPv4 subtree
        assert_lookup(&reader, "::ffff:1.1.1.1", "1.1.1.1", "::ffff:1.1.1.1/128");
        assert_lookup(&reader, "::ffff:1.1.1.3", "1.1.1.2", "::ffff:1.1.1.2/127");
        assert_lookup(&reader, "2001:0:101:101::", "1.1.1.1", "2001:0:101:101::/64");
        assert_lookup(&reader, "2002:101:103::", "1.1.1.2", "2002:101:102::/47");

        assert_not_found(&reader, "1.1.1.33", "1.1.1.33/32");
    }
}

#[test]
fn test_ipv6_address_in_ipv4_database() {
    let reader = Reader::from_bytes(common::ipv4_database(24)).unwrap();
    let result = reader.lookup(ip("2001::"));

    let err = result.err().unwrap();
    assert!(matches!(err, MmdbError::IpVersionMismatch(_)));
    assert_eq!(
        err.to_string(),
        "error looking up '2001::': you attempted to look up an IPv6 address in an IPv4-only database"
    );
    assert!(!result.found());
    assert_eq!(result.decode::<DataValue>().unwrap_err(), *err);
}

#[test]
fn test_ipv4_lookup_without_ipv4_subtree() {
    let reader = Reader::from_bytes(common::no_ipv4_search_tree_database()).unwrap();

    for addr in ["1.1.1.1", "192.1.1.1", "200.0.2.1"] {
        let result = reader.lookup(ip(addr));
        assert_eq!(result.decode::<&str>().unwrap(), Some("::0/64"));
        assert_eq!(result.prefix().unwrap().to_string(), "::/64");
    }
}

#[test]
fn test_shared_records_share_offsets() {
    let mut writer = MmdbWriter::new(4, 24);
    let record = Wire::map([("country", Wire::str("NZ"))]);
    writer.insert("10.0.0.0/8", &record);
    writer.insert("192.168.0.0/16", &record);
    writer.insert("172.16.0.0/12", &Wire::map([("country", Wire::str("AU"))]));
    let reader = Reader::from_bytes(writer.build()).unwrap();

    let a = reader.lookup(ip("10.1.2.3"));
    let b = reader.lookup(ip("192.168.7.7"));
    let c = reader.lookup(ip("172.16.0.1"));
    assert_eq!(a.offset(), b.offset());
    assert_ne!(a.offset(), c.offset());

    // Offsets round-trip through lookup_offset
    let offset = a.offset().unwrap();
    let by_offset = reader.lookup_offset(offset);
    assert!(by_offset.prefix().is_none());
    let value: DataValue = by_offset.decode().unwrap().unwrap();
    assert_eq!(value.get("country").and_then(DataValue::as_str), Some("NZ"));
}

#[test]
fn test_record_behind_pointer() {
    let mut writer = MmdbWriter::new(4, 24);
    let name = writer.add_value(&Wire::str("shared name"));
    writer.insert(
        "1.0.0.0/8",
        &Wire::map([("name", Wire::Pointer(name)), ("n", Wire::U32(7))]),
    );
    let reader = Reader::from_bytes(writer.build()).unwrap();

    #[derive(Deserialize)]
    struct Record<'a> {
        name: &'a str,
        n: u32,
    }
    let record: Record = reader.lookup(ip("1.2.3.4")).decode().unwrap().unwrap();
    assert_eq!(record.name, "shared name");
    assert_eq!(record.n, 7);
}

#[test]
fn test_open_file() {
    let mut temp = NamedTempFile::new().unwrap();
    temp.write_all(&common::ipv4_database(28)).unwrap();
    temp.flush().unwrap();

    let reader = Reader::open(temp.path()).unwrap();
    assert_eq!(reader.path(), Some(temp.path()));
    assert_lookup(&reader, "1.1.1.3", "1.1.1.2", "1.1.1.2/31");
}

#[test]
fn test_open_empty_file() {
    let temp = NamedTempFile::new().unwrap();
    let err = Reader::open(temp.path()).unwrap_err();
    assert_eq!(err.to_string(), "file is empty");
}

#[test]
fn test_open_missing_file() {
    let err = Reader::open("/nonexistent/GeoIP2-City.mmdb").unwrap_err();
    assert!(matches!(err, MmdbError::Io(_)), "{:?}", err);
}

#[test]
fn test_invalid_databases() {
    let err = Reader::from_bytes(vec![0u8; 64]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "error opening database: invalid MaxMind DB file"
    );

    // Metadata claims a tree bigger than the file
    let mut data = Vec::new();
    data.extend_from_slice(common::METADATA_MARKER);
    common::encode(
        &Wire::map([
            ("binary_format_major_version", Wire::U16(2)),
            ("ip_version", Wire::U16(6)),
            ("node_count", Wire::U32(1000)),
            ("record_size", Wire::U16(24)),
        ]),
        &mut data,
    );
    let err = Reader::from_bytes(data).unwrap_err();
    assert_eq!(err.to_string(), "the MaxMind DB contains invalid metadata");

    // Metadata that is not a map
    let mut data = vec![0u8; 32];
    data.extend_from_slice(common::METADATA_MARKER);
    common::encode(&Wire::str("metadata"), &mut data);
    assert!(Reader::from_bytes(data).is_err());
}

#[test]
fn test_last_metadata_marker_wins() {
    let mut writer = MmdbWriter::new(4, 24);
    // A record that itself contains the marker bytes
    writer.insert(
        "1.0.0.0/8",
        &Wire::Bytes(common::METADATA_MARKER.to_vec()),
    );
    let reader = Reader::from_bytes(writer.build()).unwrap();

    let bytes: Vec<u8> = reader.lookup(ip("1.1.1.1")).decode().unwrap().unwrap();
    assert_eq!(bytes, common::METADATA_MARKER);
}

#[test]
fn test_corrupt_data_pointer() {
    let mut writer = MmdbWriter::new(4, 24);
    writer.insert("2.0.0.0/8", &Wire::str("fine"));
    writer.insert_raw_record("1.0.0.0/8", 0x00FF_FFFF);
    let reader = Reader::from_bytes(writer.build()).unwrap();

    let result = reader.lookup(ip("1.1.1.1"));
    let err = result.err().unwrap();
    assert_eq!(err.to_string(), "the MaxMind DB file's search tree is corrupt");
    assert!(result.decode::<&str>().is_err());

    assert_eq!(reader.lookup(ip("2.2.2.2")).decode::<&str>().unwrap(), Some("fine"));
}

#[test]
fn test_search_tree_cycle() {
    let mut writer = MmdbWriter::new(4, 24);
    // 1.0.0.0/8 leads back to the root
    writer.insert_raw_record("1.0.0.0/8", 0);
    let reader = Reader::from_bytes(writer.build()).unwrap();

    let result = reader.lookup(ip("1.1.1.1"));
    let err = result.err().cloned().unwrap();
    assert_eq!(err.to_string(), "invalid node in search tree");
    // The walk ran the full 32 bits before giving up
    assert_eq!(result.prefix().unwrap().to_string(), "1.1.1.1/32");
}

#[test]
fn test_close() {
    let mut reader = Reader::from_bytes(common::ipv4_database(24)).unwrap();
    let offset = reader.lookup(ip("1.1.1.1")).offset().unwrap();

    reader.close().unwrap();
    reader.close().unwrap();
    assert!(reader.is_closed());

    let result = reader.lookup(ip("1.1.1.1"));
    assert_eq!(
        result.err().unwrap().to_string(),
        "cannot call Lookup on a closed database"
    );
    assert_eq!(
        result.decode::<DataValue>().unwrap_err().to_string(),
        "cannot call Lookup on a closed database"
    );
    assert_eq!(
        reader
            .lookup_offset(offset)
            .decode::<DataValue>()
            .unwrap_err()
            .to_string(),
        "cannot call Decode on a closed database"
    );
}

#[test]
fn test_concurrent_lookups() {
    let reader = Arc::new(Reader::from_bytes(common::mixed_database(28)).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let reader = Arc::clone(&reader);
            thread::spawn(move || {
                for n in 0..1000u32 {
                    let addr = IpAddr::from([1, 1, 1, ((n + i) % 32) as u8 + 1]);
                    let result = reader.lookup(addr);
                    assert!(result.found(), "{} should be found", addr);
                    let record: IpRecord = result.decode().unwrap().unwrap();
                    assert!(record.ip.starts_with("1.1.1."));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}
