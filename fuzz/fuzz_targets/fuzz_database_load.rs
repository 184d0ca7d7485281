#![no_main]
use libfuzzer_sys::fuzz_target;
use mmdb_reader::{DataValue, NetworkOptions, Reader};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

// Whole-file input: loading must reject or accept without panicking, and an
// accepted file must survive lookups, enumeration and a data scan
fuzz_target!(|data: &[u8]| {
    let Ok(reader) = Reader::from_bytes(data.to_vec()) else {
        return;
    };

    for ip in [
        IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
        IpAddr::V4(Ipv4Addr::new(255, 255, 255, 255)),
        IpAddr::V6(Ipv6Addr::LOCALHOST),
        IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1)),
    ] {
        let _ = reader.lookup(ip).decode::<DataValue>();
    }

    let options = NetworkOptions::new()
        .include_aliased_networks(true)
        .include_networks_without_data(true);
    for result in reader.networks(options).take(256) {
        let _ = result.decode::<DataValue>();
    }

    for record in reader.data().take(256) {
        if let Ok(record) = record {
            let _ = record.decode::<DataValue>();
        }
    }
});
