//! Look addresses up in a MaxMind DB file
//!
//! Prints the matched network and the record as JSON, plus the typed City
//! view when the database supports it.
//!
//! Usage:
//!   cargo run --example geoip_query -- <database.mmdb> [ip_address...]

use anyhow::{bail, Context, Result};
use mmdb_reader::{DataValue, Reader};
use std::env;
use std::net::IpAddr;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <database.mmdb> [ip_address...]", args[0]);
        eprintln!("\nExample:");
        eprintln!("  {} GeoLite2-City.mmdb 81.2.69.142", args[0]);
        std::process::exit(1);
    }

    let db_path = &args[1];
    let reader = Reader::open(db_path).with_context(|| format!("opening {}", db_path))?;

    let metadata = reader.metadata();
    println!("Database: {} ({})", metadata.database_type, db_path);
    println!(
        "IPv{} tree, {} nodes, {}-bit records, built {}",
        metadata.ip_version, metadata.node_count, metadata.record_size, metadata.build_epoch
    );
    if let Some(description) = metadata.description_for("en") {
        println!("{}", description);
    }
    println!();

    let ips: Vec<&str> = if args.len() >= 3 {
        args[2..].iter().map(String::as_str).collect()
    } else {
        println!("Demo mode - querying several IPs:\n");
        vec!["81.2.69.142", "1.1.1.1", "2001:4860:4860::8888", "127.0.0.1"]
    };

    for ip in ips {
        query_ip(&reader, ip)?;
        println!();
    }

    Ok(())
}

fn query_ip(reader: &Reader, ip: &str) -> Result<()> {
    let addr: IpAddr = match ip.parse() {
        Ok(addr) => addr,
        Err(_) => bail!("not an IP address: {}", ip),
    };
    println!("Querying IP: {}", addr);

    let result = reader.lookup(addr);
    if let Some(err) = result.err() {
        println!("  ! {}", err);
        return Ok(());
    }

    let prefix = result
        .prefix()
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".to_string());
    match result.decode::<DataValue>()? {
        Some(record) => {
            println!("  ✓ Found in {}", prefix);
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        None => {
            println!("  ✗ Not found (network {})", prefix);
            return Ok(());
        }
    }

    if let Ok(city) = reader.city(addr) {
        let name = city.city.names.get("en").map(String::as_str).unwrap_or("?");
        println!(
            "  City: {}, {} ({}, {})",
            name, city.country.iso_code, city.location.latitude, city.location.longitude
        );
    }

    Ok(())
}
