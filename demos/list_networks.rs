//! Enumerate the networks of a MaxMind DB file
//!
//! Usage:
//!   cargo run --example list_networks -- <database.mmdb> [network] [--aliases] [--empty]

use anyhow::{Context, Result};
use mmdb_reader::{IpPrefix, NetworkOptions, Reader};
use std::env;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();

    let Some(db_path) = args.first() else {
        eprintln!("Usage: list_networks <database.mmdb> [network] [--aliases] [--empty]");
        std::process::exit(1);
    };

    let mut options = NetworkOptions::new();
    let mut within: Option<IpPrefix> = None;
    for arg in &args[1..] {
        match arg.as_str() {
            "--aliases" => options = options.include_aliased_networks(true),
            "--empty" => options = options.include_networks_without_data(true),
            network => {
                within = Some(
                    network
                        .parse()
                        .with_context(|| format!("bad network {}", network))?,
                )
            }
        }
    }

    let reader = Reader::open(db_path).with_context(|| format!("opening {}", db_path))?;
    let networks = match within {
        Some(prefix) => reader.networks_within(prefix, options),
        None => reader.networks(options),
    };

    let mut count = 0usize;
    let mut errors = 0usize;
    for result in networks {
        if let Some(err) = result.err() {
            eprintln!("error: {}", err);
            errors += 1;
            continue;
        }
        let prefix = result.prefix().map(|p| p.to_string()).unwrap_or_default();
        match result.offset() {
            Some(offset) => println!("{}\toffset {}", prefix, offset),
            None => println!("{}\t(no data)", prefix),
        }
        count += 1;
    }

    eprintln!("{} networks, {} errors", count, errors);
    Ok(())
}
