#![no_main]
use libfuzzer_sys::fuzz_target;
use mmdb_reader::{DataValue, Decoder, PathElement};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Deserialize)]
#[allow(dead_code)]
struct Record<'a> {
    name: Option<&'a str>,
    values: Option<Vec<u64>>,
    nested: Option<HashMap<&'a str, DataValue>>,
    flag: Option<bool>,
}

// Raw data-section input: every decoding path must return an error rather
// than panic or loop
fuzz_target!(|data: &[u8]| {
    let decoder = Decoder::new(data);

    let mut offset = 0;
    while offset < decoder.len() {
        let _ = decoder.decode_value(offset);
        let _ = decoder.decode::<Record>(offset);
        let _ = decoder.locate(offset, &[PathElement::Key("nested"), PathElement::Index(-1)]);
        match decoder.skip(offset) {
            Ok(next) if next > offset => offset = next,
            _ => break,
        }
    }
});
