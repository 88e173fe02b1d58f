//! Stream fuzz target: feed arbitrary bytes to the record stream decoder.
//! Decoding must never panic and must always make progress.
//! Build with: cargo fuzz run stream_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let cfg = tagdump::DecoderConfig::default().with_checksums(true).with_level(9);
    let mut decoder = tagdump::StreamDecoder::new(cfg);
    let mut offset = 0;
    while offset < data.len() {
        let (_, consumed) = decoder.decode_next_record(&data[offset..], offset);
        assert!(consumed > 0);
        offset += consumed;
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run stream_fuzz");
}
