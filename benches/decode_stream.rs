//! Benchmark: decode a synthetic DT stream (events, GPS raw geo packets, notes),
//! clean and with periodic corruption that forces resync.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tagdump::dt::{encode_record, RtcTime, DT_EVENT, DT_GPS_RAW_SIRFBIN, DT_NOTE, DT_SYNC_MAJIK};
use tagdump::sirf::encode_packet;
use tagdump::{decode_stream, DecoderConfig};

fn build_stream(records: usize, corrupt_every: Option<usize>) -> Vec<u8> {
    let rt = RtcTime::default();
    let mut gps = vec![0u8; 8];
    gps.extend_from_slice(&encode_packet(41, &[0x11; 90]));
    let mut event = 35u16.to_le_bytes().to_vec();
    event.extend_from_slice(&[0u8; 18]);
    let mut out = Vec::new();
    for i in 0..records {
        let rec = match i % 3 {
            0 => encode_record(DT_EVENT, i as u32, &rt, &event),
            1 => encode_record(DT_GPS_RAW_SIRFBIN, i as u32, &rt, &gps),
            _ => encode_record(DT_NOTE, i as u32, &rt, b"benchmark note"),
        };
        out.extend(rec.expect("encode"));
        if let Some(n) = corrupt_every {
            if i % n == n - 1 {
                out.extend_from_slice(&[0xff; 7]);
                out.extend_from_slice(&DT_SYNC_MAJIK.to_le_bytes());
            }
        }
    }
    out
}

fn bench_decode(c: &mut Criterion) {
    let clean = build_stream(3000, None);
    let dirty = build_stream(3000, Some(50));
    let cfg = DecoderConfig::default();
    let checked = DecoderConfig::default().with_checksums(true);

    c.bench_function("decode_stream clean", |b| b.iter(|| decode_stream(black_box(&clean), cfg.clone())));
    c.bench_function("decode_stream clean + checksums", |b| {
        b.iter(|| decode_stream(black_box(&clean), checked.clone()))
    });
    c.bench_function("decode_stream with resync", |b| b.iter(|| decode_stream(black_box(&dirty), cfg.clone())));
}

criterion_group!(benches, bench_decode);
criterion_main!(benches);
