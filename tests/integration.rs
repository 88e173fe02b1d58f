//! Integration tests: schema engine, codecs, registries and display helpers.

use tagdump::codec::CodecError;
use tagdump::dt::{self, RtcTime, DT_HDR, IMAGE_INFO, OWCB};
use tagdump::dump::{fields_to_dump, render, rtctime_str};
use tagdump::registry::{dt_records, sirf_mids};
use tagdump::schema::{Format, Variable};
use tagdump::sirf::{self, GEO, SIRF_HDR};
use tagdump::{lookup_message_name, lookup_type_name, Value};

fn pattern(n: usize) -> Vec<u8> {
    (0..n).map(|i| (i * 7 + 3) as u8).collect()
}

#[test]
fn test_dual_string_examples() {
    let (v, n) = Variable::DualString.decode(&[3, 2, b'A', b'B', b'C', b'X', b'Y']).expect("decode");
    assert_eq!(v, Value::Pair("ABC".to_string(), "XY".to_string()));
    assert_eq!(n, 7);
    let (v, n) = Variable::DualString.decode(&[0, 0]).expect("decode");
    assert_eq!(v, Value::Pair(String::new(), String::new()));
    assert_eq!(n, 2);
}

#[test]
fn test_timestamp_conversion() {
    let rt = RtcTime { sub_sec: 16384, sec: 30, min: 2, ..Default::default() };
    assert_eq!(rt.basic(), (150, 500000));
    assert_eq!(rtctime_str(&rt), "150.500000");
    let rt = RtcTime { sub_sec: 3, sec: 0, min: 0, ..Default::default() };
    assert_eq!(rtctime_str(&rt), "0.000091");
}

#[test]
fn test_fixed_schemas_round_trip() {
    for schema in [&OWCB, &IMAGE_INFO, &GEO, &DT_HDR] {
        let size = schema.fixed_size().expect("fixed size");
        let bytes = pattern(size);
        let (fields, consumed) = schema.decode(&bytes).expect("decode");
        assert_eq!(consumed, size, "{}", schema.name);
        let encoded = schema.encode(&fields).expect("encode");
        assert_eq!(encoded, bytes, "{}", schema.name);
        let (again, _) = schema.decode(&encoded).expect("re-decode");
        assert_eq!(again, fields, "{}", schema.name);
    }
}

#[test]
fn test_schema_decodes_in_wire_order_and_byte_order() {
    let (f, n) = SIRF_HDR.decode(&[0xa0, 0xa2, 0x00, 0x5b, 0x29, 0xff]).expect("decode");
    assert_eq!(n, 5);
    assert_eq!(f.names(), vec!["start", "len", "mid"]);
    assert_eq!(f.u64("start"), Some(0xa0a2));
    assert_eq!(f.u64("len"), Some(91));
    assert_eq!(f.u64("mid"), Some(41));

    let (h, _) = DT_HDR.decode(&pattern(20)).expect("decode");
    assert_eq!(h.u64("len"), Some(u16::from_le_bytes([3, 10]) as u64));
    assert_eq!(h.names(), vec!["len", "type", "recnum", "rt", "recsum"]);
}

#[test]
fn test_schema_is_reusable_across_decodes() {
    let a = pattern(84);
    let b: Vec<u8> = a.iter().map(|x| x.wrapping_add(1)).collect();
    let (fa, _) = OWCB.decode(&a).expect("decode a");
    let (fb, _) = OWCB.decode(&b).expect("decode b");
    assert_ne!(fa, fb);
    let (fa2, _) = OWCB.decode(&a).expect("decode a again");
    assert_eq!(fa, fa2);
}

#[test]
fn test_short_buffer_fails_whole_structure() {
    let err = OWCB.decode(&pattern(60)).expect_err("too short");
    assert!(err.is_short_buffer());
    match err {
        CodecError::Member { schema, field, .. } => {
            assert_eq!(schema, "owcb");
            assert_eq!(field, "ow_req");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_registry_lookup_idempotent() {
    let a = dt_records().lookup(dt::DT_EVENT);
    let b = dt_records().lookup(dt::DT_EVENT);
    assert_eq!(a.name, b.name);
    assert_eq!(a.required_len, 40);
    assert_eq!(a.required_len, b.required_len);
    assert!(std::ptr::eq(a.schema.expect("schema"), b.schema.expect("schema")));
}

#[test]
fn test_unknown_codes_get_sentinel() {
    let e = dt_records().lookup(99);
    assert_eq!((e.required_len, e.name), (0, "unk"));
    assert!(e.decoder.is_none() && e.schema.is_none());
    assert_eq!(lookup_type_name(0xffff), "unk");
    assert_eq!(lookup_message_name(200), "unk");
}

#[test]
fn test_registered_tables() {
    assert_eq!(
        dt_records().codes(),
        vec![1, 2, 3, 4, 5, 16, 17, 18, 19, 20, 21, 22, 23, 24, 32]
    );
    assert_eq!(lookup_type_name(dt::DT_GPS_RAW_SIRFBIN), "GPS_RAW");
    assert_eq!(dt_records().lookup(dt::DT_REBOOT).required_len, 120);
    assert_eq!(dt_records().lookup(dt::DT_VERSION).required_len, 208);
    assert_eq!(dt_records().lookup(dt::DT_SYNC).required_len, 28);
    assert_eq!(dt_records().lookup(dt::DT_NOTE).required_len, 0);

    for mid in [2u16, 4, 6, 13, 14, 15, 18, 19, 41, 56, 90, 128, 130, 149, 166, 214, 218, 225, 255] {
        let e = sirf_mids().lookup(mid);
        assert!(e.decoder.is_some() && e.schema.is_some(), "mid {}", mid);
    }
    assert!(sirf_mids().is_registered(132));
    assert!(sirf_mids().lookup(132).decoder.is_none());
    assert_eq!(lookup_message_name(4), "nav_track");
}

#[test]
fn test_display_is_separate_from_value() {
    let (f, _) = sirf::ALM_DATA.decode(&pattern(29)).expect("decode");
    let data = f.get("data").expect("data");
    assert_eq!(data.as_bytes().map(<[u8]>::len), Some(24));
    let dump = fields_to_dump(&sirf::ALM_DATA, &f, 0);
    assert!(dump.contains("alm_week_status: 0x0a11"), "{}", dump);
    assert!(dump.contains(&format!("data: {}", tagdump::dump::hexlify(data.as_bytes().unwrap_or(&[])))));
    assert_eq!(render(&Format::plain("{:>5}"), &Value::U16(42)), "   42");
}

#[test]
fn test_nested_dump_indents() {
    let (f, _) = DT_HDR.decode(&pattern(20)).expect("decode");
    let dump = fields_to_dump(&DT_HDR, &f, 0);
    assert!(dump.contains("\nrt:\n  sub_sec: "), "{}", dump);
}
