//! DT records: the device's native (little-endian) event-log layer.
//!
//! Every record starts with the 20-byte [`DT_HDR`]. Body schemas here describe the
//! bytes *after* the header; the stream decoder strips the header and adds its size
//! back to whatever a body decoder consumed.

use crate::codec::CodecError;
use crate::registry::{sirf_mids, Decode, DecodeCtx, Registry};
use crate::schema::Scalar::{Bytes, U16, U32, U8};
use crate::schema::{le, nested, var, Schema, Variable};
use crate::sirf::{self, SirfMessage, SIRF_HDR, SIRF_HDR_SIZE, SIRF_SOP_SEQ};
use crate::stream::SoftFault;
use crate::value::{Fields, Value};

pub const DT_HDR_SIZE: usize = 20;
/// Sync marker, little-endian on the wire (`ef 00 df de`).
pub const DT_SYNC_MAJIK: u32 = 0xdedf_00ef;
pub const DT_SYNC_MAJIK_BYTES: [u8; 4] = DT_SYNC_MAJIK.to_le_bytes();

pub const DT_REBOOT: u16 = 1;
pub const DT_VERSION: u16 = 2;
pub const DT_SYNC: u16 = 3;
pub const DT_EVENT: u16 = 4;
pub const DT_DEBUG: u16 = 5;
pub const DT_GPS_VERSION: u16 = 16;
pub const DT_GPS_TIME: u16 = 17;
pub const DT_GPS_GEO: u16 = 18;
pub const DT_GPS_XYZ: u16 = 19;
pub const DT_SENSOR_DATA: u16 = 20;
pub const DT_SENSOR_SET: u16 = 21;
pub const DT_TEST: u16 = 22;
pub const DT_NOTE: u16 = 23;
pub const DT_CONFIG: u16 = 24;
pub const DT_GPS_RAW_SIRFBIN: u16 = 32;
/// Highest defined record type.
pub const DT_MAX_TYPE: u16 = DT_GPS_RAW_SIRFBIN;

/// GPS mini-header that prefixes GPS version and GPS raw bodies.
pub const GPS_HDR_SIZE: usize = 8;

pub const EV_PANIC_WARN: u16 = 11;
pub const EV_GPS_CMD: u16 = 51;

/// Offset of `recsum` within the header.
const RECSUM_OFFSET: usize = 18;

pub static RTCTIME: Schema = Schema {
    name: "rtctime",
    members: &[
        le("sub_sec", U16, "{}"),
        le("sec", U8, "{}"),
        le("min", U8, "{}"),
        le("hr", U8, "{}"),
        le("dow", U8, "{}"),
        le("day", U8, "{}"),
        le("mon", U8, "{}"),
        le("year", U16, "{}"),
    ],
};

pub static DT_HDR: Schema = Schema {
    name: "dt_hdr",
    members: &[
        le("len", U16, "{}"),
        le("type", U16, "{}"),
        le("recnum", U32, "{}"),
        nested("rt", &RTCTIME),
        le("recsum", U16, "0x{:04x}"),
    ],
};

/// Header-only records (debug, sensor, test, config, gps time/geo/xyz).
pub static DT_SIMPLE: Schema = Schema { name: "dt_simple", members: &[] };

pub static DT_REBOOT_BODY: Schema = Schema {
    name: "dt_reboot",
    members: &[
        le("prev_sync", U32, "{:08x}"),
        le("majik", U32, "{:08x}"),
        le("core_rev", U32, "{:08x}"),
        le("base", U32, "{:08x}"),
    ],
};

/// Overwatch control block, follows the reboot record's own fields.
pub static OWCB: Schema = Schema {
    name: "owcb",
    members: &[
        le("ow_sig", U32, "0x{:08x}"),
        le("rpt", U32, "0x{:08x}"),
        nested("boot_time", &RTCTIME),
        nested("prev_boot", &RTCTIME),
        le("reset_status", U32, "0x{:08x}"),
        le("reset_others", U32, "0x{:08x}"),
        le("from_base", U32, "0x{:08x}"),
        le("panic_count", U32, "{}"),
        le("fault_gold", U32, "0x{:08x}"),
        le("fault_nib", U32, "0x{:08x}"),
        le("subsys_disable", U32, "0x{:08x}"),
        le("ow_sig_b", U32, "0x{:08x}"),
        le("ow_req", U8, "{}"),
        le("reboot_reason", U8, "{}"),
        le("ow_boot_mode", U8, "{}"),
        le("owt_action", U8, "{}"),
        le("reboot_count", U32, "{}"),
        le("strange", U32, "{}"),
        le("strange_loc", U32, "0x{:04x}"),
        le("chk_fails", U32, "{}"),
        le("ow_sig_c", U32, "0x{:08x}"),
    ],
};

pub static DT_VERSION_BODY: Schema = Schema { name: "dt_version", members: &[le("base", U32, "{:08x}")] };

pub static HW_VERSION: Schema = Schema {
    name: "hw_version",
    members: &[le("rev", U8, "{:x}"), le("model", U8, "{:x}")],
};

pub static IMAGE_VERSION: Schema = Schema {
    name: "image_version",
    members: &[le("build", U16, "{:x}"), le("minor", U8, "{:x}"), le("major", U8, "{:x}")],
};

pub const IMG_DESC_MAX: usize = 44;
pub const STAMP_MAX: usize = 30;

pub static IMAGE_INFO: Schema = Schema {
    name: "image_info",
    members: &[
        le("ii_sig", U32, "0x{:08x}"),
        le("im_start", U32, "0x{:08x}"),
        le("im_len", U32, "0x{:08x}"),
        nested("ver_id", &IMAGE_VERSION),
        le("im_chk", U32, "0x{:08x}"),
        le("image_desc", Bytes(IMG_DESC_MAX), "{:s}"),
        le("repo0", Bytes(IMG_DESC_MAX), "{:s}"),
        le("repo1", Bytes(IMG_DESC_MAX), "{:s}"),
        le("stamp_date", Bytes(STAMP_MAX), "{:s}"),
        nested("hw_ver", &HW_VERSION),
    ],
};

pub static DT_SYNC_BODY: Schema = Schema {
    name: "dt_sync",
    members: &[le("prev_sync", U32, "{:x}"), le("majik", U32, "{:08x}")],
};

pub static DT_EVENT_BODY: Schema = Schema {
    name: "dt_event",
    members: &[
        le("event", U16, "{}"),
        le("pcode", U8, "{}"),
        le("w", U8, "{}"),
        le("arg0", U32, "0x{:04x}"),
        le("arg1", U32, "0x{:04x}"),
        le("arg2", U32, "0x{:04x}"),
        le("arg3", U32, "0x{:04x}"),
    ],
};

pub static GPS_HDR: Schema = Schema {
    name: "gps_hdr",
    members: &[
        le("mark", U32, "0x{:04x}"),
        le("chip", U8, "0x{:02x}"),
        le("dir", U8, "{}"),
        le("pad", U16, "{}"),
    ],
};

pub static DT_GPS_VER: Schema = Schema {
    name: "dt_gps_ver",
    members: &[nested("gps_hdr", &GPS_HDR), var("sirf_swver", Variable::DualString, "--<{}>--  --<{}>--")],
};

pub static DT_GPS_RAW: Schema = Schema {
    name: "dt_gps_raw",
    members: &[nested("gps_hdr", &GPS_HDR), nested("sirf_hdr", &SIRF_HDR)],
};

/// Note text: everything after the header.
pub static DT_NOTE_BODY: Schema = Schema {
    name: "dt_note",
    members: &[var("note", Variable::TrailerStripped(0), "{}")],
};

/// Header timestamp. `sub_sec` counts 1/32768ths of a second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RtcTime {
    pub sub_sec: u16,
    pub sec: u8,
    pub min: u8,
    pub hr: u8,
    pub dow: u8,
    pub day: u8,
    pub mon: u8,
    pub year: u16,
}

impl RtcTime {
    pub fn from_fields(f: &Fields) -> Option<Self> {
        Some(RtcTime {
            sub_sec: f.u64("sub_sec")? as u16,
            sec: f.u64("sec")? as u8,
            min: f.u64("min")? as u8,
            hr: f.u64("hr")? as u8,
            dow: f.u64("dow")? as u8,
            day: f.u64("day")? as u8,
            mon: f.u64("mon")? as u8,
            year: f.u64("year")? as u16,
        })
    }

    /// `(seconds, microseconds)` since the top of the hour, truncating.
    pub fn basic(&self) -> (u32, u32) {
        let secs = self.min as u32 * 60 + self.sec as u32;
        let micros = (self.sub_sec as u64 * 1_000_000 / 32768) as u32;
        (secs, micros)
    }
}

/// Typed view of [`DT_HDR`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtHeader {
    pub len: u16,
    pub rtype: u16,
    pub recnum: u32,
    pub rt: RtcTime,
    pub recsum: u16,
}

impl DtHeader {
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let (f, _) = DT_HDR.decode(buf)?;
        Self::from_fields(&f).ok_or(CodecError::MissingField("dt_hdr"))
    }

    pub fn from_fields(f: &Fields) -> Option<Self> {
        Some(DtHeader {
            len: f.u64("len")? as u16,
            rtype: f.u64("type")? as u16,
            recnum: f.u64("recnum")? as u32,
            rt: RtcTime::from_fields(f.sub("rt")?)?,
            recsum: f.u64("recsum")? as u16,
        })
    }
}

/// Wrapping 16-bit sum of every record byte except the stored `recsum`.
pub fn record_checksum(rec: &[u8]) -> u16 {
    rec.iter()
        .enumerate()
        .filter(|(i, _)| !(RECSUM_OFFSET..RECSUM_OFFSET + 2).contains(i))
        .fold(0u16, |acc, (_, &b)| acc.wrapping_add(b as u16))
}

pub fn decode_simple(_ctx: &mut DecodeCtx<'_>, schema: &'static Schema, buf: &[u8]) -> Result<Decode, CodecError> {
    let (fields, consumed) = schema.decode(buf)?;
    Ok(Decode::new(fields, consumed))
}

/// Reboot body, then the overwatch control block.
pub fn decode_reboot(_ctx: &mut DecodeCtx<'_>, schema: &'static Schema, buf: &[u8]) -> Result<Decode, CodecError> {
    let (mut fields, mut consumed) = schema.decode(buf)?;
    let (owcb, n) = OWCB.decode(&buf[consumed.min(buf.len())..])?;
    consumed += n;
    fields.insert("owcb", Value::Struct(owcb));
    Ok(Decode::new(fields, consumed))
}

/// Version body, then the image info block.
pub fn decode_version(_ctx: &mut DecodeCtx<'_>, schema: &'static Schema, buf: &[u8]) -> Result<Decode, CodecError> {
    let (mut fields, mut consumed) = schema.decode(buf)?;
    let (info, n) = IMAGE_INFO.decode(&buf[consumed.min(buf.len())..])?;
    consumed += n;
    fields.insert("image_info", Value::Struct(info));
    Ok(Decode::new(fields, consumed))
}

/// GPS mini-header plus SirfBin header, then dispatch on the message id.
///
/// A wrong start-of-packet leaves the inner payload alone: only the mini-header
/// counts as consumed and no message id is counted.
pub fn decode_gps_raw(ctx: &mut DecodeCtx<'_>, schema: &'static Schema, buf: &[u8]) -> Result<Decode, CodecError> {
    let (mut fields, consumed) = schema.decode(buf)?;
    let hdr = fields.sub("sirf_hdr").ok_or(CodecError::MissingField("sirf_hdr"))?;
    let start = hdr.u64("start").ok_or(CodecError::MissingField("start"))? as u16;
    let plen = hdr.u64("len").ok_or(CodecError::MissingField("len"))? as usize;
    let mid = hdr.u64("mid").ok_or(CodecError::MissingField("mid"))? as u8;

    if start != SIRF_SOP_SEQ {
        ctx.flag(SoftFault::FramingMismatch { start });
        fields.remove("sirf_hdr");
        return Ok(Decode::new(fields, consumed - SIRF_HDR_SIZE));
    }

    let rest = &buf[consumed..];
    // payload after the mid, plus checksum and terminator
    let body = match plen.checked_sub(1) {
        Some(n) => &rest[..(n + sirf::SIRF_END_SIZE).min(rest.len())],
        None => rest,
    };
    if ctx.verify_checksums {
        if let Some((stored, computed)) = sirf::check_payload(mid, plen, rest) {
            if stored != computed {
                ctx.flag(SoftFault::SirfChecksumMismatch { mid, stored, computed });
            }
        }
    }

    let mut out = Decode::new(fields, consumed);
    match sirf_mids().dispatch(mid as u16, ctx, body)? {
        Some(d) => {
            // framing is known from the sirf len, so a decoded packet includes its trailer
            out.consumed += d.consumed.max(body.len());
            let sid = if sirf::has_sid(mid) { body.first().copied() } else { None };
            out.inner = Some(SirfMessage {
                mid,
                sid,
                name: sirf_mids().name(mid as u16),
                fields: d.fields,
                consumed: d.consumed,
            });
        }
        None => ctx.flag(SoftFault::UnknownMessageId(mid)),
    }
    Ok(out)
}

pub fn event_name(event: u16) -> &'static str {
    match event {
        1 => "SURFACED",
        2 => "SUBMERGED",
        3 => "DOCKED",
        4 => "UNDOCKED",
        5 => "GPS_GEO",
        6 => "GPS_XYZ",
        7 => "GPS_TIME",
        8 => "SSW_DELAY_TIME",
        9 => "SSW_BLK_TIME",
        10 => "SSW_GRP_TIME",
        EV_PANIC_WARN => "PANIC_WARN",
        32 => "GPS_BOOT",
        33 => "GPS_BOOT_TIME",
        34 => "GPS_RECONFIG",
        35 => "GPS_TURN_ON",
        36 => "GPS_STANDBY",
        37 => "GPS_TURN_OFF",
        38 => "GPS_MPM",
        39 => "GPS_FULL_PWR",
        40 => "GPS_PULSE",
        41 => "GPS_FAST",
        42 => "GPS_FIRST",
        43 => "GPS_SATS_2",
        44 => "GPS_SATS_7",
        45 => "GPS_SATS_41",
        46 => "GPS_CYCLE_TIME",
        47 => "GPS_RX_ERR",
        48 => "GPS_AWAKE_S",
        49 => "GPS_BOOT_FAIL",
        50 => "GPS_HW_CONFIG",
        EV_GPS_CMD => "GPS_CMD",
        52 => "GPS_RAW_TX",
        53 => "GPS_SWVER_TO",
        54 => "GPS_CANNED",
        55 => "GPS_LOST_INT",
        _ => "unk",
    }
}

/// Name of a GPS command (first argument of a `GPS_CMD` event).
pub fn gps_cmd_name(cmd: u32) -> &'static str {
    match cmd {
        0 => "NOP",
        1 => "TURNON",
        2 => "TURNOFF",
        3 => "STANDBY",
        4 => "POWER_ON",
        5 => "POWER_OFF",
        6 => "CYCLE",
        16 => "AWAKE_STATUS",
        17 => "MPM",
        18 => "PULSE",
        19 => "RESET",
        20 => "RAW_TX",
        21 => "HIBERNATE",
        22 => "WAKE",
        0x80 => "CANNED",
        0xfd => "SLEEP",
        0xfe => "PANIC",
        0xff => "REBOOT",
        _ => "unk",
    }
}

/// Populate the outer registry. Required lengths include the header.
pub fn register_records(r: &mut Registry) {
    r.register(DT_REBOOT, 120, Some(decode_reboot), Some(&DT_REBOOT_BODY), "REBOOT");
    r.register(DT_VERSION, 208, Some(decode_version), Some(&DT_VERSION_BODY), "VERSION");
    r.register(DT_SYNC, 28, Some(decode_simple), Some(&DT_SYNC_BODY), "SYNC");
    r.register(DT_EVENT, 40, Some(decode_simple), Some(&DT_EVENT_BODY), "EVENT");
    r.register(DT_DEBUG, 0, Some(decode_simple), Some(&DT_SIMPLE), "DEBUG");
    r.register(DT_GPS_VERSION, 0, Some(decode_simple), Some(&DT_GPS_VER), "GPS_VERSION");
    r.register(DT_GPS_TIME, 0, Some(decode_simple), Some(&DT_SIMPLE), "GPS_TIME");
    r.register(DT_GPS_GEO, 0, Some(decode_simple), Some(&DT_SIMPLE), "GPS_GEO");
    r.register(DT_GPS_XYZ, 0, Some(decode_simple), Some(&DT_SIMPLE), "GPS_XYZ");
    r.register(DT_SENSOR_DATA, 0, Some(decode_simple), Some(&DT_SIMPLE), "SENSOR_DATA");
    r.register(DT_SENSOR_SET, 0, Some(decode_simple), Some(&DT_SIMPLE), "SENSOR_SET");
    r.register(DT_TEST, 0, Some(decode_simple), Some(&DT_SIMPLE), "TEST");
    r.register(DT_NOTE, 0, Some(decode_simple), Some(&DT_NOTE_BODY), "NOTE");
    r.register(DT_CONFIG, 0, Some(decode_simple), Some(&DT_SIMPLE), "CONFIG");
    r.register(DT_GPS_RAW_SIRFBIN, 0, Some(decode_gps_raw), Some(&DT_GPS_RAW), "GPS_RAW");
}

/// Build a header instance, for encoders and tests.
pub fn header_fields(len: u16, rtype: u16, recnum: u32, rt: &RtcTime, recsum: u16) -> Fields {
    let mut t = Fields::with_capacity(8);
    t.insert("sub_sec", Value::U16(rt.sub_sec));
    t.insert("sec", Value::U8(rt.sec));
    t.insert("min", Value::U8(rt.min));
    t.insert("hr", Value::U8(rt.hr));
    t.insert("dow", Value::U8(rt.dow));
    t.insert("day", Value::U8(rt.day));
    t.insert("mon", Value::U8(rt.mon));
    t.insert("year", Value::U16(rt.year));
    let mut h = Fields::with_capacity(5);
    h.insert("len", Value::U16(len));
    h.insert("type", Value::U16(rtype));
    h.insert("recnum", Value::U32(recnum));
    h.insert("rt", Value::Struct(t));
    h.insert("recsum", Value::U16(recsum));
    h
}

/// Frame `body` as a complete record with a correct `recsum`.
pub fn encode_record(rtype: u16, recnum: u32, rt: &RtcTime, body: &[u8]) -> Result<Vec<u8>, CodecError> {
    let len = DT_HDR_SIZE + body.len();
    let len = u16::try_from(len).map_err(|_| CodecError::TypeMismatch(format!("record too long: {}", len)))?;
    let mut rec = DT_HDR.encode(&header_fields(len, rtype, recnum, rt, 0))?;
    rec.extend_from_slice(body);
    let sum = record_checksum(&rec);
    rec[RECSUM_OFFSET..RECSUM_OFFSET + 2].copy_from_slice(&sum.to_le_bytes());
    Ok(rec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_sizes_match_required_lengths() {
        assert_eq!(DT_HDR.fixed_size(), Some(DT_HDR_SIZE));
        assert_eq!(OWCB.fixed_size(), Some(84));
        assert_eq!(DT_HDR_SIZE + DT_REBOOT_BODY.fixed_size().unwrap_or(0) + 84, 120);
        assert_eq!(IMAGE_INFO.fixed_size(), Some(184));
        assert_eq!(DT_HDR_SIZE + 4 + 184, 208);
        assert_eq!(DT_SYNC_BODY.fixed_size(), Some(8));
        assert_eq!(DT_EVENT_BODY.fixed_size(), Some(20));
        assert_eq!(GPS_HDR.fixed_size(), Some(GPS_HDR_SIZE));
        assert_eq!(DT_GPS_RAW.fixed_size(), Some(GPS_HDR_SIZE + SIRF_HDR_SIZE));
    }

    #[test]
    fn timestamp_truncates() {
        let rt = RtcTime { sub_sec: 16384, sec: 30, min: 2, ..Default::default() };
        assert_eq!(rt.basic(), (150, 500000));
        let rt = RtcTime { sub_sec: 1, ..Default::default() };
        assert_eq!(rt.basic(), (0, 30));
        let rt = RtcTime { sub_sec: 65535, sec: 59, min: 59, ..Default::default() };
        assert_eq!(rt.basic(), (3599, 1999969));
    }

    #[test]
    fn header_decodes_little_endian() {
        let rt = RtcTime { sub_sec: 0x0102, sec: 3, min: 4, hr: 5, dow: 6, day: 7, mon: 8, year: 2018 };
        let rec = encode_record(DT_EVENT, 0x0a0b0c0d, &rt, &[0u8; 20]).expect("encode");
        assert_eq!(&rec[..4], &[40, 0, 4, 0]);
        assert_eq!(&rec[4..8], &[0x0d, 0x0c, 0x0b, 0x0a]);
        let h = DtHeader::decode(&rec).expect("header");
        assert_eq!(h.len, 40);
        assert_eq!(h.rtype, DT_EVENT);
        assert_eq!(h.recnum, 0x0a0b0c0d);
        assert_eq!(h.rt, rt);
        assert_eq!(h.recsum, record_checksum(&rec));
    }

    #[test]
    fn checksum_skips_recsum_bytes() {
        let mut rec = vec![1u8; 24];
        rec[18] = 0xff;
        rec[19] = 0xff;
        assert_eq!(record_checksum(&rec), 22);
    }

    #[test]
    fn names() {
        assert_eq!(event_name(EV_GPS_CMD), "GPS_CMD");
        assert_eq!(event_name(1000), "unk");
        assert_eq!(gps_cmd_name(0xfe), "PANIC");
        assert_eq!(gps_cmd_name(7), "unk");
    }
}
