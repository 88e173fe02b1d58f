//! SirfBin: the GPS receiver's big-endian binary protocol, carried inside
//! `GPS_RAW` records.
//!
//! Packet layout: `a0 a2 | len (BE u16) | mid | payload | chksum (BE u16) | b0 b3`.
//! `len` counts the mid and the payload. The checksum is the 15-bit sum of those
//! `len` bytes.

use crate::codec::CodecError;
use crate::registry::{Decode, DecodeCtx, Registry};
use crate::schema::Scalar::{I16, I32, U16, U32, U8};
use crate::schema::{be, hexbytes, var, Schema, Variable};
use crate::value::{Fields, Value};

pub const SIRF_SOP_SEQ: u16 = 0xa0a2;
pub const SIRF_EOP_SEQ: u16 = 0xb0b3;
/// Checksum plus terminator.
pub const SIRF_END_SIZE: usize = 4;
pub const SIRF_HDR_SIZE: usize = 5;

/// Message ids whose first payload byte is a sub-id.
pub const MIDS_W_SIDS: &[u8] = &[
    19, 48, 51, 56, 63, 64, 65, 68, 69, 70, 72, 73, 74, 75, 77, 90, 91, 92, 93, 161, 172, 177, 178, 205, 211,
    212, 213, 215, 216, 218, 219, 220, 221, 225, 232, 233, 234,
];

pub fn has_sid(mid: u8) -> bool {
    MIDS_W_SIDS.contains(&mid)
}

/// A decoded inner message.
#[derive(Debug, Clone, PartialEq)]
pub struct SirfMessage {
    pub mid: u8,
    /// First payload byte, for ids listed in [`MIDS_W_SIDS`].
    pub sid: Option<u8>,
    pub name: &'static str,
    pub fields: Fields,
    pub consumed: usize,
}

pub static SIRF_HDR: Schema = Schema {
    name: "sirf_hdr",
    members: &[be("start", U16, "0x{:04x}"), be("len", U16, "0x{:04x}"), be("mid", U8, "0x{:02x}")],
};

pub static NAV: Schema = Schema {
    name: "nav_data",
    members: &[
        be("xpos", I32, "{}"),
        be("ypos", I32, "{}"),
        be("zpos", I32, "{}"),
        be("xvel", I16, "{}"),
        be("yvel", I16, "{}"),
        be("zvel", I16, "{}"),
        be("mode1", U8, "0x{:02x}"),
        be("hdop", U8, "0x{:02x}"),
        be("mode2", U8, "0x{:02x}"),
        be("week10", U16, "{}"),
        be("tow", U32, "{}"),
        be("nsats", U8, "{}"),
        hexbytes("prns", 12),
    ],
};

pub static NAVTRK: Schema = Schema {
    name: "nav_track",
    members: &[be("week10", U16, "{}"), be("tow", U32, "{}"), be("chans", U8, "{}")],
};

pub static NAVTRK_CHAN: Schema = Schema {
    name: "nav_track_chan",
    members: &[
        be("sv_id", U8, "{:2}"),
        be("sv_az23", U8, "{:3}"),
        be("sv_el2", U8, "{:3}"),
        be("state", U16, "0x{:04x}"),
        be("cno0", U8, "{}"),
        be("cno1", U8, "{}"),
        be("cno2", U8, "{}"),
        be("cno3", U8, "{}"),
        be("cno4", U8, "{}"),
        be("cno5", U8, "{}"),
        be("cno6", U8, "{}"),
        be("cno7", U8, "{}"),
        be("cno8", U8, "{}"),
        be("cno9", U8, "{}"),
    ],
};

pub static SWVER: Schema = Schema {
    name: "sw_ver",
    members: &[var("swver", Variable::DualString, "--<{}>--  --<{}>--")],
};

pub static VIS: Schema = Schema { name: "vis_list", members: &[be("vis_sats", U8, "{}")] };

pub static VIS_AZEL: Schema = Schema {
    name: "vis_azel",
    members: &[be("sv_id", U8, "{}"), be("sv_az", I16, "{}"), be("sv_el", I16, "{}")],
};

pub static ALM_DATA: Schema = Schema {
    name: "alm_data",
    members: &[
        be("sv_id", U8, "{}"),
        be("alm_week_status", U16, "0x{:04x}"),
        hexbytes("data", 24),
        be("checksum", U16, "0x{:04x}"),
    ],
};

pub static EPHEM_DATA: Schema = Schema {
    name: "ephem_data",
    members: &[be("sv_id", U8, "{}"), hexbytes("data", 90)],
};

pub static OTS: Schema = Schema { name: "ok_to_send", members: &[be("ots", U8, "{}")] };

pub static NAV_PARAMS: Schema = Schema {
    name: "nav_params",
    members: &[
        be("rsvd0", U16, "0x{:04x}"),
        be("pos_calc_mode", U8, "0x{:02x}"),
        be("alt_hold_mode", U8, "0x{:02x}"),
        be("alt_hold_src", U8, "0x{:02x}"),
        be("alt_src_input", I16, "0x{:04x}"),
        be("degraded_mode", U8, "0x{:02x}"),
        be("degraded_timeout", U8, "{}"),
        be("dr_timeout", U8, "{}"),
        be("track_smooth_mode", U8, "0x{:02x}"),
        be("static_nav", U8, "0x{:02x}"),
        be("3sv_least", U8, "0x{:02x}"),
        be("rsvd1", U32, "0x{:04x}"),
        be("dop_mask_mode", U8, "0x{:02x}"),
        be("nav_ele_mask", I16, "0x{:04x}"),
        be("nav_pwr_mask", U8, "{}"),
        be("rsvd2", U32, "0x{:04x}"),
        be("dgps_source", U8, "0x{:02x}"),
        be("dgps_mode", U8, "0x{:02x}"),
        be("dgps_timeout", U8, "0x{:02x}"),
        be("rsvd3", U32, "0x{:04x}"),
        be("lp_push_2_fix", U8, "0x{:02x}"),
        be("lp_on_time", I32, "0x{:04x}"),
        be("lp_interval", I32, "{}"),
        be("user_tasks_ena", U8, "0x{:02x}"),
        be("user_task_int", I32, "0x{:04x}"),
        be("lp_pwr_cycling", U8, "0x{:02x}"),
        be("lp_max_acq_srch", U32, "0x{:04x}"),
        be("lp_max_off_time", U32, "0x{:04x}"),
        be("apm_pwr_duty", U8, "0x{:02x}"),
        be("num_fixes", U16, "0x{:04x}"),
        be("time_btwn_fixes", U16, "0x{:04x}"),
        be("hve_max", U8, "0x{:02x}"),
        be("rsp_time_max", U8, "0x{:02x}"),
        be("time_acq_duty_prio", U8, "0x{:02x}"),
    ],
};

pub static GEO: Schema = Schema {
    name: "geo_data",
    members: &[
        be("nav_valid", U16, "0x{:04x}"),
        be("nav_type", U16, "0x{:04x}"),
        be("week_x", U16, "{}"),
        be("tow", U32, "{}"),
        be("utc_year", U16, "{}"),
        be("utc_month", U8, "{}"),
        be("utc_day", U8, "{}"),
        be("utc_hour", U8, "{}"),
        be("utc_min", U8, "{}"),
        be("utc_ms", U16, "{}"),
        be("sat_mask", U32, "0x{:08x}"),
        be("lat", I32, "{}"),
        be("lon", I32, "{}"),
        be("alt_elipsoid", I32, "{}"),
        be("alt_msl", I32, "{}"),
        be("map_datum", U8, "{}"),
        be("sog", U16, "{}"),
        be("cog", U16, "{}"),
        be("mag_var", U16, "{}"),
        be("climb", I16, "{}"),
        be("heading_rate", I16, "{}"),
        be("ehpe", U32, "{}"),
        be("evpe", U32, "{}"),
        be("ete", U32, "{}"),
        be("ehve", U16, "{}"),
        be("clock_bias", I32, "{}"),
        be("clock_bias_err", I32, "{}"),
        be("clock_drift", I32, "{}"),
        be("clock_drift_err", I32, "{}"),
        be("distance", U32, "{}"),
        be("distance_err", U16, "{}"),
        be("head_err", U16, "{}"),
        be("nsats", U8, "{}"),
        be("hdop", U8, "{}"),
        be("additional_mode", U8, "0x{:02x}"),
    ],
};

/// Extended ephemeris (56): just the sub-id, the rest depends on it.
pub static EE56: Schema = Schema { name: "ext_ephem", members: &[be("sid", U8, "{}")] };

pub const EE56_SIF_STATUS: u8 = 42;

pub static EE56_SIF_STAT: Schema = Schema {
    name: "sif_stat",
    members: &[
        be("sifState", U8, "{}"),
        be("cgeePredState", U8, "{}"),
        be("sifAiding", U8, "{}"),
        be("sgeeDwnLoad", U8, "{}"),
        be("cgeePredTimeLeft", U32, "{}"),
        be("cgeePredPendingMask", U32, "0x{:04x}"),
        be("svidCGEEpred", U8, "{}"),
        be("sgeeAgeValidity", U8, "{}"),
        hexbytes("cgeeAgeValidity", 32),
    ],
};

pub static PWR_MODE_RSP: Schema = Schema {
    name: "pwr_mode_rsp",
    members: &[be("sid", U8, "{}"), be("error", U16, "0x{:02x}"), be("reserved", U16, "{}")],
};

pub static INIT_DATA_SRC: Schema = Schema {
    name: "init_data_src",
    members: &[
        be("ecef_x", I32, "{}"),
        be("ecef_y", I32, "{}"),
        be("ecef_z", I32, "{}"),
        be("clock_drift", I32, "{}"),
        be("tow", U32, "{}"),
        be("week_x", U16, "{}"),
        be("chans", U8, "{}"),
        be("reset_config", U8, "0x{:02x}"),
    ],
};

pub static ALM_SET: Schema = Schema { name: "set_alm", members: &[hexbytes("data", 892)] };

pub static EPHEM_SET: Schema = Schema { name: "set_ephem", members: &[hexbytes("data", 90)] };

pub static SET_MSG_RATE: Schema = Schema {
    name: "set_msg_rate",
    members: &[
        be("mode", U8, "{}"),
        be("mid", U8, "{}"),
        be("rate", U8, "{}"),
        be("rsvd0", U8, "{}"),
        be("rsvd1", U8, "{}"),
        be("rsvd2", U8, "{}"),
        be("rsvd3", U8, "{}"),
    ],
};

pub static HW_CONF_RSP: Schema = Schema {
    name: "hw_config_rsp",
    members: &[
        be("hw_config", U8, "{}"),
        be("nominal_upper", U8, "{}"),
        be("nominal_freq", U32, "{}"),
        be("nw_enhance", U8, "{}"),
    ],
};

pub static PWR_MODE_REQ: Schema = Schema {
    name: "pwr_mode_req",
    members: &[be("sid", U8, "{}"), be("timeout", U8, "{}"), be("control", U8, "{}"), be("reserved", U16, "{}")],
};

pub static STATISTICS: Schema = Schema {
    name: "statistics",
    members: &[
        be("sid", U8, "{}"),
        be("ttff_reset", U16, "{}"),
        be("ttff_aiding", U16, "{}"),
        be("ttff_nav", U16, "{}"),
        be("pae_n", I32, "{}"),
        be("pae_e", I32, "{}"),
        be("pae_d", I32, "{}"),
        be("time_aiding_err", I32, "{}"),
        be("freq_aiding_err", I16, "{}"),
        be("pos_unc_horz", U8, "{}"),
        be("pos_unc_vert", U16, "{}"),
        be("time_unc", U8, "{}"),
        be("freq_unc", U8, "{}"),
        be("n_aided_ephem", U8, "{}"),
        be("n_aided_acq", U8, "{}"),
        be("nav_mode", U8, "{}"),
        be("pos_mode", U8, "{}"),
        be("status", U16, "{}"),
        be("start_mode", U8, "{}"),
        be("reserved", U8, "{}"),
    ],
};

/// Free-form ASCII up to the packet trailer.
pub static DEV_DATA: Schema = Schema {
    name: "dev_data",
    members: &[var("data", Variable::TrailerStripped(SIRF_END_SIZE), "{}")],
};

pub fn decode_simple(_ctx: &mut DecodeCtx<'_>, schema: &'static Schema, buf: &[u8]) -> Result<Decode, CodecError> {
    let (fields, consumed) = schema.decode(buf)?;
    Ok(Decode::new(fields, consumed))
}

/// Decode `count` back-to-back `item`s starting at `buf[offset..]`.
fn decode_repeated(item: &Schema, count: usize, buf: &[u8], offset: &mut usize) -> Result<Value, CodecError> {
    let mut list = Vec::with_capacity(count);
    for _ in 0..count {
        let (f, n) = item.decode(&buf[(*offset).min(buf.len())..])?;
        *offset += n;
        list.push(Value::Struct(f));
    }
    Ok(Value::List(list))
}

/// Nav track (4): fixed part, then `chans` channel blocks.
pub fn decode_navtrk(_ctx: &mut DecodeCtx<'_>, schema: &'static Schema, buf: &[u8]) -> Result<Decode, CodecError> {
    let (mut fields, mut consumed) = schema.decode(buf)?;
    let chans = fields.u64("chans").unwrap_or(0) as usize;
    let list = decode_repeated(&NAVTRK_CHAN, chans, buf, &mut consumed)?;
    fields.insert("chan", list);
    Ok(Decode::new(fields, consumed))
}

/// Visible list (13): count, then one az/el block per satellite.
pub fn decode_vis(_ctx: &mut DecodeCtx<'_>, schema: &'static Schema, buf: &[u8]) -> Result<Decode, CodecError> {
    let (mut fields, mut consumed) = schema.decode(buf)?;
    let n = fields.u64("vis_sats").unwrap_or(0) as usize;
    let list = decode_repeated(&VIS_AZEL, n, buf, &mut consumed)?;
    fields.insert("azel", list);
    Ok(Decode::new(fields, consumed))
}

/// Extended ephemeris (56): only the sifStatus sub-message is broken out.
pub fn decode_ee56(ctx: &mut DecodeCtx<'_>, schema: &'static Schema, buf: &[u8]) -> Result<Decode, CodecError> {
    let (mut fields, mut consumed) = schema.decode(buf)?;
    match fields.u64("sid").map(|s| s as u8) {
        Some(EE56_SIF_STATUS) => {
            let (stat, n) = EE56_SIF_STAT.decode(&buf[consumed..])?;
            consumed += n;
            fields.insert("sif_stat", Value::Struct(stat));
        }
        Some(sid) if ctx.level >= crate::registry::DIAG_LEVEL => {
            log::warn!("ee56: no decoder for sid {} @{}", sid, ctx.offset)
        }
        _ => {}
    }
    Ok(Decode::new(fields, consumed))
}

/// `(stored, computed)` checksum for a packet whose header declared `plen`; `rest` is
/// everything after the mid. `None` when the packet is too short to carry one.
pub fn check_payload(mid: u8, plen: usize, rest: &[u8]) -> Option<(u16, u16)> {
    let data = plen.checked_sub(1)?;
    let ck = rest.get(data..data + 2)?;
    let stored = u16::from_be_bytes([ck[0], ck[1]]);
    Some((stored, checksum(mid, &rest[..data])))
}

/// 15-bit sum of the mid and payload bytes.
pub fn checksum(mid: u8, payload: &[u8]) -> u16 {
    let sum = payload.iter().fold(mid as u32, |acc, &b| acc + b as u32);
    (sum & 0x7fff) as u16
}

/// Wrap `payload` (without mid) as a complete SirfBin packet.
pub fn encode_packet(mid: u8, payload: &[u8]) -> Vec<u8> {
    let len = (payload.len() + 1) as u16;
    let mut out = Vec::with_capacity(payload.len() + SIRF_HDR_SIZE + SIRF_END_SIZE);
    out.extend_from_slice(&SIRF_SOP_SEQ.to_be_bytes());
    out.extend_from_slice(&len.to_be_bytes());
    out.push(mid);
    out.extend_from_slice(payload);
    out.extend_from_slice(&checksum(mid, payload).to_be_bytes());
    out.extend_from_slice(&SIRF_EOP_SEQ.to_be_bytes());
    out
}

/// Populate the inner registry. Ids without a schema are registered by name so
/// they count and display correctly.
pub fn register_mids(r: &mut Registry) {
    r.register(2, 0, Some(decode_simple), Some(&NAV), "nav_data");
    r.register(4, 0, Some(decode_navtrk), Some(&NAVTRK), "nav_track");
    r.register(6, 0, Some(decode_simple), Some(&SWVER), "sw_ver");
    r.register(7, 0, None, None, "clock_status");
    r.register(8, 0, None, None, "50bps");
    r.register(9, 0, None, None, "cpu_thruput");
    r.register(10, 0, None, None, "error_id");
    r.register(11, 0, None, None, "cmd_ack");
    r.register(12, 0, None, None, "cmd_nack");
    r.register(13, 0, Some(decode_vis), Some(&VIS), "vis_list");
    r.register(14, 0, Some(decode_simple), Some(&ALM_DATA), "alm_data");
    r.register(15, 0, Some(decode_simple), Some(&EPHEM_DATA), "ephem_data");
    r.register(18, 0, Some(decode_simple), Some(&OTS), "ok_to_send");
    r.register(19, 0, Some(decode_simple), Some(&NAV_PARAMS), "nav_params");
    r.register(28, 0, None, None, "nl_meas");
    r.register(30, 0, None, None, "nl_sv_state");
    r.register(31, 0, None, None, "nl_init");
    r.register(41, 0, Some(decode_simple), Some(&GEO), "geo_data");
    r.register(50, 0, None, None, "sbas");
    r.register(51, 0, None, None, "tracker_load");
    r.register(56, 0, Some(decode_ee56), Some(&EE56), "ext_ephem");
    r.register(64, 0, None, None, "nl_aux");
    r.register(65, 0, None, None, "gpio");
    r.register(71, 0, None, None, "hw_config_req");
    r.register(90, 0, Some(decode_simple), Some(&PWR_MODE_RSP), "pwr_mode_rsp");
    r.register(91, 0, None, None, "hw_ctrl_out");
    r.register(92, 0, None, None, "cw_data");
    r.register(93, 0, None, None, "tcxo_learning");
    r.register(128, 0, Some(decode_simple), Some(&INIT_DATA_SRC), "init_data_src");
    r.register(130, 0, Some(decode_simple), Some(&ALM_SET), "set_alm");
    r.register(132, 0, None, None, "sw_ver_req");
    r.register(149, 0, Some(decode_simple), Some(&EPHEM_SET), "set_ephem");
    r.register(166, 0, Some(decode_simple), Some(&SET_MSG_RATE), "set_msg_rate");
    r.register(178, 0, None, None, "peek_poke");
    r.register(214, 0, Some(decode_simple), Some(&HW_CONF_RSP), "hw_config_rsp");
    r.register(218, 0, Some(decode_simple), Some(&PWR_MODE_REQ), "pwr_mode_req");
    r.register(225, 0, Some(decode_simple), Some(&STATISTICS), "statistics");
    r.register(255, 0, Some(decode_simple), Some(&DEV_DATA), "dev_data");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Counts;

    fn ctx(counts: &mut Counts) -> DecodeCtx<'_> {
        DecodeCtx::new(counts, 0, 0)
    }

    #[test]
    fn schema_sizes() {
        assert_eq!(SIRF_HDR.fixed_size(), Some(SIRF_HDR_SIZE));
        assert_eq!(NAV.fixed_size(), Some(40));
        assert_eq!(NAVTRK_CHAN.fixed_size(), Some(15));
        assert_eq!(VIS_AZEL.fixed_size(), Some(5));
        assert_eq!(GEO.fixed_size(), Some(90));
        assert_eq!(EE56_SIF_STAT.fixed_size(), Some(46));
        assert_eq!(SWVER.fixed_size(), None);
    }

    #[test]
    fn navtrk_decodes_channel_list() {
        let mut buf = vec![0x07, 0xe2, 0, 0, 0x01, 0x00, 2];
        for sv in [5u8, 9] {
            buf.extend_from_slice(&[sv, 100, 40, 0x00, 0xbf, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        }
        let mut counts = Counts::new();
        let d = decode_navtrk(&mut ctx(&mut counts), &NAVTRK, &buf).expect("decode");
        assert_eq!(d.consumed, 7 + 30);
        assert_eq!(d.fields.u64("week10"), Some(2018));
        assert_eq!(d.fields.u64("tow"), Some(256));
        let chans = d.fields.get("chan").and_then(Value::as_list).expect("chan list");
        assert_eq!(chans.len(), 2);
        let second = chans[1].as_struct().expect("chan");
        assert_eq!(second.u64("sv_id"), Some(9));
        assert_eq!(second.u64("state"), Some(0xbf));
    }

    #[test]
    fn vis_with_signed_azel() {
        let buf = [1u8, 12, 0xff, 0xfe, 0x00, 0x2d];
        let mut counts = Counts::new();
        let d = decode_vis(&mut ctx(&mut counts), &VIS, &buf).expect("decode");
        assert_eq!(d.consumed, 6);
        let azel = d.fields.get("azel").and_then(Value::as_list).expect("azel");
        let sat = azel[0].as_struct().expect("sat");
        assert_eq!(sat.get("sv_az").and_then(Value::as_i64), Some(-2));
        assert_eq!(sat.get("sv_el").and_then(Value::as_i64), Some(45));
    }

    #[test]
    fn ee56_breaks_out_sif_status_only() {
        let mut buf = vec![EE56_SIF_STATUS];
        buf.extend_from_slice(&[1, 2, 3, 4, 0, 0, 1, 0, 0, 0, 0, 0x0f, 7, 8]);
        buf.extend_from_slice(&[0xaa; 32]);
        let mut counts = Counts::new();
        let d = decode_ee56(&mut ctx(&mut counts), &EE56, &buf).expect("decode");
        assert_eq!(d.consumed, 47);
        let stat = d.fields.sub("sif_stat").expect("sif_stat");
        assert_eq!(stat.u64("cgeePredTimeLeft"), Some(256));
        assert_eq!(stat.u64("cgeePredPendingMask"), Some(0x0f));

        let d = decode_ee56(&mut ctx(&mut counts), &EE56, &[7, 1, 2, 3]).expect("decode");
        assert_eq!(d.consumed, 1);
        assert!(d.fields.sub("sif_stat").is_none());
    }

    #[test]
    fn dev_data_strips_trailer() {
        let pkt = encode_packet(255, b"hello");
        let body = &pkt[SIRF_HDR_SIZE..];
        let mut counts = Counts::new();
        let d = decode_simple(&mut ctx(&mut counts), &DEV_DATA, body).expect("decode");
        assert_eq!(d.consumed, body.len());
        assert_eq!(d.fields.get("data").and_then(Value::as_bytes), Some(&b"hello"[..]));
    }

    #[test]
    fn packet_checksum() {
        let pkt = encode_packet(0x84, &[0x00]);
        assert_eq!(pkt, vec![0xa0, 0xa2, 0x00, 0x02, 0x84, 0x00, 0x00, 0x84, 0xb0, 0xb3]);
        assert_eq!(check_payload(0x84, 2, &pkt[SIRF_HDR_SIZE..]), Some((0x84, 0x84)));
        assert_eq!(check_payload(0x84, 2, &pkt[SIRF_HDR_SIZE..6]), None);
    }

    #[test]
    fn sid_table() {
        assert!(has_sid(56));
        assert!(!has_sid(41));
    }
}
