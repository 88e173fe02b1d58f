//! Record stream decoding: carve DT records out of a byte buffer, dispatch them, and
//! resynchronize on the sync majik after corruption.
//!
//! A fault in one record never stops the stream: every call reports how many bytes it
//! consumed, and the caller simply continues from there.

use crate::config::DecoderConfig;
use crate::dt::{self, DtHeader, DT_HDR_SIZE, DT_SYNC_MAJIK_BYTES};
use crate::registry::{dt_records, Counts, DecodeCtx};
use crate::sirf::SirfMessage;
use crate::value::Fields;
use thiserror::Error;

/// Raw bytes kept on a fault, at most.
pub const RAW_DUMP_MAX: usize = 64;

/// Why a record could not be decoded. The stream carries on regardless.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FaultKind {
    #[error("short buffer: wanted {wanted} bytes, got {got}")]
    ShortBuffer { wanted: usize, got: usize },
    #[error("no decoder for record type {0}")]
    UnknownType(u16),
    #[error("length mismatch: type requires {required}, header says {len}")]
    LengthMismatch { required: usize, len: u16 },
    #[error("implausible record length {0}")]
    BadLength(u16),
    #[error("sync majik where a header was expected")]
    SyncMajik,
    #[error("truncated record: len {len}, {available} bytes available")]
    Truncated { len: u16, available: usize },
    #[error("undecodable body: {0}")]
    Undecodable(String),
}

/// Flagged on a record that still decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SoftFault {
    #[error("recsum mismatch: stored 0x{stored:04x}, computed 0x{computed:04x}")]
    ChecksumMismatch { stored: u16, computed: u16 },
    #[error("gps raw: bad start 0x{start:04x}, inner message skipped")]
    FramingMismatch { start: u16 },
    #[error("no decoder for mid {0}")]
    UnknownMessageId(u8),
    #[error("mid {mid}: sirf checksum stored 0x{stored:04x}, computed 0x{computed:04x}")]
    SirfChecksumMismatch { mid: u8, stored: u16, computed: u16 },
}

/// A decoded record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Absolute stream offset.
    pub offset: usize,
    pub header: DtHeader,
    pub name: &'static str,
    /// Body fields (header excluded).
    pub fields: Fields,
    pub inner: Option<SirfMessage>,
    /// Header plus whatever the body decoders consumed; may be less than `header.len`.
    pub decoded_len: usize,
    pub faults: Vec<SoftFault>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub offset: usize,
    pub kind: FaultKind,
    /// Present when at least a full header was available.
    pub header: Option<DtHeader>,
    pub raw: Vec<u8>,
    /// Absolute offset of the sync majik that ended a resync scan.
    pub resync_at: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Record(Record),
    Fault(Fault),
    /// Nothing left to decode.
    Exhausted,
}

/// One decode session: configuration plus its own occurrence counters.
///
/// Registries are shared and read-only; sessions never share counters, so any number
/// of decoders may run side by side.
#[derive(Debug, Clone)]
pub struct StreamDecoder {
    config: DecoderConfig,
    counts: Counts,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}

impl StreamDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        StreamDecoder { config, counts: Counts::new() }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn counts(&self) -> &Counts {
        &self.counts
    }

    pub fn reset_counts(&mut self) {
        self.counts.reset();
    }

    /// Decode one record at the start of `buf`. `offset` is the absolute stream offset
    /// of `buf[0]`, used for reporting only.
    ///
    /// Returns the outcome and the bytes consumed; consumed is 0 only for
    /// [`Decoded::Exhausted`].
    pub fn decode_next_record(&mut self, buf: &[u8], offset: usize) -> (Decoded, usize) {
        if buf.is_empty() {
            return (Decoded::Exhausted, 0);
        }
        if buf.starts_with(&DT_SYNC_MAJIK_BYTES) {
            log::debug!("@{}: sync majik at header position", offset);
            self.counts.records.incr_unknown();
            return fault(offset, FaultKind::SyncMajik, None, &buf[..4], None, 4);
        }
        if buf.len() < DT_HDR_SIZE {
            match buf.get(2..4) {
                Some(t) => self.counts.records.incr(u16::from_le_bytes([t[0], t[1]])),
                None => self.counts.records.incr_unknown(),
            }
            log::warn!("@{}: {} bytes left, short of a header", offset, buf.len());
            let kind = FaultKind::ShortBuffer { wanted: DT_HDR_SIZE, got: buf.len() };
            return fault(offset, kind, None, buf, None, buf.len());
        }
        let header = match DtHeader::decode(buf) {
            Ok(h) => h,
            Err(e) => {
                self.counts.records.incr_unknown();
                let kind = FaultKind::Undecodable(e.to_string());
                return fault(offset, kind, None, buf, None, buf.len());
            }
        };
        self.counts.records.incr(header.rtype);

        let len = header.len as usize;
        if len < DT_HDR_SIZE || len > self.config.max_record_len {
            log::warn!("@{}: bad record len {} (type {}), resyncing", offset, len, header.rtype);
            return resync(buf, offset, FaultKind::BadLength(header.len), header);
        }
        if len > buf.len() {
            log::warn!("@{}: record len {} but only {} bytes, resyncing", offset, len, buf.len());
            let kind = FaultKind::Truncated { len: header.len, available: buf.len() };
            return resync(buf, offset, kind, header);
        }

        let entry = dt_records().lookup(header.rtype);
        if entry.required_len != 0 && entry.required_len != len {
            log::warn!("@{}: {} needs len {}, header says {}, resyncing", offset, entry.name, entry.required_len, len);
            let kind = FaultKind::LengthMismatch { required: entry.required_len, len: header.len };
            return resync(buf, offset, kind, header);
        }

        let rec = &buf[..len];
        let mut ctx = DecodeCtx::new(&mut self.counts, self.config.level, offset);
        ctx.verify_checksums = self.config.verify_checksums;
        if ctx.verify_checksums {
            let computed = dt::record_checksum(rec);
            if computed != header.recsum {
                ctx.flag(SoftFault::ChecksumMismatch { stored: header.recsum, computed });
            }
        }

        // counted at header decode
        match dt_records().decode(header.rtype, &mut ctx, &rec[DT_HDR_SIZE..]) {
            Ok(Some(d)) => {
                let faults = std::mem::take(&mut ctx.soft);
                log::debug!("@{}: {} recnum {} len {}", offset, entry.name, header.recnum, len);
                let record = Record {
                    offset,
                    header,
                    name: entry.name,
                    fields: d.fields,
                    inner: d.inner,
                    decoded_len: DT_HDR_SIZE + d.consumed,
                    faults,
                };
                (Decoded::Record(record), len)
            }
            Ok(None) => fault(offset, FaultKind::UnknownType(header.rtype), Some(header), rec, None, len),
            Err(e) => {
                log::warn!("@{}: {} body: {}", offset, entry.name, e);
                let kind = match e.short_buffer() {
                    Some((wanted, got)) => FaultKind::ShortBuffer { wanted, got },
                    None => FaultKind::Undecodable(e.to_string()),
                };
                fault(offset, kind, Some(header), rec, None, len)
            }
        }
    }
}

/// Scan forward for the sync majik and resume just past it.
fn resync(buf: &[u8], offset: usize, kind: FaultKind, header: DtHeader) -> (Decoded, usize) {
    match find_majik(buf, 1) {
        Some(pos) => {
            log::debug!("@{}: resync at {}", offset, offset + pos);
            fault(offset, kind, Some(header), &buf[..pos], Some(offset + pos), pos + 4)
        }
        None => {
            log::debug!("@{}: no sync majik in remaining {} bytes", offset, buf.len());
            fault(offset, kind, Some(header), buf, None, buf.len())
        }
    }
}

fn fault(
    offset: usize,
    kind: FaultKind,
    header: Option<DtHeader>,
    raw: &[u8],
    resync_at: Option<usize>,
    consumed: usize,
) -> (Decoded, usize) {
    let raw = raw[..raw.len().min(RAW_DUMP_MAX)].to_vec();
    (Decoded::Fault(Fault { offset, kind, header, raw, resync_at }), consumed)
}

/// Position of the first sync majik at or after `from`, any alignment.
pub fn find_majik(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(DT_SYNC_MAJIK_BYTES.len())
        .position(|w| w == DT_SYNC_MAJIK_BYTES)
        .map(|p| p + from)
}

/// Everything a full pass over a buffer produced.
#[derive(Debug, Clone)]
pub struct StreamDecodeResult {
    pub records: Vec<Record>,
    pub faults: Vec<Fault>,
    pub counts: Counts,
}

/// Decode `buf` end to end with a fresh session.
pub fn decode_stream(buf: &[u8], config: DecoderConfig) -> StreamDecodeResult {
    let mut decoder = StreamDecoder::new(config);
    let mut records = Vec::new();
    let mut faults = Vec::new();
    let mut offset = 0usize;
    while offset < buf.len() {
        let (decoded, consumed) = decoder.decode_next_record(&buf[offset..], offset);
        match decoded {
            Decoded::Record(r) => records.push(r),
            Decoded::Fault(f) => faults.push(f),
            Decoded::Exhausted => break,
        }
        if consumed == 0 {
            break;
        }
        offset += consumed;
    }
    StreamDecodeResult { records, faults, counts: decoder.counts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dt::{encode_record, RtcTime, DT_DEBUG, DT_SYNC_MAJIK};

    fn debug_record(recnum: u32, extra: usize) -> Vec<u8> {
        encode_record(DT_DEBUG, recnum, &RtcTime::default(), &vec![0x11; extra]).expect("encode")
    }

    #[test]
    fn empty_buffer_is_exhausted() {
        let mut d = StreamDecoder::default();
        assert_eq!(d.decode_next_record(&[], 0), (Decoded::Exhausted, 0));
    }

    #[test]
    fn majik_at_header_position() {
        let mut d = StreamDecoder::default();
        let (out, n) = d.decode_next_record(&DT_SYNC_MAJIK.to_le_bytes(), 7);
        assert_eq!(n, 4);
        match out {
            Decoded::Fault(f) => {
                assert_eq!(f.kind, FaultKind::SyncMajik);
                assert_eq!(f.offset, 7);
            }
            other => panic!("expected fault, got {:?}", other),
        }
        assert_eq!(d.counts().records.unknown(), 1);
        assert_eq!(d.counts().records.total(), 1);
    }

    #[test]
    fn tail_without_type_counts_as_unknown() {
        let mut d = StreamDecoder::default();
        let (out, n) = d.decode_next_record(&[0x28, 0, 4], 100);
        assert_eq!(n, 3);
        assert!(matches!(out, Decoded::Fault(Fault { kind: FaultKind::ShortBuffer { wanted: 20, got: 3 }, .. })));
        assert_eq!(d.counts().records.unknown(), 1);
        assert!(d.counts().records.snapshot().is_empty());
    }

    #[test]
    fn short_tail_consumes_everything() {
        let mut d = StreamDecoder::default();
        let rec = debug_record(1, 0);
        let (out, n) = d.decode_next_record(&rec[..12], 0);
        assert_eq!(n, 12);
        assert!(matches!(out, Decoded::Fault(Fault { kind: FaultKind::ShortBuffer { wanted: 20, got: 12 }, .. })));
        assert_eq!(d.counts().records.get(DT_DEBUG), 1);
    }

    #[test]
    fn counts_each_attempt_once() {
        let mut d = StreamDecoder::default();
        let rec = debug_record(1, 4);
        let (out, n) = d.decode_next_record(&rec, 0);
        assert_eq!(n, rec.len());
        assert!(matches!(out, Decoded::Record(_)));
        assert_eq!(d.counts().records.get(DT_DEBUG), 1);
        assert_eq!(d.counts().records.total(), 1);
    }

    #[test]
    fn bad_length_without_majik_exhausts() {
        let mut d = StreamDecoder::default();
        let mut rec = debug_record(1, 4);
        rec[0] = 3;
        rec[1] = 0;
        let (out, n) = d.decode_next_record(&rec, 0);
        assert_eq!(n, rec.len());
        match out {
            Decoded::Fault(f) => {
                assert_eq!(f.kind, FaultKind::BadLength(3));
                assert_eq!(f.resync_at, None);
            }
            other => panic!("expected fault, got {:?}", other),
        }
    }

    #[test]
    fn find_majik_any_alignment() {
        let mut buf = vec![0u8; 3];
        buf.extend_from_slice(&DT_SYNC_MAJIK.to_le_bytes());
        assert_eq!(find_majik(&buf, 0), Some(3));
        assert_eq!(find_majik(&buf, 4), None);
        assert_eq!(find_majik(&buf, 100), None);
    }
}
