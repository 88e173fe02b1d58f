//! Code → decoder/schema/name tables and per-session occurrence counters.
//!
//! Two registries exist: DT record types (outer) and SirfBin message ids (inner). Both
//! are built once, on first use, from the static tables in [`dt`](crate::dt) and
//! [`sirf`](crate::sirf), and are read-only afterwards; any number of decode sessions
//! may share them. Occurrence counts are per session ([`Counts`]) and are passed in
//! through [`DecodeCtx`], so concurrent sessions never share mutable state.

use crate::codec::CodecError;
use crate::schema::Schema;
use crate::sirf::SirfMessage;
use crate::stream::SoftFault;
use crate::value::Fields;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::OnceLock;

/// Verbosity at which "no decoder" diagnostics are emitted.
pub const DIAG_LEVEL: u8 = 5;

/// Which counter table a registry bumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Record,
    Message,
}

impl Namespace {
    fn label(&self) -> &'static str {
        match self {
            Namespace::Record => "rtype",
            Namespace::Message => "mid",
        }
    }
}

/// Occurrence table indexed directly by code over a known range, plus one bucket for
/// everything outside it and for header attempts whose code could not be read.
#[derive(Debug, Clone)]
pub struct Counters {
    table: Vec<u64>,
    unknown: u64,
}

impl Counters {
    /// A table covering codes `0..codes`.
    pub fn new(codes: usize) -> Self {
        Counters { table: vec![0; codes], unknown: 0 }
    }

    pub fn incr(&mut self, code: u16) {
        match self.table.get_mut(code as usize) {
            Some(n) => *n += 1,
            None => {
                log::trace!("code {} outside counter table ({}), counted as unknown", code, self.table.len());
                self.unknown += 1;
            }
        }
    }

    pub fn incr_unknown(&mut self) {
        self.unknown += 1;
    }

    /// Count for `code`; 0 for codes outside the table (see [`unknown`](Self::unknown)).
    pub fn get(&self, code: u16) -> u64 {
        self.table.get(code as usize).copied().unwrap_or(0)
    }

    pub fn unknown(&self) -> u64 {
        self.unknown
    }

    pub fn total(&self) -> u64 {
        self.table.iter().sum::<u64>() + self.unknown
    }

    pub fn reset(&mut self) {
        self.table.iter_mut().for_each(|n| *n = 0);
        self.unknown = 0;
    }

    /// In-range codes seen at least once, ascending.
    pub fn snapshot(&self) -> BTreeMap<u16, u64> {
        self.table
            .iter()
            .enumerate()
            .filter(|(_, &n)| n > 0)
            .map(|(code, &n)| (code as u16, n))
            .collect()
    }
}

/// Both counter tables of one decode session.
#[derive(Debug, Clone)]
pub struct Counts {
    /// DT record types up to the highest defined type.
    pub records: Counters,
    /// SirfBin message ids (one byte).
    pub messages: Counters,
}

impl Default for Counts {
    fn default() -> Self {
        Counts {
            records: Counters::new(crate::dt::DT_MAX_TYPE as usize + 1),
            messages: Counters::new(1 << 8),
        }
    }
}

impl Counts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(&mut self, ns: Namespace, code: u16) {
        match ns {
            Namespace::Record => self.records.incr(code),
            Namespace::Message => self.messages.incr(code),
        }
    }

    pub fn reset(&mut self) {
        self.records.reset();
        self.messages.reset();
    }
}

/// Per-call decode context handed to every decoder.
#[derive(Debug)]
pub struct DecodeCtx<'a> {
    pub level: u8,
    /// Absolute stream offset of the record, for diagnostics.
    pub offset: usize,
    pub verify_checksums: bool,
    pub counts: &'a mut Counts,
    /// Soft faults flagged while decoding; they never stop the decode.
    pub soft: Vec<SoftFault>,
}

impl<'a> DecodeCtx<'a> {
    pub fn new(counts: &'a mut Counts, level: u8, offset: usize) -> Self {
        DecodeCtx { level, offset, verify_checksums: false, counts, soft: Vec::new() }
    }

    pub fn flag(&mut self, f: SoftFault) {
        log::debug!("@{}: {}", self.offset, f);
        self.soft.push(f);
    }
}

/// What a decoder produced: its instance, the bytes it consumed, and (for GPS raw
/// records) the inner SirfBin message.
#[derive(Debug, Clone, PartialEq)]
pub struct Decode {
    pub fields: Fields,
    pub consumed: usize,
    pub inner: Option<SirfMessage>,
}

impl Decode {
    pub fn new(fields: Fields, consumed: usize) -> Self {
        Decode { fields, consumed, inner: None }
    }
}

pub type DecodeFn = fn(&mut DecodeCtx<'_>, &'static Schema, &[u8]) -> Result<Decode, CodecError>;

/// `(required_length, decoder, schema, name)` for one code.
#[derive(Clone, Copy)]
pub struct Entry {
    /// Exact record length, or 0 when variable (not checked).
    pub required_len: usize,
    pub decoder: Option<DecodeFn>,
    pub schema: Option<&'static Schema>,
    pub name: &'static str,
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("required_len", &self.required_len)
            .field("decoder", &self.decoder.is_some())
            .field("schema", &self.schema.map(|s| s.name))
            .field("name", &self.name)
            .finish()
    }
}

/// Returned by [`Registry::lookup`] for codes nobody registered.
pub const UNKNOWN: Entry = Entry { required_len: 0, decoder: None, schema: None, name: "unk" };

#[derive(Debug)]
pub struct Registry {
    namespace: Namespace,
    entries: HashMap<u16, Entry>,
}

impl Registry {
    pub fn new(namespace: Namespace) -> Self {
        Registry { namespace, entries: HashMap::new() }
    }

    /// Insert (or replace with identical contents) the entry for `code`.
    pub fn register(
        &mut self,
        code: u16,
        required_len: usize,
        decoder: Option<DecodeFn>,
        schema: Option<&'static Schema>,
        name: &'static str,
    ) {
        self.entries.insert(code, Entry { required_len, decoder, schema, name });
    }

    /// Never fails: unregistered codes get [`UNKNOWN`].
    pub fn lookup(&self, code: u16) -> &Entry {
        self.entries.get(&code).unwrap_or(&UNKNOWN)
    }

    pub fn name(&self, code: u16) -> &'static str {
        self.lookup(code).name
    }

    pub fn is_registered(&self, code: u16) -> bool {
        self.entries.contains_key(&code)
    }

    pub fn codes(&self) -> Vec<u16> {
        let mut codes: Vec<u16> = self.entries.keys().copied().collect();
        codes.sort_unstable();
        codes
    }

    /// Count one occurrence of `code` and run its decoder over `buf`.
    ///
    /// Returns `Ok(None)` when the code has no decoder: nothing beyond what the caller
    /// already consumed is taken.
    pub fn dispatch(
        &self,
        code: u16,
        ctx: &mut DecodeCtx<'_>,
        buf: &[u8],
    ) -> Result<Option<Decode>, CodecError> {
        ctx.counts.bump(self.namespace, code);
        self.decode(code, ctx, buf)
    }

    /// [`dispatch`](Self::dispatch) without counting, for callers that counted already.
    pub fn decode(
        &self,
        code: u16,
        ctx: &mut DecodeCtx<'_>,
        buf: &[u8],
    ) -> Result<Option<Decode>, CodecError> {
        let entry = self.lookup(code);
        let (decoder, schema) = match (entry.decoder, entry.schema) {
            (Some(d), Some(s)) => (d, s),
            _ => {
                if ctx.level >= DIAG_LEVEL {
                    log::warn!(
                        "*** no decoder/obj defined for {} {} ({}) @{}",
                        self.namespace.label(),
                        code,
                        entry.name,
                        ctx.offset
                    );
                }
                return Ok(None);
            }
        };
        log::trace!("{} {} -> {} ({} bytes)", self.namespace.label(), code, schema.name, buf.len());
        decoder(ctx, schema, buf).map(Some)
    }
}

/// Outer registry: DT record types.
pub fn dt_records() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut r = Registry::new(Namespace::Record);
        crate::dt::register_records(&mut r);
        r
    })
}

/// Inner registry: SirfBin message ids.
pub fn sirf_mids() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut r = Registry::new(Namespace::Message);
        crate::sirf::register_mids(&mut r);
        r
    })
}

pub fn lookup_type_name(code: u16) -> &'static str {
    dt_records().name(code)
}

pub fn lookup_message_name(mid: u8) -> &'static str {
    sirf_mids().name(mid as u16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{le, Scalar};

    static ONE: Schema = Schema { name: "one", members: &[le("v", Scalar::U8, "{}")] };

    fn decode_one(_ctx: &mut DecodeCtx<'_>, schema: &'static Schema, buf: &[u8]) -> Result<Decode, CodecError> {
        let (fields, consumed) = schema.decode(buf)?;
        Ok(Decode::new(fields, consumed))
    }

    fn sample() -> Registry {
        let mut r = Registry::new(Namespace::Message);
        r.register(7, 0, Some(decode_one), Some(&ONE), "seven");
        r.register(8, 0, None, None, "named_only");
        r
    }

    #[test]
    fn lookup_unknown_is_sentinel() {
        let r = sample();
        let e = r.lookup(99);
        assert_eq!(e.name, "unk");
        assert_eq!(e.required_len, 0);
        assert!(e.decoder.is_none());
        assert!(e.schema.is_none());
        assert!(!r.is_registered(99));
    }

    #[test]
    fn lookup_is_stable() {
        let r = sample();
        let a = *r.lookup(7);
        let b = *r.lookup(7);
        assert_eq!(a.name, b.name);
        assert_eq!(a.required_len, b.required_len);
        assert!(std::ptr::eq(a.schema.expect("schema"), b.schema.expect("schema")));
    }

    #[test]
    fn dispatch_counts_even_without_decoder() {
        let r = sample();
        let mut counts = Counts::new();
        let mut ctx = DecodeCtx::new(&mut counts, 9, 0);
        assert!(r.dispatch(8, &mut ctx, &[1, 2]).expect("dispatch").is_none());
        assert!(r.dispatch(200, &mut ctx, &[]).expect("dispatch").is_none());
        let d = r.dispatch(7, &mut ctx, &[42, 0]).expect("dispatch").expect("decoded");
        assert_eq!(d.consumed, 1);
        assert_eq!(d.fields.u64("v"), Some(42));
        assert_eq!(counts.messages.get(8), 1);
        assert_eq!(counts.messages.get(200), 1);
        assert_eq!(counts.messages.get(7), 1);
        assert_eq!(counts.records.total(), 0);
    }

    #[test]
    fn counters_snapshot_and_reset() {
        let mut c = Counters::new(16);
        c.incr(3);
        c.incr(3);
        c.incr(1);
        c.incr(40);
        c.incr_unknown();
        assert_eq!(c.snapshot().into_iter().collect::<Vec<_>>(), vec![(1, 1), (3, 2)]);
        assert_eq!(c.get(40), 0);
        assert_eq!(c.unknown(), 2);
        assert_eq!(c.total(), 5);
        c.reset();
        assert!(c.snapshot().is_empty());
        assert_eq!(c.total(), 0);
    }

    #[test]
    fn record_table_covers_defined_types() {
        let mut counts = Counts::new();
        counts.bump(Namespace::Record, crate::dt::DT_GPS_RAW_SIRFBIN);
        counts.bump(Namespace::Record, 0x4000);
        counts.bump(Namespace::Message, 255);
        assert_eq!(counts.records.get(crate::dt::DT_GPS_RAW_SIRFBIN), 1);
        assert_eq!(counts.records.unknown(), 1);
        assert_eq!(counts.messages.get(255), 1);
        assert_eq!(counts.messages.unknown(), 0);
    }
}
