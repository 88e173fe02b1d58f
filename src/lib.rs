//! # tagdump — DT record stream decoder
//!
//! Decodes the binary event-log stream ("DT records") written by a data-logging tag.
//! One record type (`GPS_RAW`) carries a second, independently framed protocol: the
//! GPS receiver's big-endian SirfBin messages.
//!
//! ## Layers
//!
//! - [`schema`] / [`codec`]: declarative structure descriptions (scalars with explicit
//!   byte order, variable-length values, nested structures) and their decoder/encoder
//! - [`registry`]: code → (required length, decoder, schema, name) tables for record
//!   types and SirfBin message ids, plus per-session occurrence counters
//! - [`dt`] / [`sirf`]: the protocol tables themselves
//! - [`stream`]: walks a buffer one record at a time, resyncing on the sync majik
//! - [`dump`]: display formatting (identity lines, field dumps)
//!
//! ## Usage
//!
//! ```no_run
//! use tagdump::{decode_stream, DecoderConfig};
//!
//! let bytes = std::fs::read("data.dt").unwrap();
//! let result = decode_stream(&bytes, DecoderConfig::default());
//! for r in &result.records {
//!     println!("{}", tagdump::dump::record_line(r));
//! }
//! ```

pub mod codec;
pub mod config;
pub mod dt;
pub mod dump;
pub mod registry;
pub mod schema;
pub mod sirf;
pub mod stream;
pub mod value;

pub use codec::CodecError;
pub use config::DecoderConfig;
pub use dt::{DtHeader, RtcTime};
pub use registry::{lookup_message_name, lookup_type_name, Counts};
pub use schema::{Endianness, Schema};
pub use sirf::SirfMessage;
pub use stream::{decode_stream, Decoded, Fault, FaultKind, Record, SoftFault, StreamDecodeResult, StreamDecoder};
pub use value::{Fields, Value};
