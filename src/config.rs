//! Decoder configuration.

use serde::{Deserialize, Serialize};

/// Knobs for a [`StreamDecoder`](crate::stream::StreamDecoder) session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Verbosity; at 5 and above "no decoder" diagnostics are logged.
    #[serde(default)]
    pub level: u8,

    /// Compare stored checksums (outer `recsum`, inner SirfBin) and flag mismatches.
    /// Mismatches never reject a record.
    #[serde(default)]
    pub verify_checksums: bool,

    /// Largest plausible header `len`; anything bigger is treated as desync.
    #[serde(default = "default_max_record_len")]
    pub max_record_len: usize,
}

fn default_max_record_len() -> usize {
    2048
}

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfig { level: 0, verify_checksums: false, max_record_len: default_max_record_len() }
    }
}

impl DecoderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the verbosity level
    pub fn with_level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    /// Builder method: enable or disable checksum verification
    pub fn with_checksums(mut self, enabled: bool) -> Self {
        self.verify_checksums = enabled;
        self
    }

    /// Builder method: set the record length bound
    pub fn with_max_record_len(mut self, len: usize) -> Self {
        self.max_record_len = len;
        self
    }
}
