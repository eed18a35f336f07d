//! Runtime-resolved row-key schema: identifier widths and the cell
//! qualifier's flag-bit width.
//!
//! Unlike the rest of the teacher crate's `Config`, this is not read from a
//! file — the intern service exposes these widths as process-lifetime
//! constants (spec §6), so a caller constructs a `Schema` once from those
//! values and passes it by value everywhere it's needed.

use crate::error::{QueryError, Result};
use serde::{Deserialize, Serialize};

/// Number of bytes a row key spends on the base timestamp.
pub const TIMESTAMP_BYTES: usize = 4;

/// Identifier widths and flag-bit width for one schema instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    metric_width: u8,
    tag_name_width: u8,
    tag_value_width: u8,
    flag_bits: u8,
}

impl Schema {
    /// Construct a schema, validating widths are non-zero and `flag_bits`
    /// leaves at least one delta bit (`1..=15`).
    pub fn new(
        metric_width: u8,
        tag_name_width: u8,
        tag_value_width: u8,
        flag_bits: u8,
    ) -> Result<Self> {
        if metric_width == 0 || tag_name_width == 0 || tag_value_width == 0 {
            return Err(QueryError::InvalidSchema(
                "identifier widths must be non-zero".to_string(),
            ));
        }
        if flag_bits == 0 || flag_bits >= 16 {
            return Err(QueryError::InvalidSchema(format!(
                "flag_bits must be in 1..=15, got {flag_bits}"
            )));
        }
        Ok(Self {
            metric_width,
            tag_name_width,
            tag_value_width,
            flag_bits,
        })
    }

    /// `W_m`: metric id width in bytes.
    pub fn metric_width(&self) -> usize {
        self.metric_width as usize
    }

    /// `W_n`: tag name id width in bytes.
    pub fn tag_name_width(&self) -> usize {
        self.tag_name_width as usize
    }

    /// `W_v`: tag value id width in bytes.
    pub fn tag_value_width(&self) -> usize {
        self.tag_value_width as usize
    }

    /// `W_n + W_v`: bytes occupied by one tag pair in the row key.
    pub fn tag_pair_width(&self) -> usize {
        self.tag_name_width() + self.tag_value_width()
    }

    /// `F`: number of low qualifier bits reserved for value-type flags.
    pub fn flag_bits(&self) -> u32 {
        u32::from(self.flag_bits)
    }

    /// `16 - F`: number of delta bits in a cell qualifier.
    pub fn delta_bits(&self) -> u32 {
        16 - self.flag_bits()
    }

    /// `MAX_TIMESPAN = 2^(16-F)`: largest delta a row can hold, in seconds.
    pub fn max_timespan(&self) -> u32 {
        1u32 << self.delta_bits()
    }

    /// Length of a row key prefix before any tag pairs: `W_m + T`.
    pub fn key_prefix_len(&self) -> usize {
        self.metric_width() + TIMESTAMP_BYTES
    }
}
