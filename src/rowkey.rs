//! Row key codec (spec §4.A): the fixed binary layout
//! `metric_id ‖ base_time ‖ (tag_name_id‖tag_value_id)×k`.

use crate::error::{QueryError, Result};
use crate::schema::{Schema, TIMESTAMP_BYTES};

/// A borrowed, parsed view over one row key's bytes.
#[derive(Clone, Copy)]
pub struct RowKeyView<'a> {
    schema: Schema,
    bytes: &'a [u8],
}

impl<'a> RowKeyView<'a> {
    /// Parse `bytes` against `schema`, failing with `MalformedKey` unless
    /// its length is exactly `W_m + T + k*(W_n+W_v)` for some `k >= 0`.
    pub fn parse(schema: Schema, bytes: &'a [u8]) -> Result<Self> {
        let prefix = schema.key_prefix_len();
        if bytes.len() < prefix {
            return Err(QueryError::MalformedKey { len: bytes.len() });
        }
        let remainder = bytes.len() - prefix;
        if remainder % schema.tag_pair_width() != 0 {
            return Err(QueryError::MalformedKey { len: bytes.len() });
        }
        Ok(Self { schema, bytes })
    }

    /// `metric_id` bytes.
    pub fn metric_id(&self) -> &'a [u8] {
        &self.bytes[..self.schema.metric_width()]
    }

    /// The row's base timestamp.
    pub fn base_time(&self) -> u32 {
        let start = self.schema.metric_width();
        let end = start + TIMESTAMP_BYTES;
        u32::from_be_bytes(self.bytes[start..end].try_into().expect("4 bytes"))
    }

    /// The raw tag-pair bytes (everything after `metric_id ‖ base_time`).
    pub fn tag_bytes(&self) -> &'a [u8] {
        &self.bytes[self.schema.key_prefix_len()..]
    }

    /// Iterate `(name_id_bytes, value_id_bytes)` pairs in key order
    /// (ascending `name_id`, per the row-key invariant).
    pub fn tag_pairs(&self) -> impl Iterator<Item = (&'a [u8], &'a [u8])> {
        tag_pairs_from_tag_bytes(&self.schema, self.tag_bytes())
    }

    /// `(metric_id, base_time, tag_pairs)`.
    pub fn split(&self) -> (&'a [u8], u32, Vec<(&'a [u8], &'a [u8])>) {
        (self.metric_id(), self.base_time(), self.tag_pairs().collect())
    }

    /// The full key bytes this view was parsed from.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

/// Iterate tag pairs directly from a tag-block slice (no base_time
/// present), used by the group assembler on series-identity keys that
/// have already had their timestamp stripped.
pub fn tag_pairs_from_tag_bytes<'a>(
    schema: &Schema,
    tag_bytes: &'a [u8],
) -> impl Iterator<Item = (&'a [u8], &'a [u8])> {
    let name_width = schema.tag_name_width();
    tag_bytes
        .chunks_exact(schema.tag_pair_width())
        .map(move |pair| pair.split_at(name_width))
}

/// Encode a row key from its parts. Tag pairs must already be sorted
/// ascending by `name_id` with no duplicates (debug-asserted, per
/// invariant — a violation here is a caller programming error, not a
/// recoverable `Result`).
pub fn encode(
    schema: &Schema,
    metric_id: &[u8],
    base_time: u32,
    tag_pairs: &[(&[u8], &[u8])],
) -> Vec<u8> {
    debug_assert_eq!(metric_id.len(), schema.metric_width());
    debug_assert!(tag_pairs.windows(2).all(|w| w[0].0 < w[1].0), "tag pairs must be sorted ascending by name_id with no duplicates");

    let mut buf = Vec::with_capacity(schema.key_prefix_len() + tag_pairs.len() * schema.tag_pair_width());
    buf.extend_from_slice(metric_id);
    buf.extend_from_slice(&base_time.to_be_bytes());
    for (name_id, value_id) in tag_pairs {
        debug_assert_eq!(name_id.len(), schema.tag_name_width());
        debug_assert_eq!(value_id.len(), schema.tag_value_width());
        buf.extend_from_slice(name_id);
        buf.extend_from_slice(value_id);
    }
    buf
}

/// The series identity of a row key: `metric_id ‖ tag_bytes`, with the
/// base-time bytes dropped. Two row keys sharing this identity belong to
/// the same Span (spec §3, "series identity").
///
/// This is the implementation's answer to the "comparator that skips
/// timestamp bytes" design note (spec §9): rather than writing a custom
/// `Ord`/`Hash` over the full key that ignores a byte range, we derive a
/// smaller owned key once per row that simply doesn't contain that range.
/// The original row-key bytes (including `base_time`) are untouched and
/// still live inside each `RowSeq`.
pub fn series_identity(view: &RowKeyView<'_>) -> Vec<u8> {
    let mut id = Vec::with_capacity(view.metric_id().len() + view.tag_bytes().len());
    id.extend_from_slice(view.metric_id());
    id.extend_from_slice(view.tag_bytes());
    id
}
