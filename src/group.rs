//! Group & aggregate assembler (spec §4.G): partition Spans into
//! SpanGroups by the concatenated tag-value-ids of the query's group-by
//! tags, attaching the aggregator and rate flag unchanged.

use crate::ids::TagNameId;
use crate::schema::Schema;
use crate::span::Span;
use std::collections::HashMap;
use tracing::info;

/// An opaque handle into an external aggregator-function catalogue (spec
/// §6). This crate never interprets it, only threads it through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregator(pub u32);

/// A set of Spans assigned the same group key.
#[derive(Debug)]
pub struct SpanGroup {
    key: Vec<u8>,
    spans: Vec<Span>,
    start_time: u32,
    end_time: u32,
    aggregator: Aggregator,
    rate: bool,
}

impl SpanGroup {
    /// The group key: concatenated `value_id`s for each group-by tag, in
    /// sorted-name order. Empty when the query had no `group_bys`.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// The Spans assigned to this group.
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// The query's requested start time bound.
    pub fn start_time(&self) -> u32 {
        self.start_time
    }

    /// The query's requested end time bound.
    pub fn end_time(&self) -> u32 {
        self.end_time
    }

    /// The opaque aggregator handle carried from the query.
    pub fn aggregator(&self) -> Aggregator {
        self.aggregator
    }

    /// Whether downstream consumers should rate-convert this group.
    pub fn rate(&self) -> bool {
        self.rate
    }
}

/// Assemble scanned Spans into SpanGroups (spec §4.G).
///
/// `spans` pairs each Span with its series-identity bytes, as produced by
/// [`crate::scan::scan`]; the identity is only used for the dropped-span
/// log line, the grouping itself reads tag values straight out of each
/// Span's row key.
pub fn assemble(
    schema: &Schema,
    spans: Vec<(Vec<u8>, Span)>,
    group_bys: &[TagNameId],
    start_time: u32,
    end_time: u32,
    aggregator: Aggregator,
    rate: bool,
) -> Vec<SpanGroup> {
    if spans.is_empty() {
        return Vec::new();
    }

    if group_bys.is_empty() {
        let all = spans.into_iter().map(|(_, span)| span).collect();
        return vec![SpanGroup {
            key: Vec::new(),
            spans: all,
            start_time,
            end_time,
            aggregator,
            rate,
        }];
    }

    let mut groups: HashMap<Vec<u8>, Vec<Span>> = HashMap::new();
    for (identity, span) in spans {
        match group_key(schema, &span, group_bys) {
            Some(key) => groups.entry(key).or_default().push(span),
            None => {
                info!(identity = ?identity, "dropping span missing a group-by tag");
            }
        }
    }

    let mut result: Vec<SpanGroup> = groups
        .into_iter()
        .map(|(key, spans)| SpanGroup {
            key,
            spans,
            start_time,
            end_time,
            aggregator,
            rate,
        })
        .collect();
    result.sort_by(|a, b| a.key.cmp(&b.key));
    result
}

/// Extract this Span's group key, or `None` if any `group_bys` name is
/// absent from its tags (the Span must then be dropped). Both the row
/// key's tag block and `group_bys` are sorted ascending by name_id, so a
/// two-pointer merge suffices instead of a scan per group-by name (the
/// "quadratic group extraction" design note, spec §9).
fn group_key(schema: &Schema, span: &Span, group_bys: &[TagNameId]) -> Option<Vec<u8>> {
    let view = span.identity_view(schema);
    let mut key = Vec::with_capacity(group_bys.len() * schema.tag_value_width());

    let mut pairs = view.tag_pairs().peekable();
    for name_id in group_bys {
        loop {
            match pairs.peek() {
                Some((tag_name, _)) if *tag_name < name_id.as_bytes() => {
                    pairs.next();
                }
                Some((tag_name, tag_value)) if *tag_name == name_id.as_bytes() => {
                    key.extend_from_slice(tag_value);
                    pairs.next();
                    break;
                }
                _ => return None,
            }
        }
    }
    Some(key)
}
