//! Scan executor (spec §4.F): scan-range construction and the row-to-Span
//! routing loop, driven through the consumed `Scanner`/`ScannerFactory`
//! collaborators (spec §6). The key-value store client itself stays out
//! of scope — these traits are the seam a real HBase-like client sits
//! behind.

use crate::error::{QueryError, Result};
use crate::rowkey::{series_identity, RowKeyView};
use crate::schema::Schema;
use crate::span::{Span, SpanBuilder};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error};

/// One cell within a scanned row: a 2-byte qualifier plus its value bytes.
#[derive(Debug, Clone)]
pub struct ScannedCell {
    /// The cell's 2-byte qualifier (big-endian: delta bits then flag bits).
    pub qualifier: u16,
    /// The cell's raw value bytes.
    pub value: Vec<u8>,
}

/// One row as returned by the store's scanner. Cells must be sorted by
/// qualifier ascending (the store's contract, spec §6).
#[derive(Debug, Clone)]
pub struct ScannedRow {
    /// The row's full key bytes.
    pub key: Vec<u8>,
    /// The row's cells, sorted by qualifier ascending.
    pub cells: Vec<ScannedCell>,
}

/// The store-scan collaborator this crate consumes (spec §6). `next_row`
/// is the only operation expected to block on network I/O (spec §5);
/// `close` must be idempotent.
pub trait Scanner {
    /// Fetch the next row, or `None` at end of scan.
    fn next_row(&mut self) -> Result<Option<ScannedRow>>;
    /// Release the scanner's resources. Safe to call more than once.
    fn close(&mut self) -> Result<()>;
}

/// Opens a `Scanner` over `[start_row, end_row)` restricted by
/// `filter_pattern`. This is the seam for "set column-family restriction,
/// attach the filter, open the scanner" (spec §4.F); the actual store
/// client lives behind it, outside this crate's scope.
pub trait ScannerFactory {
    /// Open a scanner over the given row-key range with the given filter.
    fn open(&self, start_row: &[u8], end_row: &[u8], filter_pattern: &str) -> Result<Box<dyn Scanner>>;
}

fn now_unix() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
        .min(u64::from(u32::MAX)) as u32
}

/// Compute `[start_row, end_row)` for a metric/time-range, padding both
/// ends by `MAX_TIMESPAN` since a point near the boundary may live in a
/// row whose `base_time` starts earlier (spec §4.F).
///
/// When `end_time` is `None` ("now" was never set at planning time), this
/// resolves "now" *here*, at scan-range-build time, not when the `Query`
/// was constructed — the documented Open-Question resolution (spec §9).
pub fn build_scan_range(schema: &Schema, metric_id: &[u8], start_time: u32, end_time: Option<u32>) -> (Vec<u8>, Vec<u8>) {
    build_scan_range_at(schema, metric_id, start_time, end_time, now_unix())
}

/// `build_scan_range` with an explicit "now" value, for deterministic tests.
pub fn build_scan_range_at(
    schema: &Schema,
    metric_id: &[u8],
    start_time: u32,
    end_time: Option<u32>,
    now: u32,
) -> (Vec<u8>, Vec<u8>) {
    let max_timespan = schema.max_timespan();
    let start_bound = start_time.saturating_sub(max_timespan);

    let end_bound = match end_time {
        Some(0) => u32::MAX,
        Some(t) => t.saturating_add(max_timespan),
        None => now.saturating_add(max_timespan),
    };

    let mut start_row = Vec::with_capacity(metric_id.len() + 4);
    start_row.extend_from_slice(metric_id);
    start_row.extend_from_slice(&start_bound.to_be_bytes());

    let mut end_row = Vec::with_capacity(metric_id.len() + 4);
    end_row.extend_from_slice(metric_id);
    end_row.extend_from_slice(&end_bound.to_be_bytes());

    (start_row, end_row)
}

/// RAII guard ensuring `Scanner::close` runs on every exit path —
/// success, error, or early return — matching the scoped-acquisition
/// cancellation contract in spec §5.
struct ScanGuard<'s> {
    scanner: &'s mut dyn Scanner,
    closed: bool,
}

impl<'s> ScanGuard<'s> {
    fn new(scanner: &'s mut dyn Scanner) -> Self {
        Self {
            scanner,
            closed: false,
        }
    }

    fn finish(mut self) -> Result<()> {
        self.closed = true;
        self.scanner.close()
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.scanner.close() {
                error!(error = %e, "scanner close failed during drop");
            }
        }
    }
}

/// Drive an already-open scanner, routing each row to the Span it
/// belongs to (spec §4.F steps 1-3). Returns Spans keyed by series
/// identity, sorted ascending by that identity (matching the "time-
/// agnostic comparator" order the group assembler expects, spec §4.G).
pub fn scan(schema: &Schema, scanner: &mut dyn Scanner, metric_id: &[u8]) -> Result<Vec<(Vec<u8>, Span)>> {
    let mut guard = ScanGuard::new(scanner);
    let mut builders: HashMap<Vec<u8>, SpanBuilder> = HashMap::new();

    loop {
        let row = match guard.scanner.next_row() {
            Ok(Some(row)) => row,
            Ok(None) => break,
            Err(e) => return Err(e),
        };

        let view = RowKeyView::parse(*schema, &row.key)?;
        if view.metric_id() != metric_id {
            return Err(QueryError::ScannerInvariant(
                "scanner returned a row outside the requested metric range".to_string(),
            ));
        }

        let identity = series_identity(&view);
        builders
            .entry(identity)
            .or_insert_with(SpanBuilder::new)
            .add_row(schema, &row)?;
    }

    guard.finish()?;

    let mut spans: Vec<(Vec<u8>, Span)> = builders
        .into_iter()
        .filter_map(|(identity, builder)| builder.finish().map(|span| (identity, span)))
        .collect();
    spans.sort_by(|(a, _), (b, _)| a.cmp(b));

    debug!(span_count = spans.len(), "scan complete");
    Ok(spans)
}

/// Full scan-executor entry point: compute the range, open the scanner
/// through `factory` with `filter_pattern` attached, then drive it.
pub fn plan_and_scan(
    schema: &Schema,
    factory: &dyn ScannerFactory,
    metric_id: &[u8],
    start_time: u32,
    end_time: Option<u32>,
    filter_pattern: &str,
) -> Result<Vec<(Vec<u8>, Span)>> {
    let (start_row, end_row) = build_scan_range(schema, metric_id, start_time, end_time);
    let mut scanner = factory.open(&start_row, &end_row, filter_pattern)?;
    scan(schema, scanner.as_mut(), metric_id)
}


#[cfg(test)]
mod tests {
    use super::testutil::FakeScanner;
    use super::*;
    use crate::rowkey::encode;

    fn schema() -> Schema {
        Schema::new(3, 3, 3, 4).unwrap()
    }

    fn qualifier(schema: &Schema, delta: u16) -> u16 {
        delta << schema.flag_bits()
    }

    fn cell(schema: &Schema, delta: u16, value: i64) -> ScannedCell {
        ScannedCell {
            qualifier: qualifier(schema, delta),
            value: value.to_be_bytes().to_vec(),
        }
    }

    #[test]
    fn scan_range_pads_by_max_timespan() {
        let schema = schema();
        let (start, end) = build_scan_range_at(&schema, &[0, 0, 1], 1000, Some(2000), 0);
        assert_eq!(&start[..3], &[0, 0, 1]);
        assert_eq!(u32::from_be_bytes(start[3..].try_into().unwrap()), 0); // saturated at 0
        assert_eq!(u32::from_be_bytes(end[3..].try_into().unwrap()), 2000 + 4096);
    }

    #[test]
    fn scan_range_end_time_zero_saturates_to_max() {
        let schema = schema();
        let (_, end) = build_scan_range_at(&schema, &[0, 0, 1], 1000, Some(0), 0);
        assert_eq!(u32::from_be_bytes(end[3..].try_into().unwrap()), u32::MAX);
    }

    #[test]
    fn scan_range_resolves_now_lazily_when_end_unset() {
        let schema = schema();
        let (_, end_a) = build_scan_range_at(&schema, &[0, 0, 1], 1000, None, 10_000);
        let (_, end_b) = build_scan_range_at(&schema, &[0, 0, 1], 1000, None, 20_000);
        assert_ne!(end_a, end_b);
    }

    #[test]
    fn empty_scan_yields_no_spans() {
        let schema = schema();
        let mut scanner = FakeScanner::new(vec![]);
        let spans = scan(&schema, &mut scanner, &[0, 0, 1]).unwrap();
        assert!(spans.is_empty());
        assert!(scanner.closed);
    }

    #[test]
    fn single_row_becomes_one_span() {
        let schema = schema();
        let key = encode(&schema, &[0, 0, 1], 1024, &[(&[0, 0, 2], &[0, 0, 5])]);
        let row = ScannedRow {
            key,
            cells: vec![cell(&schema, 16, 1), cell(&schema, 32, 2), cell(&schema, 48, 3)],
        };
        let mut scanner = FakeScanner::new(vec![row]);
        let spans = scan(&schema, &mut scanner, &[0, 0, 1]).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].1.size(), 3);
    }

    #[test]
    fn mismatched_metric_prefix_is_a_scanner_invariant_violation() {
        let schema = schema();
        let key = encode(&schema, &[9, 9, 9], 0, &[]);
        let row = ScannedRow {
            key,
            cells: vec![cell(&schema, 0, 1)],
        };
        let mut scanner = FakeScanner::new(vec![row]);
        let err = scan(&schema, &mut scanner, &[0, 0, 1]).unwrap_err();
        assert!(matches!(err, QueryError::ScannerInvariant(_)));
        assert!(scanner.closed, "scanner must still be closed on error");
    }

    #[test]
    fn two_series_become_two_spans_sorted_by_identity() {
        let schema = schema();
        let key_a = encode(&schema, &[0, 0, 1], 0, &[(&[0, 0, 2], &[0, 0, 9])]);
        let key_b = encode(&schema, &[0, 0, 1], 0, &[(&[0, 0, 2], &[0, 0, 1])]);
        let rows = vec![
            ScannedRow {
                key: key_a,
                cells: vec![cell(&schema, 0, 1)],
            },
            ScannedRow {
                key: key_b,
                cells: vec![cell(&schema, 0, 2)],
            },
        ];
        let mut scanner = FakeScanner::new(rows);
        let spans = scan(&schema, &mut scanner, &[0, 0, 1]).unwrap();
        assert_eq!(spans.len(), 2);
        assert!(spans[0].0 < spans[1].0, "spans must be sorted ascending by series identity");
    }
}
