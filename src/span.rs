//! Span (spec §4.C) and the SeekableView iteration over it (spec §4.H).
//!
//! Following the "growable during scan, frozen afterwards" design note
//! (spec §9), mutation lives on `SpanBuilder`; callers only ever see a
//! finished, read-only `Span`.

use crate::error::{QueryError, Result};
use crate::rowkey::{series_identity, RowKeyView};
use crate::rowseq::{DataPoint, RowSeq, RowSeqIter};
use crate::scan::ScannedRow;
use crate::schema::Schema;

/// Accumulates RowSeqs for one series while a scan is in flight.
#[derive(Debug, Default)]
pub struct SpanBuilder {
    identity: Option<Vec<u8>>,
    rows: Vec<RowSeq>,
}

impl SpanBuilder {
    /// A fresh, empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one scanned row (spec §4.C `add_row`). A row that rebases
    /// cleanly onto the current RowSeq is merged into it; otherwise it
    /// starts a new RowSeq, provided its first timestamp still comes
    /// strictly after the Span's last one.
    pub fn add_row(&mut self, schema: &Schema, row: &ScannedRow) -> Result<()> {
        let view = RowKeyView::parse(*schema, &row.key)?;
        let identity = series_identity(&view);

        let Some(last_row) = self.rows.last() else {
            self.identity = Some(identity);
            self.rows.push(RowSeq::set_row(schema, row)?);
            return Ok(());
        };

        if self.identity.as_deref() != Some(identity.as_slice()) {
            return Err(QueryError::SeriesMismatch);
        }

        let last_ts_existing = last_row.last_timestamp();
        let mut merged = last_row.clone();
        if merged.add_row(schema, row).is_ok() {
            *self.rows.last_mut().expect("checked above") = merged;
            return Ok(());
        }

        let candidate = RowSeq::set_row(schema, row)?;
        if last_ts_existing >= candidate.timestamp(0) {
            return Err(QueryError::OutOfOrderRow);
        }
        self.rows.push(candidate);
        Ok(())
    }

    /// Finish the builder into a read-only `Span`. `None` if no row was
    /// ever added (a Span is never empty, spec §3).
    pub fn finish(self) -> Option<Span> {
        if self.rows.is_empty() {
            None
        } else {
            Some(Span { rows: self.rows })
        }
    }
}

/// A non-empty, time-ordered list of RowSeqs sharing one series identity.
#[derive(Debug)]
pub struct Span {
    rows: Vec<RowSeq>,
}

impl Span {
    /// Total point count across all RowSeqs.
    pub fn size(&self) -> usize {
        self.rows.iter().map(RowSeq::size).sum()
    }

    /// Number of RowSeqs backing this Span.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn locate(&self, i: usize) -> (usize, usize) {
        let mut remaining = i;
        for (row_idx, row) in self.rows.iter().enumerate() {
            if remaining < row.size() {
                return (row_idx, remaining);
            }
            remaining -= row.size();
        }
        panic!("Span index {i} out of bounds (size {})", self.size());
    }

    /// The absolute timestamp of point `i` (random access, spec §4.C).
    pub fn timestamp(&self, i: usize) -> u32 {
        let (row, offset) = self.locate(i);
        self.rows[row].timestamp(offset)
    }

    /// True if point `i` is integer-typed.
    pub fn is_integer(&self, i: usize) -> bool {
        let (row, offset) = self.locate(i);
        self.rows[row].is_integer(offset)
    }

    /// Point `i`'s value as an `i64`.
    pub fn long_value(&self, i: usize) -> i64 {
        let (row, offset) = self.locate(i);
        self.rows[row].long_value(offset)
    }

    /// Point `i`'s value as an `f64`.
    pub fn double_value(&self, i: usize) -> f64 {
        let (row, offset) = self.locate(i);
        self.rows[row].double_value(offset)
    }

    /// The series-identity row key view (any row in the Span carries it),
    /// used to read back the metric id / tag bytes a Span belongs to.
    pub fn identity_view(&self, schema: &Schema) -> RowKeyView<'_> {
        RowKeyView::parse(*schema, self.rows[0].key()).expect("Span rows were validated at insert time")
    }

    /// Index of the first RowSeq whose last timestamp is `>= target`; if
    /// every RowSeq ends before `target`, the last RowSeq's index (spec
    /// §4.C `seek`).
    pub fn seek_row(&self, target: u32) -> usize {
        self.rows
            .iter()
            .position(|r| r.last_timestamp() >= target)
            .unwrap_or(self.rows.len() - 1)
    }

    /// A forward + seekable iterator over this Span's points.
    pub fn iterator(&self) -> SpanIter<'_> {
        SpanIter {
            span: self,
            row_index: 0,
            inner: self.rows[0].internal_iterator(),
        }
    }
}

/// Forward-only + seekable iterator over a Span (spec §4.H).
pub struct SpanIter<'a> {
    span: &'a Span,
    row_index: usize,
    inner: RowSeqIter<'a>,
}

impl<'a> SpanIter<'a> {
    /// True if another point remains, in this RowSeq or a later one.
    pub fn has_next(&self) -> bool {
        self.inner.has_next() || self.row_index + 1 < self.span.rows.len()
    }

    /// Advance and return the next point, draining the current RowSeq
    /// first and only then moving to the next one.
    pub fn next(&mut self) -> Result<DataPoint> {
        if self.inner.has_next() {
            return self.inner.next();
        }
        if self.row_index + 1 < self.span.rows.len() {
            self.row_index += 1;
            self.inner = self.span.rows[self.row_index].internal_iterator();
            return self.inner.next();
        }
        Err(QueryError::Exhausted)
    }

    /// Reposition to the first point with `timestamp >= ts`.
    pub fn seek(&mut self, ts: u32) {
        self.row_index = self.span.seek_row(ts);
        self.inner = self.span.rows[self.row_index].internal_iterator();
        self.inner.seek(ts);
    }
}
