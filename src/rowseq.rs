//! RowSeq (spec §4.B): the parsed contents of one scanned row — a base
//! time plus an ordered, delta-encoded sequence of points.

use crate::error::{QueryError, Result};
use crate::rowkey::RowKeyView;
use crate::schema::Schema;
use crate::scan::ScannedRow;

/// Bit 0 of the qualifier's flag bits: 0 = integer value, 1 = float value.
const FLOAT_FLAG: u8 = 0b1;

const VALUE_WIDTH: usize = 8;

/// A single point's decoded value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointValue {
    /// A 64-bit integer sample.
    Integer(i64),
    /// A 64-bit floating point sample.
    Float(f64),
}

impl PointValue {
    /// True if this is an integer-typed sample.
    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Integer(_))
    }

    /// The value as an `i64`, truncating a float sample if necessary.
    #[allow(clippy::cast_possible_truncation)]
    pub fn long_value(&self) -> i64 {
        match *self {
            Self::Integer(v) => v,
            Self::Float(v) => v as i64,
        }
    }

    /// The value as an `f64`, widening an integer sample if necessary.
    #[allow(clippy::cast_precision_loss)]
    pub fn double_value(&self) -> f64 {
        match *self {
            Self::Integer(v) => v as f64,
            Self::Float(v) => v,
        }
    }
}

/// One materialised point: a timestamp plus its decoded value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPoint {
    timestamp: u32,
    value: PointValue,
}

impl DataPoint {
    /// The point's absolute timestamp (seconds since epoch).
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// True if the point's value is integer-typed.
    pub fn is_integer(&self) -> bool {
        self.value.is_integer()
    }

    /// The value as an `i64`.
    pub fn long_value(&self) -> i64 {
        self.value.long_value()
    }

    /// The value as an `f64`.
    pub fn double_value(&self) -> f64 {
        self.value.double_value()
    }
}

#[derive(Debug, Clone, Copy)]
struct PackedPoint {
    delta: u16,
    value: PointValue,
}

/// Split a 2-byte cell qualifier into `(delta, flags)` per `schema.flag_bits()`.
fn split_qualifier(schema: &Schema, qualifier: u16) -> (u16, u8) {
    let flag_bits = schema.flag_bits();
    let flags = (qualifier & ((1u16 << flag_bits) - 1)) as u8;
    let delta = qualifier >> flag_bits;
    (delta, flags)
}

fn decode_value(flags: u8, bytes: &[u8]) -> Result<PointValue> {
    if bytes.len() != VALUE_WIDTH {
        return Err(QueryError::MalformedValue {
            expected: VALUE_WIDTH,
            actual: bytes.len(),
        });
    }
    let raw: [u8; VALUE_WIDTH] = bytes.try_into().expect("checked above");
    if flags & FLOAT_FLAG == 0 {
        Ok(PointValue::Integer(i64::from_be_bytes(raw)))
    } else {
        Ok(PointValue::Float(f64::from_be_bytes(raw)))
    }
}

/// The parsed contents of one scanned row.
#[derive(Debug, Clone)]
pub struct RowSeq {
    key: Vec<u8>,
    base_time: u32,
    points: Vec<PackedPoint>,
}

impl RowSeq {
    /// Initialise a RowSeq from a freshly scanned row. The row must carry
    /// at least one cell, and cells must be sorted by qualifier ascending
    /// (the store's contract, spec §6) so deltas come out strictly
    /// increasing.
    pub fn set_row(schema: &Schema, row: &ScannedRow) -> Result<Self> {
        if row.cells.is_empty() {
            return Err(QueryError::ScannerInvariant(
                "scanned row had zero cells".to_string(),
            ));
        }
        let view = RowKeyView::parse(*schema, &row.key)?;
        let base_time = view.base_time();

        let mut points = Vec::with_capacity(row.cells.len());
        let mut last_delta: Option<u16> = None;
        for cell in &row.cells {
            let (delta, flags) = split_qualifier(schema, cell.qualifier);
            if let Some(prev) = last_delta {
                if delta <= prev {
                    return Err(QueryError::ScannerInvariant(
                        "cells were not strictly increasing by qualifier".to_string(),
                    ));
                }
            }
            last_delta = Some(delta);
            let value = decode_value(flags, &cell.value)?;
            points.push(PackedPoint { delta, value });
        }

        Ok(Self {
            key: row.key.clone(),
            base_time,
            points,
        })
    }

    /// Append the cells of `row` into this RowSeq, rebasing deltas onto
    /// this RowSeq's `base_time`. Callers must check
    /// [`RowSeq::can_time_delta_fit`] first; violating that (or supplying
    /// a row whose `base_time` is not strictly greater than this one's) is
    /// a programming error and returns [`QueryError::OutOfOrderRow`].
    pub fn add_row(&mut self, schema: &Schema, row: &ScannedRow) -> Result<()> {
        let view = RowKeyView::parse(*schema, &row.key)?;
        let other_base = view.base_time();
        if other_base <= self.base_time {
            return Err(QueryError::OutOfOrderRow);
        }
        let rebase = other_base - self.base_time;

        let mut last_delta = self.points.last().map(|p| p.delta);
        let mut appended = Vec::with_capacity(row.cells.len());
        for cell in &row.cells {
            let (delta, flags) = split_qualifier(schema, cell.qualifier);
            let merged = rebase
                .checked_add(u32::from(delta))
                .filter(|&m| m < schema.max_timespan())
                .ok_or(QueryError::OutOfOrderRow)?;
            let merged_delta = merged as u16;
            if let Some(prev) = last_delta {
                if merged_delta <= prev {
                    return Err(QueryError::OutOfOrderRow);
                }
            }
            last_delta = Some(merged_delta);
            let value = decode_value(flags, &cell.value)?;
            appended.push(PackedPoint {
                delta: merged_delta,
                value,
            });
        }
        self.points.extend(appended);
        Ok(())
    }

    /// True if a delta of `raw_delta` seconds (already rebased) still fits
    /// in this schema's delta field.
    pub fn can_time_delta_fit(schema: &Schema, raw_delta: u32) -> bool {
        raw_delta < schema.max_timespan()
    }

    /// The retained row-key bytes, used for series-identity checks.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// This RowSeq's base time.
    pub fn base_time(&self) -> u32 {
        self.base_time
    }

    /// Number of points.
    pub fn size(&self) -> usize {
        self.points.len()
    }

    /// The absolute timestamp of point `i`.
    pub fn timestamp(&self, i: usize) -> u32 {
        self.base_time + u32::from(self.points[i].delta)
    }

    /// The last point's absolute timestamp.
    pub fn last_timestamp(&self) -> u32 {
        self.timestamp(self.size() - 1)
    }

    /// True if point `i` is integer-typed.
    pub fn is_integer(&self, i: usize) -> bool {
        self.points[i].value.is_integer()
    }

    /// Point `i`'s value as an `i64`.
    pub fn long_value(&self, i: usize) -> i64 {
        self.points[i].value.long_value()
    }

    /// Point `i`'s value as an `f64`.
    pub fn double_value(&self, i: usize) -> f64 {
        self.points[i].value.double_value()
    }

    fn point(&self, i: usize) -> DataPoint {
        DataPoint {
            timestamp: self.timestamp(i),
            value: self.points[i].value,
        }
    }

    /// A forward + seekable iterator over this RowSeq's points.
    pub fn internal_iterator(&self) -> RowSeqIter<'_> {
        RowSeqIter { row: self, idx: 0 }
    }
}

/// Forward-only + seekable iterator over one RowSeq (spec §4.H).
pub struct RowSeqIter<'a> {
    row: &'a RowSeq,
    idx: usize,
}

impl<'a> RowSeqIter<'a> {
    /// True if another point remains.
    pub fn has_next(&self) -> bool {
        self.idx < self.row.size()
    }

    /// Advance and return the next point, failing with `Exhausted` if
    /// none remains.
    pub fn next(&mut self) -> Result<DataPoint> {
        if !self.has_next() {
            return Err(QueryError::Exhausted);
        }
        let point = self.row.point(self.idx);
        self.idx += 1;
        Ok(point)
    }

    /// Advance to the first point with `timestamp >= ts`. If every point
    /// ends before `ts`, the iterator becomes exhausted.
    pub fn seek(&mut self, ts: u32) {
        self.idx = (0..self.row.size())
            .find(|&i| self.row.timestamp(i) >= ts)
            .unwrap_or(self.row.size());
    }
}
