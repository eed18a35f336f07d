//! `tsdb_query_core` — the time-series query core of a metrics database
//! whose point storage lives in a wide-column key-value store.
//!
//! Given a descriptive query (metric name, tag predicates, time range,
//! optional grouping, optional rate conversion, aggregator handle) this
//! crate plans and drives a server-side row scan and materialises the
//! result into grouped, time-ordered point streams. It does not talk to a
//! real store, interner, or aggregator catalogue — those are consumed
//! collaborators behind the traits in [`scan`] and [`ids`] — and it does
//! not write points, migrate schema, or expose an HTTP/CLI surface.
//!
//! # Architecture
//!
//! Leaf to root:
//! - [`rowkey`]: the fixed binary row-key layout codec.
//! - [`rowseq`]: one scanned row parsed into a delta-encoded point sequence.
//! - [`span`]: a Span of RowSeqs sharing one series identity, plus its
//!   seekable iterator.
//! - [`query`]: the planner that normalises a request into literal and
//!   group-by tags and drives `run()`.
//! - `query`'s private `filter` submodule (spec §4.E) compiles the tag
//!   requirements into a server-side regular expression.
//! - [`scan`]: scan-range construction and the row-to-Span routing loop.
//! - [`group`]: partitions scanned Spans into SpanGroups.
//!
//! # Example
//!
//! ```
//! use tsdb_query_core::{Aggregator, Query, Schema, TagSpec};
//! use tsdb_query_core::ids::{MetricId, MetricResolver, TagNameId, TagNameResolver, TagValueId, TagValueResolver};
//! use tsdb_query_core::scan::{Scanner, ScannerFactory, ScannedRow};
//!
//! // A three-byte-wide identifier space that resolves every name to a
//! // fixed stand-in id; a real caller supplies the actual intern service.
//! struct FixedWidthIds;
//! impl MetricResolver for FixedWidthIds {
//!     fn id(&self, _name: &str) -> tsdb_query_core::Result<MetricId> {
//!         Ok(MetricId::new(&[0, 0, 1]))
//!     }
//!     fn width(&self) -> u8 { 3 }
//! }
//! impl TagNameResolver for FixedWidthIds {
//!     fn id(&self, _name: &str) -> tsdb_query_core::Result<TagNameId> {
//!         Ok(TagNameId::new(&[0, 0, 2]))
//!     }
//!     fn width(&self) -> u8 { 3 }
//! }
//! impl TagValueResolver for FixedWidthIds {
//!     fn id(&self, _value: &str) -> tsdb_query_core::Result<TagValueId> {
//!         Ok(TagValueId::new(&[0, 0, 5]))
//!     }
//!     fn width(&self) -> u8 { 3 }
//! }
//!
//! struct EmptyFactory;
//! impl ScannerFactory for EmptyFactory {
//!     fn open(&self, _s: &[u8], _e: &[u8], _f: &str) -> tsdb_query_core::Result<Box<dyn Scanner>> {
//!         struct NoRows;
//!         impl Scanner for NoRows {
//!             fn next_row(&mut self) -> tsdb_query_core::Result<Option<ScannedRow>> {
//!                 Ok(None)
//!             }
//!             fn close(&mut self) -> tsdb_query_core::Result<()> {
//!                 Ok(())
//!             }
//!         }
//!         Ok(Box::new(NoRows))
//!     }
//! }
//!
//! let schema = Schema::new(3, 3, 3, 4).unwrap();
//! let ids = FixedWidthIds;
//! let mut query = Query::new();
//! query.set_start_time(1_000).unwrap();
//! query
//!     .set_time_series(
//!         "requests",
//!         &[TagSpec { name: "host".to_string(), value: "web01".to_string() }],
//!         Aggregator(0),
//!         false,
//!         &ids,
//!         &ids,
//!         &ids,
//!     )
//!     .unwrap();
//! let groups = query.run(&schema, &EmptyFactory).unwrap();
//! assert!(groups.is_empty());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::similar_names)]

pub mod error;
pub mod group;
pub mod ids;
pub mod query;
pub mod rowkey;
pub mod rowseq;
pub mod scan;
pub mod schema;
pub mod span;

pub use error::{QueryError, Result};
pub use group::{Aggregator, SpanGroup};
pub use query::{Query, TagSpec};
pub use rowseq::{DataPoint, PointValue};
pub use schema::Schema;
pub use span::Span;
