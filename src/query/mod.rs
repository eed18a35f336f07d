//! Query planner (spec §4.D) and the `Query` value that ties planning,
//! scanning, filtering and grouping together (`run()`, spec §6).

mod filter;

use crate::error::{QueryError, Result};
use crate::group::{self, Aggregator, SpanGroup};
use crate::ids::{MetricId, MetricResolver, TagNameId, TagNameResolver, TagValueId, TagValueResolver};
use crate::scan;
use crate::schema::Schema;
use std::collections::HashMap;

/// One pre-resolution tag the caller passes to [`Query::set_time_series`]:
/// a name and a raw value string, classified per the rules in spec §4.D
/// before any id resolution happens.
#[derive(Debug, Clone)]
pub struct TagSpec {
    /// The tag name, as a string (resolved against [`TagNameResolver`]).
    pub name: String,
    /// The raw value syntax: a literal value, `"*"`, or a `'|'`-joined
    /// whitelist.
    pub value: String,
}

enum TagKind {
    Literal,
    GroupByUnbounded,
    GroupByWhitelist(Vec<String>),
}

fn classify_tag_value(value: &str) -> TagKind {
    if value == "*" {
        return TagKind::GroupByUnbounded;
    }
    if let Some(pos) = value.find('|') {
        if pos >= 1 {
            let parts: Vec<String> = value.split('|').map(str::to_string).collect();
            if parts.len() >= 2 {
                return TagKind::GroupByWhitelist(parts);
            }
        }
    }
    TagKind::Literal
}

/// A single-shot, single-threaded query value (spec §3 "Query", §5
/// lifecycle). Mutated only by its setters; `run()` consumes it.
#[derive(Debug, Default)]
pub struct Query {
    start_time: Option<u32>,
    end_time: Option<u32>,
    metric_id: Option<MetricId>,
    literal_tags: Vec<(TagNameId, TagValueId)>,
    group_bys: Vec<TagNameId>,
    group_by_values: HashMap<TagNameId, Vec<TagValueId>>,
    aggregator: Option<Aggregator>,
    rate: bool,
}

impl Query {
    /// A freshly constructed, unconfigured query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the query's start time. Rejects `0` (outside `[1, 2^32)`,
    /// `InvalidTimestamp`) and an inversion against an already-set end
    /// time (`TimeRangeInvalid`).
    pub fn set_start_time(&mut self, start: u32) -> Result<()> {
        if start == 0 {
            return Err(QueryError::InvalidTimestamp(start));
        }
        if let Some(end) = self.end_time {
            if start >= end {
                return Err(QueryError::TimeRangeInvalid { start, end });
            }
        }
        self.start_time = Some(start);
        Ok(())
    }

    /// Set the query's end time. Rejects `0` and an inversion against an
    /// already-set start time. If never called, `run()` resolves "now"
    /// lazily at scan-range-build time (spec §9 Open Question).
    pub fn set_end_time(&mut self, end: u32) -> Result<()> {
        if end == 0 {
            return Err(QueryError::InvalidTimestamp(end));
        }
        if let Some(start) = self.start_time {
            if start >= end {
                return Err(QueryError::TimeRangeInvalid { start, end });
            }
        }
        self.end_time = Some(end);
        Ok(())
    }

    /// Resolve `metric` and `tags`, partitioning tags into literal matches
    /// and group-bys (spec §4.D). `name_id`s end up sorted ascending in
    /// both `literal_tags` and `group_bys`, and invariant I1 (no overlap)
    /// is asserted.
    #[allow(clippy::too_many_arguments)]
    pub fn set_time_series(
        &mut self,
        metric: &str,
        tags: &[TagSpec],
        aggregator: Aggregator,
        rate: bool,
        metrics: &dyn MetricResolver,
        tag_names: &dyn TagNameResolver,
        tag_values: &dyn TagValueResolver,
    ) -> Result<()> {
        let metric_id = metrics.id(metric)?;

        let mut literal_tags = Vec::new();
        let mut group_bys = Vec::new();
        let mut group_by_values = HashMap::new();

        for tag in tags {
            let name_id = tag_names.id(&tag.name)?;
            match classify_tag_value(&tag.value) {
                TagKind::Literal => {
                    let value_id = tag_values.id(&tag.value)?;
                    literal_tags.push((name_id, value_id));
                }
                TagKind::GroupByUnbounded => {
                    group_bys.push(name_id);
                }
                TagKind::GroupByWhitelist(values) => {
                    let mut ids = Vec::with_capacity(values.len());
                    for value in &values {
                        ids.push(tag_values.id(value)?);
                    }
                    group_by_values.insert(name_id.clone(), ids);
                    group_bys.push(name_id);
                }
            }
        }

        literal_tags.sort_by(|a, b| a.0.cmp(&b.0));
        group_bys.sort();
        for (name_id, _) in &literal_tags {
            assert!(
                !group_bys.contains(name_id),
                "tag name_id {name_id:?} present in both literal and group-by sets (invariant I1 violated)"
            );
        }

        self.metric_id = Some(metric_id);
        self.literal_tags = literal_tags;
        self.group_bys = group_bys;
        self.group_by_values = group_by_values;
        self.aggregator = Some(aggregator);
        self.rate = rate;
        Ok(())
    }

    /// Execute the plan: compile the filter, scan, and assemble groups.
    /// Consumes `self`: a `Query` is single-shot (spec §5).
    pub fn run(self, schema: &Schema, factory: &dyn scan::ScannerFactory) -> Result<Vec<SpanGroup>> {
        let metric_id = self
            .metric_id
            .ok_or(QueryError::QueryNotConfigured("set_time_series was never called"))?;
        let start_time = self
            .start_time
            .ok_or(QueryError::QueryNotConfigured("set_start_time was never called"))?;

        let pattern = filter::build_filter_pattern(
            schema,
            &self.literal_tags,
            &self.group_bys,
            &self.group_by_values,
        )?;

        let spans = scan::plan_and_scan(
            schema,
            factory,
            metric_id.as_bytes(),
            start_time,
            self.end_time,
            &pattern,
        )?;

        let aggregator = self
            .aggregator
            .ok_or(QueryError::QueryNotConfigured("set_time_series was never called"))?;

        Ok(group::assemble(
            schema,
            spans,
            &self.group_bys,
            start_time,
            self.end_time.unwrap_or(start_time),
            aggregator,
            self.rate,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::testutil::FakeInterner;
    use crate::rowkey::encode;
    use crate::scan::testutil::FakeScanner;
    use crate::scan::{Scanner, ScannedCell, ScannedRow};

    struct FixedFactory {
        rows: std::cell::RefCell<Option<Vec<ScannedRow>>>,
    }

    impl scan::ScannerFactory for FixedFactory {
        fn open(&self, _start: &[u8], _end: &[u8], _filter: &str) -> Result<Box<dyn Scanner>> {
            let rows = self.rows.borrow_mut().take().unwrap_or_default();
            Ok(Box::new(FakeScanner::new(rows)))
        }
    }

    fn schema() -> Schema {
        Schema::new(3, 3, 3, 4).unwrap()
    }

    #[test]
    fn rejects_inverted_time_range() {
        let mut query = Query::new();
        query.set_start_time(2000).unwrap();
        assert!(matches!(
            query.set_end_time(1000),
            Err(QueryError::TimeRangeInvalid { .. })
        ));
    }

    #[test]
    fn rejects_zero_timestamp() {
        let mut query = Query::new();
        assert!(matches!(
            query.set_start_time(0),
            Err(QueryError::InvalidTimestamp(0))
        ));
    }

    #[test]
    fn literal_only_end_to_end_scenario_1() {
        let schema = schema();
        let interner = FakeInterner::new(3);
        interner.seed("requests", 1);
        interner.seed("host", 2);
        interner.seed("web01", 5);

        let mut query = Query::new();
        query.set_start_time(1000).unwrap();
        query.set_end_time(2000).unwrap();
        query
            .set_time_series(
                "requests",
                &[TagSpec {
                    name: "host".to_string(),
                    value: "web01".to_string(),
                }],
                Aggregator(0),
                false,
                &interner,
                &interner,
                &interner,
            )
            .unwrap();

        let key = encode(&schema, &[0, 0, 1], 1024, &[(&[0, 0, 2], &[0, 0, 5])]);
        let row = ScannedRow {
            key,
            cells: vec![
                ScannedCell {
                    qualifier: 16 << schema.flag_bits(),
                    value: 1i64.to_be_bytes().to_vec(),
                },
                ScannedCell {
                    qualifier: 32 << schema.flag_bits(),
                    value: 2i64.to_be_bytes().to_vec(),
                },
                ScannedCell {
                    qualifier: 48 << schema.flag_bits(),
                    value: 3i64.to_be_bytes().to_vec(),
                },
            ],
        };
        let factory = FixedFactory {
            rows: std::cell::RefCell::new(Some(vec![row])),
        };

        let groups = query.run(&schema, &factory).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].spans().len(), 1);
        assert_eq!(groups[0].spans()[0].size(), 3);
    }

    #[test]
    fn empty_query_scenario_6() {
        let schema = schema();
        let interner = FakeInterner::new(3);
        let mut query = Query::new();
        query.set_start_time(1000).unwrap();
        query
            .set_time_series("requests", &[], Aggregator(0), false, &interner, &interner, &interner)
            .unwrap();
        let factory = FixedFactory {
            rows: std::cell::RefCell::new(Some(vec![])),
        };
        let groups = query.run(&schema, &factory).unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn run_without_configuration_is_rejected() {
        let schema = schema();
        let query = Query::new();
        let factory = FixedFactory {
            rows: std::cell::RefCell::new(Some(vec![])),
        };
        assert!(matches!(
            query.run(&schema, &factory),
            Err(QueryError::QueryNotConfigured(_))
        ));
    }
}
