//! Filter builder (spec §4.E): compile a query's resolved tag
//! requirements into a single server-side regular expression matching row
//! keys whose tag section is a superset of those requirements.
//!
//! The source template is written in a Java-regex dialect (`\Q...\E`
//! quoting, `(?s)` DOTALL over a byte-as-char comparator). Rust's `regex`
//! crate has no quote-escape sequence, so each required byte is emitted as
//! a `\xHH` literal instead, and DOTALL is paired with `-u` (disable
//! Unicode mode) so `.` matches one arbitrary byte rather than one UTF-8
//! scalar value — the same matching semantics, expressed the way
//! `regex::bytes::Regex` actually supports them.

use crate::error::{QueryError, Result};
use crate::ids::{TagNameId, TagValueId};
use crate::schema::Schema;
use std::collections::HashMap;
use tracing::debug;

fn push_hex_bytes(pattern: &mut String, bytes: &[u8]) {
    for b in bytes {
        pattern.push_str(&format!("\\x{b:02x}"));
    }
}

fn push_any_tag_pair_star(pattern: &mut String, tag_pair_width: usize) {
    pattern.push_str(&format!("(?:.{{{tag_pair_width}}})*"));
}

/// One merged, ordered filter requirement (spec §4.E merge walk).
enum Requirement<'a> {
    Literal {
        name_id: &'a TagNameId,
        value_id: &'a TagValueId,
    },
    GroupByUnbounded {
        name_id: &'a TagNameId,
    },
    GroupByWhitelist {
        name_id: &'a TagNameId,
        values: &'a [TagValueId],
    },
}

/// Two-pointer merge of `literal_tags` and `group_bys` (both assumed
/// sorted ascending by `name_id`, per invariant I2) into one ordered
/// requirement list. An equal `name_id` on both sides is invariant I1
/// having been violated upstream, a programming error.
fn merge_requirements<'a>(
    literal_tags: &'a [(TagNameId, TagValueId)],
    group_bys: &'a [TagNameId],
    group_by_values: &'a HashMap<TagNameId, Vec<TagValueId>>,
) -> Vec<Requirement<'a>> {
    let mut out = Vec::with_capacity(literal_tags.len() + group_bys.len());
    let mut li = literal_tags.iter().peekable();
    let mut gi = group_bys.iter().peekable();

    loop {
        match (li.peek(), gi.peek()) {
            (Some((ln, _)), Some(gn)) => {
                assert!(
                    ln != gn,
                    "name_id {ln:?} present in both literal_tags and group_bys (invariant I1 violated)"
                );
                if ln < gn {
                    let (name_id, value_id) = li.next().unwrap();
                    out.push(Requirement::Literal { name_id, value_id });
                } else {
                    let name_id = gi.next().unwrap();
                    out.push(classify_group_by(name_id, group_by_values));
                }
            }
            (Some(_), None) => {
                let (name_id, value_id) = li.next().unwrap();
                out.push(Requirement::Literal { name_id, value_id });
            }
            (None, Some(_)) => {
                let name_id = gi.next().unwrap();
                out.push(classify_group_by(name_id, group_by_values));
            }
            (None, None) => break,
        }
    }
    out
}

fn classify_group_by<'a>(
    name_id: &'a TagNameId,
    group_by_values: &'a HashMap<TagNameId, Vec<TagValueId>>,
) -> Requirement<'a> {
    match group_by_values.get(name_id) {
        Some(values) => Requirement::GroupByWhitelist { name_id, values },
        None => Requirement::GroupByUnbounded { name_id },
    }
}

/// Build the filter pattern for the given resolved, sorted requirements.
///
/// `literal_tags` and `group_bys` must already be sorted ascending by
/// `name_id` (the query planner's job, spec §4.D); `group_by_values` maps
/// a subset of `group_bys`' entries to an explicit value whitelist, the
/// rest being unbounded (any value).
pub fn build_filter_pattern(
    schema: &Schema,
    literal_tags: &[(TagNameId, TagValueId)],
    group_bys: &[TagNameId],
    group_by_values: &HashMap<TagNameId, Vec<TagValueId>>,
) -> Result<String> {
    let requirements = merge_requirements(literal_tags, group_bys, group_by_values);
    let tag_pair_width = schema.tag_pair_width();
    let tag_value_width = schema.tag_value_width();

    let capacity = (13 + tag_pair_width) * (literal_tags.len() + 3 * group_bys.len());
    let mut pattern = String::with_capacity(capacity);
    pattern.push_str("(?s-u)^.{");
    pattern.push_str(&schema.key_prefix_len().to_string());
    pattern.push('}');

    for req in &requirements {
        push_any_tag_pair_star(&mut pattern, tag_pair_width);
        match req {
            Requirement::Literal { name_id, value_id } => {
                push_hex_bytes(&mut pattern, name_id.as_bytes());
                push_hex_bytes(&mut pattern, value_id.as_bytes());
            }
            Requirement::GroupByUnbounded { name_id } => {
                push_hex_bytes(&mut pattern, name_id.as_bytes());
                pattern.push_str(&format!(".{{{tag_value_width}}}"));
            }
            Requirement::GroupByWhitelist { name_id, values } => {
                push_hex_bytes(&mut pattern, name_id.as_bytes());
                pattern.push_str("(?:");
                for (i, value_id) in values.iter().enumerate() {
                    if i > 0 {
                        pattern.push('|');
                    }
                    push_hex_bytes(&mut pattern, value_id.as_bytes());
                }
                pattern.push(')');
            }
        }
    }

    push_any_tag_pair_star(&mut pattern, tag_pair_width);
    pattern.push('$');

    // The builder only ever emits hex-escaped literals and fixed
    // quantifiers it controls end to end, so a compile failure here means
    // the builder itself is wrong, not that the query was malformed.
    // Validating locally also catches that bug before the pattern is
    // shipped off to the store's own regex engine.
    regex::bytes::Regex::new(&pattern).map_err(|e| QueryError::FilterCompileError(e.to_string()))?;

    debug!(pattern = %pattern, requirement_count = requirements.len(), "compiled scan filter pattern");

    Ok(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn schema() -> Schema {
        Schema::new(3, 3, 3, 4).unwrap()
    }

    #[test]
    fn literal_only_matches_spec_scenario_1() {
        let schema = schema();
        let literal = vec![(TagNameId::new(&[0, 0, 2]), TagValueId::new(&[0, 0, 5]))];
        let pattern = build_filter_pattern(&schema, &literal, &[], &HashMap::new()).unwrap();
        assert_eq!(
            pattern,
            "(?s-u)^.{7}(?:.{6})*\\x00\\x00\\x02\\x00\\x00\\x05(?:.{6})*$"
        );
    }

    #[test]
    fn group_by_unbounded_leaves_a_wildcard_value() {
        let schema = schema();
        let group_bys = vec![TagNameId::new(&[0, 0, 9])];
        let pattern = build_filter_pattern(&schema, &[], &group_bys, &HashMap::new()).unwrap();
        assert_eq!(pattern, "(?s-u)^.{7}(?:.{6})*\\x00\\x00\\x09.{3}(?:.{6})*$");
    }

    #[test]
    fn group_by_whitelist_alternates_values() {
        let schema = schema();
        let group_bys = vec![TagNameId::new(&[0, 0, 2])];
        let mut values = HashMap::new();
        values.insert(
            TagNameId::new(&[0, 0, 2]),
            vec![TagValueId::new(&[0, 0, 5]), TagValueId::new(&[0, 0, 6])],
        );
        let pattern = build_filter_pattern(&schema, &[], &group_bys, &values).unwrap();
        assert_eq!(
            pattern,
            "(?s-u)^.{7}(?:.{6})*\\x00\\x00\\x02(?:\\x00\\x00\\x05|\\x00\\x00\\x06)(?:.{6})*$"
        );
    }

    #[test]
    fn mixed_literal_and_group_by_are_merged_ascending() {
        let schema = schema();
        let literal = vec![(TagNameId::new(&[0, 0, 9]), TagValueId::new(&[0, 1, 0]))];
        let group_bys = vec![TagNameId::new(&[0, 0, 2])];
        let pattern = build_filter_pattern(&schema, &literal, &group_bys, &HashMap::new()).unwrap();
        // name_id [0,0,2] sorts before [0,0,9]: group-by requirement first
        assert_eq!(
            pattern,
            "(?s-u)^.{7}(?:.{6})*\\x00\\x00\\x02.{3}(?:.{6})*\\x00\\x00\\x09\\x00\\x01\\x00(?:.{6})*$"
        );
    }

    #[test]
    #[should_panic(expected = "invariant I1")]
    fn duplicate_name_id_across_bins_panics() {
        let schema = schema();
        let literal = vec![(TagNameId::new(&[0, 0, 2]), TagValueId::new(&[0, 0, 5]))];
        let group_bys = vec![TagNameId::new(&[0, 0, 2])];
        let _ = build_filter_pattern(&schema, &literal, &group_bys, &HashMap::new());
    }

    fn row_key(prefix_len: usize, tag_pairs: &[(&[u8], &[u8])]) -> Vec<u8> {
        let mut key = vec![0xAAu8; prefix_len];
        for (name, value) in tag_pairs {
            key.extend_from_slice(name);
            key.extend_from_slice(value);
        }
        key
    }

    /// The compiled pattern must actually match the bytes the builder
    /// describes (spec §8: "a regex built for requirement set R matches a
    /// row iff the row's tag section is a superset of R").
    #[test]
    fn compiled_literal_pattern_matches_superset_and_rejects_missing_pair() {
        let schema = schema();
        let literal = vec![(TagNameId::new(&[0, 0, 2]), TagValueId::new(&[0, 0, 5]))];
        let pattern = build_filter_pattern(&schema, &literal, &[], &HashMap::new()).unwrap();
        let re = regex::bytes::Regex::new(&pattern).unwrap();

        // required pair present, interleaved with an unrequired pair on either side
        let matching = row_key(
            schema.key_prefix_len(),
            &[(&[0, 0, 1], &[9, 9, 9]), (&[0, 0, 2], &[0, 0, 5]), (&[0, 0, 9], &[1, 1, 1])],
        );
        assert!(re.is_match(&matching));

        // required name present with the wrong value
        let wrong_value = row_key(schema.key_prefix_len(), &[(&[0, 0, 2], &[0, 0, 6])]);
        assert!(!re.is_match(&wrong_value));

        // required pair entirely absent
        let missing = row_key(schema.key_prefix_len(), &[(&[0, 0, 9], &[1, 1, 1])]);
        assert!(!re.is_match(&missing));
    }

    #[test]
    fn compiled_group_by_whitelist_pattern_matches_any_whitelisted_value_only() {
        let schema = schema();
        let group_bys = vec![TagNameId::new(&[0, 0, 2])];
        let mut values = HashMap::new();
        values.insert(
            TagNameId::new(&[0, 0, 2]),
            vec![TagValueId::new(&[0, 0, 5]), TagValueId::new(&[0, 0, 6])],
        );
        let pattern = build_filter_pattern(&schema, &[], &group_bys, &values).unwrap();
        let re = regex::bytes::Regex::new(&pattern).unwrap();

        assert!(re.is_match(&row_key(schema.key_prefix_len(), &[(&[0, 0, 2], &[0, 0, 5])])));
        assert!(re.is_match(&row_key(schema.key_prefix_len(), &[(&[0, 0, 2], &[0, 0, 6])])));
        assert!(!re.is_match(&row_key(schema.key_prefix_len(), &[(&[0, 0, 2], &[0, 0, 7])])));
        assert!(!re.is_match(&row_key(schema.key_prefix_len(), &[])));
    }

    #[test]
    fn compiled_group_by_unbounded_pattern_matches_any_value_for_the_name() {
        let schema = schema();
        let group_bys = vec![TagNameId::new(&[0, 0, 9])];
        let pattern = build_filter_pattern(&schema, &[], &group_bys, &HashMap::new()).unwrap();
        let re = regex::bytes::Regex::new(&pattern).unwrap();

        assert!(re.is_match(&row_key(schema.key_prefix_len(), &[(&[0, 0, 9], &[7, 7, 7])])));
        assert!(!re.is_match(&row_key(schema.key_prefix_len(), &[(&[0, 0, 1], &[7, 7, 7])])));
    }
}
