//! Qdrant filter builders for branch/path/PR scoping.
//!
//! qdrant-client 1.15 specifics:
//! - `Condition` is a wrapper with `condition_one_of`; there are no helper
//!   constructors for every shape, so the enum is set directly.
//! - `FieldCondition.r#match` wraps `r#match::MatchValue`; the any-of form
//!   is `MatchValue::Keywords(RepeatedStrings)`.

use qdrant_client::qdrant::{
    Condition, FieldCondition, Filter, Match, RepeatedStrings, condition, r#match::MatchValue,
};

/// Equality condition on a keyword field.
pub fn field_eq(key: impl Into<String>, value: impl Into<String>) -> Condition {
    field_condition(key, MatchValue::Keyword(value.into()))
}

/// Equality condition on an integer field.
pub fn field_eq_int(key: impl Into<String>, value: i64) -> Condition {
    field_condition(key, MatchValue::Integer(value))
}

/// Any-of condition on a keyword field.
pub fn field_any(key: impl Into<String>, values: Vec<String>) -> Condition {
    field_condition(key, MatchValue::Keywords(RepeatedStrings { strings: values }))
}

fn field_condition(key: impl Into<String>, value: MatchValue) -> Condition {
    Condition {
        condition_one_of: Some(condition::ConditionOneOf::Field(FieldCondition {
            key: key.into(),
            r#match: Some(Match {
                match_value: Some(value),
            }),
            ..Default::default()
        })),
    }
}

/// `branch = value`
pub fn branch_eq(branch: &str) -> Filter {
    Filter {
        must: vec![field_eq("branch", branch)],
        ..Default::default()
    }
}

/// `branch ∈ values`
pub fn branch_any(branches: &[String]) -> Filter {
    if branches.len() == 1 {
        return branch_eq(&branches[0]);
    }
    Filter {
        must: vec![field_any("branch", branches.to_vec())],
        ..Default::default()
    }
}

/// `branch ≠ value` — used to carry other branches across a reindex.
pub fn branch_not(branch: &str) -> Filter {
    Filter {
        must_not: vec![field_eq("branch", branch)],
        ..Default::default()
    }
}

/// `path ∈ paths AND branch = branch`
pub fn paths_in_branch(paths: &[String], branch: &str) -> Filter {
    Filter {
        must: vec![field_any("path", paths.to_vec()), field_eq("branch", branch)],
        ..Default::default()
    }
}

/// `pr_number = n` — PR-scoped hybrid points.
pub fn pr_number_eq(pr_number: i64) -> Filter {
    Filter {
        must: vec![field_eq_int("pr_number", pr_number)],
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_any_collapses_singleton() {
        let single = branch_any(&["main".to_string()]);
        assert_eq!(single.must.len(), 1);

        let multi = branch_any(&["main".to_string(), "develop".to_string()]);
        assert_eq!(multi.must.len(), 1);
        // Any-of keeps both values in one condition.
        match &multi.must[0].condition_one_of {
            Some(condition::ConditionOneOf::Field(f)) => {
                match f.r#match.as_ref().and_then(|m| m.match_value.as_ref()) {
                    Some(MatchValue::Keywords(ks)) => assert_eq!(ks.strings.len(), 2),
                    other => panic!("unexpected match value: {other:?}"),
                }
            }
            other => panic!("unexpected condition: {other:?}"),
        }
    }

    #[test]
    fn paths_in_branch_has_both_clauses() {
        let f = paths_in_branch(&["a.py".to_string(), "b.py".to_string()], "main");
        assert_eq!(f.must.len(), 2);
        assert!(f.must_not.is_empty());
    }
}
