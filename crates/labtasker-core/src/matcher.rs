//! Query matcher: a small boolean expression language evaluated against a
//! task's `args`/`metadata` documents, plus the bulk-update replacement
//! helper that applies a dotted-path update document to a `Value`.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    Eq(String, Value),
    Ne(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    In(String, Vec<Value>),
    Exists(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    /// `required_fields` is sugar for an `And` of `Exists` checks, each path
    /// typically rooted at `args` (e.g. `args.lr`).
    pub fn required_fields(paths: &[String]) -> Filter {
        Filter::And(paths.iter().cloned().map(Filter::Exists).collect())
    }

    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::Eq(path, want) => doc.get_path(path).is_some_and(|v| values_eq(v, want)),
            Filter::Ne(path, want) => !doc.get_path(path).is_some_and(|v| values_eq(v, want)),
            Filter::Gt(path, want) => compare(doc, path, want).is_some_and(|o| o.is_gt()),
            Filter::Gte(path, want) => compare(doc, path, want).is_some_and(|o| o.is_ge()),
            Filter::Lt(path, want) => compare(doc, path, want).is_some_and(|o| o.is_lt()),
            Filter::Lte(path, want) => compare(doc, path, want).is_some_and(|o| o.is_le()),
            Filter::In(path, options) => doc
                .get_path(path)
                .is_some_and(|v| options.iter().any(|o| values_eq(v, o))),
            Filter::Exists(path) => doc.has_path(path),
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(doc)),
            Filter::Not(inner) => !inner.matches(doc),
        }
    }
}

fn values_eq(a: &Value, b: &Value) -> bool {
    a == b
}

/// Ordered comparison against a missing path is false; this returns `None`
/// in that case so callers can treat every `Gt`/`Lt`/... as "false when
/// absent" uniformly.
fn compare(doc: &Value, path: &str, want: &Value) -> Option<std::cmp::Ordering> {
    let have = doc.get_path(path)?;
    match (have, want) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// A bulk-update document: dotted paths to new values. Applying it produces
/// a new document with those sub-paths set, leaving siblings untouched.
pub type UpdateDoc = BTreeMap<String, Value>;

pub fn apply_update(doc: &Value, update: &UpdateDoc) -> Result<Value, crate::value::SetPathError> {
    let mut out = doc.clone();
    for (path, value) in update {
        out.set_path(path, value.clone())?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn doc() -> Value {
        let mut args = BTreeMap::new();
        args.insert("lr".to_string(), Value::Number(0.1));
        args.insert("batch".to_string(), Value::Number(32.0));
        let mut root = BTreeMap::new();
        root.insert("args".to_string(), Value::Object(args));
        Value::Object(root)
    }

    #[test]
    fn eq_and_missing_path() {
        assert!(Filter::Eq("args.lr".into(), Value::Number(0.1)).matches(&doc()));
        assert!(!Filter::Eq("args.missing".into(), Value::Number(0.1)).matches(&doc()));
    }

    #[test]
    fn ordered_comparison_against_missing_is_false() {
        assert!(!Filter::Gt("args.missing".into(), Value::Number(0.0)).matches(&doc()));
    }

    #[test]
    fn required_fields_all_must_exist() {
        let f = Filter::required_fields(&["args.lr".into(), "args.batch".into()]);
        assert!(f.matches(&doc()));
        let f2 = Filter::required_fields(&["args.lr".into(), "args.missing".into()]);
        assert!(!f2.matches(&doc()));
    }

    #[test]
    fn and_or_not_compose() {
        let f = Filter::Or(vec![
            Filter::Eq("args.lr".into(), Value::Number(99.0)),
            Filter::Not(Box::new(Filter::Exists("args.missing".into()))),
        ]);
        assert!(f.matches(&doc()));
    }

    #[test]
    fn apply_update_leaves_siblings_alone() {
        let mut update = UpdateDoc::new();
        update.insert("args.lr".into(), Value::Number(0.5));
        let updated = apply_update(&doc(), &update).unwrap();
        assert_eq!(updated.get_path("args.lr"), Some(&Value::Number(0.5)));
        assert_eq!(updated.get_path("args.batch"), Some(&Value::Number(32.0)));
    }
}
