//! Filter evaluation and ordering for in-memory documents.

use std::cmp::Ordering;

use catalog_core::compare_rfc3339;
use catalog_storage::{Filter, StorageError};
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};

/// A [`Filter`] with its patterns compiled once per query.
#[derive(Debug)]
pub enum CompiledFilter {
    All,
    Eq { path: String, value: Value },
    Matches { paths: Vec<String>, regex: Regex },
    And(Vec<CompiledFilter>),
}

impl CompiledFilter {
    pub fn compile(filter: &Filter) -> Result<Self, StorageError> {
        Ok(match filter {
            Filter::All => Self::All,
            Filter::Eq { field, value } => Self::Eq {
                path: field.clone(),
                value: value.clone(),
            },
            Filter::Matches { fields, pattern } => {
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| StorageError::invalid_filter(e.to_string()))?;
                Self::Matches {
                    paths: fields.clone(),
                    regex,
                }
            }
            Filter::And { filters } => Self::And(
                filters
                    .iter()
                    .map(Self::compile)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        })
    }

    pub fn matches(&self, doc: &Map<String, Value>) -> bool {
        match self {
            Self::All => true,
            Self::Eq { path, value } => resolve(doc, path).into_iter().any(|v| v == value),
            Self::Matches { paths, regex } => paths.iter().any(|path| {
                resolve(doc, path)
                    .into_iter()
                    .filter_map(Value::as_str)
                    .any(|s| regex.is_match(s))
            }),
            Self::And(filters) => filters.iter().all(|f| f.matches(doc)),
        }
    }
}

/// Resolves a dotted path, fanning out over arrays.
///
/// A leaf that is an array yields the array itself and each of its elements.
pub fn resolve<'a>(doc: &'a Map<String, Value>, path: &str) -> Vec<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some((first, rest)) = segments.split_first()
        && let Some(value) = doc.get(*first)
    {
        collect(value, rest, &mut out);
    }
    out
}

fn collect<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    match segments.split_first() {
        None => {
            out.push(value);
            if let Value::Array(items) = value {
                out.extend(items.iter());
            }
        }
        Some((segment, rest)) => match value {
            Value::Object(map) => {
                if let Some(next) = map.get(*segment) {
                    collect(next, rest, out);
                }
            }
            Value::Array(items) => {
                for item in items {
                    collect(item, segments, out);
                }
            }
            _ => {}
        },
    }
}

/// Orders two optional field values.
///
/// Missing and null sort first. Strings that both parse as RFC 3339 compare
/// chronologically.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::String(a), Value::String(b)) => {
                compare_rfc3339(a, b).unwrap_or_else(|| a.cmp(b))
            }
            (Value::Number(a), Value::Number(b)) => {
                let a = a.as_f64().unwrap_or(f64::NAN);
                let b = b.as_f64().unwrap_or(f64::NAN);
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            _ => type_rank(a).cmp(&type_rank(b)),
        },
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Renders a key value for duplicate key messages.
pub fn key_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn product() -> Map<String, Value> {
        doc(json!({
            "brandName": "Amoxyclav",
            "active": true,
            "moleculeAndStrengthName": [
                {"moleculeName": "Amoxicillin", "strengthName": "500mg"},
                {"moleculeName": "Clavulanic Acid", "strengthName": "125mg"}
            ]
        }))
    }

    #[test]
    fn test_resolve_fans_out_over_arrays() {
        let product = product();
        let names: Vec<&str> = resolve(&product, "moleculeAndStrengthName.moleculeName")
            .into_iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(names, vec!["Amoxicillin", "Clavulanic Acid"]);
        assert!(resolve(&product, "missing.path").is_empty());
    }

    #[test]
    fn test_eq_filter() {
        let product = product();
        let filter = CompiledFilter::compile(&Filter::eq("active", true)).unwrap();
        assert!(filter.matches(&product));

        let filter = CompiledFilter::compile(&Filter::eq("active", false)).unwrap();
        assert!(!filter.matches(&product));

        let filter = CompiledFilter::compile(&Filter::eq(
            "moleculeAndStrengthName.strengthName",
            "125mg",
        ))
        .unwrap();
        assert!(filter.matches(&product));
    }

    #[test]
    fn test_matches_filter_is_case_insensitive() {
        let product = product();
        let filter = CompiledFilter::compile(&Filter::matches_any(
            ["brandName", "moleculeAndStrengthName.moleculeName"],
            "a.*m.*x",
        ))
        .unwrap();
        assert!(filter.matches(&product));

        let filter =
            CompiledFilter::compile(&Filter::matches("brandName", "CLAV")).unwrap();
        assert!(filter.matches(&product));

        let filter = CompiledFilter::compile(&Filter::matches("brandName", "zzz")).unwrap();
        assert!(!filter.matches(&product));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = CompiledFilter::compile(&Filter::matches("brandName", "(")).unwrap_err();
        assert!(matches!(err, StorageError::InvalidFilter { .. }));
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(
            compare_values(
                Some(&json!("2024-03-01T10:15:30Z")),
                Some(&json!("2024-03-01T10:15:30.5Z"))
            ),
            Ordering::Less
        );
        assert_eq!(compare_values(None, Some(&json!("a"))), Ordering::Less);
        assert_eq!(compare_values(Some(&json!(2)), Some(&json!(10))), Ordering::Less);
        assert_eq!(compare_values(Some(&json!("b")), Some(&json!("a"))), Ordering::Greater);
    }
}
