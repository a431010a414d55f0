//! Query types for the document storage layer.
//!
//! Field names may be dotted paths (`moleculeAndStrengthName.moleculeName`).
//! A path step that lands on an array applies to every element, so a filter
//! on a nested field matches when any element matches.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A predicate over stored documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Filter {
    /// Matches every document.
    All,
    /// Field equals the value.
    Eq { field: String, value: Value },
    /// Any of the fields is a string matching the pattern, case-insensitively.
    Matches { fields: Vec<String>, pattern: String },
    /// All of the nested filters match.
    And { filters: Vec<Filter> },
}

impl Filter {
    /// Equality on a single field.
    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Case-insensitive regular expression match on one field.
    #[must_use]
    pub fn matches(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Matches {
            fields: vec![field.into()],
            pattern: pattern.into(),
        }
    }

    /// Case-insensitive regular expression match on any of several fields.
    #[must_use]
    pub fn matches_any<I, S>(fields: I, pattern: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Matches {
            fields: fields.into_iter().map(Into::into).collect(),
            pattern: pattern.into(),
        }
    }

    /// Conjunction; `All` operands are dropped and a single operand is unwrapped.
    #[must_use]
    pub fn and(filters: Vec<Filter>) -> Self {
        let mut filters: Vec<Filter> = filters
            .into_iter()
            .filter(|f| !matches!(f, Filter::All))
            .collect();
        match filters.len() {
            0 => Self::All,
            1 => filters.remove(0),
            _ => Self::And { filters },
        }
    }

    /// Returns true if this filter matches every document.
    #[must_use]
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

/// A sort key for find results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortParam {
    /// The field to sort by.
    pub field: String,
    /// Whether to sort in descending order.
    pub descending: bool,
}

impl SortParam {
    /// Creates a new `SortParam`.
    #[must_use]
    pub fn new(field: impl Into<String>, descending: bool) -> Self {
        Self {
            field: field.into(),
            descending,
        }
    }

    /// Creates an ascending sort parameter.
    #[must_use]
    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, false)
    }

    /// Creates a descending sort parameter.
    #[must_use]
    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, true)
    }
}

/// Ordering and windowing for a find.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortParam>,
    /// Number of matching documents to skip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    /// Maximum number of documents to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl FindOptions {
    /// Creates new default `FindOptions`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sort key.
    #[must_use]
    pub fn with_sort(mut self, sort: SortParam) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Sets the skip count.
    #[must_use]
    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Sets the limit.
    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_and_flattens_trivial_cases() {
        assert_eq!(Filter::and(vec![]), Filter::All);
        assert_eq!(Filter::and(vec![Filter::All, Filter::All]), Filter::All);
        assert_eq!(
            Filter::and(vec![Filter::All, Filter::eq("active", true)]),
            Filter::eq("active", true)
        );

        let combined = Filter::and(vec![
            Filter::eq("active", true),
            Filter::eq("categoryName", "Antibiotics"),
        ]);
        assert!(matches!(combined, Filter::And { ref filters } if filters.len() == 2));
    }

    #[test]
    fn test_filter_serialization() {
        let filter = Filter::matches_any(["brandName", "categoryName"], "amox");
        let json = serde_json::to_value(&filter).unwrap();
        assert_eq!(
            json,
            json!({"op": "matches", "fields": ["brandName", "categoryName"], "pattern": "amox"})
        );
    }

    #[test]
    fn test_find_options_builder() {
        let options = FindOptions::new()
            .with_sort(SortParam::desc("createdAt"))
            .with_skip(20)
            .with_limit(20);

        assert_eq!(options.sort, Some(SortParam::new("createdAt", true)));
        assert_eq!(options.skip, Some(20));
        assert_eq!(options.limit, Some(20));
    }
}
