//! Filter predicates and their wire forms.
//!
//! Malformed filter input never fails a request: parsing returns a
//! [`FilterSyntaxError`] that callers log before dropping the filter.

use std::cmp::Ordering;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// A structured filter that could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterSyntaxError {
    #[error("column filters are not a JSON object: {0}")]
    NotAnObject(String),
    #[error("unknown filter operator {0:?}")]
    UnknownOperator(String),
    #[error("filter clause is missing {0:?}")]
    MissingField(&'static str),
}

/// Comparison applied by a [`FilterClause`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// Case-insensitive substring match.
    Like,
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl FromStr for FilterOp {
    type Err = FilterSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "like" => Ok(FilterOp::Like),
            "=" | "==" => Ok(FilterOp::Eq),
            "!=" | "<>" => Ok(FilterOp::Ne),
            ">" => Ok(FilterOp::Gt),
            "<" => Ok(FilterOp::Lt),
            ">=" => Ok(FilterOp::Ge),
            "<=" => Ok(FilterOp::Le),
            other => Err(FilterSyntaxError::UnknownOperator(other.to_string())),
        }
    }
}

/// One `(column, operator, value)` predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterClause {
    pub field: String,
    pub op: FilterOp,
    pub value: String,
}

impl FilterClause {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<String>) -> Self {
        let op_value = value.into();
        let value = match op {
            FilterOp::Like => op_value.to_lowercase(),
            _ => op_value,
        };
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    /// Parse the grid's `{ "field", "type", "value" }` object.
    pub fn from_json(value: &Value) -> Result<Self, FilterSyntaxError> {
        let raw: RawClause = serde_json::from_value(value.clone())
            .map_err(|_| FilterSyntaxError::MissingField("field"))?;
        let op_name = raw.op.ok_or(FilterSyntaxError::MissingField("type"))?;
        let op = op_name.parse()?;
        let value = raw
            .value
            .as_ref()
            .and_then(value_text)
            .ok_or(FilterSyntaxError::MissingField("value"))?;
        Ok(Self::new(raw.field, op, value))
    }

    /// Whether a cell satisfies this clause. Null cells never do.
    pub fn matches(&self, cell: Option<&str>) -> bool {
        let Some(cell) = cell else {
            return false;
        };
        match self.op {
            FilterOp::Like => cell.to_lowercase().contains(&self.value),
            FilterOp::Eq => cell == self.value,
            FilterOp::Ne => cell != self.value,
            FilterOp::Gt => compare_values(cell, &self.value) == Ordering::Greater,
            FilterOp::Lt => compare_values(cell, &self.value) == Ordering::Less,
            FilterOp::Ge => compare_values(cell, &self.value) != Ordering::Less,
            FilterOp::Le => compare_values(cell, &self.value) != Ordering::Greater,
        }
    }
}

#[derive(Deserialize)]
struct RawClause {
    field: String,
    #[serde(rename = "type", alias = "op")]
    op: Option<String>,
    value: Option<Value>,
}

/// Numeric comparison when both sides are numbers, text comparison otherwise.
pub fn compare_values(left: &str, right: &str) -> Ordering {
    match (parse_number(left), parse_number(right)) {
        (Some(l), Some(r)) => l.total_cmp(&r),
        _ => left.cmp(right),
    }
}

pub(crate) fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Per-column case-insensitive substring filters, ANDed together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnFilters {
    terms: Vec<(String, String)>,
}

impl ColumnFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter; empty terms are ignored. Terms are stored lowercased.
    pub fn with(mut self, column: impl Into<String>, term: impl AsRef<str>) -> Self {
        let term = term.as_ref();
        if !term.is_empty() {
            self.terms.push((column.into(), term.to_lowercase()));
        }
        self
    }

    /// Parse the grid's JSON object of `column -> term`.
    pub fn parse(raw: &str) -> Result<Self, FilterSyntaxError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_str(raw)
            .map_err(|err| FilterSyntaxError::NotAnObject(err.to_string()))?;
        let Value::Object(map) = value else {
            return Err(FilterSyntaxError::NotAnObject(raw.to_string()));
        };
        let mut filters = Self::default();
        for (column, term) in &map {
            if let Some(term) = value_text(term) {
                filters = filters.with(column.clone(), term);
            }
        }
        Ok(filters)
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.terms.iter().map(|(c, t)| (c.as_str(), t.as_str()))
    }
}

/// Text form of a JSON scalar; null, objects and arrays have none.
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operators_parse_from_grid_names() {
        assert_eq!("like".parse::<FilterOp>(), Ok(FilterOp::Like));
        assert_eq!(">=".parse::<FilterOp>(), Ok(FilterOp::Ge));
        assert!(matches!(
            "regex".parse::<FilterOp>(),
            Err(FilterSyntaxError::UnknownOperator(_))
        ));
    }

    #[test]
    fn clause_from_json_accepts_numbers() {
        let clause =
            FilterClause::from_json(&json!({"field": "EventID", "type": "=", "value": 4624}))
                .unwrap();
        assert_eq!(clause, FilterClause::new("EventID", FilterOp::Eq, "4624"));
        assert!(clause.matches(Some("4624")));
        assert!(!clause.matches(None));
    }

    #[test]
    fn clause_without_operator_is_a_syntax_error() {
        let err = FilterClause::from_json(&json!({"field": "EventID", "value": 1})).unwrap_err();
        assert_eq!(err, FilterSyntaxError::MissingField("type"));
    }

    #[test]
    fn relational_ops_compare_numbers_numerically() {
        let gt = FilterClause::new("Size", FilterOp::Gt, "9");
        assert!(gt.matches(Some("10")));
        assert!(!gt.matches(Some("8.5")));
        let le = FilterClause::new("Name", FilterOp::Le, "m");
        assert!(le.matches(Some("alpha")));
        assert!(!le.matches(Some("zulu")));
    }

    #[test]
    fn not_equal_never_matches_null() {
        let ne = FilterClause::new("User", FilterOp::Ne, "SYSTEM");
        assert!(ne.matches(Some("alice")));
        assert!(!ne.matches(None));
    }

    #[test]
    fn like_is_case_insensitive() {
        let like = FilterClause::new("User", FilterOp::Like, "ADMIN");
        assert!(like.matches(Some("Administrator")));
    }

    #[test]
    fn column_filters_parse_and_skip_empty_terms() {
        let filters = ColumnFilters::parse(r#"{"User": "Adm", "Host": "", "EventID": 4624}"#).unwrap();
        let terms: Vec<_> = filters.iter().collect();
        assert_eq!(terms, vec![("User", "adm"), ("EventID", "4624")]);
    }

    #[test]
    fn malformed_column_filters_are_reported() {
        assert!(ColumnFilters::parse("{not json").is_err());
        assert!(ColumnFilters::parse("[1, 2]").is_err());
        assert!(ColumnFilters::parse("").unwrap().is_empty());
    }
}
