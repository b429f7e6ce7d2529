use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;

/// How a candidate name is compared with a lowercased column name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    /// Column name contains the candidate.
    Contains,
    /// Column name equals the candidate.
    Exact,
}

/// Heuristic for picking the event-time column of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverPolicy {
    pub rule: MatchRule,
    /// Lowercase candidate names.
    pub candidates: Vec<String>,
}

const CORE_CANDIDATES: &[&str] = &[
    "time",
    "timestamp",
    "date",
    "datetime",
    "insert_timestamp",
    "_time",
    "eventtime",
    "creationtime",
    "logtime",
    "time_created",
    "date_time",
    "start_time",
    "end_time",
];

const EXTENDED_CANDIDATES: &[&str] = &[
    "testtime",
    "object first seen",
    "first seen",
    "last seen",
    "creation time",
];

impl ResolverPolicy {
    pub fn new(rule: MatchRule, candidates: &[&str]) -> Self {
        Self {
            rule,
            candidates: candidates.iter().map(|c| c.to_lowercase()).collect(),
        }
    }

    /// Broad substring policy applied before sequencing.
    pub fn sequencing() -> Self {
        let all: Vec<&str> = CORE_CANDIDATES
            .iter()
            .chain(EXTENDED_CANDIDATES)
            .copied()
            .collect();
        Self::new(MatchRule::Contains, &all)
    }

    /// Exact-name policy used for charting and export time filters.
    pub fn analysis() -> Self {
        Self::new(MatchRule::Exact, CORE_CANDIDATES)
    }

    /// Index of the first column (file order) accepted by this policy.
    pub fn resolve(&self, columns: &[String]) -> Option<usize> {
        columns.iter().position(|column| self.accepts(column))
    }

    pub fn bind(&self, dataset: &Dataset) -> Option<TimeBinding> {
        let column = self.resolve(dataset.columns())?;
        Some(TimeBinding {
            column,
            name: dataset.columns()[column].clone(),
        })
    }

    pub fn accepts(&self, column: &str) -> bool {
        let lowered = column.to_lowercase();
        self.candidates.iter().any(|candidate| match self.rule {
            MatchRule::Contains => lowered.contains(candidate.as_str()),
            MatchRule::Exact => lowered == *candidate,
        })
    }
}

/// The column chosen as a dataset's event-time source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeBinding {
    pub column: usize,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn contains_rule_takes_first_in_file_order() {
        let policy = ResolverPolicy::sequencing();
        let columns = cols(&["Line", "EventTimeUTC", "Timestamp"]);
        assert_eq!(policy.resolve(&columns), Some(1));
    }

    #[test]
    fn contains_rule_matches_phrases() {
        let policy = ResolverPolicy::sequencing();
        assert!(policy.accepts("Object First Seen"));
        assert!(policy.accepts("Updated (Date)"));
        assert!(!policy.accepts("Computer"));
    }

    #[test]
    fn exact_rule_ignores_partial_names() {
        let policy = ResolverPolicy::analysis();
        let columns = cols(&["EventTimeUTC", "TIMESTAMP"]);
        assert_eq!(policy.resolve(&columns), Some(1));
        assert_eq!(policy.resolve(&cols(&["first seen"])), None);
    }

    #[test]
    fn absence_is_not_an_error() {
        let dataset = Dataset::from_rows(&["EventID", "Computer"], vec![vec!["1", "a"]]);
        assert_eq!(ResolverPolicy::sequencing().bind(&dataset), None);
    }
}
