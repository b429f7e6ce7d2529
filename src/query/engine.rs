//! Composable row filters and the query evaluator.
//!
//! A [`Query`] compiles into a [`FilterChain`] applied in a fixed order
//! (global search, column filters, structured clauses, id selection, time
//! range) followed by an optional stable sort. Evaluation yields a [`View`]:
//! row indices into the sequenced dataset, never copies of the rows.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::query::filter::{parse_number, ColumnFilters, FilterClause};
use crate::sequence::{Sequenced, ID_COLUMN};
use crate::temporal::{normalize, project, Instant, ResolverPolicy};

/// Names that address the sequence id when no data column carries them.
const ROW_NUMBER_ALIASES: &[&str] = &[ID_COLUMN, "no."];

/// Inclusive time window; either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<Instant>,
    pub end: Option<Instant>,
}

impl TimeRange {
    pub fn new(start: Option<Instant>, end: Option<Instant>) -> Self {
        Self { start, end }
    }

    /// Parse request bounds with the timestamp normalizer. Blank bounds are
    /// open; unparseable bounds are logged and treated as open.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Self {
        Self {
            start: parse_bound("start", start),
            end: parse_bound("end", end),
        }
    }

    pub fn is_active(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    pub fn contains(&self, instant: Instant) -> bool {
        self.start.map_or(true, |start| instant >= start)
            && self.end.map_or(true, |end| instant <= end)
    }
}

fn parse_bound(name: &str, raw: Option<&str>) -> Option<Instant> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    let parsed = normalize(raw);
    if parsed.is_none() {
        log::warn!("ignoring unparseable {name} bound {raw:?}");
    }
    parsed
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub column: String,
    pub descending: bool,
}

impl SortSpec {
    pub fn new(column: impl Into<String>, descending: bool) -> Self {
        Self {
            column: column.into(),
            descending,
        }
    }

    /// Grid direction names: anything other than `desc` sorts ascending.
    pub fn from_dir(column: impl Into<String>, dir: &str) -> Self {
        Self::new(column, dir.eq_ignore_ascii_case("desc"))
    }
}

/// Declarative description of a table/export request.
#[derive(Debug, Clone, Default)]
pub struct Query {
    search: Option<String>,
    columns: ColumnFilters,
    clauses: Vec<FilterClause>,
    ids: Option<Vec<u64>>,
    time: TimeRange,
    time_policy: Option<ResolverPolicy>,
    sort: Option<SortSpec>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Case-insensitive substring searched across every column.
    pub fn search(mut self, term: impl AsRef<str>) -> Self {
        let term = term.as_ref().trim();
        self.search = (!term.is_empty()).then(|| term.to_lowercase());
        self
    }

    pub fn column_filters(mut self, filters: ColumnFilters) -> Self {
        self.columns = filters;
        self
    }

    pub fn clause(mut self, clause: FilterClause) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn clauses(mut self, clauses: impl IntoIterator<Item = FilterClause>) -> Self {
        self.clauses.extend(clauses);
        self
    }

    /// Restrict to the given sequence ids. An empty list selects nothing.
    pub fn ids(mut self, ids: Vec<u64>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn time_range(mut self, range: TimeRange) -> Self {
        self.time = range;
        self
    }

    /// Resolve the time filter column with `policy` instead of reusing the
    /// column the dataset was sequenced by.
    pub fn time_policy(mut self, policy: ResolverPolicy) -> Self {
        self.time_policy = Some(policy);
        self
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Whether any row-dropping filter is set. Sorting does not count.
    pub fn is_filtering(&self) -> bool {
        self.search.is_some()
            || !self.columns.is_empty()
            || !self.clauses.is_empty()
            || self.ids.is_some()
            || self.time.is_active()
    }

    /// Evaluate against a sequenced dataset.
    pub fn evaluate(&self, seq: &Sequenced, cancel: &CancelToken) -> Result<View> {
        let (chain, time_filter_skipped) = self.compile(seq);
        let mut rows = Vec::new();
        for row in 0..seq.len() {
            cancel.checkpoint(row)?;
            if chain.keep(seq, row) {
                rows.push(row);
            }
        }
        cancel.check()?;
        if let Some(sort) = &self.sort {
            sort_rows(seq, &mut rows, sort);
        }
        Ok(View {
            rows,
            time_filter_skipped,
        })
    }

    fn compile(&self, seq: &Sequenced) -> (FilterChain, bool) {
        let dataset = seq.dataset();
        let mut chain = FilterChain::new();

        if let Some(term) = &self.search {
            chain = chain.add(SearchFilter { term: term.clone() });
        }

        for (name, term) in self.columns.iter() {
            match lookup_column(seq, name) {
                Some(Target::Column(column)) => {
                    chain = chain.add(ColumnTermFilter {
                        column,
                        term: term.to_string(),
                    })
                }
                Some(Target::Id) => {
                    chain = chain.add(IdTermFilter {
                        term: term.to_string(),
                    })
                }
                None => log::debug!("ignoring filter on unknown column {name:?}"),
            }
        }

        for clause in &self.clauses {
            match lookup_column(seq, &clause.field) {
                Some(target) => {
                    chain = chain.add(ClauseFilter {
                        target,
                        clause: clause.clone(),
                    })
                }
                None => log::debug!("ignoring clause on unknown column {:?}", clause.field),
            }
        }

        if let Some(ids) = &self.ids {
            chain = chain.add(IdSetFilter {
                ids: ids.iter().copied().collect(),
            });
        }

        let mut time_filter_skipped = false;
        if self.time.is_active() {
            let binding = match &self.time_policy {
                Some(policy) => policy.bind(dataset),
                None => seq.binding().cloned(),
            };
            match binding {
                Some(binding) => {
                    let projected = match seq.binding() {
                        Some(sequenced) if sequenced.column == binding.column => None,
                        _ => Some(project(dataset, binding.column)),
                    };
                    chain = chain.add(TimeFilter {
                        range: self.time,
                        projected,
                    });
                }
                None => {
                    log::warn!("time range requested but no time column found; skipping");
                    time_filter_skipped = true;
                }
            }
        }

        (chain, time_filter_skipped)
    }
}

/// Result of a query: sequenced row indices in presentation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct View {
    rows: Vec<usize>,
    time_filter_skipped: bool,
}

impl View {
    /// Every row of `seq` in timeline order.
    pub fn all(seq: &Sequenced) -> Self {
        Self {
            rows: (0..seq.len()).collect(),
            time_filter_skipped: false,
        }
    }

    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// True when a time range was requested but the dataset has no time
    /// column to apply it to.
    pub fn time_filter_skipped(&self) -> bool {
        self.time_filter_skipped
    }
}

/// A predicate over one sequenced row.
pub trait RowFilter: Send + Sync {
    fn keep(&self, seq: &Sequenced, row: usize) -> bool;
}

/// Filters ANDed in insertion order.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn RowFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F: RowFilter + 'static>(mut self, filter: F) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl RowFilter for FilterChain {
    fn keep(&self, seq: &Sequenced, row: usize) -> bool {
        self.filters.iter().all(|f| f.keep(seq, row))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Column(usize),
    Id,
}

/// Data columns win over the row-number aliases.
fn lookup_column(seq: &Sequenced, name: &str) -> Option<Target> {
    let dataset = seq.dataset();
    if let Some(column) = dataset
        .column_index(name)
        .or_else(|| dataset.column_index_ci(name))
    {
        return Some(Target::Column(column));
    }
    ROW_NUMBER_ALIASES
        .iter()
        .any(|a| a.eq_ignore_ascii_case(name))
        .then_some(Target::Id)
}

struct SearchFilter {
    term: String,
}

impl RowFilter for SearchFilter {
    fn keep(&self, seq: &Sequenced, row: usize) -> bool {
        seq.dataset()
            .record(row)
            .iter()
            .filter_map(|(_, cell)| cell)
            .any(|cell| contains_ci(cell, &self.term))
    }
}

struct ColumnTermFilter {
    column: usize,
    term: String,
}

impl RowFilter for ColumnTermFilter {
    fn keep(&self, seq: &Sequenced, row: usize) -> bool {
        seq.dataset()
            .cell(row, self.column)
            .map_or(false, |cell| contains_ci(cell, &self.term))
    }
}

struct IdTermFilter {
    term: String,
}

impl RowFilter for IdTermFilter {
    fn keep(&self, seq: &Sequenced, row: usize) -> bool {
        seq.id_of(row).to_string().contains(&self.term)
    }
}

struct ClauseFilter {
    target: Target,
    clause: FilterClause,
}

impl RowFilter for ClauseFilter {
    fn keep(&self, seq: &Sequenced, row: usize) -> bool {
        match self.target {
            Target::Column(column) => self.clause.matches(seq.dataset().cell(row, column)),
            Target::Id => self.clause.matches(Some(&seq.id_of(row).to_string())),
        }
    }
}

struct IdSetFilter {
    ids: HashSet<u64>,
}

impl RowFilter for IdSetFilter {
    fn keep(&self, seq: &Sequenced, row: usize) -> bool {
        self.ids.contains(&seq.id_of(row))
    }
}

struct TimeFilter {
    range: TimeRange,
    /// Instants of a column other than the sequencing one, when the query
    /// policy resolved a different column.
    projected: Option<Vec<Option<Instant>>>,
}

impl RowFilter for TimeFilter {
    fn keep(&self, seq: &Sequenced, row: usize) -> bool {
        let instant = match &self.projected {
            Some(instants) => instants[row],
            None => seq.instants()[row],
        };
        instant.map_or(false, |instant| self.range.contains(instant))
    }
}

fn contains_ci(cell: &str, lowered_term: &str) -> bool {
    cell.to_lowercase().contains(lowered_term)
}

fn sort_rows(seq: &Sequenced, rows: &mut [usize], sort: &SortSpec) {
    let target = match lookup_column(seq, &sort.column) {
        Some(target) => target,
        None => {
            log::debug!("ignoring sort on unknown column {:?}", sort.column);
            return;
        }
    };
    let column = match target {
        Target::Id => {
            rows.sort_unstable();
            if sort.descending {
                rows.reverse();
            }
            return;
        }
        Target::Column(column) => column,
    };

    let dataset = seq.dataset();
    let numeric = rows
        .iter()
        .filter_map(|&row| dataset.cell(row, column))
        .all(|cell| parse_number(cell).is_some());

    if numeric {
        let keys: Vec<Option<f64>> = rows
            .iter()
            .map(|&row| dataset.cell(row, column).and_then(parse_number))
            .collect();
        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_by(|&a, &b| {
            nulls_last(keys[a].as_ref(), keys[b].as_ref(), sort.descending, |x, y| {
                x.total_cmp(y)
            })
        });
        let sorted: Vec<usize> = order.iter().map(|&i| rows[i]).collect();
        rows.copy_from_slice(&sorted);
    } else {
        rows.sort_by(|&a, &b| {
            nulls_last(
                dataset.cell(a, column).as_ref(),
                dataset.cell(b, column).as_ref(),
                sort.descending,
                |x, y| x.cmp(y),
            )
        });
    }
}

/// Orders present values by `cmp` (reversed when descending); nulls always
/// sort after present values.
fn nulls_last<T>(
    a: Option<&T>,
    b: Option<&T>,
    descending: bool,
    cmp: impl Fn(&T, &T) -> Ordering,
) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => {
            let ord = cmp(a, b);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
