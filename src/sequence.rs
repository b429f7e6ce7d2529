//! Canonical timeline order and sequence ids.
//!
//! Rows are stably sorted by normalized event time (unparseable times last)
//! and then numbered from 1. The numbering depends only on the file contents
//! and the resolver policy, so ids a client captured from one request stay
//! valid for every later request against the same file.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::cancel::CancelToken;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::temporal::{matching_strategy, project, Instant, ResolverPolicy, TimeBinding};

/// Name of the synthetic sequence id column.
pub const ID_COLUMN: &str = "_id";

/// A dataset in timeline order. Row `n` (0-based) has sequence id `n + 1`.
#[derive(Debug, Clone, Default)]
pub struct Sequenced {
    dataset: Dataset,
    instants: Vec<Option<Instant>>,
    binding: Option<TimeBinding>,
}

impl Sequenced {
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Normalized instants, aligned with the sequenced rows.
    pub fn instants(&self) -> &[Option<Instant>] {
        &self.instants
    }

    pub fn binding(&self) -> Option<&TimeBinding> {
        self.binding.as_ref()
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    pub fn id_of(&self, row: usize) -> u64 {
        row as u64 + 1
    }

    pub fn row_of(&self, id: u64) -> Option<usize> {
        let row = usize::try_from(id.checked_sub(1)?).ok()?;
        (row < self.len()).then_some(row)
    }

    /// Rows for the given ids, in timeline order. Unknown and repeated ids
    /// are ignored.
    pub fn rows_for_ids(&self, ids: &[u64]) -> Vec<usize> {
        let rows: BTreeSet<usize> = ids.iter().filter_map(|&id| self.row_of(id)).collect();
        rows.into_iter().collect()
    }
}

/// Sort `dataset` into timeline order and assign sequence ids.
pub fn sequence(dataset: Dataset, policy: &ResolverPolicy, cancel: &CancelToken) -> Result<Sequenced> {
    cancel.check()?;
    let binding = policy.bind(&dataset);
    let instants = match &binding {
        Some(binding) => {
            let instants = project(&dataset, binding.column);
            let unparsed = instants.iter().filter(|i| i.is_none()).count();
            log::debug!(
                "time column {:?} read as {}; {unparsed} of {} rows without a time",
                binding.name,
                leading_format(&dataset, binding, &instants).unwrap_or("nothing"),
                instants.len()
            );
            instants
        }
        None => {
            log::debug!("no time column among {:?}; keeping file order", dataset.columns());
            vec![None; dataset.len()]
        }
    };
    cancel.check()?;

    let mut order: Vec<usize> = (0..dataset.len()).collect();
    order.sort_by(|&a, &b| timeline_cmp(instants[a], instants[b]));

    let (columns, mut rows) = dataset.into_parts();
    let rows = order.iter().map(|&idx| std::mem::take(&mut rows[idx])).collect();
    let instants = order.iter().map(|&idx| instants[idx]).collect();

    Ok(Sequenced {
        dataset: Dataset::from_parts(columns, rows),
        instants,
        binding,
    })
}

/// Parse strategy accepted by the first timestamped row.
fn leading_format(
    dataset: &Dataset,
    binding: &TimeBinding,
    instants: &[Option<Instant>],
) -> Option<&'static str> {
    let row = instants.iter().position(Option::is_some)?;
    dataset.cell(row, binding.column).and_then(matching_strategy)
}

/// Ascending by instant, nulls last.
fn timeline_cmp(a: Option<Instant>, b: Option<Instant>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
