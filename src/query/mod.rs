//! Search, filter, sort and paginate sequenced datasets.

mod engine;
pub mod filter;
mod page;

pub use engine::{FilterChain, Query, RowFilter, SortSpec, TimeRange, View};
pub use filter::{ColumnFilters, FilterClause, FilterOp, FilterSyntaxError};
pub use page::{row_json, PageWindow, TablePage};
