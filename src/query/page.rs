//! Page windows over a [`View`] and their JSON shape.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::query::engine::View;
use crate::sequence::{Sequenced, ID_COLUMN};

/// Location of one page within a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub total: usize,
    pub page: i64,
    pub size: i64,
    pub last_page: u64,
    /// Half-open index range into the view's rows.
    pub offset: usize,
    pub end: usize,
}

impl PageWindow {
    /// Window for the 1-based `page` of `size` rows over `total` rows.
    ///
    /// Non-positive sizes and pages outside `1..=last_page` yield an empty
    /// window rather than an error.
    pub fn new(total: usize, page: i64, size: i64) -> Self {
        let last_page = if size > 0 {
            (total as u64).div_ceil(size as u64)
        } else {
            0
        };
        let (offset, end) = if size > 0 && page >= 1 {
            let offset = (page as u64 - 1).saturating_mul(size as u64);
            let end = offset.saturating_add(size as u64);
            (clamp(offset, total), clamp(end, total))
        } else {
            (0, 0)
        };
        Self {
            total,
            page,
            size,
            last_page,
            offset,
            end,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.offset == self.end
    }
}

fn clamp(value: u64, total: usize) -> usize {
    usize::try_from(value).map_or(total, |v| v.min(total))
}

/// Table response: `{ total, page, size, last_page, data }`.
#[derive(Debug, Clone, Serialize)]
pub struct TablePage {
    pub total: usize,
    pub page: i64,
    pub size: i64,
    pub last_page: u64,
    pub data: Vec<Map<String, Value>>,
}

impl TablePage {
    /// Materialise one page of `view`. Only the rows inside the window are
    /// converted to JSON.
    pub fn build(seq: &Sequenced, view: &View, page: i64, size: i64) -> Self {
        let window = PageWindow::new(view.len(), page, size);
        let data = view.rows()[window.offset..window.end]
            .iter()
            .map(|&row| row_json(seq, row))
            .collect();
        Self {
            total: window.total,
            page,
            size,
            last_page: window.last_page,
            data,
        }
    }
}

/// One row as a JSON object: the sequence id first, then every column in
/// file order. Empty cells become `null`.
pub fn row_json(seq: &Sequenced, row: usize) -> Map<String, Value> {
    let mut map = Map::with_capacity(seq.dataset().columns().len() + 1);
    map.insert(ID_COLUMN.to_string(), Value::from(seq.id_of(row)));
    for (name, cell) in seq.dataset().record(row).iter() {
        let value = cell.map_or(Value::Null, |c| Value::String(c.to_string()));
        map.insert(name.to_string(), value);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::dataset::Dataset;
    use crate::sequence::sequence;
    use crate::temporal::ResolverPolicy;

    #[test]
    fn windows_follow_page_and_size() {
        let w = PageWindow::new(101, 3, 50);
        assert_eq!((w.offset, w.end, w.last_page), (100, 101, 3));
        let w = PageWindow::new(100, 2, 50);
        assert_eq!((w.offset, w.end, w.last_page), (50, 100, 2));
    }

    #[test]
    fn out_of_range_requests_are_empty() {
        assert!(PageWindow::new(10, 5, 5).is_empty());
        assert!(PageWindow::new(10, 0, 5).is_empty());
        assert!(PageWindow::new(10, 1, 0).is_empty());
        assert!(PageWindow::new(10, 1, -3).is_empty());
        assert_eq!(PageWindow::new(10, 1, 0).last_page, 0);
        assert_eq!(PageWindow::new(0, 1, 10).last_page, 0);
    }

    #[test]
    fn huge_pages_do_not_overflow() {
        let w = PageWindow::new(10, i64::MAX, i64::MAX);
        assert!(w.is_empty());
        assert_eq!(w.last_page, 1);
    }

    #[test]
    fn rows_serialise_with_id_first_and_nulls() {
        let dataset = Dataset::from_rows(&["time", "User"], vec![vec!["2024-01-01", ""]]);
        let seq = sequence(dataset, &ResolverPolicy::sequencing(), &CancelToken::new()).unwrap();
        let page = TablePage::build(&seq, &View::all(&seq), 1, 10);
        let json = serde_json::to_string(&page).unwrap();
        assert_eq!(
            json,
            r#"{"total":1,"page":1,"size":10,"last_page":1,"data":[{"_id":1,"time":"2024-01-01","User":null}]}"#
        );
    }
}
