//! Lazy table extraction.
//!
//! Row handles are enumerated when iteration starts; each row's cells are
//! read on demand. Nothing is cached between extractions.

use crate::driver::{Driver, ElementRef};
use crate::locator::{self, Target};
use crate::query::Query;
use crate::Result;
use std::vec;
use tracing::debug;

/// Cell query used unless overridden.
pub const DEFAULT_CELLS: &str = "./td | ./th";

/// One table row's cell texts, trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRecord {
    /// Position among the extracted rows, from zero.
    pub index: usize,
    pub cells: Vec<String>,
}

impl TableRecord {
    pub fn cell(&self, column: usize) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Reads a located table into records.
#[derive(Debug, Clone, PartialEq)]
pub struct TableExtractor {
    pub table: Target,
    pub rows: Query,
    pub cells: Query,
}

impl TableExtractor {
    pub fn new(table: Target) -> Self {
        Self {
            table,
            rows: Query::tag("tr"),
            cells: Query::xpath(DEFAULT_CELLS),
        }
    }

    pub fn rows_query(mut self, query: Query) -> Self {
        self.rows = query;
        self
    }

    pub fn cells_query(mut self, query: Query) -> Self {
        self.cells = query;
        self
    }

    /// Locate the table and enumerate its rows.
    pub fn rows<'a, D: Driver + ?Sized>(&'a self, driver: &'a mut D) -> Result<Rows<'a, D>> {
        let table = locator::require(driver, &self.table)?;
        let handles = lookup(driver, &table.element, &self.rows)?;
        debug!("{}: {} row(s)", self.table, handles.len());
        Ok(Rows {
            driver,
            cells: &self.cells,
            handles: handles.into_iter().enumerate(),
        })
    }

    /// Read every row.
    pub fn extract<D: Driver + ?Sized>(&self, driver: &mut D) -> Result<Vec<TableRecord>> {
        self.rows(driver)?.collect()
    }
}

/// Row iterator. Each `next` reads one row's cells from the driver.
pub struct Rows<'a, D: ?Sized> {
    driver: &'a mut D,
    cells: &'a Query,
    handles: std::iter::Enumerate<vec::IntoIter<ElementRef>>,
}

impl<D: Driver + ?Sized> Iterator for Rows<'_, D> {
    type Item = Result<TableRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, row) = self.handles.next()?;
        Some(read_row(&mut *self.driver, &row, self.cells, index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.handles.size_hint()
    }
}

fn read_row<D: Driver + ?Sized>(
    driver: &mut D,
    row: &ElementRef,
    cells: &Query,
    index: usize,
) -> Result<TableRecord> {
    let mut texts = Vec::new();
    for cell in lookup(driver, row, cells)? {
        texts.push(driver.text(&cell)?.trim().to_string());
    }
    Ok(TableRecord { index, cells: texts })
}

fn lookup<D: Driver + ?Sized>(driver: &mut D, parent: &ElementRef, query: &Query) -> Result<Vec<ElementRef>> {
    match driver.find_within(parent, query) {
        Ok(v) => Ok(v),
        Err(e) if e.is_absence() => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// First record whose `column` cell contains `needle`.
pub fn find_row<'a>(records: &'a [TableRecord], column: usize, needle: &str) -> Option<&'a TableRecord> {
    let needle = needle.trim();
    records
        .iter()
        .find(|r| r.cell(column).is_some_and(|c| c.contains(needle)))
}

/// One column across records. Rows too short for it are skipped.
pub fn column(records: &[TableRecord], index: usize) -> Vec<&str> {
    records.iter().filter_map(|r| r.cell(index)).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::memory::{MemoryDriver, Node};
    use crate::Error;

    /// A header row plus one row per entry, under `table#product`.
    pub(crate) fn fixture(rows: &[[&str; 4]]) -> (MemoryDriver, Target) {
        let mut d = MemoryDriver::new();
        let table = d.add(Node::new("table").id("product").attr("name", "courses"));
        let body = d.add_child(&table, Node::new("tbody"));
        let header = d.add_child(&body, Node::new("tr"));
        for h in ["Name", "Position", "City", "Amount"] {
            d.add_child(&header, Node::new("th").text(h));
        }
        for row in rows {
            let tr = d.add_child(&body, Node::new("tr"));
            for cell in row {
                d.add_child(&tr, Node::new("td").text(format!(" {} ", cell)));
            }
        }
        (d, Target::new("product table").candidate(Query::id("product")))
    }

    fn sample() -> (MemoryDriver, Target) {
        fixture(&[
            ["Alex", "Engineer", "Chennai", "100"],
            ["Ben", "Mechanic", "Bengaluru", "250"],
            ["Dwayne", "Manager", "Kolkata", "375"],
        ])
    }

    #[test]
    fn extracts_header_and_rows_trimmed() {
        let (mut d, target) = sample();
        let records = TableExtractor::new(target).extract(&mut d).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].cells, vec!["Name", "Position", "City", "Amount"]);
        assert_eq!(records[2].cell(0), Some("Ben"));
        assert_eq!(records[3].index, 3);
        assert_eq!(column(&records[1..], 3), vec!["100", "250", "375"]);
    }

    #[test]
    fn extraction_is_repeatable() {
        let (mut d, target) = sample();
        let extractor = TableExtractor::new(target);
        let first = extractor.extract(&mut d).unwrap();
        let second = extractor.extract(&mut d).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn rows_are_read_lazily() {
        let (mut d, target) = sample();
        let extractor = TableExtractor::new(target);
        let before = d.calls().len();
        let mut rows = extractor.rows(&mut d).unwrap();
        assert_eq!(rows.size_hint(), (4, Some(4)));
        let header = rows.next().unwrap().unwrap();
        assert_eq!(header.cells.len(), 4);
        drop(rows);
        let text_reads = d.calls()[before..].iter().filter(|c| c.starts_with("text")).count();
        assert_eq!(text_reads, 4);
    }

    #[test]
    fn missing_table_is_not_found() {
        let mut d = MemoryDriver::new();
        let err = TableExtractor::new(Target::new("t").candidate(Query::id("nope")))
            .extract(&mut d)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn find_row_by_cell_text() {
        let (mut d, target) = sample();
        let records = TableExtractor::new(target).extract(&mut d).unwrap();
        let row = find_row(&records, 2, "Kolkata").unwrap();
        assert_eq!(row.cell(0), Some("Dwayne"));
        assert!(find_row(&records, 2, "Pune").is_none());
    }
}
