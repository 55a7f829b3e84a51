// Core table model plus the row types used for report previews and exports.
//
// Columns come from the API at runtime, so a `Table` is a list of column
// names and rows of `Cell`s. Missing data is spelled out as `Cell::Missing`
// instead of a sentinel value.
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::fmt;
use tabled::Tabled;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(f64),
    /// A point in time at year granularity (always January 1st).
    Year(NaiveDate),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_year(&self) -> Option<i32> {
        match self {
            Value::Year(d) => Some(d.year()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Number(n) => write!(f, "{}", n),
            Value::Year(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Present(Value),
    Missing,
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Present(Value::Text(s.into()))
    }

    pub fn number(n: f64) -> Self {
        Cell::Present(Value::Number(n))
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Cell::Present(v) => Some(v),
            Cell::Missing => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        self.value().and_then(Value::as_number)
    }

    /// Rendering used by previews and CSV export; missing cells are blank.
    pub fn render(&self) -> String {
        match self {
            Cell::Present(v) => v.to_string(),
            Cell::Missing => String::new(),
        }
    }
}

/// Column-named grid of cells. Every row holds exactly one cell per column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    /// Zero rows, zero columns. This is what a failed fetch hands back.
    pub fn empty() -> Self {
        Table::default()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Like `column_index`, but an absent column is a descriptive error.
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| Error::MissingColumn(name.to_string()))
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::InvalidArgument(format!(
                "row has {} cells but table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn column_cells(&self, idx: usize) -> impl Iterator<Item = &Cell> + '_ {
        self.rows.iter().map(move |r| &r[idx])
    }

    /// A column is numeric when every present value is a `Number`.
    /// Missing cells do not disqualify it.
    pub fn is_numeric_column(&self, idx: usize) -> bool {
        self.column_cells(idx)
            .filter_map(Cell::value)
            .all(|v| matches!(v, Value::Number(_)))
    }

    /// Index of a column that must exist and hold only numbers.
    pub fn require_numeric(&self, name: &str) -> Result<usize> {
        let idx = self.require_column(name)?;
        if !self.is_numeric_column(idx) {
            return Err(Error::InvalidColumn {
                column: name.to_string(),
                reason: "column holds non-numeric values".to_string(),
            });
        }
        Ok(idx)
    }

    /// Present numeric values of a column, in row order.
    pub fn numbers(&self, idx: usize) -> Vec<f64> {
        self.column_cells(idx).filter_map(Cell::as_number).collect()
    }

    /// Replace an existing column in place or append a new one.
    pub fn set_column(&mut self, name: &str, cells: Vec<Cell>) -> Result<()> {
        if cells.len() != self.rows.len() {
            return Err(Error::InvalidArgument(format!(
                "column {} has {} cells but table has {} rows",
                name,
                cells.len(),
                self.rows.len()
            )));
        }
        match self.column_index(name) {
            Some(idx) => {
                for (row, cell) in self.rows.iter_mut().zip(cells) {
                    row[idx] = cell;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, cell) in self.rows.iter_mut().zip(cells) {
                    row.push(cell);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn rows_mut(&mut self) -> &mut Vec<Vec<Cell>> {
        &mut self.rows
    }

    /// Keep only the rows matching `keep`. Returns how many were dropped.
    pub fn retain_rows<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&[Cell]) -> bool,
    {
        let before = self.rows.len();
        self.rows.retain(|r| keep(r));
        before - self.rows.len()
    }
}

/// One ranked group in an `AggregateView`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMean {
    pub group: String,
    pub mean: f64,
    pub count: usize,
}

/// Grouped means of one metric, sorted descending and truncated.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AggregateView {
    pub metric: String,
    pub group_by: String,
    pub entries: Vec<GroupMean>,
}

impl AggregateView {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The view as a plain table: group column followed by the mean.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new(vec![self.group_by.clone(), self.metric.clone()]);
        for e in &self.entries {
            table
                .rows
                .push(vec![Cell::text(e.group.clone()), Cell::number(e.mean)]);
        }
        table
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MapPoint {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Descriptive statistics of one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStats {
    pub column: String,
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Tabled)]
pub struct StatsRow {
    #[tabled(rename = "Column")]
    pub column: String,
    #[tabled(rename = "Count")]
    pub count: String,
    #[tabled(rename = "Mean")]
    pub mean: String,
    #[tabled(rename = "Std")]
    pub std: String,
    #[tabled(rename = "Min")]
    pub min: String,
    #[tabled(rename = "25%")]
    pub q25: String,
    #[tabled(rename = "50%")]
    pub median: String,
    #[tabled(rename = "75%")]
    pub q75: String,
    #[tabled(rename = "Max")]
    pub max: String,
}

#[derive(Debug, Clone, Tabled)]
pub struct MissingRow {
    #[tabled(rename = "Column")]
    pub column: String,
    #[tabled(rename = "Missing")]
    pub missing: String,
}

#[derive(Debug, Clone, Tabled)]
pub struct RankingRow {
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[tabled(rename = "Division")]
    pub division: String,
    #[tabled(rename = "Mean")]
    pub mean: String,
    #[tabled(rename = "Rows")]
    pub rows: usize,
}

#[derive(Debug, Serialize)]
pub struct SummaryStats {
    pub total_rows: usize,
    pub total_columns: usize,
    pub total_divisions: usize,
    pub year_derived: bool,
    pub rows_dropped_missing: usize,
    pub rows_dropped_after_coercion: usize,
    pub columns: Vec<ColumnStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let mut t = Table::new(vec!["departamento".into(), "tasa".into()]);
        t.push_row(vec![Cell::text("META"), Cell::number(1.5)]).unwrap();
        t.push_row(vec![Cell::text("CAUCA"), Cell::Missing]).unwrap();
        t
    }

    #[test]
    fn push_row_rejects_wrong_width() {
        let mut t = sample();
        let err = t.push_row(vec![Cell::text("X")]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn numeric_column_ignores_missing_cells() {
        let t = sample();
        assert!(t.is_numeric_column(1));
        assert!(!t.is_numeric_column(0));
        assert_eq!(t.numbers(1), vec![1.5]);
    }

    #[test]
    fn require_numeric_reports_the_problem() {
        let t = sample();
        assert!(matches!(
            t.require_numeric("nope"),
            Err(Error::MissingColumn(c)) if c == "nope"
        ));
        assert!(matches!(
            t.require_numeric("departamento"),
            Err(Error::InvalidColumn { .. })
        ));
        assert_eq!(t.require_numeric("tasa").unwrap(), 1);
    }

    #[test]
    fn set_column_replaces_in_place() {
        let mut t = sample();
        t.set_column("tasa", vec![Cell::number(2.0), Cell::number(3.0)])
            .unwrap();
        assert_eq!(t.columns(), &["departamento".to_string(), "tasa".to_string()]);
        assert_eq!(t.numbers(1), vec![2.0, 3.0]);

        t.set_column("extra", vec![Cell::Missing, Cell::text("a")])
            .unwrap();
        assert_eq!(t.columns().len(), 3);
        assert_eq!(t.rows()[1][2], Cell::text("a"));
    }

    #[test]
    fn cell_rendering() {
        let year = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap();
        assert_eq!(Cell::Present(Value::Year(year)).render(), "2019-01-01");
        assert_eq!(Cell::number(12.5).render(), "12.5");
        assert_eq!(Cell::number(3.0).render(), "3");
        assert_eq!(Cell::Missing.render(), "");
    }
}
