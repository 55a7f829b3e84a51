// Cleaner: raw API table -> analysis-ready table.
//
// Steps, in order:
// 1. derive the `Year` column from the raw year field (bad years -> missing)
// 2. drop rows with any missing cell
// 3. coerce every non-exempt column to numbers (bad values -> missing)
// 4. drop rows that step 3 left incomplete
//
// Step 4 means the output never holds `Cell::Missing`.
use crate::error::Result;
use crate::types::{Cell, Table, Value};
use crate::util::{parse_f64_safe, parse_year_number, parse_year_text};
use tracing::{debug, info};

pub const DEFAULT_YEAR_FIELD: &str = "a_o";
pub const DEFAULT_YEAR_COLUMN: &str = "Year";
pub const DEFAULT_CATEGORICAL: [&str; 2] = ["departamento", "municipio"];

/// Which columns the cleaner treats specially.
#[derive(Debug, Clone)]
pub struct CleanRules {
    pub year_field: String,
    pub year_column: String,
    /// Administrative identifiers kept as text.
    pub categorical: Vec<String>,
}

impl Default for CleanRules {
    fn default() -> Self {
        CleanRules {
            year_field: DEFAULT_YEAR_FIELD.to_string(),
            year_column: DEFAULT_YEAR_COLUMN.to_string(),
            categorical: DEFAULT_CATEGORICAL.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl CleanRules {
    fn is_exempt(&self, column: &str) -> bool {
        column == self.year_column || self.categorical.iter().any(|c| c == column)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanReport {
    pub input_rows: usize,
    pub output_rows: usize,
    pub dropped_missing: usize,
    pub dropped_after_coercion: usize,
    pub coerced_to_missing: usize,
    pub year_derived: bool,
}

pub fn clean(raw: &Table, rules: &CleanRules) -> Result<(Table, CleanReport)> {
    let mut table = raw.clone();
    let mut report = CleanReport {
        input_rows: raw.len(),
        ..CleanReport::default()
    };

    if let Some(idx) = table.column_index(&rules.year_field) {
        let years: Vec<Cell> = table.column_cells(idx).map(year_cell).collect();
        table.set_column(&rules.year_column, years)?;
        report.year_derived = true;
    }

    report.dropped_missing = drop_incomplete(&mut table);

    let targets: Vec<usize> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, name)| !rules.is_exempt(name))
        .map(|(i, _)| i)
        .collect();
    for row in table.rows_mut() {
        for &i in &targets {
            let coerced = numeric_cell(&row[i]);
            if coerced.is_missing() && !row[i].is_missing() {
                report.coerced_to_missing += 1;
            }
            row[i] = coerced;
        }
    }

    report.dropped_after_coercion = drop_incomplete(&mut table);
    report.output_rows = table.len();

    debug!(?report, "clean report");
    info!(
        input = report.input_rows,
        output = report.output_rows,
        "cleaned dataset"
    );
    Ok((table, report))
}

fn drop_incomplete(table: &mut Table) -> usize {
    table.retain_rows(|row| row.iter().all(|c| !c.is_missing()))
}

fn year_cell(cell: &Cell) -> Cell {
    let parsed = match cell.value() {
        Some(Value::Text(s)) => parse_year_text(s),
        Some(Value::Number(n)) => parse_year_number(*n),
        Some(Value::Year(d)) => Some(*d),
        None => None,
    };
    parsed
        .map(|d| Cell::Present(Value::Year(d)))
        .unwrap_or(Cell::Missing)
}

fn numeric_cell(cell: &Cell) -> Cell {
    match cell.value() {
        Some(Value::Number(n)) => Cell::number(*n),
        Some(Value::Text(s)) => parse_f64_safe(Some(s))
            .map(Cell::number)
            .unwrap_or(Cell::Missing),
        Some(Value::Year(_)) | None => Cell::Missing,
    }
}
