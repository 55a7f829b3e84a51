use crate::error::{Error, Result};
use crate::types::{Cell, Table, Value};
use chrono::Datelike;
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};
use serde::Serialize;
use std::path::Path;
use tabled::{builder::Builder, settings::Style, Tabled};

pub const EXPORT_FILE: &str = "datos_procesados.xlsx";
pub const EXPORT_CSV_FILE: &str = "datos_procesados.csv";
pub const EXPORT_SHEET: &str = "Datos Procesados";
pub const SUMMARY_FILE: &str = "resumen.json";
pub const RANKING_FILE: &str = "top_divisiones.csv";

/// Header = column names; missing cells are written as empty fields.
pub fn write_table_csv(path: &Path, table: &Table) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(table.columns())?;
    for row in table.rows() {
        wtr.write_record(row.iter().map(Cell::render))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Single-sheet workbook: header row, numbers as numbers, years as dates.
/// Missing cells are left blank.
pub fn write_table_xlsx(path: &Path, table: &Table) -> Result<()> {
    let mut workbook = Workbook::new();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");
    let header_format = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name(EXPORT_SHEET)?;

    for (c, name) in table.columns().iter().enumerate() {
        sheet.write_string_with_format(0, xlsx_col(c)?, name, &header_format)?;
    }
    for (r, row) in table.rows().iter().enumerate() {
        let r = u32::try_from(r + 1)
            .map_err(|_| Error::InvalidArgument(format!("row {} does not fit a sheet", r + 1)))?;
        for (c, cell) in row.iter().enumerate() {
            let c = xlsx_col(c)?;
            match cell.value() {
                Some(Value::Text(s)) => {
                    sheet.write_string(r, c, s)?;
                }
                Some(Value::Number(n)) => {
                    sheet.write_number(r, c, *n)?;
                }
                Some(Value::Year(d)) => {
                    let dt = ExcelDateTime::from_ymd(d.year() as u16, d.month() as u8, d.day() as u8)?;
                    sheet.write_datetime_with_format(r, c, &dt, &date_format)?;
                }
                None => {}
            }
        }
    }
    workbook.save(path)?;
    Ok(())
}

fn xlsx_col(c: usize) -> Result<u16> {
    u16::try_from(c).map_err(|_| Error::InvalidArgument(format!("column {} does not fit a sheet", c)))
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value).map_err(Error::Json)?;
    std::fs::write(path, s)?;
    Ok(())
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().cloned().take(max_rows).collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = tabled::Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}

/// Markdown rendering of the first `max_rows` rows of a dynamic table.
pub fn render_table(table: &Table, max_rows: usize) -> Option<String> {
    if table.is_empty() {
        return None;
    }
    let mut builder = Builder::default();
    builder.push_record(table.columns().iter().cloned());
    for row in table.rows().iter().take(max_rows) {
        builder.push_record(row.iter().map(Cell::render));
    }
    Some(builder.build().with(Style::markdown()).to_string())
}

pub fn preview_table(table: &Table, max_rows: usize) {
    match render_table(table, max_rows) {
        Some(s) => println!("{}\n", s),
        None => println!("(no rows)\n"),
    }
}
