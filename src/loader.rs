// Fetcher: one bounded GET against the open-data endpoint, decoded into a
// `Table` whose columns are discovered from the JSON records.
use crate::error::{Error, Result};
use crate::types::{Cell, Table};
use reqwest::blocking::Client;
use serde_json::Value as Json;
use std::collections::HashSet;
use tracing::{error, info, warn};

pub const DEFAULT_ENDPOINT: &str = "https://www.datos.gov.co/resource/nudc-7mev.json";
pub const DEFAULT_LIMIT: usize = 50_000;

#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub total_records: usize,
    pub loaded_rows: usize,
    pub quarantined: usize,
    pub columns: usize,
}

/// Outcome of a fetch. `Empty` is a valid response with no records and must
/// not be presented as a failure.
#[derive(Debug)]
pub enum Fetched {
    Loaded(Table, LoadReport),
    Empty,
    Failed(Error),
}

impl Fetched {
    pub fn into_table(self) -> Table {
        match self {
            Fetched::Loaded(table, _) => table,
            Fetched::Empty | Fetched::Failed(_) => Table::empty(),
        }
    }
}

/// Fetch up to `limit` records. Never fails past this point: transport and
/// decoding problems come back as `Fetched::Failed`.
pub fn load_data(client: &Client, endpoint: &str, limit: usize) -> Fetched {
    info!(endpoint, limit, "fetching dataset");
    match fetch_table(client, endpoint, limit) {
        Ok((_, report)) if report.total_records == 0 => {
            info!("endpoint returned no records");
            Fetched::Empty
        }
        Ok((table, report)) => {
            if report.quarantined > 0 {
                warn!(
                    quarantined = report.quarantined,
                    "skipped records that are not flat JSON objects"
                );
            }
            info!(
                rows = report.loaded_rows,
                columns = report.columns,
                "dataset loaded"
            );
            Fetched::Loaded(table, report)
        }
        Err(e) => {
            error!(error = %e, "fetch failed");
            Fetched::Failed(e)
        }
    }
}

fn fetch_table(client: &Client, endpoint: &str, limit: usize) -> Result<(Table, LoadReport)> {
    let resp = client
        .get(endpoint)
        .query(&[("$limit", limit)])
        .send()?;
    let status = resp.status();
    if !status.is_success() {
        return Err(Error::Status {
            status: status.as_u16(),
            url: resp.url().to_string(),
        });
    }
    let body = resp.text()?;
    parse_records(&body)
}

/// Decode a JSON array of flat objects into a table.
///
/// Columns are the union of all object keys in first-seen order. Keys a
/// record lacks, and JSON nulls, become `Cell::Missing`. Elements that are
/// not objects, or objects holding nested arrays/objects, are quarantined.
pub fn parse_records(body: &str) -> Result<(Table, LoadReport)> {
    let payload: Json = serde_json::from_str(body).map_err(Error::Decode)?;
    let items = match payload {
        Json::Array(items) => items,
        other => {
            return Err(Error::UnexpectedShape(format!(
                "expected a JSON array, got {}",
                json_kind(&other)
            )))
        }
    };
    let total_records = items.len();

    let records: Vec<serde_json::Map<String, Json>> = items
        .into_iter()
        .filter_map(|item| match item {
            Json::Object(map) if map.values().all(is_scalar) => Some(map),
            _ => None,
        })
        .collect();
    let quarantined = total_records - records.len();

    let mut seen: HashSet<&str> = HashSet::new();
    let mut columns: Vec<String> = Vec::new();
    for rec in &records {
        for key in rec.keys() {
            if seen.insert(key.as_str()) {
                columns.push(key.clone());
            }
        }
    }

    let mut table = Table::new(columns.clone());
    for rec in &records {
        let row = columns
            .iter()
            .map(|c| rec.get(c).map(scalar_cell).unwrap_or(Cell::Missing))
            .collect();
        table.push_row(row)?;
    }

    let report = LoadReport {
        total_records,
        loaded_rows: table.len(),
        quarantined,
        columns: columns.len(),
    };
    Ok((table, report))
}

fn is_scalar(v: &Json) -> bool {
    !matches!(v, Json::Array(_) | Json::Object(_))
}

fn scalar_cell(v: &Json) -> Cell {
    match v {
        Json::Null => Cell::Missing,
        Json::String(s) => Cell::text(s.clone()),
        Json::Bool(b) => Cell::text(b.to_string()),
        Json::Number(n) => n.as_f64().map(Cell::number).unwrap_or(Cell::Missing),
        Json::Array(_) | Json::Object(_) => Cell::Missing,
    }
}

fn json_kind(v: &Json) -> &'static str {
    match v {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}
