// Entry point and high-level CLI flow.
//
// A numbered menu drives the pipeline:
// - [1] fetches the dataset and prints a summary of the raw table,
// - [2] cleans it and prints statistics of the clean table,
// - [3]..[6] derive filtered views, rankings, chart series and map points,
// - [7] exports the processed table (xlsx + csv) and a JSON summary.
// Closing stdin exits the loop.
// The fetched and cleaned tables live in one `Session` owned by `main`.
mod cleaner;
mod error;
mod loader;
mod output;
mod reports;
mod settings;
mod types;
mod util;

use anyhow::Context;
use clap::Parser;
use cleaner::CleanReport;
use loader::Fetched;
use reqwest::blocking::Client;
use settings::{Cli, Settings};
use std::io::{self, BufRead, Write};
use std::time::Duration;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;
use types::{Table, Value};

/// Per-run pipeline state. A new fetch replaces the raw table and drops the
/// cached clean one.
#[derive(Default)]
struct Session {
    raw: Option<Table>,
    clean: Option<(Table, CleanReport)>,
}

impl Session {
    fn replace_raw(&mut self, table: Table) {
        self.raw = Some(table);
        self.clean = None;
    }

    /// Clean table for the current raw table, computed once.
    fn clean_table(&mut self, settings: &Settings) -> Option<&(Table, CleanReport)> {
        if self.clean.is_none() {
            let raw = self.raw.as_ref()?;
            match cleaner::clean(raw, &settings.clean_rules()) {
                Ok(cleaned) => self.clean = Some(cleaned),
                Err(e) => {
                    error!(error = %e, "cleaning failed");
                    return None;
                }
            }
        }
        self.clean.as_ref()
    }
}

/// Read a single line of input after printing `prompt`.
///
/// `None` once stdin is closed or unreadable.
fn read_line(prompt: &str) -> Option<String> {
    print!("{}", prompt);
    let _ = io::stdout().flush();
    read_trimmed(&mut io::stdin().lock())
}

fn read_trimmed<R: BufRead>(input: &mut R) -> Option<String> {
    let mut buf = String::new();
    match input.read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

fn print_overview(table: &Table) {
    println!("Total rows: {}", util::format_int(table.len()));
    println!("\nDescriptive statistics:");
    output::preview_table_rows(&reports::stats_rows(&reports::describe(table)), usize::MAX);
    println!("Missing values per column:");
    output::preview_table_rows(
        &reports::missing_rows(&reports::missing_counts(table)),
        usize::MAX,
    );
}

/// Option [1]: fetch the dataset.
fn handle_load(session: &mut Session, client: &Client, settings: &Settings) {
    println!("Loading data from {} ...", settings.endpoint);
    let fetched = loader::load_data(client, &settings.endpoint, settings.limit);
    match &fetched {
        Fetched::Loaded(table, report) => {
            println!(
                "Data loaded ({} rows, {} columns).",
                util::format_int(report.loaded_rows),
                util::format_int(report.columns)
            );
            if report.quarantined > 0 {
                println!(
                    "Note: {} records skipped because they are not flat objects.",
                    util::format_int(report.quarantined)
                );
            }
            output::preview_table(table, settings.preview_rows);
            print_overview(table);
        }
        Fetched::Empty => println!("The endpoint returned no records.\n"),
        Fetched::Failed(e) => {
            // Keep whatever an earlier fetch produced.
            println!("Error: could not load data: {}\n", e);
            return;
        }
    }
    session.replace_raw(fetched.into_table());
}

/// Option [2]: clean the fetched table.
fn handle_clean(session: &mut Session, settings: &Settings) {
    if session.raw.is_none() {
        println!("Error: No data loaded. Please load the data first (option 1).\n");
        return;
    }
    let Some((clean, report)) = session.clean_table(settings) else {
        println!("Error: cleaning failed, see the log for details.\n");
        return;
    };
    println!("Clean data: {} rows", util::format_int(clean.len()));
    println!(
        "Dropped {} rows with missing values and {} rows with non-numeric values ({} cells).",
        util::format_int(report.dropped_missing),
        util::format_int(report.dropped_after_coercion),
        util::format_int(report.coerced_to_missing)
    );
    if !report.year_derived {
        println!("Note: no '{}' field, so no {} column.", settings.year_field, settings.year_column);
    }
    println!();
    output::preview_table(clean, settings.preview_rows);
    print_overview(clean);
}

fn require_clean<'a>(session: &'a mut Session, settings: &Settings) -> Option<&'a Table> {
    if session.raw.is_none() {
        println!("Error: No data loaded. Please load the data first (option 1).\n");
        return None;
    }
    match session.clean_table(settings) {
        Some((t, _)) if t.is_empty() => {
            println!("The clean table has no rows.\n");
            None
        }
        Some((t, _)) => Some(t),
        None => {
            println!("Error: cleaning failed, see the log for details.\n");
            None
        }
    }
}

/// Prompt for a division, listing the available ones.
fn pick_division(clean: &Table, settings: &Settings) -> Option<Value> {
    let divisions = match reports::distinct_values(clean, &settings.division_column) {
        Ok(d) => d,
        Err(e) => {
            println!("Error: {}\n", e);
            return None;
        }
    };
    let names: Vec<String> = divisions.iter().map(Value::to_string).collect();
    println!("Available: {}", names.join(", "));
    let choice = read_line("Division: ")?;
    let picked = divisions.into_iter().find(|d| d.to_string() == choice);
    Some(picked.unwrap_or(Value::Text(choice)))
}

fn pick_metric(clean: &Table) -> Option<String> {
    let metrics = reports::metric_columns(clean);
    if metrics.is_empty() {
        println!("No numeric columns to choose from.\n");
        return None;
    }
    println!("Metrics: {}", metrics.join(", "));
    read_line("Metric: ")
}

/// Option [3]: rows of one division.
fn handle_filter(session: &mut Session, settings: &Settings) {
    let Some(clean) = require_clean(session, settings) else { return };
    let Some(division) = pick_division(clean, settings) else { return };
    match reports::filter_by_division(clean, &settings.division_column, &division) {
        Ok(view) if view.is_empty() => println!("No rows for {}.\n", division),
        Ok(view) => {
            println!("{} rows for {}:\n", util::format_int(view.len()), division);
            output::preview_table(&view, settings.preview_rows);
        }
        Err(e) => println!("Error: {}\n", e),
    }
}

/// Option [4]: top divisions by the mean of a metric.
fn handle_ranking(session: &mut Session, settings: &Settings) {
    let Some(clean) = require_clean(session, settings) else { return };
    let Some(metric) = pick_metric(clean) else { return };
    match reports::top_n_by_mean(clean, &metric, &settings.division_column, settings.top_n) {
        Ok(view) => {
            println!("Top {} divisions by {}\n", view.len(), metric);
            output::preview_table_rows(&reports::ranking_rows(&view), settings.top_n);
            let path = settings.out_dir.join(output::RANKING_FILE);
            let written = std::fs::create_dir_all(&settings.out_dir)
                .map_err(error::Error::from)
                .and_then(|()| output::write_table_csv(&path, &view.to_table()));
            match written {
                Ok(()) => println!("(Full table exported to {})\n", path.display()),
                Err(e) => eprintln!("Write error: {}", e),
            }
        }
        Err(e) => println!("Error: {}\n", e),
    }
}

/// Option [5]: chart-ready series for one metric.
fn handle_charts(session: &mut Session, settings: &Settings) {
    let Some(clean) = require_clean(session, settings) else { return };
    let Some(metric) = pick_metric(clean) else { return };

    match reports::year_series(clean, &settings.year_column, &metric) {
        Ok(series) => {
            println!("{} by year ({} points)", metric, util::format_int(series.len()));
            for (year, v) in series.iter().take(settings.preview_rows) {
                println!("  {}  {}", year, util::format_number(*v, 2));
            }
            println!();
        }
        Err(e) => println!("Line chart unavailable: {}\n", e),
    }

    match reports::histogram(clean, &metric, settings.histogram_bins) {
        Ok(bins) => {
            println!("Distribution of {} ({} bins)", metric, bins.len());
            for b in &bins {
                println!(
                    "  [{}, {}]  {}",
                    util::format_number(b.lower, 2),
                    util::format_number(b.upper, 2),
                    util::format_int(b.count)
                );
            }
            println!();
        }
        Err(e) => println!("Histogram unavailable: {}\n", e),
    }

    if let Some(stats) = reports::describe(clean).into_iter().find(|s| s.column == metric) {
        println!("Box plot of {}", metric);
        output::preview_table_rows(&reports::stats_rows(&[stats]), 1);
    }

    let Some(division) = pick_division(clean, settings) else { return };
    match reports::division_year_series(
        clean,
        &settings.division_column,
        &division,
        &settings.year_column,
        &metric,
    ) {
        Ok(points) if points.is_empty() => println!("No points for {}.\n", division),
        Ok(points) => {
            println!("{} by year in {} ({} points)", metric, division, util::format_int(points.len()));
            for (year, v) in points.iter().take(settings.preview_rows) {
                println!("  {}  {}", year, util::format_number(*v, 2));
            }
            println!();
        }
        Err(e) => println!("Scatter chart unavailable: {}\n", e),
    }
}

/// Option [6]: coordinates for the map.
fn handle_map(session: &mut Session, settings: &Settings) {
    let Some(clean) = require_clean(session, settings) else { return };
    match reports::map_points(clean, &settings.latitude_column, &settings.longitude_column) {
        Ok(points) => {
            println!("{} map points", util::format_int(points.len()));
            for p in points.iter().take(settings.preview_rows) {
                println!("  ({:.5}, {:.5})", p.lat, p.lon);
            }
            println!();
        }
        Err(e) => println!("Map unavailable: {}\n", e),
    }
}

/// Option [7]: export the clean table and a JSON summary.
fn handle_export(session: &mut Session, settings: &Settings) {
    if session.raw.is_none() {
        println!("Error: No data loaded. Please load the data first (option 1).\n");
        return;
    }
    let Some((clean, report)) = session.clean_table(settings) else {
        println!("Error: cleaning failed, see the log for details.\n");
        return;
    };
    if let Err(e) = std::fs::create_dir_all(&settings.out_dir) {
        eprintln!("Write error: {}", e);
        return;
    }
    let data_path = settings.out_dir.join(output::EXPORT_FILE);
    match output::write_table_xlsx(&data_path, clean) {
        Ok(()) => {
            info!(path = %data_path.display(), rows = clean.len(), "exported clean table");
            println!("Processed data saved to {}", data_path.display());
        }
        Err(e) => eprintln!("Write error: {}", e),
    }
    let csv_path = settings.out_dir.join(output::EXPORT_CSV_FILE);
    match output::write_table_csv(&csv_path, clean) {
        Ok(()) => println!("CSV copy saved to {}", csv_path.display()),
        Err(e) => eprintln!("Write error: {}", e),
    }

    let summary = reports::generate_summary(clean, report, &settings.division_column);
    let summary_path = settings.out_dir.join(output::SUMMARY_FILE);
    match output::write_json(&summary_path, &summary) {
        Ok(()) => println!("Summary saved to {}\n", summary_path.display()),
        Err(e) => eprintln!("Write error: {}", e),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli)?;
    info!(endpoint = %settings.endpoint, limit = settings.limit, "starting");

    let mut builder = Client::builder();
    if let Some(secs) = settings.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    let client = builder.build().context("failed to build HTTP client")?;

    let mut session = Session::default();
    loop {
        println!("Education Data Dashboard");
        println!("[1] Load data from the API");
        println!("[2] Clean data");
        println!("[3] Filter by division");
        println!("[4] Top divisions by metric");
        println!("[5] Chart series for a metric");
        println!("[6] Map points");
        println!("[7] Export processed data");
        println!("[0] Exit\n");
        let Some(choice) = read_line("Enter choice: ") else {
            println!("\nInput closed. Exiting the program.");
            break;
        };
        match choice.as_str() {
            "1" => handle_load(&mut session, &client, &settings),
            "2" => handle_clean(&mut session, &settings),
            "3" => handle_filter(&mut session, &settings),
            "4" => handle_ranking(&mut session, &settings),
            "5" => handle_charts(&mut session, &settings),
            "6" => handle_map(&mut session, &settings),
            "7" => handle_export(&mut session, &settings),
            "0" => {
                println!("Exiting the program.");
                break;
            }
            _ => println!("Invalid choice. Please enter a number from 0 to 7.\n"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_raw_table_invalidates_clean_cache() {
        let settings = Settings::default();
        let mut session = Session::default();
        let (raw, _) = loader::parse_records(
            r#"[{"a_o":"2019","departamento":"META","tasa":"1"}]"#,
        )
        .unwrap();
        session.replace_raw(raw);
        assert_eq!(session.clean_table(&settings).map(|(t, _)| t.len()), Some(1));

        session.replace_raw(Table::empty());
        assert!(session.clean.is_none());
        assert_eq!(session.clean_table(&settings).map(|(t, _)| t.len()), Some(0));
    }

    #[test]
    fn closed_input_reads_as_none() {
        let mut closed = io::Cursor::new(Vec::<u8>::new());
        assert_eq!(read_trimmed(&mut closed), None);

        let mut input = io::Cursor::new(b" 3 \n".to_vec());
        assert_eq!(read_trimmed(&mut input).as_deref(), Some("3"));
        assert_eq!(read_trimmed(&mut input), None);
    }

    #[test]
    fn blank_line_is_not_end_of_input() {
        let mut input = io::Cursor::new(b"\n0\n".to_vec());
        assert_eq!(read_trimmed(&mut input).as_deref(), Some(""));
        assert_eq!(read_trimmed(&mut input).as_deref(), Some("0"));
    }

    #[test]
    fn nothing_to_clean_before_a_fetch() {
        let mut session = Session::default();
        assert!(session.clean_table(&Settings::default()).is_none());
    }
}
