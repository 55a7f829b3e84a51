// Aggregations and derived views over the clean table: rankings, filters,
// descriptive statistics, chart series and map coordinates.
use crate::cleaner::CleanReport;
use crate::error::{Error, Result};
use crate::types::{
    AggregateView, Cell, ColumnStats, GroupMean, HistogramBin, MapPoint, MissingRow, RankingRow,
    StatsRow, SummaryStats, Table, Value,
};
use crate::util::{average, format_int, format_number, quantile, sort_floats, std_dev};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

pub const DEFAULT_GROUP_BY: &str = "departamento";
pub const DEFAULT_TOP_N: usize = 10;
pub const DEFAULT_BINS: usize = 30;

/// Mean of `metric` per `group_by` value, highest first, at most `n` groups.
///
/// A zero-row table yields an empty view regardless of its columns. Missing
/// metric values are ignored; groups with nothing to average are left out.
pub fn top_n_by_mean(clean: &Table, metric: &str, group_by: &str, n: usize) -> Result<AggregateView> {
    let mut view = AggregateView {
        metric: metric.to_string(),
        group_by: group_by.to_string(),
        entries: Vec::new(),
    };
    if clean.is_empty() {
        return Ok(view);
    }
    let g = clean.require_column(group_by)?;
    let m = clean.require_numeric(metric)?;

    // Insertion order keeps tie-breaking independent of hash order.
    let mut order: Vec<String> = Vec::new();
    let mut acc: HashMap<String, Vec<f64>> = HashMap::new();
    for row in clean.rows() {
        let Some(key) = row[g].value() else { continue };
        let Some(v) = row[m].as_number() else { continue };
        let key = key.to_string();
        let e = acc.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            Vec::new()
        });
        e.push(v);
    }

    let mut entries: Vec<GroupMean> = order
        .into_iter()
        .filter_map(|group| {
            let values = acc.remove(&group)?;
            Some(GroupMean {
                mean: average(&values),
                count: values.len(),
                group,
            })
        })
        .collect();
    entries.sort_by(|a, b| {
        b.mean
            .partial_cmp(&a.mean)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.group.cmp(&b.group))
    });
    entries.truncate(n);
    view.entries = entries;
    Ok(view)
}

/// Rows whose `column` equals `division`, in original order.
/// No match is a normal outcome and gives a zero-row table.
pub fn filter_by_division(clean: &Table, column: &str, division: &Value) -> Result<Table> {
    let mut out = Table::new(clean.columns().to_vec());
    if clean.is_empty() {
        return Ok(out);
    }
    let idx = clean.require_column(column)?;
    for row in clean.rows() {
        if row[idx].value() == Some(division) {
            out.push_row(row.clone())?;
        }
    }
    Ok(out)
}

/// Present values of a column, first-seen order, without repeats.
pub fn distinct_values(table: &Table, column: &str) -> Result<Vec<Value>> {
    let idx = table.require_column(column)?;
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for v in table.column_cells(idx).filter_map(Cell::value) {
        if seen.insert(v.to_string()) {
            out.push(v.clone());
        }
    }
    Ok(out)
}

/// Columns that can be used as a metric: at least one value, all numeric.
pub fn metric_columns(table: &Table) -> Vec<String> {
    table
        .columns()
        .iter()
        .enumerate()
        .filter(|(i, _)| table.column_cells(*i).any(|c| !c.is_missing()) && table.is_numeric_column(*i))
        .map(|(_, c)| c.clone())
        .collect()
}

pub fn describe(table: &Table) -> Vec<ColumnStats> {
    metric_columns(table)
        .into_iter()
        .filter_map(|column| {
            let idx = table.column_index(&column)?;
            let mut values = table.numbers(idx);
            sort_floats(&mut values);
            Some(ColumnStats {
                count: values.len(),
                mean: average(&values),
                std: std_dev(&values),
                min: *values.first()?,
                q25: quantile(&values, 0.25),
                median: quantile(&values, 0.5),
                q75: quantile(&values, 0.75),
                max: *values.last()?,
                column,
            })
        })
        .collect()
}

pub fn missing_counts(table: &Table) -> Vec<(String, usize)> {
    table
        .columns()
        .iter()
        .enumerate()
        .map(|(i, c)| (c.clone(), table.column_cells(i).filter(|c| c.is_missing()).count()))
        .collect()
}

/// `(year, value)` pairs for a line or scatter chart, sorted by year.
/// Rows missing either side are skipped.
pub fn year_series(table: &Table, year_column: &str, metric: &str) -> Result<Vec<(i32, f64)>> {
    if table.is_empty() {
        return Ok(Vec::new());
    }
    let y = table.require_column(year_column)?;
    let m = table.require_numeric(metric)?;
    let mut points: Vec<(i32, f64)> = table
        .rows()
        .iter()
        .filter_map(|row| Some((row[y].value()?.as_year()?, row[m].as_number()?)))
        .collect();
    // Stable, so rows of the same year keep input order.
    points.sort_by_key(|(year, _)| *year);
    Ok(points)
}

/// Year series restricted to one division, for the per-division scatter.
pub fn division_year_series(
    table: &Table,
    division_column: &str,
    division: &Value,
    year_column: &str,
    metric: &str,
) -> Result<Vec<(i32, f64)>> {
    let rows = filter_by_division(table, division_column, division)?;
    year_series(&rows, year_column, metric)
}

/// Equal-width bins over `[min, max]`. The maximum lands in the last bin.
pub fn histogram(table: &Table, metric: &str, bins: usize) -> Result<Vec<HistogramBin>> {
    if bins == 0 {
        return Err(Error::InvalidArgument("histogram needs at least one bin".to_string()));
    }
    if table.is_empty() {
        return Ok(Vec::new());
    }
    let m = table.require_numeric(metric)?;
    let values = table.numbers(m);
    if values.is_empty() {
        return Ok(Vec::new());
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == min {
        return Ok(vec![HistogramBin {
            lower: min,
            upper: max,
            count: values.len(),
        }]);
    }

    let width = (max - min) / bins as f64;
    let mut out: Vec<HistogramBin> = (0..bins)
        .map(|i| HistogramBin {
            lower: min + width * i as f64,
            upper: if i + 1 == bins { max } else { min + width * (i + 1) as f64 },
            count: 0,
        })
        .collect();
    for v in values {
        let i = (((v - min) / width) as usize).min(bins - 1);
        out[i].count += 1;
    }
    Ok(out)
}

/// Coordinates for the map. Both columns must exist and be numeric.
pub fn map_points(table: &Table, lat: &str, lon: &str) -> Result<Vec<MapPoint>> {
    if table.is_empty() {
        return Ok(Vec::new());
    }
    let la = table.require_numeric(lat)?;
    let lo = table.require_numeric(lon)?;
    Ok(table
        .rows()
        .iter()
        .filter_map(|row| {
            Some(MapPoint {
                lat: row[la].as_number()?,
                lon: row[lo].as_number()?,
            })
        })
        .collect())
}

pub fn ranking_rows(view: &AggregateView) -> Vec<RankingRow> {
    view.entries
        .iter()
        .enumerate()
        .map(|(i, e)| RankingRow {
            rank: i + 1,
            division: e.group.clone(),
            mean: format_number(e.mean, 2),
            rows: e.count,
        })
        .collect()
}

pub fn stats_rows(stats: &[ColumnStats]) -> Vec<StatsRow> {
    stats
        .iter()
        .map(|s| StatsRow {
            column: s.column.clone(),
            count: format_int(s.count),
            mean: format_number(s.mean, 2),
            std: format_number(s.std, 2),
            min: format_number(s.min, 2),
            q25: format_number(s.q25, 2),
            median: format_number(s.median, 2),
            q75: format_number(s.q75, 2),
            max: format_number(s.max, 2),
        })
        .collect()
}

pub fn missing_rows(counts: &[(String, usize)]) -> Vec<MissingRow> {
    counts
        .iter()
        .map(|(column, n)| MissingRow {
            column: column.clone(),
            missing: format_int(*n),
        })
        .collect()
}

pub fn generate_summary(clean: &Table, report: &CleanReport, division_column: &str) -> SummaryStats {
    let total_divisions = distinct_values(clean, division_column)
        .map(|v| v.len())
        .unwrap_or(0);
    SummaryStats {
        total_rows: clean.len(),
        total_columns: clean.columns().len(),
        total_divisions,
        year_derived: report.year_derived,
        rows_dropped_missing: report.dropped_missing,
        rows_dropped_after_coercion: report.dropped_after_coercion,
        columns: describe(clean),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaner::{clean, CleanRules};
    use crate::loader::parse_records;

    fn table() -> Table {
        let body = r#"[
            {"a_o":"2019","departamento":"META","municipio":"ACACIAS","tasa":"10","lat":"3.98","lon":"-73.76"},
            {"a_o":"2020","departamento":"META","municipio":"GRANADA","tasa":"20","lat":"3.54","lon":"-73.70"},
            {"a_o":"2019","departamento":"HUILA","municipio":"NEIVA","tasa":"40","lat":"2.93","lon":"-75.28"},
            {"a_o":"2018","departamento":"CAUCA","municipio":"POPAYAN","tasa":"5","lat":"2.44","lon":"-76.61"},
            {"a_o":"2021","departamento":"HUILA","municipio":"PITALITO","tasa":"30","lat":"1.85","lon":"-76.05"}
        ]"#;
        let raw = parse_records(body).unwrap().0;
        clean(&raw, &CleanRules::default()).unwrap().0
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn top_n_ranks_by_mean_descending() {
        let view = top_n_by_mean(&table(), "tasa", DEFAULT_GROUP_BY, DEFAULT_TOP_N).unwrap();
        let groups: Vec<&str> = view.entries.iter().map(|e| e.group.as_str()).collect();
        assert_eq!(groups, vec!["HUILA", "META", "CAUCA"]);
        assert_eq!(view.entries[0].mean, 35.0);
        assert_eq!(view.entries[0].count, 2);
        assert!(view.entries.windows(2).all(|w| w[0].mean >= w[1].mean));
    }

    #[test]
    fn top_n_truncates() {
        let view = top_n_by_mean(&table(), "tasa", DEFAULT_GROUP_BY, 2).unwrap();
        assert_eq!(view.len(), 2);
        let none = top_n_by_mean(&table(), "tasa", DEFAULT_GROUP_BY, 0).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn top_n_rejects_bad_columns() {
        let t = table();
        assert!(matches!(
            top_n_by_mean(&t, "municipio", DEFAULT_GROUP_BY, 10),
            Err(Error::InvalidColumn { .. })
        ));
        assert!(matches!(
            top_n_by_mean(&t, "Year", DEFAULT_GROUP_BY, 10),
            Err(Error::InvalidColumn { .. })
        ));
        assert!(matches!(
            top_n_by_mean(&t, "missing", DEFAULT_GROUP_BY, 10),
            Err(Error::MissingColumn(_))
        ));
        assert!(matches!(
            top_n_by_mean(&t, "tasa", "region", 10),
            Err(Error::MissingColumn(_))
        ));
    }

    #[test]
    fn top_n_skips_missing_values_and_empty_groups() {
        let mut t = Table::new(vec!["departamento".into(), "tasa".into()]);
        t.push_row(vec![Cell::text("META"), Cell::number(4.0)]).unwrap();
        t.push_row(vec![Cell::text("META"), Cell::Missing]).unwrap();
        t.push_row(vec![Cell::text("CAUCA"), Cell::Missing]).unwrap();
        t.push_row(vec![Cell::Missing, Cell::number(100.0)]).unwrap();
        let view = top_n_by_mean(&t, "tasa", "departamento", 10).unwrap();
        assert_eq!(
            view.entries,
            vec![GroupMean {
                group: "META".into(),
                mean: 4.0,
                count: 1
            }]
        );
    }

    #[test]
    fn empty_table_aggregates_to_nothing() {
        let view = top_n_by_mean(&Table::empty(), "tasa", DEFAULT_GROUP_BY, 10).unwrap();
        assert!(view.is_empty());
        assert!(view.to_table().is_empty());
    }

    #[test]
    fn filter_keeps_matching_rows_in_order() {
        let t = table();
        let huila = filter_by_division(&t, DEFAULT_GROUP_BY, &text("HUILA")).unwrap();
        assert_eq!(huila.len(), 2);
        assert_eq!(huila.columns(), t.columns());
        let muni = huila.column_index("municipio").unwrap();
        assert_eq!(huila.rows()[0][muni], Cell::text("NEIVA"));
        assert_eq!(huila.rows()[1][muni], Cell::text("PITALITO"));
    }

    #[test]
    fn filter_with_unknown_division_is_empty_not_error() {
        let t = table();
        let none = filter_by_division(&t, DEFAULT_GROUP_BY, &text("AMAZONAS")).unwrap();
        assert!(none.is_empty());
        assert_eq!(none.columns(), t.columns());
        assert!(matches!(
            filter_by_division(&t, "region", &text("X")),
            Err(Error::MissingColumn(_))
        ));
    }

    #[test]
    fn describe_numeric_columns() {
        let stats = describe(&table());
        let tasa = stats.iter().find(|s| s.column == "tasa").unwrap();
        assert_eq!(tasa.count, 5);
        assert_eq!(tasa.mean, 21.0);
        assert_eq!(tasa.min, 5.0);
        assert_eq!(tasa.median, 20.0);
        assert_eq!(tasa.max, 40.0);
        assert!(stats.iter().all(|s| s.column != "departamento" && s.column != "Year"));
    }

    #[test]
    fn year_series_is_sorted() {
        let series = year_series(&table(), "Year", "tasa").unwrap();
        assert_eq!(
            series,
            vec![(2018, 5.0), (2019, 10.0), (2019, 40.0), (2020, 20.0), (2021, 30.0)]
        );
        assert!(matches!(
            year_series(&table(), "Año", "tasa"),
            Err(Error::MissingColumn(_))
        ));
    }

    #[test]
    fn division_series_only_holds_that_division() {
        let t = table();
        let huila =
            division_year_series(&t, DEFAULT_GROUP_BY, &text("HUILA"), "Year", "tasa").unwrap();
        assert_eq!(huila, vec![(2019, 40.0), (2021, 30.0)]);

        let none =
            division_year_series(&t, DEFAULT_GROUP_BY, &text("AMAZONAS"), "Year", "tasa").unwrap();
        assert!(none.is_empty());
        assert!(matches!(
            division_year_series(&t, DEFAULT_GROUP_BY, &text("HUILA"), "Year", "municipio"),
            Err(Error::InvalidColumn { .. })
        ));
    }

    #[test]
    fn tiny_ranges_still_get_split() {
        let mut t = Table::new(vec!["v".into()]);
        t.push_row(vec![Cell::number(1e-20)]).unwrap();
        t.push_row(vec![Cell::number(2e-20)]).unwrap();
        let bins = histogram(&t, "v", 2).unwrap();
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0].count, 1);
        assert_eq!(bins[1].count, 1);
    }

    #[test]
    fn histogram_counts_every_value() {
        let bins = histogram(&table(), "tasa", 4).unwrap();
        assert_eq!(bins.len(), 4);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 5);
        assert_eq!(bins[0].count, 2);
        assert_eq!(bins[3].upper, 40.0);
        assert_eq!(bins[3].count, 1);
        assert!(matches!(
            histogram(&table(), "tasa", 0),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn constant_column_has_one_bin() {
        let mut t = Table::new(vec!["v".into()]);
        t.push_row(vec![Cell::number(2.0)]).unwrap();
        t.push_row(vec![Cell::number(2.0)]).unwrap();
        let bins = histogram(&t, "v", DEFAULT_BINS).unwrap();
        assert_eq!(bins.len(), 1);
        assert_eq!(bins[0].count, 2);
    }

    #[test]
    fn map_points_need_coordinate_columns() {
        let points = map_points(&table(), "lat", "lon").unwrap();
        assert_eq!(points.len(), 5);
        assert_eq!(points[0], MapPoint { lat: 3.98, lon: -73.76 });

        let raw = parse_records(r#"[{"departamento":"META","tasa":"1"}]"#).unwrap().0;
        let no_coords = clean(&raw, &CleanRules::default()).unwrap().0;
        assert!(matches!(
            map_points(&no_coords, "lat", "lon"),
            Err(Error::MissingColumn(c)) if c == "lat"
        ));
    }

    #[test]
    fn distinct_and_missing() {
        let t = table();
        let divisions = distinct_values(&t, DEFAULT_GROUP_BY).unwrap();
        assert_eq!(divisions, vec![text("META"), text("HUILA"), text("CAUCA")]);
        assert!(missing_counts(&t).iter().all(|(_, n)| *n == 0));

        let raw = parse_records(r#"[{"a":"1"},{"b":"2"}]"#).unwrap().0;
        assert_eq!(
            missing_counts(&raw),
            vec![("a".to_string(), 1), ("b".to_string(), 1)]
        );
    }

    #[test]
    fn summary_reflects_clean_report() {
        let raw = parse_records(
            r#"[{"a_o":"2019","departamento":"META","tasa":"1"},
                {"a_o":"2019","departamento":"META","tasa":"x"}]"#,
        )
        .unwrap()
        .0;
        let (t, report) = clean(&raw, &CleanRules::default()).unwrap();
        let summary = generate_summary(&t, &report, DEFAULT_GROUP_BY);
        assert_eq!(summary.total_rows, 1);
        assert_eq!(summary.total_divisions, 1);
        assert!(summary.year_derived);
        assert_eq!(summary.rows_dropped_after_coercion, 1);
    }
}
