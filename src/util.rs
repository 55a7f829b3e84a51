// Utility helpers for parsing and basic statistics.
//
// Raw API values arrive as loosely formatted strings; everything that turns
// them into typed values lives here so the cleaner and reports can assume
// clean numbers.
use chrono::NaiveDate;
use num_format::{Locale, ToFormattedString};
use std::cmp::Ordering;

/// Parse a string-like value into `f64`, strictly.
///
/// - Trims whitespace.
/// - Accepts plain decimals and exponents (`"12.5"`, `"1e5"`).
/// - Rejects separators of any kind: `"12,5"` and `"1,234"` are not numbers.
/// - Rejects `NaN` and infinities.
/// - Returns `None` for anything that cannot be safely parsed.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_i32_safe(s: Option<&str>) -> Option<i32> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<i32>().ok()
}

const YEAR_RANGE: std::ops::RangeInclusive<i32> = 1000..=9999;

/// Parse a strict four-digit year (`"2019"`) into January 1st of that year.
pub fn parse_year_text(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.len() != 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    year_start(parse_i32_safe(Some(s))?)
}

/// Same as `parse_year_text` for values the API sent as JSON numbers, or
/// that a previous cleaning pass already coerced.
pub fn parse_year_number(n: f64) -> Option<NaiveDate> {
    if n.fract() != 0.0 || !(1000.0..=9999.0).contains(&n) {
        return None;
    }
    year_start(n as i32)
}

// Both parsers share this range so a coerced year parses the same way twice.
fn year_start(year: i32) -> Option<NaiveDate> {
    if !YEAR_RANGE.contains(&year) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, 1, 1)
}

pub fn average(v: &[f64]) -> f64 {
    // Standard arithmetic mean; returns 0 for an empty slice to avoid NaNs.
    if v.is_empty() {
        return 0.0;
    }
    let sum: f64 = v.iter().copied().sum();
    sum / v.len() as f64
}

/// Sample standard deviation (n - 1). A single value has zero spread.
pub fn std_dev(v: &[f64]) -> f64 {
    if v.len() < 2 {
        return 0.0;
    }
    let mean = average(v);
    let ss: f64 = v.iter().map(|x| (x - mean).powi(2)).sum();
    (ss / (v.len() - 1) as f64).sqrt()
}

pub fn sort_floats(v: &mut [f64]) {
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
}

/// Percentile with linear interpolation between closest ranks.
/// `sorted` must already be sorted ascending; `q` is in `[0, 1]`.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimal places plus locale-aware thousands separators
    // (e.g. `1,234,567.89`).
    let neg = n.is_sign_negative() && n != 0.0;
    let abs_n = n.abs();
    let s = format!("{:.*}", decimals, abs_n);
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push('.');
            res.push_str(frac);
        }
    } else if decimals > 0 {
        res.push('.');
        res.push_str(&"0".repeat(decimals));
    }
    if neg && res.chars().any(|c| c.is_ascii_digit() && c != '0') {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    // Counts in console messages (e.g. `49,871 rows loaded`).
    n.to_formatted_string(&Locale::en)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_f64_safe_handles_messy_input() {
        assert_eq!(parse_f64_safe(Some(" 12.5 ")), Some(12.5));
        assert_eq!(parse_f64_safe(Some("1e5")), Some(100000.0));
        assert_eq!(parse_f64_safe(Some("12,5")), None);
        assert_eq!(parse_f64_safe(Some("1,234.5")), None);
        assert_eq!(parse_f64_safe(Some("bad")), None);
        assert_eq!(parse_f64_safe(Some("NaN")), None);
        assert_eq!(parse_f64_safe(Some("inf")), None);
        assert_eq!(parse_f64_safe(Some("")), None);
        assert_eq!(parse_f64_safe(None), None);
    }

    #[test]
    fn years_must_have_four_digits() {
        let y2019 = NaiveDate::from_ymd_opt(2019, 1, 1);
        assert_eq!(parse_year_text("2019"), y2019);
        assert_eq!(parse_year_text(" 2019 "), y2019);
        assert_eq!(parse_year_text("19"), None);
        assert_eq!(parse_year_text("2019-01"), None);
        assert_eq!(parse_year_text("abcd"), None);
        assert_eq!(parse_year_text("0999"), None);
        assert_eq!(parse_year_text("0000"), None);
        assert_eq!(parse_year_number(2019.0), y2019);
        assert_eq!(parse_year_number(2019.5), None);
        assert_eq!(parse_year_number(19.0), None);
    }

    #[test]
    fn quantiles_interpolate() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&v, 0.0), 1.0);
        assert_eq!(quantile(&v, 0.5), 2.5);
        assert_eq!(quantile(&v, 0.25), 1.75);
        assert_eq!(quantile(&v, 1.0), 4.0);
    }

    #[test]
    fn std_dev_is_sample_based() {
        assert_eq!(std_dev(&[5.0]), 0.0);
        assert!((std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]) - 2.138_089_935).abs() < 1e-6);
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(1234567.891, 2), "1,234,567.89");
        assert_eq!(format_number(-12.5, 1), "-12.5");
        assert_eq!(format_number(-0.001, 2), "0.00");
        assert_eq!(format_int(49871), "49,871");
    }
}
