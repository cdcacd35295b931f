use chrono::{Datelike, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref YEAR_PATTERN: Regex = Regex::new("^[0-9][0-9][0-9][0-9]$").unwrap();
    static ref DATE_PATTERN: Regex = Regex::new("^[0-9]+ [A-Za-z]+ [0-9][0-9][0-9][0-9]$").unwrap();
    static ref TIMESTAMP_VALUE_PATTERN: Regex =
        Regex::new("^[0-9][0-9][0-9][0-9]-[0-9][0-9]-[0-9][0-9]T00:00:00Z").unwrap();
}

/// Whether the string is a bare `YYYY` year.
pub fn is_year(s: &str) -> bool {
    YEAR_PATTERN.is_match(s.trim())
}

/// Whether the string is a frontend-style date like `15 July 2018`.
pub fn is_date(s: &str) -> bool {
    DATE_PATTERN.is_match(s.trim())
}

/// Whether the string is a timestamp, with or without surrounding quotes.
pub fn is_timestamp(s: &str) -> bool {
    let trimmed = s.trim();
    TIMESTAMP_VALUE_PATTERN.is_match(trimmed.trim_matches('"'))
}

/// `1998` -> `1998-01-01T00:00:00Z`.
pub fn year_to_timestamp(year: &str) -> String {
    format!("{}-01-01T00:00:00Z", year.trim())
}

/// `15 July 2018` -> `2018-07-15T00:00:00Z`.
pub fn date_to_timestamp(date: &str) -> Option<String> {
    let parsed = NaiveDate::parse_from_str(date.trim(), "%d %B %Y").ok()?;
    Some(format!(
        "{:04}-{:02}-{:02}T00:00:00Z",
        parsed.year(),
        parsed.month(),
        parsed.day()
    ))
}

/// The `YYYY` prefix of a timestamp.
pub fn timestamp_year(timestamp: &str) -> Option<&str> {
    let trimmed = timestamp.trim().trim_matches('"');
    trimmed.split('-').next().filter(|year| !year.is_empty())
}

/// Normalise a raw dump value to a KB id or literal.
///
/// Typed date/decimal values lose their schema suffix; bare years and
/// frontend dates become timestamps; KB urls reduce to their trailing id;
/// anything else loses surrounding quotes.
pub fn normalize_dump_value(value: &str) -> String {
    if value.is_empty() {
        return value.to_string();
    }
    if value.contains("XMLSchema#dateTime") || value.contains("XMLSchema#decimal") {
        let inner = value.splitn(3, '"').nth(1).unwrap_or(value);
        return inner.replace('+', "");
    }
    if !value.contains("www.wikidata.org") {
        if is_year(value) {
            return year_to_timestamp(value);
        }
        if is_date(value) {
            if let Some(timestamp) = date_to_timestamp(value) {
                return timestamp;
            }
        }
        return value.replace('"', "");
    }
    value
        .rsplit('/')
        .next()
        .unwrap_or(value)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_and_date_classification() {
        assert!(is_year("1998"));
        assert!(!is_year("98"));
        assert!(is_date("15 July 2018"));
        assert!(!is_date("July 2018"));
        assert!(is_timestamp("2018-07-15T00:00:00Z"));
        assert!(is_timestamp("\"2018-07-15T00:00:00Z\""));
    }

    #[test]
    fn conversions_round_trip() {
        assert_eq!(year_to_timestamp("1998"), "1998-01-01T00:00:00Z");
        assert_eq!(
            date_to_timestamp("15 July 2018").as_deref(),
            Some("2018-07-15T00:00:00Z")
        );
        assert_eq!(timestamp_year("2018-07-15T00:00:00Z"), Some("2018"));
    }

    #[test]
    fn dump_values_normalise() {
        assert_eq!(
            normalize_dump_value("http://www.wikidata.org/entity/Q47774"),
            "Q47774"
        );
        assert_eq!(normalize_dump_value("1998"), "1998-01-01T00:00:00Z");
        assert_eq!(
            normalize_dump_value("\"+2018-07-15T00:00:00Z\"^^<http://www.w3.org/2001/XMLSchema#dateTime>"),
            "2018-07-15T00:00:00Z"
        );
        assert_eq!(normalize_dump_value("\"some text\""), "some text");
    }
}
