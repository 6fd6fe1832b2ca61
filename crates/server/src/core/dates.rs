use chrono::{DateTime, NaiveDate, Utc};

/// Parse a client supplied date: RFC 3339, or a plain `YYYY-MM-DD` taken as
/// midnight UTC.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Timestamps stored as RFC 3339 text
pub fn parse_stored(value: &str) -> DateTime<Utc> {
    value.parse().unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_date_formats() {
        let midnight = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_date("2024-04-01"), Some(midnight));
        assert_eq!(parse_date(" 2024-04-01T00:00:00Z "), Some(midnight));
        assert_eq!(
            parse_date("2024-04-01T05:30:00+05:30"),
            Some(midnight)
        );
        assert_eq!(parse_date("01/04/2024"), None);
        assert_eq!(parse_date(""), None);
    }
}
