use chrono::NaiveDate;
use sha2::{Digest, Sha256};

/// Field separator fed to the hasher. ASCII unit separator never shows up in
/// scraped titles, names or display times.
const SEPARATOR: &[u8] = &[0x1f];

/// Deterministic id for a showtime: hex SHA-256 over theater, movie, date and time.
pub fn showtime_id(theater: &str, movie: &str, date: NaiveDate, time: &str) -> String {
    let date = date.format("%Y-%m-%d").to_string();
    let mut hasher = Sha256::new();
    for (i, field) in [theater, movie, date.as_str(), time].iter().enumerate() {
        if i > 0 {
            hasher.update(SEPARATOR);
        }
        hasher.update(field.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 9).unwrap()
    }

    #[test]
    fn same_fields_same_id() {
        let a = showtime_id("AMC Empire 25", "Heat", day(), "7:30 PM");
        let b = showtime_id("AMC Empire 25", "Heat", day(), "7:30 PM");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn any_field_changes_id() {
        let base = showtime_id("A", "Heat", day(), "7:30 PM");
        assert_ne!(base, showtime_id("B", "Heat", day(), "7:30 PM"));
        assert_ne!(base, showtime_id("A", "Ronin", day(), "7:30 PM"));
        assert_ne!(base, showtime_id("A", "Heat", day().succ_opt().unwrap(), "7:30 PM"));
        assert_ne!(base, showtime_id("A", "Heat", day(), "9:45 PM"));
    }

    #[test]
    fn shifting_text_between_fields_changes_id() {
        // "Regal-Union" + "Square" must not collide with "Regal" + "Union-Square".
        assert_ne!(
            showtime_id("Regal-Union", "Square", day(), "7:30 PM"),
            showtime_id("Regal", "Union-Square", day(), "7:30 PM")
        );
    }
}
