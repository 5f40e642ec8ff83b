// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
///
/// Microsecond precision with a fixed width keeps lexicographic order equal
/// to chronological order, which the store relies on for newest-first sorts.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time, formatted with [`format_utc_rfc3339`].
pub fn now_rfc3339() -> String {
    format_utc_rfc3339(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_lexicographic_order_matches_time_order() {
        let earlier = Utc.with_ymd_and_hms(2026, 1, 9, 23, 59, 59).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();

        let a = format_utc_rfc3339(earlier);
        let b = format_utc_rfc3339(later);

        assert!(a < b);
        assert_eq!(b, "2026-01-10T00:00:00.000000Z");
    }
}
