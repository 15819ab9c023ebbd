use chrono::{Datelike, NaiveDate, Weekday};

/// Two-letter RRULE token for a date's weekday.
pub fn weekday_token(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

/// Whether a recurrence expression fires on `date`.
///
/// The grammar is semicolon-separated KEY=VALUE pairs, case-insensitive,
/// e.g. `FREQ=WEEKLY;BYDAY=MO,WE,FR`. Only FREQ=WEEKLY is supported: with
/// BYDAY the date's weekday must be in the listed set, without BYDAY the
/// expression fires every day. Anything else — other frequencies, missing
/// FREQ, unparseable tokens — is treated as "no match", never as an error,
/// so a broken recurrence disables its routine instead of aborting the
/// rollover that evaluates it.
pub fn matches_on(expression: &str, date: NaiveDate) -> bool {
    let expression = expression.trim().to_ascii_uppercase();
    if expression.is_empty() {
        return false;
    }

    let mut freq = None;
    let mut byday: Vec<&str> = Vec::new();
    for part in expression.split(';') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        match key.trim() {
            "FREQ" => freq = Some(value.trim()),
            "BYDAY" => {
                byday = value
                    .split(',')
                    .map(str::trim)
                    .filter(|token| !token.is_empty())
                    .collect();
            }
            _ => {}
        }
    }

    if freq != Some("WEEKLY") {
        tracing::debug!(%expression, "unsupported or missing FREQ, routine skipped");
        return false;
    }

    byday.is_empty() || byday.contains(&weekday_token(date))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // 2024-01-01 was a Monday.
    const MONDAY: (i32, u32, u32) = (2024, 1, 1);

    #[test]
    fn weekday_tokens_cover_the_week() {
        let tokens: Vec<_> = (1..=7)
            .map(|d| weekday_token(date(2024, 1, d)))
            .collect();
        assert_eq!(tokens, ["MO", "TU", "WE", "TH", "FR", "SA", "SU"]);
    }

    #[test]
    fn byday_restricts_to_listed_weekdays() {
        let expr = "FREQ=WEEKLY;BYDAY=MO,WE,FR";
        assert!(matches_on(expr, date(2024, 1, 1))); // Monday
        assert!(!matches_on(expr, date(2024, 1, 2))); // Tuesday
        assert!(matches_on(expr, date(2024, 1, 3))); // Wednesday
        assert!(!matches_on(expr, date(2024, 1, 4))); // Thursday
        assert!(matches_on(expr, date(2024, 1, 5))); // Friday
        assert!(!matches_on(expr, date(2024, 1, 6))); // Saturday
    }

    #[test]
    fn weekly_without_byday_fires_every_day() {
        for d in 1..=7 {
            assert!(matches_on("FREQ=WEEKLY", date(2024, 1, d)));
        }
    }

    #[test]
    fn only_weekly_frequency_is_recognized() {
        let (y, m, d) = MONDAY;
        assert!(!matches_on("FREQ=MONTHLY", date(y, m, d)));
        assert!(!matches_on("FREQ=DAILY;BYDAY=MO", date(y, m, d)));
        assert!(!matches_on("BYDAY=MO", date(y, m, d)));
    }

    #[test]
    fn malformed_expressions_never_match_and_never_panic() {
        let (y, m, d) = MONDAY;
        assert!(!matches_on("", date(y, m, d)));
        assert!(!matches_on("garbage;;;", date(y, m, d)));
        assert!(!matches_on(";;;=;==", date(y, m, d)));
        assert!(!matches_on("FREQ", date(y, m, d)));
    }

    #[test]
    fn grammar_is_case_insensitive_and_whitespace_tolerant() {
        assert!(matches_on("freq=weekly;byday=mo, we", date(2024, 1, 1)));
        assert!(matches_on(" FREQ = WEEKLY ", date(2024, 1, 6)));
        // Empty BYDAY list degrades to "every day" like an absent BYDAY.
        assert!(matches_on("FREQ=WEEKLY;BYDAY=", date(2024, 1, 6)));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        assert!(matches_on("FREQ=WEEKLY;INTERVAL=2;BYDAY=MO", date(2024, 1, 1)));
    }
}
