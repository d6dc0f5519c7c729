//! Heuristic parsing of the human-readable publication stamps that news
//! pages render instead of machine dates.
//!
//! The stamps come in a handful of shapes: a bare time for today's items,
//! "today"/"yesterday" prefixes, a day-month phrase for the current year,
//! and a full dotted date for older items. Each shape gets its own matcher;
//! matchers run in order and the first one that fits wins. A phrase that
//! fits none of them yields `None` (the item is stored without a date) and
//! is logged once for diagnostics, per the soft-failure policy: a bad date
//! must never abort a batch.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::warn;

const MONTHS: &[(&str, u32)] = &[
    ("january", 1),
    ("february", 2),
    ("march", 3),
    ("april", 4),
    ("may", 5),
    ("june", 6),
    ("july", 7),
    ("august", 8),
    ("september", 9),
    ("october", 10),
    ("november", 11),
    ("december", 12),
];

fn month_number(name: &str) -> Option<u32> {
    MONTHS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, num)| *num)
}

/// Parse a publication stamp like "today, 14:05", "yesterday, 09:12",
/// "3 march, 10:00" or "12.03.18 22:40" relative to `today`.
pub fn parse_published(phrase: &str, today: NaiveDate) -> Option<NaiveDateTime> {
    let normalized = phrase.trim().to_lowercase();
    let words: Vec<&str> = normalized
        .split([' ', ','])
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        return None;
    }

    let Some(time) = parse_time(words[words.len() - 1]) else {
        warn!("unrecognized publication date phrase: '{}'", phrase);
        return None;
    };

    let matchers: [fn(&[&str], NaiveDate) -> Option<NaiveDate>; 4] = [
        match_bare_time,
        match_relative_day,
        match_dotted_date,
        match_day_month,
    ];
    for matcher in matchers {
        if let Some(date) = matcher(&words, today) {
            return Some(NaiveDateTime::new(date, time));
        }
    }

    warn!("unrecognized publication date phrase: '{}'", phrase);
    None
}

/// Same as [`parse_published`] anchored to the current local date.
pub fn parse_published_now(phrase: &str) -> Option<NaiveDateTime> {
    parse_published(phrase, chrono::Local::now().date_naive())
}

fn parse_time(word: &str) -> Option<NaiveTime> {
    let (h, m) = word.split_once(':')?;
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// "14:05" alone: nothing but a time means the item was published today.
fn match_bare_time(words: &[&str], today: NaiveDate) -> Option<NaiveDate> {
    (words.len() == 1).then_some(today)
}

/// "today, 14:05" / "yesterday, 09:12".
fn match_relative_day(words: &[&str], today: NaiveDate) -> Option<NaiveDate> {
    if words.len() != 2 {
        return None;
    }
    match words[0] {
        "today" => Some(today),
        "yesterday" => Some(today - Duration::days(1)),
        _ => None,
    }
}

/// "12.03.18 22:40". Two-digit years are read as 2000+YY.
fn match_dotted_date(words: &[&str], _today: NaiveDate) -> Option<NaiveDate> {
    if words.len() != 2 {
        return None;
    }
    let mut parts = words[0].splitn(3, '.');
    let day: u32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let year: i32 = parts.next()?.parse().ok()?;
    NaiveDate::from_ymd_opt(2000 + year, month, day)
}

/// "3 march, 10:00" carries no year; assume the current one, rolling back a
/// year if that would put the date in the future.
fn match_day_month(words: &[&str], today: NaiveDate) -> Option<NaiveDate> {
    if words.len() != 3 {
        return None;
    }
    let day: u32 = words[0].parse().ok()?;
    let month = month_number(words[1])?;
    let date = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if date > today {
        NaiveDate::from_ymd_opt(today.year() - 1, month, day)
    } else {
        Some(date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor() -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, 3, 12).unwrap()
    }

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn bare_time_is_today() {
        assert_eq!(
            parse_published("14:05", anchor()),
            Some(dt(2018, 3, 12, 14, 5))
        );
    }

    #[test]
    fn today_and_yesterday() {
        assert_eq!(
            parse_published("today, 14:05", anchor()),
            Some(dt(2018, 3, 12, 14, 5))
        );
        assert_eq!(
            parse_published("yesterday, 09:12", anchor()),
            Some(dt(2018, 3, 11, 9, 12))
        );
    }

    #[test]
    fn dotted_date_expands_two_digit_year() {
        assert_eq!(
            parse_published("12.03.18 22:40", anchor()),
            Some(dt(2018, 3, 12, 22, 40))
        );
        assert_eq!(
            parse_published("01.01.05 00:01", anchor()),
            Some(dt(2005, 1, 1, 0, 1))
        );
    }

    #[test]
    fn day_month_uses_current_year() {
        assert_eq!(
            parse_published("3 march, 10:00", anchor()),
            Some(dt(2018, 3, 3, 10, 0))
        );
    }

    #[test]
    fn day_month_in_future_rolls_back_a_year() {
        // Anchored at 2018-03-12, "20 march" has not happened yet.
        assert_eq!(
            parse_published("20 march, 10:00", anchor()),
            Some(dt(2017, 3, 20, 10, 0))
        );
    }

    #[test]
    fn case_and_spacing_are_forgiven() {
        assert_eq!(
            parse_published("  Today,  14:05 ", anchor()),
            Some(dt(2018, 3, 12, 14, 5))
        );
    }

    #[test]
    fn unknown_phrase_is_none_not_error() {
        assert_eq!(parse_published("a few moments ago", anchor()), None);
        assert_eq!(parse_published("", anchor()), None);
        assert_eq!(parse_published("today, noon", anchor()), None);
    }
}
