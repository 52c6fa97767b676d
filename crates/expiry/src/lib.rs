//! Pure instrument-name expiry classification.
//!
//! No I/O, no config, no async — deliberately kept dependency-free beyond
//! `chrono` so it stays exhaustively unit-testable and so nothing else in
//! the fleet has to pull in a heavier crate just to ask "is this expired".

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

/// Deribit expiry settlement moment: 08:00 UTC on the named date.
pub const SETTLEMENT_HOUR_UTC: u32 = 8;

pub const DEFAULT_BUFFER: Duration = Duration::minutes(5);

/// Parses the settlement moment out of a Deribit instrument name.
///
/// Accepted forms:
/// - Option: `CCY-DDMMMYY-STRIKE-[CP]` (e.g. `ETH-10NOV25-3100-C`)
/// - Future/dated: `CCY-DDMMMYY` (e.g. `BTC-27DEC24`)
///
/// Perpetuals (`BTC-PERPETUAL`) and anything else that doesn't match the
/// `DDMMMYY` date token never expire from this function's point of view —
/// `None` is returned, and callers should treat that as "not expired".
pub fn parse_settlement(instrument_name: &str) -> Option<DateTime<Utc>> {
    let mut parts = instrument_name.split('-');
    let _currency = parts.next()?;
    let date_token = parts.next()?;

    let date = parse_date_token(date_token)?;
    date.and_hms_opt(SETTLEMENT_HOUR_UTC, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn parse_date_token(token: &str) -> Option<NaiveDate> {
    // Deribit uses %d%b%y, e.g. "10NOV25"; chrono's month abbreviations are
    // lowercase/titlecase by default so we normalize case defensively.
    if token.len() < 6 || token.len() > 7 {
        return None;
    }
    let normalized = normalize_month_case(token);
    NaiveDate::parse_from_str(&normalized, "%d%b%y").ok()
}

fn normalize_month_case(token: &str) -> String {
    // Split into leading digits, 3-letter month, trailing digits, and
    // re-title-case the month so "10NOV25" and "10nov25" both parse.
    let digit_prefix_len = token.chars().take_while(|c| c.is_ascii_digit()).count();
    if digit_prefix_len == 0 || digit_prefix_len + 3 > token.len() {
        return token.to_string();
    }
    let (day, rest) = token.split_at(digit_prefix_len);
    if rest.len() < 3 {
        return token.to_string();
    }
    let (month, year) = rest.split_at(3);
    let mut month_chars = month.chars();
    let titled: String = match month_chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + &month_chars.as_str().to_ascii_lowercase(),
        None => return token.to_string(),
    };
    format!("{day}{titled}{year}")
}

/// `is_expired(instrument_name, now, buffer) -> bool`
///
/// Conservative on parse failure: returns `false` because dropping an
/// instrument we can't classify is worse than keeping a dead one around an
/// extra cycle.
pub fn is_expired(instrument_name: &str, now: DateTime<Utc>, buffer: Duration) -> bool {
    match parse_settlement(instrument_name) {
        Some(settlement) => now >= settlement + buffer,
        None => false,
    }
}

/// Earliest settlement moment among a list of instrument names, ignoring
/// any that fail to parse.
pub fn next_expiry<'a, I>(names: I) -> Option<DateTime<Utc>>
where
    I: IntoIterator<Item = &'a str>,
{
    names.into_iter().filter_map(parse_settlement).min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, mi, s).unwrap()
    }

    #[test]
    fn parses_option_settlement() {
        let settlement = parse_settlement("ETH-10NOV25-3100-C").unwrap();
        assert_eq!(settlement, utc(2025, 11, 10, 8, 0, 0));
    }

    #[test]
    fn parses_future_settlement() {
        let settlement = parse_settlement("BTC-27DEC24").unwrap();
        assert_eq!(settlement, utc(2024, 12, 27, 8, 0, 0));
    }

    #[test]
    fn perpetual_never_expires() {
        assert!(parse_settlement("BTC-PERPETUAL").is_none());
        assert!(!is_expired("BTC-PERPETUAL", utc(2099, 1, 1, 0, 0, 0), DEFAULT_BUFFER));
    }

    #[test]
    fn garbage_name_is_not_expired() {
        assert!(!is_expired("not-an-instrument", Utc::now(), DEFAULT_BUFFER));
    }

    #[test]
    fn boundary_just_before_buffer_is_not_expired() {
        let now = utc(2025, 11, 10, 8, 4, 59);
        assert!(!is_expired("ETH-10NOV25-3100-C", now, DEFAULT_BUFFER));
    }

    #[test]
    fn boundary_at_buffer_is_expired() {
        let now = utc(2025, 11, 10, 8, 5, 0);
        assert!(is_expired("ETH-10NOV25-3100-C", now, DEFAULT_BUFFER));
    }

    #[test]
    fn next_expiry_picks_earliest() {
        let names = ["ETH-10NOV25-3100-C", "ETH-29NOV24-3600-P", "BTC-27DEC24-100000-C"];
        let next = next_expiry(names.iter().copied()).unwrap();
        assert_eq!(next, utc(2024, 11, 29, 8, 0, 0));
    }

    #[test]
    fn next_expiry_ignores_unparseable() {
        let names = ["garbage", "BTC-PERPETUAL"];
        assert!(next_expiry(names.iter().copied()).is_none());
    }
}
