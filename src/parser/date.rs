//! `Date:` header parsing.

use chrono::{DateTime, Utc};
use tracing::warn;

/// Zone abbreviations seen in European mail that RFC 2822 parsing rejects.
const NAMED_ZONES: [(&str, &str); 2] = [("CEST", "+0200"), ("CET", "+0100")];

/// Parse a `Date:` header value.
///
/// Accepts RFC 2822 (what mail headers carry, with or without a trailing
/// `(UTC)` style comment) and RFC 3339 (what the spool client hands over).
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    // Providers append comments like "(UTC)" or "(CEST)".
    let no_comment = replace_named_zone(&strip_trailing_comment(trimmed));
    if let Ok(dt) = DateTime::parse_from_rfc2822(&no_comment) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Some(dt) = mail_parser_date(trimmed) {
        return Some(dt);
    }

    warn!(date = trimmed, "Could not parse date");
    None
}

/// Last resort: let `mail-parser` interpret the value.
fn mail_parser_date(input: &str) -> Option<DateTime<Utc>> {
    use mail_parser::MessageParser;

    let fake_msg = format!("Date: {input}\n\n");
    let parsed = MessageParser::default().parse(fake_msg.as_bytes())?;
    let dt = parsed.date()?.to_rfc3339();
    DateTime::parse_from_rfc3339(&dt)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// `"Sat, 5 Oct 2024 10:00:00 +0000 (UTC)"` → `"Sat, 5 Oct 2024 10:00:00 +0000"`.
fn strip_trailing_comment(s: &str) -> String {
    if s.ends_with(')') {
        if let Some(open) = s.rfind('(') {
            return s[..open].trim_end().to_string();
        }
    }
    s.to_string()
}

fn replace_named_zone(s: &str) -> String {
    for (name, offset) in NAMED_ZONES {
        if let Some(head) = s.strip_suffix(name) {
            return format!("{head}{offset}");
        }
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(dt: DateTime<Utc>) -> String {
        dt.format("%Y-%m-%d %H:%M").to_string()
    }

    #[test]
    fn test_parse_date_rfc2822() {
        let dt = parse_date("Sat, 05 Oct 2024 10:00:00 +0200").unwrap();
        assert_eq!(ymd(dt), "2024-10-05 08:00");
    }

    #[test]
    fn test_parse_date_with_comment() {
        let dt = parse_date("Sat, 5 Oct 2024 10:00:00 +0000 (UTC)").unwrap();
        assert_eq!(ymd(dt), "2024-10-05 10:00");
    }

    #[test]
    fn test_parse_date_without_dow() {
        assert!(parse_date("05 Oct 2024 10:00:00 +0000").is_some());
    }

    #[test]
    fn test_parse_date_named_zone() {
        let dt = parse_date("Sat, 05 Oct 2024 10:00:00 CEST").unwrap();
        assert_eq!(ymd(dt), "2024-10-05 08:00");
        let dt = parse_date("Thu, 04 Jan 2024 10:00:00 EST").unwrap();
        assert_eq!(ymd(dt), "2024-01-04 15:00");
    }

    #[test]
    fn test_parse_date_rfc3339_from_spool() {
        let dt = parse_date("2024-10-06T09:30:00+02:00").unwrap();
        assert_eq!(ymd(dt), "2024-10-06 07:30");
        assert!(parse_date("2024-10-05T00:00:00Z").is_some());
    }

    #[test]
    fn test_parse_date_garbage() {
        assert!(parse_date("").is_none());
        assert!(parse_date("not a date at all").is_none());
    }

    #[test]
    fn test_strip_trailing_comment() {
        assert_eq!(
            strip_trailing_comment("Sat, 5 Oct 2024 10:00:00 +0000 (UTC)"),
            "Sat, 5 Oct 2024 10:00:00 +0000"
        );
        assert_eq!(strip_trailing_comment("no comment"), "no comment");
    }
}
