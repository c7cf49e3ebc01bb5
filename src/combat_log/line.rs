use std::str::FromStr;

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime};

const TIMESTAMP_SEPARATOR: &str = "  ";

/// One parsed combat log line. `fields[0]` is the event type.
#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    pub timestamp: NaiveDateTime,
    pub event_type: String,
    pub fields: Vec<String>,
    pub raw: String,
}

impl LogLine {
    /// Lines without a timestamp separator or payload carry no fields.
    pub fn is_degraded(&self) -> bool {
        self.event_type.is_empty()
    }

    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    /// Field with surrounding quotes removed; `nil` and empty values read as absent.
    pub fn text_field(&self, index: usize) -> Option<String> {
        normalize_name(self.field(index))
    }

    pub fn numeric_field<T: FromStr>(&self, index: usize) -> Option<T> {
        self.field(index)?.trim_matches('"').parse::<T>().ok()
    }
}

pub fn parse_line(raw: &str) -> LogLine {
    parse_line_at(raw, Local::now().naive_local())
}

/// Parses a line, using `now` for missing years and unparseable timestamps. Never fails.
pub fn parse_line_at(raw: &str, now: NaiveDateTime) -> LogLine {
    let trimmed_line = raw.trim_end_matches(['\r', '\n']);

    let Some((timestamp_text, payload)) = trimmed_line.split_once(TIMESTAMP_SEPARATOR) else {
        return degraded_line(trimmed_line, now);
    };

    let payload = payload.trim();
    if payload.is_empty() {
        return degraded_line(trimmed_line, now);
    }

    let fields = split_fields(payload);
    let event_type = fields.first().cloned().unwrap_or_default();
    let timestamp = parse_log_timestamp(timestamp_text, now).unwrap_or(now);

    LogLine {
        timestamp,
        event_type,
        fields,
        raw: trimmed_line.to_string(),
    }
}

fn degraded_line(raw: &str, now: NaiveDateTime) -> LogLine {
    LogLine {
        timestamp: now,
        event_type: String::new(),
        fields: Vec::new(),
        raw: raw.to_string(),
    }
}

/// Parses `M/d/yyyy HH:mm:ss.SSS`. A missing year is taken from `now`, which misdates
/// lines written before midnight on New Year's Eve and read after it.
fn parse_log_timestamp(timestamp_text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let (date_text, time_text) = timestamp_text.trim().split_once(' ')?;

    let mut date_parts = date_text.split('/');
    let month = date_parts.next()?.parse::<u32>().ok()?;
    let day = date_parts.next()?.parse::<u32>().ok()?;
    let year = match date_parts.next() {
        Some(year_text) => year_text.parse::<i32>().ok()?,
        None => now.year(),
    };
    if date_parts.next().is_some() {
        return None;
    }

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time =
        NaiveTime::parse_from_str(strip_timezone_offset(time_text.trim()), "%H:%M:%S%.f").ok()?;
    Some(date.and_time(time))
}

/// Newer clients append the UTC offset after the milliseconds, e.g. `11:30:00.000-4`.
fn strip_timezone_offset(time_text: &str) -> &str {
    let Some(fraction_start) = time_text.rfind('.') else {
        return time_text;
    };

    match time_text[fraction_start..].find(['+', '-']) {
        Some(sign_offset) => &time_text[..fraction_start + sign_offset],
        None => time_text,
    }
}

/// Splits on commas that are not inside quotes, brackets or parentheses.
fn split_fields(payload: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut depth = 0_usize;

    for character in payload.chars() {
        match character {
            '"' => {
                in_quotes = !in_quotes;
                current.push(character);
            }
            '[' | '(' if !in_quotes => {
                depth += 1;
                current.push(character);
            }
            ']' | ')' if !in_quotes => {
                depth = depth.saturating_sub(1);
                current.push(character);
            }
            ',' if !in_quotes && depth == 0 => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(character),
        }
    }
    fields.push(current.trim().to_string());

    fields
}

pub(crate) fn normalize_name(name: Option<&str>) -> Option<String> {
    let value = name?.trim();
    if value.is_empty() || value == "nil" {
        return None;
    }

    let unquoted = value.trim_matches('"').trim();
    if unquoted.is_empty() {
        return None;
    }

    Some(unquoted.to_string())
}

#[cfg(test)]
mod tests {
    use super::{parse_line_at, LogLine};
    use chrono::{NaiveDate, NaiveDateTime};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .and_then(|date| date.and_hms_opt(9, 0, 0))
            .expect("valid test timestamp")
    }

    fn expected(year: i32, month: u32, day: u32, hms: (u32, u32, u32), millis: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_milli_opt(hms.0, hms.1, hms.2, millis))
            .expect("valid expected timestamp")
    }

    #[test]
    fn parses_timestamp_and_fields() {
        let line = parse_line_at("5/14/2025 11:30:00.000  ARENA_MATCH_START,559,33,2v2,0", now());

        assert_eq!(line.timestamp, expected(2025, 5, 14, (11, 30, 0), 0));
        assert_eq!(line.event_type, "ARENA_MATCH_START");
        assert_eq!(line.fields, vec!["ARENA_MATCH_START", "559", "33", "2v2", "0"]);
        assert_eq!(line.numeric_field::<u32>(1), Some(559));
    }

    #[test]
    fn substitutes_current_year_when_missing() {
        let line = parse_line_at("2/22 20:15:11.250  SPELL_DAMAGE,Player-1-A", now());

        assert_eq!(line.timestamp, expected(2026, 2, 22, (20, 15, 11), 250));
    }

    #[test]
    fn ignores_trailing_timezone_offset() {
        let line = parse_line_at("5/14/2025 11:30:00.123-4  ZONE_CHANGE,559", now());

        assert_eq!(line.timestamp, expected(2025, 5, 14, (11, 30, 0), 123));
        assert_eq!(line.event_type, "ZONE_CHANGE");
    }

    #[test]
    fn keeps_quoted_and_bracketed_commas_together() {
        let line = parse_line_at(
            "5/14/2025 11:30:00.000  CHALLENGE_MODE_START,\"Ara-Kara, City of Echoes\",2660,503,10,[10,147]\r\n",
            now(),
        );

        assert_eq!(line.fields.len(), 6);
        assert_eq!(line.text_field(1).as_deref(), Some("Ara-Kara, City of Echoes"));
        assert_eq!(line.field(5), Some("[10,147]"));
        assert!(!line.raw.ends_with('\n'));
    }

    #[test]
    fn malformed_line_degrades_instead_of_failing() {
        let line = parse_line_at("garbage without separator", now());

        assert!(line.is_degraded());
        assert!(line.fields.is_empty());
        assert_eq!(line.timestamp, now());
        assert_eq!(line.raw, "garbage without separator");
    }

    #[test]
    fn unparseable_timestamp_keeps_payload_and_uses_now() {
        let line: LogLine = parse_line_at("yesterday-ish  SPELL_HEAL,Player-1-A,\"Aria\"", now());

        assert_eq!(line.timestamp, now());
        assert_eq!(line.event_type, "SPELL_HEAL");
        assert_eq!(line.text_field(2).as_deref(), Some("Aria"));
    }
}
