use super::FilterRegistry;
use crate::Result;
use crate::data::value::Value;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime};
use log::trace;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

pub(crate) fn install(registry: &FilterRegistry) {
    registry.register("date", 1, 1, date);
}

/// `{{ input | date: "%Y-%m-%d" }}`. Unparseable input or an invalid format
/// returns the input unchanged.
fn date(input: &Value, args: &[Value]) -> Result<Value> {
    let format = args.first().map(Value::render).unwrap_or_default();
    let Some(time) = parse_time(input) else {
        trace!("date: cannot read '{}' as a time", input);
        return Ok(input.clone());
    };
    let items: Vec<Item<'_>> = StrftimeItems::new(&format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Ok(input.clone());
    }
    Ok(Value::Str(time.format_with_items(items.iter()).to_string()))
}

fn parse_time(input: &Value) -> Option<DateTime<FixedOffset>> {
    match input {
        Value::Int(secs) => from_timestamp(*secs),
        Value::Float(secs) if secs.is_finite() => from_timestamp(secs.trunc() as i64),
        Value::Str(s) => parse_str(s.trim()),
        _ => None,
    }
}

fn from_timestamp(secs: i64) -> Option<DateTime<FixedOffset>> {
    DateTime::from_timestamp(secs, 0).map(|t| t.fixed_offset())
}

fn parse_str(s: &str) -> Option<DateTime<FixedOffset>> {
    if s.eq_ignore_ascii_case("now") || s.eq_ignore_ascii_case("today") {
        return Some(Local::now().fixed_offset());
    }
    if let Ok(secs) = s.parse::<i64>() {
        return from_timestamp(secs);
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t);
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(t.and_utc().fixed_offset());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc().fixed_offset())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(input: Value, fmt: &str) -> Value {
        date(&input, &[Value::from(fmt)]).unwrap()
    }

    #[test]
    fn test_formats_dates() {
        assert_eq!(format(Value::from("2024-03-05"), "%Y/%m/%d"), Value::from("2024/03/05"));
        assert_eq!(
            format(Value::from("2024-03-05 14:30:00"), "%H:%M"),
            Value::from("14:30")
        );
        assert_eq!(
            format(Value::from("2024-03-05T08:00:00+02:00"), "%d %b %Y"),
            Value::from("05 Mar 2024")
        );
    }

    #[test]
    fn test_timestamps() {
        assert_eq!(format(Value::Int(0), "%Y"), Value::from("1970"));
        assert_eq!(format(Value::from("86400"), "%Y-%m-%d"), Value::from("1970-01-02"));
    }

    #[test]
    fn test_now_formats_to_current_year() {
        let year = Local::now().format("%Y").to_string();
        assert_eq!(format(Value::from("now"), "%Y"), Value::from(year.as_str()));
    }

    #[test]
    fn test_unreadable_input_passes_through() {
        assert_eq!(format(Value::from("soon"), "%Y"), Value::from("soon"));
        assert_eq!(format(Value::Nil, "%Y"), Value::Nil);
        assert_eq!(
            format(Value::from("2024-03-05"), "%Q"),
            Value::from("2024-03-05")
        );
    }

    #[test]
    fn test_registered_with_arity() {
        let registry = FilterRegistry::new();
        install(&registry);
        assert!(registry.apply("date", &Value::Int(0), &[]).is_err());
    }
}
