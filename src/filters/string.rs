use super::{FilterRegistry, arg};
use crate::Result;
use crate::data::value::Value;

fn text(v: &Value) -> String {
    v.render()
}

fn map_str(f: impl Fn(&str) -> String) -> impl Fn(&Value, &[Value]) -> Result<Value> {
    move |input, _| Ok(Value::Str(f(&text(input))))
}

pub(crate) fn install(registry: &FilterRegistry) {
    registry.register("upcase", 0, 0, map_str(|s| s.to_uppercase()));
    registry.register("downcase", 0, 0, map_str(|s| s.to_lowercase()));
    registry.register("capitalize", 0, 0, map_str(capitalize));
    registry.register("strip", 0, 0, map_str(|s| s.trim().to_string()));
    registry.register("lstrip", 0, 0, map_str(|s| s.trim_start().to_string()));
    registry.register("rstrip", 0, 0, map_str(|s| s.trim_end().to_string()));
    registry.register(
        "strip_newlines",
        0,
        0,
        map_str(|s| s.replace(['\r', '\n'], "")),
    );
    registry.register(
        "newline_to_br",
        0,
        0,
        map_str(|s| s.replace("\r\n", "\n").replace('\n', "<br />\n")),
    );
    registry.register("escape", 0, 0, map_str(escape_html));

    registry.register("append", 1, 1, |input, args| {
        Ok(Value::Str(text(input) + &text(arg(args, 0))))
    });
    registry.register("prepend", 1, 1, |input, args| {
        Ok(Value::Str(text(arg(args, 0)) + &text(input)))
    });
    registry.register("replace", 1, 2, |input, args| {
        Ok(Value::Str(
            text(input).replace(&text(arg(args, 0)), &text(arg(args, 1))),
        ))
    });
    registry.register("replace_first", 1, 2, |input, args| {
        Ok(Value::Str(text(input).replacen(
            &text(arg(args, 0)),
            &text(arg(args, 1)),
            1,
        )))
    });
    registry.register("remove", 1, 1, |input, args| {
        Ok(Value::Str(text(input).replace(&text(arg(args, 0)), "")))
    });
    registry.register("remove_first", 1, 1, |input, args| {
        Ok(Value::Str(text(input).replacen(&text(arg(args, 0)), "", 1)))
    });
    registry.register("truncate", 0, 2, |input, args| {
        let length = arg(args, 0).as_i64().unwrap_or(50).max(0) as usize;
        let ellipsis = args.get(1).map(text).unwrap_or_else(|| "...".to_string());
        Ok(Value::Str(truncate(&text(input), length, &ellipsis)))
    });
    registry.register("truncatewords", 0, 2, |input, args| {
        let words = arg(args, 0).as_i64().unwrap_or(15).max(1) as usize;
        let ellipsis = args.get(1).map(text).unwrap_or_else(|| "...".to_string());
        Ok(Value::Str(truncate_words(&text(input), words, &ellipsis)))
    });
    registry.register("split", 1, 1, |input, args| {
        if input.is_nil() {
            return Ok(Value::List(Vec::new()));
        }
        Ok(Value::List(
            split(&text(input), &text(arg(args, 0)))
                .into_iter()
                .map(Value::Str)
                .collect(),
        ))
    });
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

pub(crate) fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Cuts `s` so that the result, ellipsis included, is at most `length` chars.
fn truncate(s: &str, length: usize, ellipsis: &str) -> String {
    if s.chars().count() <= length {
        return s.to_string();
    }
    let keep = length.saturating_sub(ellipsis.chars().count());
    s.chars().take(keep).collect::<String>() + ellipsis
}

fn truncate_words(s: &str, words: usize, ellipsis: &str) -> String {
    let all: Vec<&str> = s.split_whitespace().collect();
    if all.len() <= words {
        return s.to_string();
    }
    all[..words].join(" ") + ellipsis
}

/// A single space splits on runs of whitespace, an empty pattern splits into
/// characters; trailing empty pieces are dropped.
fn split(s: &str, pattern: &str) -> Vec<String> {
    let mut parts: Vec<String> = match pattern {
        "" => s.chars().map(String::from).collect(),
        " " => s.split_whitespace().map(String::from).collect(),
        _ => s.split(pattern).map(String::from).collect(),
    };
    while parts.last().is_some_and(|p| p.is_empty()) {
        parts.pop();
    }
    parts
}
