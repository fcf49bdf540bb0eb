use super::{FilterRegistry, arg};
use crate::Result;
use crate::data::value::Value;
use std::cmp::Ordering;

pub(crate) fn install(registry: &FilterRegistry) {
    registry.register("size", 0, 0, |input, _| {
        Ok(Value::Int(match input {
            Value::Str(s) => s.chars().count() as i64,
            Value::List(l) => l.len() as i64,
            Value::Map(m) => m.len() as i64,
            _ => 0,
        }))
    });
    registry.register("first", 0, 0, |input, _| {
        Ok(input.as_list().and_then(|l| l.first()).cloned().unwrap_or_default())
    });
    registry.register("last", 0, 0, |input, _| {
        Ok(input.as_list().and_then(|l| l.last()).cloned().unwrap_or_default())
    });
    registry.register("join", 0, 1, |input, args| {
        let glue = args.first().map(Value::render).unwrap_or_else(|| " ".to_string());
        Ok(Value::Str(match input {
            Value::List(l) => l.iter().map(Value::render).collect::<Vec<_>>().join(&glue),
            other => other.render(),
        }))
    });
    registry.register("reverse", 0, 0, |input, _| {
        Ok(match input {
            Value::List(l) => Value::List(l.iter().rev().cloned().collect()),
            other => other.clone(),
        })
    });
    registry.register("sort", 0, 1, |input, args| sort(input, args, compare_values));
    registry.register("sort_natural", 0, 1, |input, args| {
        sort(input, args, compare_natural)
    });
    registry.register("uniq", 0, 0, |input, _| {
        Ok(match input {
            Value::List(l) => {
                let mut seen: Vec<Value> = Vec::with_capacity(l.len());
                for v in l {
                    if !seen.iter().any(|s| s.loose_eq(v)) {
                        seen.push(v.clone());
                    }
                }
                Value::List(seen)
            }
            other => other.clone(),
        })
    });
    registry.register("compact", 0, 0, |input, _| {
        Ok(match input {
            Value::List(l) => Value::List(l.iter().filter(|v| !v.is_nil()).cloned().collect()),
            other => other.clone(),
        })
    });
    registry.register("map", 1, 1, |input, args| {
        let key = arg(args, 0).render();
        Ok(match input {
            Value::List(l) => Value::List(l.iter().map(|v| property(v, &key)).collect()),
            Value::Map(_) => property(input, &key),
            _ => Value::Nil,
        })
    });
    registry.register("where", 1, 2, |input, args| {
        let key = arg(args, 0).render();
        let expected = args.get(1);
        let Some(items) = input.as_list() else {
            return Ok(Value::List(Vec::new()));
        };
        Ok(Value::List(
            items
                .iter()
                .filter(|item| {
                    let v = property(item, &key);
                    match expected {
                        Some(e) => v.loose_eq(e),
                        None => v.is_truthy(),
                    }
                })
                .cloned()
                .collect(),
        ))
    });
    registry.register("concat", 1, 1, |input, args| {
        let mut out = match input {
            Value::List(l) => l.clone(),
            Value::Nil => Vec::new(),
            other => vec![other.clone()],
        };
        match arg(args, 0) {
            Value::List(l) => out.extend(l.iter().cloned()),
            Value::Nil => {}
            other => out.push(other.clone()),
        }
        Ok(Value::List(out))
    });
    registry.register("slice", 1, 2, |input, args| {
        let offset = arg(args, 0).as_i64().unwrap_or(0);
        let length = args.get(1).and_then(Value::as_i64).unwrap_or(1).max(0) as usize;
        Ok(match input {
            Value::List(l) => {
                let range = slice_range(l.len(), offset, length);
                Value::List(l[range].to_vec())
            }
            other => {
                let chars: Vec<char> = other.render().chars().collect();
                let range = slice_range(chars.len(), offset, length);
                Value::Str(chars[range].iter().collect())
            }
        })
    });
    registry.register("default", 1, 1, |input, args| {
        if !input.is_truthy() || input.is_empty() {
            Ok(arg(args, 0).clone())
        } else {
            Ok(input.clone())
        }
    });
}

/// `item[key]` for maps, `Nil` otherwise.
fn property(item: &Value, key: &str) -> Value {
    item.as_map()
        .and_then(|m| m.get(key))
        .cloned()
        .unwrap_or_default()
}

/// Clamped `[start, start + length)`; a negative offset counts from the end.
fn slice_range(len: usize, offset: i64, length: usize) -> std::ops::Range<usize> {
    let start = if offset < 0 {
        len.saturating_sub(offset.unsigned_abs() as usize)
    } else {
        (offset as usize).min(len)
    };
    let end = start.saturating_add(length).min(len);
    start..end
}

fn sort(input: &Value, args: &[Value], cmp: fn(&Value, &Value) -> Ordering) -> Result<Value> {
    let Value::List(items) = input else {
        return Ok(input.clone());
    };
    let mut items = items.clone();
    match args.first() {
        Some(key) => {
            let key = key.render();
            items.sort_by(|a, b| cmp(&property(a, &key), &property(b, &key)));
        }
        None => items.sort_by(cmp),
    }
    Ok(Value::List(items))
}

/// Total order for sorting: comparable values by value, `Nil` last, otherwise
/// grouped by kind.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a.is_nil(), b.is_nil()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }
    if kind_rank(a) == kind_rank(b)
        && kind_rank(a) < 3
        && let Some(ord) = a.compare(b)
    {
        return ord;
    }
    kind_rank(a).cmp(&kind_rank(b))
}

fn compare_natural(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
        _ => compare_values(a, b),
    }
}

fn kind_rank(v: &Value) -> u8 {
    match v {
        Value::Bool(_) => 0,
        Value::Int(_) | Value::Float(_) => 1,
        Value::Str(_) => 2,
        Value::List(_) => 3,
        Value::Map(_) => 4,
        Value::Nil => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn apply(name: &str, input: Value, args: &[Value]) -> Value {
        let registry = FilterRegistry::new();
        install(&registry);
        registry.apply(name, &input, args).unwrap()
    }

    fn ints(ns: &[i64]) -> Value {
        Value::List(ns.iter().map(|n| Value::Int(*n)).collect())
    }

    fn item(name: &str, price: i64) -> Value {
        let mut m = BTreeMap::new();
        m.insert("name".to_string(), Value::from(name));
        m.insert("price".to_string(), Value::Int(price));
        Value::Map(m)
    }

    #[test]
    fn test_size_first_last() {
        assert_eq!(apply("size", ints(&[1, 2, 3]), &[]), Value::Int(3));
        assert_eq!(apply("size", Value::from("héllo"), &[]), Value::Int(5));
        assert_eq!(apply("size", Value::Nil, &[]), Value::Int(0));
        assert_eq!(apply("first", ints(&[4, 5]), &[]), Value::Int(4));
        assert_eq!(apply("last", ints(&[]), &[]), Value::Nil);
    }

    #[test]
    fn test_join() {
        assert_eq!(apply("join", ints(&[1, 2]), &[]), Value::from("1 2"));
        assert_eq!(
            apply("join", ints(&[1, 2]), &[Value::from(", ")]),
            Value::from("1, 2")
        );
    }

    #[test]
    fn test_sort_mixed_and_by_key() {
        let mixed = Value::List(vec![
            Value::Int(3),
            Value::Nil,
            Value::Float(1.5),
            Value::Int(2),
        ]);
        assert_eq!(
            apply("sort", mixed, &[]),
            Value::List(vec![
                Value::Float(1.5),
                Value::Int(2),
                Value::Int(3),
                Value::Nil
            ])
        );

        let items = Value::List(vec![item("b", 20), item("a", 10)]);
        let sorted = apply("sort", items, &[Value::from("price")]);
        assert_eq!(
            apply("map", sorted, &[Value::from("name")]),
            Value::List(vec![Value::from("a"), Value::from("b")])
        );

        let words = Value::List(vec![Value::from("b"), Value::from("A"), Value::from("c")]);
        assert_eq!(
            apply("sort_natural", words, &[]),
            Value::List(vec![Value::from("A"), Value::from("b"), Value::from("c")])
        );
    }

    #[test]
    fn test_uniq_compact_concat_reverse() {
        assert_eq!(apply("uniq", ints(&[1, 1, 2]), &[]), ints(&[1, 2]));
        assert_eq!(
            apply("compact", Value::List(vec![Value::Nil, Value::Int(1)]), &[]),
            ints(&[1])
        );
        assert_eq!(apply("concat", ints(&[1]), &[ints(&[2, 3])]), ints(&[1, 2, 3]));
        assert_eq!(apply("reverse", ints(&[1, 2]), &[]), ints(&[2, 1]));
    }

    #[test]
    fn test_where() {
        let items = Value::List(vec![item("a", 10), item("b", 20)]);
        let cheap = apply("where", items, &[Value::from("price"), Value::Int(10)]);
        assert_eq!(cheap.as_list().map(|l| l.len()), Some(1));
    }

    #[test]
    fn test_slice() {
        assert_eq!(
            apply("slice", Value::from("Liquid"), &[Value::Int(2), Value::Int(3)]),
            Value::from("qui")
        );
        assert_eq!(
            apply("slice", Value::from("Liquid"), &[Value::Int(-3), Value::Int(2)]),
            Value::from("ui")
        );
        assert_eq!(apply("slice", ints(&[1, 2, 3]), &[Value::Int(1)]), ints(&[2]));
        assert_eq!(apply("slice", ints(&[1]), &[Value::Int(9)]), ints(&[]));
    }

    #[test]
    fn test_default() {
        let fallback = [Value::from("x")];
        assert_eq!(apply("default", Value::Nil, &fallback), Value::from("x"));
        assert_eq!(apply("default", Value::Bool(false), &fallback), Value::from("x"));
        assert_eq!(apply("default", Value::from(""), &fallback), Value::from("x"));
        assert_eq!(apply("default", Value::Int(0), &fallback), Value::Int(0));
    }
}
