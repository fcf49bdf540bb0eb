use crate::Result;
use crate::data::value::Value;
use crate::filters::FILTERS;
use crate::tpl::ast::{Expr, Op, Path, Segment};
use crate::tpl::render_context::Context;
use std::borrow::Cow;
use std::cmp::Ordering;

/// Evaluates `expr` against `ctx` without modifying it.
///
/// Missing data never fails: an unknown name or a path stepping through a
/// non-container yields `Nil`. Errors only come from filters.
pub fn evaluate(expr: &Expr, ctx: &Context) -> Result<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Var(path) => resolve(path, ctx).map(Cow::into_owned),
        Expr::Binary(Op::And, left, right) => {
            let l = evaluate(left, ctx)?.is_truthy();
            Ok(Value::Bool(l && evaluate(right, ctx)?.is_truthy()))
        }
        Expr::Binary(Op::Or, left, right) => {
            let l = evaluate(left, ctx)?.is_truthy();
            Ok(Value::Bool(l || evaluate(right, ctx)?.is_truthy()))
        }
        Expr::Binary(op, left, right) => {
            let l = evaluate(left, ctx)?;
            let r = evaluate(right, ctx)?;
            Ok(Value::Bool(compare(*op, &l, &r)))
        }
        Expr::Filter { base, name, args } => {
            let input = evaluate(base, ctx)?;
            let args = args
                .iter()
                .map(|a| evaluate(a, ctx))
                .collect::<Result<Vec<_>>>()?;
            FILTERS.apply(name, &input, &args)
        }
        Expr::Range(start, end) => {
            let start = evaluate(start, ctx)?.as_i64().unwrap_or(0);
            let end = evaluate(end, ctx)?.as_i64().unwrap_or(0);
            Ok(Value::List(
                (start..=end).take(ctx.max_range).map(Value::Int).collect(),
            ))
        }
    }
}

/// Truthiness of `expr`: only `Nil` and `false` are falsy.
pub fn is_truthy(expr: &Expr, ctx: &Context) -> Result<bool> {
    Ok(evaluate(expr, ctx)?.is_truthy())
}

fn compare(op: Op, l: &Value, r: &Value) -> bool {
    match op {
        Op::Eq => l.loose_eq(r),
        Op::Ne => !l.loose_eq(r),
        Op::Gt => l.compare(r) == Some(Ordering::Greater),
        Op::Ge => matches!(l.compare(r), Some(Ordering::Greater | Ordering::Equal)),
        Op::Lt => l.compare(r) == Some(Ordering::Less),
        Op::Le => matches!(l.compare(r), Some(Ordering::Less | Ordering::Equal)),
        Op::Contains => contains(l, r),
        Op::And | Op::Or => false,
    }
}

/// Substring for strings, element for lists, key for maps.
fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Str(s) => !needle.is_nil() && s.contains(needle.render().as_str()),
        Value::List(items) => items.iter().any(|v| v.loose_eq(needle)),
        Value::Map(m) => m.contains_key(&needle.render()),
        _ => false,
    }
}

fn resolve<'c>(path: &Path, ctx: &'c Context) -> Result<Cow<'c, Value>> {
    let Some(mut current) = ctx.lookup(&path.root).map(Cow::Borrowed) else {
        return Ok(Cow::Owned(Value::Nil));
    };
    for segment in &path.segments {
        let next = match segment {
            Segment::Key(key) => key_of(current, key),
            Segment::Index(i) => index_of(current, *i),
            Segment::Dynamic(expr) => match evaluate(expr, ctx)? {
                Value::Int(i) => index_of(current, i),
                Value::Str(key) => key_of(current, &key),
                _ => None,
            },
        };
        match next {
            Some(v) => current = v,
            None => return Ok(Cow::Owned(Value::Nil)),
        }
    }
    Ok(current)
}

fn step<'c>(
    current: Cow<'c, Value>,
    pick: impl FnOnce(&Value) -> Option<&Value>,
) -> Option<Cow<'c, Value>> {
    match current {
        Cow::Borrowed(v) => pick(v).map(Cow::Borrowed),
        Cow::Owned(v) => pick(&v).cloned().map(Cow::Owned),
    }
}

fn key_of<'c>(current: Cow<'c, Value>, key: &str) -> Option<Cow<'c, Value>> {
    if current.as_map().is_some_and(|m| m.contains_key(key)) {
        return step(current, |v| v.as_map().and_then(|m| m.get(key)));
    }
    pseudo_property(&current, key).map(Cow::Owned)
}

/// `size`, `first` and `last` when the data has no such key.
fn pseudo_property(value: &Value, key: &str) -> Option<Value> {
    match (value, key) {
        (Value::List(l), "size") => Some(Value::Int(l.len() as i64)),
        (Value::Map(m), "size") => Some(Value::Int(m.len() as i64)),
        (Value::Str(s), "size") => Some(Value::Int(s.chars().count() as i64)),
        (Value::List(l), "first") => l.first().cloned(),
        (Value::List(l), "last") => l.last().cloned(),
        _ => None,
    }
}

fn index_of<'c>(current: Cow<'c, Value>, index: i64) -> Option<Cow<'c, Value>> {
    if current.as_map().is_some() {
        let key = index.to_string();
        return step(current, |v| v.as_map().and_then(|m| m.get(&key)));
    }
    let len = current.as_list()?.len();
    let i = if index < 0 {
        len.checked_sub(index.unsigned_abs() as usize)?
    } else {
        index as usize
    };
    step(current, |v| v.as_list().and_then(|l| l.get(i)))
}
