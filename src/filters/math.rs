use super::{FilterRegistry, arg};
use crate::Result;
use crate::data::value::Value;
use crate::error::TemplateError;

type IntOp = fn(i64, i64) -> Option<i64>;
type FloatOp = fn(f64, f64) -> f64;

/// Applies an arithmetic operator to two coerced numbers. Two integers stay
/// integral unless the checked operation overflows, which yields a float.
fn arithmetic(lhs: &Value, rhs: &Value, int_op: IntOp, float_op: FloatOp) -> Value {
    match (lhs.to_number(), rhs.to_number()) {
        (Value::Int(a), Value::Int(b)) => match int_op(a, b) {
            Some(n) => Value::Int(n),
            None => Value::Float(float_op(a as f64, b as f64)),
        },
        (a, b) => Value::Float(float_op(
            a.as_f64().unwrap_or_default(),
            b.as_f64().unwrap_or_default(),
        )),
    }
}

fn is_zero(v: &Value) -> bool {
    match v {
        Value::Int(n) => *n == 0,
        Value::Float(f) => *f == 0.0,
        _ => false,
    }
}

fn divided_by(input: &Value, args: &[Value]) -> Result<Value> {
    let divisor = arg(args, 0).to_number();
    if is_zero(&divisor) {
        return Err(TemplateError::Eval("divided by 0".to_string()));
    }
    Ok(arithmetic(input, &divisor, floored_div, |a, b| a / b))
}

fn modulo(input: &Value, args: &[Value]) -> Result<Value> {
    let divisor = arg(args, 0).to_number();
    if is_zero(&divisor) {
        return Err(TemplateError::Eval("divided by 0".to_string()));
    }
    Ok(arithmetic(input, &divisor, floored_rem, |a, b| {
        a - b * (a / b).floor()
    }))
}

/// Integer division rounding toward negative infinity.
fn floored_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

/// Remainder taking the sign of the divisor.
fn floored_rem(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Some(r + b)
    } else {
        Some(r)
    }
}

fn round_to_int(v: &Value, f: fn(f64) -> f64) -> Value {
    match v.to_number() {
        Value::Float(x) if x.is_finite() => Value::Int(f(x) as i64),
        other => other,
    }
}

pub(crate) fn install(registry: &FilterRegistry) {
    registry.register("plus", 1, 1, |input, args| {
        Ok(arithmetic(input, arg(args, 0), i64::checked_add, |a, b| a + b))
    });
    registry.register("minus", 1, 1, |input, args| {
        Ok(arithmetic(input, arg(args, 0), i64::checked_sub, |a, b| a - b))
    });
    registry.register("times", 1, 1, |input, args| {
        Ok(arithmetic(input, arg(args, 0), i64::checked_mul, |a, b| a * b))
    });
    registry.register("divided_by", 1, 1, divided_by);
    registry.register("modulo", 1, 1, modulo);
    registry.register("abs", 0, 0, |input, _| {
        Ok(match input.to_number() {
            Value::Int(n) => n.checked_abs().map_or(Value::Float((n as f64).abs()), Value::Int),
            Value::Float(f) => Value::Float(f.abs()),
            other => other,
        })
    });
    registry.register("ceil", 0, 0, |input, _| Ok(round_to_int(input, f64::ceil)));
    registry.register("floor", 0, 0, |input, _| Ok(round_to_int(input, f64::floor)));
    registry.register("round", 0, 1, |input, args| {
        let digits = args.first().and_then(Value::as_i64).unwrap_or(0);
        if digits <= 0 {
            return Ok(round_to_int(input, f64::round));
        }
        Ok(match input.to_number() {
            Value::Float(f) => {
                let scale = 10f64.powi(digits.min(15) as i32);
                Value::Float((f * scale).round() / scale)
            }
            other => other,
        })
    });
    registry.register("at_least", 1, 1, |input, args| {
        let (a, b) = (input.to_number(), arg(args, 0).to_number());
        Ok(if a.compare(&b) == Some(std::cmp::Ordering::Less) { b } else { a })
    });
    registry.register("at_most", 1, 1, |input, args| {
        let (a, b) = (input.to_number(), arg(args, 0).to_number());
        Ok(if a.compare(&b) == Some(std::cmp::Ordering::Greater) { b } else { a })
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> FilterRegistry {
        let registry = FilterRegistry::new();
        install(&registry);
        registry
    }

    fn apply(name: &str, input: Value, args: &[Value]) -> Value {
        registry().apply(name, &input, args).unwrap()
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(apply("plus", Value::Int(4), &[Value::Int(2)]), Value::Int(6));
        assert_eq!(apply("minus", Value::Int(4), &[Value::Int(6)]), Value::Int(-2));
        assert_eq!(apply("times", Value::from("3"), &[Value::Int(2)]), Value::Int(6));
        assert_eq!(apply("plus", Value::from("x"), &[Value::Int(1)]), Value::Int(1));
    }

    #[test]
    fn test_float_arithmetic_and_overflow() {
        assert_eq!(
            apply("plus", Value::Float(1.5), &[Value::Int(1)]),
            Value::Float(2.5)
        );
        assert!(matches!(
            apply("plus", Value::Int(i64::MAX), &[Value::Int(1)]),
            Value::Float(_)
        ));
    }

    #[test]
    fn test_division() {
        assert_eq!(apply("divided_by", Value::Int(7), &[Value::Int(2)]), Value::Int(3));
        assert_eq!(apply("divided_by", Value::Int(-7), &[Value::Int(2)]), Value::Int(-4));
        assert_eq!(
            apply("divided_by", Value::Int(7), &[Value::Float(2.0)]),
            Value::Float(3.5)
        );
        assert_eq!(apply("modulo", Value::Int(-7), &[Value::Int(3)]), Value::Int(2));
        assert_eq!(apply("modulo", Value::Int(7), &[Value::Int(3)]), Value::Int(1));
    }

    #[test]
    fn test_division_by_zero_is_error() {
        let reg = registry();
        for name in ["divided_by", "modulo"] {
            let err = reg.apply(name, &Value::Int(1), &[Value::Int(0)]).unwrap_err();
            assert!(matches!(err, TemplateError::Eval(_)), "{}", name);
        }
    }

    #[test]
    fn test_rounding() {
        assert_eq!(apply("ceil", Value::Float(1.2), &[]), Value::Int(2));
        assert_eq!(apply("floor", Value::from("1.8"), &[]), Value::Int(1));
        assert_eq!(apply("round", Value::Float(2.5), &[]), Value::Int(3));
        assert_eq!(
            apply("round", Value::Float(1.23456), &[Value::Int(2)]),
            Value::Float(1.23)
        );
        assert_eq!(apply("abs", Value::Int(-3), &[]), Value::Int(3));
    }

    #[test]
    fn test_clamps() {
        assert_eq!(apply("at_least", Value::Int(1), &[Value::Int(5)]), Value::Int(5));
        assert_eq!(apply("at_most", Value::Int(9), &[Value::Int(5)]), Value::Int(5));
        assert_eq!(apply("at_most", Value::Int(3), &[Value::Int(5)]), Value::Int(3));
    }
}
