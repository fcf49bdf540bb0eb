use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Runtime value flowing through evaluation.
///
/// Numbers are either `Int` or `Float`; arithmetic keeps integers exact while
/// both sides are integers.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),

    /// Ordered list of values (e.g. JSON arrays)
    List(Vec<Value>),

    /// Key-value map (e.g. structs, JSON objects), ordered by key
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Only `Nil` and `false` are falsy; `0` and `""` are truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Nil, empty strings and empty collections.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Nil => true,
            Value::Str(s) => s.is_empty(),
            Value::List(l) => l.is_empty(),
            Value::Map(m) => m.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Numeric view of the value: numbers as-is, numeric strings parsed.
    /// Returns `None` when no number can be read.
    pub fn as_number(&self) -> Option<Value> {
        match self {
            Value::Int(_) | Value::Float(_) => Some(self.clone()),
            Value::Str(s) => parse_number(s.trim()),
            _ => None,
        }
    }

    /// Lenient numeric coercion used by math filters: anything unreadable is `0`.
    pub fn to_number(&self) -> Value {
        self.as_number().unwrap_or(Value::Int(0))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.as_number()? {
            Value::Int(n) => Some(n as f64),
            Value::Float(f) => Some(f),
            _ => None,
        }
    }

    /// Integer view, truncating floats.
    pub fn as_i64(&self) -> Option<i64> {
        match self.as_number()? {
            Value::Int(n) => Some(n),
            Value::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            _ => None,
        }
    }

    /// The string form written to template output.
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Equality by value: numbers compare numerically (`1 == 1.0`), everything
    /// else structurally; values of different kinds are never equal.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_f64() == other.as_f64()
            }
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.loose_eq(vb))
            }
            _ => self == other,
        }
    }

    /// Ordering used by comparison operators. Numeric when both sides read as
    /// numbers, lexical for two strings, `None` otherwise.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        if let (Value::Str(a), Value::Str(b)) = (self, other) {
            return Some(a.cmp(b));
        }
        match (self.as_number()?, other.as_number()?) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        }
    }
}

fn parse_number(s: &str) -> Option<Value> {
    if s.is_empty() {
        return None;
    }
    if let Ok(n) = s.parse::<i64>() {
        return Some(Value::Int(n));
    }
    // Reject "inf", "nan" and friends that f64 parsing accepts.
    if !s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
    {
        return None;
    }
    s.parse::<f64>().ok().map(Value::Float)
}

pub(crate) fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if f.abs() >= 1e16 {
        return exponent_form(f);
    }
    if f.fract() == 0.0 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

/// `1.0e+16`, `-2.5e+300`.
fn exponent_form(f: f64) -> String {
    let s = format!("{:e}", f);
    let Some((mantissa, exp)) = s.split_once('e') else {
        return s;
    };
    let point = if mantissa.contains('.') { "" } else { ".0" };
    let sign = if exp.starts_with('-') { "" } else { "+" };
    format!("{}{}e{}{}", mantissa, point, sign, exp)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => f.write_str(&format_float(*n)),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => items.iter().try_for_each(|v| write!(f, "{}", v)),
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{:?}=>", k)?;
                    write_inspect(f, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Nested values inside a map are shown with their type visible.
fn write_inspect(f: &mut fmt::Formatter<'_>, v: &Value) -> fmt::Result {
    match v {
        Value::Nil => f.write_str("nil"),
        Value::Str(s) => write!(f, "{:?}", s),
        Value::List(items) => {
            f.write_str("[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_inspect(f, item)?;
            }
            f.write_str("]")
        }
        other => write!(f, "{}", other),
    }
}

/// Any type that can be turned into a template `Value`.
pub trait ToValue {
    fn to_value(&self) -> Value;
}

macro_rules! impl_to_value_int {
    ($($rust_type:ty),*) => {
        $(
            impl ToValue for $rust_type {
                fn to_value(&self) -> Value {
                    Value::Int(*self as i64)
                }
            }
        )*
    };
}

impl_to_value_int!(i8, i16, i32, i64, u8, u16, u32);

impl ToValue for u64 {
    fn to_value(&self) -> Value {
        i64::try_from(*self)
            .map(Value::Int)
            .unwrap_or(Value::Float(*self as f64))
    }
}

impl ToValue for usize {
    fn to_value(&self) -> Value {
        (*self as u64).to_value()
    }
}

impl ToValue for f32 {
    fn to_value(&self) -> Value {
        Value::Float(*self as f64)
    }
}

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::Float(*self)
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Str(self.clone())
    }
}

impl ToValue for str {
    fn to_value(&self) -> Value {
        Value::Str(self.to_string())
    }
}

impl ToValue for char {
    fn to_value(&self) -> Value {
        Value::Str(self.to_string())
    }
}

// Allow Value to be passed as template data
impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl ToValue for () {
    fn to_value(&self) -> Value {
        Value::Nil
    }
}

// Blanket implementation for references
impl<T> ToValue for &T
where
    T: ToValue + ?Sized,
{
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Nil,
        }
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(|v| v.to_value()).collect())
    }
}

impl<T: ToValue> ToValue for [T] {
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(|v| v.to_value()).collect())
    }
}

impl<T: ToValue> ToValue for HashMap<String, T> {
    fn to_value(&self) -> Value {
        Value::Map(self.iter().map(|(k, v)| (k.clone(), v.to_value())).collect())
    }
}

impl<T: ToValue> ToValue for BTreeMap<String, T> {
    fn to_value(&self) -> Value {
        Value::Map(self.iter().map(|(k, v)| (k.clone(), v.to_value())).collect())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::Str(String::new()).is_truthy());
        assert!(Value::List(vec![]).is_truthy());
    }

    #[test]
    fn test_render_scalars() {
        assert_eq!(Value::Nil.render(), "");
        assert_eq!(Value::Int(-3).render(), "-3");
        assert_eq!(Value::Float(3.0).render(), "3.0");
        assert_eq!(Value::Float(0.25).render(), "0.25");
        assert_eq!(Value::Float(1e16).render(), "1.0e+16");
        assert_eq!(Value::Float(-2.5e300).render(), "-2.5e+300");
        assert_eq!(Value::Float(123456789.0).render(), "123456789.0");
        assert_eq!(Value::Bool(true).render(), "true");
    }

    #[test]
    fn test_render_collections() {
        let list = Value::List(vec![Value::Int(1), Value::from("a"), Value::Nil]);
        assert_eq!(list.render(), "1a");

        let mut map = BTreeMap::new();
        map.insert("b".to_string(), Value::from("x"));
        map.insert("a".to_string(), Value::Int(1));
        map.insert("c".to_string(), Value::Nil);
        assert_eq!(Value::Map(map).render(), r#"{"a"=>1, "b"=>"x", "c"=>nil}"#);
    }

    #[test]
    fn test_loose_eq_across_number_kinds() {
        assert!(Value::Int(1).loose_eq(&Value::Float(1.0)));
        assert!(!Value::Int(1).loose_eq(&Value::from("1")));
        assert!(Value::Nil.loose_eq(&Value::Nil));
        assert!(!Value::Nil.loose_eq(&Value::Bool(false)));
    }

    #[test]
    fn test_compare_coerces_numeric_strings() {
        assert_eq!(
            Value::from("10").compare(&Value::Int(9)),
            Some(Ordering::Greater)
        );
        assert_eq!(
            Value::from("abc").compare(&Value::from("abd")),
            Some(Ordering::Less)
        );
        assert_eq!(Value::from("abc").compare(&Value::Int(1)), None);
        assert_eq!(Value::Nil.compare(&Value::Int(1)), None);
    }

    #[test]
    fn test_parse_number_rejects_words() {
        assert_eq!(Value::from("inf").as_number(), None);
        assert_eq!(Value::from(" 2.5 ").as_number(), Some(Value::Float(2.5)));
        assert_eq!(Value::from("x").to_number(), Value::Int(0));
    }

    #[test]
    fn test_to_value_collections() {
        let v = vec![Some(1), None].to_value();
        assert_eq!(v, Value::List(vec![Value::Int(1), Value::Nil]));

        let mut m = HashMap::new();
        m.insert("k".to_string(), "v");
        assert_eq!(m.to_value().as_map().map(|m| m.len()), Some(1));
        assert_eq!(u64::MAX.to_value(), Value::Float(u64::MAX as f64));
    }
}
