//! Scalar rules applied by every backend for append/prepend and
//! increment/decrement.
//!
//! Strings, numbers and booleans are scalars. `null`, arrays and objects are
//! not: concatenating onto them degrades to a plain set of the piece.

pub use serde_json::Value;

/// Where a piece is concatenated onto an existing scalar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Position {
    Append,
    Prepend,
}

impl Position {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Position::Append => "append",
            Position::Prepend => "prepend",
        }
    }
}

/// String form of a scalar value, or `None` for non-scalars.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Value stored by append/prepend.
///
/// Absent or non-scalar existing values are replaced by the piece; the prior
/// value is discarded rather than reported.
pub fn concatenate(existing: Option<&Value>, piece: &str, position: Position) -> Value {
    match existing.and_then(scalar_text) {
        Some(current) => match position {
            Position::Append => Value::String(current + piece),
            Position::Prepend => Value::String(format!("{}{}", piece, current)),
        },
        None => Value::String(piece.to_string()),
    }
}

enum Numeric {
    Int(i64),
    Float(f64),
}

fn numeric(value: &Value) -> Option<Numeric> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(Numeric::Int)
            .or_else(|| n.as_f64().map(Numeric::Float)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().map(Numeric::Int).or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(Numeric::Float)
            })
        }
        _ => None,
    }
}

fn float(f: f64) -> Value {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or_else(|| Value::from(0))
}

/// Value stored by increment (`delta = 1`) or decrement (`delta = -1`).
///
/// Numbers and numeric strings are adjusted by `delta`; anything else,
/// including absence, is reset to `0`.
pub fn step(existing: Option<&Value>, delta: i64) -> Value {
    match existing.and_then(numeric) {
        Some(Numeric::Int(n)) => match n.checked_add(delta) {
            Some(v) => Value::from(v),
            None => float(n as f64 + delta as f64),
        },
        Some(Numeric::Float(f)) => float(f + delta as f64),
        None => Value::from(0),
    }
}

/// Whether `value` counts as numeric for increment/decrement.
pub fn is_numeric(value: &Value) -> bool {
    numeric(value).is_some()
}
