//! Operator semantics.

use std::cmp::Ordering;
use std::sync::Arc;

use super::RenderError;
use super::escape::escape_html;
use crate::parser::{BinOp, CmpOp, Literal, UnaryOp};
use crate::types::Value;

pub(crate) fn literal(literal: &Literal) -> Value {
    match literal {
        Literal::None => Value::None,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(n) => Value::Int(*n),
        Literal::Float(n) => Value::Float(*n),
        Literal::String(s) => Value::from(s.as_str()),
    }
}

/// Apply an arithmetic or concatenation operator. `and` and `or`
/// short-circuit and are handled by the evaluator.
pub(crate) fn binary(
    op: BinOp,
    left: &Value,
    right: &Value,
    autoescape: bool,
) -> Result<Value, RenderError> {
    match op {
        BinOp::Concat => Ok(concat(left, right, autoescape)),
        BinOp::Add => add(left, right, autoescape),
        BinOp::Sub => arithmetic(op, left, right, i64::checked_sub, |a, b| a - b),
        BinOp::Mul => arithmetic(op, left, right, i64::checked_mul, |a, b| a * b),
        BinOp::Mod => {
            if right.as_float() == Some(0.0) {
                return Err(RenderError::type_error("modulo by zero"));
            }
            arithmetic(op, left, right, i64::checked_rem, |a, b| a % b)
        }
        BinOp::Div => {
            let (a, b) = floats(op, left, right)?;
            if b == 0.0 {
                return Err(RenderError::type_error("division by zero"));
            }
            Ok(Value::Float(a / b))
        }
        BinOp::FloorDiv => {
            if right.as_float() == Some(0.0) {
                return Err(RenderError::type_error("division by zero"));
            }
            arithmetic(op, left, right, floor_div, |a, b| (a / b).floor())
        }
        BinOp::Pow => match (left, right) {
            (Value::Int(a), Value::Int(b)) if *b >= 0 => {
                let exact = u32::try_from(*b).ok().and_then(|b| a.checked_pow(b));
                Ok(exact.map_or_else(|| Value::Float(pow_float(*a, *b)), Value::Int))
            }
            _ => {
                let (a, b) = floats(op, left, right)?;
                Ok(Value::Float(a.powf(b)))
            }
        },
        BinOp::And | BinOp::Or => Err(RenderError::type_error(format!(
            "'{}' must be evaluated lazily",
            op.symbol()
        ))),
    }
}

fn add(left: &Value, right: &Value, autoescape: bool) -> Result<Value, RenderError> {
    match (left, right) {
        (Value::String(_) | Value::Safe(_), _) | (_, Value::String(_) | Value::Safe(_)) => {
            Ok(concat(left, right, autoescape))
        }
        (Value::Array(a), Value::Array(b)) => {
            Ok(a.iter().chain(b.iter()).cloned().collect::<Value>())
        }
        _ => arithmetic(BinOp::Add, left, right, i64::checked_add, |a, b| a + b),
    }
}

/// `~` concatenation, carrying safeness per operand.
///
/// With autoescaping on, concatenating a safe operand escapes the other
/// operand now and marks the result safe, so neither side is escaped twice
/// and the safe side is never escaped at all.
fn concat(left: &Value, right: &Value, autoescape: bool) -> Value {
    if left.is_safe() || right.is_safe() {
        if autoescape {
            let mut out = part(left);
            out.push_str(&part(right));
            return Value::Safe(out.into());
        }
        if left.is_safe() && right.is_safe() {
            return Value::Safe(format!("{left}{right}").into());
        }
    }
    Value::String(format!("{left}{right}").into())
}

fn part(value: &Value) -> String {
    match value {
        Value::Safe(s) => s.to_string(),
        other => escape_html(&other.to_string()),
    }
}

fn arithmetic(
    op: BinOp,
    left: &Value,
    right: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, RenderError> {
    if let (Value::Int(a), Value::Int(b)) = (left, right)
        && let Some(result) = int_op(*a, *b)
    {
        return Ok(Value::Int(result));
    }
    let (a, b) = floats(op, left, right)?;
    Ok(Value::Float(float_op(a, b)))
}

fn floats(op: BinOp, left: &Value, right: &Value) -> Result<(f64, f64), RenderError> {
    match (numeric(left), numeric(right)) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(RenderError::type_error(format!(
            "unsupported operand types for {}: '{}' and '{}'",
            op.symbol(),
            left.kind(),
            right.kind()
        ))),
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        other => other.as_float(),
    }
}

/// Integer division rounding toward negative infinity.
fn floor_div(a: i64, b: i64) -> Option<i64> {
    let quotient = a.checked_div_euclid(b)?;
    if b < 0 && a.rem_euclid(b) != 0 {
        quotient.checked_sub(1)
    } else {
        Some(quotient)
    }
}

fn pow_float(base: i64, exponent: i64) -> f64 {
    (base as f64).powf(exponent as f64)
}

pub(crate) fn unary(op: UnaryOp, operand: &Value) -> Result<Value, RenderError> {
    match (op, operand) {
        (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_true())),
        (UnaryOp::Neg, Value::Int(n)) => Ok(n
            .checked_neg()
            .map_or_else(|| Value::Float(-(*n as f64)), Value::Int)),
        (UnaryOp::Neg, Value::Float(n)) => Ok(Value::Float(-n)),
        (UnaryOp::Pos, Value::Int(_) | Value::Float(_)) => Ok(operand.clone()),
        (UnaryOp::Neg | UnaryOp::Pos, value) => Err(RenderError::type_error(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            value.kind()
        ))),
    }
}

/// Evaluate one link of a comparison chain.
pub(crate) fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, RenderError> {
    match op {
        CmpOp::Eq => Ok(left == right),
        CmpOp::Ne => Ok(left != right),
        CmpOp::In => contains(right, left),
        CmpOp::NotIn => contains(right, left).map(|found| !found),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let ordering = order(left, right).ok_or_else(|| {
                RenderError::type_error(format!(
                    "'{}' not supported between '{}' and '{}'",
                    op.symbol(),
                    left.kind(),
                    right.kind()
                ))
            })?;
            Ok(match op {
                CmpOp::Lt => ordering == Ordering::Less,
                CmpOp::Le => ordering != Ordering::Greater,
                CmpOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
    }
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::String(a) | Value::Safe(a), Value::String(b) | Value::Safe(b)) => Some(a.cmp(b)),
        _ => numeric(left)?.partial_cmp(&numeric(right)?),
    }
}

fn contains(container: &Value, needle: &Value) -> Result<bool, RenderError> {
    match container {
        Value::String(haystack) | Value::Safe(haystack) => {
            Ok(haystack.contains(needle.to_string().as_str()))
        }
        Value::Array(items) => Ok(items.iter().any(|item| item == needle)),
        Value::Map(map) => Ok(map.contains_key(needle.to_string().as_str())),
        other => Err(RenderError::type_error(format!(
            "'in' requires a string, array or map, not '{}'",
            other.kind()
        ))),
    }
}

/// Shared string content for loop iteration over strings.
pub(crate) fn chars(s: &Arc<str>) -> Vec<Value> {
    s.chars().map(|c| Value::from(c.to_string())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(op: BinOp, a: impl Into<Value>, b: impl Into<Value>) -> Value {
        binary(op, &a.into(), &b.into(), true).unwrap()
    }

    #[test]
    fn integer_arithmetic_stays_integral() {
        assert_eq!(eval(BinOp::Add, 2, 3), Value::Int(5));
        assert_eq!(eval(BinOp::Mul, 4, 5), Value::Int(20));
        assert_eq!(eval(BinOp::Pow, 2, 10), Value::Int(1024));
        assert_eq!(eval(BinOp::Mod, 7, 3), Value::Int(1));
    }

    #[test]
    fn division_semantics() {
        assert_eq!(eval(BinOp::Div, 7, 2), Value::Float(3.5));
        assert_eq!(eval(BinOp::FloorDiv, 7, 2), Value::Int(3));
        assert_eq!(eval(BinOp::FloorDiv, -7, 2), Value::Int(-4));
        assert_eq!(eval(BinOp::FloorDiv, 7, -2), Value::Int(-4));
        assert!(binary(BinOp::Div, &1.into(), &0.into(), true).is_err());
    }

    #[test]
    fn plus_concatenates_strings() {
        assert_eq!(eval(BinOp::Add, "a", 1), Value::from("a1"));
    }

    #[test]
    fn concat_keeps_safe_operand_unescaped() {
        let result = binary(BinOp::Concat, &Value::safe("<b>"), &"<i>".into(), true).unwrap();
        assert_eq!(result, Value::safe("<b>&lt;i&gt;"));
        assert!(result.is_safe());

        let plain = binary(BinOp::Concat, &"<b>".into(), &"x".into(), true).unwrap();
        assert!(!plain.is_safe());
    }

    #[test]
    fn comparisons() {
        assert!(compare(CmpOp::Lt, &1.into(), &2.5.into()).unwrap());
        assert!(compare(CmpOp::Eq, &1.into(), &1.0.into()).unwrap());
        assert!(compare(CmpOp::In, &"ell".into(), &"hello".into()).unwrap());
        assert!(compare(CmpOp::NotIn, &4.into(), &vec![1, 2, 3].into()).unwrap());
        assert!(compare(CmpOp::Lt, &"a".into(), &1.into()).is_err());
    }

    #[test]
    fn mismatched_operands_are_type_errors() {
        let err = binary(BinOp::Sub, &"a".into(), &1.into(), true).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unsupported operand types for -: 'string' and 'integer'"
        );
    }
}
