//! Binary, unary, and comparison operator semantics.
//!
//! Arithmetic promotes across the numeric tower (`int` → `float` → `complex`)
//! the way [`crate::value::Int`] and its division helpers already do the
//! heavy lifting; this module is mostly the type-dispatch table plus the
//! handful of non-numeric overloads (string/list concatenation and repeat).

use crate::bytecode::{BinOpKind, UnOpKind};
use crate::error::{Error, ExcKind, Result};
use crate::value::{compare_ordering, values_equal, Int, Value};
use std::cmp::Ordering;

fn type_error(msg: impl Into<String>) -> Error {
    Error::Typed(ExcKind::Type, msg.into())
}

fn div_zero() -> Error {
    Error::Typed(ExcKind::Math, "division by zero".into())
}

pub fn apply_binop(op: BinOpKind, left: &Value, right: &Value) -> Result<Value> {
    use BinOpKind::*;
    match op {
        Add => apply_add(left, right),
        Sub => numeric_op(left, right, Int::checked_sub, |a, b| a - b, |a, b| a - b),
        Mul => apply_mul(left, right),
        Div => apply_div(left, right),
        FloorDiv => apply_floordiv(left, right),
        Mod => apply_mod(left, right),
        Pow => apply_pow(left, right),
        Lsh => apply_shift(left, right, true),
        Rsh => apply_shift(left, right, false),
        BinOr => apply_bitwise(left, right, |a, b| a | b),
        BinAnd => apply_bitwise(left, right, |a, b| a & b),
        BinXor => apply_bitwise(left, right, |a, b| a ^ b),
        Lt => Ok(Value::Bool(compare_ordering(left, right)? == Ordering::Less)),
        Le => Ok(Value::Bool(compare_ordering(left, right)? != Ordering::Greater)),
        Gt => Ok(Value::Bool(compare_ordering(left, right)? == Ordering::Greater)),
        Ge => Ok(Value::Bool(compare_ordering(left, right)? != Ordering::Less)),
    }
}

pub fn apply_unop(op: UnOpKind, v: &Value) -> Result<Value> {
    match op {
        UnOpKind::Pos => match v {
            Value::Int(_) | Value::Float(_) | Value::Complex(_) => Ok(v.clone()),
            _ => Err(type_error(format!("bad operand type for unary +: '{}'", v.type_name()))),
        },
        UnOpKind::Neg => match v {
            Value::Int(i) => Ok(Value::Int(i.neg())),
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::Complex(c) => Ok(Value::Complex(-c)),
            _ => Err(type_error(format!("bad operand type for unary -: '{}'", v.type_name()))),
        },
        UnOpKind::Sqig => match v.as_int() {
            Some(Int::Small(i)) => Ok(Value::int(!i)),
            Some(Int::Big(b)) => Ok(Value::Int(Int::Big(!b))),
            None => Err(type_error(format!("bad operand type for unary ~: '{}'", v.type_name()))),
        },
    }
}

pub fn apply_not(v: &Value) -> Value {
    Value::Bool(!v.is_truthy())
}

/// `a in b` (membership); the compiler desugars `not in` to this plus `not`.
pub fn apply_in(needle: &Value, haystack: &Value) -> Result<Value> {
    let found = match haystack {
        Value::Str(s) => match needle.as_str() {
            Some(n) => s.as_str().contains(n),
            None => return Err(type_error("'in <str>' requires a str as left operand")),
        },
        Value::Tuple(t) => {
            let mut found = false;
            for item in t.iter() {
                if values_equal(needle, item)? {
                    found = true;
                    break;
                }
            }
            found
        }
        Value::List(l) => {
            let mut found = false;
            for item in l.borrow().iter() {
                if values_equal(needle, item)? {
                    found = true;
                    break;
                }
            }
            found
        }
        Value::Dict(d) => d.borrow().contains(needle)?,
        Value::Set(s) => s.borrow().contains(needle)?,
        _ => return Err(type_error(format!("argument of type '{}' is not iterable", haystack.type_name()))),
    };
    Ok(Value::Bool(found))
}

fn apply_add(left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(Value::str(format!("{}{}", a.as_str(), b.as_str()))),
        (Value::Tuple(a), Value::Tuple(b)) => {
            let mut out = (**a).clone();
            out.extend(b.iter().cloned());
            Ok(Value::tuple(out))
        }
        (Value::List(a), Value::List(b)) => {
            let mut out = a.borrow().clone();
            out.extend(b.borrow().iter().cloned());
            Ok(Value::list(out))
        }
        _ => numeric_op(left, right, Int::checked_add, |a, b| a + b, |a, b| a + b),
    }
}

fn apply_mul(left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => Ok(Value::str(repeat_str(s.as_str(), n))),
        (Value::List(l), Value::Int(n)) | (Value::Int(n), Value::List(l)) => {
            let times = repeat_count(n);
            let mut out = Vec::new();
            for _ in 0..times {
                out.extend(l.borrow().iter().cloned());
            }
            Ok(Value::list(out))
        }
        (Value::Tuple(t), Value::Int(n)) | (Value::Int(n), Value::Tuple(t)) => {
            let times = repeat_count(n);
            let mut out = Vec::new();
            for _ in 0..times {
                out.extend(t.iter().cloned());
            }
            Ok(Value::tuple(out))
        }
        _ => numeric_op(left, right, Int::checked_mul, |a, b| a * b, |a, b| a * b),
    }
}

fn repeat_count(n: &Int) -> usize {
    match n {
        Int::Small(v) if *v > 0 => *v as usize,
        _ => 0,
    }
}

fn repeat_str(s: &str, n: &Int) -> String {
    s.repeat(repeat_count(n))
}

fn apply_div(left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Float(a.true_div(b)?)),
        (Value::Complex(_), _) | (_, Value::Complex(_)) => {
            let (a, b) = (as_complex(left)?, as_complex(right)?);
            if b.norm_sqr() == 0.0 {
                return Err(div_zero());
            }
            Ok(Value::Complex(a / b))
        }
        _ => {
            let (a, b) = (as_f64(left)?, as_f64(right)?);
            if b == 0.0 {
                return Err(div_zero());
            }
            Ok(Value::Float(a / b))
        }
    }
}

fn apply_floordiv(left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.floor_div(b)?)),
        _ => {
            let (a, b) = (as_f64(left)?, as_f64(right)?);
            if b == 0.0 {
                return Err(div_zero());
            }
            Ok(Value::Float((a / b).floor()))
        }
    }
}

fn apply_mod(left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.modulo(b)?)),
        _ => {
            let (a, b) = (as_f64(left)?, as_f64(right)?);
            if b == 0.0 {
                return Err(div_zero());
            }
            Ok(Value::Float(a - b * (a / b).floor()))
        }
    }
}

fn apply_pow(left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(a.pow(b)),
        _ => {
            let (a, b) = (as_f64(left)?, as_f64(right)?);
            Ok(Value::Float(a.powf(b)))
        }
    }
}

fn apply_shift(left: &Value, right: &Value, is_left: bool) -> Result<Value> {
    let a = left.as_int().ok_or_else(|| type_error(format!("unsupported operand type(s) for shift: '{}'", left.type_name())))?;
    let b = right.as_int().ok_or_else(|| type_error(format!("unsupported operand type(s) for shift: '{}'", right.type_name())))?;
    let shift = match &b {
        Int::Small(v) if *v >= 0 => *v as u32,
        Int::Small(_) => return Err(type_error("negative shift count")),
        Int::Big(_) => return Err(type_error("shift count too large")),
    };
    match &a {
        Int::Small(v) if !is_left && shift >= 63 => Ok(Value::int(if *v < 0 { -1 } else { 0 })),
        Int::Small(v) if is_left && shift < 63 => match v.checked_shl(shift).filter(|r| (*r >> shift) == *v) {
            Some(r) => Ok(Value::int(r)),
            None => Ok(Value::Int(promote_shift(&a, shift, is_left))),
        },
        Int::Small(v) if !is_left => Ok(Value::int(v >> shift)),
        _ => Ok(Value::Int(promote_shift(&a, shift, is_left))),
    }
}

fn promote_shift(a: &Int, shift: u32, is_left: bool) -> Int {
    use num_bigint::BigInt;
    use num_traits::ToPrimitive;
    let big: BigInt = match a {
        Int::Small(v) => BigInt::from(*v),
        Int::Big(b) => b.clone(),
    };
    let result = if is_left { big << shift } else { big >> shift };
    match result.to_i64() {
        Some(v) => Int::Small(v),
        None => Int::Big(result),
    }
}

fn apply_bitwise(left: &Value, right: &Value, op: impl Fn(i64, i64) -> i64) -> Result<Value> {
    let a = left.as_int().ok_or_else(|| type_error(format!("unsupported operand type(s): '{}'", left.type_name())))?;
    let b = right.as_int().ok_or_else(|| type_error(format!("unsupported operand type(s): '{}'", right.type_name())))?;
    match (&a, &b) {
        (Int::Small(x), Int::Small(y)) => Ok(Value::int(op(*x, *y))),
        _ => Err(type_error("bitwise operators on arbitrary-precision integers are not supported")),
    }
}

fn numeric_op(
    left: &Value,
    right: &Value,
    int_op: impl Fn(&Int, &Int) -> Int,
    float_op: impl Fn(f64, f64) -> f64,
    complex_op: impl Fn(num_complex::Complex64, num_complex::Complex64) -> num_complex::Complex64,
) -> Result<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(int_op(a, b))),
        (Value::Complex(_), _) | (_, Value::Complex(_)) => Ok(Value::Complex(complex_op(as_complex(left)?, as_complex(right)?))),
        (Value::Float(_), _) | (_, Value::Float(_)) => Ok(Value::Float(float_op(as_f64(left)?, as_f64(right)?))),
        _ => Err(type_error(format!(
            "unsupported operand type(s): '{}' and '{}'",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn as_f64(v: &Value) -> Result<f64> {
    v.as_f64().ok_or_else(|| type_error(format!("unsupported operand type: '{}'", v.type_name())))
}

fn as_complex(v: &Value) -> Result<num_complex::Complex64> {
    match v {
        Value::Complex(c) => Ok(*c),
        _ => Ok(num_complex::Complex64::new(as_f64(v)?, 0.0)),
    }
}
