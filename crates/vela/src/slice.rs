//! Indexing and subscript-assignment for the built-in container types.
//!
//! `a[i, j, ...]` is sequential single-index application, not a Python-style
//! slice — this language has no `a[i:j:k]` syntax, so there is only ever one
//! index at a time to resolve; a multi-index subscript just walks through the
//! container once per index (`a[i, j]` reads the same as `a[i][j]`).

use crate::error::{Error, ExcKind, Result};
use crate::value::{Int, Value};

fn err(msg: impl Into<String>) -> Error {
    Error::Typed(ExcKind::Type, msg.into())
}

fn err_index(msg: impl Into<String>) -> Error {
    Error::Typed(ExcKind::Index, msg.into())
}

fn err_key(msg: impl Into<String>) -> Error {
    Error::Typed(ExcKind::Key, msg.into())
}

fn normalize(i: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let idx = if i < 0 { len + i } else { i };
    if idx < 0 || idx >= len {
        None
    } else {
        Some(idx as usize)
    }
}

fn index_as_i64(index: &Value) -> Result<i64> {
    match index.as_int() {
        Some(Int::Small(i)) => Ok(i),
        Some(Int::Big(_)) => Err(err_index("index out of range")),
        None => Err(err(format!("indices must be integers, not '{}'", index.type_name()))),
    }
}

pub fn get_elem(container: &Value, indices: &[Value]) -> Result<Value> {
    let mut current = container.clone();
    for index in indices {
        current = get_index_single(&current, index)?;
    }
    Ok(current)
}

pub fn set_elem(container: &Value, indices: &[Value], value: Value) -> Result<()> {
    let Some((last, rest)) = indices.split_last() else {
        return Err(err("subscript assignment requires at least one index"));
    };
    let mut current = container.clone();
    for index in rest {
        current = get_index_single(&current, index)?;
    }
    set_index_single(&current, last, value)
}

fn get_index_single(container: &Value, index: &Value) -> Result<Value> {
    match container {
        Value::List(items) => {
            let items = items.borrow();
            let i = index_as_i64(index)?;
            normalize(i, items.len()).map(|i| items[i].clone()).ok_or_else(|| err_index("list index out of range"))
        }
        Value::Tuple(items) => {
            let i = index_as_i64(index)?;
            normalize(i, items.len()).map(|i| items[i].clone()).ok_or_else(|| err_index("tuple index out of range"))
        }
        Value::Str(s) => {
            let i = index_as_i64(index)?;
            let chars: Vec<char> = s.as_str().chars().collect();
            normalize(i, chars.len()).map(|i| Value::str(chars[i].to_string())).ok_or_else(|| err_index("string index out of range"))
        }
        Value::Bytes(b) => {
            let i = index_as_i64(index)?;
            normalize(i, b.len()).map(|i| Value::int(b[i] as i64)).ok_or_else(|| err_index("bytes index out of range"))
        }
        Value::Dict(d) => d.borrow().get(index)?.cloned().ok_or_else(|| err_key(format!("key {} not found", index.to_display_string()))),
        other => Err(err(format!("'{}' object is not subscriptable", other.type_name()))),
    }
}

fn set_index_single(container: &Value, index: &Value, value: Value) -> Result<()> {
    match container {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let i = index_as_i64(index)?;
            match normalize(i, items.len()) {
                Some(i) => {
                    items[i] = value;
                    Ok(())
                }
                None => Err(err_index("list assignment index out of range")),
            }
        }
        Value::Dict(d) => {
            d.borrow_mut().insert(index.clone(), value)?;
            Ok(())
        }
        other => Err(err(format!("'{}' object does not support item assignment", other.type_name()))),
    }
}
