//! Built-in methods on the container types (`str`, `list`, `tuple`, `dict`,
//! `set`) — everything reachable through `GetAttr` on a value that isn't a
//! user type instance.
//!
//! Each lookup clones the receiver's `Rc` into a fresh native closure, so
//! calling the returned value needs no access back to the `Vm`: a plain
//! `NativeFn` is enough for every method here, none of them take a callback
//! argument.

use crate::error::{Error, ExcKind, Result};
use crate::regex::Regex;
use crate::value::{values_equal, Int, OpenTable, Value, VStr};
use std::rc::Rc;

fn err(msg: impl Into<String>) -> Error {
    Error::Typed(ExcKind::Type, msg.into())
}

fn err_arg(msg: impl Into<String>) -> Error {
    Error::Typed(ExcKind::Arg, msg.into())
}

fn err_val(msg: impl Into<String>) -> Error {
    Error::Typed(ExcKind::Val, msg.into())
}

fn err_key(msg: impl Into<String>) -> Error {
    Error::Typed(ExcKind::Key, msg.into())
}

fn err_index(msg: impl Into<String>) -> Error {
    Error::Typed(ExcKind::Index, msg.into())
}

fn native(name: &str, f: impl Fn(&[Value]) -> Result<Value> + 'static) -> Value {
    Value::Func(Rc::new(crate::value::FuncObj::Native { name: name.to_string(), func: Rc::new(f) }))
}

fn arg_str<'a>(args: &'a [Value], i: usize, method: &str) -> Result<&'a str> {
    args.get(i).and_then(|v| v.as_str()).ok_or_else(|| err(format!("{method}() expects a str argument")))
}

fn arg_int(args: &[Value], i: usize, method: &str) -> Result<i64> {
    match args.get(i).and_then(|v| v.as_int()) {
        Some(Int::Small(v)) => Ok(v),
        _ => Err(err(format!("{method}() expects an int argument"))),
    }
}

fn require_argc(args: &[Value], n: usize, method: &str) -> Result<()> {
    if args.len() != n {
        return Err(err_arg(format!("{method}() takes exactly {n} argument(s) ({} given)", args.len())));
    }
    Ok(())
}

pub fn get_builtin_method(receiver: &Value, name: &str) -> Option<Value> {
    match receiver {
        Value::Str(s) => str_method(s.clone(), name),
        Value::List(l) => list_method(l.clone(), name),
        Value::Tuple(t) => tuple_method(t.clone(), name),
        Value::Dict(d) => dict_method(d.clone(), name),
        Value::Set(s) => set_method(s.clone(), name),
        Value::Regex(r) => regex_method(r.clone(), name),
        _ => None,
    }
}

fn regex_method(r: Rc<Regex>, name: &str) -> Option<Value> {
    let m = name.to_string();
    Some(match name {
        "test" => native(&m, move |args| {
            require_argc(args, 1, "test")?;
            let text = arg_str(args, 0, "test")?;
            Ok(Value::Bool(r.is_match(text)))
        }),
        "find" => native(&m, move |args| {
            require_argc(args, 1, "find")?;
            let text = arg_str(args, 0, "find")?;
            Ok(match r.find(text) {
                Some((start, end)) => Value::tuple(vec![Value::int(start as i64), Value::int(end as i64)]),
                None => Value::None,
            })
        }),
        "findall" => native(&m, move |args| {
            require_argc(args, 1, "findall")?;
            let text = arg_str(args, 0, "findall")?;
            Ok(Value::list(r.find_all(text).into_iter().map(|(s, e)| Value::str(&text[s..e])).collect()))
        }),
        _ => return None,
    })
}

fn str_method(s: Rc<VStr>, name: &str) -> Option<Value> {
    let m = name.to_string();
    Some(match name {
        "lower" => native(&m, move |_| Ok(Value::str(s.as_str().to_lowercase()))),
        "upper" => native(&m, move |_| Ok(Value::str(s.as_str().to_uppercase()))),
        "strip" => native(&m, move |_| Ok(Value::str(s.as_str().trim().to_string()))),
        "lstrip" => native(&m, move |_| Ok(Value::str(s.as_str().trim_start().to_string()))),
        "rstrip" => native(&m, move |_| Ok(Value::str(s.as_str().trim_end().to_string()))),
        "split" => native(&m, move |args| {
            let text = s.as_str();
            let parts: Vec<Value> = match args.first().and_then(|v| v.as_str()) {
                Some(sep) => text.split(sep).map(Value::str).collect(),
                None => text.split_whitespace().map(Value::str).collect(),
            };
            Ok(Value::list(parts))
        }),
        "join" => native(&m, move |args| {
            require_argc(args, 1, "join")?;
            let items = match &args[0] {
                Value::List(l) => l.borrow().clone(),
                Value::Tuple(t) => (**t).clone(),
                other => return Err(err(format!("join() argument must be a list or tuple, not '{}'", other.type_name()))),
            };
            let mut parts = Vec::with_capacity(items.len());
            for item in &items {
                parts.push(item.as_str().ok_or_else(|| err("join() requires every item to be a str"))?.to_string());
            }
            Ok(Value::str(parts.join(s.as_str())))
        }),
        "replace" => native(&m, move |args| {
            require_argc(args, 2, "replace")?;
            let old = arg_str(args, 0, "replace")?;
            let new = arg_str(args, 1, "replace")?;
            Ok(Value::str(s.as_str().replace(old, new)))
        }),
        "startswith" => native(&m, move |args| {
            require_argc(args, 1, "startswith")?;
            Ok(Value::Bool(s.as_str().starts_with(arg_str(args, 0, "startswith")?)))
        }),
        "endswith" => native(&m, move |args| {
            require_argc(args, 1, "endswith")?;
            Ok(Value::Bool(s.as_str().ends_with(arg_str(args, 0, "endswith")?)))
        }),
        "find" => native(&m, move |args| {
            require_argc(args, 1, "find")?;
            let needle = arg_str(args, 0, "find")?;
            Ok(Value::int(s.as_str().find(needle).map(|i| i as i64).unwrap_or(-1)))
        }),
        "count" => native(&m, move |args| {
            require_argc(args, 1, "count")?;
            let needle = arg_str(args, 0, "count")?;
            Ok(Value::int(s.as_str().matches(needle).count() as i64))
        }),
        "isdigit" => native(&m, move |_| Ok(Value::Bool(!s.as_str().is_empty() && s.as_str().chars().all(|c| c.is_ascii_digit())))),
        "isalpha" => native(&m, move |_| Ok(Value::Bool(!s.as_str().is_empty() && s.as_str().chars().all(|c| c.is_alphabetic())))),
        "isalnum" => native(&m, move |_| Ok(Value::Bool(!s.as_str().is_empty() && s.as_str().chars().all(|c| c.is_alphanumeric())))),
        "title" => native(&m, move |_| {
            let result = s
                .as_str()
                .split_whitespace()
                .map(|word| {
                    let mut chars = word.chars();
                    match chars.next() {
                        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str().to_lowercase().as_str(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<_>>()
                .join(" ");
            Ok(Value::str(result))
        }),
        "capitalize" => native(&m, move |_| {
            let mut chars = s.as_str().chars();
            let result = match chars.next() {
                Some(c) => c.to_uppercase().collect::<String>() + chars.as_str().to_lowercase().as_str(),
                None => String::new(),
            };
            Ok(Value::str(result))
        }),
        "removeprefix" => native(&m, move |args| {
            require_argc(args, 1, "removeprefix")?;
            let prefix = arg_str(args, 0, "removeprefix")?;
            Ok(Value::str(s.as_str().strip_prefix(prefix).unwrap_or(s.as_str()).to_string()))
        }),
        "removesuffix" => native(&m, move |args| {
            require_argc(args, 1, "removesuffix")?;
            let suffix = arg_str(args, 0, "removesuffix")?;
            Ok(Value::str(s.as_str().strip_suffix(suffix).unwrap_or(s.as_str()).to_string()))
        }),
        "partition" => native(&m, move |args| {
            require_argc(args, 1, "partition")?;
            let sep = arg_str(args, 0, "partition")?;
            let text = s.as_str();
            Ok(match text.find(sep) {
                Some(pos) => Value::tuple(vec![Value::str(&text[..pos]), Value::str(sep), Value::str(&text[pos + sep.len()..])]),
                None => Value::tuple(vec![Value::str(text), Value::str(""), Value::str("")]),
            })
        }),
        "rpartition" => native(&m, move |args| {
            require_argc(args, 1, "rpartition")?;
            let sep = arg_str(args, 0, "rpartition")?;
            let text = s.as_str();
            Ok(match text.rfind(sep) {
                Some(pos) => Value::tuple(vec![Value::str(&text[..pos]), Value::str(sep), Value::str(&text[pos + sep.len()..])]),
                None => Value::tuple(vec![Value::str(""), Value::str(""), Value::str(text)]),
            })
        }),
        "splitlines" => native(&m, move |args| {
            let keepends = args.first().map(|v| v.is_truthy()).unwrap_or(false);
            let text = s.as_str();
            let bytes = text.as_bytes();
            let mut lines = Vec::new();
            let (mut i, mut start) = (0usize, 0usize);
            while i < bytes.len() {
                if bytes[i] == b'\r' && i + 1 < bytes.len() && bytes[i + 1] == b'\n' {
                    lines.push(Value::str(if keepends { &text[start..i + 2] } else { &text[start..i] }));
                    i += 2;
                    start = i;
                } else if bytes[i] == b'\n' || bytes[i] == b'\r' {
                    lines.push(Value::str(if keepends { &text[start..i + 1] } else { &text[start..i] }));
                    i += 1;
                    start = i;
                } else {
                    i += 1;
                }
            }
            if start < bytes.len() {
                lines.push(Value::str(&text[start..]));
            }
            Ok(Value::list(lines))
        }),
        "center" | "ljust" | "rjust" => {
            let mode = name.to_string();
            native(&m, move |args| pad(s.as_str(), &mode, args))
        }
        "zfill" => native(&m, move |args| {
            require_argc(args, 1, "zfill")?;
            let width = arg_int(args, 0, "zfill")? as usize;
            let text = s.as_str();
            let slen = text.chars().count();
            if slen >= width {
                return Ok(Value::str(text));
            }
            let (sign, rest) = if let Some(r) = text.strip_prefix(['+', '-']) { (&text[..1], r) } else { ("", text) };
            let mut result = String::with_capacity(width);
            result.push_str(sign);
            result.extend(std::iter::repeat('0').take(width - slen));
            result.push_str(rest);
            Ok(Value::str(result))
        }),
        "swapcase" => native(&m, move |_| {
            let result: String = s
                .as_str()
                .chars()
                .flat_map(|c| {
                    if c.is_uppercase() {
                        c.to_lowercase().collect::<Vec<_>>()
                    } else if c.is_lowercase() {
                        c.to_uppercase().collect::<Vec<_>>()
                    } else {
                        vec![c]
                    }
                })
                .collect();
            Ok(Value::str(result))
        }),
        "casefold" => native(&m, move |_| Ok(Value::str(s.as_str().to_lowercase()))),
        _ => return None,
    })
}

fn pad(s: &str, mode: &str, args: &[Value]) -> Result<Value> {
    if args.is_empty() || args.len() > 2 {
        return Err(err_arg(format!("{mode}() takes 1 or 2 arguments")));
    }
    let width = arg_int(args, 0, mode)? as usize;
    let fill = if args.len() > 1 {
        let f = arg_str(args, 1, mode)?;
        if f.chars().count() != 1 {
            return Err(err("the fill character must be exactly one character long"));
        }
        f.chars().next().unwrap()
    } else {
        ' '
    };
    let slen = s.chars().count();
    if slen >= width {
        return Ok(Value::str(s));
    }
    let total = width - slen;
    Ok(Value::str(match mode {
        "center" => {
            let (left, right) = (total / 2, total - total / 2);
            format!("{}{}{}", fill.to_string().repeat(left), s, fill.to_string().repeat(right))
        }
        "ljust" => format!("{}{}", s, fill.to_string().repeat(total)),
        _ => format!("{}{}", fill.to_string().repeat(total), s),
    }))
}

fn list_method(l: Rc<std::cell::RefCell<Vec<Value>>>, name: &str) -> Option<Value> {
    let m = name.to_string();
    Some(match name {
        "index" => native(&m, move |args| {
            require_argc(args, 1, "index")?;
            for (i, item) in l.borrow().iter().enumerate() {
                if values_equal(item, &args[0])? {
                    return Ok(Value::int(i as i64));
                }
            }
            Err(err_val("value not in list"))
        }),
        "count" => native(&m, move |args| {
            require_argc(args, 1, "count")?;
            let mut n = 0i64;
            for item in l.borrow().iter() {
                if values_equal(item, &args[0])? {
                    n += 1;
                }
            }
            Ok(Value::int(n))
        }),
        "copy" => native(&m, move |_| Ok(Value::list(l.borrow().clone()))),
        "append" => native(&m, move |args| {
            require_argc(args, 1, "append")?;
            l.borrow_mut().push(args[0].clone());
            Ok(Value::None)
        }),
        "extend" => native(&m, move |args| {
            require_argc(args, 1, "extend")?;
            let extra = match &args[0] {
                Value::List(other) => other.borrow().clone(),
                Value::Tuple(t) => (**t).clone(),
                other => return Err(err(format!("extend() argument must be a list or tuple, not '{}'", other.type_name()))),
            };
            l.borrow_mut().extend(extra);
            Ok(Value::None)
        }),
        "pop" => native(&m, move |args| {
            let mut items = l.borrow_mut();
            if items.is_empty() {
                return Err(err_index("pop from empty list"));
            }
            let idx = match args.first() {
                None => items.len() - 1,
                Some(v) => {
                    let i = match v.as_int() {
                        Some(Int::Small(i)) => i,
                        _ => return Err(err("pop() expects an int index")),
                    };
                    let len = items.len() as i64;
                    (if i < 0 { len + i } else { i }) as usize
                }
            };
            if idx >= items.len() {
                return Err(err_index("pop index out of range"));
            }
            Ok(items.remove(idx))
        }),
        "clear" => native(&m, move |_| {
            l.borrow_mut().clear();
            Ok(Value::None)
        }),
        "insert" => native(&m, move |args| {
            require_argc(args, 2, "insert")?;
            let index = arg_int(args, 0, "insert")?;
            let mut items = l.borrow_mut();
            let len = items.len() as i64;
            let idx = if index < 0 { (len + index).max(0) as usize } else { (index as usize).min(items.len()) };
            items.insert(idx, args[1].clone());
            Ok(Value::None)
        }),
        "remove" => native(&m, move |args| {
            require_argc(args, 1, "remove")?;
            let mut items = l.borrow_mut();
            let mut pos = None;
            for (i, item) in items.iter().enumerate() {
                if values_equal(item, &args[0])? {
                    pos = Some(i);
                    break;
                }
            }
            match pos {
                Some(idx) => {
                    items.remove(idx);
                    Ok(Value::None)
                }
                None => Err(err_val("value not in list")),
            }
        }),
        "reverse" => native(&m, move |_| {
            l.borrow_mut().reverse();
            Ok(Value::None)
        }),
        "sort" => native(&m, move |_| {
            let mut items = l.borrow_mut();
            let mut err_out = None;
            items.sort_by(|a, b| match crate::value::compare_ordering(a, b) {
                Ok(o) => o,
                Err(e) => {
                    err_out = Some(e);
                    std::cmp::Ordering::Equal
                }
            });
            match err_out {
                Some(e) => Err(e),
                None => Ok(Value::None),
            }
        }),
        _ => return None,
    })
}

fn tuple_method(t: Rc<Vec<Value>>, name: &str) -> Option<Value> {
    let m = name.to_string();
    Some(match name {
        "index" => native(&m, move |args| {
            require_argc(args, 1, "index")?;
            for (i, item) in t.iter().enumerate() {
                if values_equal(item, &args[0])? {
                    return Ok(Value::int(i as i64));
                }
            }
            Err(err_val("value not in tuple"))
        }),
        "count" => native(&m, move |args| {
            require_argc(args, 1, "count")?;
            let mut n = 0i64;
            for item in t.iter() {
                if values_equal(item, &args[0])? {
                    n += 1;
                }
            }
            Ok(Value::int(n))
        }),
        _ => return None,
    })
}

fn dict_method(d: Rc<std::cell::RefCell<crate::value::VDict>>, name: &str) -> Option<Value> {
    let m = name.to_string();
    Some(match name {
        "get" => native(&m, move |args| {
            if args.is_empty() || args.len() > 2 {
                return Err(err_arg("get() takes 1 or 2 arguments"));
            }
            let default = args.get(1).cloned().unwrap_or(Value::None);
            Ok(d.borrow().get(&args[0])?.cloned().unwrap_or(default))
        }),
        "keys" => native(&m, move |_| Ok(Value::list(d.borrow().iter().map(|(k, _)| k.clone()).collect()))),
        "values" => native(&m, move |_| Ok(Value::list(d.borrow().iter().map(|(_, v)| v.clone()).collect()))),
        "items" => native(&m, move |_| {
            Ok(Value::list(d.borrow().iter().map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()])).collect()))
        }),
        "copy" => native(&m, move |_| {
            let mut out = OpenTable::new();
            for (k, v) in d.borrow().iter() {
                out.insert(k.clone(), v.clone())?;
            }
            Ok(Value::Dict(Rc::new(std::cell::RefCell::new(out))))
        }),
        "update" => native(&m, move |args| {
            require_argc(args, 1, "update")?;
            let Value::Dict(other) = &args[0] else {
                return Err(err(format!("update() argument must be a dict, not '{}'", args[0].type_name())));
            };
            let mut table = d.borrow_mut();
            for (k, v) in other.borrow().iter() {
                table.insert(k.clone(), v.clone())?;
            }
            Ok(Value::None)
        }),
        "setdefault" => native(&m, move |args| {
            if args.is_empty() || args.len() > 2 {
                return Err(err_arg("setdefault() takes 1 or 2 arguments"));
            }
            let default = args.get(1).cloned().unwrap_or(Value::None);
            let mut table = d.borrow_mut();
            if let Some(v) = table.get(&args[0])? {
                return Ok(v.clone());
            }
            table.insert(args[0].clone(), default.clone())?;
            Ok(default)
        }),
        "pop" => native(&m, move |args| {
            if args.is_empty() || args.len() > 2 {
                return Err(err_arg("pop() takes 1 or 2 arguments"));
            }
            let mut table = d.borrow_mut();
            match table.remove(&args[0])? {
                Some(v) => Ok(v),
                None => args.get(1).cloned().ok_or_else(|| err_key(format!("{}", args[0].to_display_string()))),
            }
        }),
        "clear" => native(&m, move |_| {
            *d.borrow_mut() = OpenTable::new();
            Ok(Value::None)
        }),
        _ => return None,
    })
}

fn set_method(s: Rc<std::cell::RefCell<crate::value::VSet>>, name: &str) -> Option<Value> {
    let m = name.to_string();
    Some(match name {
        "copy" => native(&m, move |_| {
            let mut out = OpenTable::new();
            for (k, _) in s.borrow().iter() {
                out.insert(k.clone(), ())?;
            }
            Ok(Value::Set(Rc::new(std::cell::RefCell::new(out))))
        }),
        "union" | "intersection" | "difference" | "symmetric_difference" => {
            let op = name.to_string();
            native(&m, move |args| {
                require_argc(args, 1, &op)?;
                let other = to_set_items(&args[0])?;
                let mine: Vec<Value> = s.borrow().iter().map(|(k, _)| k.clone()).collect();
                let mut out = OpenTable::new();
                match op.as_str() {
                    "union" => {
                        for v in mine.iter().chain(other.iter()) {
                            out.insert(v.clone(), ())?;
                        }
                    }
                    "intersection" => {
                        for v in &mine {
                            if other.iter().any(|o| values_equal(o, v).unwrap_or(false)) {
                                out.insert(v.clone(), ())?;
                            }
                        }
                    }
                    "difference" => {
                        for v in &mine {
                            if !other.iter().any(|o| values_equal(o, v).unwrap_or(false)) {
                                out.insert(v.clone(), ())?;
                            }
                        }
                    }
                    _ => {
                        for v in &mine {
                            if !other.iter().any(|o| values_equal(o, v).unwrap_or(false)) {
                                out.insert(v.clone(), ())?;
                            }
                        }
                        for v in &other {
                            if !mine.iter().any(|o| values_equal(o, v).unwrap_or(false)) {
                                out.insert(v.clone(), ())?;
                            }
                        }
                    }
                }
                Ok(Value::Set(Rc::new(std::cell::RefCell::new(out))))
            })
        }
        "issubset" => native(&m, move |args| {
            require_argc(args, 1, "issubset")?;
            let other = to_set_items(&args[0])?;
            for (k, _) in s.borrow().iter() {
                if !other.iter().any(|o| values_equal(o, k).unwrap_or(false)) {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }),
        "issuperset" => native(&m, move |args| {
            require_argc(args, 1, "issuperset")?;
            let other = to_set_items(&args[0])?;
            let table = s.borrow();
            for v in &other {
                if !table.contains(v)? {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }),
        "isdisjoint" => native(&m, move |args| {
            require_argc(args, 1, "isdisjoint")?;
            let other = to_set_items(&args[0])?;
            let table = s.borrow();
            for v in &other {
                if table.contains(v)? {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }),
        "add" => native(&m, move |args| {
            require_argc(args, 1, "add")?;
            s.borrow_mut().insert(args[0].clone(), ())?;
            Ok(Value::None)
        }),
        "discard" => native(&m, move |args| {
            require_argc(args, 1, "discard")?;
            s.borrow_mut().remove(&args[0])?;
            Ok(Value::None)
        }),
        "remove" => native(&m, move |args| {
            require_argc(args, 1, "remove")?;
            match s.borrow_mut().remove(&args[0])? {
                Some(_) => Ok(Value::None),
                None => Err(err_key(format!("{} not in set", args[0].to_display_string()))),
            }
        }),
        "clear" => native(&m, move |_| {
            *s.borrow_mut() = OpenTable::new();
            Ok(Value::None)
        }),
        "update" => native(&m, move |args| {
            require_argc(args, 1, "update")?;
            let other = to_set_items(&args[0])?;
            let mut table = s.borrow_mut();
            for v in other {
                table.insert(v, ())?;
            }
            Ok(Value::None)
        }),
        "pop" => native(&m, move |_| {
            let mut table = s.borrow_mut();
            let first = table.iter().next().map(|(k, _)| k.clone());
            match first {
                Some(k) => {
                    table.remove(&k)?;
                    Ok(k)
                }
                None => Err(err_key("pop from an empty set")),
            }
        }),
        _ => return None,
    })
}

fn to_set_items(value: &Value) -> Result<Vec<Value>> {
    match value {
        Value::Set(s) => Ok(s.borrow().iter().map(|(k, _)| k.clone()).collect()),
        Value::List(l) => Ok(l.borrow().clone()),
        Value::Tuple(t) => Ok((**t).clone()),
        other => Err(err(format!("expected an iterable, got '{}'", other.type_name()))),
    }
}
