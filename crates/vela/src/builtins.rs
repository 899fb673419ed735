//! Global built-in functions installed into the interpreter's top-level
//! frame: type conversions (`str`, `int`, `float`, `bool`, `list`, `tuple`,
//! `set`), sequence operations (`len`, `range`, `sum`, `min`, `max`,
//! `enumerate`, `zip`, `reversed`, `any`, `all`), `print`, and the numeric
//! helpers (`abs`, `divmod`, `pow`, `bin`/`hex`/`oct`, `hash`).
//!
//! Every one of these is a plain [`NativeFn`] — no callback arguments, so
//! none of them need access back into the [`crate::vm::Vm`]. A builtin that
//! walks an arbitrary iterable only handles the built-in containers
//! (list/tuple/set/dict/str) eagerly; a user type implementing the `iter`
//! slot is outside what a native closure can drive and is left to scripted
//! code (`for x in obj: ...`) instead.

use crate::error::{Error, ExcKind, Result};
use crate::value::{compare_ordering, hash_value, Int, Value};
use crate::vm::Frame;
use std::cell::RefCell;
use std::rc::Rc;

/// Most builtins raise `TypeError` (bad argument type) or `ValError`
/// (right type, bad value); callers pick via [`err_val`] where relevant.
fn err(msg: impl Into<String>) -> Error {
    Error::Typed(ExcKind::Type, msg.into())
}

fn err_val(msg: impl Into<String>) -> Error {
    Error::Typed(ExcKind::Val, msg.into())
}

fn err_arg(msg: impl Into<String>) -> Error {
    Error::Typed(ExcKind::Arg, msg.into())
}

fn err_math(msg: impl Into<String>) -> Error {
    Error::Typed(ExcKind::Math, msg.into())
}

fn native(name: &str, f: impl Fn(&[Value]) -> Result<Value> + 'static) -> Value {
    Value::Func(Rc::new(crate::value::FuncObj::Native { name: name.to_string(), func: Rc::new(f) }))
}

fn require_argc(args: &[Value], n: usize, name: &str) -> Result<()> {
    if args.len() != n {
        return Err(err_arg(format!("{name}() takes exactly {n} argument(s) ({} given)", args.len())));
    }
    Ok(())
}

fn arg_int(v: &Value, name: &str) -> Result<i64> {
    match v.as_int() {
        Some(Int::Small(i)) => Ok(i),
        Some(Int::Big(_)) => Err(err(format!("{name}() argument out of range"))),
        None => Err(err(format!("{name}() expects an int argument, got '{}'", v.type_name()))),
    }
}

fn arg_float(v: &Value, name: &str) -> Result<f64> {
    v.as_f64().ok_or_else(|| err(format!("{name}() expects a number, got '{}'", v.type_name())))
}

/// Eagerly materializes any of the built-in iterables. Does not drive a user
/// type's `iter`/`next` slots (see module docs).
fn to_iterable_items(v: &Value) -> Result<Vec<Value>> {
    match v {
        Value::List(l) => Ok(l.borrow().clone()),
        Value::Tuple(t) => Ok((**t).clone()),
        Value::Set(s) => Ok(s.borrow().iter().map(|(k, _)| k.clone()).collect()),
        Value::Dict(d) => Ok(d.borrow().iter().map(|(k, _)| k.clone()).collect()),
        Value::Str(s) => Ok(s.as_str().chars().map(|c| Value::str(c.to_string())).collect()),
        other => Err(err(format!("'{}' object is not iterable", other.type_name()))),
    }
}

pub fn install(globals: &Frame, print_buffer: Rc<RefCell<Vec<String>>>) {
    globals.define("len".into(), native("len", builtin_len));
    globals.define("str".into(), native("str", builtin_str));
    globals.define("int".into(), native("int", builtin_int));
    globals.define("float".into(), native("float", builtin_float));
    globals.define("bool".into(), native("bool", builtin_bool));
    globals.define("list".into(), native("list", builtin_list));
    globals.define("tuple".into(), native("tuple", builtin_tuple));
    globals.define("set".into(), native("set", builtin_set));
    globals.define("dict".into(), native("dict", builtin_dict));
    globals.define("range".into(), native("range", builtin_range));
    globals.define("enumerate".into(), native("enumerate", builtin_enumerate));
    globals.define("zip".into(), native("zip", builtin_zip));
    globals.define("reversed".into(), native("reversed", builtin_reversed));
    globals.define("any".into(), native("any", builtin_any));
    globals.define("all".into(), native("all", builtin_all));
    globals.define("sum".into(), native("sum", builtin_sum));
    globals.define("min".into(), native("min", builtin_min));
    globals.define("max".into(), native("max", builtin_max));
    globals.define("abs".into(), native("abs", builtin_abs));
    globals.define("isinstance".into(), native("isinstance", builtin_isinstance));
    globals.define("type".into(), native("type", builtin_type));
    globals.define("repr".into(), native("repr", builtin_repr));
    globals.define("bin".into(), native("bin", builtin_bin));
    globals.define("hex".into(), native("hex", builtin_hex));
    globals.define("oct".into(), native("oct", builtin_oct));
    globals.define("divmod".into(), native("divmod", builtin_divmod));
    globals.define("pow".into(), native("pow", builtin_pow));
    globals.define("hash".into(), native("hash", builtin_hash));
    globals.define("map".into(), native("map", builtin_map));
    globals.define("filter".into(), native("filter", builtin_filter));
    globals.define(
        "print".into(),
        native("print", move |args| {
            let line = args.iter().map(|v| v.to_display_string()).collect::<Vec<_>>().join(" ");
            print_buffer.borrow_mut().push(line);
            Ok(Value::None)
        }),
    );
}

fn builtin_len(args: &[Value]) -> Result<Value> {
    require_argc(args, 1, "len")?;
    let n = match &args[0] {
        Value::Str(s) => s.char_len(),
        Value::Bytes(b) => b.len(),
        Value::List(l) => l.borrow().len(),
        Value::Tuple(t) => t.len(),
        Value::Dict(d) => d.borrow().len(),
        Value::Set(s) => s.borrow().len(),
        other => return Err(err(format!("object of type '{}' has no len()", other.type_name()))),
    };
    Ok(Value::int(n as i64))
}

fn builtin_str(args: &[Value]) -> Result<Value> {
    require_argc(args, 1, "str")?;
    Ok(Value::str(args[0].to_display_string()))
}

fn builtin_int(args: &[Value]) -> Result<Value> {
    require_argc(args, 1, "int")?;
    match &args[0] {
        Value::Int(i) => Ok(Value::Int(i.clone())),
        Value::Float(f) => Ok(Value::int(*f as i64)),
        Value::Bool(b) => Ok(Value::int(if *b { 1 } else { 0 })),
        Value::Str(s) => s.as_str().trim().parse::<i64>().map(Value::int).map_err(|_| err_val(format!("invalid literal for int(): '{}'", s.as_str()))),
        other => Err(err(format!("int() argument must be a string or a number, not '{}'", other.type_name()))),
    }
}

fn builtin_float(args: &[Value]) -> Result<Value> {
    require_argc(args, 1, "float")?;
    match &args[0] {
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Int(i) => Ok(Value::Float(i.to_f64())),
        Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        Value::Str(s) => s.as_str().trim().parse::<f64>().map(Value::Float).map_err(|_| err_val(format!("could not convert string to float: '{}'", s.as_str()))),
        other => Err(err(format!("float() argument must be a string or a number, not '{}'", other.type_name()))),
    }
}

fn builtin_bool(args: &[Value]) -> Result<Value> {
    require_argc(args, 1, "bool")?;
    Ok(Value::Bool(args[0].is_truthy()))
}

fn builtin_list(args: &[Value]) -> Result<Value> {
    if args.is_empty() {
        return Ok(Value::list(Vec::new()));
    }
    require_argc(args, 1, "list")?;
    Ok(Value::list(to_iterable_items(&args[0])?))
}

fn builtin_tuple(args: &[Value]) -> Result<Value> {
    if args.is_empty() {
        return Ok(Value::tuple(Vec::new()));
    }
    require_argc(args, 1, "tuple")?;
    Ok(Value::tuple(to_iterable_items(&args[0])?))
}

fn builtin_set(args: &[Value]) -> Result<Value> {
    let mut table = crate::value::OpenTable::new();
    if !args.is_empty() {
        require_argc(args, 1, "set")?;
        for item in to_iterable_items(&args[0])? {
            table.insert(item, ())?;
        }
    }
    Ok(Value::Set(Rc::new(RefCell::new(table))))
}

/// `dict()` (empty) or `dict(pairs)` built from an iterable of `(key, value)`
/// tuples, matching the zero-or-one-arg shape of `list`/`tuple`/`set`. Source
/// dict literals (`{...}`) construct the empty form and fill it in with
/// `SetElems` per entry, the same way `Set` literals build off `set()`.
fn builtin_dict(args: &[Value]) -> Result<Value> {
    let mut table = crate::value::OpenTable::new();
    if !args.is_empty() {
        require_argc(args, 1, "dict")?;
        for item in to_iterable_items(&args[0])? {
            let Value::Tuple(pair) = &item else {
                return Err(err("dict() argument must be an iterable of (key, value) pairs"));
            };
            if pair.len() != 2 {
                return Err(err("dict() argument must be an iterable of (key, value) pairs"));
            }
            table.insert(pair[0].clone(), pair[1].clone())?;
        }
    }
    Ok(Value::Dict(Rc::new(RefCell::new(table))))
}

fn builtin_range(args: &[Value]) -> Result<Value> {
    let (start, stop, step) = match args.len() {
        1 => (0, arg_int(&args[0], "range")?, 1),
        2 => (arg_int(&args[0], "range")?, arg_int(&args[1], "range")?, 1),
        3 => (arg_int(&args[0], "range")?, arg_int(&args[1], "range")?, arg_int(&args[2], "range")?),
        _ => return Err(err("range() takes 1 to 3 arguments")),
    };
    if step == 0 {
        return Err(err_val("range() arg 3 must not be zero"));
    }
    let mut items = Vec::new();
    let mut i = start;
    if step > 0 {
        while i < stop {
            items.push(Value::int(i));
            i += step;
        }
    } else {
        while i > stop {
            items.push(Value::int(i));
            i += step;
        }
    }
    Ok(Value::list(items))
}

fn builtin_enumerate(args: &[Value]) -> Result<Value> {
    if args.is_empty() || args.len() > 2 {
        return Err(err("enumerate() takes 1 or 2 arguments"));
    }
    let start = if args.len() > 1 { arg_int(&args[1], "enumerate")? } else { 0 };
    let items = to_iterable_items(&args[0])?;
    Ok(Value::list(items.into_iter().enumerate().map(|(i, v)| Value::tuple(vec![Value::int(start + i as i64), v])).collect()))
}

fn builtin_zip(args: &[Value]) -> Result<Value> {
    if args.is_empty() {
        return Ok(Value::list(Vec::new()));
    }
    let lists: Vec<Vec<Value>> = args.iter().map(to_iterable_items).collect::<Result<_>>()?;
    let min_len = lists.iter().map(|l| l.len()).min().unwrap_or(0);
    let result = (0..min_len).map(|i| Value::tuple(lists.iter().map(|l| l[i].clone()).collect())).collect();
    Ok(Value::list(result))
}

fn builtin_reversed(args: &[Value]) -> Result<Value> {
    require_argc(args, 1, "reversed")?;
    let mut items = to_iterable_items(&args[0])?;
    items.reverse();
    Ok(Value::list(items))
}

fn builtin_any(args: &[Value]) -> Result<Value> {
    require_argc(args, 1, "any")?;
    Ok(Value::Bool(to_iterable_items(&args[0])?.iter().any(|v| v.is_truthy())))
}

fn builtin_all(args: &[Value]) -> Result<Value> {
    require_argc(args, 1, "all")?;
    Ok(Value::Bool(to_iterable_items(&args[0])?.iter().all(|v| v.is_truthy())))
}

fn builtin_sum(args: &[Value]) -> Result<Value> {
    if args.is_empty() || args.len() > 2 {
        return Err(err("sum() takes 1 or 2 arguments"));
    }
    let items = to_iterable_items(&args[0])?;
    let mut total = args.get(1).cloned().unwrap_or_else(|| Value::int(0));
    for item in &items {
        total = crate::operators::apply_binop(crate::bytecode::BinOpKind::Add, &total, item)?;
    }
    Ok(total)
}

fn builtin_min(args: &[Value]) -> Result<Value> {
    reduce_extreme(args, "min", std::cmp::Ordering::Less)
}

fn builtin_max(args: &[Value]) -> Result<Value> {
    reduce_extreme(args, "max", std::cmp::Ordering::Greater)
}

fn reduce_extreme(args: &[Value], name: &str, want: std::cmp::Ordering) -> Result<Value> {
    if args.is_empty() {
        return Err(err(format!("{name}() requires at least 1 argument")));
    }
    let items = if args.len() == 1 { to_iterable_items(&args[0])? } else { args.to_vec() };
    if items.is_empty() {
        return Err(err_val(format!("{name}() arg is an empty sequence")));
    }
    let mut best = items[0].clone();
    for item in &items[1..] {
        if compare_ordering(item, &best)? == want {
            best = item.clone();
        }
    }
    Ok(best)
}

fn builtin_abs(args: &[Value]) -> Result<Value> {
    require_argc(args, 1, "abs")?;
    match &args[0] {
        Value::Int(i) => Ok(Value::Int(if i.is_negative() { i.neg() } else { i.clone() })),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        Value::Complex(c) => Ok(Value::Float((c.re * c.re + c.im * c.im).sqrt())),
        other => Err(err(format!("bad operand type for abs(): '{}'", other.type_name()))),
    }
}

fn builtin_isinstance(args: &[Value]) -> Result<Value> {
    require_argc(args, 2, "isinstance")?;
    match &args[1] {
        Value::Type(ty) => Ok(Value::Bool(match &args[0] {
            Value::Instance(inst) => inst.ty.is_subtype_of(ty),
            Value::Exception(exc) => exc.ty.is_subtype_of(ty),
            _ => false,
        })),
        Value::Str(name) => Ok(Value::Bool(matches_primitive_type(&args[0], name.as_str()))),
        other => Err(err(format!("isinstance() arg 2 must be a type or str, not '{}'", other.type_name()))),
    }
}

/// Bool is a subtype of int (spec §3 "Numbers"), so `isinstance(true, "int")`
/// must hold even though a `bool` also satisfies `"bool"`. Enum is likewise a
/// subtype of int.
fn matches_primitive_type(v: &Value, name: &str) -> bool {
    if name == "int" && matches!(v, Value::Bool(_) | Value::Enum(_)) {
        return true;
    }
    matches!(
        (name, v),
        ("str", Value::Str(_))
            | ("int", Value::Int(_))
            | ("float", Value::Float(_))
            | ("complex", Value::Complex(_))
            | ("bool", Value::Bool(_))
            | ("bytes", Value::Bytes(_))
            | ("list", Value::List(_))
            | ("tuple", Value::Tuple(_))
            | ("dict", Value::Dict(_))
            | ("set", Value::Set(_))
            | ("func", Value::Func(_))
            | ("module", Value::Module(_))
            | ("regex", Value::Regex(_))
            | ("enum", Value::Enum(_))
            | ("none", Value::None)
    )
}

fn builtin_type(args: &[Value]) -> Result<Value> {
    require_argc(args, 1, "type")?;
    match &args[0] {
        Value::Instance(inst) => Ok(Value::Type(inst.ty.clone())),
        Value::Exception(exc) => Ok(Value::Type(exc.ty.clone())),
        other => Ok(Value::str(other.type_name())),
    }
}

fn builtin_repr(args: &[Value]) -> Result<Value> {
    require_argc(args, 1, "repr")?;
    Ok(Value::str(args[0].to_repr_string()))
}

fn builtin_bin(args: &[Value]) -> Result<Value> {
    require_argc(args, 1, "bin")?;
    let i = arg_int(&args[0], "bin")?;
    Ok(Value::str(if i < 0 { format!("-0b{:b}", -i) } else { format!("0b{i:b}") }))
}

fn builtin_hex(args: &[Value]) -> Result<Value> {
    require_argc(args, 1, "hex")?;
    let i = arg_int(&args[0], "hex")?;
    Ok(Value::str(if i < 0 { format!("-0x{:x}", -i) } else { format!("0x{i:x}") }))
}

fn builtin_oct(args: &[Value]) -> Result<Value> {
    require_argc(args, 1, "oct")?;
    let i = arg_int(&args[0], "oct")?;
    Ok(Value::str(if i < 0 { format!("-0o{:o}", -i) } else { format!("0o{i:o}") }))
}

fn builtin_divmod(args: &[Value]) -> Result<Value> {
    require_argc(args, 2, "divmod")?;
    match (&args[0], &args[1]) {
        (Value::Int(a), Value::Int(b)) => {
            if b.is_zero() {
                return Err(err_math("integer division or modulo by zero"));
            }
            Ok(Value::tuple(vec![Value::Int(a.floor_div(b)?), Value::Int(a.modulo(b)?)]))
        }
        (a, b) => {
            let a = arg_float(a, "divmod")?;
            let b = arg_float(b, "divmod")?;
            if b == 0.0 {
                return Err(err_math("float divmod() by zero"));
            }
            let q = (a / b).floor();
            Ok(Value::tuple(vec![Value::Float(q), Value::Float(a - q * b)]))
        }
    }
}

fn builtin_pow(args: &[Value]) -> Result<Value> {
    match args.len() {
        2 => match (&args[0], &args[1]) {
            (Value::Int(base), Value::Int(exp)) => Ok(base.pow(exp)),
            (a, b) => Ok(Value::Float(arg_float(a, "pow")?.powf(arg_float(b, "pow")?))),
        },
        3 => {
            let base = arg_int(&args[0], "pow")?;
            let exp = arg_int(&args[1], "pow")?;
            let modulus = arg_int(&args[2], "pow")?;
            if modulus == 0 {
                return Err(err_val("pow() 3rd argument cannot be 0"));
            }
            if exp < 0 {
                return Err(err_val("pow() 2nd argument cannot be negative when 3rd argument specified"));
            }
            let mut result: i128 = 1;
            let mut base = (base as i128).rem_euclid(modulus as i128);
            let mut exp = exp;
            let m = modulus as i128;
            while exp > 0 {
                if exp % 2 == 1 {
                    result = (result * base).rem_euclid(m);
                }
                exp /= 2;
                base = (base * base).rem_euclid(m);
            }
            Ok(Value::int(result as i64))
        }
        _ => Err(err("pow() takes 2 or 3 arguments")),
    }
}

fn builtin_hash(args: &[Value]) -> Result<Value> {
    require_argc(args, 1, "hash")?;
    Ok(Value::int(hash_value(&args[0])? as i64))
}

/// `map`/`filter` need to invoke their callback argument once per element,
/// which a plain [`crate::value::NativeFn`] can't do on its own (no `Vm`
/// access). `vm.rs::call_callable` special-cases these two names and never
/// actually runs this body; it exists so the two names still bind to an
/// ordinary callable `Value::Func` in the global frame.
fn builtin_map(_args: &[Value]) -> Result<Value> {
    Err(Error::internal("map() must be invoked through the interpreter's call dispatch"))
}

fn builtin_filter(_args: &[Value]) -> Result<Value> {
    Err(Error::internal("filter() must be invoked through the interpreter's call dispatch"))
}
