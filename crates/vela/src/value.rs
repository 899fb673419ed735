//! The uniform runtime value and its type system.
//!
//! Every value a program manipulates is one variant of [`Value`]. Container
//! variants use `Rc<RefCell<..>>` so that `incref`/`decref` from the spec
//! collapse into ordinary `Clone`/`Drop`; cycles (a closure capturing a frame
//! that captures the same closure, an instance attribute cycle) leak exactly
//! as permitted.

use crate::bytecode::CodeObject;
use crate::error::{Error, ExcKind, Result};
use crate::regex::Regex;
use crate::vm::Frame;
use num_bigint::BigInt;
use num_complex::Complex64;
use num_traits::{ToPrimitive, Zero};
use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

// ---------------------------------------------------------------------------
// Numeric tower
// ---------------------------------------------------------------------------

/// Arbitrary-precision integer with a machine-word fast path.
///
/// Arithmetic on two `Small`s uses checked ops and only promotes to `Big` on
/// overflow; a `Big` result that fits back in `i64` is demoted.
#[derive(Debug, Clone)]
pub enum Int {
    Small(i64),
    Big(BigInt),
}

impl Int {
    pub fn from_i64(v: i64) -> Self {
        Int::Small(v)
    }

    fn to_big(&self) -> BigInt {
        match self {
            Int::Small(v) => BigInt::from(*v),
            Int::Big(b) => b.clone(),
        }
    }

    fn normalize(b: BigInt) -> Int {
        match b.to_i64() {
            Some(v) => Int::Small(v),
            None => Int::Big(b),
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            Int::Small(v) => *v as f64,
            Int::Big(b) => b.to_f64().unwrap_or(f64::INFINITY),
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Int::Small(v) => *v == 0,
            Int::Big(b) => b.is_zero(),
        }
    }

    pub fn is_negative(&self) -> bool {
        match self {
            Int::Small(v) => *v < 0,
            Int::Big(b) => b.sign() == num_bigint::Sign::Minus,
        }
    }

    pub fn checked_add(&self, other: &Int) -> Int {
        if let (Int::Small(a), Int::Small(b)) = (self, other) {
            if let Some(r) = a.checked_add(*b) {
                return Int::Small(r);
            }
        }
        Int::normalize(self.to_big() + other.to_big())
    }

    pub fn checked_sub(&self, other: &Int) -> Int {
        if let (Int::Small(a), Int::Small(b)) = (self, other) {
            if let Some(r) = a.checked_sub(*b) {
                return Int::Small(r);
            }
        }
        Int::normalize(self.to_big() - other.to_big())
    }

    pub fn checked_mul(&self, other: &Int) -> Int {
        if let (Int::Small(a), Int::Small(b)) = (self, other) {
            if let Some(r) = a.checked_mul(*b) {
                return Int::Small(r);
            }
        }
        Int::normalize(self.to_big() * other.to_big())
    }

    pub fn neg(&self) -> Int {
        match self {
            Int::Small(v) => v.checked_neg().map(Int::Small).unwrap_or_else(|| Int::normalize(-self.to_big())),
            Int::Big(b) => Int::normalize(-b.clone()),
        }
    }

    /// Floor division (result has the sign you'd expect from mathematics).
    pub fn floor_div(&self, other: &Int) -> Result<Int> {
        if other.is_zero() {
            return Err(Error::Typed(crate::error::ExcKind::Math, "division by zero".into()));
        }
        let (a, b) = (self.to_big(), other.to_big());
        let (q, _r) = num_integer::Integer::div_mod_floor(&a, &b);
        Ok(Int::normalize(q))
    }

    /// Floored modulus: result has the sign of the divisor.
    pub fn modulo(&self, other: &Int) -> Result<Int> {
        if other.is_zero() {
            return Err(Error::Typed(crate::error::ExcKind::Math, "modulo by zero".into()));
        }
        let (a, b) = (self.to_big(), other.to_big());
        Ok(Int::normalize(num_integer::Integer::mod_floor(&a, &b)))
    }

    /// Exact scaled true-division per the spec's algorithm: shift left by a
    /// bit count comfortably exceeding `f64`'s 53-bit mantissa, divide as
    /// bigints, convert, rescale. This stays correct outside the range where
    /// a naive `as f64` cast on each operand would lose precision or overflow.
    pub fn true_div(&self, other: &Int) -> Result<f64> {
        if other.is_zero() {
            return Err(Error::Typed(crate::error::ExcKind::Math, "division by zero".into()));
        }
        const SHIFT: u32 = 64;
        let scaled = (self.to_big() << SHIFT) / other.to_big();
        let q = scaled.to_f64().unwrap_or(f64::INFINITY);
        Ok(q / (1u128 << SHIFT) as f64)
    }

    /// Exact integer power via repeated squaring (`exp >= 0`).
    pub fn pow(&self, exp: &Int) -> Value {
        if exp.is_negative() {
            return Value::Float(self.to_f64().powf(exp.to_f64()));
        }
        let e = match exp {
            Int::Small(v) => *v as u64,
            Int::Big(b) => b.to_u64().unwrap_or(u64::MAX),
        };
        Value::Int(Int::normalize(num_traits::pow(self.to_big(), e as usize)))
    }

    pub fn cmp(&self, other: &Int) -> std::cmp::Ordering {
        if let (Int::Small(a), Int::Small(b)) = (self, other) {
            return a.cmp(b);
        }
        self.to_big().cmp(&other.to_big())
    }

    pub fn eq(&self, other: &Int) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }

    fn hash_into(&self, h: &mut DefaultHasher) {
        match self {
            Int::Small(v) => v.hash(h),
            Int::Big(b) => b.hash(h),
        }
    }
}

impl fmt::Display for Int {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Int::Small(v) => write!(f, "{v}"),
            Int::Big(b) => write!(f, "{b}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Strings
// ---------------------------------------------------------------------------

/// An immutable UTF-8 string with a cached char length and content hash.
#[derive(Debug)]
pub struct VStr {
    pub bytes: String,
    char_len: usize,
    hash: u64,
}

impl VStr {
    pub fn new(s: impl Into<String>) -> Rc<Self> {
        let bytes = s.into();
        let char_len = bytes.chars().count();
        let mut hasher = DefaultHasher::new();
        bytes.hash(&mut hasher);
        Rc::new(VStr { bytes, char_len, hash: hasher.finish() })
    }

    pub fn as_str(&self) -> &str {
        &self.bytes
    }

    pub fn char_len(&self) -> usize {
        self.char_len
    }

    pub fn hash_value(&self) -> u64 {
        self.hash
    }

    /// Byte offset of character index `i`, bounded O(n) (no acceleration
    /// table is maintained for strings below a length where it would matter).
    pub fn char_byte_offset(&self, i: usize) -> Option<usize> {
        self.bytes.char_indices().nth(i).map(|(b, _)| b)
    }
}

impl PartialEq for VStr {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

// ---------------------------------------------------------------------------
// Open-addressed hash table backing Dict and Set
// ---------------------------------------------------------------------------

const EMPTY: i64 = -1;
const DELETED: i64 = -2;

/// Open-addressed table preserving insertion order, shared by [`Value::Dict`]
/// (`V = Value`) and [`Value::Set`] (`V = ()`).
///
/// Bucket-array index width is fixed at a plain `i64` here rather than the
/// spec's size-adaptive 1/2/4/8-byte array; the load-factor/tombstone
/// behavior that the testable properties and observable semantics depend on
/// (insertion order, resize threshold, compaction) is preserved, only the
/// micro-optimization of the bucket element width is not (see `DESIGN.md`).
#[derive(Debug, Clone)]
pub struct OpenTable<V: Clone> {
    buckets: Vec<i64>,
    entries: Vec<Option<(Value, V, u64)>>,
    live: usize,
}

impl<V: Clone> OpenTable<V> {
    pub fn new() -> Self {
        OpenTable { buckets: vec![EMPTY; 8], entries: Vec::new(), live: 0 }
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    fn probe(&self, hash: u64) -> usize {
        (hash as usize) % self.buckets.len()
    }

    fn find_slot(&self, key: &Value, hash: u64) -> Result<(usize, Option<usize>)> {
        let mut idx = self.probe(hash);
        let mut first_deleted = None;
        for _ in 0..self.buckets.len() {
            match self.buckets[idx] {
                EMPTY => return Ok((idx, first_deleted)),
                DELETED => {
                    if first_deleted.is_none() {
                        first_deleted = Some(idx);
                    }
                }
                slot => {
                    let (k, _, h) = self.entries[slot as usize].as_ref().unwrap();
                    if *h == hash && values_equal(k, key)? {
                        return Ok((idx, None));
                    }
                }
            }
            idx = (idx + 1) % self.buckets.len();
        }
        Ok((idx, first_deleted))
    }

    pub fn get(&self, key: &Value) -> Result<Option<&V>> {
        let hash = hash_value(key)?;
        let (idx, _) = self.find_slot(key, hash)?;
        match self.buckets[idx] {
            EMPTY | DELETED => Ok(None),
            slot => Ok(self.entries[slot as usize].as_ref().map(|(_, v, _)| v)),
        }
    }

    pub fn insert(&mut self, key: Value, value: V) -> Result<Option<V>> {
        self.maybe_grow()?;
        let hash = hash_value(&key)?;
        let (idx, deleted) = self.find_slot(&key, hash)?;
        let existing = self.buckets[idx];
        if existing >= 0 {
            let old = self.entries[existing as usize].replace((key, value, hash));
            return Ok(old.map(|(_, v, _)| v));
        }
        let target = deleted.unwrap_or(idx);
        let entry_idx = self.entries.len() as i64;
        self.entries.push(Some((key, value, hash)));
        self.buckets[target] = entry_idx;
        self.live += 1;
        Ok(None)
    }

    pub fn remove(&mut self, key: &Value) -> Result<Option<V>> {
        let hash = hash_value(key)?;
        let (idx, _) = self.find_slot(key, hash)?;
        match self.buckets[idx] {
            EMPTY | DELETED => Ok(None),
            slot => {
                self.buckets[idx] = DELETED;
                self.live -= 1;
                let (_, v, _) = self.entries[slot as usize].take().unwrap();
                if self.entries.iter().filter(|e| e.is_none()).count() > self.entries.len() / 2 {
                    self.compact();
                }
                Ok(Some(v))
            }
        }
    }

    pub fn contains(&self, key: &Value) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &V)> {
        self.entries.iter().filter_map(|e| e.as_ref().map(|(k, v, _)| (k, v)))
    }

    fn maybe_grow(&mut self) -> Result<()> {
        if (self.live + 1) as f64 / self.buckets.len() as f64 > 0.6 {
            self.grow()?;
        }
        Ok(())
    }

    fn grow(&mut self) -> Result<()> {
        let new_cap = (self.buckets.len() * 2).max(8);
        self.rehash(new_cap)
    }

    fn compact(&mut self) {
        let live_entries: Vec<_> = self.entries.drain(..).flatten().collect();
        self.entries = live_entries;
        let cap = self.buckets.len();
        self.buckets.iter_mut().for_each(|b| *b = EMPTY);
        for (i, (k, _, h)) in self.entries.iter().enumerate() {
            let mut idx = (*h as usize) % cap;
            while self.buckets[idx] != EMPTY {
                idx = (idx + 1) % cap;
            }
            self.buckets[idx] = i as i64;
            let _ = k;
        }
    }

    fn rehash(&mut self, new_cap: usize) -> Result<()> {
        let old_entries: Vec<_> = self.entries.drain(..).flatten().collect();
        self.buckets = vec![EMPTY; new_cap];
        self.entries = Vec::with_capacity(old_entries.len());
        for (k, v, h) in old_entries {
            let mut idx = (h as usize) % new_cap;
            while self.buckets[idx] != EMPTY {
                idx = (idx + 1) % new_cap;
            }
            let entry_idx = self.entries.len() as i64;
            self.entries.push(Some((k, v, h)));
            self.buckets[idx] = entry_idx;
        }
        Ok(())
    }
}

impl<V: Clone> Default for OpenTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

pub type VDict = OpenTable<Value>;
pub type VSet = OpenTable<()>;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

pub type NativeFn = Rc<dyn Fn(&[Value]) -> Result<Value>>;

/// Either a native callable or a compiled closure.
pub enum FuncObj {
    Native {
        name: String,
        func: NativeFn,
    },
    Closure {
        name: String,
        params: Vec<String>,
        defaults: Vec<Value>,
        vararg: Option<usize>,
        doc: Option<String>,
        code: Rc<CodeObject>,
        enclosing: Option<Rc<Frame>>,
    },
}

impl fmt::Debug for FuncObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuncObj::Native { name, .. } => write!(f, "<native func {name}>"),
            FuncObj::Closure { name, .. } => write!(f, "<func {name}>"),
        }
    }
}

impl FuncObj {
    pub fn name(&self) -> &str {
        match self {
            FuncObj::Native { name, .. } => name,
            FuncObj::Closure { name, .. } => name,
        }
    }
}

/// The closed set of polymorphic operation slots a type may define.
///
/// One concrete field per slot name rather than a hash map: dispatch is a
/// direct field read, matching the "fat record of function pointers" shape.
#[derive(Default)]
pub struct Slots {
    pub init: Option<Value>,
    pub call: Option<Value>,
    pub str: Option<Value>,
    pub repr: Option<Value>,
    pub iter: Option<Value>,
    pub next: Option<Value>,
    pub getattr: Option<Value>,
    pub setattr: Option<Value>,
    pub getelem: Option<Value>,
    pub setelem: Option<Value>,
    pub eq: Option<Value>,
    pub lt: Option<Value>,
    pub add: Option<Value>,
    pub len: Option<Value>,
    pub sub: Option<Value>,
    pub mul: Option<Value>,
    pub div: Option<Value>,
    pub floordiv: Option<Value>,
    pub r#mod: Option<Value>,
    pub pow: Option<Value>,
    pub le: Option<Value>,
    pub gt: Option<Value>,
    pub ge: Option<Value>,
    pub lsh: Option<Value>,
    pub rsh: Option<Value>,
    pub binor: Option<Value>,
    pub binand: Option<Value>,
    pub binxor: Option<Value>,
    pub pos: Option<Value>,
    pub neg: Option<Value>,
    pub sqig: Option<Value>,
}

pub struct TypeObj {
    pub name: String,
    pub doc: Option<String>,
    pub base: Option<Rc<TypeObj>>,
    pub slots: RefCell<Slots>,
    /// Class-level attributes / methods declared in the type body.
    pub attrs: RefCell<std::collections::HashMap<String, Value>>,
    pub id: u64,
}

impl fmt::Debug for TypeObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<type {}>", self.name)
    }
}

impl TypeObj {
    pub fn new(name: impl Into<String>, base: Option<Rc<TypeObj>>) -> Rc<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Rc::new(TypeObj {
            name: name.into(),
            doc: None,
            base,
            slots: RefCell::new(Slots::default()),
            attrs: RefCell::new(std::collections::HashMap::new()),
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
        })
    }

    /// `issub(self, other)`: walk the base chain looking for `other`.
    pub fn is_subtype_of(self: &Rc<Self>, other: &Rc<TypeObj>) -> bool {
        let mut cur = Some(self.clone());
        while let Some(t) = cur {
            if Rc::ptr_eq(&t, other) {
                return true;
            }
            cur = t.base.clone();
        }
        false
    }

    pub fn lookup_attr(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.attrs.borrow().get(name) {
            return Some(v.clone());
        }
        self.base.as_ref().and_then(|b| b.lookup_attr(name))
    }
}

/// A user-defined-type instance: a type pointer plus an attribute mapping.
#[derive(Debug)]
pub struct Instance {
    pub ty: Rc<TypeObj>,
    pub attrs: RefCell<std::collections::HashMap<String, Value>>,
}

/// A thrown/throwable exception object (spec §3 "Exception").
#[derive(Debug)]
pub struct ExceptionObj {
    pub ty: Rc<TypeObj>,
    pub message: String,
    pub cause: Option<Value>,
    pub args: Vec<Value>,
}

impl ExceptionObj {
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug)]
pub struct ModuleObj {
    pub name: String,
    pub attrs: RefCell<std::collections::HashMap<String, Value>>,
}

/// One member of an enumeration: a subtype of integer carrying the name it
/// was declared under alongside its backing value (spec §3 "Enumeration").
#[derive(Debug)]
pub struct EnumMember {
    pub enum_name: String,
    pub member_name: String,
    pub value: Int,
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(Int),
    Float(f64),
    Complex(Complex64),
    Str(Rc<VStr>),
    Bytes(Rc<Vec<u8>>),
    Tuple(Rc<Vec<Value>>),
    List(Rc<RefCell<Vec<Value>>>),
    Dict(Rc<RefCell<VDict>>),
    Set(Rc<RefCell<VSet>>),
    Func(Rc<FuncObj>),
    Type(Rc<TypeObj>),
    Instance(Rc<Instance>),
    Exception(Rc<ExceptionObj>),
    Module(Rc<ModuleObj>),
    Regex(Rc<Regex>),
    Enum(Rc<EnumMember>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(VStr::new(s))
    }

    pub fn int(v: i64) -> Value {
        Value::Int(Int::from_i64(v))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::new(items))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => !i.is_zero(),
            Value::Float(f) => *f != 0.0,
            Value::Complex(c) => *c != Complex64::new(0.0, 0.0),
            Value::Str(s) => !s.bytes.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::Tuple(t) => !t.is_empty(),
            Value::List(l) => !l.borrow().is_empty(),
            Value::Dict(d) => !d.borrow().is_empty(),
            Value::Set(s) => !s.borrow().is_empty(),
            Value::Enum(e) => !e.value.is_zero(),
            Value::Func(_) | Value::Type(_) | Value::Instance(_) | Value::Exception(_) | Value::Module(_) | Value::Regex(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Complex(_) => "complex",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Tuple(_) => "tuple",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::Func(_) => "func",
            Value::Type(_) => "type",
            Value::Instance(_) => "instance",
            Value::Exception(_) => "exception",
            Value::Module(_) => "module",
            Value::Regex(_) => "regex",
            Value::Enum(_) => "enum",
        }
    }

    pub fn as_int(&self) -> Option<Int> {
        match self {
            Value::Int(i) => Some(i.clone()),
            Value::Bool(b) => Some(Int::from_i64(if *b { 1 } else { 0 })),
            Value::Enum(e) => Some(e.value.clone()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(i.to_f64()),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Enum(e) => Some(e.value.to_f64()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn to_display_string(&self) -> String {
        match self {
            Value::None => "none".into(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Complex(c) => format_complex(*c),
            Value::Str(s) => s.bytes.clone(),
            Value::Bytes(b) => format!("{b:?}"),
            Value::Tuple(t) => format!("({})", join_repr(t)),
            Value::List(l) => format!("[{}]", join_repr(&l.borrow())),
            Value::Dict(d) => {
                let d = d.borrow();
                let parts: Vec<String> = d
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.to_repr_string(), v.to_repr_string()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Set(s) => {
                let s = s.borrow();
                let parts: Vec<String> = s.iter().map(|(k, _)| k.to_repr_string()).collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Func(f) => format!("<func {}>", f.name()),
            Value::Type(t) => format!("<type {}>", t.name),
            Value::Instance(i) => format!("<{} instance>", i.ty.name),
            Value::Exception(e) => format!("{}: {}", e.ty.name, e.message),
            Value::Module(m) => format!("<module {}>", m.name),
            Value::Regex(r) => r.to_string(),
            Value::Enum(e) => format!("{}.{}", e.enum_name, e.member_name),
        }
    }

    pub fn to_repr_string(&self) -> String {
        match self {
            Value::Str(s) => format!("{:?}", s.bytes),
            _ => self.to_display_string(),
        }
    }

    pub fn is_hashable(&self) -> bool {
        matches!(
            self,
            Value::None
                | Value::Bool(_)
                | Value::Int(_)
                | Value::Float(_)
                | Value::Str(_)
                | Value::Bytes(_)
                | Value::Tuple(_)
                | Value::Enum(_)
        )
    }
}

fn join_repr(items: &[Value]) -> String {
    items.iter().map(Value::to_repr_string).collect::<Vec<_>>().join(", ")
}

fn format_float(f: f64) -> String {
    if f.is_infinite() {
        if f > 0.0 { "inf".into() } else { "-inf".into() }
    } else if f.is_nan() {
        "nan".into()
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

fn format_complex(c: Complex64) -> String {
    format!("({}{}{}i)", format_float(c.re), if c.im >= 0.0 { "+" } else { "" }, format_float(c.im))
}

/// `==`: dispatches through the `eq` slot (builtin types implement it
/// directly here); falls back to identity for types defining none.
pub fn values_equal(a: &Value, b: &Value) -> Result<bool> {
    Ok(match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x.eq(y),
        (Value::Int(x), Value::Bool(y)) | (Value::Bool(y), Value::Int(x)) => {
            x.eq(&Int::from_i64(if *y { 1 } else { 0 }))
        }
        (Value::Enum(x), Value::Enum(y)) => x.value.eq(&y.value),
        (Value::Enum(x), Value::Int(y)) | (Value::Int(y), Value::Enum(x)) => x.value.eq(y),
        (Value::Enum(x), Value::Bool(y)) | (Value::Bool(y), Value::Enum(x)) => {
            x.value.eq(&Int::from_i64(if *y { 1 } else { 0 }))
        }
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => x.to_f64() == *y,
        (Value::Complex(x), Value::Complex(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x.bytes == y.bytes,
        (Value::Bytes(x), Value::Bytes(y)) => x == y,
        (Value::Tuple(x), Value::Tuple(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| values_equal(a, b).unwrap_or(false))
        }
        (Value::List(x), Value::List(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| values_equal(a, b).unwrap_or(false))
        }
        (Value::Dict(x), Value::Dict(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x.iter().all(|(k, v)| y.get(k).ok().flatten().map(|v2| values_equal(v, v2).unwrap_or(false)).unwrap_or(false))
        }
        (Value::Type(x), Value::Type(y)) => Rc::ptr_eq(x, y),
        _ => values_identical(a, b),
    })
}

/// `===`: strict identity. Heap variants compare by pointer; unboxed
/// singletons (`none`/`bool`/small int) compare by value since they carry no
/// separate identity to distinguish.
pub fn values_identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(Int::Small(x)), Value::Int(Int::Small(y))) => x == y,
        (Value::Int(Int::Big(x)), Value::Int(Int::Big(y))) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => Rc::ptr_eq(x, y),
        (Value::Bytes(x), Value::Bytes(y)) => Rc::ptr_eq(x, y),
        (Value::Tuple(x), Value::Tuple(y)) => Rc::ptr_eq(x, y),
        (Value::List(x), Value::List(y)) => Rc::ptr_eq(x, y),
        (Value::Dict(x), Value::Dict(y)) => Rc::ptr_eq(x, y),
        (Value::Set(x), Value::Set(y)) => Rc::ptr_eq(x, y),
        (Value::Func(x), Value::Func(y)) => Rc::ptr_eq(x, y),
        (Value::Type(x), Value::Type(y)) => Rc::ptr_eq(x, y),
        (Value::Instance(x), Value::Instance(y)) => Rc::ptr_eq(x, y),
        (Value::Exception(x), Value::Exception(y)) => Rc::ptr_eq(x, y),
        (Value::Module(x), Value::Module(y)) => Rc::ptr_eq(x, y),
        (Value::Regex(x), Value::Regex(y)) => Rc::ptr_eq(x, y),
        (Value::Enum(x), Value::Enum(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

pub fn hash_value(v: &Value) -> Result<u64> {
    let mut h = DefaultHasher::new();
    match v {
        Value::None => 0u8.hash(&mut h),
        Value::Bool(b) => b.hash(&mut h),
        Value::Int(i) => i.hash_into(&mut h),
        Value::Enum(e) => e.value.hash_into(&mut h),
        Value::Float(f) => f.to_bits().hash(&mut h),
        Value::Str(s) => return Ok(s.hash_value()),
        Value::Bytes(b) => b.hash(&mut h),
        Value::Tuple(t) => {
            for item in t.iter() {
                hash_value(item)?.hash(&mut h);
            }
        }
        _ => return Err(Error::Typed(ExcKind::Type, format!("unhashable type: '{}'", v.type_name()))),
    }
    Ok(h.finish())
}

pub fn compare_ordering(a: &Value, b: &Value) -> Result<std::cmp::Ordering> {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y).ok_or_else(nan_error),
        (Value::Int(x), Value::Float(y)) => x.to_f64().partial_cmp(y).ok_or_else(nan_error),
        (Value::Float(x), Value::Int(y)) => x.partial_cmp(&y.to_f64()).ok_or_else(nan_error),
        (Value::Enum(x), Value::Enum(y)) => Ok(x.value.cmp(&y.value)),
        (Value::Enum(x), Value::Int(y)) => Ok(x.value.cmp(y)),
        (Value::Int(x), Value::Enum(y)) => Ok(x.cmp(&y.value)),
        (Value::Str(x), Value::Str(y)) => Ok(x.bytes.cmp(&y.bytes)),
        (Value::Tuple(x), Value::Tuple(y)) => {
            for (a, b) in x.iter().zip(y.iter()) {
                match compare_ordering(a, b)? {
                    Ordering::Equal => continue,
                    ord => return Ok(ord),
                }
            }
            Ok(x.len().cmp(&y.len()))
        }
        (Value::List(x), Value::List(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            for (a, b) in x.iter().zip(y.iter()) {
                match compare_ordering(a, b)? {
                    Ordering::Equal => continue,
                    ord => return Ok(ord),
                }
            }
            Ok(x.len().cmp(&y.len()))
        }
        (Value::Bool(x), Value::Bool(y)) => Ok(x.cmp(y)),
        _ => Err(Error::Typed(
            ExcKind::Type,
            format!("'<' not supported between instances of '{}' and '{}'", a.type_name(), b.type_name()),
        )),
    }
}

fn nan_error() -> Error {
    Error::Typed(ExcKind::Math, "comparison involving NaN".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_add_promotes_to_big_on_overflow() {
        let a = Int::Small(i64::MAX);
        let b = Int::Small(1);
        match a.checked_add(&b) {
            Int::Big(v) => assert_eq!(v, BigInt::from(i64::MAX) + BigInt::from(1)),
            Int::Small(_) => panic!("expected promotion to Big"),
        }
    }

    #[test]
    fn big_result_demotes_back_to_small() {
        let a = Int::Big(BigInt::from(i64::MAX) + BigInt::from(10));
        let b = Int::Small(-10);
        match a.checked_add(&b) {
            Int::Small(v) => assert_eq!(v, i64::MAX),
            Int::Big(_) => panic!("expected demotion to Small"),
        }
    }

    #[test]
    fn checked_sub_and_mul_promote_on_overflow() {
        match Int::Small(i64::MIN).checked_sub(&Int::Small(1)) {
            Int::Big(_) => {}
            Int::Small(_) => panic!("expected promotion to Big"),
        }
        match Int::Small(i64::MAX).checked_mul(&Int::Small(2)) {
            Int::Big(_) => {}
            Int::Small(_) => panic!("expected promotion to Big"),
        }
    }

    #[test]
    fn floor_div_and_modulo_match_mathematical_floor() {
        let a = Int::Small(-7);
        let b = Int::Small(2);
        assert!(a.floor_div(&b).unwrap().eq(&Int::Small(-4)));
        assert!(a.modulo(&b).unwrap().eq(&Int::Small(1)));
    }

    #[test]
    fn floor_div_by_zero_errors() {
        assert!(Int::Small(1).floor_div(&Int::Small(0)).is_err());
        assert!(Int::Small(1).modulo(&Int::Small(0)).is_err());
    }

    #[test]
    fn true_div_stays_precise_past_f64_mantissa_range() {
        let huge = Int::Big(BigInt::from(1u64) << 100);
        let q = huge.true_div(&Int::Small(2)).unwrap();
        let expected = 2f64.powi(99);
        assert!((q - expected).abs() / expected < 1e-12);
    }

    #[test]
    fn pow_with_negative_exponent_returns_float() {
        match Int::Small(2).pow(&Int::Small(-1)) {
            Value::Float(f) => assert_eq!(f, 0.5),
            other => panic!("expected float, got {other:?}"),
        }
    }

    #[test]
    fn pow_with_nonnegative_exponent_stays_exact() {
        match Int::Small(2).pow(&Int::Small(64)) {
            Value::Int(Int::Big(v)) => assert_eq!(v, BigInt::from(1u64) << 64),
            other => panic!("expected a promoted bigint, got {other:?}"),
        }
    }
}
