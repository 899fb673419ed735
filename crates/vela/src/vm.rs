//! The bytecode interpreter: frames, call stack, exception unwinding, and
//! the per-opcode dispatch loop.
//!
//! The GIL is realized literally as a [`Mutex`] acquired once per top-level
//! [`Vm::execute`] call and periodically released/reacquired every
//! [`GIL_CHECK_INTERVAL`] instructions, the same checkpoint cadence a
//! reference-counted, not-thread-safe-by-default runtime uses to let other
//! threads in without giving up the simplicity of a single interpreter lock.

use crate::bytecode::{CodeObject, Op};
use crate::error::{ExcKind, Error, Result};
use crate::exceptions::ExceptionTypes;
use crate::methods;
use crate::modules::ModuleLoader;
use crate::operators;
use crate::slice;
use crate::value::{values_equal, values_identical, ExceptionObj, FuncObj, Instance, Slots, TypeObj, Value, VStr};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Mutex;
use tracing::{debug, trace};

/// How many instructions run between GIL checkpoints.
const GIL_CHECK_INTERVAL: u64 = 100;

/// A lexical scope: a frame's own bindings plus a link to the scope it was
/// created in. Closures capture the frame active at `MakeFunc` time; looking
/// a name up walks this chain before falling back to the global frame that
/// sits at its root.
pub struct Frame {
    pub locals: RefCell<HashMap<String, Value>>,
    pub enclosing: Option<Rc<Frame>>,
}

impl Frame {
    pub fn new(enclosing: Option<Rc<Frame>>) -> Rc<Self> {
        Rc::new(Frame { locals: RefCell::new(HashMap::new()), enclosing })
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.locals.borrow().get(name) {
            return Some(v.clone());
        }
        self.enclosing.as_ref().and_then(|e| e.lookup(name))
    }

    pub fn define(&self, name: String, value: Value) {
        self.locals.borrow_mut().insert(name, value);
    }
}

/// A single step of a `for` loop's iteration, tracked outside the value
/// stack since it has no `Value` representation of its own.
enum IterState {
    List(Rc<RefCell<Vec<Value>>>, usize),
    Tuple(Rc<Vec<Value>>, usize),
    Str(Rc<VStr>, usize),
    /// Snapshot of dict keys or set members taken at `ForStart` time.
    Snapshot(Vec<Value>, usize),
    /// A user object driving its own `next` slot; exhaustion is signaled by
    /// that call raising `OutOfIterException`, caught here rather than
    /// surfaced to the running program.
    Object(Value),
}

impl IterState {
    fn next(&mut self, vm: &mut Vm) -> Result<Option<Value>> {
        match self {
            IterState::List(items, i) => {
                let v = items.borrow().get(*i).cloned();
                if v.is_some() {
                    *i += 1;
                }
                Ok(v)
            }
            IterState::Tuple(items, i) => {
                let v = items.get(*i).cloned();
                if v.is_some() {
                    *i += 1;
                }
                Ok(v)
            }
            IterState::Str(s, i) => match s.as_str().chars().nth(*i) {
                Some(c) => {
                    *i += 1;
                    Ok(Some(Value::str(c.to_string())))
                }
                None => Ok(None),
            },
            IterState::Snapshot(items, i) => {
                let v = items.get(*i).cloned();
                if v.is_some() {
                    *i += 1;
                }
                Ok(v)
            }
            IterState::Object(obj) => {
                let next_fn = match obj {
                    Value::Instance(inst) => inst.ty.slots.borrow().next.clone(),
                    _ => None,
                };
                let Some(next_fn) = next_fn else {
                    return Err(Error::internal("iterator object has no 'next'"));
                };
                match vm.call_callable(next_fn, vec![obj.clone()]) {
                    Ok(v) => Ok(Some(v)),
                    Err(Error::Runtime(exc)) if vm.is_out_of_iter(&exc) => Ok(None),
                    Err(e) => Err(e),
                }
            }
        }
    }
}

/// Resource ceilings for one [`Vm::execute`] run.
#[derive(Clone, Copy, Debug, Default)]
pub struct Limits {
    pub max_instructions: Option<u64>,
    pub max_recursion_depth: Option<usize>,
}

struct CallFrame {
    code: Rc<CodeObject>,
    ip: usize,
    frame: Rc<Frame>,
    stack_base: usize,
    iterators: Vec<IterState>,
}

pub struct Vm {
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: Rc<Frame>,
    pub exceptions: Rc<ExceptionTypes>,
    modules: Option<Rc<ModuleLoader>>,
    limits: Limits,
    instruction_count: u64,
    gil: Mutex<()>,
}

impl Vm {
    pub fn new(globals: Rc<Frame>, exceptions: Rc<ExceptionTypes>, modules: Option<Rc<ModuleLoader>>, limits: Limits) -> Self {
        Vm { stack: Vec::new(), frames: Vec::new(), globals, exceptions, modules, limits, instruction_count: 0, gil: Mutex::new(()) }
    }

    pub fn globals(&self) -> &Rc<Frame> {
        &self.globals
    }

    pub fn set_module_loader(&mut self, loader: Option<Rc<ModuleLoader>>) {
        self.modules = loader;
    }

    pub fn set_limits(&mut self, limits: Limits) {
        self.limits = limits;
        self.instruction_count = 0;
    }

    /// Run a top-level code object to completion, returning the value of its
    /// last expression statement (or `none`).
    pub fn execute(&mut self, code: Rc<CodeObject>) -> Result<Value> {
        let _gil = self.gil.lock().unwrap();
        self.instruction_count = 0;
        self.frames.push(CallFrame { code, ip: 0, frame: self.globals.clone(), stack_base: self.stack.len(), iterators: Vec::new() });
        self.drive()
    }

    /// Runs instructions until the frame that was on top when this was
    /// called has returned (normally or by an exception propagating past
    /// it), unwinding into any handler found along the way.
    fn drive(&mut self) -> Result<Value> {
        let floor = self.frames.len() - 1;
        loop {
            match self.step() {
                Ok(Some(v)) => return Ok(v),
                Ok(None) => {
                    if self.instruction_count % GIL_CHECK_INTERVAL == 0 {
                        trace!(count = self.instruction_count, "gil checkpoint");
                    }
                }
                Err(e) => {
                    let exc = self.error_to_exception(e)?;
                    if !self.unwind(exc, floor)? {
                        return Err(Error::Runtime(Rc::new(self.stack.pop().unwrap_or(Value::None))));
                    }
                }
            }
        }
    }

    /// Execute one instruction. Returns `Ok(Some(v))` when the frame at
    /// index `floor` within `drive`'s call has itself returned.
    fn step(&mut self) -> Result<Option<Value>> {
        self.instruction_count += 1;
        if let Some(max) = self.limits.max_instructions {
            if self.instruction_count > max {
                return Err(Error::InstructionLimitExceeded);
            }
        }
        let (op, code) = {
            let f = self.frames.last().ok_or_else(|| Error::internal("no active frame"))?;
            let op = f.code.instructions.get(f.ip).cloned().ok_or_else(|| Error::internal("ip out of range"))?;
            (op, f.code.clone())
        };
        trace!(?op, ip = self.frames.last().unwrap().ip, "dispatch");
        self.frames.last_mut().unwrap().ip += 1;
        self.dispatch(op, &code)
    }

    fn push(&mut self, v: Value) {
        self.stack.push(v);
    }

    fn pop(&mut self) -> Result<Value> {
        self.stack.pop().ok_or_else(|| Error::internal("stack underflow"))
    }

    fn peek(&self, from_top: usize) -> Result<&Value> {
        let len = self.stack.len();
        len.checked_sub(1 + from_top).and_then(|i| self.stack.get(i)).ok_or_else(|| Error::internal("stack underflow"))
    }

    fn dispatch(&mut self, op: Op, code: &Rc<CodeObject>) -> Result<Option<Value>> {
        match op {
            Op::Noop => {}
            Op::Push(k) => self.push(code.constants[k as usize].clone()),
            Op::PopTop => {
                self.pop()?;
            }
            Op::Dup => {
                let v = self.peek(0)?.clone();
                self.push(v);
            }
            Op::DupI(n) => {
                let idx = (self.stack.len() as i64 - 1 + n as i64) as usize;
                let v = self.stack.get(idx).cloned().ok_or_else(|| Error::internal("DupI out of range"))?;
                self.push(v);
            }
            Op::Load(k) => {
                let name = &code.names[k as usize];
                let v = self.frames.last().unwrap().frame.lookup(name).ok_or_else(|| self.raise(self.exceptions.name_error(name)))?;
                self.push(v);
            }
            Op::Store(k) => {
                let v = self.pop()?;
                let name = code.names[k as usize].clone();
                self.frames.last().unwrap().frame.define(name, v);
            }
            Op::GetAttr(k) => {
                let obj = self.pop()?;
                let name = code.names[k as usize].clone();
                let v = self.get_attr(&obj, &name)?;
                self.push(v);
            }
            Op::SetAttr(k) => {
                let obj = self.pop()?;
                let value = self.pop()?;
                let name = code.names[k as usize].clone();
                self.set_attr(&obj, &name, value)?;
            }
            Op::GetElems(n) => {
                let mut indices = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    indices.push(self.pop()?);
                }
                indices.reverse();
                let container = self.pop()?;
                let v = self.get_elem(&container, &indices)?;
                self.push(v);
            }
            Op::SetElems(n) => {
                let mut indices = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    indices.push(self.pop()?);
                }
                indices.reverse();
                let container = self.pop()?;
                let value = self.pop()?;
                self.set_elem(&container, &indices, value)?;
            }
            Op::Call(n) => {
                let mut args = Vec::with_capacity(n as usize - 1);
                for _ in 0..n - 1 {
                    args.push(self.pop()?);
                }
                args.reverse();
                let callee = self.pop()?;
                if self.frames.len() >= self.limits.max_recursion_depth.unwrap_or(usize::MAX) {
                    return Err(Error::RecursionLimitExceeded);
                }
                let result = self.call_callable(callee, args)?;
                self.push(result);
            }
            Op::BuildList(n) => {
                let mut items = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    items.push(self.pop()?);
                }
                items.reverse();
                self.push(Value::list(items));
            }
            Op::BuildTuple(n) => {
                let mut items = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    items.push(self.pop()?);
                }
                items.reverse();
                self.push(Value::tuple(items));
            }
            Op::MakeFunc(k) => {
                let tmpl = &code.func_templates[k as usize];
                let mut defaults = Vec::with_capacity(tmpl.num_defaults);
                for _ in 0..tmpl.num_defaults {
                    defaults.push(self.pop()?);
                }
                defaults.reverse();
                let enclosing = self.frames.last().unwrap().frame.clone();
                let func = FuncObj::Closure {
                    name: tmpl.name.clone(),
                    params: tmpl.params.clone(),
                    defaults,
                    vararg: tmpl.vararg,
                    doc: tmpl.doc.clone(),
                    code: Rc::new(tmpl.code.clone()),
                    enclosing: Some(enclosing),
                };
                self.push(Value::Func(Rc::new(func)));
            }
            Op::FuncDefaults(_) => {}
            Op::MakeType(k) => {
                let base_val = self.pop()?;
                let base = match base_val {
                    Value::None => None,
                    Value::Type(t) => Some(t),
                    _ => return Err(self.raise(self.exceptions.type_error("base must be a type"))),
                };
                let tmpl = &code.type_templates[k as usize];
                let ty = TypeObj::new(tmpl.name.clone(), base);
                self.run_type_body(&ty, &tmpl.code)?;
                self.push(Value::Type(ty));
            }
            Op::Jmp(o) => self.jump(o),
            Op::JmpT(o) => {
                if self.pop()?.is_truthy() {
                    self.jump(o);
                }
            }
            Op::JmpF(o) => {
                if !self.pop()?.is_truthy() {
                    self.jump(o);
                }
            }
            Op::Ret => {
                let v = self.pop()?;
                return self.end_frame(v);
            }
            Op::Throw => {
                let v = self.pop()?;
                return Err(Error::Runtime(Rc::new(v)));
            }
            Op::Assert(k) => {
                let ok = self.pop()?.is_truthy();
                if !ok {
                    let msg = code.constants[k as usize].to_display_string();
                    return Err(self.raise(self.exceptions.assert_error(msg)));
                }
            }
            Op::ForStart => {
                let iterable = self.pop()?;
                let state = self.make_iter_state(iterable)?;
                self.frames.last_mut().unwrap().iterators.push(state);
            }
            Op::ForNextT(o) => {
                let mut state = self.frames.last_mut().unwrap().iterators.pop().ok_or_else(|| Error::internal("no active iterator"))?;
                match state.next(self)? {
                    Some(v) => {
                        self.frames.last_mut().unwrap().iterators.push(state);
                        self.push(v);
                    }
                    None => self.jump(o),
                }
            }
            Op::ForNextF(_) => return Err(Error::internal("ForNextF is not emitted by this compiler")),
            Op::PopIter => {
                self.frames.last_mut().unwrap().iterators.pop();
            }
            Op::TryStart(_) | Op::TryEnd(_) | Op::FinallyEnd => {}
            Op::TryCatch(o) => {
                let ty_val = self.pop()?;
                let Value::Type(ty) = ty_val else {
                    return Err(self.raise(self.exceptions.type_error("catch clause type must be a type")));
                };
                let exc = self.peek(0)?.clone();
                let matches = value_runtime_type(&exc).map(|t| t.is_subtype_of(&ty)).unwrap_or(false);
                if !matches {
                    self.jump(o);
                }
            }
            Op::TryCatchAll(_) => {}
            Op::Import(k) => {
                let dotted = code.names[k as usize].clone();
                let v = self.import_module(&dotted)?;
                self.push(v);
            }
            Op::BinOp(kind) => {
                let right = self.pop()?;
                let left = self.pop()?;
                let v = match self.dispatch_binop_slot(kind, &left, &right)? {
                    Some(v) => v,
                    None => operators::apply_binop(kind, &left, &right)?,
                };
                self.push(v);
            }
            Op::UnOp(kind) => {
                let v = self.pop()?;
                let r = match self.dispatch_unop_slot(kind, &v)? {
                    Some(r) => r,
                    None => operators::apply_unop(kind, &v)?,
                };
                self.push(r);
            }
            Op::UOpNot => {
                let v = self.pop()?;
                self.push(operators::apply_not(&v));
            }
            Op::BOpEeq => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.push(Value::Bool(values_identical(&left, &right)));
            }
            Op::BOpEq => {
                let right = self.pop()?;
                let left = self.pop()?;
                let eq = match self.dispatch_eq_slot(&left, &right)? {
                    Some(v) => v,
                    None => values_equal(&left, &right)?,
                };
                self.push(Value::Bool(eq));
            }
            Op::BOpNe => {
                let right = self.pop()?;
                let left = self.pop()?;
                let eq = match self.dispatch_eq_slot(&left, &right)? {
                    Some(v) => v,
                    None => values_equal(&left, &right)?,
                };
                self.push(Value::Bool(!eq));
            }
            Op::BOpIn => {
                let haystack = self.pop()?;
                let needle = self.pop()?;
                let v = operators::apply_in(&needle, &haystack)?;
                self.push(v);
            }
        }
        Ok(None)
    }

    fn jump(&mut self, offset: i32) {
        let f = self.frames.last_mut().unwrap();
        f.ip = (f.ip as i32 + offset) as usize;
    }

    /// Wraps `apply_binop`/`apply_unop`'s plain-string `Error::Runtime`
    /// payload back into a proper exception. `InstructionLimitExceeded`,
    /// `RecursionLimitExceeded`, and `Internal` stay `Err` — uncatchable,
    /// they propagate straight out of `drive` via `?`.
    fn error_to_exception(&self, err: Error) -> Result<Value> {
        match err {
            Error::Runtime(v) => Ok(match &*v {
                Value::Exception(_) => (*v).clone(),
                other => self.exceptions.make(&self.exceptions.error, other.to_display_string()),
            }),
            Error::Typed(kind, msg) => Ok(self.typed_exception(kind, msg)),
            Error::Import(name) => Ok(self.exceptions.import_error(&name)),
            other => Err(other),
        }
    }

    /// Maps an [`ExcKind`] tag (attached by code with no [`ExceptionTypes`]
    /// access of its own) onto the matching builtin exception type.
    fn typed_exception(&self, kind: ExcKind, msg: String) -> Value {
        let e = &self.exceptions;
        match kind {
            ExcKind::Type => e.type_error(msg),
            ExcKind::Name => e.make(&e.name_error, msg),
            ExcKind::Attr => e.make(&e.attr_error, msg),
            ExcKind::Key => e.key_error(msg),
            ExcKind::Index => e.index_error(msg),
            ExcKind::Val => e.val_error(msg),
            ExcKind::Assert => e.assert_error(msg),
            ExcKind::Math => e.math_error(msg),
            ExcKind::Overflow => e.overflow_error(msg),
            ExcKind::Arg => e.arg_error(msg),
            ExcKind::Size => e.make(&e.size_error, msg),
        }
    }

    fn raise(&self, exc: Value) -> Error {
        Error::Runtime(Rc::new(exc))
    }

    fn is_out_of_iter(&self, exc: &Value) -> bool {
        value_runtime_type(exc).map(|t| t.is_subtype_of(&self.exceptions.out_of_iter_exception)).unwrap_or(false)
    }

    /// Search outward from the innermost frame above `floor` for a handler
    /// covering the current instruction, truncating the stack and resuming
    /// there. `Ok(false)` means the exception ran past frame `floor`; the
    /// value is left on top of the stack for the caller to collect.
    fn unwind(&mut self, exc: Value, floor: usize) -> Result<bool> {
        loop {
            if self.frames.len() <= floor {
                self.stack.push(exc);
                return Ok(false);
            }
            let frame = self.frames.last().unwrap();
            let pc = frame.ip - 1;
            if let Some(handler) = find_handler(&frame.code, pc) {
                let frame = self.frames.last_mut().unwrap();
                self.stack.truncate(frame.stack_base);
                frame.iterators.clear();
                frame.ip = handler;
                self.stack.push(exc);
                return Ok(true);
            }
            let frame = self.frames.pop().unwrap();
            self.stack.truncate(frame.stack_base);
        }
    }

    /// Pops the frame this call's own `drive` is responsible for. The value
    /// is handed back through `Ok(Some(_))` rather than pushed onto the
    /// stack — whichever caller invoked `drive` (a `Call` dispatch, a
    /// top-level `execute`, a type body) decides what to do with it.
    fn end_frame(&mut self, value: Value) -> Result<Option<Value>> {
        let frame = self.frames.pop().ok_or_else(|| Error::internal("end_frame with no frame"))?;
        self.stack.truncate(frame.stack_base);
        if self.frames.is_empty() {
            debug!("outermost frame returned");
        }
        Ok(Some(value))
    }

    fn make_iter_state(&self, v: Value) -> Result<IterState> {
        match v {
            Value::List(l) => Ok(IterState::List(l, 0)),
            Value::Tuple(t) => Ok(IterState::Tuple(t, 0)),
            Value::Str(s) => Ok(IterState::Str(s, 0)),
            Value::Dict(d) => Ok(IterState::Snapshot(d.borrow().iter().map(|(k, _)| k.clone()).collect(), 0)),
            Value::Set(s) => Ok(IterState::Snapshot(s.borrow().iter().map(|(k, _)| k.clone()).collect(), 0)),
            Value::Instance(ref inst) => {
                let iter_fn = inst.ty.slots.borrow().iter.clone();
                match iter_fn {
                    Some(_) => Ok(IterState::Object(v.clone())),
                    None => Err(self.raise(self.exceptions.type_error(format!("'{}' object is not iterable", inst.ty.name)))),
                }
            }
            other => Err(self.raise(self.exceptions.type_error(format!("'{}' object is not iterable", other.type_name())))),
        }
    }

    fn run_type_body(&mut self, ty: &Rc<TypeObj>, code: &CodeObject) -> Result<()> {
        let attr_frame = Frame::new(Some(self.globals.clone()));
        self.frames.push(CallFrame { code: Rc::new(code.clone()), ip: 0, frame: attr_frame.clone(), stack_base: self.stack.len(), iterators: Vec::new() });
        self.drive()?;
        let mut attrs = ty.attrs.borrow_mut();
        for (name, value) in attr_frame.locals.borrow().iter() {
            bind_slot(&ty.slots, name, value.clone());
            attrs.insert(name.clone(), value.clone());
        }
        Ok(())
    }

    fn get_attr(&mut self, obj: &Value, name: &str) -> Result<Value> {
        match obj {
            Value::Instance(inst) => {
                if let Some(v) = inst.attrs.borrow().get(name) {
                    return Ok(v.clone());
                }
                if let Some(v) = inst.ty.lookup_attr(name) {
                    return Ok(v);
                }
                if let Some(getattr) = inst.ty.slots.borrow().getattr.clone() {
                    return self.call_callable(getattr, vec![obj.clone(), Value::str(name)]);
                }
                Err(self.raise(self.exceptions.attr_error(&inst.ty.name, name)))
            }
            Value::Type(t) => t.lookup_attr(name).ok_or_else(|| self.raise(self.exceptions.attr_error("type", name))),
            Value::Module(m) => m.attrs.borrow().get(name).cloned().ok_or_else(|| self.raise(self.exceptions.attr_error("module", name))),
            Value::Exception(e) => match name {
                "message" => Ok(Value::str(e.message.clone())),
                _ => Err(self.raise(self.exceptions.attr_error(&e.ty.name, name))),
            },
            other => methods::get_builtin_method(other, name).ok_or_else(|| self.raise(self.exceptions.attr_error(other.type_name(), name))),
        }
    }

    fn set_attr(&mut self, obj: &Value, name: &str, value: Value) -> Result<()> {
        match obj {
            Value::Instance(inst) => {
                inst.attrs.borrow_mut().insert(name.to_string(), value);
                Ok(())
            }
            Value::Module(m) => {
                m.attrs.borrow_mut().insert(name.to_string(), value);
                Ok(())
            }
            _ => Err(self.raise(self.exceptions.attr_error(obj.type_name(), name))),
        }
    }

    fn get_elem(&mut self, container: &Value, indices: &[Value]) -> Result<Value> {
        match container {
            Value::Instance(inst) => {
                let getelem = inst.ty.slots.borrow().getelem.clone();
                match getelem {
                    Some(f) => {
                        let mut args = vec![container.clone()];
                        args.extend(indices.iter().cloned());
                        self.call_callable(f, args)
                    }
                    None => Err(self.raise(self.exceptions.type_error(format!("'{}' object is not subscriptable", inst.ty.name)))),
                }
            }
            _ => slice::get_elem(container, indices),
        }
    }

    fn set_elem(&mut self, container: &Value, indices: &[Value], value: Value) -> Result<()> {
        match container {
            Value::Instance(inst) => {
                let setelem = inst.ty.slots.borrow().setelem.clone();
                match setelem {
                    Some(f) => {
                        let mut args = vec![container.clone()];
                        args.extend(indices.iter().cloned());
                        args.push(value);
                        self.call_callable(f, args).map(|_| ())
                    }
                    None => Err(self.raise(self.exceptions.type_error(format!("'{}' object does not support item assignment", inst.ty.name)))),
                }
            }
            _ => slice::set_elem(container, indices, value),
        }
    }

    /// §4.1 polymorphic dispatch for `eq`: left's slot first, then right's
    /// (right-side fallback), `None` if neither operand is an instance
    /// defining one — caller falls back to `values_equal`'s identity rule.
    fn dispatch_eq_slot(&mut self, left: &Value, right: &Value) -> Result<Option<bool>> {
        let slot = match left {
            Value::Instance(inst) => inst.ty.slots.borrow().eq.clone(),
            _ => None,
        }
        .or_else(|| match right {
            Value::Instance(inst) => inst.ty.slots.borrow().eq.clone(),
            _ => None,
        });
        match slot {
            Some(f) => Ok(Some(self.call_callable(f, vec![left.clone(), right.clone()])?.is_truthy())),
            None => Ok(None),
        }
    }

    /// §4.1 polymorphic dispatch for the full closed set of binary operators.
    /// `None` means no instance operand defines a matching slot, so the
    /// caller falls back to `operators::apply_binop`.
    fn dispatch_binop_slot(&mut self, kind: crate::bytecode::BinOpKind, left: &Value, right: &Value) -> Result<Option<Value>> {
        use crate::bytecode::BinOpKind;
        let slot_of = |v: &Value| -> Option<Value> {
            let Value::Instance(inst) = v else { return None };
            let slots = inst.ty.slots.borrow();
            match kind {
                BinOpKind::Add => slots.add.clone(),
                BinOpKind::Sub => slots.sub.clone(),
                BinOpKind::Mul => slots.mul.clone(),
                BinOpKind::Div => slots.div.clone(),
                BinOpKind::FloorDiv => slots.floordiv.clone(),
                BinOpKind::Mod => slots.r#mod.clone(),
                BinOpKind::Pow => slots.pow.clone(),
                BinOpKind::Lsh => slots.lsh.clone(),
                BinOpKind::Rsh => slots.rsh.clone(),
                BinOpKind::BinOr => slots.binor.clone(),
                BinOpKind::BinAnd => slots.binand.clone(),
                BinOpKind::BinXor => slots.binxor.clone(),
                BinOpKind::Lt => slots.lt.clone(),
                BinOpKind::Le => slots.le.clone(),
                BinOpKind::Gt => slots.gt.clone(),
                BinOpKind::Ge => slots.ge.clone(),
            }
        };
        match slot_of(left).or_else(|| slot_of(right)) {
            Some(f) => Ok(Some(self.call_callable(f, vec![left.clone(), right.clone()])?)),
            None => Ok(None),
        }
    }

    /// §4.1 polymorphic dispatch for the unary operators (`pos`, `neg`,
    /// `sqig`). `None` means the operand isn't an instance defining the
    /// matching slot, so the caller falls back to `operators::apply_unop`.
    fn dispatch_unop_slot(&mut self, kind: crate::bytecode::UnOpKind, v: &Value) -> Result<Option<Value>> {
        use crate::bytecode::UnOpKind;
        let Value::Instance(inst) = v else { return Ok(None) };
        let slot = {
            let slots = inst.ty.slots.borrow();
            match kind {
                UnOpKind::Pos => slots.pos.clone(),
                UnOpKind::Neg => slots.neg.clone(),
                UnOpKind::Sqig => slots.sqig.clone(),
            }
        };
        match slot {
            Some(f) => Ok(Some(self.call_callable(f, vec![v.clone()])?)),
            None => Ok(None),
        }
    }

    pub fn call_callable(&mut self, callee: Value, args: Vec<Value>) -> Result<Value> {
        match callee {
            Value::Func(f) => {
                // `map`/`filter` invoke their callback once per element; a plain
                // `NativeFn` has no way back into the VM to do that, so they're
                // special-cased here instead of being ordinary native closures.
                if let FuncObj::Native { name, .. } = &*f {
                    match name.as_str() {
                        "map" => return self.dispatch_map(args),
                        "filter" => return self.dispatch_filter(args),
                        "str" => {
                            if let Some(v) = self.try_slot_conversion(&args, |s| s.str.clone())? {
                                return Ok(v);
                            }
                        }
                        "repr" => {
                            if let Some(v) = self.try_slot_conversion(&args, |s| s.repr.clone())? {
                                return Ok(v);
                            }
                        }
                        "len" => {
                            if let Some(v) = self.try_slot_conversion(&args, |s| s.len.clone())? {
                                return Ok(v);
                            }
                        }
                        _ => {}
                    }
                }
                self.call_func(&f, args)
            }
            Value::Type(t) if t.is_subtype_of(&self.exceptions.exception) => {
                let message = args.first().map(|v| v.to_display_string()).unwrap_or_default();
                let exc = Rc::new(ExceptionObj { ty: t.clone(), message, cause: None, args: args.clone() });
                let exc_val = Value::Exception(exc);
                if let Some(init) = t.slots.borrow().init.clone() {
                    let mut full = vec![exc_val.clone()];
                    full.extend(args);
                    self.call_callable(init, full)?;
                }
                Ok(exc_val)
            }
            Value::Type(t) => {
                let inst = Rc::new(Instance { ty: t.clone(), attrs: RefCell::new(HashMap::new()) });
                if let Some(init) = t.slots.borrow().init.clone() {
                    let mut full = vec![Value::Instance(inst.clone())];
                    full.extend(args);
                    self.call_callable(init, full)?;
                }
                Ok(Value::Instance(inst))
            }
            Value::Instance(ref inst) => {
                let call = inst.ty.slots.borrow().call.clone();
                match call {
                    Some(f) => {
                        let mut full = vec![callee.clone()];
                        full.extend(args);
                        self.call_callable(f, full)
                    }
                    None => Err(self.raise(self.exceptions.type_error(format!("'{}' object is not callable", inst.ty.name)))),
                }
            }
            other => Err(self.raise(self.exceptions.type_error(format!("'{}' object is not callable", other.type_name())))),
        }
    }

    /// `str(x)`/`repr(x)`/`len(x)` when `x` is an instance overriding the
    /// matching slot: `Some` short-circuits the caller back to the slot's
    /// result, `None` means fall through to the plain builtin.
    fn try_slot_conversion(&mut self, args: &[Value], slot_of: impl Fn(&Slots) -> Option<Value>) -> Result<Option<Value>> {
        let Some(Value::Instance(inst)) = args.first() else { return Ok(None) };
        let slot = slot_of(&inst.ty.slots.borrow());
        match slot {
            Some(f) => Ok(Some(self.call_callable(f, args.to_vec())?)),
            None => Ok(None),
        }
    }

    fn dispatch_map(&mut self, mut args: Vec<Value>) -> Result<Value> {
        if args.len() != 2 {
            return Err(Error::Typed(ExcKind::Arg, format!("map() takes exactly 2 arguments ({} given)", args.len())));
        }
        let iterable = args.pop().unwrap();
        let func = args.pop().unwrap();
        let mut state = self.make_iter_state(iterable)?;
        let mut out = Vec::new();
        while let Some(item) = state.next(self)? {
            out.push(self.call_callable(func.clone(), vec![item])?);
        }
        Ok(Value::list(out))
    }

    fn dispatch_filter(&mut self, mut args: Vec<Value>) -> Result<Value> {
        if args.len() != 2 {
            return Err(Error::Typed(ExcKind::Arg, format!("filter() takes exactly 2 arguments ({} given)", args.len())));
        }
        let iterable = args.pop().unwrap();
        let func = args.pop().unwrap();
        let mut state = self.make_iter_state(iterable)?;
        let mut out = Vec::new();
        while let Some(item) = state.next(self)? {
            if self.call_callable(func.clone(), vec![item.clone()])?.is_truthy() {
                out.push(item);
            }
        }
        Ok(Value::list(out))
    }

    fn call_func(&mut self, f: &Rc<FuncObj>, args: Vec<Value>) -> Result<Value> {
        match &**f {
            FuncObj::Native { func, .. } => func(&args),
            FuncObj::Closure { name, params, defaults, vararg, code, enclosing, .. } => {
                let frame = Frame::new(enclosing.clone());
                bind_params(&frame, name, params, defaults, *vararg, args, &self.exceptions)?;
                self.frames.push(CallFrame { code: code.clone(), ip: 0, frame, stack_base: self.stack.len(), iterators: Vec::new() });
                self.drive()
            }
        }
    }

    fn import_module(&mut self, dotted: &str) -> Result<Value> {
        let loader = self.modules.clone().ok_or_else(|| Error::Import(dotted.to_string()))?;
        loader(dotted).ok_or_else(|| Error::Import(dotted.to_string()))
    }
}

fn bind_slot(slots: &RefCell<crate::value::Slots>, name: &str, value: Value) {
    let mut s = slots.borrow_mut();
    match name {
        "init" => s.init = Some(value),
        "call" => s.call = Some(value),
        "str" => s.str = Some(value),
        "repr" => s.repr = Some(value),
        "iter" => s.iter = Some(value),
        "next" => s.next = Some(value),
        "getattr" => s.getattr = Some(value),
        "setattr" => s.setattr = Some(value),
        "getelem" => s.getelem = Some(value),
        "setelem" => s.setelem = Some(value),
        "eq" => s.eq = Some(value),
        "lt" => s.lt = Some(value),
        "add" => s.add = Some(value),
        "len" => s.len = Some(value),
        "sub" => s.sub = Some(value),
        "mul" => s.mul = Some(value),
        "div" => s.div = Some(value),
        "floordiv" => s.floordiv = Some(value),
        "mod" => s.r#mod = Some(value),
        "pow" => s.pow = Some(value),
        "le" => s.le = Some(value),
        "gt" => s.gt = Some(value),
        "ge" => s.ge = Some(value),
        "lsh" => s.lsh = Some(value),
        "rsh" => s.rsh = Some(value),
        "binor" => s.binor = Some(value),
        "binand" => s.binand = Some(value),
        "binxor" => s.binxor = Some(value),
        "pos" => s.pos = Some(value),
        "neg" => s.neg = Some(value),
        "sqig" => s.sqig = Some(value),
        _ => {}
    }
}

fn bind_params(
    frame: &Rc<Frame>,
    name: &str,
    params: &[String],
    defaults: &[Value],
    vararg: Option<usize>,
    mut args: Vec<Value>,
    exceptions: &ExceptionTypes,
) -> Result<()> {
    let required = params.len() - defaults.len();
    if vararg.is_none() && args.len() > params.len() {
        return Err(Error::Runtime(Rc::new(
            exceptions.arg_error(format!("{name}() takes at most {} arguments ({} given)", params.len(), args.len())),
        )));
    }
    if args.len() < required {
        return Err(Error::Runtime(Rc::new(
            exceptions.arg_error(format!("{name}() takes at least {required} arguments ({} given)", args.len())),
        )));
    }
    let fixed_len = vararg.unwrap_or(params.len());
    for (i, p) in params.iter().enumerate() {
        if i >= fixed_len {
            break;
        }
        let v = if i < args.len() { args[i].clone() } else { defaults[i - required].clone() };
        frame.define(p.clone(), v);
    }
    if let Some(idx) = vararg {
        let rest = if args.len() > idx { args.split_off(idx) } else { Vec::new() };
        frame.define(params[idx].clone(), Value::tuple(rest));
    }
    Ok(())
}

/// Runtime type of a value, for `catch` clause matching: only instances and
/// exceptions carry one, matching [`crate::exceptions`]'s type taxonomy.
fn value_runtime_type(v: &Value) -> Option<Rc<TypeObj>> {
    match v {
        Value::Instance(i) => Some(i.ty.clone()),
        Value::Exception(e) => Some(e.ty.clone()),
        _ => None,
    }
}

/// Innermost exception-table entry covering `pc`, i.e. the one with the
/// smallest span (nested `try` blocks register their entries independently,
/// in no guaranteed relative order).
fn find_handler(code: &CodeObject, pc: usize) -> Option<usize> {
    code.exception_table
        .iter()
        .filter(|e| (e.start as usize) <= pc && pc < (e.end as usize))
        .min_by_key(|e| e.end - e.start)
        .map(|e| e.handler as usize)
}
