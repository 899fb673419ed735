//! Bytecode instruction set and compiled code representation.
//!
//! This defines the closed opcode set the compiler emits and the VM
//! interprets. Jump arguments are signed byte-offsets relative to the end of
//! the jump instruction (kept here as plain `i32` instruction-index deltas —
//! the VM addresses the `instructions` vector by index rather than raw byte
//! offset, which preserves the spec's "signed offset, patched after the body
//! is emitted" behavior without needing a variable-width byte encoder).

use crate::diagnostic::Span;
use crate::value::Value;

/// Binary arithmetic/bitwise/comparison operators with a dedicated opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Lsh,
    Rsh,
    BinOr,
    BinAnd,
    BinXor,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Unary operators with a dedicated opcode (`not` is its own `UOpNot` op).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOpKind {
    Pos,
    Neg,
    Sqig, // bitwise complement `~x`
}

/// A single bytecode instruction, one-to-one with spec §4.5's closed set.
#[derive(Debug, Clone)]
pub enum Op {
    Noop,

    /// Push `constants[k]`.
    Push(u32),
    /// Pop and discard top of stack.
    PopTop,
    /// Duplicate top of stack.
    Dup,
    /// Duplicate the `n`-from-top item (`n` negative, `-1` is TOS itself).
    DupI(i32),

    /// Load `names[k]`: frame locals, then enclosing closures, then globals.
    Load(u32),
    /// Pop TOS, store into `names[k]`.
    Store(u32),

    /// Pop object, push `object.names[k]`.
    GetAttr(u32),
    /// Pop value, pop object, set `object.names[k] = value`.
    SetAttr(u32),
    /// Pop `n` index operands then the container, push `container[indices]`.
    GetElems(u32),
    /// Pop `n` index operands (top), then the container, leaving the value
    /// being assigned underneath both; set `container[indices] = value`,
    /// consuming all of it (the assignment expression's own result, if one
    /// is needed, is a `Dup` the compiler emits separately before this op).
    SetElems(u32),

    /// TOS is the callee; the `n-1` values below are positional arguments.
    Call(u32),

    /// Pop `n` items, push a `list`.
    BuildList(u32),
    /// Pop `n` items, push a `tuple`.
    BuildTuple(u32),

    /// Build a closure from `func_templates[k]`, popping
    /// `func_templates[k].num_defaults` default values (pushed immediately
    /// before this op, covering the last N parameters) and capturing the
    /// current frame as the enclosing scope.
    MakeFunc(u32),
    /// Reserved for spec fidelity (`func_defa`); this compiler folds default
    /// evaluation into `MakeFunc` itself (see [`FuncTemplate::num_defaults`]).
    FuncDefaults(u32),
    /// Build a type from `type_templates[k]`, popping the base type (or
    /// `none`) below it from the stack and running the body against the new
    /// type's attribute mapping.
    MakeType(u32),

    Jmp(i32),
    /// Pop TOS; if truthy, jump.
    JmpT(i32),
    /// Pop TOS; if falsy, jump.
    JmpF(i32),

    Ret,
    /// Pop TOS, raise it as the current exception.
    Throw,
    /// Pop TOS (a bool). If false, raise `AssertError` using `constants[k]`
    /// (the source snippet) as the message.
    Assert(u32),

    /// Pop the iterable (`iter` slot), push the resulting iterator onto the
    /// frame's iterator stack — a side table, not the value stack, since the
    /// iterator carries no value representation of its own.
    ForStart,
    /// Advance the innermost iterator; if exhausted, pop it off the iterator
    /// stack and jump past the loop (landing where `else`, if any, starts).
    /// If not exhausted, push the next item onto the value stack and fall
    /// through.
    ForNextT(i32),
    /// Reserved for spec fidelity; this compiler only emits `ForNextT`.
    ForNextF(i32),
    /// Pop the innermost iterator off the frame's iterator stack without
    /// touching the value stack; emitted by `break` inside a `for` loop,
    /// which jumps past the exhaustion check that would otherwise do this.
    PopIter,

    /// Push an exception handler resuming at `pc + o`.
    TryStart(i32),
    /// If the thrown exception's type matches `constants[k]`-less inline type
    /// check (type value is on the stack), bind and clear; else jump past.
    TryCatch(i32),
    TryCatchAll(i32),
    /// Pop the handler, jump past remaining catch clauses.
    TryEnd(i32),
    /// Re-enter unwind if a pending exception exists (runs `finally` on both
    /// the normal and exceptional path).
    FinallyEnd,

    /// Import `names[k]` via the registered module loader.
    Import(u32),

    BinOp(BinOpKind),
    UnOp(UnOpKind),
    UOpNot,

    /// Identity comparison `===`.
    BOpEeq,
    /// `==`
    BOpEq,
    /// `!=`
    BOpNe,
    /// `in`
    BOpIn,
}

/// Everything about a function literal, including its compiled body.
#[derive(Debug, Clone)]
pub struct FuncTemplate {
    pub name: String,
    pub params: Vec<String>,
    pub vararg: Option<usize>,
    pub doc: Option<String>,
    pub code: CodeObject,
    /// How many of the default-value expressions were pushed onto the stack
    /// immediately before `MakeFunc`; they cover the last `num_defaults`
    /// entries of `params`, evaluated fresh each time the literal executes
    /// (so a default may reference a runtime value). Folds the spec's
    /// separate `func_defa` opcode into `MakeFunc` itself.
    pub num_defaults: usize,
}

/// Everything about a type literal, including its compiled body.
#[derive(Debug, Clone)]
pub struct TypeTemplate {
    pub name: String,
    pub doc: Option<String>,
    pub code: CodeObject,
}

/// An entry in the exception table mapping an instruction range to a
/// handler. Kept as a side table (rather than inline `try_start`/`try_end`
/// bracketing alone) so the VM can resolve "is pc X covered by a handler"
/// without re-walking the bytecode.
#[derive(Debug, Clone)]
pub struct ExceptionEntry {
    pub start: u32,
    pub end: u32,
    pub handler: u32,
}

/// A compiled unit of code: a script, function body, or type body.
#[derive(Debug, Clone)]
pub struct CodeObject {
    pub instructions: Vec<Op>,
    pub constants: Vec<Value>,
    pub names: Vec<String>,
    pub spans: Vec<Span>,
    pub source: String,
    pub exception_table: Vec<ExceptionEntry>,
    pub func_templates: Vec<FuncTemplate>,
    pub type_templates: Vec<TypeTemplate>,
}

impl CodeObject {
    pub fn new(source: String) -> Self {
        Self {
            instructions: Vec::new(),
            constants: Vec::new(),
            names: Vec::new(),
            spans: Vec::new(),
            source,
            exception_table: Vec::new(),
            func_templates: Vec::new(),
            type_templates: Vec::new(),
        }
    }
}
