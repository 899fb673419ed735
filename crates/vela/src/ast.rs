//! Abstract syntax tree produced by the parser.
//!
//! `RichCmp` is its own node (not a chain of binary nodes) so that chained
//! comparisons (`a < b < c`) can be compiled to evaluate each operand once,
//! matching the construction of `KS_AST_RICHCMP` in the original grammar this
//! language's comparison-chaining behavior is grounded on.

use crate::bytecode::{BinOpKind, UnOpKind};
use crate::diagnostic::Span;

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    None_,
    True_,
    False_,
    Inf,
    Nan,
    Ellipsis,
    Int(String),
    Float(String),
    Complex(String),
    Str(String),
    Regex(String),
    Name(String),
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Set(Vec<Expr>),

    Unary { op: UnOpKind, operand: Box<Expr> },
    Not(Box<Expr>),
    Binary { op: BinOpKind, left: Box<Expr>, right: Box<Expr> },
    BoolOp { is_and: bool, left: Box<Expr>, right: Box<Expr> },
    NullCoalesce { left: Box<Expr>, right: Box<Expr> },
    /// Chained rich comparison: `a OP1 b OP2 c ...`
    RichCmp { operands: Vec<Expr>, ops: Vec<CmpOp> },
    Ternary { cond: Box<Expr>, then: Box<Expr>, else_: Box<Expr> },

    Call { callee: Box<Expr>, args: Vec<Expr> },
    GetAttr { obj: Box<Expr>, name: String },
    GetElem { obj: Box<Expr>, index: Vec<Expr> },
    Assign { target: Box<Expr>, value: Box<Expr> },
    CompoundAssign { target: Box<Expr>, op: BinOpKind, value: Box<Expr> },

    Lambda { params: Vec<Param>, body: Box<Expr> },
    FuncLit { name: Option<String>, params: Vec<Param>, vararg: Option<usize>, body: Box<Block> },
    TypeLit { name: Option<String>, base: Option<Box<Expr>>, body: Box<Block> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Eeq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct CatchClause {
    pub ty: Option<Expr>,
    pub bind: Option<String>,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Expr(Expr),
    Import { dotted: Vec<String>, alias: Option<String> },
    Ret(Option<Expr>),
    Throw(Option<Expr>),
    Assert(Expr, String),
    Break,
    Cont,
    If { cond: Expr, then: Block, elifs: Vec<(Expr, Block)>, else_: Option<Block> },
    While { cond: Expr, body: Block, else_: Option<Block> },
    For { target: Expr, iter: Expr, body: Block, else_: Option<Block> },
    Try { body: Block, catches: Vec<CatchClause>, finally: Option<Block> },
}
