//! AST → bytecode compiler.
//!
//! A straightforward recursive visitor producing a flat instruction stream
//! with jump-patching: jump instructions are emitted with a placeholder
//! offset and patched once the target index is known. Name resolution is
//! left to the VM at run time (frame locals, then enclosing closures, then
//! globals) so the compiler itself stays a structural AST walk with no
//! symbol table.

use crate::ast::*;
use crate::bytecode::{BinOpKind, CodeObject, ExceptionEntry, FuncTemplate, Op, TypeTemplate};
use crate::diagnostic::{Diagnostic, Span};
use crate::value::{Int, Value};
use num_bigint::BigInt;
use num_complex::Complex64;

pub fn compile(block: &Block, source: &str) -> Result<CodeObject, Diagnostic> {
    let mut c = Compiler::new(source.to_string());
    c.compile_block(block)?;
    let last_is_ret = matches!(c.code.instructions.last(), Some(Op::Ret));
    if !last_is_ret {
        let k = c.const_idx(Value::None);
        c.emit(Op::Push(k), Span::default());
        c.emit(Op::Ret, Span::default());
    }
    Ok(c.code)
}

struct LoopCtx {
    continue_at: usize,
    break_patches: Vec<usize>,
    is_for: bool,
}

struct Compiler {
    code: CodeObject,
    loops: Vec<LoopCtx>,
    next_temp: usize,
}

impl Compiler {
    fn new(source: String) -> Self {
        Compiler { code: CodeObject::new(source), loops: Vec::new(), next_temp: 0 }
    }

    /// A name no surface-syntax identifier can spell (lexer names never
    /// start with `$`), used to hold intermediate chained-comparison
    /// operands in a frame local rather than juggling stack positions.
    fn fresh_temp_idx(&mut self) -> u32 {
        let name = format!("$cmp{}", self.next_temp);
        self.next_temp += 1;
        self.name_idx(&name)
    }

    fn emit(&mut self, op: Op, span: Span) -> usize {
        self.code.instructions.push(op);
        self.code.spans.push(span);
        self.code.instructions.len() - 1
    }

    fn here(&self) -> usize {
        self.code.instructions.len()
    }

    fn patch_jump(&mut self, at: usize, target: usize) {
        let delta = target as i32 - at as i32;
        match &mut self.code.instructions[at] {
            Op::Jmp(o) | Op::JmpT(o) | Op::JmpF(o) | Op::ForNextT(o) | Op::ForNextF(o) | Op::TryStart(o) | Op::TryCatch(o) | Op::TryCatchAll(o) | Op::TryEnd(o) => {
                *o = delta;
            }
            other => unreachable!("patch_jump on non-jump op {other:?}"),
        }
    }

    fn name_idx(&mut self, name: &str) -> u32 {
        if let Some(i) = self.code.names.iter().position(|n| n == name) {
            return i as u32;
        }
        self.code.names.push(name.to_string());
        (self.code.names.len() - 1) as u32
    }

    fn const_idx(&mut self, v: Value) -> u32 {
        if let Some(i) = self.code.constants.iter().position(|existing| same_const(existing, &v)) {
            return i as u32;
        }
        self.code.constants.push(v);
        (self.code.constants.len() - 1) as u32
    }

    fn err(&self, msg: impl Into<String>, span: Span) -> Diagnostic {
        Diagnostic::new(msg).with_source(self.code.source.clone()).with_label(span, "here")
    }

    // -- statements -----------------------------------------------------

    fn compile_block(&mut self, block: &Block) -> Result<(), Diagnostic> {
        for stmt in &block.stmts {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), Diagnostic> {
        match &stmt.kind {
            StmtKind::Expr(e) => {
                self.compile_expr(e)?;
                self.emit(Op::PopTop, stmt.span);
            }
            StmtKind::Import { dotted, alias } => {
                let dotted_name = dotted.join(".");
                let k = self.name_idx(&dotted_name);
                self.emit(Op::Import(k), stmt.span);
                let bind = alias.clone().unwrap_or_else(|| dotted[0].clone());
                let bind_idx = self.name_idx(&bind);
                self.emit(Op::Store(bind_idx), stmt.span);
            }
            StmtKind::Ret(val) => {
                self.compile_expr_or_none(val, stmt.span)?;
                self.emit(Op::Ret, stmt.span);
            }
            StmtKind::Throw(val) => {
                self.compile_expr_or_none(val, stmt.span)?;
                self.emit(Op::Throw, stmt.span);
            }
            StmtKind::Assert(e, text) => {
                self.compile_expr(e)?;
                let k = self.const_idx(Value::str(text.clone()));
                self.emit(Op::Assert(k), stmt.span);
            }
            StmtKind::Break => {
                let Some(ctx) = self.loops.last() else {
                    return Err(self.err("'break' outside loop", stmt.span));
                };
                if ctx.is_for {
                    self.emit(Op::PopIter, stmt.span);
                }
                let at = self.emit(Op::Jmp(0), stmt.span);
                self.loops.last_mut().unwrap().break_patches.push(at);
            }
            StmtKind::Cont => {
                let Some(ctx) = self.loops.last() else {
                    return Err(self.err("'cont' outside loop", stmt.span));
                };
                let target = ctx.continue_at;
                let at = self.emit(Op::Jmp(0), stmt.span);
                self.patch_jump(at, target);
            }
            StmtKind::If { cond, then, elifs, else_ } => {
                self.compile_if(cond, then, elifs, else_, stmt.span)?;
            }
            StmtKind::While { cond, body, else_ } => {
                self.compile_while(cond, body, else_, stmt.span)?;
            }
            StmtKind::For { target, iter, body, else_ } => {
                self.compile_for(target, iter, body, else_, stmt.span)?;
            }
            StmtKind::Try { body, catches, finally } => {
                self.compile_try(body, catches, finally, stmt.span)?;
            }
        }
        Ok(())
    }

    fn compile_expr_or_none(&mut self, val: &Option<Expr>, span: Span) -> Result<(), Diagnostic> {
        match val {
            Some(e) => self.compile_expr(e),
            None => {
                let k = self.const_idx(Value::None);
                self.emit(Op::Push(k), span);
                Ok(())
            }
        }
    }

    fn compile_if(
        &mut self,
        cond: &Expr,
        then: &Block,
        elifs: &[(Expr, Block)],
        else_: &Option<Block>,
        span: Span,
    ) -> Result<(), Diagnostic> {
        self.compile_expr(cond)?;
        let jf = self.emit(Op::JmpF(0), span);
        self.compile_block(then)?;
        let mut end_patches = vec![self.emit(Op::Jmp(0), span)];
        self.patch_jump(jf, self.here());

        for (c, b) in elifs {
            self.compile_expr(c)?;
            let jf2 = self.emit(Op::JmpF(0), span);
            self.compile_block(b)?;
            end_patches.push(self.emit(Op::Jmp(0), span));
            self.patch_jump(jf2, self.here());
        }

        if let Some(e) = else_ {
            self.compile_block(e)?;
        }
        let end = self.here();
        for p in end_patches {
            self.patch_jump(p, end);
        }
        Ok(())
    }

    fn compile_while(&mut self, cond: &Expr, body: &Block, else_: &Option<Block>, span: Span) -> Result<(), Diagnostic> {
        let top = self.here();
        self.compile_expr(cond)?;
        let jf = self.emit(Op::JmpF(0), span);
        self.loops.push(LoopCtx { continue_at: top, break_patches: Vec::new(), is_for: false });
        self.compile_block(body)?;
        let back = self.emit(Op::Jmp(0), span);
        self.patch_jump(back, top);
        let ctx = self.loops.pop().unwrap();
        self.patch_jump(jf, self.here());
        if let Some(e) = else_ {
            self.compile_block(e)?;
        }
        let end = self.here();
        for p in ctx.break_patches {
            self.patch_jump(p, end);
        }
        Ok(())
    }

    fn compile_for(&mut self, target: &Expr, iter: &Expr, body: &Block, else_: &Option<Block>, span: Span) -> Result<(), Diagnostic> {
        self.compile_expr(iter)?;
        self.emit(Op::ForStart, span);
        let top = self.here();
        let fnext = self.emit(Op::ForNextT(0), span);
        self.compile_assign_target(target)?;
        self.loops.push(LoopCtx { continue_at: top, break_patches: Vec::new(), is_for: true });
        self.compile_block(body)?;
        let back = self.emit(Op::Jmp(0), span);
        self.patch_jump(back, top);
        let ctx = self.loops.pop().unwrap();
        self.patch_jump(fnext, self.here());
        if let Some(e) = else_ {
            self.compile_block(e)?;
        }
        let end = self.here();
        for p in ctx.break_patches {
            self.patch_jump(p, end);
        }
        Ok(())
    }

    /// Lowering of `try`/`catch`/`finally`: the exception table drives entry
    /// into the catch-dispatch chain on an unwind; `finally` has no dedicated
    /// resumption opcode and is instead compiled once per exit path (normal
    /// completion, each catch, and the uncaught re-throw) — trades code size
    /// for not needing a subroutine/return-address mechanism.
    fn compile_try(&mut self, body: &Block, catches: &[CatchClause], finally: &Option<Block>, span: Span) -> Result<(), Diagnostic> {
        let body_start = self.here();
        self.compile_block(body)?;
        if let Some(f) = finally {
            self.compile_block(f)?;
        }
        let jmp_over_catches = self.emit(Op::Jmp(0), span);
        let body_end = self.here();
        let handler = body_end;

        let mut end_patches = vec![jmp_over_catches];
        for catch in catches {
            let fail_target_patch = match &catch.ty {
                Some(ty_expr) => {
                    self.compile_expr(ty_expr)?;
                    Some(self.emit(Op::TryCatch(0), span))
                }
                None => {
                    self.emit(Op::TryCatchAll(0), span);
                    None
                }
            };
            if let Some(name) = &catch.bind {
                let idx = self.name_idx(name);
                self.emit(Op::Store(idx), span);
            } else {
                self.emit(Op::PopTop, span);
            }
            self.compile_block(&catch.body)?;
            if let Some(f) = finally {
                self.compile_block(f)?;
            }
            end_patches.push(self.emit(Op::Jmp(0), span));
            if let Some(p) = fail_target_patch {
                self.patch_jump(p, self.here());
            }
        }
        // Nothing matched: run `finally`, then re-throw the still-live
        // exception value.
        if let Some(f) = finally {
            self.compile_block(f)?;
        }
        self.emit(Op::Throw, span);

        let end = self.here();
        for p in end_patches {
            self.patch_jump(p, end);
        }
        self.code.exception_table.push(ExceptionEntry { start: body_start as u32, end: body_end as u32, handler: handler as u32 });
        Ok(())
    }

    fn compile_assign_target(&mut self, target: &Expr) -> Result<(), Diagnostic> {
        match &target.kind {
            ExprKind::Name(n) => {
                let idx = self.name_idx(n);
                self.emit(Op::Store(idx), target.span);
            }
            ExprKind::GetAttr { obj, name } => {
                self.compile_expr(obj)?;
                let idx = self.name_idx(name);
                self.emit(Op::SetAttr(idx), target.span);
            }
            ExprKind::GetElem { obj, index } => {
                self.compile_expr(obj)?;
                for i in index {
                    self.compile_expr(i)?;
                }
                self.emit(Op::SetElems(index.len() as u32), target.span);
            }
            ExprKind::Tuple(items) | ExprKind::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i + 1 < items.len() {
                        self.emit(Op::Dup, target.span);
                    }
                    let k = self.const_idx(Value::int(i as i64));
                    self.emit(Op::Push(k), target.span);
                    self.emit(Op::GetElems(1), target.span);
                    self.compile_assign_target(item)?;
                }
            }
            _ => return Err(self.err("invalid assignment target", target.span)),
        }
        Ok(())
    }

    // -- expressions ------------------------------------------------------

    fn compile_expr(&mut self, e: &Expr) -> Result<(), Diagnostic> {
        match &e.kind {
            ExprKind::None_ => {
                let k = self.const_idx(Value::None);
                self.emit(Op::Push(k), e.span);
            }
            ExprKind::True_ => {
                let k = self.const_idx(Value::Bool(true));
                self.emit(Op::Push(k), e.span);
            }
            ExprKind::False_ => {
                let k = self.const_idx(Value::Bool(false));
                self.emit(Op::Push(k), e.span);
            }
            ExprKind::Inf => {
                let k = self.const_idx(Value::Float(f64::INFINITY));
                self.emit(Op::Push(k), e.span);
            }
            ExprKind::Nan => {
                let k = self.const_idx(Value::Float(f64::NAN));
                self.emit(Op::Push(k), e.span);
            }
            ExprKind::Ellipsis => {
                let k = self.const_idx(Value::str("..."));
                self.emit(Op::Push(k), e.span);
            }
            ExprKind::Int(s) => {
                let k = self.const_idx(Value::Int(parse_int_literal(s)));
                self.emit(Op::Push(k), e.span);
            }
            ExprKind::Float(s) => {
                let k = self.const_idx(Value::Float(parse_float_literal(s)));
                self.emit(Op::Push(k), e.span);
            }
            ExprKind::Complex(s) => {
                let k = self.const_idx(Value::Complex(parse_complex_literal(s)));
                self.emit(Op::Push(k), e.span);
            }
            ExprKind::Str(s) => {
                let k = self.const_idx(Value::str(s.clone()));
                self.emit(Op::Push(k), e.span);
            }
            ExprKind::Regex(s) => {
                let re = crate::regex::Regex::compile(s).map_err(|err| self.err(err.to_string(), e.span))?;
                let k = self.const_idx(Value::Regex(std::rc::Rc::new(re)));
                self.emit(Op::Push(k), e.span);
            }
            ExprKind::Name(n) => {
                let idx = self.name_idx(n);
                self.emit(Op::Load(idx), e.span);
            }
            ExprKind::Tuple(items) => {
                for i in items {
                    self.compile_expr(i)?;
                }
                self.emit(Op::BuildTuple(items.len() as u32), e.span);
            }
            ExprKind::List(items) => {
                for i in items {
                    self.compile_expr(i)?;
                }
                self.emit(Op::BuildList(items.len() as u32), e.span);
            }
            ExprKind::Dict(pairs) => {
                // SetElems expects [..., value, container, index] on the
                // stack (value at the bottom of the triple); build each
                // entry in that order and leave the dict itself in place
                // beneath it as the expression's final value.
                let k = self.name_idx("dict");
                self.emit(Op::Load(k), e.span);
                self.emit(Op::Call(1), e.span);
                for (key, val) in pairs {
                    self.compile_expr(val)?;
                    self.emit(Op::DupI(-2), e.span);
                    self.compile_expr(key)?;
                    self.emit(Op::SetElems(1), e.span);
                }
            }
            ExprKind::Set(items) => {
                let k = self.name_idx("set");
                self.emit(Op::Load(k), e.span);
                self.emit(Op::Call(1), e.span);
                for item in items {
                    self.emit(Op::Dup, e.span);
                    let add = self.name_idx("add");
                    self.emit(Op::GetAttr(add), e.span);
                    self.compile_expr(item)?;
                    self.emit(Op::Call(2), e.span);
                    self.emit(Op::PopTop, e.span);
                }
            }
            ExprKind::Unary { op, operand } => {
                self.compile_expr(operand)?;
                self.emit(Op::UnOp(*op), e.span);
            }
            ExprKind::Not(operand) => {
                self.compile_expr(operand)?;
                self.emit(Op::UOpNot, e.span);
            }
            ExprKind::Binary { op, left, right } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit(Op::BinOp(*op), e.span);
            }
            ExprKind::BoolOp { is_and, left, right } => {
                // Value-preserving short-circuit: keep the left operand on
                // the stack and test a duplicate, so an `and`/`or` chain
                // yields the first decisive operand rather than a plain bool.
                self.compile_expr(left)?;
                self.emit(Op::Dup, e.span);
                let short = if *is_and { self.emit(Op::JmpF(0), e.span) } else { self.emit(Op::JmpT(0), e.span) };
                self.emit(Op::PopTop, e.span);
                self.compile_expr(right)?;
                self.patch_jump(short, self.here());
            }
            ExprKind::NullCoalesce { left, right } => {
                self.compile_expr(left)?;
                self.emit(Op::Dup, e.span);
                let k = self.const_idx(Value::None);
                self.emit(Op::Push(k), e.span);
                self.emit(Op::BOpEq, e.span);
                let jf = self.emit(Op::JmpF(0), e.span);
                self.emit(Op::PopTop, e.span);
                self.compile_expr(right)?;
                let end = self.emit(Op::Jmp(0), e.span);
                self.patch_jump(jf, self.here());
                self.patch_jump(end, self.here());
            }
            ExprKind::RichCmp { operands, ops } => {
                self.compile_richcmp(operands, ops, e.span)?;
            }
            ExprKind::Ternary { cond, then, else_ } => {
                self.compile_expr(cond)?;
                let jf = self.emit(Op::JmpF(0), e.span);
                self.compile_expr(then)?;
                let end = self.emit(Op::Jmp(0), e.span);
                self.patch_jump(jf, self.here());
                self.compile_expr(else_)?;
                self.patch_jump(end, self.here());
            }
            ExprKind::Call { callee, args } => {
                self.compile_expr(callee)?;
                for a in args {
                    self.compile_expr(a)?;
                }
                self.emit(Op::Call((args.len() + 1) as u32), e.span);
            }
            ExprKind::GetAttr { obj, name } => {
                self.compile_expr(obj)?;
                let idx = self.name_idx(name);
                self.emit(Op::GetAttr(idx), e.span);
            }
            ExprKind::GetElem { obj, index } => {
                self.compile_expr(obj)?;
                for i in index {
                    self.compile_expr(i)?;
                }
                self.emit(Op::GetElems(index.len() as u32), e.span);
            }
            ExprKind::Assign { target, value } => {
                self.compile_expr(value)?;
                self.emit(Op::Dup, e.span);
                self.compile_assign_target(target)?;
            }
            ExprKind::CompoundAssign { target, op, value } => {
                self.compile_expr(target)?;
                self.compile_expr(value)?;
                self.emit(Op::BinOp(*op), e.span);
                self.emit(Op::Dup, e.span);
                self.compile_assign_target(target)?;
            }
            ExprKind::Lambda { params, body } => {
                let wrapper = Block { stmts: vec![Stmt { kind: StmtKind::Ret(Some((**body).clone())), span: e.span }] };
                self.compile_func_literal(&None, params, &None, &wrapper, e.span)?;
            }
            ExprKind::FuncLit { name, params, vararg, body } => {
                self.compile_func_literal(name, params, vararg, body, e.span)?;
            }
            ExprKind::TypeLit { name, base, body } => {
                match base {
                    Some(b) => self.compile_expr(b)?,
                    None => {
                        let k = self.const_idx(Value::None);
                        self.emit(Op::Push(k), e.span);
                    }
                }
                let mut sub = Compiler::new(self.code.source.clone());
                sub.compile_block(body)?;
                let k = sub.const_idx(Value::None);
                sub.emit(Op::Push(k), e.span);
                sub.emit(Op::Ret, e.span);
                let tmpl = TypeTemplate { name: name.clone().unwrap_or_default(), doc: None, code: sub.code };
                self.code.type_templates.push(tmpl);
                let idx = (self.code.type_templates.len() - 1) as u32;
                self.emit(Op::MakeType(idx), e.span);
            }
        }
        Ok(())
    }

    /// Chained comparison `a OP1 b OP2 c ...`: each operand evaluated exactly
    /// once, holding the running left operand in a hidden frame local
    /// (`fresh_temp_idx`) between links rather than juggling stack
    /// positions. Any non-final link failing short-circuits straight to
    /// `false`; the last link's own boolean is the overall result.
    fn compile_richcmp(&mut self, operands: &[Expr], ops: &[CmpOp], span: Span) -> Result<(), Diagnostic> {
        self.compile_expr(&operands[0])?;
        let mut cur = self.fresh_temp_idx();
        self.emit(Op::Store(cur), span);
        let mut fail_patches = Vec::new();
        for (i, op) in ops.iter().enumerate() {
            let is_last = i + 1 == ops.len();
            self.emit(Op::Load(cur), span);
            self.compile_expr(&operands[i + 1])?;
            if !is_last {
                let next = self.fresh_temp_idx();
                self.emit(Op::Dup, span);
                self.emit(Op::Store(next), span);
                cur = next;
            }
            self.emit_cmp(*op, span);
            if !is_last {
                fail_patches.push(self.emit(Op::JmpF(0), span));
            }
        }
        let end = self.emit(Op::Jmp(0), span);
        let fail_at = self.here();
        let k = self.const_idx(Value::Bool(false));
        self.emit(Op::Push(k), span);
        for p in fail_patches {
            self.patch_jump(p, fail_at);
        }
        self.patch_jump(end, self.here());
        Ok(())
    }

    fn emit_cmp(&mut self, op: CmpOp, span: Span) {
        match op {
            CmpOp::Eq => self.emit(Op::BOpEq, span),
            CmpOp::Eeq => self.emit(Op::BOpEeq, span),
            CmpOp::Ne => self.emit(Op::BOpNe, span),
            CmpOp::In => self.emit(Op::BOpIn, span),
            CmpOp::Lt => self.emit(Op::BinOp(BinOpKind::Lt), span),
            CmpOp::Le => self.emit(Op::BinOp(BinOpKind::Le), span),
            CmpOp::Gt => self.emit(Op::BinOp(BinOpKind::Gt), span),
            CmpOp::Ge => self.emit(Op::BinOp(BinOpKind::Ge), span),
        };
    }

    fn compile_func_literal(
        &mut self,
        name: &Option<String>,
        params: &[Param],
        vararg: &Option<usize>,
        body: &Block,
        span: Span,
    ) -> Result<(), Diagnostic> {
        for p in params {
            if let Some(default) = &p.default {
                self.compile_expr(default)?;
            }
        }
        let mut sub = Compiler::new(self.code.source.clone());
        sub.compile_block(body)?;
        let last_is_ret = matches!(sub.code.instructions.last(), Some(Op::Ret));
        if !last_is_ret {
            let k = sub.const_idx(Value::None);
            sub.emit(Op::Push(k), span);
            sub.emit(Op::Ret, span);
        }
        let num_defaults = params.iter().filter(|p| p.default.is_some()).count();
        let tmpl = FuncTemplate {
            name: name.clone().unwrap_or_else(|| "<anonymous>".to_string()),
            params: params.iter().map(|p| p.name.clone()).collect(),
            vararg: *vararg,
            doc: None,
            code: sub.code,
            num_defaults,
        };
        self.code.func_templates.push(tmpl);
        let idx = (self.code.func_templates.len() - 1) as u32;
        self.emit(Op::MakeFunc(idx), span);
        Ok(())
    }
}

fn same_const(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(Int::Small(x)), Value::Int(Int::Small(y))) => x == y,
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        (Value::Str(x), Value::Str(y)) => x.as_str() == y.as_str(),
        _ => false,
    }
}

pub fn parse_int_literal(s: &str) -> Int {
    let cleaned: String = s.chars().filter(|c| *c != '_').collect();
    let (radix, digits) = if cleaned.len() > 2 && cleaned.starts_with('0') {
        match cleaned.as_bytes()[1] {
            b'b' | b'B' => (2, &cleaned[2..]),
            b'o' | b'O' => (8, &cleaned[2..]),
            b'd' | b'D' => (10, &cleaned[2..]),
            b'x' | b'X' => (16, &cleaned[2..]),
            _ => (10, cleaned.as_str()),
        }
    } else {
        (10, cleaned.as_str())
    };
    match i64::from_str_radix(digits, radix) {
        Ok(v) => Int::Small(v),
        Err(_) => Int::Big(BigInt::parse_bytes(digits.as_bytes(), radix).unwrap_or_default()),
    }
}

pub fn parse_float_literal(s: &str) -> f64 {
    let mut cleaned: String = s.chars().filter(|c| *c != '_').collect();
    if cleaned.ends_with('i') || cleaned.ends_with('I') {
        cleaned.pop();
    }
    let cleaned = cleaned.replace(['p', 'P'], "e");
    cleaned.parse().unwrap_or(f64::NAN)
}

pub fn parse_complex_literal(s: &str) -> Complex64 {
    Complex64::new(0.0, parse_float_literal(s))
}
