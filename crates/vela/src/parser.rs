//! Hand-written recursive-descent parser with precedence climbing.
//!
//! Grounded in the same visitor-over-a-flat-token-buffer shape the compiler
//! uses to walk the AST, and in the original grammar's `E0_CASE`-style
//! binary-operator precedence table and its chained-comparison handling
//! (collecting all operands of `a < b < c` into one node rather than nesting
//! binaries).

use crate::ast::*;
use crate::bytecode::{BinOpKind, UnOpKind};
use crate::diagnostic::{Diagnostic, Span};
use crate::lexer::{Lexer, TokKind, Token};

pub struct Parser {
    toks: Vec<Token>,
    pos: usize,
    source: String,
}

type PResult<T> = Result<T, Diagnostic>;

pub fn parse_program(source: &str) -> PResult<Block> {
    let toks = Lexer::new(source).tokenize()?;
    let mut p = Parser { toks, pos: 0, source: source.to_string() };
    p.parse_block_until_eof()
}

impl Parser {
    fn cur(&self) -> &TokKind {
        &self.toks[self.pos].kind
    }

    fn span(&self) -> Span {
        self.toks[self.pos].span
    }

    fn at_eof(&self) -> bool {
        matches!(self.cur(), TokKind::Eof)
    }

    fn bump(&mut self) -> Token {
        let t = self.toks[self.pos].clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn err(&self, msg: impl Into<String>) -> Diagnostic {
        Diagnostic::new(msg).with_source(self.source.clone()).with_label(self.span(), "here")
    }

    fn expect(&mut self, kind: TokKind) -> PResult<Token> {
        if std::mem::discriminant(self.cur()) == std::mem::discriminant(&kind) {
            Ok(self.bump())
        } else {
            Err(self.err(format!("expected {:?}, found {:?}", kind, self.cur())))
        }
    }

    fn eat(&mut self, kind: &TokKind) -> bool {
        if std::mem::discriminant(self.cur()) == std::mem::discriminant(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_terms(&mut self) {
        while matches!(self.cur(), TokKind::Newline | TokKind::Semi) {
            self.bump();
        }
    }

    // -- blocks / statements -------------------------------------------------

    fn parse_block_until_eof(&mut self) -> PResult<Block> {
        let mut stmts = Vec::new();
        self.skip_terms();
        while !self.at_eof() {
            stmts.push(self.parse_stmt()?);
            self.skip_terms();
        }
        Ok(Block { stmts })
    }

    /// A brace block `{ ... }`, or (for single-statement branches) a comma
    /// followed by one statement.
    fn parse_block(&mut self) -> PResult<Block> {
        if self.eat(&TokKind::LBrace) {
            let mut stmts = Vec::new();
            self.skip_terms();
            while !matches!(self.cur(), TokKind::RBrace) {
                stmts.push(self.parse_stmt()?);
                self.skip_terms();
            }
            self.expect(TokKind::RBrace)?;
            Ok(Block { stmts })
        } else {
            self.expect(TokKind::Comma)?;
            let stmt = self.parse_stmt()?;
            Ok(Block { stmts: vec![stmt] })
        }
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        let start = self.span();
        let kind = match self.cur().clone() {
            TokKind::Import => {
                self.bump();
                let mut dotted = vec![self.expect_name()?];
                while self.eat(&TokKind::Dot) {
                    dotted.push(self.expect_name()?);
                }
                let alias = if self.eat(&TokKind::As) { Some(self.expect_name()?) } else { None };
                StmtKind::Import { dotted, alias }
            }
            TokKind::Ret => {
                self.bump();
                let val = self.maybe_expr_before_terminator()?;
                StmtKind::Ret(val)
            }
            TokKind::Throw => {
                self.bump();
                let val = self.maybe_expr_before_terminator()?;
                StmtKind::Throw(val)
            }
            TokKind::Assert => {
                self.bump();
                let snippet_start = self.pos;
                let e = self.parse_expr()?;
                let text = self.slice_tokens_source(snippet_start, self.pos);
                StmtKind::Assert(e, text)
            }
            TokKind::Break => {
                self.bump();
                StmtKind::Break
            }
            TokKind::Cont => {
                self.bump();
                StmtKind::Cont
            }
            TokKind::If => {
                self.bump();
                let cond = self.parse_expr()?;
                let then = self.parse_block()?;
                let mut elifs = Vec::new();
                let mut else_ = None;
                loop {
                    self.skip_soft();
                    if self.eat(&TokKind::Elif) {
                        let c = self.parse_expr()?;
                        let b = self.parse_block()?;
                        elifs.push((c, b));
                    } else if self.eat(&TokKind::Else) {
                        else_ = Some(self.parse_block()?);
                        break;
                    } else {
                        break;
                    }
                }
                StmtKind::If { cond, then, elifs, else_ }
            }
            TokKind::While => {
                self.bump();
                let cond = self.parse_expr()?;
                let body = self.parse_block()?;
                self.skip_soft();
                let else_ = if self.eat(&TokKind::Else) { Some(self.parse_block()?) } else { None };
                StmtKind::While { cond, body, else_ }
            }
            TokKind::For => {
                self.bump();
                let target = self.parse_assign()?;
                self.expect(TokKind::In)?;
                let iter = self.parse_expr()?;
                let body = self.parse_block()?;
                self.skip_soft();
                let else_ = if self.eat(&TokKind::Else) { Some(self.parse_block()?) } else { None };
                StmtKind::For { target, iter, body, else_ }
            }
            TokKind::Try => {
                self.bump();
                let body = self.parse_block()?;
                let mut catches = Vec::new();
                loop {
                    self.skip_soft();
                    if self.eat(&TokKind::Catch) {
                        let ty = if !matches!(self.cur(), TokKind::LBrace | TokKind::Comma) {
                            Some(self.parse_expr()?)
                        } else {
                            None
                        };
                        let bind = if self.eat(&TokKind::As) { Some(self.expect_name()?) } else { None };
                        let cbody = self.parse_block()?;
                        catches.push(CatchClause { ty, bind, body: cbody });
                    } else {
                        break;
                    }
                }
                self.skip_soft();
                let finally = if self.eat(&TokKind::Finally) { Some(self.parse_block()?) } else { None };
                StmtKind::Try { body, catches, finally }
            }
            _ => StmtKind::Expr(self.parse_expr()?),
        };
        Ok(Stmt { kind, span: start })
    }

    /// Peek past any newlines so `elif`/`else`/`catch`/`finally` on the next
    /// line still attach to the statement above.
    fn skip_soft(&mut self) {
        let save = self.pos;
        while matches!(self.cur(), TokKind::Newline) {
            self.bump();
        }
        if !matches!(self.cur(), TokKind::Elif | TokKind::Else | TokKind::Catch | TokKind::Finally) {
            self.pos = save;
        }
    }

    fn maybe_expr_before_terminator(&mut self) -> PResult<Option<Expr>> {
        if matches!(self.cur(), TokKind::Newline | TokKind::Semi | TokKind::Eof | TokKind::RBrace) {
            Ok(None)
        } else {
            Ok(Some(self.parse_expr()?))
        }
    }

    fn expect_name(&mut self) -> PResult<String> {
        match self.cur().clone() {
            TokKind::Name(n) => {
                self.bump();
                Ok(n)
            }
            _ => Err(self.err("expected a name")),
        }
    }

    fn slice_tokens_source(&self, from: usize, to: usize) -> String {
        if from >= to || to > self.toks.len() {
            return String::new();
        }
        let start = self.toks[from].span.start;
        let end = self.toks[to - 1].span.end;
        self.source.get(start..end).unwrap_or("").to_string()
    }

    // -- expressions ---------------------------------------------------------

    pub fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> PResult<Expr> {
        if let Some(lambda) = self.try_parse_lambda()? {
            return Ok(lambda);
        }
        let start = self.span();
        let left = self.parse_ternary()?;
        let compound = match self.cur() {
            TokKind::PlusEq => Some(BinOpKind::Add),
            TokKind::MinusEq => Some(BinOpKind::Sub),
            TokKind::StarEq => Some(BinOpKind::Mul),
            TokKind::SlashEq => Some(BinOpKind::Div),
            TokKind::SlashSlashEq => Some(BinOpKind::FloorDiv),
            TokKind::PercentEq => Some(BinOpKind::Mod),
            TokKind::StarStarEq => Some(BinOpKind::Pow),
            TokKind::AmpEq => Some(BinOpKind::BinAnd),
            TokKind::PipeEq => Some(BinOpKind::BinOr),
            TokKind::CaretEq => Some(BinOpKind::BinXor),
            TokKind::LShiftEq => Some(BinOpKind::Lsh),
            TokKind::RShiftEq => Some(BinOpKind::Rsh),
            _ => None,
        };
        if let Some(op) = compound {
            self.bump();
            let value = self.parse_assign()?;
            return Ok(Expr {
                kind: ExprKind::CompoundAssign { target: Box::new(left), op, value: Box::new(value) },
                span: start,
            });
        }
        if self.eat(&TokKind::Assign) {
            let value = self.parse_assign()?;
            return Ok(Expr { kind: ExprKind::Assign { target: Box::new(left), value: Box::new(value) }, span: start });
        }
        Ok(left)
    }

    /// Lambda sugar `PARAMS -> EXPR`. Tried with backtracking since the
    /// parenthesized-params form is ambiguous with a grouped/tuple
    /// expression until the `->` is seen.
    fn try_parse_lambda(&mut self) -> PResult<Option<Expr>> {
        let save = self.pos;
        let start = self.span();
        let params = if let TokKind::Name(n) = self.cur().clone() {
            self.bump();
            vec![Param { name: n, default: None }]
        } else if matches!(self.cur(), TokKind::LParen) {
            self.bump();
            let mut ps = Vec::new();
            while !matches!(self.cur(), TokKind::RParen) {
                let name = match self.cur().clone() {
                    TokKind::Name(n) => {
                        self.bump();
                        n
                    }
                    _ => {
                        self.pos = save;
                        return Ok(None);
                    }
                };
                let default = if self.eat(&TokKind::Assign) { Some(self.parse_ternary()?) } else { None };
                ps.push(Param { name, default });
                if !self.eat(&TokKind::Comma) {
                    break;
                }
            }
            if !self.eat(&TokKind::RParen) {
                self.pos = save;
                return Ok(None);
            }
            ps
        } else {
            self.pos = save;
            return Ok(None);
        };
        if !self.eat(&TokKind::Arrow) {
            self.pos = save;
            return Ok(None);
        }
        let body = self.parse_assign()?;
        Ok(Some(Expr { kind: ExprKind::Lambda { params, body: Box::new(body) }, span: start }))
    }

    fn parse_ternary(&mut self) -> PResult<Expr> {
        let start = self.span();
        let then = self.parse_null_coalesce()?;
        if self.eat(&TokKind::If) {
            let cond = self.parse_null_coalesce()?;
            self.expect(TokKind::Else)?;
            let else_ = self.parse_ternary()?;
            return Ok(Expr {
                kind: ExprKind::Ternary { cond: Box::new(cond), then: Box::new(then), else_: Box::new(else_) },
                span: start,
            });
        }
        Ok(then)
    }

    fn parse_null_coalesce(&mut self) -> PResult<Expr> {
        let start = self.span();
        let mut left = self.parse_or()?;
        while self.eat(&TokKind::QQ) {
            let right = self.parse_or()?;
            left = Expr { kind: ExprKind::NullCoalesce { left: Box::new(left), right: Box::new(right) }, span: start };
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        let start = self.span();
        let mut left = self.parse_and()?;
        while self.eat(&TokKind::OrOr) {
            let right = self.parse_and()?;
            left = Expr { kind: ExprKind::BoolOp { is_and: false, left: Box::new(left), right: Box::new(right) }, span: start };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let start = self.span();
        let mut left = self.parse_richcmp()?;
        while self.eat(&TokKind::AndAnd) {
            let right = self.parse_richcmp()?;
            left = Expr { kind: ExprKind::BoolOp { is_and: true, left: Box::new(left), right: Box::new(right) }, span: start };
        }
        Ok(left)
    }

    fn parse_richcmp(&mut self) -> PResult<Expr> {
        let start = self.span();
        let first = self.parse_bitor()?;
        let mut operands = vec![first];
        let mut ops = Vec::new();
        loop {
            let op = match self.cur() {
                TokKind::EqEq => CmpOp::Eq,
                TokKind::EqEqEq => CmpOp::Eeq,
                TokKind::NotEq => CmpOp::Ne,
                TokKind::Lt => CmpOp::Lt,
                TokKind::Le => CmpOp::Le,
                TokKind::Gt => CmpOp::Gt,
                TokKind::Ge => CmpOp::Ge,
                TokKind::In => CmpOp::In,
                _ => break,
            };
            self.bump();
            ops.push(op);
            operands.push(self.parse_bitor()?);
        }
        if ops.is_empty() {
            return Ok(operands.pop().unwrap());
        }
        Ok(Expr { kind: ExprKind::RichCmp { operands, ops }, span: start })
    }

    fn parse_bitor(&mut self) -> PResult<Expr> {
        self.parse_left_assoc_bin(&[TokKind::Pipe], |_| BinOpKind::BinOr, Self::parse_bitxor)
    }

    fn parse_bitxor(&mut self) -> PResult<Expr> {
        self.parse_left_assoc_bin(&[TokKind::Caret], |_| BinOpKind::BinXor, Self::parse_bitand)
    }

    fn parse_bitand(&mut self) -> PResult<Expr> {
        self.parse_left_assoc_bin(&[TokKind::Amp], |_| BinOpKind::BinAnd, Self::parse_shift)
    }

    fn parse_shift(&mut self) -> PResult<Expr> {
        let start = self.span();
        let mut left = self.parse_addsub()?;
        loop {
            let op = match self.cur() {
                TokKind::LShift => BinOpKind::Lsh,
                TokKind::RShift => BinOpKind::Rsh,
                _ => break,
            };
            self.bump();
            let right = self.parse_addsub()?;
            left = Expr { kind: ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, span: start };
        }
        Ok(left)
    }

    fn parse_addsub(&mut self) -> PResult<Expr> {
        let start = self.span();
        let mut left = self.parse_muldiv()?;
        loop {
            let op = match self.cur() {
                TokKind::Plus => BinOpKind::Add,
                TokKind::Minus => BinOpKind::Sub,
                _ => break,
            };
            self.bump();
            let right = self.parse_muldiv()?;
            left = Expr { kind: ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, span: start };
        }
        Ok(left)
    }

    fn parse_muldiv(&mut self) -> PResult<Expr> {
        let start = self.span();
        let mut left = self.parse_pow()?;
        loop {
            let op = match self.cur() {
                TokKind::Star => BinOpKind::Mul,
                TokKind::Slash => BinOpKind::Div,
                TokKind::SlashSlash => BinOpKind::FloorDiv,
                TokKind::Percent => BinOpKind::Mod,
                _ => break,
            };
            self.bump();
            let right = self.parse_pow()?;
            left = Expr { kind: ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, span: start };
        }
        Ok(left)
    }

    fn parse_pow(&mut self) -> PResult<Expr> {
        let start = self.span();
        let base = self.parse_unary()?;
        if self.eat(&TokKind::StarStar) {
            let exp = self.parse_pow()?; // right-assoc
            return Ok(Expr { kind: ExprKind::Binary { op: BinOpKind::Pow, left: Box::new(base), right: Box::new(exp) }, span: start });
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let start = self.span();
        let op = match self.cur() {
            TokKind::Plus => Some(UnOpKind::Pos),
            TokKind::Minus => Some(UnOpKind::Neg),
            TokKind::Sqig => Some(UnOpKind::Sqig),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let operand = self.parse_unary()?;
            return Ok(Expr { kind: ExprKind::Unary { op, operand: Box::new(operand) }, span: start });
        }
        if matches!(self.cur(), TokKind::Bang) {
            self.bump();
            let operand = self.parse_unary()?;
            return Ok(Expr { kind: ExprKind::Not(Box::new(operand)), span: start });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let start = self.span();
        let mut e = self.parse_primary()?;
        loop {
            match self.cur() {
                TokKind::LParen => {
                    self.bump();
                    let mut args = Vec::new();
                    while !matches!(self.cur(), TokKind::RParen) {
                        args.push(self.parse_ternary()?);
                        if !self.eat(&TokKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokKind::RParen)?;
                    e = Expr { kind: ExprKind::Call { callee: Box::new(e), args }, span: start };
                }
                TokKind::Dot => {
                    self.bump();
                    let name = self.expect_name()?;
                    e = Expr { kind: ExprKind::GetAttr { obj: Box::new(e), name }, span: start };
                }
                TokKind::LBracket => {
                    self.bump();
                    let mut idx = Vec::new();
                    while !matches!(self.cur(), TokKind::RBracket) {
                        idx.push(self.parse_ternary()?);
                        if !self.eat(&TokKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokKind::RBracket)?;
                    e = Expr { kind: ExprKind::GetElem { obj: Box::new(e), index: idx }, span: start };
                }
                _ => break,
            }
        }
        Ok(e)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let start = self.span();
        let kind = match self.cur().clone() {
            TokKind::None_ => {
                self.bump();
                ExprKind::None_
            }
            TokKind::True_ => {
                self.bump();
                ExprKind::True_
            }
            TokKind::False_ => {
                self.bump();
                ExprKind::False_
            }
            TokKind::Inf => {
                self.bump();
                ExprKind::Inf
            }
            TokKind::Nan => {
                self.bump();
                ExprKind::Nan
            }
            TokKind::Ellipsis => {
                self.bump();
                ExprKind::Ellipsis
            }
            TokKind::Int(s) => {
                self.bump();
                ExprKind::Int(s)
            }
            TokKind::Float(s) => {
                self.bump();
                if s.ends_with('i') || s.ends_with('I') {
                    ExprKind::Complex(s)
                } else {
                    ExprKind::Float(s)
                }
            }
            TokKind::Str(s) => {
                self.bump();
                ExprKind::Str(s)
            }
            TokKind::Regex(s) => {
                self.bump();
                ExprKind::Regex(s)
            }
            TokKind::Name(n) => {
                self.bump();
                ExprKind::Name(n)
            }
            TokKind::LParen => {
                self.bump();
                if self.eat(&TokKind::RParen) {
                    ExprKind::Tuple(vec![])
                } else {
                    let first = self.parse_expr()?;
                    if self.eat(&TokKind::Comma) {
                        let mut items = vec![first];
                        while !matches!(self.cur(), TokKind::RParen) {
                            items.push(self.parse_expr()?);
                            if !self.eat(&TokKind::Comma) {
                                break;
                            }
                        }
                        self.expect(TokKind::RParen)?;
                        ExprKind::Tuple(items)
                    } else {
                        self.expect(TokKind::RParen)?;
                        return Ok(first);
                    }
                }
            }
            TokKind::LBracket => {
                self.bump();
                let mut items = Vec::new();
                while !matches!(self.cur(), TokKind::RBracket) {
                    items.push(self.parse_ternary()?);
                    if !self.eat(&TokKind::Comma) {
                        break;
                    }
                }
                self.expect(TokKind::RBracket)?;
                ExprKind::List(items)
            }
            TokKind::LBrace => {
                self.bump();
                if self.eat(&TokKind::RBrace) {
                    ExprKind::Dict(vec![])
                } else {
                    let first = self.parse_ternary()?;
                    if self.eat(&TokKind::Colon) {
                        let v = self.parse_ternary()?;
                        let mut pairs = vec![(first, v)];
                        while self.eat(&TokKind::Comma) {
                            if matches!(self.cur(), TokKind::RBrace) {
                                break;
                            }
                            let k = self.parse_ternary()?;
                            self.expect(TokKind::Colon)?;
                            let v = self.parse_ternary()?;
                            pairs.push((k, v));
                        }
                        self.expect(TokKind::RBrace)?;
                        ExprKind::Dict(pairs)
                    } else {
                        let mut items = vec![first];
                        while self.eat(&TokKind::Comma) {
                            if matches!(self.cur(), TokKind::RBrace) {
                                break;
                            }
                            items.push(self.parse_ternary()?);
                        }
                        self.expect(TokKind::RBrace)?;
                        ExprKind::Set(items)
                    }
                }
            }
            TokKind::Func => {
                self.bump();
                let name = if let TokKind::Name(n) = self.cur().clone() {
                    self.bump();
                    Some(n)
                } else {
                    None
                };
                let (params, vararg) = self.parse_params()?;
                let body = self.parse_block()?;
                ExprKind::FuncLit { name, params, vararg, body: Box::new(body) }
            }
            TokKind::Type => {
                self.bump();
                let name = if let TokKind::Name(n) = self.cur().clone() {
                    self.bump();
                    Some(n)
                } else {
                    None
                };
                let base = if self.eat(&TokKind::Extends) { Some(Box::new(self.parse_postfix()?)) } else { None };
                let body = self.parse_block()?;
                ExprKind::TypeLit { name, base, body: Box::new(body) }
            }
            other => return Err(self.err(format!("unexpected token {other:?}"))),
        };
        Ok(Expr { kind, span: start })
    }

    fn parse_params(&mut self) -> PResult<(Vec<Param>, Option<usize>)> {
        if !self.eat(&TokKind::LParen) {
            return Ok((Vec::new(), None));
        }
        let mut params = Vec::new();
        let mut vararg = None;
        while !matches!(self.cur(), TokKind::RParen) {
            let is_vararg = self.eat(&TokKind::Star);
            let name = self.expect_name()?;
            let default = if self.eat(&TokKind::Assign) { Some(self.parse_ternary()?) } else { None };
            if is_vararg {
                vararg = Some(params.len());
            }
            params.push(Param { name, default });
            if !self.eat(&TokKind::Comma) {
                break;
            }
        }
        self.expect(TokKind::RParen)?;
        Ok((params, vararg))
    }

    fn parse_left_assoc_bin(
        &mut self,
        toks: &[TokKind],
        to_op: impl Fn(&TokKind) -> BinOpKind,
        mut next: impl FnMut(&mut Self) -> PResult<Expr>,
    ) -> PResult<Expr> {
        let start = self.span();
        let mut left = next(self)?;
        loop {
            let matched = toks.iter().find(|t| std::mem::discriminant(*t) == std::mem::discriminant(self.cur()));
            let Some(t) = matched else { break };
            let op = to_op(t);
            self.bump();
            let right = next(self)?;
            left = Expr { kind: ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, span: start };
        }
        Ok(left)
    }
}
