//! Lexer: turns UTF-8 source into a token stream with byte spans.
//!
//! A single forward-scanning pass over `&str` byte indices; the token-kind
//! dispatch is a hand-written `match` on the lookahead byte rather than a
//! generic regex-rule table, since the keyword/operator vocabulary here
//! diverges from a Python-targeting lexer (`??`, `===`, imaginary float
//! suffixes, triple-backtick regex literals, `func`/`type`/`ret`/`cont`
//! keywords).

use crate::diagnostic::{Diagnostic, Span};

#[derive(Debug, Clone, PartialEq)]
pub enum TokKind {
    Eof,
    Newline,
    Semi,
    Name(String),
    Int(String),
    Float(String),
    Str(String),
    Regex(String),

    // keywords
    If,
    Elif,
    Else,
    While,
    For,
    In,
    Break,
    Cont,
    Ret,
    Throw,
    Try,
    Catch,
    Finally,
    Import,
    As,
    Assert,
    Func,
    Type,
    Extends,

    // constant words
    None_,
    True_,
    False_,
    Inf,
    Nan,
    Ellipsis,

    // punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Dot,
    Arrow,   // ->
    FatArrow, // unused reserved, kept for forward compat
    Question,
    QQ, // ??

    Assign,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    SlashSlashEq,
    PercentEq,
    StarStarEq,
    AmpEq,
    PipeEq,
    CaretEq,
    LShiftEq,
    RShiftEq,

    EqEq,
    EqEqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,

    AndAnd,
    OrOr,
    Bang,

    Plus,
    Minus,
    Star,
    Slash,
    SlashSlash,
    Percent,
    StarStar,
    Amp,
    Pipe,
    Caret,
    Sqig,
    LShift,
    RShift,
    PlusPlus,
    MinusMinus,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokKind,
    pub span: Span,
}

/// Resolves `\N[NAME]` escapes. Full Unicode Character Database lookup is
/// out of scope; the default resolver covers a small built-in table and
/// callers may supply their own.
pub trait UnicodeNameResolver {
    fn resolve(&self, name: &str) -> Option<char>;
}

pub struct DefaultResolver;

impl UnicodeNameResolver for DefaultResolver {
    fn resolve(&self, name: &str) -> Option<char> {
        match name {
            "NULL" => Some('\u{0}'),
            "BELL" => Some('\u{7}'),
            "BACKSPACE" => Some('\u{8}'),
            "LINE FEED" => Some('\n'),
            "CARRIAGE RETURN" => Some('\r'),
            "TAB" | "CHARACTER TABULATION" => Some('\t'),
            "ESCAPE" => Some('\u{1b}'),
            "SPACE" => Some(' '),
            _ => None,
        }
    }
}

pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    resolver: Box<dyn UnicodeNameResolver>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        let src = src.strip_prefix('\u{feff}').unwrap_or(src);
        Lexer { src, bytes: src.as_bytes(), pos: 0, resolver: Box::new(DefaultResolver) }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, Diagnostic> {
        let mut out = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok.kind == TokKind::Eof;
            out.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(out)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, n: usize) -> Option<u8> {
        self.bytes.get(self.pos + n).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_ws_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') => {
                    self.pos += 1;
                }
                Some(b'#') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn err(&self, msg: impl Into<String>, start: usize) -> Diagnostic {
        Diagnostic::new(msg)
            .with_source(self.src.to_string())
            .with_label(Span::new(start, self.pos.max(start + 1)), "here")
    }

    fn next_token(&mut self) -> Result<Token, Diagnostic> {
        self.skip_ws_and_comments();
        let start = self.pos;
        let Some(b) = self.peek() else {
            return Ok(Token { kind: TokKind::Eof, span: Span::new(start, start) });
        };

        if b == b'\n' {
            self.pos += 1;
            return Ok(Token { kind: TokKind::Newline, span: Span::new(start, self.pos) });
        }

        if b.is_ascii_digit() {
            return self.lex_number(start);
        }

        if b == b'"' || b == b'\'' {
            return self.lex_string(start, b);
        }

        if b == b'`' && self.peek_at(1) == Some(b'`') && self.peek_at(2) == Some(b'`') {
            return self.lex_regex(start);
        }

        if is_name_start(b) {
            return self.lex_name_or_keyword(start);
        }

        self.lex_punct(start)
    }

    fn lex_number(&mut self, start: usize) -> Result<Token, Diagnostic> {
        // base prefixes 0b 0o 0d 0x
        if self.peek() == Some(b'0') {
            if let Some(next) = self.peek_at(1) {
                let base_digits: Option<fn(u8) -> bool> = match next {
                    b'b' | b'B' => Some(|c| c == b'0' || c == b'1'),
                    b'o' | b'O' => Some(|c| (b'0'..=b'7').contains(&c)),
                    b'd' | b'D' => Some(|c| c.is_ascii_digit()),
                    b'x' | b'X' => Some(|c| c.is_ascii_hexdigit()),
                    _ => None,
                };
                if let Some(pred) = base_digits {
                    self.pos += 2;
                    while self.peek().map(pred).unwrap_or(false) || self.peek() == Some(b'_') {
                        self.pos += 1;
                    }
                    return Ok(Token {
                        kind: TokKind::Int(self.src[start..self.pos].to_string()),
                        span: Span::new(start, self.pos),
                    });
                }
            }
        }

        while self.peek().map(|c| c.is_ascii_digit() || c == b'_').unwrap_or(false) {
            self.pos += 1;
        }
        let mut is_float = false;
        if self.peek() == Some(b'.') && self.peek_at(1).map(|c| c.is_ascii_digit()).unwrap_or(false) {
            is_float = true;
            self.pos += 1;
            while self.peek().map(|c| c.is_ascii_digit() || c == b'_').unwrap_or(false) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E') | Some(b'p') | Some(b'P')) {
            is_float = true;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.pos += 1;
            }
            while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'i') | Some(b'I')) {
            is_float = true;
            self.pos += 1;
        }
        let text = self.src[start..self.pos].to_string();
        Ok(Token {
            kind: if is_float { TokKind::Float(text) } else { TokKind::Int(text) },
            span: Span::new(start, self.pos),
        })
    }

    fn lex_string(&mut self, start: usize, quote: u8) -> Result<Token, Diagnostic> {
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.err("unterminated string literal", start)),
                Some(b) if b == quote => {
                    if triple {
                        if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                            self.pos += 3;
                            break;
                        }
                        out.push(b as char);
                        self.pos += 1;
                    } else {
                        self.pos += 1;
                        break;
                    }
                }
                Some(b'\\') => {
                    self.pos += 1;
                    out.push(self.lex_escape(start)?);
                }
                Some(_) => {
                    let ch = self.src[self.pos..].chars().next().unwrap();
                    out.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
        Ok(Token { kind: TokKind::Str(out), span: Span::new(start, self.pos) })
    }

    fn lex_escape(&mut self, start: usize) -> Result<char, Diagnostic> {
        let Some(c) = self.bump() else {
            return Err(self.err("unterminated escape sequence", start));
        };
        Ok(match c {
            b'n' => '\n',
            b't' => '\t',
            b'r' => '\r',
            b'0' => '\0',
            b'\\' => '\\',
            b'\'' => '\'',
            b'"' => '"',
            b'a' => '\u{7}',
            b'b' => '\u{8}',
            b'f' => '\u{c}',
            b'v' => '\u{b}',
            b'x' => self.lex_hex_escape(2, start)?,
            b'u' => self.lex_hex_escape(4, start)?,
            b'U' => self.lex_hex_escape(8, start)?,
            b'N' => {
                if self.bump() != Some(b'[') {
                    return Err(self.err(r"expected '[' after \N", start));
                }
                let name_start = self.pos;
                while self.peek() != Some(b']') {
                    if self.bump().is_none() {
                        return Err(self.err("unterminated \\N[...] escape", start));
                    }
                }
                let name = self.src[name_start..self.pos].to_string();
                self.pos += 1;
                self.resolver.resolve(&name).ok_or_else(|| self.err(format!("unknown character name '{name}'"), start))?
            }
            other => other as char,
        })
    }

    fn lex_hex_escape(&mut self, digits: usize, start: usize) -> Result<char, Diagnostic> {
        let begin = self.pos;
        for _ in 0..digits {
            if !self.peek().map(|c| c.is_ascii_hexdigit()).unwrap_or(false) {
                return Err(self.err("invalid hex escape", start));
            }
            self.pos += 1;
        }
        let code = u32::from_str_radix(&self.src[begin..self.pos], 16).unwrap();
        char::from_u32(code).ok_or_else(|| self.err("invalid unicode codepoint", start))
    }

    fn lex_regex(&mut self, start: usize) -> Result<Token, Diagnostic> {
        self.pos += 3;
        let body_start = self.pos;
        while !(self.peek() == Some(b'`') && self.peek_at(1) == Some(b'`') && self.peek_at(2) == Some(b'`')) {
            if self.bump().is_none() {
                return Err(self.err("unterminated regex literal", start));
            }
        }
        let body = self.src[body_start..self.pos].to_string();
        self.pos += 3;
        Ok(Token { kind: TokKind::Regex(body), span: Span::new(start, self.pos) })
    }

    fn lex_name_or_keyword(&mut self, start: usize) -> Result<Token, Diagnostic> {
        while self.peek().map(is_name_continue).unwrap_or(false) {
            self.pos += 1;
        }
        let text = &self.src[start..self.pos];
        let kind = match text {
            "if" => TokKind::If,
            "elif" => TokKind::Elif,
            "else" => TokKind::Else,
            "while" => TokKind::While,
            "for" => TokKind::For,
            "in" => TokKind::In,
            "break" => TokKind::Break,
            "cont" => TokKind::Cont,
            "ret" => TokKind::Ret,
            "throw" => TokKind::Throw,
            "try" => TokKind::Try,
            "catch" => TokKind::Catch,
            "finally" => TokKind::Finally,
            "import" => TokKind::Import,
            "as" => TokKind::As,
            "assert" => TokKind::Assert,
            "func" => TokKind::Func,
            "type" => TokKind::Type,
            "extends" => TokKind::Extends,
            "none" => TokKind::None_,
            "true" => TokKind::True_,
            "false" => TokKind::False_,
            "inf" => TokKind::Inf,
            "nan" => TokKind::Nan,
            _ => TokKind::Name(text.to_string()),
        };
        Ok(Token { kind, span: Span::new(start, self.pos) })
    }

    fn lex_punct(&mut self, start: usize) -> Result<Token, Diagnostic> {
        macro_rules! two {
            ($a:expr, $b:expr, $k2:expr, $k1:expr) => {{
                if self.peek_at(1) == Some($b) {
                    self.pos += 2;
                    $k2
                } else {
                    self.pos += 1;
                    $k1
                }
            }};
        }
        let b = self.bump().unwrap();
        let kind = match b {
            b'.' => {
                if self.peek() == Some(b'.') && self.peek_at(1) == Some(b'.') {
                    self.pos += 2;
                    TokKind::Ellipsis
                } else {
                    TokKind::Dot
                }
            }
            b';' => TokKind::Semi,
            b',' => TokKind::Comma,
            b':' => TokKind::Colon,
            b'(' => TokKind::LParen,
            b')' => TokKind::RParen,
            b'{' => TokKind::LBrace,
            b'}' => TokKind::RBrace,
            b'[' => TokKind::LBracket,
            b']' => TokKind::RBracket,
            b'?' => {
                if self.peek() == Some(b'?') {
                    self.pos += 1;
                    TokKind::QQ
                } else {
                    TokKind::Question
                }
            }
            b'~' => TokKind::Sqig,
            b'+' => {
                if self.peek() == Some(b'+') {
                    self.pos += 1;
                    TokKind::PlusPlus
                } else if self.peek() == Some(b'=') {
                    self.pos += 1;
                    TokKind::PlusEq
                } else {
                    TokKind::Plus
                }
            }
            b'-' => {
                if self.peek() == Some(b'-') {
                    self.pos += 1;
                    TokKind::MinusMinus
                } else if self.peek() == Some(b'=') {
                    self.pos += 1;
                    TokKind::MinusEq
                } else if self.peek() == Some(b'>') {
                    self.pos += 1;
                    TokKind::Arrow
                } else {
                    TokKind::Minus
                }
            }
            b'*' => {
                if self.peek() == Some(b'*') {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        TokKind::StarStarEq
                    } else {
                        TokKind::StarStar
                    }
                } else if self.peek() == Some(b'=') {
                    self.pos += 1;
                    TokKind::StarEq
                } else {
                    TokKind::Star
                }
            }
            b'/' => {
                if self.peek() == Some(b'/') {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        TokKind::SlashSlashEq
                    } else {
                        TokKind::SlashSlash
                    }
                } else if self.peek() == Some(b'=') {
                    self.pos += 1;
                    TokKind::SlashEq
                } else {
                    TokKind::Slash
                }
            }
            b'%' => two!(b'%', b'=', TokKind::PercentEq, TokKind::Percent),
            b'&' => {
                if self.peek() == Some(b'&') {
                    self.pos += 1;
                    TokKind::AndAnd
                } else if self.peek() == Some(b'=') {
                    self.pos += 1;
                    TokKind::AmpEq
                } else {
                    TokKind::Amp
                }
            }
            b'|' => {
                if self.peek() == Some(b'|') {
                    self.pos += 1;
                    TokKind::OrOr
                } else if self.peek() == Some(b'=') {
                    self.pos += 1;
                    TokKind::PipeEq
                } else {
                    TokKind::Pipe
                }
            }
            b'^' => two!(b'^', b'=', TokKind::CaretEq, TokKind::Caret),
            b'<' => {
                if self.peek() == Some(b'<') {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        TokKind::LShiftEq
                    } else {
                        TokKind::LShift
                    }
                } else if self.peek() == Some(b'=') {
                    self.pos += 1;
                    TokKind::Le
                } else {
                    TokKind::Lt
                }
            }
            b'>' => {
                if self.peek() == Some(b'>') {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        TokKind::RShiftEq
                    } else {
                        TokKind::RShift
                    }
                } else if self.peek() == Some(b'=') {
                    self.pos += 1;
                    TokKind::Ge
                } else {
                    TokKind::Gt
                }
            }
            b'=' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        TokKind::EqEqEq
                    } else {
                        TokKind::EqEq
                    }
                } else {
                    TokKind::Assign
                }
            }
            b'!' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    TokKind::NotEq
                } else {
                    TokKind::Bang
                }
            }
            other => {
                self.pos = start;
                return Err(self.err(format!("unexpected byte {:#04x} ('{}')", other, other as char), start));
            }
        };
        Ok(Token { kind, span: Span::new(start, self.pos) })
    }
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_name_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
