//! Compiled regex values (§3 "Regex"): a small Thompson-construction NFA
//! over states of kind {character, any-in-set, any-not-in-set, line-start,
//! line-end, word-break, epsilon, accept}. No capture groups — the data
//! model describes a matcher, not a capturing engine.
//!
//! Supported pattern syntax: literal characters, `.` (any except newline),
//! `^`/`$` line anchors, `\b` word break, character classes `[...]`/`[^...]`
//! with ranges, the `\d`/`\D`/`\w`/`\W`/`\s`/`\S` shorthands, alternation
//! `|`, grouping `(...)`, and the `*`/`+`/`?` quantifiers.

use crate::error::{Error, ExcKind, Result};
use std::fmt;

/// A set of matching characters: a 256-entry bitmap for literal bytes plus a
/// coarse Unicode-category mask for the `\d`/`\w`/`\s` shorthands, plus an
/// extension list for individual non-ASCII codepoints named in a class
/// (`[é]`). Full Unicode category tables are the out-of-scope "Unicode
/// property database" oracle (see `lexer.rs`'s `\N[NAME]` handling); these
/// categories are approximated with `char`'s own classification instead.
#[derive(Debug, Clone)]
struct CharSet {
    bitmap: [bool; 256],
    categories: UnicodeCategoryMask,
    extra: Vec<char>,
}

#[derive(Debug, Clone, Copy, Default)]
struct UnicodeCategoryMask {
    digit: bool,
    word: bool,
    space: bool,
}

impl CharSet {
    fn empty() -> Self {
        CharSet { bitmap: [false; 256], categories: UnicodeCategoryMask::default(), extra: Vec::new() }
    }

    fn with_byte(mut self, b: u8) -> Self {
        self.bitmap[b as usize] = true;
        self
    }

    fn add_char(&mut self, c: char) {
        if (c as u32) < 256 {
            self.bitmap[c as usize] = true;
        } else {
            self.extra.push(c);
        }
    }

    fn add_range(&mut self, lo: char, hi: char) {
        for cp in (lo as u32)..=(hi as u32) {
            if let Some(c) = char::from_u32(cp) {
                self.add_char(c);
            }
        }
    }

    fn union(mut self, other: CharSet) -> Self {
        for i in 0..256 {
            self.bitmap[i] |= other.bitmap[i];
        }
        self.categories.digit |= other.categories.digit;
        self.categories.word |= other.categories.word;
        self.categories.space |= other.categories.space;
        self.extra.extend(other.extra);
        self
    }

    fn digits() -> Self {
        let mut s = Self::empty();
        s.categories.digit = true;
        s
    }

    fn word() -> Self {
        let mut s = Self::empty();
        s.categories.word = true;
        s
    }

    fn space() -> Self {
        let mut s = Self::empty();
        s.categories.space = true;
        s
    }

    fn contains(&self, c: char) -> bool {
        if (c as u32) < 256 && self.bitmap[c as usize] {
            return true;
        }
        if self.categories.digit && c.is_ascii_digit() {
            return true;
        }
        if self.categories.word && is_word_char(c) {
            return true;
        }
        if self.categories.space && c.is_whitespace() {
            return true;
        }
        self.extra.contains(&c)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[derive(Debug, Clone)]
enum StateKind {
    Character(char),
    AnyInSet(CharSet),
    AnyNotInSet(CharSet),
    LineStart,
    LineEnd,
    WordBreak,
    Epsilon,
    Accept,
}

#[derive(Debug, Clone)]
struct State {
    kind: StateKind,
    out: [Option<usize>; 2],
}

/// A compiled regex value.
#[derive(Debug)]
pub struct Regex {
    pub source: String,
    states: Vec<State>,
    start: usize,
}

impl fmt::Display for Regex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "```{}```", self.source)
    }
}

impl Regex {
    pub fn compile(pattern: &str) -> Result<Regex> {
        let mut c = Compiler { states: Vec::new(), chars: pattern.chars().collect(), pos: 0 };
        let frag = c.parse_alt()?;
        if c.pos != c.chars.len() {
            return Err(Error::Typed(ExcKind::Val, format!("unexpected '{}' in regex pattern", c.chars[c.pos])));
        }
        let accept = c.push(StateKind::Accept);
        c.patch(&frag.dangling, accept);
        Ok(Regex { source: pattern.to_string(), states: c.states, start: frag.start })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.find(text).is_some()
    }

    /// Leftmost-longest match, as (byte_start, byte_end).
    pub fn find(&self, text: &str) -> Option<(usize, usize)> {
        let chars: Vec<char> = text.chars().collect();
        for start in 0..=chars.len() {
            if let Some(end) = self.match_from(&chars, start) {
                let byte_start: usize = chars[..start].iter().map(|c| c.len_utf8()).sum();
                let byte_end: usize = chars[..end].iter().map(|c| c.len_utf8()).sum();
                return Some((byte_start, byte_end));
            }
        }
        None
    }

    pub fn find_all(&self, text: &str) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        let chars: Vec<char> = text.chars().collect();
        let mut start = 0;
        while start <= chars.len() {
            match self.match_from(&chars, start) {
                Some(end) => {
                    let byte_start: usize = chars[..start].iter().map(|c| c.len_utf8()).sum();
                    let byte_end: usize = chars[..end].iter().map(|c| c.len_utf8()).sum();
                    out.push((byte_start, byte_end));
                    start = if end > start { end } else { start + 1 };
                }
                None => start += 1,
            }
        }
        out
    }

    fn match_from(&self, chars: &[char], start: usize) -> Option<usize> {
        let mut current = Vec::new();
        let mut visited = vec![false; self.states.len()];
        self.closure(self.start, chars, start, &mut current, &mut visited);
        let mut best = current.iter().any(|&s| matches!(self.states[s].kind, StateKind::Accept)).then_some(start);
        let mut pos = start;
        while pos < chars.len() && !current.is_empty() {
            let c = chars[pos];
            let mut next = Vec::new();
            let mut next_visited = vec![false; self.states.len()];
            for &s in &current {
                let step = match &self.states[s].kind {
                    StateKind::Character(ch) if *ch == c => self.states[s].out[0],
                    StateKind::AnyInSet(set) if set.contains(c) => self.states[s].out[0],
                    StateKind::AnyNotInSet(set) if !set.contains(c) => self.states[s].out[0],
                    _ => None,
                };
                if let Some(t) = step {
                    self.closure(t, chars, pos + 1, &mut next, &mut next_visited);
                }
            }
            pos += 1;
            current = next;
            if current.iter().any(|&s| matches!(self.states[s].kind, StateKind::Accept)) {
                best = Some(pos);
            }
        }
        best
    }

    fn closure(&self, state: usize, chars: &[char], pos: usize, out: &mut Vec<usize>, visited: &mut [bool]) {
        if visited[state] {
            return;
        }
        visited[state] = true;
        match &self.states[state].kind {
            StateKind::Epsilon => {
                for o in self.states[state].out.into_iter().flatten() {
                    self.closure(o, chars, pos, out, visited);
                }
            }
            StateKind::LineStart => {
                if (pos == 0 || chars.get(pos - 1) == Some(&'\n')) {
                    if let Some(o) = self.states[state].out[0] {
                        self.closure(o, chars, pos, out, visited);
                    }
                }
            }
            StateKind::LineEnd => {
                if pos == chars.len() || chars.get(pos) == Some(&'\n') {
                    if let Some(o) = self.states[state].out[0] {
                        self.closure(o, chars, pos, out, visited);
                    }
                }
            }
            StateKind::WordBreak => {
                let before = pos > 0 && is_word_char(chars[pos - 1]);
                let after = pos < chars.len() && is_word_char(chars[pos]);
                if before != after {
                    if let Some(o) = self.states[state].out[0] {
                        self.closure(o, chars, pos, out, visited);
                    }
                }
            }
            StateKind::Accept | StateKind::Character(_) | StateKind::AnyInSet(_) | StateKind::AnyNotInSet(_) => {
                out.push(state);
            }
        }
    }
}

/// One dangling fragment: an entry state plus the (state, out-slot) pairs
/// still pointing nowhere, patched once the next fragment's start is known.
struct Frag {
    start: usize,
    dangling: Vec<(usize, usize)>,
}

struct Compiler {
    states: Vec<State>,
    chars: Vec<char>,
    pos: usize,
}

impl Compiler {
    fn push(&mut self, kind: StateKind) -> usize {
        self.states.push(State { kind, out: [None, None] });
        self.states.len() - 1
    }

    fn leaf(&mut self, kind: StateKind) -> Frag {
        let s = self.push(kind);
        Frag { start: s, dangling: vec![(s, 0)] }
    }

    fn patch(&mut self, dangling: &[(usize, usize)], target: usize) {
        for &(s, slot) in dangling {
            self.states[s].out[slot] = Some(target);
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_alt(&mut self) -> Result<Frag> {
        let mut frag = self.parse_concat()?;
        while self.eat('|') {
            let rhs = self.parse_concat()?;
            let split = self.push(StateKind::Epsilon);
            self.states[split].out[0] = Some(frag.start);
            self.states[split].out[1] = Some(rhs.start);
            let mut dangling = frag.dangling;
            dangling.extend(rhs.dangling);
            frag = Frag { start: split, dangling };
        }
        Ok(frag)
    }

    fn parse_concat(&mut self) -> Result<Frag> {
        let mut frag: Option<Frag> = None;
        while let Some(c) = self.peek() {
            if c == '|' || c == ')' {
                break;
            }
            let next = self.parse_quant()?;
            frag = Some(match frag {
                None => next,
                Some(prev) => {
                    self.patch(&prev.dangling, next.start);
                    Frag { start: prev.start, dangling: next.dangling }
                }
            });
        }
        Ok(frag.unwrap_or_else(|| self.leaf(StateKind::Epsilon)))
    }

    fn parse_quant(&mut self) -> Result<Frag> {
        let atom = self.parse_atom()?;
        match self.peek() {
            Some('*') => {
                self.pos += 1;
                Ok(self.star(atom))
            }
            Some('+') => {
                self.pos += 1;
                Ok(self.plus(atom))
            }
            Some('?') => {
                self.pos += 1;
                Ok(self.opt(atom))
            }
            _ => Ok(atom),
        }
    }

    fn star(&mut self, atom: Frag) -> Frag {
        let split = self.push(StateKind::Epsilon);
        self.states[split].out[0] = Some(atom.start);
        self.patch(&atom.dangling, split);
        Frag { start: split, dangling: vec![(split, 1)] }
    }

    fn plus(&mut self, atom: Frag) -> Frag {
        let split = self.push(StateKind::Epsilon);
        self.states[split].out[0] = Some(atom.start);
        self.patch(&atom.dangling, split);
        Frag { start: atom.start, dangling: vec![(split, 1)] }
    }

    fn opt(&mut self, atom: Frag) -> Frag {
        let split = self.push(StateKind::Epsilon);
        self.states[split].out[0] = Some(atom.start);
        let mut dangling = atom.dangling;
        dangling.push((split, 1));
        Frag { start: split, dangling }
    }

    fn parse_atom(&mut self) -> Result<Frag> {
        match self.bump() {
            Some('(') => {
                let inner = self.parse_alt()?;
                if !self.eat(')') {
                    return Err(Error::Typed(ExcKind::Val, "unterminated group in regex pattern".into()));
                }
                Ok(inner)
            }
            Some('.') => Ok(self.leaf(StateKind::AnyNotInSet(CharSet::empty().with_byte(b'\n')))),
            Some('^') => Ok(self.leaf(StateKind::LineStart)),
            Some('$') => Ok(self.leaf(StateKind::LineEnd)),
            Some('[') => self.parse_class(),
            Some('\\') => self.parse_escape(),
            Some(c) => Ok(self.leaf(StateKind::Character(c))),
            None => Err(Error::Typed(ExcKind::Val, "unexpected end of regex pattern".into())),
        }
    }

    fn parse_escape(&mut self) -> Result<Frag> {
        let c = self.bump().ok_or_else(|| Error::Typed(ExcKind::Val, "trailing backslash in regex pattern".into()))?;
        let kind = match c {
            'd' => StateKind::AnyInSet(CharSet::digits()),
            'D' => StateKind::AnyNotInSet(CharSet::digits()),
            'w' => StateKind::AnyInSet(CharSet::word()),
            'W' => StateKind::AnyNotInSet(CharSet::word()),
            's' => StateKind::AnyInSet(CharSet::space()),
            'S' => StateKind::AnyNotInSet(CharSet::space()),
            'b' => StateKind::WordBreak,
            'n' => StateKind::Character('\n'),
            't' => StateKind::Character('\t'),
            'r' => StateKind::Character('\r'),
            other => StateKind::Character(other),
        };
        Ok(self.leaf(kind))
    }

    fn parse_class(&mut self) -> Result<Frag> {
        let negate = self.eat('^');
        let mut set = CharSet::empty();
        let mut first = true;
        while self.peek() != Some(']') || first {
            first = false;
            let c = self.bump().ok_or_else(|| Error::Typed(ExcKind::Val, "unterminated character class in regex pattern".into()))?;
            let lo = if c == '\\' {
                match self.bump() {
                    Some('d') => {
                        set = set.union(CharSet::digits());
                        continue;
                    }
                    Some('w') => {
                        set = set.union(CharSet::word());
                        continue;
                    }
                    Some('s') => {
                        set = set.union(CharSet::space());
                        continue;
                    }
                    Some('n') => '\n',
                    Some('t') => '\t',
                    Some(other) => other,
                    None => return Err(Error::Typed(ExcKind::Val, "trailing backslash in regex character class".into())),
                }
            } else {
                c
            };
            if self.peek() == Some('-') && self.chars.get(self.pos + 1).copied() != Some(']') {
                self.pos += 1;
                let hi = self.bump().ok_or_else(|| Error::Typed(ExcKind::Val, "unterminated character class in regex pattern".into()))?;
                set.add_range(lo, hi);
            } else {
                set.add_char(lo);
            }
        }
        self.pos += 1;
        Ok(self.leaf(if negate { StateKind::AnyNotInSet(set) } else { StateKind::AnyInSet(set) }))
    }
}

#[cfg(test)]
mod tests {
    use super::Regex;

    #[test]
    fn literal_and_concat() {
        let re = Regex::compile("abc").unwrap();
        assert!(re.is_match("xxabcyy"));
        assert!(!re.is_match("xyz"));
    }

    #[test]
    fn quantifiers() {
        let re = Regex::compile("ab*c").unwrap();
        assert!(re.is_match("ac"));
        assert!(re.is_match("abbbc"));
        assert!(!re.is_match("abd"));

        let re = Regex::compile("ab+c").unwrap();
        assert!(!re.is_match("ac"));
        assert!(re.is_match("abc"));
    }

    #[test]
    fn alternation_and_groups() {
        let re = Regex::compile("(cat|dog)s?").unwrap();
        assert!(re.is_match("I have cats"));
        assert!(re.is_match("a dog"));
        assert!(!re.is_match("a bird"));
    }

    #[test]
    fn character_classes() {
        let re = Regex::compile(r"[a-z]+[0-9]").unwrap();
        assert!(re.is_match("xyz9"));
        assert!(!re.is_match("XYZ9"));

        let re = Regex::compile(r"[^0-9]+").unwrap();
        assert!(re.is_match("abc"));
    }

    #[test]
    fn shorthand_classes_and_anchors() {
        let re = Regex::compile(r"^\d+$").unwrap();
        assert!(re.is_match("12345"));
        assert!(!re.is_match("12a45"));

        let re = Regex::compile(r"\bfoo\b").unwrap();
        assert!(re.is_match("a foo bar"));
        assert!(!re.is_match("foobar"));
    }

    #[test]
    fn find_all_matches_nonoverlapping() {
        let re = Regex::compile(r"\d+").unwrap();
        let matches = re.find_all("a1 bb22 ccc333");
        assert_eq!(matches.len(), 3);
    }
}
