use std::collections::VecDeque;

use crate::token::{Tok, TokKind};
use anyhow::{bail, Result};

/// Width a tab contributes when measuring indentation.
const TAB_WIDTH: usize = 4;

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
    col: u32,
    /// Open indentation levels. Always starts (and must end) at `[0]`.
    indents: Vec<usize>,
    /// Tokens synthesized ahead of time (INDENT / DEDENT / EOF).
    queued: VecDeque<Tok>,
    /// Depth of open `()`, `[]`, `{}`. Layout is suppressed inside brackets.
    bracket_depth: usize,
    /// True once an error token was emitted (latches to EOF afterwards).
    errored: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
            indents: vec![0],
            queued: VecDeque::new(),
            bracket_depth: 0,
            errored: false,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        match b {
            b'\n' => {
                self.line += 1;
                self.col = 1;
            }
            b'\t' => self.col += TAB_WIDTH as u32,
            _ => self.col += 1,
        }
        Some(b)
    }

    fn tok(&self, kind: TokKind, line: u32, col: u32) -> Tok {
        Tok { kind, line, col }
    }

    fn here(&self, kind: TokKind) -> Tok {
        Tok {
            kind,
            line: self.line,
            col: self.col,
        }
    }

    fn error_tok(&mut self, msg: String, line: u32, col: u32) -> Tok {
        self.errored = true;
        self.tok(TokKind::Error(msg), line, col)
    }

    /// Skip spaces, tabs, carriage returns and `#` comments, but never a
    /// newline. Indentation is only measured right after a newline.
    fn skip_inline(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') => {
                    self.bump();
                }
                Some(b'#') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    /// Measure the indentation width at the start of a fresh line.
    fn measure_indent(&mut self) -> usize {
        let mut w = 0;
        loop {
            match self.peek() {
                Some(b' ') => {
                    w += 1;
                    self.bump();
                }
                Some(b'\t') => {
                    w += TAB_WIDTH;
                    self.bump();
                }
                _ => break w,
            }
        }
    }

    pub fn next_tok(&mut self) -> Tok {
        if let Some(t) = self.queued.pop_front() {
            return t;
        }
        if self.errored {
            return self.here(TokKind::Eof);
        }

        loop {
            self.skip_inline();
            match self.peek() {
                Some(b'\n') => {
                    let nl_line = self.line;
                    let nl_col = self.col;
                    self.bump();

                    // Inside brackets lines join implicitly.
                    if self.bracket_depth > 0 {
                        continue;
                    }

                    let w = self.measure_indent();

                    // Blank or comment-only lines never affect layout.
                    match self.peek() {
                        Some(b'\n') | Some(b'\r') | Some(b'#') | None => continue,
                        _ => {}
                    }

                    let top = *self.indents.last().unwrap_or(&0);
                    if w > top {
                        self.indents.push(w);
                        let ind = self.here(TokKind::Indent);
                        self.queued.push_back(ind);
                        return self.tok(TokKind::Newline, nl_line, nl_col);
                    } else if w < top {
                        while self.indents.last().is_some_and(|&t| t > w) {
                            self.indents.pop();
                            let ded = self.here(TokKind::Dedent);
                            self.queued.push_back(ded);
                        }
                        if self.indents.last() != Some(&w) {
                            self.queued.clear();
                            return self.error_tok(
                                format!("inconsistent dedent to width {}", w),
                                self.line,
                                self.col,
                            );
                        }
                        return self.tok(TokKind::Newline, nl_line, nl_col);
                    } else {
                        return self.tok(TokKind::Newline, nl_line, nl_col);
                    }
                }
                None => {
                    // Close any still-open levels, then finish.
                    while self.indents.len() > 1 {
                        self.indents.pop();
                        let ded = self.here(TokKind::Dedent);
                        self.queued.push_back(ded);
                    }
                    let eof = self.here(TokKind::Eof);
                    self.queued.push_back(eof);
                    return self.queued.pop_front().unwrap();
                }
                _ => break,
            }
        }

        let line = self.line;
        let col = self.col;
        let b = self.bump().unwrap();
        let c = b as char;

        // two-character operators, maximal munch
        match (c, self.peek()) {
            ('=', Some(b'=')) => {
                self.bump();
                return self.tok(TokKind::EqEq, line, col);
            }
            ('=', Some(b'>')) => {
                self.bump();
                return self.tok(TokKind::FatArrow, line, col);
            }
            ('!', Some(b'=')) => {
                self.bump();
                return self.tok(TokKind::NotEq, line, col);
            }
            ('<', Some(b'=')) => {
                self.bump();
                return self.tok(TokKind::Le, line, col);
            }
            ('>', Some(b'=')) => {
                self.bump();
                return self.tok(TokKind::Ge, line, col);
            }
            ('-', Some(b'>')) => {
                self.bump();
                return self.tok(TokKind::Arrow, line, col);
            }
            (':', Some(b':')) => {
                self.bump();
                return self.tok(TokKind::ColonColon, line, col);
            }
            _ => {}
        }

        let single = match c {
            '(' | '[' | '{' => {
                self.bracket_depth += 1;
                match c {
                    '(' => Some(TokKind::LParen),
                    '[' => Some(TokKind::LBracket),
                    _ => Some(TokKind::LBrace),
                }
            }
            ')' | ']' | '}' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                match c {
                    ')' => Some(TokKind::RParen),
                    ']' => Some(TokKind::RBracket),
                    _ => Some(TokKind::RBrace),
                }
            }
            ':' => Some(TokKind::Colon),
            ',' => Some(TokKind::Comma),
            '=' => Some(TokKind::Assign),
            '<' => Some(TokKind::Lt),
            '>' => Some(TokKind::Gt),
            '+' => Some(TokKind::Plus),
            '-' => Some(TokKind::Minus),
            '*' => Some(TokKind::Star),
            '/' => Some(TokKind::Slash),
            '&' => Some(TokKind::Amp),
            '|' => Some(TokKind::Pipe),
            '.' => Some(TokKind::Dot),
            _ => None,
        };
        if let Some(kind) = single {
            return self.tok(kind, line, col);
        }

        // string literal: bytes between the quotes, no escape processing
        if c == '"' {
            let mut s = String::new();
            loop {
                match self.peek() {
                    Some(b'"') => {
                        self.bump();
                        return self.tok(TokKind::Str(s), line, col);
                    }
                    Some(b'\n') | None => {
                        return self.error_tok("unterminated string literal".into(), line, col);
                    }
                    Some(b) => {
                        self.bump();
                        s.push(b as char);
                    }
                }
            }
        }

        // integer literal: a run of digits, no sign prefix
        if c.is_ascii_digit() {
            let mut s = String::from(c);
            while let Some(p) = self.peek() {
                if p.is_ascii_digit() {
                    s.push(p as char);
                    self.bump();
                } else {
                    break;
                }
            }
            return match s.parse::<i64>() {
                Ok(n) => self.tok(TokKind::Int(n), line, col),
                Err(_) => self.error_tok(format!("integer literal out of range: {}", s), line, col),
            };
        }

        // identifier / keyword
        if c.is_ascii_alphabetic() || c == '_' {
            let mut s = String::from(c);
            while let Some(p) = self.peek() {
                let ch = p as char;
                if ch.is_ascii_alphanumeric() || ch == '_' {
                    s.push(ch);
                    self.bump();
                } else {
                    break;
                }
            }
            let kind = match s.as_str() {
                "fn" => TokKind::KwFn,
                "struct" => TokKind::KwStruct,
                "enum" => TokKind::KwEnum,
                "trait" => TokKind::KwTrait,
                "impl" => TokKind::KwImpl,
                "let" => TokKind::KwLet,
                "mut" => TokKind::KwMut,
                "if" => TokKind::KwIf,
                "else" => TokKind::KwElse,
                "while" => TokKind::KwWhile,
                "for" => TokKind::KwFor,
                "in" => TokKind::KwIn,
                "return" => TokKind::KwReturn,
                "match" => TokKind::KwMatch,
                "extern" => TokKind::KwExtern,
                "this" => TokKind::KwThis,
                "_" => TokKind::Underscore,
                "Some" => TokKind::KwSome,
                "None" => TokKind::KwNone,
                "Ok" => TokKind::KwOk,
                "Err" => TokKind::KwErr,
                "int" => TokKind::KwInt,
                "str" => TokKind::KwStr,
                "bool" => TokKind::KwBool,
                "true" => TokKind::Bool(true),
                "false" => TokKind::Bool(false),
                _ => TokKind::Ident(s),
            };
            return self.tok(kind, line, col);
        }

        self.error_tok(format!("unexpected character '{}'", c), line, col)
    }
}

/// Tokenize a whole source string eagerly. The trailing `Eof` token is
/// included; the first lexical error aborts with its position.
pub fn lex(src: &str) -> Result<Vec<Tok>> {
    let mut lx = Lexer::new(src);
    let mut toks = Vec::new();
    loop {
        let t = lx.next_tok();
        match t.kind {
            TokKind::Error(msg) => {
                bail!("line {}, column {}: {}", t.line, t.col, msg)
            }
            TokKind::Eof => {
                toks.push(t);
                return Ok(toks);
            }
            _ => toks.push(t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokKind> {
        lex(src).expect("lex ok").into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn empty_source_is_just_eof() {
        assert_eq!(kinds(""), vec![TokKind::Eof]);
    }

    #[test]
    fn indent_and_dedent_are_balanced() {
        let toks = kinds("fn main():\n    let x = 1\n    print(x)\n");
        let indents = toks.iter().filter(|k| matches!(k, TokKind::Indent)).count();
        let dedents = toks.iter().filter(|k| matches!(k, TokKind::Dedent)).count();
        assert_eq!(indents, dedents);
        assert_eq!(indents, 1);
    }

    #[test]
    fn tab_counts_as_four() {
        // one tab and four spaces open the same block level
        let toks = kinds("if x:\n\tlet a = 1\n    let b = 2\n");
        let indents = toks.iter().filter(|k| matches!(k, TokKind::Indent)).count();
        assert_eq!(indents, 1);
    }

    #[test]
    fn blank_and_comment_lines_do_not_affect_layout() {
        let toks = kinds("if x:\n    a = 1\n\n    # note\n    a = 2\n");
        let indents = toks.iter().filter(|k| matches!(k, TokKind::Indent)).count();
        let dedents = toks.iter().filter(|k| matches!(k, TokKind::Dedent)).count();
        assert_eq!((indents, dedents), (1, 1));
    }

    #[test]
    fn brackets_suppress_layout() {
        let toks = kinds("let a = [1,\n    2,\n    3]\n");
        assert!(!toks.iter().any(|k| matches!(k, TokKind::Indent)));
        assert!(!toks.iter().any(|k| matches!(k, TokKind::Dedent)));
    }

    #[test]
    fn two_char_operators_munch_maximally() {
        let toks = kinds("a == b != c <= d >= e -> f => g :: h");
        assert!(toks.contains(&TokKind::EqEq));
        assert!(toks.contains(&TokKind::NotEq));
        assert!(toks.contains(&TokKind::Le));
        assert!(toks.contains(&TokKind::Ge));
        assert!(toks.contains(&TokKind::Arrow));
        assert!(toks.contains(&TokKind::FatArrow));
        assert!(toks.contains(&TokKind::ColonColon));
    }

    #[test]
    fn string_contents_are_raw_bytes() {
        let toks = kinds("let s = \"a\\nb\"");
        assert!(toks.contains(&TokKind::Str("a\\nb".into())));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = lex("let s = \"oops\n").unwrap_err().to_string();
        assert!(err.contains("unterminated string"), "{}", err);
    }

    #[test]
    fn inconsistent_dedent_is_an_error() {
        let err = lex("if x:\n        a = 1\n    b = 2\n").unwrap_err().to_string();
        assert!(err.contains("inconsistent dedent"), "{}", err);
    }

    #[test]
    fn unexpected_character_reports_position() {
        let err = lex("let a = 1\nlet b = $\n").unwrap_err().to_string();
        assert!(err.contains("line 2"), "{}", err);
        assert!(err.contains("unexpected character '$'"), "{}", err);
    }

    #[test]
    fn keywords_and_literals() {
        let toks = kinds("let mut x: int = 10");
        assert_eq!(
            toks,
            vec![
                TokKind::KwLet,
                TokKind::KwMut,
                TokKind::Ident("x".into()),
                TokKind::Colon,
                TokKind::KwInt,
                TokKind::Assign,
                TokKind::Int(10),
                TokKind::Eof,
            ]
        );
    }

    #[test]
    fn underscore_and_bools() {
        let toks = kinds("_ true false");
        assert_eq!(
            toks,
            vec![
                TokKind::Underscore,
                TokKind::Bool(true),
                TokKind::Bool(false),
                TokKind::Eof,
            ]
        );
    }

    #[test]
    fn eof_closes_open_blocks() {
        // no trailing newline: dedent is still synthesized before EOF
        let toks = kinds("if x:\n    if y:\n        a = 1");
        let dedents = toks.iter().filter(|k| matches!(k, TokKind::Dedent)).count();
        assert_eq!(dedents, 2);
        assert!(matches!(toks.last(), Some(TokKind::Eof)));
    }
}
