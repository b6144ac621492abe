//! Python tokenizer.
//!
//! Produces the logical token stream the parser consumes: names, numbers,
//! strings, operators, and the synthetic `Newline`/`Indent`/`Dedent`/
//! `EndMarker` tokens. Newlines inside brackets are implicit line joins and
//! produce no token; blank and comment-only lines never affect indentation.
//!
//! Positions are 1-based; columns count characters, not bytes.

use thiserror::Error;

/// Token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokType {
    Name,
    Number,
    String,
    Op,
    Newline,
    Indent,
    Dedent,
    Async,
    Await,
    EndMarker,
}

/// One token with its source text and start position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokType,
    pub text: &'a str,
    pub line: u32,
    pub col: u32,
}

/// Tokenizer failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokError {
    #[error("unterminated string literal")]
    UnterminatedString { line: u32, col: u32 },

    #[error("unterminated triple-quoted string literal")]
    UnterminatedTripleQuotedString { line: u32, col: u32 },

    #[error("'{bracket}' was never closed")]
    UnmatchedBracket { bracket: char, line: u32, col: u32 },

    #[error("closing '{found}' does not match '{expected}'")]
    MismatchedBracket {
        found: char,
        expected: char,
        line: u32,
        col: u32,
    },

    #[error("unindent does not match any outer indentation level")]
    InconsistentDedent { line: u32, col: u32 },

    #[error("unexpected character after line continuation")]
    BadContinuation { line: u32, col: u32 },

    #[error("invalid character '{ch}'")]
    BadCharacter { ch: char, line: u32, col: u32 },

    #[error("invalid numeric literal")]
    InvalidNumber { line: u32, col: u32 },
}

impl TokError {
    /// 1-based `(line, col)` of the failure.
    pub fn position(&self) -> (u32, u32) {
        match self {
            TokError::UnterminatedString { line, col }
            | TokError::UnterminatedTripleQuotedString { line, col }
            | TokError::UnmatchedBracket { line, col, .. }
            | TokError::MismatchedBracket { line, col, .. }
            | TokError::InconsistentDedent { line, col }
            | TokError::BadContinuation { line, col }
            | TokError::BadCharacter { line, col, .. }
            | TokError::InvalidNumber { line, col } => (*line, *col),
        }
    }
}

const STRING_PREFIXES: &[&str] = &["r", "u", "b", "f", "br", "rb", "fr", "rf"];

const THREE_CHAR_OPS: &[&str] = &["**=", "//=", ">>=", "<<=", "..."];

const TWO_CHAR_OPS: &[&str] = &[
    "**", "//", ">>", "<<", "<=", ">=", "==", "!=", "->", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "@=", ":=",
];

const ONE_CHAR_OPS: &str = "+-*/%@&|^~<>()[]{},:;.=";

fn is_name_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_name_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

struct TokState<'a> {
    src: &'a str,
    pos: usize,
    line: u32,
    col: u32,
    indents: Vec<u32>,
    brackets: Vec<(char, u32, u32)>,
    at_line_start: bool,
    tokens: Vec<Token<'a>>,
}

impl<'a> TokState<'a> {
    fn new(src: &'a str) -> Self {
        TokState {
            src,
            pos: 0,
            line: 1,
            col: 1,
            indents: vec![0],
            brackets: Vec::new(),
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn push(&mut self, kind: TokType, start: usize, line: u32, col: u32) {
        self.tokens.push(Token {
            kind,
            text: &self.src[start..self.pos],
            line,
            col,
        });
    }

    fn push_synthetic(&mut self, kind: TokType) {
        self.tokens.push(Token {
            kind,
            text: "",
            line: self.line,
            col: self.col,
        });
    }

    fn skip_to_line_end(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' || c == '\r' {
                break;
            }
            self.bump();
        }
    }

    fn consume_line_break(&mut self) {
        if self.peek() == Some('\r') {
            self.pos += 1;
            if self.peek() == Some('\n') {
                self.bump();
            } else {
                self.line += 1;
                self.col = 1;
            }
        } else {
            self.bump();
        }
    }

    /// Handle indentation at the start of a logical line. Returns false when
    /// the line is blank or comment-only.
    fn indentation(&mut self) -> Result<bool, TokError> {
        let mut width = 0u32;
        while let Some(c) = self.peek() {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                '\x0c' => width = 0,
                _ => break,
            }
            self.bump();
        }
        match self.peek() {
            None | Some('\n') | Some('\r') | Some('#') => {
                self.skip_to_line_end();
                if self.peek().is_some() {
                    self.consume_line_break();
                }
                return Ok(false);
            }
            _ => {}
        }

        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.push_synthetic(TokType::Indent);
        } else if width < current {
            while self.indents.last().copied().unwrap_or(0) > width {
                self.indents.pop();
                self.push_synthetic(TokType::Dedent);
            }
            if self.indents.last().copied().unwrap_or(0) != width {
                return Err(TokError::InconsistentDedent {
                    line: self.line,
                    col: self.col,
                });
            }
        }
        Ok(true)
    }

    fn string(&mut self, start: usize, line: u32, col: u32) -> Result<(), TokError> {
        let Some(quote) = self.bump() else {
            return Err(TokError::UnterminatedString { line, col });
        };
        let triple = self.peek() == Some(quote) && self.peek_nth(1) == Some(quote);
        if triple {
            self.bump();
            self.bump();
            loop {
                match self.bump() {
                    None => return Err(TokError::UnterminatedTripleQuotedString { line, col }),
                    Some('\\') => {
                        self.bump();
                    }
                    Some(c) if c == quote => {
                        if self.peek() == Some(quote) && self.peek_nth(1) == Some(quote) {
                            self.bump();
                            self.bump();
                            break;
                        }
                    }
                    Some(_) => {}
                }
            }
        } else {
            loop {
                match self.peek() {
                    None | Some('\n') | Some('\r') => {
                        return Err(TokError::UnterminatedString { line, col })
                    }
                    Some('\\') => {
                        self.bump();
                        if self.peek() == Some('\r') {
                            self.consume_line_break();
                        } else {
                            self.bump();
                        }
                    }
                    Some(c) => {
                        self.bump();
                        if c == quote {
                            break;
                        }
                    }
                }
            }
        }
        self.push(TokType::String, start, line, col);
        Ok(())
    }

    fn number(&mut self, start: usize, line: u32, col: u32) -> Result<(), TokError> {
        let radix_prefix = self.peek() == Some('0')
            && matches!(self.peek_nth(1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B'));
        if radix_prefix {
            self.bump();
            self.bump();
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit() || c == '_') {
                self.bump();
            }
        } else {
            while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '_') {
                self.bump();
            }
            if self.peek() == Some('.') {
                self.bump();
                while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '_') {
                    self.bump();
                }
            }
            if matches!(self.peek(), Some('e' | 'E')) {
                let signed = matches!(self.peek_nth(1), Some('+' | '-'));
                let digit_at = if signed { 2 } else { 1 };
                if matches!(self.peek_nth(digit_at), Some(c) if c.is_ascii_digit()) {
                    for _ in 0..digit_at {
                        self.bump();
                    }
                    while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '_') {
                        self.bump();
                    }
                }
            }
            if matches!(self.peek(), Some('j' | 'J')) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some(c) if is_name_continue(c)) {
            return Err(TokError::InvalidNumber { line, col });
        }
        self.push(TokType::Number, start, line, col);
        Ok(())
    }

    fn operator(&mut self, start: usize, line: u32, col: u32) -> Result<(), TokError> {
        let rest = self.rest();
        let len = THREE_CHAR_OPS
            .iter()
            .chain(TWO_CHAR_OPS.iter())
            .find(|op| rest.starts_with(**op))
            .map(|op| op.len());
        if let Some(len) = len {
            for _ in 0..len {
                self.bump();
            }
            self.push(TokType::Op, start, line, col);
            return Ok(());
        }

        let Some(c) = self.peek() else {
            return Ok(());
        };
        if !ONE_CHAR_OPS.contains(c) {
            return Err(TokError::BadCharacter { ch: c, line, col });
        }
        self.bump();
        match c {
            '(' | '[' | '{' => self.brackets.push((c, line, col)),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match self.brackets.pop() {
                    Some((open, _, _)) if open == expected => {}
                    Some((open, _, _)) => {
                        return Err(TokError::MismatchedBracket {
                            found: c,
                            expected: closing_for(open),
                            line,
                            col,
                        })
                    }
                    None => return Err(TokError::BadCharacter { ch: c, line, col }),
                }
            }
            _ => {}
        }
        self.push(TokType::Op, start, line, col);
        Ok(())
    }

    fn run(mut self) -> Result<Vec<Token<'a>>, TokError> {
        loop {
            if self.at_line_start && self.brackets.is_empty() {
                if self.peek().is_none() {
                    break;
                }
                if !self.indentation()? {
                    continue;
                }
                self.at_line_start = false;
            }

            while matches!(self.peek(), Some(' ' | '\t' | '\x0c')) {
                self.bump();
            }

            let start = self.pos;
            let (line, col) = (self.line, self.col);
            let Some(c) = self.peek() else {
                break;
            };

            match c {
                '#' => self.skip_to_line_end(),
                '\\' => {
                    self.bump();
                    match self.peek() {
                        Some('\n') | Some('\r') => self.consume_line_break(),
                        _ => return Err(TokError::BadContinuation { line, col }),
                    }
                }
                '\n' | '\r' => {
                    self.consume_line_break();
                    if self.brackets.is_empty() {
                        self.tokens.push(Token {
                            kind: TokType::Newline,
                            text: &self.src[start..self.pos],
                            line,
                            col,
                        });
                        self.at_line_start = true;
                    }
                }
                '"' | '\'' => self.string(start, line, col)?,
                c if c.is_ascii_digit() => self.number(start, line, col)?,
                '.' if matches!(self.peek_nth(1), Some(d) if d.is_ascii_digit()) => {
                    self.number(start, line, col)?
                }
                c if is_name_start(c) => {
                    while matches!(self.peek(), Some(c) if is_name_continue(c)) {
                        self.bump();
                    }
                    let word = &self.src[start..self.pos];
                    let is_prefix = STRING_PREFIXES
                        .iter()
                        .any(|p| p.eq_ignore_ascii_case(word));
                    if is_prefix && matches!(self.peek(), Some('"' | '\'')) {
                        self.string(start, line, col)?;
                    } else {
                        let kind = match word {
                            "async" => TokType::Async,
                            "await" => TokType::Await,
                            _ => TokType::Name,
                        };
                        self.push(kind, start, line, col);
                    }
                }
                _ => self.operator(start, line, col)?,
            }
        }

        if let Some(&(bracket, line, col)) = self.brackets.last() {
            return Err(TokError::UnmatchedBracket { bracket, line, col });
        }
        let needs_newline = matches!(
            self.tokens.last(),
            Some(tok) if !matches!(tok.kind, TokType::Newline | TokType::Dedent | TokType::Indent)
        );
        if needs_newline {
            self.push_synthetic(TokType::Newline);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push_synthetic(TokType::Dedent);
        }
        self.push_synthetic(TokType::EndMarker);
        Ok(self.tokens)
    }
}

fn closing_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

/// Tokenize Python source.
pub fn tokenize(source: &str) -> Result<Vec<Token<'_>>, TokError> {
    TokState::new(source).run()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<(TokType, &str)> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn identifiers_and_operators() {
        assert_eq!(
            kinds("x: int = 3\n"),
            vec![
                (TokType::Name, "x"),
                (TokType::Op, ":"),
                (TokType::Name, "int"),
                (TokType::Op, "="),
                (TokType::Number, "3"),
                (TokType::Newline, "\n"),
                (TokType::EndMarker, ""),
            ]
        );
    }

    #[test]
    fn async_await_are_distinct() {
        let toks = kinds("async def f():\n    await g()\n");
        assert_eq!(toks[0], (TokType::Async, "async"));
        assert!(toks.contains(&(TokType::Await, "await")));
    }

    #[test]
    fn indent_and_dedent() {
        let toks = kinds("class A:\n    x: int\n\n    # comment\ny = 1\n");
        let indents = toks.iter().filter(|t| t.0 == TokType::Indent).count();
        let dedents = toks.iter().filter(|t| t.0 == TokType::Dedent).count();
        assert_eq!(indents, 1);
        assert_eq!(dedents, 1);
    }

    #[test]
    fn brackets_join_lines() {
        let toks = kinds("from a import (\n    B,\n    C,\n)\n");
        let newlines = toks.iter().filter(|t| t.0 == TokType::Newline).count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn strings_with_prefixes_and_triple_quotes() {
        let toks = kinds("s = f\"{x}\"\nd = \"\"\"multi\nline\"\"\"\nr = rb'\\d'\n");
        let strings: Vec<&str> = toks
            .iter()
            .filter(|t| t.0 == TokType::String)
            .map(|t| t.1)
            .collect();
        assert_eq!(strings, vec!["f\"{x}\"", "\"\"\"multi\nline\"\"\"", "rb'\\d'"]);
    }

    #[test]
    fn missing_trailing_newline_is_synthesized() {
        let toks = kinds("pass");
        assert_eq!(toks[1].0, TokType::Newline);
    }

    #[test]
    fn positions_are_one_based() {
        let err = tokenize("a = 1\nb = \"open\n").unwrap_err();
        assert_eq!(err.position(), (2, 5));
        let ok = tokenize("x = 1\ny = 2\n").unwrap();
        let y = ok.iter().find(|t| t.text == "y").unwrap();
        assert_eq!((y.line, y.col), (2, 1));
    }

    mod errors {
        use super::*;

        #[test]
        fn unterminated_string() {
            let err = tokenize("x = \"abc\n").unwrap_err();
            assert_eq!(err, TokError::UnterminatedString { line: 1, col: 5 });
        }

        #[test]
        fn unterminated_triple_quote() {
            assert!(matches!(
                tokenize("\"\"\"doc\n").unwrap_err(),
                TokError::UnterminatedTripleQuotedString { .. }
            ));
        }

        #[test]
        fn unclosed_bracket() {
            assert!(matches!(
                tokenize("f(a, b\n").unwrap_err(),
                TokError::UnmatchedBracket { bracket: '(', .. }
            ));
        }

        #[test]
        fn mismatched_bracket() {
            assert!(matches!(
                tokenize("x = [1)\n").unwrap_err(),
                TokError::MismatchedBracket { .. }
            ));
        }

        #[test]
        fn inconsistent_dedent() {
            let err = tokenize("if x:\n        a\n    b\n").unwrap_err();
            assert!(matches!(err, TokError::InconsistentDedent { line: 3, .. }));
        }

        #[test]
        fn bad_characters() {
            assert!(matches!(
                tokenize("!special! = 1\n").unwrap_err(),
                TokError::BadCharacter { ch: '!', .. }
            ));
            assert!(matches!(
                tokenize("a = $\n").unwrap_err(),
                TokError::BadCharacter { ch: '$', .. }
            ));
        }

        #[test]
        fn identifier_starting_with_digit() {
            assert!(matches!(
                tokenize("2nd = 1\n").unwrap_err(),
                TokError::InvalidNumber { .. }
            ));
        }
    }
}
