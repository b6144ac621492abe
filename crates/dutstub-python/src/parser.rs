//! Recursive-descent parser for the Python subset used by stubs, generated
//! modules, and testbench skeletons.
//!
//! The grammar covers statements (`def`/`async def`, `class`, decorators,
//! `if`/`elif`/`else`, `for`, `while`, `try`/`except`/`finally`, `with`,
//! `import`/`from`, `return`, `raise`, `assert`, annotated and augmented
//! assignment) and the full expression precedence ladder with calls,
//! subscripts, slices, comprehensions, `lambda`, `await`, and `yield`.
//!
//! The tree keeps only what callers inspect (classes, functions, annotated
//! targets, and enough of each expression to read `Literal[...]` keys);
//! everything else is parsed for validity and folded into
//! [`Expr::Compound`].

use dutstub_core::DutError;
use thiserror::Error;

use crate::tokens::{tokenize, TokError, TokType, Token};
use crate::validation::is_python_keyword;

/// Parse failure with a 1-based position.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{line}:{col}: {message}")]
pub struct StubParseError {
    pub message: String,
    pub line: u32,
    pub col: u32,
}

impl From<TokError> for StubParseError {
    fn from(err: TokError) -> Self {
        let (line, col) = err.position();
        StubParseError {
            message: err.to_string(),
            line,
            col,
        }
    }
}

impl From<StubParseError> for DutError {
    fn from(err: StubParseError) -> Self {
        DutError::RenderValidation {
            message: err.message,
            line: err.line,
            col: err.col,
        }
    }
}

pub type ParseResult<T> = Result<T, StubParseError>;

// ============================================================================
// Tree
// ============================================================================

/// Expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Name(String),
    /// Decoded value of one or more adjacent string literals.
    Str(String),
    Number(String),
    /// `None`, `True`, `False`.
    Constant(String),
    Ellipsis,
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
    Starred(Box<Expr>),
    /// Operators, comprehensions, lambdas, dict/set displays, slices.
    Compound(Vec<Expr>),
}

impl Expr {
    /// Render back to compact source form for display.
    pub fn to_source(&self) -> String {
        match self {
            Expr::Name(n) | Expr::Number(n) | Expr::Constant(n) => n.clone(),
            Expr::Str(s) => format!("{:?}", s),
            Expr::Ellipsis => "...".to_string(),
            Expr::Attribute { value, attr } => format!("{}.{}", value.to_source(), attr),
            Expr::Subscript { value, index } => {
                let inner = match index.as_ref() {
                    Expr::Tuple(items) => join_sources(items),
                    other => other.to_source(),
                };
                format!("{}[{}]", value.to_source(), inner)
            }
            Expr::Call { func, args } => format!("{}({})", func.to_source(), join_sources(args)),
            Expr::Tuple(items) => format!("({})", join_sources(items)),
            Expr::List(items) => format!("[{}]", join_sources(items)),
            Expr::Starred(inner) => format!("*{}", inner.to_source()),
            Expr::Compound(_) => "...".to_string(),
        }
    }

    /// Trailing name of a `Name` or dotted `Attribute` chain.
    pub fn tail_name(&self) -> Option<&str> {
        match self {
            Expr::Name(n) => Some(n),
            Expr::Attribute { attr, .. } => Some(attr),
            _ => None,
        }
    }
}

fn join_sources(items: &[Expr]) -> String {
    items
        .iter()
        .map(Expr::to_source)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Function parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub annotation: Option<Expr>,
    pub default: Option<Expr>,
}

/// Statement with its starting line.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    ClassDef {
        name: String,
        bases: Vec<Expr>,
        decorators: Vec<Expr>,
        body: Vec<Stmt>,
    },
    FunctionDef {
        name: String,
        is_async: bool,
        params: Vec<Param>,
        returns: Option<Expr>,
        decorators: Vec<Expr>,
        body: Vec<Stmt>,
    },
    AnnAssign {
        target: Expr,
        annotation: Expr,
        value: Option<Expr>,
    },
    Assign {
        targets: Vec<Expr>,
        value: Expr,
    },
    /// Compound statements other than def/class; only their bodies matter.
    Block(Vec<Vec<Stmt>>),
    /// Any other simple statement.
    Simple,
}

/// Parsed module.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub body: Vec<Stmt>,
}

/// Parse Python source into a [`Module`].
pub fn parse_module(source: &str) -> ParseResult<Module> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut body = Vec::new();
    while !parser.at_kind(TokType::EndMarker) {
        if parser.at_kind(TokType::Newline) {
            parser.advance();
            continue;
        }
        parser.statement(&mut body)?;
    }
    Ok(Module { body })
}

// ============================================================================
// Parser
// ============================================================================

const AUGMENTED_OPS: &[&str] = &[
    "+=", "-=", "*=", "/=", "//=", "%=", "@=", "&=", "|=", "^=", ">>=", "<<=", "**=",
];

const COMPARISON_OPS: &[&str] = &["<", ">", "==", ">=", "<=", "!="];

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    // ------------------------------------------------------------------
    // Token access
    // ------------------------------------------------------------------

    fn current(&self) -> &Token<'a> {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek_at(&self, offset: usize) -> &Token<'a> {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.pos + offset).min(last)]
    }

    fn advance(&mut self) -> Token<'a> {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at_kind(&self, kind: TokType) -> bool {
        self.current().kind == kind
    }

    fn at_op(&self, op: &str) -> bool {
        let tok = self.current();
        tok.kind == TokType::Op && tok.text == op
    }

    fn at_keyword(&self, kw: &str) -> bool {
        let tok = self.current();
        tok.kind == TokType::Name && tok.text == kw
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.at_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.at_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_here(&self, message: impl Into<String>) -> StubParseError {
        let tok = self.current();
        StubParseError {
            message: message.into(),
            line: tok.line,
            col: tok.col,
        }
    }

    fn unexpected(&self, expected: &str) -> StubParseError {
        let tok = self.current();
        let found = match tok.kind {
            TokType::Newline => "end of line".to_string(),
            TokType::Indent => "indent".to_string(),
            TokType::Dedent => "dedent".to_string(),
            TokType::EndMarker => "end of file".to_string(),
            _ => format!("'{}'", tok.text),
        };
        self.error_here(format!("expected {}, found {}", expected, found))
    }

    fn expect_op(&mut self, op: &str) -> ParseResult<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", op)))
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> ParseResult<()> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", kw)))
        }
    }

    fn expect_kind(&mut self, kind: TokType, what: &str) -> ParseResult<Token<'a>> {
        if self.at_kind(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(what))
        }
    }

    /// A non-keyword identifier.
    fn identifier(&mut self) -> ParseResult<String> {
        let tok = self.current();
        if tok.kind != TokType::Name {
            return Err(self.unexpected("a name"));
        }
        if is_python_keyword(tok.text) {
            return Err(self.error_here(format!(
                "keyword '{}' cannot be used as a name",
                tok.text
            )));
        }
        Ok(self.advance().text.to_string())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn statement(&mut self, out: &mut Vec<Stmt>) -> ParseResult<()> {
        let line = self.current().line;
        if self.at_op("@") {
            let stmt = self.decorated()?;
            out.push(stmt);
            return Ok(());
        }
        if self.at_kind(TokType::Indent) {
            return Err(self.error_here("unexpected indent"));
        }
        if self.at_kind(TokType::Async) {
            self.advance();
            let kind = if self.at_keyword("def") {
                self.function_def(Vec::new(), true)?
            } else if self.at_keyword("for") {
                self.for_stmt()?
            } else if self.at_keyword("with") {
                self.with_stmt()?
            } else {
                return Err(self.unexpected("'def', 'for' or 'with' after 'async'"));
            };
            out.push(Stmt { kind, line });
            return Ok(());
        }

        let text = self.current().text;
        let compound = if self.current().kind == TokType::Name {
            match text {
                "def" => Some(self.function_def(Vec::new(), false)?),
                "class" => Some(self.class_def(Vec::new())?),
                "if" => Some(self.if_stmt()?),
                "for" => Some(self.for_stmt()?),
                "while" => Some(self.while_stmt()?),
                "try" => Some(self.try_stmt()?),
                "with" => Some(self.with_stmt()?),
                "elif" | "else" | "except" | "finally" => {
                    return Err(self.error_here(format!("'{}' without a matching block", text)))
                }
                _ => None,
            }
        } else {
            None
        };
        if let Some(kind) = compound {
            out.push(Stmt { kind, line });
            return Ok(());
        }
        self.simple_statements(out)
    }

    fn simple_statements(&mut self, out: &mut Vec<Stmt>) -> ParseResult<()> {
        loop {
            let line = self.current().line;
            let kind = self.small_statement()?;
            out.push(Stmt { kind, line });
            if !self.eat_op(";") {
                break;
            }
            if self.at_kind(TokType::Newline) {
                break;
            }
        }
        self.expect_kind(TokType::Newline, "end of line")?;
        Ok(())
    }

    fn small_statement(&mut self) -> ParseResult<StmtKind> {
        let text = self.current().text;
        if self.current().kind == TokType::Name {
            match text {
                "pass" | "break" | "continue" => {
                    self.advance();
                    return Ok(StmtKind::Simple);
                }
                "return" => {
                    self.advance();
                    if !self.at_statement_end() {
                        self.star_expressions()?;
                    }
                    return Ok(StmtKind::Simple);
                }
                "raise" => {
                    self.advance();
                    if !self.at_statement_end() {
                        self.test()?;
                        if self.eat_keyword("from") {
                            self.test()?;
                        }
                    }
                    return Ok(StmtKind::Simple);
                }
                "global" | "nonlocal" => {
                    self.advance();
                    self.identifier()?;
                    while self.eat_op(",") {
                        self.identifier()?;
                    }
                    return Ok(StmtKind::Simple);
                }
                "del" => {
                    self.advance();
                    self.expr_list()?;
                    return Ok(StmtKind::Simple);
                }
                "assert" => {
                    self.advance();
                    self.test()?;
                    if self.eat_op(",") {
                        self.test()?;
                    }
                    return Ok(StmtKind::Simple);
                }
                "import" => {
                    self.advance();
                    self.dotted_as_name()?;
                    while self.eat_op(",") {
                        self.dotted_as_name()?;
                    }
                    return Ok(StmtKind::Simple);
                }
                "from" => {
                    self.import_from()?;
                    return Ok(StmtKind::Simple);
                }
                _ => {}
            }
        }
        self.expression_statement()
    }

    fn at_statement_end(&self) -> bool {
        self.at_kind(TokType::Newline) || self.at_op(";")
    }

    fn expression_statement(&mut self) -> ParseResult<StmtKind> {
        let first = if self.at_keyword("yield") {
            self.yield_expr()?
        } else {
            self.star_expressions()?
        };

        if self.eat_op(":") {
            check_target(&first, self, true)?;
            let annotation = self.test()?;
            let value = if self.eat_op("=") {
                Some(self.assignment_value()?)
            } else {
                None
            };
            return Ok(StmtKind::AnnAssign {
                target: first,
                annotation,
                value,
            });
        }

        if AUGMENTED_OPS.iter().any(|op| self.at_op(op)) {
            check_target(&first, self, true)?;
            self.advance();
            self.assignment_value()?;
            return Ok(StmtKind::Simple);
        }

        if self.at_op("=") {
            let mut targets = vec![first];
            let mut value = None;
            while self.eat_op("=") {
                let next = self.assignment_value()?;
                if let Some(previous) = value.replace(next) {
                    targets.push(previous);
                }
            }
            for target in &targets {
                check_target(target, self, false)?;
            }
            let value = value.ok_or_else(|| self.unexpected("an expression"))?;
            return Ok(StmtKind::Assign { targets, value });
        }

        Ok(StmtKind::Simple)
    }

    fn assignment_value(&mut self) -> ParseResult<Expr> {
        if self.at_keyword("yield") {
            self.yield_expr()
        } else {
            self.star_expressions()
        }
    }

    fn dotted_name(&mut self) -> ParseResult<String> {
        let mut name = self.identifier()?;
        while self.eat_op(".") {
            name.push('.');
            name.push_str(&self.identifier()?);
        }
        Ok(name)
    }

    fn dotted_as_name(&mut self) -> ParseResult<()> {
        self.dotted_name()?;
        if self.eat_keyword("as") {
            self.identifier()?;
        }
        Ok(())
    }

    fn import_from(&mut self) -> ParseResult<()> {
        self.expect_keyword("from")?;
        let mut dots = 0;
        while self.at_op(".") || self.at_op("...") {
            dots += self.advance().text.len();
        }
        if !self.at_keyword("import") {
            self.dotted_name()?;
        } else if dots == 0 {
            return Err(self.unexpected("a module name"));
        }
        self.expect_keyword("import")?;
        if self.eat_op("*") {
            return Ok(());
        }
        let parenthesized = self.eat_op("(");
        loop {
            self.identifier()?;
            if self.eat_keyword("as") {
                self.identifier()?;
            }
            if !self.eat_op(",") {
                break;
            }
            if parenthesized && self.at_op(")") {
                break;
            }
            if !parenthesized && self.at_statement_end() {
                return Err(self.error_here("trailing comma not allowed without parentheses"));
            }
        }
        if parenthesized {
            self.expect_op(")")?;
        }
        Ok(())
    }

    fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect_op(":")?;
        let mut body = Vec::new();
        if self.at_kind(TokType::Newline) {
            self.advance();
            self.expect_kind(TokType::Indent, "an indented block")?;
            while !self.at_kind(TokType::Dedent) && !self.at_kind(TokType::EndMarker) {
                self.statement(&mut body)?;
            }
            self.expect_kind(TokType::Dedent, "dedent")?;
        } else {
            self.simple_statements(&mut body)?;
        }
        Ok(body)
    }

    fn decorated(&mut self) -> ParseResult<Stmt> {
        let line = self.current().line;
        let mut decorators = Vec::new();
        while self.eat_op("@") {
            decorators.push(self.named_test()?);
            self.expect_kind(TokType::Newline, "end of line after decorator")?;
        }
        let kind = if self.at_keyword("def") {
            self.function_def(decorators, false)?
        } else if self.at_kind(TokType::Async) {
            self.advance();
            self.function_def(decorators, true)?
        } else if self.at_keyword("class") {
            self.class_def(decorators)?
        } else {
            return Err(self.unexpected("'def' or 'class' after decorator"));
        };
        Ok(Stmt { kind, line })
    }

    fn function_def(&mut self, decorators: Vec<Expr>, is_async: bool) -> ParseResult<StmtKind> {
        self.expect_keyword("def")?;
        let name = self.identifier()?;
        self.expect_op("(")?;
        let params = self.parameters(")", true)?;
        self.expect_op(")")?;
        let returns = if self.eat_op("->") {
            Some(self.test()?)
        } else {
            None
        };
        let body = self.block()?;
        Ok(StmtKind::FunctionDef {
            name,
            is_async,
            params,
            returns,
            decorators,
            body,
        })
    }

    /// Parameter list up to (not including) `close`.
    fn parameters(&mut self, close: &str, annotated: bool) -> ParseResult<Vec<Param>> {
        let mut params = Vec::new();
        let mut seen_default = false;
        while !self.at_op(close) {
            if self.eat_op("/") {
                // positional-only marker
            } else if self.eat_op("**") {
                params.push(self.parameter(annotated)?);
            } else if self.eat_op("*") {
                if !self.at_op(",") && !self.at_op(close) {
                    params.push(self.parameter(annotated)?);
                }
                seen_default = false;
            } else {
                let mut param = self.parameter(annotated)?;
                if self.eat_op("=") {
                    param.default = Some(self.test()?);
                    seen_default = true;
                } else if seen_default {
                    return Err(self.error_here("non-default argument follows default argument"));
                }
                params.push(param);
            }
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(params)
    }

    fn parameter(&mut self, annotated: bool) -> ParseResult<Param> {
        let name = self.identifier()?;
        let annotation = if annotated && self.eat_op(":") {
            Some(self.test()?)
        } else {
            None
        };
        Ok(Param {
            name,
            annotation,
            default: None,
        })
    }

    fn class_def(&mut self, decorators: Vec<Expr>) -> ParseResult<StmtKind> {
        self.expect_keyword("class")?;
        let name = self.identifier()?;
        let bases = if self.eat_op("(") {
            let args = self.call_arguments()?;
            self.expect_op(")")?;
            args
        } else {
            Vec::new()
        };
        let body = self.block()?;
        Ok(StmtKind::ClassDef {
            name,
            bases,
            decorators,
            body,
        })
    }

    fn if_stmt(&mut self) -> ParseResult<StmtKind> {
        self.expect_keyword("if")?;
        self.named_test()?;
        let mut bodies = vec![self.block()?];
        while self.eat_keyword("elif") {
            self.named_test()?;
            bodies.push(self.block()?);
        }
        if self.eat_keyword("else") {
            bodies.push(self.block()?);
        }
        Ok(StmtKind::Block(bodies))
    }

    fn for_stmt(&mut self) -> ParseResult<StmtKind> {
        self.expect_keyword("for")?;
        let target = self.expr_list()?;
        check_target(&target, self, false)?;
        self.expect_keyword("in")?;
        self.star_expressions()?;
        let mut bodies = vec![self.block()?];
        if self.eat_keyword("else") {
            bodies.push(self.block()?);
        }
        Ok(StmtKind::Block(bodies))
    }

    fn while_stmt(&mut self) -> ParseResult<StmtKind> {
        self.expect_keyword("while")?;
        self.named_test()?;
        let mut bodies = vec![self.block()?];
        if self.eat_keyword("else") {
            bodies.push(self.block()?);
        }
        Ok(StmtKind::Block(bodies))
    }

    fn try_stmt(&mut self) -> ParseResult<StmtKind> {
        self.expect_keyword("try")?;
        let mut bodies = vec![self.block()?];
        let mut handlers = 0;
        while self.eat_keyword("except") {
            handlers += 1;
            if !self.at_op(":") {
                self.test()?;
                if self.eat_keyword("as") {
                    self.identifier()?;
                }
            }
            bodies.push(self.block()?);
        }
        if handlers > 0 && self.eat_keyword("else") {
            bodies.push(self.block()?);
        }
        let has_finally = self.eat_keyword("finally");
        if has_finally {
            bodies.push(self.block()?);
        }
        if handlers == 0 && !has_finally {
            return Err(self.unexpected("'except' or 'finally'"));
        }
        Ok(StmtKind::Block(bodies))
    }

    fn with_stmt(&mut self) -> ParseResult<StmtKind> {
        self.expect_keyword("with")?;
        loop {
            self.test()?;
            if self.eat_keyword("as") {
                let target = self.expr()?;
                check_target(&target, self, false)?;
            }
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(StmtKind::Block(vec![self.block()?]))
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// `test (',' test)* [',']` with starred items; a bare comma makes a tuple.
    fn star_expressions(&mut self) -> ParseResult<Expr> {
        let first = self.star_or_test()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_expression_end() {
                break;
            }
            items.push(self.star_or_test()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn at_expression_end(&self) -> bool {
        let tok = self.current();
        match tok.kind {
            TokType::Newline | TokType::EndMarker => true,
            TokType::Op => matches!(tok.text, ")" | "]" | "}" | "=" | ":" | ";"),
            TokType::Name => tok.text == "in",
            _ => false,
        }
    }

    fn star_or_test(&mut self) -> ParseResult<Expr> {
        if self.eat_op("*") {
            return Ok(Expr::Starred(Box::new(self.expr()?)));
        }
        self.test()
    }

    /// Target list for `for` and `del`: bitwise-level expressions.
    fn expr_list(&mut self) -> ParseResult<Expr> {
        let first = self.star_or_expr()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_expression_end() {
                break;
            }
            items.push(self.star_or_expr()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn star_or_expr(&mut self) -> ParseResult<Expr> {
        if self.eat_op("*") {
            return Ok(Expr::Starred(Box::new(self.expr()?)));
        }
        self.expr()
    }

    fn yield_expr(&mut self) -> ParseResult<Expr> {
        self.expect_keyword("yield")?;
        if self.eat_keyword("from") {
            return Ok(Expr::Compound(vec![self.test()?]));
        }
        if self.at_expression_end() {
            return Ok(Expr::Compound(Vec::new()));
        }
        Ok(Expr::Compound(vec![self.star_expressions()?]))
    }

    fn named_test(&mut self) -> ParseResult<Expr> {
        let value = self.test()?;
        if self.eat_op(":=") {
            if !matches!(value, Expr::Name(_)) {
                return Err(self.error_here("cannot use assignment expression with this target"));
            }
            let rhs = self.test()?;
            return Ok(Expr::Compound(vec![value, rhs]));
        }
        Ok(value)
    }

    fn test(&mut self) -> ParseResult<Expr> {
        if self.at_keyword("lambda") {
            return self.lambda();
        }
        let body = self.or_test()?;
        if self.eat_keyword("if") {
            let cond = self.or_test()?;
            self.expect_keyword("else")?;
            let orelse = self.test()?;
            return Ok(Expr::Compound(vec![body, cond, orelse]));
        }
        Ok(body)
    }

    fn test_no_cond(&mut self) -> ParseResult<Expr> {
        if self.at_keyword("lambda") {
            return self.lambda();
        }
        self.or_test()
    }

    fn lambda(&mut self) -> ParseResult<Expr> {
        self.expect_keyword("lambda")?;
        self.parameters(":", false)?;
        self.expect_op(":")?;
        Ok(Expr::Compound(vec![self.test()?]))
    }

    fn or_test(&mut self) -> ParseResult<Expr> {
        let mut items = vec![self.and_test()?];
        while self.eat_keyword("or") {
            items.push(self.and_test()?);
        }
        Ok(collapse(items))
    }

    fn and_test(&mut self) -> ParseResult<Expr> {
        let mut items = vec![self.not_test()?];
        while self.eat_keyword("and") {
            items.push(self.not_test()?);
        }
        Ok(collapse(items))
    }

    fn not_test(&mut self) -> ParseResult<Expr> {
        if self.eat_keyword("not") {
            return Ok(Expr::Compound(vec![self.not_test()?]));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let mut items = vec![self.expr()?];
        loop {
            if COMPARISON_OPS.iter().any(|op| self.at_op(op)) || self.at_keyword("in") {
                self.advance();
            } else if self.at_not_in() {
                self.advance();
                self.advance();
            } else if self.eat_keyword("is") {
                self.eat_keyword("not");
            } else {
                break;
            }
            items.push(self.expr()?);
        }
        Ok(collapse(items))
    }

    fn at_not_in(&self) -> bool {
        let next = self.peek_at(1);
        self.at_keyword("not") && next.kind == TokType::Name && next.text == "in"
    }

    fn binary_level(
        &mut self,
        ops: &[&str],
        next: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let mut items = vec![next(self)?];
        while ops.iter().any(|op| self.at_op(op)) {
            self.advance();
            items.push(next(self)?);
        }
        Ok(collapse(items))
    }

    fn expr(&mut self) -> ParseResult<Expr> {
        self.binary_level(&["|"], Self::xor_expr)
    }

    fn xor_expr(&mut self) -> ParseResult<Expr> {
        self.binary_level(&["^"], Self::and_expr)
    }

    fn and_expr(&mut self) -> ParseResult<Expr> {
        self.binary_level(&["&"], Self::shift_expr)
    }

    fn shift_expr(&mut self) -> ParseResult<Expr> {
        self.binary_level(&["<<", ">>"], Self::arith_expr)
    }

    fn arith_expr(&mut self) -> ParseResult<Expr> {
        self.binary_level(&["+", "-"], Self::term)
    }

    fn term(&mut self) -> ParseResult<Expr> {
        self.binary_level(&["*", "/", "//", "%", "@"], Self::factor)
    }

    fn factor(&mut self) -> ParseResult<Expr> {
        if self.at_op("+") || self.at_op("-") || self.at_op("~") {
            self.advance();
            return Ok(Expr::Compound(vec![self.factor()?]));
        }
        self.power()
    }

    fn power(&mut self) -> ParseResult<Expr> {
        let awaited = if self.at_kind(TokType::Await) {
            self.advance();
            true
        } else {
            false
        };
        let mut base = self.primary()?;
        if awaited {
            base = Expr::Compound(vec![base]);
        }
        if self.eat_op("**") {
            let exponent = self.factor()?;
            return Ok(Expr::Compound(vec![base, exponent]));
        }
        Ok(base)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let mut value = self.atom()?;
        loop {
            if self.eat_op("(") {
                let args = self.call_arguments()?;
                self.expect_op(")")?;
                value = Expr::Call {
                    func: Box::new(value),
                    args,
                };
            } else if self.eat_op("[") {
                let index = self.subscript_list()?;
                self.expect_op("]")?;
                value = Expr::Subscript {
                    value: Box::new(value),
                    index: Box::new(index),
                };
            } else if self.eat_op(".") {
                let attr = self.identifier()?;
                value = Expr::Attribute {
                    value: Box::new(value),
                    attr,
                };
            } else {
                break;
            }
        }
        Ok(value)
    }

    fn call_arguments(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        while !self.at_op(")") {
            if self.eat_op("**") || self.eat_op("*") {
                args.push(Expr::Starred(Box::new(self.test()?)));
            } else {
                let arg = self.named_test()?;
                if self.at_op("=") {
                    if !matches!(arg, Expr::Name(_)) {
                        return Err(self.error_here("expression cannot be a keyword argument"));
                    }
                    self.advance();
                    args.push(self.test()?);
                } else if self.at_keyword("for") || self.at_kind(TokType::Async) {
                    self.comprehension_tail()?;
                    args.push(Expr::Compound(vec![arg]));
                } else {
                    args.push(arg);
                }
            }
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(args)
    }

    fn subscript_list(&mut self) -> ParseResult<Expr> {
        let first = self.subscript()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_op("]") {
                break;
            }
            items.push(self.subscript()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn subscript(&mut self) -> ParseResult<Expr> {
        let mut parts = Vec::new();
        let lower = if self.at_op(":") {
            None
        } else {
            Some(self.star_or_named_test()?)
        };
        if !self.at_op(":") {
            return lower.ok_or_else(|| self.unexpected("an index"));
        }
        parts.extend(lower);
        for _ in 0..2 {
            if !self.eat_op(":") {
                break;
            }
            if !self.at_op(":") && !self.at_op(",") && !self.at_op("]") {
                parts.push(self.test()?);
            }
        }
        Ok(Expr::Compound(parts))
    }

    fn star_or_named_test(&mut self) -> ParseResult<Expr> {
        if self.eat_op("*") {
            return Ok(Expr::Starred(Box::new(self.expr()?)));
        }
        self.named_test()
    }

    fn comprehension_tail(&mut self) -> ParseResult<()> {
        loop {
            if self.at_kind(TokType::Async) {
                self.advance();
            }
            if !self.eat_keyword("for") {
                break;
            }
            let target = self.expr_list()?;
            check_target(&target, self, false)?;
            self.expect_keyword("in")?;
            self.or_test()?;
            while self.eat_keyword("if") {
                self.test_no_cond()?;
            }
        }
        Ok(())
    }

    /// Items of a parenthesized or bracketed display, or a comprehension.
    fn display_items(&mut self, close: &str) -> ParseResult<(Vec<Expr>, bool, bool)> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        if self.at_op(close) {
            return Ok((items, false, false));
        }
        let first = self.star_or_named_test()?;
        if self.at_keyword("for") || self.at_kind(TokType::Async) {
            self.comprehension_tail()?;
            return Ok((vec![first], false, true));
        }
        items.push(first);
        while self.eat_op(",") {
            trailing_comma = true;
            if self.at_op(close) {
                break;
            }
            trailing_comma = false;
            items.push(self.star_or_named_test()?);
        }
        let had_comma = trailing_comma || items.len() > 1;
        Ok((items, had_comma, false))
    }

    fn brace_display(&mut self) -> ParseResult<Expr> {
        let mut items = Vec::new();
        if self.at_op("}") {
            return Ok(Expr::Compound(items));
        }
        let mut first = true;
        loop {
            if self.eat_op("**") {
                items.push(self.expr()?);
            } else {
                let key = self.star_or_test()?;
                items.push(key);
                if self.eat_op(":") {
                    items.push(self.test()?);
                }
            }
            if first && (self.at_keyword("for") || self.at_kind(TokType::Async)) {
                self.comprehension_tail()?;
                break;
            }
            first = false;
            if !self.eat_op(",") || self.at_op("}") {
                break;
            }
        }
        Ok(Expr::Compound(items))
    }

    fn atom(&mut self) -> ParseResult<Expr> {
        let tok = self.current().clone();
        match tok.kind {
            TokType::Name => match tok.text {
                "None" | "True" | "False" => {
                    self.advance();
                    Ok(Expr::Constant(tok.text.to_string()))
                }
                _ => Ok(Expr::Name(self.identifier()?)),
            },
            TokType::Number => {
                self.advance();
                Ok(Expr::Number(tok.text.to_string()))
            }
            TokType::String => {
                let mut value = String::new();
                while self.at_kind(TokType::String) {
                    value.push_str(&decode_string(self.advance().text));
                }
                Ok(Expr::Str(value))
            }
            TokType::Op => match tok.text {
                "..." => {
                    self.advance();
                    Ok(Expr::Ellipsis)
                }
                "(" => {
                    self.advance();
                    if self.at_keyword("yield") {
                        let inner = self.yield_expr()?;
                        self.expect_op(")")?;
                        return Ok(inner);
                    }
                    let (mut items, had_comma, comprehension) = self.display_items(")")?;
                    self.expect_op(")")?;
                    if comprehension {
                        return Ok(Expr::Compound(items));
                    }
                    if items.len() == 1 && !had_comma {
                        return Ok(items.remove(0));
                    }
                    Ok(Expr::Tuple(items))
                }
                "[" => {
                    self.advance();
                    let (items, _, comprehension) = self.display_items("]")?;
                    self.expect_op("]")?;
                    if comprehension {
                        return Ok(Expr::Compound(items));
                    }
                    Ok(Expr::List(items))
                }
                "{" => {
                    self.advance();
                    let display = self.brace_display()?;
                    self.expect_op("}")?;
                    Ok(display)
                }
                _ => Err(self.unexpected("an expression")),
            },
            _ => Err(self.unexpected("an expression")),
        }
    }
}

fn collapse(mut items: Vec<Expr>) -> Expr {
    if items.len() == 1 {
        items.remove(0)
    } else {
        Expr::Compound(items)
    }
}

/// Reject assignment to things that are not assignable.
fn check_target(target: &Expr, parser: &Parser<'_>, single: bool) -> ParseResult<()> {
    let ok = match target {
        Expr::Name(_) | Expr::Attribute { .. } | Expr::Subscript { .. } => true,
        Expr::Tuple(items) | Expr::List(items) if !single => items
            .iter()
            .all(|item| check_target(item, parser, false).is_ok()),
        Expr::Starred(inner) if !single => check_target(inner, parser, false).is_ok(),
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(parser.error_here(format!("cannot assign to '{}'", target.to_source())))
    }
}

/// Decode one string literal token into its value.
///
/// Escapes are resolved for the common single-character forms; raw strings
/// are taken verbatim. f-string replacement fields are kept as written.
pub fn decode_string(token: &str) -> String {
    let prefix_len = token.find(['"', '\'']).unwrap_or(0);
    let prefix = token[..prefix_len].to_ascii_lowercase();
    let body = &token[prefix_len..];
    let quote_len = if body.starts_with("\"\"\"") || body.starts_with("'''") {
        3
    } else {
        1
    };
    let inner = body
        .get(quote_len..body.len().saturating_sub(quote_len))
        .unwrap_or("");
    if prefix.contains('r') {
        return inner.to_string();
    }
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(source: &str) -> Module {
        match parse_module(source) {
            Ok(module) => module,
            Err(err) => panic!("failed to parse: {err}\n{source}"),
        }
    }

    fn err(source: &str) -> StubParseError {
        parse_module(source).expect_err("expected a parse error")
    }

    mod accepted {
        use super::*;

        #[test]
        fn stub_class_with_overloads() {
            let module = ok(concat!(
                "from typing import Literal, overload\n",
                "from cocotb.handle import (\n",
                "    HierarchyObject,\n",
                "    LogicObject,\n",
                ")\n",
                "\n",
                "class Top(HierarchyObject):\n",
                "    \"\"\"Doc.\"\"\"\n",
                "    clk: LogicObject\n",
                "    @overload\n",
                "    def __getitem__(self, key: Literal[\"mem[0]\"]) -> LogicObject: ...\n",
                "    @overload\n",
                "    def __getitem__(self, key: str) -> SimHandleBase: ...\n",
                "\n",
                "DutType = Top\n",
            ));
            assert_eq!(module.body.len(), 4);
            let StmtKind::ClassDef { name, body, .. } = &module.body[2].kind else {
                panic!("expected class");
            };
            assert_eq!(name, "Top");
            assert_eq!(body.len(), 4);
        }

        #[test]
        fn testbench_constructs() {
            ok(concat!(
                "import random\n",
                "import cocotb\n",
                "from cocotb.clock import Clock\n",
                "from cocotb.triggers import ClockCycles, RisingEdge, Timer\n",
                "\n",
                "class TopTestBench:\n",
                "    def __init__(self, dut: Top) -> None:\n",
                "        self.dut = dut\n",
                "        self.clock_period = 10  # ns\n",
                "\n",
                "    async def reset(self, cycles: int = 5) -> None:\n",
                "        self.dut.rst_n.value = 0\n",
                "        await ClockCycles(self.dut.clk, cycles)\n",
                "        self.dut.rst_n.value = 1\n",
                "\n",
                "@cocotb.test()\n",
                "async def test_random(dut: Top) -> None:\n",
                "    values = [random.randint(0, 255) for _ in range(10)]\n",
                "    for i, value in enumerate(values):\n",
                "        if i % 2 == 0 and value is not None:\n",
                "            dut._log.info(f\"value {i}: {value}\")\n",
                "        elif not value:\n",
                "            continue\n",
                "        else:\n",
                "            pass\n",
                "    try:\n",
                "        await Timer(1, units=\"ns\")\n",
                "    except (AttributeError, KeyError) as exc:\n",
                "        raise RuntimeError(\"bad\") from exc\n",
                "    finally:\n",
                "        x = {\"a\": 1, **{}}\n",
                "    assert len(values) == 10, \"length\"\n",
            ));
        }

        #[test]
        fn generators_slices_and_lambdas() {
            ok(concat!(
                "def f(*args, key=None, **kw):\n",
                "    for i in range(0, 3 + 1):\n",
                "        yield args[i:i + 1]\n",
                "    g = lambda a, b=2: a ** -b\n",
                "    return not (a in b) or c not in d\n",
                "x, *rest = 1, 2, 3\n",
                "y += 1; z = w = 3\n",
            ));
        }

        #[test]
        fn string_concatenation_decodes() {
            let module = ok("x = \"a\\\"b\" 'c'\n");
            let StmtKind::Assign { value, .. } = &module.body[0].kind else {
                panic!("expected assignment");
            };
            assert_eq!(value, &Expr::Str("a\"bc".to_string()));
        }
    }

    mod rejected {
        use super::*;

        #[test]
        fn keyword_as_attribute_name() {
            let e = err("class A:\n    in: int\n");
            assert_eq!((e.line, e.col), (2, 5));
            assert!(e.message.contains("keyword"));
            let e = err("x.class = 1\n");
            assert_eq!((e.line, e.col), (1, 3));
        }

        #[test]
        fn special_characters_in_names() {
            let e = err("class A:\n    !special!: int\n");
            assert_eq!((e.line, e.col), (2, 5));
            assert!(e.message.contains("invalid character"));
        }

        #[test]
        fn call_as_annotated_target() {
            assert!(err("f(): int\n").message.contains("cannot assign"));
        }

        #[test]
        fn missing_indented_block() {
            let e = err("class A:\npass\n");
            assert_eq!(e.line, 2);
        }

        #[test]
        fn unexpected_indent() {
            assert!(err("x = 1\n    y = 2\n").message.contains("indent"));
        }

        #[test]
        fn unterminated_constructs() {
            assert!(err("x = (1, 2\n").message.contains("never closed"));
            assert!(err("def f(x y):\n    pass\n").message.contains("expected"));
        }

        #[test]
        fn dangling_else() {
            assert!(err("else:\n    pass\n").message.contains("without"));
        }

        #[test]
        fn invalid_assignment_target() {
            assert!(err("f() = 1\n").message.contains("cannot assign"));
        }
    }
}
