//! Structural view of a parsed stub: classes, their annotated attributes,
//! and the `Literal` keys of their `__getitem__` overloads.

use std::collections::BTreeSet;

use crate::parser::{parse_module, Expr, Module, Param, ParseResult, Stmt, StmtKind};

/// Annotated class attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct StubAttribute {
    pub name: String,
    pub annotation: String,
    pub line: u32,
}

/// Method signature summary.
#[derive(Debug, Clone, PartialEq)]
pub struct StubMethod {
    pub name: String,
    pub line: u32,
    pub is_overload: bool,
    /// String keys from `Literal[...]` parameter annotations.
    pub literal_keys: Vec<String>,
    pub returns: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StubClass {
    pub name: String,
    pub line: u32,
    pub bases: Vec<String>,
    pub attributes: Vec<StubAttribute>,
    pub methods: Vec<StubMethod>,
}

impl StubClass {
    /// Keys accepted by the `__getitem__` overloads.
    pub fn keyed_names(&self) -> impl Iterator<Item = &str> {
        self.methods
            .iter()
            .filter(|m| m.name == "__getitem__")
            .flat_map(|m| m.literal_keys.iter().map(String::as_str))
    }
}

/// Everything a stub declares.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedStub {
    pub classes: Vec<StubClass>,
    /// Module-level assignments such as `DutType = Top`, as (name, value).
    pub aliases: Vec<(String, String)>,
}

impl ParsedStub {
    /// Parse Python source into its structural view.
    pub fn parse(source: &str) -> ParseResult<Self> {
        let module = parse_module(source)?;
        Ok(Self::from_module(&module))
    }

    pub fn from_module(module: &Module) -> Self {
        let mut stub = ParsedStub::default();
        collect(&module.body, &mut stub);
        stub
    }

    pub fn class(&self, name: &str) -> Option<&StubClass> {
        self.classes.iter().find(|c| c.name == name)
    }

    /// Attribute names of every class plus every `Literal` overload key.
    pub fn declared_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for class in &self.classes {
            for attr in &class.attributes {
                names.insert(attr.name.clone());
            }
            for key in class.keyed_names() {
                names.insert(key.to_string());
            }
        }
        names
    }
}

/// Collect classes at module level and inside compound statements such as
/// `if TYPE_CHECKING:` blocks. Nested classes are collected too.
fn collect(body: &[Stmt], stub: &mut ParsedStub) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::ClassDef {
                name,
                bases,
                body,
                ..
            } => {
                stub.classes.push(class_from(name, bases, body, stmt.line));
                collect_nested_classes(body, stub);
            }
            StmtKind::Assign { targets, value } => {
                for target in targets {
                    if let Expr::Name(name) = target {
                        stub.aliases.push((name.clone(), value.to_source()));
                    }
                }
            }
            StmtKind::Block(bodies) => {
                for inner in bodies {
                    collect(inner, stub);
                }
            }
            _ => {}
        }
    }
}

fn collect_nested_classes(body: &[Stmt], stub: &mut ParsedStub) {
    for stmt in body {
        if let StmtKind::ClassDef {
            name,
            bases,
            body,
            ..
        } = &stmt.kind
        {
            stub.classes.push(class_from(name, bases, body, stmt.line));
            collect_nested_classes(body, stub);
        }
    }
}

fn class_from(name: &str, bases: &[Expr], body: &[Stmt], line: u32) -> StubClass {
    let mut class = StubClass {
        name: name.to_string(),
        line,
        bases: bases.iter().map(Expr::to_source).collect(),
        attributes: Vec::new(),
        methods: Vec::new(),
    };
    for stmt in body {
        match &stmt.kind {
            StmtKind::AnnAssign {
                target: Expr::Name(attr),
                annotation,
                ..
            } => class.attributes.push(StubAttribute {
                name: attr.clone(),
                annotation: annotation.to_source(),
                line: stmt.line,
            }),
            StmtKind::FunctionDef {
                name,
                params,
                returns,
                decorators,
                ..
            } => class.methods.push(StubMethod {
                name: name.clone(),
                line: stmt.line,
                is_overload: decorators
                    .iter()
                    .any(|d| d.tail_name() == Some("overload")),
                literal_keys: literal_keys(params),
                returns: returns.as_ref().map(Expr::to_source),
            }),
            _ => {}
        }
    }
    class
}

fn literal_keys(params: &[Param]) -> Vec<String> {
    let mut keys = Vec::new();
    for param in params {
        let Some(Expr::Subscript { value, index }) = &param.annotation else {
            continue;
        };
        if value.tail_name() != Some("Literal") {
            continue;
        }
        match index.as_ref() {
            Expr::Str(key) => keys.push(key.clone()),
            Expr::Tuple(items) => keys.extend(items.iter().filter_map(|item| match item {
                Expr::Str(key) => Some(key.clone()),
                _ => None,
            })),
            _ => {}
        }
    }
    keys
}
