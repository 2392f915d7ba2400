// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::fmt;

use serde_json::Number;

/// Byte offsets into the original template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn join(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// A sequential block of nodes (equivalent to Go's `parse.ListNode`).
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub nodes: Vec<Node>,
}

impl Block {
    pub fn push(&mut self, node: Node) {
        self.nodes.push(node);
    }

    /// Reports whether the block only holds whitespace text.
    pub fn is_blank(&self) -> bool {
        self.nodes.iter().all(|node| match node {
            Node::Text(text) => text.text.trim().is_empty(),
            Node::Comment(_) => true,
            _ => false,
        })
    }
}

/// Node types recognised by the parser.
#[derive(Debug, Clone)]
pub enum Node {
    Text(TextNode),
    Action(ActionNode),
    Comment(CommentNode),
    If(IfNode),
    Range(RangeNode),
    With(WithNode),
    Template(TemplateNode),
    Break(Span),
    Continue(Span),
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Text(node) => node.span,
            Node::Action(node) => node.span,
            Node::Comment(node) => node.span,
            Node::If(node) => node.span,
            Node::Range(node) => node.span,
            Node::With(node) => node.span,
            Node::Template(node) => node.span,
            Node::Break(span) | Node::Continue(span) => *span,
        }
    }
}

/// Raw text literal.
#[derive(Debug, Clone)]
pub struct TextNode {
    pub span: Span,
    pub text: String,
}

impl TextNode {
    pub fn new(span: Span, text: impl Into<String>) -> Self {
        Self {
            span,
            text: text.into(),
        }
    }
}

/// Action that prints the value of its pipeline, unless the pipeline only
/// declares or assigns variables.
#[derive(Debug, Clone)]
pub struct ActionNode {
    pub span: Span,
    pub pipeline: Pipeline,
}

impl ActionNode {
    pub fn new(span: Span, pipeline: Pipeline) -> Self {
        Self { span, pipeline }
    }
}

/// Template comment (e.g. `{{/* comment */}}`).
#[derive(Debug, Clone)]
pub struct CommentNode {
    pub span: Span,
    pub text: String,
}

impl CommentNode {
    pub fn new(span: Span, text: impl Into<String>) -> Self {
        Self {
            span,
            text: text.into(),
        }
    }
}

/// One guarded body of an `if` or `with` chain.
#[derive(Debug, Clone)]
pub struct Branch {
    pub span: Span,
    pub pipeline: Pipeline,
    pub block: Block,
}

impl Branch {
    pub fn new(span: Span, pipeline: Pipeline, block: Block) -> Self {
        Self {
            span,
            pipeline,
            block,
        }
    }
}

/// Conditional chain: `if`, any number of `else if`, optional `else`.
#[derive(Debug, Clone)]
pub struct IfNode {
    pub span: Span,
    pub branches: Vec<Branch>,
    pub else_block: Option<Block>,
}

impl IfNode {
    pub fn new(span: Span, branches: Vec<Branch>, else_block: Option<Block>) -> Self {
        Self {
            span,
            branches,
            else_block,
        }
    }
}

/// Range iteration node.
#[derive(Debug, Clone)]
pub struct RangeNode {
    pub span: Span,
    pub pipeline: Pipeline,
    pub body: Block,
    pub else_block: Option<Block>,
}

impl RangeNode {
    pub fn new(span: Span, pipeline: Pipeline, body: Block, else_block: Option<Block>) -> Self {
        Self {
            span,
            pipeline,
            body,
            else_block,
        }
    }
}

/// Scoped context chain: `with`, any number of `else with`, optional `else`.
#[derive(Debug, Clone)]
pub struct WithNode {
    pub span: Span,
    pub branches: Vec<Branch>,
    pub else_block: Option<Block>,
}

impl WithNode {
    pub fn new(span: Span, branches: Vec<Branch>, else_block: Option<Block>) -> Self {
        Self {
            span,
            branches,
            else_block,
        }
    }
}

/// Invocation of a named template (`{{template "name" pipeline}}`).
#[derive(Debug, Clone)]
pub struct TemplateNode {
    pub span: Span,
    pub name: String,
    pub pipeline: Option<Pipeline>,
}

impl TemplateNode {
    pub fn new(span: Span, name: impl Into<String>, pipeline: Option<Pipeline>) -> Self {
        Self {
            span,
            name: name.into(),
            pipeline,
        }
    }
}

/// A complete pipeline inside an action.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub span: Span,
    pub declarations: Option<PipelineDeclarations>,
    pub commands: Vec<Command>,
}

impl Pipeline {
    pub fn new(
        span: Span,
        declarations: Option<PipelineDeclarations>,
        commands: Vec<Command>,
    ) -> Self {
        Self {
            span,
            declarations,
            commands,
        }
    }
}

/// Variable declarations leading a pipeline (e.g. `{{$x := ...}}`).
#[derive(Debug, Clone)]
pub struct PipelineDeclarations {
    pub kind: BindingKind,
    pub variables: Vec<String>,
}

impl PipelineDeclarations {
    pub fn new(kind: BindingKind, variables: Vec<String>) -> Self {
        Self { kind, variables }
    }
}

/// Whether the pipeline introduces (`:=`) or assigns (`=`) variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Declare,
    Assign,
}

/// Individual command in a pipeline.
#[derive(Debug, Clone)]
pub struct Command {
    pub span: Span,
    pub target: Expression,
    pub args: Vec<Expression>,
}

impl Command {
    pub fn new(span: Span, target: Expression, args: Vec<Expression>) -> Self {
        Self { span, target, args }
    }
}

/// Expression node.
#[derive(Debug, Clone)]
pub enum Expression {
    /// A function name; called when evaluated.
    Identifier(String),
    /// The cursor, `.`.
    Dot,
    /// Field chain relative to dot, `.a.b`.
    Field(Vec<String>),
    /// Variable with an optional field chain, `$x.a`.
    Variable { name: String, fields: Vec<String> },
    /// Field chain applied to a parenthesised pipeline, `(pipeline).a`.
    Chain {
        base: Box<Expression>,
        fields: Vec<String>,
    },
    PipelineExpr(Box<Pipeline>),
    StringLiteral(String),
    NumberLiteral(Number),
    BoolLiteral(bool),
    Nil,
}

impl Expression {
    pub fn identifier(name: impl Into<String>) -> Self {
        Expression::Identifier(name.into())
    }

    pub fn field(path: Vec<String>) -> Self {
        Expression::Field(path)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn fields(f: &mut fmt::Formatter<'_>, parts: &[String]) -> fmt::Result {
            for part in parts {
                write!(f, ".{part}")?;
            }
            Ok(())
        }
        match self {
            Expression::Identifier(name) => f.write_str(name),
            Expression::Dot => f.write_str("."),
            Expression::Field(parts) => fields(f, parts),
            Expression::Variable { name, fields: parts } => {
                f.write_str(name)?;
                fields(f, parts)
            }
            Expression::Chain { base, fields: parts } => {
                write!(f, "{base}")?;
                fields(f, parts)
            }
            Expression::PipelineExpr(_) => f.write_str("(pipeline)"),
            Expression::StringLiteral(text) => write!(f, "{text:?}"),
            Expression::NumberLiteral(number) => write!(f, "{number}"),
            Expression::BoolLiteral(flag) => write!(f, "{flag}"),
            Expression::Nil => f.write_str("nil"),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Text(node) => write!(f, "Text({:?})", node.text),
            Node::Action(_) => write!(f, "Action"),
            Node::Comment(_) => write!(f, "Comment"),
            Node::If(_) => write!(f, "If"),
            Node::Range(_) => write!(f, "Range"),
            Node::With(_) => write!(f, "With"),
            Node::Template(node) => write!(f, "Template({:?})", node.name),
            Node::Break(_) => write!(f, "Break"),
            Node::Continue(_) => write!(f, "Continue"),
        }
    }
}
