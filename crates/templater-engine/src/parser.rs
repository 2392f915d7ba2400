// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::collections::{BTreeMap, BTreeSet};

use serde_json::Number;

use crate::ast::{
    ActionNode, BindingKind, Block, Branch, Command, CommentNode, Expression, IfNode, Node,
    Pipeline, PipelineDeclarations, RangeNode, Span, TemplateNode, TextNode, WithNode,
};
use crate::error::Error;
use crate::lexer::{self, Keyword, Token, TokenKind};
use crate::runtime::{parse_number, FunctionRegistry};

/// Output of a successful parse: the main body, every `define`/`block`
/// body keyed by name, and the registered functions the source calls.
#[derive(Debug, Clone, Default)]
pub struct ParsedTemplate {
    pub root: Block,
    pub definitions: BTreeMap<String, Block>,
    pub functions: BTreeSet<String>,
}

/// Primary entry point for parsing template sources.
///
/// Parsing runs in two passes. The first splits the input into literal text,
/// comments and tokenised actions, applying `{{-`/`-}}` trimming on the way.
/// The second is a recursive descent over those items that builds the AST and
/// checks everything that can be known before execution: function names and
/// argument counts against `functions`, variable scoping, `break`/`continue`
/// placement and references to named templates.
pub fn parse_template(
    name: &str,
    source: &str,
    functions: &FunctionRegistry,
) -> Result<ParsedTemplate, Error> {
    let items = scan(source)?;
    let mut parser = Parser {
        items: items.into_iter(),
        functions,
        vars: vec!["$".to_string()],
        range_depth: 0,
        nesting: 0,
        definitions: BTreeMap::new(),
        template_calls: Vec::new(),
        used: BTreeSet::new(),
    };

    let (mut root, terminator) = parser.parse_list()?;
    match terminator {
        Terminator::Eof => {}
        Terminator::End(span) => return Err(Error::compile("unexpected {{end}}", Some(span))),
        Terminator::Else { span, .. } => {
            return Err(Error::compile("unexpected {{else}}", Some(span)))
        }
    }

    if let Some(defined) = parser.definitions.remove(name) {
        if !root.is_blank() && !defined.is_blank() {
            return Err(Error::compile(
                format!("multiple definition of template {name:?}"),
                None,
            ));
        }
        if root.is_blank() {
            root = defined;
        }
    }

    for (called, span) in &parser.template_calls {
        if called != name && !parser.definitions.contains_key(called) {
            return Err(Error::compile(
                format!("no such template {called:?}"),
                Some(*span),
            ));
        }
    }

    Ok(ParsedTemplate {
        root,
        definitions: parser.definitions,
        functions: parser.used,
    })
}

#[derive(Debug)]
enum Item {
    Text(TextNode),
    Comment(CommentNode),
    Action { span: Span, tokens: Vec<Token> },
}

fn scan(source: &str) -> Result<Vec<Item>, Error> {
    let bytes = source.as_bytes();
    let mut items = Vec::new();
    let mut cursor = 0usize;

    while cursor < bytes.len() {
        let Some(open) = find_action_start(bytes, cursor) else {
            items.push(Item::Text(TextNode::new(
                Span::new(cursor, source.len()),
                &source[cursor..],
            )));
            break;
        };

        if open > cursor {
            items.push(Item::Text(TextNode::new(
                Span::new(cursor, open),
                &source[cursor..open],
            )));
        }

        let Some(close) = find_action_end(bytes, open + 2) else {
            let remainder = source[open + 2..].trim_start();
            let remainder = remainder.strip_prefix('-').unwrap_or(remainder).trim_start();
            let span = Span::new(open, source.len());
            if remainder.starts_with("/*") {
                return Err(Error::compile_with_span("unclosed comment", span));
            }
            return Err(Error::compile_with_span("unclosed action", span));
        };

        let window = trim_action_delimiters(source, bytes, open, close);
        if window.trim_left {
            trim_trailing_whitespace(&mut items);
        }

        if window.body.starts_with("/*") {
            if !window.body.ends_with("*/") || window.body.len() < 4 {
                return Err(Error::compile_with_span("unclosed comment", window.span));
            }
            items.push(Item::Comment(CommentNode::new(
                window.span,
                window.body[2..window.body.len() - 2].trim(),
            )));
        } else {
            let tokens = lexer::lex_action(window.body, window.body_start)?;
            if tokens.is_empty() {
                return Err(Error::compile_with_span(
                    "missing value for command",
                    window.span,
                ));
            }
            items.push(Item::Action {
                span: window.span,
                tokens,
            });
        }

        cursor = close + 2;
        if window.trim_right {
            cursor = skip_leading_whitespace(bytes, cursor);
        }
    }

    Ok(items)
}

#[derive(Debug, Clone, Copy)]
struct ActionWindow<'a> {
    span: Span,
    body_start: usize,
    body: &'a str,
    trim_left: bool,
    trim_right: bool,
}

/// A trim marker is a `-` directly inside the delimiter followed (or
/// preceded, on the right) by whitespace, so `{{-3}}` is the number -3.
fn trim_action_delimiters<'a>(
    source: &'a str,
    bytes: &[u8],
    open: usize,
    close: usize,
) -> ActionWindow<'a> {
    let mut body_start = open + 2;
    let mut body_end = close;
    let mut trim_left = false;
    let mut trim_right = false;

    if body_start + 1 < close && bytes[body_start] == b'-' && is_space(bytes[body_start + 1]) {
        trim_left = true;
        body_start += 1;
    }
    if body_end >= body_start + 2 && bytes[body_end - 1] == b'-' && is_space(bytes[body_end - 2])
    {
        trim_right = true;
        body_end -= 1;
    }

    let span = Span::new(open, close + 2);
    let raw = &source[body_start..body_end];
    let trimmed_start = raw.trim_start();
    let prefix_len = raw.len() - trimmed_start.len();
    let body = trimmed_start.trim_end();
    body_start += prefix_len;

    ActionWindow {
        span,
        body_start,
        body,
        trim_left,
        trim_right,
    }
}

fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r')
}

fn trim_trailing_whitespace(items: &mut Vec<Item>) {
    if let Some(Item::Text(text)) = items.last_mut() {
        let kept = text.text.trim_end_matches([' ', '\t', '\n', '\r']).len();
        text.text.truncate(kept);
        text.span.end = text.span.start + kept;
        if kept == 0 {
            items.pop();
        }
    }
}

fn skip_leading_whitespace(bytes: &[u8], mut index: usize) -> usize {
    while index < bytes.len() && is_space(bytes[index]) {
        index += 1;
    }
    index
}

fn find_action_start(bytes: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 1 < bytes.len() {
        if bytes[i] == b'{' && bytes[i + 1] == b'{' {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn find_action_end(bytes: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    let mut quote: Option<u8> = None;
    let mut in_comment = false;
    while i + 1 < bytes.len() {
        let current = bytes[i];

        if in_comment {
            if current == b'*' && bytes[i + 1] == b'/' {
                in_comment = false;
                i += 2;
            } else {
                i += 1;
            }
            continue;
        }

        if let Some(open) = quote {
            if current == b'\\' && open != b'`' {
                i += 2;
                continue;
            }
            if current == open {
                quote = None;
            }
            i += 1;
            continue;
        }

        match current {
            b'/' if bytes[i + 1] == b'*' => {
                in_comment = true;
                i += 2;
                continue;
            }
            b'`' | b'"' | b'\'' => {
                quote = Some(current);
                i += 1;
                continue;
            }
            b'}' if bytes[i + 1] == b'}' => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

#[derive(Debug)]
enum Terminator {
    Eof,
    End(Span),
    /// `{{else}}` with whatever follows the keyword (`if ...`, `with ...`).
    Else { span: Span, rest: Vec<Token> },
}

struct Parser<'a> {
    items: std::vec::IntoIter<Item>,
    functions: &'a FunctionRegistry,
    vars: Vec<String>,
    range_depth: usize,
    nesting: usize,
    definitions: BTreeMap<String, Block>,
    template_calls: Vec<(String, Span)>,
    used: BTreeSet<String>,
}

impl<'a> Parser<'a> {
    fn parse_list(&mut self) -> Result<(Block, Terminator), Error> {
        let mut block = Block::default();
        while let Some(item) = self.items.next() {
            match item {
                Item::Text(text) => block.push(Node::Text(text)),
                Item::Comment(comment) => block.push(Node::Comment(comment)),
                Item::Action { span, tokens } => {
                    if let Some(terminator) = self.parse_action(span, tokens, &mut block)? {
                        return Ok((block, terminator));
                    }
                }
            }
        }
        Ok((block, Terminator::Eof))
    }

    fn parse_action(
        &mut self,
        span: Span,
        tokens: Vec<Token>,
        block: &mut Block,
    ) -> Result<Option<Terminator>, Error> {
        let keyword = match tokens.first().map(|token| &token.kind) {
            Some(TokenKind::Keyword(keyword)) => Some(*keyword),
            _ => None,
        };
        let rest = &tokens[1..];

        let node = match keyword {
            Some(Keyword::End) => {
                expect_bare(rest, "end")?;
                return Ok(Some(Terminator::End(span)));
            }
            Some(Keyword::Else) => {
                return Ok(Some(Terminator::Else {
                    span,
                    rest: rest.to_vec(),
                }));
            }
            Some(Keyword::If) => self.parse_if(span, rest.to_vec())?,
            Some(Keyword::With) => self.parse_with(span, rest.to_vec())?,
            Some(Keyword::Range) => self.parse_range(span, rest)?,
            Some(Keyword::Define) => {
                self.parse_define(span, rest)?;
                return Ok(None);
            }
            Some(Keyword::Template) => self.parse_template_call(span, rest)?,
            Some(Keyword::Block) => self.parse_block(span, rest)?,
            Some(Keyword::Break) => {
                expect_bare(rest, "break")?;
                if self.range_depth == 0 {
                    return Err(Error::compile("{{break}} outside {{range}}", Some(span)));
                }
                Node::Break(span)
            }
            Some(Keyword::Continue) => {
                expect_bare(rest, "continue")?;
                if self.range_depth == 0 {
                    return Err(Error::compile(
                        "{{continue}} outside {{range}}",
                        Some(span),
                    ));
                }
                Node::Continue(span)
            }
            _ => {
                let pipeline = self.parse_pipeline(&tokens, "command", span)?;
                Node::Action(ActionNode::new(span, pipeline))
            }
        };
        block.push(node);
        Ok(None)
    }

    /// Parses a control body and requires it to be closed.
    fn parse_body(&mut self, opener: Span) -> Result<(Block, Terminator), Error> {
        self.nesting += 1;
        let result = self.parse_list();
        self.nesting -= 1;
        let (block, terminator) = result?;
        if matches!(terminator, Terminator::Eof) {
            return Err(Error::compile("unexpected EOF", Some(opener)));
        }
        Ok((block, terminator))
    }

    fn parse_else_block(&mut self, opener: Span) -> Result<(Block, Span), Error> {
        let (block, terminator) = self.parse_body(opener)?;
        match terminator {
            Terminator::End(end) => Ok((block, end)),
            Terminator::Else { span, .. } => {
                Err(Error::compile("expected end; found {{else}}", Some(span)))
            }
            Terminator::Eof => Err(Error::compile("unexpected EOF", Some(opener))),
        }
    }

    fn parse_if(&mut self, span: Span, condition: Vec<Token>) -> Result<Node, Error> {
        let (branches, else_block, end) = self.parse_chain(span, condition, Keyword::If)?;
        Ok(Node::If(IfNode::new(span.join(end), branches, else_block)))
    }

    fn parse_with(&mut self, span: Span, condition: Vec<Token>) -> Result<Node, Error> {
        let (branches, else_block, end) = self.parse_chain(span, condition, Keyword::With)?;
        Ok(Node::With(WithNode::new(span.join(end), branches, else_block)))
    }

    /// Shared shape of `if`/`with`: guarded branches chained by `else if` or
    /// `else with`, then an optional plain `else`. Variables declared in a
    /// guard stay visible in the later branches; body variables do not leak.
    fn parse_chain(
        &mut self,
        span: Span,
        condition: Vec<Token>,
        keyword: Keyword,
    ) -> Result<(Vec<Branch>, Option<Block>, Span), Error> {
        let mark = self.vars.len();
        let mut branches = Vec::new();
        let mut guard_span = span;
        let mut guard = condition;

        let result = loop {
            let pipeline = self.parse_pipeline(&guard, keyword.as_str(), guard_span)?;
            let body_mark = self.vars.len();
            let (block, terminator) = self.parse_body(guard_span)?;
            self.vars.truncate(body_mark);
            branches.push(Branch::new(guard_span, pipeline, block));

            match terminator {
                Terminator::End(end) => break (None, end),
                Terminator::Else { span: else_span, rest } => match rest.first() {
                    None => {
                        let (block, end) = self.parse_else_block(else_span)?;
                        break (Some(block), end);
                    }
                    Some(Token {
                        kind: TokenKind::Keyword(next),
                        ..
                    }) if *next == keyword => {
                        guard_span = else_span;
                        guard = rest[1..].to_vec();
                    }
                    Some(token) => {
                        return Err(Error::compile(
                            format!("unexpected {} in else", token.kind.describe()),
                            Some(token.span),
                        ))
                    }
                },
                Terminator::Eof => return Err(Error::compile("unexpected EOF", Some(span))),
            }
        };

        self.vars.truncate(mark);
        Ok((branches, result.0, result.1))
    }

    fn parse_range(&mut self, span: Span, tokens: &[Token]) -> Result<Node, Error> {
        let mark = self.vars.len();
        let pipeline = self.parse_pipeline(tokens, "range", span)?;

        self.range_depth += 1;
        let body = self.parse_body(span);
        self.range_depth -= 1;
        let (body, terminator) = body?;

        let (else_block, end) = match terminator {
            Terminator::End(end) => (None, end),
            Terminator::Else { span: else_span, rest } => {
                if let Some(token) = rest.first() {
                    return Err(Error::compile(
                        format!("unexpected {} in else", token.kind.describe()),
                        Some(token.span),
                    ));
                }
                let (block, end) = self.parse_else_block(else_span)?;
                (Some(block), end)
            }
            Terminator::Eof => return Err(Error::compile("unexpected EOF", Some(span))),
        };

        self.vars.truncate(mark);
        Ok(Node::Range(RangeNode::new(
            span.join(end),
            pipeline,
            body,
            else_block,
        )))
    }

    fn parse_define(&mut self, span: Span, tokens: &[Token]) -> Result<(), Error> {
        if self.nesting > 0 {
            return Err(Error::compile("unexpected <define> in command", Some(span)));
        }
        let name = template_name(tokens, "define clause", span)?;
        if let Some(extra) = tokens.get(1) {
            return Err(Error::compile(
                format!("unexpected {} in define clause", extra.kind.describe()),
                Some(extra.span),
            ));
        }
        let body = self.parse_isolated_body(span)?;
        self.add_definition(name, body, span)
    }

    fn parse_block(&mut self, span: Span, tokens: &[Token]) -> Result<Node, Error> {
        let name = template_name(tokens, "block clause", span)?;
        let pipeline = self.parse_pipeline(&tokens[1..], "block clause", span)?;
        let body = self.parse_isolated_body(span)?;
        self.add_definition(name.clone(), body, span)?;
        self.template_calls.push((name.clone(), span));
        Ok(Node::Template(TemplateNode::new(span, name, Some(pipeline))))
    }

    fn parse_template_call(&mut self, span: Span, tokens: &[Token]) -> Result<Node, Error> {
        let name = template_name(tokens, "template clause", span)?;
        let pipeline = if tokens.len() > 1 {
            Some(self.parse_pipeline(&tokens[1..], "template clause", span)?)
        } else {
            None
        };
        self.template_calls.push((name.clone(), span));
        Ok(Node::Template(TemplateNode::new(span, name, pipeline)))
    }

    /// Bodies of `define` and `block` start with a fresh scope where only `$`
    /// exists and `break` has no enclosing range.
    fn parse_isolated_body(&mut self, span: Span) -> Result<Block, Error> {
        let vars = std::mem::replace(&mut self.vars, vec!["$".to_string()]);
        let range_depth = std::mem::replace(&mut self.range_depth, 0);
        let result = self.parse_else_block(span);
        self.vars = vars;
        self.range_depth = range_depth;
        result.map(|(block, _)| block)
    }

    fn add_definition(&mut self, name: String, body: Block, span: Span) -> Result<(), Error> {
        match self.definitions.get(&name) {
            Some(existing) if !existing.is_blank() && !body.is_blank() => Err(Error::compile(
                format!("multiple definition of template {name:?}"),
                Some(span),
            )),
            Some(_) if body.is_blank() => Ok(()),
            _ => {
                self.definitions.insert(name, body);
                Ok(())
            }
        }
    }

    fn parse_pipeline(
        &mut self,
        tokens: &[Token],
        context: &str,
        span: Span,
    ) -> Result<Pipeline, Error> {
        let mut cursor = Cursor::new(tokens, span);
        let declarations = self.parse_declarations(&mut cursor, context)?;
        let pipeline = self.parse_commands(&mut cursor, context, declarations, false)?;
        if let Some(token) = cursor.peek() {
            return Err(Error::compile(
                format!("unexpected {} in {context}", token.kind.describe()),
                Some(token.span),
            ));
        }

        if let Some(declarations) = &pipeline.declarations {
            match declarations.kind {
                BindingKind::Declare => self.vars.extend(declarations.variables.iter().cloned()),
                BindingKind::Assign => {
                    for variable in &declarations.variables {
                        self.require_variable(variable, span)?;
                    }
                }
            }
        }
        Ok(pipeline)
    }

    fn parse_declarations(
        &mut self,
        cursor: &mut Cursor<'_>,
        context: &str,
    ) -> Result<Option<PipelineDeclarations>, Error> {
        let tokens = cursor.remaining();
        let binding = |token: Option<&Token>| match token.map(|t| &t.kind) {
            Some(TokenKind::Declare) => Some(BindingKind::Declare),
            Some(TokenKind::Assign) => Some(BindingKind::Assign),
            _ => None,
        };
        let variable = |token: Option<&Token>| match token.map(|t| &t.kind) {
            Some(TokenKind::Variable(name)) => Some(name.clone()),
            _ => None,
        };

        if let (Some(name), Some(kind)) = (variable(tokens.first()), binding(tokens.get(1))) {
            cursor.advance(2);
            return Ok(Some(PipelineDeclarations::new(kind, vec![name])));
        }

        let comma = matches!(tokens.get(1).map(|t| &t.kind), Some(TokenKind::Comma));
        if let (Some(first), true, Some(second), Some(kind)) = (
            variable(tokens.first()),
            comma,
            variable(tokens.get(2)),
            binding(tokens.get(3)),
        ) {
            if context != "range" {
                return Err(Error::compile(
                    format!("too many declarations in {context}"),
                    Some(tokens[0].span),
                ));
            }
            cursor.advance(4);
            return Ok(Some(PipelineDeclarations::new(kind, vec![first, second])));
        }

        Ok(None)
    }

    fn parse_commands(
        &mut self,
        cursor: &mut Cursor<'_>,
        context: &str,
        declarations: Option<PipelineDeclarations>,
        nested: bool,
    ) -> Result<Pipeline, Error> {
        let start = cursor.span();
        let mut commands = Vec::new();

        loop {
            let command = self.parse_command(cursor, context, commands.len())?;
            commands.push(command);
            match cursor.peek().map(|token| &token.kind) {
                Some(TokenKind::Pipe) => {
                    cursor.advance(1);
                }
                Some(TokenKind::RightParen) if nested => break,
                Some(TokenKind::RightParen) => {
                    let token = cursor.peek().map_or(start, |t| t.span);
                    return Err(Error::compile("unexpected right paren", Some(token)));
                }
                None if nested => {
                    return Err(Error::compile("unclosed left paren", Some(start)));
                }
                _ => break,
            }
        }

        let span = commands
            .iter()
            .fold(start, |span: Span, command: &Command| span.join(command.span));
        Ok(Pipeline::new(span, declarations, commands))
    }

    fn parse_command(
        &mut self,
        cursor: &mut Cursor<'_>,
        context: &str,
        stage: usize,
    ) -> Result<Command, Error> {
        let mut operands = Vec::new();
        let mut span: Option<Span> = None;
        while let Some(token) = cursor.peek() {
            if matches!(token.kind, TokenKind::Pipe | TokenKind::RightParen) {
                break;
            }
            let (operand, operand_span) = self.parse_operand(cursor)?;
            span = Some(span.map_or(operand_span, |s| s.join(operand_span)));
            operands.push(operand);
        }

        let Some(span) = span else {
            return Err(Error::compile(
                format!("missing value for {context}"),
                Some(cursor.span()),
            ));
        };

        let mut operands = operands.into_iter();
        let target = operands.next().unwrap_or(Expression::Nil);
        let args: Vec<Expression> = operands.collect();
        let piped = usize::from(stage > 0);

        match &target {
            Expression::Identifier(name) => self.check_arity(name, args.len() + piped, span)?,
            Expression::Nil => {
                return Err(Error::compile("nil is not a command", Some(span)));
            }
            other if !args.is_empty() => {
                return Err(Error::compile(
                    format!("can't give argument to non-function {other}"),
                    Some(span),
                ));
            }
            _ if stage > 0 => {
                return Err(Error::compile(
                    format!("non executable command in pipeline stage {}", stage + 1),
                    Some(span),
                ));
            }
            _ => {}
        }

        for arg in &args {
            if let Expression::Identifier(name) = arg {
                self.check_arity(name, 0, span)?;
            }
        }

        Ok(Command::new(span, target, args))
    }

    fn check_arity(&self, name: &str, count: usize, span: Span) -> Result<(), Error> {
        match self.functions.arity(name) {
            Some(arity) if !arity.accepts(count) => Err(Error::compile(
                format!("wrong number of args for {name}: want {arity} got {count}"),
                Some(span),
            )),
            _ => Ok(()),
        }
    }

    fn parse_operand(&mut self, cursor: &mut Cursor<'_>) -> Result<(Expression, Span), Error> {
        let Some(token) = cursor.next() else {
            return Err(Error::compile("missing value for command", Some(cursor.span())));
        };
        let mut span = token.span;

        let base = match &token.kind {
            TokenKind::Identifier(name) => {
                if !self.functions.contains(name) {
                    return Err(Error::compile(
                        format!("function {name:?} not defined"),
                        Some(token.span),
                    ));
                }
                self.used.insert(name.clone());
                Expression::Identifier(name.clone())
            }
            TokenKind::Dot => Expression::Dot,
            TokenKind::Field(first) => {
                let mut fields = vec![first.clone()];
                if let Some(rest) = cursor.take_fields(&mut fields) {
                    span = span.join(rest);
                }
                return Ok((Expression::Field(fields), span));
            }
            TokenKind::Variable(name) => {
                self.require_variable(name, token.span)?;
                let mut fields = Vec::new();
                if let Some(rest) = cursor.take_fields(&mut fields) {
                    span = span.join(rest);
                }
                return Ok((
                    Expression::Variable {
                        name: name.clone(),
                        fields,
                    },
                    span,
                ));
            }
            TokenKind::StringLiteral(text) => Expression::StringLiteral(text.clone()),
            TokenKind::CharLiteral(ch) => Expression::NumberLiteral(Number::from(u32::from(*ch))),
            TokenKind::NumberLiteral(text) => match parse_number(text) {
                Some(number) => Expression::NumberLiteral(number),
                None => {
                    return Err(Error::compile(
                        format!("illegal number syntax: {text:?}"),
                        Some(token.span),
                    ))
                }
            },
            TokenKind::Keyword(Keyword::True) => Expression::BoolLiteral(true),
            TokenKind::Keyword(Keyword::False) => Expression::BoolLiteral(false),
            TokenKind::Keyword(Keyword::Nil) => Expression::Nil,
            TokenKind::LeftParen => {
                let mut inner = cursor.nested(token.span);
                let pipeline =
                    self.parse_commands(&mut inner, "parenthesized pipeline", None, true)?;
                let consumed = inner.index;
                cursor.advance(consumed);
                match cursor.next() {
                    Some(close) if close.kind == TokenKind::RightParen => {
                        span = span.join(close.span);
                    }
                    _ => return Err(Error::compile("unclosed left paren", Some(token.span))),
                }
                Expression::PipelineExpr(Box::new(pipeline))
            }
            other => {
                return Err(Error::compile(
                    format!("unexpected {} in operand", other.describe()),
                    Some(token.span),
                ))
            }
        };

        let mut fields = Vec::new();
        let Some(fields_span) = cursor.take_fields(&mut fields) else {
            return Ok((base, span));
        };
        if !matches!(
            base,
            Expression::Identifier(_) | Expression::PipelineExpr(_)
        ) {
            return Err(Error::compile(
                format!("unexpected . after term {base}"),
                Some(fields_span),
            ));
        }
        Ok((
            Expression::Chain {
                base: Box::new(base),
                fields,
            },
            span.join(fields_span),
        ))
    }

    fn require_variable(&self, name: &str, span: Span) -> Result<(), Error> {
        if self.vars.iter().any(|declared| declared == name) {
            Ok(())
        } else {
            Err(Error::compile(
                format!("undefined variable {name:?}"),
                Some(span),
            ))
        }
    }
}

fn expect_bare(rest: &[Token], keyword: &str) -> Result<(), Error> {
    match rest.first() {
        None => Ok(()),
        Some(token) => Err(Error::compile(
            format!("unexpected {} in {keyword}", token.kind.describe()),
            Some(token.span),
        )),
    }
}

fn template_name(tokens: &[Token], context: &str, span: Span) -> Result<String, Error> {
    match tokens.first() {
        Some(Token {
            kind: TokenKind::StringLiteral(name),
            ..
        }) => Ok(name.clone()),
        Some(token) => Err(Error::compile(
            format!("unexpected {} in {context}", token.kind.describe()),
            Some(token.span),
        )),
        None => Err(Error::compile(
            format!("missing name in {context}"),
            Some(span),
        )),
    }
}

/// Position inside an action's tokens. `fallback` locates errors that occur
/// past the last token.
struct Cursor<'t> {
    tokens: &'t [Token],
    index: usize,
    fallback: Span,
}

impl<'t> Cursor<'t> {
    fn new(tokens: &'t [Token], fallback: Span) -> Self {
        Self {
            tokens,
            index: 0,
            fallback,
        }
    }

    /// Cursor over the tokens after the current position, used for
    /// parenthesised pipelines.
    fn nested(&self, fallback: Span) -> Cursor<'t> {
        Cursor::new(&self.tokens[self.index..], fallback)
    }

    fn remaining(&self) -> &'t [Token] {
        &self.tokens[self.index..]
    }

    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.index)
    }

    fn next(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.index)?;
        self.index += 1;
        Some(token)
    }

    fn advance(&mut self, count: usize) {
        self.index = (self.index + count).min(self.tokens.len());
    }

    fn span(&self) -> Span {
        self.peek().map_or(self.fallback, |token| token.span)
    }

    /// Collects `.field` tokens written directly after the previous token.
    fn take_fields(&mut self, fields: &mut Vec<String>) -> Option<Span> {
        let mut span: Option<Span> = None;
        while let (Some(previous), Some(token)) = (
            self.index.checked_sub(1).and_then(|i| self.tokens.get(i)),
            self.peek(),
        ) {
            let TokenKind::Field(name) = &token.kind else {
                break;
            };
            if previous.span.end != token.span.start {
                break;
            }
            fields.push(name.clone());
            span = Some(span.map_or(token.span, |s| s.join(token.span)));
            self.index += 1;
        }
        span
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Arity;
    use serde_json::Value;

    fn registry() -> FunctionRegistry {
        let mut builder = FunctionRegistry::builder();
        builder
            .register("upper", |_, args| Ok(args[0].clone()))
            .register("default", |_, args| Ok(args[0].clone()))
            .register_with_arity("one", Arity::Exactly(1), |_, _| Ok(Value::Null))
            .register("list", |_, args| Ok(Value::Array(args.to_vec())));
        builder.build()
    }

    fn parse(source: &str) -> Result<ParsedTemplate, Error> {
        parse_template("test", source, &registry())
    }

    fn compile_error(source: &str) -> String {
        parse(source).expect_err("expected a compile error").message().to_string()
    }

    #[test]
    fn trim_action_delimiters_reports_flags() {
        let source = "{{- foo -}}";
        let bytes = source.as_bytes();
        let open = find_action_start(bytes, 0).expect("missing action start");
        let close = find_action_end(bytes, open + 2).expect("missing action end");
        let window = trim_action_delimiters(source, bytes, open, close);

        assert!(window.trim_left);
        assert!(window.trim_right);
        assert_eq!(window.body, "foo");
        assert_eq!(window.body_start, 4);
        assert_eq!(window.span, Span::new(0, source.len()));
    }

    #[test]
    fn dash_without_space_is_a_number() {
        let source = "{{-3}}";
        let bytes = source.as_bytes();
        let window = trim_action_delimiters(source, bytes, 0, 4);
        assert!(!window.trim_left);
        assert_eq!(window.body, "-3");
    }

    #[test]
    fn find_action_end_handles_comment_with_quotes() {
        let input = b"{{/* comment with \" unmatched */}} tail";
        let start = find_action_start(input, 0).expect("missing action start");
        let end = find_action_end(input, start + 2).expect("should find closing braces");
        assert_eq!(&input[end..end + 2], b"}}");
    }

    #[test]
    fn find_action_end_skips_braces_in_strings() {
        let input = br#"{{ "}}" | upper }}"#;
        let end = find_action_end(input, 2).expect("should find closing braces");
        assert_eq!(end, input.len() - 2);
    }

    #[test]
    fn parses_text_and_actions() {
        let parsed = parse("hello {{ .world }}!").unwrap();
        assert_eq!(parsed.root.nodes.len(), 3);
    }

    #[test]
    fn trimming_removes_adjacent_whitespace() {
        let parsed = parse("a \n {{- .x -}} \n b").unwrap();
        let texts: Vec<&str> = parsed
            .root
            .nodes
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[test]
    fn parses_pipeline_into_individual_commands() {
        let parsed = parse("{{ .name | default \"templater\" | upper }}").unwrap();
        let Node::Action(action) = &parsed.root.nodes[0] else {
            panic!("expected action node");
        };
        assert_eq!(action.pipeline.commands.len(), 3);
        assert!(matches!(
            &action.pipeline.commands[0].target,
            Expression::Field(parts) if parts == &["name".to_string()]
        ));
        assert_eq!(action.pipeline.commands[1].args.len(), 1);
        assert_eq!(
            parsed.functions.iter().cloned().collect::<Vec<_>>(),
            vec!["default", "upper"]
        );
    }

    #[test]
    fn parses_if_else_if_chain() {
        let parsed = parse("{{if .a}}A{{else if .b}}B{{else}}C{{end}}").unwrap();
        let Node::If(node) = &parsed.root.nodes[0] else {
            panic!("expected if node");
        };
        assert_eq!(node.branches.len(), 2);
        assert!(node.else_block.is_some());
    }

    #[test]
    fn parses_chains_on_variables_and_parens() {
        let parsed = parse("{{ $x := .a }}{{ $x.b.c }}{{ (list 1).x }}").unwrap();
        let Node::Action(action) = &parsed.root.nodes[1] else {
            panic!("expected action");
        };
        assert!(matches!(
            &action.pipeline.commands[0].target,
            Expression::Variable { name, fields } if name == "$x" && fields.len() == 2
        ));
        let Node::Action(action) = &parsed.root.nodes[2] else {
            panic!("expected action");
        };
        assert!(matches!(
            &action.pipeline.commands[0].target,
            Expression::Chain { .. }
        ));
    }

    #[test]
    fn range_pipeline_captures_declarations() {
        let parsed = parse("{{range $i, $v := .items}}{{$i}}{{end}}").unwrap();
        let Node::Range(range) = &parsed.root.nodes[0] else {
            panic!("expected range");
        };
        let decls = range.pipeline.declarations.as_ref().unwrap();
        assert_eq!(decls.kind, BindingKind::Declare);
        assert_eq!(decls.variables, vec!["$i", "$v"]);
    }

    #[test]
    fn definitions_are_collected() {
        let parsed = parse(r#"{{define "x"}}X{{end}}{{template "x" .}}"#).unwrap();
        assert!(parsed.definitions.contains_key("x"));
    }

    #[test]
    fn reports_compile_errors() {
        assert_eq!(compile_error("{{ nope }}"), "function \"nope\" not defined");
        assert_eq!(compile_error("{{ $y }}"), "undefined variable \"$y\"");
        assert_eq!(compile_error("{{ break }}"), "{{break}} outside {{range}}");
        assert_eq!(compile_error("{{ end }}"), "unexpected {{end}}");
        assert_eq!(compile_error("{{ if .a }}"), "unexpected EOF");
        assert_eq!(compile_error("{{ .a"), "unclosed action");
        assert_eq!(compile_error("{{/* open }}"), "unclosed comment");
        assert_eq!(compile_error("{{ nil }}"), "nil is not a command");
        assert_eq!(
            compile_error("{{ one }}"),
            "wrong number of args for one: want 1 got 0"
        );
        assert_eq!(
            compile_error("{{ .a | .b }}"),
            "non executable command in pipeline stage 2"
        );
        assert_eq!(
            compile_error("{{ .a 1 }}"),
            "can't give argument to non-function .a"
        );
        assert_eq!(compile_error(r#"{{ template "x" }}"#), "no such template \"x\"");
        assert_eq!(compile_error("{{ (upper 1 }}"), "unclosed left paren");
    }

    #[test]
    fn piped_value_counts_towards_arity() {
        assert!(parse("{{ .a | one }}").is_ok());
        assert!(parse("{{ one .a | one }}").is_ok());
        assert!(parse("{{ .a | one 2 }}").is_err());
    }

    #[test]
    fn variables_are_scoped_to_their_control_block() {
        assert!(parse("{{ if .a }}{{ $x := 1 }}{{ end }}{{ $x }}").is_err());
        assert!(parse("{{ with $x := .a }}{{ $x }}{{ else }}{{ $x }}{{ end }}").is_ok());
        assert!(parse(r#"{{ $x := 1 }}{{ define "d" }}{{ $x }}{{ end }}"#).is_err());
    }

    #[test]
    fn define_must_be_top_level() {
        assert_eq!(
            compile_error(r#"{{ if .a }}{{ define "x" }}{{ end }}{{ end }}"#),
            "unexpected <define> in command"
        );
    }

    #[test]
    fn duplicate_definitions_are_rejected() {
        assert!(parse(r#"{{define "x"}}a{{end}}{{define "x"}}b{{end}}"#).is_err());
        assert!(parse(r#"{{define "x"}}a{{end}}{{define "x"}}{{end}}"#).is_ok());
    }
}
