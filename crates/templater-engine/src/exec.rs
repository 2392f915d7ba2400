// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::io::Write;

use serde_json::Value;
use smallvec::SmallVec;

use crate::ast::{
    BindingKind, Block, Branch, Expression, Node, Pipeline, RangeNode, Span, TemplateNode,
};
use crate::error::Error;
use crate::runtime::{is_truthy, type_name, value_to_string, EvalContext, Function};
use crate::telemetry;
use crate::{MissingKey, Template};

/// Nested `{{template}}` calls beyond this depth abort execution.
const MAX_TEMPLATE_DEPTH: usize = 256;

static NULL: Value = Value::Null;

/// What the walker should do after a node: keep going, or unwind to the
/// enclosing `range`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    Break,
    Continue,
}

type Args = SmallVec<[Value; 4]>;

/// Tree-walking evaluator for one execution of a compiled template.
pub(crate) struct Executor<'t, W: Write + ?Sized> {
    template: &'t Template,
    out: &'t mut W,
    ctx: EvalContext,
    vars: Vec<(String, Value)>,
    depth: usize,
}

impl<'t, W: Write + ?Sized> Executor<'t, W> {
    pub(crate) fn new(template: &'t Template, out: &'t mut W) -> Self {
        Self {
            template,
            out,
            ctx: EvalContext::new(template.functions.clone(), template.name.clone()),
            vars: Vec::new(),
            depth: 0,
        }
    }

    pub(crate) fn run(mut self, data: &Value) -> Result<(), Error> {
        self.vars.push(("$".to_string(), data.clone()));
        let root = &self.template.parsed.root;
        self.walk_block(root, data)?;
        self.out.flush().map_err(Error::write)
    }

    fn walk_block(&mut self, block: &Block, dot: &Value) -> Result<Flow, Error> {
        for node in &block.nodes {
            let flow = self.walk_node(node, dot)?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn walk_node(&mut self, node: &Node, dot: &Value) -> Result<Flow, Error> {
        match node {
            Node::Text(text) => self.write(text.text.as_bytes())?,
            Node::Comment(_) => {}
            Node::Action(action) => {
                let value = self.eval_pipeline(&action.pipeline, dot)?;
                if action.pipeline.declarations.is_none() {
                    self.write(value_to_string(&value).as_bytes())?;
                }
            }
            Node::If(node) => {
                return self.walk_branches(&node.branches, node.else_block.as_ref(), dot, false)
            }
            Node::With(node) => {
                return self.walk_branches(&node.branches, node.else_block.as_ref(), dot, true)
            }
            Node::Range(node) => return self.walk_range(node, dot),
            Node::Template(node) => self.walk_template(node, dot)?,
            Node::Break(_) => return Ok(Flow::Break),
            Node::Continue(_) => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.out.write_all(bytes).map_err(Error::write)
    }

    /// Runs the first branch whose guard is truthy. For `with` the guard value
    /// becomes dot inside the branch.
    fn walk_branches(
        &mut self,
        branches: &[Branch],
        else_block: Option<&Block>,
        dot: &Value,
        rebind_dot: bool,
    ) -> Result<Flow, Error> {
        let mark = self.vars.len();
        let flow = self.select_branch(branches, else_block, dot, rebind_dot);
        self.vars.truncate(mark);
        flow
    }

    fn select_branch(
        &mut self,
        branches: &[Branch],
        else_block: Option<&Block>,
        dot: &Value,
        rebind_dot: bool,
    ) -> Result<Flow, Error> {
        for branch in branches {
            let guard = self.eval_pipeline(&branch.pipeline, dot)?;
            if is_truthy(&guard) {
                return if rebind_dot {
                    self.walk_block(&branch.block, &guard)
                } else {
                    self.walk_block(&branch.block, dot)
                };
            }
        }
        match else_block {
            Some(block) => self.walk_block(block, dot),
            None => Ok(Flow::Normal),
        }
    }

    fn walk_range(&mut self, node: &RangeNode, dot: &Value) -> Result<Flow, Error> {
        let mark = self.vars.len();
        let value = self.eval_commands(&node.pipeline, dot)?;
        let variables = node
            .pipeline
            .declarations
            .as_ref()
            .map_or(&[][..], |decl| decl.variables.as_slice());

        let mut iterated = false;
        let result = match &value {
            Value::Array(items) => {
                iterated = !items.is_empty();
                self.iterate(
                    node,
                    variables,
                    mark,
                    items
                        .iter()
                        .enumerate()
                        .map(|(idx, item)| (Value::from(idx), item)),
                )
            }
            Value::Object(map) => {
                iterated = !map.is_empty();
                self.iterate(
                    node,
                    variables,
                    mark,
                    map.iter().map(|(key, item)| (Value::String(key.clone()), item)),
                )
            }
            Value::Number(n) if n.is_i64() || n.is_u64() => {
                if variables.len() > 1 {
                    return Err(Error::execute(
                        format!("can't use {n} to iterate over more than one variable"),
                        Some(node.span),
                    ));
                }
                let count = n.as_i64().unwrap_or(i64::MAX).max(0);
                iterated = count > 0;
                self.iterate_count(node, variables, mark, count)
            }
            Value::Null => Ok(()),
            other => Err(Error::execute(
                format!("range can't iterate over {}", value_to_string(other)),
                Some(node.span),
            )),
        };
        self.vars.truncate(mark);
        result?;

        match &node.else_block {
            Some(block) if !iterated => {
                let flow = self.walk_block(block, dot);
                self.vars.truncate(mark);
                flow
            }
            _ => Ok(Flow::Normal),
        }
    }

    fn iterate<'v>(
        &mut self,
        node: &RangeNode,
        variables: &[String],
        mark: usize,
        entries: impl Iterator<Item = (Value, &'v Value)>,
    ) -> Result<(), Error> {
        for (key, element) in entries {
            self.vars.truncate(mark);
            match variables {
                [] => {}
                [element_var] => self.vars.push((element_var.clone(), element.clone())),
                [key_var, element_var, ..] => {
                    self.vars.push((key_var.clone(), key));
                    self.vars.push((element_var.clone(), element.clone()));
                }
            }
            if self.walk_block(&node.body, element)? == Flow::Break {
                break;
            }
        }
        Ok(())
    }

    fn iterate_count(
        &mut self,
        node: &RangeNode,
        variables: &[String],
        mark: usize,
        count: i64,
    ) -> Result<(), Error> {
        for idx in 0..count {
            let element = Value::from(idx);
            self.vars.truncate(mark);
            if let [element_var, ..] = variables {
                self.vars.push((element_var.clone(), element.clone()));
            }
            if self.walk_block(&node.body, &element)? == Flow::Break {
                break;
            }
        }
        Ok(())
    }

    fn walk_template(&mut self, node: &TemplateNode, dot: &Value) -> Result<(), Error> {
        let body = if node.name == self.template.name {
            &self.template.parsed.root
        } else {
            self.template
                .parsed
                .definitions
                .get(&node.name)
                .ok_or_else(|| {
                    Error::execute(format!("no such template {:?}", node.name), Some(node.span))
                })?
        };
        if self.depth >= MAX_TEMPLATE_DEPTH {
            return Err(Error::execute(
                format!("exceeded maximum template depth ({MAX_TEMPLATE_DEPTH})"),
                Some(node.span),
            ));
        }

        let data = match &node.pipeline {
            Some(pipeline) => self.eval_pipeline(pipeline, dot)?,
            None => Value::Null,
        };

        let saved_vars = std::mem::replace(&mut self.vars, vec![("$".to_string(), data.clone())]);
        let saved_name = self.ctx.replace_template_name(node.name.clone());
        self.depth += 1;
        let result = self.walk_block(body, &data);
        self.depth -= 1;
        self.ctx.replace_template_name(saved_name);
        self.vars = saved_vars;
        result.map(|_| ())
    }

    /// Evaluates a pipeline and applies its declarations or assignments.
    fn eval_pipeline(&mut self, pipeline: &Pipeline, dot: &Value) -> Result<Value, Error> {
        let value = self.eval_commands(pipeline, dot)?;
        if let Some(declarations) = &pipeline.declarations {
            for variable in &declarations.variables {
                match declarations.kind {
                    BindingKind::Declare => {
                        self.vars.push((variable.clone(), value.clone()));
                    }
                    BindingKind::Assign => {
                        self.assign(variable, value.clone(), pipeline.span)?;
                    }
                }
            }
        }
        Ok(value)
    }

    fn eval_commands(&mut self, pipeline: &Pipeline, dot: &Value) -> Result<Value, Error> {
        let mut value: Option<Value> = None;
        for command in &pipeline.commands {
            let piped = value.take();
            value = Some(match &command.target {
                Expression::Identifier(name) => {
                    self.call_function(name, &command.args, dot, piped, command.span)?
                }
                target => self.eval_arg(target, dot, command.span)?,
            });
        }
        Ok(value.unwrap_or(Value::Null))
    }

    fn call_function(
        &mut self,
        name: &str,
        exprs: &[Expression],
        dot: &Value,
        piped: Option<Value>,
        span: Span,
    ) -> Result<Value, Error> {
        let func = self.ctx.function(name).ok_or_else(|| {
            Error::execute(format!("function {name:?} not defined"), Some(span))
        })?;

        // `and` and `or` stop evaluating once the outcome is known.
        let stop_when = match name {
            "and" => Some(false),
            "or" => Some(true),
            _ => None,
        };

        let mut args = Args::new();
        for expr in exprs {
            let value = self.eval_arg(expr, dot, span)?;
            let stop = stop_when.is_some_and(|wanted| is_truthy(&value) == wanted);
            args.push(value);
            if stop {
                return self.invoke(name, &*func, &args, span);
            }
        }
        if let Some(value) = piped {
            args.push(value);
        }
        self.invoke(name, &*func, &args, span)
    }

    fn invoke(
        &mut self,
        name: &str,
        func: &Function,
        args: &[Value],
        span: Span,
    ) -> Result<Value, Error> {
        let result = func(&mut self.ctx, args);
        telemetry::record_function_call(name, result.is_ok());
        result.map_err(|err| err.calling(name, span))
    }

    fn eval_arg(&mut self, expr: &Expression, dot: &Value, span: Span) -> Result<Value, Error> {
        match expr {
            Expression::Identifier(name) => self.call_function(name, &[], dot, None, span),
            Expression::Dot => Ok(dot.clone()),
            Expression::Field(fields) => self.field_chain(dot, fields, span),
            Expression::Variable { name, fields } => {
                let value = self.variable(name, span)?;
                self.field_chain(value, fields, span)
            }
            Expression::Chain { base, fields } => {
                let base = self.eval_arg(base, dot, span)?;
                self.field_chain(&base, fields, span)
            }
            Expression::PipelineExpr(pipeline) => self.eval_pipeline(pipeline, dot),
            Expression::StringLiteral(text) => Ok(Value::String(text.clone())),
            Expression::NumberLiteral(number) => Ok(Value::Number(number.clone())),
            Expression::BoolLiteral(flag) => Ok(Value::Bool(*flag)),
            Expression::Nil => Ok(Value::Null),
        }
    }

    fn field_chain(&self, base: &Value, fields: &[String], span: Span) -> Result<Value, Error> {
        let mut current = base;
        for field in fields {
            current = match current {
                Value::Object(map) => match map.get(field) {
                    Some(value) => value,
                    None => match self.template.missing_key {
                        MissingKey::Zero => &NULL,
                        MissingKey::Error => {
                            return Err(Error::execute(
                                format!("map has no entry for key {field:?}"),
                                Some(span),
                            ))
                        }
                    },
                },
                Value::Null => {
                    return Err(Error::execute(
                        format!("nil pointer evaluating interface {{}}.{field}"),
                        Some(span),
                    ))
                }
                other => {
                    return Err(Error::execute(
                        format!("can't evaluate field {field} in type {}", type_name(other)),
                        Some(span),
                    ))
                }
            };
        }
        Ok(current.clone())
    }

    fn variable(&self, name: &str, span: Span) -> Result<&Value, Error> {
        self.vars
            .iter()
            .rev()
            .find(|(declared, _)| declared == name)
            .map(|(_, value)| value)
            .ok_or_else(|| Error::execute(format!("undefined variable: {name}"), Some(span)))
    }

    fn assign(&mut self, name: &str, value: Value, span: Span) -> Result<(), Error> {
        match self.vars.iter_mut().rev().find(|(declared, _)| declared == name) {
            Some(slot) => {
                slot.1 = value;
                Ok(())
            }
            None => Err(Error::execute(
                format!("undefined variable: {name}"),
                Some(span),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::runtime::{Arity, FunctionRegistry};
    use crate::{Error, MissingKey, Template};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn registry() -> FunctionRegistry {
        let mut builder = FunctionRegistry::builder();
        builder
            .register("upper", |_, args| {
                Ok(Value::String(
                    args[0].as_str().unwrap_or_default().to_uppercase(),
                ))
            })
            .register("and", |_, args| {
                Ok(args
                    .iter()
                    .find(|v| !crate::is_truthy(v))
                    .or(args.last())
                    .cloned()
                    .unwrap_or(Value::Null))
            })
            .register_with_arity("boom", Arity::Exactly(0), |_, _| {
                Err(Error::execute("exploded", None))
            })
            .register("eq", |_, args| Ok(Value::Bool(args[0] == args[1])))
            .register("list", |_, args| Ok(Value::Array(args.to_vec())));
        builder.build()
    }

    fn render(source: &str, data: Value) -> Result<String, Error> {
        Template::compile("test", source, registry())?.render(&data)
    }

    #[test]
    fn renders_fields_and_pipelines() {
        let data = json!({"name": "ab", "nested": {"key": 1}});
        let out = render("{{ .name | upper }}-{{ .nested.key }}", data);
        assert_eq!(out.unwrap(), "AB-1");
    }

    #[test]
    fn missing_keys_render_empty_by_default() {
        assert_eq!(render("[{{ .missing }}]", json!({})).unwrap(), "[]");
    }

    #[test]
    fn missing_key_error_mode() {
        let template = Template::compile("strict", "{{ .missing }}", registry())
            .unwrap()
            .with_missing_key(MissingKey::Error);
        let err = template.render(&json!({})).unwrap_err();
        assert!(err.to_string().contains("map has no entry for key \"missing\""));
    }

    #[test]
    fn field_on_null_mid_chain_is_an_error() {
        let err = render("{{ .a.b }}", json!({})).unwrap_err();
        assert!(err.to_string().contains("nil pointer evaluating interface {}.b"));
        let err = render("{{ .a.b }}", json!({"a": "text"})).unwrap_err();
        assert!(err.to_string().contains("can't evaluate field b in type string"));
    }

    #[test]
    fn range_over_sequences_maps_and_integers() {
        let data = json!({"items": ["a", "b"], "map": {"y": 2, "x": 1}});
        assert_eq!(
            render("{{ range $i, $v := .items }}{{ $i }}={{ $v }};{{ end }}", data.clone())
                .unwrap(),
            "0=a;1=b;"
        );
        assert_eq!(
            render("{{ range $k, $v := .map }}{{ $k }}{{ $v }}{{ end }}", data.clone()).unwrap(),
            "x1y2"
        );
        assert_eq!(render("{{ range 3 }}{{ . }}{{ end }}", data).unwrap(), "012");
    }

    #[test]
    fn range_else_break_and_continue() {
        let data = json!({"items": [1, 2, 3, 4], "empty": []});
        assert_eq!(
            render("{{ range .empty }}x{{ else }}none{{ end }}", data.clone()).unwrap(),
            "none"
        );
        let tpl = "{{ range .items }}{{ if eq . 2 }}{{ continue }}{{ end }}\
                   {{ if eq . 4 }}{{ break }}{{ end }}{{ . }}{{ end }}";
        assert_eq!(render(tpl, data).unwrap(), "13");
    }

    #[test]
    fn range_over_string_is_an_error() {
        let err = render("{{ range .s }}{{ end }}", json!({"s": "abc"})).unwrap_err();
        assert!(err.to_string().contains("range can't iterate over abc"));
    }

    #[test]
    fn variables_and_assignment() {
        let out = render(
            "{{ $x := 1 }}{{ range .items }}{{ $x = . }}{{ end }}{{ $x }}",
            json!({"items": [5, 6]}),
        );
        assert_eq!(out.unwrap(), "6");
    }

    #[test]
    fn with_rebinds_dot_and_else_with() {
        let tpl = "{{ with .a }}{{ . }}{{ else with .b }}b={{ . }}{{ else }}none{{ end }}";
        assert_eq!(render(tpl, json!({"a": "x"})).unwrap(), "x");
        assert_eq!(render(tpl, json!({"b": 2})).unwrap(), "b=2");
        assert_eq!(render(tpl, json!({})).unwrap(), "none");
    }

    #[test]
    fn templates_and_blocks() {
        let tpl = r#"{{ define "greet" }}hi {{ . }}{{ end }}{{ template "greet" .name }}|{{ block "tail" . }}{{ .n }}{{ end }}"#;
        assert_eq!(render(tpl, json!({"name": "bo", "n": 3})).unwrap(), "hi bo|3");
    }

    #[test]
    fn dollar_is_root_inside_range_and_new_dot_in_templates() {
        let tpl = r#"{{ define "t" }}{{ $ }}{{ end }}{{ range .items }}{{ $.top }}{{ end }}{{ template "t" 7 }}"#;
        assert_eq!(render(tpl, json!({"items": [1, 2], "top": "T"})).unwrap(), "TT7");
    }

    #[test]
    fn recursive_templates_hit_the_depth_limit() {
        let tpl = r#"{{ define "loop" }}{{ template "loop" . }}{{ end }}{{ template "loop" . }}"#;
        let err = render(tpl, json!({})).unwrap_err();
        assert!(err.to_string().contains("exceeded maximum template depth"));
    }

    #[test]
    fn function_errors_name_the_function() {
        let err = render("line1\n{{ boom }}", json!({})).unwrap_err();
        assert_eq!(err.to_string(), "template: test:2:4: error calling boom: exploded");
    }

    #[test]
    fn and_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut builder = FunctionRegistry::builder();
        builder.extend(&registry());
        builder.register("tick", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Bool(true))
        });
        let template = Template::compile("sc", "{{ and false tick }}", builder.build()).unwrap();
        assert_eq!(template.render(&json!({})).unwrap(), "false");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn output_already_written_stays_written() {
        let template = Template::compile("partial", "before{{ boom }}after", registry()).unwrap();
        let mut sink = Vec::new();
        assert!(template.execute(&json!({}), &mut sink).is_err());
        assert_eq!(sink, b"before");
    }

    #[test]
    fn chains_on_parenthesised_pipelines() {
        let out = render("{{ (list .m).x }}", json!({"m": 1}));
        assert!(out.unwrap_err().to_string().contains("can't evaluate field x"));
    }
}
