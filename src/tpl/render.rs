use crate::Result;
use crate::data::value::Value;
use crate::error::TemplateError;
use crate::options::Options;
use crate::tpl::ast::{ElsifClause, Expr, Node, WhenClause};
use crate::tpl::engine::Template;
use crate::tpl::eval::{evaluate, is_truthy};
use crate::tpl::render_context::{Context, Scope};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Resolves `include` / `render` partials by name.
pub trait TemplateSource {
    fn get_template(&self, name: &str) -> Option<Arc<Template>>;
}

/// What a body asks its enclosing loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Normal,
    Break,
    Continue,
}

static EMPTY_ROOT: Value = Value::Nil;

/// Per-call render state. Nothing survives between calls.
pub(crate) struct Renderer<'a> {
    ctx: Context<'a>,
    options: Options,
    source: Option<&'a dyn TemplateSource>,
    out: String,
    depth: usize,
    iterations: usize,
}

impl<'a> Renderer<'a> {
    pub(crate) fn new(
        data: &'a Value,
        options: &Options,
        source: Option<&'a dyn TemplateSource>,
    ) -> Self {
        let mut ctx = Context::new(data);
        ctx.max_range = options.max_iterations.saturating_add(1);
        Self {
            ctx,
            options: *options,
            source,
            out: String::new(),
            depth: 0,
            iterations: 0,
        }
    }

    /// Renders `root` and returns the output. On error the partial output is
    /// dropped.
    pub(crate) fn render(mut self, root: &Node) -> Result<String> {
        self.render_nodes(top_level(root))?;
        Ok(self.out)
    }

    fn render_block(&mut self, nodes: &[Node]) -> Result<Flow> {
        self.depth += 1;
        let result = if self.depth > self.options.max_depth {
            Err(TemplateError::LimitExceeded(format!(
                "render nesting exceeds the maximum depth of {}",
                self.options.max_depth
            )))
        } else {
            self.render_nodes(nodes)
        };
        self.depth -= 1;
        result
    }

    fn render_nodes(&mut self, nodes: &[Node]) -> Result<Flow> {
        for node in nodes {
            let flow = self.render_node(node)?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn render_node(&mut self, node: &Node) -> Result<Flow> {
        match node {
            Node::Text(text) => self.out.push_str(text),
            Node::Output(expr) => {
                let value = evaluate(expr, &self.ctx)?;
                self.out.push_str(&value.render());
            }
            Node::Block(children) => return self.render_block(children),
            Node::If {
                condition,
                then_branch,
                elsifs,
                else_branch,
            } => return self.render_if(condition, then_branch, elsifs, else_branch.as_deref()),
            Node::Case {
                subject,
                whens,
                else_branch,
            } => return self.render_case(subject, whens, else_branch.as_deref()),
            Node::For {
                variable,
                iterable,
                limit,
                offset,
                reversed,
                body,
                else_branch,
            } => {
                let items =
                    self.loop_items(iterable, limit.as_ref(), offset.as_ref(), *reversed)?;
                if items.is_empty() {
                    if let Some(else_branch) = else_branch {
                        return self.render_block(else_branch);
                    }
                } else {
                    self.render_for(variable, items, body)?;
                }
            }
            Node::Break => return Ok(Flow::Break),
            Node::Continue => return Ok(Flow::Continue),
            Node::Assign { name, expr } => {
                let value = evaluate(expr, &self.ctx)?;
                self.ctx.assign(name, value);
            }
            Node::Capture { name, body } => {
                let outer = std::mem::take(&mut self.out);
                let result = self.render_block(body);
                let captured = std::mem::replace(&mut self.out, outer);
                let flow = result?;
                self.ctx.assign(name, Value::Str(captured));
                return Ok(flow);
            }
            Node::Counter { name, step } => {
                let shown = self.ctx.step_counter(name, *step);
                self.out.push_str(&shown.to_string());
            }
            Node::Include {
                template,
                args,
                isolated,
            } => self.render_partial(template, args, *isolated)?,
        }
        Ok(Flow::Normal)
    }

    fn render_if(
        &mut self,
        condition: &Expr,
        then_branch: &[Node],
        elsifs: &[ElsifClause],
        else_branch: Option<&[Node]>,
    ) -> Result<Flow> {
        if is_truthy(condition, &self.ctx)? {
            return self.render_block(then_branch);
        }
        for elsif in elsifs {
            if is_truthy(&elsif.condition, &self.ctx)? {
                return self.render_block(&elsif.body);
            }
        }
        match else_branch {
            Some(body) => self.render_block(body),
            None => Ok(Flow::Normal),
        }
    }

    fn render_case(
        &mut self,
        subject: &Expr,
        whens: &[WhenClause],
        else_branch: Option<&[Node]>,
    ) -> Result<Flow> {
        let subject = evaluate(subject, &self.ctx)?;
        let mut matched = false;
        for when in whens {
            let mut hit = false;
            for value in &when.values {
                if evaluate(value, &self.ctx)?.loose_eq(&subject) {
                    hit = true;
                    break;
                }
            }
            if hit {
                matched = true;
                let flow = self.render_block(&when.body)?;
                if flow != Flow::Normal {
                    return Ok(flow);
                }
            }
        }
        match else_branch {
            Some(body) if !matched => self.render_block(body),
            _ => Ok(Flow::Normal),
        }
    }

    fn loop_items(
        &self,
        iterable: &Expr,
        limit: Option<&Expr>,
        offset: Option<&Expr>,
        reversed: bool,
    ) -> Result<Vec<Value>> {
        let Value::List(mut items) = evaluate(iterable, &self.ctx)? else {
            return Ok(Vec::new());
        };
        if let Some(offset) = offset {
            let n = evaluate(offset, &self.ctx)?.as_i64().unwrap_or(0).max(0) as usize;
            items = items.split_off(n.min(items.len()));
        }
        if let Some(limit) = limit {
            let n = evaluate(limit, &self.ctx)?.as_i64().unwrap_or(0).max(0) as usize;
            items.truncate(n);
        }
        if reversed {
            items.reverse();
        }
        Ok(items)
    }

    fn render_for(&mut self, variable: &str, items: Vec<Value>, body: &[Node]) -> Result<()> {
        let length = items.len();
        let parentloop = self.ctx.lookup("forloop").cloned().unwrap_or_default();
        for (i, item) in items.into_iter().enumerate() {
            self.iterations += 1;
            if self.iterations > self.options.max_iterations {
                return Err(TemplateError::LimitExceeded(format!(
                    "loops exceed the maximum of {} iterations",
                    self.options.max_iterations
                )));
            }

            let mut scope = Scope::new();
            scope.insert(variable.to_string(), item);
            scope.insert("forloop".to_string(), forloop(i, length, &parentloop));
            self.ctx.push_scope(scope);
            let result = self.render_block(body);
            self.ctx.pop_scope();

            if result? == Flow::Break {
                break;
            }
        }
        Ok(())
    }

    fn render_partial(
        &mut self,
        template: &Expr,
        args: &[(String, Expr)],
        isolated: bool,
    ) -> Result<()> {
        let name = evaluate(template, &self.ctx)?.render();
        let partial = self
            .source
            .and_then(|source| source.get_template(&name))
            .ok_or_else(|| TemplateError::TemplateNotFound(name.clone()))?;

        let mut scope = Scope::new();
        for (key, expr) in args {
            scope.insert(key.clone(), evaluate(expr, &self.ctx)?);
        }

        if isolated {
            let mut ctx = Context::new(&EMPTY_ROOT);
            ctx.max_range = self.ctx.max_range;
            ctx.push_scope(scope);
            let outer = std::mem::replace(&mut self.ctx, ctx);
            let result = self.render_block(top_level(partial.root()));
            self.ctx = outer;
            result?;
        } else {
            let pushed = !scope.is_empty();
            if pushed {
                self.ctx.push_scope(scope);
            }
            let result = self.render_block(top_level(partial.root()));
            if pushed {
                self.ctx.pop_scope();
            }
            result?;
        }
        // `break` / `continue` do not escape a partial.
        Ok(())
    }
}

/// The nodes of a parsed root. The root itself does not count as nesting.
fn top_level(root: &Node) -> &[Node] {
    match root {
        Node::Block(children) => children,
        other => std::slice::from_ref(other),
    }
}

fn forloop(i: usize, length: usize, parentloop: &Value) -> Value {
    let mut m = BTreeMap::new();
    m.insert("index".to_string(), Value::Int(i as i64 + 1));
    m.insert("index0".to_string(), Value::Int(i as i64));
    m.insert("rindex".to_string(), Value::Int((length - i) as i64));
    m.insert("rindex0".to_string(), Value::Int((length - i - 1) as i64));
    m.insert("first".to_string(), Value::Bool(i == 0));
    m.insert("last".to_string(), Value::Bool(i + 1 == length));
    m.insert("length".to_string(), Value::Int(length as i64));
    m.insert("parentloop".to_string(), parentloop.clone());
    Value::Map(m)
}

/// Renders a parsed tree against `data` with default options and no partials.
pub fn render(root: &Node, data: &Value) -> Result<String> {
    Renderer::new(data, &Options::default(), None).render(root)
}
