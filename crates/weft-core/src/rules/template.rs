/*!
# Template Transforms

A transform rule renders a Handlebars template for every statement calling
the target function and splices the rendered Go code in place of that
statement.

## Template data

| key | value |
|---|---|
| `original` | the call expression |
| `statement` | the whole statement |
| `receiver` | qualifier of the call, empty for local calls |
| `function` | called function name |
| `package` | the rule's package |
| `args`, `args_text` | argument texts, as a list and comma-joined |
| `arg0`..`argN` | each argument |

The rule's `variables` are added at the top level. A template whose first
line is `{{keep_original}}` keeps the original statement and emits the
rendered code after it. Output is not HTML-escaped.
*/

use handlebars::Handlebars;
use serde_json::{json, Map, Value};

use super::{CallTarget, TransformRule};
use crate::syntax::walk::{self, collect_calls, Action, Cursor, StmtVisitor, WalkOptions};
use crate::syntax::{build, print_expr, print_stmt, ExprId, GoFile, ParseError, Stmt, StmtId, Tree};
use crate::transform::{Journal, TransformError};

const KEEP_ORIGINAL: &str = "{{keep_original}}";

#[derive(thiserror::Error, Debug)]
pub enum TemplateError {
    #[error("template for {function} failed to render: {message}")]
    Render { function: String, message: String },

    #[error("template for {function} rendered code that does not parse: {source}")]
    Parse {
        function: String,
        #[source]
        source: ParseError,
    },
}

/// Split off a leading `{{keep_original}}` line.
fn split_keep_original(template: &str) -> (bool, &str) {
    let trimmed = template.trim_start();
    match trimmed.strip_prefix(KEEP_ORIGINAL) {
        Some(rest) => (true, rest.strip_prefix('\n').unwrap_or(rest)),
        None => (false, template),
    }
}

fn call_data(tree: &Tree, stmt: StmtId, call: ExprId, rule: &TransformRule) -> Value {
    let (receiver, function) = match tree.callee(call) {
        Some((pkg, name)) => (pkg.unwrap_or_default().to_string(), name.to_string()),
        None => (String::new(), String::new()),
    };
    let args: Vec<String> = tree.call_args(call).iter().map(|a| print_expr(tree, *a)).collect();
    let mut data = Map::new();
    for (key, value) in &rule.variables {
        data.insert(key.clone(), Value::String(value.clone()));
    }
    for (i, arg) in args.iter().enumerate() {
        data.insert(format!("arg{i}"), Value::String(arg.clone()));
    }
    let fixed = json!({
        "original": print_expr(tree, call),
        "statement": print_stmt(tree, stmt, 0),
        "receiver": receiver,
        "function": function,
        "package": rule.package,
        "args_text": args.join(", "),
        "args": args,
    });
    if let Value::Object(fixed) = fixed {
        data.extend(fixed);
    }
    Value::Object(data)
}

pub struct Renderer {
    handlebars: Handlebars<'static>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.register_helper("lower", Box::new(lower_helper));
        handlebars.register_helper("upper", Box::new(upper_helper));
        Self { handlebars }
    }

    pub fn render(&self, template: &str, data: &Value, function: &str) -> Result<String, TemplateError> {
        self.handlebars
            .render_template(template, data)
            .map_err(|e| TemplateError::Render {
                function: function.to_string(),
                message: e.to_string(),
            })
    }
}

fn lower_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let param = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&param.to_lowercase())?;
    Ok(())
}

fn upper_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let param = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&param.to_uppercase())?;
    Ok(())
}

struct Transform<'a> {
    rule: &'a TransformRule,
    target: CallTarget<'a>,
    renderer: Renderer,
    journal: &'a mut Journal,
    changed: bool,
}

impl Transform<'_> {
    fn expand(&self, tree: &mut Tree, stmt: StmtId, call: ExprId) -> Result<(bool, Vec<StmtId>), TemplateError> {
        let (keep, template) = split_keep_original(&self.rule.template);
        let data = call_data(tree, stmt, call, self.rule);
        let rendered = self.renderer.render(template, &data, &self.rule.function)?;
        let stmts = build::snippet(tree, &rendered).map_err(|source| TemplateError::Parse {
            function: self.rule.function.clone(),
            source,
        })?;
        Ok((keep, stmts))
    }
}

impl StmtVisitor for Transform<'_> {
    type Error = TransformError;

    fn visit_stmt(&mut self, tree: &mut Tree, cursor: &Cursor<'_>) -> Result<Action, TransformError> {
        if matches!(tree.stmt(cursor.stmt), Stmt::Comment(_) | Stmt::Raw(_)) {
            return Ok(Action::Keep);
        }
        let Some(call) = collect_calls(tree, cursor.stmt)
            .into_iter()
            .find(|call| self.target.matches(tree, *call))
        else {
            return Ok(Action::Keep);
        };
        match self.expand(tree, cursor.stmt, call) {
            Ok((keep, stmts)) => {
                self.journal.note(format!("transformed call to {}", self.rule.function));
                self.changed = true;
                if keep {
                    Ok(Action::after(stmts))
                } else {
                    Ok(Action::replace(stmts))
                }
            }
            Err(e) => {
                self.journal.warn(format!("{e}; original kept"));
                Ok(Action::Keep)
            }
        }
    }
}

pub fn apply(rule: &TransformRule, file: &mut GoFile, journal: &mut Journal) -> Result<bool, TransformError> {
    let target = CallTarget::new(file, &rule.package, &rule.function);
    if !target.is_reachable() {
        return Ok(false);
    }
    let mut transform = Transform {
        rule,
        target,
        renderer: Renderer::new(),
        journal,
        changed: false,
    };
    walk::walk_file(file, WalkOptions::default(), &mut transform)?;
    Ok(transform.changed)
}
