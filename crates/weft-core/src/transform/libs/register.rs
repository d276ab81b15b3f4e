//! Statement-level insertion: after a router, client or logger is
//! constructed, register the companion middleware or hook on it.
//!
//! ```go
//! r := gin.Default()
//! r.Use(weftgin.Middleware())
//! ```

use crate::syntax::walk::{self, Action, Cursor, StmtVisitor, WalkOptions};
use crate::syntax::{build, Expr, ExprId, GoFile, Stmt, StmtId, Tree};
use crate::transform::{Journal, LibraryScope, TransformError};

#[derive(Debug)]
pub struct Registration {
    pub constructors: &'static [&'static str],
    /// Method of the constructed value that takes the middleware.
    pub method: &'static str,
    /// Companion function or value passed to `method`.
    pub handler: &'static str,
    /// `handler` is called (`Middleware()`) rather than passed (`Middleware`).
    pub call: bool,
}

impl Registration {
    fn build(&self, tree: &mut Tree, target: &str, companion: &str) -> StmtId {
        let handler = if self.call {
            build::qualified_call(tree, companion, self.handler, Vec::new())
        } else {
            build::selector(tree, companion, self.handler)
        };
        let call = build::qualified_call(tree, target, self.method, vec![handler]);
        build::expr_stmt(tree, call)
    }

    /// `x.method(companion.handler...)` statements generated by [`Self::build`].
    fn is_generated(&self, tree: &Tree, stmt: StmtId, companion: &str) -> bool {
        let Stmt::Expr(call) = tree.stmt(stmt) else {
            return false;
        };
        let Some((Some(_), method)) = tree.callee(*call) else {
            return false;
        };
        if method != self.method {
            return false;
        }
        match tree.call_args(*call) {
            [arg] => {
                let target = match tree.expr(*arg) {
                    Expr::Call { .. } => tree.callee(*arg).and_then(|(pkg, name)| pkg.map(|p| (p, name))),
                    _ => tree.qualified(*arg),
                };
                target == Some((companion, self.handler))
            }
            _ => false,
        }
    }
}

/// Variable assigned from a constructor call: `v := lib.New(...)`,
/// `v = lib.New(...)` or `var v = lib.New(...)`.
fn constructed_var(tree: &Tree, stmt: StmtId, lib: &LibraryScope<'_>, reg: &Registration) -> Option<String> {
    let (name, value): (&str, ExprId) = match tree.stmt(stmt) {
        Stmt::Assign { lhs, op, rhs } if (*op == ":=" || *op == "=") && lhs.len() == 1 && rhs.len() == 1 => {
            (tree.ident(lhs[0])?, rhs[0])
        }
        Stmt::Var { names, values, .. } if names.len() == 1 && values.len() == 1 => (names[0].as_str(), values[0]),
        _ => return None,
    };
    if name == "_" {
        return None;
    }
    match tree.callee(value) {
        Some((Some(pkg), ctor)) if lib.is_alias(pkg) && reg.constructors.contains(&ctor) => {
            Some(name.to_string())
        }
        _ => None,
    }
}

struct Insert<'a> {
    lib: &'a LibraryScope<'a>,
    reg: &'a Registration,
    companion: &'a str,
    journal: &'a mut Journal,
    changed: bool,
}

impl StmtVisitor for Insert<'_> {
    type Error = TransformError;

    fn visit_stmt(&mut self, tree: &mut Tree, cursor: &Cursor<'_>) -> Result<Action, TransformError> {
        let Some(var) = constructed_var(tree, cursor.stmt, self.lib, self.reg) else {
            return Ok(Action::Keep);
        };
        if cursor
            .next(tree)
            .is_some_and(|next| self.reg.is_generated(tree, next, self.companion))
        {
            return Ok(Action::Keep);
        }
        let stmt = self.reg.build(tree, &var, self.companion);
        self.journal.note(format!(
            "registered {}.{} on {var}",
            self.companion, self.reg.handler
        ));
        self.changed = true;
        Ok(Action::after(vec![stmt]))
    }
}

pub fn inject(
    file: &mut GoFile,
    lib: &LibraryScope<'_>,
    reg: &Registration,
    journal: &mut Journal,
    companion: &str,
) -> Result<bool, TransformError> {
    let mut visitor = Insert {
        lib,
        reg,
        companion,
        journal,
        changed: false,
    };
    walk::walk_file(file, WalkOptions::default(), &mut visitor)?;
    Ok(visitor.changed)
}

struct Strip<'a> {
    reg: &'a Registration,
    companion: &'a str,
    journal: &'a mut Journal,
    changed: bool,
}

impl StmtVisitor for Strip<'_> {
    type Error = TransformError;

    fn visit_stmt(&mut self, tree: &mut Tree, cursor: &Cursor<'_>) -> Result<Action, TransformError> {
        if !self.reg.is_generated(tree, cursor.stmt, self.companion) {
            return Ok(Action::Keep);
        }
        self.journal
            .note(format!("removed {}.{} registration", self.companion, self.reg.handler));
        self.changed = true;
        Ok(Action::Remove)
    }
}

pub fn remove(
    file: &mut GoFile,
    reg: &Registration,
    journal: &mut Journal,
    companion: &str,
) -> Result<bool, TransformError> {
    let mut visitor = Strip {
        reg,
        companion,
        journal,
        changed: false,
    };
    walk::walk_file(file, WalkOptions::default(), &mut visitor)?;
    Ok(visitor.changed)
}
