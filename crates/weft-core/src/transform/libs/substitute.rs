//! Call substitution: `lib.Func(args)` becomes `companion.Func(args)`,
//! optionally with an inferred context prepended.

use crate::syntax::walk::{self, collect_calls, Action, Cursor, StmtVisitor, WalkOptions};
use crate::syntax::{build, GoFile, Tree};
use crate::transform::context::context_expr;
use crate::transform::{Journal, LibraryScope, TransformError};

#[derive(Debug)]
pub struct Substitution {
    /// Functions of the library that the companion re-exports.
    pub functions: &'static [&'static str],
    /// Companion variants take a leading `context.Context`.
    pub context: bool,
}

struct Substitute<'a> {
    lib: &'a LibraryScope<'a>,
    sub: &'a Substitution,
    companion: &'a str,
    journal: &'a mut Journal,
    changed: bool,
}

impl StmtVisitor for Substitute<'_> {
    type Error = TransformError;

    fn visit_stmt(&mut self, tree: &mut Tree, cursor: &Cursor<'_>) -> Result<Action, TransformError> {
        for call in collect_calls(tree, cursor.stmt) {
            let Some((Some(pkg), name)) = tree.callee(call) else {
                continue;
            };
            if !self.lib.is_alias(pkg) || !self.sub.functions.contains(&name) {
                continue;
            }
            let change = format!("{pkg}.{name} -> {}.{name}", self.companion);
            build::requalify_callee(tree, call, self.companion);
            if self.sub.context {
                let ctx = context_expr(tree, &cursor.func.sig, self.lib.imports);
                build::insert_arg(tree, call, 0, ctx);
            }
            self.journal.note(change);
            self.changed = true;
        }
        Ok(Action::Keep)
    }
}

pub fn inject(
    file: &mut GoFile,
    lib: &LibraryScope<'_>,
    sub: &Substitution,
    journal: &mut Journal,
    companion: &str,
) -> Result<bool, TransformError> {
    let mut visitor = Substitute {
        lib,
        sub,
        companion,
        journal,
        changed: false,
    };
    walk::walk_file(file, WalkOptions::default(), &mut visitor)?;
    Ok(visitor.changed)
}

struct Restore<'a> {
    sub: &'a Substitution,
    companion: &'a str,
    library: String,
    journal: &'a mut Journal,
    changed: bool,
}

impl StmtVisitor for Restore<'_> {
    type Error = TransformError;

    fn visit_stmt(&mut self, tree: &mut Tree, cursor: &Cursor<'_>) -> Result<Action, TransformError> {
        for call in collect_calls(tree, cursor.stmt) {
            let Some((Some(pkg), name)) = tree.callee(call) else {
                continue;
            };
            if pkg != self.companion || !self.sub.functions.contains(&name) {
                continue;
            }
            let change = format!("{pkg}.{name} -> {}.{name}", self.library);
            build::requalify_callee(tree, call, &self.library);
            if self.sub.context {
                build::remove_arg(tree, call, 0);
            }
            self.journal.note(change);
            self.changed = true;
        }
        Ok(Action::Keep)
    }
}

pub fn remove(
    file: &mut GoFile,
    lib: &LibraryScope<'_>,
    sub: &Substitution,
    journal: &mut Journal,
    companion: &str,
) -> Result<bool, TransformError> {
    let mut visitor = Restore {
        sub,
        companion,
        library: lib.primary_alias(),
        journal,
        changed: false,
    };
    walk::walk_file(file, WalkOptions::default(), &mut visitor)?;
    Ok(visitor.changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{libs, TransformContext};
    use pretty_assertions::assert_eq;

    const SRC: &str = "package main\n\nimport (\n\tstore \"database/sql\"\n)\n\nfunc open() (*store.DB, error) {\n\tif err := store.Register(); err != nil {\n\t\treturn nil, err\n\t}\n\treturn store.Open(\"postgres\", dsn)\n}\n";

    #[test]
    fn test_substitution_honors_alias() {
        let sql = libs::builtin().into_iter().find(|t| t.name == "sql").unwrap();
        let mut file = GoFile::parse(SRC).unwrap();
        let mut journal = Journal::new();
        let changed = sql
            .inject(&mut file, &TransformContext::new(), &mut journal, "weftsql")
            .unwrap();
        assert!(changed);
        let out = file.print();
        assert!(out.contains("return weftsql.Open(\"postgres\", dsn)"));
        assert!(out.contains("store.Register()"));
        assert_eq!(journal.changes, vec!["store.Open -> weftsql.Open".to_string()]);

        let mut file = GoFile::parse(&out).unwrap();
        assert!(sql.remove(&mut file, &mut Journal::new(), "weftsql").unwrap());
        assert_eq!(file.print(), SRC);
    }
}
