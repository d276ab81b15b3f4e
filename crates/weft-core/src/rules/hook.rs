//! Statements around calls to a function.

use super::{rule_snippet, CallTarget, HookRule};
use crate::syntax::walk::{self, collect_calls, Action, Cursor, StmtVisitor, WalkOptions};
use crate::syntax::{build, GoFile, Stmt, Tree};
use crate::transform::{Journal, TransformError};

struct Hook<'a> {
    rule: &'a HookRule,
    target: CallTarget<'a>,
    journal: &'a mut Journal,
    changed: bool,
}

impl StmtVisitor for Hook<'_> {
    type Error = TransformError;

    fn visit_stmt(&mut self, tree: &mut Tree, cursor: &Cursor<'_>) -> Result<Action, TransformError> {
        if matches!(tree.stmt(cursor.stmt), Stmt::Comment(_) | Stmt::Raw(_)) {
            return Ok(Action::Keep);
        }
        if !collect_calls(tree, cursor.stmt)
            .into_iter()
            .any(|call| self.target.matches(tree, call))
        {
            return Ok(Action::Keep);
        }
        let what = format!("hook on {}", self.rule.function);
        let Some(before) = rule_snippet(tree, &self.rule.before, &what, self.journal) else {
            return Ok(Action::Keep);
        };
        let after = if build::is_terminating(tree, cursor.stmt) {
            Vec::new()
        } else {
            match rule_snippet(tree, &self.rule.after, &what, self.journal) {
                Some(after) => after,
                None => return Ok(Action::Keep),
            }
        };
        if before.is_empty() && after.is_empty() {
            return Ok(Action::Keep);
        }
        self.journal.note(format!("hooked call to {}", self.rule.function));
        self.changed = true;
        Ok(Action::Splice {
            before,
            with: None,
            after,
        })
    }
}

pub fn apply(rule: &HookRule, file: &mut GoFile, journal: &mut Journal) -> Result<bool, TransformError> {
    let target = CallTarget::new(file, &rule.package, &rule.function);
    if !target.is_reachable() {
        return Ok(false);
    }
    let mut hook = Hook {
        rule,
        target,
        journal,
        changed: false,
    };
    walk::walk_file(file, WalkOptions::default(), &mut hook)?;
    Ok(hook.changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hooked(rule: HookRule, src: &str) -> String {
        let mut file = GoFile::parse(src).unwrap();
        apply(&rule, &mut file, &mut Journal::new()).unwrap();
        file.print()
    }

    #[test]
    fn test_external_call_in_nested_block() {
        let out = hooked(
            HookRule {
                package: "database/sql".into(),
                function: "Open".into(),
                before: "start := time.Now()".into(),
                after: "metrics.Observe(start)".into(),
            },
            "package store\n\nimport \"database/sql\"\n\nfunc open() {\n\tif ok {\n\t\tdb, err := sql.Open(\"pg\", dsn)\n\t\tuse(db, err)\n\t}\n}\n",
        );
        assert_eq!(
            out,
            "package store\n\nimport \"database/sql\"\n\nfunc open() {\n\tif ok {\n\t\tstart := time.Now()\n\t\tdb, err := sql.Open(\"pg\", dsn)\n\t\tmetrics.Observe(start)\n\t\tuse(db, err)\n\t}\n}\n"
        );
    }

    #[test]
    fn test_no_after_following_return() {
        let out = hooked(
            HookRule {
                package: String::new(),
                function: "compute".into(),
                before: "begin()".into(),
                after: "end()".into(),
            },
            "package calc\n\nfunc run() int {\n\treturn compute(2)\n}\n",
        );
        assert_eq!(out, "package calc\n\nfunc run() int {\n\tbegin()\n\treturn compute(2)\n}\n");
    }

    #[test]
    fn test_own_package_name_means_local() {
        let out = hooked(
            HookRule {
                package: "calc".into(),
                function: "comp*".into(),
                before: String::new(),
                after: "end()".into(),
            },
            "package calc\n\nfunc run() {\n\tx := compute(2)\n\t_ = x\n}\n",
        );
        assert!(out.contains("\tx := compute(2)\n\tend()\n"));
    }
}
