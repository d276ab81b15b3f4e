//! Function-entry and function-exit statements.

use super::{rule_snippet, wildcard_match, InjectRule};
use crate::syntax::{build, Decl, GoFile, Stmt, StmtId, Tree};
use crate::transform::{Journal, TransformContext, TransformError};

/// Statements after the generated `Init` / deferred `Shutdown` pair.
fn insertion_point(tree: &Tree, stmts: &[StmtId], root: &str) -> usize {
    match stmts {
        [init, shutdown, ..] if build::is_call_stmt(tree, *init, root, "Init").is_some() => {
            match tree.stmt(*shutdown) {
                Stmt::Defer(call) => match tree.callee(*call) {
                    Some((Some(pkg), "Shutdown")) if pkg == root => 2,
                    _ => 1,
                },
                _ => 1,
            }
        }
        [init, ..] if build::is_call_stmt(tree, *init, root, "Init").is_some() => 1,
        _ => 0,
    }
}

pub fn apply(
    rule: &InjectRule,
    file: &mut GoFile,
    ctx: &TransformContext<'_>,
    root: &str,
    journal: &mut Journal,
) -> Result<bool, TransformError> {
    if !wildcard_match(&rule.package, &file.package) || !wildcard_match(&rule.file, ctx.file_name().unwrap_or_default()) {
        return Ok(false);
    }
    let targets: Vec<_> = file
        .decls
        .iter()
        .filter_map(|node| match &node.decl {
            Decl::Func(f) if wildcard_match(&rule.function, &f.name) => f.body.map(|b| (f.name.clone(), b)),
            _ => None,
        })
        .collect();

    let mut changed = false;
    let tree = &mut file.tree;
    for (name, body) in targets {
        let Some(start) = rule_snippet(tree, &rule.start, &format!("inject start into {name}"), journal) else {
            continue;
        };
        let end = if rule.end.trim().is_empty() {
            Vec::new()
        } else {
            let deferred = format!("defer func() {{\n{}\n}}()", rule.end);
            match rule_snippet(tree, &deferred, &format!("inject end into {name}"), journal) {
                Some(stmts) => stmts,
                None => continue,
            }
        };
        if start.is_empty() && end.is_empty() {
            continue;
        }
        let existing = tree.block(body).stmts.clone();
        let at = insertion_point(tree, &existing, root);
        let mut stmts = start;
        stmts.extend(end);
        tree.insert_stmts(body, at, &stmts);
        journal.note(format!("injected rule statements into {name}"));
        changed = true;
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rule(function: &str, start: &str, end: &str) -> InjectRule {
        InjectRule {
            package: "*".into(),
            file: "*.go".into(),
            function: function.into(),
            start: start.into(),
            end: end.into(),
        }
    }

    #[test]
    fn test_start_and_deferred_end() {
        let mut file = GoFile::parse("package api\n\nfunc HandleOrder() {\n\tprocess()\n}\n\nfunc helper() {\n}\n").unwrap();
        let ctx = TransformContext::new().with_source_file("api/orders.go");
        let changed = apply(
            &rule("Handle*", "log.Println(\"enter\")", "log.Println(\"exit\")"),
            &mut file,
            &ctx,
            "trace",
            &mut Journal::new(),
        )
        .unwrap();
        assert!(changed);
        assert_eq!(
            file.print(),
            "package api\n\nfunc HandleOrder() {\n\tlog.Println(\"enter\")\n\tdefer func() {\n\t\tlog.Println(\"exit\")\n\t}()\n\tprocess()\n}\n\nfunc helper() {\n}\n"
        );
    }

    #[test]
    fn test_entry_point_keeps_initializer_first() {
        let mut file = GoFile::parse(
            "package main\n\nfunc main() {\n\ttrace.Init(nil)\n\tdefer trace.Shutdown()\n\trun()\n}\n",
        )
        .unwrap();
        let ctx = TransformContext::new().with_source_file("main.go");
        apply(&rule("main", "setup()", ""), &mut file, &ctx, "trace", &mut Journal::new()).unwrap();
        assert_eq!(
            file.print(),
            "package main\n\nfunc main() {\n\ttrace.Init(nil)\n\tdefer trace.Shutdown()\n\tsetup()\n\trun()\n}\n"
        );
    }

    #[test]
    fn test_unparsable_rule_is_skipped_with_warning() {
        let src = "package api\n\nfunc Handle() {\n}\n";
        let mut file = GoFile::parse(src).unwrap();
        let mut journal = Journal::new();
        let ctx = TransformContext::new().with_source_file("a.go");
        let changed = apply(&rule("Handle", "if {", ""), &mut file, &ctx, "trace", &mut journal).unwrap();
        assert!(!changed);
        assert_eq!(journal.warnings.len(), 1);
        assert_eq!(file.print(), src);
    }
}
