//! Call retargeting: `alias.F(...)` becomes `Q.G(...)`.

use super::{wildcard_match, ReplaceRule};
use crate::syntax::walk::{self, collect_calls, Action, Cursor, StmtVisitor, WalkOptions};
use crate::syntax::{Expr, GoFile, Tree};
use crate::transform::{Journal, TransformError};

struct Retarget<'a> {
    aliases: Vec<String>,
    function: &'a str,
    qualifier: &'a str,
    /// `None` keeps the matched name.
    name: Option<&'a str>,
    journal: &'a mut Journal,
    changed: bool,
}

impl StmtVisitor for Retarget<'_> {
    type Error = TransformError;

    fn visit_stmt(&mut self, tree: &mut Tree, cursor: &Cursor<'_>) -> Result<Action, TransformError> {
        for call in collect_calls(tree, cursor.stmt) {
            let Some((Some(pkg), name)) = tree.callee(call) else {
                continue;
            };
            if !self.aliases.iter().any(|a| a == pkg) || !wildcard_match(self.function, name) {
                continue;
            }
            let old = format!("{pkg}.{name}");
            let new_name = self.name.unwrap_or(name).to_string();
            let Expr::Call { fun, .. } = tree.expr(call) else {
                continue;
            };
            let fun = *fun;
            let Expr::Selector { x, sel, .. } = tree.expr_mut(fun) else {
                continue;
            };
            let x = *x;
            *sel = new_name.clone();
            *tree.expr_mut(x) = Expr::Ident(self.qualifier.to_string());
            self.journal
                .note(format!("replaced {old} with {}.{new_name}", self.qualifier));
            self.changed = true;
        }
        Ok(Action::Keep)
    }
}

pub fn apply(rule: &ReplaceRule, file: &mut GoFile, journal: &mut Journal) -> Result<bool, TransformError> {
    let aliases: Vec<String> = file
        .import_table()
        .names_of(&rule.package)
        .into_iter()
        .map(str::to_string)
        .collect();
    if aliases.is_empty() {
        return Ok(false);
    }
    let Some((qualifier, name)) = rule.with.rsplit_once('.') else {
        journal.warn(format!("replace rule for {}: `with` must be Q.G, got `{}`", rule.package, rule.with));
        return Ok(false);
    };
    let mut visitor = Retarget {
        aliases: aliases.clone(),
        function: &rule.function,
        qualifier,
        name: (name != "*").then_some(name),
        journal,
        changed: false,
    };
    walk::walk_file(file, WalkOptions::default(), &mut visitor)?;
    if !visitor.changed {
        return Ok(false);
    }

    for entry in &rule.imports {
        let parts: Vec<&str> = entry.split_whitespace().collect();
        let (alias, path) = match parts.as_slice() {
            [path] => (None, *path),
            [alias, path] => (Some(*alias), *path),
            _ => {
                journal.warn(format!("replace rule import `{entry}` is not `path` or `alias path`"));
                continue;
            }
        };
        let path = path.trim_matches('"');
        if !file.has_import(path) {
            file.add_import(alias, path);
            journal.note(format!("imported {path}"));
        }
    }
    // The replaced package may now be unused.
    for alias in aliases {
        if !file.references(&alias) {
            file.set_import_name(&rule.package, Some("_"));
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rule(function: &str, with: &str) -> ReplaceRule {
        ReplaceRule {
            package: "fmt".into(),
            function: function.into(),
            with: with.into(),
            imports: vec!["log".into()],
        }
    }

    #[test]
    fn test_replaces_only_matching_functions() {
        let mut file = GoFile::parse(
            "package main\n\nimport (\n\t\"fmt\"\n)\n\nfunc main() {\n\tfmt.Println(\"a\")\n\ts := fmt.Sprintf(\"%d\", 1)\n\tfmt.Println(s)\n}\n",
        )
        .unwrap();
        let mut journal = Journal::new();
        assert!(apply(&rule("Println", "log.Println"), &mut file, &mut journal).unwrap());
        assert_eq!(
            file.print(),
            "package main\n\nimport (\n\t\"fmt\"\n\t\"log\"\n)\n\nfunc main() {\n\tlog.Println(\"a\")\n\ts := fmt.Sprintf(\"%d\", 1)\n\tlog.Println(s)\n}\n"
        );
        assert_eq!(journal.changes.iter().filter(|c| c.starts_with("replaced")).count(), 2);
    }

    #[test]
    fn test_star_keeps_name_and_blanks_unused_import() {
        let mut file = GoFile::parse(
            "package main\n\nimport (\n\t\"fmt\"\n)\n\nfunc main() {\n\tfmt.Println(\"a\")\n}\n",
        )
        .unwrap();
        assert!(apply(&rule("Print*", "log.*"), &mut file, &mut Journal::new()).unwrap());
        let out = file.print();
        assert!(out.contains("\tlog.Println(\"a\")\n"));
        assert!(out.contains("\t_ \"fmt\"\n"));
    }

    #[test]
    fn test_absent_package_is_untouched() {
        let src = "package main\n\nfunc main() {\n\tfmt.Println(\"a\")\n}\n";
        let mut file = GoFile::parse(src).unwrap();
        assert!(!apply(&rule("Println", "log.Println"), &mut file, &mut Journal::new()).unwrap());
        assert_eq!(file.print(), src);
    }
}
