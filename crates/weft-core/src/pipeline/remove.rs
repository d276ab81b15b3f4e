use std::collections::HashSet;

use super::{companion_aliases, initializer_pair, restore_aliases, unblank_used, Outcome, RemoveOptions, Status};
use crate::errtrace;
use crate::syntax::walk::{self, func_lits, header_exprs, Action, Cursor, StmtVisitor, WalkOptions};
use crate::syntax::{print_stmt, ExprId, GoFile, Stmt, Tree};
use crate::transform::{Journal, Registry, TransformContext, TransformError, COMPANION_MODULE, ROOT_IMPORT};

/// Hand-written companion calls, removed when nothing depends on them.
struct Residue<'a> {
    aliases: &'a [String],
    journal: &'a mut Journal,
}

impl Residue<'_> {
    fn is_companion_call(&self, tree: &Tree, call: ExprId) -> bool {
        matches!(tree.callee(call), Some((Some(pkg), _)) if self.aliases.iter().any(|a| a == pkg))
    }
}

impl StmtVisitor for Residue<'_> {
    type Error = TransformError;

    fn visit_stmt(&mut self, tree: &mut Tree, cursor: &Cursor<'_>) -> Result<Action, TransformError> {
        let removable = match tree.stmt(cursor.stmt) {
            Stmt::Expr(call) | Stmt::Defer(call) => {
                self.is_companion_call(tree, *call) && func_lits(tree, cursor.stmt).is_empty()
            }
            _ => false,
        };
        if removable {
            self.journal
                .note(format!("removed `{}`", print_stmt(tree, cursor.stmt, 0)));
            return Ok(Action::Remove);
        }
        let mentions = header_exprs(tree, cursor.stmt)
            .into_iter()
            .any(|e| self.aliases.iter().any(|a| walk::expr_mentions(tree, e, a)));
        if mentions {
            let text = print_stmt(tree, cursor.stmt, 0);
            let first = text.lines().next().unwrap_or_default();
            self.journal.warn(format!("cannot remove instrumentation safely: `{first}`"));
        }
        Ok(Action::Keep)
    }
}

/// Inverse pipeline.
pub struct Remover<'a> {
    registry: &'a Registry,
    options: RemoveOptions,
}

impl<'a> Remover<'a> {
    pub fn new(registry: &'a Registry, options: RemoveOptions) -> Self {
        Self { registry, options }
    }

    /// Strip generated instrumentation from one source file.
    pub fn remove_source(&self, src: &str, ctx: &TransformContext<'_>) -> Outcome {
        if src.trim().is_empty() {
            return Outcome::verbatim(src, Status::Copied, "empty file");
        }
        let mut file = match GoFile::parse(src) {
            Ok(file) => file,
            Err(e) => return Outcome::verbatim(src, Status::Copied, format!("parse error: {e}")),
        };
        if !file.has_import_prefix(COMPANION_MODULE) {
            return Outcome::verbatim(src, Status::Skipped, "not instrumented");
        }
        match self.strip(&mut file) {
            Ok((journal, transformers)) => {
                tracing::info!(file = ?ctx.source_file, transformers = ?transformers, "removed instrumentation");
                Outcome {
                    status: Status::Removed,
                    output: file.print(),
                    transformers,
                    journal,
                    message: None,
                }
            }
            Err((e, journal)) => Outcome::failed(src, e.to_string(), journal),
        }
    }

    fn strip(&self, file: &mut GoFile) -> Result<(Journal, Vec<String>), (TransformError, Journal)> {
        let mut journal = Journal::new();
        let root = file.import_names(ROOT_IMPORT).into_iter().next();

        if let (Some(body), Some(root)) = (file.entry_point(), root.as_deref()) {
            let pair = initializer_pair(file, body, root);
            if !pair.is_empty() {
                journal.note("removed tracer initialization from main");
            }
            for index in pair.into_iter().rev() {
                file.tree.remove_stmt(body, index);
            }
        }

        let mut removed = Vec::new();
        let mut seen = HashSet::new();
        for transformer in self.registry.iter() {
            for companion in transformer.all_companion_paths() {
                let Some(alias) = file.import_names(&companion).into_iter().next() else {
                    continue;
                };
                if !seen.insert(companion.clone()) {
                    continue;
                }
                restore_aliases(file, &transformer.library_paths(), &mut journal);
                match transformer.remove(file, &mut journal, &alias) {
                    Ok(true) => removed.push(transformer.name.to_string()),
                    Ok(false) => {}
                    Err(e) => return Err((e, journal)),
                }
                unblank_used(file, &transformer.library_paths(), &mut journal);
            }
        }

        if let Some(root) = root.as_deref() {
            if let Err(e) = errtrace::remove(file, root, &mut journal) {
                return Err((e, journal));
            }
        }

        if self.options.strict {
            let aliases = companion_aliases(file);
            let mut residue = Residue {
                aliases: &aliases,
                journal: &mut journal,
            };
            if let Err(e) = walk::walk_file(file, WalkOptions::default(), &mut residue) {
                return Err((e, journal));
            }
        }

        let companions: Vec<String> = file
            .imports()
            .filter(|spec| spec.path.starts_with(COMPANION_MODULE))
            .map(|spec| spec.path.clone())
            .collect();
        for path in companions {
            let referenced = file.import_names(&path).iter().any(|name| file.references(name));
            if referenced {
                journal.warn(format!("kept import {path}: still referenced"));
            } else {
                file.remove_import(&path);
            }
        }
        Ok((journal, removed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{InjectOptions, Injector};
    use pretty_assertions::assert_eq;

    fn round_trip(src: &str) -> (String, String) {
        let registry = Registry::builtin();
        let injected = Injector::new(&registry, InjectOptions::default())
            .inject_source(src, &TransformContext::new())
            .output;
        let restored = Remover::new(&registry, RemoveOptions::default())
            .remove_source(&injected, &TransformContext::new())
            .output;
        (injected, restored)
    }

    #[test]
    fn test_round_trip_main_with_error_guard() {
        let src = "package main\n\nimport (\n\t\"os\"\n)\n\nfunc main() {\n\tif err := run(); err != nil {\n\t\tos.Exit(1)\n\t}\n}\n\nfunc run() error {\n\tf, err := os.Open(\"x\")\n\tif err != nil {\n\t\treturn err\n\t}\n\treturn f.Close()\n}\n";
        let (injected, restored) = round_trip(src);
        assert!(injected.contains("\t\ttrace.Error(err)\n\t\treturn err\n"));
        assert_eq!(restored, src);
    }

    #[test]
    fn test_round_trip_keeps_import_alias() {
        let src = "package store\n\nimport (\n\tdb \"database/sql\"\n)\n\nfunc open() (*db.DB, error) {\n\treturn db.Open(\"x\", \"y\")\n}\n";
        let (injected, restored) = round_trip(src);
        assert!(injected.contains("\treturn weftsql.Open(\"x\", \"y\")\n"));
        assert!(injected.contains("\tdb \"database/sql\"\n"));
        assert_eq!(restored, src);

        let src = "package store\n\nimport (\n\tdb \"database/sql\"\n)\n\nfunc open() {\n\tconn, _ := db.Open(\"x\", \"y\")\n\tuse(conn)\n}\n";
        let (injected, restored) = round_trip(src);
        assert!(injected.contains("\t_ \"database/sql\" // weft:as db\n"));
        assert_eq!(restored, src);
    }

    #[test]
    fn test_one_line_main_round_trip() {
        let src = "package main\n\nfunc main() {}\n";
        let (injected, restored) = round_trip(src);
        assert!(injected.contains("func main() { trace.Init(nil); defer trace.Shutdown() }\n"));
        assert_eq!(restored, src);
    }

    #[test]
    fn test_not_instrumented_is_skipped() {
        let registry = Registry::builtin();
        let src = "package util\n";
        let out = Remover::new(&registry, RemoveOptions::default()).remove_source(src, &TransformContext::new());
        assert_eq!(out.status, Status::Skipped);
        assert_eq!(out.output, src);
    }

    #[test]
    fn test_referenced_companion_import_is_kept() {
        let registry = Registry::builtin();
        let src = "package util\n\nimport (\n\t\"github.com/weftapm/weft-go/trace\"\n)\n\nfunc work() {\n\ttrace.Event(\"start\")\n\tspan := trace.Start(\"work\")\n\t_ = span\n}\n";
        let remover = Remover::new(&registry, RemoveOptions::default());
        let out = remover.remove_source(src, &TransformContext::new());
        assert_eq!(out.status, Status::Removed);
        assert_eq!(out.output, src);
        assert_eq!(out.journal.warnings.len(), 1);

        let strict = Remover::new(&registry, RemoveOptions { strict: true });
        let out = strict.remove_source(src, &TransformContext::new());
        assert!(!out.output.contains("trace.Event"));
        assert!(out.output.contains("span := trace.Start(\"work\")"));
        assert!(out.output.contains("github.com/weftapm/weft-go/trace"));
        assert!(out.journal.warnings.iter().any(|w| w.contains("cannot remove")));
    }

    #[test]
    fn test_strict_removes_all_safe_calls() {
        let registry = Registry::builtin();
        let src = "package util\n\nimport (\n\t\"github.com/weftapm/weft-go/trace\"\n)\n\nfunc work() {\n\tdefer trace.Flush()\n\tdo()\n}\n";
        let out = Remover::new(&registry, RemoveOptions { strict: true }).remove_source(src, &TransformContext::new());
        assert_eq!(out.output, "package util\n\nfunc work() {\n\tdo()\n}\n");
    }
}
