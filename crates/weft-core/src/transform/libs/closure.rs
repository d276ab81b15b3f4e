/*!
# Closure Wrapping

Factory calls are wrapped in an immediately invoked closure with the
factory's own result types, so the companion can observe the constructed
value without changing how the caller binds it:

```go
producer, err := func() (sarama.SyncProducer, error) {
	weftV, weftErr := sarama.NewSyncProducer(brokers, cfg)
	weftsarama.Observe("NewSyncProducer", weftV, weftErr)
	return weftV, weftErr
}()
```

Result types come from the subject module's copy of the library when it can
be loaded, otherwise from [`fallback_results`].
*/

use crate::semantic::{SemanticLoadError, TypeRef};
use crate::syntax::walk::{self, collect_calls, header_exprs, subexprs, Action, Cursor, StmtVisitor, WalkOptions};
use crate::syntax::{build, Expr, ExprId, GoFile, Stmt, StmtId, Tree};
use crate::transform::{Journal, LibraryScope, SemanticRequest, TransformContext, TransformError};

const VALUE: &str = "weftV";
const ERR: &str = "weftErr";
const PLACEHOLDER: &str = "weftCall";

#[derive(Debug)]
pub struct ClosureWrap {
    pub factories: &'static [&'static str],
    /// Companion function receiving `(name, value, err)`.
    pub observer: &'static str,
}

/// Semantic hook: the factory's declared results in the subject module.
pub fn resolve_results(req: &SemanticRequest<'_>) -> Result<Vec<TypeRef>, SemanticLoadError> {
    req.cache.module(req.dir)?.function_results(req.library, req.function)
}

/// `NewSyncProducer` -> `(SyncProducer, error)`; `...FromClient` variants
/// construct the same interface.
pub fn fallback_results(function: &str) -> Vec<TypeRef> {
    let base = function.strip_prefix("New").unwrap_or(function);
    let base = base.strip_suffix("FromClient").unwrap_or(base);
    vec![TypeRef::named(base), TypeRef::Builtin("error".to_string())]
}

#[derive(Debug, Clone, PartialEq)]
enum Shape {
    ErrorOnly,
    /// `(T, error)` with `T` spelled for the file.
    Pair(String),
}

fn classify(results: &[TypeRef], alias: &str, lib: &LibraryScope<'_>) -> Option<Shape> {
    match results {
        [err] if err.is_error() => Some(Shape::ErrorOnly),
        [value, err] if err.is_error() => value.render(alias, lib.imports).map(Shape::Pair),
        _ => None,
    }
}

fn closure_text(shape: &Shape, function: &str, companion: &str, observer: &str) -> String {
    match shape {
        Shape::ErrorOnly => format!(
            "func() error {{\n\t{ERR} := {PLACEHOLDER}\n\t{companion}.{observer}(\"{function}\", nil, {ERR})\n\treturn {ERR}\n}}()"
        ),
        Shape::Pair(ty) => format!(
            "func() ({ty}, error) {{\n\t{VALUE}, {ERR} := {PLACEHOLDER}\n\t{companion}.{observer}(\"{function}\", {VALUE}, {ERR})\n\treturn {VALUE}, {ERR}\n}}()"
        ),
    }
}

/// The binding statement inside a generated closure.
fn is_generated_binding(tree: &Tree, stmt: StmtId) -> bool {
    match tree.stmt(stmt) {
        Stmt::Assign { lhs, op: ":=", rhs } if rhs.len() == 1 => {
            let names: Vec<_> = lhs.iter().map(|x| tree.ident(*x)).collect();
            names == [Some(VALUE), Some(ERR)] || names == [Some(ERR)]
        }
        _ => false,
    }
}

/// The factory call inside a generated closure expression.
fn wrapped_call(tree: &Tree, id: ExprId, companion: &str, observer: &str) -> Option<ExprId> {
    let Expr::Call { fun, args, .. } = tree.expr(id) else {
        return None;
    };
    if !args.is_empty() {
        return None;
    }
    let Expr::FuncLit { body, .. } = tree.expr(*fun) else {
        return None;
    };
    let stmts = &tree.block(*body).stmts;
    if stmts.len() != 3 || !is_generated_binding(tree, stmts[0]) {
        return None;
    }
    build::is_call_stmt(tree, stmts[1], companion, observer)?;
    match tree.stmt(stmts[0]) {
        Stmt::Assign { rhs, .. } => Some(rhs[0]),
        _ => None,
    }
}

struct Wrap<'a> {
    lib: &'a LibraryScope<'a>,
    wrap: &'a ClosureWrap,
    ctx: &'a TransformContext<'a>,
    companion: &'a str,
    journal: &'a mut Journal,
    changed: bool,
}

impl Wrap<'_> {
    fn results(&mut self, pkg: &str, function: &str) -> Vec<TypeRef> {
        let hook = self.lib.transformer.semantic;
        let library = self.lib.imports.path_of(pkg);
        let (Some(hook), Some(cache), Some(dir), Some(library)) =
            (hook, self.ctx.semantic, self.ctx.source_dir(), library)
        else {
            return fallback_results(function);
        };
        let request = SemanticRequest {
            cache,
            dir,
            library,
            function,
        };
        match hook(&request) {
            Ok(results) => results,
            Err(e) => {
                self.journal
                    .warn(format!("{pkg}.{function}: semantic load failed ({e}), using known signature"));
                fallback_results(function)
            }
        }
    }
}

impl StmtVisitor for Wrap<'_> {
    type Error = TransformError;

    fn visit_stmt(&mut self, tree: &mut Tree, cursor: &Cursor<'_>) -> Result<Action, TransformError> {
        if cursor.func.is_literal && is_generated_binding(tree, cursor.stmt) {
            return Ok(Action::Keep);
        }
        for call in collect_calls(tree, cursor.stmt) {
            let Some((Some(pkg), name)) = tree.callee(call) else {
                continue;
            };
            if !self.lib.is_alias(pkg) || !self.wrap.factories.contains(&name) {
                continue;
            }
            let (pkg, name) = (pkg.to_string(), name.to_string());
            let results = self.results(&pkg, &name);
            let shape = match classify(&results, &pkg, self.lib) {
                Some(shape) => shape,
                None => {
                    tracing::debug!(function = %name, ?results, "unusable signature, using known one");
                    match classify(&fallback_results(&name), &pkg, self.lib) {
                        Some(shape) => shape,
                        None => continue,
                    }
                }
            };
            let text = closure_text(&shape, &name, self.companion, self.wrap.observer);
            let wrapped = build::snippet_expr(tree, &text).map_err(|e| self.lib.snippet_error(e))?;
            let Some(placeholder) = build::find_ident(tree, wrapped, PLACEHOLDER) else {
                return Err(TransformError::Unsupported {
                    transformer: self.lib.transformer.name,
                    message: "closure template lost its call placeholder".to_string(),
                });
            };
            let moved = build::detach(tree, call);
            build::replace_with(tree, placeholder, moved);
            build::replace_with(tree, call, wrapped);
            self.journal
                .note(format!("wrapped {pkg}.{name} for {}.{}", self.companion, self.wrap.observer));
            self.changed = true;
        }
        Ok(Action::Keep)
    }
}

pub fn inject(
    file: &mut GoFile,
    lib: &LibraryScope<'_>,
    wrap: &ClosureWrap,
    ctx: &TransformContext<'_>,
    journal: &mut Journal,
    companion: &str,
) -> Result<bool, TransformError> {
    let mut visitor = Wrap {
        lib,
        wrap,
        ctx,
        companion,
        journal,
        changed: false,
    };
    walk::walk_file(file, WalkOptions::default(), &mut visitor)?;
    Ok(visitor.changed)
}

struct Unwrap<'a> {
    wrap: &'a ClosureWrap,
    companion: &'a str,
    journal: &'a mut Journal,
    changed: bool,
}

impl StmtVisitor for Unwrap<'_> {
    type Error = TransformError;

    fn visit_stmt(&mut self, tree: &mut Tree, cursor: &Cursor<'_>) -> Result<Action, TransformError> {
        let exprs: Vec<ExprId> = header_exprs(tree, cursor.stmt)
            .into_iter()
            .flat_map(|e| subexprs(tree, e))
            .collect();
        for id in exprs {
            if let Some(inner) = wrapped_call(tree, id, self.companion, self.wrap.observer) {
                build::replace_with(tree, id, inner);
                self.journal.note(format!("unwrapped {} closure", self.companion));
                self.changed = true;
            }
        }
        Ok(Action::Keep)
    }
}

pub fn remove(
    file: &mut GoFile,
    wrap: &ClosureWrap,
    journal: &mut Journal,
    companion: &str,
) -> Result<bool, TransformError> {
    let mut visitor = Unwrap {
        wrap,
        companion,
        journal,
        changed: false,
    };
    walk::walk_file(file, WalkOptions::default(), &mut visitor)?;
    Ok(visitor.changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::SemanticCache;
    use crate::transform::{libs, Transformer};
    use pretty_assertions::assert_eq;
    use std::fs;

    fn sarama() -> Transformer {
        libs::builtin().into_iter().find(|t| t.name == "sarama").unwrap()
    }

    const SRC: &str = "package main\n\nimport \"github.com/IBM/sarama\"\n\nfunc produce(brokers []string, cfg *sarama.Config) error {\n\tproducer, err := sarama.NewSyncProducer(brokers, cfg)\n\tif err != nil {\n\t\treturn err\n\t}\n\treturn producer.Close()\n}\n";

    #[test]
    fn test_fallback_table() {
        assert_eq!(
            fallback_results("NewConsumerGroupFromClient"),
            vec![TypeRef::named("ConsumerGroup"), TypeRef::Builtin("error".into())]
        );
    }

    #[test]
    fn test_pair_closure_round_trip() {
        let t = sarama();
        let mut file = GoFile::parse(SRC).unwrap();
        let mut journal = Journal::new();
        assert!(t
            .inject(&mut file, &TransformContext::new(), &mut journal, "weftsarama")
            .unwrap());
        let out = file.print();
        assert_eq!(
            out,
            "package main\n\nimport \"github.com/IBM/sarama\"\n\nfunc produce(brokers []string, cfg *sarama.Config) error {\n\tproducer, err := func() (sarama.SyncProducer, error) {\n\t\tweftV, weftErr := sarama.NewSyncProducer(brokers, cfg)\n\t\tweftsarama.Observe(\"NewSyncProducer\", weftV, weftErr)\n\t\treturn weftV, weftErr\n\t}()\n\tif err != nil {\n\t\treturn err\n\t}\n\treturn producer.Close()\n}\n"
        );

        let mut again = GoFile::parse(&out).unwrap();
        assert!(!t
            .inject(&mut again, &TransformContext::new(), &mut Journal::new(), "weftsarama")
            .unwrap());

        let mut file = GoFile::parse(&out).unwrap();
        assert!(t.remove(&mut file, &mut Journal::new(), "weftsarama").unwrap());
        assert_eq!(file.print(), SRC);
    }

    #[test]
    fn test_semantic_error_only_factory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("go.mod"),
            "module example.com/app\n\nrequire github.com/IBM/sarama v1.43.0\n",
        )
        .unwrap();
        let vendored = dir.path().join("vendor/github.com/IBM/sarama");
        fs::create_dir_all(&vendored).unwrap();
        fs::write(
            vendored.join("admin.go"),
            "package sarama\n\nfunc NewClusterAdmin(addrs []string, conf *Config) error {\n\treturn nil\n}\n",
        )
        .unwrap();

        let cache = SemanticCache::new();
        let ctx = TransformContext::new()
            .with_source_file(dir.path().join("main.go"))
            .with_semantic(&cache);
        let mut file = GoFile::parse(
            "package main\n\nimport kafka \"github.com/IBM/sarama\"\n\nfunc setup() error {\n\treturn kafka.NewClusterAdmin(addrs, nil)\n}\n",
        )
        .unwrap();
        let mut journal = Journal::new();
        assert!(sarama().inject(&mut file, &ctx, &mut journal, "weftsarama").unwrap());
        assert!(journal.warnings.is_empty());
        assert_eq!(
            file.print(),
            "package main\n\nimport kafka \"github.com/IBM/sarama\"\n\nfunc setup() error {\n\treturn func() error {\n\t\tweftErr := kafka.NewClusterAdmin(addrs, nil)\n\t\tweftsarama.Observe(\"NewClusterAdmin\", nil, weftErr)\n\t\treturn weftErr\n\t}()\n}\n"
        );
    }

    #[test]
    fn test_semantic_failure_warns_and_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SemanticCache::new();
        let ctx = TransformContext::new()
            .with_source_file(dir.path().join("main.go"))
            .with_semantic(&cache);
        let mut file = GoFile::parse(SRC).unwrap();
        let mut journal = Journal::new();
        assert!(sarama().inject(&mut file, &ctx, &mut journal, "weftsarama").unwrap());
        assert_eq!(journal.warnings.len(), 1);
        assert!(file.print().contains("func() (sarama.SyncProducer, error) {"));
    }
}
