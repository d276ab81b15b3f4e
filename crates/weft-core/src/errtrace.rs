/*!
# Error Tracing

Finds the error-handling guards of every function and reports the error to
the tracing root before it leaves the function:

```go
if err != nil {
	trace.Error(err)
	return err
}
```

Three guard shapes are recognized, on any comparison of an error-like name
(`err`, `e`, `er`, `ex`) with `nil`, with or without an init statement:

- `if v != nil { ... return }`: before every direct `return` of the body
- `if v == nil { ... } else { ... return }`: before every direct `return`
  of the else block
- `if v == nil { ...; return }` followed by more statements: right after the
  `if`

A guard is left alone when the statement before it (or its own init
statement) already calls into a companion package, itself or through a
generated closure. The entry point is never
traced. [`remove`] undoes exactly what [`inject`] inserts.
*/

use crate::syntax::walk::{self, collect_calls, func_lits, Action, Cursor, StmtVisitor, WalkOptions};
use crate::syntax::{build, BlockId, Expr, ExprId, GoFile, Stmt, StmtId, Tree};
use crate::transform::{Journal, TransformError};

/// Names treated as error values.
pub const ERROR_NAMES: &[&str] = &["err", "e", "er", "ex"];

const REPORT: &str = "Error";

#[derive(Debug, Clone, PartialEq)]
enum Guard {
    NotNil(String),
    IsNil(String),
}

fn guard(tree: &Tree, cond: ExprId) -> Option<Guard> {
    let Expr::Binary { op, x, y } = tree.expr(cond) else {
        return None;
    };
    let (x, y) = (tree.ident(*x)?, tree.ident(*y)?);
    let name = match (x, y) {
        (v, "nil") | ("nil", v) if ERROR_NAMES.contains(&v) => v.to_string(),
        _ => return None,
    };
    match *op {
        "!=" => Some(Guard::NotNil(name)),
        "==" => Some(Guard::IsNil(name)),
        _ => None,
    }
}

/// The `if` and every `else if` of a chain.
fn if_chain(tree: &Tree, stmt: StmtId) -> Vec<StmtId> {
    let mut chain = Vec::new();
    let mut current = Some(stmt);
    while let Some(id) = current {
        let Stmt::If { els, .. } = tree.stmt(id) else {
            break;
        };
        chain.push(id);
        current = els.filter(|e| matches!(tree.stmt(*e), Stmt::If { .. }));
    }
    chain
}

fn else_block(tree: &Tree, els: Option<StmtId>) -> Option<BlockId> {
    match tree.stmt(els?) {
        Stmt::Block(b) => Some(*b),
        _ => None,
    }
}

fn last_stmt(tree: &Tree, block: BlockId) -> Option<StmtId> {
    tree.block(block)
        .stmts
        .iter()
        .rev()
        .find(|s| !matches!(tree.stmt(**s), Stmt::Comment(_)))
        .copied()
}

/// Whether the statement calls `alias.X` for one of `aliases`, directly or
/// as a direct statement of a function literal it holds. Reports to `root`
/// do not count.
fn calls_companion(tree: &Tree, stmt: StmtId, aliases: &[String], root: &str) -> bool {
    let own = |stmt: StmtId| {
        collect_calls(tree, stmt).into_iter().any(|call| match tree.callee(call) {
            Some((Some(pkg), name)) => !(pkg == root && name == REPORT) && aliases.iter().any(|a| a == pkg),
            _ => false,
        })
    };
    own(stmt)
        || func_lits(tree, stmt).into_iter().any(|lit| match tree.expr(lit) {
            Expr::FuncLit { body, .. } => tree.block(*body).stmts.iter().any(|s| own(*s)),
            _ => false,
        })
}

fn is_report(tree: &Tree, stmt: StmtId, root: &str, name: &str) -> bool {
    build::is_call_stmt(tree, stmt, root, REPORT)
        .is_some_and(|call| matches!(tree.call_args(call), [arg] if tree.ident(*arg) == Some(name)))
}

struct Tracer<'a> {
    root: &'a str,
    companions: &'a [String],
    journal: &'a mut Journal,
    inserted: usize,
}

impl Tracer<'_> {
    fn report(&self, tree: &mut Tree, name: &str) -> StmtId {
        let arg = build::ident(tree, name);
        let call = build::qualified_call(tree, self.root, REPORT, vec![arg]);
        build::expr_stmt(tree, call)
    }

    /// Insert a report before every direct `return` of `block`.
    fn before_returns(&mut self, tree: &mut Tree, block: BlockId, name: &str) {
        let mut index = 0;
        while index < tree.block(block).stmts.len() {
            let stmt = tree.block(block).stmts[index];
            let reported = index > 0 && is_report(tree, tree.block(block).stmts[index - 1], self.root, name);
            if matches!(tree.stmt(stmt), Stmt::Return(_)) && !reported {
                let report = self.report(tree, name);
                let blank = std::mem::take(&mut tree.stmt_node_mut(stmt).blank_before);
                tree.stmt_node_mut(report).blank_before = blank;
                tree.insert_stmts(block, index, &[report]);
                self.journal.note(format!("traced {name} before return"));
                self.inserted += 1;
                index += 1;
            }
            index += 1;
        }
    }
}

impl StmtVisitor for Tracer<'_> {
    type Error = TransformError;

    fn visit_stmt(&mut self, tree: &mut Tree, cursor: &Cursor<'_>) -> Result<Action, TransformError> {
        if !matches!(tree.stmt(cursor.stmt), Stmt::If { .. }) {
            return Ok(Action::Keep);
        }
        if cursor
            .prev(tree)
            .is_some_and(|prev| calls_companion(tree, prev, self.companions, self.root))
        {
            return Ok(Action::Keep);
        }
        let mut after = None;
        for (position, id) in if_chain(tree, cursor.stmt).into_iter().enumerate() {
            let Stmt::If { init, cond, then, els } = tree.stmt(id).clone() else {
                continue;
            };
            if init.is_some_and(|init| calls_companion(tree, init, self.companions, self.root)) {
                continue;
            }
            match guard(tree, cond) {
                Some(Guard::NotNil(name)) => self.before_returns(tree, then, &name),
                Some(Guard::IsNil(name)) => match else_block(tree, els) {
                    Some(block) => self.before_returns(tree, block, &name),
                    None if position == 0 => {
                        let ends_in_return = last_stmt(tree, then)
                            .is_some_and(|s| matches!(tree.stmt(s), Stmt::Return(_)));
                        let already = cursor
                            .next(tree)
                            .is_some_and(|next| is_report(tree, next, self.root, &name));
                        if ends_in_return && !cursor.is_last(tree) && !already {
                            after = Some(name);
                        }
                    }
                    None => {}
                },
                None => {}
            }
        }
        match after {
            Some(name) => {
                let report = self.report(tree, &name);
                self.journal.note(format!("traced {name} after nil guard"));
                self.inserted += 1;
                Ok(Action::after(vec![report]))
            }
            None => Ok(Action::Keep),
        }
    }
}

/// Insert error reports into every function but the entry point. Returns the
/// number of inserted calls.
pub fn inject(
    file: &mut GoFile,
    root: &str,
    companions: &[String],
    journal: &mut Journal,
) -> Result<usize, TransformError> {
    let is_main = file.package == "main";
    let mut tracer = Tracer {
        root,
        companions,
        journal,
        inserted: 0,
    };
    walk::walk_funcs(file, WalkOptions::default(), &mut tracer, |f| {
        !(is_main && !f.is_literal && f.name.as_deref() == Some("main"))
    })?;
    Ok(tracer.inserted)
}

struct Untracer<'a> {
    root: &'a str,
    journal: &'a mut Journal,
    removed: usize,
}

impl Untracer<'_> {
    fn strip_before_returns(&mut self, tree: &mut Tree, block: BlockId, name: &str) {
        let mut index = 1;
        while index < tree.block(block).stmts.len() {
            let stmt = tree.block(block).stmts[index];
            let prev = tree.block(block).stmts[index - 1];
            if matches!(tree.stmt(stmt), Stmt::Return(_)) && is_report(tree, prev, self.root, name) {
                let blank = tree.stmt_node(prev).blank_before;
                tree.remove_stmt(block, index - 1);
                tree.stmt_node_mut(stmt).blank_before = blank;
                self.journal.note(format!("removed {}.{REPORT}({name})", self.root));
                self.removed += 1;
            } else {
                index += 1;
            }
        }
    }
}

impl StmtVisitor for Untracer<'_> {
    type Error = TransformError;

    fn visit_stmt(&mut self, tree: &mut Tree, cursor: &Cursor<'_>) -> Result<Action, TransformError> {
        if matches!(tree.stmt(cursor.stmt), Stmt::If { .. }) {
            for id in if_chain(tree, cursor.stmt) {
                let Stmt::If { cond, then, els, .. } = tree.stmt(id).clone() else {
                    continue;
                };
                match guard(tree, cond) {
                    Some(Guard::NotNil(name)) => self.strip_before_returns(tree, then, &name),
                    Some(Guard::IsNil(name)) => {
                        if let Some(block) = else_block(tree, els) {
                            self.strip_before_returns(tree, block, &name);
                        }
                    }
                    None => {}
                }
            }
            return Ok(Action::Keep);
        }

        // Report placed after a `v == nil` guard.
        let Some(prev) = cursor.prev(tree) else {
            return Ok(Action::Keep);
        };
        let Stmt::If { cond, then, els: None, .. } = tree.stmt(prev) else {
            return Ok(Action::Keep);
        };
        let Some(Guard::IsNil(name)) = guard(tree, *cond) else {
            return Ok(Action::Keep);
        };
        let ends_in_return = last_stmt(tree, *then).is_some_and(|s| matches!(tree.stmt(s), Stmt::Return(_)));
        if ends_in_return && is_report(tree, cursor.stmt, self.root, &name) {
            self.journal.note(format!("removed {}.{REPORT}({name})", self.root));
            self.removed += 1;
            return Ok(Action::Remove);
        }
        Ok(Action::Keep)
    }
}

/// Remove the reports [`inject`] generates. Returns the number removed.
pub fn remove(file: &mut GoFile, root: &str, journal: &mut Journal) -> Result<usize, TransformError> {
    let mut untracer = Untracer {
        root,
        journal,
        removed: 0,
    };
    walk::walk_file(file, WalkOptions::default(), &mut untracer)?;
    Ok(untracer.removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn traced(src: &str) -> (String, usize) {
        let mut file = GoFile::parse(src).unwrap();
        let n = inject(&mut file, "trace", &["trace".to_string(), "weftsql".to_string()], &mut Journal::new()).unwrap();
        (file.print(), n)
    }

    fn assert_round_trip(src: &str, want: &str, count: usize) {
        let (out, n) = traced(src);
        assert_eq!(out, want);
        assert_eq!(n, count);
        let mut file = GoFile::parse(&out).unwrap();
        assert_eq!(remove(&mut file, "trace", &mut Journal::new()).unwrap(), count);
        assert_eq!(file.print(), src);
    }

    #[test]
    fn test_not_nil_guard() {
        assert_round_trip(
            "package store\n\nfunc load() error {\n\tif err := open(); err != nil {\n\t\tlog(err)\n\n\t\treturn err\n\t}\n\treturn nil\n}\n",
            "package store\n\nfunc load() error {\n\tif err := open(); err != nil {\n\t\tlog(err)\n\n\t\ttrace.Error(err)\n\t\treturn err\n\t}\n\treturn nil\n}\n",
            1,
        );
    }

    #[test]
    fn test_nil_on_the_left_and_else_branch() {
        assert_round_trip(
            "package store\n\nfunc load() error {\n\te := open()\n\tif nil == e {\n\t\tok()\n\t} else {\n\t\treturn e\n\t}\n\treturn nil\n}\n",
            "package store\n\nfunc load() error {\n\te := open()\n\tif nil == e {\n\t\tok()\n\t} else {\n\t\ttrace.Error(e)\n\t\treturn e\n\t}\n\treturn nil\n}\n",
            1,
        );
    }

    #[test]
    fn test_is_nil_guard_followed_by_statements() {
        assert_round_trip(
            "package store\n\nfunc load() {\n\terr := open()\n\tif err == nil {\n\t\treturn\n\t}\n\tretry()\n}\n",
            "package store\n\nfunc load() {\n\terr := open()\n\tif err == nil {\n\t\treturn\n\t}\n\ttrace.Error(err)\n\tretry()\n}\n",
            1,
        );
        let (out, n) = traced("package store\n\nfunc load() {\n\terr := open()\n\tif err == nil {\n\t\treturn\n\t}\n}\n");
        assert_eq!(n, 0);
        assert!(!out.contains("trace.Error"));
    }

    #[test]
    fn test_nested_blocks_and_closures() {
        let (out, n) = traced(
            "package store\n\nfunc load(items []string) {\n\tfor _, it := range items {\n\t\tswitch it {\n\t\tcase \"a\":\n\t\t\tif err := do(it); err != nil {\n\t\t\t\treturn\n\t\t\t}\n\t\t}\n\t}\n\tgo func() {\n\t\tif ex := run(); ex != nil {\n\t\t\treturn\n\t\t}\n\t}()\n\tif ok {\n\t} else if er := f(); er != nil {\n\t\treturn\n\t}\n}\n",
        );
        assert_eq!(n, 3);
        assert!(out.contains("\t\t\t\ttrace.Error(err)\n\t\t\t\treturn\n"));
        assert!(out.contains("\t\t\ttrace.Error(ex)\n"));
        assert!(out.contains("\t\ttrace.Error(er)\n"));
    }

    #[test]
    fn test_traced_closure_does_not_suppress_next_guard() {
        let src = "package store\n\nfunc load() error {\n\tgo func() {\n\t\tif err := run(); err != nil {\n\t\t\treturn\n\t\t}\n\t}()\n\tif err := f(); err != nil {\n\t\treturn err\n\t}\n\terr := g()\n\tif err == nil {\n\t\treturn nil\n\t}\n\tif e := h(); e != nil {\n\t\treturn e\n\t}\n\treturn err\n}\n";
        let (out, n) = traced(src);
        assert_eq!(n, 4);
        assert!(out.contains("\t\t\ttrace.Error(err)\n\t\t\treturn\n"));
        assert!(out.contains("\t\ttrace.Error(err)\n\t\treturn err\n"));
        assert!(out.contains("\t}\n\ttrace.Error(err)\n\tif e := h(); e != nil {\n\t\ttrace.Error(e)\n"));
        let mut file = GoFile::parse(&out).unwrap();
        assert_eq!(remove(&mut file, "trace", &mut Journal::new()).unwrap(), 4);
        assert_eq!(file.print(), src);
    }

    #[test]
    fn test_generated_closure_suppresses_guard() {
        let (_, n) = traced(
            "package store\n\nfunc open() error {\n\tdb, err := func() (*DB, error) {\n\t\tweftV, weftErr := connect()\n\t\tweftsql.Observe(\"connect\", weftV, weftErr)\n\t\treturn weftV, weftErr\n\t}()\n\tif err != nil {\n\t\treturn err\n\t}\n\treturn db.Close()\n}\n",
        );
        assert_eq!(n, 0);
    }

    #[test]
    fn test_companion_call_suppresses_guard() {
        let (_, n) = traced(
            "package store\n\nfunc open() error {\n\tdb, err := weftsql.Open(\"pg\", dsn)\n\tif err != nil {\n\t\treturn err\n\t}\n\tif err := weftsql.Ping(db); err != nil {\n\t\treturn err\n\t}\n\treturn nil\n}\n",
        );
        assert_eq!(n, 0);
    }

    #[test]
    fn test_entry_point_skipped_and_other_names_ignored() {
        let (_, n) = traced(
            "package main\n\nfunc main() {\n\tif err != nil {\n\t\treturn\n\t}\n}\n\nfunc helper() {\n\tif failure != nil {\n\t\treturn\n\t}\n}\n",
        );
        assert_eq!(n, 0);
    }

    #[test]
    fn test_second_injection_adds_nothing() {
        let (out, _) = traced("package store\n\nfunc load() error {\n\tif err != nil {\n\t\treturn err\n\t}\n\treturn nil\n}\n");
        let (again, n) = traced(&out);
        assert_eq!(n, 0);
        assert_eq!(again, out);
    }
}
