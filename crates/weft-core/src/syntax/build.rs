//! Node constructors and in-place rewrites used by the instrumentation passes.

use super::parser::{parse_expr, parse_stmts};
use super::printer::print_expr;
use super::tree::{BlockId, Break, Expr, ExprId, Stmt, StmtId, Tree};
use super::walk::{child_blocks, header_exprs, subexprs};
use super::ParseError;

pub fn ident(tree: &mut Tree, name: &str) -> ExprId {
    tree.add_expr(Expr::Ident(name.to_string()))
}

pub fn selector(tree: &mut Tree, pkg: &str, name: &str) -> ExprId {
    let x = ident(tree, pkg);
    tree.add_expr(Expr::Selector {
        x,
        sel: name.to_string(),
        broken: false,
    })
}

pub fn call(tree: &mut Tree, fun: ExprId, args: Vec<ExprId>) -> ExprId {
    tree.add_expr(Expr::Call {
        fun,
        args,
        ellipsis: false,
        open_break: false,
        close_break: false,
    })
}

/// `pkg.name(args...)`
pub fn qualified_call(tree: &mut Tree, pkg: &str, name: &str, args: Vec<ExprId>) -> ExprId {
    let fun = selector(tree, pkg, name);
    call(tree, fun, args)
}

pub fn expr_stmt(tree: &mut Tree, x: ExprId) -> StmtId {
    tree.add_stmt(Stmt::Expr(x))
}

/// Parse Go statements and copy them into `tree`.
pub fn snippet(tree: &mut Tree, text: &str) -> Result<Vec<StmtId>, ParseError> {
    let (scratch, stmts) = parse_stmts(text)?;
    Ok(stmts.iter().map(|s| tree.graft_stmt(&scratch, *s)).collect())
}

/// Parse a Go expression and copy it into `tree`.
pub fn snippet_expr(tree: &mut Tree, text: &str) -> Result<ExprId, ParseError> {
    let (scratch, expr) = parse_expr(text)?;
    Ok(tree.graft_expr(&scratch, expr))
}

/// Move the node at `id` to a fresh id, leaving a copy of it at `id` that
/// the caller is about to overwrite. Returns the fresh id.
pub fn detach(tree: &mut Tree, id: ExprId) -> ExprId {
    let node = tree.expr(id).clone();
    tree.add_expr(node)
}

/// Rewrite `x` in place into `pkg.name(x)`.
pub fn wrap_in_call(tree: &mut Tree, x: ExprId, pkg: &str, name: &str) {
    let inner = detach(tree, x);
    let fun = selector(tree, pkg, name);
    *tree.expr_mut(x) = Expr::Call {
        fun,
        args: vec![inner],
        ellipsis: false,
        open_break: false,
        close_break: false,
    };
}

/// Overwrite the node at `target` with the node at `source`.
pub fn replace_with(tree: &mut Tree, target: ExprId, source: ExprId) {
    let node = tree.expr(source).clone();
    *tree.expr_mut(target) = node;
}

/// Insert an argument into a call. In a call whose arguments start on their
/// own line, the displaced first argument keeps a line of its own.
pub fn insert_arg(tree: &mut Tree, call: ExprId, index: usize, arg: ExprId) {
    let (displaced, open_break) = match tree.expr(call) {
        Expr::Call { args, open_break, .. } => (args.first().copied(), *open_break),
        _ => return,
    };
    if let Expr::Call { args, .. } = tree.expr_mut(call) {
        let at = index.min(args.len());
        args.insert(at, arg);
    }
    if index == 0 && open_break {
        if let Some(old) = displaced {
            tree.set_break(old, Break::Line);
        }
    } else if index > 0 && open_break {
        tree.set_break(arg, Break::Line);
    }
}

/// Remove an argument from a call, the inverse of [`insert_arg`].
pub fn remove_arg(tree: &mut Tree, call: ExprId, index: usize) -> Option<ExprId> {
    let removed = match tree.expr_mut(call) {
        Expr::Call { args, .. } if index < args.len() => args.remove(index),
        _ => return None,
    };
    if index == 0 {
        if let Some(first) = tree.call_args(call).first().copied() {
            tree.set_break(first, Break::Inline);
        }
    }
    Some(removed)
}

/// Point the qualifier of a `pkg.Name` callee at another package.
pub fn requalify_callee(tree: &mut Tree, call: ExprId, pkg: &str) -> bool {
    let Expr::Call { fun, .. } = tree.expr(call) else {
        return false;
    };
    let Expr::Selector { x, .. } = tree.expr(*fun) else {
        return false;
    };
    let x = *x;
    *tree.expr_mut(x) = Expr::Ident(pkg.to_string());
    true
}

/// Single-argument call `pkg.name(arg)` where `pkg` is one of `aliases`.
pub fn unwrap_call(tree: &Tree, id: ExprId, aliases: &[&str], names: &[&str]) -> Option<ExprId> {
    match tree.callee(id) {
        Some((Some(pkg), name)) if aliases.contains(&pkg) && names.contains(&name) => {
            match tree.call_args(id) {
                [only] => Some(*only),
                _ => None,
            }
        }
        _ => None,
    }
}

/// First identifier named `name` under `root`, function literal bodies
/// included.
pub fn find_ident(tree: &Tree, root: ExprId, name: &str) -> Option<ExprId> {
    for id in subexprs(tree, root) {
        match tree.expr(id) {
            Expr::Ident(n) if n == name => return Some(id),
            Expr::FuncLit { body, .. } => {
                if let Some(found) = find_ident_in_block(tree, *body, name) {
                    return Some(found);
                }
            }
            _ => {}
        }
    }
    None
}

fn find_ident_in_block(tree: &Tree, block: BlockId, name: &str) -> Option<ExprId> {
    tree.block(block).stmts.iter().find_map(|stmt| {
        header_exprs(tree, *stmt)
            .into_iter()
            .find_map(|e| find_ident(tree, e, name))
            .or_else(|| {
                child_blocks(tree, *stmt)
                    .into_iter()
                    .find_map(|b| find_ident_in_block(tree, b, name))
            })
    })
}

pub fn same_expr(tree: &Tree, a: ExprId, b: ExprId) -> bool {
    print_expr(tree, a) == print_expr(tree, b)
}

/// `pkg.name(args...)` statement with the given qualifier and name.
pub fn is_call_stmt(tree: &Tree, stmt: StmtId, pkg: &str, name: &str) -> Option<ExprId> {
    match tree.stmt(stmt) {
        Stmt::Expr(x) => match tree.callee(*x) {
            Some((Some(p), n)) if p == pkg && n == name => Some(*x),
            _ => None,
        },
        _ => None,
    }
}

/// Whether the statement unconditionally leaves the enclosing block.
pub fn is_terminating(tree: &Tree, stmt: StmtId) -> bool {
    match tree.stmt(stmt) {
        Stmt::Return(_) => true,
        Stmt::Branch { keyword, .. } => *keyword != "fallthrough",
        Stmt::Expr(x) => matches!(
            tree.callee(*x),
            Some((None, "panic")) | Some((Some("os"), "Exit")) | Some((Some("log"), "Fatal" | "Fatalf" | "Fatalln"))
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::print_expr;

    #[test]
    fn test_wrap_and_unwrap_in_place() {
        let (mut tree, e) = parse_expr("http.HandleFunc(\"/\", index)").unwrap();
        let arg = tree.call_args(e)[1];
        wrap_in_call(&mut tree, arg, "wefthttp", "WrapHandlerFunc");
        assert_eq!(
            print_expr(&tree, e),
            "http.HandleFunc(\"/\", wefthttp.WrapHandlerFunc(index))"
        );
        let inner = unwrap_call(&tree, arg, &["wefthttp"], &["WrapHandlerFunc"]).unwrap();
        replace_with(&mut tree, arg, inner);
        assert_eq!(print_expr(&tree, e), "http.HandleFunc(\"/\", index)");
    }

    #[test]
    fn test_snippet_grafts_statements() {
        let mut tree = Tree::new();
        let stmts = snippet(&mut tree, "a := 1\nif a > 0 {\n\tb()\n}").unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(matches!(tree.stmt(stmts[1]), Stmt::If { .. }));
    }

    #[test]
    fn test_find_ident_inside_closure() {
        let mut tree = Tree::new();
        let e = snippet_expr(&mut tree, "func() error {\n\tweftErr := weftCall\n\treturn weftErr\n}()").unwrap();
        assert!(find_ident(&tree, e, "weftCall").is_some());
    }

    #[test]
    fn test_terminating_statements() {
        let mut tree = Tree::new();
        let stmts = snippet(&mut tree, "return\npanic(err)\nbreak\nf()").unwrap();
        let flags: Vec<bool> = stmts.iter().map(|s| is_terminating(&tree, *s)).collect();
        assert_eq!(flags, vec![true, true, true, false]);
    }
}
