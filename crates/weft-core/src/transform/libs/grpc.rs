//! gRPC interceptors.
//!
//! Server and client constructors gain chained interceptor options. A call
//! that spreads an options slice keeps the spread and merges the generated
//! options into a fresh copy of it:
//!
//! ```go
//! grpc.NewServer(append(append([]grpc.ServerOption{}, opts...), gen1, gen2)...)
//! ```

use crate::syntax::walk::{self, collect_calls, expr_mentions, Action, Cursor, StmtVisitor, WalkOptions};
use crate::syntax::{build, Break, Expr, ExprId, GoFile, Tree};
use crate::transform::{Journal, LibraryScope, TransformError};

struct Options {
    option_type: &'static str,
    /// `(library option, companion interceptor)` pairs.
    generated: [(&'static str, &'static str); 2],
}

const SERVER: Options = Options {
    option_type: "ServerOption",
    generated: [
        ("ChainUnaryInterceptor", "UnaryServerInterceptor"),
        ("ChainStreamInterceptor", "StreamServerInterceptor"),
    ],
};

const CLIENT: Options = Options {
    option_type: "DialOption",
    generated: [
        ("WithChainUnaryInterceptor", "UnaryClientInterceptor"),
        ("WithChainStreamInterceptor", "StreamClientInterceptor"),
    ],
};

fn options_for(name: &str) -> Option<&'static Options> {
    match name {
        "NewServer" => Some(&SERVER),
        "Dial" | "DialContext" | "NewClient" => Some(&CLIENT),
        _ => None,
    }
}

struct Chain<'a> {
    lib: &'a LibraryScope<'a>,
    companion: &'a str,
    journal: &'a mut Journal,
    changed: bool,
}

impl Chain<'_> {
    fn generated(&self, tree: &mut Tree, library: &str, options: &Options) -> Vec<ExprId> {
        options
            .generated
            .iter()
            .map(|(option, interceptor)| {
                let inner = build::qualified_call(tree, self.companion, interceptor, Vec::new());
                build::qualified_call(tree, library, option, vec![inner])
            })
            .collect()
    }
}

impl StmtVisitor for Chain<'_> {
    type Error = TransformError;

    fn visit_stmt(&mut self, tree: &mut Tree, cursor: &Cursor<'_>) -> Result<Action, TransformError> {
        for call in collect_calls(tree, cursor.stmt) {
            let Some((Some(pkg), name)) = tree.callee(call) else {
                continue;
            };
            if !self.lib.is_alias(pkg) {
                continue;
            }
            let Some(options) = options_for(name) else {
                continue;
            };
            let (pkg, name) = (pkg.to_string(), name.to_string());
            if tree
                .call_args(call)
                .iter()
                .any(|a| expr_mentions(tree, *a, self.companion))
            {
                continue;
            }
            let generated = self.generated(tree, &pkg, options);
            let Expr::Call { args, ellipsis, .. } = tree.expr(call) else {
                continue;
            };
            let (spread, last) = (*ellipsis, args.last().copied());
            match (spread, last) {
                (true, Some(slice)) => {
                    // append(append([]pkg.T{}, slice...), generated...)
                    let moved = build::detach(tree, slice);
                    let elem = build::selector(tree, &pkg, options.option_type);
                    let slice_ty = tree.add_expr(Expr::ArrayType { len: None, elem });
                    let empty = tree.add_expr(Expr::CompositeLit {
                        ty: Some(slice_ty),
                        elts: Vec::new(),
                        open_break: false,
                        close_break: false,
                    });
                    let append = build::ident(tree, "append");
                    let copy = tree.add_expr(Expr::Call {
                        fun: append,
                        args: vec![empty, moved],
                        ellipsis: true,
                        open_break: false,
                        close_break: false,
                    });
                    let append = build::ident(tree, "append");
                    let mut merged = vec![copy];
                    merged.extend(generated);
                    *tree.expr_mut(slice) = Expr::Call {
                        fun: append,
                        args: merged,
                        ellipsis: false,
                        open_break: false,
                        close_break: false,
                    };
                }
                _ => {
                    let multiline = matches!(tree.expr(call), Expr::Call { open_break: true, .. });
                    for option in generated {
                        if multiline {
                            tree.set_break(option, Break::Line);
                        }
                        if let Expr::Call { args, .. } = tree.expr_mut(call) {
                            args.push(option);
                        }
                    }
                }
            }
            self.journal
                .note(format!("chained {} interceptors into {pkg}.{name}", self.companion));
            self.changed = true;
        }
        Ok(Action::Keep)
    }
}

pub fn inject(
    file: &mut GoFile,
    lib: &LibraryScope<'_>,
    journal: &mut Journal,
    companion: &str,
) -> Result<bool, TransformError> {
    let mut visitor = Chain {
        lib,
        companion,
        journal,
        changed: false,
    };
    walk::walk_file(file, WalkOptions::default(), &mut visitor)?;
    Ok(visitor.changed)
}

struct Unchain<'a> {
    lib: &'a LibraryScope<'a>,
    companion: &'a str,
    journal: &'a mut Journal,
    changed: bool,
}

impl Unchain<'_> {
    /// Slice spread into `append(append([]T{}, slice...), generated...)`.
    fn merged_slice(&self, tree: &Tree, arg: ExprId) -> Option<ExprId> {
        let Expr::Call { fun, args, ellipsis: false, .. } = tree.expr(arg) else {
            return None;
        };
        if tree.ident(*fun) != Some("append") || args.len() < 2 {
            return None;
        }
        if !args[1..].iter().all(|a| expr_mentions(tree, *a, self.companion)) {
            return None;
        }
        match tree.expr(args[0]) {
            Expr::Call {
                fun,
                args: inner,
                ellipsis: true,
                ..
            } if tree.ident(*fun) == Some("append") && inner.len() == 2 => match tree.expr(inner[0]) {
                Expr::CompositeLit { elts, .. } if elts.is_empty() => Some(inner[1]),
                _ => None,
            },
            _ => None,
        }
    }
}

impl StmtVisitor for Unchain<'_> {
    type Error = TransformError;

    fn visit_stmt(&mut self, tree: &mut Tree, cursor: &Cursor<'_>) -> Result<Action, TransformError> {
        for call in collect_calls(tree, cursor.stmt) {
            let Some((Some(pkg), name)) = tree.callee(call) else {
                continue;
            };
            if !self.lib.is_alias(pkg) || options_for(name).is_none() {
                continue;
            }
            let label = format!("{pkg}.{name}");
            let Expr::Call { args, ellipsis, .. } = tree.expr(call) else {
                continue;
            };
            let (args, spread) = (args.clone(), *ellipsis);
            if spread {
                if let Some(slice) = args.last().and_then(|a| self.merged_slice(tree, *a).map(|s| (*a, s))) {
                    build::replace_with(tree, slice.0, slice.1);
                    self.journal.note(format!("unchained interceptors from {label}"));
                    self.changed = true;
                }
                continue;
            }
            let mut removed = false;
            for index in (0..args.len()).rev() {
                if expr_mentions(tree, args[index], self.companion) {
                    build::remove_arg(tree, call, index);
                    removed = true;
                }
            }
            if removed {
                self.journal.note(format!("unchained interceptors from {label}"));
                self.changed = true;
            }
        }
        Ok(Action::Keep)
    }
}

pub fn remove(
    file: &mut GoFile,
    lib: &LibraryScope<'_>,
    journal: &mut Journal,
    companion: &str,
) -> Result<bool, TransformError> {
    let mut visitor = Unchain {
        lib,
        companion,
        journal,
        changed: false,
    };
    walk::walk_file(file, WalkOptions::default(), &mut visitor)?;
    Ok(visitor.changed)
}
