/*!
# net/http

Server side: handlers registered through `http.HandleFunc` / `http.Handle`,
passed to `http.ListenAndServe[TLS]` or set as `Handler` of an
`http.Server{...}` literal are wrapped by the companion. Client side: the
package-level request helpers are substituted by companion versions taking a
context.
*/

use super::substitute::{self, Substitution};
use crate::syntax::walk::{self, header_exprs, subexprs, Action, Cursor, StmtVisitor, WalkOptions};
use crate::syntax::{build, Expr, ExprId, GoFile, Tree};
use crate::transform::{Journal, LibraryScope, TransformError};

static CLIENT: Substitution = Substitution {
    functions: &["Get", "Head", "Post", "PostForm"],
    context: true,
};

const WRAP_HANDLER: &str = "WrapHandler";
const WRAP_HANDLER_FUNC: &str = "WrapHandlerFunc";

/// Argument position of the handler and the wrapper it needs.
fn handler_arg(name: &str) -> Option<(usize, &'static str)> {
    match name {
        "HandleFunc" => Some((1, WRAP_HANDLER_FUNC)),
        "Handle" => Some((1, WRAP_HANDLER)),
        "ListenAndServe" => Some((1, WRAP_HANDLER)),
        "ListenAndServeTLS" => Some((3, WRAP_HANDLER)),
        _ => None,
    }
}

/// Handler expressions in a statement that are not yet wrapped.
fn handler_sites(tree: &Tree, lib: &LibraryScope<'_>, exprs: &[ExprId], companion: &str) -> Vec<(ExprId, &'static str)> {
    let mut sites = Vec::new();
    for id in exprs.iter().flat_map(|e| subexprs(tree, *e)) {
        match tree.expr(id) {
            Expr::Call { args, .. } => {
                let Some((Some(pkg), name)) = tree.callee(id) else {
                    continue;
                };
                if !lib.is_alias(pkg) {
                    continue;
                }
                if let Some((index, wrapper)) = handler_arg(name) {
                    if let Some(arg) = args.get(index) {
                        sites.push((*arg, wrapper));
                    }
                }
            }
            Expr::CompositeLit { ty: Some(ty), elts, .. } => {
                let is_server = tree
                    .qualified(*ty)
                    .is_some_and(|(pkg, name)| name == "Server" && lib.is_alias(pkg));
                if !is_server {
                    continue;
                }
                for elt in elts {
                    if let Expr::KeyValue { key, value } = tree.expr(*elt) {
                        if tree.ident(*key) == Some("Handler") {
                            sites.push((*value, WRAP_HANDLER));
                        }
                    }
                }
            }
            _ => {}
        }
    }
    sites.retain(|(arg, _)| {
        tree.ident(*arg) != Some("nil")
            && build::unwrap_call(tree, *arg, &[companion], &[WRAP_HANDLER, WRAP_HANDLER_FUNC]).is_none()
    });
    sites
}

struct WrapHandlers<'a> {
    lib: &'a LibraryScope<'a>,
    companion: &'a str,
    journal: &'a mut Journal,
    changed: bool,
}

impl StmtVisitor for WrapHandlers<'_> {
    type Error = TransformError;

    fn visit_stmt(&mut self, tree: &mut Tree, cursor: &Cursor<'_>) -> Result<Action, TransformError> {
        let exprs = header_exprs(tree, cursor.stmt);
        for (arg, wrapper) in handler_sites(tree, self.lib, &exprs, self.companion) {
            build::wrap_in_call(tree, arg, self.companion, wrapper);
            self.journal.note(format!("wrapped handler with {}.{wrapper}", self.companion));
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
    let mut visitor = WrapHandlers {
        lib,
        companion,
        journal,
        changed: false,
    };
    walk::walk_file(file, WalkOptions::default(), &mut visitor)?;
    let wrapped = visitor.changed;
    let substituted = substitute::inject(file, lib, &CLIENT, journal, companion)?;
    Ok(wrapped || substituted)
}

struct UnwrapHandlers<'a> {
    companion: &'a str,
    journal: &'a mut Journal,
    changed: bool,
}

impl StmtVisitor for UnwrapHandlers<'_> {
    type Error = TransformError;

    fn visit_stmt(&mut self, tree: &mut Tree, cursor: &Cursor<'_>) -> Result<Action, TransformError> {
        let exprs: Vec<ExprId> = header_exprs(tree, cursor.stmt)
            .into_iter()
            .flat_map(|e| subexprs(tree, e))
            .collect();
        for id in exprs {
            if let Some(inner) = build::unwrap_call(tree, id, &[self.companion], &[WRAP_HANDLER, WRAP_HANDLER_FUNC]) {
                build::replace_with(tree, id, inner);
                self.journal.note(format!("unwrapped {} handler", self.companion));
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
    let mut visitor = UnwrapHandlers {
        companion,
        journal,
        changed: false,
    };
    walk::walk_file(file, WalkOptions::default(), &mut visitor)?;
    let unwrapped = visitor.changed;
    let restored = substitute::remove(file, lib, &CLIENT, journal, companion)?;
    Ok(unwrapped || restored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{libs, TransformContext, Transformer};
    use pretty_assertions::assert_eq;

    fn nethttp() -> Transformer {
        libs::builtin().into_iter().find(|t| t.name == "nethttp").unwrap()
    }

    fn roundtrip(src: &str, want: &str) {
        let t = nethttp();
        let mut file = GoFile::parse(src).unwrap();
        t.inject(&mut file, &TransformContext::new(), &mut Journal::new(), "wefthttp")
            .unwrap();
        let out = file.print();
        assert_eq!(out, want);
        let mut file = GoFile::parse(&out).unwrap();
        t.remove(&mut file, &mut Journal::new(), "wefthttp").unwrap();
        assert_eq!(file.print(), src);
    }

    #[test]
    fn test_handlers_wrapped() {
        roundtrip(
            "package main\n\nimport \"net/http\"\n\nfunc main() {\n\thttp.HandleFunc(\"/\", index)\n\thttp.Handle(\"/static\", files)\n\thttp.ListenAndServe(\":8080\", nil)\n}\n",
            "package main\n\nimport \"net/http\"\n\nfunc main() {\n\thttp.HandleFunc(\"/\", wefthttp.WrapHandlerFunc(index))\n\thttp.Handle(\"/static\", wefthttp.WrapHandler(files))\n\thttp.ListenAndServe(\":8080\", nil)\n}\n",
        );
    }

    #[test]
    fn test_server_literal_handler() {
        roundtrip(
            "package main\n\nimport \"net/http\"\n\nfunc serve(mux *http.ServeMux) error {\n\tsrv := &http.Server{\n\t\tAddr:    \":8080\",\n\t\tHandler: mux,\n\t}\n\treturn srv.ListenAndServe()\n}\n",
            "package main\n\nimport \"net/http\"\n\nfunc serve(mux *http.ServeMux) error {\n\tsrv := &http.Server{\n\t\tAddr:    \":8080\",\n\t\tHandler: wefthttp.WrapHandler(mux),\n\t}\n\treturn srv.ListenAndServe()\n}\n",
        );
    }

    #[test]
    fn test_client_call_gets_request_context() {
        roundtrip(
            "package main\n\nimport \"net/http\"\n\nfunc proxy(w http.ResponseWriter, r *http.Request) {\n\tresp, err := http.Get(upstream)\n\tif err != nil {\n\t\treturn\n\t}\n\tdefer resp.Body.Close()\n}\n",
            "package main\n\nimport \"net/http\"\n\nfunc proxy(w http.ResponseWriter, r *http.Request) {\n\tresp, err := wefthttp.Get(r.Context(), upstream)\n\tif err != nil {\n\t\treturn\n\t}\n\tdefer resp.Body.Close()\n}\n",
        );
    }

    #[test]
    fn test_client_call_without_carrier_uses_nil() {
        roundtrip(
            "package main\n\nimport \"net/http\"\n\nfunc ping() {\n\tgo func() {\n\t\thttp.Head(url)\n\t}()\n}\n",
            "package main\n\nimport \"net/http\"\n\nfunc ping() {\n\tgo func() {\n\t\twefthttp.Head(nil, url)\n\t}()\n}\n",
        );
    }
}
