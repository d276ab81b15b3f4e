/*!
# Statement Walk

One generic traversal over function bodies, parameterized by a
[`StmtVisitor`]. Nested blocks (if/else chains, loops, switch and select
clauses, plain blocks) and function literal bodies are visited before the
statement that owns them, so a visitor always sees already-processed
children. Statements a visitor splices in are never visited again.
*/

use std::sync::OnceLock;

use regex::Regex;

use super::tree::{BlockId, ClauseKind, Expr, ExprId, FuncSig, Stmt, StmtId, Tree};
use super::{Decl, GoFile};

/// The function whose body is being walked.
#[derive(Debug, Clone)]
pub struct FuncContext {
    /// Declared name; `None` for function literals.
    pub name: Option<String>,
    pub sig: FuncSig,
    pub is_literal: bool,
}

impl FuncContext {
    pub fn declared(name: &str, sig: &FuncSig) -> Self {
        Self {
            name: Some(name.to_string()),
            sig: sig.clone(),
            is_literal: false,
        }
    }

    pub fn literal(sig: &FuncSig) -> Self {
        Self {
            name: None,
            sig: sig.clone(),
            is_literal: true,
        }
    }
}

/// Position of the visited statement.
pub struct Cursor<'c> {
    pub block: BlockId,
    pub index: usize,
    pub stmt: StmtId,
    pub func: &'c FuncContext,
}

impl Cursor<'_> {
    /// Closest preceding statement in the same block, skipping comments.
    pub fn prev(&self, tree: &Tree) -> Option<StmtId> {
        tree.block(self.block).stmts[..self.index]
            .iter()
            .rev()
            .find(|s| !matches!(tree.stmt(**s), Stmt::Comment(_)))
            .copied()
    }

    pub fn next(&self, tree: &Tree) -> Option<StmtId> {
        tree.block(self.block).stmts.get(self.index + 1).copied()
    }

    pub fn is_last(&self, tree: &Tree) -> bool {
        tree.block(self.block).stmts[self.index + 1..]
            .iter()
            .all(|s| matches!(tree.stmt(*s), Stmt::Comment(_)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Keep,
    Remove,
    /// Insert statements around the visited one, optionally replacing it.
    Splice {
        before: Vec<StmtId>,
        with: Option<Vec<StmtId>>,
        after: Vec<StmtId>,
    },
}

impl Action {
    pub fn before(stmts: Vec<StmtId>) -> Self {
        Action::Splice {
            before: stmts,
            with: None,
            after: Vec::new(),
        }
    }

    pub fn after(stmts: Vec<StmtId>) -> Self {
        Action::Splice {
            before: Vec::new(),
            with: None,
            after: stmts,
        }
    }

    pub fn replace(stmts: Vec<StmtId>) -> Self {
        Action::Splice {
            before: Vec::new(),
            with: Some(stmts),
            after: Vec::new(),
        }
    }
}

pub trait StmtVisitor {
    type Error;

    fn visit_stmt(&mut self, tree: &mut Tree, cursor: &Cursor<'_>) -> Result<Action, Self::Error>;
}

#[derive(Debug, Clone, Copy)]
pub struct WalkOptions {
    pub descend_func_lits: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            descend_func_lits: true,
        }
    }
}

/// Walk the body of every function declaration in the file.
pub fn walk_file<V: StmtVisitor>(
    file: &mut GoFile,
    options: WalkOptions,
    visitor: &mut V,
) -> Result<(), V::Error> {
    walk_funcs(file, options, visitor, |_| true)
}

/// Walk the bodies of the functions accepted by `filter`: function
/// declarations and the function literals of package-level `var`
/// declarations.
pub fn walk_funcs<V: StmtVisitor>(
    file: &mut GoFile,
    options: WalkOptions,
    visitor: &mut V,
    filter: impl Fn(&FuncContext) -> bool,
) -> Result<(), V::Error> {
    let tree = &mut file.tree;
    for node in &file.decls {
        match &node.decl {
            Decl::Func(func) => {
                let Some(body) = func.body else {
                    continue;
                };
                let ctx = FuncContext::declared(&func.name, &func.sig);
                if filter(&ctx) {
                    walk_block(tree, body, &ctx, options, visitor)?;
                }
            }
            Decl::Var(stmt) => {
                for lit in func_lits(tree, *stmt) {
                    let Expr::FuncLit { sig, body } = tree.expr(lit) else {
                        continue;
                    };
                    let (ctx, body) = (FuncContext::literal(sig), *body);
                    if filter(&ctx) {
                        walk_block(tree, body, &ctx, options, visitor)?;
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

pub fn walk_block<V: StmtVisitor>(
    tree: &mut Tree,
    block: BlockId,
    func: &FuncContext,
    options: WalkOptions,
    visitor: &mut V,
) -> Result<(), V::Error> {
    let mut index = 0;
    while index < tree.block(block).stmts.len() {
        let stmt = tree.block(block).stmts[index];
        for child in child_blocks(tree, stmt) {
            walk_block(tree, child, func, options, visitor)?;
        }
        if options.descend_func_lits {
            for lit in func_lits(tree, stmt) {
                if let Expr::FuncLit { sig, body } = tree.expr(lit) {
                    let (ctx, body) = (FuncContext::literal(sig), *body);
                    walk_block(tree, body, &ctx, options, visitor)?;
                }
            }
        }

        let cursor = Cursor {
            block,
            index,
            stmt,
            func,
        };
        match visitor.visit_stmt(tree, &cursor)? {
            Action::Keep => index += 1,
            Action::Remove => {
                let blank = tree.stmt_node(stmt).blank_before;
                tree.remove_stmt(block, index);
                if blank {
                    if let Some(next) = tree.block(block).stmts.get(index).copied() {
                        tree.stmt_node_mut(next).blank_before = true;
                    }
                }
            }
            Action::Splice { before, with, after } => {
                let kept = match with {
                    Some(with) => {
                        tree.replace_stmt(block, index, &with);
                        with.len()
                    }
                    None => 1,
                };
                tree.insert_stmts(block, index + kept, &after);
                if let (Some(first), Some(current)) =
                    (before.first(), tree.block(block).stmts.get(index).copied())
                {
                    let blank = std::mem::take(&mut tree.stmt_node_mut(current).blank_before);
                    tree.stmt_node_mut(*first).blank_before = blank;
                }
                tree.insert_stmts(block, index, &before);
                index += before.len() + kept + after.len();
            }
        }
    }
    Ok(())
}

/// Blocks directly owned by a statement, including every branch of an
/// else-if chain.
pub fn child_blocks(tree: &Tree, stmt: StmtId) -> Vec<BlockId> {
    let mut out = Vec::new();
    match tree.stmt(stmt) {
        Stmt::Block(b) => out.push(*b),
        Stmt::If { then, els, .. } => {
            out.push(*then);
            if let Some(els) = els {
                out.extend(child_blocks(tree, *els));
            }
        }
        Stmt::For { body, .. } | Stmt::Range { body, .. } => out.push(*body),
        Stmt::Switch { clauses, .. } | Stmt::Select { clauses } => {
            out.extend(clauses.iter().map(|c| c.body));
        }
        Stmt::Labeled { stmt, .. } => out.extend(child_blocks(tree, *stmt)),
        _ => {}
    }
    out
}

/// Expressions written in the statement itself, outside its nested blocks.
pub fn header_exprs(tree: &Tree, stmt: StmtId) -> Vec<ExprId> {
    let mut out = Vec::new();
    push_header_exprs(tree, stmt, &mut out);
    out
}

fn push_header_exprs(tree: &Tree, stmt: StmtId, out: &mut Vec<ExprId>) {
    match tree.stmt(stmt) {
        Stmt::Expr(x) | Stmt::Defer(x) | Stmt::Go(x) | Stmt::IncDec { x, .. } => out.push(*x),
        Stmt::Assign { lhs, rhs, .. } => {
            out.extend(lhs);
            out.extend(rhs);
        }
        Stmt::Send { ch, value } => {
            out.push(*ch);
            out.push(*value);
        }
        Stmt::Return(results) => out.extend(results),
        Stmt::If { init, cond, els, .. } => {
            if let Some(init) = init {
                push_header_exprs(tree, *init, out);
            }
            out.push(*cond);
            if let Some(els) = els {
                if matches!(tree.stmt(*els), Stmt::If { .. }) {
                    push_header_exprs(tree, *els, out);
                }
            }
        }
        Stmt::For { init, cond, post, .. } => {
            if let Some(init) = init {
                push_header_exprs(tree, *init, out);
            }
            out.extend(cond);
            if let Some(post) = post {
                push_header_exprs(tree, *post, out);
            }
        }
        Stmt::Range { key, value, x, .. } => {
            out.extend(key);
            out.extend(value);
            out.push(*x);
        }
        Stmt::Switch { init, tag, clauses } => {
            if let Some(init) = init {
                push_header_exprs(tree, *init, out);
            }
            if let Some(tag) = tag {
                push_header_exprs(tree, *tag, out);
            }
            for clause in clauses {
                if let ClauseKind::Case(list) = &clause.kind {
                    out.extend(list);
                }
            }
        }
        Stmt::Select { clauses } => {
            for clause in clauses {
                if let ClauseKind::Comm(comm) = &clause.kind {
                    push_header_exprs(tree, *comm, out);
                }
            }
        }
        Stmt::Labeled { stmt, .. } => push_header_exprs(tree, *stmt, out),
        Stmt::Var { ty, values, .. } => {
            out.extend(ty);
            out.extend(values);
        }
        Stmt::Branch { .. } | Stmt::Block(_) | Stmt::Raw(_) | Stmt::Comment(_) | Stmt::Empty => {}
    }
}

/// Direct children of an expression. Function literal bodies are not
/// entered; their signatures are.
pub fn child_exprs(tree: &Tree, id: ExprId) -> Vec<ExprId> {
    let sig_types = |sig: &FuncSig| -> Vec<ExprId> {
        sig.params.iter().chain(&sig.results).map(|f| f.ty).collect()
    };
    match tree.expr(id) {
        Expr::Ident(_) | Expr::BasicLit(_) | Expr::RawType(_) => Vec::new(),
        Expr::CompositeLit { ty, elts, .. } => ty.iter().chain(elts).copied().collect(),
        Expr::KeyValue { key, value } => vec![*key, *value],
        Expr::FuncLit { sig, .. } | Expr::FuncType(sig) => sig_types(sig),
        Expr::Paren(x) | Expr::Star(x) | Expr::Unary { x, .. } => vec![*x],
        Expr::Selector { x, .. } => vec![*x],
        Expr::Index { x, indices } => std::iter::once(x).chain(indices).copied().collect(),
        Expr::Slice { x, low, high, max, .. } => std::iter::once(*x)
            .chain(*low)
            .chain(*high)
            .chain(*max)
            .collect(),
        Expr::TypeAssert { x, ty } => std::iter::once(*x).chain(*ty).collect(),
        Expr::Call { fun, args, .. } => std::iter::once(fun).chain(args).copied().collect(),
        Expr::Binary { x, y, .. } => vec![*x, *y],
        Expr::ArrayType { len, elem } => len.iter().chain(std::iter::once(elem)).copied().collect(),
        Expr::MapType { key, value } => vec![*key, *value],
        Expr::ChanType { elem, .. } => vec![*elem],
        Expr::Ellipsis(elem) => elem.iter().copied().collect(),
    }
}

/// `root` and everything below it in preorder, without entering function
/// literal bodies.
pub fn subexprs(tree: &Tree, root: ExprId) -> Vec<ExprId> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        out.push(id);
        let children = child_exprs(tree, id);
        stack.extend(children.into_iter().rev());
    }
    out
}

/// Call expressions in the statement header, outermost first.
pub fn collect_calls(tree: &Tree, stmt: StmtId) -> Vec<ExprId> {
    header_exprs(tree, stmt)
        .into_iter()
        .flat_map(|e| subexprs(tree, e))
        .filter(|e| matches!(tree.expr(*e), Expr::Call { .. }))
        .collect()
}

/// Function literals in the statement header that are not nested in
/// another literal.
pub fn func_lits(tree: &Tree, stmt: StmtId) -> Vec<ExprId> {
    header_exprs(tree, stmt)
        .into_iter()
        .flat_map(|e| subexprs(tree, e))
        .filter(|e| matches!(tree.expr(*e), Expr::FuncLit { .. }))
        .collect()
}

/// Whether `name.X` appears anywhere under the expression, function literal
/// bodies included.
pub fn expr_mentions(tree: &Tree, root: ExprId, name: &str) -> bool {
    subexprs(tree, root).into_iter().any(|id| match tree.expr(id) {
        Expr::Selector { x, .. } => tree.ident(*x) == Some(name),
        Expr::RawType(text) => text_mentions(text, name),
        Expr::FuncLit { body, .. } => block_mentions(tree, *body, name),
        _ => false,
    })
}

pub fn stmt_mentions(tree: &Tree, stmt: StmtId, name: &str) -> bool {
    if let Stmt::Raw(text) = tree.stmt(stmt) {
        return text_mentions(text, name);
    }
    header_exprs(tree, stmt)
        .into_iter()
        .any(|e| expr_mentions(tree, e, name))
        || child_blocks(tree, stmt)
            .into_iter()
            .any(|b| block_mentions(tree, b, name))
}

pub fn block_mentions(tree: &Tree, block: BlockId, name: &str) -> bool {
    tree.block(block)
        .stmts
        .iter()
        .any(|s| stmt_mentions(tree, *s, name))
}

/// Qualified reference `name.` in verbatim source text.
pub fn text_mentions(text: &str, name: &str) -> bool {
    static WORD: OnceLock<Regex> = OnceLock::new();
    let word = WORD.get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*\s*\.").expect("static regex"));
    word.find_iter(text).any(|m| {
        let before_ok = m.start() == 0 || !text[..m.start()].ends_with('.');
        before_ok && m.as_str().trim_end_matches('.').trim_end() == name
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{build, print_stmt};

    struct Counter {
        seen: Vec<String>,
    }

    impl StmtVisitor for Counter {
        type Error = ();

        fn visit_stmt(&mut self, tree: &mut Tree, cursor: &Cursor<'_>) -> Result<Action, ()> {
            self.seen.push(print_stmt(tree, cursor.stmt, 0));
            Ok(Action::Keep)
        }
    }

    #[test]
    fn test_children_visited_before_parent() {
        let mut file = GoFile::parse(
            "package p\n\nfunc f() {\n\tif ok {\n\t\ta()\n\t} else if b {\n\t\tc()\n\t}\n\tgo func() {\n\t\td()\n\t}()\n}\n",
        )
        .unwrap();
        let mut v = Counter { seen: Vec::new() };
        walk_file(&mut file, WalkOptions::default(), &mut v).unwrap();
        assert_eq!(v.seen[0], "a()");
        assert_eq!(v.seen[1], "c()");
        assert!(v.seen[2].starts_with("if ok"));
        assert_eq!(v.seen[3], "d()");
    }

    #[test]
    fn test_package_var_func_literals_are_walked() {
        let src = "package p\n\nvar limit = 3\n\nvar handler = func(w http.ResponseWriter, r *http.Request) {\n\tserve(w)\n}\n\nvar (\n\tgrouped = 1\n)\n";
        let mut file = GoFile::parse(src).unwrap();
        let mut v = Counter { seen: Vec::new() };
        walk_file(&mut file, WalkOptions::default(), &mut v).unwrap();
        assert_eq!(v.seen, vec!["serve(w)".to_string()]);
        assert!(file.scope_names().contains("handler"));
        assert!(file.scope_names().contains("grouped"));
        assert!(file.references("http"));
        assert_eq!(file.print(), src);
    }

    struct Doubler;

    impl StmtVisitor for Doubler {
        type Error = ();

        fn visit_stmt(&mut self, tree: &mut Tree, cursor: &Cursor<'_>) -> Result<Action, ()> {
            if let Stmt::Expr(_) = tree.stmt(cursor.stmt) {
                let copy = tree.deep_copy_stmt(cursor.stmt);
                return Ok(Action::after(vec![copy]));
            }
            Ok(Action::Keep)
        }
    }

    #[test]
    fn test_spliced_statements_are_not_revisited() {
        let mut file = GoFile::parse("package p\n\nfunc f() {\n\ta()\n\tb()\n}\n").unwrap();
        walk_file(&mut file, WalkOptions::default(), &mut Doubler).unwrap();
        assert_eq!(
            file.print(),
            "package p\n\nfunc f() {\n\ta()\n\ta()\n\tb()\n\tb()\n}\n"
        );
    }

    #[test]
    fn test_blank_line_moves_to_inserted_statement() {
        let mut file = GoFile::parse("package p\n\nfunc f() {\n\ta()\n\n\tb()\n}\n").unwrap();
        struct Before;
        impl StmtVisitor for Before {
            type Error = ();
            fn visit_stmt(&mut self, tree: &mut Tree, cursor: &Cursor<'_>) -> Result<Action, ()> {
                if print_stmt(tree, cursor.stmt, 0) == "b()" {
                    let call = build::qualified_call(tree, "log", "Print", Vec::new());
                    return Ok(Action::before(vec![build::expr_stmt(tree, call)]));
                }
                Ok(Action::Keep)
            }
        }
        walk_file(&mut file, WalkOptions::default(), &mut Before).unwrap();
        assert_eq!(
            file.print(),
            "package p\n\nfunc f() {\n\ta()\n\n\tlog.Print()\n\tb()\n}\n"
        );
    }

    #[test]
    fn test_mentions() {
        let file = GoFile::parse(
            "package p\n\nfunc f(r *http.Request) {\n\tgo func() {\n\t\tlog.Println(x)\n\t}()\n\tvar (\n\t\ta = sql.ErrNoRows\n\t)\n}\n",
        )
        .unwrap();
        let body = file.func("f").and_then(|f| f.body).unwrap();
        assert!(block_mentions(&file.tree, body, "log"));
        assert!(block_mentions(&file.tree, body, "sql"));
        assert!(!block_mentions(&file.tree, body, "x"));
        assert!(text_mentions("x := pkg.Value", "pkg"));
        assert!(!text_mentions("x := a.pkg.Value", "pkg"));
    }
}
