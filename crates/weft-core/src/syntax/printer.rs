/*!
# Go Printer

Canonical printer for the syntax tree, following gofmt's layout: tab
indentation, precedence-aware spacing around binary operators, column
alignment of composite-literal values and trailing comments.
*/

use super::token::{precedence, HIGHEST_PREC, UNARY_PREC};
use super::tree::{
    BlockId, Break, ChanDir, Clause, ClauseKind, Expr, ExprId, Field, FuncSig, Stmt, StmtId, Tree,
};
use super::{Decl, FuncDecl, ImportDecl, ImportSpec};

/// Key sizes above this never align on their own.
const SMALL_SIZE: usize = 40;
/// Ratio to the running geometric mean of key sizes that breaks alignment.
const ALIGN_RATIO: f64 = 2.5;

pub fn print_decl(tree: &Tree, decl: &Decl) -> String {
    let mut p = Printer::new(tree, 0);
    match decl {
        Decl::Import(import) => p.import_decl(import),
        Decl::Func(func) => p.func_decl(func),
        Decl::Var(stmt) => p.stmt(*stmt),
        Decl::Raw { text, .. } => p.out.push_str(text),
        Decl::Comment(text) => p.out.push_str(text),
    }
    p.out
}

pub fn print_stmt(tree: &Tree, stmt: StmtId, indent: usize) -> String {
    let mut p = Printer::new(tree, indent);
    p.stmt(stmt);
    p.out
}

pub fn print_expr(tree: &Tree, expr: ExprId) -> String {
    let mut p = Printer::new(tree, 0);
    p.expr(expr);
    p.out
}

struct Printer<'t> {
    tree: &'t Tree,
    out: String,
    indent: usize,
}

/// One rendered list element.
struct Element {
    brk: Break,
    leading: Vec<String>,
    /// Key cell (`Key:`) and value, for aligned key/value pairs.
    cell: Option<(String, String)>,
    text: String,
    trailing: Option<String>,
    /// A formfeed precedes this element; alignment sections restart.
    section_start: bool,
}

impl<'t> Printer<'t> {
    fn new(tree: &'t Tree, indent: usize) -> Self {
        Self {
            tree,
            out: String::new(),
            indent,
        }
    }

    fn render(&self, indent: usize, f: impl FnOnce(&mut Printer<'t>)) -> String {
        let mut p = Printer::new(self.tree, indent);
        f(&mut p);
        p.out
    }

    fn newline(&mut self) {
        self.out.push('\n');
        push_tabs(&mut self.out, self.indent);
    }

    // ----- declarations -----

    fn import_decl(&mut self, decl: &ImportDecl) {
        if !decl.grouped {
            self.out.push_str("import ");
            if let Some(spec) = decl.specs.first() {
                self.import_spec(spec);
            }
            return;
        }
        self.out.push_str("import (");
        self.indent += 1;
        for spec in &decl.specs {
            if spec.blank_before {
                self.out.push('\n');
            }
            for doc in &spec.doc {
                self.newline();
                self.out.push_str(doc);
            }
            self.newline();
            self.import_spec(spec);
        }
        for c in &decl.tail {
            self.newline();
            self.out.push_str(c);
        }
        self.indent -= 1;
        self.newline();
        self.out.push(')');
    }

    fn import_spec(&mut self, spec: &ImportSpec) {
        if let Some(name) = &spec.name {
            self.out.push_str(name);
            self.out.push(' ');
        }
        self.out.push('"');
        self.out.push_str(&spec.path);
        self.out.push('"');
        if let Some(c) = &spec.comment {
            self.out.push(' ');
            self.out.push_str(c);
        }
    }

    fn func_decl(&mut self, func: &FuncDecl) {
        self.out.push_str("func ");
        if let Some(recv) = &func.recv {
            self.out.push('(');
            self.field(recv);
            self.out.push_str(") ");
        }
        self.out.push_str(&func.name);
        self.signature(&func.sig);
        if let Some(body) = func.body {
            self.out.push(' ');
            self.block(body);
        }
    }

    fn signature(&mut self, sig: &FuncSig) {
        if let Some(tp) = &sig.type_params {
            self.out.push_str(tp);
        }
        self.out.push('(');
        self.fields(&sig.params);
        self.out.push(')');
        match sig.results.as_slice() {
            [] => {}
            [only] if only.names.is_empty() => {
                self.out.push(' ');
                self.expr(only.ty);
            }
            results => {
                self.out.push_str(" (");
                self.fields(results);
                self.out.push(')');
            }
        }
    }

    fn fields(&mut self, fields: &[Field]) {
        for (i, f) in fields.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.field(f);
        }
    }

    fn field(&mut self, field: &Field) {
        if !field.names.is_empty() {
            self.out.push_str(&field.names.join(", "));
            self.out.push(' ');
        }
        self.expr(field.ty);
    }

    // ----- statements -----

    fn block(&mut self, id: BlockId) {
        let tree = self.tree;
        let block = tree.block(id);
        if block.stmts.is_empty() && block.open_comment.is_none() {
            if block.one_line {
                self.out.push_str("{}");
            } else {
                self.out.push('{');
                self.newline();
                self.out.push('}');
            }
            return;
        }
        if block.one_line && block.open_comment.is_none() {
            if let Some(inline) = self.inline_stmts(&block.stmts) {
                self.out.push_str("{ ");
                self.out.push_str(&inline);
                self.out.push_str(" }");
                return;
            }
        }
        self.out.push('{');
        if let Some(c) = &block.open_comment {
            self.out.push(' ');
            self.out.push_str(c);
        }
        self.indent += 1;
        self.stmt_list(&block.stmts);
        self.indent -= 1;
        self.newline();
        self.out.push('}');
    }

    /// Statements joined on one line, if all of them fit there.
    fn inline_stmts(&self, stmts: &[StmtId]) -> Option<String> {
        let mut parts = Vec::new();
        for s in stmts {
            let node = self.tree.stmt_node(*s);
            if node.comment.is_some() || matches!(node.stmt, Stmt::Comment(_) | Stmt::Labeled { .. }) {
                return None;
            }
            let text = self.render(self.indent, |p| p.stmt(*s));
            if text.contains('\n') {
                return None;
            }
            parts.push(text);
        }
        Some(parts.join("; "))
    }

    /// Statements of a block at the current indentation, each on its own line
    /// with runs of trailing comments aligned.
    fn stmt_list(&mut self, stmts: &[StmtId]) {
        let rendered: Vec<String> = stmts
            .iter()
            .map(|s| self.render(self.indent, |p| p.stmt(*s)))
            .collect();
        let mut widths = vec![0usize; stmts.len()];
        let mut i = 0;
        while i < stmts.len() {
            let aligned = |j: usize| {
                let node = self.tree.stmt_node(stmts[j]);
                node.comment.is_some() && !rendered[j].contains('\n')
            };
            if !aligned(i) {
                i += 1;
                continue;
            }
            let mut j = i + 1;
            while j < stmts.len() && aligned(j) && !self.tree.stmt_node(stmts[j]).blank_before {
                j += 1;
            }
            let width = rendered[i..j].iter().map(|t| t.chars().count()).max().unwrap_or(0);
            widths[i..j].iter_mut().for_each(|w| *w = width);
            i = j;
        }
        let tree = self.tree;
        for (k, s) in stmts.iter().enumerate() {
            let node = tree.stmt_node(*s);
            if node.blank_before && k > 0 {
                self.out.push('\n');
            }
            self.out.push('\n');
            let labeled = matches!(node.stmt, Stmt::Labeled { .. });
            push_tabs(&mut self.out, if labeled { self.indent.saturating_sub(1) } else { self.indent });
            self.out.push_str(&rendered[k]);
            if let Some(c) = &node.comment {
                let pad = widths[k].max(rendered[k].chars().count()) - rendered[k].chars().count();
                self.out.push_str(&" ".repeat(pad + 1));
                self.out.push_str(c);
            }
        }
    }

    fn stmt(&mut self, id: StmtId) {
        let tree = self.tree;
        match tree.stmt(id) {
            Stmt::Expr(x) => self.expr0(*x, 1),
            Stmt::Assign { lhs, op, rhs } => {
                let depth = if lhs.len() > 1 && rhs.len() > 1 { 2 } else { 1 };
                self.flat_list(lhs, depth);
                self.out.push(' ');
                self.out.push_str(op);
                self.out.push(' ');
                self.flat_list(rhs, depth);
            }
            Stmt::IncDec { x, op } => {
                self.expr0(*x, 2);
                self.out.push_str(op);
            }
            Stmt::Send { ch, value } => {
                self.expr0(*ch, 1);
                self.out.push_str(" <- ");
                self.expr0(*value, 1);
            }
            Stmt::Return(results) => {
                self.out.push_str("return");
                if !results.is_empty() {
                    self.out.push(' ');
                    self.flat_list(results, 1);
                }
            }
            Stmt::Defer(x) => {
                self.out.push_str("defer ");
                self.expr(*x);
            }
            Stmt::Go(x) => {
                self.out.push_str("go ");
                self.expr(*x);
            }
            Stmt::Branch { keyword, label } => {
                self.out.push_str(keyword);
                if let Some(label) = label {
                    self.out.push(' ');
                    self.out.push_str(label);
                }
            }
            Stmt::Block(b) => self.block(*b),
            Stmt::If { .. } => self.if_stmt(id),
            Stmt::For {
                init,
                cond,
                post,
                body,
            } => {
                self.out.push_str("for ");
                if init.is_some() || post.is_some() {
                    if let Some(init) = init {
                        self.stmt(*init);
                    }
                    self.out.push_str("; ");
                    if let Some(cond) = cond {
                        self.expr(*cond);
                    }
                    self.out.push_str("; ");
                    if let Some(post) = post {
                        self.stmt(*post);
                        self.out.push(' ');
                    }
                } else if let Some(cond) = cond {
                    self.expr(*cond);
                    self.out.push(' ');
                }
                self.block(*body);
            }
            Stmt::Range {
                key,
                value,
                define,
                x,
                body,
            } => {
                self.out.push_str("for ");
                if let Some(key) = key {
                    self.expr(*key);
                    if let Some(value) = value {
                        self.out.push_str(", ");
                        self.expr(*value);
                    }
                    self.out.push_str(if *define { " := " } else { " = " });
                }
                self.out.push_str("range ");
                self.expr(*x);
                self.out.push(' ');
                self.block(*body);
            }
            Stmt::Switch { init, tag, clauses } => {
                self.out.push_str("switch ");
                if let Some(init) = init {
                    self.stmt(*init);
                    self.out.push_str("; ");
                }
                if let Some(tag) = tag {
                    self.stmt(*tag);
                    self.out.push(' ');
                }
                self.clauses(clauses);
            }
            Stmt::Select { clauses } => {
                self.out.push_str("select ");
                self.clauses(clauses);
            }
            Stmt::Labeled { label, stmt } => {
                self.out.push_str(label);
                self.out.push(':');
                if !matches!(tree.stmt(*stmt), Stmt::Empty) {
                    self.newline();
                    self.stmt(*stmt);
                }
            }
            Stmt::Var { names, ty, values } => {
                self.out.push_str("var ");
                self.out.push_str(&names.join(", "));
                if let Some(ty) = ty {
                    self.out.push(' ');
                    self.expr(*ty);
                }
                if !values.is_empty() {
                    self.out.push_str(" = ");
                    self.flat_list(values, 1);
                }
            }
            Stmt::Raw(text) | Stmt::Comment(text) => self.out.push_str(text),
            Stmt::Empty => {}
        }
    }

    fn if_stmt(&mut self, id: StmtId) {
        let Stmt::If {
            init,
            cond,
            then,
            els,
        } = self.tree.stmt(id)
        else {
            return;
        };
        let (init, cond, then, els) = (*init, *cond, *then, *els);
        self.out.push_str("if ");
        if let Some(init) = init {
            self.stmt(init);
            self.out.push_str("; ");
        }
        self.expr(cond);
        self.out.push(' ');
        self.block(then);
        if let Some(els) = els {
            self.out.push_str(" else ");
            self.stmt(els);
        }
    }

    fn clauses(&mut self, clauses: &[Clause]) {
        self.out.push('{');
        for clause in clauses {
            for doc in &clause.doc {
                self.newline();
                self.out.push_str(doc);
            }
            self.newline();
            match &clause.kind {
                ClauseKind::Case(list) => {
                    self.out.push_str("case ");
                    self.flat_list(list, 1);
                }
                ClauseKind::Comm(s) => {
                    self.out.push_str("case ");
                    self.stmt(*s);
                }
                ClauseKind::Default => self.out.push_str("default"),
            }
            self.out.push(':');
            let tree = self.tree;
            let body = tree.block(clause.body);
            if let Some(c) = &body.open_comment {
                self.out.push(' ');
                self.out.push_str(c);
            }
            self.indent += 1;
            self.stmt_list(&body.stmts);
            self.indent -= 1;
        }
        self.newline();
        self.out.push('}');
    }

    // ----- expressions -----

    fn expr(&mut self, id: ExprId) {
        self.expr1(id, 0, 1);
    }

    fn expr0(&mut self, id: ExprId, depth: usize) {
        self.expr1(id, 0, depth);
    }

    fn flat_list(&mut self, list: &[ExprId], depth: usize) {
        for (i, e) in list.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.expr0(*e, depth);
        }
    }

    fn expr1(&mut self, id: ExprId, prec1: u8, depth: usize) {
        let tree = self.tree;
        match tree.expr(id) {
            Expr::Ident(name) => self.out.push_str(name),
            Expr::BasicLit(text) | Expr::RawType(text) => self.out.push_str(text),
            Expr::Binary { .. } => self.binary(id, prec1, depth.max(1)),
            Expr::KeyValue { key, value } => {
                self.expr(*key);
                self.out.push_str(": ");
                self.expr(*value);
            }
            Expr::Star(x) => {
                if UNARY_PREC < prec1 {
                    self.out.push_str("(*");
                    self.expr(*x);
                    self.out.push(')');
                } else {
                    self.out.push('*');
                    self.expr(*x);
                }
            }
            Expr::Unary { op, x } => {
                if UNARY_PREC < prec1 {
                    self.out.push('(');
                    self.expr(id);
                    self.out.push(')');
                } else {
                    self.out.push_str(op);
                    self.expr1(*x, UNARY_PREC, depth);
                }
            }
            Expr::Paren(x) => {
                if matches!(self.tree.expr(*x), Expr::Paren(_)) {
                    self.expr0(*x, depth);
                } else {
                    self.out.push('(');
                    self.expr0(*x, reduce_depth(depth));
                    self.out.push(')');
                }
            }
            Expr::Selector { .. } => {
                if self.selector(id, depth) {
                    self.indent -= 1;
                }
            }
            Expr::TypeAssert { x, ty } => {
                self.expr1(*x, HIGHEST_PREC, depth);
                self.out.push_str(".(");
                match ty {
                    Some(ty) => self.expr(*ty),
                    None => self.out.push_str("type"),
                }
                self.out.push(')');
            }
            Expr::Index { x, indices } => {
                self.expr1(*x, HIGHEST_PREC, 1);
                self.out.push('[');
                self.flat_list(indices, depth + 1);
                self.out.push(']');
            }
            Expr::Slice {
                x,
                low,
                high,
                max,
                three,
            } => {
                self.expr1(*x, HIGHEST_PREC, 1);
                self.out.push('[');
                let mut indices = vec![*low, *high];
                if *three {
                    indices.push(*max);
                }
                let needs_blanks = depth <= 1 && {
                    let present: Vec<ExprId> = indices.iter().flatten().copied().collect();
                    present.len() > 1
                        && present
                            .iter()
                            .any(|e| matches!(self.tree.expr(*e), Expr::Binary { .. }))
                };
                for (i, index) in indices.iter().enumerate() {
                    if i > 0 {
                        if indices[i - 1].is_some() && needs_blanks {
                            self.out.push(' ');
                        }
                        self.out.push(':');
                        if index.is_some() && needs_blanks {
                            self.out.push(' ');
                        }
                    }
                    if let Some(index) = index {
                        self.expr0(*index, depth + 1);
                    }
                }
                self.out.push(']');
            }
            Expr::Call {
                fun,
                args,
                ellipsis,
                open_break,
                close_break,
            } => {
                let depth = if args.len() > 1 { depth + 1 } else { depth };
                let indented = if matches!(self.tree.expr(*fun), Expr::FuncType(_)) {
                    self.out.push('(');
                    self.expr1(*fun, HIGHEST_PREC, depth);
                    self.out.push(')');
                    false
                } else if matches!(self.tree.expr(*fun), Expr::Selector { .. }) {
                    self.selector(*fun, depth)
                } else {
                    self.expr1(*fun, HIGHEST_PREC, depth);
                    false
                };
                self.out.push('(');
                self.list(args, depth, *open_break, *close_break, *ellipsis);
                self.out.push(')');
                if indented {
                    self.indent -= 1;
                }
            }
            Expr::CompositeLit {
                ty,
                elts,
                open_break,
                close_break,
            } => {
                if let Some(ty) = ty {
                    self.expr1(*ty, HIGHEST_PREC, depth);
                }
                self.out.push('{');
                self.list(elts, 1, *open_break, *close_break, false);
                self.out.push('}');
            }
            Expr::FuncLit { sig, body } => {
                self.out.push_str("func");
                self.signature(sig);
                self.out.push(' ');
                self.block(*body);
            }
            Expr::FuncType(sig) => {
                self.out.push_str("func");
                self.signature(sig);
            }
            Expr::ArrayType { len, elem } => {
                self.out.push('[');
                if let Some(len) = len {
                    self.expr(*len);
                }
                self.out.push(']');
                self.expr(*elem);
            }
            Expr::MapType { key, value } => {
                self.out.push_str("map[");
                self.expr(*key);
                self.out.push(']');
                self.expr(*value);
            }
            Expr::ChanType { dir, elem } => {
                self.out.push_str(match dir {
                    ChanDir::Both => "chan ",
                    ChanDir::Send => "chan<- ",
                    ChanDir::Recv => "<-chan ",
                });
                self.expr(*elem);
            }
            Expr::Ellipsis(elem) => {
                self.out.push_str("...");
                if let Some(elem) = elem {
                    self.expr(*elem);
                }
            }
        }
    }

    /// Print a selector; returns true when a line break before the name
    /// left the indentation raised for the caller to restore.
    fn selector(&mut self, id: ExprId, depth: usize) -> bool {
        let tree = self.tree;
        let Expr::Selector { x, sel, broken } = tree.expr(id) else {
            return false;
        };
        self.expr1(*x, HIGHEST_PREC, depth);
        self.out.push('.');
        if *broken {
            self.indent += 1;
            self.newline();
        }
        self.out.push_str(sel);
        *broken
    }

    fn binary(&mut self, id: ExprId, prec1: u8, depth: usize) {
        let tree = self.tree;
        let Expr::Binary { op, x, y } = tree.expr(id) else {
            return;
        };
        let prec = precedence(op);
        if prec < prec1 {
            self.out.push('(');
            self.expr0(id, reduce_depth(depth));
            self.out.push(')');
            return;
        }
        let blank = prec < self.cutoff(id, depth);
        self.expr1(*x, prec, depth + self.diff_prec(*x, prec));
        if blank {
            self.out.push(' ');
        }
        self.out.push_str(op);
        if blank {
            self.out.push(' ');
        }
        self.expr1(*y, prec + 1, depth + 1);
    }

    fn diff_prec(&self, id: ExprId, prec: u8) -> usize {
        match self.tree.expr(id) {
            Expr::Binary { op, .. } if precedence(op) == prec => 0,
            _ => 1,
        }
    }

    fn cutoff(&self, id: ExprId, depth: usize) -> u8 {
        let (has4, has5, max_problem) = self.walk_binary(id);
        if max_problem > 0 {
            return max_problem + 1;
        }
        match (has4 && has5, depth == 1) {
            (true, true) => 5,
            (true, false) => 4,
            (false, true) => 6,
            (false, false) => 4,
        }
    }

    fn walk_binary(&self, id: ExprId) -> (bool, bool, u8) {
        let Expr::Binary { op, x, y } = self.tree.expr(id) else {
            return (false, false, 0);
        };
        let prec = precedence(op);
        let mut has4 = prec == 4;
        let mut has5 = prec == 5;
        let mut max_problem = 0;
        if let Expr::Binary { op: lop, .. } = self.tree.expr(*x) {
            if precedence(lop) >= prec {
                let (h4, h5, mp) = self.walk_binary(*x);
                has4 |= h4;
                has5 |= h5;
                max_problem = max_problem.max(mp);
            }
        }
        match self.tree.expr(*y) {
            Expr::Binary { op: rop, .. } if precedence(rop) > prec => {
                let (h4, h5, mp) = self.walk_binary(*y);
                has4 |= h4;
                has5 |= h5;
                max_problem = max_problem.max(mp);
            }
            Expr::Star(_) if *op == "/" => max_problem = 5,
            Expr::Unary { op: uop, .. } => match format!("{op}{uop}").as_str() {
                "/*" | "&&" | "&^" => max_problem = 5,
                "++" | "--" => max_problem = max_problem.max(4),
                _ => {}
            },
            _ => {}
        }
        (has4, has5, max_problem)
    }

    /// Comma-separated element list of a call or composite literal.
    fn list(&mut self, elts: &[ExprId], depth: usize, open_break: bool, close_break: bool, ellipsis: bool) {
        if elts.is_empty() {
            return;
        }
        let indented = open_break
            || close_break
            || elts[1..].iter().any(|e| self.tree.break_before(*e) != Break::Inline);
        let inner = if indented { self.indent + 1 } else { self.indent };
        let elements = self.layout(elts, depth, inner, open_break);

        // Column widths for key cells and trailing comments, per section.
        let n = elements.len();
        let mut key_width = vec![0usize; n];
        let mut comment_col = vec![0usize; n];
        let mut start = 0;
        while start < n {
            let mut end = start + 1;
            while end < n && !elements[end].section_start {
                end += 1;
            }
            let mut i = start;
            while i < end {
                if elements[i].cell.is_none() {
                    i += 1;
                    continue;
                }
                let mut j = i + 1;
                while j < end && elements[j].cell.is_some() {
                    j += 1;
                }
                let width = elements[i..j]
                    .iter()
                    .filter_map(|e| e.cell.as_ref().map(|(k, _)| k.chars().count()))
                    .max()
                    .unwrap_or(0);
                key_width[i..j].iter_mut().for_each(|w| *w = width);
                i = j;
            }
            i = start;
            while i < end {
                if elements[i].trailing.is_none() {
                    i += 1;
                    continue;
                }
                let mut j = i + 1;
                while j < end && elements[j].trailing.is_some() && elements[j].brk != Break::Inline {
                    j += 1;
                }
                let width = (i..j)
                    .map(|k| line_width(&elements[k], key_width[k]))
                    .max()
                    .unwrap_or(0);
                comment_col[i..j].iter_mut().for_each(|w| *w = width);
                i = j;
            }
            start = end;
        }

        let base = self.indent;
        self.indent = inner;
        for (i, el) in elements.iter().enumerate() {
            let line_start = if i == 0 { open_break } else { el.brk != Break::Inline };
            if i > 0 && !line_start {
                self.out.push(' ');
            }
            if line_start {
                if el.brk == Break::Blank {
                    self.out.push('\n');
                }
                for c in &el.leading {
                    self.newline();
                    self.out.push_str(c);
                }
                self.newline();
            }
            let text = match &el.cell {
                Some((key, value)) => {
                    let pad = key_width[i] - key.chars().count();
                    format!("{key}{} {value}", " ".repeat(pad))
                }
                None => el.text.clone(),
            };
            let width = text.chars().count();
            self.out.push_str(&text);
            let last = i + 1 == n;
            if last && ellipsis {
                self.out.push_str("...");
            }
            if !last || close_break {
                self.out.push(',');
            }
            if let Some(c) = &el.trailing {
                let comma = usize::from(!last || close_break);
                let pad = comment_col[i].saturating_sub(width + comma);
                self.out.push_str(&" ".repeat(pad + 1));
                self.out.push_str(c);
            }
        }
        self.indent = base;
        if close_break {
            self.newline();
        }
    }

    /// Render list elements and decide where alignment sections break, the
    /// way gofmt's expression-list layout does.
    fn layout(&self, elts: &[ExprId], depth: usize, inner: usize, open_break: bool) -> Vec<Element> {
        let mut elements = Vec::with_capacity(elts.len());
        let mut size = 0usize;
        let mut lnsum = 0f64;
        let mut count = 0usize;
        let mut prev_break: isize = if open_break { 0 } else { -1 };
        for (i, e) in elts.iter().enumerate() {
            let brk = if i == 0 {
                if open_break {
                    Break::Line
                } else {
                    Break::Inline
                }
            } else {
                self.tree.break_before(*e)
            };
            let needs_linebreak = brk != Break::Inline;
            let text = self.render(inner, |p| p.expr0(*e, depth));
            let pair = match self.tree.expr(*e) {
                Expr::KeyValue { key, value } => Some((*key, *value)),
                _ => None,
            };
            let prev_size = size;
            size = if text.contains('\n') {
                0
            } else if let Some((key, _)) = pair {
                self.render(inner, |p| p.expr(key)).chars().count()
            } else {
                text.chars().count()
            };

            let mut use_ff = true;
            if prev_size > 0 && size > 0 {
                if count == 0 || (prev_size <= SMALL_SIZE && size <= SMALL_SIZE) {
                    use_ff = false;
                } else {
                    let geomean = (lnsum / count as f64).exp();
                    let ratio = size as f64 / geomean;
                    use_ff = ALIGN_RATIO * ratio <= 1.0 || ALIGN_RATIO <= ratio;
                }
            }
            let mut section_start = false;
            if i > 0 && needs_linebreak {
                section_start = use_ff || prev_break + 1 < i as isize || brk == Break::Blank;
                prev_break = i as isize;
                if brk == Break::Blank {
                    lnsum = 0.0;
                    count = 0;
                }
            }
            let leading = self.tree.leading.get(e).cloned().unwrap_or_default();
            if !leading.is_empty() {
                section_start = true;
            }

            let cell = match pair {
                Some((key, value)) if elts.len() > 1 && size > 0 && needs_linebreak => {
                    let key_text = self.render(inner, |p| p.expr(key));
                    let value_text = self.render(inner, |p| p.expr(value));
                    Some((format!("{key_text}:"), value_text))
                }
                _ => None,
            };
            if size > 0 {
                lnsum += (size as f64).ln();
                count += 1;
            }
            elements.push(Element {
                brk,
                leading,
                cell,
                text,
                trailing: self.tree.trailing.get(e).cloned(),
                section_start,
            });
        }
        elements
    }
}

fn line_width(el: &Element, key_width: usize) -> usize {
    match &el.cell {
        Some((_, value)) => key_width + 1 + value.chars().count(),
        None => el.text.chars().count(),
    }
}

fn reduce_depth(depth: usize) -> usize {
    depth.saturating_sub(1).max(1)
}

fn push_tabs(out: &mut String, n: usize) {
    for _ in 0..n {
        out.push('\t');
    }
}

#[cfg(test)]
mod tests {
    use super::super::GoFile;
    use pretty_assertions::assert_eq;

    fn roundtrip(src: &str) {
        let mut file = GoFile::parse(src).unwrap();
        file.invalidate_verbatim();
        assert_eq!(file.print(), src);
    }

    #[test]
    fn test_binary_spacing() {
        roundtrip(
            "package p\n\nfunc f() {\n\tx := a + b*c\n\ty := (a + b) * c\n\tz := f(a+b, c)\n\tok := a == b && c != d\n\ts := buf[i+1 : n]\n}\n",
        );
    }

    #[test]
    fn test_control_flow() {
        roundtrip(
            "package p\n\nfunc f(xs []int) error {\n\tfor i, x := range xs {\n\t\tif x > i {\n\t\t\tcontinue\n\t\t} else if x == 0 {\n\t\t\tbreak\n\t\t} else {\n\t\t\treturn nil\n\t\t}\n\t}\n\tswitch v := g(); v {\n\tcase 1, 2:\n\t\th()\n\tdefault:\n\t}\n\treturn nil\n}\n",
        );
    }

    #[test]
    fn test_composite_alignment() {
        roundtrip(
            "package main\n\nfunc main() {\n\tsrv := &http.Server{\n\t\tAddr:    \":8080\",\n\t\tHandler: mux,\n\t}\n\t_ = srv\n}\n",
        );
    }

    #[test]
    fn test_trailing_comment_alignment() {
        roundtrip(
            "package p\n\nfunc f() {\n\tx := 1       // one\n\tlonger := 22 // two\n\n\ty := 3 // three\n}\n",
        );
    }

    #[test]
    fn test_func_literal_and_multiline_call() {
        roundtrip(
            "package p\n\nfunc f() {\n\tsort.Slice(xs, func(i, j int) bool { return xs[i] < xs[j] })\n\tgo func() {\n\t\tdone <- struct{}{}\n\t}()\n\tlog.Printf(\n\t\t\"%s %d\",\n\t\tname,\n\t\tcount,\n\t)\n}\n",
        );
    }

    #[test]
    fn test_labels_and_selects() {
        roundtrip(
            "package p\n\nfunc f(ch chan int) {\nouter:\n\tfor {\n\t\tselect {\n\t\tcase v := <-ch:\n\t\t\t_ = v\n\t\t\tbreak outer\n\t\tdefault:\n\t\t}\n\t}\n}\n",
        );
    }

    #[test]
    fn test_method_chain_breaks() {
        roundtrip(
            "package p\n\nfunc f() {\n\tr.Get(\"/\").\n\t\tName(\"root\")\n}\n",
        );
    }
}
