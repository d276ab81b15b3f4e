/*!
# Syntax Tree

Arena-backed tree for Go function bodies. Nodes are addressed by small
copyable ids so that rewrites can splice, move and duplicate subtrees without
fighting the borrow checker over nested boxes.
*/

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StmtId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChanDir {
    Both,
    Send,
    Recv,
}

/// Parameter or result group: `a, b int` or an unnamed `error`.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub names: Vec<String>,
    pub ty: ExprId,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FuncSig {
    /// Verbatim `[T any]` list of a generic declaration.
    pub type_params: Option<String>,
    pub params: Vec<Field>,
    pub results: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident(String),
    /// Literal kept as its source text.
    BasicLit(String),
    CompositeLit {
        ty: Option<ExprId>,
        elts: Vec<ExprId>,
        open_break: bool,
        close_break: bool,
    },
    KeyValue {
        key: ExprId,
        value: ExprId,
    },
    FuncLit {
        sig: FuncSig,
        body: BlockId,
    },
    Paren(ExprId),
    Selector {
        x: ExprId,
        sel: String,
        /// The selector name starts a new line.
        broken: bool,
    },
    Index {
        x: ExprId,
        indices: Vec<ExprId>,
    },
    Slice {
        x: ExprId,
        low: Option<ExprId>,
        high: Option<ExprId>,
        max: Option<ExprId>,
        three: bool,
    },
    /// `x.(T)`, or `x.(type)` when `ty` is `None`.
    TypeAssert {
        x: ExprId,
        ty: Option<ExprId>,
    },
    Call {
        fun: ExprId,
        args: Vec<ExprId>,
        ellipsis: bool,
        open_break: bool,
        close_break: bool,
    },
    Star(ExprId),
    Unary {
        op: &'static str,
        x: ExprId,
    },
    Binary {
        op: &'static str,
        x: ExprId,
        y: ExprId,
    },
    /// `[]T` when `len` is `None`.
    ArrayType {
        len: Option<ExprId>,
        elem: ExprId,
    },
    MapType {
        key: ExprId,
        value: ExprId,
    },
    ChanType {
        dir: ChanDir,
        elem: ExprId,
    },
    FuncType(FuncSig),
    /// `struct{...}` and `interface{...}` types, kept as source text.
    RawType(String),
    /// `...T` in a parameter list, bare `...` in `[...]T`.
    Ellipsis(Option<ExprId>),
}

/// Case clause of a switch or select statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub doc: Vec<String>,
    pub kind: ClauseKind,
    pub body: BlockId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClauseKind {
    Case(Vec<ExprId>),
    Comm(StmtId),
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(ExprId),
    Assign {
        lhs: Vec<ExprId>,
        op: &'static str,
        rhs: Vec<ExprId>,
    },
    IncDec {
        x: ExprId,
        op: &'static str,
    },
    Send {
        ch: ExprId,
        value: ExprId,
    },
    Return(Vec<ExprId>),
    Defer(ExprId),
    Go(ExprId),
    Branch {
        keyword: &'static str,
        label: Option<String>,
    },
    Block(BlockId),
    If {
        init: Option<StmtId>,
        cond: ExprId,
        then: BlockId,
        /// Either another `If` or a `Block` statement.
        els: Option<StmtId>,
    },
    For {
        init: Option<StmtId>,
        cond: Option<ExprId>,
        post: Option<StmtId>,
        body: BlockId,
    },
    Range {
        key: Option<ExprId>,
        value: Option<ExprId>,
        define: bool,
        x: ExprId,
        body: BlockId,
    },
    Switch {
        init: Option<StmtId>,
        tag: Option<StmtId>,
        clauses: Vec<Clause>,
    },
    Select {
        clauses: Vec<Clause>,
    },
    Labeled {
        label: String,
        stmt: StmtId,
    },
    /// Single-spec `var` declaration.
    Var {
        names: Vec<String>,
        ty: Option<ExprId>,
        values: Vec<ExprId>,
    },
    /// Local `type`, `const` and grouped `var` declarations, verbatim.
    Raw(String),
    Comment(String),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StmtNode {
    pub stmt: Stmt,
    pub blank_before: bool,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub stmts: Vec<StmtId>,
    /// `{ ... }` written on a single line.
    pub one_line: bool,
    /// Comment on the line of the opening brace or clause colon.
    pub open_comment: Option<String>,
}

/// How a list element is separated from its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Break {
    #[default]
    Inline,
    Line,
    Blank,
}

#[derive(Debug, Clone, Default)]
pub struct Tree {
    exprs: Vec<Expr>,
    stmts: Vec<StmtNode>,
    blocks: Vec<Block>,
    pub(crate) breaks: HashMap<ExprId, Break>,
    pub(crate) leading: HashMap<ExprId, Vec<String>>,
    pub(crate) trailing: HashMap<ExprId, String>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_expr(&mut self, expr: Expr) -> ExprId {
        self.exprs.push(expr);
        ExprId(self.exprs.len() as u32 - 1)
    }

    pub fn add_stmt(&mut self, stmt: Stmt) -> StmtId {
        self.add_stmt_node(StmtNode {
            stmt,
            blank_before: false,
            comment: None,
        })
    }

    pub fn add_stmt_node(&mut self, node: StmtNode) -> StmtId {
        self.stmts.push(node);
        StmtId(self.stmts.len() as u32 - 1)
    }

    pub fn add_block(&mut self, block: Block) -> BlockId {
        self.blocks.push(block);
        BlockId(self.blocks.len() as u32 - 1)
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.0 as usize]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id.0 as usize]
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.0 as usize].stmt
    }

    pub fn stmt_mut(&mut self, id: StmtId) -> &mut Stmt {
        &mut self.stmts[id.0 as usize].stmt
    }

    pub fn stmt_node(&self, id: StmtId) -> &StmtNode {
        &self.stmts[id.0 as usize]
    }

    pub fn stmt_node_mut(&mut self, id: StmtId) -> &mut StmtNode {
        &mut self.stmts[id.0 as usize]
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0 as usize]
    }

    pub fn set_break(&mut self, id: ExprId, brk: Break) {
        if brk == Break::Inline {
            self.breaks.remove(&id);
        } else {
            self.breaks.insert(id, brk);
        }
    }

    pub fn break_before(&self, id: ExprId) -> Break {
        self.breaks.get(&id).copied().unwrap_or_default()
    }

    /// Insert statements into a block at `index`. A block that gains
    /// statements is no longer printed on one line.
    pub fn insert_stmts(&mut self, block: BlockId, index: usize, ids: &[StmtId]) {
        if ids.is_empty() {
            return;
        }
        let b = self.block_mut(block);
        b.one_line = false;
        let at = index.min(b.stmts.len());
        b.stmts.splice(at..at, ids.iter().copied());
    }

    pub fn remove_stmt(&mut self, block: BlockId, index: usize) -> Option<StmtId> {
        let b = self.block_mut(block);
        (index < b.stmts.len()).then(|| b.stmts.remove(index))
    }

    /// Replace the statement at `index` with `ids`, carrying its blank-line
    /// separation over to the first replacement.
    pub fn replace_stmt(&mut self, block: BlockId, index: usize, ids: &[StmtId]) {
        let old = self.block(block).stmts[index];
        let blank = self.stmt_node(old).blank_before;
        if let Some(first) = ids.first() {
            self.stmt_node_mut(*first).blank_before = blank;
        }
        let b = self.block_mut(block);
        b.one_line = b.one_line && ids.len() == 1;
        b.stmts.splice(index..=index, ids.iter().copied());
    }

    pub fn position_in(&self, block: BlockId, stmt: StmtId) -> Option<usize> {
        self.block(block).stmts.iter().position(|s| *s == stmt)
    }

    /// Name of an identifier expression.
    pub fn ident(&self, id: ExprId) -> Option<&str> {
        match self.expr(id) {
            Expr::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// `pkg.Name` selector on a plain identifier.
    pub fn qualified(&self, id: ExprId) -> Option<(&str, &str)> {
        match self.expr(id) {
            Expr::Selector { x, sel, .. } => self.ident(*x).map(|pkg| (pkg, sel.as_str())),
            _ => None,
        }
    }

    /// Callee of a call expression as `(qualifier, name)`; local calls have
    /// no qualifier.
    pub fn callee(&self, call: ExprId) -> Option<(Option<&str>, &str)> {
        let Expr::Call { fun, .. } = self.expr(call) else {
            return None;
        };
        match self.expr(*fun) {
            Expr::Ident(name) => Some((None, name.as_str())),
            Expr::Selector { x, sel, .. } => Some((self.ident(*x), sel.as_str())),
            _ => None,
        }
    }

    pub fn call_args(&self, call: ExprId) -> &[ExprId] {
        match self.expr(call) {
            Expr::Call { args, .. } => args,
            _ => &[],
        }
    }

    /// Duplicate an expression subtree within this tree.
    pub fn deep_copy_expr(&mut self, id: ExprId) -> ExprId {
        let snapshot = self.clone();
        DeepCopy {
            from: &snapshot,
            to: self,
        }
        .expr(id)
    }

    /// Duplicate a statement subtree within this tree.
    pub fn deep_copy_stmt(&mut self, id: StmtId) -> StmtId {
        let snapshot = self.clone();
        DeepCopy {
            from: &snapshot,
            to: self,
        }
        .stmt(id)
    }

    /// Copy a statement from another tree into this one.
    pub fn graft_stmt(&mut self, from: &Tree, id: StmtId) -> StmtId {
        DeepCopy { from, to: self }.stmt(id)
    }

    pub fn graft_expr(&mut self, from: &Tree, id: ExprId) -> ExprId {
        DeepCopy { from, to: self }.expr(id)
    }
}

/// Structural copy of subtrees from one arena into another. Copying within
/// one arena goes through a snapshot of it.
struct DeepCopy<'a> {
    from: &'a Tree,
    to: &'a mut Tree,
}

impl DeepCopy<'_> {
    fn opt_expr(&mut self, id: Option<ExprId>) -> Option<ExprId> {
        id.map(|e| self.expr(e))
    }

    fn exprs(&mut self, ids: &[ExprId]) -> Vec<ExprId> {
        ids.iter().map(|e| self.expr(*e)).collect()
    }

    fn opt_stmt(&mut self, id: Option<StmtId>) -> Option<StmtId> {
        id.map(|s| self.stmt(s))
    }

    fn sig(&mut self, sig: &FuncSig) -> FuncSig {
        FuncSig {
            type_params: sig.type_params.clone(),
            params: self.fields(&sig.params),
            results: self.fields(&sig.results),
        }
    }

    fn fields(&mut self, fields: &[Field]) -> Vec<Field> {
        fields
            .iter()
            .map(|f| Field {
                names: f.names.clone(),
                ty: self.expr(f.ty),
            })
            .collect()
    }

    fn expr(&mut self, id: ExprId) -> ExprId {
        let copied = match self.from.expr(id).clone() {
            e @ (Expr::Ident(_) | Expr::BasicLit(_) | Expr::RawType(_)) => e,
            Expr::CompositeLit {
                ty,
                elts,
                open_break,
                close_break,
            } => Expr::CompositeLit {
                ty: self.opt_expr(ty),
                elts: self.exprs(&elts),
                open_break,
                close_break,
            },
            Expr::KeyValue { key, value } => Expr::KeyValue {
                key: self.expr(key),
                value: self.expr(value),
            },
            Expr::FuncLit { sig, body } => Expr::FuncLit {
                sig: self.sig(&sig),
                body: self.block(body),
            },
            Expr::Paren(x) => Expr::Paren(self.expr(x)),
            Expr::Selector { x, sel, broken } => Expr::Selector {
                x: self.expr(x),
                sel,
                broken,
            },
            Expr::Index { x, indices } => Expr::Index {
                x: self.expr(x),
                indices: self.exprs(&indices),
            },
            Expr::Slice {
                x,
                low,
                high,
                max,
                three,
            } => Expr::Slice {
                x: self.expr(x),
                low: self.opt_expr(low),
                high: self.opt_expr(high),
                max: self.opt_expr(max),
                three,
            },
            Expr::TypeAssert { x, ty } => Expr::TypeAssert {
                x: self.expr(x),
                ty: self.opt_expr(ty),
            },
            Expr::Call {
                fun,
                args,
                ellipsis,
                open_break,
                close_break,
            } => Expr::Call {
                fun: self.expr(fun),
                args: self.exprs(&args),
                ellipsis,
                open_break,
                close_break,
            },
            Expr::Star(x) => Expr::Star(self.expr(x)),
            Expr::Unary { op, x } => Expr::Unary {
                op,
                x: self.expr(x),
            },
            Expr::Binary { op, x, y } => Expr::Binary {
                op,
                x: self.expr(x),
                y: self.expr(y),
            },
            Expr::ArrayType { len, elem } => Expr::ArrayType {
                len: self.opt_expr(len),
                elem: self.expr(elem),
            },
            Expr::MapType { key, value } => Expr::MapType {
                key: self.expr(key),
                value: self.expr(value),
            },
            Expr::ChanType { dir, elem } => Expr::ChanType {
                dir,
                elem: self.expr(elem),
            },
            Expr::FuncType(sig) => Expr::FuncType(self.sig(&sig)),
            Expr::Ellipsis(elem) => Expr::Ellipsis(self.opt_expr(elem)),
        };
        let new = self.to.add_expr(copied);
        if let Some(brk) = self.from.breaks.get(&id) {
            self.to.breaks.insert(new, *brk);
        }
        if let Some(lead) = self.from.leading.get(&id) {
            self.to.leading.insert(new, lead.clone());
        }
        if let Some(trail) = self.from.trailing.get(&id) {
            self.to.trailing.insert(new, trail.clone());
        }
        new
    }

    fn clauses(&mut self, clauses: &[Clause]) -> Vec<Clause> {
        clauses
            .iter()
            .map(|c| Clause {
                doc: c.doc.clone(),
                kind: match &c.kind {
                    ClauseKind::Case(list) => ClauseKind::Case(self.exprs(list)),
                    ClauseKind::Comm(s) => ClauseKind::Comm(self.stmt(*s)),
                    ClauseKind::Default => ClauseKind::Default,
                },
                body: self.block(c.body),
            })
            .collect()
    }

    fn stmt(&mut self, id: StmtId) -> StmtId {
        let node = self.from.stmt_node(id).clone();
        let stmt = match node.stmt {
            Stmt::Expr(x) => Stmt::Expr(self.expr(x)),
            Stmt::Assign { lhs, op, rhs } => Stmt::Assign {
                lhs: self.exprs(&lhs),
                op,
                rhs: self.exprs(&rhs),
            },
            Stmt::IncDec { x, op } => Stmt::IncDec {
                x: self.expr(x),
                op,
            },
            Stmt::Send { ch, value } => Stmt::Send {
                ch: self.expr(ch),
                value: self.expr(value),
            },
            Stmt::Return(results) => Stmt::Return(self.exprs(&results)),
            Stmt::Defer(x) => Stmt::Defer(self.expr(x)),
            Stmt::Go(x) => Stmt::Go(self.expr(x)),
            Stmt::Block(b) => Stmt::Block(self.block(b)),
            Stmt::If {
                init,
                cond,
                then,
                els,
            } => Stmt::If {
                init: self.opt_stmt(init),
                cond: self.expr(cond),
                then: self.block(then),
                els: self.opt_stmt(els),
            },
            Stmt::For {
                init,
                cond,
                post,
                body,
            } => Stmt::For {
                init: self.opt_stmt(init),
                cond: self.opt_expr(cond),
                post: self.opt_stmt(post),
                body: self.block(body),
            },
            Stmt::Range {
                key,
                value,
                define,
                x,
                body,
            } => Stmt::Range {
                key: self.opt_expr(key),
                value: self.opt_expr(value),
                define,
                x: self.expr(x),
                body: self.block(body),
            },
            Stmt::Switch { init, tag, clauses } => Stmt::Switch {
                init: self.opt_stmt(init),
                tag: self.opt_stmt(tag),
                clauses: self.clauses(&clauses),
            },
            Stmt::Select { clauses } => Stmt::Select {
                clauses: self.clauses(&clauses),
            },
            Stmt::Labeled { label, stmt } => Stmt::Labeled {
                label,
                stmt: self.stmt(stmt),
            },
            Stmt::Var { names, ty, values } => Stmt::Var {
                names,
                ty: self.opt_expr(ty),
                values: self.exprs(&values),
            },
            s @ (Stmt::Branch { .. } | Stmt::Raw(_) | Stmt::Comment(_) | Stmt::Empty) => s,
        };
        self.to.add_stmt_node(StmtNode {
            stmt,
            blank_before: node.blank_before,
            comment: node.comment,
        })
    }

    fn block(&mut self, id: BlockId) -> BlockId {
        let block = self.from.block(id).clone();
        let stmts = block.stmts.iter().map(|s| self.stmt(*s)).collect();
        self.to.add_block(Block {
            stmts,
            one_line: block.one_line,
            open_comment: block.open_comment,
        })
    }
}
