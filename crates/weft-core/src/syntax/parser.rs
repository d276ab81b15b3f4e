/*!
# Go Parser

Recursive-descent parser producing a [`GoFile`]. Function bodies are parsed
into the arena [`Tree`]; top-level `type`, `var` and `const` declarations are
kept as verbatim source text since no rewrite ever looks inside them.

Comments on their own lines become comment statements or declarations,
same-line comments attach to the preceding statement, declaration or list
element.
*/

use super::lexer::{tokenize, Comment};
use super::token::{is_assign_op, precedence, Tok, Token};
use super::tree::{
    Block, BlockId, Break, ChanDir, Clause, ClauseKind, Expr, ExprId, Field, FuncSig, Stmt,
    StmtId, StmtNode, Tree,
};
use super::{Decl, DeclNode, FuncDecl, GoFile, ImportDecl, ImportSpec, ParseError};

pub fn parse_file(src: &str) -> Result<GoFile, ParseError> {
    let lexed = tokenize(src)?;
    let p = Parser {
        src,
        toks: lexed.tokens,
        pos: 0,
        comments: lexed.comments,
        next_comment: 0,
        tree: Tree::new(),
        expr_lev: 0,
        prev_end: 0,
        prev_line: 1,
    };
    p.file()
}

struct Parser<'a> {
    src: &'a str,
    toks: Vec<Token>,
    pos: usize,
    comments: Vec<Comment>,
    next_comment: usize,
    tree: Tree,
    /// < 0 inside control clauses, where `T {` opens a block rather than a
    /// composite literal.
    expr_lev: i32,
    prev_end: usize,
    prev_line: u32,
}

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Basic,
    LabelOk,
}

impl<'a> Parser<'a> {
    fn tok(&self) -> Token {
        self.toks[self.pos.min(self.toks.len() - 1)]
    }

    fn peek(&self, n: usize) -> Token {
        self.toks[(self.pos + n).min(self.toks.len() - 1)]
    }

    fn text(&self, tok: Token) -> &'a str {
        &self.src[tok.start..tok.end]
    }

    fn next(&mut self) -> Token {
        let tok = self.tok();
        if !matches!(tok.tok, Tok::Semi { auto: true } | Tok::Eof) {
            self.prev_end = tok.end;
            self.prev_line = tok.end_line;
        }
        if self.pos < self.toks.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, ParseError> {
        Err(ParseError {
            line: self.tok().line,
            message: message.into(),
        })
    }

    fn describe(&self, tok: Token) -> String {
        match tok.tok {
            Tok::Eof => "EOF".to_string(),
            Tok::Semi { auto: true } => "newline".to_string(),
            _ => format!("{:?}", self.text(tok)),
        }
    }

    fn at_op(&self, op: &str) -> bool {
        self.tok().is_op(op)
    }

    fn at_kw(&self, kw: &str) -> bool {
        self.tok().is_kw(kw)
    }

    fn got_op(&mut self, op: &str) -> bool {
        if self.at_op(op) {
            self.next();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<Token, ParseError> {
        if self.at_op(op) {
            Ok(self.next())
        } else {
            let found = self.describe(self.tok());
            self.error(format!("expected {op:?}, found {found}"))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        let tok = self.tok();
        if tok.tok == Tok::Ident {
            self.next();
            Ok(self.text(tok).to_string())
        } else {
            let found = self.describe(tok);
            self.error(format!("expected identifier, found {found}"))
        }
    }

    /// A statement ends at a semicolon, or implicitly before a closing
    /// bracket.
    fn expect_semi(&mut self) -> Result<(), ParseError> {
        let tok = self.tok();
        match tok.tok {
            Tok::Semi { .. } => {
                self.next();
                Ok(())
            }
            Tok::Op(")") | Tok::Op("}") | Tok::Eof => Ok(()),
            _ => {
                let found = self.describe(tok);
                self.error(format!("expected ';', found {found}"))
            }
        }
    }

    fn take_comments_before(&mut self, offset: usize) -> Vec<Comment> {
        let mut taken = Vec::new();
        while let Some(c) = self.comments.get(self.next_comment) {
            if c.start >= offset {
                break;
            }
            taken.push(c.clone());
            self.next_comment += 1;
        }
        taken
    }

    fn take_trailing(&mut self, line: u32, after: usize) -> Option<String> {
        let c = self.comments.get(self.next_comment)?;
        if c.line == line && c.end_line == line && c.start >= after {
            self.next_comment += 1;
            Some(c.text.clone())
        } else {
            None
        }
    }

    // ----- declarations -----

    fn file(mut self) -> Result<GoFile, ParseError> {
        if !self.at_kw("package") {
            let found = self.describe(self.tok());
            return self.error(format!("expected 'package', found {found}"));
        }
        self.next();
        let name_tok = self.tok();
        let package = self.expect_ident()?;
        let header_end = self.src[name_tok.end..]
            .find('\n')
            .map_or(self.src.len(), |n| name_tok.end + n);
        let header = self.src[..header_end].trim_end_matches('\r').to_string();
        self.take_comments_before(header_end);
        self.expect_semi()?;

        let mut decls = Vec::new();
        let mut last_line = name_tok.line;
        loop {
            let tok = self.tok();
            for c in self.take_comments_before(tok.start) {
                decls.push(DeclNode {
                    decl: Decl::Comment(c.text),
                    blank_before: c.line > last_line + 1,
                    comment: None,
                    origin: None,
                });
                last_line = c.end_line;
            }
            if tok.tok == Tok::Eof {
                break;
            }
            if tok.is_semi() {
                self.next();
                continue;
            }
            let blank_before = tok.line > last_line + 1;
            let decl = match tok.tok {
                Tok::Kw("import") => Decl::Import(self.import_decl()?),
                Tok::Kw("func") => Decl::Func(self.func_decl()?),
                Tok::Kw("var") if !self.peek(1).is_op("(") => Decl::Var(self.stmt()?),
                Tok::Kw(kw @ ("type" | "var" | "const")) => {
                    let (text, names) = self.raw_decl()?;
                    Decl::Raw {
                        keyword: kw,
                        names,
                        text,
                    }
                }
                _ => {
                    let found = self.describe(tok);
                    return self.error(format!("expected declaration, found {found}"));
                }
            };
            let (end, end_line) = (self.prev_end, self.prev_line);
            let comment = self.take_trailing(end_line, end);
            self.expect_semi()?;
            decls.push(DeclNode {
                decl,
                blank_before,
                comment,
                origin: Some(super::Origin {
                    span: tok.start..end,
                    canon: String::new(),
                }),
            });
            last_line = end_line;
        }

        let mut file = GoFile {
            source: self.src.to_string(),
            header,
            package,
            decls,
            tree: self.tree,
        };
        file.record_canonical_forms();
        Ok(file)
    }

    fn import_decl(&mut self) -> Result<ImportDecl, ParseError> {
        self.next();
        if !self.at_op("(") {
            let spec = self.import_spec(Vec::new(), false)?;
            return Ok(ImportDecl {
                specs: vec![spec],
                grouped: false,
                tail: Vec::new(),
            });
        }
        let open = self.next();
        let mut specs = Vec::new();
        let mut last_line = open.line;
        let tail = loop {
            let tok = self.tok();
            let leading = self.take_comments_before(tok.start);
            let first_line = leading.first().map_or(tok.line, |c| c.line);
            let blank = !specs.is_empty() && first_line > last_line + 1;
            let doc: Vec<String> = leading.into_iter().map(|c| c.text).collect();
            if tok.is_op(")") || tok.tok == Tok::Eof {
                break doc;
            }
            let spec = self.import_spec(doc, blank)?;
            last_line = self.prev_line;
            self.expect_semi()?;
            specs.push(spec);
        };
        self.expect_op(")")?;
        Ok(ImportDecl {
            specs,
            grouped: true,
            tail,
        })
    }

    fn import_spec(&mut self, doc: Vec<String>, blank_before: bool) -> Result<ImportSpec, ParseError> {
        let tok = self.tok();
        let name = match tok.tok {
            Tok::Ident => {
                self.next();
                Some(self.text(tok).to_string())
            }
            Tok::Op(".") => {
                self.next();
                Some(".".to_string())
            }
            _ => None,
        };
        let path_tok = self.tok();
        if path_tok.tok != Tok::Str {
            return self.error("expected import path");
        }
        self.next();
        let raw = self.text(path_tok);
        let path = raw[1..raw.len() - 1].to_string();
        let comment = self.take_trailing(path_tok.line, path_tok.end);
        Ok(ImportSpec {
            name,
            path,
            doc,
            comment,
            blank_before,
        })
    }

    fn func_decl(&mut self) -> Result<FuncDecl, ParseError> {
        self.next();
        let recv = if self.at_op("(") {
            let mut fields = self.param_list()?;
            if fields.is_empty() {
                return self.error("missing receiver");
            }
            Some(fields.remove(0))
        } else {
            None
        };
        let name = self.expect_ident()?;
        let type_params = if self.at_op("[") {
            Some(self.skip_balanced()?)
        } else {
            None
        };
        let mut sig = self.signature()?;
        sig.type_params = type_params;
        let body = if self.at_op("{") {
            Some(self.block()?)
        } else {
            None
        };
        Ok(FuncDecl {
            recv,
            name,
            sig,
            body,
        })
    }

    /// Skip a bracketed group starting at the current token, returning its
    /// source text.
    fn skip_balanced(&mut self) -> Result<String, ParseError> {
        let start = self.tok().start;
        let mut depth = 0usize;
        loop {
            let tok = self.next();
            match tok.tok {
                Tok::Op("(" | "[" | "{") => depth += 1,
                Tok::Op(")" | "]" | "}") => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Ok(self.src[start..tok.end].to_string());
                    }
                }
                Tok::Eof => return self.error("unbalanced brackets"),
                _ => {}
            }
        }
    }

    /// Verbatim `type`, `const` or `var` declaration, with the names it
    /// declares.
    fn raw_decl(&mut self) -> Result<(String, Vec<String>), ParseError> {
        let start = self.next().start;
        let mut names = Vec::new();
        if self.at_op("(") {
            self.next();
            let mut depth = 1usize;
            let mut spec_start = true;
            loop {
                let tok = self.tok();
                match tok.tok {
                    Tok::Eof => return self.error("unterminated declaration group"),
                    Tok::Op("(" | "[" | "{") => depth += 1,
                    Tok::Op(")" | "]" | "}") => {
                        depth -= 1;
                        if depth == 0 {
                            self.next();
                            break;
                        }
                    }
                    Tok::Semi { .. } if depth == 1 => spec_start = true,
                    Tok::Ident if depth == 1 && spec_start => {
                        spec_start = false;
                        names.push(self.text(tok).to_string());
                        while self.peek(1).is_op(",") && self.peek(2).tok == Tok::Ident {
                            self.next();
                            self.next();
                            names.push(self.text(self.tok()).to_string());
                        }
                    }
                    _ => spec_start = false,
                }
                self.next();
            }
        } else {
            let mut depth = 0usize;
            let mut spec_start = true;
            loop {
                let tok = self.tok();
                match tok.tok {
                    Tok::Eof => break,
                    Tok::Semi { .. } if depth == 0 => break,
                    Tok::Op(")" | "}") if depth == 0 => break,
                    Tok::Op("(" | "[" | "{") => depth += 1,
                    Tok::Op(")" | "]" | "}") => depth = depth.saturating_sub(1),
                    Tok::Ident if spec_start => names.push(self.text(tok).to_string()),
                    Tok::Op(",") if depth == 0 => {}
                    _ => spec_start = false,
                }
                if tok.tok == Tok::Ident && !self.peek(1).is_op(",") {
                    spec_start = false;
                }
                self.next();
            }
        }
        Ok((self.src[start..self.prev_end].to_string(), names))
    }

    // ----- signatures and types -----

    fn signature(&mut self) -> Result<FuncSig, ParseError> {
        let params = self.param_list()?;
        let results = if self.at_op("(") {
            self.param_list()?
        } else if self.at_type_start() {
            let ty = self.parse_type()?;
            vec![Field {
                names: Vec::new(),
                ty,
            }]
        } else {
            Vec::new()
        };
        Ok(FuncSig {
            type_params: None,
            params,
            results,
        })
    }

    fn at_type_start(&self) -> bool {
        match self.tok().tok {
            Tok::Ident => true,
            Tok::Op(op) => matches!(op, "*" | "[" | "(" | "<-"),
            Tok::Kw(kw) => matches!(kw, "map" | "chan" | "func" | "struct" | "interface"),
            _ => false,
        }
    }

    fn param_list(&mut self) -> Result<Vec<Field>, ParseError> {
        self.expect_op("(")?;
        let mut entries: Vec<(ExprId, Option<ExprId>)> = Vec::new();
        while !self.at_op(")") {
            let first = self.parse_type()?;
            if self.at_op(",") || self.at_op(")") {
                entries.push((first, None));
            } else {
                let ty = self.parse_type()?;
                entries.push((first, Some(ty)));
            }
            if !self.got_op(",") {
                break;
            }
        }
        self.expect_op(")")?;

        if entries.iter().all(|(_, ty)| ty.is_none()) {
            return Ok(entries
                .into_iter()
                .map(|(ty, _)| Field {
                    names: Vec::new(),
                    ty,
                })
                .collect());
        }
        let mut fields = Vec::new();
        let mut names = Vec::new();
        for (name, ty) in entries {
            match self.tree.ident(name) {
                Some(n) => names.push(n.to_string()),
                None => return self.error("mixed named and unnamed parameters"),
            }
            if let Some(ty) = ty {
                fields.push(Field {
                    names: std::mem::take(&mut names),
                    ty,
                });
            }
        }
        if !names.is_empty() {
            return self.error("mixed named and unnamed parameters");
        }
        Ok(fields)
    }

    fn parse_type(&mut self) -> Result<ExprId, ParseError> {
        let tok = self.tok();
        let expr = match tok.tok {
            Tok::Ident => {
                self.next();
                let mut x = self.tree.add_expr(Expr::Ident(self.text(tok).to_string()));
                if self.at_op(".") && self.peek(1).tok == Tok::Ident {
                    self.next();
                    let sel = self.expect_ident()?;
                    x = self.tree.add_expr(Expr::Selector {
                        x,
                        sel,
                        broken: false,
                    });
                }
                if self.at_op("[") && self.at_type_args() {
                    self.next();
                    let mut indices = vec![self.parse_type()?];
                    while self.got_op(",") {
                        indices.push(self.parse_type()?);
                    }
                    self.expect_op("]")?;
                    x = self.tree.add_expr(Expr::Index { x, indices });
                }
                return Ok(x);
            }
            Tok::Op("*") => {
                self.next();
                Expr::Star(self.parse_type()?)
            }
            Tok::Op("(") => {
                self.next();
                let inner = self.parse_type()?;
                self.expect_op(")")?;
                Expr::Paren(inner)
            }
            Tok::Op("[") => return self.array_type(),
            Tok::Op("...") => {
                self.next();
                Expr::Ellipsis(Some(self.parse_type()?))
            }
            Tok::Op("<-") => {
                self.next();
                if !self.at_kw("chan") {
                    return self.error("expected 'chan'");
                }
                self.next();
                Expr::ChanType {
                    dir: ChanDir::Recv,
                    elem: self.parse_type()?,
                }
            }
            Tok::Kw("map") => {
                self.next();
                self.expect_op("[")?;
                let key = self.parse_type()?;
                self.expect_op("]")?;
                Expr::MapType {
                    key,
                    value: self.parse_type()?,
                }
            }
            Tok::Kw("chan") => {
                self.next();
                let dir = if self.got_op("<-") {
                    ChanDir::Send
                } else {
                    ChanDir::Both
                };
                Expr::ChanType {
                    dir,
                    elem: self.parse_type()?,
                }
            }
            Tok::Kw("func") => {
                self.next();
                Expr::FuncType(self.signature()?)
            }
            Tok::Kw("struct" | "interface") => {
                self.next();
                let body = self.skip_balanced()?;
                let keyword = self.text(tok);
                Expr::RawType(format!("{keyword}{body}"))
            }
            _ => {
                let found = self.describe(tok);
                return self.error(format!("expected type, found {found}"));
            }
        };
        Ok(self.tree.add_expr(expr))
    }

    /// `Name[` opens type arguments unless it reads as a following slice or
    /// array type, as in a parameter `buf []byte` or `buf [4]byte`.
    fn at_type_args(&self) -> bool {
        let next = self.peek(1);
        !(next.is_op("]") || next.is_op("...") || next.tok == Tok::Int)
    }

    fn array_type(&mut self) -> Result<ExprId, ParseError> {
        self.expect_op("[")?;
        let len = if self.at_op("]") {
            None
        } else if self.at_op("...") {
            self.next();
            Some(self.tree.add_expr(Expr::Ellipsis(None)))
        } else {
            self.expr_lev += 1;
            let len = self.parse_expr()?;
            self.expr_lev -= 1;
            Some(len)
        };
        self.expect_op("]")?;
        let elem = self.parse_type()?;
        Ok(self.tree.add_expr(Expr::ArrayType { len, elem }))
    }

    // ----- expressions -----

    fn parse_expr(&mut self) -> Result<ExprId, ParseError> {
        self.binary_expr(1)
    }

    fn expr_list(&mut self) -> Result<Vec<ExprId>, ParseError> {
        let mut list = vec![self.parse_expr()?];
        while self.got_op(",") {
            list.push(self.parse_expr()?);
        }
        Ok(list)
    }

    fn binary_expr(&mut self, prec1: u8) -> Result<ExprId, ParseError> {
        let mut x = self.unary_expr()?;
        loop {
            let Tok::Op(op) = self.tok().tok else {
                break;
            };
            let prec = precedence(op);
            if prec == 0 || prec < prec1 {
                break;
            }
            self.next();
            let y = self.binary_expr(prec + 1)?;
            x = self.tree.add_expr(Expr::Binary { op, x, y });
        }
        Ok(x)
    }

    fn unary_expr(&mut self) -> Result<ExprId, ParseError> {
        match self.tok().tok {
            Tok::Op(op @ ("+" | "-" | "!" | "^" | "&")) => {
                self.next();
                let x = self.unary_expr()?;
                Ok(self.tree.add_expr(Expr::Unary { op, x }))
            }
            Tok::Op("<-") => {
                if self.peek(1).is_kw("chan") {
                    return self.parse_type();
                }
                self.next();
                let x = self.unary_expr()?;
                Ok(self.tree.add_expr(Expr::Unary { op: "<-", x }))
            }
            Tok::Op("*") => {
                self.next();
                let x = self.unary_expr()?;
                Ok(self.tree.add_expr(Expr::Star(x)))
            }
            _ => self.primary_expr(),
        }
    }

    fn primary_expr(&mut self) -> Result<ExprId, ParseError> {
        let mut x = self.operand()?;
        loop {
            let tok = self.tok();
            match tok.tok {
                Tok::Op(".") => {
                    self.next();
                    let next = self.tok();
                    if next.tok == Tok::Ident {
                        self.next();
                        x = self.tree.add_expr(Expr::Selector {
                            x,
                            sel: self.text(next).to_string(),
                            broken: next.line > tok.line,
                        });
                    } else if next.is_op("(") {
                        self.next();
                        let ty = if self.at_kw("type") {
                            self.next();
                            None
                        } else {
                            Some(self.parse_type()?)
                        };
                        self.expect_op(")")?;
                        x = self.tree.add_expr(Expr::TypeAssert { x, ty });
                    } else {
                        return self.error("expected selector or type assertion");
                    }
                }
                Tok::Op("[") => x = self.index_or_slice(x)?,
                Tok::Op("(") => x = self.call(x)?,
                Tok::Op("{") => {
                    if self.is_literal_type(x) && (self.expr_lev >= 0 || !self.is_type_name(x)) {
                        x = self.composite(Some(x))?;
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
        Ok(x)
    }

    fn is_type_name(&self, x: ExprId) -> bool {
        match self.tree.expr(x) {
            Expr::Ident(_) => true,
            Expr::Selector { x, broken, .. } => !broken && self.tree.ident(*x).is_some(),
            _ => false,
        }
    }

    fn is_literal_type(&self, x: ExprId) -> bool {
        match self.tree.expr(x) {
            Expr::ArrayType { .. } | Expr::MapType { .. } => true,
            Expr::RawType(text) => text.starts_with("struct"),
            Expr::Index { x, .. } => self.is_type_name(*x),
            _ => self.is_type_name(x),
        }
    }

    fn operand(&mut self) -> Result<ExprId, ParseError> {
        let tok = self.tok();
        match tok.tok {
            Tok::Ident => {
                self.next();
                Ok(self.tree.add_expr(Expr::Ident(self.text(tok).to_string())))
            }
            _ if tok.is_literal() => {
                self.next();
                Ok(self.tree.add_expr(Expr::BasicLit(self.text(tok).to_string())))
            }
            Tok::Op("(") => {
                self.next();
                self.expr_lev += 1;
                let inner = self.parse_expr()?;
                self.expr_lev -= 1;
                self.expect_op(")")?;
                Ok(self.tree.add_expr(Expr::Paren(inner)))
            }
            Tok::Kw("func") => {
                self.next();
                let sig = self.signature()?;
                if self.at_op("{") {
                    let saved = self.expr_lev;
                    self.expr_lev = 0;
                    let body = self.block()?;
                    self.expr_lev = saved;
                    Ok(self.tree.add_expr(Expr::FuncLit { sig, body }))
                } else {
                    Ok(self.tree.add_expr(Expr::FuncType(sig)))
                }
            }
            Tok::Op("[") => self.array_type(),
            Tok::Kw("map" | "chan" | "struct" | "interface") => self.parse_type(),
            _ => {
                let found = self.describe(tok);
                self.error(format!("expected operand, found {found}"))
            }
        }
    }

    fn index_or_slice(&mut self, x: ExprId) -> Result<ExprId, ParseError> {
        self.expect_op("[")?;
        self.expr_lev += 1;
        let low = if self.at_op(":") {
            None
        } else {
            Some(self.parse_expr()?)
        };
        let expr = if self.got_op(":") {
            let high = if self.at_op("]") || self.at_op(":") {
                None
            } else {
                Some(self.parse_expr()?)
            };
            let (max, three) = if self.got_op(":") {
                (Some(self.parse_expr()?), true)
            } else {
                (None, false)
            };
            Expr::Slice {
                x,
                low,
                high,
                max,
                three,
            }
        } else {
            let mut indices: Vec<ExprId> = low.into_iter().collect();
            while self.got_op(",") {
                if self.at_op("]") {
                    break;
                }
                indices.push(self.parse_expr()?);
            }
            Expr::Index { x, indices }
        };
        self.expr_lev -= 1;
        self.expect_op("]")?;
        Ok(self.tree.add_expr(expr))
    }

    /// Elements of a call argument list or composite literal, with their
    /// line layout and comments.
    fn element_list(
        &mut self,
        close: &str,
        mut element: impl FnMut(&mut Self) -> Result<ExprId, ParseError>,
    ) -> Result<(Vec<ExprId>, bool, bool, bool), ParseError> {
        let open = self.prev_line;
        self.expr_lev += 1;
        let mut elts = Vec::new();
        let mut ellipsis = false;
        let mut open_break = false;
        while !self.at_op(close) {
            let tok = self.tok();
            let leading = self.take_comments_before(tok.start);
            let first_line = leading.first().map_or(tok.line, |c| c.line);
            let brk = if first_line > self.prev_line + 1 && !elts.is_empty() {
                Break::Blank
            } else if first_line > self.prev_line {
                Break::Line
            } else {
                Break::Inline
            };
            if elts.is_empty() {
                open_break = first_line > open;
            }
            let elt = element(self)?;
            if self.at_op("...") {
                self.next();
                ellipsis = true;
            }
            if !elts.is_empty() {
                self.tree.set_break(elt, brk);
            }
            if !leading.is_empty() {
                self.tree
                    .leading
                    .insert(elt, leading.into_iter().map(|c| c.text).collect());
            }
            elts.push(elt);
            let (end, line) = (self.prev_end, self.prev_line);
            let more = self.got_op(",");
            if let Some(c) = self.take_trailing(line, end) {
                self.tree.trailing.insert(elt, c);
            }
            if !more {
                break;
            }
        }
        let close_tok = self.tok();
        let close_break = !elts.is_empty() && close_tok.line > self.prev_line;
        self.expr_lev -= 1;
        self.expect_op(close)?;
        Ok((elts, ellipsis, open_break, close_break))
    }

    fn call(&mut self, fun: ExprId) -> Result<ExprId, ParseError> {
        self.expect_op("(")?;
        let (args, ellipsis, open_break, close_break) =
            self.element_list(")", |p| p.parse_expr())?;
        Ok(self.tree.add_expr(Expr::Call {
            fun,
            args,
            ellipsis,
            open_break,
            close_break,
        }))
    }

    fn composite(&mut self, ty: Option<ExprId>) -> Result<ExprId, ParseError> {
        self.expect_op("{")?;
        let (elts, _, open_break, close_break) = self.element_list("}", |p| {
            let key = p.element_value()?;
            if p.got_op(":") {
                let value = p.element_value()?;
                Ok(p.tree.add_expr(Expr::KeyValue { key, value }))
            } else {
                Ok(key)
            }
        })?;
        Ok(self.tree.add_expr(Expr::CompositeLit {
            ty,
            elts,
            open_break,
            close_break,
        }))
    }

    fn element_value(&mut self) -> Result<ExprId, ParseError> {
        if self.at_op("{") {
            self.composite(None)
        } else {
            self.parse_expr()
        }
    }

    // ----- statements -----

    fn block(&mut self) -> Result<BlockId, ParseError> {
        let open = self.expect_op("{")?;
        let open_comment = self.take_trailing(open.line, open.end);
        let stmts = self.stmt_list(open.line)?;
        let close = self.expect_op("}")?;
        Ok(self.tree.add_block(Block {
            stmts,
            one_line: close.line == open.line,
            open_comment,
        }))
    }

    fn stmt_list(&mut self, start_line: u32) -> Result<Vec<StmtId>, ParseError> {
        let mut stmts = Vec::new();
        let mut last_line = start_line;
        loop {
            let tok = self.tok();
            for c in self.take_comments_before(tok.start) {
                let blank_before = !stmts.is_empty() && c.line > last_line + 1;
                last_line = c.end_line;
                stmts.push(self.tree.add_stmt_node(StmtNode {
                    stmt: Stmt::Comment(c.text),
                    blank_before,
                    comment: None,
                }));
            }
            match tok.tok {
                Tok::Op("}") | Tok::Kw("case") | Tok::Kw("default") | Tok::Eof => break,
                Tok::Semi { .. } => {
                    self.next();
                    continue;
                }
                _ => {}
            }
            let blank_before = !stmts.is_empty() && tok.line > last_line + 1;
            let stmt = self.stmt()?;
            let (end, end_line) = (self.prev_end, self.prev_line);
            let comment = self.take_trailing(end_line, end);
            if !matches!(self.tok().tok, Tok::Kw("case") | Tok::Kw("default")) {
                self.expect_semi()?;
            }
            let node = self.tree.stmt_node_mut(stmt);
            node.blank_before = blank_before;
            node.comment = comment;
            stmts.push(stmt);
            last_line = end_line;
        }
        Ok(stmts)
    }

    fn stmt(&mut self) -> Result<StmtId, ParseError> {
        let tok = self.tok();
        let stmt = match tok.tok {
            Tok::Kw("var") => {
                if self.peek(1).is_op("(") {
                    Stmt::Raw(self.raw_decl()?.0)
                } else {
                    self.next();
                    let mut names = vec![self.expect_ident()?];
                    while self.got_op(",") {
                        names.push(self.expect_ident()?);
                    }
                    let ty = if self.at_op("=") {
                        None
                    } else {
                        Some(self.parse_type()?)
                    };
                    let values = if self.got_op("=") {
                        self.expr_list()?
                    } else {
                        Vec::new()
                    };
                    Stmt::Var { names, ty, values }
                }
            }
            Tok::Kw("const" | "type") => Stmt::Raw(self.raw_decl()?.0),
            Tok::Kw("return") => {
                self.next();
                let results = if self.tok().is_semi() || self.at_op("}") {
                    Vec::new()
                } else {
                    self.expr_list()?
                };
                Stmt::Return(results)
            }
            Tok::Kw("defer") => {
                self.next();
                Stmt::Defer(self.parse_expr()?)
            }
            Tok::Kw("go") => {
                self.next();
                Stmt::Go(self.parse_expr()?)
            }
            Tok::Kw(keyword @ ("break" | "continue" | "goto" | "fallthrough")) => {
                self.next();
                let label = if self.tok().tok == Tok::Ident && keyword != "fallthrough" {
                    Some(self.expect_ident()?)
                } else {
                    None
                };
                Stmt::Branch { keyword, label }
            }
            Tok::Kw("if") => return self.if_stmt(),
            Tok::Kw("for") => return self.for_stmt(),
            Tok::Kw("switch") => return self.switch_stmt(),
            Tok::Kw("select") => {
                self.next();
                let clauses = self.clauses(true)?;
                Stmt::Select { clauses }
            }
            Tok::Op("{") => Stmt::Block(self.block()?),
            _ => return self.simple_stmt(Mode::LabelOk),
        };
        Ok(self.tree.add_stmt(stmt))
    }

    fn simple_stmt(&mut self, mode: Mode) -> Result<StmtId, ParseError> {
        let lhs = self.expr_list()?;
        self.simple_stmt_rest(lhs, mode)
    }

    fn simple_stmt_rest(&mut self, lhs: Vec<ExprId>, mode: Mode) -> Result<StmtId, ParseError> {
        let stmt = match self.tok().tok {
            Tok::Op(op) if is_assign_op(op) => {
                self.next();
                let rhs = self.expr_list()?;
                Stmt::Assign { lhs, op, rhs }
            }
            Tok::Op(":") if mode == Mode::LabelOk && lhs.len() == 1 => {
                let Some(label) = self.tree.ident(lhs[0]).map(str::to_string) else {
                    return self.error("illegal label declaration");
                };
                self.next();
                let inner = if self.at_op("}") {
                    self.tree.add_stmt(Stmt::Empty)
                } else {
                    self.stmt()?
                };
                Stmt::Labeled { label, stmt: inner }
            }
            Tok::Op("<-") => {
                self.next();
                let value = self.parse_expr()?;
                Stmt::Send { ch: lhs[0], value }
            }
            Tok::Op(op @ ("++" | "--")) => {
                self.next();
                Stmt::IncDec { x: lhs[0], op }
            }
            _ => {
                if lhs.len() > 1 {
                    let found = self.describe(self.tok());
                    return self.error(format!("expected assignment, found {found}"));
                }
                Stmt::Expr(lhs[0])
            }
        };
        Ok(self.tree.add_stmt(stmt))
    }

    fn header_expr(&mut self, stmt: StmtId) -> Result<ExprId, ParseError> {
        match self.tree.stmt(stmt) {
            Stmt::Expr(x) => Ok(*x),
            _ => self.error("expected condition expression"),
        }
    }

    fn if_stmt(&mut self) -> Result<StmtId, ParseError> {
        self.next();
        let saved = self.expr_lev;
        self.expr_lev = -1;
        let (init, cond) = if self.tok().is_semi() {
            self.next();
            (None, self.parse_expr()?)
        } else {
            let s = self.simple_stmt(Mode::Basic)?;
            if matches!(self.tok().tok, Tok::Semi { auto: false }) {
                self.next();
                (Some(s), self.parse_expr()?)
            } else {
                (None, self.header_expr(s)?)
            }
        };
        self.expr_lev = saved;
        let then = self.block()?;
        let els = if self.at_kw("else") {
            self.next();
            if self.at_kw("if") {
                Some(self.if_stmt()?)
            } else if self.at_op("{") {
                let b = self.block()?;
                Some(self.tree.add_stmt(Stmt::Block(b)))
            } else {
                return self.error("expected if statement or block");
            }
        } else {
            None
        };
        Ok(self.tree.add_stmt(Stmt::If {
            init,
            cond,
            then,
            els,
        }))
    }

    fn for_stmt(&mut self) -> Result<StmtId, ParseError> {
        self.next();
        let saved = self.expr_lev;
        self.expr_lev = -1;
        if self.at_kw("range") {
            self.next();
            let x = self.parse_expr()?;
            self.expr_lev = saved;
            let body = self.block()?;
            return Ok(self.tree.add_stmt(Stmt::Range {
                key: None,
                value: None,
                define: false,
                x,
                body,
            }));
        }
        let mut init = None;
        let mut cond = None;
        let mut post = None;
        if !self.at_op("{") {
            let mut s2 = None;
            if !self.tok().is_semi() {
                let lhs = self.expr_list()?;
                if (self.at_op(":=") || self.at_op("=")) && self.peek(1).is_kw("range") {
                    let define = self.at_op(":=");
                    self.next();
                    self.next();
                    let x = self.parse_expr()?;
                    self.expr_lev = saved;
                    let body = self.block()?;
                    return Ok(self.tree.add_stmt(Stmt::Range {
                        key: lhs.first().copied(),
                        value: lhs.get(1).copied(),
                        define,
                        x,
                        body,
                    }));
                }
                s2 = Some(self.simple_stmt_rest(lhs, Mode::Basic)?);
            }
            if self.tok().is_semi() {
                self.next();
                init = s2.take();
                if !self.tok().is_semi() {
                    cond = Some(self.parse_expr()?);
                }
                if !self.tok().is_semi() {
                    return self.error("expected ';' in for clause");
                }
                self.next();
                if !self.at_op("{") {
                    post = Some(self.simple_stmt(Mode::Basic)?);
                }
            } else if let Some(s) = s2 {
                cond = Some(self.header_expr(s)?);
            }
        }
        self.expr_lev = saved;
        let body = self.block()?;
        Ok(self.tree.add_stmt(Stmt::For {
            init,
            cond,
            post,
            body,
        }))
    }

    fn switch_stmt(&mut self) -> Result<StmtId, ParseError> {
        self.next();
        let saved = self.expr_lev;
        self.expr_lev = -1;
        let mut init = None;
        let mut tag = None;
        if !self.at_op("{") {
            let mut s2 = None;
            if !self.tok().is_semi() {
                s2 = Some(self.simple_stmt(Mode::Basic)?);
            }
            if self.tok().is_semi() {
                self.next();
                init = s2.take();
                if !self.at_op("{") {
                    s2 = Some(self.simple_stmt(Mode::Basic)?);
                }
            }
            tag = s2;
        }
        self.expr_lev = saved;
        let clauses = self.clauses(false)?;
        Ok(self.tree.add_stmt(Stmt::Switch { init, tag, clauses }))
    }

    fn clauses(&mut self, select: bool) -> Result<Vec<Clause>, ParseError> {
        self.expect_op("{")?;
        let mut clauses: Vec<Clause> = Vec::new();
        loop {
            let tok = self.tok();
            let doc: Vec<String> = self
                .take_comments_before(tok.start)
                .into_iter()
                .map(|c| c.text)
                .collect();
            let kind = match tok.tok {
                Tok::Kw("case") => {
                    self.next();
                    if select {
                        ClauseKind::Comm(self.simple_stmt(Mode::Basic)?)
                    } else {
                        ClauseKind::Case(self.expr_list()?)
                    }
                }
                Tok::Kw("default") => {
                    self.next();
                    ClauseKind::Default
                }
                Tok::Op("}") => {
                    if let Some(last) = clauses.last() {
                        let body = last.body;
                        for text in doc {
                            let c = self.tree.add_stmt(Stmt::Comment(text));
                            self.tree.block_mut(body).stmts.push(c);
                        }
                    }
                    break;
                }
                _ => {
                    let found = self.describe(tok);
                    return self.error(format!("expected case or default, found {found}"));
                }
            };
            let colon = self.expect_op(":")?;
            let open_comment = self.take_trailing(colon.line, colon.end);
            let stmts = self.stmt_list(colon.line)?;
            let body = self.tree.add_block(Block {
                stmts,
                one_line: false,
                open_comment,
            });
            clauses.push(Clause { doc, kind, body });
        }
        self.expect_op("}")?;
        Ok(clauses)
    }
}

/// Parse a statement list in the context of a function body.
pub fn parse_stmts(text: &str) -> Result<(Tree, Vec<StmtId>), ParseError> {
    let file = parse_file(&format!("package p\n\nfunc _() {{\n{text}\n}}\n"))?;
    let body = file
        .decls
        .iter()
        .find_map(|d| match &d.decl {
            Decl::Func(f) => f.body,
            _ => None,
        })
        .ok_or_else(|| ParseError {
            line: 0,
            message: "snippet did not parse as a function body".to_string(),
        })?;
    let stmts = file.tree.block(body).stmts.clone();
    Ok((file.tree, stmts))
}

/// Parse a single expression.
pub fn parse_expr(text: &str) -> Result<(Tree, ExprId), ParseError> {
    let (tree, stmts) = parse_stmts(&format!("_ = {text}"))?;
    let expr = match stmts.as_slice() {
        [only] => match tree.stmt(*only) {
            Stmt::Assign { rhs, .. } if rhs.len() == 1 => Some(rhs[0]),
            _ => None,
        },
        _ => None,
    };
    match expr {
        Some(e) => Ok((tree, e)),
        None => Err(ParseError {
            line: 0,
            message: format!("not a single expression: {text}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(file: &GoFile, name: &str) -> BlockId {
        file.func(name).and_then(|f| f.body).unwrap()
    }

    #[test]
    fn test_parse_package_and_imports() {
        let file = parse_file(
            "// Package demo.\npackage demo\n\nimport (\n\t\"fmt\"\n\tnh \"net/http\" // server\n)\n",
        )
        .unwrap();
        assert_eq!(file.package, "demo");
        assert!(file.header.starts_with("// Package demo."));
        let specs: Vec<_> = file.imports().collect();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].name.as_deref(), Some("nh"));
        assert_eq!(specs[1].comment.as_deref(), Some("// server"));
    }

    #[test]
    fn test_parse_function_statements() {
        let src = "package main\n\nfunc main() {\n\tx := 1\n\n\t// note\n\tif err := f(); err != nil {\n\t\treturn\n\t}\n\tfor i := 0; i < 3; i++ {\n\t}\n}\n";
        let file = parse_file(src).unwrap();
        let body = body_of(&file, "main");
        let stmts = &file.tree.block(body).stmts;
        assert_eq!(stmts.len(), 4);
        assert!(matches!(file.tree.stmt(stmts[1]), Stmt::Comment(c) if c == "// note"));
        assert!(file.tree.stmt_node(stmts[1]).blank_before);
        assert!(matches!(file.tree.stmt(stmts[2]), Stmt::If { init: Some(_), .. }));
        assert!(matches!(file.tree.stmt(stmts[3]), Stmt::For { cond: Some(_), .. }));
    }

    #[test]
    fn test_composite_literal_in_control_clause() {
        let src = "package p\n\nfunc f() {\n\tfor _, v := range []int{1, 2} {\n\t\t_ = v\n\t}\n\tif x == y {\n\t}\n}\n";
        let file = parse_file(src).unwrap();
        let body = body_of(&file, "f");
        assert!(matches!(
            file.tree.stmt(file.tree.block(body).stmts[0]),
            Stmt::Range { define: true, .. }
        ));
    }

    #[test]
    fn test_param_grouping() {
        let file = parse_file("package p\n\nfunc f(a, b int, c ...string) (n int, err error) {\n}\n").unwrap();
        let f = file.func("f").unwrap();
        assert_eq!(f.sig.params.len(), 2);
        assert_eq!(f.sig.params[0].names, vec!["a", "b"]);
        assert!(matches!(file.tree.expr(f.sig.params[1].ty), Expr::Ellipsis(Some(_))));
        assert_eq!(f.sig.results[1].names, vec!["err"]);
    }

    #[test]
    fn test_raw_declarations_keep_names() {
        let src = "package p\n\ntype Server struct {\n\tAddr string\n}\n\nvar (\n\ta, b = 1, 2\n\ttrace = 3\n)\n";
        let file = parse_file(src).unwrap();
        let names: Vec<String> = file.scope_names().into_iter().collect();
        for want in ["Server", "a", "b", "trace"] {
            assert!(names.iter().any(|n| n == want), "missing {want}");
        }
    }

    #[test]
    fn test_type_switch_and_select() {
        let src = "package p\n\nfunc f(v any, ch chan int) {\n\tswitch x := v.(type) {\n\tcase int, *string:\n\t\t_ = x\n\tdefault:\n\t}\n\tselect {\n\tcase n := <-ch:\n\t\t_ = n\n\tcase ch <- 1:\n\t}\n}\n";
        let file = parse_file(src).unwrap();
        let body = body_of(&file, "f");
        let stmts = &file.tree.block(body).stmts;
        assert!(matches!(file.tree.stmt(stmts[0]), Stmt::Switch { tag: Some(_), .. }));
        match file.tree.stmt(stmts[1]) {
            Stmt::Select { clauses } => assert_eq!(clauses.len(), 2),
            other => panic!("expected select, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_error_reports_line() {
        let err = parse_file("package p\n\nfunc f() {\n\tx := \n}\n").unwrap_err();
        assert!(err.line >= 4);
    }

    #[test]
    fn test_parse_snippet_expr() {
        let (tree, e) = parse_expr("grpc.NewServer(opts...)").unwrap();
        assert!(matches!(tree.expr(e), Expr::Call { ellipsis: true, .. }));
    }
}
