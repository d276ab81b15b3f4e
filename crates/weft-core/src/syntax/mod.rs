/*!
# Syntax

Go front end: lexer, parser, arena tree, printer and the generic statement
walker shared by every rewrite.

A [`GoFile`] is one parsed source file (the program unit). Printing keeps
every top-level declaration that no rewrite touched byte for byte, so only
the functions a transformation actually changed are reformatted.
*/

pub mod build;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod token;
pub mod tree;
pub mod walk;

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

pub use parser::{parse_expr, parse_file, parse_stmts};
pub use printer::{print_expr, print_stmt};
pub use tree::{
    Block, BlockId, Break, ChanDir, Clause, ClauseKind, Expr, ExprId, Field, FuncSig, Stmt, StmtId,
    StmtNode, Tree,
};

/// Syntax error with the 1-based line it was detected on.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: u32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSpec {
    pub name: Option<String>,
    pub path: String,
    pub doc: Vec<String>,
    pub comment: Option<String>,
    pub blank_before: bool,
}

impl ImportSpec {
    pub fn new(name: Option<&str>, path: &str) -> Self {
        Self {
            name: name.map(str::to_string),
            path: path.to_string(),
            doc: Vec::new(),
            comment: None,
            blank_before: false,
        }
    }

    /// Identifier the importing file uses for this package, `None` for blank
    /// and dot imports.
    pub fn local_name(&self) -> Option<String> {
        match self.name.as_deref() {
            Some("_") | Some(".") => None,
            Some(name) => Some(name.to_string()),
            None => Some(default_import_name(&self.path)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub specs: Vec<ImportSpec>,
    pub grouped: bool,
    /// Comments after the last spec of a group.
    pub tail: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub recv: Option<Field>,
    pub name: String,
    pub sig: FuncSig,
    pub body: Option<BlockId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Import(ImportDecl),
    Func(FuncDecl),
    /// Single-spec `var` declaration, a [`Stmt::Var`] in the tree.
    Var(StmtId),
    /// `type`, `const` or grouped `var` declaration kept as source text.
    Raw {
        keyword: &'static str,
        names: Vec<String>,
        text: String,
    },
    Comment(String),
}

/// Where a declaration came from and how it printed when parsed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Origin {
    pub span: Range<usize>,
    pub canon: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeclNode {
    pub decl: Decl,
    pub blank_before: bool,
    pub comment: Option<String>,
    pub(crate) origin: Option<Origin>,
}

impl DeclNode {
    pub fn new(decl: Decl, blank_before: bool) -> Self {
        Self {
            decl,
            blank_before,
            comment: None,
            origin: None,
        }
    }
}

/// One parsed Go source file.
#[derive(Debug, Clone)]
pub struct GoFile {
    pub(crate) source: String,
    /// Everything up to the end of the package clause line.
    pub header: String,
    pub package: String,
    pub decls: Vec<DeclNode>,
    pub tree: Tree,
}

impl GoFile {
    pub fn parse(src: &str) -> Result<Self, ParseError> {
        parse_file(src)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn record_canonical_forms(&mut self) {
        for i in 0..self.decls.len() {
            if matches!(self.decls[i].decl, Decl::Import(_) | Decl::Func(_) | Decl::Var(_)) {
                let canon = printer::print_decl(&self.tree, &self.decls[i].decl);
                if let Some(origin) = self.decls[i].origin.as_mut() {
                    origin.canon = canon;
                }
            }
        }
    }

    /// Forget source positions so that every declaration is reprinted.
    #[cfg(test)]
    pub(crate) fn invalidate_verbatim(&mut self) {
        for d in &mut self.decls {
            d.origin = None;
        }
    }

    /// Serialize the file. Declarations whose printed form is unchanged since
    /// parsing are copied from the source.
    pub fn print(&self) -> String {
        let mut out = self.header.clone();
        for node in &self.decls {
            out.push('\n');
            if node.blank_before {
                out.push('\n');
            }
            let printed = printer::print_decl(&self.tree, &node.decl);
            match &node.origin {
                Some(origin) if origin.canon == printed => out.push_str(&self.source[origin.span.clone()]),
                _ => out.push_str(&printed),
            }
            if let Some(c) = &node.comment {
                out.push(' ');
                out.push_str(c);
            }
        }
        out.push('\n');
        out
    }

    pub fn imports(&self) -> impl Iterator<Item = &ImportSpec> {
        self.decls
            .iter()
            .filter_map(|d| match &d.decl {
                Decl::Import(import) => Some(&import.specs),
                _ => None,
            })
            .flatten()
    }

    pub fn imports_mut(&mut self) -> impl Iterator<Item = &mut ImportSpec> {
        self.decls
            .iter_mut()
            .filter_map(|d| match &mut d.decl {
                Decl::Import(import) => Some(&mut import.specs),
                _ => None,
            })
            .flatten()
    }

    pub fn has_import(&self, path: &str) -> bool {
        self.imports().any(|s| s.path == path)
    }

    pub fn has_import_prefix(&self, prefix: &str) -> bool {
        self.imports().any(|s| s.path.starts_with(prefix))
    }

    /// Local names under which `path` is imported.
    pub fn import_names(&self, path: &str) -> Vec<String> {
        self.imports()
            .filter(|s| s.path == path)
            .filter_map(ImportSpec::local_name)
            .collect()
    }

    /// Import path bound to a local package name.
    pub fn resolve_import(&self, name: &str) -> Option<&str> {
        self.imports()
            .find(|s| s.local_name().as_deref() == Some(name))
            .map(|s| s.path.as_str())
    }

    pub fn import_table(&self) -> ImportTable {
        ImportTable {
            names: self
                .imports()
                .filter_map(|s| s.local_name().map(|n| (n, s.path.clone())))
                .collect(),
        }
    }

    /// Rename every import of `path`; `None` restores the default name.
    pub fn set_import_name(&mut self, path: &str, name: Option<&str>) {
        for node in &mut self.decls {
            if let Decl::Import(import) = &mut node.decl {
                for spec in import.specs.iter_mut().filter(|s| s.path == path) {
                    spec.name = name.map(str::to_string);
                }
            }
        }
    }

    /// Whether any code in the file refers to package name `name`.
    pub fn references(&self, name: &str) -> bool {
        self.decls.iter().any(|node| match &node.decl {
            Decl::Func(f) => {
                let sig_types = f.recv.iter().chain(&f.sig.params).chain(&f.sig.results);
                sig_types.into_iter().any(|field| walk::expr_mentions(&self.tree, field.ty, name))
                    || f.sig
                        .type_params
                        .as_deref()
                        .is_some_and(|t| walk::text_mentions(t, name))
                    || f.body
                        .is_some_and(|b| walk::block_mentions(&self.tree, b, name))
            }
            Decl::Var(stmt) => walk::stmt_mentions(&self.tree, *stmt, name),
            Decl::Raw { text, .. } => walk::text_mentions(text, name),
            Decl::Import(_) | Decl::Comment(_) => false,
        })
    }

    /// Add an import unless the path is already imported. The new entry joins the
    /// last parenthesized import group, or a new group after the existing
    /// imports.
    pub fn add_import(&mut self, name: Option<&str>, path: &str) -> bool {
        if self.has_import(path) {
            return false;
        }
        let spec = ImportSpec::new(name, path);
        let last_group = self
            .decls
            .iter()
            .rposition(|d| matches!(&d.decl, Decl::Import(i) if i.grouped));
        if let Some(idx) = last_group {
            if let Decl::Import(import) = &mut self.decls[idx].decl {
                import.specs.push(spec);
            }
            return true;
        }
        let at = self
            .decls
            .iter()
            .rposition(|d| matches!(d.decl, Decl::Import(_)))
            .map_or(0, |i| i + 1);
        let group = Decl::Import(ImportDecl {
            specs: vec![spec],
            grouped: true,
            tail: Vec::new(),
        });
        self.decls.insert(at, DeclNode::new(group, true));
        true
    }

    /// Remove every import of `path`, dropping declarations left empty.
    pub fn remove_import(&mut self, path: &str) -> bool {
        let mut removed = false;
        for node in &mut self.decls {
            if let Decl::Import(import) = &mut node.decl {
                let before = import.specs.len();
                import.specs.retain(|s| s.path != path);
                removed |= import.specs.len() != before;
            }
        }
        if removed {
            self.decls.retain(|d| match &d.decl {
                Decl::Import(i) => !i.specs.is_empty() || !i.tail.is_empty(),
                _ => true,
            });
        }
        removed
    }

    /// Top-level function (not method) by name.
    pub fn func(&self, name: &str) -> Option<&FuncDecl> {
        self.funcs().find(|f| f.recv.is_none() && f.name == name)
    }

    pub fn funcs(&self) -> impl Iterator<Item = &FuncDecl> {
        self.decls.iter().filter_map(|d| match &d.decl {
            Decl::Func(f) => Some(f),
            _ => None,
        })
    }

    /// Body of the program entry point: `func main()` in package `main`.
    pub fn entry_point(&self) -> Option<BlockId> {
        if self.package != "main" {
            return None;
        }
        self.func("main").and_then(|f| f.body)
    }

    /// Names declared at file scope, including import names.
    pub fn scope_names(&self) -> HashSet<String> {
        let mut names: HashSet<String> = self.imports().filter_map(ImportSpec::local_name).collect();
        for node in &self.decls {
            match &node.decl {
                Decl::Func(f) if f.recv.is_none() => {
                    names.insert(f.name.clone());
                }
                Decl::Var(stmt) => {
                    if let Stmt::Var { names: declared, .. } = self.tree.stmt(*stmt) {
                        names.extend(declared.iter().cloned());
                    }
                }
                Decl::Raw { names: declared, .. } => names.extend(declared.iter().cloned()),
                _ => {}
            }
        }
        names
    }
}

/// Local package names bound by a file's imports.
#[derive(Debug, Clone, Default)]
pub struct ImportTable {
    names: HashMap<String, String>,
}

impl ImportTable {
    pub fn path_of(&self, name: &str) -> Option<&str> {
        self.names.get(name).map(String::as_str)
    }

    /// Whether `name` is bound to one of `paths`.
    pub fn resolves_to(&self, name: &str, paths: &[&str]) -> bool {
        self.path_of(name).is_some_and(|p| paths.contains(&p))
    }

    pub fn names_of(&self, path: &str) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .names
            .iter()
            .filter(|(_, p)| p.as_str() == path)
            .map(|(n, _)| n.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}

/// Package name Go assumes for an import path without an explicit name:
/// the last path element, skipping a major-version suffix and dropping
/// `go-` / `-go` affixes and `.vN` gopkg suffixes.
pub fn default_import_name(path: &str) -> String {
    static MAJOR: OnceLock<Regex> = OnceLock::new();
    static GOPKG: OnceLock<Regex> = OnceLock::new();
    let major = MAJOR.get_or_init(|| Regex::new(r"^v[0-9]+$").expect("static regex"));
    let gopkg = GOPKG.get_or_init(|| Regex::new(r"\.v[0-9]+$").expect("static regex"));

    let mut parts = path.rsplit('/');
    let mut last = parts.next().unwrap_or(path);
    if major.is_match(last) {
        if let Some(prev) = parts.next() {
            last = prev;
        }
    }
    let name = gopkg.replace(last, "");
    let name = name.strip_prefix("go-").unwrap_or(&name);
    let name = name.strip_suffix("-go").unwrap_or(name);
    name.replace(['-', '.'], "_")
}
