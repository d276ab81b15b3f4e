/*!
# Semantic Model

A lightweight, load-once view of the subject program's module: its `go.mod`
and, on demand, the declared signatures of the library packages it depends
on. Type-aware policies ask it for a factory's result types.

## Sharing

[`SemanticCache`] is shared by all files of a batch. It holds one entry per
source directory, initialized exactly once; packages inside a module view
are loaded lazily and memoized.
*/

pub mod gomod;
pub mod locate;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::syntax::{Expr, ExprId, GoFile, ImportTable, Tree};
use gomod::GoMod;

/// Semantic loading failed; callers fall back to static knowledge.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SemanticLoadError {
    #[error("no go.mod above {}", .0.display())]
    NoModule(PathBuf),

    #[error("{}: {message}", .path.display())]
    Io { path: PathBuf, message: String },

    #[error("{}: {message}", .path.display())]
    GoMod { path: PathBuf, message: String },

    #[error("package {0} not found in vendor, replace directives or module cache")]
    Unresolved(String),

    #[error("no Go sources in {}", .0.display())]
    NoSources(PathBuf),

    #[error("{library}.{function} is not declared")]
    MissingFunction { library: String, function: String },
}

/// A declared Go type reduced to what generated code needs to spell it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    /// `package` is the import path of a foreign package, `None` for a type
    /// declared in the library itself.
    Named {
        package: Option<String>,
        name: String,
    },
    Builtin(String),
    Pointer(Box<TypeRef>),
    Slice(Box<TypeRef>),
    Map(Box<TypeRef>, Box<TypeRef>),
    Unsupported(String),
}

const BUILTIN_TYPES: &[&str] = &[
    "any", "bool", "byte", "complex64", "complex128", "error", "float32", "float64", "int", "int8",
    "int16", "int32", "int64", "rune", "string", "uint", "uint8", "uint16", "uint32", "uint64",
    "uintptr",
];

impl TypeRef {
    pub fn named(name: &str) -> Self {
        TypeRef::Named {
            package: None,
            name: name.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, TypeRef::Builtin(name) if name == "error")
    }

    /// Convert a type expression of a library file. Qualified names resolve
    /// through that file's imports.
    pub fn from_expr(tree: &Tree, id: ExprId, imports: &ImportTable) -> Self {
        match tree.expr(id) {
            Expr::Ident(name) if BUILTIN_TYPES.contains(&name.as_str()) => TypeRef::Builtin(name.clone()),
            Expr::Ident(name) => TypeRef::named(name),
            Expr::Selector { .. } => match tree.qualified(id) {
                Some((pkg, name)) => match imports.path_of(pkg) {
                    Some(path) => TypeRef::Named {
                        package: Some(path.to_string()),
                        name: name.to_string(),
                    },
                    None => TypeRef::Unsupported(format!("{pkg}.{name}")),
                },
                None => TypeRef::Unsupported(crate::syntax::print_expr(tree, id)),
            },
            Expr::Star(x) => TypeRef::Pointer(Box::new(Self::from_expr(tree, *x, imports))),
            Expr::ArrayType { len: None, elem } => TypeRef::Slice(Box::new(Self::from_expr(tree, *elem, imports))),
            Expr::MapType { key, value } => TypeRef::Map(
                Box::new(Self::from_expr(tree, *key, imports)),
                Box::new(Self::from_expr(tree, *value, imports)),
            ),
            _ => TypeRef::Unsupported(crate::syntax::print_expr(tree, id)),
        }
    }

    /// Spell the type inside a file that imports the library as `alias`.
    /// `None` when the type names a package the file does not import.
    pub fn render(&self, alias: &str, imports: &ImportTable) -> Option<String> {
        match self {
            TypeRef::Named { package: None, name } => Some(format!("{alias}.{name}")),
            TypeRef::Named {
                package: Some(path),
                name,
            } => imports
                .names_of(path)
                .first()
                .map(|local| format!("{local}.{name}")),
            TypeRef::Builtin(name) => Some(name.clone()),
            TypeRef::Pointer(inner) => inner.render(alias, imports).map(|t| format!("*{t}")),
            TypeRef::Slice(inner) => inner.render(alias, imports).map(|t| format!("[]{t}")),
            TypeRef::Map(k, v) => Some(format!(
                "map[{}]{}",
                k.render(alias, imports)?,
                v.render(alias, imports)?
            )),
            TypeRef::Unsupported(_) => None,
        }
    }
}

/// Exported function signatures of one library package.
#[derive(Debug, Default)]
pub struct PackageView {
    results: HashMap<String, Vec<TypeRef>>,
}

impl PackageView {
    pub fn from_files(files: &[GoFile]) -> Self {
        let mut results = HashMap::new();
        for file in files {
            let imports = file.import_table();
            for func in file.funcs().filter(|f| f.recv.is_none()) {
                let types = func
                    .sig
                    .results
                    .iter()
                    .flat_map(|field| {
                        let ty = TypeRef::from_expr(&file.tree, field.ty, &imports);
                        std::iter::repeat(ty).take(field.names.len().max(1))
                    })
                    .collect();
                results.insert(func.name.clone(), types);
            }
        }
        Self { results }
    }

    pub fn results(&self, function: &str) -> Option<&[TypeRef]> {
        self.results.get(function).map(Vec::as_slice)
    }
}

/// One subject module: where it lives, its `go.mod`, and the packages
/// loaded so far.
#[derive(Debug)]
pub struct ModuleView {
    pub root: PathBuf,
    pub gomod: GoMod,
    caches: Vec<PathBuf>,
    packages: Mutex<HashMap<String, Result<Arc<PackageView>, SemanticLoadError>>>,
}

impl ModuleView {
    pub fn load(dir: &Path) -> Result<Self, SemanticLoadError> {
        let root = locate::module_root(dir).ok_or_else(|| SemanticLoadError::NoModule(dir.to_path_buf()))?;
        let path = root.join("go.mod");
        let text = std::fs::read_to_string(&path).map_err(|e| SemanticLoadError::Io {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let gomod = GoMod::parse(&text).map_err(|e| SemanticLoadError::GoMod {
            path,
            message: e.to_string(),
        })?;
        tracing::debug!(module = %gomod.module, root = %root.display(), "loaded module");
        Ok(Self {
            root,
            gomod,
            caches: locate::module_caches(),
            packages: Mutex::new(HashMap::new()),
        })
    }

    pub fn package(&self, import_path: &str) -> Result<Arc<PackageView>, SemanticLoadError> {
        let mut packages = self.packages.lock();
        packages
            .entry(import_path.to_string())
            .or_insert_with(|| self.load_package(import_path))
            .clone()
    }

    fn load_package(&self, import_path: &str) -> Result<Arc<PackageView>, SemanticLoadError> {
        let dir = locate::package_dirs(&self.root, &self.gomod, import_path, &self.caches)
            .into_iter()
            .find(|d| d.is_dir())
            .ok_or_else(|| SemanticLoadError::Unresolved(import_path.to_string()))?;
        let files = locate::parse_package(&dir)?;
        tracing::debug!(package = import_path, dir = %dir.display(), files = files.len(), "loaded package");
        Ok(Arc::new(PackageView::from_files(&files)))
    }

    pub fn function_results(&self, library: &str, function: &str) -> Result<Vec<TypeRef>, SemanticLoadError> {
        let package = self.package(library)?;
        package
            .results(function)
            .map(<[TypeRef]>::to_vec)
            .ok_or_else(|| SemanticLoadError::MissingFunction {
                library: library.to_string(),
                function: function.to_string(),
            })
    }
}

type Entry = Arc<OnceLock<Result<Arc<ModuleView>, SemanticLoadError>>>;

/// Module views keyed by source directory, each loaded once.
#[derive(Debug, Default)]
pub struct SemanticCache {
    entries: DashMap<PathBuf, Entry>,
}

impl SemanticCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn module(&self, dir: &Path) -> Result<Arc<ModuleView>, SemanticLoadError> {
        let entry = self.entries.entry(dir.to_path_buf()).or_default().clone();
        entry
            .get_or_init(|| ModuleView::load(dir).map(Arc::new))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(path: &Path, text: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    #[test]
    fn test_vendor_signature_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(&root.join("go.mod"), "module example.com/app\n\nrequire github.com/IBM/sarama v1.43.0\n");
        write(
            &root.join("vendor/github.com/IBM/sarama/producer.go"),
            "package sarama\n\nimport \"net/http\"\n\nfunc NewSyncProducer(addrs []string, config *Config) (SyncProducer, error) {\n\treturn nil, nil\n}\n\nfunc NewThing() error {\n\treturn nil\n}\n\nfunc Exotic() (*http.Client, error) {\n\treturn nil, nil\n}\n",
        );
        let cache = SemanticCache::new();
        let view = cache.module(&root.join("cmd")).unwrap();
        assert_eq!(view.gomod.module, "example.com/app");
        assert_eq!(
            view.function_results("github.com/IBM/sarama", "NewSyncProducer").unwrap(),
            vec![TypeRef::named("SyncProducer"), TypeRef::Builtin("error".into())]
        );
        assert_eq!(
            view.function_results("github.com/IBM/sarama", "NewThing").unwrap(),
            vec![TypeRef::Builtin("error".into())]
        );
        let exotic = view.function_results("github.com/IBM/sarama", "Exotic").unwrap();
        let file = GoFile::parse("package main\n\nimport \"github.com/IBM/sarama\"\n").unwrap();
        assert_eq!(exotic[0].render("sarama", &file.import_table()), None);
        assert!(matches!(
            view.function_results("github.com/IBM/sarama", "Missing"),
            Err(SemanticLoadError::MissingFunction { .. })
        ));
    }

    #[test]
    fn test_load_once_per_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SemanticCache::new();
        let first = cache.module(dir.path());
        assert!(matches!(first, Err(SemanticLoadError::NoModule(_))));
        let second = cache.module(dir.path());
        assert_eq!(first.unwrap_err(), second.unwrap_err());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_render_requalifies() {
        let file = GoFile::parse("package main\n\nimport (\n\tkafka \"github.com/IBM/sarama\"\n\t\"net/http\"\n)\n").unwrap();
        let imports = file.import_table();
        let ty = TypeRef::Pointer(Box::new(TypeRef::named("Client")));
        assert_eq!(ty.render("kafka", &imports).as_deref(), Some("*kafka.Client"));
        let foreign = TypeRef::Named {
            package: Some("net/http".into()),
            name: "Client".into(),
        };
        assert_eq!(foreign.render("kafka", &imports).as_deref(), Some("http.Client"));
    }
}
