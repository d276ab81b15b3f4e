/*!
# Transformers

A [`Transformer`] is the registered rewrite policy for one instrumented
library: which import paths identify the library, which companion package the
generated code calls into, and the policy that performs the forward and
inverse rewrite.

## Architecture

- `Transformer`: immutable record with a `Policy` tag and optional
  capability fields, dispatched by `match`
- `Registry`: explicit value built once and passed by reference
- `context`: request-scoped context inference from enclosing parameters
- `libs`: the built-in policies

Every policy reports whether it changed the file; a policy that returns
`false` has left the tree untouched.
*/

pub mod context;
pub mod libs;
pub mod registry;

use std::path::{Path, PathBuf};

use crate::semantic::{SemanticCache, SemanticLoadError, TypeRef};
use crate::syntax::{default_import_name, GoFile, ImportTable, ParseError};

pub use registry::{Registry, RegistryError};

/// Module path of the companion runtime.
pub const COMPANION_MODULE: &str = "github.com/weftapm/weft-go";
/// Package providing `Init`, `Shutdown` and `Error`.
pub const ROOT_IMPORT: &str = "github.com/weftapm/weft-go/trace";
pub const INSTRUMENTATION_PREFIX: &str = "github.com/weftapm/weft-go/instrumentation";

/// Failure of one transformer on one file. Fatal for that file only.
#[derive(thiserror::Error, Debug)]
pub enum TransformError {
    #[error("{transformer}: generated code did not parse: {source}")]
    Snippet {
        transformer: &'static str,
        #[source]
        source: ParseError,
    },

    #[error("{transformer}: {message}")]
    Unsupported {
        transformer: &'static str,
        message: String,
    },
}

/// One import path of an instrumented library and the companion package
/// generated code uses with it, relative to [`INSTRUMENTATION_PREFIX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Library {
    pub path: &'static str,
    pub companion: &'static str,
}

/// Resolves a factory's declared result types from the subject module.
pub type SemanticHook = fn(&SemanticRequest<'_>) -> Result<Vec<TypeRef>, SemanticLoadError>;

pub struct SemanticRequest<'a> {
    pub cache: &'a SemanticCache,
    pub dir: &'a Path,
    pub library: &'a str,
    pub function: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub enum Policy {
    NetHttp,
    Substitute(&'static libs::substitute::Substitution),
    Register(&'static libs::register::Registration),
    Grpc,
    ClosureWrap(&'static libs::closure::ClosureWrap),
}

#[derive(Debug, Clone)]
pub struct Transformer {
    pub name: &'static str,
    /// Version variants of one library share a family.
    pub family: &'static str,
    pub description: &'static str,
    pub libraries: &'static [Library],
    pub policy: Policy,
    pub semantic: Option<SemanticHook>,
    /// Import name for the companion when its default name would collide.
    pub alias_override: Option<&'static str>,
}

impl Transformer {
    /// The library variant imported by the file, if any.
    pub fn variant(&self, file: &GoFile) -> Option<&'static Library> {
        let imports = file.import_table();
        self.libraries
            .iter()
            .find(|lib| !imports.names_of(lib.path).is_empty())
    }

    pub fn detect(&self, file: &GoFile) -> bool {
        self.variant(file).is_some()
    }

    pub fn library_paths(&self) -> Vec<&'static str> {
        self.libraries.iter().map(|l| l.path).collect()
    }

    /// Companion import path for the variant the file imports.
    pub fn companion_path(&self, file: &GoFile) -> Option<String> {
        self.variant(file)
            .map(|lib| format!("{INSTRUMENTATION_PREFIX}/{}", lib.companion))
    }

    pub fn all_companion_paths(&self) -> Vec<String> {
        self.libraries
            .iter()
            .map(|lib| format!("{INSTRUMENTATION_PREFIX}/{}", lib.companion))
            .collect()
    }

    /// Name generated code uses for the companion package.
    pub fn companion_alias(&self, companion_path: &str) -> String {
        self.alias_override
            .map(str::to_string)
            .unwrap_or_else(|| default_import_name(companion_path))
    }

    pub fn inject(
        &self,
        file: &mut GoFile,
        ctx: &TransformContext<'_>,
        journal: &mut Journal,
        alias: &str,
    ) -> Result<bool, TransformError> {
        let imports = file.import_table();
        let lib = LibraryScope::new(self, &imports);
        match self.policy {
            Policy::NetHttp => libs::nethttp::inject(file, &lib, journal, alias),
            Policy::Substitute(p) => libs::substitute::inject(file, &lib, p, journal, alias),
            Policy::Register(p) => libs::register::inject(file, &lib, p, journal, alias),
            Policy::Grpc => libs::grpc::inject(file, &lib, journal, alias),
            Policy::ClosureWrap(p) => libs::closure::inject(file, &lib, p, ctx, journal, alias),
        }
    }

    pub fn remove(
        &self,
        file: &mut GoFile,
        journal: &mut Journal,
        alias: &str,
    ) -> Result<bool, TransformError> {
        let imports = file.import_table();
        let lib = LibraryScope::new(self, &imports);
        match self.policy {
            Policy::NetHttp => libs::nethttp::remove(file, &lib, journal, alias),
            Policy::Substitute(p) => libs::substitute::remove(file, &lib, p, journal, alias),
            Policy::Register(p) => libs::register::remove(file, p, journal, alias),
            Policy::Grpc => libs::grpc::remove(file, &lib, journal, alias),
            Policy::ClosureWrap(p) => libs::closure::remove(file, p, journal, alias),
        }
    }
}

/// How one file refers to a transformer's library.
pub struct LibraryScope<'a> {
    pub transformer: &'a Transformer,
    pub imports: &'a ImportTable,
    /// Local names bound to any variant of the library.
    pub aliases: Vec<String>,
}

impl<'a> LibraryScope<'a> {
    pub fn new(transformer: &'a Transformer, imports: &'a ImportTable) -> Self {
        let aliases = transformer
            .libraries
            .iter()
            .flat_map(|lib| imports.names_of(lib.path))
            .map(str::to_string)
            .collect();
        Self {
            transformer,
            imports,
            aliases,
        }
    }

    pub fn is_alias(&self, name: &str) -> bool {
        self.aliases.iter().any(|a| a == name)
    }

    /// Name to use when generated or restored code refers to the library.
    pub fn primary_alias(&self) -> String {
        self.aliases.first().cloned().unwrap_or_else(|| {
            self.transformer
                .libraries
                .first()
                .map(|lib| default_import_name(lib.path))
                .unwrap_or_default()
        })
    }

    pub fn snippet_error(&self, source: ParseError) -> TransformError {
        TransformError::Snippet {
            transformer: self.transformer.name,
            source,
        }
    }
}

/// Read-only inputs of one file's transformation.
#[derive(Debug, Clone, Default)]
pub struct TransformContext<'a> {
    pub source_file: Option<PathBuf>,
    pub semantic: Option<&'a SemanticCache>,
}

impl<'a> TransformContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.source_file = Some(file.into());
        self
    }

    pub fn with_semantic(mut self, cache: &'a SemanticCache) -> Self {
        self.semantic = Some(cache);
        self
    }

    /// Directory holding the source file.
    pub fn source_dir(&self) -> Option<&Path> {
        self.source_file.as_deref().and_then(Path::parent)
    }

    pub fn file_name(&self) -> Option<&str> {
        self.source_file
            .as_deref()
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())
    }
}

/// Human-readable record of what a pass did to one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Journal {
    pub changes: Vec<String>,
    pub warnings: Vec<String>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note(&mut self, change: impl Into<String>) {
        let change = change.into();
        tracing::debug!(%change, "rewrite");
        self.changes.push(change);
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        tracing::warn!(%warning, "rewrite skipped");
        self.warnings.push(warning);
    }

    pub fn merge(&mut self, other: Journal) {
        self.changes.extend(other.changes);
        self.warnings.extend(other.warnings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transformer(name: &str) -> Transformer {
        libs::builtin()
            .into_iter()
            .find(|t| t.name == name)
            .unwrap()
    }

    #[test]
    fn test_variant_selection() {
        let echo = transformer("echo");
        let file = GoFile::parse("package main\n\nimport \"github.com/labstack/echo/v4\"\n").unwrap();
        assert_eq!(
            echo.companion_path(&file).as_deref(),
            Some("github.com/weftapm/weft-go/instrumentation/github.com/labstack/echo/v4/weftecho")
        );
        let file = GoFile::parse("package main\n\nimport \"github.com/labstack/echo\"\n").unwrap();
        assert_eq!(
            echo.companion_path(&file).as_deref(),
            Some("github.com/weftapm/weft-go/instrumentation/github.com/labstack/echo/weftecho")
        );
    }

    #[test]
    fn test_companion_alias_override() {
        let http = transformer("nethttp");
        let file = GoFile::parse("package main\n\nimport \"net/http\"\n").unwrap();
        let path = http.companion_path(&file).unwrap();
        assert_eq!(http.companion_alias(&path), "wefthttp");
        let gin = transformer("gin");
        assert_eq!(
            gin.companion_alias("github.com/weftapm/weft-go/instrumentation/github.com/gin-gonic/gin/weftgin"),
            "weftgin"
        );
    }

    #[test]
    fn test_blank_import_does_not_detect() {
        let sql = transformer("sql");
        let file = GoFile::parse("package main\n\nimport _ \"database/sql\"\n").unwrap();
        assert!(!sql.detect(&file));
    }

    #[test]
    fn test_context_builder() {
        let ctx = TransformContext::new().with_source_file("/src/app/main.go");
        assert_eq!(ctx.file_name(), Some("main.go"));
        assert_eq!(ctx.source_dir(), Some(Path::new("/src/app")));
    }
}
