/*!
# Pipelines

The forward ([`Injector`]) and inverse ([`Remover`]) transformation of one
source file. Both are pure functions of the source text, the registry and
their options; a file that cannot or need not be rewritten is returned
byte for byte.

## Injection

1. empty or unparsable input is copied
2. a file already importing the companion module is skipped
3. the entry point gets `trace.Init(nil)` / `defer trace.Shutdown()`
4. every enabled, detected transformer runs, one per family
5. error guards are traced
6. custom rules run
7. imports are settled and the file is printed

## Removal

The same steps in reverse, driven by the companion imports the file
carries. Custom rules are not undone.
*/

mod inject;
mod remove;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::syntax::{build, default_import_name, BlockId, GoFile, Stmt};
use crate::transform::{Journal, COMPANION_MODULE, ROOT_IMPORT};

pub use inject::Injector;
pub use remove::Remover;

/// Default identifier of the tracing root package.
pub const ROOT_NAME: &str = "trace";
/// Identifier used when `trace` is already declared in the file.
pub const ROOT_FALLBACK: &str = "wefttrace";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Instrumented,
    Removed,
    Skipped,
    Copied,
    Error,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Instrumented => "instrumented",
            Status::Removed => "removed",
            Status::Skipped => "skipped",
            Status::Copied => "copied",
            Status::Error => "error",
        };
        f.write_str(s)
    }
}

/// Result of running a pipeline over one file.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub status: Status,
    /// Text to write to the output tree.
    pub output: String,
    /// Transformers that changed the file.
    pub transformers: Vec<String>,
    pub journal: Journal,
    /// Why the file was copied, skipped or failed.
    pub message: Option<String>,
}

impl Outcome {
    pub fn verbatim(src: &str, status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            output: src.to_string(),
            transformers: Vec::new(),
            journal: Journal::new(),
            message: Some(message.into()),
        }
    }

    pub fn failed(src: &str, message: impl Into<String>, journal: Journal) -> Self {
        Self {
            journal,
            ..Self::verbatim(src, Status::Error, message)
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == Status::Error
    }
}

/// Per-transformer counters over a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerStats {
    pub name: String,
    pub applications: u64,
    pub transformations: u64,
    pub errors: u64,
    pub total_time_ms: u64,
}

impl TransformerStats {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            applications: 0,
            transformations: 0,
            errors: 0,
            total_time_ms: 0,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.applications == 0 {
            0.0
        } else {
            (self.transformations as f64) / (self.applications as f64)
        }
    }

    pub fn average_time_ms(&self) -> f64 {
        if self.applications == 0 {
            0.0
        } else {
            (self.total_time_ms as f64) / (self.applications as f64)
        }
    }
}

#[derive(Debug, Clone)]
pub struct InjectOptions {
    /// Allow-list of transformer names; `None` enables all.
    pub enabled: Option<HashSet<String>>,
    pub error_tracing: bool,
}

impl Default for InjectOptions {
    fn default() -> Self {
        Self {
            enabled: None,
            error_tracing: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    /// Also remove hand-written companion calls that can be removed safely.
    pub strict: bool,
}

/// Identifier for the tracing root in this file.
pub fn root_alias(file: &GoFile) -> &'static str {
    if file.scope_names().contains(ROOT_NAME) {
        ROOT_FALLBACK
    } else {
        ROOT_NAME
    }
}

/// Local names of every companion import, the tracing root included.
pub fn companion_aliases(file: &GoFile) -> Vec<String> {
    let mut aliases: Vec<String> = file
        .imports()
        .filter(|spec| spec.path.starts_with(COMPANION_MODULE))
        .filter_map(|spec| spec.local_name())
        .collect();
    aliases.sort();
    aliases.dedup();
    aliases
}

/// Import name for the tracing root: none when the default is used.
pub(crate) fn root_import_name(root: &str) -> Option<&str> {
    (root != default_import_name(ROOT_IMPORT)).then_some(root)
}

/// Marker comment on a blanked import that remembers its explicit name.
const ALIAS_MARKER: &str = "// weft:as ";

/// Blank every import of `paths` that the file no longer references. An
/// explicit import name is kept in a trailing marker comment.
pub(crate) fn blank_unused(file: &mut GoFile, paths: &[&str], journal: &mut Journal) {
    for path in paths {
        let unused: Vec<String> = file
            .import_names(path)
            .into_iter()
            .filter(|name| !file.references(name))
            .collect();
        if unused.is_empty() {
            continue;
        }
        let specs = file
            .imports_mut()
            .filter(|spec| spec.path == *path && spec.local_name().is_some_and(|n| unused.contains(&n)));
        for spec in specs {
            if let Some(name) = spec.name.take() {
                spec.comment = Some(match spec.comment.take() {
                    Some(comment) => format!("{ALIAS_MARKER}{name} {comment}"),
                    None => format!("{ALIAS_MARKER}{name}"),
                });
            }
            spec.name = Some("_".to_string());
        }
        journal.note(format!("blanked unused import {path}"));
    }
}

/// Give blanked imports of `paths` back the explicit name their marker
/// comment carries.
pub(crate) fn restore_aliases(file: &mut GoFile, paths: &[&str], journal: &mut Journal) {
    for spec in file.imports_mut().filter(|spec| paths.contains(&spec.path.as_str())) {
        if spec.name.as_deref() != Some("_") {
            continue;
        }
        let Some(marked) = spec.comment.as_deref().and_then(|c| c.strip_prefix(ALIAS_MARKER)) else {
            continue;
        };
        let (name, comment) = match marked.split_once(' ') {
            Some((name, comment)) => (name.to_string(), Some(comment.to_string())),
            None => (marked.to_string(), None),
        };
        journal.note(format!("restored import name {name} for {}", spec.path));
        spec.name = Some(name);
        spec.comment = comment;
    }
}

/// Restore the default name of a blanked import the file references again.
pub(crate) fn unblank_used(file: &mut GoFile, paths: &[&str], journal: &mut Journal) {
    for path in paths {
        let blanked = file
            .imports()
            .any(|spec| spec.path == *path && spec.name.as_deref() == Some("_"));
        if blanked && file.references(&default_import_name(path)) {
            file.set_import_name(path, None);
            journal.note(format!("restored import {path}"));
        }
    }
}

/// The generated `Init` / deferred `Shutdown` statements at the top of the
/// entry point.
pub(crate) fn initializer_pair(file: &GoFile, body: BlockId, root: &str) -> Vec<usize> {
    let tree = &file.tree;
    let stmts = &tree.block(body).stmts;
    let mut found = Vec::new();
    if let Some(first) = stmts.first() {
        if build::is_call_stmt(tree, *first, root, "Init").is_some() {
            found.push(0);
        }
    }
    if let Some(second) = stmts.get(found.len()) {
        if let Stmt::Defer(call) = tree.stmt(*second) {
            if matches!(tree.callee(*call), Some((Some(pkg), "Shutdown")) if pkg == root) {
                found.push(found.len());
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_alias_avoids_collision() {
        let file = GoFile::parse("package main\n\nfunc trace() {\n}\n").unwrap();
        assert_eq!(root_alias(&file), "wefttrace");
        let file = GoFile::parse("package main\n\nimport \"runtime/trace\"\n").unwrap();
        assert_eq!(root_alias(&file), "wefttrace");
        let file = GoFile::parse("package main\n").unwrap();
        assert_eq!(root_alias(&file), "trace");
        assert_eq!(root_import_name("trace"), None);
        assert_eq!(root_import_name("wefttrace"), Some("wefttrace"));
    }

    #[test]
    fn test_blanked_alias_is_restored() {
        let src = "package store\n\nimport (\n\tdb \"database/sql\" // driver\n\t\"net/http\"\n)\n";
        let mut file = GoFile::parse(src).unwrap();
        let mut journal = Journal::new();
        blank_unused(&mut file, &["database/sql", "net/http"], &mut journal);
        let blanked = file.print();
        assert!(blanked.contains("\t_ \"database/sql\" // weft:as db // driver\n"));
        assert!(blanked.contains("\t_ \"net/http\"\n"));

        let mut file = GoFile::parse(&blanked).unwrap();
        restore_aliases(&mut file, &["database/sql"], &mut journal);
        assert_eq!(file.import_names("database/sql"), vec!["db".to_string()]);
        assert!(file.print().contains("\tdb \"database/sql\" // driver\n"));
    }

    #[test]
    fn test_stats_rates() {
        let mut stats = TransformerStats::new("gin");
        assert_eq!(stats.success_rate(), 0.0);
        stats.applications = 4;
        stats.transformations = 1;
        stats.total_time_ms = 8;
        assert_eq!(stats.success_rate(), 0.25);
        assert_eq!(stats.average_time_ms(), 2.0);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Status::Instrumented).unwrap(), "\"instrumented\"");
        assert_eq!(Status::Copied.to_string(), "copied");
    }
}
