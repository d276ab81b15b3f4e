/*!
# Custom Rules

User-configured rewrites applied after the built-in transformers:

- **add**: materialize or extend a file in the output tree (batch only)
- **inject**: statements at the start of matching functions, and deferred
  statements at their end
- **replace**: retarget `pkg.F(...)` calls to another package
- **hook**: statements before and after calls to a function
- **transform**: replace the calling statement with a rendered template

Rules run in the fixed order inject, replace, hook, transform. A rule
application whose generated code cannot be parsed or rendered is skipped
with a warning; the original code is kept. Custom rules are never undone by
removal.
*/

pub mod add;
pub mod hook;
pub mod inject;
pub mod replace;
pub mod template;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::syntax::{build, ExprId, GoFile, StmtId, Tree};
use crate::transform::{Journal, TransformContext, TransformError};

pub use template::TemplateError;

fn any() -> String {
    "*".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddRule {
    /// Directory of the output tree, relative to its root.
    #[serde(default = "dot")]
    pub package: String,
    pub file: String,
    #[serde(default)]
    pub content: Option<String>,
    /// Read relative to the configuration file's directory.
    #[serde(default)]
    pub content_file: Option<PathBuf>,
    #[serde(default)]
    pub append: bool,
}

fn dot() -> String {
    ".".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectRule {
    #[serde(default = "any")]
    pub package: String,
    #[serde(default = "any")]
    pub file: String,
    pub function: String,
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaceRule {
    /// Import path of the package whose calls are replaced.
    pub package: String,
    pub function: String,
    /// `Q.G`, or `Q.*` to keep the matched function name.
    pub with: String,
    /// Each `path` or `alias path`.
    #[serde(default)]
    pub imports: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookRule {
    /// Import path; empty for functions of the file's own package.
    #[serde(default)]
    pub package: String,
    pub function: String,
    #[serde(default)]
    pub before: String,
    #[serde(default)]
    pub after: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformRule {
    #[serde(default)]
    pub package: String,
    pub function: String,
    pub template: String,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    pub add: Vec<AddRule>,
    pub inject: Vec<InjectRule>,
    pub replace: Vec<ReplaceRule>,
    pub hook: Vec<HookRule>,
    pub transform: Vec<TransformRule>,
}

impl RuleSet {
    /// Whether any rule can change a source file.
    pub fn has_source_rules(&self) -> bool {
        !(self.inject.is_empty() && self.replace.is_empty() && self.hook.is_empty() && self.transform.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && !self.has_source_rules()
    }

    /// Make `content_file` paths absolute against the configuration
    /// directory.
    pub fn resolve_paths(&mut self, base: &Path) {
        for rule in &mut self.add {
            if let Some(path) = rule.content_file.take() {
                rule.content_file = Some(if path.is_absolute() { path } else { base.join(path) });
            }
        }
    }

    /// Apply the source rules to one file. Returns whether it changed.
    pub fn apply(
        &self,
        file: &mut GoFile,
        ctx: &TransformContext<'_>,
        root: &str,
        journal: &mut Journal,
    ) -> Result<bool, TransformError> {
        let mut changed = false;
        for rule in &self.inject {
            changed |= inject::apply(rule, file, ctx, root, journal)?;
        }
        for rule in &self.replace {
            changed |= replace::apply(rule, file, journal)?;
        }
        for rule in &self.hook {
            changed |= hook::apply(rule, file, journal)?;
        }
        for rule in &self.transform {
            changed |= template::apply(rule, file, journal)?;
        }
        Ok(changed)
    }
}

/// `*` matches anything; otherwise the pieces between stars must appear in
/// order, the first as a prefix and the last as a suffix.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == text;
    }
    let pieces: Vec<&str> = pattern.split('*').collect();
    let (first, last) = (pieces[0], pieces[pieces.len() - 1]);
    if text.len() < first.len() + last.len() || !text.starts_with(first) || !text.ends_with(last) {
        return false;
    }
    let mut rest = &text[first.len()..text.len() - last.len()];
    for piece in &pieces[1..pieces.len() - 1] {
        match rest.find(piece) {
            Some(at) => rest = &rest[at + piece.len()..],
            None => return false,
        }
    }
    true
}

/// A call a hook or transform rule targets: `alias.F` for an imported
/// package, bare `F` for the file's own.
pub(crate) struct CallTarget<'a> {
    /// Local names of the package, empty for local functions.
    aliases: Vec<String>,
    local: bool,
    function: &'a str,
}

impl<'a> CallTarget<'a> {
    pub(crate) fn new(file: &GoFile, package: &str, function: &'a str) -> Self {
        let local = package.is_empty() || package == file.package;
        let aliases = if local {
            Vec::new()
        } else {
            file.import_table()
                .names_of(package)
                .into_iter()
                .map(str::to_string)
                .collect()
        };
        Self {
            aliases,
            local,
            function,
        }
    }

    /// Whether the rule can match anything in the file.
    pub(crate) fn is_reachable(&self) -> bool {
        self.local || !self.aliases.is_empty()
    }

    pub(crate) fn matches(&self, tree: &Tree, call: ExprId) -> bool {
        match tree.callee(call) {
            Some((None, name)) if self.local => wildcard_match(self.function, name),
            Some((Some(pkg), name)) if !self.local => {
                self.aliases.iter().any(|a| a == pkg) && wildcard_match(self.function, name)
            }
            _ => false,
        }
    }
}

/// Parse configured statements, warning instead of failing.
pub(crate) fn rule_snippet(
    tree: &mut Tree,
    text: &str,
    what: &str,
    journal: &mut Journal,
) -> Option<Vec<StmtId>> {
    if text.trim().is_empty() {
        return Some(Vec::new());
    }
    match build::snippet(tree, text) {
        Ok(stmts) => Some(stmts),
        Err(e) => {
            journal.warn(format!("{what}: rule code did not parse ({e}), rule skipped"));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcards() {
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("Handle*", "HandleOrder"));
        assert!(wildcard_match("*Handler", "OrderHandler"));
        assert!(wildcard_match("Get*ByID", "GetUserByID"));
        assert!(!wildcard_match("Get*ByID", "GetByI"));
        assert!(wildcard_match("main", "main"));
        assert!(!wildcard_match("main", "mainly"));
        assert!(wildcard_match("*_test*", "a_test.go"));
    }

    #[test]
    fn test_rules_deserialize_with_defaults() {
        let rules: RuleSet = serde_yaml::from_str(
            "inject:\n  - function: \"Handle*\"\n    start: 'log.Println(\"in\")'\nreplace:\n  - package: fmt\n    function: Println\n    with: log.Println\n    imports: [log]\n",
        )
        .unwrap();
        assert_eq!(rules.inject[0].package, "*");
        assert_eq!(rules.inject[0].end, "");
        assert_eq!(rules.replace[0].imports, vec!["log".to_string()]);
        assert!(rules.has_source_rules());
        assert!(rules.add.is_empty());
    }

    #[test]
    fn test_content_file_resolved_against_config_dir() {
        let mut rules = RuleSet {
            add: vec![AddRule {
                package: ".".into(),
                file: "extra.go".into(),
                content: None,
                content_file: Some("snippets/extra.go".into()),
                append: false,
            }],
            ..RuleSet::default()
        };
        rules.resolve_paths(Path::new("/etc/weft"));
        assert_eq!(
            rules.add[0].content_file.as_deref(),
            Some(Path::new("/etc/weft/snippets/extra.go"))
        );
    }
}
