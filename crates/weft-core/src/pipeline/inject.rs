use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;

use super::{
    blank_unused, companion_aliases, root_alias, root_import_name, InjectOptions, Outcome, Status,
    TransformerStats,
};
use crate::errtrace;
use crate::rules::RuleSet;
use crate::syntax::{build, GoFile};
use crate::transform::{Journal, Registry, TransformContext, TransformError, COMPANION_MODULE, ROOT_IMPORT};

/// Forward pipeline. Shared by reference across worker threads; only the
/// statistics are mutable.
pub struct Injector<'a> {
    registry: &'a Registry,
    rules: Option<&'a RuleSet>,
    options: InjectOptions,
    stats: Mutex<HashMap<&'static str, TransformerStats>>,
}

impl<'a> Injector<'a> {
    pub fn new(registry: &'a Registry, options: InjectOptions) -> Self {
        Self {
            registry,
            rules: None,
            options,
            stats: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_rules(mut self, rules: &'a RuleSet) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Per-transformer counters accumulated so far, sorted by name.
    pub fn stats(&self) -> Vec<TransformerStats> {
        let mut stats: Vec<_> = self.stats.lock().values().cloned().collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    fn record(&self, name: &'static str, started: Instant, result: &Result<bool, TransformError>) {
        let mut stats = self.stats.lock();
        let entry = stats.entry(name).or_insert_with(|| TransformerStats::new(name));
        entry.applications += 1;
        entry.total_time_ms += started.elapsed().as_millis() as u64;
        match result {
            Ok(true) => entry.transformations += 1,
            Ok(false) => {}
            Err(_) => entry.errors += 1,
        }
    }

    /// Instrument one source file.
    pub fn inject_source(&self, src: &str, ctx: &TransformContext<'_>) -> Outcome {
        if src.trim().is_empty() {
            return Outcome::verbatim(src, Status::Copied, "empty file");
        }
        let mut file = match GoFile::parse(src) {
            Ok(file) => file,
            Err(e) => {
                tracing::debug!(file = ?ctx.source_file, error = %e, "copying unparsable file");
                return Outcome::verbatim(src, Status::Copied, format!("parse error: {e}"));
            }
        };
        if file.has_import_prefix(COMPANION_MODULE) {
            return Outcome::verbatim(src, Status::Skipped, "already instrumented");
        }

        let entry = file.entry_point();
        let detected = Registry::dedup_families(self.registry.filtered(&file, self.options.enabled.as_ref()));
        let has_rules = self.rules.is_some_and(RuleSet::has_source_rules);
        if detected.is_empty() && entry.is_none() && !has_rules && !self.options.error_tracing {
            return Outcome::verbatim(src, Status::Skipped, "nothing to instrument");
        }

        let root = root_alias(&file);
        let mut journal = Journal::new();
        let mut applied = Vec::new();
        let mut uses_root = false;

        if let Some(body) = entry {
            let init = format!("{root}.Init(nil)\ndefer {root}.Shutdown()");
            match build::snippet(&mut file.tree, &init) {
                Ok(stmts) => {
                    let block = file.tree.block(body);
                    let one_line = block.one_line && block.stmts.is_empty();
                    file.tree.insert_stmts(body, 0, &stmts);
                    // `func main() {}` stays on one line so removal can restore it.
                    file.tree.block_mut(body).one_line = one_line;
                    journal.note("added tracer initialization to main");
                    uses_root = true;
                }
                Err(e) => return Outcome::failed(src, format!("initializer: {e}"), journal),
            }
        }

        for transformer in detected {
            let Some(companion) = transformer.companion_path(&file) else {
                continue;
            };
            let alias = transformer.companion_alias(&companion);
            let started = Instant::now();
            let result = transformer.inject(&mut file, ctx, &mut journal, &alias);
            self.record(transformer.name, started, &result);
            match result {
                Ok(true) => {
                    file.add_import(transformer.alias_override, &companion);
                    blank_unused(&mut file, &transformer.library_paths(), &mut journal);
                    applied.push(transformer.name.to_string());
                }
                Ok(false) => {}
                Err(e) => return Outcome::failed(src, e.to_string(), journal),
            }
        }

        let mut traced = 0;
        if self.options.error_tracing {
            let mut companions = companion_aliases(&file);
            companions.push(root.to_string());
            match errtrace::inject(&mut file, root, &companions, &mut journal) {
                Ok(n) => traced = n,
                Err(e) => return Outcome::failed(src, e.to_string(), journal),
            }
            uses_root |= traced > 0;
        }

        let mut ruled = false;
        if let Some(rules) = self.rules {
            match rules.apply(&mut file, ctx, root, &mut journal) {
                Ok(changed) => ruled = changed,
                Err(e) => return Outcome::failed(src, e.to_string(), journal),
            }
        }

        if !uses_root && applied.is_empty() && !ruled {
            return Outcome {
                journal,
                ..Outcome::verbatim(src, Status::Skipped, "no applicable rewrite")
            };
        }
        if uses_root || file.references(root) {
            file.add_import(root_import_name(root), ROOT_IMPORT);
        } else if !file.has_import_prefix(COMPANION_MODULE) {
            file.add_import(Some("_"), ROOT_IMPORT);
        }

        tracing::info!(
            file = ?ctx.source_file,
            transformers = ?applied,
            traced,
            "instrumented"
        );
        Outcome {
            status: Status::Instrumented,
            output: file.print(),
            transformers: applied,
            journal,
            message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::ReplaceRule;
    use pretty_assertions::assert_eq;

    fn injector(registry: &Registry) -> Injector<'_> {
        Injector::new(registry, InjectOptions::default())
    }

    #[test]
    fn test_entry_point_only() {
        let registry = Registry::builtin();
        let src = "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"hi\")\n}\n";
        let out = injector(&registry).inject_source(src, &TransformContext::new());
        assert_eq!(out.status, Status::Instrumented);
        assert_eq!(
            out.output,
            "package main\n\nimport \"fmt\"\n\nimport (\n\t\"github.com/weftapm/weft-go/trace\"\n)\n\nfunc main() {\n\ttrace.Init(nil)\n\tdefer trace.Shutdown()\n\tfmt.Println(\"hi\")\n}\n"
        );
    }

    #[test]
    fn test_early_returns() {
        let registry = Registry::builtin();
        let injector = injector(&registry);
        let ctx = TransformContext::new();
        assert_eq!(injector.inject_source("", &ctx).status, Status::Copied);
        assert_eq!(injector.inject_source("package (", &ctx).status, Status::Copied);

        let plain = "package util\n\nfunc add(a, b int) int {\n\treturn a + b\n}\n";
        let out = injector.inject_source(plain, &ctx);
        assert_eq!(out.status, Status::Skipped);
        assert_eq!(out.output, plain);
    }

    #[test]
    fn test_library_free_package_gets_error_tracing() {
        let registry = Registry::builtin();
        let ctx = TransformContext::new();
        let src = "package store\n\nfunc load() error {\n\tif err := open(); err != nil {\n\t\treturn err\n\t}\n\treturn nil\n}\n\nvar check = func() error {\n\tif err := ping(); err != nil {\n\t\treturn err\n\t}\n\treturn nil\n}\n";
        let out = injector(&registry).inject_source(src, &ctx);
        assert_eq!(out.status, Status::Instrumented);
        assert_eq!(out.output.matches("trace.Error(err)").count(), 2);
        assert!(out.output.contains("\t\"github.com/weftapm/weft-go/trace\"\n"));

        let untraced = Injector::new(
            &registry,
            InjectOptions {
                enabled: None,
                error_tracing: false,
            },
        );
        let out = untraced.inject_source(src, &ctx);
        assert_eq!(out.status, Status::Skipped);
        assert_eq!(out.output, src);
    }

    #[test]
    fn test_one_line_main_stays_on_one_line() {
        let registry = Registry::builtin();
        let out = injector(&registry).inject_source("package main\n\nfunc main() {}\n", &TransformContext::new());
        assert!(out
            .output
            .contains("func main() { trace.Init(nil); defer trace.Shutdown() }\n"));
    }

    #[test]
    fn test_root_alias_when_trace_declared() {
        let registry = Registry::builtin();
        let src = "package main\n\nimport (\n\t\"runtime/trace\"\n)\n\nfunc main() {\n\ttrace.Start(nil)\n}\n";
        let out = injector(&registry).inject_source(src, &TransformContext::new());
        assert!(out.output.contains("\twefttrace \"github.com/weftapm/weft-go/trace\"\n"));
        assert!(out.output.contains("\twefttrace.Init(nil)\n\tdefer wefttrace.Shutdown()\n\ttrace.Start(nil)\n"));
    }

    #[test]
    fn test_rules_only_adds_marker_import() {
        let registry = Registry::builtin();
        let rules = RuleSet {
            replace: vec![ReplaceRule {
                package: "fmt".into(),
                function: "Println".into(),
                with: "log.Println".into(),
                imports: vec!["log".into()],
            }],
            ..RuleSet::default()
        };
        let injector = Injector::new(
            &registry,
            InjectOptions {
                enabled: None,
                error_tracing: false,
            },
        )
        .with_rules(&rules);
        let src = "package util\n\nimport (\n\t\"fmt\"\n)\n\nfunc say() {\n\tfmt.Println(\"x\")\n}\n";
        let out = injector.inject_source(src, &TransformContext::new());
        assert_eq!(out.status, Status::Instrumented);
        assert!(out.output.contains("\t_ \"github.com/weftapm/weft-go/trace\"\n"));

        let again = injector.inject_source(&out.output, &TransformContext::new());
        assert_eq!(again.status, Status::Skipped);
        assert_eq!(again.output, out.output);
    }

    #[test]
    fn test_stats_count_applications() {
        let registry = Registry::builtin();
        let injector = injector(&registry);
        let src = "package main\n\nimport (\n\t\"github.com/gin-gonic/gin\"\n)\n\nfunc main() {\n\tr := gin.Default()\n\tr.Run()\n}\n";
        let out = injector.inject_source(src, &TransformContext::new());
        assert_eq!(out.transformers, vec!["gin".to_string()]);
        let stats = injector.stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].name, "gin");
        assert_eq!(stats[0].transformations, 1);
        assert_eq!(stats[0].success_rate(), 1.0);
    }
}
