/*!
# Pipeline Integration Tests

Whole-file injection and removal through the public API.
*/

use pretty_assertions::assert_eq;
use weft_core::pipeline::{InjectOptions, Injector, RemoveOptions, Remover, Status};
use weft_core::rules::{HookRule, ReplaceRule, RuleSet};
use weft_core::{Registry, TransformContext, WeftConfig};

fn inject(src: &str) -> weft_core::Outcome {
    let registry = Registry::builtin();
    Injector::new(&registry, InjectOptions::default()).inject_source(src, &TransformContext::new())
}

fn remove(src: &str) -> weft_core::Outcome {
    let registry = Registry::builtin();
    Remover::new(&registry, RemoveOptions::default()).remove_source(src, &TransformContext::new())
}

const GIN_SERVICE: &str = "package main

import (
\t\"database/sql\"
\t\"net/http\"

\t\"github.com/gin-gonic/gin\"
)

func main() {
\tdb, err := sql.Open(\"postgres\", dsn)
\tif err != nil {
\t\tpanic(err)
\t}
\tr := gin.Default()
\tr.GET(\"/users\", listUsers(db))
\tr.Run(\":8080\")
}

func listUsers(db *sql.DB) gin.HandlerFunc {
\treturn func(c *gin.Context) {
\t\trows, err := db.Query(\"select name from users\")
\t\tif err != nil {
\t\t\tc.Status(http.StatusInternalServerError)
\t\t\treturn
\t\t}
\t\tdefer rows.Close()
\t\tc.Status(http.StatusOK)
\t}
}
";

#[test]
fn test_gin_service_instrumented() -> anyhow::Result<()> {
    let out = inject(GIN_SERVICE);
    assert_eq!(out.status, Status::Instrumented);
    assert_eq!(out.transformers, vec!["sql".to_string(), "gin".to_string()]);
    let text = &out.output;
    assert!(text.contains("\ttrace.Init(nil)\n\tdefer trace.Shutdown()\n\tdb, err := weftsql.Open(\"postgres\", dsn)\n"));
    assert_eq!(text.matches("r.Use(weftgin.Middleware())").count(), 1);
    assert!(text.contains("\tr := gin.Default()\n\tr.Use(weftgin.Middleware())\n\tr.GET("));
    assert!(text.contains("\t\t\ttrace.Error(err)\n\t\t\treturn\n"));
    assert!(text.contains("\tweftsql \"github.com/weftapm/weft-go/instrumentation/database/sql\"\n"));
    assert!(text.contains("\t\"github.com/weftapm/weft-go/instrumentation/github.com/gin-gonic/gin/weftgin\"\n"));
    assert!(text.contains("\t\"github.com/weftapm/weft-go/trace\"\n"));
    Ok(())
}

#[test]
fn test_gin_service_round_trip() -> anyhow::Result<()> {
    let injected = inject(GIN_SERVICE).output;
    let again = inject(&injected);
    assert_eq!(again.status, Status::Skipped);
    assert_eq!(again.output, injected);

    let removed = remove(&injected);
    assert_eq!(removed.status, Status::Removed);
    assert!(removed.journal.warnings.is_empty(), "{:?}", removed.journal.warnings);
    assert_eq!(removed.output, GIN_SERVICE);
    Ok(())
}

#[test]
fn test_context_inference_for_client_calls() -> anyhow::Result<()> {
    let src = "package api

import (
\t\"context\"
\t\"net/http\"
)

func proxy(w http.ResponseWriter, r *http.Request) {
\thttp.Get(upstream)
}

func fetch(ctx context.Context) {
\thttp.Get(upstream)
}

func poll() {
\thttp.Get(upstream)
}
";
    let out = inject(src);
    assert!(out.output.contains("\twefthttp.Get(r.Context(), upstream)\n"));
    assert!(out.output.contains("\twefthttp.Get(ctx, upstream)\n"));
    assert!(out.output.contains("\twefthttp.Get(nil, upstream)\n"));
    assert!(out.output.contains("\t_ \"net/http\"\n") || out.output.contains("\t\"net/http\"\n"));
    assert_eq!(remove(&out.output).output, src);
    Ok(())
}

#[test]
fn test_disabled_transformer_is_left_alone() -> anyhow::Result<()> {
    let registry = Registry::builtin();
    let config = WeftConfig::from_yaml("instrumentation:\n  disabled: [web]\n  error_tracing: false\n")?;
    let injector = Injector::new(&registry, config.inject_options(&registry)?);
    let src = "package routes\n\nimport \"github.com/gin-gonic/gin\"\n\nfunc build() *gin.Engine {\n\treturn gin.New()\n}\n";
    let out = injector.inject_source(src, &TransformContext::new());
    assert_eq!(out.status, Status::Skipped);
    assert_eq!(out.output, src);
    Ok(())
}

#[test]
fn test_replace_rule_leaves_other_functions() -> anyhow::Result<()> {
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
    let injector = Injector::new(&registry, InjectOptions::default()).with_rules(&rules);
    let src = "package report\n\nimport (\n\t\"fmt\"\n)\n\nfunc show(n int) string {\n\tfmt.Println(n)\n\treturn fmt.Sprint(n)\n}\n";
    let out = injector.inject_source(src, &TransformContext::new());
    assert_eq!(out.status, Status::Instrumented);
    assert!(out.output.contains("\tlog.Println(n)\n\treturn fmt.Sprint(n)\n"));
    assert!(out.output.contains("\t\"log\"\n"));
    Ok(())
}

#[test]
fn test_hook_rule_after_builtin_policies() -> anyhow::Result<()> {
    let registry = Registry::builtin();
    let rules = RuleSet {
        hook: vec![HookRule {
            package: "database/sql".into(),
            function: "Open".into(),
            before: "opened.Add(1)".into(),
            after: String::new(),
        }],
        ..RuleSet::default()
    };
    let injector = Injector::new(&registry, InjectOptions::default()).with_rules(&rules);
    let src = "package store\n\nimport (\n\t\"database/sql\"\n)\n\nfunc connect() (*sql.DB, error) {\n\treturn sql.Open(\"pg\", dsn)\n}\n";
    let out = injector.inject_source(src, &TransformContext::new());
    // the sql policy already retargeted the call, so the hook finds nothing
    assert!(!out.output.contains("opened.Add(1)"));
    assert!(out.output.contains("return weftsql.Open(\"pg\", dsn)"));
    Ok(())
}

#[test]
fn test_unparsable_and_empty_files_are_copied() -> anyhow::Result<()> {
    let broken = "package main\n\nfunc main() {\n\tif {\n}\n";
    let out = inject(broken);
    assert_eq!(out.status, Status::Copied);
    assert_eq!(out.output, broken);
    assert!(out.message.as_deref().unwrap_or_default().starts_with("parse error"));
    assert_eq!(inject("").status, Status::Copied);
    assert_eq!(remove(broken).status, Status::Copied);
    Ok(())
}
