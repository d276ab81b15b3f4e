/*!
# Batch Integration Tests

Mirror a small module into an output tree and back.
*/

use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use weft_core::pipeline::{RemoveOptions, Status};
use weft_core::{Registry, WeftConfig, Workspace};

const MAIN: &str = "package main

import (
\t\"net/http\"
)

func main() {
\thttp.HandleFunc(\"/\", index)
\thttp.ListenAndServe(\":8080\", nil)
}
";

const STORE: &str = "package store

func Load(id string) (string, error) {
\tv, err := fetch(id)
\tif err != nil {
\t\treturn \"\", err
\t}
\treturn v, nil
}
";

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn test_inject_then_remove_tree() -> anyhow::Result<()> {
    let src = tempfile::tempdir()?;
    let instrumented = tempfile::tempdir()?;
    let restored = tempfile::tempdir()?;
    write(src.path(), "go.mod", "module example.com/app\n\ngo 1.22\n");
    write(src.path(), "cmd/app/main.go", MAIN);
    write(src.path(), "internal/store/store.go", STORE);
    write(src.path(), "internal/store/store_test.go", "package store\n");
    write(src.path(), "internal/store/broken.go", "package store\n\nfunc {\n");

    let registry = Registry::builtin();
    let config = WeftConfig::default();
    let report = Workspace::new(src.path(), instrumented.path(), &registry, &config)?.inject()?;
    assert!(!report.has_errors());
    assert_eq!(report.summary.instrumented, 2);
    assert_eq!(report.summary.copied, 3);

    let by_path = |path: &str| report.files.iter().find(|e| e.path == path).unwrap();
    assert_eq!(by_path("cmd/app/main.go").transformers, vec!["nethttp".to_string()]);
    assert_eq!(by_path("internal/store/broken.go").status, Status::Copied);
    assert!(report.transformers.iter().any(|s| s.name == "nethttp" && s.transformations == 1));

    let main = fs::read_to_string(instrumented.path().join("cmd/app/main.go"))?;
    assert!(main.contains("\thttp.HandleFunc(\"/\", wefthttp.WrapHandlerFunc(index))\n"));
    let store = fs::read_to_string(instrumented.path().join("internal/store/store.go"))?;
    assert!(store.contains("\t\ttrace.Error(err)\n\t\treturn \"\", err\n"));
    assert_eq!(
        fs::read_to_string(instrumented.path().join("go.mod"))?,
        "module example.com/app\n\ngo 1.22\n"
    );

    let report = Workspace::new(instrumented.path(), restored.path(), &registry, &config)?
        .remove(RemoveOptions::default())?;
    assert_eq!(report.summary.removed, 2);
    assert_eq!(fs::read_to_string(restored.path().join("cmd/app/main.go"))?, MAIN);
    assert_eq!(fs::read_to_string(restored.path().join("internal/store/store.go"))?, STORE);
    Ok(())
}

#[test]
fn test_add_rules_and_exclusions() -> anyhow::Result<()> {
    let src = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;
    write(src.path(), "main.go", "package main\n\nfunc main() {\n}\n");
    write(src.path(), "gen/generated.go", STORE);

    let config = WeftConfig::from_yaml(
        r#"
exclude: ["gen/**"]
rules:
  add:
    - file: weft_extra.go
      content: "package main\n"
"#,
    )?;
    let registry = Registry::builtin();
    let report = Workspace::new(src.path(), out.path(), &registry, &config)?.inject()?;
    assert_eq!(fs::read_to_string(out.path().join("gen/generated.go"))?, STORE);
    assert_eq!(fs::read_to_string(out.path().join("weft_extra.go"))?, "package main\n");
    assert!(report.files.iter().any(|e| e.path == "weft_extra.go"));
    assert!(report.files.iter().any(|e| e.path == "gen/generated.go" && e.note.as_deref() == Some("excluded")));
    Ok(())
}
