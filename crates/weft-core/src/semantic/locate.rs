//! Finding a library package's sources on disk from the subject module.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::gomod::GoMod;
use super::SemanticLoadError;
use crate::syntax::GoFile;

/// Closest ancestor of `dir` (inclusive) holding a `go.mod`.
pub fn module_root(dir: &Path) -> Option<PathBuf> {
    dir.ancestors()
        .find(|d| d.join("go.mod").is_file())
        .map(Path::to_path_buf)
}

/// Module cache encoding: every upper-case letter becomes `!` plus its
/// lower-case form.
pub fn escape_module_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if c.is_ascii_uppercase() {
            out.push('!');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Module cache roots in lookup order: `$GOMODCACHE`, `$GOPATH/pkg/mod`
/// for every `GOPATH` entry, then `~/go/pkg/mod`.
pub fn module_caches() -> Vec<PathBuf> {
    let mut caches = Vec::new();
    if let Some(cache) = env::var_os("GOMODCACHE").filter(|v| !v.is_empty()) {
        caches.push(PathBuf::from(cache));
    }
    if let Some(gopath) = env::var_os("GOPATH").filter(|v| !v.is_empty()) {
        caches.extend(env::split_paths(&gopath).map(|p| p.join("pkg").join("mod")));
    }
    if let Some(home) = env::var_os("HOME").filter(|v| !v.is_empty()) {
        caches.push(PathBuf::from(home).join("go").join("pkg").join("mod"));
    }
    caches
}

/// Candidate directories for `import_path`, most specific first.
pub fn package_dirs(root: &Path, gomod: &GoMod, import_path: &str, caches: &[PathBuf]) -> Vec<PathBuf> {
    let mut dirs = vec![root.join("vendor").join(import_path)];
    let Some((module, sub)) = gomod.owning_module(import_path) else {
        return dirs;
    };
    let version = gomod.require(module).map(|r| r.version.as_str());
    let join_sub = |base: PathBuf| if sub.is_empty() { base } else { base.join(sub) };
    match gomod.replacement(module, version) {
        Some(replace) if replace.is_local() => dirs.push(join_sub(root.join(&replace.new))),
        Some(replace) => {
            if let Some(v) = &replace.new_version {
                let entry = format!("{}@{}", escape_module_path(&replace.new), v);
                dirs.extend(caches.iter().map(|c| join_sub(c.join(&entry))));
            }
        }
        None => {
            if let Some(v) = version {
                let entry = format!("{}@{}", escape_module_path(module), v);
                dirs.extend(caches.iter().map(|c| join_sub(c.join(&entry))));
            }
        }
    }
    dirs
}

/// Parse the non-test Go files of a package directory. Files the parser
/// cannot read are skipped; a directory without any readable file is an
/// error.
pub fn parse_package(dir: &Path) -> Result<Vec<GoFile>, SemanticLoadError> {
    let io = |e: std::io::Error| SemanticLoadError::Io {
        path: dir.to_path_buf(),
        message: e.to_string(),
    };
    let mut names: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(io)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension().is_some_and(|e| e == "go")
                && !p
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with("_test.go"))
        })
        .collect();
    names.sort();

    let mut files = Vec::new();
    for path in names {
        let text = fs::read_to_string(&path).map_err(io)?;
        match GoFile::parse(&text) {
            Ok(file) => files.push(file),
            Err(e) => tracing::debug!(file = %path.display(), error = %e, "skipping unreadable library file"),
        }
    }
    if files.is_empty() {
        return Err(SemanticLoadError::NoSources(dir.to_path_buf()));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_upper_case() {
        assert_eq!(escape_module_path("github.com/IBM/sarama"), "github.com/!i!b!m/sarama");
        assert_eq!(escape_module_path("github.com/Shopify/sarama"), "github.com/!shopify/sarama");
    }

    #[test]
    fn test_candidate_dirs() {
        let gomod = GoMod::parse(
            "module m\n\nrequire (\n\tgithub.com/IBM/sarama v1.43.0\n\tgithub.com/a/b v0.1.0\n)\n\nreplace github.com/a/b => ./third_party/b\n",
        )
        .unwrap();
        let root = Path::new("/src/m");
        let caches = vec![PathBuf::from("/cache")];
        assert_eq!(
            package_dirs(root, &gomod, "github.com/IBM/sarama", &caches),
            vec![
                PathBuf::from("/src/m/vendor/github.com/IBM/sarama"),
                PathBuf::from("/cache/github.com/!i!b!m/sarama@v1.43.0"),
            ]
        );
        assert_eq!(
            package_dirs(root, &gomod, "github.com/a/b/sub", &caches)[1],
            PathBuf::from("/src/m/./third_party/b/sub")
        );
    }

    #[test]
    fn test_parse_package_skips_tests() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.go"), "package lib\n\nfunc A() error {\n\treturn nil\n}\n").unwrap();
        fs::write(dir.path().join("a_test.go"), "package lib\n").unwrap();
        let files = parse_package(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].func("A").is_some());
    }
}
