/*!
# Batch Driver

Mirrors a source tree into an output tree, running a pipeline over every Go
file in parallel. Files the pipeline does not rewrite, excluded files and
non-Go files are copied. Every write goes through a temporary file in the
target directory that is persisted over the target.

The source tree is never written to.
*/

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use rayon::prelude::*;
use tempfile::NamedTempFile;

use crate::config::WeftConfig;
use crate::pipeline::{Injector, Outcome, RemoveOptions, Remover};
use crate::report::{Entry, Mode, Report};
use crate::semantic::SemanticCache;
use crate::transform::{Registry, TransformContext};
use crate::{Result, WeftError};

const MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Write `content` to `target` atomically, creating parent directories.
pub fn write_atomic(target: &Path, content: &[u8]) -> std::io::Result<()> {
    let dir = match target.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// One source tree and where its transformed mirror goes.
pub struct Workspace<'a> {
    source: PathBuf,
    output: PathBuf,
    registry: &'a Registry,
    config: &'a WeftConfig,
    exclude: Vec<Pattern>,
    semantic: SemanticCache,
}

impl<'a> Workspace<'a> {
    pub fn new(
        source: impl AsRef<Path>,
        output: impl AsRef<Path>,
        registry: &'a Registry,
        config: &'a WeftConfig,
    ) -> Result<Self> {
        let io = |path: &Path| {
            let path = path.to_path_buf();
            move |source| WeftError::Io { path, source }
        };
        let source = source.as_ref();
        let source = source.canonicalize().map_err(io(source))?;
        let output = output.as_ref();
        fs::create_dir_all(output).map_err(io(output))?;
        let output = output.canonicalize().map_err(io(output))?;
        if output == source {
            return Err(WeftError::SameDirectory(source));
        }
        let exclude = config
            .exclude
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| WeftError::Pattern {
                    pattern: p.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            source,
            output,
            registry,
            config,
            exclude,
            semantic: SemanticCache::new(),
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Instrument the tree, then materialize the add rules.
    pub fn inject(&self) -> Result<Report> {
        let options = self.config.inject_options(self.registry)?;
        let injector = Injector::new(self.registry, options).with_rules(&self.config.rules);
        let mut report = self.run(Mode::Inject, |src, ctx| injector.inject_source(src, ctx))?;

        for rule in &self.config.rules.add {
            let rel = Path::new(&rule.package).join(&rule.file);
            let rel = rel.strip_prefix(".").unwrap_or(rel.as_path()).to_string_lossy().replace('\\', "/");
            let entry = match rule.materialize(&self.output) {
                Ok(_) => Entry {
                    changes: vec![if rule.append { "appended add rule" } else { "created by add rule" }.to_string()],
                    ..Entry::copied(rel, "add rule")
                },
                Err(e) => Entry::failed(rel, e.to_string()),
            };
            report.push(entry);
        }
        report.transformers = injector.stats();
        Ok(report)
    }

    pub fn remove(&self, options: RemoveOptions) -> Result<Report> {
        let remover = Remover::new(self.registry, options);
        self.run(Mode::Remove, |src, ctx| remover.remove_source(src, ctx))
    }

    fn run<F>(&self, mode: Mode, pipeline: F) -> Result<Report>
    where
        F: Fn(&str, &TransformContext<'_>) -> Outcome + Sync,
    {
        let files = self.files()?;
        tracing::info!(
            source = %self.source.display(),
            output = %self.output.display(),
            files = files.len(),
            ?mode,
            "processing tree"
        );
        let entries: Vec<Entry> = files
            .par_iter()
            .map(|path| self.process(path, &pipeline))
            .collect();

        let mut report = Report::new(
            mode,
            self.source.display().to_string(),
            self.output.display().to_string(),
        );
        for entry in entries {
            report.push(entry);
        }
        report.sort();
        Ok(report)
    }

    fn process<F>(&self, path: &Path, pipeline: &F) -> Entry
    where
        F: Fn(&str, &TransformContext<'_>) -> Outcome,
    {
        let rel = path.strip_prefix(&self.source).unwrap_or(path);
        let rel_text = rel.to_string_lossy().replace('\\', "/");
        let target = self.output.join(rel);

        let copy = |note: &str| match fs::read(path).and_then(|bytes| write_atomic(&target, &bytes)) {
            Ok(()) => Entry::copied(rel_text.clone(), note),
            Err(e) => Entry::failed(rel_text.clone(), e.to_string()),
        };

        if self.exclude.iter().any(|p| p.matches_with(&rel_text, MATCH)) {
            return copy("excluded");
        }
        let name = rel_text.rsplit('/').next().unwrap_or_default();
        if !name.ends_with(".go") {
            return copy("not Go source");
        }
        if name.ends_with("_test.go") {
            return copy("test file");
        }
        let src = match fs::read(path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(src) => src,
                Err(_) => return copy("not UTF-8"),
            },
            Err(e) => return Entry::failed(rel_text, e.to_string()),
        };

        let ctx = TransformContext::new()
            .with_source_file(path)
            .with_semantic(&self.semantic);
        let outcome = pipeline(&src, &ctx);
        if let Err(e) = write_atomic(&target, outcome.output.as_bytes()) {
            return Entry::failed(rel_text, format!("{}: {e}", target.display()));
        }
        Entry::from_outcome(rel_text, &outcome)
    }

    /// Every file under the source root, skipping VCS metadata and the
    /// output tree when it is nested inside the source.
    fn files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![self.source.clone()];
        while let Some(dir) = pending.pop() {
            let entries = fs::read_dir(&dir).map_err(|source| WeftError::Io {
                path: dir.clone(),
                source,
            })?;
            for entry in entries {
                let entry = entry.map_err(|source| WeftError::Io {
                    path: dir.clone(),
                    source,
                })?;
                let path = entry.path();
                if path.is_dir() {
                    if path == self.output || entry.file_name() == ".git" {
                        continue;
                    }
                    pending.push(path);
                } else {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }
}
