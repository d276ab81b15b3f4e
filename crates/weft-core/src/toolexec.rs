/*!
# Build Wrapper

Entry point for `go build -toolexec`. The go command runs every tool of the
build through the wrapper; only the `compile` tool of non-standard-library
packages is rewritten. Its `.go` arguments are instrumented into a work
directory and replaced by the rewritten copies, and a `-trimpath` rewrite
maps the work directory back onto the package directory so that positions,
`//go:embed` patterns and debug information refer to the original sources.
The `-embedcfg` file already holds absolute paths and is passed through.
*/

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::pipeline::{Injector, Status};
use crate::semantic::SemanticCache;
use crate::transform::TransformContext;
use crate::{batch, Result, WeftError};

/// `compile` flags that take the next argument as their value.
const VALUE_FLAGS: &[&str] = &[
    "-o", "-p", "-importcfg", "-embedcfg", "-trimpath", "-asmhdr", "-symabis", "-lang", "-buildid",
    "-goversion", "-c", "-D", "-I", "-installsuffix", "-pgoprofile",
];

/// One tool invocation as received from the go command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub tool: PathBuf,
    pub args: Vec<String>,
}

impl ToolInvocation {
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = args.into_iter().map(Into::into);
        let tool = args
            .next()
            .ok_or_else(|| WeftError::Toolexec("missing tool path".into()))?;
        Ok(Self {
            tool: PathBuf::from(tool),
            args: args.collect(),
        })
    }

    pub fn tool_name(&self) -> &str {
        self.tool
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }

    pub fn is_compile(&self) -> bool {
        self.tool_name() == "compile"
    }

    /// Standard-library packages are compiled with `-std`.
    pub fn is_std(&self) -> bool {
        self.args.iter().any(|a| a == "-std")
    }

    /// Indices of the source file arguments.
    pub fn source_files(&self) -> Vec<usize> {
        self.args
            .iter()
            .enumerate()
            .filter(|(i, arg)| {
                arg.ends_with(".go")
                    && !arg.starts_with('-')
                    && (*i == 0 || !VALUE_FLAGS.contains(&self.args[i - 1].as_str()))
            })
            .map(|(i, _)| i)
            .collect()
    }

    fn flag_value(&self, flag: &str) -> Option<usize> {
        self.args.iter().position(|a| a == flag).map(|i| i + 1).filter(|i| *i < self.args.len())
    }
}

pub struct Toolexec<'a> {
    injector: Injector<'a>,
    semantic: SemanticCache,
}

impl<'a> Toolexec<'a> {
    pub fn new(injector: Injector<'a>) -> Self {
        Self {
            injector,
            semantic: SemanticCache::new(),
        }
    }

    /// Arguments for the compile tool with instrumented copies of the
    /// sources written to `work`. Returns the arguments unchanged when no
    /// file was rewritten.
    pub fn prepare(&self, invocation: &ToolInvocation, work: &Path) -> Result<Vec<String>> {
        let mut args = invocation.args.clone();
        let files = invocation.source_files();
        let Some(first) = files.first() else {
            return Ok(args);
        };
        let package_dir = Path::new(&args[*first])
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let mut rewritten = 0;
        for index in files {
            let original = PathBuf::from(&args[index]);
            let src = std::fs::read_to_string(&original).map_err(|source| WeftError::Io {
                path: original.clone(),
                source,
            })?;
            let ctx = TransformContext::new()
                .with_source_file(&original)
                .with_semantic(&self.semantic);
            let outcome = self.injector.inject_source(&src, &ctx);
            match outcome.status {
                Status::Instrumented => {
                    let Some(name) = original.file_name() else {
                        continue;
                    };
                    let copy = work.join(name);
                    batch::write_atomic(&copy, outcome.output.as_bytes()).map_err(|source| WeftError::Io {
                        path: copy.clone(),
                        source,
                    })?;
                    args[index] = copy.to_string_lossy().into_owned();
                    rewritten += 1;
                }
                Status::Error => {
                    tracing::warn!(
                        file = %original.display(),
                        error = outcome.message.as_deref().unwrap_or_default(),
                        "compiling original source"
                    );
                }
                _ => {}
            }
        }
        if rewritten == 0 {
            return Ok(args);
        }

        let mapping = format!("{}=>{}", work.display(), package_dir.display());
        match invocation.flag_value("-trimpath") {
            Some(i) => args[i] = format!("{mapping};{}", args[i]),
            None => {
                let at = invocation.source_files().first().copied().unwrap_or(args.len());
                args.splice(at..at, ["-trimpath".to_string(), mapping]);
            }
        }
        tracing::info!(package = %package_dir.display(), rewritten, "instrumented compile");
        Ok(args)
    }

    /// Run the tool, rewriting compile invocations. Returns its exit code.
    pub fn run(&self, invocation: &ToolInvocation) -> Result<i32> {
        let tool_io = |source| WeftError::Io {
            path: invocation.tool.clone(),
            source,
        };
        if !invocation.is_compile() || invocation.is_std() {
            let status = Command::new(&invocation.tool)
                .args(&invocation.args)
                .status()
                .map_err(tool_io)?;
            return Ok(status.code().unwrap_or(1));
        }
        let work = tempfile::Builder::new()
            .prefix("weft-")
            .tempdir()
            .map_err(|source| WeftError::Io {
                path: std::env::temp_dir(),
                source,
            })?;
        let args = self.prepare(invocation, work.path())?;
        let status = Command::new(&invocation.tool).args(&args).status().map_err(tool_io)?;
        Ok(status.code().unwrap_or(1))
    }
}
