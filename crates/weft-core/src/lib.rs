//! # Weft Core
//!
//! Reversible source-to-source instrumentation for Go programs:
//! - Go front end: parser, arena tree, gofmt-style printer
//! - Transformer registry and per-library rewrite policies
//! - Error-tracing detector and custom rule engine
//! - Inject and remove pipelines
//! - Batch driver, report and `go build -toolexec` wrapper
//!
//! The generated code calls into the companion runtime
//! `github.com/weftapm/weft-go`.

#![warn(clippy::all)]

pub mod batch;
pub mod config;
pub mod errtrace;
pub mod pipeline;
pub mod report;
pub mod rules;
pub mod semantic;
pub mod syntax;
pub mod toolexec;
pub mod transform;

use std::path::PathBuf;

// Re-export commonly used types
pub use batch::Workspace;
pub use config::WeftConfig;
pub use pipeline::{InjectOptions, Injector, Outcome, RemoveOptions, Remover, Status};
pub use report::Report;
pub use rules::RuleSet;
pub use semantic::{SemanticCache, SemanticLoadError};
pub use syntax::{GoFile, ParseError};
pub use transform::{Registry, RegistryError, TransformContext, TransformError, Transformer};

/// Weft version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing for weft core components
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("weft_core=info".parse().expect("static directive")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Error types for whole-run operations. Per-file failures are reported,
/// not returned.
#[derive(thiserror::Error, Debug)]
pub enum WeftError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown transformer or preset: {0}")]
    UnknownTransformer(String),

    #[error("Invalid exclude pattern {pattern}: {message}")]
    Pattern { pattern: String, message: String },

    #[error("Output directory is the source directory: {}", .0.display())]
    SameDirectory(PathBuf),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Toolexec error: {0}")]
    Toolexec(String),
}

/// Result type for weft core operations
pub type Result<T> = std::result::Result<T, WeftError>;
