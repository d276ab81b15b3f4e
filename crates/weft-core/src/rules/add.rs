//! Files materialized in the output tree.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::AddRule;

#[derive(thiserror::Error, Debug)]
pub enum AddError {
    #[error("add rule for {file}: neither content nor content_file given")]
    NoContent { file: String },

    #[error("add rule for {file}: {}: {source}", .path.display())]
    Io {
        file: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AddRule {
    pub fn target(&self, output: &Path) -> PathBuf {
        output.join(&self.package).join(&self.file)
    }

    fn content(&self) -> Result<String, AddError> {
        if let Some(content) = &self.content {
            return Ok(content.clone());
        }
        let path = self.content_file.as_ref().ok_or_else(|| AddError::NoContent {
            file: self.file.clone(),
        })?;
        fs::read_to_string(path).map_err(|source| AddError::Io {
            file: self.file.clone(),
            path: path.clone(),
            source,
        })
    }

    /// Write or extend the rule's file under `output`. Returns the path
    /// written.
    pub fn materialize(&self, output: &Path) -> Result<PathBuf, AddError> {
        let content = self.content()?;
        let target = self.target(output);
        let io = |source| AddError::Io {
            file: self.file.clone(),
            path: target.clone(),
            source,
        };
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir).map_err(io)?;
        }
        if self.append && target.exists() {
            let mut file = fs::OpenOptions::new().append(true).open(&target).map_err(io)?;
            write!(file, "\n{content}").map_err(io)?;
        } else {
            fs::write(&target, &content).map_err(io)?;
        }
        tracing::info!(file = %target.display(), append = self.append, "materialized add rule");
        Ok(target)
    }
}
