/*!
# Transformer Registry

Registered once at start-up, then only read. Lookup by name or by
applicability to a parsed file.
*/

use std::collections::HashSet;

use indexmap::IndexMap;

use super::{libs, Transformer};
use crate::syntax::GoFile;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("transformer '{0}' is already registered")]
    Duplicate(String),
}

/// Transformers in registration order, unique by name.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    transformers: IndexMap<&'static str, Transformer>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in transformer.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for transformer in libs::builtin() {
            // Built-in names are distinct.
            let _ = registry.register(transformer);
        }
        registry
    }

    pub fn register(&mut self, transformer: Transformer) -> Result<(), RegistryError> {
        if self.transformers.contains_key(transformer.name) {
            return Err(RegistryError::Duplicate(transformer.name.to_string()));
        }
        tracing::debug!(name = transformer.name, family = transformer.family, "registered transformer");
        self.transformers.insert(transformer.name, transformer);
        Ok(())
    }

    pub fn by_name(&self, name: &str) -> Option<&Transformer> {
        self.transformers.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.transformers.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transformer> {
        self.transformers.values()
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }

    /// Every transformer whose library the file imports.
    pub fn detected(&self, file: &GoFile) -> Vec<&Transformer> {
        self.iter().filter(|t| t.detect(file)).collect()
    }

    /// Detected transformers restricted to an allow-list; `None` enables all.
    pub fn filtered(&self, file: &GoFile, enabled: Option<&HashSet<String>>) -> Vec<&Transformer> {
        self.detected(file)
            .into_iter()
            .filter(|t| enabled.map_or(true, |set| set.contains(t.name)))
            .collect()
    }

    /// Keep the first transformer of each family.
    pub fn dedup_families<'t>(transformers: Vec<&'t Transformer>) -> Vec<&'t Transformer> {
        let mut seen = HashSet::new();
        transformers
            .into_iter()
            .filter(|t| seen.insert(t.family))
            .collect()
    }
}
