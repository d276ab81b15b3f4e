//! YAML configuration: which transformers run, which files are left alone,
//! and the custom rules.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::pipeline::InjectOptions;
use crate::rules::RuleSet;
use crate::transform::Registry;
use crate::{Result, WeftError};

/// Named groups of transformers usable wherever a transformer name is.
pub const PRESETS: &[(&str, &[&str])] = &[
    ("web", &["nethttp", "gin", "echo", "gorillamux", "chi", "fiber"]),
    ("database", &["sql", "goredis-v9", "goredis-v8"]),
    ("messaging", &["sarama", "sarama-legacy"]),
    ("rpc", &["grpc"]),
    ("logging", &["logrus"]),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentationConfig {
    /// Transformer names or presets; absent enables everything.
    pub enabled: Option<Vec<String>>,
    pub disabled: Vec<String>,
    pub error_tracing: bool,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            enabled: None,
            disabled: Vec::new(),
            error_tracing: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeftConfig {
    pub instrumentation: InstrumentationConfig,
    /// Glob patterns, relative to the source root, of files copied verbatim.
    pub exclude: Vec<String>,
    pub rules: RuleSet,
}

impl WeftConfig {
    /// Load a configuration file. Relative `content_file` paths resolve
    /// against the file's directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| WeftError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&content)
            .map_err(|e| WeftError::Config(format!("{}: {e}", path.display())))?;
        if let Some(dir) = path.parent() {
            config.rules.resolve_paths(dir);
        }
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|e| WeftError::Config(e.to_string()))
    }

    /// The transformer allow-list after preset expansion and removal of the
    /// disabled names. `None` means every transformer is enabled.
    pub fn enabled_set(&self, registry: &Registry) -> Result<Option<HashSet<String>>> {
        let disabled = expand(&self.instrumentation.disabled, registry)?;
        let enabled = match &self.instrumentation.enabled {
            Some(names) => expand(names, registry)?,
            None if disabled.is_empty() => return Ok(None),
            None => registry.names().map(str::to_string).collect(),
        };
        Ok(Some(&enabled - &disabled))
    }

    pub fn inject_options(&self, registry: &Registry) -> Result<InjectOptions> {
        Ok(InjectOptions {
            enabled: self.enabled_set(registry)?,
            error_tracing: self.instrumentation.error_tracing,
        })
    }
}

/// Replace presets by their members and check every name against the
/// registry.
fn expand(names: &[String], registry: &Registry) -> Result<HashSet<String>> {
    let mut out = HashSet::new();
    for name in names {
        if name == "all" {
            out.extend(registry.names().map(str::to_string));
        } else if let Some((_, members)) = PRESETS.iter().find(|(preset, _)| preset == name) {
            out.extend(members.iter().map(|m| m.to_string()));
        } else if registry.by_name(name).is_some() {
            out.insert(name.clone());
        } else {
            return Err(WeftError::UnknownTransformer(name.clone()));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config() {
        let yaml = r#"
instrumentation:
  enabled: [web, sql]
  disabled: [fiber]
  error_tracing: false
exclude: ["vendor/**"]
rules:
  replace:
    - package: fmt
      function: Println
      with: log.Println
      imports: [log]
  add:
    - file: weft_extra.go
      content_file: extra.go
"#;
        let mut config = WeftConfig::from_yaml(yaml).unwrap();
        config.rules.resolve_paths(Path::new("/etc/weft"));
        assert!(!config.instrumentation.error_tracing);
        assert_eq!(config.exclude, vec!["vendor/**".to_string()]);
        assert_eq!(config.rules.replace[0].with, "log.Println");
        assert_eq!(config.rules.add[0].package, ".");
        assert_eq!(
            config.rules.add[0].content_file.as_deref(),
            Some(Path::new("/etc/weft/extra.go"))
        );

        let registry = Registry::builtin();
        let enabled = config.enabled_set(&registry).unwrap().unwrap();
        assert!(enabled.contains("gin"));
        assert!(enabled.contains("sql"));
        assert!(!enabled.contains("fiber"));
        assert!(!enabled.contains("grpc"));
    }

    #[test]
    fn test_defaults() {
        let config = WeftConfig::from_yaml("").unwrap();
        assert!(config.instrumentation.error_tracing);
        assert_eq!(config.enabled_set(&Registry::builtin()).unwrap(), None);

        let config = WeftConfig::from_yaml("instrumentation:\n  disabled: [rpc]\n").unwrap();
        let enabled = config.enabled_set(&Registry::builtin()).unwrap().unwrap();
        assert!(!enabled.contains("grpc"));
        assert!(enabled.contains("logrus"));
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        let config = WeftConfig::from_yaml("instrumentation:\n  enabled: [gin, nope]\n").unwrap();
        assert!(matches!(
            config.enabled_set(&Registry::builtin()),
            Err(WeftError::UnknownTransformer(name)) if name == "nope"
        ));
        assert!(matches!(WeftConfig::from_yaml("exclude: 3\n"), Err(WeftError::Config(_))));
    }

    #[test]
    fn test_load_resolves_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weft.yaml");
        std::fs::write(&path, "rules:\n  add:\n    - file: a.go\n      content_file: snippets/a.go\n").unwrap();
        let config = WeftConfig::load(&path).unwrap();
        assert_eq!(config.rules.add[0].content_file, Some(dir.path().join("snippets/a.go")));
    }
}
