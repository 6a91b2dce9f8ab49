//! Translation configuration.
//!
//! Every section is optional; missing keys fall back to defaults.
//!
//! Example config.toml:
//! ```toml
//! module_name = "billing"
//!
//! [inference]
//! max_passes = 8
//!
//! [go]
//! package = "billing"
//!
//! [csharp]
//! namespace = "Acme.Billing"
//! ```

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Inference engine settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct InferenceConfig {
    /// Hard cap on propagation passes.
    pub max_passes: usize,
    /// Match accessed property names against module classes.
    pub structural_matching: bool,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_passes: 16,
            structural_matching: true,
        }
    }
}

/// Output quality thresholds.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct QualityConfig {
    /// Share of dynamic type slots above which a warning is logged.
    pub max_fallback_ratio: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            max_fallback_ratio: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PythonConfig {
    /// Emit annotations on parameters, returns and properties.
    pub type_hints: bool,
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self { type_hints: true }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TypeScriptConfig {
    /// Spaces per indent level.
    pub indent: usize,
}

impl Default for TypeScriptConfig {
    fn default() -> Self {
        Self { indent: 2 }
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct GoConfig {
    /// Package clause. Defaults to the module name, then `main`.
    pub package: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RustConfig {
    /// Type used for values inference could not pin down.
    pub dynamic_type: String,
}

impl Default for RustConfig {
    fn default() -> Self {
        Self {
            dynamic_type: "serde_json::Value".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CSharpConfig {
    pub namespace: Option<String>,
    /// Static class holding free functions and the entry point.
    pub class_name: String,
}

impl Default for CSharpConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            class_name: "Program".to_string(),
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct TranslateConfig {
    /// Overrides the module name the reader derived.
    pub module_name: Option<String>,
    pub inference: InferenceConfig,
    pub quality: QualityConfig,
    pub python: PythonConfig,
    pub typescript: TypeScriptConfig,
    pub go: GoConfig,
    pub rust: RustConfig,
    pub csharp: CSharpConfig,
}

impl TranslateConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = TranslateConfig::default();
        assert_eq!(config.inference.max_passes, 16);
        assert!(config.inference.structural_matching);
        assert!(config.python.type_hints);
        assert_eq!(config.rust.dynamic_type, "serde_json::Value");
        assert_eq!(config.csharp.class_name, "Program");
        assert!(config.go.package.is_none());
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = TranslateConfig::from_toml_str(
            r#"
[inference]
max_passes = 4

[python]
type_hints = false
"#,
        )
        .unwrap();
        assert_eq!(config.inference.max_passes, 4);
        assert!(config.inference.structural_matching);
        assert!(!config.python.type_hints);
        assert_eq!(config.typescript.indent, 2);
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("transpile.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
module_name = "billing"

[csharp]
namespace = "Acme.Billing"
"#
        )
        .unwrap();

        let config = TranslateConfig::load(&path).unwrap();
        assert_eq!(config.module_name.as_deref(), Some("billing"));
        assert_eq!(config.csharp.namespace.as_deref(), Some("Acme.Billing"));
        assert_eq!(config.csharp.class_name, "Program");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = TranslateConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_invalid_toml() {
        let err = TranslateConfig::from_toml_str("[inference\nmax_passes = ").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }
}
