//! Project configuration (flatbridge.toml) parsing and types.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use flatbridge_ast::Dialect;
use flatbridge_codegen::OutputDirs;
use indexmap::IndexMap;
use serde::Deserialize;

pub const CONFIG_FILE: &str = "flatbridge.toml";

/// Root configuration structure for flatbridge.toml.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FlatbridgeConfig {
    #[serde(default)]
    pub naming: NamingConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub generate: GenerateConfig,
    #[serde(default)]
    pub types: TypesConfig,
}

/// Naming section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct NamingConfig {
    /// PascalCase module name every spelling derives from (default: "Module").
    pub module: Option<String>,
}

/// Declaration files, parsed in this order.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct InputConfig {
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

/// Output locations.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct OutputConfig {
    /// Root every generated path is relative to (default: ".").
    pub root: Option<PathBuf>,
    /// C mirror headers, relative to the root.
    pub abi_dir: Option<PathBuf>,
    /// Adapter sources, relative to the root.
    pub bridge_dir: Option<PathBuf>,
    /// Where to write the JSON run report.
    pub report: Option<PathBuf>,
}

/// Which generators run.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct GenerateConfig {
    pub headers: Option<bool>,
    pub bridges: Option<bool>,
}

/// Project type extensions.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TypesConfig {
    /// Extra value structs: object name to ABI struct name.
    #[serde(default)]
    pub value_structs: IndexMap<String, String>,
    /// Extra primitive spellings: object name to ABI name.
    #[serde(default)]
    pub primitives: IndexMap<String, String>,
}

impl FlatbridgeConfig {
    /// Load configuration from a specific path. Returns `None` if it doesn't exist.
    pub fn load_from_path(path: &Path) -> anyhow::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config =
            Self::parse(&content).with_context(|| format!("invalid {}", path.display()))?;
        Ok(Some(config))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Build the naming dialect, including configured type extensions.
    pub fn dialect(&self) -> Dialect {
        let mut dialect = Dialect::new(self.naming.module());
        for (name, abi) in &self.types.value_structs {
            dialect = dialect.with_value_struct(name, abi);
        }
        for (name, abi) in &self.types.primitives {
            dialect = dialect.with_primitive(name, abi);
        }
        dialect
    }
}

impl NamingConfig {
    pub fn module(&self) -> &str {
        self.module.as_deref().unwrap_or("Module")
    }
}

impl OutputConfig {
    pub fn root(&self) -> &Path {
        self.root.as_deref().unwrap_or(Path::new("."))
    }

    pub fn dirs(&self) -> OutputDirs {
        let defaults = OutputDirs::default();
        OutputDirs {
            abi_dir: self.abi_dir.clone().unwrap_or(defaults.abi_dir),
            bridge_dir: self.bridge_dir.clone().unwrap_or(defaults.bridge_dir),
        }
    }
}

impl GenerateConfig {
    /// Get whether C mirror headers are generated (default: true).
    pub fn headers(&self) -> bool {
        self.headers.unwrap_or(true)
    }

    /// Get whether adapters are generated (default: true).
    pub fn bridges(&self) -> bool {
        self.bridges.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_config() {
        let config = FlatbridgeConfig::parse("").unwrap();
        assert_eq!(config.naming.module(), "Module");
        assert!(config.input.files.is_empty());
        assert_eq!(config.output.root(), Path::new("."));
        assert_eq!(config.output.dirs(), OutputDirs::default());
        assert!(config.generate.headers());
        assert!(config.generate.bridges());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[naming]
module = "Gadget"

[input]
files = ["include/gadget_types.h", "include/gadget_widget.h"]

[output]
root = "out"
abi_dir = "include/abi"
bridge_dir = "src/bridge"
report = "out/report.json"

[generate]
bridges = false

[types.value_structs]
GadgetCookie = "gadget_cookie_t"

[types.primitives]
uint8 = "uint8_t"
"#;
        let config = FlatbridgeConfig::parse(toml).unwrap();
        assert_eq!(config.naming.module(), "Gadget");
        assert_eq!(config.input.files.len(), 2);
        assert_eq!(config.output.root(), Path::new("out"));
        assert_eq!(config.output.dirs().abi_dir, PathBuf::from("include/abi"));
        assert_eq!(config.output.report, Some(PathBuf::from("out/report.json")));
        assert!(config.generate.headers());
        assert!(!config.generate.bridges());

        let dialect = config.dialect();
        assert_eq!(dialect.module(), "Gadget");
        assert_eq!(dialect.value_struct("GadgetCookie"), Some("gadget_cookie_t"));
        assert_eq!(dialect.value_struct("GadgetRect"), Some("gadget_rect_t"));
        assert_eq!(dialect.extra_primitive("uint8"), Some("uint8_t"));
    }

    #[test]
    fn test_unknown_section_is_rejected() {
        assert!(FlatbridgeConfig::parse("[build]\nentry = \"x\"\n").is_err());
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = FlatbridgeConfig::load_from_path(&dir.path().join(CONFIG_FILE)).unwrap();
        assert!(loaded.is_none());
    }
}
