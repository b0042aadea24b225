//! Project configuration from YAML

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// File looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "bridge.yaml";

/// Top-level project configuration loaded from `bridge.yaml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Step modules to load, in order
    #[serde(default)]
    pub modules: Vec<String>,

    /// Where `config get-dsl` writes the descriptor document
    #[serde(default)]
    pub output_file: Option<PathBuf>,
}

impl ProjectConfig {
    /// Load project configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Parse project configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ProjectConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `bridge.yaml` from `dir` if it exists
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }
        Self::from_file(path).map(Some)
    }

    /// Validate the project configuration
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for module in &self.modules {
            if module.trim().is_empty() {
                anyhow::bail!("Module paths must not be empty");
            }
            if !seen.insert(module) {
                anyhow::bail!("Duplicate module: {}", module);
            }
        }

        if let Some(output) = &self.output_file {
            if output.as_os_str().is_empty() {
                anyhow::bail!("output_file must not be empty");
            }
        }

        Ok(())
    }

    /// Modules to load: the command line wins over the file
    pub fn resolve_modules(config: Option<&Self>, cli_modules: &[String]) -> Result<Vec<String>> {
        if !cli_modules.is_empty() {
            return Ok(cli_modules.to_vec());
        }
        match config {
            Some(config) if !config.modules.is_empty() => Ok(config.modules.clone()),
            _ => anyhow::bail!(
                "No modules specified. Use --modules or list them under `modules` in {}",
                CONFIG_FILE_NAME
            ),
        }
    }

    /// The output path from the file, or the default
    pub fn output_file_or_default(config: Option<&Self>) -> PathBuf {
        config
            .and_then(|c| c.output_file.clone())
            .unwrap_or_else(default_output_file)
    }
}

/// Default location of the exported descriptor document
pub fn default_output_file() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("bridge")
        .join("dsl.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modules_and_output() {
        let yaml = r#"
modules:
  - "demos::example"
  - "demos::webhooks"
output_file: "/tmp/config_get_dsl/dsl.json"
"#;

        let config = ProjectConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.modules, vec!["demos::example", "demos::webhooks"]);
        assert_eq!(
            config.output_file,
            Some(PathBuf::from("/tmp/config_get_dsl/dsl.json"))
        );
    }

    #[test]
    fn test_output_file_is_optional() {
        let config = ProjectConfig::from_yaml("modules: [\"demos::etl\"]").unwrap();
        assert!(config.output_file.is_none());
        assert_eq!(
            ProjectConfig::output_file_or_default(Some(&config)),
            default_output_file()
        );
    }

    #[test]
    fn test_duplicate_module_rejected() {
        let result = ProjectConfig::from_yaml("modules: [\"a\", \"a\"]");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Duplicate module"));
    }

    #[test]
    fn test_blank_module_rejected() {
        assert!(ProjectConfig::from_yaml("modules: [\"  \"]").is_err());
    }

    #[test]
    fn test_unparseable_yaml() {
        assert!(ProjectConfig::from_yaml("modules: {").is_err());
    }

    #[test]
    fn test_cli_modules_override_file() {
        let config = ProjectConfig {
            modules: vec!["demos::etl".to_string()],
            output_file: None,
        };
        let cli = vec!["demos::alerting".to_string()];
        assert_eq!(
            ProjectConfig::resolve_modules(Some(&config), &cli).unwrap(),
            cli
        );
        assert_eq!(
            ProjectConfig::resolve_modules(Some(&config), &[]).unwrap(),
            vec!["demos::etl"]
        );
    }

    #[test]
    fn test_no_modules_anywhere() {
        let err = ProjectConfig::resolve_modules(None, &[]).unwrap_err();
        assert!(err.to_string().contains("--modules"));
        let empty = ProjectConfig::default();
        assert!(ProjectConfig::resolve_modules(Some(&empty), &[]).is_err());
    }

    /// Removes the directory even when an assertion fails first
    struct RemoveOnDrop(PathBuf);

    impl Drop for RemoveOnDrop {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn test_load_from_dir() {
        let dir = std::env::temp_dir().join(format!("bridge-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let _cleanup = RemoveOnDrop(dir.clone());

        assert!(ProjectConfig::load_from_dir(&dir).unwrap().is_none());

        std::fs::write(dir.join(CONFIG_FILE_NAME), "modules: [\"demos::etl\"]\n").unwrap();
        let config = ProjectConfig::load_from_dir(&dir).unwrap().unwrap();
        assert_eq!(config.modules, vec!["demos::etl"]);
    }
}
