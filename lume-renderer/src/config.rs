//! Engine configuration file, read once at startup (spec §6 "Configuration file").
//!
//! `engine_path` and every entry of `shader_path` go through `${engine}`/`${project}` macro
//! substitution before being handed back to callers, matching the original's "macro
//! preprocessed" wording.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

/// Parsed engine/shader search-path configuration plus an open string-property bag.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub engine_path: String,
    #[serde(default)]
    pub project_path: String,
    #[serde(default)]
    pub shader_path: Vec<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, toml::Value>,
}

impl EngineConfig {
    /// Parses `contents` as TOML and resolves `${engine}`/`${project}` macros in `engine_path`
    /// and every `shader_path` entry.
    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        let mut config: EngineConfig = toml::from_str(contents)?;
        let engine_path = config.engine_path.clone();
        let project_path = config.project_path.clone();
        config.engine_path = substitute_macros(&config.engine_path, &engine_path, &project_path);
        config.shader_path = config
            .shader_path
            .iter()
            .map(|p| substitute_macros(p, &engine_path, &project_path))
            .collect();
        Ok(config)
    }

    /// Reads and parses the config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, crate::error::RdgError> {
        let contents = std::fs::read_to_string(path).map_err(|e| crate::error::RdgError::Device(e.to_string()))?;
        Self::parse(&contents).map_err(|e| crate::error::RdgError::Validation(e.to_string()))
    }

    /// Looks up an arbitrary string property by name (spec §6 `string_property`).
    pub fn string_property(&self, name: &str) -> Option<&str> {
        self.extra.get(name).and_then(|v| v.as_str())
    }

    /// Looks up an arbitrary string-array property by name (spec §6 `string_array_property`).
    pub fn string_array_property(&self, name: &str) -> Option<Vec<&str>> {
        self.extra
            .get(name)?
            .as_array()
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
    }

    /// Resolves a shader-relative path against every entry of `shader_path` in order,
    /// returning the first candidate that exists on disk.
    pub fn resolve_shader(&self, relative: &str) -> Option<std::path::PathBuf> {
        for root in &self.shader_path {
            let candidate = Path::new(root).join(relative);
            if candidate.exists() {
                return Some(candidate);
            }
        }
        None
    }
}

fn substitute_macros(input: &str, engine_path: &str, project_path: &str) -> String {
    input.replace("${engine}", engine_path).replace("${project}", project_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macro_substitution_resolves_engine_and_project() {
        let toml = r#"
            engine_path = "/opt/lume"
            project_path = "/home/user/game"
            shader_path = ["${engine}/shaders", "${project}/shaders"]
        "#;
        let config = EngineConfig::parse(toml).unwrap();
        assert_eq!(config.shader_path[0], "/opt/lume/shaders");
        assert_eq!(config.shader_path[1], "/home/user/game/shaders");
    }

    #[test]
    fn string_property_reads_extra_bag() {
        let toml = r#"
            engine_path = "/opt/lume"
            window_title = "Lume"
            validation_layers = ["VK_LAYER_KHRONOS_validation"]
        "#;
        let config = EngineConfig::parse(toml).unwrap();
        assert_eq!(config.string_property("window_title"), Some("Lume"));
        assert_eq!(config.string_array_property("validation_layers").unwrap(), vec!["VK_LAYER_KHRONOS_validation"]);
    }
}
