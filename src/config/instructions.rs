//! System instruction templates keyed by mission type.

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, warn};

use super::ConfigError;

/// Mission type to system instruction, with a named fallback entry.
#[derive(Debug, Clone, Default)]
pub struct InstructionSet {
    templates: HashMap<String, String>,
    fallback_key: String,
}

impl InstructionSet {
    pub fn new(templates: HashMap<String, String>, fallback_key: impl Into<String>) -> Self {
        Self {
            templates,
            fallback_key: fallback_key.into(),
        }
    }

    /// Parse a TOML document whose top-level string keys are mission types.
    ///
    /// Non-string values are ignored.
    pub fn from_toml_str(source: &str, fallback_key: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = source.parse()?;
        let templates = table
            .into_iter()
            .filter_map(|(key, value)| match value {
                toml::Value::String(text) => Some((key, text)),
                _ => None,
            })
            .collect();
        Ok(Self::new(templates, fallback_key))
    }

    /// Load templates from disk. A missing or broken file yields an empty set.
    pub fn load(path: impl AsRef<Path>, fallback_key: &str) -> Self {
        let path = path.as_ref();
        let loaded = std::fs::read_to_string(path)
            .map_err(ConfigError::from)
            .and_then(|source| Self::from_toml_str(&source, fallback_key));

        match loaded {
            Ok(set) => {
                info!(path = %path.display(), templates = set.len(), "Loaded instruction templates");
                set
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Instruction templates unavailable");
                Self::new(HashMap::new(), fallback_key)
            }
        }
    }

    /// Instruction for `mission_type`, falling back to the fallback key.
    pub fn for_type(&self, mission_type: &str) -> &str {
        self.templates
            .get(mission_type)
            .or_else(|| self.templates.get(&self.fallback_key))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
is_spill = "Decide whether liquid is spilled on the floor."
is_smoke = "Decide whether smoke is visible."
version = 3
"#;

    #[test]
    fn test_known_type() {
        let set = InstructionSet::from_toml_str(SAMPLE, "is_spill").unwrap();
        assert_eq!(set.for_type("is_smoke"), "Decide whether smoke is visible.");
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_unknown_type_uses_fallback() {
        let set = InstructionSet::from_toml_str(SAMPLE, "is_spill").unwrap();
        assert_eq!(
            set.for_type("is_fire"),
            "Decide whether liquid is spilled on the floor."
        );
    }

    #[test]
    fn test_missing_file_is_empty() {
        let set = InstructionSet::load("/nonexistent/instructions.toml", "is_spill");
        assert!(set.is_empty());
        assert_eq!(set.for_type("is_spill"), "");
    }

    #[test]
    fn test_invalid_toml() {
        assert!(InstructionSet::from_toml_str("is_spill = ", "is_spill").is_err());
    }
}
