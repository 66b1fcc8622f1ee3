//! Whitelist configuration for query validation.
//!
//! The whitelists are loaded from a YAML file supplied by the operator:
//!
//! ```yaml
//! tables:
//!   - operations.business_transaction
//!   - operations.business_transaction_line
//! functions:
//!   - now
//!   - sum
//! ```
//!
//! An absent list defaults to empty, which allows nothing.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Table and function whitelists for a query endpoint.
///
/// Names are matched exactly as the parser renders them: qualify table
/// names the way queries will reference them (`schema.table` entries do
/// not cover bare `table` references, and vice versa).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistConfig {
    /// Tables a query may read from.
    #[serde(default)]
    pub tables: Vec<String>,

    /// Functions a query may call.
    #[serde(default)]
    pub functions: Vec<String>,
}

impl WhitelistConfig {
    /// Load whitelists from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse whitelists from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
tables:
  - transactions
  - operations.composite
functions:
  - now
"#;
        let config = WhitelistConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.tables.len(), 2);
        assert_eq!(config.functions, vec!["now".to_string()]);
    }

    #[test]
    fn test_absent_lists_default_to_empty() {
        let config = WhitelistConfig::from_yaml("tables:\n  - t1\n").unwrap();
        assert_eq!(config.tables, vec!["t1".to_string()]);
        assert!(config.functions.is_empty());
    }

    #[test]
    fn test_malformed_yaml_is_a_parse_error() {
        let result = WhitelistConfig::from_yaml("tables: {nope");
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let result = WhitelistConfig::from_file("/nonexistent/whitelist.yaml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
