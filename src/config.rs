//! Engine configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! resource_operations = ["read", "write", "execute"]
//! # optional, defaults to the built-in administrative vocabulary
//! admin_operations = ["create_policy_class", "assign"]
//! decision_cache_capacity = 1024   # 0 disables the decision cache
//! ```

use crate::core::operations::{is_wildcard, OperationSet, OperationVocabulary};
use crate::error::{NgacError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Default number of cached decisions
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

/// Settings for a [`PolicyStore`](crate::PolicyStore)
///
/// # Examples
///
/// ```
/// use ngac::EngineConfig;
///
/// let config = EngineConfig::from_toml_str(r#"
///     resource_operations = ["read", "write"]
///     decision_cache_capacity = 0
/// "#).unwrap();
///
/// assert_eq!(config.decision_cache_capacity, 0);
/// assert!(config.vocabulary().unwrap().resource().contains("write"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Domain operations granted through associations
    #[serde(default)]
    pub resource_operations: Vec<String>,

    /// Administrative operations; the built-in set when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_operations: Option<Vec<String>>,

    /// Maximum number of cached decisions
    #[serde(default = "default_cache_capacity")]
    pub decision_cache_capacity: usize,
}

impl EngineConfig {
    /// Parse a configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns `Toml` if the text is not a valid configuration.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML configuration file
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read and `Toml` if it cannot be parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        info!(
            "Loaded engine config from {} ({} resource operations)",
            path.display(),
            config.resource_operations.len()
        );
        Ok(config)
    }

    /// Build the operation vocabulary described by this configuration
    ///
    /// # Errors
    ///
    /// Returns `Config` if an operation is empty or is a reserved wildcard token.
    pub fn vocabulary(&self) -> Result<OperationVocabulary> {
        let resource = checked_operations(&self.resource_operations)?;
        match &self.admin_operations {
            Some(admin) => Ok(OperationVocabulary::with_admin(
                checked_operations(admin)?,
                resource,
            )),
            None => Ok(OperationVocabulary::new(resource)),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            resource_operations: Vec::new(),
            admin_operations: None,
            decision_cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

fn checked_operations(operations: &[String]) -> Result<OperationSet> {
    for op in operations {
        if op.is_empty() {
            return Err(NgacError::Config("operation names cannot be empty".to_string()));
        }
        if is_wildcard(op) {
            return Err(NgacError::Config(format!(
                "{} is a reserved wildcard and cannot be configured",
                op
            )));
        }
    }
    Ok(operations.iter().cloned().collect())
}
