use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use validator::Validate;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Per-compilation expansion settings with validation
#[derive(Clone, Debug, PartialEq, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    /// Skip entity query filters for this compilation
    pub ignore_query_filters: bool,

    /// Maximum nesting depth of the expansion traversal
    #[validate(range(
        min = 1,
        max = 512,
        message = "Max expansion depth must be between 1 and 512"
    ))]
    pub max_expansion_depth: u32,

    /// Emit the fully expanded tree at debug level once a compilation finishes
    pub log_expanded_tree: bool,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            ignore_query_filters: false,
            max_expansion_depth: 128,
            log_expanded_tree: false,
        }
    }
}

impl ExpansionConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            ignore_query_filters: parse_env_var("NAVEXPAND_IGNORE_QUERY_FILTERS", "false")?,
            max_expansion_depth: parse_env_var("NAVEXPAND_MAX_EXPANSION_DEPTH", "128")?,
            log_expanded_tree: parse_env_var("NAVEXPAND_LOG_EXPANDED_TREE", "false")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from CLI arguments with validation; options
    /// not given on the command line keep their defaults
    pub fn from_cli(cli: CliConfig) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.merge(cli)?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply the options given on the command line (CLI overrides environment)
    pub fn merge(&mut self, cli: CliConfig) -> Result<(), ConfigError> {
        if let Some(ignore_query_filters) = cli.ignore_query_filters {
            self.ignore_query_filters = ignore_query_filters;
        }
        if let Some(max_expansion_depth) = cli.max_expansion_depth {
            self.max_expansion_depth = max_expansion_depth;
        }
        if let Some(log_expanded_tree) = cli.log_expanded_tree {
            self.log_expanded_tree = log_expanded_tree;
        }

        self.validate()?;
        Ok(())
    }
}

/// CLI configuration (parsed from command line arguments). `None` means the
/// option was not given.
#[derive(Clone, Debug, Default)]
pub struct CliConfig {
    pub ignore_query_filters: Option<bool>,
    pub max_expansion_depth: Option<u32>,
    pub log_expanded_tree: Option<bool>,
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}
