//! Error types for navigation expansion.
//!
//! Every variant aborts the current compilation; nothing is retried and no
//! partially rewritten tree is handed back.

use thiserror::Error;

use crate::model::{ModelError, ScalarType};
use crate::query_planner::navigation::NavigationTreeError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExpansionError {
    #[error("Unsupported query shape at {operator}: {message}")]
    UnsupportedShape { operator: String, message: String },

    #[error("Inconsistent navigation state: {source}")]
    InconsistentNavigationState {
        #[from]
        source: NavigationTreeError,
    },

    #[error(
        "Key types of navigation `{navigation}` cannot be reconciled: outer is {outer}, inner is {inner}"
    )]
    KeyTypeMismatch {
        navigation: String,
        outer: ScalarType,
        inner: ScalarType,
    },

    #[error("Invalid include path `{path}`")]
    InvalidIncludePath { path: String },

    #[error("Expansion nested deeper than the configured limit of {depth}")]
    ExpansionDepthExceeded { depth: u32 },

    #[error("Model: {source}")]
    Model {
        #[from]
        source: ModelError,
    },
}

impl ExpansionError {
    pub fn unsupported(operator: impl Into<String>, message: impl Into<String>) -> Self {
        ExpansionError::UnsupportedShape {
            operator: operator.into(),
            message: message.into(),
        }
    }
}
