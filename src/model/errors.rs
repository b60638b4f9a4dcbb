//! # Entity Model Error Types
//!
//! Errors raised while loading, validating or querying the relationship
//! metadata that the navigation expansion pass consumes.
//!
//! - **Lookup Errors**: unknown entity types, properties or navigations
//! - **Relationship Errors**: foreign keys that do not line up with their principal key
//! - **Configuration Errors**: file I/O and parsing issues during model loading

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    #[error("No entity type found for `{entity}`")]
    Entity { entity: String },
    #[error("Entity type `{entity}` has no property `{property}`")]
    Property { entity: String, property: String },
    #[error("Entity type `{entity}` has no navigation `{navigation}`")]
    Navigation { entity: String, navigation: String },
    #[error("Invalid relationship `{relationship}`: {message}")]
    InvalidRelationship {
        relationship: String,
        message: String,
    },
    #[error("Invalid query filter on `{entity}`: {message}")]
    InvalidQueryFilter { entity: String, message: String },
    #[error("Failed to read model file: {error}")]
    ConfigReadError { error: String },
    #[error("Failed to parse model: {error}")]
    ConfigParseError { error: String },
    #[error("Invalid model: {message}")]
    InvalidConfig { message: String },
}

impl ModelError {
    pub fn entity(entity: impl Into<String>) -> Self {
        ModelError::Entity {
            entity: entity.into(),
        }
    }

    pub fn relationship(relationship: impl Into<String>, message: impl Into<String>) -> Self {
        ModelError::InvalidRelationship {
            relationship: relationship.into(),
            message: message.into(),
        }
    }
}
