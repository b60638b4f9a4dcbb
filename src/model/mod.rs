//! Relationship metadata consumed read-only by navigation expansion.
//!
//! The model answers the questions the pass needs to ask about a navigation:
//! its target, whether it is collection valued, which side holds the foreign
//! key, whether the key is required, whether the target is owned, and which
//! query filter applies to an entity type.

use std::collections::HashMap;

pub mod config;
pub mod entity;
pub mod errors;
pub mod filter_parser;

pub use config::EntityModelConfig;
pub use entity::{EntityType, ForeignKey, Navigation, NavigationRef, Property, ScalarType};
pub use errors::ModelError;

#[derive(Debug, Clone, Default)]
pub struct EntityModel {
    entities: HashMap<String, EntityType>,
}

impl EntityModel {
    pub fn new(entities: Vec<EntityType>) -> Self {
        EntityModel {
            entities: entities.into_iter().map(|e| (e.name.clone(), e)).collect(),
        }
    }

    /// Load, validate and build a model from a YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ModelError> {
        EntityModelConfig::from_yaml_file(path)?.build()
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ModelError> {
        EntityModelConfig::from_yaml_str(yaml)?.build()
    }

    pub fn entity(&self, name: &str) -> Result<&EntityType, ModelError> {
        self.entities.get(name).ok_or_else(|| ModelError::entity(name))
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityType> {
        self.entities.values()
    }

    pub fn navigation(&self, entity: &str, name: &str) -> Option<&Navigation> {
        self.entities.get(entity).and_then(|e| e.navigation(name))
    }

    pub fn navigation_by_ref(&self, navigation: &NavigationRef) -> Result<&Navigation, ModelError> {
        self.navigation(&navigation.declaring_entity, &navigation.name)
            .ok_or_else(|| ModelError::Navigation {
                entity: navigation.declaring_entity.clone(),
                navigation: navigation.name.clone(),
            })
    }

    pub fn property(&self, entity: &str, name: &str) -> Result<&Property, ModelError> {
        self.entity(entity)?
            .property(name)
            .ok_or_else(|| ModelError::Property {
                entity: entity.to_string(),
                property: name.to_string(),
            })
    }
}
