/// Entity model configuration management.
///
/// Loads entity and relationship definitions from YAML and turns them into an
/// [`EntityModel`]. Each relationship definition yields up to two navigations
/// sharing one foreign key:
///
/// - the dependent-to-principal reference (`dependent_to_principal`)
/// - the principal-to-dependent navigation (`principal_to_dependent`), a
///   collection unless the relationship is `unique`
///
/// ```yaml
/// entities:
///   - name: Customer
///     key: [Id]
///     properties:
///       - { name: Id, type: int32 }
///       - { name: TenantId, type: int32 }
///     query_filter: "c => c.TenantId == @tenant"
///   - name: Order
///     key: [Id]
///     properties:
///       - { name: Id, type: int32 }
///       - { name: CustomerId, type: int32 }
/// relationships:
///   - principal: Customer
///     dependent: Order
///     foreign_key: [CustomerId]
///     dependent_to_principal: Customer
///     principal_to_dependent: Orders
/// ```
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use super::entity::{EntityType, ForeignKey, Navigation, Property};
use super::errors::ModelError;
use super::filter_parser::parse_query_filter;
use super::EntityModel;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityModelConfig {
    pub entities: Vec<EntityDefinition>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub name: String,
    pub key: Vec<String>,
    pub properties: Vec<Property>,
    #[serde(default)]
    pub query_filter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipDefinition {
    pub principal: String,
    pub dependent: String,
    pub foreign_key: Vec<String>,
    /// Defaults to the principal's primary key
    #[serde(default)]
    pub principal_key: Option<Vec<String>>,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub dependent_to_principal: Option<String>,
    #[serde(default)]
    pub principal_to_dependent: Option<String>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub owned: bool,
}

fn default_required() -> bool {
    true
}

impl RelationshipDefinition {
    fn display_name(&self) -> String {
        format!("{} -> {}", self.dependent, self.principal)
    }
}

impl EntityModelConfig {
    /// Load entity model configuration from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let contents = fs::read_to_string(path).map_err(|e| ModelError::ConfigReadError {
            error: e.to_string(),
        })?;

        Self::from_yaml_str(&contents)
    }

    /// Parse entity model configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ModelError> {
        serde_yaml::from_str(yaml).map_err(|e| ModelError::ConfigParseError {
            error: e.to_string(),
        })
    }

    /// Structural validation of the configuration
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.entities.is_empty() {
            return Err(ModelError::InvalidConfig {
                message: "Model must contain at least one entity definition".to_string(),
            });
        }

        let mut entities: HashMap<&str, &EntityDefinition> = HashMap::new();
        for entity in &self.entities {
            if entities.insert(entity.name.as_str(), entity).is_some() {
                return Err(ModelError::InvalidConfig {
                    message: format!("Duplicate entity: {}", entity.name),
                });
            }
            if entity.key.is_empty() {
                return Err(ModelError::InvalidConfig {
                    message: format!("Entity {} has an empty key", entity.name),
                });
            }
            for key in &entity.key {
                ensure_property(entity, key)?;
            }
        }

        let mut navigation_names: HashSet<(&str, &str)> = HashSet::new();
        for rel in &self.relationships {
            let principal = entities
                .get(rel.principal.as_str())
                .ok_or_else(|| ModelError::entity(&rel.principal))?;
            let dependent = entities
                .get(rel.dependent.as_str())
                .ok_or_else(|| ModelError::entity(&rel.dependent))?;

            let principal_key = rel.principal_key.as_ref().unwrap_or(&principal.key);
            if principal_key.len() != rel.foreign_key.len() || rel.foreign_key.is_empty() {
                return Err(ModelError::relationship(
                    rel.display_name(),
                    format!(
                        "foreign key has {} properties but principal key has {}",
                        rel.foreign_key.len(),
                        principal_key.len()
                    ),
                ));
            }
            for property in &rel.foreign_key {
                ensure_property(dependent, property)?;
            }
            for property in principal_key {
                ensure_property(principal, property)?;
            }

            if rel.dependent_to_principal.is_none() && rel.principal_to_dependent.is_none() {
                return Err(ModelError::relationship(
                    rel.display_name(),
                    "relationship must declare at least one navigation",
                ));
            }
            if rel.owned && rel.principal_to_dependent.is_none() {
                return Err(ModelError::relationship(
                    rel.display_name(),
                    "owned relationship needs a principal_to_dependent navigation",
                ));
            }

            for (entity, name) in [
                (&rel.dependent, &rel.dependent_to_principal),
                (&rel.principal, &rel.principal_to_dependent),
            ] {
                if let Some(name) = name {
                    if !navigation_names.insert((entity.as_str(), name.as_str())) {
                        return Err(ModelError::InvalidConfig {
                            message: format!("Duplicate navigation: {}.{}", entity, name),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Validate and build the runtime entity model
    pub fn build(&self) -> Result<EntityModel, ModelError> {
        self.validate()?;

        let owned: HashSet<&str> = self
            .relationships
            .iter()
            .filter(|rel| rel.owned)
            .map(|rel| rel.dependent.as_str())
            .collect();

        let mut entities: Vec<EntityType> = Vec::with_capacity(self.entities.len());
        for definition in &self.entities {
            let query_filter = match &definition.query_filter {
                Some(text) => Some(parse_query_filter(text).map_err(|message| {
                    ModelError::InvalidQueryFilter {
                        entity: definition.name.clone(),
                        message,
                    }
                })?),
                None => None,
            };

            entities.push(EntityType {
                name: definition.name.clone(),
                properties: definition.properties.clone(),
                primary_key: definition.key.clone(),
                navigations: Vec::new(),
                query_filter,
                is_owned: owned.contains(definition.name.as_str()),
            });
        }

        for rel in &self.relationships {
            let principal_key = match &rel.principal_key {
                Some(key) => key.clone(),
                None => self
                    .entities
                    .iter()
                    .find(|e| e.name == rel.principal)
                    .map(|e| e.key.clone())
                    .ok_or_else(|| ModelError::entity(&rel.principal))?,
            };
            let foreign_key = ForeignKey {
                dependent_entity: rel.dependent.clone(),
                principal_entity: rel.principal.clone(),
                properties: rel.foreign_key.clone(),
                principal_key,
                is_required: rel.required,
            };

            if let Some(name) = &rel.dependent_to_principal {
                push_navigation(
                    &mut entities,
                    Navigation {
                        name: name.clone(),
                        declaring_entity: rel.dependent.clone(),
                        target_entity: rel.principal.clone(),
                        is_collection: false,
                        is_on_dependent: true,
                        is_owned: false,
                        foreign_key: foreign_key.clone(),
                    },
                )?;
            }

            if let Some(name) = &rel.principal_to_dependent {
                push_navigation(
                    &mut entities,
                    Navigation {
                        name: name.clone(),
                        declaring_entity: rel.principal.clone(),
                        target_entity: rel.dependent.clone(),
                        is_collection: !rel.unique,
                        is_on_dependent: false,
                        is_owned: rel.owned,
                        foreign_key,
                    },
                )?;
            }
        }

        log::debug!(
            "Built entity model with {} entity types and {} relationships",
            entities.len(),
            self.relationships.len()
        );
        Ok(EntityModel::new(entities))
    }
}

fn ensure_property(entity: &EntityDefinition, property: &str) -> Result<(), ModelError> {
    if entity.properties.iter().any(|p| p.name == property) {
        Ok(())
    } else {
        Err(ModelError::Property {
            entity: entity.name.clone(),
            property: property.to_string(),
        })
    }
}

fn push_navigation(entities: &mut [EntityType], navigation: Navigation) -> Result<(), ModelError> {
    let declaring = entities
        .iter_mut()
        .find(|e| e.name == navigation.declaring_entity)
        .ok_or_else(|| ModelError::entity(&navigation.declaring_entity))?;
    declaring.navigations.push(navigation);
    Ok(())
}
