use serde::{Deserialize, Serialize};
use std::fmt;

use crate::query_planner::logical_expr::Lambda;

/// Storage type of a scalar property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Int32,
    Int64,
    Decimal,
    Double,
    Bool,
    String,
    Guid,
    DateTime,
    Bytes,
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::Decimal => "decimal",
            ScalarType::Double => "double",
            ScalarType::Bool => "bool",
            ScalarType::String => "string",
            ScalarType::Guid => "guid",
            ScalarType::DateTime => "datetime",
            ScalarType::Bytes => "bytes",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: ScalarType,
    #[serde(default)]
    pub nullable: bool,
}

impl Property {
    pub fn new(name: impl Into<String>, data_type: ScalarType, nullable: bool) -> Self {
        Property {
            name: name.into(),
            data_type,
            nullable,
        }
    }
}

/// A foreign key from a dependent entity to the key of its principal.
///
/// `properties` and `principal_key` are positionally aligned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub dependent_entity: String,
    pub principal_entity: String,
    pub properties: Vec<String>,
    pub principal_key: Vec<String>,
    pub is_required: bool,
}

/// Identity of a navigation: the declaring entity type plus the navigation name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NavigationRef {
    pub declaring_entity: String,
    pub name: String,
}

impl NavigationRef {
    pub fn new(declaring_entity: impl Into<String>, name: impl Into<String>) -> Self {
        NavigationRef {
            declaring_entity: declaring_entity.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for NavigationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.declaring_entity, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Navigation {
    pub name: String,
    pub declaring_entity: String,
    pub target_entity: String,
    pub is_collection: bool,
    /// The declaring entity holds the foreign key (dependent-to-principal).
    pub is_on_dependent: bool,
    /// The target has no identity of its own and lives inside the declaring row.
    pub is_owned: bool,
    pub foreign_key: ForeignKey,
}

impl Navigation {
    pub fn reference(&self) -> NavigationRef {
        NavigationRef::new(&self.declaring_entity, &self.name)
    }

    /// Key properties read from the declaring side when joining this navigation.
    pub fn outer_key_properties(&self) -> &[String] {
        if self.is_on_dependent {
            &self.foreign_key.properties
        } else {
            &self.foreign_key.principal_key
        }
    }

    /// Key properties read from the target side when joining this navigation.
    pub fn inner_key_properties(&self) -> &[String] {
        if self.is_on_dependent {
            &self.foreign_key.principal_key
        } else {
            &self.foreign_key.properties
        }
    }

    /// Only a required dependent-to-principal navigation is guaranteed to find a row.
    pub fn is_required_dependent_to_principal(&self) -> bool {
        self.is_on_dependent && self.foreign_key.is_required
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityType {
    pub name: String,
    pub properties: Vec<Property>,
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub navigations: Vec<Navigation>,
    /// Predicate applied to every root of this entity type unless filters are ignored.
    #[serde(default)]
    pub query_filter: Option<Lambda>,
    #[serde(default)]
    pub is_owned: bool,
}

impl EntityType {
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn navigation(&self, name: &str) -> Option<&Navigation> {
        self.navigations.iter().find(|n| n.name == name)
    }
}
