use serde::{Deserialize, Serialize};

use super::{NavigationTreeError, NodeId, SourceMappingId};

/// An independent query source: its root entity type and navigation tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMapping {
    pub root_entity_type: String,
    pub navigation_tree: Option<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct SourceMappingRegistry {
    mappings: Vec<SourceMapping>,
}

impl SourceMappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, root_entity_type: impl Into<String>) -> SourceMappingId {
        self.mappings.push(SourceMapping {
            root_entity_type: root_entity_type.into(),
            navigation_tree: None,
        });
        SourceMappingId(self.mappings.len() - 1)
    }

    pub fn get(&self, id: SourceMappingId) -> Result<&SourceMapping, NavigationTreeError> {
        self.mappings
            .get(id.0)
            .ok_or(NavigationTreeError::UnknownSourceMapping(id))
    }

    pub(crate) fn set_root(
        &mut self,
        id: SourceMappingId,
        root: NodeId,
    ) -> Result<(), NavigationTreeError> {
        let mapping = self
            .mappings
            .get_mut(id.0)
            .ok_or(NavigationTreeError::UnknownSourceMapping(id))?;
        mapping.navigation_tree = Some(root);
        Ok(())
    }

    pub fn root(&self, id: SourceMappingId) -> Result<NodeId, NavigationTreeError> {
        self.get(id)?
            .navigation_tree
            .ok_or(NavigationTreeError::MissingRoot(id))
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}
