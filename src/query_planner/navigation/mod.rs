//! Navigation trees and the source mappings that own them.
//!
//! Nodes live in a single arena per compilation and refer to each other by
//! index; a source mapping ties one independent query source to the root of
//! its tree.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod errors;
pub mod source_mapping;
pub mod tree;

pub use errors::NavigationTreeError;
pub use source_mapping::{SourceMapping, SourceMappingRegistry};
pub use tree::{NavigationChannel, NavigationTree, NavigationTreeNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceMappingId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CustomRootId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for SourceMappingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sm{}", self.0)
    }
}

impl fmt::Display for CustomRootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cr{}", self.0)
    }
}

/// Progress of one concern (expansion or include) for a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavigationState {
    NotNeeded,
    /// A reference navigation waiting for its join.
    Pending,
    /// A collection navigation, resolved by a correlated subquery.
    CollectionPending,
    Complete,
    /// Owned navigation; stays embedded and is never joined.
    Delayed,
}

impl NavigationState {
    pub fn is_needed(&self) -> bool {
        !matches!(self, NavigationState::NotNeeded)
    }
}
