use thiserror::Error;

use super::{NavigationState, NodeId, SourceMappingId};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum NavigationTreeError {
    #[error("Navigation `{navigation}` requested as {requested:?} but already tracked as {existing:?}")]
    ContradictoryState {
        navigation: String,
        existing: NavigationState,
        requested: NavigationState,
    },
    #[error("Navigation `{navigation}` was already completed for {channel}")]
    AlreadyComplete { navigation: String, channel: String },
    #[error("Owned navigation `{navigation}` cannot be joined")]
    OwnedJoin { navigation: String },
    #[error("Source mapping {0} is not registered")]
    UnknownSourceMapping(SourceMappingId),
    #[error("Source mapping {0} has no navigation tree root")]
    MissingRoot(SourceMappingId),
    #[error("Tree node {0} has no navigation")]
    RootNavigation(NodeId),
    #[error("`{node}` was never resolved to a row path")]
    Unresolved { node: String },
}
