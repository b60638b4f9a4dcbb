//! Navigation tree arena.
//!
//! One node per navigation step reachable from a query root. Each node keeps
//! two independent state channels: whether the navigation has to be joined
//! for filtering/projection (expansion) and whether it has to be loaded
//! eagerly (include). `from_mappings` are the author-visible paths that
//! resolve to the node; `to_mapping` is where the node currently lives in the
//! rewritten row shape.
//!
//! Invariants:
//! - one node per (parent, navigation); re-requests only upgrade a channel
//!   from `NotNeeded`
//! - optionality is inherited downward and only ever widened
//! - a channel is marked `Complete` at most once

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::{
    NavigationState, NavigationTreeError, NodeId, SourceMappingId, SourceMappingRegistry,
};
use crate::model::{Navigation, NavigationRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavigationChannel {
    Expansion,
    Include,
}

impl fmt::Display for NavigationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationChannel::Expansion => write!(f, "expansion"),
            NavigationChannel::Include => write!(f, "include"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NavigationTreeNode {
    /// `None` for roots.
    pub navigation: Option<NavigationRef>,
    /// Entity type reached at this node.
    pub entity_type: String,
    pub is_collection: bool,
    pub is_owned: bool,
    pub optional: bool,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    child_index: HashMap<NavigationRef, NodeId>,
    pub expansion_state: NavigationState,
    pub include_state: NavigationState,
    pub from_mappings: Vec<Vec<String>>,
    pub to_mapping: Vec<String>,
    pub source_mapping: SourceMappingId,
}

impl NavigationTreeNode {
    pub fn state(&self, channel: NavigationChannel) -> NavigationState {
        match channel {
            NavigationChannel::Expansion => self.expansion_state,
            NavigationChannel::Include => self.include_state,
        }
    }

    fn state_mut(&mut self, channel: NavigationChannel) -> &mut NavigationState {
        match channel {
            NavigationChannel::Expansion => &mut self.expansion_state,
            NavigationChannel::Include => &mut self.include_state,
        }
    }

    /// The node has its own slot in the row shape (a root or a joined navigation).
    pub fn is_joined(&self) -> bool {
        self.expansion_state == NavigationState::Complete
            || self.include_state == NavigationState::Complete
    }

    pub fn name(&self) -> Option<&str> {
        self.navigation.as_ref().map(|n| n.name.as_str())
    }

    fn label(&self) -> String {
        match &self.navigation {
            Some(navigation) => navigation.to_string(),
            None => self.entity_type.clone(),
        }
    }
}

/// State a freshly requested navigation moves to.
pub fn requested_state(navigation: &Navigation) -> NavigationState {
    if navigation.is_owned {
        NavigationState::Delayed
    } else if navigation.is_collection {
        NavigationState::CollectionPending
    } else {
        NavigationState::Pending
    }
}

#[derive(Debug, Clone, Default)]
pub struct NavigationTree {
    nodes: Vec<NavigationTreeNode>,
}

impl NavigationTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> &NavigationTreeNode {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut NavigationTreeNode {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn alloc(&mut self, node: NavigationTreeNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Root of `source_mapping`, allocated on first request.
    pub fn create_root(
        &mut self,
        registry: &mut SourceMappingRegistry,
        source_mapping: SourceMappingId,
        base_path: Vec<String>,
        optional: bool,
    ) -> Result<NodeId, NavigationTreeError> {
        let mapping = registry.get(source_mapping)?;
        if let Some(existing) = mapping.navigation_tree {
            return Ok(existing);
        }

        let root = self.alloc(NavigationTreeNode {
            navigation: None,
            entity_type: mapping.root_entity_type.clone(),
            is_collection: false,
            is_owned: false,
            optional,
            parent: None,
            children: Vec::new(),
            child_index: HashMap::new(),
            expansion_state: NavigationState::Complete,
            include_state: NavigationState::NotNeeded,
            from_mappings: vec![base_path.clone()],
            to_mapping: base_path,
            source_mapping,
        });
        registry.set_root(source_mapping, root)?;
        Ok(root)
    }

    /// Child of `parent` for `navigation`, allocated on first request. A
    /// repeated request only upgrades `channel` if it is still `NotNeeded`.
    pub fn create(
        &mut self,
        navigation: &Navigation,
        parent: NodeId,
        channel: NavigationChannel,
    ) -> Result<NodeId, NavigationTreeError> {
        let reference = navigation.reference();
        let requested = requested_state(navigation);

        if let Some(&existing) = self.node(parent).child_index.get(&reference) {
            let node = self.node_mut(existing);
            for other in [node.expansion_state, node.include_state] {
                let delayed_mismatch = (other == NavigationState::Delayed)
                    != (requested == NavigationState::Delayed);
                if other.is_needed() && other != NavigationState::Complete && delayed_mismatch {
                    return Err(NavigationTreeError::ContradictoryState {
                        navigation: reference.to_string(),
                        existing: other,
                        requested,
                    });
                }
            }

            let state = node.state_mut(channel);
            if *state == NavigationState::NotNeeded {
                *state = requested;
            }
            return Ok(existing);
        }

        let parent_node = self.node(parent);
        let optional = parent_node.optional || !navigation.is_required_dependent_to_principal();
        let from_mappings = parent_node
            .from_mappings
            .iter()
            .map(|path| extend(path, &navigation.name))
            .collect();
        let to_mapping = extend(&parent_node.to_mapping, &navigation.name);
        let source_mapping = parent_node.source_mapping;

        let (expansion_state, include_state) = match channel {
            NavigationChannel::Expansion => (requested, NavigationState::NotNeeded),
            NavigationChannel::Include => (NavigationState::NotNeeded, requested),
        };

        let id = self.alloc(NavigationTreeNode {
            navigation: Some(reference.clone()),
            entity_type: navigation.target_entity.clone(),
            is_collection: navigation.is_collection,
            is_owned: navigation.is_owned,
            optional,
            parent: Some(parent),
            children: Vec::new(),
            child_index: HashMap::new(),
            expansion_state,
            include_state,
            from_mappings,
            to_mapping,
            source_mapping,
        });

        let parent_node = self.node_mut(parent);
        parent_node.children.push(id);
        parent_node.child_index.insert(reference, id);
        log::trace!(
            "Created navigation tree node {} for {} (optional: {})",
            id,
            navigation.reference(),
            optional
        );
        Ok(id)
    }

    /// Create under `parent` the counterpart of `template`, requested for `channel`.
    pub fn create_like(
        &mut self,
        template: NodeId,
        parent: NodeId,
        channel: NavigationChannel,
    ) -> Result<NodeId, NavigationTreeError> {
        let source = self.node(template).clone();
        let reference = source
            .navigation
            .clone()
            .ok_or(NavigationTreeError::RootNavigation(template))?;
        let requested = source.state(channel);

        if let Some(&existing) = self.node(parent).child_index.get(&reference) {
            let state = self.node_mut(existing).state_mut(channel);
            if *state == NavigationState::NotNeeded {
                *state = pending_form(requested);
            }
            return Ok(existing);
        }

        let parent_node = self.node(parent);
        let (expansion_state, include_state) = match channel {
            NavigationChannel::Expansion => (pending_form(requested), NavigationState::NotNeeded),
            NavigationChannel::Include => (NavigationState::NotNeeded, pending_form(requested)),
        };
        let node = NavigationTreeNode {
            navigation: Some(reference.clone()),
            entity_type: source.entity_type.clone(),
            is_collection: source.is_collection,
            is_owned: source.is_owned,
            optional: parent_node.optional || source.optional,
            parent: Some(parent),
            children: Vec::new(),
            child_index: HashMap::new(),
            expansion_state,
            include_state,
            from_mappings: parent_node
                .from_mappings
                .iter()
                .map(|path| extend(path, &reference.name))
                .collect(),
            to_mapping: extend(&parent_node.to_mapping, &reference.name),
            source_mapping: parent_node.source_mapping,
        };

        let id = self.alloc(node);
        let parent_node = self.node_mut(parent);
        parent_node.children.push(id);
        parent_node.child_index.insert(reference, id);
        Ok(id)
    }

    /// Replicate every include request below `from` onto `to`.
    pub fn copy_include_information(
        &mut self,
        from: NodeId,
        to: NodeId,
    ) -> Result<(), NavigationTreeError> {
        let children = self.node(from).children.clone();
        for child in children {
            if self.node(child).include_state.is_needed() {
                let copy = self.create_like(child, to, NavigationChannel::Include)?;
                self.copy_include_information(child, copy)?;
            }
        }
        Ok(())
    }

    /// The node itself followed by its descendants in preorder.
    pub fn flatten(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.node(id).children.iter().rev().copied());
        }
        out
    }

    /// Widen optionality over a whole subtree.
    pub fn make_optional(&mut self, root: NodeId) {
        for id in self.flatten(root) {
            self.node_mut(id).optional = true;
        }
    }

    /// Forget include requests that were not satisfied yet, e.g. under an aggregate.
    /// Returns the number of include requests dropped.
    pub fn drop_pending_includes(&mut self, root: NodeId) -> usize {
        let mut dropped = 0;
        for id in self.flatten(root) {
            let node = self.node_mut(id);
            if node.include_state.is_needed() && node.include_state != NavigationState::Complete {
                node.include_state = NavigationState::NotNeeded;
                dropped += 1;
            }
        }
        dropped
    }

    pub fn mark_complete(
        &mut self,
        id: NodeId,
        channel: NavigationChannel,
    ) -> Result<(), NavigationTreeError> {
        let node = self.node_mut(id);
        if node.state(channel) == NavigationState::Complete {
            return Err(NavigationTreeError::AlreadyComplete {
                navigation: node.label(),
                channel: channel.to_string(),
            });
        }
        *node.state_mut(channel) = NavigationState::Complete;
        Ok(())
    }

    /// Prefix every `to_mapping` of `nodes` with a pair slot name.
    pub fn prefix_to_mappings(&mut self, nodes: &[NodeId], slot: &str) {
        for &id in nodes {
            self.node_mut(id).to_mapping.insert(0, slot.to_string());
        }
    }

    pub fn set_to_mapping(&mut self, id: NodeId, to_mapping: Vec<String>) {
        self.node_mut(id).to_mapping = to_mapping;
    }

    /// Recompute the embedded location of never-joined descendants.
    pub fn refresh_embedded_mappings(&mut self, id: NodeId) {
        let children = self.node(id).children.clone();
        let base = self.node(id).to_mapping.clone();
        for child in children {
            if !self.node(child).is_joined() {
                let name = self.node(child).name().unwrap_or_default().to_string();
                self.node_mut(child).to_mapping = extend(&base, &name);
            }
            self.refresh_embedded_mappings(child);
        }
    }

    /// Move the children of `fresh_root` under `node`, merging with children
    /// `node` already tracks for the same navigation.
    pub fn splice(&mut self, fresh_root: NodeId, node: NodeId) {
        let children = std::mem::take(&mut self.node_mut(fresh_root).children);
        self.node_mut(fresh_root).child_index.clear();
        for child in children {
            self.attach_or_merge(child, node);
        }
        if self.node(node).optional {
            self.make_optional(node);
        }
    }

    fn attach_or_merge(&mut self, child: NodeId, parent: NodeId) {
        let Some(reference) = self.node(child).navigation.clone() else {
            return;
        };

        match self.node(parent).child_index.get(&reference).copied() {
            Some(existing) => {
                let incoming = self.node(child).clone();
                let target = self.node_mut(existing);
                if incoming.is_joined() && !target.is_joined() {
                    target.to_mapping = incoming.to_mapping.clone();
                    target.expansion_state = NavigationState::Complete;
                }
                if target.include_state == NavigationState::NotNeeded {
                    target.include_state = incoming.include_state;
                }
                for grandchild in incoming.children {
                    self.attach_or_merge(grandchild, existing);
                }
            }
            None => {
                let source_mapping = self.node(parent).source_mapping;
                for id in self.flatten(child) {
                    self.node_mut(id).source_mapping = source_mapping;
                }
                self.node_mut(child).parent = Some(parent);
                let parent_node = self.node_mut(parent);
                parent_node.children.push(child);
                parent_node.child_index.insert(reference, child);
            }
        }
    }
}

fn pending_form(state: NavigationState) -> NavigationState {
    match state {
        NavigationState::Complete => NavigationState::Pending,
        other => other,
    }
}

fn extend(path: &[String], name: &str) -> Vec<String> {
    let mut out = path.to_vec();
    out.push(name.to_string());
    out
}
