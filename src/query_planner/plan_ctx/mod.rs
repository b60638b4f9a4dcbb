//! Per-compilation expansion context.
//!
//! Everything a single `expand_navigations` call mutates lives here: the
//! navigation tree arena, the source mapping registry, custom-root paths,
//! the set of entity types whose query filter was already applied and the
//! generator for fresh row parameters. Nothing is shared between
//! compilations.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

use crate::config::ExpansionConfig;
use crate::model::EntityModel;
use crate::query_planner::expansion::errors::ExpansionError;
use crate::query_planner::logical_expr::Parameter;
use crate::query_planner::navigation::{
    CustomRootId, NavigationTree, NavigationTreeError, NodeId, SourceMappingId,
    SourceMappingRegistry,
};

/// Counters reported once a compilation finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExpansionStats {
    pub inner_joins: usize,
    pub left_joins: usize,
    pub correlated_subqueries: usize,
    pub query_filters_applied: usize,
    pub include_markers: usize,
}

impl fmt::Display for ExpansionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "inner joins: {}, left joins: {}, correlated subqueries: {}, query filters: {}, includes: {}",
            self.inner_joins,
            self.left_joins,
            self.correlated_subqueries,
            self.query_filters_applied,
            self.include_markers
        )
    }
}

pub struct ExpansionCtx<'m> {
    model: &'m EntityModel,
    config: ExpansionConfig,
    pub(crate) tree: NavigationTree,
    pub(crate) source_mappings: SourceMappingRegistry,
    custom_roots: Vec<Vec<String>>,
    applied_query_filters: HashSet<String>,
    next_parameter: usize,
    depth: u32,
    pub stats: ExpansionStats,
}

impl<'m> ExpansionCtx<'m> {
    pub fn new(model: &'m EntityModel, config: ExpansionConfig) -> Self {
        ExpansionCtx {
            model,
            config,
            tree: NavigationTree::new(),
            source_mappings: SourceMappingRegistry::new(),
            custom_roots: Vec::new(),
            applied_query_filters: HashSet::new(),
            next_parameter: 0,
            depth: 0,
            stats: ExpansionStats::default(),
        }
    }

    pub fn model(&self) -> &'m EntityModel {
        self.model
    }

    pub fn config(&self) -> &ExpansionConfig {
        &self.config
    }

    pub fn tree(&self) -> &NavigationTree {
        &self.tree
    }

    /// Register a new source rooted at `entity_type` and allocate its tree root.
    pub fn add_source_mapping(
        &mut self,
        entity_type: &str,
        base_path: Vec<String>,
        optional: bool,
    ) -> Result<(SourceMappingId, NodeId), NavigationTreeError> {
        let source_mapping = self.source_mappings.add(entity_type);
        let root =
            self.tree
                .create_root(&mut self.source_mappings, source_mapping, base_path, optional)?;
        Ok((source_mapping, root))
    }

    pub fn source_root(&self, id: SourceMappingId) -> Result<NodeId, NavigationTreeError> {
        self.source_mappings.root(id)
    }

    /// A row parameter name no other lambda of this compilation uses.
    pub fn fresh_parameter(&mut self, hint: &str) -> Parameter {
        self.next_parameter += 1;
        let prefix = hint
            .chars()
            .next()
            .map(|c| c.to_ascii_lowercase().to_string())
            .unwrap_or_else(|| "t".to_string());
        let prefix = if hint.len() > 1 && hint.chars().all(|c| c.is_ascii_lowercase()) {
            hint.to_string()
        } else {
            prefix
        };
        Parameter::new(format!("{}#{}", prefix, self.next_parameter))
    }

    pub fn add_custom_root(&mut self, path: Vec<String>) -> CustomRootId {
        self.custom_roots.push(path);
        CustomRootId(self.custom_roots.len() - 1)
    }

    pub fn custom_root_path(&self, id: CustomRootId) -> &[String] {
        self.custom_roots
            .get(id.0)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn prefix_custom_roots(&mut self, ids: &[CustomRootId], slot: &str) {
        for id in ids {
            if let Some(path) = self.custom_roots.get_mut(id.0) {
                path.insert(0, slot.to_string());
            }
        }
    }

    /// Whether the query filter of `entity_type` still has to be applied.
    /// Records the application, so it answers `true` at most once per type.
    pub fn claim_query_filter(&mut self, entity_type: &str) -> bool {
        if self.config.ignore_query_filters {
            return false;
        }
        self.applied_query_filters.insert(entity_type.to_string())
    }

    pub fn enter(&mut self) -> Result<(), ExpansionError> {
        self.depth += 1;
        if self.depth > self.config.max_expansion_depth {
            return Err(ExpansionError::ExpansionDepthExceeded {
                depth: self.config.max_expansion_depth,
            });
        }
        Ok(())
    }

    pub fn exit(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}
