//! Extension nodes layered on the host query tree during navigation expansion.
//!
//! None of these survive the reduction pass except the include and
//! collection-materialization markers and the correlation predicate, which
//! are handed on to later phases.

use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

use super::{CardinalityOperator, Lambda, LogicalExpr, OrderingKind, Parameter};
use crate::model::NavigationRef;
use crate::query_planner::navigation::{CustomRootId, NodeId, SourceMappingId};
use crate::utils::serde_arc;

/// A navigation path lookup from a root parameter, resolved to a concrete
/// member access once the tree node's final location is known.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct NavigationBinding {
    pub root_parameter: Parameter,
    pub node: NodeId,
    /// Entity type reached at `node`.
    pub entity_type: String,
    pub source_mapping: SourceMappingId,
}

/// Whether the pending selector still has to be emitted as a projection.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum SelectorState {
    NotNeeded,
    Pending,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct PendingOrdering {
    pub kind: OrderingKind,
    pub key_selector: Lambda,
}

/// Deferred work carried by a [`NavigationExpansion`] until reduction.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ExpansionState {
    pub current_parameter: Parameter,
    pub source_mappings: Vec<SourceMappingId>,
    /// Row shape as seen by the query author, over `current_parameter`.
    pub pending_selector: Lambda,
    pub selector: SelectorState,
    pub pending_orderings: Vec<PendingOrdering>,
    /// Last navigation named by Include/ThenInclude; ThenInclude continues from here.
    pub pending_include_chain: Option<NavigationBinding>,
    pub pending_cardinality: Option<CardinalityOperator>,
    pub pending_tags: Vec<String>,
    pub custom_root_mappings: Vec<CustomRootId>,
    pub materialize_collection: Option<NavigationRef>,
}

impl ExpansionState {
    pub fn new(
        current_parameter: Parameter,
        source_mappings: Vec<SourceMappingId>,
        pending_selector: Lambda,
    ) -> Self {
        ExpansionState {
            current_parameter,
            source_mappings,
            pending_selector,
            selector: SelectorState::NotNeeded,
            pending_orderings: Vec::new(),
            pending_include_chain: None,
            pending_cardinality: None,
            pending_tags: Vec::new(),
            custom_root_mappings: Vec::new(),
            materialize_collection: None,
        }
    }

    /// State for a source whose rows carry no tracked entity.
    pub fn for_custom_root(current_parameter: Parameter, custom_root: CustomRootId) -> Self {
        let body = Arc::new(LogicalExpr::CustomRoot(CustomRoot {
            root_parameter: current_parameter.clone(),
            mapping: custom_root,
        }));
        let mut state = ExpansionState::new(
            current_parameter.clone(),
            Vec::new(),
            Lambda::unary(current_parameter, body),
        );
        state.custom_root_mappings.push(custom_root);
        state
    }

    pub fn add_tag(&mut self, tag: &str) {
        if !self.pending_tags.iter().any(|t| t == tag) {
            self.pending_tags.push(tag.to_string());
        }
    }
}

/// Root wrapper: a source that still has pending navigation work.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct NavigationExpansion {
    #[serde(with = "serde_arc")]
    pub operand: Arc<LogicalExpr>,
    pub state: ExpansionState,
}

impl NavigationExpansion {
    pub fn new(operand: Arc<LogicalExpr>, state: ExpansionState) -> Self {
        NavigationExpansion { operand, state }
    }

    pub fn into_expr(self) -> Arc<LogicalExpr> {
        Arc::new(LogicalExpr::NavigationExpansion(Arc::new(self)))
    }
}

/// A member path taken on the rows of an expansion that has not been
/// materialized yet, e.g. `Customers.First().Address`.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct NavigationExpansionRoot {
    #[serde(with = "serde_arc")]
    pub expansion: Arc<NavigationExpansion>,
    pub mapping: Vec<String>,
}

impl NavigationExpansionRoot {
    /// Fold the member path into the pending selector. With an empty path
    /// the wrapped expansion itself is returned.
    pub fn unwrap(&self) -> Arc<NavigationExpansion> {
        if self.mapping.is_empty() {
            return Arc::clone(&self.expansion);
        }

        let mut state = self.expansion.state.clone();
        let body = LogicalExpr::member_path(state.pending_selector.body.clone(), &self.mapping);
        state.pending_selector = state.pending_selector.with_body(body);
        state.selector = SelectorState::Pending;
        Arc::new(NavigationExpansion::new(
            Arc::clone(&self.expansion.operand),
            state,
        ))
    }
}

/// Eager-load marker: materialize `navigation_expr` into `entity.navigation`.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct IncludeExpr {
    #[serde(with = "serde_arc")]
    pub entity: Arc<LogicalExpr>,
    #[serde(with = "serde_arc")]
    pub navigation_expr: Arc<LogicalExpr>,
    pub navigation: NavigationRef,
}

/// Marker telling entity materialization to buffer `subquery` as the
/// contents of a collection navigation.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct MaterializeCollection {
    #[serde(with = "serde_arc")]
    pub subquery: Arc<LogicalExpr>,
    pub navigation: NavigationRef,
}

/// Row reference for sources without a navigation tree; the path in the
/// referenced mapping grows as joins wrap the row.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct CustomRoot {
    pub root_parameter: Parameter,
    pub mapping: CustomRootId,
}

/// `outer_key != null && outer_key == inner_key`, kept as its own node so
/// later phases can apply relational null semantics.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct CorrelationPredicate {
    #[serde(with = "serde_arc")]
    pub null_check: Arc<LogicalExpr>,
    #[serde(with = "serde_arc")]
    pub equality: Arc<LogicalExpr>,
}

impl CorrelationPredicate {
    pub fn reduce(&self) -> Arc<LogicalExpr> {
        LogicalExpr::and(Arc::clone(&self.null_check), Arc::clone(&self.equality))
    }
}

impl fmt::Display for NavigationBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NavigationBinding({}, {}, {})",
            self.root_parameter, self.node, self.entity_type
        )
    }
}

impl fmt::Display for NavigationExpansion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NavigationExpansion({})", self.operand)
    }
}

impl fmt::Display for NavigationExpansionRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NavigationExpansionRoot({}, [{}])",
            self.expansion,
            self.mapping.join(".")
        )
    }
}

impl fmt::Display for IncludeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Include({}, {}, {})",
            self.entity, self.navigation_expr, self.navigation
        )
    }
}

impl fmt::Display for MaterializeCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MaterializeCollectionNavigation({}, {})",
            self.navigation, self.subquery
        )
    }
}

impl fmt::Display for CustomRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CustomRoot({}, {})", self.root_parameter, self.mapping)
    }
}

impl fmt::Display for CorrelationPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Correlation({}, {})", self.null_check, self.equality)
    }
}
