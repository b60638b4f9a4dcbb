//! Reduction: wrappers back to plain operators.
//!
//! For each wrapper, in order: include joins, include markers in the
//! selector, the operand, pending orderings, the pending projection, tags,
//! the cardinality operator and finally the collection-materialization
//! marker.

use std::sync::Arc;

use super::{Expander, ExpansionPass, ExpansionResult};
use crate::model::NavigationRef;
use crate::query_planner::{
    logical_expr::{
        visitors::{children, map_children, walk_expression, UnreducedNodeFinder},
        CardinalityOp, IncludeExpr, Lambda, LogicalExpr, MaterializeCollection, NavigationBinding,
        NavigationExpansion, Ordering, Projection, SelectorState, SequenceOp, TagWith,
    },
    navigation::{NavigationChannel, NavigationState, NavigationTreeError, NodeId},
    plan_ctx::ExpansionCtx,
    transformed::Transformed,
};

/// Second pass: replace every wrapper, binding and custom root.
pub struct ExpansionReducing;

impl ExpansionPass for ExpansionReducing {
    fn rewrite(
        &self,
        expr: Arc<LogicalExpr>,
        ctx: &mut ExpansionCtx,
    ) -> ExpansionResult<Transformed<Arc<LogicalExpr>>> {
        let reduced = Expander::new(ctx).reduce(&expr)?;

        let mut finder = UnreducedNodeFinder::default();
        walk_expression(&reduced, &mut finder);
        if let Some(node) = finder.found {
            return Err(NavigationTreeError::Unresolved { node }.into());
        }

        if Arc::ptr_eq(&reduced, &expr) {
            Ok(Transformed::No(reduced))
        } else {
            Ok(Transformed::Yes(reduced))
        }
    }
}

impl Expander<'_, '_> {
    pub(super) fn reduce(&mut self, expr: &Arc<LogicalExpr>) -> ExpansionResult<Arc<LogicalExpr>> {
        match expr.as_ref() {
            LogicalExpr::NavigationExpansion(expansion) => {
                self.reduce_expansion(NavigationExpansion::clone(expansion))
            }
            LogicalExpr::NavigationExpansionRoot(root) => {
                self.reduce_expansion(NavigationExpansion::clone(&root.unwrap()))
            }
            LogicalExpr::NavigationBinding(_) | LogicalExpr::CustomRoot(_) => {
                Ok(self.ctx.unbind(expr, None))
            }
            _ => Ok(map_children(expr, |child| self.reduce(child))?.get_expr()),
        }
    }

    fn reduce_expansion(
        &mut self,
        mut expansion: NavigationExpansion,
    ) -> ExpansionResult<Arc<LogicalExpr>> {
        self.join_included_references(&mut expansion)?;

        let selector = &expansion.state.pending_selector;
        let with_includes = self.include_markers(&selector.body)?;
        if !Arc::ptr_eq(&with_includes, &selector.body) {
            expansion.state.pending_selector = selector.with_body(with_includes);
            expansion.state.selector = SelectorState::Pending;
        }

        let state = &expansion.state;
        let parameter = &state.current_parameter;
        let mut result = self.reduce(&expansion.operand)?;

        for ordering in &state.pending_orderings {
            let key = self.reduce(&ordering.key_selector.body)?;
            result = LogicalExpr::sequence(SequenceOp::OrderBy(Ordering {
                source: result,
                key_selector: Lambda::unary(parameter.clone(), key),
                kind: ordering.kind,
            }));
        }

        if state.selector == SelectorState::Pending {
            let body = self.reduce(&state.pending_selector.body)?;
            result = LogicalExpr::sequence(SequenceOp::Select(Projection {
                source: result,
                selector: Lambda::unary(parameter.clone(), body),
            }));
        }

        for tag in &state.pending_tags {
            result = LogicalExpr::sequence(SequenceOp::TagWith(TagWith {
                source: result,
                tag: tag.clone(),
            }));
        }

        if let Some(operator) = state.pending_cardinality {
            result = LogicalExpr::sequence(SequenceOp::Cardinality(CardinalityOp {
                source: result,
                operator,
                predicate: None,
            }));
        }

        if let Some(navigation) = &state.materialize_collection {
            result = Arc::new(LogicalExpr::MaterializeCollection(MaterializeCollection {
                subquery: result,
                navigation: navigation.clone(),
            }));
        }

        Ok(result)
    }

    /// Join the reference navigations included from entities the selector
    /// actually returns. Includes under entities that are projected away
    /// are ignored.
    fn join_included_references(
        &mut self,
        expansion: &mut NavigationExpansion,
    ) -> ExpansionResult<()> {
        let mut bindings = Vec::new();
        selector_bindings(&expansion.state.pending_selector.body, &mut bindings);

        let mut pending = Vec::new();
        for binding in &bindings {
            self.collect_included_references(binding.node, &mut pending);
        }
        for node in pending {
            if self.ctx.tree().node(node).include_state == NavigationState::Pending {
                self.join_navigation(expansion, node, NavigationChannel::Include)?;
            }
        }
        Ok(())
    }

    fn collect_included_references(&self, node: NodeId, out: &mut Vec<NodeId>) {
        let tree = self.ctx.tree();
        for child in &tree.node(node).children {
            let child_node = tree.node(*child);
            // Includes below a collection are carried into its subquery
            if child_node.include_state.is_needed() && !child_node.is_collection {
                if !out.contains(child) {
                    out.push(*child);
                }
                self.collect_included_references(*child, out);
            }
        }
    }

    /// Wrap every entity the selector returns in the include markers its
    /// tree requests.
    fn include_markers(&mut self, expr: &Arc<LogicalExpr>) -> ExpansionResult<Arc<LogicalExpr>> {
        match expr.as_ref() {
            LogicalExpr::NavigationBinding(binding) => self.include_binding(binding, expr),
            LogicalExpr::New(_) | LogicalExpr::Pair(_) => {
                Ok(map_children(expr, |child| self.include_markers(child))?.get_expr())
            }
            // Members read off an entity are not the entity itself
            _ => Ok(Arc::clone(expr)),
        }
    }

    fn include_binding(
        &mut self,
        binding: &NavigationBinding,
        expr: &Arc<LogicalExpr>,
    ) -> ExpansionResult<Arc<LogicalExpr>> {
        let mut entity = Arc::clone(expr);
        let children = self.ctx.tree().node(binding.node).children.clone();
        for child in children {
            let node = self.ctx.tree().node(child).clone();
            if !node.include_state.is_needed() {
                continue;
            }
            let navigation = node
                .navigation
                .clone()
                .ok_or(NavigationTreeError::RootNavigation(child))?;

            let navigation_expr = if node.is_collection {
                self.included_collection(binding, &navigation, child)?
            } else {
                let child_binding = NavigationBinding {
                    root_parameter: binding.root_parameter.clone(),
                    node: child,
                    entity_type: node.entity_type.clone(),
                    source_mapping: binding.source_mapping,
                };
                let child_expr = Arc::new(LogicalExpr::NavigationBinding(child_binding.clone()));
                self.include_binding(&child_binding, &child_expr)?
            };

            entity = Arc::new(LogicalExpr::Include(IncludeExpr {
                entity,
                navigation_expr,
                navigation,
            }));
            self.ctx.stats.include_markers += 1;
        }
        Ok(entity)
    }

    /// Correlated subquery for an included collection, carrying the includes
    /// requested below it.
    fn included_collection(
        &mut self,
        parent: &NavigationBinding,
        navigation: &NavigationRef,
        node: NodeId,
    ) -> ExpansionResult<Arc<LogicalExpr>> {
        let model = self.ctx.model();
        let navigation = model.navigation_by_ref(navigation)?;
        let marker = self.correlated_collection(parent, navigation)?;
        let subquery = self.visit_source(&marker)?;
        if let Some(source_mapping) = subquery.state.source_mappings.first() {
            let root = self.ctx.source_root(*source_mapping)?;
            self.ctx.tree.copy_include_information(node, root)?;
        }
        self.reduce_expansion(subquery)
    }
}

/// Entities the selector returns, directly or inside anonymous objects and pairs.
fn selector_bindings(expr: &Arc<LogicalExpr>, out: &mut Vec<NavigationBinding>) {
    match expr.as_ref() {
        LogicalExpr::NavigationBinding(binding) => out.push(binding.clone()),
        LogicalExpr::New(_) | LogicalExpr::Pair(_) => {
            for child in children(expr) {
                selector_bindings(child, out);
            }
        }
        _ => {}
    }
}
