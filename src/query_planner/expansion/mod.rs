//! Navigation expansion.
//!
//! Two passes run over the host query tree:
//!
//! 1. [`NavigationExpanding`] walks the tree top-down. Every entity root
//!    becomes a [`NavigationExpansion`] wrapper, every navigation dereference
//!    becomes a [`NavigationBinding`] into the wrapper's navigation tree, and
//!    reference navigations are joined lazily, right before the operator that
//!    consumes them is emitted. Projections, orderings and cardinality
//!    operators stay pending on the wrapper.
//! 2. [`ExpansionReducing`] replaces every wrapper with plain operators,
//!    resolving bindings against the final row shape and emitting include and
//!    collection-materialization markers.

use std::sync::Arc;

use crate::query_planner::{
    logical_expr::{
        CustomRoot, ExpansionState, Filter, Lambda, LogicalExpr, NavigationBinding,
        NavigationExpansion, NavigationExpansionRoot, Parameter, PropertyAccess, SelectorState,
        SequenceOp,
        visitors::{
            apply_lambda, map_children, rename_lambda_parameter, rename_parameter, walk_expression,
            ExtensionNodeFinder,
        },
    },
    navigation::{CustomRootId, NavigationChannel, NavigationState, NodeId},
    plan_ctx::ExpansionCtx,
    transformed::Transformed,
};

pub use errors::ExpansionError;

mod binding;
pub mod errors;
mod include;
mod join_synthesis;
mod operators;
mod reduction;

pub use reduction::ExpansionReducing;

pub type ExpansionResult<T> = Result<T, ExpansionError>;

pub trait ExpansionPass {
    fn rewrite(
        &self,
        expr: Arc<LogicalExpr>,
        ctx: &mut ExpansionCtx,
    ) -> ExpansionResult<Transformed<Arc<LogicalExpr>>>;
}

/// First pass: introduce wrappers and bindings, synthesize joins.
pub struct NavigationExpanding;

impl ExpansionPass for NavigationExpanding {
    fn rewrite(
        &self,
        expr: Arc<LogicalExpr>,
        ctx: &mut ExpansionCtx,
    ) -> ExpansionResult<Transformed<Arc<LogicalExpr>>> {
        let mut finder = ExtensionNodeFinder::default();
        walk_expression(&expr, &mut finder);
        if let Some(node) = finder.found {
            return Err(ExpansionError::unsupported(
                "NavigationExpanding",
                format!(
                    "`{}` is internal to navigation expansion and cannot be part of a query",
                    node
                ),
            ));
        }

        let expanded = Expander::new(ctx).visit(&expr)?;
        if Arc::ptr_eq(&expanded, &expr) {
            Ok(Transformed::No(expanded))
        } else {
            Ok(Transformed::Yes(expanded))
        }
    }
}

/// Shared traversal state of both passes.
pub(crate) struct Expander<'c, 'm> {
    ctx: &'c mut ExpansionCtx<'m>,
}

impl<'c, 'm> Expander<'c, 'm> {
    pub(crate) fn new(ctx: &'c mut ExpansionCtx<'m>) -> Self {
        Expander { ctx }
    }

    pub(crate) fn visit(&mut self, expr: &Arc<LogicalExpr>) -> ExpansionResult<Arc<LogicalExpr>> {
        self.ctx.enter()?;
        let result = self.visit_node(expr);
        self.ctx.exit();
        result
    }

    fn visit_node(&mut self, expr: &Arc<LogicalExpr>) -> ExpansionResult<Arc<LogicalExpr>> {
        match expr.as_ref() {
            LogicalExpr::EntityRoot(root) => {
                Ok(self.expand_entity_root(&root.entity_type)?.into_expr())
            }
            LogicalExpr::Sequence(op) => self.visit_sequence(op),
            LogicalExpr::MaterializeCollection(marker) => {
                let mut source = self.visit_source(&marker.subquery)?;
                source.state.materialize_collection = Some(marker.navigation.clone());
                Ok(source.into_expr())
            }
            LogicalExpr::PropertyAccess(access) => {
                let target = self.visit(&access.expr)?;
                if let Some(expansion) = target.as_expansion() {
                    if expansion.state.pending_cardinality.is_some() {
                        return self.push_member_into_selector(expansion, &access.member);
                    }
                }
                if Arc::ptr_eq(&target, &access.expr) {
                    Ok(Arc::clone(expr))
                } else {
                    Ok(Arc::new(LogicalExpr::PropertyAccess(PropertyAccess {
                        expr: target,
                        member: access.member.clone(),
                        null_safe: access.null_safe,
                    })))
                }
            }
            LogicalExpr::NavigationExpansion(_)
            | LogicalExpr::NavigationExpansionRoot(_)
            | LogicalExpr::NavigationBinding(_)
            | LogicalExpr::CustomRoot(_) => Ok(Arc::clone(expr)),
            _ => Ok(map_children(expr, |child| self.visit(child))?.get_expr()),
        }
    }

    /// Visit a sequence-valued expression and hand back its wrapper. Sources
    /// without an entity root get a custom-root wrapper.
    pub(super) fn visit_source(
        &mut self,
        expr: &Arc<LogicalExpr>,
    ) -> ExpansionResult<NavigationExpansion> {
        let visited = self.visit(expr)?;
        match visited.as_ref() {
            LogicalExpr::NavigationExpansion(expansion) => Ok(NavigationExpansion::clone(expansion)),
            LogicalExpr::NavigationExpansionRoot(root) => Ok(NavigationExpansion::clone(&root.unwrap())),
            _ => {
                let parameter = self.ctx.fresh_parameter("t");
                let custom_root = self.ctx.add_custom_root(Vec::new());
                Ok(NavigationExpansion::new(
                    visited,
                    ExpansionState::for_custom_root(parameter, custom_root),
                ))
            }
        }
    }

    /// Wrap a fresh root of `entity_type`, applying its query filter the
    /// first time the type is seen in this compilation.
    pub(super) fn expand_entity_root(
        &mut self,
        entity_type: &str,
    ) -> ExpansionResult<NavigationExpansion> {
        let entity = self.ctx.model().entity(entity_type)?;
        let (source_mapping, root) = self.ctx.add_source_mapping(entity_type, Vec::new(), false)?;
        let parameter = self.ctx.fresh_parameter(entity_type);
        let binding = Arc::new(LogicalExpr::NavigationBinding(NavigationBinding {
            root_parameter: parameter.clone(),
            node: root,
            entity_type: entity_type.to_string(),
            source_mapping,
        }));
        let state = ExpansionState::new(
            parameter.clone(),
            vec![source_mapping],
            Lambda::unary(parameter, binding),
        );
        let expansion = NavigationExpansion::new(LogicalExpr::entity_root(entity_type), state);

        match &entity.query_filter {
            Some(filter) if self.ctx.claim_query_filter(entity_type) => {
                self.apply_query_filter(expansion, entity_type, filter)
            }
            _ => Ok(expansion),
        }
    }

    fn apply_query_filter(
        &mut self,
        mut expansion: NavigationExpansion,
        entity_type: &str,
        filter: &Lambda,
    ) -> ExpansionResult<NavigationExpansion> {
        let parameter = self.ctx.fresh_parameter(entity_type);
        let predicate = match filter.params.first() {
            Some(declared) => rename_lambda_parameter(filter, declared, &parameter),
            None => {
                return Err(ExpansionError::unsupported(
                    "QueryFilter",
                    format!("filter of `{}` declares no parameter", entity_type),
                ));
            }
        };
        log::debug!("Applying query filter of {}: {}", entity_type, predicate);

        // The filter applies to the raw rows, not to a materialized collection
        let materialize = expansion.state.materialize_collection.take();
        let filtered = LogicalExpr::sequence(SequenceOp::Where(Filter {
            source: expansion.into_expr(),
            predicate,
        }));
        let mut filtered = self.visit_source(&filtered)?;
        filtered.state.materialize_collection = materialize;
        self.ctx.stats.query_filters_applied += 1;
        Ok(filtered)
    }

    /// Rewrite a row lambda against `source`: its parameter is replaced by the
    /// pending selector, navigations are bound and joined. The returned body
    /// is expressed over the (possibly new) current parameter and may still
    /// contain bindings.
    pub(super) fn expand_lambda(
        &mut self,
        source: &mut NavigationExpansion,
        lambda: &Lambda,
    ) -> ExpansionResult<Arc<LogicalExpr>> {
        let previous = source.state.current_parameter.clone();
        let body = apply_lambda(lambda, &[Arc::clone(&source.state.pending_selector.body)]);
        let body = self.bind(&body, NavigationChannel::Expansion)?;
        let body = self.visit(&body)?;
        self.expand_pending_navigations(source)?;

        let current = &source.state.current_parameter;
        if *current == previous {
            Ok(body)
        } else {
            Ok(rename_parameter(&body, &previous, current))
        }
    }

    /// Join every reference navigation that is still pending under any of
    /// the source's trees.
    fn expand_pending_navigations(
        &mut self,
        source: &mut NavigationExpansion,
    ) -> ExpansionResult<()> {
        while let Some(node) = self.next_pending(source)? {
            self.join_navigation(source, node, NavigationChannel::Expansion)?;
        }
        Ok(())
    }

    fn next_pending(&self, source: &NavigationExpansion) -> ExpansionResult<Option<NodeId>> {
        let tree = self.ctx.tree();
        for source_mapping in &source.state.source_mappings {
            let mut stack = vec![self.ctx.source_root(*source_mapping)?];
            while let Some(id) = stack.pop() {
                let node = tree.node(id);
                if node.expansion_state == NavigationState::Pending {
                    return Ok(Some(id));
                }
                // Children of collections belong to their correlated subquery
                if !node.is_collection {
                    stack.extend(node.children.iter().rev().copied());
                }
            }
        }
        Ok(None)
    }

    /// `Customers.First().Address`: fold the member into the pending selector
    /// of a wrapper whose cardinality operator has not been emitted yet.
    fn push_member_into_selector(
        &mut self,
        expansion: &Arc<NavigationExpansion>,
        member: &str,
    ) -> ExpansionResult<Arc<LogicalExpr>> {
        let root = NavigationExpansionRoot {
            expansion: Arc::clone(expansion),
            mapping: vec![member.to_string()],
        };
        let mut source = NavigationExpansion::clone(&root.unwrap());
        let identity = Lambda::identity(source.state.current_parameter.clone());
        let body = self.expand_lambda(&mut source, &identity)?;
        source.state.pending_selector =
            Lambda::unary(source.state.current_parameter.clone(), body);
        source.state.selector = SelectorState::Pending;
        Ok(source.into_expr())
    }

    /// Point every row-relative expression of `state` at `new` instead of `old`.
    pub(super) fn rebase_parameter(
        state: &mut ExpansionState,
        old: &Parameter,
        new: &Parameter,
    ) {
        state.pending_selector = rename_lambda_parameter(&state.pending_selector, old, new);
        for ordering in &mut state.pending_orderings {
            ordering.key_selector = rename_lambda_parameter(&ordering.key_selector, old, new);
        }
        if let Some(chain) = state.pending_include_chain.as_mut() {
            if &chain.root_parameter == old {
                chain.root_parameter = new.clone();
            }
        }
        state.current_parameter = new.clone();
    }

    pub(super) fn custom_root_expr(
        parameter: &Parameter,
        mapping: CustomRootId,
    ) -> Arc<LogicalExpr> {
        Arc::new(LogicalExpr::CustomRoot(CustomRoot {
            root_parameter: parameter.clone(),
            mapping,
        }))
    }
}
