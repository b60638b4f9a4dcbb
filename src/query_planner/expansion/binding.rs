//! Binding navigation member accesses to tree nodes, and resolving bindings
//! back to member paths over the current row.

use std::sync::Arc;

use super::{join_synthesis::KeyPart, Expander, ExpansionResult};
use crate::model::Navigation;
use crate::query_planner::{
    logical_expr::{
        visitors::{map_children, transform_children},
        CorrelationPredicate, Filter, Lambda, LogicalExpr, MaterializeCollection,
        NavigationBinding, Operator, Parameter, PropertyAccess, SequenceOp,
    },
    navigation::NavigationChannel,
    plan_ctx::ExpansionCtx,
};

impl Expander<'_, '_> {
    /// Replace member accesses that dereference a navigation with bindings to
    /// the matching tree node, creating the node on first use. Accesses into
    /// anonymous objects and pairs collapse to the member expression.
    pub(super) fn bind(
        &mut self,
        expr: &Arc<LogicalExpr>,
        channel: NavigationChannel,
    ) -> ExpansionResult<Arc<LogicalExpr>> {
        match expr.as_ref() {
            LogicalExpr::PropertyAccess(access) => {
                let target = self.bind(&access.expr, channel)?;
                match target.as_ref() {
                    LogicalExpr::New(object) => {
                        if let Some(member) = object.member(&access.member) {
                            return Ok(Arc::clone(member));
                        }
                    }
                    LogicalExpr::Pair(pair) => {
                        if let Some(slot) = pair.slot(&access.member) {
                            return Ok(Arc::clone(slot));
                        }
                    }
                    LogicalExpr::NavigationBinding(binding) => {
                        let model = self.ctx.model();
                        if let Some(navigation) =
                            model.navigation(&binding.entity_type, &access.member)
                        {
                            return self.bind_navigation(binding, navigation, channel);
                        }
                    }
                    _ => {}
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
            // Nested wrappers were bound when they were expanded
            LogicalExpr::NavigationExpansion(_) | LogicalExpr::NavigationExpansionRoot(_) => {
                Ok(Arc::clone(expr))
            }
            _ => Ok(map_children(expr, |child| self.bind(child, channel))?.get_expr()),
        }
    }

    fn bind_navigation(
        &mut self,
        parent: &NavigationBinding,
        navigation: &Navigation,
        channel: NavigationChannel,
    ) -> ExpansionResult<Arc<LogicalExpr>> {
        let node = self.ctx.tree.create(navigation, parent.node, channel)?;
        log::trace!(
            "Bound {} to node {} ({})",
            navigation.reference(),
            node,
            channel
        );

        if navigation.is_collection && channel == NavigationChannel::Expansion {
            return self.correlated_collection(parent, navigation);
        }

        Ok(Arc::new(LogicalExpr::NavigationBinding(NavigationBinding {
            root_parameter: parent.root_parameter.clone(),
            node,
            entity_type: navigation.target_entity.clone(),
            source_mapping: parent.source_mapping,
        })))
    }

    /// `MaterializeCollection(Where(Target, i => Correlation(outer key, inner key)))`
    /// for a collection navigation reached from `parent`.
    pub(super) fn correlated_collection(
        &mut self,
        parent: &NavigationBinding,
        navigation: &Navigation,
    ) -> ExpansionResult<Arc<LogicalExpr>> {
        let model = self.ctx.model();
        let parent_optional = self.ctx.tree().node(parent.node).optional;
        let parent_expr = Arc::new(LogicalExpr::NavigationBinding(parent.clone()));
        let outer = navigation
            .outer_key_properties()
            .iter()
            .map(|property| {
                KeyPart::member(
                    model,
                    &navigation.declaring_entity,
                    property,
                    &parent_expr,
                    parent_optional,
                )
            })
            .collect::<ExpansionResult<Vec<_>>>()?;

        let parameter = self.ctx.fresh_parameter(&navigation.target_entity);
        let inner_row = LogicalExpr::parameter(&parameter);
        let inner = navigation
            .inner_key_properties()
            .iter()
            .map(|property| {
                KeyPart::member(model, &navigation.target_entity, property, &inner_row, false)
            })
            .collect::<ExpansionResult<Vec<_>>>()?;

        let (outer_key, inner_key) = KeyPart::selectors(navigation, outer, inner)?;
        let correlation = Arc::new(LogicalExpr::CorrelationPredicate(CorrelationPredicate {
            null_check: LogicalExpr::binary(
                Operator::NotEqual,
                Arc::clone(&outer_key),
                LogicalExpr::null(),
            ),
            equality: LogicalExpr::equal(outer_key, inner_key),
        }));

        let subquery = LogicalExpr::sequence(SequenceOp::Where(Filter {
            source: LogicalExpr::entity_root(&navigation.target_entity),
            predicate: Lambda::unary(parameter, correlation),
        }));
        self.ctx.stats.correlated_subqueries += 1;
        log::debug!(
            "Collection navigation {} becomes a correlated subquery",
            navigation.reference()
        );

        Ok(Arc::new(LogicalExpr::MaterializeCollection(
            MaterializeCollection {
                subquery,
                navigation: navigation.reference(),
            },
        )))
    }
}

impl ExpansionCtx<'_> {
    /// Resolve bindings and custom roots to member paths. With a `scope`,
    /// only those anchored at that parameter are resolved; the rest stay bound.
    pub(crate) fn unbind(
        &self,
        expr: &Arc<LogicalExpr>,
        scope: Option<&Parameter>,
    ) -> Arc<LogicalExpr> {
        let in_scope = |parameter: &Parameter| scope.is_none_or(|s| s == parameter);
        match expr.as_ref() {
            LogicalExpr::NavigationBinding(binding) if in_scope(&binding.root_parameter) => {
                LogicalExpr::member_path(
                    LogicalExpr::parameter(&binding.root_parameter),
                    &self.tree().node(binding.node).to_mapping,
                )
            }
            LogicalExpr::CustomRoot(root) if in_scope(&root.root_parameter) => {
                LogicalExpr::member_path(
                    LogicalExpr::parameter(&root.root_parameter),
                    self.custom_root_path(root.mapping),
                )
            }
            _ => transform_children(expr, |child| self.unbind(child, scope)),
        }
    }
}
