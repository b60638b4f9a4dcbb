//! Join synthesis for reference navigations.
//!
//! Joining a node turns the row of the source into `<Outer = row, Inner =
//! target>`. Every mapping recorded before the join is relocated under
//! `Outer`, the target's own tree under `Inner`, and the target tree is
//! spliced into the joined node so later accesses find it.

use std::sync::Arc;

use super::{Expander, ExpansionError, ExpansionResult};
use crate::model::{EntityModel, Navigation, ScalarType};
use crate::query_planner::{
    logical_expr::{
        Convert, JoinKind, JoinOp, Lambda, LogicalExpr, NavigationExpansion, Parameter,
        SelectorState, SequenceOp, TransparentPair,
    },
    navigation::{NavigationChannel, NavigationState, NavigationTreeError, NodeId},
};

/// One key property read from either side of a join.
pub(super) struct KeyPart {
    expr: Arc<LogicalExpr>,
    data_type: ScalarType,
    nullable: bool,
}

impl KeyPart {
    /// `base.property`; null-safe when `base` itself may be null.
    pub(super) fn member(
        model: &EntityModel,
        entity: &str,
        property: &str,
        base: &Arc<LogicalExpr>,
        null_safe: bool,
    ) -> ExpansionResult<Self> {
        let definition = model.property(entity, property)?;
        let expr = if null_safe {
            LogicalExpr::null_safe_member(Arc::clone(base), property)
        } else {
            LogicalExpr::member(Arc::clone(base), property)
        };
        Ok(KeyPart {
            expr,
            data_type: definition.data_type,
            nullable: definition.nullable || null_safe,
        })
    }

    fn as_nullable(self) -> Arc<LogicalExpr> {
        Arc::new(LogicalExpr::Convert(Convert {
            operand: self.expr,
            target: self.data_type,
            nullable: true,
        }))
    }

    /// Outer and inner key bodies with matching nullability. Composite keys
    /// become `new { Item1 = .., Item2 = .. }` on both sides.
    pub(super) fn selectors(
        navigation: &Navigation,
        outer: Vec<KeyPart>,
        inner: Vec<KeyPart>,
    ) -> ExpansionResult<(Arc<LogicalExpr>, Arc<LogicalExpr>)> {
        let mut outer_keys = Vec::with_capacity(outer.len());
        let mut inner_keys = Vec::with_capacity(inner.len());

        for (outer, inner) in outer.into_iter().zip(inner) {
            if outer.data_type != inner.data_type {
                return Err(ExpansionError::KeyTypeMismatch {
                    navigation: navigation.reference().to_string(),
                    outer: outer.data_type,
                    inner: inner.data_type,
                });
            }
            let (outer_key, inner_key) = match (outer.nullable, inner.nullable) {
                (true, false) => (outer.expr, inner.as_nullable()),
                (false, true) => (outer.as_nullable(), inner.expr),
                _ => (outer.expr, inner.expr),
            };
            outer_keys.push(outer_key);
            inner_keys.push(inner_key);
        }

        Ok((composite(outer_keys), composite(inner_keys)))
    }
}

fn composite(mut keys: Vec<Arc<LogicalExpr>>) -> Arc<LogicalExpr> {
    if keys.len() == 1 {
        if let Some(key) = keys.pop() {
            return key;
        }
    }
    LogicalExpr::new_object(
        keys.into_iter()
            .enumerate()
            .map(|(i, key)| (format!("Item{}", i + 1), key))
            .collect(),
    )
}

impl Expander<'_, '_> {
    /// Join `node` into `source` for `channel`, then recurse into its
    /// reference children that need the same channel.
    pub(super) fn join_navigation(
        &mut self,
        source: &mut NavigationExpansion,
        node: NodeId,
        channel: NavigationChannel,
    ) -> ExpansionResult<()> {
        let tree_node = self.ctx.tree().node(node).clone();
        let reference = tree_node
            .navigation
            .clone()
            .ok_or(NavigationTreeError::RootNavigation(node))?;
        let state = tree_node.state(channel);

        if tree_node.is_collection || state == NavigationState::NotNeeded {
            return Ok(());
        }
        if tree_node.is_joined() {
            if state != NavigationState::Complete {
                self.ctx.tree.mark_complete(node, channel)?;
            }
            return self.join_children(source, node, channel);
        }
        if tree_node.is_owned {
            if state == NavigationState::Pending {
                return Err(NavigationTreeError::OwnedJoin {
                    navigation: reference.to_string(),
                }
                .into());
            }
            // Owned targets stay embedded in the declaring row
            return self.join_children(source, node, channel);
        }

        let model = self.ctx.model();
        let navigation = model.navigation_by_ref(&reference)?;
        let parent_id = tree_node
            .parent
            .ok_or(NavigationTreeError::RootNavigation(node))?;
        let parent = self.ctx.tree().node(parent_id).clone();

        let fresh = self.expand_entity_root(&navigation.target_entity)?;
        let fresh_root = match fresh.state.source_mappings.first() {
            Some(source_mapping) => self.ctx.source_root(*source_mapping)?,
            None => return Err(NavigationTreeError::RootNavigation(node).into()),
        };

        let outer_parameter = source.state.current_parameter.clone();
        let outer_row = LogicalExpr::member_path(
            LogicalExpr::parameter(&outer_parameter),
            &parent.to_mapping,
        );
        let outer_keys = navigation
            .outer_key_properties()
            .iter()
            .map(|property| {
                KeyPart::member(
                    model,
                    &navigation.declaring_entity,
                    property,
                    &outer_row,
                    parent.optional,
                )
            })
            .collect::<ExpansionResult<Vec<_>>>()?;

        let inner_parameter = fresh.state.current_parameter.clone();
        let inner_row = self
            .ctx
            .unbind(&fresh.state.pending_selector.body, Some(&inner_parameter));
        let inner_keys = navigation
            .inner_key_properties()
            .iter()
            .map(|property| {
                KeyPart::member(model, &navigation.target_entity, property, &inner_row, false)
            })
            .collect::<ExpansionResult<Vec<_>>>()?;

        let (outer_key, inner_key) = KeyPart::selectors(navigation, outer_keys, inner_keys)?;
        let kind = if tree_node.optional {
            JoinKind::LeftOuter
        } else {
            JoinKind::Inner
        };

        source.operand = LogicalExpr::sequence(SequenceOp::Join(JoinOp {
            kind,
            outer: Arc::clone(&source.operand),
            inner: Arc::clone(&fresh.operand),
            outer_key: Lambda::unary(outer_parameter.clone(), outer_key),
            inner_key: Lambda::unary(inner_parameter.clone(), inner_key),
            result_selector: pair_selector(&outer_parameter, &inner_parameter),
        }));

        // Relocate everything placed so far, then adopt the target's tree
        let mut relocated = Vec::new();
        for source_mapping in &source.state.source_mappings {
            let root = self.ctx.source_root(*source_mapping)?;
            relocated.extend(
                self.ctx
                    .tree()
                    .flatten(root)
                    .into_iter()
                    .filter(|id| *id != node),
            );
        }
        self.ctx
            .tree
            .prefix_to_mappings(&relocated, TransparentPair::OUTER);
        self.ctx
            .prefix_custom_roots(&source.state.custom_root_mappings, TransparentPair::OUTER);
        let inner_nodes = self.ctx.tree().flatten(fresh_root);
        self.ctx
            .tree
            .prefix_to_mappings(&inner_nodes, TransparentPair::INNER);

        let joined_mapping = self.ctx.tree().node(fresh_root).to_mapping.clone();
        self.ctx.tree.set_to_mapping(node, joined_mapping);
        self.ctx.tree.splice(fresh_root, node);
        self.ctx.tree.refresh_embedded_mappings(node);
        self.ctx.tree.mark_complete(node, channel)?;

        let pair_parameter = self.ctx.fresh_parameter("ti");
        Self::rebase_parameter(&mut source.state, &outer_parameter, &pair_parameter);
        source.state.selector = SelectorState::Pending;

        match kind {
            JoinKind::Inner => self.ctx.stats.inner_joins += 1,
            JoinKind::LeftOuter => self.ctx.stats.left_joins += 1,
        }
        log::debug!(
            "Joined {} ({:?}, {}) at {}",
            reference,
            kind,
            channel,
            self.ctx.tree().node(node).to_mapping.join(".")
        );

        self.join_children(source, node, channel)
    }

    fn join_children(
        &mut self,
        source: &mut NavigationExpansion,
        node: NodeId,
        channel: NavigationChannel,
    ) -> ExpansionResult<()> {
        let children = self.ctx.tree().node(node).children.clone();
        for child in children {
            let child_node = self.ctx.tree().node(child);
            if !child_node.is_collection && child_node.state(channel).is_needed() {
                self.join_navigation(source, child, channel)?;
            }
        }
        Ok(())
    }
}

/// `(o, i) => <Outer = o, Inner = i>`
pub(super) fn pair_selector(outer: &Parameter, inner: &Parameter) -> Lambda {
    Lambda::new(
        vec![outer.clone(), inner.clone()],
        LogicalExpr::pair(LogicalExpr::parameter(outer), LogicalExpr::parameter(inner)),
    )
}
