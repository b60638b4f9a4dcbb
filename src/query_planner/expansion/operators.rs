//! Expansion of individual sequence operators.
//!
//! Filters, keys and aggregate lambdas are consumed immediately and resolved
//! against the current row. Projections and orderings stay pending on the
//! wrapper until an operator needs the row shape fixed (grouping, paging,
//! distinct, set operations) or until reduction.

use std::sync::Arc;

use super::{join_synthesis::pair_selector, Expander, ExpansionError, ExpansionResult};
use crate::query_planner::{
    logical_expr::{
        AggregateFunction, AggregateOp, CardinalityOp, ExpansionState, Filter, GroupBy,
        GroupJoinOp, JoinKind, JoinOp, Lambda, LogicalExpr, NavigationBinding, NavigationExpansion, OfType, Ordering,
        Paging, Parameter, PendingOrdering, Projection, SelectMany, SelectorState, SequenceOp,
        SetOperation, TransparentPair, UnarySequence,
        visitors::{apply_lambda, rename_parameter},
    },
    navigation::{CustomRootId, SourceMappingId},
};

impl Expander<'_, '_> {
    pub(super) fn visit_sequence(&mut self, op: &SequenceOp) -> ExpansionResult<Arc<LogicalExpr>> {
        match op {
            SequenceOp::Where(filter) => {
                let source = self.visit_source(&filter.source)?;
                Ok(self.process_where(source, &filter.predicate)?.into_expr())
            }
            SequenceOp::Select(projection) => {
                let mut source = self.visit_source(&projection.source)?;
                let body = self.expand_lambda(&mut source, &projection.selector)?;
                source.state.pending_selector =
                    Lambda::unary(source.state.current_parameter.clone(), body);
                source.state.selector = SelectorState::Pending;
                Ok(source.into_expr())
            }
            SequenceOp::SelectMany(select_many) => self.process_select_many(select_many),
            SequenceOp::Join(join) => self.process_join(join),
            SequenceOp::GroupJoin(group_join) => self.process_group_join(group_join),
            SequenceOp::OrderBy(ordering) => self.process_ordering(ordering),
            SequenceOp::GroupBy(group_by) => self.process_group_by(group_by),
            SequenceOp::Skip(paging) | SequenceOp::Take(paging) => {
                let source = self.visit_source(&paging.source)?;
                let mut source = self.preprocess_terminating(source)?;
                let count = self.visit(&paging.count)?;
                let paged = Paging {
                    source: Arc::clone(&source.operand),
                    count,
                };
                source.operand = LogicalExpr::sequence(match op {
                    SequenceOp::Skip(_) => SequenceOp::Skip(paged),
                    _ => SequenceOp::Take(paged),
                });
                Ok(source.into_expr())
            }
            SequenceOp::Distinct(distinct) => {
                let source = self.visit_source(&distinct.source)?;
                let mut source = self.preprocess_terminating(source)?;
                source.operand = LogicalExpr::sequence(SequenceOp::Distinct(UnarySequence {
                    source: Arc::clone(&source.operand),
                }));
                Ok(source.into_expr())
            }
            SequenceOp::OfType(of_type) => {
                let source = self.visit_source(&of_type.source)?;
                let mut source = self.preprocess_terminating(source)?;
                source.operand = LogicalExpr::sequence(SequenceOp::OfType(OfType {
                    source: Arc::clone(&source.operand),
                    entity_type: of_type.entity_type.clone(),
                }));
                Ok(source.into_expr())
            }
            SequenceOp::DefaultIfEmpty(default_if_empty) => {
                let mut source = self.visit_source(&default_if_empty.source)?;
                source.operand = LogicalExpr::sequence(SequenceOp::DefaultIfEmpty(UnarySequence {
                    source: Arc::clone(&source.operand),
                }));
                self.make_sources_optional(&source.state.source_mappings)?;
                Ok(source.into_expr())
            }
            SequenceOp::Cardinality(cardinality) => self.process_cardinality(cardinality),
            SequenceOp::Aggregate(aggregate) => self.process_aggregate(aggregate),
            SequenceOp::SetOperation(set_operation) => self.process_set_operation(set_operation),
            SequenceOp::Include(include) => self.process_include(include),
            SequenceOp::TagWith(tag) => {
                let mut source = self.visit_source(&tag.source)?;
                source.state.add_tag(&tag.tag);
                Ok(source.into_expr())
            }
        }
    }

    pub(super) fn process_where(
        &mut self,
        mut source: NavigationExpansion,
        predicate: &Lambda,
    ) -> ExpansionResult<NavigationExpansion> {
        let body = self.expand_lambda(&mut source, predicate)?;
        let predicate = self.resolved_lambda(&source, &body);
        source.operand = LogicalExpr::sequence(SequenceOp::Where(Filter {
            source: Arc::clone(&source.operand),
            predicate,
        }));
        Ok(source)
    }

    /// `current => body` with every binding of the current row resolved.
    fn resolved_lambda(&self, source: &NavigationExpansion, body: &Arc<LogicalExpr>) -> Lambda {
        let parameter = &source.state.current_parameter;
        Lambda::unary(parameter.clone(), self.ctx.unbind(body, Some(parameter)))
    }

    fn process_ordering(&mut self, ordering: &Ordering) -> ExpansionResult<Arc<LogicalExpr>> {
        let mut source = self.visit_source(&ordering.source)?;
        if ordering.kind.is_secondary() {
            if source.state.pending_orderings.is_empty() {
                return Err(ExpansionError::unsupported(
                    format!("{:?}", ordering.kind),
                    "no preceding OrderBy on this source",
                ));
            }
        } else {
            self.apply_pending_orderings(&mut source);
        }

        let body = self.expand_lambda(&mut source, &ordering.key_selector)?;
        source.state.pending_orderings.push(PendingOrdering {
            kind: ordering.kind,
            key_selector: Lambda::unary(source.state.current_parameter.clone(), body),
        });
        Ok(source.into_expr())
    }

    /// Emit queued orderings onto the operand in declaration order.
    pub(super) fn apply_pending_orderings(&self, source: &mut NavigationExpansion) {
        let orderings = std::mem::take(&mut source.state.pending_orderings);
        for ordering in orderings {
            let key_selector = self.resolved_lambda(source, &ordering.key_selector.body);
            source.operand = LogicalExpr::sequence(SequenceOp::OrderBy(Ordering {
                source: Arc::clone(&source.operand),
                key_selector,
                kind: ordering.kind,
            }));
        }
    }

    /// Fix the row shape: flush orderings, apply a pending projection and
    /// re-root the wrapper on the projected rows. Entities inside the
    /// projection get fresh source mappings that keep their include requests.
    pub(super) fn preprocess_terminating(
        &mut self,
        mut source: NavigationExpansion,
    ) -> ExpansionResult<NavigationExpansion> {
        self.apply_pending_orderings(&mut source);
        source.state.pending_include_chain = None;
        if source.state.selector == SelectorState::NotNeeded {
            return Ok(source);
        }

        let selector = self.resolved_lambda(&source, &source.state.pending_selector.body);
        let operand = LogicalExpr::sequence(SequenceOp::Select(Projection {
            source: Arc::clone(&source.operand),
            selector,
        }));

        let hint = match source.state.pending_selector.body.as_ref() {
            LogicalExpr::NavigationBinding(binding) => binding.entity_type.clone(),
            _ => "t".to_string(),
        };
        let parameter = self.ctx.fresh_parameter(&hint);
        let mut source_mappings = Vec::new();
        let mut custom_roots = Vec::new();
        let body = self.snapshot(
            &source.state.pending_selector.body,
            &parameter,
            Vec::new(),
            &mut source_mappings,
            &mut custom_roots,
        )?;

        let mut state = ExpansionState::new(
            parameter.clone(),
            source_mappings,
            Lambda::unary(parameter, body),
        );
        state.custom_root_mappings = custom_roots;
        state.pending_tags = source.state.pending_tags;
        state.pending_cardinality = source.state.pending_cardinality;
        state.materialize_collection = source.state.materialize_collection;
        Ok(NavigationExpansion::new(operand, state))
    }

    /// Mirror the structure of a projection over `parameter`: entities become
    /// bindings to new roots at their position, everything else a custom root.
    fn snapshot(
        &mut self,
        expr: &Arc<LogicalExpr>,
        parameter: &Parameter,
        path: Vec<String>,
        source_mappings: &mut Vec<SourceMappingId>,
        custom_roots: &mut Vec<CustomRootId>,
    ) -> ExpansionResult<Arc<LogicalExpr>> {
        match expr.as_ref() {
            LogicalExpr::NavigationBinding(binding) => {
                let optional = self.ctx.tree().node(binding.node).optional;
                let (source_mapping, root) =
                    self.ctx
                        .add_source_mapping(&binding.entity_type, path, optional)?;
                self.ctx.tree.copy_include_information(binding.node, root)?;
                source_mappings.push(source_mapping);
                Ok(Arc::new(LogicalExpr::NavigationBinding(NavigationBinding {
                    root_parameter: parameter.clone(),
                    node: root,
                    entity_type: binding.entity_type.clone(),
                    source_mapping,
                })))
            }
            LogicalExpr::New(object) => {
                let mut members = Vec::with_capacity(object.members.len());
                for member in &object.members {
                    let mut member_path = path.clone();
                    member_path.push(member.name.clone());
                    let snapshot = self.snapshot(
                        &member.expr,
                        parameter,
                        member_path,
                        source_mappings,
                        custom_roots,
                    )?;
                    members.push((member.name.clone(), snapshot));
                }
                Ok(LogicalExpr::new_object(members))
            }
            LogicalExpr::Pair(pair) => {
                let mut outer_path = path.clone();
                outer_path.push(TransparentPair::OUTER.to_string());
                let mut inner_path = path;
                inner_path.push(TransparentPair::INNER.to_string());
                let outer =
                    self.snapshot(&pair.outer, parameter, outer_path, source_mappings, custom_roots)?;
                let inner =
                    self.snapshot(&pair.inner, parameter, inner_path, source_mappings, custom_roots)?;
                Ok(LogicalExpr::pair(outer, inner))
            }
            _ => {
                let custom_root = self.ctx.add_custom_root(path);
                custom_roots.push(custom_root);
                Ok(Self::custom_root_expr(parameter, custom_root))
            }
        }
    }

    fn make_sources_optional(&mut self, source_mappings: &[SourceMappingId]) -> ExpansionResult<()> {
        for source_mapping in source_mappings {
            let root = self.ctx.source_root(*source_mapping)?;
            self.ctx.tree.make_optional(root);
        }
        Ok(())
    }

    fn process_group_by(&mut self, group_by: &GroupBy) -> ExpansionResult<Arc<LogicalExpr>> {
        let source = self.visit_source(&group_by.source)?;
        let mut source = self.preprocess_terminating(source)?;

        let key = self.expand_lambda(&mut source, &group_by.key_selector)?;
        let key_parameter = source.state.current_parameter.clone();
        let element = match &group_by.element_selector {
            Some(selector) => Some(self.expand_lambda(&mut source, selector)?),
            // Joins made for the key widened the row; groups still hold the source rows
            None if source.state.selector == SelectorState::Pending => {
                Some(Arc::clone(&source.state.pending_selector.body))
            }
            None => None,
        };
        // The element selector may have joined further navigations
        let key = rename_parameter(&key, &key_parameter, &source.state.current_parameter);

        let operand = LogicalExpr::sequence(SequenceOp::GroupBy(GroupBy {
            source: Arc::clone(&source.operand),
            key_selector: self.resolved_lambda(&source, &key),
            element_selector: element.map(|body| self.resolved_lambda(&source, &body)),
        }));

        let parameter = self.ctx.fresh_parameter("g");
        let custom_root = self.ctx.add_custom_root(Vec::new());
        let mut state = ExpansionState::for_custom_root(parameter, custom_root);
        state.pending_tags = source.state.pending_tags;
        Ok(NavigationExpansion::new(operand, state).into_expr())
    }

    fn process_cardinality(
        &mut self,
        cardinality: &CardinalityOp,
    ) -> ExpansionResult<Arc<LogicalExpr>> {
        let mut source = self.visit_source(&cardinality.source)?;
        if let Some(predicate) = &cardinality.predicate {
            source = self.process_where(source, predicate)?;
        }
        if let Some(existing) = source.state.pending_cardinality {
            return Err(ExpansionError::unsupported(
                cardinality.operator.to_string(),
                format!("source already ends in {}", existing),
            ));
        }
        source.state.materialize_collection = None;
        source.state.pending_cardinality = Some(cardinality.operator);
        Ok(source.into_expr())
    }

    fn process_aggregate(&mut self, aggregate: &AggregateOp) -> ExpansionResult<Arc<LogicalExpr>> {
        let mut source = self.visit_source(&aggregate.source)?;
        // Ordering never changes an aggregate
        source.state.pending_orderings.clear();

        let lambda = match (&aggregate.lambda, aggregate.function) {
            (
                Some(predicate),
                AggregateFunction::Any | AggregateFunction::Count | AggregateFunction::LongCount,
            ) => {
                source = self.process_where(source, predicate)?;
                None
            }
            (Some(lambda), _) => {
                let body = self.expand_lambda(&mut source, lambda)?;
                Some(self.resolved_lambda(&source, &body))
            }
            (None, _) => None,
        };

        // The aggregate reads the operand rows directly unless it folds the
        // projected values themselves, e.g. `Select(o => o.Total).Sum()`
        if aggregate.function.takes_predicate() || lambda.is_some() {
            source.state.selector = SelectorState::NotNeeded;
        }
        let mut dropped = 0;
        for source_mapping in &source.state.source_mappings {
            let root = self.ctx.source_root(*source_mapping)?;
            dropped += self.ctx.tree.drop_pending_includes(root);
        }
        if dropped > 0 {
            log::warn!(
                "Ignoring {} include(s): {} does not return entities",
                dropped,
                aggregate.function
            );
        }
        source.state.pending_include_chain = None;
        source.state.materialize_collection = None;

        Ok(LogicalExpr::sequence(SequenceOp::Aggregate(AggregateOp {
            source: source.into_expr(),
            function: aggregate.function,
            lambda,
        })))
    }

    fn process_set_operation(
        &mut self,
        set_operation: &SetOperation,
    ) -> ExpansionResult<Arc<LogicalExpr>> {
        let left = self.visit_source(&set_operation.left)?;
        let mut left = self.preprocess_terminating(left)?;
        let right = self.visit_source(&set_operation.right)?;
        let right = self.preprocess_terminating(right)?;

        if self.include_signature(&left)? != self.include_signature(&right)? {
            return Err(ExpansionError::unsupported(
                format!("{:?}", set_operation.kind),
                "both sides must include the same navigations",
            ));
        }

        left.operand = LogicalExpr::sequence(SequenceOp::SetOperation(SetOperation {
            kind: set_operation.kind,
            left: Arc::clone(&left.operand),
            right: Arc::clone(&right.operand),
        }));
        for tag in &right.state.pending_tags {
            left.state.add_tag(tag);
        }
        Ok(left.into_expr())
    }

    fn process_join(&mut self, join: &JoinOp) -> ExpansionResult<Arc<LogicalExpr>> {
        let mut outer = self.visit_source(&join.outer)?;
        self.apply_pending_orderings(&mut outer);
        let mut inner = self.visit_source(&join.inner)?;
        self.apply_pending_orderings(&mut inner);
        if let Some(cardinality) = inner.state.pending_cardinality {
            return Err(ExpansionError::unsupported(
                "Join",
                format!("inner source ends in {}", cardinality),
            ));
        }

        let outer_key = self.expand_lambda(&mut outer, &join.outer_key)?;
        let outer_key = self.resolved_lambda(&outer, &outer_key);
        let inner_key = self.expand_lambda(&mut inner, &join.inner_key)?;
        let inner_key = self.resolved_lambda(&inner, &inner_key);

        if join.kind == JoinKind::LeftOuter {
            self.make_sources_optional(&inner.state.source_mappings)?;
        }

        let kind = join.kind;
        let combined = self.combine_sources(
            outer,
            inner,
            &join.result_selector,
            |outer_operand, inner_operand, result_selector| {
                SequenceOp::Join(JoinOp {
                    kind,
                    outer: outer_operand,
                    inner: inner_operand,
                    outer_key,
                    inner_key,
                    result_selector,
                })
            },
        )?;
        Ok(combined.into_expr())
    }

    /// Pair every outer row with its group of inner rows. Only the outer side
    /// stays navigable through the pair; the group becomes a query over the
    /// inner rows that the result selector can compose on.
    fn process_group_join(
        &mut self,
        group_join: &GroupJoinOp,
    ) -> ExpansionResult<Arc<LogicalExpr>> {
        let mut outer = self.visit_source(&group_join.outer)?;
        self.apply_pending_orderings(&mut outer);
        let mut inner = self.visit_source(&group_join.inner)?;
        self.apply_pending_orderings(&mut inner);
        if let Some(cardinality) = inner.state.pending_cardinality {
            return Err(ExpansionError::unsupported(
                "GroupJoin",
                format!("inner source ends in {}", cardinality),
            ));
        }

        let outer_key = self.expand_lambda(&mut outer, &group_join.outer_key)?;
        let outer_key = self.resolved_lambda(&outer, &outer_key);
        let inner_key = self.expand_lambda(&mut inner, &group_join.inner_key)?;
        let inner_key = self.resolved_lambda(&inner, &inner_key);

        let outer_parameter = outer.state.current_parameter.clone();
        let inner_parameter = inner.state.current_parameter.clone();
        let parameter = self.ctx.fresh_parameter("ti");

        let mut nodes = Vec::new();
        for source_mapping in &outer.state.source_mappings {
            let root = self.ctx.source_root(*source_mapping)?;
            nodes.extend(self.ctx.tree().flatten(root));
        }
        self.ctx.tree.prefix_to_mappings(&nodes, TransparentPair::OUTER);
        self.ctx
            .prefix_custom_roots(&outer.state.custom_root_mappings, TransparentPair::OUTER);

        let operand = LogicalExpr::sequence(SequenceOp::GroupJoin(GroupJoinOp {
            outer: Arc::clone(&outer.operand),
            inner: Arc::clone(&inner.operand),
            outer_key,
            inner_key,
            result_selector: pair_selector(&outer_parameter, &inner_parameter),
        }));

        // Group rows keep the inner row shape, widened by any key joins
        let group_root = self.ctx.add_custom_root(vec![TransparentPair::INNER.to_string()]);
        let mut group_state = inner.state;
        let inner_tags = std::mem::take(&mut group_state.pending_tags);
        group_state.pending_include_chain = None;
        group_state.materialize_collection = None;
        let group =
            NavigationExpansion::new(Self::custom_root_expr(&parameter, group_root), group_state);

        let outer_selector = rename_parameter(
            &outer.state.pending_selector.body,
            &outer_parameter,
            &parameter,
        );
        let selector_body =
            apply_lambda(&group_join.result_selector, &[outer_selector, group.into_expr()]);

        let mut state = ExpansionState::new(
            parameter.clone(),
            outer.state.source_mappings,
            Lambda::unary(parameter.clone(), selector_body),
        );
        state.custom_root_mappings = outer.state.custom_root_mappings;
        state.custom_root_mappings.push(group_root);
        for tag in outer.state.pending_tags.iter().chain(&inner_tags) {
            state.add_tag(tag);
        }
        state.selector = SelectorState::Pending;

        let mut combined = NavigationExpansion::new(operand, state);
        let identity = Lambda::identity(parameter);
        let body = self.expand_lambda(&mut combined, &identity)?;
        combined.state.pending_selector =
            Lambda::unary(combined.state.current_parameter.clone(), body);
        Ok(combined.into_expr())
    }

    fn process_select_many(
        &mut self,
        select_many: &SelectMany,
    ) -> ExpansionResult<Arc<LogicalExpr>> {
        let mut source = self.visit_source(&select_many.source)?;
        self.apply_pending_orderings(&mut source);

        let body = self.expand_lambda(&mut source, &select_many.collection_selector)?;
        let mut collection = match body.as_ref() {
            LogicalExpr::NavigationExpansion(expansion) => NavigationExpansion::clone(expansion),
            LogicalExpr::NavigationExpansionRoot(root) => NavigationExpansion::clone(&root.unwrap()),
            _ => {
                return Err(ExpansionError::unsupported(
                    "SelectMany",
                    format!("collection selector `{}` is not a query", body),
                ));
            }
        };
        if let Some(cardinality) = collection.state.pending_cardinality {
            return Err(ExpansionError::unsupported(
                "SelectMany",
                format!("collection selector ends in {}", cardinality),
            ));
        }
        collection.state.materialize_collection = None;
        self.apply_pending_orderings(&mut collection);

        // The collection is correlated to the outer row through its bindings
        let outer_parameter = source.state.current_parameter.clone();
        let collection_selector = Lambda::unary(
            outer_parameter.clone(),
            self.ctx.unbind(&collection.operand, Some(&outer_parameter)),
        );

        match &select_many.result_selector {
            None => {
                collection.operand = LogicalExpr::sequence(SequenceOp::SelectMany(SelectMany {
                    source: Arc::clone(&source.operand),
                    collection_selector,
                    result_selector: None,
                }));
                for tag in &source.state.pending_tags {
                    collection.state.add_tag(tag);
                }
                Ok(collection.into_expr())
            }
            Some(result_selector) => {
                let combined = self.combine_sources(
                    source,
                    collection,
                    result_selector,
                    |outer_operand, _, result_selector| {
                        SequenceOp::SelectMany(SelectMany {
                            source: outer_operand,
                            collection_selector,
                            result_selector: Some(result_selector),
                        })
                    },
                )?;
                Ok(combined.into_expr())
            }
        }
    }

    /// Merge two wrappers into one whose row is `<Outer = outer row, Inner =
    /// inner row>`, with `result_selector` as the pending projection.
    fn combine_sources<F>(
        &mut self,
        outer: NavigationExpansion,
        inner: NavigationExpansion,
        result_selector: &Lambda,
        build: F,
    ) -> ExpansionResult<NavigationExpansion>
    where
        F: FnOnce(Arc<LogicalExpr>, Arc<LogicalExpr>, Lambda) -> SequenceOp,
    {
        let outer_parameter = outer.state.current_parameter.clone();
        let inner_parameter = inner.state.current_parameter.clone();
        let parameter = self.ctx.fresh_parameter("ti");

        for (state, slot) in [
            (&outer.state, TransparentPair::OUTER),
            (&inner.state, TransparentPair::INNER),
        ] {
            let mut nodes = Vec::new();
            for source_mapping in &state.source_mappings {
                let root = self.ctx.source_root(*source_mapping)?;
                nodes.extend(self.ctx.tree().flatten(root));
            }
            self.ctx.tree.prefix_to_mappings(&nodes, slot);
            self.ctx.prefix_custom_roots(&state.custom_root_mappings, slot);
        }

        let outer_selector = rename_parameter(
            &outer.state.pending_selector.body,
            &outer_parameter,
            &parameter,
        );
        // A collection selector may still reach back into the outer row
        let inner_selector = rename_parameter(
            &rename_parameter(&inner.state.pending_selector.body, &inner_parameter, &parameter),
            &outer_parameter,
            &parameter,
        );
        let selector_body = apply_lambda(result_selector, &[outer_selector, inner_selector]);

        let operand = LogicalExpr::sequence(build(
            outer.operand,
            inner.operand,
            pair_selector(&outer_parameter, &inner_parameter),
        ));

        let mut source_mappings = outer.state.source_mappings;
        source_mappings.extend(inner.state.source_mappings);
        let mut state = ExpansionState::new(
            parameter.clone(),
            source_mappings,
            Lambda::unary(parameter.clone(), selector_body),
        );
        state.custom_root_mappings = outer.state.custom_root_mappings;
        state.custom_root_mappings.extend(inner.state.custom_root_mappings);
        for tag in outer.state.pending_tags.iter().chain(&inner.state.pending_tags) {
            state.add_tag(tag);
        }
        state.selector = SelectorState::Pending;

        // Bind navigations the result selector dereferences
        let mut combined = NavigationExpansion::new(operand, state);
        let identity = Lambda::identity(parameter);
        let body = self.expand_lambda(&mut combined, &identity)?;
        combined.state.pending_selector =
            Lambda::unary(combined.state.current_parameter.clone(), body);
        Ok(combined)
    }
}
