//! Expression Visitor and Rewriter
//!
//! Read-only traversal goes through [`ExpressionVisitor`] + [`walk_expression`];
//! structural rewrites go through [`map_children`], which rebuilds a node only
//! when at least one child comes back as a different `Arc`.
//!
//! # Example
//!
//! ```ignore
//! use crate::query_planner::logical_expr::visitors::{ExpressionVisitor, walk_expression};
//!
//! struct ParameterCounter {
//!     count: usize,
//! }
//!
//! impl ExpressionVisitor for ParameterCounter {
//!     type Output = ();
//!
//!     fn visit_parameter(&mut self, _param: &Parameter) {
//!         self.count += 1;
//!     }
//! }
//! ```

use std::convert::Infallible;
use std::sync::Arc;

use super::{
    AggregateOp, CardinalityOp, Conditional, Convert, CorrelationPredicate, CustomRoot, Filter,
    GroupBy, GroupJoinOp, IncludeExpr, IncludeOp, IncludePath, JoinOp, Lambda, LogicalExpr,
    MaterializeCollection, NavigationBinding, NavigationExpansion, NavigationExpansionRoot,
    NewMember, NewObject, OfType, OperatorApplication, Ordering, Paging, Parameter,
    PendingOrdering, Projection, PropertyAccess, ScalarFnCall, SelectMany, SequenceOp,
    SetOperation, TagWith, TransparentPair, UnarySequence,
};
use crate::query_planner::transformed::Transformed;

/// Trait for visiting LogicalExpr nodes.
///
/// Implementors can override specific `visit_*` methods to handle nodes of interest.
/// The default implementations do nothing, allowing visitors to be selective.
pub trait ExpressionVisitor {
    type Output: Default;

    fn visit_parameter(&mut self, _param: &Parameter) -> Self::Output {
        Self::Output::default()
    }

    fn visit_property_access(&mut self, _access: &PropertyAccess) -> Self::Output {
        Self::Output::default()
    }

    fn visit_operator(&mut self, _op_app: &OperatorApplication) -> Self::Output {
        Self::Output::default()
    }

    fn visit_sequence(&mut self, _op: &SequenceOp) -> Self::Output {
        Self::Output::default()
    }

    fn visit_binding(&mut self, _binding: &NavigationBinding) -> Self::Output {
        Self::Output::default()
    }

    fn visit_expansion(&mut self, _expansion: &NavigationExpansion) -> Self::Output {
        Self::Output::default()
    }

    fn visit_include(&mut self, _include: &IncludeExpr) -> Self::Output {
        Self::Output::default()
    }

    fn visit_materialize_collection(&mut self, _marker: &MaterializeCollection) -> Self::Output {
        Self::Output::default()
    }

    fn visit_custom_root(&mut self, _root: &CustomRoot) -> Self::Output {
        Self::Output::default()
    }

    fn visit_correlation(&mut self, _predicate: &CorrelationPredicate) -> Self::Output {
        Self::Output::default()
    }

    /// Called for every other node kind
    fn visit_other(&mut self, _expr: &LogicalExpr) -> Self::Output {
        Self::Output::default()
    }
}

/// Walk an expression tree in preorder, calling visitor methods for each node.
pub fn walk_expression<V: ExpressionVisitor>(expr: &LogicalExpr, visitor: &mut V) -> V::Output {
    let result = match expr {
        LogicalExpr::Parameter(param) => visitor.visit_parameter(param),
        LogicalExpr::PropertyAccess(access) => visitor.visit_property_access(access),
        LogicalExpr::Operator(op_app) => visitor.visit_operator(op_app),
        LogicalExpr::Sequence(op) => visitor.visit_sequence(op),
        LogicalExpr::NavigationBinding(binding) => visitor.visit_binding(binding),
        LogicalExpr::NavigationExpansion(expansion) => visitor.visit_expansion(expansion),
        LogicalExpr::NavigationExpansionRoot(root) => visitor.visit_expansion(&root.expansion),
        LogicalExpr::Include(include) => visitor.visit_include(include),
        LogicalExpr::MaterializeCollection(marker) => visitor.visit_materialize_collection(marker),
        LogicalExpr::CustomRoot(root) => visitor.visit_custom_root(root),
        LogicalExpr::CorrelationPredicate(predicate) => visitor.visit_correlation(predicate),
        _ => visitor.visit_other(expr),
    };

    for child in children(expr) {
        walk_expression(child, visitor);
    }
    result
}

fn expansion_children(expansion: &NavigationExpansion) -> Vec<&Arc<LogicalExpr>> {
    let mut out = vec![&expansion.operand, &expansion.state.pending_selector.body];
    out.extend(
        expansion
            .state
            .pending_orderings
            .iter()
            .map(|o| &o.key_selector.body),
    );
    out
}

fn sequence_children(op: &SequenceOp) -> Vec<&Arc<LogicalExpr>> {
    match op {
        SequenceOp::Where(op) => vec![&op.source, &op.predicate.body],
        SequenceOp::Select(op) => vec![&op.source, &op.selector.body],
        SequenceOp::SelectMany(op) => {
            let mut out = vec![&op.source, &op.collection_selector.body];
            if let Some(result) = &op.result_selector {
                out.push(&result.body);
            }
            out
        }
        SequenceOp::Join(op) => vec![
            &op.outer,
            &op.inner,
            &op.outer_key.body,
            &op.inner_key.body,
            &op.result_selector.body,
        ],
        SequenceOp::GroupJoin(op) => vec![
            &op.outer,
            &op.inner,
            &op.outer_key.body,
            &op.inner_key.body,
            &op.result_selector.body,
        ],
        SequenceOp::OrderBy(op) => vec![&op.source, &op.key_selector.body],
        SequenceOp::GroupBy(op) => {
            let mut out = vec![&op.source, &op.key_selector.body];
            if let Some(element) = &op.element_selector {
                out.push(&element.body);
            }
            out
        }
        SequenceOp::Skip(op) | SequenceOp::Take(op) => vec![&op.source, &op.count],
        SequenceOp::Distinct(op) | SequenceOp::DefaultIfEmpty(op) => vec![&op.source],
        SequenceOp::OfType(op) => vec![&op.source],
        SequenceOp::Cardinality(op) => {
            let mut out = vec![&op.source];
            if let Some(predicate) = &op.predicate {
                out.push(&predicate.body);
            }
            out
        }
        SequenceOp::Aggregate(op) => {
            let mut out = vec![&op.source];
            if let Some(lambda) = &op.lambda {
                out.push(&lambda.body);
            }
            out
        }
        SequenceOp::SetOperation(op) => vec![&op.left, &op.right],
        SequenceOp::Include(op) => {
            let mut out = vec![&op.source];
            if let IncludePath::Lambda(lambda) = &op.path {
                out.push(&lambda.body);
            }
            out
        }
        SequenceOp::TagWith(op) => vec![&op.source],
    }
}

/// Direct children of a node, including lambda bodies and the pending
/// expressions of expansion wrappers.
pub fn children(expr: &LogicalExpr) -> Vec<&Arc<LogicalExpr>> {
    match expr {
        LogicalExpr::Literal(_)
        | LogicalExpr::QueryParameter(_)
        | LogicalExpr::Parameter(_)
        | LogicalExpr::EntityRoot(_)
        | LogicalExpr::NavigationBinding(_)
        | LogicalExpr::CustomRoot(_) => vec![],
        LogicalExpr::PropertyAccess(access) => vec![&access.expr],
        LogicalExpr::Operator(op_app) => op_app.operands.iter().collect(),
        LogicalExpr::ScalarFnCall(call) => call.args.iter().collect(),
        LogicalExpr::Conditional(cond) => vec![&cond.test, &cond.if_true, &cond.if_false],
        LogicalExpr::Convert(convert) => vec![&convert.operand],
        LogicalExpr::New(new) => new.members.iter().map(|m| &m.expr).collect(),
        LogicalExpr::Pair(pair) => vec![&pair.outer, &pair.inner],
        LogicalExpr::Lambda(lambda) => vec![&lambda.body],
        LogicalExpr::Sequence(op) => sequence_children(op),
        LogicalExpr::NavigationExpansion(expansion) => expansion_children(expansion),
        LogicalExpr::NavigationExpansionRoot(root) => expansion_children(&root.expansion),
        LogicalExpr::Include(include) => vec![&include.entity, &include.navigation_expr],
        LogicalExpr::MaterializeCollection(marker) => vec![&marker.subquery],
        LogicalExpr::CorrelationPredicate(predicate) => {
            vec![&predicate.null_check, &predicate.equality]
        }
    }
}

/// Tracks whether any child came back as a different allocation.
struct ChildRewriter<'f, F> {
    f: &'f mut F,
    changed: bool,
}

impl<'f, F, E> ChildRewriter<'f, F>
where
    F: FnMut(&Arc<LogicalExpr>) -> Result<Arc<LogicalExpr>, E>,
{
    fn expr(&mut self, expr: &Arc<LogicalExpr>) -> Result<Arc<LogicalExpr>, E> {
        let rewritten = (self.f)(expr)?;
        if !Arc::ptr_eq(&rewritten, expr) {
            self.changed = true;
        }
        Ok(rewritten)
    }

    fn exprs(&mut self, exprs: &[Arc<LogicalExpr>]) -> Result<Vec<Arc<LogicalExpr>>, E> {
        exprs.iter().map(|e| self.expr(e)).collect()
    }

    fn lambda(&mut self, lambda: &Lambda) -> Result<Lambda, E> {
        Ok(lambda.with_body(self.expr(&lambda.body)?))
    }

    fn opt_lambda(&mut self, lambda: &Option<Lambda>) -> Result<Option<Lambda>, E> {
        lambda.as_ref().map(|l| self.lambda(l)).transpose()
    }

    fn expansion(
        &mut self,
        expansion: &Arc<NavigationExpansion>,
    ) -> Result<Arc<NavigationExpansion>, E> {
        let mut nested = ChildRewriter {
            f: &mut *self.f,
            changed: false,
        };
        let operand = nested.expr(&expansion.operand)?;
        let mut state = expansion.state.clone();
        state.pending_selector = nested.lambda(&expansion.state.pending_selector)?;
        state.pending_orderings = expansion
            .state
            .pending_orderings
            .iter()
            .map(|o| {
                Ok(PendingOrdering {
                    kind: o.kind,
                    key_selector: nested.lambda(&o.key_selector)?,
                })
            })
            .collect::<Result<_, E>>()?;

        if nested.changed {
            self.changed = true;
            Ok(Arc::new(NavigationExpansion::new(operand, state)))
        } else {
            Ok(Arc::clone(expansion))
        }
    }

    fn sequence(&mut self, op: &SequenceOp) -> Result<SequenceOp, E> {
        Ok(match op {
            SequenceOp::Where(op) => SequenceOp::Where(Filter {
                source: self.expr(&op.source)?,
                predicate: self.lambda(&op.predicate)?,
            }),
            SequenceOp::Select(op) => SequenceOp::Select(Projection {
                source: self.expr(&op.source)?,
                selector: self.lambda(&op.selector)?,
            }),
            SequenceOp::SelectMany(op) => SequenceOp::SelectMany(SelectMany {
                source: self.expr(&op.source)?,
                collection_selector: self.lambda(&op.collection_selector)?,
                result_selector: self.opt_lambda(&op.result_selector)?,
            }),
            SequenceOp::Join(op) => SequenceOp::Join(JoinOp {
                kind: op.kind,
                outer: self.expr(&op.outer)?,
                inner: self.expr(&op.inner)?,
                outer_key: self.lambda(&op.outer_key)?,
                inner_key: self.lambda(&op.inner_key)?,
                result_selector: self.lambda(&op.result_selector)?,
            }),
            SequenceOp::GroupJoin(op) => SequenceOp::GroupJoin(GroupJoinOp {
                outer: self.expr(&op.outer)?,
                inner: self.expr(&op.inner)?,
                outer_key: self.lambda(&op.outer_key)?,
                inner_key: self.lambda(&op.inner_key)?,
                result_selector: self.lambda(&op.result_selector)?,
            }),
            SequenceOp::OrderBy(op) => SequenceOp::OrderBy(Ordering {
                source: self.expr(&op.source)?,
                key_selector: self.lambda(&op.key_selector)?,
                kind: op.kind,
            }),
            SequenceOp::GroupBy(op) => SequenceOp::GroupBy(GroupBy {
                source: self.expr(&op.source)?,
                key_selector: self.lambda(&op.key_selector)?,
                element_selector: self.opt_lambda(&op.element_selector)?,
            }),
            SequenceOp::Skip(op) => SequenceOp::Skip(Paging {
                source: self.expr(&op.source)?,
                count: self.expr(&op.count)?,
            }),
            SequenceOp::Take(op) => SequenceOp::Take(Paging {
                source: self.expr(&op.source)?,
                count: self.expr(&op.count)?,
            }),
            SequenceOp::Distinct(op) => SequenceOp::Distinct(UnarySequence {
                source: self.expr(&op.source)?,
            }),
            SequenceOp::DefaultIfEmpty(op) => SequenceOp::DefaultIfEmpty(UnarySequence {
                source: self.expr(&op.source)?,
            }),
            SequenceOp::OfType(op) => SequenceOp::OfType(OfType {
                source: self.expr(&op.source)?,
                entity_type: op.entity_type.clone(),
            }),
            SequenceOp::Cardinality(op) => SequenceOp::Cardinality(CardinalityOp {
                source: self.expr(&op.source)?,
                operator: op.operator,
                predicate: self.opt_lambda(&op.predicate)?,
            }),
            SequenceOp::Aggregate(op) => SequenceOp::Aggregate(AggregateOp {
                source: self.expr(&op.source)?,
                function: op.function,
                lambda: self.opt_lambda(&op.lambda)?,
            }),
            SequenceOp::SetOperation(op) => SequenceOp::SetOperation(SetOperation {
                kind: op.kind,
                left: self.expr(&op.left)?,
                right: self.expr(&op.right)?,
            }),
            SequenceOp::Include(op) => SequenceOp::Include(IncludeOp {
                source: self.expr(&op.source)?,
                path: match &op.path {
                    IncludePath::Lambda(lambda) => IncludePath::Lambda(self.lambda(lambda)?),
                    IncludePath::Text(text) => IncludePath::Text(text.clone()),
                },
                then_include: op.then_include,
            }),
            SequenceOp::TagWith(op) => SequenceOp::TagWith(TagWith {
                source: self.expr(&op.source)?,
                tag: op.tag.clone(),
            }),
        })
    }
}

/// Apply `f` to every direct child of `expr`, reallocating `expr` only if some
/// child changed identity.
pub fn map_children<F, E>(
    expr: &Arc<LogicalExpr>,
    mut f: F,
) -> Result<Transformed<Arc<LogicalExpr>>, E>
where
    F: FnMut(&Arc<LogicalExpr>) -> Result<Arc<LogicalExpr>, E>,
{
    let mut rw = ChildRewriter {
        f: &mut f,
        changed: false,
    };

    let rebuilt = match expr.as_ref() {
        LogicalExpr::Literal(_)
        | LogicalExpr::QueryParameter(_)
        | LogicalExpr::Parameter(_)
        | LogicalExpr::EntityRoot(_)
        | LogicalExpr::NavigationBinding(_)
        | LogicalExpr::CustomRoot(_) => return Ok(Transformed::No(Arc::clone(expr))),
        LogicalExpr::PropertyAccess(access) => LogicalExpr::PropertyAccess(PropertyAccess {
            expr: rw.expr(&access.expr)?,
            member: access.member.clone(),
            null_safe: access.null_safe,
        }),
        LogicalExpr::Operator(op_app) => LogicalExpr::Operator(OperatorApplication {
            operator: op_app.operator,
            operands: rw.exprs(&op_app.operands)?,
        }),
        LogicalExpr::ScalarFnCall(call) => LogicalExpr::ScalarFnCall(ScalarFnCall {
            name: call.name.clone(),
            args: rw.exprs(&call.args)?,
        }),
        LogicalExpr::Conditional(cond) => LogicalExpr::Conditional(Conditional {
            test: rw.expr(&cond.test)?,
            if_true: rw.expr(&cond.if_true)?,
            if_false: rw.expr(&cond.if_false)?,
        }),
        LogicalExpr::Convert(convert) => LogicalExpr::Convert(Convert {
            operand: rw.expr(&convert.operand)?,
            target: convert.target,
            nullable: convert.nullable,
        }),
        LogicalExpr::New(new) => LogicalExpr::New(NewObject {
            members: new
                .members
                .iter()
                .map(|m| {
                    Ok(NewMember {
                        name: m.name.clone(),
                        expr: rw.expr(&m.expr)?,
                    })
                })
                .collect::<Result<_, E>>()?,
        }),
        LogicalExpr::Pair(pair) => LogicalExpr::Pair(TransparentPair {
            outer: rw.expr(&pair.outer)?,
            inner: rw.expr(&pair.inner)?,
        }),
        LogicalExpr::Lambda(lambda) => LogicalExpr::Lambda(rw.lambda(lambda)?),
        LogicalExpr::Sequence(op) => LogicalExpr::Sequence(rw.sequence(op)?),
        LogicalExpr::NavigationExpansion(expansion) => {
            LogicalExpr::NavigationExpansion(rw.expansion(expansion)?)
        }
        LogicalExpr::NavigationExpansionRoot(root) => {
            LogicalExpr::NavigationExpansionRoot(NavigationExpansionRoot {
                expansion: rw.expansion(&root.expansion)?,
                mapping: root.mapping.clone(),
            })
        }
        LogicalExpr::Include(include) => LogicalExpr::Include(IncludeExpr {
            entity: rw.expr(&include.entity)?,
            navigation_expr: rw.expr(&include.navigation_expr)?,
            navigation: include.navigation.clone(),
        }),
        LogicalExpr::MaterializeCollection(marker) => {
            LogicalExpr::MaterializeCollection(MaterializeCollection {
                subquery: rw.expr(&marker.subquery)?,
                navigation: marker.navigation.clone(),
            })
        }
        LogicalExpr::CorrelationPredicate(predicate) => {
            LogicalExpr::CorrelationPredicate(CorrelationPredicate {
                null_check: rw.expr(&predicate.null_check)?,
                equality: rw.expr(&predicate.equality)?,
            })
        }
    };

    if rw.changed {
        Ok(Transformed::Yes(Arc::new(rebuilt)))
    } else {
        Ok(Transformed::No(Arc::clone(expr)))
    }
}

/// Infallible form of [`map_children`].
pub fn transform_children<F>(expr: &Arc<LogicalExpr>, mut f: F) -> Arc<LogicalExpr>
where
    F: FnMut(&Arc<LogicalExpr>) -> Arc<LogicalExpr>,
{
    match map_children::<_, Infallible>(expr, |child| Ok(f(child))) {
        Ok(transformed) => transformed.get_expr(),
        Err(never) => match never {},
    }
}

/// Replace every free occurrence of `param` in `expr` with `replacement`.
pub fn substitute_parameter(
    expr: &Arc<LogicalExpr>,
    param: &Parameter,
    replacement: &Arc<LogicalExpr>,
) -> Arc<LogicalExpr> {
    match expr.as_ref() {
        LogicalExpr::Parameter(p) if p == param => Arc::clone(replacement),
        // Shadowed by an inner lambda
        LogicalExpr::Lambda(lambda) if lambda.params.contains(param) => Arc::clone(expr),
        _ => transform_children(expr, |child| substitute_parameter(child, param, replacement)),
    }
}

/// Substitute the parameters of `lambda` with `args`, returning the body.
pub fn apply_lambda(lambda: &Lambda, args: &[Arc<LogicalExpr>]) -> Arc<LogicalExpr> {
    lambda
        .params
        .iter()
        .zip(args)
        .fold(Arc::clone(&lambda.body), |body, (param, arg)| {
            substitute_parameter(&body, param, arg)
        })
}

/// Rename a row parameter everywhere it is referenced: plain references,
/// binding and custom-root anchors, and lambda declarations.
pub fn rename_parameter(expr: &Arc<LogicalExpr>, old: &Parameter, new: &Parameter) -> Arc<LogicalExpr> {
    match expr.as_ref() {
        LogicalExpr::Parameter(p) if p == old => LogicalExpr::parameter(new),
        LogicalExpr::NavigationBinding(binding) if &binding.root_parameter == old => {
            Arc::new(LogicalExpr::NavigationBinding(NavigationBinding {
                root_parameter: new.clone(),
                ..binding.clone()
            }))
        }
        LogicalExpr::CustomRoot(root) if &root.root_parameter == old => {
            Arc::new(LogicalExpr::CustomRoot(CustomRoot {
                root_parameter: new.clone(),
                mapping: root.mapping,
            }))
        }
        LogicalExpr::Lambda(lambda) if lambda.params.contains(old) => {
            let params = lambda
                .params
                .iter()
                .map(|p| if p == old { new.clone() } else { p.clone() })
                .collect();
            Arc::new(LogicalExpr::Lambda(Lambda::new(
                params,
                rename_parameter(&lambda.body, old, new),
            )))
        }
        LogicalExpr::NavigationExpansion(expansion) => {
            let renamed = transform_children(expr, |child| rename_parameter(child, old, new));
            match (&expansion.state.pending_include_chain, renamed.as_ref()) {
                (Some(chain), LogicalExpr::NavigationExpansion(updated))
                    if &chain.root_parameter == old =>
                {
                    let mut updated = NavigationExpansion::clone(updated);
                    if let Some(chain) = updated.state.pending_include_chain.as_mut() {
                        chain.root_parameter = new.clone();
                    }
                    updated.into_expr()
                }
                _ => renamed,
            }
        }
        _ => transform_children(expr, |child| rename_parameter(child, old, new)),
    }
}

/// Rename inside a lambda, including its parameter list.
pub fn rename_lambda_parameter(lambda: &Lambda, old: &Parameter, new: &Parameter) -> Lambda {
    let params = lambda
        .params
        .iter()
        .map(|p| if p == old { new.clone() } else { p.clone() })
        .collect();
    Lambda::new(params, rename_parameter(&lambda.body, old, new))
}

// =============================================================================
// Common Visitor Implementations
// =============================================================================

/// Finds the first extension node of any kind. Extension nodes refer to the
/// navigation tree of one compilation and never come from a front end.
#[derive(Default)]
pub struct ExtensionNodeFinder {
    pub found: Option<String>,
}

impl ExpressionVisitor for ExtensionNodeFinder {
    type Output = ();

    fn visit_binding(&mut self, binding: &NavigationBinding) {
        self.found.get_or_insert_with(|| binding.to_string());
    }

    fn visit_expansion(&mut self, expansion: &NavigationExpansion) {
        self.found.get_or_insert_with(|| expansion.to_string());
    }

    fn visit_include(&mut self, include: &IncludeExpr) {
        self.found.get_or_insert_with(|| include.to_string());
    }

    fn visit_materialize_collection(&mut self, marker: &MaterializeCollection) {
        self.found.get_or_insert_with(|| marker.to_string());
    }

    fn visit_custom_root(&mut self, root: &CustomRoot) {
        self.found.get_or_insert_with(|| root.to_string());
    }

    fn visit_correlation(&mut self, predicate: &CorrelationPredicate) {
        self.found.get_or_insert_with(|| predicate.to_string());
    }
}

/// Finds extension nodes that must not outlive the reduction pass.
#[derive(Default)]
pub struct UnreducedNodeFinder {
    pub found: Option<String>,
}

impl ExpressionVisitor for UnreducedNodeFinder {
    type Output = ();

    fn visit_binding(&mut self, binding: &NavigationBinding) {
        self.found.get_or_insert_with(|| binding.to_string());
    }

    fn visit_expansion(&mut self, expansion: &NavigationExpansion) {
        self.found.get_or_insert_with(|| expansion.to_string());
    }

    fn visit_custom_root(&mut self, root: &CustomRoot) {
        self.found.get_or_insert_with(|| root.to_string());
    }
}
