//! Sequence operators of the host query tree.
//!
//! Every operator keeps its input sequence in `source` (or `outer`/`left` for
//! the two-input operators) and its per-row logic in [`Lambda`]s.

use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

use super::{Lambda, LogicalExpr};
use crate::utils::serde_arc;

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum SequenceOp {
    Where(Filter),
    Select(Projection),
    SelectMany(SelectMany),
    Join(JoinOp),
    GroupJoin(GroupJoinOp),
    OrderBy(Ordering),
    GroupBy(GroupBy),
    Skip(Paging),
    Take(Paging),
    Distinct(UnarySequence),
    DefaultIfEmpty(UnarySequence),
    OfType(OfType),
    Cardinality(CardinalityOp),
    Aggregate(AggregateOp),
    SetOperation(SetOperation),
    Include(IncludeOp),
    TagWith(TagWith),
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Filter {
    #[serde(with = "serde_arc")]
    pub source: Arc<LogicalExpr>,
    pub predicate: Lambda,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Projection {
    #[serde(with = "serde_arc")]
    pub source: Arc<LogicalExpr>,
    pub selector: Lambda,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SelectMany {
    #[serde(with = "serde_arc")]
    pub source: Arc<LogicalExpr>,
    pub collection_selector: Lambda,
    /// `(outer, inner) => ...`; the inner rows are returned as-is when absent.
    #[serde(default)]
    pub result_selector: Option<Lambda>,
}

#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    LeftOuter,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct JoinOp {
    pub kind: JoinKind,
    #[serde(with = "serde_arc")]
    pub outer: Arc<LogicalExpr>,
    #[serde(with = "serde_arc")]
    pub inner: Arc<LogicalExpr>,
    pub outer_key: Lambda,
    pub inner_key: Lambda,
    pub result_selector: Lambda,
}

/// Every outer row paired with the group of inner rows sharing its key;
/// `result_selector` is `(outer, group) => ...`.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct GroupJoinOp {
    #[serde(with = "serde_arc")]
    pub outer: Arc<LogicalExpr>,
    #[serde(with = "serde_arc")]
    pub inner: Arc<LogicalExpr>,
    pub outer_key: Lambda,
    pub inner_key: Lambda,
    pub result_selector: Lambda,
}

#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub enum OrderingKind {
    OrderBy,
    OrderByDescending,
    ThenBy,
    ThenByDescending,
}

impl OrderingKind {
    /// ThenBy/ThenByDescending extend an existing ordering instead of replacing it.
    pub fn is_secondary(&self) -> bool {
        matches!(self, OrderingKind::ThenBy | OrderingKind::ThenByDescending)
    }

    fn name(&self) -> &'static str {
        match self {
            OrderingKind::OrderBy => "OrderBy",
            OrderingKind::OrderByDescending => "OrderByDescending",
            OrderingKind::ThenBy => "ThenBy",
            OrderingKind::ThenByDescending => "ThenByDescending",
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Ordering {
    #[serde(with = "serde_arc")]
    pub source: Arc<LogicalExpr>,
    pub key_selector: Lambda,
    pub kind: OrderingKind,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct GroupBy {
    #[serde(with = "serde_arc")]
    pub source: Arc<LogicalExpr>,
    pub key_selector: Lambda,
    #[serde(default)]
    pub element_selector: Option<Lambda>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Paging {
    #[serde(with = "serde_arc")]
    pub source: Arc<LogicalExpr>,
    #[serde(with = "serde_arc")]
    pub count: Arc<LogicalExpr>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct UnarySequence {
    #[serde(with = "serde_arc")]
    pub source: Arc<LogicalExpr>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OfType {
    #[serde(with = "serde_arc")]
    pub source: Arc<LogicalExpr>,
    pub entity_type: String,
}

/// Terminal operators that collapse a sequence to at most one element.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub enum CardinalityOperator {
    First,
    FirstOrDefault,
    Single,
    SingleOrDefault,
    Last,
    LastOrDefault,
}

impl fmt::Display for CardinalityOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct CardinalityOp {
    #[serde(with = "serde_arc")]
    pub source: Arc<LogicalExpr>,
    pub operator: CardinalityOperator,
    #[serde(default)]
    pub predicate: Option<Lambda>,
}

/// Terminal operators that collapse a sequence to a scalar.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub enum AggregateFunction {
    Any,
    All,
    Count,
    LongCount,
    Sum,
    Min,
    Max,
    Average,
}

impl AggregateFunction {
    /// Functions whose optional lambda is a predicate rather than a selector.
    pub fn takes_predicate(&self) -> bool {
        matches!(
            self,
            AggregateFunction::Any
                | AggregateFunction::All
                | AggregateFunction::Count
                | AggregateFunction::LongCount
        )
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct AggregateOp {
    #[serde(with = "serde_arc")]
    pub source: Arc<LogicalExpr>,
    pub function: AggregateFunction,
    #[serde(default)]
    pub lambda: Option<Lambda>,
}

#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub enum SetOperationKind {
    Union,
    Concat,
    Intersect,
    Except,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SetOperation {
    pub kind: SetOperationKind,
    #[serde(with = "serde_arc")]
    pub left: Arc<LogicalExpr>,
    #[serde(with = "serde_arc")]
    pub right: Arc<LogicalExpr>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum IncludePath {
    /// `Include(o => o.Customer)`
    Lambda(Lambda),
    /// `Include("Customer.Address")`
    Text(String),
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct IncludeOp {
    #[serde(with = "serde_arc")]
    pub source: Arc<LogicalExpr>,
    pub path: IncludePath,
    /// Continues from the navigation included by the previous Include/ThenInclude.
    #[serde(default)]
    pub then_include: bool,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct TagWith {
    #[serde(with = "serde_arc")]
    pub source: Arc<LogicalExpr>,
    pub tag: String,
}

impl SequenceOp {
    /// The primary input sequence of the operator.
    pub fn source(&self) -> &Arc<LogicalExpr> {
        match self {
            SequenceOp::Where(op) => &op.source,
            SequenceOp::Select(op) => &op.source,
            SequenceOp::SelectMany(op) => &op.source,
            SequenceOp::Join(op) => &op.outer,
            SequenceOp::GroupJoin(op) => &op.outer,
            SequenceOp::OrderBy(op) => &op.source,
            SequenceOp::GroupBy(op) => &op.source,
            SequenceOp::Skip(op) | SequenceOp::Take(op) => &op.source,
            SequenceOp::Distinct(op) | SequenceOp::DefaultIfEmpty(op) => &op.source,
            SequenceOp::OfType(op) => &op.source,
            SequenceOp::Cardinality(op) => &op.source,
            SequenceOp::Aggregate(op) => &op.source,
            SequenceOp::SetOperation(op) => &op.left,
            SequenceOp::Include(op) => &op.source,
            SequenceOp::TagWith(op) => &op.source,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SequenceOp::Where(_) => "Where",
            SequenceOp::Select(_) => "Select",
            SequenceOp::SelectMany(_) => "SelectMany",
            SequenceOp::Join(op) => match op.kind {
                JoinKind::Inner => "Join",
                JoinKind::LeftOuter => "LeftJoin",
            },
            SequenceOp::GroupJoin(_) => "GroupJoin",
            SequenceOp::OrderBy(op) => op.kind.name(),
            SequenceOp::GroupBy(_) => "GroupBy",
            SequenceOp::Skip(_) => "Skip",
            SequenceOp::Take(_) => "Take",
            SequenceOp::Distinct(_) => "Distinct",
            SequenceOp::DefaultIfEmpty(_) => "DefaultIfEmpty",
            SequenceOp::OfType(_) => "OfType",
            SequenceOp::Cardinality(_) => "Cardinality",
            SequenceOp::Aggregate(_) => "Aggregate",
            SequenceOp::SetOperation(op) => match op.kind {
                SetOperationKind::Union => "Union",
                SetOperationKind::Concat => "Concat",
                SetOperationKind::Intersect => "Intersect",
                SetOperationKind::Except => "Except",
            },
            SequenceOp::Include(op) => {
                if op.then_include {
                    "ThenInclude"
                } else {
                    "Include"
                }
            }
            SequenceOp::TagWith(_) => "TagWith",
        }
    }
}

impl fmt::Display for SequenceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name();
        match self {
            SequenceOp::Where(op) => write!(f, "{}.{}({})", op.source, name, op.predicate),
            SequenceOp::Select(op) => write!(f, "{}.{}({})", op.source, name, op.selector),
            SequenceOp::SelectMany(op) => match &op.result_selector {
                Some(result) => write!(
                    f,
                    "{}.{}({}, {})",
                    op.source, name, op.collection_selector, result
                ),
                None => write!(f, "{}.{}({})", op.source, name, op.collection_selector),
            },
            SequenceOp::Join(op) => write!(
                f,
                "{}.{}({}, {}, {}, {})",
                op.outer, name, op.inner, op.outer_key, op.inner_key, op.result_selector
            ),
            SequenceOp::GroupJoin(op) => write!(
                f,
                "{}.{}({}, {}, {}, {})",
                op.outer, name, op.inner, op.outer_key, op.inner_key, op.result_selector
            ),
            SequenceOp::OrderBy(op) => write!(f, "{}.{}({})", op.source, name, op.key_selector),
            SequenceOp::GroupBy(op) => match &op.element_selector {
                Some(element) => write!(
                    f,
                    "{}.{}({}, {})",
                    op.source, name, op.key_selector, element
                ),
                None => write!(f, "{}.{}({})", op.source, name, op.key_selector),
            },
            SequenceOp::Skip(op) | SequenceOp::Take(op) => {
                write!(f, "{}.{}({})", op.source, name, op.count)
            }
            SequenceOp::Distinct(op) | SequenceOp::DefaultIfEmpty(op) => {
                write!(f, "{}.{}()", op.source, name)
            }
            SequenceOp::OfType(op) => write!(f, "{}.{}<{}>()", op.source, name, op.entity_type),
            SequenceOp::Cardinality(op) => match &op.predicate {
                Some(predicate) => write!(f, "{}.{}({})", op.source, op.operator, predicate),
                None => write!(f, "{}.{}()", op.source, op.operator),
            },
            SequenceOp::Aggregate(op) => match &op.lambda {
                Some(lambda) => write!(f, "{}.{}({})", op.source, op.function, lambda),
                None => write!(f, "{}.{}()", op.source, op.function),
            },
            SequenceOp::SetOperation(op) => write!(f, "{}.{}({})", op.left, name, op.right),
            SequenceOp::Include(op) => match &op.path {
                IncludePath::Lambda(lambda) => write!(f, "{}.{}({})", op.source, name, lambda),
                IncludePath::Text(path) => write!(f, "{}.{}(\"{}\")", op.source, name, path),
            },
            SequenceOp::TagWith(op) => write!(f, "{}.{}(\"{}\")", op.source, name, op.tag),
        }
    }
}
