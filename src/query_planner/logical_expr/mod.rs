//! Host query expression tree.
//!
//! `LogicalExpr` is the closed set of node kinds a front end hands to the
//! navigation expansion pass: scalar expressions, lambdas, entity roots and
//! sequence operators, plus the extension nodes that only exist while the
//! pass is running (see [`extensions`]). Children are shared through `Arc`
//! so a rewrite that changes nothing can hand back the original sub-tree.

use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

use crate::model::ScalarType;
use crate::utils::{serde_arc, serde_arc_vec};

pub mod extensions;
pub mod sequence;
pub mod visitors;

pub use extensions::{
    CorrelationPredicate, CustomRoot, ExpansionState, IncludeExpr, MaterializeCollection,
    NavigationBinding, NavigationExpansion, NavigationExpansionRoot, PendingOrdering,
    SelectorState,
};
pub use sequence::{
    AggregateFunction, AggregateOp, CardinalityOp, CardinalityOperator, Filter, GroupBy,
    GroupJoinOp, IncludeOp, IncludePath, JoinKind, JoinOp, OfType, Ordering, OrderingKind,
    Paging, Projection, SelectMany, SequenceOp, SetOperation, SetOperationKind, TagWith,
    UnarySequence,
};

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum LogicalExpr {
    /// A literal, such as a number, string, boolean, or null.
    Literal(Literal),

    /// A runtime query parameter, such as `@tenant`.
    QueryParameter(String),

    /// A reference to a lambda parameter.
    Parameter(Parameter),

    /// Member access, e.g. `o.Customer` or `o?.Customer` when null-safe.
    PropertyAccess(PropertyAccess),

    /// An operator application, e.g. `a == b` or `!a`.
    Operator(OperatorApplication),

    /// An opaque scalar function call evaluated by the store.
    ScalarFnCall(ScalarFnCall),

    /// `test ? if_true : if_false`
    Conditional(Conditional),

    /// Explicit conversion, used to make key comparisons nullable on both sides.
    Convert(Convert),

    /// Anonymous object construction with ordered, named members.
    New(NewObject),

    /// Row shape produced by every synthesized join.
    Pair(TransparentPair),

    Lambda(Lambda),

    /// The full set of rows of an entity type.
    EntityRoot(EntityRoot),

    /// A query operator applied to a sequence.
    Sequence(SequenceOp),

    // Extension nodes, only present while navigation expansion runs.
    NavigationBinding(NavigationBinding),

    NavigationExpansion(#[serde(with = "serde_arc")] Arc<NavigationExpansion>),

    NavigationExpansionRoot(NavigationExpansionRoot),

    Include(IncludeExpr),

    MaterializeCollection(MaterializeCollection),

    CustomRoot(CustomRoot),

    CorrelationPredicate(CorrelationPredicate),
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    Null,
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        Parameter { name: name.into() }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct PropertyAccess {
    #[serde(with = "serde_arc")]
    pub expr: Arc<LogicalExpr>,
    pub member: String,
    /// Evaluates to null instead of failing when `expr` is null.
    #[serde(default)]
    pub null_safe: bool,
}

#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub enum Operator {
    Addition,
    Subtraction,
    Multiplication,
    Division,
    ModuloDivision,
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessThanEqual,
    GreaterThanEqual,
    And,
    Or,
    Not,
    Coalesce,
    IsNull,
    IsNotNull,
}

impl Operator {
    fn symbol(&self) -> &'static str {
        match self {
            Operator::Addition => "+",
            Operator::Subtraction => "-",
            Operator::Multiplication => "*",
            Operator::Division => "/",
            Operator::ModuloDivision => "%",
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::LessThan => "<",
            Operator::GreaterThan => ">",
            Operator::LessThanEqual => "<=",
            Operator::GreaterThanEqual => ">=",
            Operator::And => "&&",
            Operator::Or => "||",
            Operator::Not => "!",
            Operator::Coalesce => "??",
            Operator::IsNull => "== null",
            Operator::IsNotNull => "!= null",
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OperatorApplication {
    pub operator: Operator,
    #[serde(with = "serde_arc_vec")]
    pub operands: Vec<Arc<LogicalExpr>>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ScalarFnCall {
    pub name: String,
    #[serde(with = "serde_arc_vec")]
    pub args: Vec<Arc<LogicalExpr>>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Conditional {
    #[serde(with = "serde_arc")]
    pub test: Arc<LogicalExpr>,
    #[serde(with = "serde_arc")]
    pub if_true: Arc<LogicalExpr>,
    #[serde(with = "serde_arc")]
    pub if_false: Arc<LogicalExpr>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Convert {
    #[serde(with = "serde_arc")]
    pub operand: Arc<LogicalExpr>,
    pub target: ScalarType,
    pub nullable: bool,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct NewMember {
    pub name: String,
    #[serde(with = "serde_arc")]
    pub expr: Arc<LogicalExpr>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct NewObject {
    pub members: Vec<NewMember>,
}

impl NewObject {
    pub fn member(&self, name: &str) -> Option<&Arc<LogicalExpr>> {
        self.members.iter().find(|m| m.name == name).map(|m| &m.expr)
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct TransparentPair {
    #[serde(with = "serde_arc")]
    pub outer: Arc<LogicalExpr>,
    #[serde(with = "serde_arc")]
    pub inner: Arc<LogicalExpr>,
}

impl TransparentPair {
    pub const OUTER: &'static str = "Outer";
    pub const INNER: &'static str = "Inner";

    pub fn slot(&self, name: &str) -> Option<&Arc<LogicalExpr>> {
        match name {
            Self::OUTER => Some(&self.outer),
            Self::INNER => Some(&self.inner),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Lambda {
    pub params: Vec<Parameter>,
    #[serde(with = "serde_arc")]
    pub body: Arc<LogicalExpr>,
}

impl Lambda {
    pub fn new(params: Vec<Parameter>, body: Arc<LogicalExpr>) -> Self {
        Lambda { params, body }
    }

    pub fn unary(param: Parameter, body: Arc<LogicalExpr>) -> Self {
        Lambda {
            params: vec![param],
            body,
        }
    }

    /// `p => p`
    pub fn identity(param: Parameter) -> Self {
        let body = LogicalExpr::parameter(&param);
        Lambda::unary(param, body)
    }

    pub fn with_body(&self, body: Arc<LogicalExpr>) -> Self {
        Lambda {
            params: self.params.clone(),
            body,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct EntityRoot {
    pub entity_type: String,
}

impl LogicalExpr {
    pub fn literal(value: Literal) -> Arc<Self> {
        Arc::new(LogicalExpr::Literal(value))
    }

    pub fn null() -> Arc<Self> {
        Self::literal(Literal::Null)
    }

    pub fn parameter(param: &Parameter) -> Arc<Self> {
        Arc::new(LogicalExpr::Parameter(param.clone()))
    }

    pub fn entity_root(entity_type: impl Into<String>) -> Arc<Self> {
        Arc::new(LogicalExpr::EntityRoot(EntityRoot {
            entity_type: entity_type.into(),
        }))
    }

    pub fn member(expr: Arc<Self>, member: impl Into<String>) -> Arc<Self> {
        Arc::new(LogicalExpr::PropertyAccess(PropertyAccess {
            expr,
            member: member.into(),
            null_safe: false,
        }))
    }

    pub fn null_safe_member(expr: Arc<Self>, member: impl Into<String>) -> Arc<Self> {
        Arc::new(LogicalExpr::PropertyAccess(PropertyAccess {
            expr,
            member: member.into(),
            null_safe: true,
        }))
    }

    /// Follow `path` from `base` with plain member accesses.
    pub fn member_path(base: Arc<Self>, path: &[String]) -> Arc<Self> {
        path.iter()
            .fold(base, |expr, member| Self::member(expr, member.clone()))
    }

    pub fn binary(operator: Operator, left: Arc<Self>, right: Arc<Self>) -> Arc<Self> {
        Arc::new(LogicalExpr::Operator(OperatorApplication {
            operator,
            operands: vec![left, right],
        }))
    }

    pub fn unary(operator: Operator, operand: Arc<Self>) -> Arc<Self> {
        Arc::new(LogicalExpr::Operator(OperatorApplication {
            operator,
            operands: vec![operand],
        }))
    }

    pub fn and(left: Arc<Self>, right: Arc<Self>) -> Arc<Self> {
        Self::binary(Operator::And, left, right)
    }

    pub fn equal(left: Arc<Self>, right: Arc<Self>) -> Arc<Self> {
        Self::binary(Operator::Equal, left, right)
    }

    pub fn new_object(members: Vec<(String, Arc<Self>)>) -> Arc<Self> {
        Arc::new(LogicalExpr::New(NewObject {
            members: members
                .into_iter()
                .map(|(name, expr)| NewMember { name, expr })
                .collect(),
        }))
    }

    pub fn pair(outer: Arc<Self>, inner: Arc<Self>) -> Arc<Self> {
        Arc::new(LogicalExpr::Pair(TransparentPair { outer, inner }))
    }

    pub fn sequence(op: SequenceOp) -> Arc<Self> {
        Arc::new(LogicalExpr::Sequence(op))
    }

    pub fn as_expansion(&self) -> Option<&Arc<NavigationExpansion>> {
        match self {
            LogicalExpr::NavigationExpansion(expansion) => Some(expansion),
            _ => None,
        }
    }

    pub fn as_binding(&self) -> Option<&NavigationBinding> {
        match self {
            LogicalExpr::NavigationBinding(binding) => Some(binding),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Float(fl) => write!(f, "{}", fl),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::String(s) => write!(f, "'{}'", s),
            Literal::Null => write!(f, "null"),
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Display for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.len() == 1 {
            write!(f, "{} => {}", self.params[0], self.body)
        } else {
            let params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
            write!(f, "({}) => {}", params.join(", "), self.body)
        }
    }
}

impl fmt::Display for LogicalExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalExpr::Literal(literal) => write!(f, "{}", literal),
            LogicalExpr::QueryParameter(name) => write!(f, "@{}", name),
            LogicalExpr::Parameter(param) => write!(f, "{}", param),
            LogicalExpr::PropertyAccess(access) => {
                let dot = if access.null_safe { "?." } else { "." };
                write!(f, "{}{}{}", access.expr, dot, access.member)
            }
            LogicalExpr::Operator(op) => match (op.operator, op.operands.as_slice()) {
                (Operator::Not, [operand]) => write!(f, "!{}", operand),
                (Operator::IsNull | Operator::IsNotNull, [operand]) => {
                    write!(f, "({} {})", operand, op.operator.symbol())
                }
                (_, [left, right]) => write!(f, "({} {} {})", left, op.operator.symbol(), right),
                (_, operands) => {
                    let rendered: Vec<String> = operands.iter().map(|o| o.to_string()).collect();
                    write!(f, "{}({})", op.operator.symbol(), rendered.join(", "))
                }
            },
            LogicalExpr::ScalarFnCall(call) => {
                let args: Vec<String> = call.args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", call.name, args.join(", "))
            }
            LogicalExpr::Conditional(cond) => {
                write!(f, "({} ? {} : {})", cond.test, cond.if_true, cond.if_false)
            }
            LogicalExpr::Convert(convert) => {
                let suffix = if convert.nullable { "?" } else { "" };
                write!(f, "({} as {}{})", convert.operand, convert.target, suffix)
            }
            LogicalExpr::New(new) => {
                let members: Vec<String> = new
                    .members
                    .iter()
                    .map(|m| format!("{} = {}", m.name, m.expr))
                    .collect();
                write!(f, "new {{ {} }}", members.join(", "))
            }
            LogicalExpr::Pair(pair) => write!(
                f,
                "<{} = {}, {} = {}>",
                TransparentPair::OUTER,
                pair.outer,
                TransparentPair::INNER,
                pair.inner
            ),
            LogicalExpr::Lambda(lambda) => write!(f, "{}", lambda),
            LogicalExpr::EntityRoot(root) => write!(f, "DbSet<{}>", root.entity_type),
            LogicalExpr::Sequence(op) => write!(f, "{}", op),
            LogicalExpr::NavigationBinding(binding) => write!(f, "{}", binding),
            LogicalExpr::NavigationExpansion(expansion) => write!(f, "{}", expansion),
            LogicalExpr::NavigationExpansionRoot(root) => write!(f, "{}", root),
            LogicalExpr::Include(include) => write!(f, "{}", include),
            LogicalExpr::MaterializeCollection(materialize) => write!(f, "{}", materialize),
            LogicalExpr::CustomRoot(root) => write!(f, "{}", root),
            LogicalExpr::CorrelationPredicate(predicate) => write!(f, "{}", predicate),
        }
    }
}
