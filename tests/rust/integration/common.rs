// Shared fixtures for the integration tests
#![allow(dead_code)]

use std::sync::Arc;

use navexpand::{
    config::ExpansionConfig,
    model::EntityModel,
    query_planner::{
        expand_navigations,
        logical_expr::{
            visitors::{walk_expression, ExpressionVisitor},
            IncludeExpr, JoinKind, Lambda, Literal, LogicalExpr, MaterializeCollection,
            NavigationBinding, NavigationExpansion, Parameter, SequenceOp,
        },
        ExpandedQuery,
    },
};

pub const SHOP: &str = r#"
entities:
  - name: Customer
    key: [Id]
    properties:
      - { name: Id, type: int32 }
      - { name: Name, type: string }
      - { name: City, type: string }
      - { name: RegionId, type: int32 }
  - name: Region
    key: [Id]
    properties:
      - { name: Id, type: int32 }
      - { name: Name, type: string }
  - name: Order
    key: [Id]
    properties:
      - { name: Id, type: int32 }
      - { name: CustomerId, type: int32 }
      - { name: ShipperId, type: int32, nullable: true }
      - { name: Total, type: decimal }
  - name: OrderLine
    key: [Id]
    properties:
      - { name: Id, type: int32 }
      - { name: OrderId, type: int32 }
      - { name: Quantity, type: int32 }
  - name: Shipper
    key: [Id]
    properties:
      - { name: Id, type: int32 }
      - { name: Name, type: string }
relationships:
  - principal: Region
    dependent: Customer
    foreign_key: [RegionId]
    dependent_to_principal: Region
    principal_to_dependent: Customers
  - principal: Customer
    dependent: Order
    foreign_key: [CustomerId]
    dependent_to_principal: Customer
    principal_to_dependent: Orders
  - principal: Shipper
    dependent: Order
    foreign_key: [ShipperId]
    required: false
    dependent_to_principal: Shipper
  - principal: Order
    dependent: OrderLine
    foreign_key: [OrderId]
    dependent_to_principal: Order
    principal_to_dependent: Lines
"#;

pub fn shop() -> EntityModel {
    EntityModel::from_yaml_str(SHOP).unwrap()
}

/// The shop model with query filters attached to some entity types.
pub fn shop_with_filters(filters: &[(&str, &str)]) -> EntityModel {
    let mut yaml = SHOP.to_string();
    for (entity, filter) in filters {
        let anchor = format!("  - name: {}\n    key: [Id]\n", entity);
        let replacement = format!("{}    query_filter: \"{}\"\n", anchor, filter);
        yaml = yaml.replacen(&anchor, &replacement, 1);
    }
    EntityModel::from_yaml_str(&yaml).unwrap()
}

pub fn expand(query: Arc<LogicalExpr>, model: &EntityModel) -> ExpandedQuery {
    expand_navigations(query, model, &ExpansionConfig::default()).unwrap()
}

// -----------------------------------------------------------------------------
// Query builders

pub fn param(name: &str) -> Parameter {
    Parameter::new(name)
}

pub fn root(entity: &str) -> Arc<LogicalExpr> {
    LogicalExpr::entity_root(entity)
}

/// `p.a.b.c` for `path = "a.b.c"`
pub fn path(p: &Parameter, path: &str) -> Arc<LogicalExpr> {
    path.split('.')
        .fold(LogicalExpr::parameter(p), |expr, member| {
            LogicalExpr::member(expr, member)
        })
}

pub fn text(value: &str) -> Arc<LogicalExpr> {
    LogicalExpr::literal(Literal::String(value.to_string()))
}

pub fn int(value: i64) -> Arc<LogicalExpr> {
    LogicalExpr::literal(Literal::Integer(value))
}

pub fn lambda(p: &Parameter, body: Arc<LogicalExpr>) -> Lambda {
    Lambda::unary(p.clone(), body)
}

pub fn seq(op: SequenceOp) -> Arc<LogicalExpr> {
    LogicalExpr::sequence(op)
}

// -----------------------------------------------------------------------------
// Result inspection

/// Counts the relational shapes of a reduced tree.
#[derive(Default, Debug)]
pub struct ShapeCounter {
    pub inner_joins: usize,
    pub left_joins: usize,
    pub materialized_collections: usize,
    pub includes: usize,
    pub leftovers: usize,
}

impl ExpressionVisitor for ShapeCounter {
    type Output = ();

    fn visit_sequence(&mut self, op: &SequenceOp) {
        if let SequenceOp::Join(join) = op {
            match join.kind {
                JoinKind::Inner => self.inner_joins += 1,
                JoinKind::LeftOuter => self.left_joins += 1,
            }
        }
    }

    fn visit_binding(&mut self, _binding: &NavigationBinding) {
        self.leftovers += 1;
    }

    fn visit_expansion(&mut self, _expansion: &NavigationExpansion) {
        self.leftovers += 1;
    }

    fn visit_include(&mut self, _include: &IncludeExpr) {
        self.includes += 1;
    }

    fn visit_materialize_collection(&mut self, _marker: &MaterializeCollection) {
        self.materialized_collections += 1;
    }
}

pub fn shape(expr: &LogicalExpr) -> ShapeCounter {
    let mut counter = ShapeCounter::default();
    walk_expression(expr, &mut counter);
    counter
}
