//! Unit tests for the JSON form of query trees
//!
//! Queries arrive as serialized logical expressions; these tests feed them
//! through the expander and check the serialized result.

#[cfg(test)]
mod query_json_tests {
    use std::sync::Arc;

    use navexpand::{
        expand_navigations,
        query_planner::{
            errors::QueryPlannerError,
            expansion::ExpansionError,
            logical_expr::{Literal, LogicalExpr},
        },
        EntityModel, ExpansionConfig,
    };
    use serde_json::{json, Value};

    const MODEL: &str = r#"
entities:
  - name: Customer
    key: [Id]
    properties:
      - { name: Id, type: int32 }
      - { name: City, type: string }
  - name: Order
    key: [Id]
    properties:
      - { name: Id, type: int32 }
      - { name: CustomerId, type: int32 }
relationships:
  - principal: Customer
    dependent: Order
    foreign_key: [CustomerId]
    dependent_to_principal: Customer
    principal_to_dependent: Orders
"#;

    fn member(expr: Value, member: &str) -> Value {
        json!({ "PropertyAccess": { "expr": expr, "member": member } })
    }

    fn orders_in_oslo() -> Value {
        let o = json!({ "Parameter": { "name": "o" } });
        json!({
            "Sequence": { "Where": {
                "source": { "EntityRoot": { "entity_type": "Order" } },
                "predicate": {
                    "params": [ { "name": "o" } ],
                    "body": { "Operator": {
                        "operator": "Equal",
                        "operands": [
                            member(member(o, "Customer"), "City"),
                            { "Literal": { "String": "Oslo" } }
                        ]
                    } }
                }
            } }
        })
    }

    #[test]
    fn test_query_from_json() {
        let query: LogicalExpr = serde_json::from_value(orders_in_oslo()).unwrap();
        assert_eq!(query.to_string(), "DbSet<Order>.Where(o => (o.Customer.City == 'Oslo'))");

        let model = EntityModel::from_yaml_str(MODEL).unwrap();
        let expanded =
            expand_navigations(Arc::new(query), &model, &ExpansionConfig::default()).unwrap();

        assert_eq!(
            expanded.expression.to_string(),
            "DbSet<Order>\
             .Join(DbSet<Customer>, o#1 => o#1.CustomerId, c#2 => c#2.Id, (o#1, c#2) => <Outer = o#1, Inner = c#2>)\
             .Where(ti#3 => (ti#3.Inner.City == 'Oslo'))\
             .Select(ti#3 => ti#3.Outer)"
        );
    }

    #[test]
    fn test_expanded_query_serializes_with_stats() {
        let query: LogicalExpr = serde_json::from_value(orders_in_oslo()).unwrap();
        let model = EntityModel::from_yaml_str(MODEL).unwrap();
        let expanded =
            expand_navigations(Arc::new(query), &model, &ExpansionConfig::default()).unwrap();

        let value = serde_json::to_value(&expanded).unwrap();

        assert_eq!(value["stats"]["inner_joins"], json!(1));
        assert_eq!(value["stats"]["left_joins"], json!(0));
        assert!(value["expression"]["Sequence"]["Select"].is_object());
    }

    #[test]
    fn test_literals_from_json() {
        let cases = vec![
            (json!({ "Integer": 5 }), Literal::Integer(5)),
            (json!({ "Boolean": true }), Literal::Boolean(true)),
            (json!({ "String": "x" }), Literal::String("x".to_string())),
            (json!("Null"), Literal::Null),
        ];

        for (value, expected) in cases {
            let literal: Literal = serde_json::from_value(value.clone()).unwrap();
            assert_eq!(literal, expected, "Failed for {}", value);
        }
    }

    #[test]
    fn test_unknown_node_is_rejected() {
        let result = serde_json::from_value::<LogicalExpr>(json!({ "Subquery": {} }));
        assert!(result.is_err());
    }

    #[test]
    fn test_query_carrying_internal_nodes_is_rejected() {
        let binding = json!({ "NavigationBinding": {
            "root_parameter": { "name": "c" },
            "node": 999,
            "entity_type": "Customer",
            "source_mapping": 0
        } });
        let query: LogicalExpr = serde_json::from_value(json!({
            "Sequence": { "Where": {
                "source": { "EntityRoot": { "entity_type": "Customer" } },
                "predicate": {
                    "params": [ { "name": "c" } ],
                    "body": { "Operator": {
                        "operator": "Equal",
                        "operands": [ member(binding, "City"), { "Literal": { "String": "Oslo" } } ]
                    } }
                }
            } }
        }))
        .unwrap();
        let model = EntityModel::from_yaml_str(MODEL).unwrap();

        let result = expand_navigations(Arc::new(query), &model, &ExpansionConfig::default());

        match result {
            Err(QueryPlannerError::Expansion { source, .. }) => {
                assert!(matches!(source, ExpansionError::UnsupportedShape { .. }))
            }
            other => panic!("Expected an unsupported shape error, got {:?}", other),
        }
    }
}
