// Failures surface as typed errors tagged with the pass that raised them
use std::sync::Arc;

use navexpand::{
    config::ExpansionConfig,
    model::{EntityModel, ModelError, ScalarType},
    query_planner::{
        errors::{Pass, QueryPlannerError},
        expand_navigations,
        expansion::ExpansionError,
        logical_expr::{
            CardinalityOp, CardinalityOperator, Filter, IncludeOp, IncludePath, LogicalExpr,
            Ordering, OrderingKind, SelectMany, SequenceOp, SetOperation, SetOperationKind,
        },
    },
};

use super::common::*;

fn expansion_error(
    query: Arc<LogicalExpr>,
    model: &EntityModel,
    config: &ExpansionConfig,
) -> (Pass, ExpansionError) {
    match expand_navigations(query, model, config) {
        Err(QueryPlannerError::Expansion { pass, source }) => (pass, source),
        other => panic!("Expected an expansion error, got {:?}", other),
    }
}

fn include(source: Arc<LogicalExpr>, path: IncludePath, then_include: bool) -> Arc<LogicalExpr> {
    seq(SequenceOp::Include(IncludeOp {
        source,
        path,
        then_include,
    }))
}

#[test]
fn test_then_include_without_include() {
    let o = param("o");
    let query = include(
        root("Customer"),
        IncludePath::Lambda(lambda(&o, path(&o, "Lines"))),
        true,
    );

    let (pass, error) = expansion_error(query, &shop(), &ExpansionConfig::default());

    assert_eq!(pass, Pass::NavigationExpanding);
    assert!(matches!(
        error,
        ExpansionError::UnsupportedShape { ref operator, .. } if operator == "ThenInclude"
    ));
}

#[test]
fn test_unknown_text_include_segment() {
    let query = include(root("Customer"), IncludePath::Text("Orders.Nope".to_string()), false);

    let (_, error) = expansion_error(query, &shop(), &ExpansionConfig::default());

    assert_eq!(
        error,
        ExpansionError::InvalidIncludePath {
            path: "Orders.Nope".to_string()
        }
    );
}

#[test]
fn test_include_of_scalar_member() {
    let o = param("o");
    let query = include(
        root("Order"),
        IncludePath::Lambda(lambda(&o, path(&o, "Total"))),
        false,
    );

    let (_, error) = expansion_error(query, &shop(), &ExpansionConfig::default());

    assert_eq!(
        error,
        ExpansionError::InvalidIncludePath {
            path: "o => o.Total".to_string()
        }
    );
}

#[test]
fn test_secondary_ordering_without_primary() {
    let o = param("o");
    let query = seq(SequenceOp::OrderBy(Ordering {
        source: root("Order"),
        key_selector: lambda(&o, path(&o, "Total")),
        kind: OrderingKind::ThenBy,
    }));

    let (_, error) = expansion_error(query, &shop(), &ExpansionConfig::default());

    assert!(matches!(
        error,
        ExpansionError::UnsupportedShape { ref operator, .. } if operator == "ThenBy"
    ));
}

#[test]
fn test_depth_limit() {
    let c = param("c");
    let query = seq(SequenceOp::Where(Filter {
        source: root("Customer"),
        predicate: lambda(&c, LogicalExpr::equal(path(&c, "City"), text("Oslo"))),
    }));
    let config = ExpansionConfig {
        max_expansion_depth: 1,
        ..Default::default()
    };

    let (_, error) = expansion_error(query, &shop(), &config);

    assert_eq!(error, ExpansionError::ExpansionDepthExceeded { depth: 1 });
}

#[test]
fn test_key_type_mismatch() {
    let yaml = SHOP.replace(
        "- { name: CustomerId, type: int32 }",
        "- { name: CustomerId, type: int64 }",
    );
    let model = EntityModel::from_yaml_str(&yaml).unwrap();
    let o = param("o");
    let query = seq(SequenceOp::Where(Filter {
        source: root("Order"),
        predicate: lambda(&o, LogicalExpr::equal(path(&o, "Customer.Name"), text("Acme"))),
    }));

    let (_, error) = expansion_error(query, &model, &ExpansionConfig::default());

    assert_eq!(
        error,
        ExpansionError::KeyTypeMismatch {
            navigation: "Order.Customer".to_string(),
            outer: ScalarType::Int64,
            inner: ScalarType::Int32,
        }
    );
}

#[test]
fn test_set_operation_with_different_includes() {
    let c = param("c");
    let left = include(
        root("Customer"),
        IncludePath::Lambda(lambda(&c, path(&c, "Orders"))),
        false,
    );
    let query = seq(SequenceOp::SetOperation(SetOperation {
        kind: SetOperationKind::Union,
        left,
        right: root("Customer"),
    }));

    let (_, error) = expansion_error(query, &shop(), &ExpansionConfig::default());

    assert!(matches!(
        error,
        ExpansionError::UnsupportedShape { ref operator, .. } if operator == "Union"
    ));
}

#[test]
fn test_select_many_over_scalar() {
    let c = param("c");
    let query = seq(SequenceOp::SelectMany(SelectMany {
        source: root("Customer"),
        collection_selector: lambda(&c, path(&c, "Name")),
        result_selector: None,
    }));

    let (_, error) = expansion_error(query, &shop(), &ExpansionConfig::default());

    assert!(matches!(
        error,
        ExpansionError::UnsupportedShape { ref operator, .. } if operator == "SelectMany"
    ));
}

#[test]
fn test_operator_after_cardinality() {
    let first = seq(SequenceOp::Cardinality(CardinalityOp {
        source: root("Customer"),
        operator: CardinalityOperator::First,
        predicate: None,
    }));
    let query = seq(SequenceOp::Cardinality(CardinalityOp {
        source: first,
        operator: CardinalityOperator::First,
        predicate: None,
    }));

    let (_, error) = expansion_error(query, &shop(), &ExpansionConfig::default());

    assert!(matches!(error, ExpansionError::UnsupportedShape { .. }));
}

#[test]
fn test_unknown_entity_root() {
    let (pass, error) = expansion_error(root("Invoice"), &shop(), &ExpansionConfig::default());

    assert_eq!(pass, Pass::NavigationExpanding);
    assert_eq!(
        error,
        ExpansionError::Model {
            source: ModelError::entity("Invoice")
        }
    );
}

#[test]
fn test_error_message_names_the_pass() {
    let error = expand_navigations(root("Invoice"), &shop(), &ExpansionConfig::default())
        .unwrap_err();

    assert_eq!(
        error.to_string(),
        "NavigationExpanding: Model: No entity type found for `Invoice`"
    );
}
