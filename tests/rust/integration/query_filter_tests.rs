// Entity query filters
use navexpand::{
    config::ExpansionConfig,
    query_planner::{
        expand_navigations,
        logical_expr::{Filter, LogicalExpr, Projection, SequenceOp, SetOperation, SetOperationKind},
    },
};

use super::common::*;

const NOT_OSLO: (&str, &str) = ("Customer", "c => c.City != 'Oslo'");

#[test]
fn test_filter_is_applied_to_entity_root() {
    let model = shop_with_filters(&[NOT_OSLO]);

    let expanded = expand(root("Customer"), &model);

    assert_eq!(
        expanded.expression.to_string(),
        "DbSet<Customer>.Where(c#1 => (c#1.City != 'Oslo'))"
    );
    assert_eq!(expanded.stats.query_filters_applied, 1);
}

#[test]
fn test_filter_is_applied_to_joined_navigation_target() {
    let model = shop_with_filters(&[NOT_OSLO]);
    let o = param("o");
    let query = seq(SequenceOp::Where(Filter {
        source: root("Order"),
        predicate: lambda(&o, LogicalExpr::equal(path(&o, "Customer.Name"), text("Acme"))),
    }));

    let expanded = expand(query, &model);

    assert_eq!(
        expanded.expression.to_string(),
        "DbSet<Order>\
         .Join(DbSet<Customer>.Where(c#2 => (c#2.City != 'Oslo')), o#1 => o#1.CustomerId, c#2 => c#2.Id, (o#1, c#2) => <Outer = o#1, Inner = c#2>)\
         .Where(ti#4 => (ti#4.Inner.Name == 'Acme'))\
         .Select(ti#4 => ti#4.Outer)"
    );
}

#[test]
fn test_filter_is_applied_once_per_entity_type() {
    let model = shop_with_filters(&[NOT_OSLO]);
    let query = seq(SequenceOp::SetOperation(SetOperation {
        kind: SetOperationKind::Concat,
        left: root("Customer"),
        right: root("Customer"),
    }));

    let expanded = expand(query, &model);

    assert_eq!(
        expanded.expression.to_string(),
        "DbSet<Customer>.Where(c#1 => (c#1.City != 'Oslo')).Concat(DbSet<Customer>)"
    );
    assert_eq!(expanded.stats.query_filters_applied, 1);
}

#[test]
fn test_filter_is_applied_once_across_two_joins_to_same_type() {
    let model = shop_with_filters(&[NOT_OSLO]);
    let orders_where = |member: &str, value: &str| {
        let o = param("o");
        seq(SequenceOp::Where(Filter {
            source: root("Order"),
            predicate: lambda(&o, LogicalExpr::equal(path(&o, member), text(value))),
        }))
    };
    let query = seq(SequenceOp::SetOperation(SetOperation {
        kind: SetOperationKind::Concat,
        left: orders_where("Customer.Name", "Acme"),
        right: orders_where("Customer.City", "Bergen"),
    }));

    let expanded = expand(query, &model);
    let text = expanded.expression.to_string();

    assert_eq!(expanded.stats.inner_joins, 2);
    assert_eq!(expanded.stats.query_filters_applied, 1);
    assert_eq!(text.matches("!= 'Oslo'").count(), 1);
    assert_eq!(text.matches(".Join(DbSet<Customer>.Where(").count(), 1);
    assert_eq!(text.matches(".Join(DbSet<Customer>, ").count(), 1);
}

#[test]
fn test_ignore_query_filters() {
    let model = shop_with_filters(&[NOT_OSLO]);
    let config = ExpansionConfig {
        ignore_query_filters: true,
        ..Default::default()
    };

    let expanded = expand_navigations(root("Customer"), &model, &config).unwrap();

    assert_eq!(expanded.expression.to_string(), "DbSet<Customer>");
    assert_eq!(expanded.stats.query_filters_applied, 0);
}

#[test]
fn test_filter_is_applied_inside_correlated_subquery() {
    let model = shop_with_filters(&[("Order", "o => o.Total > 0")]);
    let c = param("c");
    let query = seq(SequenceOp::Select(Projection {
        source: root("Customer"),
        selector: lambda(&c, LogicalExpr::member(LogicalExpr::parameter(&c), "Orders")),
    }));

    let expanded = expand(query, &model);

    assert!(expanded
        .expression
        .to_string()
        .contains("DbSet<Order>.Where(o#3 => (o#3.Total > 0)).Where(o#3 => Correlation("));
    assert_eq!(expanded.stats.query_filters_applied, 1);
    assert_eq!(expanded.stats.correlated_subqueries, 1);
}

#[test]
fn test_filter_with_navigation_is_expanded() {
    let model = shop_with_filters(&[("Order", "o => o.Customer.City != 'Oslo'")]);

    let expanded = expand(root("Order"), &model);

    let counts = shape(&expanded.expression);
    assert_eq!(counts.inner_joins, 1);
    assert_eq!(counts.leftovers, 0);
    assert!(expanded
        .expression
        .to_string()
        .contains(".Where(ti#4 => (ti#4.Inner.City != 'Oslo'))"));
}
