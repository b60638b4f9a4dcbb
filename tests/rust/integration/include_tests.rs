// Eager loading: Include/ThenInclude become markers, reference includes joins
use navexpand::query_planner::logical_expr::{
    AggregateFunction, AggregateOp, IncludeOp, IncludePath, LogicalExpr, Projection, SequenceOp,
};

use super::common::*;

fn include(source: std::sync::Arc<LogicalExpr>, path: IncludePath) -> std::sync::Arc<LogicalExpr> {
    seq(SequenceOp::Include(IncludeOp {
        source,
        path,
        then_include: false,
    }))
}

fn then_include(
    source: std::sync::Arc<LogicalExpr>,
    path: IncludePath,
) -> std::sync::Arc<LogicalExpr> {
    seq(SequenceOp::Include(IncludeOp {
        source,
        path,
        then_include: true,
    }))
}

fn nav(p: &str, navigation: &str) -> IncludePath {
    let p = param(p);
    IncludePath::Lambda(lambda(&p, path(&p, navigation)))
}

#[test]
fn test_collection_include_becomes_materialized_subquery() {
    let query = include(root("Customer"), nav("c", "Orders"));

    let expanded = expand(query, &shop());

    assert_eq!(
        expanded.expression.to_string(),
        "DbSet<Customer>.Select(c#1 => Include(c#1, MaterializeCollectionNavigation(Customer.Orders, \
         DbSet<Order>.Where(o#3 => Correlation((c#1.Id != null), (c#1.Id == o#3.CustomerId)))), \
         Customer.Orders))"
    );
    assert_eq!(expanded.stats.include_markers, 1);
    assert_eq!(expanded.stats.correlated_subqueries, 1);
    assert_eq!(expanded.stats.inner_joins + expanded.stats.left_joins, 0);
}

#[test]
fn test_reference_include_is_joined_during_reduction() {
    let query = include(root("Order"), nav("o", "Customer"));

    let expanded = expand(query, &shop());

    assert_eq!(
        expanded.expression.to_string(),
        "DbSet<Order>\
         .Join(DbSet<Customer>, o#1 => o#1.CustomerId, c#2 => c#2.Id, (o#1, c#2) => <Outer = o#1, Inner = c#2>)\
         .Select(ti#3 => Include(ti#3.Outer, ti#3.Inner, Order.Customer))"
    );
    assert_eq!(expanded.stats.inner_joins, 1);
    assert_eq!(expanded.stats.include_markers, 1);
}

#[test]
fn test_then_include_is_carried_into_collection_subquery() {
    let query = then_include(
        include(root("Customer"), nav("c", "Orders")),
        nav("o", "Lines"),
    );

    let expanded = expand(query, &shop());

    let counts = shape(&expanded.expression);
    assert_eq!(counts.includes, 2);
    assert_eq!(counts.materialized_collections, 2);
    assert_eq!(counts.leftovers, 0);
    assert_eq!(expanded.stats.include_markers, 2);
    assert!(expanded.expression.to_string().contains("Order.Lines"));
}

#[test]
fn test_dotted_string_path_includes_every_segment() {
    let query = include(root("Order"), IncludePath::Text("Customer.Region".to_string()));

    let expanded = expand(query, &shop());

    let counts = shape(&expanded.expression);
    assert_eq!(counts.inner_joins, 2);
    assert_eq!(counts.includes, 2);
    assert_eq!(counts.leftovers, 0);
    let rendered = expanded.expression.to_string();
    assert!(rendered.contains("Order.Customer"));
    assert!(rendered.contains("Customer.Region"));
}

#[test]
fn test_include_is_dropped_by_aggregate() {
    let query = seq(SequenceOp::Aggregate(AggregateOp {
        source: include(root("Customer"), nav("c", "Orders")),
        function: AggregateFunction::Count,
        lambda: None,
    }));

    let expanded = expand(query, &shop());

    assert_eq!(expanded.expression.to_string(), "DbSet<Customer>.Count()");
    assert_eq!(expanded.stats.include_markers, 0);
    assert_eq!(expanded.stats.correlated_subqueries, 0);
}

#[test]
fn test_include_is_ignored_when_entity_is_projected_away() {
    let o = param("o");
    let query = seq(SequenceOp::Select(Projection {
        source: include(root("Order"), nav("o", "Customer")),
        selector: lambda(&o, path(&o, "Total")),
    }));

    let expanded = expand(query, &shop());

    assert_eq!(
        expanded.expression.to_string(),
        "DbSet<Order>.Select(o#1 => o#1.Total)"
    );
    assert_eq!(expanded.stats.include_markers, 0);
    assert_eq!(expanded.stats.inner_joins, 0);
}

#[test]
fn test_include_survives_anonymous_projection() {
    let o = param("o");
    let query = seq(SequenceOp::Select(Projection {
        source: include(root("Order"), nav("o", "Customer")),
        selector: lambda(
            &o,
            LogicalExpr::new_object(vec![
                ("Order".to_string(), LogicalExpr::parameter(&o)),
                ("Total".to_string(), path(&o, "Total")),
            ]),
        ),
    }));

    let expanded = expand(query, &shop());

    let counts = shape(&expanded.expression);
    assert_eq!(counts.includes, 1);
    assert_eq!(counts.inner_joins, 1);
    assert_eq!(counts.leftovers, 0);
}
