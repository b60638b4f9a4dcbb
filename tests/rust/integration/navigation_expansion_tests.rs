// Reference navigations become joins, collection navigations correlated subqueries
use navexpand::{
    model::EntityModel,
    query_planner::{
        logical_expr::{
            AggregateFunction, AggregateOp, CardinalityOp, CardinalityOperator, Filter,
            LogicalExpr, Operator, Projection, SequenceOp, UnarySequence,
        },
        plan_ctx::ExpansionStats,
    },
};

use super::common::*;

#[test]
fn test_reference_navigation_in_filter_becomes_inner_join() {
    let o = param("o");
    let query = seq(SequenceOp::Where(Filter {
        source: root("Order"),
        predicate: lambda(&o, LogicalExpr::equal(path(&o, "Customer.City"), text("Oslo"))),
    }));

    let expanded = expand(query, &shop());

    assert_eq!(
        expanded.expression.to_string(),
        "DbSet<Order>\
         .Join(DbSet<Customer>, o#1 => o#1.CustomerId, c#2 => c#2.Id, (o#1, c#2) => <Outer = o#1, Inner = c#2>)\
         .Where(ti#3 => (ti#3.Inner.City == 'Oslo'))\
         .Select(ti#3 => ti#3.Outer)"
    );
    assert_eq!(expanded.stats.inner_joins, 1);
    assert_eq!(expanded.stats.left_joins, 0);
}

#[test]
fn test_same_navigation_in_two_filters_joins_once() {
    let o = param("o");
    let first = seq(SequenceOp::Where(Filter {
        source: root("Order"),
        predicate: lambda(&o, LogicalExpr::equal(path(&o, "Customer.City"), text("Oslo"))),
    }));
    let query = seq(SequenceOp::Where(Filter {
        source: first,
        predicate: lambda(
            &o,
            LogicalExpr::binary(Operator::NotEqual, path(&o, "Customer.Name"), text("Acme")),
        ),
    }));

    let expanded = expand(query, &shop());

    let counts = shape(&expanded.expression);
    assert_eq!(counts.inner_joins, 1);
    assert_eq!(counts.leftovers, 0);
    assert!(expanded
        .expression
        .to_string()
        .contains(".Where(ti#3 => (ti#3.Inner.Name != 'Acme'))"));
}

#[test]
fn test_second_join_relocates_earlier_mappings_under_outer() {
    let o = param("o");
    let predicate = LogicalExpr::and(
        LogicalExpr::equal(path(&o, "Customer.City"), text("Oslo")),
        LogicalExpr::equal(path(&o, "Shipper.Name"), text("Fast")),
    );
    let query = seq(SequenceOp::Where(Filter {
        source: root("Order"),
        predicate: lambda(&o, predicate),
    }));

    let expanded = expand(query, &shop());
    let rendered = expanded.expression.to_string();

    assert!(rendered.contains(
        ".Where(ti#5 => ((ti#5.Outer.Inner.City == 'Oslo') && (ti#5.Inner.Name == 'Fast')))"
    ));
    assert!(rendered.ends_with(".Select(ti#5 => ti#5.Outer.Outer)"));
    // The nullable foreign key is compared against a nullable principal key
    assert!(rendered.contains("s#4 => (s#4.Id as int32?)"));
    assert_eq!(expanded.stats.inner_joins, 1);
    assert_eq!(expanded.stats.left_joins, 1);
}

#[test]
fn test_optional_parent_makes_child_join_left_outer() {
    // DefaultIfEmpty makes every row optional, required navigations included
    let l = param("l");
    let query = seq(SequenceOp::Select(Projection {
        source: seq(SequenceOp::DefaultIfEmpty(UnarySequence {
            source: root("OrderLine"),
        })),
        selector: lambda(&l, path(&l, "Order.Customer.Name")),
    }));

    let expanded = expand(query, &shop());

    assert_eq!(expanded.stats.left_joins, 2);
    assert_eq!(expanded.stats.inner_joins, 0);
    let counts = shape(&expanded.expression);
    assert_eq!(counts.left_joins, 2);
    assert_eq!(counts.leftovers, 0);
}

#[test]
fn test_collection_navigation_becomes_correlated_subquery() {
    let c = param("c");
    let orders = LogicalExpr::member(LogicalExpr::parameter(&c), "Orders");
    let count = seq(SequenceOp::Aggregate(AggregateOp {
        source: orders,
        function: AggregateFunction::Count,
        lambda: None,
    }));
    let query = seq(SequenceOp::Where(Filter {
        source: root("Customer"),
        predicate: lambda(&c, LogicalExpr::binary(Operator::GreaterThan, count, int(0))),
    }));

    let expanded = expand(query, &shop());

    assert_eq!(
        expanded.expression.to_string(),
        "DbSet<Customer>.Where(c#1 => (DbSet<Order>\
         .Where(o#3 => Correlation((c#1.Id != null), (c#1.Id == o#3.CustomerId)))\
         .Count() > 0))"
    );
    assert_eq!(expanded.stats.correlated_subqueries, 1);
    assert_eq!(expanded.stats.inner_joins + expanded.stats.left_joins, 0);
}

#[test]
fn test_projected_collection_is_materialized() {
    let c = param("c");
    let query = seq(SequenceOp::Select(Projection {
        source: root("Customer"),
        selector: lambda(&c, LogicalExpr::member(LogicalExpr::parameter(&c), "Orders")),
    }));

    let expanded = expand(query, &shop());

    let counts = shape(&expanded.expression);
    assert_eq!(counts.materialized_collections, 1);
    assert_eq!(counts.inner_joins + counts.left_joins, 0);
    assert_eq!(counts.leftovers, 0);
    assert!(expanded
        .expression
        .to_string()
        .starts_with("DbSet<Customer>.Select(c#1 => MaterializeCollectionNavigation(Customer.Orders, "));
}

#[test]
fn test_member_after_first_is_pushed_into_projection() {
    let first = seq(SequenceOp::Cardinality(CardinalityOp {
        source: root("Order"),
        operator: CardinalityOperator::First,
        predicate: None,
    }));
    let query = LogicalExpr::member(first, "Customer");

    let expanded = expand(query, &shop());

    assert_eq!(
        expanded.expression.to_string(),
        "DbSet<Order>\
         .Join(DbSet<Customer>, o#1 => o#1.CustomerId, c#2 => c#2.Id, (o#1, c#2) => <Outer = o#1, Inner = c#2>)\
         .Select(ti#3 => ti#3.Inner)\
         .First()"
    );
}

#[test]
fn test_query_without_navigations_is_only_renamed() {
    let c = param("c");
    let query = seq(SequenceOp::Where(Filter {
        source: root("Customer"),
        predicate: lambda(&c, LogicalExpr::equal(path(&c, "City"), text("Oslo"))),
    }));

    let expanded = expand(query, &shop());

    assert_eq!(
        expanded.expression.to_string(),
        "DbSet<Customer>.Where(c#1 => (c#1.City == 'Oslo'))"
    );
    assert_eq!(expanded.stats, ExpansionStats::default());
}

#[test]
fn test_owned_navigation_is_read_in_place() {
    let yaml = SHOP.replace(
        "relationships:\n",
        "  - name: Address\n    key: [CustomerId]\n    properties:\n      - { name: CustomerId, type: int32 }\n      - { name: Street, type: string }\nrelationships:\n  - principal: Customer\n    dependent: Address\n    foreign_key: [CustomerId]\n    unique: true\n    owned: true\n    principal_to_dependent: Address\n",
    );
    let model = EntityModel::from_yaml_str(&yaml).unwrap();
    let c = param("c");
    let query = seq(SequenceOp::Where(Filter {
        source: root("Customer"),
        predicate: lambda(&c, LogicalExpr::equal(path(&c, "Address.Street"), text("Main"))),
    }));

    let expanded = expand(query, &model);

    assert_eq!(
        expanded.expression.to_string(),
        "DbSet<Customer>.Where(c#1 => (c#1.Address.Street == 'Main'))"
    );
    assert_eq!(expanded.stats.inner_joins + expanded.stats.left_joins, 0);
}

#[test]
fn test_composite_foreign_key_joins_on_anonymous_keys() {
    let yaml = r#"
entities:
  - name: Product
    key: [Sku, Region]
    properties:
      - { name: Sku, type: string }
      - { name: Region, type: int32 }
      - { name: Name, type: string }
  - name: Stock
    key: [Id]
    properties:
      - { name: Id, type: int32 }
      - { name: Sku, type: string }
      - { name: ProductRegion, type: int32, nullable: true }
relationships:
  - principal: Product
    dependent: Stock
    foreign_key: [Sku, ProductRegion]
    dependent_to_principal: Product
"#;
    let model = EntityModel::from_yaml_str(yaml).unwrap();
    let s = param("s");
    let query = seq(SequenceOp::Where(Filter {
        source: root("Stock"),
        predicate: lambda(&s, LogicalExpr::equal(path(&s, "Product.Name"), text("Widget"))),
    }));

    let expanded = expand(query, &model);

    // The nullable side decides the key type of both sides
    assert_eq!(
        expanded.expression.to_string(),
        "DbSet<Stock>\
         .Join(DbSet<Product>, s#1 => new { Item1 = s#1.Sku, Item2 = s#1.ProductRegion }, \
         p#2 => new { Item1 = p#2.Sku, Item2 = (p#2.Region as int32?) }, \
         (s#1, p#2) => <Outer = s#1, Inner = p#2>)\
         .Where(ti#3 => (ti#3.Inner.Name == 'Widget'))\
         .Select(ti#3 => ti#3.Outer)"
    );
    assert_eq!(expanded.stats.inner_joins, 1);
}
