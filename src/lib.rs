//! Navexpand - navigation expansion for LINQ-style query trees
//!
//! This crate rewrites navigation dereferences in a query tree into explicit
//! relational operators:
//! - reference navigations become inner or left outer joins
//! - collection navigations become correlated subqueries
//! - an entity query filter is applied once per compilation, to the first
//!   root of the filtered type
//! - eager-load requests (Include/ThenInclude) become include markers
//!
//! The entry point is [`query_planner::expand_navigations`].

pub mod utils;

pub mod config;
pub mod model;
pub mod query_planner;

pub use config::ExpansionConfig;
pub use model::EntityModel;
pub use query_planner::{expand_navigations, ExpandedQuery};
