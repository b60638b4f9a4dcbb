//! Integration tests - end-to-end expansion of query trees
//!
//! These tests build a query tree, run the full expansion pipeline against a
//! small shop model and check the rewritten tree and statistics.

mod common;
mod error_tests;
mod include_tests;
mod navigation_expansion_tests;
mod query_filter_tests;
