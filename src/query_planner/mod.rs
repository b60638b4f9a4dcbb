use std::sync::Arc;

use serde::Serialize;
use validator::Validate;

use errors::{Pass, QueryPlannerError};
use expansion::{ExpansionPass, ExpansionReducing, NavigationExpanding};
use plan_ctx::{ExpansionCtx, ExpansionStats};

use crate::{config::ExpansionConfig, model::EntityModel, query_planner::logical_expr::LogicalExpr};
use crate::utils::serde_arc;

pub mod errors;
pub mod expansion;
pub mod logical_expr;
pub mod navigation;
pub mod plan_ctx;
pub mod transformed;

/// A query tree with every navigation resolved, ready for translation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpandedQuery {
    #[serde(with = "serde_arc")]
    pub expression: Arc<LogicalExpr>,
    pub stats: ExpansionStats,
}

/// Rewrite every navigation in `query` into explicit joins and correlated
/// subqueries. The input tree is left untouched; unchanged subtrees are
/// shared with the result.
pub fn expand_navigations(
    query: Arc<LogicalExpr>,
    model: &EntityModel,
    config: &ExpansionConfig,
) -> Result<ExpandedQuery, QueryPlannerError> {
    config
        .validate()
        .map_err(|e| QueryPlannerError::Config(e.into()))?;

    let mut ctx = ExpansionCtx::new(model, config.clone());
    log::trace!("Expanding navigations of {}", query);

    let expression = NavigationExpanding
        .rewrite(query, &mut ctx)
        .map_err(QueryPlannerError::expansion(Pass::NavigationExpanding))?
        .get_expr();
    log::trace!("After NavigationExpanding: {}", expression);

    let expression = ExpansionReducing
        .rewrite(expression, &mut ctx)
        .map_err(QueryPlannerError::expansion(Pass::ExpansionReducing))?
        .get_expr();

    if config.log_expanded_tree {
        log::debug!("Expanded tree: {}", expression);
    }
    log::debug!("Navigation expansion finished ({})", ctx.stats);

    Ok(ExpandedQuery {
        expression,
        stats: ctx.stats,
    })
}
