use std::fmt::Display;

use thiserror::Error;

use crate::{
    config::ConfigError, model::ModelError, query_planner::expansion::errors::ExpansionError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    NavigationExpanding,
    ExpansionReducing,
}

impl Display for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pass::NavigationExpanding => write!(f, "NavigationExpanding"),
            Pass::ExpansionReducing => write!(f, "ExpansionReducing"),
        }
    }
}

#[derive(Debug, Error)]
pub enum QueryPlannerError {
    #[error("{pass}: {source}")]
    Expansion {
        pass: Pass,
        #[source]
        source: ExpansionError,
    },

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Invalid expansion config: {0}")]
    Config(#[from] ConfigError),
}

impl QueryPlannerError {
    pub fn expansion(pass: Pass) -> impl FnOnce(ExpansionError) -> Self {
        move |source| QueryPlannerError::Expansion { pass, source }
    }
}
