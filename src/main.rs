use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use navexpand::{
    config::{self, ExpansionConfig},
    model::EntityModel,
    query_planner::{expand_navigations, logical_expr::LogicalExpr},
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Navexpand - expand navigations of a query tree into joins and subqueries
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Entity model definition (YAML)
    #[arg(long)]
    model: PathBuf,

    /// Query tree to expand (JSON)
    #[arg(long)]
    query: PathBuf,

    /// Skip entity query filters
    #[arg(long)]
    ignore_query_filters: bool,

    /// Maximum nesting depth of the expansion traversal [default: 128]
    #[arg(long = "max-depth")]
    max_expansion_depth: Option<u32>,

    /// Log the expanded tree at debug level
    #[arg(long)]
    log_expanded_tree: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

impl From<&Cli> for config::CliConfig {
    fn from(cli: &Cli) -> Self {
        // An absent flag leaves the environment setting alone
        config::CliConfig {
            ignore_query_filters: cli.ignore_query_filters.then_some(true),
            max_expansion_depth: cli.max_expansion_depth,
            log_expanded_tree: cli.log_expanded_tree.then_some(true),
        }
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    // Defaults to INFO level, can be overridden with RUST_LOG env var
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = ExpansionConfig::from_env().context("reading NAVEXPAND_* environment")?;
    config.merge((&cli).into())?;

    let model = EntityModel::from_yaml_file(&cli.model)
        .with_context(|| format!("loading model {}", cli.model.display()))?;
    let query_text = fs::read_to_string(&cli.query)
        .with_context(|| format!("reading query {}", cli.query.display()))?;
    let query: LogicalExpr = serde_json::from_str(&query_text)
        .with_context(|| format!("parsing query {}", cli.query.display()))?;

    log::info!("Expanding {}", query);
    let expanded = expand_navigations(Arc::new(query), &model, &config)?;

    match cli.format {
        OutputFormat::Text => {
            println!("{}", expanded.expression);
            println!("-- {}", expanded.stats);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&expanded)?),
    }
    Ok(())
}
