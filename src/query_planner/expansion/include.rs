//! Include / ThenInclude handling.
//!
//! Includes only record requests on the include channel of the navigation
//! tree; joins and markers for them are produced during reduction.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::{Expander, ExpansionError, ExpansionResult};
use crate::query_planner::{
    logical_expr::{
        visitors::apply_lambda, IncludeOp, IncludePath, LogicalExpr, NavigationBinding,
        NavigationExpansion,
    },
    navigation::{NavigationChannel, NodeId},
};

impl Expander<'_, '_> {
    pub(super) fn process_include(&mut self, include: &IncludeOp) -> ExpansionResult<Arc<LogicalExpr>> {
        let mut source = self.visit_source(&include.source)?;

        let start = if include.then_include {
            match &source.state.pending_include_chain {
                Some(chain) => Arc::new(LogicalExpr::NavigationBinding(chain.clone())),
                None => {
                    return Err(ExpansionError::unsupported(
                        "ThenInclude",
                        "no preceding Include on this source",
                    ));
                }
            }
        } else {
            Arc::clone(&source.state.pending_selector.body)
        };

        let included = match &include.path {
            IncludePath::Text(path) => self.include_text_path(&start, path)?,
            IncludePath::Lambda(lambda) => {
                let body = apply_lambda(lambda, &[Arc::clone(&start)]);
                let bound = self.bind(&body, NavigationChannel::Include)?;
                match bound.as_ref() {
                    LogicalExpr::NavigationBinding(binding)
                        if self.ctx.tree().node(binding.node).navigation.is_some() =>
                    {
                        binding.clone()
                    }
                    _ => {
                        return Err(ExpansionError::InvalidIncludePath {
                            path: lambda.to_string(),
                        });
                    }
                }
            }
        };

        log::debug!(
            "Include requested for {}",
            self.ctx
                .tree()
                .node(included.node)
                .navigation
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default()
        );
        source.state.pending_include_chain = Some(included);
        Ok(source.into_expr())
    }

    /// Resolve `"Customer.Region"` one navigation at a time.
    fn include_text_path(
        &mut self,
        start: &Arc<LogicalExpr>,
        path: &str,
    ) -> ExpansionResult<NavigationBinding> {
        let invalid = || ExpansionError::InvalidIncludePath {
            path: path.to_string(),
        };
        let mut current = match start.as_ref() {
            LogicalExpr::NavigationBinding(binding) => binding.clone(),
            _ => return Err(invalid()),
        };

        let model = self.ctx.model();
        let mut segments = path.split('.').map(str::trim).peekable();
        if segments.peek().is_none() {
            return Err(invalid());
        }
        for segment in segments {
            let navigation = model
                .navigation(&current.entity_type, segment)
                .ok_or_else(invalid)?;
            let node = self
                .ctx
                .tree
                .create(navigation, current.node, NavigationChannel::Include)?;
            current = NavigationBinding {
                root_parameter: current.root_parameter.clone(),
                node,
                entity_type: navigation.target_entity.clone(),
                source_mapping: current.source_mapping,
            };
        }
        Ok(current)
    }

    /// Root-relative paths of every navigation a source still has to include.
    pub(super) fn include_signature(
        &self,
        source: &NavigationExpansion,
    ) -> ExpansionResult<BTreeSet<Vec<String>>> {
        let tree = self.ctx.tree();
        let mut signature = BTreeSet::new();
        for source_mapping in &source.state.source_mappings {
            let root = self.ctx.source_root(*source_mapping)?;
            let mut stack: Vec<(NodeId, Vec<String>)> = vec![(root, Vec::new())];
            while let Some((id, path)) = stack.pop() {
                for child in &tree.node(id).children {
                    let node = tree.node(*child);
                    if !node.include_state.is_needed() {
                        continue;
                    }
                    let mut child_path = path.clone();
                    child_path.push(node.name().unwrap_or_default().to_string());
                    signature.insert(child_path.clone());
                    stack.push((*child, child_path));
                }
            }
        }
        Ok(signature)
    }
}
