//! Keeps only the last `n` message descendants of a scope, wrapping
//! them in a fresh scope that preserves the target's `id`.

use std::error::Error;

use async_trait::async_trait;

use super::{Strategy, StrategyInput};
use crate::cria::node::Node;

/// Keeps the last `n` messages in depth-first, left-to-right order,
/// discarding everything before them.
#[derive(Debug, Clone, Copy)]
pub struct LastNStrategy {
    pub n: usize,
}

impl LastNStrategy {
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self { n }
    }
}

fn collect_messages(node: &Node, out: &mut Vec<Node>) {
    match node {
        Node::Message(_) => out.push(node.clone()),
        Node::Scope(scope) => {
            for child in &scope.children {
                collect_messages(child, out);
            }
        }
    }
}

#[async_trait]
impl Strategy for LastNStrategy {
    async fn apply(&self, input: StrategyInput) -> Result<Option<Node>, Box<dyn Error + Send + Sync>> {
        let scope = match input.target {
            Node::Scope(scope) => scope,
            message @ Node::Message(_) => return Ok(Some(message)),
        };

        let mut messages = Vec::new();
        for child in &scope.children {
            collect_messages(child, &mut messages);
        }
        let kept = if messages.len() > self.n {
            messages.split_off(messages.len() - self.n)
        } else {
            messages
        };

        let mut replacement = Node::scope(scope.priority, kept);
        if let Some(id) = &scope.id {
            replacement = replacement.with_id(id.clone());
        }
        if let Some(context) = &scope.context {
            replacement = replacement.with_context(context.clone());
        }
        Ok(Some(replacement))
    }

    fn name(&self) -> &str {
        "last-n"
    }
}
