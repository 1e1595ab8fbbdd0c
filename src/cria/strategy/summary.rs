//! Replaces a scope with a single summary message. The summary text is
//! produced by a caller-supplied [`Summarizer`] on every call, threading
//! the previous render's summary back in so the summarizer can update it
//! incrementally rather than starting from the raw subtree each time, and
//! the fresh result is written back to a [`KVMemory`] keyed by the scope's
//! `id`.

use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Strategy, StrategyInput, StrategyPreconditionError};
use crate::cria::layout::layout;
use crate::cria::memory::KVMemory;
use crate::cria::node::{Node, Part, Role};

const SUMMARY_PREFIX: &str = "[Summary of earlier conversation]\n";

/// Produces a summary string from the concatenated text of a subtree,
/// given the previous summary if one was already cached for this scope.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        text: String,
        existing_summary: Option<String>,
    ) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// Summarizes a scope's content, caching the result under the scope's `id`.
pub struct SummaryStrategy {
    memory: Arc<dyn KVMemory<String>>,
    summarizer: Arc<dyn Summarizer>,
}

impl SummaryStrategy {
    #[must_use]
    pub fn new(memory: Arc<dyn KVMemory<String>>, summarizer: Arc<dyn Summarizer>) -> Self {
        Self { memory, summarizer }
    }
}

/// Joins a finalized layout's message text into one document, prefixing each
/// entry with its role so the summarizer can tell turns apart.
fn subtree_text(node: &Node) -> Result<String, Box<dyn Error + Send + Sync>> {
    let laid_out = layout(node)?;
    let mut parts = Vec::with_capacity(laid_out.len());
    for message in &laid_out.messages {
        use crate::cria::layout::FinalizedMessage;
        let (role, text) = match message {
            FinalizedMessage::SystemLike { role, text } => (format!("{role:?}"), text.clone()),
            FinalizedMessage::Assistant { text, .. } => ("Assistant".to_string(), text.clone()),
            FinalizedMessage::Tool { output, .. } => ("Tool".to_string(), output.to_string()),
        };
        parts.push(format!("{role}: {text}"));
    }
    Ok(parts.join("\n"))
}

#[async_trait]
impl Strategy for SummaryStrategy {
    async fn apply(&self, input: StrategyInput) -> Result<Option<Node>, Box<dyn Error + Send + Sync>> {
        let key = input
            .target
            .semantic_id()
            .ok_or_else(|| -> Box<dyn Error + Send + Sync> {
                Box::new(StrategyPreconditionError {
                    reason: "summary strategy requires the scope to have an id".into(),
                })
            })?
            .to_string();

        let existing_summary = self.memory.get(&key).await?.map(|entry| entry.data);
        let doc = subtree_text(&input.target)?;
        let content = self.summarizer.summarize(doc, existing_summary).await?;
        self.memory.set(&key, content.clone(), None).await?;

        let message = Node::message(
            Role::Assistant,
            vec![Part::text(format!("{SUMMARY_PREFIX}{content}"))],
        )
        .with_id(key);
        Ok(Some(message))
    }

    fn name(&self) -> &str {
        "summary"
    }
}
