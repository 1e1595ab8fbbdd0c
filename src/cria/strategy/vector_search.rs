//! Replaces a scope with a message summarizing the results of a similarity
//! search. The query is read from `context.extra["query"]`; a missing
//! query produces a placeholder message rather than an error, since "no
//! query yet" is a normal state for a scope that hasn't been asked anything.

use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Strategy, StrategyInput};
use crate::cria::memory::{VectorMemory, VectorSearchOptions};
use crate::cria::node::{Node, Part, Role};

const QUERY_KEY: &str = "query";
const NO_QUERY_PLACEHOLDER: &str = "[No query available for vector search]";

/// Queries a [`VectorMemory`] and formats the results into one message.
pub struct VectorSearchStrategy {
    memory: Arc<dyn VectorMemory<String>>,
    role: Role,
    options: VectorSearchOptions,
}

impl VectorSearchStrategy {
    #[must_use]
    pub fn new(memory: Arc<dyn VectorMemory<String>>) -> Self {
        Self {
            memory,
            role: Role::User,
            options: VectorSearchOptions::default(),
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: VectorSearchOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl Strategy for VectorSearchStrategy {
    async fn apply(&self, input: StrategyInput) -> Result<Option<Node>, Box<dyn Error + Send + Sync>> {
        let query = input
            .context
            .get(QUERY_KEY)
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let text = match query {
            None => NO_QUERY_PLACEHOLDER.to_string(),
            Some(query) => {
                let results = self.memory.search(&query, self.options.clone()).await?;
                if results.is_empty() {
                    log::warn!("vector search for \"{query}\" returned no results");
                    format!("[No results for query \"{query}\"]")
                } else {
                    let mut lines = vec![format!("Relevant context for \"{query}\":")];
                    for result in &results {
                        lines.push(format!("- ({:.3}) {}", result.score, result.entry.data));
                    }
                    lines.join("\n")
                }
            }
        };

        Ok(Some(Node::message(self.role, vec![Part::text(text)])))
    }

    fn name(&self) -> &str {
        "vector-search"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cria::context::Context;
    use crate::cria::memory::{Entry, MemoryError, VectorSearchResult};
    use serde_json::json;

    struct FixedResults(Vec<VectorSearchResult<String>>);

    #[async_trait]
    impl VectorMemory<String> for FixedResults {
        async fn search(
            &self,
            _query: &str,
            _options: VectorSearchOptions,
        ) -> Result<Vec<VectorSearchResult<String>>, MemoryError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn missing_query_produces_placeholder() {
        let strategy = VectorSearchStrategy::new(Arc::new(FixedResults(vec![])));
        let target = Node::scope(0, vec![]);
        let input = StrategyInput {
            target,
            context: Context::new(),
            total_tokens: 0,
            iteration: 0,
        };
        let replaced = strategy.apply(input).await.unwrap().unwrap();
        match replaced {
            Node::Message(m) => match &m.children[0] {
                Part::Text { text } => assert_eq!(text, NO_QUERY_PLACEHOLDER),
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn query_formats_results_into_one_message() {
        let results = vec![VectorSearchResult {
            key: "k1".into(),
            score: 0.9,
            entry: Entry::new("relevant fact".to_string()),
        }];
        let strategy = VectorSearchStrategy::new(Arc::new(FixedResults(results)));
        let target = Node::scope(0, vec![]);
        let context = Context::new().with_extra(QUERY_KEY, json!("what happened?"));
        let input = StrategyInput {
            target,
            context,
            total_tokens: 0,
            iteration: 0,
        };
        let replaced = strategy.apply(input).await.unwrap().unwrap();
        match replaced {
            Node::Message(m) => match &m.children[0] {
                Part::Text { text } => {
                    assert!(text.contains("relevant fact"));
                    assert!(text.contains("what happened?"));
                }
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }
}
