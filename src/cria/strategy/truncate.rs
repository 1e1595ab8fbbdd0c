//! Drops whole child messages from one end of a scope, never splitting a
//! message's content, until the subtree's own token count is at or under
//! `budget_t`. A scope already within `budget_t` is returned unchanged; a
//! scope with no children left to drop (and still over budget) is also
//! returned unchanged, leaving the fit loop's no-progress check to surface
//! that as a failure.

use std::error::Error;

use async_trait::async_trait;

use super::{Strategy, StrategyInput, StrategyPreconditionError};
use crate::cria::layout::layout;
use crate::cria::node::Node;
use crate::cria::token_counter::total_tokens;

/// Which end of a scope's children to drop from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncateFrom {
    /// Drop the oldest children first.
    Start,
    /// Drop the newest children first.
    End,
}

/// Truncates a scope's children from one end until it fits `budget_t`.
#[derive(Debug, Clone, Copy)]
pub struct TruncateStrategy {
    pub from: TruncateFrom,
    pub budget_t: u64,
}

impl TruncateStrategy {
    #[must_use]
    pub fn new(from: TruncateFrom, budget_t: u64) -> Self {
        Self { from, budget_t }
    }
}

#[async_trait]
impl Strategy for TruncateStrategy {
    async fn apply(&self, input: StrategyInput) -> Result<Option<Node>, Box<dyn Error + Send + Sync>> {
        let scope = match input.target {
            Node::Scope(scope) => scope,
            message @ Node::Message(_) => return Ok(Some(message)),
        };

        let provider = input.context.provider.clone().ok_or_else(|| -> Box<dyn Error + Send + Sync> {
            Box::new(StrategyPreconditionError {
                reason: "truncate strategy requires a provider in context to count tokens".into(),
            })
        })?;

        let subtree_tokens = |children: &[Node]| -> Result<u64, Box<dyn Error + Send + Sync>> {
            let probe = Node::scope(scope.priority, children.to_vec());
            let laid_out = layout(&probe)?;
            Ok(total_tokens(&laid_out, provider.as_ref()))
        };

        let mut children = scope.children.clone();
        while subtree_tokens(&children)? > self.budget_t && !children.is_empty() {
            match self.from {
                TruncateFrom::Start => {
                    children.remove(0);
                }
                TruncateFrom::End => {
                    children.pop();
                }
            }
        }

        if children.len() == scope.children.len() {
            return Ok(Some(Node::Scope(scope)));
        }

        let mut replacement = Node::scope(scope.priority, children);
        if let Some(id) = &scope.id {
            replacement = replacement.with_id(id.clone());
        }
        if let Some(strategy) = &scope.strategy {
            replacement = replacement.with_strategy(strategy.clone());
        }
        if let Some(context) = &scope.context {
            replacement = replacement.with_context(context.clone());
        }
        Ok(Some(replacement))
    }

    fn name(&self) -> &str {
        "truncate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cria::codec::chat_completions::ChatCompletionsCodec;
    use crate::cria::context::Context;
    use crate::cria::layout::FinalizedMessage;
    use crate::cria::node::{Part, Role};
    use crate::cria::provider::{CompositeCodec, IdentityAdapter, ModelProvider, ProtocolProvider, TokenCounter};
    use std::sync::Arc;

    struct WordCounter;
    impl TokenCounter for WordCounter {
        fn count_message_tokens(&self, message: &FinalizedMessage) -> u64 {
            let text = match message {
                FinalizedMessage::SystemLike { text, .. } => text.clone(),
                FinalizedMessage::Assistant { text, .. } => text.clone(),
                FinalizedMessage::Tool { .. } => String::new(),
            };
            text.split_whitespace().count() as u64
        }
        fn count_boundary_tokens(&self, _prev: Option<&FinalizedMessage>, _next: Option<&FinalizedMessage>) -> u64 {
            0
        }
    }

    fn test_context() -> Context {
        let codec = CompositeCodec::new(Arc::new(ChatCompletionsCodec), Arc::new(IdentityAdapter));
        let provider: Arc<dyn ModelProvider> = Arc::new(ProtocolProvider::new("test", codec, WordCounter));
        Context::with_provider(provider)
    }

    fn user(text: &str) -> Node {
        Node::message(Role::User, vec![Part::text(text)])
    }

    #[tokio::test]
    async fn drops_from_start_until_under_budget() {
        // Three one-word messages; a budget of 1 word only leaves room for
        // the last one once the first two are dropped.
        let target = Node::scope(0, vec![user("a"), user("b"), user("c")]).with_id("s");
        let strategy = TruncateStrategy::new(TruncateFrom::Start, 1);
        let input = StrategyInput {
            target,
            context: test_context(),
            total_tokens: 10,
            iteration: 0,
        };
        let replaced = strategy.apply(input).await.unwrap().unwrap();
        match replaced {
            Node::Scope(scope) => {
                assert_eq!(scope.children.len(), 1);
                assert_eq!(scope.id.as_deref(), Some("s"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn drops_from_end_until_under_budget() {
        let target = Node::scope(0, vec![user("a"), user("b"), user("c")]);
        let strategy = TruncateStrategy::new(TruncateFrom::End, 2);
        let input = StrategyInput {
            target,
            context: test_context(),
            total_tokens: 10,
            iteration: 0,
        };
        let replaced = strategy.apply(input).await.unwrap().unwrap();
        match replaced {
            Node::Scope(scope) => assert_eq!(scope.children.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn already_under_budget_is_returned_unchanged() {
        let target = Node::scope(0, vec![user("a"), user("b")]);
        let strategy = TruncateStrategy::new(TruncateFrom::Start, 10);
        let input = StrategyInput {
            target,
            context: test_context(),
            total_tokens: 2,
            iteration: 0,
        };
        let replaced = strategy.apply(input).await.unwrap().unwrap();
        match replaced {
            Node::Scope(scope) => assert_eq!(scope.children.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_scope_is_returned_unchanged() {
        let target = Node::scope(0, vec![]);
        let strategy = TruncateStrategy::new(TruncateFrom::Start, 0);
        let input = StrategyInput {
            target,
            context: test_context(),
            total_tokens: 0,
            iteration: 0,
        };
        let replaced = strategy.apply(input).await.unwrap().unwrap();
        match replaced {
            Node::Scope(scope) => assert!(scope.children.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn drops_every_child_when_none_alone_fits_the_budget() {
        // One message whose token count alone exceeds the budget: dropping
        // it empties the scope rather than looping forever trying to reach
        // a budget_t that no non-empty set of children can satisfy.
        let target = Node::scope(0, vec![user("one two three")]);
        let strategy = TruncateStrategy::new(TruncateFrom::Start, 1);
        let input = StrategyInput {
            target,
            context: test_context(),
            total_tokens: 10,
            iteration: 0,
        };
        let replaced = strategy.apply(input).await.unwrap().unwrap();
        match replaced {
            Node::Scope(scope) => assert!(scope.children.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_provider_is_a_precondition_error() {
        let target = Node::scope(0, vec![user("a"), user("b")]);
        let strategy = TruncateStrategy::new(TruncateFrom::Start, 0);
        let input = StrategyInput {
            target,
            context: Context::new(),
            total_tokens: 2,
            iteration: 0,
        };
        assert!(strategy.apply(input).await.is_err());
    }
}
