//! The simplest reduction strategy: drop the scope unconditionally.

use std::error::Error;

use async_trait::async_trait;

use super::{Strategy, StrategyInput};
use crate::cria::node::Node;

/// Always returns `None` — the scope and everything under it is removed
/// from the layout the next time this strategy is applied.
#[derive(Debug, Default, Clone, Copy)]
pub struct OmitStrategy;

#[async_trait]
impl Strategy for OmitStrategy {
    async fn apply(&self, _input: StrategyInput) -> Result<Option<Node>, Box<dyn Error + Send + Sync>> {
        Ok(None)
    }

    fn name(&self) -> &str {
        "omit"
    }
}
