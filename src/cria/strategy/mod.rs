//! Pluggable reduction strategies.
//!
//! A [`Strategy`] is attached to a [`crate::cria::node::ScopeNode`] and
//! invoked by the fit loop when that scope is the bottom-most scope at the
//! currently selected priority. It receives the scope (as a [`Node`]) and
//! returns its replacement: `None` means "drop this subtree entirely,"
//! `Some(node)` means "splice `node` in its place." A strategy that cannot
//! usefully reduce its input should return the input unchanged rather than
//! erroring — the fit loop's own no-progress check is what turns "nothing
//! changed" into a user-visible failure.

pub mod last_n;
pub mod omit;
pub mod summary;
pub mod truncate;
pub mod vector_search;

use std::error::Error;
use std::fmt;

use async_trait::async_trait;

use super::context::Context;
use super::node::Node;

/// Everything a [`Strategy`] needs to decide how to reduce `target`.
#[derive(Debug, Clone)]
pub struct StrategyInput {
    /// The scope being reduced, including its current children.
    pub target: Node,
    /// The context inherited down to `target` (shallow-merged).
    pub context: Context,
    /// Total token count of the whole layout as of this iteration, for
    /// strategies that want global awareness (e.g. deciding how aggressively
    /// to cut). Most strategies only need `target`.
    pub total_tokens: u64,
    /// The fit loop iteration this call is part of, starting at 0.
    pub iteration: u64,
}

/// A reduction strategy. Implementations are side-effect-free with respect
/// to the tree itself — persistence (e.g. [`crate::cria::memory::KVMemory`])
/// is the only sanctioned side effect.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Produce `target`'s replacement, or `None` to drop it.
    async fn apply(&self, input: StrategyInput) -> Result<Option<Node>, Box<dyn Error + Send + Sync>>;

    /// Human-readable strategy name, used in logging and hook events.
    fn name(&self) -> &str;
}

/// A strategy declined to run because its preconditions weren't met (e.g.
/// [`summary::SummaryStrategy`] applied to a scope with no `id`).
#[derive(Debug, Clone)]
pub struct StrategyPreconditionError {
    pub reason: String,
}

impl fmt::Display for StrategyPreconditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "strategy precondition not met: {}", self.reason)
    }
}

impl Error for StrategyPreconditionError {}
