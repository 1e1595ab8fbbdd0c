//! The prompt intermediate representation: a tagged tree of scope and
//! message nodes, and the typed parts a message node may carry.
//!
//! [`Node`] is a discriminated union with two variants, [`Node::Scope`] and
//! [`Node::Message`]. Scopes carry priority, an optional [`Strategy`], and
//! children; messages carry a [`Role`] and an ordered list of [`Part`]s.
//! Nodes are built by an external builder/DSL and handed to
//! [`crate::cria::render::render`]; the core treats them as immutable except
//! for the structural rewrites a [`Strategy`] produces during the fit loop
//! (see [`crate::cria::fit`]).
//!
//! # Example
//!
//! ```rust
//! use cria::{Node, Part, Role};
//!
//! let tree = Node::scope(
//!     0,
//!     vec![Node::message(Role::User, vec![Part::text("hi")])],
//! );
//! assert!(tree.is_scope());
//! ```

use crate::cria::strategy::Strategy;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::context::Context;

/// Process-unique identity assigned to every [`Node`] at construction time.
///
/// This is the "arena+index" form of identity-keyed memoization called for
/// in the design notes: caches keyed on [`NodeId`] avoid re-scanning subtrees
/// that strategies left untouched, without relying on structural hashing or
/// language-level weak references. It is unrelated to the user-supplied
/// semantic [`Node`] `id` used for uniqueness checks and observation hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

impl NodeId {
    fn fresh() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// The role of a [`Node::Message`] and, after layout, of a finalized
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// A system authored message that primes or constrains model behaviour.
    System,
    /// A developer authored message (vocabulary distinct from `System` only
    /// for providers that distinguish the two; see [`crate::cria::codec`]).
    Developer,
    /// A user authored message.
    User,
    /// An assistant authored message (model responses or few-shot
    /// exemplars).
    Assistant,
    /// A tool-result message correlating with a prior
    /// [`Part::ToolCall`].
    Tool,
}

/// A single typed piece of a [`Node::Message`]'s content.
///
/// Message part discipline restricts which variants may
/// appear under each [`Role`]; [`crate::cria::layout::layout`] is the single
/// source of truth for enforcing it.
#[derive(Debug, Clone)]
pub enum Part {
    /// Plain text content.
    Text {
        /// The text payload.
        text: String,
    },
    /// Extended-thinking / chain-of-thought content. Concatenated alongside
    /// [`Part::Text`] when an assistant message is flattened at layout time.
    Reasoning {
        /// The reasoning text.
        text: String,
    },
    /// A tool invocation requested by the model.
    ToolCall {
        /// Provider-assigned call id, correlated with a later
        /// [`Part::ToolResult`].
        tool_call_id: String,
        /// Tool name matching a definition the caller registered out of
        /// band.
        tool_name: String,
        /// Tool input. Left as JSON rather than a generic `I` type
        /// parameter so that [`Node`] stays a concrete, object-safe tree.
        input: Value,
    },
    /// The result of a prior tool invocation.
    ToolResult {
        /// Identifier of the corresponding [`Part::ToolCall`].
        tool_call_id: String,
        /// Tool name, repeated here so a [`crate::cria::codec::MessageCodec`]
        /// doesn't need to look it up elsewhere.
        tool_name: String,
        /// Tool output, as JSON (see [`Part::ToolCall::input`]).
        output: Value,
    },
}

impl Part {
    /// Shorthand for [`Part::Text`].
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    /// Shorthand for [`Part::Reasoning`].
    #[must_use]
    pub fn reasoning(text: impl Into<String>) -> Self {
        Part::Reasoning { text: text.into() }
    }

    /// Shorthand for [`Part::ToolCall`].
    #[must_use]
    pub fn tool_call(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: Value,
    ) -> Self {
        Part::ToolCall {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            input,
        }
    }

    /// Shorthand for [`Part::ToolResult`].
    #[must_use]
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        output: Value,
    ) -> Self {
        Part::ToolResult {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            output,
        }
    }
}

/// A scope node: priority, optional reduction strategy, optional inherited
/// context, and children.
///
/// A scope with no [`strategy`](ScopeNode::strategy) is never a reduction
/// target regardless of [`priority`](ScopeNode::priority) (invariant 2).
pub struct ScopeNode {
    pub(crate) identity: NodeId,
    /// Lower means more important — not dropped first. Comparable via `Ord`.
    pub priority: i64,
    /// User-supplied semantic id. Must be unique across the tree
    /// (invariant 3); see [`crate::cria::layout::assert_unique_ids`].
    pub id: Option<String>,
    /// The reduction strategy invoked by the fit loop when this scope is
    /// selected at its priority layer. `None` means the scope can never be
    /// reduced.
    pub strategy: Option<Arc<dyn Strategy>>,
    /// Context overrides inherited by descendants; shallow-merged over the
    /// parent's inherited context.
    pub context: Option<Context>,
    /// Child nodes, walked depth-first, left-to-right.
    pub children: Vec<Node>,
}

impl fmt::Debug for ScopeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeNode")
            .field("identity", &self.identity)
            .field("priority", &self.priority)
            .field("id", &self.id)
            .field("has_strategy", &self.strategy.is_some())
            .field("children", &self.children)
            .finish()
    }
}

impl Clone for ScopeNode {
    fn clone(&self) -> Self {
        // A clone preserves the node's identity: it denotes the same
        // logical subtree (used when a strategy leaves a scope otherwise
        // untouched but the fit loop still needs an owned copy to splice
        // back into a rewritten parent).
        ScopeNode {
            identity: self.identity,
            priority: self.priority,
            id: self.id.clone(),
            strategy: self.strategy.clone(),
            context: self.context.clone(),
            children: self.children.clone(),
        }
    }
}

/// A message node: role and ordered parts.
#[derive(Debug, Clone)]
pub struct MessageNode {
    pub(crate) identity: NodeId,
    /// The message's role.
    pub role: Role,
    /// User-supplied semantic id (uniqueness invariant as for
    /// [`ScopeNode::id`]).
    pub id: Option<String>,
    /// Ordered content parts.
    pub children: Vec<Part>,
}

/// A node in the prompt tree: either a [`ScopeNode`] or a [`MessageNode`].
#[derive(Debug, Clone)]
pub enum Node {
    Scope(ScopeNode),
    Message(MessageNode),
}

impl Node {
    /// Construct a scope with the given priority and children, no strategy
    /// and no id. Use the builder-style `with_*` methods to add a strategy,
    /// id, or context.
    #[must_use]
    pub fn scope(priority: i64, children: Vec<Node>) -> Self {
        Node::Scope(ScopeNode {
            identity: NodeId::fresh(),
            priority,
            id: None,
            strategy: None,
            context: None,
            children,
        })
    }

    /// Construct a message with the given role and parts.
    #[must_use]
    pub fn message(role: Role, children: Vec<Part>) -> Self {
        Node::Message(MessageNode {
            identity: NodeId::fresh(),
            role,
            id: None,
            children,
        })
    }

    /// Attach a semantic id. Panics are never raised here; uniqueness is
    /// checked tree-wide by [`crate::cria::layout::assert_unique_ids`].
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        match &mut self {
            Node::Scope(s) => s.id = Some(id.into()),
            Node::Message(m) => m.id = Some(id.into()),
        }
        self
    }

    /// Attach a reduction strategy (scopes only; no-op on message nodes).
    #[must_use]
    pub fn with_strategy(mut self, strategy: Arc<dyn Strategy>) -> Self {
        if let Node::Scope(s) = &mut self {
            s.strategy = Some(strategy);
        }
        self
    }

    /// Attach inherited context overrides (scopes only; no-op on message
    /// nodes).
    #[must_use]
    pub fn with_context(mut self, context: Context) -> Self {
        if let Node::Scope(s) = &mut self {
            s.context = Some(context);
        }
        self
    }

    /// The node's process-unique identity, used for memoization and for
    /// matching a rewrite's output back to the scope it replaced.
    #[must_use]
    pub(crate) fn identity(&self) -> NodeId {
        match self {
            Node::Scope(s) => s.identity,
            Node::Message(m) => m.identity,
        }
    }

    /// The node's user-supplied semantic id, if any.
    #[must_use]
    pub fn semantic_id(&self) -> Option<&str> {
        match self {
            Node::Scope(s) => s.id.as_deref(),
            Node::Message(m) => m.id.as_deref(),
        }
    }

    #[must_use]
    pub fn is_scope(&self) -> bool {
        matches!(self, Node::Scope(_))
    }

    #[must_use]
    pub fn is_message(&self) -> bool {
        matches!(self, Node::Message(_))
    }

    /// The scope's priority, or `None` for message nodes.
    #[must_use]
    pub fn priority(&self) -> Option<i64> {
        match self {
            Node::Scope(s) => Some(s.priority),
            Node::Message(_) => None,
        }
    }
}
