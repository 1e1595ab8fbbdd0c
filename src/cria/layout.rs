//! Layout pass: flattens a [`Node`] tree into an ordered [`PromptLayout`],
//! enforcing message part discipline as it goes.
//!
//! Scopes are transparent to layout; only [`Node::Message`] nodes produce
//! [`FinalizedMessage`] entries. Ordering is depth-first, left-to-right and
//! stable across runs (invariant 5) because the walk never reorders
//! children.

use std::collections::HashSet;
use std::fmt;

use serde_json::Value;

use super::node::{MessageNode, Node, Part, Role};

/// A single tool call carried by an [`FinalizedMessage::Assistant`].
#[derive(Debug, Clone)]
pub struct FinalizedToolCall {
    pub tool_call_id: String,
    pub tool_name: String,
    pub input: Value,
}

/// One entry of a [`PromptLayout`]: a finalized, shape-checked message.
#[derive(Debug, Clone)]
pub enum FinalizedMessage {
    /// `system`, `developer`, or `user` — text-only (invariant 1).
    SystemLike { role: Role, text: String },
    /// `assistant` — text, optional reasoning, optional tool calls.
    Assistant {
        text: String,
        reasoning: Option<String>,
        tool_calls: Vec<FinalizedToolCall>,
    },
    /// `tool` — exactly one tool result.
    Tool {
        tool_call_id: String,
        tool_name: String,
        output: Value,
    },
}

impl FinalizedMessage {
    /// The [`Role`] this finalized message renders as.
    #[must_use]
    pub fn role(&self) -> Role {
        match self {
            FinalizedMessage::SystemLike { role, .. } => *role,
            FinalizedMessage::Assistant { .. } => Role::Assistant,
            FinalizedMessage::Tool { .. } => Role::Tool,
        }
    }
}

/// An ordered sequence of finalized messages, the output of
/// [`layout`] and the input to [`crate::cria::codec::MessageCodec::render`].
#[derive(Debug, Clone, Default)]
pub struct PromptLayout {
    pub messages: Vec<FinalizedMessage>,
}

impl PromptLayout {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Invariant 1 violation: a message node carries a part its role forbids.
#[derive(Debug, Clone)]
pub struct ShapeError {
    pub role: Role,
    pub reason: String,
    pub scope_id: Option<String>,
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid message shape for role {:?}: {}",
            self.role, self.reason
        )
    }
}

impl std::error::Error for ShapeError {}

/// Flatten a [`MessageNode`] into exactly one [`FinalizedMessage`],
/// enforcing part discipline. Shared by [`layout`] and
/// [`crate::cria::token_counter::summarize`] (token counting needs the same
/// finalized shape the codec eventually renders).
pub fn finalize_message(node: &MessageNode) -> Result<FinalizedMessage, ShapeError> {
    match node.role {
        Role::System | Role::Developer | Role::User => {
            let mut text = String::new();
            for part in &node.children {
                match part {
                    Part::Text { text: t } => text.push_str(t),
                    other => {
                        return Err(ShapeError {
                            role: node.role,
                            reason: format!(
                                "{:?} messages may only contain TextPart, found {}",
                                node.role,
                                part_kind(other)
                            ),
                            scope_id: node.id.clone(),
                        })
                    }
                }
            }
            Ok(FinalizedMessage::SystemLike {
                role: node.role,
                text,
            })
        }
        Role::Assistant => {
            let mut text = String::new();
            let mut reasoning: Option<String> = None;
            let mut tool_calls = Vec::new();
            for part in &node.children {
                match part {
                    Part::Text { text: t } => text.push_str(t),
                    Part::Reasoning { text: t } => {
                        reasoning.get_or_insert_with(String::new).push_str(t);
                    }
                    Part::ToolCall {
                        tool_call_id,
                        tool_name,
                        input,
                    } => tool_calls.push(FinalizedToolCall {
                        tool_call_id: tool_call_id.clone(),
                        tool_name: tool_name.clone(),
                        input: input.clone(),
                    }),
                    Part::ToolResult { .. } => {
                        return Err(ShapeError {
                            role: node.role,
                            reason: "assistant messages may not contain ToolResultPart".into(),
                            scope_id: node.id.clone(),
                        })
                    }
                }
            }
            Ok(FinalizedMessage::Assistant {
                text,
                reasoning,
                tool_calls,
            })
        }
        Role::Tool => {
            if node.children.len() != 1 {
                return Err(ShapeError {
                    role: node.role,
                    reason: format!(
                        "tool messages must contain exactly one ToolResultPart, found {}",
                        node.children.len()
                    ),
                    scope_id: node.id.clone(),
                });
            }
            match &node.children[0] {
                Part::ToolResult {
                    tool_call_id,
                    tool_name,
                    output,
                } => Ok(FinalizedMessage::Tool {
                    tool_call_id: tool_call_id.clone(),
                    tool_name: tool_name.clone(),
                    output: output.clone(),
                }),
                other => Err(ShapeError {
                    role: node.role,
                    reason: format!(
                        "tool messages must contain exactly one ToolResultPart, found {}",
                        part_kind(other)
                    ),
                    scope_id: node.id.clone(),
                }),
            }
        }
    }
}

fn part_kind(part: &Part) -> &'static str {
    match part {
        Part::Text { .. } => "TextPart",
        Part::Reasoning { .. } => "ReasoningPart",
        Part::ToolCall { .. } => "ToolCallPart",
        Part::ToolResult { .. } => "ToolResultPart",
    }
}

/// Walk `root` depth-first, left-to-right, producing one [`FinalizedMessage`]
/// per [`Node::Message`] encountered. Scopes are transparent.
pub fn layout(root: &Node) -> Result<PromptLayout, ShapeError> {
    let mut out = PromptLayout::new();
    walk(root, &mut out)?;
    Ok(out)
}

fn walk(node: &Node, out: &mut PromptLayout) -> Result<(), ShapeError> {
    match node {
        Node::Scope(scope) => {
            for child in &scope.children {
                walk(child, out)?;
            }
            Ok(())
        }
        Node::Message(message) => {
            out.messages.push(finalize_message(message)?);
            Ok(())
        }
    }
}

/// Uniqueness invariant (invariant 3): no two distinct scopes/messages in
/// `root` may share a semantic `id`. Returns the first duplicate found.
pub fn assert_unique_ids(root: &Node) -> Result<(), String> {
    let mut seen = HashSet::new();
    fn walk_ids<'a>(node: &'a Node, seen: &mut HashSet<&'a str>) -> Result<(), String> {
        if let Some(id) = node.semantic_id() {
            if !seen.insert(id) {
                return Err(id.to_string());
            }
        }
        if let Node::Scope(scope) = node {
            for child in &scope.children {
                walk_ids(child, seen)?;
            }
        }
        Ok(())
    }
    walk_ids(root, &mut seen).map_err(|dup| format!("duplicate node id: {dup}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(text: &str) -> Node {
        Node::message(Role::User, vec![Part::text(text)])
    }

    #[test]
    fn flattens_simple_tree() {
        let tree = Node::scope(0, vec![user("hi")]);
        let out = layout(&tree).unwrap();
        assert_eq!(out.len(), 1);
        match &out.messages[0] {
            FinalizedMessage::SystemLike { role, text } => {
                assert_eq!(*role, Role::User);
                assert_eq!(text, "hi");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn scopes_are_transparent_and_nested() {
        let tree = Node::scope(
            0,
            vec![
                Node::scope(1, vec![user("a")]),
                Node::scope(2, vec![user("b"), user("c")]),
            ],
        );
        let out = layout(&tree).unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn user_message_with_tool_call_part_fails_shape() {
        let tree = Node::message(
            Role::User,
            vec![Part::tool_call("c1", "g", json!({"x": 1}))],
        );
        let err = layout(&tree).unwrap_err();
        assert_eq!(err.role, Role::User);
    }

    #[test]
    fn assistant_message_with_tool_result_fails_shape() {
        let tree = Node::message(
            Role::Assistant,
            vec![Part::tool_result("c1", "g", json!({}))],
        );
        assert!(layout(&tree).is_err());
    }

    #[test]
    fn tool_message_requires_exactly_one_part() {
        let empty = Node::message(Role::Tool, vec![]);
        assert!(layout(&empty).is_err());

        let two = Node::message(
            Role::Tool,
            vec![
                Part::tool_result("c1", "g", json!({})),
                Part::tool_result("c1", "g", json!({})),
            ],
        );
        assert!(layout(&two).is_err());

        let one = Node::message(Role::Tool, vec![Part::tool_result("c1", "g", json!({}))]);
        assert!(layout(&one).is_ok());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let tree = Node::scope(
            0,
            vec![
                user("a").with_id("dup"),
                Node::scope(1, vec![user("b").with_id("dup")]),
            ],
        );
        assert!(assert_unique_ids(&tree).is_err());
    }

    #[test]
    fn unique_ids_are_accepted() {
        let tree = Node::scope(
            0,
            vec![user("a").with_id("a"), user("b").with_id("b")],
        );
        assert!(assert_unique_ids(&tree).is_ok());
    }
}
