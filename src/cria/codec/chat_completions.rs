//! Chat-Completions codec: one protocol item per layout message.
//!
//! Assistant messages with both text and tool calls emit a single item
//! whose `content` is either a string (pure text) or an array of typed
//! parts; tool messages emit a `tool` role item referencing
//! `tool_call_id`.

use std::collections::HashMap;

use serde_json::{json, Value};

use super::{role_to_str, str_to_system_like_role};
use crate::cria::layout::{FinalizedMessage, FinalizedToolCall, PromptLayout};
use crate::cria::node::Role;
use crate::cria::provider::{CodecError, MessageCodec};

/// The Chat-Completions-shaped codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChatCompletionsCodec;

impl MessageCodec for ChatCompletionsCodec {
    fn render(&self, layout: &PromptLayout) -> Result<Value, CodecError> {
        let items: Vec<Value> = layout.messages.iter().map(render_item).collect();
        Ok(json!({ "messages": items }))
    }

    fn parse(&self, input: &Value) -> Result<PromptLayout, CodecError> {
        let items = input
            .get("messages")
            .and_then(Value::as_array)
            .ok_or_else(|| CodecError::new("chat-completions input missing \"messages\" array"))?;

        let mut layout = PromptLayout::new();
        let mut tool_call_names: HashMap<String, String> = HashMap::new();

        for item in items {
            let role = item
                .get("role")
                .and_then(Value::as_str)
                .ok_or_else(|| CodecError::new("chat-completions item missing \"role\""))?;

            if let Some(role) = str_to_system_like_role(role) {
                let text = item
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                layout.messages.push(FinalizedMessage::SystemLike { role, text });
                continue;
            }

            match role {
                "assistant" => {
                    let (text, reasoning, tool_calls) = parse_assistant_content(item)?;
                    for tc in &tool_calls {
                        tool_call_names.insert(tc.tool_call_id.clone(), tc.tool_name.clone());
                    }
                    layout.messages.push(FinalizedMessage::Assistant {
                        text,
                        reasoning,
                        tool_calls,
                    });
                }
                "tool" => {
                    let tool_call_id = item
                        .get("tool_call_id")
                        .and_then(Value::as_str)
                        .ok_or_else(|| CodecError::new("tool item missing \"tool_call_id\""))?
                        .to_string();
                    let tool_name = tool_call_names
                        .get(&tool_call_id)
                        .cloned()
                        .unwrap_or_default();
                    let output = item.get("content").cloned().unwrap_or(Value::Null);
                    layout.messages.push(FinalizedMessage::Tool {
                        tool_call_id,
                        tool_name,
                        output,
                    });
                }
                other => return Err(CodecError::new(format!("unknown role \"{other}\""))),
            }
        }

        Ok(layout)
    }

    fn name(&self) -> &str {
        "chat-completions"
    }
}

fn render_item(message: &FinalizedMessage) -> Value {
    match message {
        FinalizedMessage::SystemLike { role, text } => {
            json!({ "role": role_to_str(*role), "content": text })
        }
        FinalizedMessage::Assistant {
            text,
            reasoning,
            tool_calls,
        } => {
            if reasoning.is_none() && tool_calls.is_empty() {
                json!({ "role": "assistant", "content": text })
            } else {
                let mut parts = Vec::new();
                if !text.is_empty() {
                    parts.push(json!({ "type": "text", "text": text }));
                }
                if let Some(reasoning) = reasoning {
                    parts.push(json!({ "type": "reasoning", "text": reasoning }));
                }
                for tc in tool_calls {
                    parts.push(json!({
                        "type": "tool-call",
                        "toolCallId": tc.tool_call_id,
                        "toolName": tc.tool_name,
                        "input": tc.input,
                    }));
                }
                json!({ "role": "assistant", "content": parts })
            }
        }
        FinalizedMessage::Tool {
            tool_call_id,
            output,
            ..
        } => {
            let content = match output {
                Value::String(s) => Value::String(s.clone()),
                other => Value::String(serde_json::to_string(other).unwrap_or_default()),
            };
            json!({ "role": "tool", "tool_call_id": tool_call_id, "content": content })
        }
    }
}

fn parse_assistant_content(
    item: &Value,
) -> Result<(String, Option<String>, Vec<FinalizedToolCall>), CodecError> {
    match item.get("content") {
        Some(Value::String(s)) => Ok((s.clone(), None, Vec::new())),
        Some(Value::Array(parts)) => {
            let mut text = String::new();
            let mut reasoning: Option<String> = None;
            let mut tool_calls = Vec::new();
            for part in parts {
                let kind = part.get("type").and_then(Value::as_str).unwrap_or("");
                match kind {
                    "text" => {
                        text.push_str(part.get("text").and_then(Value::as_str).unwrap_or(""));
                    }
                    "reasoning" => {
                        reasoning
                            .get_or_insert_with(String::new)
                            .push_str(part.get("text").and_then(Value::as_str).unwrap_or(""));
                    }
                    "tool-call" => {
                        tool_calls.push(FinalizedToolCall {
                            tool_call_id: part
                                .get("toolCallId")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            tool_name: part
                                .get("toolName")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            input: part.get("input").cloned().unwrap_or(Value::Null),
                        });
                    }
                    other => {
                        return Err(CodecError::new(format!(
                            "unknown assistant content part type \"{other}\""
                        )))
                    }
                }
            }
            Ok((text, reasoning, tool_calls))
        }
        None => Ok((String::new(), None, Vec::new())),
        Some(_) => Err(CodecError::new(
            "assistant \"content\" must be a string or an array",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cria::layout::FinalizedToolCall;

    #[test]
    fn round_trips_plain_text_messages() {
        let mut layout = PromptLayout::new();
        layout.messages.push(FinalizedMessage::SystemLike {
            role: Role::System,
            text: "be terse".into(),
        });
        layout.messages.push(FinalizedMessage::SystemLike {
            role: Role::User,
            text: "hi".into(),
        });
        let codec = ChatCompletionsCodec;
        let rendered = codec.render(&layout).unwrap();
        let reparsed = codec.parse(&rendered).unwrap();
        let rerendered = codec.render(&reparsed).unwrap();
        assert_eq!(rendered, rerendered);
    }

    #[test]
    fn assistant_with_tool_call_round_trips_and_resolves_tool_name() {
        let mut layout = PromptLayout::new();
        layout.messages.push(FinalizedMessage::Assistant {
            text: "Let me check.".into(),
            reasoning: None,
            tool_calls: vec![FinalizedToolCall {
                tool_call_id: "c1".into(),
                tool_name: "g".into(),
                input: json!({"x": 1}),
            }],
        });
        layout.messages.push(FinalizedMessage::Tool {
            tool_call_id: "c1".into(),
            tool_name: "g".into(),
            output: json!({"y": 2}),
        });

        let codec = ChatCompletionsCodec;
        let rendered = codec.render(&layout).unwrap();
        let reparsed = codec.parse(&rendered).unwrap();
        match &reparsed.messages[1] {
            FinalizedMessage::Tool { tool_name, .. } => assert_eq!(tool_name, "g"),
            other => panic!("unexpected {other:?}"),
        }
        let rerendered = codec.render(&reparsed).unwrap();
        assert_eq!(rendered, rerendered);
    }

    #[test]
    fn pure_text_assistant_message_content_is_a_string() {
        let mut layout = PromptLayout::new();
        layout.messages.push(FinalizedMessage::Assistant {
            text: "hello".into(),
            reasoning: None,
            tool_calls: vec![],
        });
        let codec = ChatCompletionsCodec;
        let rendered = codec.render(&layout).unwrap();
        let item = &rendered["messages"][0];
        assert!(item["content"].is_string());
    }
}
