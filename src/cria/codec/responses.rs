//! Responses codec: may emit multiple protocol items per assistant layout
//! message — one `message` item for concatenated text, one `reasoning`
//! item (with a synthesized `id` stable within a render), and one
//! `function_call` item per tool call. Tool messages become
//! `function_call_output` items keyed by `call_id`. On parse, consecutive
//! assistant-like items are re-aggregated into a single assistant message
//!.

use std::cell::Cell;
use std::collections::HashMap;

use serde_json::{json, Value};

use super::{role_to_str, str_to_system_like_role};
use crate::cria::layout::{FinalizedMessage, FinalizedToolCall, PromptLayout};
use crate::cria::node::Role;
use crate::cria::provider::{CodecError, MessageCodec};

/// The Responses-shaped codec.
#[derive(Debug, Default)]
pub struct ResponsesCodec;

impl MessageCodec for ResponsesCodec {
    fn render(&self, layout: &PromptLayout) -> Result<Value, CodecError> {
        let reasoning_counter = Cell::new(0u64);
        let mut items = Vec::new();
        for message in &layout.messages {
            render_message(message, &reasoning_counter, &mut items);
        }
        Ok(json!({ "input": items }))
    }

    fn parse(&self, input: &Value) -> Result<PromptLayout, CodecError> {
        let items = input
            .get("input")
            .and_then(Value::as_array)
            .ok_or_else(|| CodecError::new("responses input missing \"input\" array"))?;

        let mut layout = PromptLayout::new();
        let mut pending: Option<(String, Option<String>, Vec<FinalizedToolCall>)> = None;
        let mut call_names: HashMap<String, String> = HashMap::new();

        macro_rules! flush {
            () => {
                if let Some((text, reasoning, tool_calls)) = pending.take() {
                    layout.messages.push(FinalizedMessage::Assistant {
                        text,
                        reasoning,
                        tool_calls,
                    });
                }
            };
        }

        for item in items {
            let kind = item
                .get("type")
                .and_then(Value::as_str)
                .ok_or_else(|| CodecError::new("responses item missing \"type\""))?;

            match kind {
                "message" => {
                    let role = item
                        .get("role")
                        .and_then(Value::as_str)
                        .ok_or_else(|| CodecError::new("message item missing \"role\""))?;
                    let text = content_to_text(item.get("content"));
                    if role == "assistant" {
                        flush!();
                        pending = Some((text, None, Vec::new()));
                    } else {
                        flush!();
                        let role = str_to_system_like_role(role).ok_or_else(|| {
                            CodecError::new(format!("unknown message role \"{role}\""))
                        })?;
                        layout.messages.push(FinalizedMessage::SystemLike { role, text });
                    }
                }
                "reasoning" => {
                    let text = item
                        .get("summary")
                        .and_then(Value::as_array)
                        .map(|blocks| {
                            blocks
                                .iter()
                                .filter_map(|b| b.get("text").and_then(Value::as_str))
                                .collect::<Vec<_>>()
                                .join("")
                        })
                        .unwrap_or_default();
                    match &mut pending {
                        Some((_, reasoning, _)) => *reasoning = Some(text),
                        None => pending = Some((String::new(), Some(text), Vec::new())),
                    }
                }
                "function_call" => {
                    let call_id = item
                        .get("call_id")
                        .and_then(Value::as_str)
                        .ok_or_else(|| CodecError::new("function_call missing \"call_id\""))?
                        .to_string();
                    let name = item
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let arguments = item
                        .get("arguments")
                        .and_then(Value::as_str)
                        .unwrap_or("null");
                    let input = serde_json::from_str(arguments)
                        .unwrap_or_else(|_| Value::String(arguments.to_string()));
                    call_names.insert(call_id.clone(), name.clone());
                    let tc = FinalizedToolCall {
                        tool_call_id: call_id,
                        tool_name: name,
                        input,
                    };
                    match &mut pending {
                        Some((_, _, tool_calls)) => tool_calls.push(tc),
                        None => pending = Some((String::new(), None, vec![tc])),
                    }
                }
                "function_call_output" => {
                    flush!();
                    let call_id = item
                        .get("call_id")
                        .and_then(Value::as_str)
                        .ok_or_else(|| {
                            CodecError::new("function_call_output missing \"call_id\"")
                        })?
                        .to_string();
                    let tool_name = call_names.get(&call_id).cloned().unwrap_or_default();
                    let output = item
                        .get("output")
                        .cloned()
                        .unwrap_or(Value::String(String::new()));
                    layout.messages.push(FinalizedMessage::Tool {
                        tool_call_id: call_id,
                        tool_name,
                        output,
                    });
                }
                other => return Err(CodecError::new(format!("unknown item type \"{other}\""))),
            }
        }
        flush!();

        Ok(layout)
    }

    fn name(&self) -> &str {
        "responses"
    }
}

fn render_message(message: &FinalizedMessage, reasoning_counter: &Cell<u64>, items: &mut Vec<Value>) {
    match message {
        FinalizedMessage::SystemLike { role, text } => {
            items.push(json!({
                "type": "message",
                "role": role_to_str(*role),
                "content": text,
            }));
        }
        FinalizedMessage::Assistant {
            text,
            reasoning,
            tool_calls,
        } => {
            items.push(json!({
                "type": "message",
                "role": "assistant",
                "content": text,
            }));
            if let Some(reasoning) = reasoning {
                let n = reasoning_counter.get();
                reasoning_counter.set(n + 1);
                items.push(json!({
                    "type": "reasoning",
                    "id": format!("reasoning_{n}"),
                    "summary": [{ "type": "summary_text", "text": reasoning }],
                }));
            }
            for tc in tool_calls {
                items.push(json!({
                    "type": "function_call",
                    "call_id": tc.tool_call_id,
                    "name": tc.tool_name,
                    "arguments": serde_json::to_string(&tc.input).unwrap_or_default(),
                }));
            }
        }
        FinalizedMessage::Tool {
            tool_call_id,
            output,
            ..
        } => {
            let output = match output {
                Value::String(s) => s.clone(),
                other => serde_json::to_string(other).unwrap_or_default(),
            };
            items.push(json!({
                "type": "function_call_output",
                "call_id": tool_call_id,
                "output": output,
            }));
        }
    }
}

fn content_to_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}
