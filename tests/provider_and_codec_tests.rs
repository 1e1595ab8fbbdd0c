//! Exercises provider resolution (single-provider invariant across a tree)
//! and both canonical codecs end to end through `render`.

use std::sync::Arc;

use serde_json::Value;

use cria::cria::codec::chat_completions::ChatCompletionsCodec;
use cria::cria::codec::responses::ResponsesCodec;
use cria::cria::context::Context;
use cria::cria::layout::FinalizedMessage;
use cria::cria::provider::{CompositeCodec, ProviderAdapter, ProtocolProvider, TokenCounter};
use cria::{render, CriaError, Node, Part, RenderOptions, Role};

struct ConstantCounter;

impl TokenCounter for ConstantCounter {
    fn count_message_tokens(&self, _message: &FinalizedMessage) -> u64 {
        1
    }
    fn count_boundary_tokens(&self, _prev: Option<&FinalizedMessage>, _next: Option<&FinalizedMessage>) -> u64 {
        0
    }
}

/// An adapter that wraps protocol input under an SDK-specific envelope, to
/// verify a `ProviderAdapter` can reshape without a codec needing to know.
struct EnvelopeAdapter;

impl ProviderAdapter for EnvelopeAdapter {
    fn to_provider(&self, protocol_input: Value) -> Value {
        serde_json::json!({ "sdk_payload": protocol_input })
    }

    fn from_provider(&self, provider_input: Value) -> Value {
        provider_input
            .get("sdk_payload")
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn name(&self) -> &str {
        "envelope"
    }
}

fn user(text: &str) -> Node {
    Node::message(Role::User, vec![Part::text(text)])
}

#[tokio::test]
async fn responses_codec_renders_through_render() {
    let codec = CompositeCodec::new(Arc::new(ResponsesCodec), Arc::new(EnvelopeAdapter));
    let provider = Arc::new(ProtocolProvider::new("responses-test", codec, ConstantCounter));
    let root = Node::scope(0, vec![user("hello")]).with_context(Context::with_provider(provider.clone()));
    let options = RenderOptions {
        provider: None,
        budget: None,
        hooks: None,
        fit_limits: Default::default(),
    };
    let rendered = render(root, options).await.unwrap();
    let inner = &rendered["sdk_payload"]["input"];
    assert_eq!(inner[0]["type"], "message");
}

#[tokio::test]
async fn chat_completions_codec_renders_through_render() {
    let codec = CompositeCodec::new(Arc::new(ChatCompletionsCodec), Arc::new(EnvelopeAdapter));
    let provider = Arc::new(ProtocolProvider::new("chat-test", codec, ConstantCounter));
    let root = Node::scope(0, vec![user("hi")]).with_context(Context::with_provider(provider));
    let options = RenderOptions::default();
    let rendered = render(root, options).await.unwrap();
    assert_eq!(rendered["sdk_payload"]["messages"][0]["content"], "hi");
}

#[tokio::test]
async fn provider_can_be_supplied_purely_as_a_render_time_override() {
    let codec = CompositeCodec::new(Arc::new(ChatCompletionsCodec), Arc::new(EnvelopeAdapter));
    let provider = Arc::new(ProtocolProvider::new("override-test", codec, ConstantCounter));
    let root = Node::scope(0, vec![user("no context provider here")]);
    let options = RenderOptions {
        provider: Some(provider),
        budget: None,
        hooks: None,
        fit_limits: Default::default(),
    };
    assert!(render(root, options).await.is_ok());
}

#[tokio::test]
async fn two_distinct_providers_in_the_tree_is_a_mismatch() {
    let codec_a = CompositeCodec::new(Arc::new(ChatCompletionsCodec), Arc::new(EnvelopeAdapter));
    let provider_a = Arc::new(ProtocolProvider::new("a", codec_a, ConstantCounter));
    let codec_b = CompositeCodec::new(Arc::new(ChatCompletionsCodec), Arc::new(EnvelopeAdapter));
    let provider_b = Arc::new(ProtocolProvider::new("b", codec_b, ConstantCounter));

    let left = user("left").with_id("left");
    let right = Node::scope(0, vec![user("right")]).with_context(Context::with_provider(provider_b));
    let root = Node::scope(0, vec![left, right]).with_context(Context::with_provider(provider_a));

    let error = render(root, RenderOptions::default()).await.unwrap_err();
    assert!(matches!(error, CriaError::ProviderMismatch(_)));
}

#[tokio::test]
async fn nested_scope_inherits_ancestor_provider() {
    let codec = CompositeCodec::new(Arc::new(ChatCompletionsCodec), Arc::new(EnvelopeAdapter));
    let provider = Arc::new(ProtocolProvider::new("inherited", codec, ConstantCounter));
    let inner = Node::scope(1, vec![user("deep")]);
    let root = Node::scope(0, vec![inner]).with_context(Context::with_provider(provider));
    assert!(render(root, RenderOptions::default()).await.is_ok());
}
