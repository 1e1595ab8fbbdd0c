//! Provider capability set: the message codec, the provider adapter that
//! composes with it, and the token-counting functions the fit loop relies
//! on.
//!
//! A concrete tokenizer or LLM HTTP client is explicitly out of scope;
//! this module defines the seams a host application plugs them into.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::layout::{FinalizedMessage, PromptLayout};

/// Structural mismatch while rendering a [`PromptLayout`] into protocol
/// input, or while parsing protocol input back into a layout.
#[derive(Debug, Clone)]
pub struct CodecError {
    pub reason: String,
}

impl CodecError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "codec error: {}", self.reason)
    }
}

impl std::error::Error for CodecError {}

/// Bidirectional map between a [`PromptLayout`] and a protocol-native input
/// (e.g. Chat Completions, Responses).
///
/// Implementations must be structural inverses on the subset of inputs they
/// produce: `parse(render(layout))` round-trips modulo normalization (empty
/// content elision, reasoning-id renumbering).
/// Protocol input is represented as [`serde_json::Value`] so that
/// [`MessageCodec`] stays object-safe and usable as `Arc<dyn MessageCodec>`
/// inside a [`crate::cria::context::Context`].
pub trait MessageCodec: Send + Sync {
    /// Layout → protocol-native input.
    fn render(&self, layout: &PromptLayout) -> Result<Value, CodecError>;

    /// Protocol-native input → layout.
    fn parse(&self, input: &Value) -> Result<PromptLayout, CodecError>;

    /// Human-readable codec name, used in logging and error context.
    fn name(&self) -> &str;
}

/// Pure structural mapping between a protocol-native input and a concrete
/// SDK-native input.
///
/// Adapters must not change semantics: no merging or splitting of messages,
/// no role rewriting beyond vocabulary differences (e.g. `developer` →
/// `system` for providers without a distinct developer role).
pub trait ProviderAdapter: Send + Sync {
    /// Protocol-native input → SDK-native input.
    fn to_provider(&self, protocol_input: Value) -> Value;

    /// SDK-native input → protocol-native input.
    fn from_provider(&self, provider_input: Value) -> Value;

    /// Human-readable adapter name.
    fn name(&self) -> &str;
}

/// Wires a [`MessageCodec`] with a [`ProviderAdapter`] into a single
/// provider-native codec.
pub struct CompositeCodec {
    pub codec: Arc<dyn MessageCodec>,
    pub adapter: Arc<dyn ProviderAdapter>,
}

impl CompositeCodec {
    #[must_use]
    pub fn new(codec: Arc<dyn MessageCodec>, adapter: Arc<dyn ProviderAdapter>) -> Self {
        Self { codec, adapter }
    }

    /// Layout → protocol input → provider input.
    pub fn render_to_provider(&self, layout: &PromptLayout) -> Result<Value, CodecError> {
        let protocol_input = self.codec.render(layout)?;
        Ok(self.adapter.to_provider(protocol_input))
    }

    /// Provider input → protocol input → layout.
    pub fn parse_from_provider(&self, provider_input: Value) -> Result<PromptLayout, CodecError> {
        let protocol_input = self.adapter.from_provider(provider_input);
        self.codec.parse(&protocol_input)
    }
}

/// Per-message and inter-message token counting, pure and side-effect free.
///
/// `count_message_tokens` and `count_boundary_tokens` together determine the
/// total token cost of a [`PromptLayout`]:
/// `Σ count_message_tokens(m_i) + Σ count_boundary_tokens(m_i, m_{i+1})`.
pub trait TokenCounter: Send + Sync {
    /// Token count of a single finalized message.
    fn count_message_tokens(&self, message: &FinalizedMessage) -> u64;

    /// Inter-message framing cost between two adjacent messages. Either
    /// side may be `None` to represent "start/end of layout" framing (most
    /// tokenizers charge nothing there, but the seam exists for providers
    /// that do).
    fn count_boundary_tokens(
        &self,
        prev: Option<&FinalizedMessage>,
        next: Option<&FinalizedMessage>,
    ) -> u64;
}

/// The full capability set consumed by the fit loop and the renderer: a
/// codec (via [`ModelProvider::codec`]) plus the two pure token-counting
/// functions.
///
/// `Completions`/object-generation capabilities some providers also expose
/// are extensions of this trait, not used by the core fit loop, and are
/// intentionally left out — a host application's concrete provider type can
/// carry them as inherent methods.
pub trait ModelProvider: Send + Sync + TokenCounter {
    /// The provider-native codec used to render a [`PromptLayout`].
    fn codec(&self) -> &CompositeCodec;

    /// Human-readable provider name (e.g. `"openai-chat-completions"`),
    /// used in logging, [`ProviderMismatch`](super::error::ProviderMismatch)
    /// messages, and OTel span attributes.
    fn name(&self) -> &str;
}

/// A [`ModelProvider`] built from a [`CompositeCodec`] plus a pair of
/// counting closures. Most concrete providers are just this: the "base"
/// the design notes call `ProtocolProvider`.
pub struct ProtocolProvider<C> {
    name: String,
    codec: CompositeCodec,
    counter: C,
}

impl<C> ProtocolProvider<C>
where
    C: TokenCounter,
{
    #[must_use]
    pub fn new(name: impl Into<String>, codec: CompositeCodec, counter: C) -> Self {
        Self {
            name: name.into(),
            codec,
            counter,
        }
    }
}

impl<C> TokenCounter for ProtocolProvider<C>
where
    C: TokenCounter,
{
    fn count_message_tokens(&self, message: &FinalizedMessage) -> u64 {
        self.counter.count_message_tokens(message)
    }

    fn count_boundary_tokens(
        &self,
        prev: Option<&FinalizedMessage>,
        next: Option<&FinalizedMessage>,
    ) -> u64 {
        self.counter.count_boundary_tokens(prev, next)
    }
}

impl<C> ModelProvider for ProtocolProvider<C>
where
    C: Send + Sync + TokenCounter,
{
    fn codec(&self) -> &CompositeCodec {
        &self.codec
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Identity adapter: `to_provider`/`from_provider` are no-ops. Useful when a
/// provider consumes the protocol input verbatim (no SDK-specific
/// reshaping), and as the default in tests.
pub struct IdentityAdapter;

impl ProviderAdapter for IdentityAdapter {
    fn to_provider(&self, protocol_input: Value) -> Value {
        protocol_input
    }

    fn from_provider(&self, provider_input: Value) -> Value {
        provider_input
    }

    fn name(&self) -> &str {
        "identity"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cria::codec::chat_completions::ChatCompletionsCodec;
    use crate::cria::node::Role;

    struct FixedCounter;
    impl TokenCounter for FixedCounter {
        fn count_message_tokens(&self, _message: &FinalizedMessage) -> u64 {
            1
        }
        fn count_boundary_tokens(
            &self,
            _prev: Option<&FinalizedMessage>,
            _next: Option<&FinalizedMessage>,
        ) -> u64 {
            0
        }
    }

    #[test]
    fn composite_codec_round_trips_through_identity_adapter() {
        let codec = CompositeCodec::new(Arc::new(ChatCompletionsCodec), Arc::new(IdentityAdapter));
        let provider = ProtocolProvider::new("test", codec, FixedCounter);
        let mut layout = PromptLayout::new();
        layout.messages.push(FinalizedMessage::SystemLike {
            role: Role::User,
            text: "hi".into(),
        });
        let rendered = provider.codec().render_to_provider(&layout).unwrap();
        let parsed = provider.codec().parse_from_provider(rendered).unwrap();
        assert_eq!(parsed.len(), 1);
    }
}
