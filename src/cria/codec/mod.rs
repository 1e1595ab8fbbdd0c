//! Bidirectional codecs between a [`crate::cria::layout::PromptLayout`] and
//! protocol-native wire input.
//!
//! Two canonical codecs are provided: [`chat_completions`] and
//! [`responses`]. Both implement
//! [`crate::cria::provider::MessageCodec`] and are structural inverses on
//! the subset of inputs they themselves produce.

pub mod chat_completions;
pub mod responses;

use crate::cria::node::Role;

pub(crate) fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::Developer => "developer",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

pub(crate) fn str_to_system_like_role(s: &str) -> Option<Role> {
    match s {
        "system" => Some(Role::System),
        "developer" => Some(Role::Developer),
        "user" => Some(Role::User),
        _ => None,
    }
}
