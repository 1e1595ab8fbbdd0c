//! Inheritable render context.
//!
//! A [`Context`] flows down the tree during layout, token counting, and
//! strategy application. Inner scopes shallow-merge their own context on
//! top of the one inherited from their parent: any field a scope sets wins;
//! any field it leaves unset falls through to the inherited value.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::cria::provider::ModelProvider;

/// Inheritable map of render-time options.
///
/// The only option the core recognizes is [`provider`](Context::provider),
/// required (directly or via inheritance) wherever rendering happens.
/// Unrecognized options pass through via [`extra`](Context::extra) so that
/// strategy authors can thread arbitrary configuration (e.g. a
/// summarizer's model name) down the tree without the core needing to know
/// about it.
#[derive(Clone, Default)]
pub struct Context {
    /// The provider used to render this subtree: supplies the codec and the
    /// token-counting functions. At most one distinct provider may appear
    /// across a tree's nested contexts (invariant 4).
    pub provider: Option<Arc<dyn ModelProvider>>,
    /// Passthrough options not recognized by the core.
    pub extra: HashMap<String, Value>,
}

impl Context {
    /// An empty context with no provider and no extra options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A context carrying only a provider.
    #[must_use]
    pub fn with_provider(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider: Some(provider),
            extra: HashMap::new(),
        }
    }

    /// Shallow-merge `self` (the scope's own context) on top of `outer` (the
    /// context inherited from ancestors). Fields `self` leaves unset fall
    /// through to `outer`.
    #[must_use]
    pub fn merged_over(&self, outer: &Context) -> Context {
        let mut extra = outer.extra.clone();
        extra.extend(self.extra.clone());
        Context {
            provider: self.provider.clone().or_else(|| outer.provider.clone()),
            extra,
        }
    }

    /// Read an extra option by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Set an extra option, returning `self` for chaining.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("provider", &self.provider.as_ref().map(|p| p.name()))
            .field("extra", &self.extra)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inner_extra_overrides_outer() {
        let outer = Context::new().with_extra("k", json!(1));
        let inner = Context::new().with_extra("k", json!(2));
        let merged = inner.merged_over(&outer);
        assert_eq!(merged.get("k"), Some(&json!(2)));
    }

    #[test]
    fn unset_fields_fall_through() {
        let outer = Context::new().with_extra("only_outer", json!("x"));
        let inner = Context::new();
        let merged = inner.merged_over(&outer);
        assert_eq!(merged.get("only_outer"), Some(&json!("x")));
    }
}
