//! Tracing-span adapter for cria's fit-loop observation hooks.
//!
//! Implements [`RenderHook`] with GenAI-style span attributes under the
//! `cria.*` namespace. Emits [`tracing`] spans; bring your own
//! `tracing-opentelemetry` subscriber for OTel export.
//!
//! # Usage
//!
//! ```no_run
//! use cria_otel::{OtelHook, OtelConfig};
//! use cria::RenderHooks;
//! use std::sync::Arc;
//!
//! let hook = Arc::new(OtelHook::new(OtelConfig {
//!     capture_strategy_output: false,
//! }));
//! let hooks = RenderHooks::new(hook);
//! ```
//!
//! # Spans emitted
//!
//! | Span name | When |
//! |-----------|------|
//! | `cria.fit` | The whole fit loop, from first over-budget check to completion or error |
//! | `cria.fit.iteration` | Each fit-loop iteration |
//! | `cria.strategy.apply` | Each scope a strategy ran against |
//!
//! # Opt-in content capture
//!
//! By default, the node a strategy produced is not logged (privacy, size).
//! Set `capture_strategy_output` to `true` to include a debug-formatted
//! summary of the replacement node.

use std::sync::Mutex;

use cria::cria::hooks::{RenderHook, StrategyAppliedEvent};
use cria::cria::node::Node;
use cria::CriaError;

// Re-export so downstream crates can name the hook-error type without a
// direct `cria` dependency of their own.
pub use cria::cria::error::{FitError, HookError};

/// Configuration for [`OtelHook`].
#[derive(Debug, Clone, Default)]
pub struct OtelConfig {
    /// Whether to include a debug-formatted strategy result in
    /// `cria.strategy.apply` span fields. Disabled by default.
    pub capture_strategy_output: bool,
}

/// A [`RenderHook`] that emits [`tracing`] spans for every fit-loop
/// callback. Always returns `Ok(())` — it observes but never aborts a
/// render on its own.
pub struct OtelHook {
    config: OtelConfig,
    // `tracing::Span` is not `Sync`-free to hold directly across the
    // `on_fit_start`/`on_fit_complete` pair without a guard, so the
    // in-flight fit span is kept behind a mutex. A render only drives one
    // fit loop at a time per `RenderHooks`, so contention is not a concern.
    fit_span: Mutex<Option<tracing::Span>>,
}

impl OtelHook {
    #[must_use]
    pub fn new(config: OtelConfig) -> Self {
        Self {
            config,
            fit_span: Mutex::new(None),
        }
    }
}

impl Default for OtelHook {
    fn default() -> Self {
        Self::new(OtelConfig::default())
    }
}

impl RenderHook for OtelHook {
    fn on_fit_start(&self, budget: u64, initial_tokens: u64) -> Result<(), HookError> {
        let span = tracing::info_span!(
            "cria.fit",
            cria.budget = budget,
            cria.initial_tokens = initial_tokens,
            cria.final_tokens = tracing::field::Empty,
            cria.iterations = tracing::field::Empty,
        );
        span.in_scope(|| {
            tracing::debug!("fit loop starting");
        });
        if let Ok(mut slot) = self.fit_span.lock() {
            *slot = Some(span);
        }
        Ok(())
    }

    fn on_fit_iteration(&self, priority: i64, total_tokens: u64, iteration: u64) -> Result<(), HookError> {
        let parent = self.fit_span.lock().ok().and_then(|g| g.clone());
        let span = tracing::info_span!(
            parent: parent.as_ref().and_then(tracing::Span::id),
            "cria.fit.iteration",
            cria.priority = priority,
            cria.total_tokens = total_tokens,
            cria.iteration = iteration,
        );
        span.in_scope(|| {
            tracing::debug!("iteration starting");
        });
        Ok(())
    }

    fn on_strategy_applied(&self, event: &StrategyAppliedEvent) -> Result<(), HookError> {
        let parent = self.fit_span.lock().ok().and_then(|g| g.clone());
        let span = tracing::info_span!(
            parent: parent.as_ref().and_then(tracing::Span::id),
            "cria.strategy.apply",
            cria.scope.id = event.target_id.as_deref().unwrap_or(""),
            cria.priority = event.priority,
            cria.iteration = event.iteration,
            cria.strategy.name = %event.strategy_name,
            cria.strategy.dropped = event.result.is_none(),
        );
        span.in_scope(|| {
            if self.config.capture_strategy_output {
                tracing::debug!(result = ?event.result.as_ref().map(node_summary), "strategy applied");
            } else {
                tracing::debug!("strategy applied");
            }
        });
        Ok(())
    }

    fn on_fit_complete(&self, total_tokens: u64, iterations: u64) -> Result<(), HookError> {
        let parent = self.fit_span.lock().ok().and_then(|g| g.clone());
        if let Some(span) = &parent {
            span.record("cria.final_tokens", total_tokens);
            span.record("cria.iterations", iterations);
        }
        tracing::info!(
            cria.total_tokens = total_tokens,
            cria.iterations = iterations,
            "fit loop converged"
        );
        if let Ok(mut slot) = self.fit_span.lock() {
            *slot = None;
        }
        Ok(())
    }

    fn on_fit_error(&self, error: &FitError) -> Result<(), HookError> {
        tracing::warn!(
            cria.error.kind = %error.kind,
            cria.budget = error.budget,
            cria.total_tokens = error.total_tokens,
            cria.over_budget_by = error.over_budget_by,
            cria.priority = ?error.priority,
            cria.iteration = error.iteration,
            "fit loop failed"
        );
        if let Ok(mut slot) = self.fit_span.lock() {
            *slot = None;
        }
        Ok(())
    }
}

fn node_summary(node: &Node) -> String {
    match node {
        Node::Scope(_) => format!("scope(id={:?})", node.semantic_id()),
        Node::Message(_) => format!("message(id={:?})", node.semantic_id()),
    }
}

/// Translate a [`CriaError`] into a single `tracing` event, for callers
/// that want a last line of observability around a failed
/// [`cria::render::render`] call without writing their own match.
pub fn log_render_error(error: &CriaError) {
    tracing::error!(error = %error, "cria render failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use cria::cria::node::{Part, Role};

    #[test]
    fn on_fit_start_and_complete_do_not_error() {
        let hook = OtelHook::default();
        hook.on_fit_start(100, 150).unwrap();
        hook.on_fit_iteration(0, 150, 0).unwrap();
        hook.on_fit_complete(90, 1).unwrap();
    }

    #[test]
    fn on_strategy_applied_handles_dropped_and_kept_nodes() {
        let hook = OtelHook::new(OtelConfig {
            capture_strategy_output: true,
        });
        let dropped = StrategyAppliedEvent {
            target_id: Some("scope-1".into()),
            priority: 2,
            iteration: 0,
            strategy_name: "omit".into(),
            result: None,
        };
        hook.on_strategy_applied(&dropped).unwrap();

        let kept = StrategyAppliedEvent {
            target_id: None,
            priority: 2,
            iteration: 1,
            strategy_name: "truncate".into(),
            result: Some(Node::message(Role::User, vec![Part::text("hi")])),
        };
        hook.on_strategy_applied(&kept).unwrap();
    }

    #[test]
    fn on_fit_error_does_not_error() {
        let hook = OtelHook::default();
        let error = FitError {
            kind: cria::cria::error::FitErrorKind::NoProgress,
            budget: 10,
            total_tokens: 20,
            over_budget_by: 10,
            priority: Some(1),
            iteration: 3,
        };
        hook.on_fit_error(&error).unwrap();
    }
}
