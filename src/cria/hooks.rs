//! Observation hooks: optional, synchronous callbacks the fit loop
//! invokes at well-defined points. A hook that returns an error aborts the
//! render — there is no "log and continue" path, so a hook is never a safe
//! place to hide a side effect the render's correctness depends on.

use std::sync::Arc;

use super::error::{FitError, HookError};
use super::node::Node;

/// Payload delivered to [`RenderHook::on_strategy_applied`].
#[derive(Debug, Clone)]
pub struct StrategyAppliedEvent {
    /// The scope's semantic id, if it had one.
    pub target_id: Option<String>,
    /// The priority layer being processed when this strategy ran.
    pub priority: i64,
    /// The fit-loop iteration this application belongs to.
    pub iteration: u64,
    /// Name of the strategy that ran ([`crate::cria::strategy::Strategy::name`]).
    pub strategy_name: String,
    /// The node the strategy produced, or `None` if it dropped its target.
    pub result: Option<Node>,
}

/// Observer for fit-loop progress. All methods default to a no-op so a
/// caller only overrides the ones it cares about.
pub trait RenderHook: Send + Sync {
    /// Called once before the fit loop begins, whether or not the layout is
    /// already within `budget` — pairs with [`RenderHook::on_fit_complete`],
    /// which always fires too, even when zero iterations run.
    fn on_fit_start(&self, budget: u64, initial_tokens: u64) -> Result<(), HookError> {
        let _ = (budget, initial_tokens);
        Ok(())
    }

    /// Called at the start of each fit-loop iteration, after the current
    /// total has been computed and the active priority selected.
    fn on_fit_iteration(&self, priority: i64, total_tokens: u64, iteration: u64) -> Result<(), HookError> {
        let _ = (priority, total_tokens, iteration);
        Ok(())
    }

    /// Called once per scope a strategy was applied to within an iteration.
    fn on_strategy_applied(&self, event: &StrategyAppliedEvent) -> Result<(), HookError> {
        let _ = event;
        Ok(())
    }

    /// Called once the loop converges under budget (or never needed to
    /// run because the layout already fit).
    fn on_fit_complete(&self, total_tokens: u64, iterations: u64) -> Result<(), HookError> {
        let _ = (total_tokens, iterations);
        Ok(())
    }

    /// Called when the fit loop is about to fail with `error`. The hook may
    /// itself return an error (wrapping or replacing `error`); either way the
    /// render ends in an error.
    fn on_fit_error(&self, error: &FitError) -> Result<(), HookError> {
        let _ = error;
        Ok(())
    }
}

/// Holds the single [`RenderHook`] a render call was configured with, if
/// any. A struct rather than a bare `Option<Arc<dyn RenderHook>>` so it can
/// grow additional cross-cutting behavior (e.g. a multiplexing hook) without
/// changing [`crate::cria::render::RenderOptions`]'s shape.
#[derive(Clone, Default)]
pub struct RenderHooks {
    pub hook: Option<Arc<dyn RenderHook>>,
}

impl RenderHooks {
    #[must_use]
    pub fn new(hook: Arc<dyn RenderHook>) -> Self {
        Self { hook: Some(hook) }
    }

    pub(crate) fn on_fit_start(&self, budget: u64, initial_tokens: u64) -> Result<(), HookError> {
        match &self.hook {
            Some(hook) => hook.on_fit_start(budget, initial_tokens),
            None => Ok(()),
        }
    }

    pub(crate) fn on_fit_iteration(&self, priority: i64, total_tokens: u64, iteration: u64) -> Result<(), HookError> {
        match &self.hook {
            Some(hook) => hook.on_fit_iteration(priority, total_tokens, iteration),
            None => Ok(()),
        }
    }

    pub(crate) fn on_strategy_applied(&self, event: &StrategyAppliedEvent) -> Result<(), HookError> {
        match &self.hook {
            Some(hook) => hook.on_strategy_applied(event),
            None => Ok(()),
        }
    }

    pub(crate) fn on_fit_complete(&self, total_tokens: u64, iterations: u64) -> Result<(), HookError> {
        match &self.hook {
            Some(hook) => hook.on_fit_complete(total_tokens, iterations),
            None => Ok(()),
        }
    }

    pub(crate) fn on_fit_error(&self, error: &FitError) -> Result<(), HookError> {
        match &self.hook {
            Some(hook) => hook.on_fit_error(error),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for RenderHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderHooks")
            .field("has_hook", &self.hook.is_some())
            .finish()
    }
}
