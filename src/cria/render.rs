//! Top-level entry point: validate, optionally run the fit loop,
//! lay out, and render through the resolved provider's codec.

use std::sync::Arc;

use serde_json::Value;

use super::error::CriaError;
use super::fit::{fit, resolve_provider, FitLimits};
use super::hooks::RenderHooks;
use super::layout::{assert_unique_ids, layout};
use super::node::Node;
use super::provider::ModelProvider;

/// Render-time configuration. No file-based configuration exists —
/// this struct is the entire configuration surface a caller can vary per
/// render.
#[derive(Clone, Default)]
pub struct RenderOptions {
    /// Overrides (or supplies, if the tree carries none) the provider used
    /// to render and, when `budget` is set, to count tokens during the fit
    /// loop. See [`resolve_provider`] for how this reconciles with
    /// providers found in the tree (invariant 4).
    pub provider: Option<Arc<dyn ModelProvider>>,
    /// Maximum total tokens the rendered layout may occupy. `None` skips the
    /// fit loop entirely: no hooks fire, and a tree with no provider
    /// anywhere is only an error if the codec needs one, which it never
    /// does on its own.
    pub budget: Option<u64>,
    /// Observation hooks, consulted only when `budget` is set.
    pub hooks: Option<RenderHooks>,
    /// Defensive fit-loop iteration bound. Defaults to
    /// [`FitLimits::default`].
    pub fit_limits: FitLimits,
}

/// Compose, fit, and render `root` into provider-native input.
///
/// 1. Validate semantic id uniqueness (invariant 3).
/// 2. Resolve the provider (invariant 4) — always required, since producing
///    provider-native output always means a codec ran.
/// 3. If `options.budget` is `Some`, run the fit loop until the
///    layout fits.
/// 4. Flatten the (possibly rewritten) tree via [`layout`] (enforcing
///    invariant 1 along the way) and render it through the resolved
///    provider's codec.
pub async fn render(root: Node, options: RenderOptions) -> Result<Value, CriaError> {
    // One id per call, purely for tying together the log lines a single
    // render produces; never persisted or compared against anything.
    let render_id = uuid::Uuid::new_v4();

    assert_unique_ids(&root).map_err(CriaError::DuplicateId)?;

    let provider = resolve_provider(&root, options.provider.clone())?;
    log::debug!("[{render_id}] rendering through provider \"{}\"", provider.name());

    let final_tree = match options.budget {
        Some(budget) => {
            let hooks = options.hooks.clone().unwrap_or_default();
            fit(root, budget, &provider, &hooks, options.fit_limits).await.map_err(|e| {
                log::error!("[{render_id}] render failed: {e}");
                e
            })?
        }
        None => root,
    };

    let laid_out = layout(&final_tree).map_err(|e| {
        log::error!("[{render_id}] render failed during layout: {e}");
        e
    })?;
    let rendered = provider.codec().render_to_provider(&laid_out)?;
    Ok(rendered)
}
