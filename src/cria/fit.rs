//! The fit loop: a deterministic, priority-driven reducer that keeps
//! applying strategies, one priority layer at a time, until the layout fits
//! its token budget or no further progress is possible.
//!
//! Priority layers are processed from the highest active `priority` value
//! down (lower `priority` means more important, so the highest value is the
//! least important content and is reduced first). Within one layer, scopes
//! are rewritten bottom-up: a nested scope at the same priority is reduced
//! before its ancestor, so the ancestor's strategy (if any) sees the
//! already-reduced children.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::context::Context;
use super::error::{CriaError, FitError, FitErrorKind, ProviderMismatch};
use super::hooks::{RenderHooks, StrategyAppliedEvent};
use super::node::Node;
use super::provider::ModelProvider;
use super::strategy::StrategyInput;
use super::token_counter::{summarize, SummarizeCache};

/// Defensive bound: stops a buggy strategy from looping forever.
/// Not part of the budget-driven termination contract — a well-behaved fit
/// loop always terminates via [`FitErrorKind::CannotReduceFurther`] or
/// [`FitErrorKind::NoProgress`] long before this is reached.
#[derive(Debug, Clone, Copy)]
pub struct FitLimits {
    pub max_iterations: u64,
}

impl Default for FitLimits {
    fn default() -> Self {
        Self { max_iterations: 10_000 }
    }
}

/// Resolve the single [`ModelProvider`] in effect for `root` (invariant 4):
/// walk the tree merging inherited [`Context`]s, collect every provider
/// encountered, and fail if more than one distinct provider appears or if a
/// render-time `override_provider` disagrees with the one found in the
/// tree. At least one of "a provider in the tree" or `override_provider`
/// must be present.
pub fn resolve_provider(
    root: &Node,
    override_provider: Option<Arc<dyn ModelProvider>>,
) -> Result<Arc<dyn ModelProvider>, ProviderMismatch> {
    let mut found: Option<Arc<dyn ModelProvider>> = None;
    walk_for_provider(root, &Context::new(), &mut found)?;

    match (found, override_provider) {
        (Some(tree_provider), Some(override_provider)) => {
            if Arc::ptr_eq(&tree_provider, &override_provider) {
                Ok(tree_provider)
            } else {
                Err(ProviderMismatch {
                    reason: format!(
                        "render-time provider override \"{}\" disagrees with the provider \"{}\" found in the tree",
                        override_provider.name(),
                        tree_provider.name()
                    ),
                })
            }
        }
        (Some(tree_provider), None) => Ok(tree_provider),
        (None, Some(override_provider)) => Ok(override_provider),
        (None, None) => Err(ProviderMismatch {
            reason: "no provider found in the tree and no render-time override supplied".into(),
        }),
    }
}

fn walk_for_provider(
    node: &Node,
    inherited: &Context,
    found: &mut Option<Arc<dyn ModelProvider>>,
) -> Result<(), ProviderMismatch> {
    let Node::Scope(scope) = node else {
        return Ok(());
    };
    let merged = match &scope.context {
        Some(own) => own.merged_over(inherited),
        None => inherited.clone(),
    };
    if let Some(provider) = &merged.provider {
        match found {
            Some(existing) if !Arc::ptr_eq(existing, provider) => {
                return Err(ProviderMismatch {
                    reason: format!(
                        "multiple distinct providers found in the tree: \"{}\" and \"{}\"",
                        existing.name(),
                        provider.name()
                    ),
                });
            }
            _ => *found = Some(provider.clone()),
        }
    }
    for child in &scope.children {
        walk_for_provider(child, &merged, found)?;
    }
    Ok(())
}

/// Bottom-up rewrite of every scope at `priority` within `node`. Returns the
/// rewritten node (`None` if `node` itself was a target and its strategy
/// dropped it) and increments `applied` once per strategy actually invoked.
fn apply_at_priority<'a>(
    node: Node,
    inherited: &'a Context,
    priority: i64,
    iteration: u64,
    total_tokens: u64,
    provider: &'a Arc<dyn ModelProvider>,
    hooks: &'a RenderHooks,
    applied: &'a AtomicU64,
) -> Pin<Box<dyn Future<Output = Result<Option<Node>, CriaError>> + Send + 'a>> {
    Box::pin(async move {
        let mut scope = match node {
            Node::Message(_) => return Ok(Some(node)),
            Node::Scope(scope) => scope,
        };

        let merged = match &scope.context {
            Some(own) => own.merged_over(inherited),
            None => inherited.clone(),
        };

        let mut rewritten_children = Vec::with_capacity(scope.children.len());
        for child in scope.children.drain(..) {
            if let Some(rewritten) =
                apply_at_priority(child, &merged, priority, iteration, total_tokens, provider, hooks, applied)
                    .await?
            {
                rewritten_children.push(rewritten);
            }
        }
        scope.children = rewritten_children;

        if scope.priority != priority {
            return Ok(Some(Node::Scope(scope)));
        }
        let strategy = match scope.strategy.clone() {
            Some(strategy) => strategy,
            None => return Ok(Some(Node::Scope(scope))),
        };
        let target_id = scope.id.clone();
        let strategy_name = strategy.name().to_string();
        let input = StrategyInput {
            target: Node::Scope(scope),
            context: merged,
            total_tokens,
            iteration,
        };

        let result = strategy.apply(input).await.map_err(|source| {
            CriaError::Strategy(super::error::StrategyError {
                source,
                priority,
                iteration,
                scope_id: target_id.clone(),
            })
        })?;
        applied.fetch_add(1, Ordering::Relaxed);
        log::info!(
            "strategy \"{strategy_name}\" applied to scope {:?} at priority {priority}: {}",
            target_id,
            if result.is_some() { "rewritten" } else { "dropped" }
        );

        hooks.on_strategy_applied(&StrategyAppliedEvent {
            target_id,
            priority,
            iteration,
            strategy_name,
            result: result.clone(),
        })?;

        Ok(result)
    })
}

/// Reports `error` via `hooks.on_fit_error` and converts the outcome into
/// the [`CriaError`] the fit loop should return. A hook that itself fails
/// while handling `error` replaces it, chaining the original via
/// [`super::error::HookError::cause`] rather than discarding it.
fn emit_fit_error(hooks: &RenderHooks, error: FitError) -> CriaError {
    match hooks.on_fit_error(&error) {
        Ok(()) => error.into(),
        Err(hook_err) => super::error::HookError {
            cause: Some(Box::new(error)),
            ..hook_err
        }
        .into(),
    }
}

async fn apply_strategies_at_priority(
    root: Node,
    priority: i64,
    iteration: u64,
    total_tokens: u64,
    provider: &Arc<dyn ModelProvider>,
    hooks: &RenderHooks,
) -> Result<(Node, u64), CriaError> {
    let applied = AtomicU64::new(0);
    // Seed the inherited context with the resolved provider so every
    // strategy can reach a `TokenCounter` via `input.context.provider` even
    // when the tree itself never attaches one; a scope's own context still
    // wins where it sets one explicitly.
    let inherited = Context::with_provider(provider.clone());
    let rewritten = apply_at_priority(root, &inherited, priority, iteration, total_tokens, provider, hooks, &applied)
        .await?
        // The true root being dropped entirely is a degenerate case (it would
        // require a strategy on the outermost scope); fall back to an empty
        // scope rather than leaving the caller with nothing at all.
        .unwrap_or_else(|| Node::scope(priority, vec![]));
    Ok((rewritten, applied.load(Ordering::Relaxed)))
}

/// Run the fit loop against `root` until it fits within `budget`. Returns
/// the rewritten tree, ready for [`super::layout::layout`].
pub async fn fit(
    root: Node,
    budget: u64,
    provider: &Arc<dyn ModelProvider>,
    hooks: &RenderHooks,
    limits: FitLimits,
) -> Result<Node, CriaError> {
    let initial_summary = summarize(&root, provider.as_ref(), &mut SummarizeCache::new())?;

    log::debug!(
        "fit loop starting: {} tokens against a budget of {budget}",
        initial_summary.total_tokens
    );
    hooks.on_fit_start(budget, initial_summary.total_tokens)?;

    if initial_summary.total_tokens <= budget {
        log::info!(
            "fit loop converged after 0 iterations: {} tokens already within budget",
            initial_summary.total_tokens
        );
        hooks.on_fit_complete(initial_summary.total_tokens, 0)?;
        return Ok(root);
    }

    let mut current = root;
    let mut iteration: u64 = 0;

    loop {
        if iteration >= limits.max_iterations {
            let error = FitError {
                kind: FitErrorKind::MaxIterationsExceeded,
                budget,
                total_tokens: 0,
                over_budget_by: 0,
                priority: None,
                iteration,
            };
            log::error!("fit loop aborted: exceeded {} iterations", limits.max_iterations);
            return Err(emit_fit_error(hooks, error));
        }

        let summary = summarize(&current, provider.as_ref(), &mut SummarizeCache::new())?;
        let total_tokens = summary.total_tokens;

        if total_tokens <= budget {
            log::info!("fit loop converged after {iteration} iteration(s): {total_tokens} tokens");
            hooks.on_fit_complete(total_tokens, iteration)?;
            return Ok(current);
        }

        let priority = match summary.max_reducer_priority {
            Some(priority) => priority,
            None => {
                let error = FitError {
                    kind: FitErrorKind::CannotReduceFurther,
                    budget,
                    total_tokens,
                    over_budget_by: total_tokens - budget,
                    priority: None,
                    iteration,
                };
                log::error!(
                    "fit loop failed: {total_tokens} tokens over a budget of {budget} with no active reducer left"
                );
                return Err(emit_fit_error(hooks, error));
            }
        };

        log::debug!("iteration {iteration}: reducing priority {priority} ({total_tokens} tokens over budget {budget})");
        hooks.on_fit_iteration(priority, total_tokens, iteration)?;

        let (rewritten, applied) =
            apply_strategies_at_priority(current, priority, iteration, total_tokens, provider, hooks).await?;

        if applied == 0 {
            let error = FitError {
                kind: FitErrorKind::StrategyDidNotApply,
                budget,
                total_tokens,
                over_budget_by: total_tokens - budget,
                priority: Some(priority),
                iteration,
            };
            log::error!("fit loop failed: priority {priority} had no scope a strategy could act on");
            return Err(emit_fit_error(hooks, error));
        }

        let post_summary = summarize(&rewritten, provider.as_ref(), &mut SummarizeCache::new())?;
        if post_summary.total_tokens >= total_tokens {
            let error = FitError {
                kind: FitErrorKind::NoProgress,
                budget,
                total_tokens: post_summary.total_tokens,
                over_budget_by: post_summary.total_tokens.saturating_sub(budget),
                priority: Some(priority),
                iteration,
            };
            log::error!(
                "fit loop failed: priority {priority} made no progress ({total_tokens} -> {} tokens)",
                post_summary.total_tokens
            );
            return Err(emit_fit_error(hooks, error));
        }

        log::debug!("iteration {iteration}: {total_tokens} -> {} tokens", post_summary.total_tokens);
        current = rewritten;
        iteration += 1;
    }
}
