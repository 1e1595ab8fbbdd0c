//! The stable error taxonomy. Every variant is a hand-written struct
//! or enum with manual `Display`/`Error` impls, matching the rest of the
//! crate's error handling — no `thiserror` dependency is introduced.

use std::error::Error;
use std::fmt;

use crate::cria::layout::ShapeError;
use crate::cria::provider::CodecError;

/// Multiple distinct providers appeared in one tree, or a render-time
/// override disagreed with the provider found in the tree (invariant 4).
#[derive(Debug, Clone)]
pub struct ProviderMismatch {
    pub reason: String,
}

impl fmt::Display for ProviderMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider mismatch: {}", self.reason)
    }
}

impl Error for ProviderMismatch {}

/// Which of the three fit-loop failure modes occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitErrorKind {
    /// Over budget with no remaining reducers.
    CannotReduceFurther,
    /// No scope at the selected priority produced a change.
    StrategyDidNotApply,
    /// An iteration did not strictly decrease total tokens.
    NoProgress,
    /// Defensive bound: the fit loop exceeded
    /// [`crate::cria::fit::FitLimits::max_iterations`] without converging.
    /// Not part of the budget-driven termination contract — it exists only
    /// to stop a buggy strategy from looping a host process forever.
    MaxIterationsExceeded,
}

impl fmt::Display for FitErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FitErrorKind::CannotReduceFurther => "cannot reduce further",
            FitErrorKind::StrategyDidNotApply => "strategy did not apply",
            FitErrorKind::NoProgress => "no progress",
            FitErrorKind::MaxIterationsExceeded => "max iterations exceeded",
        };
        write!(f, "{s}")
    }
}

/// Carries the diagnostic context every `FitError` must surface:
/// `budget`, `total_tokens`, `over_budget_by`, `iteration`, `priority`.
#[derive(Debug, Clone)]
pub struct FitError {
    pub kind: FitErrorKind,
    pub budget: u64,
    pub total_tokens: u64,
    pub over_budget_by: u64,
    pub priority: Option<i64>,
    pub iteration: u64,
}

impl fmt::Display for FitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fit error ({}): {} tokens over a budget of {} ({} over), at iteration {}, priority {:?}",
            self.kind,
            self.total_tokens,
            self.budget,
            self.over_budget_by,
            self.iteration,
            self.priority
        )
    }
}

impl Error for FitError {}

/// A reduction strategy threw while being applied.
#[derive(Debug)]
pub struct StrategyError {
    pub source: Box<dyn Error + Send + Sync>,
    pub priority: i64,
    pub iteration: u64,
    pub scope_id: Option<String>,
}

impl fmt::Display for StrategyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "strategy error at priority {} (iteration {}, scope {:?}): {}",
            self.priority, self.iteration, self.scope_id, self.source
        )
    }
}

impl Error for StrategyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// An observation hook threw. Aborts the render synchronously.
#[derive(Debug)]
pub struct HookError {
    pub source: Box<dyn Error + Send + Sync>,
    /// Set when this `HookError` was raised by `on_fit_error` itself while
    /// handling a prior `FitError`.
    pub cause: Option<Box<FitError>>,
}

impl HookError {
    #[must_use]
    pub fn new(source: impl Error + Send + Sync + 'static) -> Self {
        Self {
            source: Box::new(source),
            cause: None,
        }
    }
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hook error: {}", self.source)
    }
}

impl Error for HookError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// The error [`crate::cria::render::render`] returns.
#[derive(Debug)]
pub enum CriaError {
    Shape(ShapeError),
    /// Invariant 3 violation: two nodes in the tree shared a semantic id.
    DuplicateId(String),
    ProviderMismatch(ProviderMismatch),
    Fit(FitError),
    Strategy(StrategyError),
    Hook(HookError),
    Codec(CodecError),
}

impl fmt::Display for CriaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CriaError::Shape(e) => write!(f, "{e}"),
            CriaError::DuplicateId(id) => write!(f, "duplicate node id: {id}"),
            CriaError::ProviderMismatch(e) => write!(f, "{e}"),
            CriaError::Fit(e) => write!(f, "{e}"),
            CriaError::Strategy(e) => write!(f, "{e}"),
            CriaError::Hook(e) => write!(f, "{e}"),
            CriaError::Codec(e) => write!(f, "{e}"),
        }
    }
}

impl Error for CriaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CriaError::Shape(e) => Some(e),
            CriaError::DuplicateId(_) => None,
            CriaError::ProviderMismatch(e) => Some(e),
            CriaError::Fit(e) => Some(e),
            CriaError::Strategy(e) => Some(e),
            CriaError::Hook(e) => Some(e),
            CriaError::Codec(e) => Some(e),
        }
    }
}

impl From<ShapeError> for CriaError {
    fn from(e: ShapeError) -> Self {
        CriaError::Shape(e)
    }
}

impl From<ProviderMismatch> for CriaError {
    fn from(e: ProviderMismatch) -> Self {
        CriaError::ProviderMismatch(e)
    }
}

impl From<FitError> for CriaError {
    fn from(e: FitError) -> Self {
        CriaError::Fit(e)
    }
}

impl From<StrategyError> for CriaError {
    fn from(e: StrategyError) -> Self {
        CriaError::Strategy(e)
    }
}

impl From<HookError> for CriaError {
    fn from(e: HookError) -> Self {
        CriaError::Hook(e)
    }
}

impl From<CodecError> for CriaError {
    fn from(e: CodecError) -> Self {
        CriaError::Codec(e)
    }
}
