// src/lib.rs

//! Compose LLM prompts from a typed node tree and render them into
//! provider-native message layouts while keeping the total token count
//! under a caller-specified budget.
//!
//! See [`render`] for the entry point, [`cria::node`] for the prompt tree,
//! and [`cria::fit`] for the budget-enforcing reducer.

pub mod cria;

// Re-exporting key items for easier external access.
pub use cria::context::Context;
pub use cria::error::CriaError;
pub use cria::hooks::RenderHooks;
pub use cria::node::{Node, Part, Role};
pub use cria::render::{render, RenderOptions};
