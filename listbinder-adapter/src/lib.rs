//! Runtime adapters for the `listbinder` crate.
//!
//! The `listbinder` crate never spawns threads; it is driven through the `UiExecutor` and
//! `Executor` seams. This crate provides std-thread implementations of both, plus small helpers
//! commonly needed by hosts:
//!
//! - A worker pool for off-thread layout
//! - A dedicated UI loop with a fixed frame interval
//! - Scroll anchoring by item identity (e.g. prepend without visual jumps)
//!
//! This crate is intentionally framework-agnostic (no toolkit bindings).
#![forbid(unsafe_code)]

#[macro_use]
mod macros;

mod anchor;
mod runtime;
mod ui_loop;
mod worker_pool;

#[cfg(test)]
mod tests;

pub use anchor::{ScrollAnchor, apply_anchor, capture_first_visible_anchor};
pub use runtime::Runtime;
pub use ui_loop::{DEFAULT_FRAME_INTERVAL, UiLoop};
pub use worker_pool::WorkerPool;
