//! A headless virtualized list binder.
//!
//! For thread-backed executors (a worker pool and a dedicated UI loop), see the
//! `listbinder-adapter` crate.
//!
//! This crate manages a large ordered list of items, each backed by a lazily computed layout, and
//! keeps a bounded window of those layouts ready for display while the rest are released:
//! batched mutation of the live list, off-thread layout with last-request-wins semantics,
//! viewport-driven prefetch and eviction, and strict UI-thread affinity.
//!
//! It is UI-agnostic. A host is expected to provide:
//! - a [`LayoutEngine`] that turns item content into a measured layout
//! - a [`Surface`] that displays items and reports what is visible
//! - a [`UiExecutor`] for the UI-affine thread and an [`Executor`] for background layout
#![forbid(unsafe_code)]

#[macro_use]
mod macros;

mod batch;
mod binder;
mod emitter;
mod entry;
mod error;
mod executor;
mod options;
mod pool;
mod range;
mod recycle;
mod state;
mod surface;
mod types;


pub use batch::{BatchCallback, BatchOutcome, CommitPolicy};
pub use binder::Binder;
pub use emitter::IndexEmitter;
pub use entry::{
    AsyncRequest, ItemEntry, LayoutEngine, LayoutOutcome, LayoutOutput, ReadyCallback, RenderInfo,
};
pub use error::{BinderError, LayoutError, OpKind};
pub use executor::{
    Executor, FrameQueue, InlineExecutor, QueuedExecutor, Schedulers, Task, UiExecutor,
};
pub use options::{BinderOptions, DEFAULT_MAX_APPLY_RETRIES, DEFAULT_RANGE_RATIO, ErrorHandler};
pub use pool::{LayoutPool, PoolStats};
pub use range::{
    CustomTraversal, RangeCalculator, TraversalOrder, WorkingRangeEvent, WorkingRangeHandler,
    WorkingRangeOptions, estimate_viewport_count,
};
pub use recycle::RecyclingStrategy;
pub use state::{MeasureState, ScrollPosition};
pub use surface::Surface;
pub use types::{
    IndexRange, LayoutInfo, Orientation, ScrollDirection, Size, SizeConstraint, SizeSpec,
    VisibleRange,
};
