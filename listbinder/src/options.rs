use std::sync::Arc;

use crate::{
    BinderError, CommitPolicy, CustomTraversal, LayoutInfo, RecyclingStrategy, TraversalOrder,
    WorkingRangeEvent, WorkingRangeOptions,
};

/// A callback receiving errors that surface outside a direct call (batch application, retry
/// exhaustion).
///
/// When none is installed those errors panic.
pub type ErrorHandler = Arc<dyn Fn(&BinderError) + Send + Sync>;

/// Default number of frames `apply_ready_batches` waits for a surface that is mid relayout.
pub const DEFAULT_MAX_APPLY_RETRIES: u32 = 100;

/// Default fraction of a viewport prepared on each side of the visible items.
pub const DEFAULT_RANGE_RATIO: f32 = 2.0;

/// Configuration for [`crate::Binder`].
///
/// Callbacks are stored in `Arc`s so options stay cheap to clone.
pub struct BinderOptions {
    pub layout_info: LayoutInfo,
    pub range_ratio: f32,
    /// Items per viewport. When `None` it is derived from the first synchronously measured item.
    pub estimated_viewport_count: Option<usize>,
    /// The list wraps around: every item is always in range and nothing is released.
    pub circular: bool,
    /// Use `RenderInfo::stable_id` as the item identity when present.
    pub has_stable_ids: bool,
    pub commit_policy: CommitPolicy,
    pub recycling: RecyclingStrategy,
    pub traversal: TraversalOrder,
    pub max_apply_retries: u32,
    pub working_range: Option<WorkingRangeOptions>,
    pub on_error: Option<ErrorHandler>,
    /// Capacity of the layout pool the binder creates when none is injected.
    pub pool_capacity: usize,
}

impl Default for BinderOptions {
    fn default() -> Self {
        Self::new(LayoutInfo::default())
    }
}

impl Clone for BinderOptions {
    fn clone(&self) -> Self {
        Self {
            layout_info: self.layout_info,
            range_ratio: self.range_ratio,
            estimated_viewport_count: self.estimated_viewport_count,
            circular: self.circular,
            has_stable_ids: self.has_stable_ids,
            commit_policy: self.commit_policy,
            recycling: self.recycling,
            traversal: self.traversal.clone(),
            max_apply_retries: self.max_apply_retries,
            working_range: self.working_range.clone(),
            on_error: self.on_error.clone(),
            pool_capacity: self.pool_capacity,
        }
    }
}

impl BinderOptions {
    pub fn new(layout_info: LayoutInfo) -> Self {
        Self {
            layout_info,
            range_ratio: DEFAULT_RANGE_RATIO,
            estimated_viewport_count: None,
            circular: false,
            has_stable_ids: false,
            commit_policy: CommitPolicy::Immediate,
            recycling: RecyclingStrategy::Default,
            traversal: TraversalOrder::Forward,
            max_apply_retries: DEFAULT_MAX_APPLY_RETRIES,
            working_range: None,
            on_error: None,
            pool_capacity: 16,
        }
    }

    pub fn with_layout_info(mut self, layout_info: LayoutInfo) -> Self {
        self.layout_info = layout_info;
        self
    }

    pub fn with_range_ratio(mut self, range_ratio: f32) -> Self {
        self.range_ratio = range_ratio;
        self
    }

    pub fn with_estimated_viewport_count(mut self, count: Option<usize>) -> Self {
        self.estimated_viewport_count = count.map(|c| c.max(1));
        self
    }

    pub fn with_circular(mut self, circular: bool) -> Self {
        self.circular = circular;
        self
    }

    pub fn with_stable_ids(mut self, has_stable_ids: bool) -> Self {
        self.has_stable_ids = has_stable_ids;
        self
    }

    pub fn with_commit_policy(mut self, commit_policy: CommitPolicy) -> Self {
        self.commit_policy = commit_policy;
        self
    }

    pub fn with_recycling(mut self, recycling: RecyclingStrategy) -> Self {
        self.recycling = recycling;
        self
    }

    pub fn with_traversal(mut self, traversal: TraversalOrder) -> Self {
        self.traversal = traversal;
        self
    }

    pub fn with_custom_traversal(
        mut self,
        traverse: impl Fn(&mut crate::IndexEmitter<'_>, Option<crate::ScrollDirection>)
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.traversal = TraversalOrder::Custom(Arc::new(traverse) as CustomTraversal);
        self
    }

    pub fn with_max_apply_retries(mut self, retries: u32) -> Self {
        self.max_apply_retries = retries;
        self
    }

    pub fn with_working_range(
        mut self,
        before: usize,
        after: usize,
        handler: impl Fn(WorkingRangeEvent) + Send + Sync + 'static,
    ) -> Self {
        self.working_range = Some(WorkingRangeOptions::new(before, after, handler));
        self
    }

    pub fn with_on_error(
        mut self,
        on_error: impl Fn(&BinderError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(on_error) as ErrorHandler);
        self
    }

    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }
}

impl core::fmt::Debug for BinderOptions {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BinderOptions")
            .field("layout_info", &self.layout_info)
            .field("range_ratio", &self.range_ratio)
            .field("estimated_viewport_count", &self.estimated_viewport_count)
            .field("circular", &self.circular)
            .field("has_stable_ids", &self.has_stable_ids)
            .field("commit_policy", &self.commit_policy)
            .field("recycling", &self.recycling)
            .field("traversal", &self.traversal)
            .field("max_apply_retries", &self.max_apply_retries)
            .field("working_range", &self.working_range)
            .field("pool_capacity", &self.pool_capacity)
            .finish_non_exhaustive()
    }
}
