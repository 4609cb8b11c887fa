//! Item entries: a render description plus a cached, invalidatable layout.
//!
//! Every cached layout remembers the constraint it was computed for and is only handed out for
//! that exact constraint. Asynchronous layout is last-request-wins: each entry carries a
//! generation counter, every computation is tagged with the generation it started under, and a
//! result whose tag no longer matches is discarded on arrival. At most one computation per entry
//! runs at a time; a request for a different constraint while one is running is parked as the
//! single queued request and picked up by the same worker.

use std::sync::{Arc, Mutex};

use crate::executor::{Executor, lock};
use crate::{LayoutError, LayoutPool, Size, SizeConstraint};

/// Turns an item's content into a measured layout.
///
/// Implementations must be callable from any thread; the binder calls them on the UI thread for
/// synchronous layout and on the background executor for prefetching.
pub trait LayoutEngine: Send + Sync + 'static {
    type Content: Send + Sync + 'static;
    type Layout: Send + Sync + 'static;

    fn compute_layout(
        &self,
        content: &Self::Content,
        constraint: SizeConstraint,
        pool: &LayoutPool<Self::Layout>,
    ) -> Result<(Size, Self::Layout), LayoutError>;
}

/// Immutable description of what to render for one item.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderInfo<C> {
    pub content: C,
    /// Identity used when the binder runs with stable ids.
    pub stable_id: Option<u64>,
    /// Sticky items are never released by the recycling policy.
    pub sticky: bool,
    /// Takes the whole cross axis in a grid.
    pub full_span: bool,
    /// Columns taken in a grid (ignored for linear lists and full-span items).
    pub span_size: u32,
    /// Width as a percentage of the surface width.
    pub parent_width_percent: Option<f32>,
    /// Height as a percentage of the surface height.
    pub parent_height_percent: Option<f32>,
}

impl<C> RenderInfo<C> {
    pub fn new(content: C) -> Self {
        Self {
            content,
            stable_id: None,
            sticky: false,
            full_span: false,
            span_size: 1,
            parent_width_percent: None,
            parent_height_percent: None,
        }
    }

    pub fn with_stable_id(mut self, id: u64) -> Self {
        self.stable_id = Some(id);
        self
    }

    pub fn with_sticky(mut self, sticky: bool) -> Self {
        self.sticky = sticky;
        self
    }

    pub fn with_full_span(mut self, full_span: bool) -> Self {
        self.full_span = full_span;
        self
    }

    pub fn with_span_size(mut self, span_size: u32) -> Self {
        self.span_size = span_size.max(1);
        self
    }

    pub fn with_parent_width_percent(mut self, percent: f32) -> Self {
        self.parent_width_percent = Some(percent);
        self
    }

    pub fn with_parent_height_percent(mut self, percent: f32) -> Self {
        self.parent_height_percent = Some(percent);
        self
    }
}

/// A computed layout together with the constraint it is valid for.
pub struct LayoutOutput<L> {
    pub size: Size,
    pub constraint: SizeConstraint,
    pub layout: Arc<L>,
}

impl<L> Clone for LayoutOutput<L> {
    fn clone(&self) -> Self {
        Self {
            size: self.size,
            constraint: self.constraint,
            layout: Arc::clone(&self.layout),
        }
    }
}

impl<L> core::fmt::Debug for LayoutOutput<L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LayoutOutput")
            .field("size", &self.size)
            .field("constraint", &self.constraint)
            .finish_non_exhaustive()
    }
}

/// How an asynchronous layout request ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LayoutOutcome {
    Ready(Size),
    Failed(LayoutError),
    /// The request was superseded or the cache was released before the result arrived.
    Discarded,
}

pub type ReadyCallback = Box<dyn FnOnce(LayoutOutcome) + Send + 'static>;

/// What [`ItemEntry::compute_layout_async`] did with a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AsyncRequest {
    /// The cache was already valid; the callback ran inline.
    AlreadyValid,
    /// A computation for the same constraint is running; the callback waits for it.
    Coalesced,
    /// A computation for another constraint is running; this one runs right after it.
    Queued,
    /// A new computation was handed to the executor.
    Scheduled,
}

pub(crate) enum Release<L> {
    Released(Option<Arc<L>>),
    /// The entry is displayed; it is released once detached.
    Deferred,
    /// Sticky or suppressed.
    Retained,
}

#[derive(Clone, Copy)]
struct Running {
    constraint: SizeConstraint,
    ticket: u64,
}

struct EntryState<C, L> {
    info: Arc<RenderInfo<C>>,
    cache: Option<LayoutOutput<L>>,
    generation: u64,
    running: Option<Running>,
    queued: Option<SizeConstraint>,
    waiters: Vec<ReadyCallback>,
    last_error: Option<(SizeConstraint, LayoutError)>,
    attached: bool,
    release_pending: bool,
    release_suppressed: bool,
}

impl<C, L> EntryState<C, L> {
    fn is_valid_for(&self, constraint: SizeConstraint) -> bool {
        self.cache
            .as_ref()
            .is_some_and(|c| c.constraint == constraint)
    }

    fn drop_cache(&mut self) -> Option<Arc<L>> {
        self.generation = self.generation.wrapping_add(1);
        self.queued = None;
        self.last_error = None;
        self.cache.take().map(|c| c.layout)
    }
}

/// One element of the live list.
pub struct ItemEntry<E: LayoutEngine> {
    id: u64,
    state: Mutex<EntryState<E::Content, E::Layout>>,
}

impl<E: LayoutEngine> ItemEntry<E> {
    pub(crate) fn new(id: u64, info: RenderInfo<E::Content>) -> Self {
        Self {
            id,
            state: Mutex::new(EntryState {
                info: Arc::new(info),
                cache: None,
                generation: 0,
                running: None,
                queued: None,
                waiters: Vec::new(),
                last_error: None,
                attached: false,
                release_pending: false,
                release_suppressed: false,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn render_info(&self) -> Arc<RenderInfo<E::Content>> {
        Arc::clone(&lock(&self.state).info)
    }

    pub fn is_sticky(&self) -> bool {
        lock(&self.state).info.sticky
    }

    pub fn is_valid_for(&self, constraint: SizeConstraint) -> bool {
        lock(&self.state).is_valid_for(constraint)
    }

    /// The cached layout, whatever constraint it was computed for.
    pub fn layout(&self) -> Option<LayoutOutput<E::Layout>> {
        lock(&self.state).cache.clone()
    }

    /// The cached layout, only when it was computed for `constraint`.
    pub fn layout_for(&self, constraint: SizeConstraint) -> Option<LayoutOutput<E::Layout>> {
        let st = lock(&self.state);
        st.cache
            .as_ref()
            .filter(|c| c.constraint == constraint)
            .cloned()
    }

    pub fn has_layout(&self) -> bool {
        lock(&self.state).cache.is_some()
    }

    pub fn last_error(&self) -> Option<LayoutError> {
        lock(&self.state).last_error.as_ref().map(|(_, e)| e.clone())
    }

    pub fn is_layout_in_flight(&self) -> bool {
        lock(&self.state).running.is_some()
    }

    pub fn is_attached(&self) -> bool {
        lock(&self.state).attached
    }

    /// Whether layout for `constraint` has finished, successfully or not, with nothing running.
    pub(crate) fn is_settled_for(&self, constraint: SizeConstraint) -> bool {
        let st = lock(&self.state);
        if st.is_valid_for(constraint) {
            return true;
        }
        st.running.is_none()
            && st
                .last_error
                .as_ref()
                .is_some_and(|(c, _)| *c == constraint)
    }

    /// Whether an asynchronous request for `constraint` would start or queue new work.
    ///
    /// A failure for the same constraint is only retried by an explicit synchronous bind.
    pub(crate) fn needs_layout_for(&self, constraint: SizeConstraint) -> bool {
        let st = lock(&self.state);
        if st.is_valid_for(constraint) {
            return false;
        }
        if let Some(running) = st.running {
            let current = running.ticket == st.generation && st.queued.is_none();
            if current && running.constraint == constraint {
                return false;
            }
            if st.queued == Some(constraint) {
                return false;
            }
            return true;
        }
        !st
            .last_error
            .as_ref()
            .is_some_and(|(c, _)| *c == constraint)
    }

    /// Replaces the render description and drops the cached layout.
    pub(crate) fn set_render_info(&self, info: RenderInfo<E::Content>) -> Option<Arc<E::Layout>> {
        let mut st = lock(&self.state);
        st.info = Arc::new(info);
        st.drop_cache()
    }

    /// Drops the cached layout; any in-flight result is discarded on arrival.
    pub fn invalidate(&self) -> Option<Arc<E::Layout>> {
        lock(&self.state).drop_cache()
    }

    pub(crate) fn set_release_suppressed(&self, suppressed: bool) {
        lock(&self.state).release_suppressed = suppressed;
    }

    pub(crate) fn set_attached(&self, attached: bool) {
        lock(&self.state).attached = attached;
    }

    /// Marks the entry detached and reports whether a release was deferred while it was shown.
    pub(crate) fn detach(&self) -> bool {
        let mut st = lock(&self.state);
        st.attached = false;
        core::mem::take(&mut st.release_pending)
    }

    pub(crate) fn cancel_pending_release(&self) {
        lock(&self.state).release_pending = false;
    }

    /// Releases the cached layout unless the entry is sticky, suppressed, or displayed.
    pub(crate) fn release_layout(&self) -> Release<E::Layout> {
        let mut st = lock(&self.state);
        if st.info.sticky || st.release_suppressed {
            return Release::Retained;
        }
        if st.cache.is_none() && st.running.is_none() {
            return Release::Released(None);
        }
        if st.attached {
            st.release_pending = true;
            return Release::Deferred;
        }
        st.release_pending = false;
        Release::Released(st.drop_cache())
    }

    /// Computes (or returns the cached) layout for `constraint` on the calling thread.
    pub fn compute_layout_sync(
        &self,
        engine: &E,
        pool: &LayoutPool<E::Layout>,
        constraint: SizeConstraint,
    ) -> Result<LayoutOutput<E::Layout>, LayoutError> {
        let (info, ticket) = {
            let mut st = lock(&self.state);
            if let Some(cache) = st.cache.as_ref().filter(|c| c.constraint == constraint) {
                return Ok(cache.clone());
            }
            st.generation = st.generation.wrapping_add(1);
            st.queued = None;
            (Arc::clone(&st.info), st.generation)
        };

        vtrace!(id = self.id, "compute_layout_sync");
        let result = engine.compute_layout(&info.content, constraint, pool);

        let mut st = lock(&self.state);
        match result {
            Ok((size, layout)) => {
                let output = LayoutOutput {
                    size,
                    constraint,
                    layout: Arc::new(layout),
                };
                if st.generation == ticket {
                    let old = st.cache.replace(output.clone());
                    st.last_error = None;
                    drop(st);
                    recycle(pool, old.map(|c| c.layout));
                }
                Ok(output)
            }
            Err(error) => {
                vwarn!(id = self.id, error = %error, "synchronous layout failed");
                if st.generation == ticket {
                    st.last_error = Some((constraint, error.clone()));
                }
                Err(error)
            }
        }
    }

    /// Requests a layout for `constraint` on `executor`. Never blocks.
    ///
    /// `on_ready` runs on the executor thread once the latest request for this entry settles, or
    /// inline when the cache is already valid.
    pub fn compute_layout_async(
        self: &Arc<Self>,
        engine: &Arc<E>,
        pool: &Arc<LayoutPool<E::Layout>>,
        executor: &dyn Executor,
        constraint: SizeConstraint,
        on_ready: ReadyCallback,
    ) -> AsyncRequest {
        let mut st = lock(&self.state);
        if let Some(cache) = st.cache.as_ref().filter(|c| c.constraint == constraint) {
            let size = cache.size;
            drop(st);
            on_ready(LayoutOutcome::Ready(size));
            return AsyncRequest::AlreadyValid;
        }

        if let Some(running) = st.running {
            st.waiters.push(on_ready);
            if running.constraint == constraint
                && running.ticket == st.generation
                && st.queued.is_none()
            {
                return AsyncRequest::Coalesced;
            }
            if running.ticket == st.generation {
                st.generation = st.generation.wrapping_add(1);
            }
            st.queued = Some(constraint);
            vtrace!(id = self.id, "compute_layout_async: queued behind running layout");
            return AsyncRequest::Queued;
        }

        st.waiters.push(on_ready);
        let ticket = st.generation;
        st.running = Some(Running { constraint, ticket });
        let info = Arc::clone(&st.info);
        drop(st);

        let entry = Arc::clone(self);
        let engine = Arc::clone(engine);
        let pool = Arc::clone(pool);
        executor.execute(Box::new(move || {
            entry.run_async(&*engine, &pool, info, constraint, ticket);
        }));
        AsyncRequest::Scheduled
    }

    fn run_async(
        &self,
        engine: &E,
        pool: &LayoutPool<E::Layout>,
        mut info: Arc<RenderInfo<E::Content>>,
        mut constraint: SizeConstraint,
        mut ticket: u64,
    ) {
        loop {
            let result = engine.compute_layout(&info.content, constraint, pool);

            let mut st = lock(&self.state);
            if st.generation == ticket {
                let outcome = match result {
                    Ok((size, layout)) => {
                        let old = st.cache.replace(LayoutOutput {
                            size,
                            constraint,
                            layout: Arc::new(layout),
                        });
                        st.last_error = None;
                        recycle(pool, old.map(|c| c.layout));
                        LayoutOutcome::Ready(size)
                    }
                    Err(error) => {
                        vwarn!(id = self.id, error = %error, "asynchronous layout failed");
                        st.last_error = Some((constraint, error.clone()));
                        LayoutOutcome::Failed(error)
                    }
                };
                st.running = None;
                let waiters = core::mem::take(&mut st.waiters);
                drop(st);
                fire(waiters, outcome);
                return;
            }

            // Superseded while computing.
            if let Ok((_, layout)) = result {
                pool.release(layout);
            }
            if let Some(next) = st.queued.take() {
                constraint = next;
                ticket = st.generation;
                info = Arc::clone(&st.info);
                st.running = Some(Running { constraint, ticket });
                vtrace!(id = self.id, "run_async: picking up queued request");
                continue;
            }

            st.running = None;
            let outcome = match st.cache.as_ref().filter(|c| c.constraint == constraint) {
                Some(cache) => LayoutOutcome::Ready(cache.size),
                None => LayoutOutcome::Discarded,
            };
            let waiters = core::mem::take(&mut st.waiters);
            drop(st);
            fire(waiters, outcome);
            return;
        }
    }
}

impl<E: LayoutEngine> core::fmt::Debug for ItemEntry<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let st = lock(&self.state);
        f.debug_struct("ItemEntry")
            .field("id", &self.id)
            .field("sticky", &st.info.sticky)
            .field("layout", &st.cache)
            .field("in_flight", &st.running.is_some())
            .finish_non_exhaustive()
    }
}

fn fire(waiters: Vec<ReadyCallback>, outcome: LayoutOutcome) {
    for waiter in waiters {
        waiter(outcome.clone());
    }
}

/// Hands a no-longer-referenced layout back to the pool.
pub(crate) fn recycle<L>(pool: &LayoutPool<L>, layout: Option<Arc<L>>) {
    if let Some(layout) = layout {
        if let Ok(layout) = Arc::try_unwrap(layout) {
            pool.release(layout);
        }
    }
}
