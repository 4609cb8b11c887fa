//! The virtualization engine.
//!
//! A [`Binder`] owns the live ordered list of item entries and the queue of pending batches,
//! both behind one mutex. It never calls the layout engine, the surface, or a user callback while
//! holding that mutex: every operation collects the work it implies into a plan under the lock
//! and executes the plan after releasing it.
//!
//! Lock order is binder state, then entry, then pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::batch::{Batch, Change, MutationQueue, Operation, apply_operation};
use crate::entry::{ItemEntry, LayoutEngine, Release, recycle};
use crate::error::protocol_violation;
use crate::executor::{Task, lock};
use crate::range::{WorkingRangeTracker, estimate_viewport_count};
use crate::recycle::Recycler;
use crate::{
    BatchCallback, BatchOutcome, BinderError, BinderOptions, CommitPolicy, IndexRange, LayoutInfo,
    LayoutOutcome, LayoutOutput, LayoutPool, MeasureState, OpKind, Orientation, RangeCalculator,
    ReadyCallback, RenderInfo, Schedulers, ScrollDirection, ScrollPosition, Size, SizeConstraint,
    SizeSpec, Surface, VisibleRange, WorkingRangeEvent,
};

static NEXT_WRITER_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static WRITER_TOKEN: u64 = NEXT_WRITER_TOKEN.fetch_add(1, Ordering::Relaxed);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MutationMode {
    Unset,
    Sync,
    Async,
}

enum SurfaceCall {
    Inserted { position: usize, count: usize },
    Changed { position: usize, count: usize },
    Removed { position: usize, count: usize },
    Moved { from: usize, to: usize },
    DataSetChanged,
    RequestLayout,
}

/// Work collected under the state lock, executed after it is released.
struct Plan<E: LayoutEngine> {
    surface: Option<Arc<dyn Surface>>,
    surface_calls: Vec<SurfaceCall>,
    callbacks: Vec<(BatchCallback, BatchOutcome)>,
    layouts: Vec<(Arc<ItemEntry<E>>, SizeConstraint)>,
    events: Vec<WorkingRangeEvent>,
    errors: Vec<BinderError>,
    needs_viewport_estimate: bool,
}

impl<E: LayoutEngine> Plan<E> {
    fn new() -> Self {
        Self {
            surface: None,
            surface_calls: Vec::new(),
            callbacks: Vec::new(),
            layouts: Vec::new(),
            events: Vec::new(),
            errors: Vec::new(),
            needs_viewport_estimate: false,
        }
    }

    fn notify(&mut self, surface: Option<&Arc<dyn Surface>>, call: SurfaceCall) {
        if let Some(surface) = surface {
            self.surface = Some(Arc::clone(surface));
            self.surface_calls.push(call);
        }
    }
}

struct State<E: LayoutEngine> {
    entries: Vec<Arc<ItemEntry<E>>>,
    queue: MutationQueue<E>,
    mode: MutationMode,
    measure: MeasureState,
    /// The cross axis was discovered from the first item rather than given by the constraint.
    cross_from_content: bool,
    viewport_count: Option<usize>,
    /// `viewport_count` was derived from an item rather than supplied in options.
    viewport_estimated: bool,
    prepared: Option<IndexRange>,
    recycler: Recycler,
    working: WorkingRangeTracker,
    visible: VisibleRange,
    direction: Option<ScrollDirection>,
    surface: Option<Arc<dyn Surface>>,
    saved_position: Option<ScrollPosition>,
    apply_retries: u32,
    apply_posted: bool,
}

struct Inner<E: LayoutEngine> {
    engine: Arc<E>,
    options: BinderOptions,
    calculator: RangeCalculator,
    pool: Arc<LayoutPool<E::Layout>>,
    schedulers: Schedulers,
    next_id: AtomicU64,
    writer: AtomicU64,
    state: Mutex<State<E>>,
}

/// A virtualized list: the live ordered list of items, their layouts, and the window of them
/// kept ready for display.
///
/// `Binder` is a cheap handle; clones share the same list.
///
/// Mutations come in two exclusive styles. Synchronous mutations (`insert_item_at`, ...) run on
/// the UI thread and take effect before they return. Asynchronous mutations (`*_async`) may be
/// submitted from any thread; they are grouped into batches by
/// [`notify_batch_complete`](Self::notify_batch_complete) and applied in order on the UI thread.
/// Using both styles on one binder panics.
pub struct Binder<E: LayoutEngine> {
    inner: Arc<Inner<E>>,
}

impl<E: LayoutEngine> Clone for Binder<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct WriterGuard<'a> {
    slot: &'a AtomicU64,
    token: u64,
}

impl Drop for WriterGuard<'_> {
    fn drop(&mut self) {
        if self.token != 0 {
            self.slot.store(0, Ordering::Release);
        }
    }
}

/// The constraint an item is laid out with inside a surface of `size`.
fn child_constraint<C>(
    layout_info: LayoutInfo,
    info: &RenderInfo<C>,
    size: Size,
) -> SizeConstraint {
    let orientation = layout_info.orientation;
    let (main, cross) = (size.main(orientation), size.cross(orientation));
    let spans = layout_info.span_count.max(1);
    let span_cross = if info.full_span || spans == 1 {
        cross
    } else {
        let taken = u64::from(info.span_size.clamp(1, spans));
        (u64::from(cross) * taken / u64::from(spans)) as u32
    };

    let (main_percent, cross_percent) = match orientation {
        Orientation::Vertical => (info.parent_height_percent, info.parent_width_percent),
        Orientation::Horizontal => (info.parent_width_percent, info.parent_height_percent),
    };
    let cross_spec = SizeSpec::Exact(cross_percent.map_or(span_cross, |p| percent_of(cross, p)));
    let main_spec = main_percent.map_or(SizeSpec::Unspecified, |p| {
        SizeSpec::Exact(percent_of(main, p))
    });
    SizeConstraint::from_main_cross(orientation, main_spec, cross_spec)
}

fn percent_of(value: u32, percent: f32) -> u32 {
    if !percent.is_finite() {
        return value;
    }
    (value as f32 * percent.max(0.0) / 100.0).round() as u32
}

impl<E: LayoutEngine> Binder<E> {
    /// Creates a binder with its own layout pool of `options.pool_capacity`.
    pub fn new(engine: Arc<E>, options: BinderOptions, schedulers: Schedulers) -> Self {
        let pool = Arc::new(LayoutPool::new(options.pool_capacity));
        Self::with_pool(engine, options, schedulers, pool)
    }

    /// Creates a binder that recycles layouts through a pool shared with other owners.
    pub fn with_pool(
        engine: Arc<E>,
        options: BinderOptions,
        schedulers: Schedulers,
        pool: Arc<LayoutPool<E::Layout>>,
    ) -> Self {
        let calculator = RangeCalculator::new(options.range_ratio, options.circular);
        let state = State {
            entries: Vec::new(),
            queue: MutationQueue::new(),
            mode: MutationMode::Unset,
            measure: MeasureState::Unmeasured,
            cross_from_content: false,
            viewport_count: options.estimated_viewport_count,
            viewport_estimated: false,
            prepared: None,
            recycler: Recycler::new(options.recycling),
            working: WorkingRangeTracker::default(),
            visible: VisibleRange::default(),
            direction: None,
            surface: None,
            saved_position: None,
            apply_retries: 0,
            apply_posted: false,
        };
        Self {
            inner: Arc::new(Inner {
                engine,
                options,
                calculator,
                pool,
                schedulers,
                next_id: AtomicU64::new(0),
                writer: AtomicU64::new(0),
                state: Mutex::new(state),
            }),
        }
    }

    pub fn options(&self) -> &BinderOptions {
        &self.inner.options
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.inner.engine
    }

    pub fn pool(&self) -> &Arc<LayoutPool<E::Layout>> {
        &self.inner.pool
    }

    fn state(&self) -> MutexGuard<'_, State<E>> {
        lock(&self.inner.state)
    }

    fn make_entry(&self, info: RenderInfo<E::Content>) -> Arc<ItemEntry<E>> {
        let id = match info.stable_id {
            Some(id) if self.inner.options.has_stable_ids => id,
            _ => self.inner.next_id.fetch_add(1, Ordering::Relaxed),
        };
        Arc::new(ItemEntry::new(id, info))
    }

    #[track_caller]
    fn assert_ui_thread(&self, op: &str) {
        if !self.inner.schedulers.ui.is_current() {
            protocol_violation(&format!("{op} must be called on the UI thread"));
        }
    }

    /// Single-writer check for asynchronous submission. Only enforced in debug builds.
    fn writer_guard(&self) -> WriterGuard<'_> {
        let slot = &self.inner.writer;
        if !cfg!(debug_assertions) {
            return WriterGuard { slot, token: 0 };
        }
        let token = WRITER_TOKEN.with(|t| *t);
        match slot.compare_exchange(0, token, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => WriterGuard { slot, token },
            Err(current) if current == token => WriterGuard { slot, token: 0 },
            Err(_) => protocol_violation(
                "asynchronous mutations were submitted from two threads at once; serialize writers",
            ),
        }
    }

    fn enter_mode(&self, st: &mut State<E>, mode: MutationMode, op: &str) {
        match st.mode {
            MutationMode::Unset => {
                if mode == MutationMode::Async {
                    st.queue.set_projected_len(st.entries.len());
                }
                st.mode = mode;
            }
            current if current == mode => {}
            current => protocol_violation(&format!(
                "{op}: synchronous and asynchronous mutations cannot be mixed on one binder \
                 (already in {current:?} mode)"
            )),
        }
    }

    fn report(&self, error: BinderError) {
        match &self.inner.options.on_error {
            Some(handler) => handler(&error),
            None => {
                verror!(error = %error, "unhandled binder error");
                panic!("listbinder: {error}");
            }
        }
    }

    // --- measurement -------------------------------------------------------------------

    /// Measures the binder for `constraint` and returns its size.
    ///
    /// The scrolling axis must be bounded. An unspecified cross axis is taken from the first
    /// visible item (or item 0), laid out synchronously. When the viewport count is not known yet
    /// the same item is used to estimate it. This is the only place the binder blocks on layout.
    pub fn measure(&self, constraint: SizeConstraint) -> Result<Size, BinderError> {
        let layout_info = self.inner.options.layout_info;
        let orientation = layout_info.orientation;
        let Some(main) = constraint.main(orientation).size() else {
            return Err(BinderError::InvalidConstraint {
                constraint,
                reason: "the scrolling axis must be Exact or AtMost",
            });
        };
        let known_cross = constraint.cross(orientation).size();

        let representative = {
            let st = self.state();
            if let MeasureState::Measured {
                constraint: measured,
                size,
            } = st.measure
            {
                if measured == constraint {
                    return Ok(size);
                }
            }
            let needs_item =
                known_cross.is_none() || st.viewport_count.is_none() || st.viewport_estimated;
            match st.entries.len() {
                0 => None,
                len if needs_item => {
                    let index = st.visible.first_visible.unwrap_or(0).min(len - 1);
                    Some((index, Arc::clone(&st.entries[index])))
                }
                _ => None,
            }
        };

        let mut item_size = None;
        if let Some((index, entry)) = representative {
            let item_constraint = match known_cross {
                Some(cross) => child_constraint(
                    layout_info,
                    &entry.render_info(),
                    Size::from_main_cross(orientation, main, cross),
                ),
                None => SizeConstraint::from_main_cross(
                    orientation,
                    SizeSpec::Unspecified,
                    SizeSpec::Unspecified,
                ),
            };
            match entry.compute_layout_sync(&self.inner.engine, &self.inner.pool, item_constraint)
            {
                Ok(output) => item_size = Some(output.size),
                Err(error) if known_cross.is_none() => {
                    return Err(BinderError::Layout {
                        index: Some(index),
                        error,
                    });
                }
                // The size is known; only the viewport estimate has to wait.
                Err(_) => {}
            }
        }

        let cross = known_cross.unwrap_or_else(|| item_size.map_or(0, |s| s.cross(orientation)));
        let size = Size::from_main_cross(orientation, main, cross);

        let mut plan = Plan::new();
        let waiting;
        {
            let mut st = self.state();
            let previous = st.measure.size();
            st.measure = MeasureState::Measured { constraint, size };
            st.cross_from_content = known_cross.is_none();
            if previous.is_some_and(|p| p != size) {
                self.invalidate_for_size(&st, size);
            }
            if let Some(item) = item_size {
                if st.viewport_estimated {
                    st.viewport_count = None;
                }
                self.record_viewport_estimate(&mut st, main, item);
            }
            vdebug!(
                width = size.width,
                height = size.height,
                viewport_count = ?st.viewport_count,
                "measured"
            );
            self.schedule_pending_inserts(&st, size, &mut plan);
            self.update_range(&mut st, &mut plan);
            waiting = st.queue.pending_len() > 0;
        }
        self.run_plan(plan);
        // Batches held back for the first measurement get another chance.
        if waiting {
            self.post_apply(false);
        }
        Ok(size)
    }

    /// Measures with an exact size, as a surface that was resized would.
    pub fn set_size(&self, width: u32, height: u32) -> Result<(), BinderError> {
        self.measure(SizeConstraint::exact(width, height)).map(|_| ())
    }

    /// Marks the current measurement stale and asks the mounted surface to measure again.
    pub fn request_remeasure(&self) {
        let surface = {
            let mut st = self.state();
            if let MeasureState::Measured { constraint, size } = st.measure {
                st.measure = MeasureState::RemeasurePending { constraint, size };
            }
            st.surface.clone()
        };
        if let Some(surface) = surface {
            surface.request_layout();
        }
    }

    fn invalidate_for_size(&self, st: &State<E>, size: Size) {
        let layout_info = self.inner.options.layout_info;
        for entry in st.entries.iter().chain(st.queue.inserted_entries()) {
            if !entry.has_layout() {
                continue;
            }
            let constraint = child_constraint(layout_info, &entry.render_info(), size);
            if !entry.is_valid_for(constraint) {
                recycle(&self.inner.pool, entry.invalidate());
            }
        }
        vdebug!("surface size changed; invalidated stale layouts");
    }

    fn record_viewport_estimate(&self, st: &mut State<E>, surface_main: u32, item: Size) {
        if st.viewport_count.is_some() {
            return;
        }
        let layout_info = self.inner.options.layout_info;
        let count = estimate_viewport_count(
            surface_main,
            item.main(layout_info.orientation),
            layout_info.span_count,
            st.entries.len(),
        );
        vdebug!(viewport_count = count, "estimated viewport count");
        st.viewport_count = Some(count);
        st.viewport_estimated = true;
    }

    /// Lays out the first visible item synchronously to learn the viewport count.
    fn establish_viewport_count(&self) {
        let layout_info = self.inner.options.layout_info;
        let (entry, constraint, main) = {
            let st = self.state();
            if st.viewport_count.is_some() || st.entries.is_empty() {
                return;
            }
            let Some(size) = st.measure.size() else {
                return;
            };
            let index = st
                .visible
                .first_visible
                .unwrap_or(0)
                .min(st.entries.len() - 1);
            let entry = Arc::clone(&st.entries[index]);
            let constraint = child_constraint(layout_info, &entry.render_info(), size);
            (entry, constraint, size.main(layout_info.orientation))
        };

        // A failure is already recorded on the entry; the range stays deferred.
        let Ok(output) =
            entry.compute_layout_sync(&self.inner.engine, &self.inner.pool, constraint)
        else {
            return;
        };

        let mut plan = Plan::new();
        {
            let mut st = self.state();
            self.record_viewport_estimate(&mut st, main, output.size);
            self.update_range(&mut st, &mut plan);
        }
        self.run_plan(plan);
    }

    fn schedule_pending_inserts(&self, st: &State<E>, size: Size, plan: &mut Plan<E>) {
        if self.inner.options.commit_policy != CommitPolicy::LayoutBeforeInsert {
            return;
        }
        let layout_info = self.inner.options.layout_info;
        for entry in st.queue.inserted_entries() {
            let constraint = child_constraint(layout_info, &entry.render_info(), size);
            if entry.needs_layout_for(constraint) {
                plan.layouts.push((Arc::clone(entry), constraint));
            }
        }
    }

    // --- range -------------------------------------------------------------------------

    /// Recomputes the prepared range, schedules missing layouts inside it and releases the
    /// layouts that fell out of the retained window.
    fn update_range(&self, st: &mut State<E>, plan: &mut Plan<E>) {
        let count = st.entries.len();
        if count == 0 {
            st.prepared = None;
            st.recycler.reset();
            plan.events.extend(st.working.clear());
            return;
        }
        let Some(size) = st.measure.size() else {
            return;
        };
        let Some(viewport_count) = st.viewport_count else {
            plan.needs_viewport_estimate = true;
            return;
        };

        let first = st.visible.first_visible.unwrap_or(0).min(count - 1);
        let last = st
            .visible
            .last_visible
            .unwrap_or_else(|| first.saturating_add(viewport_count.saturating_sub(1)))
            .clamp(first, count - 1);
        let prepared = self
            .inner
            .calculator
            .prepared_range(first, last, viewport_count, count);
        if st.prepared != Some(prepared) {
            vdebug!(
                start = prepared.start_index,
                end = prepared.end_index,
                count,
                "prepared range changed"
            );
            st.prepared = Some(prepared);
        }

        let layout_info = self.inner.options.layout_info;
        let entries = &st.entries;
        let visible = IndexRange::new(first, last + 1);
        self.inner
            .options
            .traversal
            .traverse(prepared, visible, st.direction, &mut |index| {
                let entry = &entries[index];
                let constraint = child_constraint(layout_info, &entry.render_info(), size);
                if entry.needs_layout_for(constraint) {
                    plan.layouts.push((Arc::clone(entry), constraint));
                }
            });

        let mut released = 0usize;
        for span in st.recycler.update(prepared, count) {
            for entry in &st.entries[span.start_index..span.end_index] {
                if let Release::Released(Some(layout)) = entry.release_layout() {
                    recycle(&self.inner.pool, Some(layout));
                    released += 1;
                }
            }
        }
        if released > 0 {
            vtrace!(released, "released layouts outside the retained range");
        }

        if let Some(working) = &self.inner.options.working_range {
            let band = working.band(first, last, count);
            let members: Vec<(usize, u64)> = (band.start_index..band.end_index)
                .map(|index| (index, st.entries[index].id()))
                .collect();
            plan.events.extend(st.working.update(&members));
        }
    }

    fn run_plan(&self, plan: Plan<E>) {
        let Plan {
            surface,
            surface_calls,
            callbacks,
            layouts,
            events,
            errors,
            needs_viewport_estimate,
        } = plan;

        if let Some(surface) = surface {
            for call in surface_calls {
                match call {
                    SurfaceCall::Inserted { position, count } => {
                        surface.notify_item_range_inserted(position, count)
                    }
                    SurfaceCall::Changed { position, count } => {
                        surface.notify_item_range_changed(position, count)
                    }
                    SurfaceCall::Removed { position, count } => {
                        surface.notify_item_range_removed(position, count)
                    }
                    SurfaceCall::Moved { from, to } => surface.notify_item_moved(from, to),
                    SurfaceCall::DataSetChanged => surface.notify_data_set_changed(),
                    SurfaceCall::RequestLayout => surface.request_layout(),
                }
            }
        }

        for (on_complete, outcome) in callbacks {
            on_complete(outcome);
        }

        if !layouts.is_empty() {
            vtrace!(count = layouts.len(), "scheduling layouts");
            let background = self.inner.schedulers.background.as_ref();
            for (entry, constraint) in layouts {
                entry.compute_layout_async(
                    &self.inner.engine,
                    &self.inner.pool,
                    background,
                    constraint,
                    self.ready_callback(),
                );
            }
        }

        if let Some(working) = &self.inner.options.working_range {
            for event in events {
                (working.handler)(event);
            }
        }

        for error in errors {
            self.report(error);
        }

        if needs_viewport_estimate {
            self.establish_viewport_count();
        }
    }

    fn ready_callback(&self) -> ReadyCallback {
        let weak = Arc::downgrade(&self.inner);
        Box::new(move |outcome| {
            if let Some(inner) = weak.upgrade() {
                Binder { inner }.on_layout_ready(outcome);
            }
        })
    }

    fn on_layout_ready(&self, outcome: LayoutOutcome) {
        if outcome == LayoutOutcome::Discarded {
            return;
        }
        let waiting = self.state().queue.pending_len() > 0;
        if waiting {
            self.post_apply(false);
        }
    }

    // --- batches -----------------------------------------------------------------------

    fn post_apply(&self, next_frame: bool) {
        {
            let mut st = self.state();
            if st.apply_posted {
                return;
            }
            st.apply_posted = true;
        }
        let weak = Arc::downgrade(&self.inner);
        let task: Task = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                let binder = Binder { inner };
                binder.state().apply_posted = false;
                binder.apply_ready_batches();
            }
        });
        let ui = &self.inner.schedulers.ui;
        if next_frame {
            ui.post_next_frame(task);
        } else {
            ui.post(task);
        }
    }

    /// Applies closed batches from the front of the queue while they are ready.
    ///
    /// Stops at the first batch that is not ready. Off the UI thread this posts itself to the
    /// next frame instead. While the mounted surface is mid relayout nothing is applied and the
    /// call retries on the next frame, at most `max_apply_retries` times in a row.
    pub fn apply_ready_batches(&self) {
        if !self.inner.schedulers.ui.is_current() {
            self.post_apply(true);
            return;
        }
        loop {
            let surface = self.state().surface.clone();
            let computing = surface.as_ref().is_some_and(|s| s.is_computing_layout());

            let mut plan = Plan::new();
            let blocked;
            {
                let mut st = self.state();
                let pending = st.queue.pending_len();
                if pending == 0 {
                    st.apply_retries = 0;
                    return;
                }
                if computing {
                    st.apply_retries += 1;
                    if st.apply_retries > self.inner.options.max_apply_retries {
                        let error = BinderError::RetryExhausted {
                            retries: self.inner.options.max_apply_retries,
                            pending_batches: pending,
                            surface_attached: st.surface.is_some(),
                            surface_computing_layout: true,
                        };
                        st.apply_retries = 0;
                        drop(st);
                        self.report(error);
                        return;
                    }
                    vdebug!(
                        retries = st.apply_retries,
                        pending,
                        "surface is mid relayout; retrying next frame"
                    );
                    drop(st);
                    self.post_apply(true);
                    return;
                }
                st.apply_retries = 0;

                blocked = !self.front_batch_ready(&st, &mut plan);
                if !blocked {
                    if let Some(batch) = st.queue.pop_front() {
                        self.apply_batch(&mut st, batch, &mut plan);
                    }
                }
            }
            self.run_plan(plan);
            if blocked {
                return;
            }
        }
    }

    fn front_batch_ready(&self, st: &State<E>, plan: &mut Plan<E>) -> bool {
        let Some(batch) = st.queue.front() else {
            return false;
        };
        if batch.policy == CommitPolicy::Immediate || batch.inserted_entries().next().is_none() {
            return true;
        }
        let Some(size) = st.measure.size() else {
            vtrace!("front batch waits for the first measurement");
            return false;
        };
        let layout_info = self.inner.options.layout_info;
        let mut ready = true;
        for entry in batch.inserted_entries() {
            let constraint = child_constraint(layout_info, &entry.render_info(), size);
            if entry.is_settled_for(constraint) {
                continue;
            }
            ready = false;
            if entry.needs_layout_for(constraint) {
                plan.layouts.push((Arc::clone(entry), constraint));
            }
        }
        ready
    }

    fn apply_batch(&self, st: &mut State<E>, batch: Batch<E>, plan: &mut Plan<E>) {
        let Batch {
            ops,
            is_data_changed,
            on_complete,
            ..
        } = batch;
        let mut outcome = BatchOutcome {
            is_data_changed,
            applied: 0,
            failed: 0,
        };
        for op in ops {
            match apply_operation(&mut st.entries, op) {
                Ok(change) => {
                    outcome.applied += 1;
                    self.record_change(st, change, plan);
                }
                Err(error) => {
                    vwarn!(error = %error, "skipping operation at apply time");
                    outcome.failed += 1;
                    plan.errors.push(error);
                }
            }
        }
        if st.queue.pending_len() == 0 && st.queue.open_len() == 0 {
            st.queue.set_projected_len(st.entries.len());
        }
        vdebug!(
            applied = outcome.applied,
            failed = outcome.failed,
            is_data_changed,
            count = st.entries.len(),
            "applied batch"
        );
        if outcome.applied > 0 {
            self.update_range(st, plan);
        }
        if let Some(on_complete) = on_complete {
            plan.callbacks.push((on_complete, outcome));
        }
    }

    fn record_change(&self, st: &mut State<E>, change: Change<E>, plan: &mut Plan<E>) {
        let surface = st.surface.clone();
        let touched_first = match change {
            Change::Inserted { position, count } => {
                plan.notify(surface.as_ref(), SurfaceCall::Inserted { position, count });
                st.recycler.on_structure_changed();
                position == 0
            }
            Change::Changed { position, count } => {
                plan.notify(surface.as_ref(), SurfaceCall::Changed { position, count });
                position == 0
            }
            Change::Removed { position, removed } => {
                for entry in &removed {
                    recycle(&self.inner.pool, entry.invalidate());
                }
                if !removed.is_empty() {
                    plan.notify(
                        surface.as_ref(),
                        SurfaceCall::Removed {
                            position,
                            count: removed.len(),
                        },
                    );
                }
                st.recycler.on_deletion();
                position == 0
            }
            Change::Moved { from, to } => {
                plan.notify(surface.as_ref(), SurfaceCall::Moved { from, to });
                st.recycler.on_structure_changed();
                from == 0 || to == 0
            }
        };
        if touched_first {
            self.remeasure_if_content_sized(st, plan);
        }
    }

    /// A binder whose cross axis came from its first item must be measured again when that item
    /// changes.
    fn remeasure_if_content_sized(&self, st: &mut State<E>, plan: &mut Plan<E>) {
        if !st.cross_from_content {
            return;
        }
        if let MeasureState::Measured { constraint, size } = st.measure {
            st.measure = MeasureState::RemeasurePending { constraint, size };
            plan.notify(st.surface.as_ref(), SurfaceCall::RequestLayout);
            vdebug!("first item changed on a content-sized binder; remeasure requested");
        }
    }

    // --- synchronous mutations ---------------------------------------------------------

    fn mutate_sync(&self, op_name: &'static str, op: Operation<E>) -> Result<(), BinderError> {
        self.assert_ui_thread(op_name);
        let mut plan = Plan::new();
        {
            let mut st = self.state();
            self.enter_mode(&mut st, MutationMode::Sync, op_name);
            let change = match apply_operation(&mut st.entries, op) {
                Ok(change) => change,
                Err(error) => {
                    vwarn!(op = op_name, error = %error, "rejected mutation");
                    return Err(error);
                }
            };
            self.record_change(&mut st, change, &mut plan);
            self.update_range(&mut st, &mut plan);
        }
        self.run_plan(plan);
        Ok(())
    }

    pub fn insert_item_at(
        &self,
        position: usize,
        info: RenderInfo<E::Content>,
    ) -> Result<(), BinderError> {
        let entry = self.make_entry(info);
        self.mutate_sync("insert_item_at", Operation::Insert { position, entry })
    }

    pub fn insert_range_at(
        &self,
        position: usize,
        infos: impl IntoIterator<Item = RenderInfo<E::Content>>,
    ) -> Result<(), BinderError> {
        let entries = infos.into_iter().map(|info| self.make_entry(info)).collect();
        self.mutate_sync(
            "insert_range_at",
            Operation::InsertRange { position, entries },
        )
    }

    /// Replaces the render description at `position`; its layout is computed again.
    pub fn update_item_at(
        &self,
        position: usize,
        info: RenderInfo<E::Content>,
    ) -> Result<(), BinderError> {
        self.mutate_sync("update_item_at", Operation::Update { position, info })
    }

    pub fn update_range_at(
        &self,
        position: usize,
        infos: impl IntoIterator<Item = RenderInfo<E::Content>>,
    ) -> Result<(), BinderError> {
        let infos = infos.into_iter().collect();
        self.mutate_sync("update_range_at", Operation::UpdateRange { position, infos })
    }

    pub fn remove_item_at(&self, position: usize) -> Result<(), BinderError> {
        self.mutate_sync("remove_item_at", Operation::Remove { position })
    }

    pub fn remove_range_at(&self, position: usize, count: usize) -> Result<(), BinderError> {
        self.mutate_sync("remove_range_at", Operation::RemoveRange { position, count })
    }

    /// Moves the item at `from` so that it ends up at index `to`.
    pub fn move_item(&self, from: usize, to: usize) -> Result<(), BinderError> {
        self.mutate_sync("move_item", Operation::Move { from, to })
    }

    pub fn clear(&self) -> Result<(), BinderError> {
        self.mutate_sync("clear", Operation::Clear)
    }

    /// Swaps the whole list for `infos` and tells the surface the data set changed.
    pub fn replace_all(&self, infos: impl IntoIterator<Item = RenderInfo<E::Content>>) {
        self.assert_ui_thread("replace_all");
        let entries: Vec<_> = infos.into_iter().map(|info| self.make_entry(info)).collect();
        let mut plan = Plan::new();
        {
            let mut st = self.state();
            self.enter_mode(&mut st, MutationMode::Sync, "replace_all");
            let removed = core::mem::replace(&mut st.entries, entries);
            for entry in &removed {
                recycle(&self.inner.pool, entry.invalidate());
            }
            plan.notify(st.surface.as_ref(), SurfaceCall::DataSetChanged);
            st.recycler.on_deletion();
            self.remeasure_if_content_sized(&mut st, &mut plan);
            self.update_range(&mut st, &mut plan);
        }
        self.run_plan(plan);
    }

    // --- asynchronous mutations --------------------------------------------------------

    fn mutate_async(&self, op_name: &'static str, op: Operation<E>) -> Result<(), BinderError> {
        let _writer = self.writer_guard();
        let mut plan = Plan::new();
        {
            let mut st = self.state();
            self.enter_mode(&mut st, MutationMode::Async, op_name);
            let inserted = op.inserted_entries().to_vec();
            if let Err(error) = st.queue.enqueue(op) {
                vwarn!(op = op_name, error = %error, "rejected asynchronous mutation");
                return Err(error);
            }
            if self.inner.options.commit_policy == CommitPolicy::LayoutBeforeInsert {
                if let Some(size) = st.measure.size() {
                    let layout_info = self.inner.options.layout_info;
                    for entry in inserted {
                        let constraint = child_constraint(layout_info, &entry.render_info(), size);
                        if entry.needs_layout_for(constraint) {
                            plan.layouts.push((entry, constraint));
                        }
                    }
                }
            }
        }
        self.run_plan(plan);
        Ok(())
    }

    pub fn insert_item_at_async(
        &self,
        position: usize,
        info: RenderInfo<E::Content>,
    ) -> Result<(), BinderError> {
        let entry = self.make_entry(info);
        self.mutate_async("insert_item_at_async", Operation::Insert { position, entry })
    }

    pub fn insert_range_at_async(
        &self,
        position: usize,
        infos: impl IntoIterator<Item = RenderInfo<E::Content>>,
    ) -> Result<(), BinderError> {
        let entries = infos.into_iter().map(|info| self.make_entry(info)).collect();
        self.mutate_async(
            "insert_range_at_async",
            Operation::InsertRange { position, entries },
        )
    }

    pub fn update_item_at_async(
        &self,
        position: usize,
        info: RenderInfo<E::Content>,
    ) -> Result<(), BinderError> {
        self.mutate_async("update_item_at_async", Operation::Update { position, info })
    }

    pub fn update_range_at_async(
        &self,
        position: usize,
        infos: impl IntoIterator<Item = RenderInfo<E::Content>>,
    ) -> Result<(), BinderError> {
        let infos = infos.into_iter().collect();
        self.mutate_async(
            "update_range_at_async",
            Operation::UpdateRange { position, infos },
        )
    }

    pub fn remove_item_at_async(&self, position: usize) -> Result<(), BinderError> {
        self.mutate_async("remove_item_at_async", Operation::Remove { position })
    }

    pub fn remove_range_at_async(&self, position: usize, count: usize) -> Result<(), BinderError> {
        self.mutate_async(
            "remove_range_at_async",
            Operation::RemoveRange { position, count },
        )
    }

    pub fn move_item_async(&self, from: usize, to: usize) -> Result<(), BinderError> {
        self.mutate_async("move_item_async", Operation::Move { from, to })
    }

    pub fn clear_async(&self) -> Result<(), BinderError> {
        self.mutate_async("clear_async", Operation::Clear)
    }

    pub fn replace_all_async(
        &self,
        infos: impl IntoIterator<Item = RenderInfo<E::Content>>,
    ) -> Result<(), BinderError> {
        self.clear_async()?;
        self.insert_range_at_async(0, infos)
    }

    /// Closes the open batch (which may be empty) and queues it behind the pending ones.
    ///
    /// `on_complete` runs on the UI thread once the batch has been applied. On the UI thread
    /// ready batches are applied before this returns; elsewhere application is posted.
    pub fn notify_batch_complete(
        &self,
        is_data_changed: bool,
        on_complete: impl FnOnce(BatchOutcome) + Send + 'static,
    ) {
        {
            let _writer = self.writer_guard();
            let mut st = self.state();
            self.enter_mode(&mut st, MutationMode::Async, "notify_batch_complete");
            st.queue.close_batch(
                is_data_changed,
                Some(Box::new(on_complete)),
                self.inner.options.commit_policy,
            );
        }
        if self.inner.schedulers.ui.is_current() {
            self.apply_ready_batches();
        } else {
            self.post_apply(false);
        }
    }

    // --- surface -----------------------------------------------------------------------

    /// Attaches `surface`, restoring the scroll position saved by the last unmount (or set by
    /// [`scroll_to_position`](Self::scroll_to_position) while unmounted).
    pub fn mount(&self, surface: Arc<dyn Surface>) {
        self.assert_ui_thread("mount");
        let previous = {
            let st = self.state();
            st.surface
                .as_ref()
                .filter(|current| !Arc::ptr_eq(current, &surface))
                .cloned()
        };
        if let Some(previous) = previous {
            self.unmount(&previous);
        }

        let restore = {
            let mut st = self.state();
            if st.surface.is_some() {
                return;
            }
            st.surface = Some(Arc::clone(&surface));
            let len = st.entries.len();
            st.saved_position.take().filter(|p| p.index < len)
        };
        vdebug!(restore = ?restore, "mount");
        surface.attach();
        if let Some(position) = restore {
            surface.scroll_to_index(position.index, position.offset);
        }
    }

    /// Detaches `surface` if it is the mounted one, remembering where it was scrolled to.
    pub fn unmount(&self, surface: &Arc<dyn Surface>) {
        self.assert_ui_thread("unmount");
        {
            let st = self.state();
            if !st.surface.as_ref().is_some_and(|s| Arc::ptr_eq(s, surface)) {
                return;
            }
        }
        let position = surface.first_visible_index().map(|index| ScrollPosition {
            index,
            offset: surface.first_visible_offset(),
        });
        {
            let mut st = self.state();
            st.surface = None;
            if position.is_some() {
                st.saved_position = position;
            }
            for (index, entry) in st.entries.iter().enumerate() {
                if entry.detach() {
                    self.release_detached(&st, index, entry);
                }
            }
        }
        vdebug!(position = ?position, "unmount");
        surface.detach();
    }

    /// Scrolls the mounted surface, or remembers the position for the next mount.
    pub fn scroll_to_position(&self, index: usize, offset: i32) {
        let surface = {
            let mut st = self.state();
            let surface = st.surface.clone();
            if surface.is_none() {
                st.saved_position = Some(ScrollPosition { index, offset });
            }
            surface
        };
        if let Some(surface) = surface {
            surface.scroll_to_index(index, offset);
        }
    }

    /// The current scroll position: live from the surface when mounted, the saved one otherwise.
    pub fn scroll_position(&self) -> Option<ScrollPosition> {
        let (surface, saved) = {
            let st = self.state();
            (st.surface.clone(), st.saved_position)
        };
        match surface {
            Some(surface) => surface.first_visible_index().map(|index| ScrollPosition {
                index,
                offset: surface.first_visible_offset(),
            }),
            None => saved,
        }
    }

    /// The surface scrolled; `visible` is what it shows now.
    pub fn on_scrolled(&self, visible: VisibleRange) {
        let mut plan = Plan::new();
        {
            let mut st = self.state();
            if let (Some(new), Some(old)) = (visible.first_visible, st.visible.first_visible) {
                if new > old {
                    st.direction = Some(ScrollDirection::Forward);
                } else if new < old {
                    st.direction = Some(ScrollDirection::Backward);
                }
            }
            st.visible = visible;
            self.update_range(&mut st, &mut plan);
        }
        self.run_plan(plan);
    }

    pub fn on_item_attached(&self, index: usize) -> Result<(), BinderError> {
        let st = self.state();
        let entry = checked_entry(&st, index)?;
        entry.set_attached(true);
        entry.cancel_pending_release();
        Ok(())
    }

    /// The surface stopped displaying `index`; a release deferred while it was shown runs now
    /// unless the item came back into the retained range.
    pub fn on_item_detached(&self, index: usize) -> Result<(), BinderError> {
        let st = self.state();
        let entry = checked_entry(&st, index)?;
        if entry.detach() {
            self.release_detached(&st, index, entry);
        }
        Ok(())
    }

    fn release_detached(&self, st: &State<E>, index: usize, entry: &ItemEntry<E>) {
        if self.inner.calculator.circular {
            return;
        }
        let kept = st
            .recycler
            .retained()
            .or(st.prepared)
            .is_some_and(|r| r.contains(index));
        if kept {
            return;
        }
        if let Release::Released(layout) = entry.release_layout() {
            vtrace!(index, "released deferred layout on detach");
            recycle(&self.inner.pool, layout);
        }
    }

    /// Sticky-like protection for one item: while suppressed its layout is never released.
    pub fn set_release_suppressed(&self, index: usize, suppressed: bool) -> Result<(), BinderError> {
        let st = self.state();
        checked_entry(&st, index)?.set_release_suppressed(suppressed);
        Ok(())
    }

    /// The layout at `index` if it is ready for the current surface size.
    pub fn layout_at(&self, index: usize) -> Option<LayoutOutput<E::Layout>> {
        let (entry, constraint) = {
            let st = self.state();
            let entry = Arc::clone(st.entries.get(index)?);
            let size = st.measure.size()?;
            let constraint =
                child_constraint(self.inner.options.layout_info, &entry.render_info(), size);
            (entry, constraint)
        };
        entry.layout_for(constraint)
    }

    /// Returns the layout at `index`, computing it on the calling thread when it is missing.
    ///
    /// This is what a surface calls when it is about to display an item whose prefetch has not
    /// finished. Failed layouts are retried here.
    pub fn bind_item(&self, index: usize) -> Result<LayoutOutput<E::Layout>, BinderError> {
        let layout_info = self.inner.options.layout_info;
        let (entry, constraint, surface_main) = {
            let st = self.state();
            let entry = Arc::clone(checked_entry(&st, index)?);
            let size = st.measure.size();
            let constraint = match size {
                Some(size) => child_constraint(layout_info, &entry.render_info(), size),
                None => SizeConstraint::default(),
            };
            (
                entry,
                constraint,
                size.map(|s| s.main(layout_info.orientation)),
            )
        };

        let output = entry
            .compute_layout_sync(&self.inner.engine, &self.inner.pool, constraint)
            .map_err(|error| BinderError::Layout {
                index: Some(index),
                error,
            })?;

        if let Some(surface_main) = surface_main {
            let mut plan = Plan::new();
            {
                let mut st = self.state();
                if st.viewport_count.is_none() {
                    self.record_viewport_estimate(&mut st, surface_main, output.size);
                    self.update_range(&mut st, &mut plan);
                }
            }
            self.run_plan(plan);
        }
        Ok(output)
    }

    /// The constraint the item at `index` is laid out with, once the binder is measured.
    pub fn constraint_at(&self, index: usize) -> Option<SizeConstraint> {
        let st = self.state();
        let entry = st.entries.get(index)?;
        let size = st.measure.size()?;
        Some(child_constraint(
            self.inner.options.layout_info,
            &entry.render_info(),
            size,
        ))
    }

    // --- queries -----------------------------------------------------------------------

    /// Number of items in the live list. Queued asynchronous mutations are not counted.
    pub fn item_count(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_valid_index(&self, index: usize) -> bool {
        index < self.item_count()
    }

    pub fn is_sticky(&self, index: usize) -> bool {
        self.state()
            .entries
            .get(index)
            .is_some_and(|entry| entry.is_sticky())
    }

    pub fn item_id(&self, index: usize) -> Option<u64> {
        self.state().entries.get(index).map(|entry| entry.id())
    }

    pub fn index_of_id(&self, id: u64) -> Option<usize> {
        self.state().entries.iter().position(|entry| entry.id() == id)
    }

    pub fn render_info_at(&self, index: usize) -> Option<Arc<RenderInfo<E::Content>>> {
        self.state()
            .entries
            .get(index)
            .map(|entry| entry.render_info())
    }

    pub fn entry_at(&self, index: usize) -> Option<Arc<ItemEntry<E>>> {
        self.state().entries.get(index).cloned()
    }

    fn query_visible(
        &self,
        ask: impl FnOnce(&dyn Surface) -> Option<usize>,
        stored: impl FnOnce(&VisibleRange) -> Option<usize>,
    ) -> Option<usize> {
        let (surface, visible) = {
            let st = self.state();
            (st.surface.clone(), st.visible)
        };
        match surface {
            Some(surface) => ask(surface.as_ref()),
            None => stored(&visible),
        }
    }

    pub fn first_visible_index(&self) -> Option<usize> {
        self.query_visible(|s| s.first_visible_index(), |v| v.first_visible)
    }

    pub fn last_visible_index(&self) -> Option<usize> {
        self.query_visible(|s| s.last_visible_index(), |v| v.last_visible)
    }

    pub fn first_fully_visible_index(&self) -> Option<usize> {
        self.query_visible(|s| s.first_fully_visible_index(), |v| v.first_fully_visible)
    }

    pub fn last_fully_visible_index(&self) -> Option<usize> {
        self.query_visible(|s| s.last_fully_visible_index(), |v| v.last_fully_visible)
    }

    pub fn prepared_range(&self) -> Option<IndexRange> {
        self.state().prepared
    }

    pub fn estimated_viewport_count(&self) -> Option<usize> {
        self.state().viewport_count
    }

    pub fn measured_size(&self) -> Option<Size> {
        self.state().measure.size()
    }

    pub fn measure_state(&self) -> MeasureState {
        self.state().measure
    }

    /// Closed batches waiting to be applied.
    pub fn pending_batch_count(&self) -> usize {
        self.state().queue.pending_len()
    }

    pub fn is_mounted(&self) -> bool {
        self.state().surface.is_some()
    }
}

fn checked_entry<E: LayoutEngine>(
    st: &State<E>,
    index: usize,
) -> Result<&Arc<ItemEntry<E>>, BinderError> {
    st.entries
        .get(index)
        .ok_or(BinderError::IndexOutOfBounds {
            op: OpKind::Access,
            position: index,
            count: 1,
            size: st.entries.len(),
        })
}

impl<E: LayoutEngine> core::fmt::Debug for Binder<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let st = self.state();
        f.debug_struct("Binder")
            .field("item_count", &st.entries.len())
            .field("measure", &st.measure)
            .field("viewport_count", &st.viewport_count)
            .field("prepared", &st.prepared)
            .field("pending_batches", &st.queue.pending_len())
            .field("mounted", &st.surface.is_some())
            .finish_non_exhaustive()
    }
}
