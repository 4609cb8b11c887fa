//! Prepared-range and working-range computation.

use std::collections::HashMap;
use std::sync::Arc;

use crate::{IndexEmitter, IndexRange, ScrollDirection};

/// A traversal callback: emit prepared-range indexes in the order they should be laid out.
///
/// The second argument is the last observed scroll direction, if any.
pub type CustomTraversal =
    Arc<dyn Fn(&mut IndexEmitter<'_>, Option<ScrollDirection>) + Send + Sync>;

/// Order in which layouts inside the prepared range are scheduled.
#[derive(Clone, Default)]
pub enum TraversalOrder {
    /// Visible items, then the items after them, then the items before them (nearest first).
    #[default]
    Forward,
    /// Visible items bottom-up, then the items before them, then the items after them.
    Backward,
    /// Visible items, then alternating after/before, nearest first.
    Bidirectional,
    /// `Backward` while the list scrolls backward, `Forward` otherwise.
    FollowScroll,
    Custom(CustomTraversal),
}

impl TraversalOrder {
    /// Calls `f` once for every index of `range`, in traversal order.
    pub fn traverse(
        &self,
        range: IndexRange,
        visible: IndexRange,
        direction: Option<ScrollDirection>,
        f: &mut dyn FnMut(usize),
    ) {
        if range.is_empty() {
            return;
        }
        let visible = IndexRange::new(
            visible.start_index.clamp(range.start_index, range.end_index),
            visible.end_index.clamp(range.start_index, range.end_index),
        );
        let mut emitter = IndexEmitter::new(range, visible, f);
        match self {
            Self::Forward => forward(&mut emitter),
            Self::Backward => backward(&mut emitter),
            Self::Bidirectional => {
                emitter.emit_visible();
                emitter.emit_outward();
            }
            Self::FollowScroll => match direction {
                Some(ScrollDirection::Backward) => backward(&mut emitter),
                _ => forward(&mut emitter),
            },
            Self::Custom(traverse) => traverse(&mut emitter, direction),
        }
    }
}

fn forward(emitter: &mut IndexEmitter<'_>) {
    let (range, visible) = (emitter.range(), emitter.visible());
    emitter.emit_visible();
    emitter.emit_range(visible.end_index, range.end_index);
    emitter.emit_range_rev(range.start_index, visible.start_index);
}

fn backward(emitter: &mut IndexEmitter<'_>) {
    let (range, visible) = (emitter.range(), emitter.visible());
    emitter.emit_range_rev(visible.start_index, visible.end_index);
    emitter.emit_range_rev(range.start_index, visible.start_index);
    emitter.emit_range(visible.end_index, range.end_index);
}

impl core::fmt::Debug for TraversalOrder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Forward => f.write_str("Forward"),
            Self::Backward => f.write_str("Backward"),
            Self::Bidirectional => f.write_str("Bidirectional"),
            Self::FollowScroll => f.write_str("FollowScroll"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Computes the window of indexes that should hold a valid layout.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RangeCalculator {
    /// Fraction of a viewport to pad on each side.
    pub range_ratio: f32,
    /// Circular lists wrap around, so every item is always in range.
    pub circular: bool,
}

impl RangeCalculator {
    pub fn new(range_ratio: f32, circular: bool) -> Self {
        Self {
            range_ratio,
            circular,
        }
    }

    /// Number of items padded on each side of the viewport.
    pub fn padding(&self, viewport_count: usize) -> usize {
        let ratio = if self.range_ratio.is_finite() {
            self.range_ratio.max(0.0)
        } else {
            0.0
        };
        (ratio * viewport_count as f32).ceil() as usize
    }

    /// The prepared range for the given visible window.
    ///
    /// The range always covers `first_visible..=last_visible`, even when the viewport estimate
    /// is too small for the actual viewport.
    pub fn prepared_range(
        &self,
        first_visible: usize,
        last_visible: usize,
        viewport_count: usize,
        count: usize,
    ) -> IndexRange {
        if count == 0 {
            return IndexRange::default();
        }
        if self.circular {
            return IndexRange::new(0, count);
        }

        let last_index = count - 1;
        let first = first_visible.min(last_index);
        let last = last_visible.clamp(first, last_index);
        let pad = self.padding(viewport_count);

        let start = first.saturating_sub(pad);
        let end_inclusive = first
            .saturating_add(viewport_count)
            .saturating_add(pad)
            .max(last)
            .min(last_index);
        IndexRange::new(start, end_inclusive + 1)
    }
}

/// Estimates how many items fit in one viewport from a representative item's size.
pub fn estimate_viewport_count(
    surface_main: u32,
    item_main: u32,
    span_count: u32,
    count: usize,
) -> usize {
    if item_main == 0 {
        return count.max(1);
    }
    let rows = surface_main.div_ceil(item_main).max(1) as usize;
    rows.saturating_mul(span_count.max(1) as usize)
}

pub type WorkingRangeHandler = Arc<dyn Fn(WorkingRangeEvent) + Send + Sync>;

/// An entry crossed the edge of the working range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WorkingRangeEvent {
    Entered { index: usize, id: u64 },
    /// `last_index` is where the entry was when it was last inside the band.
    Exited { last_index: usize, id: u64 },
}

/// A band around the visible items used only for enter/exit notifications.
#[derive(Clone)]
pub struct WorkingRangeOptions {
    /// Items before the first visible item.
    pub before: usize,
    /// Items after the last visible item.
    pub after: usize,
    pub handler: WorkingRangeHandler,
}

impl WorkingRangeOptions {
    pub fn new(
        before: usize,
        after: usize,
        handler: impl Fn(WorkingRangeEvent) + Send + Sync + 'static,
    ) -> Self {
        Self {
            before,
            after,
            handler: Arc::new(handler),
        }
    }

    pub fn band(&self, first_visible: usize, last_visible: usize, count: usize) -> IndexRange {
        if count == 0 {
            return IndexRange::default();
        }
        let start = first_visible.saturating_sub(self.before).min(count);
        let end = last_visible
            .saturating_add(self.after)
            .saturating_add(1)
            .min(count);
        IndexRange::new(start, end)
    }
}

impl core::fmt::Debug for WorkingRangeOptions {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkingRangeOptions")
            .field("before", &self.before)
            .field("after", &self.after)
            .finish_non_exhaustive()
    }
}

/// Remembers which entries (by id) are inside the working range.
#[derive(Debug, Default)]
pub(crate) struct WorkingRangeTracker {
    members: HashMap<u64, usize>,
}

impl WorkingRangeTracker {
    /// Replaces the band with `band` (`(index, id)` pairs) and returns the crossings.
    pub(crate) fn update(&mut self, band: &[(usize, u64)]) -> Vec<WorkingRangeEvent> {
        let mut next = HashMap::with_capacity(band.len());
        let mut events = Vec::new();
        for &(index, id) in band {
            if !self.members.contains_key(&id) {
                events.push(WorkingRangeEvent::Entered { index, id });
            }
            next.insert(id, index);
        }
        let mut exited: Vec<(usize, u64)> = self
            .members
            .iter()
            .filter(|(id, _)| !next.contains_key(*id))
            .map(|(&id, &index)| (index, id))
            .collect();
        exited.sort_unstable();
        events.extend(
            exited
                .into_iter()
                .map(|(last_index, id)| WorkingRangeEvent::Exited { last_index, id }),
        );
        self.members = next;
        events
    }

    pub(crate) fn clear(&mut self) -> Vec<WorkingRangeEvent> {
        self.update(&[])
    }
}
