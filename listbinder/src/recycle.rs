use crate::IndexRange;

/// Which entries outside the prepared range give up their layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RecyclingStrategy {
    /// Release everything outside the prepared range as soon as it leaves.
    #[default]
    Default,
    /// Keep everything inside the widest range seen since the last deletion.
    ///
    /// Trades memory for not re-laying out items during back-and-forth scrolling.
    RetainMaximumRange,
}

/// Tracks the retained window and yields the spans whose layouts may be released.
#[derive(Clone, Debug, Default)]
pub(crate) struct Recycler {
    strategy: RecyclingStrategy,
    retained: Option<IndexRange>,
    /// Indexes shifted since `retained` was computed; diffing is meaningless until a full pass.
    needs_full_pass: bool,
    deleted: bool,
}

impl Recycler {
    pub(crate) fn new(strategy: RecyclingStrategy) -> Self {
        Self {
            strategy,
            retained: None,
            needs_full_pass: false,
            deleted: false,
        }
    }

    pub(crate) fn retained(&self) -> Option<IndexRange> {
        self.retained
    }

    /// Call after any structural change (insert, remove, move).
    pub(crate) fn on_structure_changed(&mut self) {
        self.needs_full_pass = true;
    }

    /// Call after a deletion; forces the maximum-range watermark back to the current range.
    pub(crate) fn on_deletion(&mut self) {
        self.needs_full_pass = true;
        self.deleted = true;
    }

    pub(crate) fn reset(&mut self) {
        self.retained = None;
        self.needs_full_pass = false;
        self.deleted = false;
    }

    /// Applies a new prepared range and returns the index spans to release.
    pub(crate) fn update(&mut self, prepared: IndexRange, count: usize) -> Vec<IndexRange> {
        let prepared = prepared.clamp_to(count);
        let previous = self.retained.map(|r| r.clamp_to(count));

        let next = match (self.strategy, previous) {
            (RecyclingStrategy::RetainMaximumRange, Some(prev)) if !self.deleted => {
                prev.union(prepared)
            }
            _ => prepared,
        };

        let full_pass = core::mem::take(&mut self.needs_full_pass);
        self.deleted = false;
        self.retained = Some(next);

        let spans = match previous {
            _ if full_pass => outside(next, IndexRange::new(0, count)),
            Some(prev) => outside(next, prev),
            None => outside(next, IndexRange::new(0, count)),
        };
        if !spans.is_empty() {
            vtrace!(
                retained_start = next.start_index,
                retained_end = next.end_index,
                spans = spans.len(),
                "recycler: releasing spans"
            );
        }
        spans
    }
}

/// The parts of `within` not covered by `keep`.
fn outside(keep: IndexRange, within: IndexRange) -> Vec<IndexRange> {
    let mut spans = Vec::with_capacity(2);
    let before = IndexRange::new(
        within.start_index,
        keep.start_index.min(within.end_index),
    );
    if !before.is_empty() {
        spans.push(before);
    }
    let after = IndexRange::new(keep.end_index.max(within.start_index), within.end_index);
    if !after.is_empty() {
        spans.push(after);
    }
    spans
}
