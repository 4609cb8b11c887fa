use crate::IndexRange;

/// Helper handed to custom traversal callbacks.
///
/// It enforces the traversal contract:
/// - Indexes outside the prepared range are ignored (and debug-asserted).
/// - Duplicates are ignored.
///
/// Unlike a render pass, traversal order is free: emit the indexes you want laid out first,
/// first.
pub struct IndexEmitter<'a> {
    range: IndexRange,
    visible: IndexRange,
    seen: Vec<bool>,
    emit: &'a mut dyn FnMut(usize),
}

impl<'a> IndexEmitter<'a> {
    pub fn new(range: IndexRange, visible: IndexRange, emit: &'a mut dyn FnMut(usize)) -> Self {
        Self {
            range,
            visible,
            seen: vec![false; range.len()],
            emit,
        }
    }

    /// The prepared range being traversed.
    pub fn range(&self) -> IndexRange {
        self.range
    }

    /// The visible part of the list, clamped to the prepared range.
    pub fn visible(&self) -> IndexRange {
        self.visible
    }

    pub fn emit(&mut self, index: usize) {
        if !self.range.contains(index) {
            vwarn!(
                index,
                start = self.range.start_index,
                end = self.range.end_index,
                "IndexEmitter: index outside the prepared range"
            );
            debug_assert!(
                self.range.contains(index),
                "IndexEmitter: index outside the prepared range (i={index}, range={:?})",
                self.range
            );
            return;
        }

        let slot = &mut self.seen[index - self.range.start_index];
        if *slot {
            return;
        }
        *slot = true;
        (self.emit)(index);
    }

    /// Emits `start_index..end_index` in ascending order (clamped to the prepared range).
    pub fn emit_range(&mut self, start_index: usize, end_index: usize) {
        let start = start_index.max(self.range.start_index);
        let end = end_index.min(self.range.end_index);
        for i in start..end {
            self.emit(i);
        }
    }

    /// Emits `start_index..end_index` in descending order (clamped to the prepared range).
    pub fn emit_range_rev(&mut self, start_index: usize, end_index: usize) {
        let start = start_index.max(self.range.start_index);
        let end = end_index.min(self.range.end_index);
        for i in (start..end).rev() {
            self.emit(i);
        }
    }

    pub fn emit_visible(&mut self) {
        self.emit_range(self.visible.start_index, self.visible.end_index);
    }

    /// Emits every remaining index, nearest to the visible window first, alternating sides.
    pub fn emit_outward(&mut self) {
        let mut after = self.visible.end_index;
        let mut before = self.visible.start_index;
        while after < self.range.end_index || before > self.range.start_index {
            if after < self.range.end_index {
                self.emit(after);
                after += 1;
            }
            if before > self.range.start_index {
                before -= 1;
                self.emit(before);
            }
        }
    }
}
