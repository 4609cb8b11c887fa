//! Property-based invariant tests for range computation and batch application.
//!
//! 1. The prepared range covers the visible items and stays inside the list.
//! 2. The prepared range never moves backward while the first visible item moves forward.
//! 3. Every traversal order visits each prepared index exactly once, visible items first.
//! 4. Asynchronous batches reproduce the submitted operations in order.
//! 5. After any scroll sequence, exactly the prepared items hold a layout.

use std::sync::Arc;

use listbinder::{
    Binder, BinderOptions, FrameQueue, IndexRange, LayoutEngine, LayoutError, LayoutPool,
    QueuedExecutor, RangeCalculator, RenderInfo, Schedulers, Size, SizeConstraint, TraversalOrder,
    VisibleRange,
};
use proptest::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────────

struct FixedRows;

impl LayoutEngine for FixedRows {
    type Content = u32;
    type Layout = u32;

    fn compute_layout(
        &self,
        content: &u32,
        constraint: SizeConstraint,
        _pool: &LayoutPool<u32>,
    ) -> Result<(Size, u32), LayoutError> {
        Ok((Size::new(constraint.width.size().unwrap_or(0), 50), *content))
    }
}

fn binder(options: BinderOptions) -> (Binder<FixedRows>, Arc<FrameQueue>, Arc<QueuedExecutor>) {
    let ui = Arc::new(FrameQueue::new());
    let background = Arc::new(QueuedExecutor::new());
    let schedulers = Schedulers::new(ui.clone(), background.clone());
    (
        Binder::new(Arc::new(FixedRows), options, schedulers),
        ui,
        background,
    )
}

fn ids(binder: &Binder<FixedRows>) -> Vec<u32> {
    (0..binder.item_count())
        .filter_map(|i| binder.render_info_at(i).map(|info| info.content))
        .collect()
}

#[derive(Clone, Debug)]
enum Op {
    Insert(usize),
    Remove(usize),
    Move(usize, usize),
    Update(usize),
    RemoveRange(usize, usize),
    UpdateRange(usize, usize),
    Clear,
    Close,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<usize>().prop_map(Op::Insert),
        2 => any::<usize>().prop_map(Op::Remove),
        1 => (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Move(a, b)),
        1 => any::<usize>().prop_map(Op::Update),
        1 => (any::<usize>(), any::<usize>()).prop_map(|(p, n)| Op::RemoveRange(p, n)),
        1 => (any::<usize>(), any::<usize>()).prop_map(|(p, n)| Op::UpdateRange(p, n)),
        1 => Just(Op::Clear),
        2 => Just(Op::Close),
    ]
}

fn traversal_strategy() -> impl Strategy<Value = TraversalOrder> {
    prop_oneof![
        Just(TraversalOrder::Forward),
        Just(TraversalOrder::Backward),
        Just(TraversalOrder::Bidirectional),
        Just(TraversalOrder::FollowScroll),
    ]
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Prepared range covers the visible items
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn prepared_range_covers_visible(
        count in 1usize..2_000,
        first in 0usize..2_000,
        shown in 1usize..60,
        viewport in 1usize..60,
        ratio in 0.0f32..4.0,
    ) {
        let calc = RangeCalculator::new(ratio, false);
        let first = first % count;
        let last = (first + shown - 1).min(count - 1);
        let r = calc.prepared_range(first, last, viewport, count);
        prop_assert!(r.contains(first), "{:?} misses first visible {}", r, first);
        prop_assert!(r.contains(last), "{:?} misses last visible {}", r, last);
        prop_assert!(r.end_index <= count);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Prepared range is monotone
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn prepared_range_is_monotone(
        count in 1usize..1_000,
        a in 0usize..1_000,
        b in 0usize..1_000,
        viewport in 1usize..40,
        ratio in 0.0f32..3.0,
    ) {
        let calc = RangeCalculator::new(ratio, false);
        let (lo, hi) = ((a.min(b)) % count, (a.max(b)) % count);
        let (lo, hi) = (lo.min(hi), lo.max(hi));
        let at = |first: usize| {
            let last = (first + viewport - 1).min(count - 1);
            calc.prepared_range(first, last, viewport, count)
        };
        let (r_lo, r_hi) = (at(lo), at(hi));
        prop_assert!(r_lo.start_index <= r_hi.start_index);
        prop_assert!(r_lo.end_index <= r_hi.end_index);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Traversal is a permutation with visible items first
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn traversal_visits_each_index_once(
        traversal in traversal_strategy(),
        start in 0usize..100,
        len in 1usize..100,
        vis_start in 0usize..100,
        vis_len in 1usize..20,
    ) {
        let range = IndexRange::new(start, start + len);
        let vis_start = start + vis_start % len;
        let visible = IndexRange::new(vis_start, (vis_start + vis_len).min(range.end_index));

        let mut out = Vec::new();
        traversal.traverse(range, visible, None, &mut |i| out.push(i));

        let mut sorted = out.clone();
        sorted.sort_unstable();
        prop_assert_eq!(sorted, (range.start_index..range.end_index).collect::<Vec<_>>());
        for (k, index) in out.iter().take(visible.len()).enumerate() {
            prop_assert!(visible.contains(*index), "position {} got {} outside {:?}", k, index, visible);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Asynchronous batches preserve submission order
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn async_batches_match_a_model(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let (binder, _ui, _background) = binder(BinderOptions::default());
        let mut model: Vec<u32> = Vec::new();
        let mut next = 0u32;

        for op in ops {
            match op {
                Op::Insert(p) => {
                    let p = p % (model.len() + 1);
                    binder.insert_item_at_async(p, RenderInfo::new(next)).unwrap();
                    model.insert(p, next);
                    next += 1;
                }
                Op::Remove(p) if !model.is_empty() => {
                    let p = p % model.len();
                    binder.remove_item_at_async(p).unwrap();
                    model.remove(p);
                }
                Op::Move(a, b) if !model.is_empty() => {
                    let (a, b) = (a % model.len(), b % model.len());
                    binder.move_item_async(a, b).unwrap();
                    let id = model.remove(a);
                    model.insert(b, id);
                }
                Op::Update(p) if !model.is_empty() => {
                    let p = p % model.len();
                    binder.update_item_at_async(p, RenderInfo::new(next)).unwrap();
                    model[p] = next;
                    next += 1;
                }
                Op::RemoveRange(p, n) if !model.is_empty() => {
                    let p = p % model.len();
                    let n = n % (model.len() - p + 1);
                    binder.remove_range_at_async(p, n).unwrap();
                    model.drain(p..p + n);
                }
                Op::UpdateRange(p, n) if !model.is_empty() => {
                    let p = p % model.len();
                    let n = n % (model.len() - p) + 1;
                    let fresh: Vec<u32> = (next..next + n as u32).collect();
                    next += n as u32;
                    binder
                        .update_range_at_async(p, fresh.iter().copied().map(RenderInfo::new))
                        .unwrap();
                    model[p..p + n].copy_from_slice(&fresh);
                }
                Op::Clear => {
                    binder.clear_async().unwrap();
                    model.clear();
                }
                Op::Close => {
                    binder.notify_batch_complete(true, |_| {});
                    prop_assert_eq!(ids(&binder), model.clone());
                }
                _ => {}
            }
        }
        binder.notify_batch_complete(true, |_| {});
        prop_assert_eq!(ids(&binder), model);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Exactly the prepared items hold a layout
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn layouts_follow_the_prepared_range(
        count in 1usize..400,
        scrolls in prop::collection::vec((0usize..400, any::<bool>()), 1..12),
    ) {
        let options = BinderOptions::default().with_estimated_viewport_count(Some(8));
        let (binder, ui, background) = binder(options);
        binder.insert_range_at(0, (0..count as u32).map(RenderInfo::new)).unwrap();
        binder.set_size(300, 400).unwrap();

        for (first, settle) in scrolls {
            let first = first % count;
            binder.on_scrolled(VisibleRange::new(first, (first + 7).min(count - 1)));
            if settle {
                background.run_all();
                ui.run_frame();
            }
        }
        background.run_all();
        ui.run_frame();

        let prepared = binder.prepared_range().unwrap();
        for i in 0..count {
            prop_assert_eq!(
                binder.layout_at(i).is_some(),
                prepared.contains(i),
                "item {} vs prepared {:?}",
                i,
                prepared
            );
        }
    }
}
