use crate::*;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use listbinder::{
    Binder, BinderOptions, Executor, FrameQueue, InlineExecutor, LayoutEngine, LayoutError,
    LayoutPool, RenderInfo, Schedulers, Size, SizeConstraint, Surface, UiExecutor,
};

struct Rows;

impl LayoutEngine for Rows {
    type Content = u32;
    type Layout = u32;

    fn compute_layout(
        &self,
        content: &u32,
        constraint: SizeConstraint,
        _pool: &LayoutPool<u32>,
    ) -> Result<(Size, u32), LayoutError> {
        Ok((Size::new(constraint.width.size().unwrap_or(0), 100), *content))
    }
}

#[derive(Default)]
struct FixedSurface {
    first: usize,
    offset: i32,
    scrolled_to: Mutex<Option<(usize, i32)>>,
}

impl Surface for FixedSurface {
    fn attach(&self) {}

    fn detach(&self) {}

    fn scroll_to_index(&self, index: usize, offset: i32) {
        *self.scrolled_to.lock().unwrap() = Some((index, offset));
    }

    fn first_visible_index(&self) -> Option<usize> {
        Some(self.first)
    }

    fn last_visible_index(&self) -> Option<usize> {
        Some(self.first + 9)
    }

    fn first_visible_offset(&self) -> i32 {
        self.offset
    }
}

/// Polls `cond` until it holds or a generous deadline passes.
fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

#[test]
fn worker_pool_runs_every_task_off_the_caller_thread() {
    let pool = WorkerPool::new(4).unwrap();
    assert_eq!(pool.threads(), 4);

    let caller = thread::current().id();
    let (tx, rx) = mpsc::channel();
    for i in 0..64 {
        let tx = tx.clone();
        pool.execute(Box::new(move || {
            tx.send((i, thread::current().id())).unwrap();
        }));
    }
    drop(tx);

    let results: Vec<_> = rx.iter().collect();
    assert_eq!(results.len(), 64);
    assert!(results.iter().all(|(_, id)| *id != caller));
    let seen: HashSet<i32> = results.iter().map(|(i, _)| *i).collect();
    assert_eq!(seen.len(), 64);
}

#[test]
fn worker_pool_survives_a_panicking_task() {
    let pool = WorkerPool::new(1).unwrap();
    pool.execute(Box::new(|| panic!("boom")));

    let (tx, rx) = mpsc::channel();
    pool.execute(Box::new(move || tx.send(7).unwrap()));
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(7));
}

#[test]
fn dropping_the_worker_pool_drains_queued_tasks() {
    let ran = Arc::new(AtomicUsize::new(0));
    {
        let pool = WorkerPool::new(2).unwrap();
        for _ in 0..20 {
            let ran = Arc::clone(&ran);
            pool.execute(Box::new(move || {
                thread::sleep(Duration::from_millis(1));
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }
    }
    assert_eq!(ran.load(Ordering::SeqCst), 20);
}

#[test]
fn ui_loop_runs_posted_tasks_on_its_own_thread() {
    let ui = Arc::new(UiLoop::with_frame_interval(Duration::from_millis(5)).unwrap());
    assert!(!ui.is_current());

    let inner = Arc::clone(&ui);
    assert_eq!(ui.invoke(move || inner.is_current()), Some(true));
    assert_eq!(ui.invoke(|| 6 * 7), Some(42));

    let (tx, rx) = mpsc::channel();
    let tx2 = tx.clone();
    ui.post(Box::new(move || tx.send("now").unwrap()));
    ui.post_next_frame(Box::new(move || tx2.send("next frame").unwrap()));
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok("now"));
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok("next frame"));
}

#[test]
fn next_frame_tasks_run_while_posts_keep_arriving() {
    let ui = Arc::new(UiLoop::with_frame_interval(Duration::from_millis(5)).unwrap());
    let stop = Arc::new(AtomicBool::new(false));

    let flood = {
        let ui = Arc::clone(&ui);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                ui.post(Box::new(|| thread::sleep(Duration::from_micros(200))));
                thread::sleep(Duration::from_millis(1));
            }
        })
    };

    thread::sleep(Duration::from_millis(20));
    let (tx, rx) = mpsc::channel();
    ui.post_next_frame(Box::new(move || tx.send(()).unwrap()));
    let frame = rx.recv_timeout(Duration::from_secs(5));

    stop.store(true, Ordering::SeqCst);
    flood.join().unwrap();
    assert_eq!(frame, Ok(()));
}

#[test]
fn ui_loop_invoke_reports_a_panicking_task() {
    let ui = UiLoop::new().unwrap();
    let result: Option<()> = ui.invoke(|| panic!("boom"));
    assert_eq!(result, None);
}

#[test]
fn runtime_drives_a_binder_end_to_end() {
    let runtime = Runtime::new(2, Duration::from_millis(4)).unwrap();
    let binder = runtime.binder(
        Arc::new(Rows),
        BinderOptions::default().with_estimated_viewport_count(Some(10)),
    );

    // Mutations arrive from a non-UI thread and are applied on the UI loop.
    for i in 0..100u32 {
        binder
            .insert_item_at_async(i as usize, RenderInfo::new(i))
            .unwrap();
    }
    let (tx, rx) = mpsc::channel();
    binder.notify_batch_complete(true, move |outcome| tx.send(outcome.applied).unwrap());
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(100));
    assert_eq!(binder.item_count(), 100);

    let measured = binder.clone();
    let size = runtime
        .invoke(move || measured.set_size(300, 1000))
        .unwrap();
    assert!(size.is_ok());

    // pad = 20: items 0..=30 are prefetched by the workers.
    assert!(eventually(|| (0..31).all(|i| binder.layout_at(i).is_some())));
    assert!(binder.layout_at(31).is_none());
}

#[test]
fn anchor_survives_a_prepend() {
    let ui = Arc::new(FrameQueue::new());
    let schedulers = Schedulers::new(ui, Arc::new(InlineExecutor));
    let binder: Binder<Rows> = Binder::new(
        Arc::new(Rows),
        BinderOptions::default().with_stable_ids(true),
        schedulers,
    );
    binder
        .insert_range_at(
            0,
            (0..50u32).map(|i| RenderInfo::new(i).with_stable_id(1000 + u64::from(i))),
        )
        .unwrap();

    let surface = Arc::new(FixedSurface {
        first: 5,
        offset: -12,
        ..FixedSurface::default()
    });
    binder.mount(surface.clone());

    let anchor = capture_first_visible_anchor(&binder).unwrap();
    assert_eq!(
        anchor,
        ScrollAnchor {
            id: 1005,
            offset: -12
        }
    );

    // Prepend 10 items: old items shift by +10 indexes.
    binder
        .insert_range_at(
            0,
            (0..10u32).map(|i| RenderInfo::new(i).with_stable_id(2000 + u64::from(i))),
        )
        .unwrap();
    assert!(apply_anchor(&binder, &anchor));
    assert_eq!(*surface.scrolled_to.lock().unwrap(), Some((15, -12)));

    assert!(!apply_anchor(
        &binder,
        &ScrollAnchor {
            id: 9999,
            offset: 0
        }
    ));
}
