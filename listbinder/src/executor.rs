//! Scheduling seams.
//!
//! The binder never spawns threads itself. UI-affine work (batch application, surface
//! notifications) goes through a [`UiExecutor`]; off-thread layout goes through an [`Executor`].
//! The `listbinder-adapter` crate provides thread-backed implementations; this module provides a
//! pumped [`FrameQueue`] for hosts that already own a frame loop, plus two small executors that
//! are handy in tests and single-threaded hosts.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks off the UI thread.
pub trait Executor: Send + Sync {
    fn execute(&self, task: Task);
}

/// The single designated executor that owns the live list.
pub trait UiExecutor: Send + Sync {
    /// Whether the calling thread is the UI-affine thread.
    fn is_current(&self) -> bool;

    /// Runs `task` on the UI thread as soon as possible.
    fn post(&self, task: Task);

    /// Runs `task` on the UI thread during the next frame.
    fn post_next_frame(&self, task: Task);
}

/// The pair of executors a binder is driven by.
#[derive(Clone)]
pub struct Schedulers {
    pub ui: Arc<dyn UiExecutor>,
    pub background: Arc<dyn Executor>,
}

impl Schedulers {
    pub fn new(ui: Arc<dyn UiExecutor>, background: Arc<dyn Executor>) -> Self {
        Self { ui, background }
    }
}

impl core::fmt::Debug for Schedulers {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Schedulers").finish_non_exhaustive()
    }
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runs every task immediately on the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, task: Task) {
        task();
    }
}

/// Holds tasks until the owner drains them.
///
/// Useful for deterministic tests and for hosts that want to run layout work on idle.
#[derive(Default)]
pub struct QueuedExecutor {
    tasks: Mutex<VecDeque<Task>>,
}

impl QueuedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.tasks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs the oldest queued task. Returns `false` when nothing was queued.
    pub fn run_one(&self) -> bool {
        let task = lock(&self.tasks).pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs tasks until the queue is empty, including tasks queued while running.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_one() {
            ran += 1;
        }
        ran
    }
}

impl Executor for QueuedExecutor {
    fn execute(&self, task: Task) {
        lock(&self.tasks).push_back(task);
    }
}

impl core::fmt::Debug for QueuedExecutor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QueuedExecutor")
            .field("len", &self.len())
            .finish()
    }
}

/// A UI executor pumped by the thread that created it.
///
/// The creating thread becomes the UI-affine thread. Call [`FrameQueue::run_frame`] once per
/// frame (it promotes next-frame tasks and drains the queue) or [`FrameQueue::run_pending`] to
/// drain without advancing the frame.
pub struct FrameQueue {
    owner: ThreadId,
    current: Mutex<VecDeque<Task>>,
    next_frame: Mutex<Vec<Task>>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self {
            owner: thread::current().id(),
            current: Mutex::new(VecDeque::new()),
            next_frame: Mutex::new(Vec::new()),
        }
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Number of tasks waiting, including next-frame tasks.
    pub fn pending_len(&self) -> usize {
        lock(&self.current).len() + lock(&self.next_frame).len()
    }

    /// Runs posted tasks until none are left. Next-frame tasks stay queued.
    pub fn run_pending(&self) -> usize {
        debug_assert!(
            self.is_current(),
            "FrameQueue must be pumped by the thread that created it"
        );
        let mut ran = 0;
        loop {
            let task = lock(&self.current).pop_front();
            let Some(task) = task else {
                break;
            };
            task();
            ran += 1;
        }
        ran
    }

    /// Starts a new frame: next-frame tasks become current, then everything current runs.
    ///
    /// Tasks that post to the next frame while running stay queued for the following frame.
    pub fn run_frame(&self) -> usize {
        let promoted: Vec<Task> = std::mem::take(&mut *lock(&self.next_frame));
        lock(&self.current).extend(promoted);
        self.run_pending()
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl UiExecutor for FrameQueue {
    fn is_current(&self) -> bool {
        thread::current().id() == self.owner
    }

    fn post(&self, task: Task) {
        lock(&self.current).push_back(task);
    }

    fn post_next_frame(&self, task: Task) {
        lock(&self.next_frame).push(task);
    }
}

impl core::fmt::Debug for FrameQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FrameQueue")
            .field("owner", &self.owner)
            .field("pending_len", &self.pending_len())
            .finish()
    }
}
