use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use listbinder::{FrameQueue, Task, UiExecutor};

/// Roughly 60 frames per second.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// A dedicated UI-affine thread.
///
/// The thread owns a [`FrameQueue`]: posted tasks run as soon as the thread wakes, next-frame
/// tasks run when the frame interval elapses. Hosts without a UI toolkit of their own (servers,
/// tests, headless renderers) can use it as the binder's UI executor.
///
/// Dropping the loop stops the thread after the tasks already posted have run.
pub struct UiLoop {
    queue: Arc<FrameQueue>,
    wake: Option<Sender<()>>,
    frame_interval: Duration,
    handle: Option<JoinHandle<()>>,
}

impl UiLoop {
    pub fn new() -> io::Result<Self> {
        Self::with_frame_interval(DEFAULT_FRAME_INTERVAL)
    }

    pub fn with_frame_interval(frame_interval: Duration) -> io::Result<Self> {
        let (wake, woken) = mpsc::channel::<()>();
        let (ready, queue) = mpsc::channel::<Arc<FrameQueue>>();
        let handle = thread::Builder::new()
            .name("listbinder-ui".to_string())
            .spawn(move || {
                // The queue must be created here: its creator is the UI-affine thread.
                let queue = Arc::new(FrameQueue::new());
                if ready.send(Arc::clone(&queue)).is_err() {
                    return;
                }
                drop(ready);

                let mut next_frame = Instant::now() + frame_interval;
                loop {
                    let timeout = next_frame.saturating_duration_since(Instant::now());
                    match woken.recv_timeout(timeout) {
                        Ok(()) => {
                            queue.run_pending();
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                    // A steady stream of wakes must not hold frames back.
                    if Instant::now() >= next_frame {
                        queue.run_frame();
                        next_frame = Instant::now() + frame_interval;
                    }
                }
                queue.run_pending();
            })?;

        let queue = queue
            .recv()
            .map_err(|_| io::Error::other("UI thread exited during startup"))?;
        vdebug!(frame_interval_ms = frame_interval.as_millis() as u64, "UI loop started");
        Ok(Self {
            queue,
            wake: Some(wake),
            frame_interval,
            handle: Some(handle),
        })
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    /// Runs `f` on the UI thread and waits for its result.
    ///
    /// Runs inline when called from the UI thread. Returns `None` when the loop has stopped or
    /// `f` panicked (which stops the loop).
    pub fn invoke<R: Send + 'static>(&self, f: impl FnOnce() -> R + Send + 'static) -> Option<R> {
        if self.is_current() {
            return Some(f());
        }
        let (tx, rx) = mpsc::sync_channel(1);
        self.queue.post(Box::new(move || {
            let _ = tx.send(f());
        }));
        if !self.wake() {
            return None;
        }
        rx.recv().ok()
    }

    /// Returns `false` when the UI thread is gone.
    fn wake(&self) -> bool {
        let woken = self.wake.as_ref().is_some_and(|wake| wake.send(()).is_ok());
        if !woken {
            vwarn!("UI loop has stopped; task will not run");
        }
        woken
    }
}

impl UiExecutor for UiLoop {
    fn is_current(&self) -> bool {
        self.queue.is_current()
    }

    fn post(&self, task: Task) {
        self.queue.post(task);
        let _ = self.wake();
    }

    fn post_next_frame(&self, task: Task) {
        self.queue.post_next_frame(task);
    }
}

impl Drop for UiLoop {
    fn drop(&mut self) {
        drop(self.wake.take());
        if let Some(handle) = self.handle.take() {
            // The UI thread can hold the last reference to its own loop.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl core::fmt::Debug for UiLoop {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UiLoop")
            .field("frame_interval", &self.frame_interval)
            .field("pending_len", &self.queue.pending_len())
            .finish_non_exhaustive()
    }
}
