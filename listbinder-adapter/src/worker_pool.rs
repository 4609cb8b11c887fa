use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use listbinder::{Executor, Task};

/// A fixed set of std threads running layout tasks from one shared channel.
///
/// Tasks run in submission order per worker, with no ordering between workers. A panicking task
/// is logged and does not take its worker down. Dropping the pool lets queued tasks finish, then
/// joins every worker.
pub struct WorkerPool {
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts `threads` workers (at least one).
    pub fn new(threads: usize) -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Task>();
        let receiver = Arc::new(Mutex::new(receiver));
        let mut workers = Vec::with_capacity(threads.max(1));
        for i in 0..threads.max(1) {
            let receiver = Arc::clone(&receiver);
            let handle = thread::Builder::new()
                .name(format!("listbinder-worker-{i}"))
                .spawn(move || work(&receiver))?;
            workers.push(handle);
        }
        vdebug!(threads = workers.len(), "worker pool started");
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// One worker per available core.
    pub fn with_available_parallelism() -> io::Result<Self> {
        let threads = thread::available_parallelism().map_or(1, |n| n.get());
        Self::new(threads)
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }
}

fn work(receiver: &Mutex<Receiver<Task>>) {
    loop {
        // The guard is dropped before the task runs so other workers can pick up work.
        let task = receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .recv();
        let Ok(task) = task else {
            return;
        };
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            vwarn!("layout task panicked");
        }
    }
}

impl Executor for WorkerPool {
    fn execute(&self, task: Task) {
        let Some(sender) = &self.sender else {
            return;
        };
        if sender.send(task).is_err() {
            vwarn!("worker pool has no running workers; task dropped");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        drop(self.sender.take());
        let current = thread::current().id();
        for handle in self.workers.drain(..) {
            // A worker can hold the last reference to the pool.
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
    }
}

impl core::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.workers.len())
            .finish_non_exhaustive()
    }
}
