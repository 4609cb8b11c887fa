use std::io;
use std::sync::Arc;
use std::time::Duration;

use listbinder::{Binder, BinderOptions, LayoutEngine, Schedulers, UiExecutor};

use crate::{DEFAULT_FRAME_INTERVAL, UiLoop, WorkerPool};

/// A UI loop and a worker pool, ready to drive any number of binders.
///
/// This type does not hold any binder. Clone the [`Schedulers`] it hands out into each binder;
/// the threads stop once the runtime and every binder created from it are gone.
#[derive(Clone, Debug)]
pub struct Runtime {
    ui: Arc<UiLoop>,
    workers: Arc<WorkerPool>,
}

impl Runtime {
    pub fn new(threads: usize, frame_interval: Duration) -> io::Result<Self> {
        Ok(Self {
            ui: Arc::new(UiLoop::with_frame_interval(frame_interval)?),
            workers: Arc::new(WorkerPool::new(threads)?),
        })
    }

    /// One worker per available core and the default frame interval.
    pub fn with_defaults() -> io::Result<Self> {
        Ok(Self {
            ui: Arc::new(UiLoop::with_frame_interval(DEFAULT_FRAME_INTERVAL)?),
            workers: Arc::new(WorkerPool::with_available_parallelism()?),
        })
    }

    pub fn ui(&self) -> &Arc<UiLoop> {
        &self.ui
    }

    pub fn workers(&self) -> &Arc<WorkerPool> {
        &self.workers
    }

    pub fn schedulers(&self) -> Schedulers {
        Schedulers::new(self.ui.clone(), self.workers.clone())
    }

    pub fn binder<E: LayoutEngine>(&self, engine: Arc<E>, options: BinderOptions) -> Binder<E> {
        Binder::new(engine, options, self.schedulers())
    }

    pub fn is_ui_thread(&self) -> bool {
        self.ui.is_current()
    }

    /// Runs `f` on the UI thread and waits for it. See [`UiLoop::invoke`].
    pub fn invoke<R: Send + 'static>(&self, f: impl FnOnce() -> R + Send + 'static) -> Option<R> {
        self.ui.invoke(f)
    }
}
