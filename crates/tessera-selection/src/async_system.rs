//! Worker-thread pool and main-thread task queue.
//!
//! Jobs submitted with [`AsyncSystem::run_in_worker_thread`] run on a fixed
//! pool of named threads. Tasks submitted with
//! [`AsyncSystem::run_in_main_thread`] are queued until the client thread
//! calls [`AsyncSystem::dispatch_main_thread_tasks`], so they never run
//! concurrently with `update_view`.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Every worker thread has exited, so the job was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("tile load worker pool has shut down")]
pub struct WorkerPoolClosed;

struct Inner {
    worker_sender: Sender<Job>,
    main_sender: Sender<Job>,
    main_receiver: Receiver<Job>,
    worker_count: usize,
}

/// Shared handle to the pool. Clones refer to the same threads; the workers
/// exit once the last clone is dropped and their queue drains.
#[derive(Clone)]
pub struct AsyncSystem {
    inner: Arc<Inner>,
}

impl AsyncSystem {
    /// Spawn `worker_threads` workers (at least one).
    pub fn new(worker_threads: usize) -> std::io::Result<Self> {
        let worker_count = worker_threads.max(1);
        let (worker_sender, worker_receiver) = unbounded::<Job>();
        let (main_sender, main_receiver) = unbounded::<Job>();

        for index in 0..worker_count {
            let receiver = worker_receiver.clone();
            std::thread::Builder::new()
                .name(format!("tile-load-worker-{index}"))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        job();
                    }
                })?;
        }
        tracing::debug!(worker_count, "tile load workers started");

        Ok(Self {
            inner: Arc::new(Inner {
                worker_sender,
                main_sender,
                main_receiver,
                worker_count,
            }),
        })
    }

    /// Spawn a pool sized to leave headroom for the client and render threads.
    pub fn with_defaults() -> std::io::Result<Self> {
        let cpus = num_cpus::get().max(2);
        Self::new((cpus - 2).max(1))
    }

    pub fn worker_count(&self) -> usize {
        self.inner.worker_count
    }

    /// Queue a job on the worker pool.
    pub fn run_in_worker_thread<F>(&self, job: F) -> Result<(), WorkerPoolClosed>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner
            .worker_sender
            .send(Box::new(job))
            .map_err(|_| WorkerPoolClosed)
    }

    /// Queue a task for the next [`AsyncSystem::dispatch_main_thread_tasks`].
    /// Callable from any thread.
    pub fn run_in_main_thread<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // The receiver lives in `inner`, which `self` keeps alive.
        let _ = self.inner.main_sender.send(Box::new(task));
    }

    /// Run every queued main-thread task on the calling thread. Returns how
    /// many ran. Tasks queued by these tasks run in the same call.
    pub fn dispatch_main_thread_tasks(&self) -> usize {
        let mut dispatched = 0;
        while let Ok(task) = self.inner.main_receiver.try_recv() {
            task();
            dispatched += 1;
        }
        dispatched
    }

    /// Block up to `timeout` for one main-thread task and run it.
    pub fn dispatch_one_main_thread_task(&self, timeout: Duration) -> bool {
        match self.inner.main_receiver.recv_timeout(timeout) {
            Ok(task) => {
                task();
                true
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => false,
        }
    }
}

impl std::fmt::Debug for AsyncSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncSystem")
            .field("worker_count", &self.inner.worker_count)
            .field("pending_main_thread_tasks", &self.inner.main_receiver.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_worker_jobs_run_off_thread() {
        let system = AsyncSystem::new(2).unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);
        system
            .run_in_worker_thread(move || {
                let name = std::thread::current().name().map(str::to_string);
                let _ = tx.send(name);
            })
            .unwrap();
        let name = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(
            name.as_deref().is_some_and(|n| n.starts_with("tile-load-worker-")),
            "job ran on {name:?}"
        );
    }

    /// Main-thread tasks wait for an explicit dispatch.
    #[test]
    fn test_main_thread_tasks_run_on_dispatch() {
        let system = AsyncSystem::new(1).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let counter = Arc::clone(&counter);
            system.run_in_main_thread(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(system.dispatch_main_thread_tasks(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(system.dispatch_main_thread_tasks(), 0);
    }

    /// A worker can hand a continuation back to the client thread.
    #[test]
    fn test_worker_continuation_in_main_thread() {
        let system = AsyncSystem::new(1).unwrap();
        let main_thread = std::thread::current().id();
        let (tx, rx) = crossbeam_channel::bounded(1);
        let handle = system.clone();
        system
            .run_in_worker_thread(move || {
                handle.run_in_main_thread(move || {
                    let _ = tx.send(std::thread::current().id());
                });
            })
            .unwrap();

        assert!(system.dispatch_one_main_thread_task(Duration::from_secs(10)));
        assert_eq!(rx.try_recv().unwrap(), main_thread);
    }

    #[test]
    fn test_zero_threads_still_spawns_one() {
        let system = AsyncSystem::new(0).unwrap();
        assert_eq!(system.worker_count(), 1);
    }
}
