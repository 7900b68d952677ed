//! Rayon pools whose worker threads are joined, not just signalled, when the pool drops.

use core::mem::ManuallyDrop;
use core::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use tracing::trace;

type Workers = Arc<Mutex<Vec<JoinHandle<()>>>>;

/// A thread pool owning the handles of its workers.
pub(crate) struct WorkerPool {
    pool: ManuallyDrop<ThreadPool>,
    workers: Workers,
}

impl WorkerPool {
    /// Spawns the workers of `builder`, keeping every handle for the final join.
    pub(crate) fn build(builder: ThreadPoolBuilder) -> Result<Self, ThreadPoolBuildError> {
        let workers: Workers = Arc::default();
        let spawned = Arc::clone(&workers);
        let pool = builder
            .spawn_handler(move |worker| {
                let mut thread = thread::Builder::new();
                if let Some(name) = worker.name() {
                    thread = thread.name(name.to_owned());
                }
                if let Some(size) = worker.stack_size() {
                    thread = thread.stack_size(size);
                }
                let handle = thread.spawn(move || worker.run())?;
                spawned.lock().unwrap_or_else(PoisonError::into_inner).push(handle);
                Ok(())
            })
            .build()?;
        Ok(Self {
            pool: ManuallyDrop::new(pool),
            workers,
        })
    }
}

impl Deref for WorkerPool {
    type Target = ThreadPool;

    fn deref(&self) -> &ThreadPool {
        &self.pool
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // SAFETY: the pool is dropped exactly once and never touched afterwards.
        unsafe { ManuallyDrop::drop(&mut self.pool) };
        let handles = core::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        let current = thread::current().id();
        let count = handles.len();
        for handle in handles {
            // A worker cannot join itself; it exits once its current job returns.
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
        trace!(workers = count, "worker threads joined");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static ALIVE: AtomicUsize = AtomicUsize::new(0);

    /// Decrements `ALIVE` when its worker thread exits.
    struct Liveness;

    impl Drop for Liveness {
        fn drop(&mut self) {
            ALIVE.fetch_sub(1, Ordering::SeqCst);
        }
    }

    thread_local! {
        static LIVENESS: RefCell<Option<Liveness>> = const { RefCell::new(None) };
    }

    #[test]
    fn drop_joins_every_worker() {
        for round in 0..20 {
            let builder = ThreadPoolBuilder::new()
                .num_threads(8)
                .thread_name(|worker| format!("szs-join{worker}"))
                .start_handler(|_| {
                    ALIVE.fetch_add(1, Ordering::SeqCst);
                    LIVENESS.with(|slot| *slot.borrow_mut() = Some(Liveness));
                });
            let pool = WorkerPool::build(builder).unwrap();
            assert_eq!(pool.current_num_threads(), 8);
            let sum: usize = pool.install(|| {
                use rayon::prelude::*;
                (0..1000usize).into_par_iter().sum()
            });
            assert_eq!(sum, 499_500);
            drop(pool);
            assert_eq!(ALIVE.load(Ordering::SeqCst), 0, "workers alive after drop in round {round}");
        }
    }

    #[test]
    fn workers_keep_their_names() {
        let builder = ThreadPoolBuilder::new()
            .num_threads(2)
            .thread_name(|worker| format!("szs-named{worker}"));
        let pool = WorkerPool::build(builder).unwrap();
        let name = pool.install(|| thread::current().name().map(str::to_owned));
        assert!(name.is_some_and(|name| name.starts_with("szs-named")));
    }
}
