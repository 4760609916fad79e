//! Front-end submission queue.
//!
//! The queue buffers requests, drains them into a shared backend, and
//! accounts for completions: an in-flight counter for [`IoQueue::wait_all`],
//! monotonic totals, and a completed list harvested with
//! [`IoQueue::take_completed`].
//!
//! Lock layout: one mutex guards the pending and completed lists; a second
//! mutex/condvar pair backs `wait_all`. The completion path releases the
//! list mutex before it notifies, so the two locks never nest.
//!
//! The queue destructor does not quiesce in-flight work. Callers must
//! observe `in_flight() == 0` (normally via `wait_all`) before dropping the
//! queue or any buffer a pending request references.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::backend::Backend;
use crate::config::PENDING_LIST_CAPACITY;
use crate::request::{Request, Status};

/// Optional per-request completion observer, invoked with each finished
/// request after the queue's accounting has run. Used by the C interface to
/// surface per-request callbacks.
pub type CompletionObserver = Arc<dyn Fn(&Request) + Send + Sync>;

#[derive(Default)]
struct Lists {
    pending: Vec<Request>,
    completed: Vec<Request>,
}

struct QueueShared {
    lists: Mutex<Lists>,
    in_flight: AtomicUsize,
    completed_total: AtomicU64,
    failed_total: AtomicU64,
    bytes_total: AtomicU64,
    idle_mutex: Mutex<()>,
    idle_cv: Condvar,
}

/// Request queue over a shared backend.
pub struct IoQueue {
    backend: Arc<dyn Backend>,
    shared: Arc<QueueShared>,
}

impl IoQueue {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            shared: Arc::new(QueueShared {
                lists: Mutex::new(Lists {
                    pending: Vec::with_capacity(PENDING_LIST_CAPACITY),
                    completed: Vec::new(),
                }),
                in_flight: AtomicUsize::new(0),
                completed_total: AtomicU64::new(0),
                failed_total: AtomicU64::new(0),
                bytes_total: AtomicU64::new(0),
                idle_mutex: Mutex::new(()),
                idle_cv: Condvar::new(),
            }),
        }
    }

    /// Buffers a request for the next `submit_all`. Never blocks on I/O.
    pub fn enqueue(&self, request: Request) {
        let mut lists = self.shared.lists.lock().unwrap();
        lists.pending.push(request);
    }

    /// Drains the pending list into the backend.
    pub fn submit_all(&self) {
        self.submit_all_with(None);
    }

    /// Drains the pending list into the backend, invoking `observer` with
    /// each finished request.
    pub fn submit_all_with(&self, observer: Option<CompletionObserver>) {
        let batch = {
            let mut lists = self.shared.lists.lock().unwrap();
            std::mem::take(&mut lists.pending)
        };

        for request in batch {
            self.shared.in_flight.fetch_add(1, Ordering::Relaxed);
            let shared = self.shared.clone();
            let observer = observer.clone();
            self.backend.submit(
                request,
                Box::new(move |done: &Request| {
                    {
                        let mut lists = shared.lists.lock().unwrap();
                        lists.completed.push(*done);
                    }
                    shared.completed_total.fetch_add(1, Ordering::Relaxed);
                    if done.status != Status::Ok {
                        shared.failed_total.fetch_add(1, Ordering::Relaxed);
                    }
                    shared
                        .bytes_total
                        .fetch_add(done.bytes_transferred as u64, Ordering::Relaxed);

                    if let Some(observer) = &observer {
                        observer(done);
                    }

                    // Release-half pairs with the acquire load in wait_all.
                    if shared.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
                        let _idle = shared.idle_mutex.lock().unwrap();
                        shared.idle_cv.notify_all();
                    }
                }),
            );
        }
    }

    /// Blocks until every submitted request has completed.
    pub fn wait_all(&self) {
        let mut idle = self.shared.idle_mutex.lock().unwrap();
        while self.shared.in_flight.load(Ordering::Acquire) != 0 {
            idle = self.shared.idle_cv.wait(idle).unwrap();
        }
    }

    /// Snapshot of requests submitted but not yet completed.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Moves the completed records out; a second call with no intervening
    /// completions returns an empty vector.
    pub fn take_completed(&self) -> Vec<Request> {
        let mut lists = self.shared.lists.lock().unwrap();
        std::mem::take(&mut lists.completed)
    }

    pub fn total_completed(&self) -> u64 {
        self.shared.completed_total.load(Ordering::Acquire)
    }

    pub fn total_failed(&self) -> u64 {
        self.shared.failed_total.load(Ordering::Acquire)
    }

    pub fn total_bytes_transferred(&self) -> u64 {
        self.shared.bytes_total.load(Ordering::Acquire)
    }
}
