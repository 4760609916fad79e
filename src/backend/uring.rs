#![cfg(all(target_os = "linux", has_io_uring))]

//! io_uring ring backend.
//!
//! A single dispatcher thread owns the ring. Submissions land in a
//! mutex-guarded FIFO; the dispatcher swaps the FIFO into a local batch,
//! attaches one submission-queue entry per request, and drains exactly as
//! many completions as it submitted. Each SQE's `user_data` slot carries a
//! heap-allocated tracking record that owns the request and its completion
//! callback.
//!
//! The ring performs host-memory positional I/O only; GPU memory sides and
//! post-read transforms are rejected at validation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use io_uring::{cqueue, opcode, types, IoUring};

use crate::backend::{reject_gpu_memory, validate_host_shape, Backend, CompletionFn};
use crate::request::{Compression, Op, Request};
use crate::{report, report_request};

struct RingJob {
    request: Request,
    completion: CompletionFn,
}

struct Shared {
    pending: Mutex<Vec<RingJob>>,
    available: Condvar,
    shutdown: AtomicBool,
}

/// Kernel completion-ring backend with a single dispatcher thread.
///
/// If ring setup fails the backend marks itself permanently failed:
/// every subsequent submission completes immediately with
/// `IoError(EINVAL)` and a diagnostic.
pub struct RingBackend {
    shared: Arc<Shared>,
    dispatcher: Option<JoinHandle<()>>,
}

impl RingBackend {
    /// Creates the ring with `entries` submission slots (clamped to ≥ 1).
    pub fn new(entries: u32) -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(Vec::new()),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let dispatcher = match IoUring::new(entries.max(1)) {
            Ok(mut ring) => {
                let shared = shared.clone();
                let handle = std::thread::Builder::new()
                    .name("dsio-ring".to_string())
                    .spawn(move || {
                        tracing::info!("ring dispatcher starting");
                        dispatch_loop(&mut ring, &shared);
                        tracing::info!("ring dispatcher shutting down");
                    })
                    .expect("failed to spawn ring dispatcher");
                Some(handle)
            }
            Err(e) => {
                report!(
                    "ring",
                    "ring_init",
                    e.raw_os_error().unwrap_or(libc::EINVAL),
                    "io_uring setup failed: {}",
                    e
                );
                None
            }
        };

        Self { shared, dispatcher }
    }
}

impl Default for RingBackend {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_RING_ENTRIES)
    }
}

impl Backend for RingBackend {
    fn submit(&self, mut request: Request, completion: CompletionFn) {
        if self.dispatcher.is_none() {
            report_request!(
                "ring",
                "submit",
                libc::EINVAL,
                &request,
                "ring unavailable; initialization failed"
            );
            request.fail(libc::EINVAL);
            completion(&request);
            return;
        }

        let mut pending = self.shared.pending.lock().unwrap();
        pending.push(RingJob {
            request,
            completion,
        });
        drop(pending);
        self.shared.available.notify_one();
    }
}

impl Drop for RingBackend {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.available.notify_all();
        if let Some(dispatcher) = self.dispatcher.take() {
            let _ = dispatcher.join();
        }
    }
}

fn dispatch_loop(ring: &mut IoUring, shared: &Shared) {
    loop {
        let batch = {
            let mut pending = shared.pending.lock().unwrap();
            while pending.is_empty() && !shared.shutdown.load(Ordering::Acquire) {
                pending = shared.available.wait(pending).unwrap();
            }
            if pending.is_empty() {
                // Shutdown with nothing left to flush.
                break;
            }
            std::mem::take(&mut *pending)
        };
        dispatch_batch(ring, batch);
    }
}

fn validate(req: &Request) -> Result<(), (i32, &'static str)> {
    validate_host_shape(req)?;
    reject_gpu_memory(req)?;
    if req.op == Op::Write && req.compression != Compression::None {
        return Err((libc::EINVAL, "compressed write on the ring"));
    }
    if req.op == Op::Read && req.compression != Compression::None {
        // The ring performs no post-read transforms.
        return Err((libc::ENOTSUP, "decompression on the ring"));
    }
    Ok(())
}

fn dispatch_batch(ring: &mut IoUring, batch: Vec<RingJob>) {
    // Trackers whose SQE is in the ring but whose CQE has not been reaped.
    let mut outstanding: Vec<*mut RingJob> = Vec::with_capacity(batch.len());

    for mut job in batch {
        if let Err((errno, detail)) = validate(&job.request) {
            report_request!("ring", "submit", errno, &job.request, "{}", detail);
            job.request.fail(errno);
            (job.completion)(&job.request);
            continue;
        }

        let tracker = Box::into_raw(Box::new(job));
        let req = unsafe { &(*tracker).request };
        let entry = match req.op {
            Op::Read => opcode::Read::new(types::Fd(req.fd), req.host_dst, req.size as u32)
                .offset(req.offset)
                .build()
                .user_data(tracker as u64),
            Op::Write => opcode::Write::new(types::Fd(req.fd), req.host_src, req.size as u32)
                .offset(req.offset)
                .build()
                .user_data(tracker as u64),
        };

        // SAFETY: the buffers are caller-owned for the life of the request
        // and the tracking record stays alive until its CQE is reaped.
        let pushed = unsafe { ring.submission().push(&entry).is_ok() };
        if !pushed {
            let mut job = unsafe { Box::from_raw(tracker) };
            report_request!(
                "ring",
                "submit",
                libc::EBUSY,
                &job.request,
                "submission queue full"
            );
            job.request.fail(libc::EBUSY);
            (job.completion)(&job.request);
            continue;
        }
        outstanding.push(tracker);
    }

    if outstanding.is_empty() {
        return;
    }

    let mut wait_error = match ring.submit_and_wait(outstanding.len()) {
        Ok(_) => None,
        Err(e) => Some(e),
    };

    // Reap every completion the kernel produced, crossing each reaped
    // tracker off the outstanding list.
    loop {
        while let Some(cqe) = ring.completion().next() {
            let token = cqe.user_data();
            outstanding.retain(|&tracker| tracker as u64 != token);
            complete_one(cqe);
        }
        if outstanding.is_empty() || wait_error.is_some() {
            break;
        }
        if let Err(e) = ring.submit_and_wait(1) {
            wait_error = Some(e);
        }
    }

    if let Some(e) = wait_error {
        let errno = e.raw_os_error().unwrap_or(libc::EIO);
        report!(
            "ring",
            "submit",
            errno,
            "io_uring submit failed with {} entries unreaped: {}",
            outstanding.len(),
            e
        );
        // The kernel produced no CQE for these entries, so nothing else
        // will ever complete them; reclaim the trackers and fail each one
        // here to keep the exactly-once contract.
        fail_unreaped(outstanding, errno);
    }
}

/// Fails every tracker the kernel never reported a completion for.
fn fail_unreaped(outstanding: Vec<*mut RingJob>, errno: i32) {
    for tracker in outstanding {
        // SAFETY: produced by Box::into_raw in dispatch_batch and crossed
        // off the outstanding list when reaped, so ownership is still ours.
        let mut job = unsafe { Box::from_raw(tracker) };
        report_request!(
            "ring",
            "submit",
            errno,
            &job.request,
            "entry never reached the completion queue"
        );
        job.request.fail(errno);
        (job.completion)(&job.request);
    }
}

fn complete_one(cqe: cqueue::Entry) {
    let tracker = cqe.user_data() as *mut RingJob;
    // SAFETY: user_data was produced by Box::into_raw in dispatch_batch and
    // each CQE is reaped exactly once.
    let mut job = unsafe { Box::from_raw(tracker) };
    let res = cqe.result();

    if res < 0 {
        let errno = -res;
        let tag = match job.request.op {
            Op::Read => "pread",
            Op::Write => "pwrite",
        };
        report_request!(
            "ring",
            tag,
            errno,
            &job.request,
            "ring {} failed",
            job.request.op.as_str()
        );
        job.request.fail(errno);
    } else {
        job.request.complete_ok(res as usize);
    }

    (job.completion)(&job.request);
}
