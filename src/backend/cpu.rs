//! Host thread-pool backend.
//!
//! A fixed pool of worker threads consumes submitted requests and performs
//! blocking positional reads and writes with `pread(2)`/`pwrite(2)`. Reads
//! may carry a post-read transform; the demo transform uppercases ASCII in
//! place, the stubbed codec always fails with `ENOTSUP`.

use crate::backend::{reject_gpu_memory, validate_host_shape, Backend, CompletionFn};
use crate::pool::WorkerPool;
use crate::report_request;
use crate::request::{Compression, Op, Request, Status};

/// Worker-pool backend for host-memory transfers.
pub struct CpuBackend {
    pool: WorkerPool,
}

impl CpuBackend {
    /// Creates the backend with `workers` threads, clamped to at least one.
    pub fn new(workers: usize) -> Self {
        let pool = WorkerPool::new("dsio-cpu", workers);
        tracing::info!("cpu backend starting with {} workers", pool.worker_count());
        Self { pool }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

impl Backend for CpuBackend {
    fn submit(&self, mut request: Request, completion: CompletionFn) {
        self.pool.execute(Box::new(move || {
            execute(&mut request);
            completion(&request);
        }));
    }
}

fn execute(req: &mut Request) {
    if let Err((errno, detail)) = validate_host_shape(req).and_then(|()| reject_gpu_memory(req)) {
        report_request!("cpu", "validate", errno, req, "{}", detail);
        req.fail(errno);
        return;
    }

    host_transfer("cpu", req);

    if req.status == Status::Ok && req.op == Op::Read {
        apply_transform(req);
    }
}

/// Performs one positional transfer against host memory and records the
/// outcome on the request. Shared with the GPU backend's Host-to-Host path.
///
/// A short read is not an error: status is `Ok` with `bytes_transferred`
/// below `size`, and a single NUL is written just past the data so
/// text-mode consumers see a terminated string. Binary consumers that rely
/// on the full buffer being valid must check `bytes_transferred` instead.
pub(crate) fn host_transfer(subsystem: &'static str, req: &mut Request) {
    let n = unsafe {
        match req.op {
            Op::Read => libc::pread(
                req.fd,
                req.host_dst as *mut libc::c_void,
                req.size,
                req.offset as libc::off_t,
            ),
            Op::Write => libc::pwrite(
                req.fd,
                req.host_src as *const libc::c_void,
                req.size,
                req.offset as libc::off_t,
            ),
        }
    };

    if n < 0 {
        let errno = std::io::Error::last_os_error()
            .raw_os_error()
            .unwrap_or(libc::EIO);
        let tag = match req.op {
            Op::Read => "pread",
            Op::Write => "pwrite",
        };
        report_request!(
            subsystem,
            tag,
            errno,
            req,
            "positional {} failed",
            req.op.as_str()
        );
        req.fail(errno);
        return;
    }

    let n = n as usize;
    if req.op == Op::Read && n < req.size {
        // SAFETY: n < size, so index n is inside the caller's buffer.
        unsafe { *req.host_dst.add(n) = 0 };
    }
    req.complete_ok(n);
}

fn apply_transform(req: &mut Request) {
    match req.compression {
        Compression::None => {}
        Compression::DemoTransform => {
            // SAFETY: validation guarantees a non-null destination of at
            // least `size` bytes, and the worker has exclusive access until
            // completion fires.
            let buf = unsafe { std::slice::from_raw_parts_mut(req.host_dst, req.size) };
            for byte in buf.iter_mut() {
                if *byte == 0 {
                    break;
                }
                *byte = byte.to_ascii_uppercase();
            }
        }
        Compression::Stubbed => {
            report_request!(
                "cpu",
                "decompression",
                libc::ENOTSUP,
                req,
                "stub codec cannot decode"
            );
            req.fail(libc::ENOTSUP);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::MemoryDomain;
    use std::sync::mpsc;

    fn run_one(backend: &CpuBackend, req: Request) -> Request {
        let (tx, rx) = mpsc::channel();
        backend.submit(
            req,
            Box::new(move |done: &Request| {
                tx.send(*done).unwrap();
            }),
        );
        rx.recv().unwrap()
    }

    #[test]
    fn default_request_fails_as_zero_size() {
        let backend = CpuBackend::new(1);
        let done = run_one(&backend, Request::default());
        assert_eq!(done.status, Status::IoError);
        assert_eq!(done.errno_value, libc::EINVAL);
    }

    #[test]
    fn negative_fd_rejected_before_size() {
        let backend = CpuBackend::new(1);
        let mut req = Request::default();
        req.fd = -1;
        let done = run_one(&backend, req);
        assert_eq!(done.status, Status::IoError);
        assert_eq!(done.errno_value, libc::EBADF);
    }

    #[test]
    fn gpu_memory_side_rejected() {
        let backend = CpuBackend::new(1);
        let mut buf = [0u8; 8];
        let mut req = Request::read(0, 0, buf.as_mut_ptr(), buf.len());
        req.dst_mem = MemoryDomain::Gpu;
        let done = run_one(&backend, req);
        assert_eq!(done.status, Status::IoError);
        assert_eq!(done.errno_value, libc::EINVAL);
    }
}
