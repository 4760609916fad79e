//! Execution backends for the request queue.
//!
//! This module defines the [`Backend`] trait, the single capability every
//! execution strategy implements: accept a request plus a completion
//! callback, execute off the caller's thread, and invoke the callback
//! exactly once with the finished request.
//!
//! Three implementations exist:
//!
//! - [`cpu::CpuBackend`]: fixed worker pool over blocking positional I/O
//! - [`uring::RingBackend`]: single dispatcher thread driving an io_uring
//!   completion ring (Linux with kernel 5.10+)
//! - [`gpu::GpuBackend`]: worker pool pairing positional host I/O with
//!   transient Vulkan staging buffers (behind the `gpu` feature)

use crate::request::Request;

pub mod cpu;

#[cfg(all(target_os = "linux", has_io_uring))]
pub mod uring;

#[cfg(feature = "gpu")]
pub mod gpu;

/// Completion callback. Invoked exactly once per accepted request, on a
/// backend-owned thread, with the final `status`, `errno_value` and
/// `bytes_transferred` filled in.
pub type CompletionFn = Box<dyn FnOnce(&Request) + Send + 'static>;

/// The execution contract shared by all backends.
///
/// `submit` must return without blocking on I/O. Backend destructors flush
/// or cancel pending work so that no completion fires after drop returns.
pub trait Backend: Send + Sync + 'static {
    fn submit(&self, request: Request, completion: CompletionFn);
}

/// Checks the host-side shape shared by the CPU and ring backends, in the
/// documented order: fd, size, read destination, write source.
///
/// Returns the errno and a detail message for the diagnostic on violation.
pub(crate) fn validate_host_shape(req: &Request) -> Result<(), (i32, &'static str)> {
    use crate::request::{MemoryDomain, Op};

    if req.fd < 0 {
        return Err((libc::EBADF, "invalid file descriptor"));
    }
    if req.size == 0 {
        return Err((libc::EINVAL, "zero-size transfer"));
    }
    if req.op == Op::Read && req.dst_mem == MemoryDomain::Host && req.host_dst.is_null() {
        return Err((libc::EINVAL, "read with null host destination"));
    }
    if req.op == Op::Write && req.src_mem == MemoryDomain::Host && req.host_src.is_null() {
        return Err((libc::EINVAL, "write with null host source"));
    }
    Ok(())
}

/// Rejects requests with any GPU memory side; host-only backends cannot
/// reach device memory.
pub(crate) fn reject_gpu_memory(req: &Request) -> Result<(), (i32, &'static str)> {
    use crate::request::MemoryDomain;

    if req.dst_mem == MemoryDomain::Gpu || req.src_mem == MemoryDomain::Gpu {
        return Err((libc::EINVAL, "GPU memory side on a host-only backend"));
    }
    Ok(())
}
