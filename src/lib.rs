//! dsio: a DirectStorage-style asynchronous I/O runtime
//!
//! This crate provides a batched request queue over pluggable execution
//! backends:
//!
//! - **CPU**: fixed worker pool performing blocking positional reads and
//!   writes, with an optional post-read transform
//! - **Ring**: single dispatcher thread driving a Linux io_uring completion
//!   ring (enabled on kernels 5.10+, see `build.rs`)
//! - **GPU-staging**: worker pool pairing positional host I/O with
//!   transient Vulkan staging buffers and a synchronous device copy
//!   (behind the `gpu` cargo feature)
//!
//! Callers fill a [`Request`], buffer it with [`IoQueue::enqueue`], drain
//! the buffer with [`IoQueue::submit_all`], and block on
//! [`IoQueue::wait_all`] until the in-flight count reaches zero. Each
//! backend invokes a queue-owned completion exactly once per request;
//! failures carry an errno on the request and emit a diagnostic through
//! the process-wide reporter in [`diag`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::os::unix::io::AsRawFd;
//! use std::sync::Arc;
//! use dsio::{CpuBackend, IoQueue, Request};
//!
//! let file = dsio::fs::StorageFile::open("/tmp/payload.bin").unwrap();
//! let mut buf = vec![0u8; 4096];
//!
//! let queue = IoQueue::new(Arc::new(CpuBackend::new(4)));
//! queue.enqueue(Request::read(file.as_raw_fd(), 0, buf.as_mut_ptr(), buf.len()));
//! queue.submit_all();
//! queue.wait_all();
//!
//! for done in queue.take_completed() {
//!     println!("read {} bytes, errno {}", done.bytes_transferred, done.errno_value);
//! }
//! ```
//!
//! ## Ownership
//!
//! The runtime never owns payload memory: `host_dst`/`host_src` and the
//! device buffer behind `gpu_buffer` belong to the caller and must outlive
//! the request. The queue does not quiesce on drop; call
//! [`IoQueue::wait_all`] first.

pub mod backend;
pub mod capi;
pub mod config;
pub mod diag;
pub mod fs;
pub mod queue;
pub mod request;

pub(crate) mod pool;

// Re-export core types
pub use backend::cpu::CpuBackend;
pub use backend::{Backend, CompletionFn};
pub use diag::{clear_sink, set_sink, ErrorContext, RequestSnapshot, Sink};
pub use queue::{CompletionObserver, IoQueue};
pub use request::{Compression, MemoryDomain, Op, Request, Status};

#[cfg(all(target_os = "linux", has_io_uring))]
pub use backend::uring::RingBackend;

#[cfg(feature = "gpu")]
pub use backend::gpu::{ExternalHandles, GpuBackend, GpuBackendConfig, GpuContext};

// Embedders allocating their own device buffers need the same ash.
#[cfg(feature = "gpu")]
pub use ash;

/// Error types for fallible constructors
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum RuntimeError {
        #[error("ring setup failed: {0}")]
        RingSetup(String),

        #[error("device initialization failed: {0}")]
        DeviceInit(String),

        #[error("IO operation failed: {0}")]
        Io(#[from] std::io::Error),
    }

    pub type Result<T> = std::result::Result<T, RuntimeError>;
}
