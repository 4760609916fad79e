#![cfg(feature = "gpu")]

//! GPU-staging backend.
//!
//! Worker threads pair positional host I/O with transient staging buffers
//! and a synchronous device copy:
//!
//! - File-to-GPU reads land in a host-visible staging buffer, then a
//!   one-shot command buffer copies staging into the caller's device buffer
//!   behind a fence.
//! - GPU-to-file writes run the copy in the other direction, then write the
//!   staging contents to the file.
//! - Host-to-host requests take the CPU backend's positional path; the
//!   device is not involved.
//!
//! Command-buffer lifecycle, queue submission and fence waits are
//! serialized by one backend-wide mutex, honoring the external thread
//! safety rules of the device queue. Staging allocation and mapping run
//! outside that mutex.

use std::sync::{Arc, Mutex};

use ash::vk;
use ash::vk::Handle;

use crate::backend::{cpu, Backend, CompletionFn};
use crate::config::FENCE_TIMEOUT_NS;
use crate::pool::WorkerPool;
use crate::report_request;
use crate::request::{Compression, MemoryDomain, Op, Request};

mod context;
mod staging;

pub use context::{ExternalHandles, GpuContext};
use staging::StagingBuffer;

/// Configuration for [`GpuBackend::new`].
pub struct GpuBackendConfig {
    /// Device context to run on. `None` creates a minimal owned context.
    pub context: Option<Arc<GpuContext>>,
    /// Worker threads; 0 means one per CPU.
    pub workers: usize,
}

impl Default for GpuBackendConfig {
    fn default() -> Self {
        Self {
            context: None,
            workers: 0,
        }
    }
}

/// Worker-pool backend bridging files and Vulkan buffers through staging
/// memory.
pub struct GpuBackend {
    ctx: Arc<GpuContext>,
    // Serializes command-buffer lifecycle, queue submission and fence waits.
    submit_lock: Arc<Mutex<()>>,
    pool: WorkerPool,
}

impl GpuBackend {
    pub fn new(config: GpuBackendConfig) -> Result<Self, crate::error::RuntimeError> {
        let ctx = match config.context {
            Some(ctx) => ctx,
            None => Arc::new(GpuContext::create_minimal()?),
        };
        let workers = if config.workers == 0 {
            num_cpus::get()
        } else {
            config.workers
        };
        let pool = WorkerPool::new("dsio-gpu", workers);
        tracing::info!("gpu backend starting with {} workers", pool.worker_count());
        Ok(Self {
            ctx,
            submit_lock: Arc::new(Mutex::new(())),
            pool,
        })
    }

    /// The context requests run against; exposes the device to embedders
    /// that allocate their own destination buffers.
    pub fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }
}

impl Backend for GpuBackend {
    fn submit(&self, mut request: Request, completion: CompletionFn) {
        let ctx = self.ctx.clone();
        let lock = self.submit_lock.clone();
        self.pool.execute(Box::new(move || {
            execute(&ctx, &lock, &mut request);
            completion(&request);
        }));
    }
}

fn validate(req: &Request) -> Result<(), (i32, &'static str)> {
    if req.fd < 0 {
        return Err((libc::EBADF, "invalid file descriptor"));
    }
    if req.size == 0 {
        return Err((libc::EINVAL, "zero-size transfer"));
    }
    if req.compression != Compression::None {
        return Err((libc::EINVAL, "transforms are not available on the gpu backend"));
    }
    match req.op {
        Op::Read => match req.dst_mem {
            MemoryDomain::Host if req.host_dst.is_null() => {
                Err((libc::EINVAL, "read with null host destination"))
            }
            MemoryDomain::Gpu if req.gpu_buffer == 0 => {
                Err((libc::EINVAL, "read with null device buffer"))
            }
            _ => Ok(()),
        },
        Op::Write => match req.src_mem {
            MemoryDomain::Host if req.host_src.is_null() => {
                Err((libc::EINVAL, "write with null host source"))
            }
            MemoryDomain::Gpu if req.gpu_buffer == 0 => {
                Err((libc::EINVAL, "write with null device buffer"))
            }
            _ => Ok(()),
        },
    }
}

fn execute(ctx: &Arc<GpuContext>, lock: &Mutex<()>, req: &mut Request) {
    if let Err((errno, detail)) = validate(req) {
        report_request!("gpu", "validate", errno, req, "{}", detail);
        req.fail(errno);
        return;
    }

    let device_side = match req.op {
        Op::Read => req.dst_mem,
        Op::Write => req.src_mem,
    };
    match device_side {
        MemoryDomain::Host => cpu::host_transfer("gpu", req),
        MemoryDomain::Gpu => match req.op {
            Op::Read => file_to_gpu(ctx, lock, req),
            Op::Write => gpu_to_file(ctx, lock, req),
        },
    }
}

/// File-to-GPU: read into staging, then copy staging into the caller's
/// device buffer at `gpu_offset`.
fn file_to_gpu(ctx: &Arc<GpuContext>, lock: &Mutex<()>, req: &mut Request) {
    let staging = match StagingBuffer::new(ctx, req.size as u64, vk::BufferUsageFlags::TRANSFER_SRC)
    {
        Ok(staging) => staging,
        Err(errno) => {
            report_request!(
                "gpu",
                "staging_alloc",
                errno,
                req,
                "staging allocation of {} bytes failed",
                req.size
            );
            req.fail(errno);
            return;
        }
    };

    let mapping = match staging.map() {
        Ok(mapping) => mapping,
        Err(errno) => {
            report_request!("gpu", "staging_map", errno, req, "staging map failed");
            req.fail(errno);
            return;
        }
    };
    let n = unsafe {
        libc::pread(
            req.fd,
            mapping as *mut libc::c_void,
            req.size,
            req.offset as libc::off_t,
        )
    };
    staging.unmap();
    if n < 0 {
        let errno = std::io::Error::last_os_error()
            .raw_os_error()
            .unwrap_or(libc::EIO);
        report_request!("gpu", "pread", errno, req, "positional read into staging failed");
        req.fail(errno);
        return;
    }

    if let Err((errno, tag, detail)) = copy_locked(
        ctx,
        lock,
        staging.handle(),
        vk::Buffer::from_raw(req.gpu_buffer),
        0,
        req.gpu_offset,
        req.size as u64,
    ) {
        report_request!("gpu", tag, errno, req, "{}", detail);
        req.fail(errno);
        return;
    }

    req.complete_ok(n as usize);
}

/// GPU-to-file: copy the caller's device buffer into staging, then write
/// staging out to the file.
fn gpu_to_file(ctx: &Arc<GpuContext>, lock: &Mutex<()>, req: &mut Request) {
    let staging = match StagingBuffer::new(ctx, req.size as u64, vk::BufferUsageFlags::TRANSFER_DST)
    {
        Ok(staging) => staging,
        Err(errno) => {
            report_request!(
                "gpu",
                "staging_alloc",
                errno,
                req,
                "staging allocation of {} bytes failed",
                req.size
            );
            req.fail(errno);
            return;
        }
    };

    if let Err((errno, tag, detail)) = copy_locked(
        ctx,
        lock,
        vk::Buffer::from_raw(req.gpu_buffer),
        staging.handle(),
        req.gpu_offset,
        0,
        req.size as u64,
    ) {
        report_request!("gpu", tag, errno, req, "{}", detail);
        req.fail(errno);
        return;
    }

    let mapping = match staging.map() {
        Ok(mapping) => mapping,
        Err(errno) => {
            report_request!("gpu", "staging_map", errno, req, "staging map failed");
            req.fail(errno);
            return;
        }
    };
    let n = unsafe {
        libc::pwrite(
            req.fd,
            mapping as *const libc::c_void,
            req.size,
            req.offset as libc::off_t,
        )
    };
    staging.unmap();
    if n < 0 {
        let errno = std::io::Error::last_os_error()
            .raw_os_error()
            .unwrap_or(libc::EIO);
        report_request!("gpu", "pwrite", errno, req, "positional write from staging failed");
        req.fail(errno);
        return;
    }

    req.complete_ok(n as usize);
}

/// Records and submits a one-shot copy command buffer and waits on its
/// fence, all under the backend-wide submission mutex.
fn copy_locked(
    ctx: &GpuContext,
    lock: &Mutex<()>,
    src: vk::Buffer,
    dst: vk::Buffer,
    src_offset: u64,
    dst_offset: u64,
    size: u64,
) -> Result<(), (i32, &'static str, String)> {
    let device = ctx.device();
    let _guard = lock.lock().unwrap();

    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(ctx.command_pool())
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);
    let cmd = unsafe { device.allocate_command_buffers(&alloc_info) }
        .map_err(|e| {
            (
                libc::EIO,
                "copy_submit",
                format!("command buffer allocation failed: {e}"),
            )
        })?[0];

    let outcome = (|| {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { device.begin_command_buffer(cmd, &begin_info) }.map_err(|e| {
            (
                libc::EIO,
                "copy_submit",
                format!("command buffer begin failed: {e}"),
            )
        })?;

        let region = vk::BufferCopy::default()
            .src_offset(src_offset)
            .dst_offset(dst_offset)
            .size(size);
        unsafe { device.cmd_copy_buffer(cmd, src, dst, std::slice::from_ref(&region)) };

        unsafe { device.end_command_buffer(cmd) }.map_err(|e| {
            (
                libc::EIO,
                "copy_submit",
                format!("command buffer end failed: {e}"),
            )
        })?;

        let fence = unsafe { device.create_fence(&vk::FenceCreateInfo::default(), None) }
            .map_err(|e| (libc::EIO, "copy_submit", format!("fence creation failed: {e}")))?;

        let submit_info = vk::SubmitInfo::default().command_buffers(std::slice::from_ref(&cmd));
        let waited = unsafe {
            device
                .queue_submit(ctx.queue(), std::slice::from_ref(&submit_info), fence)
                .and_then(|()| {
                    device.wait_for_fences(std::slice::from_ref(&fence), true, FENCE_TIMEOUT_NS)
                })
        };
        unsafe { device.destroy_fence(fence, None) };

        match waited {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err((
                libc::EIO,
                "fence_wait",
                "device copy fence timed out".to_string(),
            )),
            Err(e) => Err((libc::EIO, "copy_submit", format!("device copy failed: {e}"))),
        }
    })();

    unsafe { device.free_command_buffers(ctx.command_pool(), std::slice::from_ref(&cmd)) };
    outcome
}
