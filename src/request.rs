//! The I/O request value type.
//!
//! A [`Request`] describes one positional transfer between a file descriptor
//! and caller-owned memory (host or GPU). Backends update the result fields
//! in place and hand the request to the completion callback exactly once.
//!
//! The struct is `#[repr(C)]` and all enums carry fixed discriminants so the
//! same layout crosses the C interface unchanged.

use std::os::unix::io::RawFd;
use std::ptr;

/// Direction of the transfer.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Op {
    #[default]
    Read = 0,
    Write = 1,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Read => "read",
            Op::Write => "write",
        }
    }
}

/// Which address space a memory side of the transfer lives in.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryDomain {
    #[default]
    Host = 0,
    Gpu = 1,
}

impl MemoryDomain {
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryDomain::Host => "host",
            MemoryDomain::Gpu => "gpu",
        }
    }
}

/// Post-read transform selector. Only meaningful on reads.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None = 0,
    /// ASCII-uppercase stand-in for a real decompressor.
    DemoTransform = 1,
    /// Placeholder codec that always fails with `ENOTSUP`.
    Stubbed = 2,
}

/// Lifecycle state of a request. Backends transition `Pending` exactly once.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Pending = 0,
    Ok = 1,
    IoError = 2,
    /// Reserved for overlay layers; nothing in the core produces it.
    Cancelled = 3,
}

/// One I/O operation plus its result fields.
///
/// The caller owns every referenced buffer (`host_dst`, `host_src`, the
/// device buffer behind `gpu_buffer`) and must keep them alive until the
/// completion callback has fired. The runtime never copies or frees them.
///
/// `Request::default()` zeroes every field, so an unfilled request is
/// rejected by backend validation as zero-size.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Request {
    /// Open byte-addressable file, `>= 0` at submit time.
    pub fd: RawFd,
    /// Byte offset into the file.
    pub offset: u64,
    /// Byte count to transfer, `> 0`.
    pub size: usize,
    /// Host destination for reads with `dst_mem == Host`.
    pub host_dst: *mut u8,
    /// Host source for writes with `src_mem == Host`.
    pub host_src: *const u8,
    /// Raw Vulkan buffer handle when either memory side is `Gpu`.
    pub gpu_buffer: u64,
    /// Byte offset into `gpu_buffer`.
    pub gpu_offset: u64,
    pub op: Op,
    pub dst_mem: MemoryDomain,
    pub src_mem: MemoryDomain,
    pub compression: Compression,
    pub status: Status,
    /// Raw errno on failure, 0 on success.
    pub errno_value: i32,
    /// Actual bytes moved, 0 on failure.
    pub bytes_transferred: usize,
}

impl Default for Request {
    fn default() -> Self {
        Self {
            fd: 0,
            offset: 0,
            size: 0,
            host_dst: ptr::null_mut(),
            host_src: ptr::null(),
            gpu_buffer: 0,
            gpu_offset: 0,
            op: Op::default(),
            dst_mem: MemoryDomain::default(),
            src_mem: MemoryDomain::default(),
            compression: Compression::default(),
            status: Status::default(),
            errno_value: 0,
            bytes_transferred: 0,
        }
    }
}

// SAFETY: the raw pointers reference caller-owned memory that the caller
// contractually keeps alive and does not touch until completion. The runtime
// only moves the request between threads, never aliases the buffers.
unsafe impl Send for Request {}

impl Request {
    /// Host read of `size` bytes at `offset` into `dst`.
    pub fn read(fd: RawFd, offset: u64, dst: *mut u8, size: usize) -> Self {
        Self {
            fd,
            offset,
            size,
            host_dst: dst,
            op: Op::Read,
            ..Self::default()
        }
    }

    /// Host write of `size` bytes from `src` at `offset`.
    pub fn write(fd: RawFd, offset: u64, src: *const u8, size: usize) -> Self {
        Self {
            fd,
            offset,
            size,
            host_src: src,
            op: Op::Write,
            ..Self::default()
        }
    }

    /// File-to-GPU read: `size` bytes at `offset` land in `gpu_buffer` at
    /// `gpu_offset`.
    pub fn read_to_gpu(fd: RawFd, offset: u64, gpu_buffer: u64, gpu_offset: u64, size: usize) -> Self {
        Self {
            fd,
            offset,
            size,
            gpu_buffer,
            gpu_offset,
            op: Op::Read,
            dst_mem: MemoryDomain::Gpu,
            ..Self::default()
        }
    }

    /// GPU-to-file write: `size` bytes from `gpu_buffer` at `gpu_offset`
    /// land in the file at `offset`.
    pub fn write_from_gpu(fd: RawFd, offset: u64, gpu_buffer: u64, gpu_offset: u64, size: usize) -> Self {
        Self {
            fd,
            offset,
            size,
            gpu_buffer,
            gpu_offset,
            op: Op::Write,
            src_mem: MemoryDomain::Gpu,
            ..Self::default()
        }
    }

    /// Marks the request failed with `errno`.
    pub(crate) fn fail(&mut self, errno: i32) {
        self.status = Status::IoError;
        self.errno_value = errno;
        self.bytes_transferred = 0;
    }

    /// Marks the request successful with `bytes` moved.
    pub(crate) fn complete_ok(&mut self, bytes: usize) {
        self.status = Status::Ok;
        self.errno_value = 0;
        self.bytes_transferred = bytes;
    }
}
