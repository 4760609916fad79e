#![cfg(feature = "gpu")]

//! GPU-staging backend round trip. Skips cleanly on machines without a
//! Vulkan driver.

use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::sync::Arc;

use dsio::ash::vk;
use dsio::ash::vk::Handle;
use dsio::{Compression, GpuBackend, GpuBackendConfig, GpuContext, IoQueue, Request, Status};

fn try_backend() -> Option<GpuBackend> {
    match GpuBackend::new(GpuBackendConfig::default()) {
        Ok(backend) => Some(backend),
        Err(e) => {
            eprintln!("skipping GPU test, no usable Vulkan device: {e}");
            None
        }
    }
}

/// Allocates a transfer-capable device buffer of `size` bytes.
fn device_buffer(ctx: &Arc<GpuContext>, size: u64) -> (vk::Buffer, vk::DeviceMemory) {
    let device = ctx.device();
    let info = vk::BufferCreateInfo::default()
        .size(size)
        .usage(vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);
    let buffer = unsafe { device.create_buffer(&info, None) }.unwrap();
    let requirement = unsafe { device.get_buffer_memory_requirements(buffer) };

    let props = ctx.memory_props();
    let type_index = (0..props.memory_type_count)
        .find(|&i| requirement.memory_type_bits & (1 << i) != 0)
        .unwrap();
    let alloc = vk::MemoryAllocateInfo::default()
        .allocation_size(requirement.size)
        .memory_type_index(type_index);
    let memory = unsafe { device.allocate_memory(&alloc, None) }.unwrap();
    unsafe { device.bind_buffer_memory(buffer, memory, 0) }.unwrap();
    (buffer, memory)
}

#[test]
fn file_to_gpu_to_file_roundtrip() {
    let Some(backend) = try_backend() else { return };
    let ctx = backend.context().clone();
    let (buffer, memory) = device_buffer(&ctx, 64);

    let payload = b"Hello from staging!";

    let mut src = tempfile::tempfile().unwrap();
    src.write_all(payload).unwrap();
    let dst = tempfile::tempfile().unwrap();

    let queue = IoQueue::new(Arc::new(backend));

    // File into the device buffer.
    queue.enqueue(Request::read_to_gpu(
        src.as_raw_fd(),
        0,
        buffer.as_raw(),
        0,
        payload.len(),
    ));
    queue.submit_all();
    queue.wait_all();
    let uploaded = queue.take_completed();
    assert_eq!(uploaded[0].status, Status::Ok);
    assert_eq!(uploaded[0].bytes_transferred, payload.len());

    // Device buffer back out to a second file.
    queue.enqueue(Request::write_from_gpu(
        dst.as_raw_fd(),
        0,
        buffer.as_raw(),
        0,
        payload.len(),
    ));
    queue.submit_all();
    queue.wait_all();
    let downloaded = queue.take_completed();
    assert_eq!(downloaded[0].status, Status::Ok);
    assert_eq!(downloaded[0].bytes_transferred, payload.len());

    let mut round = vec![0u8; payload.len()];
    let n = unsafe {
        libc::pread(
            dst.as_raw_fd(),
            round.as_mut_ptr() as *mut libc::c_void,
            round.len(),
            0,
        )
    };
    assert_eq!(n, payload.len() as isize);
    assert_eq!(&round, payload);

    drop(queue);
    unsafe {
        ctx.device().destroy_buffer(buffer, None);
        ctx.device().free_memory(memory, None);
    }
}

#[test]
fn host_requests_bypass_the_device() {
    let Some(backend) = try_backend() else { return };
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(b"host path").unwrap();

    let mut buf = vec![0u8; 9];
    let queue = IoQueue::new(Arc::new(backend));
    queue.enqueue(Request::read(
        file.as_raw_fd(),
        0,
        buf.as_mut_ptr(),
        buf.len(),
    ));
    queue.submit_all();
    queue.wait_all();

    let done = queue.take_completed();
    assert_eq!(done[0].status, Status::Ok);
    assert_eq!(&buf, b"host path");
}

#[test]
fn gpu_backend_rejects_transforms() {
    let Some(backend) = try_backend() else { return };
    let ctx = backend.context().clone();
    let (buffer, memory) = device_buffer(&ctx, 16);

    let file = tempfile::tempfile().unwrap();
    let queue = IoQueue::new(Arc::new(backend));
    let mut req = Request::read_to_gpu(file.as_raw_fd(), 0, buffer.as_raw(), 0, 16);
    req.compression = Compression::DemoTransform;
    queue.enqueue(req);
    queue.submit_all();
    queue.wait_all();

    let done = queue.take_completed();
    assert_eq!(done[0].status, Status::IoError);
    assert_eq!(done[0].errno_value, libc::EINVAL);

    drop(queue);
    unsafe {
        ctx.device().destroy_buffer(buffer, None);
        ctx.device().free_memory(memory, None);
    }
}

#[test]
fn gpu_backend_rejects_null_device_buffer() {
    let Some(backend) = try_backend() else { return };
    let file = tempfile::tempfile().unwrap();

    let queue = IoQueue::new(Arc::new(backend));
    queue.enqueue(Request::read_to_gpu(file.as_raw_fd(), 0, 0, 0, 16));
    queue.submit_all();
    queue.wait_all();

    let done = queue.take_completed();
    assert_eq!(done[0].status, Status::IoError);
    assert_eq!(done[0].errno_value, libc::EINVAL);
}
