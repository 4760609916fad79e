//! C interface.
//!
//! Backends and queues cross the boundary as opaque heap handles;
//! [`Request`] is `#[repr(C)]` and shared directly. All functions tolerate
//! null handles (no-op, or zero for getters). The per-request completion
//! callback passed to [`dsio_queue_submit_all`] is invoked with a pointer
//! to the finished request and the caller's cookie, on a backend thread.

#![allow(non_camel_case_types)]

use std::ffi::c_void;
use std::ptr;
use std::sync::Arc;

use crate::backend::cpu::CpuBackend;
use crate::backend::Backend;
use crate::queue::IoQueue;
use crate::request::Request;

/// Opaque backend handle.
pub struct dsio_backend_t {
    inner: Arc<dyn Backend>,
}

/// Opaque queue handle.
pub struct dsio_queue_t {
    inner: IoQueue,
}

/// Per-request completion callback: `(finished request, user cookie)`.
pub type dsio_completion_fn = Option<unsafe extern "C" fn(*mut Request, *mut c_void)>;

/// GPU backend configuration. A null `device` instructs the backend to
/// create its own minimal context; otherwise all handles are borrowed and
/// never destroyed.
#[repr(C)]
pub struct dsio_gpu_config_t {
    pub instance: *mut c_void,
    pub physical_device: *mut c_void,
    pub device: *mut c_void,
    pub queue: *mut c_void,
    pub command_pool: u64,
    pub queue_family_index: u32,
    pub worker_count: usize,
}

#[derive(Clone, Copy)]
struct Cookie(*mut c_void);
// SAFETY: the cookie is an opaque caller-owned pointer; the caller accepts
// that completions run on backend threads.
unsafe impl Send for Cookie {}
unsafe impl Sync for Cookie {}

#[no_mangle]
pub extern "C" fn dsio_backend_make_cpu(worker_count: usize) -> *mut dsio_backend_t {
    Box::into_raw(Box::new(dsio_backend_t {
        inner: Arc::new(CpuBackend::new(worker_count)),
    }))
}

#[cfg(all(target_os = "linux", has_io_uring))]
#[no_mangle]
pub extern "C" fn dsio_backend_make_ring(entries: u32) -> *mut dsio_backend_t {
    Box::into_raw(Box::new(dsio_backend_t {
        inner: Arc::new(crate::backend::uring::RingBackend::new(entries)),
    }))
}

/// # Safety
///
/// `config` must be null or point to a valid `dsio_gpu_config_t`; any
/// non-null handles in it must be valid and outlive the backend.
#[cfg(feature = "gpu")]
#[no_mangle]
pub unsafe extern "C" fn dsio_backend_make_gpu(
    config: *const dsio_gpu_config_t,
) -> *mut dsio_backend_t {
    use ash::vk;
    use ash::vk::Handle;

    use crate::backend::gpu::{ExternalHandles, GpuBackend, GpuBackendConfig, GpuContext};

    let (context, workers) = if config.is_null() || (*config).device.is_null() {
        let workers = if config.is_null() {
            0
        } else {
            (*config).worker_count
        };
        (None, workers)
    } else {
        let config = &*config;
        let external = ExternalHandles {
            instance: vk::Instance::from_raw(config.instance as u64),
            physical: vk::PhysicalDevice::from_raw(config.physical_device as u64),
            device: vk::Device::from_raw(config.device as u64),
            queue: vk::Queue::from_raw(config.queue as u64),
            queue_family: config.queue_family_index,
            command_pool: vk::CommandPool::from_raw(config.command_pool),
        };
        match GpuContext::from_external(external) {
            Ok(ctx) => (Some(Arc::new(ctx)), config.worker_count),
            Err(e) => {
                crate::report!("gpu", "device_init", libc::EINVAL, "{}", e);
                return ptr::null_mut();
            }
        }
    };

    match GpuBackend::new(GpuBackendConfig { context, workers }) {
        Ok(backend) => Box::into_raw(Box::new(dsio_backend_t {
            inner: Arc::new(backend),
        })),
        Err(e) => {
            crate::report!("gpu", "device_init", libc::EINVAL, "{}", e);
            ptr::null_mut()
        }
    }
}

/// # Safety
///
/// `backend` must be null or a handle from a `dsio_backend_make_*` call,
/// released at most once.
#[no_mangle]
pub unsafe extern "C" fn dsio_backend_release(backend: *mut dsio_backend_t) {
    if !backend.is_null() {
        drop(Box::from_raw(backend));
    }
}

/// # Safety
///
/// `backend` must be null or a live backend handle.
#[no_mangle]
pub unsafe extern "C" fn dsio_queue_create(backend: *const dsio_backend_t) -> *mut dsio_queue_t {
    if backend.is_null() {
        return ptr::null_mut();
    }
    Box::into_raw(Box::new(dsio_queue_t {
        inner: IoQueue::new((*backend).inner.clone()),
    }))
}

/// # Safety
///
/// `queue` must be null or a handle from `dsio_queue_create`, released at
/// most once, with no requests in flight.
#[no_mangle]
pub unsafe extern "C" fn dsio_queue_release(queue: *mut dsio_queue_t) {
    if !queue.is_null() {
        drop(Box::from_raw(queue));
    }
}

/// # Safety
///
/// `queue` must be null or live; `request` must be null or point to a
/// valid `Request` whose buffers outlive completion.
#[no_mangle]
pub unsafe extern "C" fn dsio_queue_enqueue(queue: *mut dsio_queue_t, request: *const Request) {
    if queue.is_null() || request.is_null() {
        return;
    }
    (*queue).inner.enqueue(*request);
}

/// # Safety
///
/// `queue` must be null or live. `completion`, when set, must remain
/// callable until `dsio_queue_wait_all` returns.
#[no_mangle]
pub unsafe extern "C" fn dsio_queue_submit_all(
    queue: *mut dsio_queue_t,
    completion: dsio_completion_fn,
    user_data: *mut c_void,
) {
    if queue.is_null() {
        return;
    }
    match completion {
        None => (*queue).inner.submit_all(),
        Some(callback) => {
            let cookie = Cookie(user_data);
            (*queue)
                .inner
                .submit_all_with(Some(Arc::new(move |done: &Request| {
                    // Bind the whole `Cookie` first so the closure captures it by
                    // value (and thus its `Send`/`Sync` impl) rather than just the
                    // inner `*mut c_void` field via disjoint closure capture.
                    let cookie = cookie;
                    // The record is complete by the time the observer runs;
                    // the callback may read every field.
                    unsafe { callback(done as *const Request as *mut Request, cookie.0) };
                })));
        }
    }
}

/// # Safety
///
/// `queue` must be null or live.
#[no_mangle]
pub unsafe extern "C" fn dsio_queue_wait_all(queue: *mut dsio_queue_t) {
    if !queue.is_null() {
        (*queue).inner.wait_all();
    }
}

/// # Safety
///
/// `queue` must be null or live.
#[no_mangle]
pub unsafe extern "C" fn dsio_queue_in_flight(queue: *const dsio_queue_t) -> usize {
    if queue.is_null() {
        return 0;
    }
    (*queue).inner.in_flight()
}

/// # Safety
///
/// `queue` must be null or live.
#[no_mangle]
pub unsafe extern "C" fn dsio_queue_total_completed(queue: *const dsio_queue_t) -> usize {
    if queue.is_null() {
        return 0;
    }
    (*queue).inner.total_completed() as usize
}

/// # Safety
///
/// `queue` must be null or live.
#[no_mangle]
pub unsafe extern "C" fn dsio_queue_total_failed(queue: *const dsio_queue_t) -> usize {
    if queue.is_null() {
        return 0;
    }
    (*queue).inner.total_failed() as usize
}

/// # Safety
///
/// `queue` must be null or live.
#[no_mangle]
pub unsafe extern "C" fn dsio_queue_total_bytes_transferred(queue: *const dsio_queue_t) -> usize {
    if queue.is_null() {
        return 0;
    }
    (*queue).inner.total_bytes_transferred() as usize
}
