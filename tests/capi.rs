//! C surface smoke tests over the CPU backend.

use std::ffi::c_void;
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicUsize, Ordering};

use dsio::capi::{
    dsio_backend_make_cpu, dsio_backend_release, dsio_queue_create, dsio_queue_enqueue,
    dsio_queue_in_flight, dsio_queue_release, dsio_queue_submit_all,
    dsio_queue_total_bytes_transferred, dsio_queue_total_completed, dsio_queue_total_failed,
    dsio_queue_wait_all,
};
use dsio::{Request, Status};

unsafe extern "C" fn count_completion(request: *mut Request, user_data: *mut c_void) {
    let counter = &*(user_data as *const AtomicUsize);
    counter.fetch_add(1, Ordering::SeqCst);
    assert_eq!((*request).status, Status::Ok);
}

#[test]
fn c_surface_write_read_roundtrip() {
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(b"c surface payload").unwrap();
    let fd = file.as_raw_fd();

    let backend = dsio_backend_make_cpu(2);
    assert!(!backend.is_null());
    let queue = unsafe { dsio_queue_create(backend) };
    assert!(!queue.is_null());

    let mut buf = vec![0u8; 17];
    let request = Request::read(fd, 0, buf.as_mut_ptr(), buf.len());
    let completions = AtomicUsize::new(0);

    unsafe {
        dsio_queue_enqueue(queue, &request);
        dsio_queue_submit_all(
            queue,
            Some(count_completion),
            &completions as *const AtomicUsize as *mut c_void,
        );
        dsio_queue_wait_all(queue);

        assert_eq!(dsio_queue_in_flight(queue), 0);
        assert_eq!(dsio_queue_total_completed(queue), 1);
        assert_eq!(dsio_queue_total_failed(queue), 0);
        assert_eq!(dsio_queue_total_bytes_transferred(queue), 17);
    }
    assert_eq!(completions.load(Ordering::SeqCst), 1);
    assert_eq!(&buf, b"c surface payload");

    unsafe {
        dsio_queue_release(queue);
        dsio_backend_release(backend);
    }
}

#[test]
fn c_surface_tolerates_null_handles() {
    unsafe {
        dsio_backend_release(std::ptr::null_mut());
        dsio_queue_release(std::ptr::null_mut());
        assert!(dsio_queue_create(std::ptr::null()).is_null());
        dsio_queue_enqueue(std::ptr::null_mut(), std::ptr::null());
        dsio_queue_submit_all(std::ptr::null_mut(), None, std::ptr::null_mut());
        dsio_queue_wait_all(std::ptr::null_mut());
        assert_eq!(dsio_queue_in_flight(std::ptr::null()), 0);
        assert_eq!(dsio_queue_total_completed(std::ptr::null()), 0);
    }
}
