//! CPU backend integration tests: validation, positional I/O, transforms.

use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::sync::Arc;

use dsio::{Compression, CpuBackend, IoQueue, Request, Status};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn file_with(content: &[u8]) -> std::fs::File {
    let mut file = tempfile::tempfile().expect("temp file");
    file.write_all(content).unwrap();
    file
}

fn queue_with_workers(workers: usize) -> IoQueue {
    IoQueue::new(Arc::new(CpuBackend::new(workers)))
}

#[test]
fn demo_transform_uppercases_read() {
    init_tracing();
    let file = file_with(b"lowercase text");
    let mut buf = vec![0u8; 14];

    let queue = queue_with_workers(2);
    let mut req = Request::read(file.as_raw_fd(), 0, buf.as_mut_ptr(), buf.len());
    req.compression = Compression::DemoTransform;
    queue.enqueue(req);
    queue.submit_all();
    queue.wait_all();

    let done = queue.take_completed();
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].status, Status::Ok);
    assert_eq!(done[0].bytes_transferred, 14);
    assert_eq!(&buf, b"LOWERCASE TEXT");
}

#[test]
fn stubbed_compression_fails_with_enotsup() {
    init_tracing();
    let file = file_with(b"123456789");
    let mut buf = vec![0u8; 9];

    let queue = queue_with_workers(1);
    let mut req = Request::read(file.as_raw_fd(), 0, buf.as_mut_ptr(), buf.len());
    req.compression = Compression::Stubbed;
    queue.enqueue(req);
    queue.submit_all();
    queue.wait_all();

    let done = queue.take_completed();
    assert_eq!(done[0].status, Status::IoError);
    assert_eq!(done[0].errno_value, libc::ENOTSUP);
    assert_eq!(done[0].bytes_transferred, 0);
    assert_eq!(queue.total_failed(), 1);
}

#[test]
fn concurrent_reads_at_distinct_offsets() {
    init_tracing();
    let file = file_with(b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ");
    let fd = file.as_raw_fd();
    let mut bufs = [vec![0u8; 10], vec![0u8; 10], vec![0u8; 10]];

    let queue = queue_with_workers(3);
    for (buf, offset) in bufs.iter_mut().zip([0u64, 10, 26]) {
        queue.enqueue(Request::read(fd, offset, buf.as_mut_ptr(), buf.len()));
    }
    queue.submit_all();
    queue.wait_all();

    assert_eq!(&bufs[0], b"0123456789");
    assert_eq!(&bufs[1], b"ABCDEFGHIJ");
    assert_eq!(&bufs[2], b"QRSTUVWXYZ");
    assert_eq!(queue.total_completed(), 3);
    assert_eq!(queue.total_failed(), 0);
    assert_eq!(queue.total_bytes_transferred(), 30);
}

#[test]
fn invalid_fd_fails_with_ebadf() {
    let mut buf = vec![0u8; 100];

    let queue = queue_with_workers(1);
    queue.enqueue(Request::read(-1, 12345, buf.as_mut_ptr(), buf.len()));
    queue.submit_all();
    queue.wait_all();

    let done = queue.take_completed();
    assert_eq!(done[0].status, Status::IoError);
    assert_eq!(done[0].errno_value, libc::EBADF);
    assert_eq!(done[0].bytes_transferred, 0);
}

#[test]
fn read_past_eof_is_short_and_nul_terminated() {
    let file = file_with(b"abc");
    let mut buf = vec![0xffu8; 16];

    let queue = queue_with_workers(1);
    queue.enqueue(Request::read(file.as_raw_fd(), 0, buf.as_mut_ptr(), buf.len()));
    queue.submit_all();
    queue.wait_all();

    let done = queue.take_completed();
    assert_eq!(done[0].status, Status::Ok);
    assert_eq!(done[0].bytes_transferred, 3);
    assert_eq!(&buf[..3], b"abc");
    // Short reads are terminated for text-mode consumers.
    assert_eq!(buf[3], 0);
}

#[test]
fn write_then_read_roundtrip() {
    let file = file_with(b"");
    let fd = file.as_raw_fd();
    let payload = b"round trip payload";

    let queue = queue_with_workers(2);
    queue.enqueue(Request::write(fd, 0, payload.as_ptr(), payload.len()));
    queue.submit_all();
    queue.wait_all();

    let written = queue.take_completed();
    assert_eq!(written[0].status, Status::Ok);
    assert_eq!(written[0].bytes_transferred, payload.len());

    let mut buf = vec![0u8; payload.len()];
    queue.enqueue(Request::read(fd, 0, buf.as_mut_ptr(), buf.len()));
    queue.submit_all();
    queue.wait_all();

    let read = queue.take_completed();
    assert_eq!(read[0].status, Status::Ok);
    assert_eq!(read[0].bytes_transferred, payload.len());
    assert_eq!(&buf, payload);
}

#[test]
fn take_completed_empties_the_list() {
    let file = file_with(b"xyz");
    let mut buf = vec![0u8; 3];

    let queue = queue_with_workers(1);
    queue.enqueue(Request::read(file.as_raw_fd(), 0, buf.as_mut_ptr(), buf.len()));
    queue.submit_all();
    queue.wait_all();

    assert_eq!(queue.take_completed().len(), 1);
    assert!(queue.take_completed().is_empty());
}
