//! Diagnostic sink behavior: request snapshot attachment and tag stability.

use std::sync::{Arc, Mutex, MutexGuard};

use dsio::{Compression, CpuBackend, ErrorContext, IoQueue, MemoryDomain, Op, Request};

// The sink slot is process-wide; serialize the tests that touch it.
static SINK_GATE: Mutex<()> = Mutex::new(());

fn sink_gate() -> MutexGuard<'static, ()> {
    SINK_GATE.lock().unwrap_or_else(|e| e.into_inner())
}

fn capture_records() -> Arc<Mutex<Vec<ErrorContext>>> {
    let records = Arc::new(Mutex::new(Vec::new()));
    let sink_records = records.clone();
    dsio::set_sink(Arc::new(move |ctx: &ErrorContext| {
        sink_records.lock().unwrap().push(ctx.clone());
    }));
    records
}

#[test]
fn validation_failure_attaches_request_snapshot() {
    let _gate = sink_gate();
    let records = capture_records();

    let mut buf = vec![0u8; 100];
    let queue = IoQueue::new(Arc::new(CpuBackend::new(1)));
    queue.enqueue(Request::read(-1, 12345, buf.as_mut_ptr(), buf.len()));
    queue.submit_all();
    queue.wait_all();

    dsio::clear_sink();

    let records = records.lock().unwrap();
    let record = records
        .iter()
        .find(|r| r.subsystem == "cpu")
        .expect("cpu diagnostic");
    assert_eq!(record.operation, "validate");
    assert_eq!(record.errno, libc::EBADF);

    let snapshot = record.request.expect("request snapshot attached");
    assert_eq!(snapshot.fd, -1);
    assert_eq!(snapshot.offset, 12345);
    assert_eq!(snapshot.size, 100);
    assert_eq!(snapshot.op, Op::Read);
    assert_eq!(snapshot.dst_mem, MemoryDomain::Host);
}

#[test]
fn stubbed_compression_reports_decompression_stage() {
    let _gate = sink_gate();
    let records = capture_records();

    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), b"987654321").unwrap();
    let storage = dsio::fs::StorageFile::open(file.path()).unwrap();
    let fd = std::os::unix::io::AsRawFd::as_raw_fd(&storage);

    let mut buf = vec![0u8; 9];
    let queue = IoQueue::new(Arc::new(CpuBackend::new(1)));
    let mut req = Request::read(fd, 0, buf.as_mut_ptr(), buf.len());
    req.compression = Compression::Stubbed;
    queue.enqueue(req);
    queue.submit_all();
    queue.wait_all();

    dsio::clear_sink();

    let records = records.lock().unwrap();
    let record = records
        .iter()
        .find(|r| r.errno == libc::ENOTSUP)
        .expect("ENOTSUP diagnostic");
    assert_eq!(record.subsystem, "cpu");
    assert_eq!(record.operation, "decompression");
    assert!(record.request.is_some());
}

#[test]
fn sink_may_reenter_the_reporter() {
    let _gate = sink_gate();

    // A sink that itself reports must not deadlock on the slot lock.
    dsio::set_sink(Arc::new(|ctx: &ErrorContext| {
        if ctx.subsystem != "reentry" {
            dsio::diag::emit(ErrorContext::new(
                "reentry",
                "echo",
                ctx.errno,
                String::new(),
                file!(),
                line!(),
                module_path!(),
                None,
            ));
        }
    }));

    let mut buf = vec![0u8; 4];
    let queue = IoQueue::new(Arc::new(CpuBackend::new(1)));
    queue.enqueue(Request::read(-1, 0, buf.as_mut_ptr(), buf.len()));
    queue.submit_all();
    queue.wait_all();

    dsio::clear_sink();
}
