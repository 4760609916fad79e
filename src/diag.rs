//! Process-wide diagnostic reporting.
//!
//! Every backend failure path emits an [`ErrorContext`] through [`emit`].
//! A single pluggable sink can be installed with [`set_sink`]; without one,
//! records are written to stderr as a single key=value line with a stable
//! key set.
//!
//! The slot lock is held only while the sink `Arc` is cloned or replaced.
//! The sink itself runs unlocked, so a sink may re-enter the reporter
//! without deadlocking.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;

use crate::request::{MemoryDomain, Op, Request};

/// Function-valued diagnostic sink.
pub type Sink = Arc<dyn Fn(&ErrorContext) + Send + Sync>;

static SINK: Lazy<Mutex<Option<Sink>>> = Lazy::new(|| Mutex::new(None));

/// The request fields attached to a diagnostic record.
#[derive(Debug, Clone, Copy)]
pub struct RequestSnapshot {
    pub fd: i32,
    pub offset: u64,
    pub size: usize,
    pub op: Op,
    pub src_mem: MemoryDomain,
    pub dst_mem: MemoryDomain,
}

impl RequestSnapshot {
    pub fn of(req: &Request) -> Self {
        Self {
            fd: req.fd,
            offset: req.offset,
            size: req.size,
            op: req.op,
            src_mem: req.src_mem,
            dst_mem: req.dst_mem,
        }
    }
}

/// One diagnostic record.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Which component reported ("cpu", "ring", "gpu", "queue").
    pub subsystem: &'static str,
    /// What the component was doing ("validate", "pread", "submit", ...).
    pub operation: &'static str,
    /// Human-readable detail.
    pub detail: String,
    /// Raw errno associated with the failure.
    pub errno: i32,
    /// Source location captured at the report site.
    pub file: &'static str,
    pub line: u32,
    pub module: &'static str,
    /// Wall-clock time of the report.
    pub timestamp: SystemTime,
    /// Snapshot of the offending request, when one exists.
    pub request: Option<RequestSnapshot>,
}

impl ErrorContext {
    pub fn new(
        subsystem: &'static str,
        operation: &'static str,
        errno: i32,
        detail: String,
        file: &'static str,
        line: u32,
        module: &'static str,
        request: Option<RequestSnapshot>,
    ) -> Self {
        Self {
            subsystem,
            operation,
            detail,
            errno,
            file,
            line,
            module,
            timestamp: SystemTime::now(),
            request,
        }
    }
}

impl std::fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let elapsed = self
            .timestamp
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        write!(
            f,
            "timestamp={}.{:06} subsystem={} operation={} errno={} detail={:?} request={}",
            elapsed.as_secs(),
            elapsed.subsec_micros(),
            self.subsystem,
            self.operation,
            self.errno,
            self.detail,
            if self.request.is_some() { "yes" } else { "no" },
        )?;
        if let Some(snap) = &self.request {
            write!(
                f,
                " fd={} offset={} size={} op={} src_mem={} dst_mem={}",
                snap.fd,
                snap.offset,
                snap.size,
                snap.op.as_str(),
                snap.src_mem.as_str(),
                snap.dst_mem.as_str(),
            )?;
        }
        write!(f, " at {}:{} ({})", self.file, self.line, self.module)
    }
}

/// Installs the process-wide sink, replacing any previous one.
pub fn set_sink(sink: Sink) {
    let mut slot = SINK.lock().unwrap_or_else(|e| e.into_inner());
    *slot = Some(sink);
}

/// Removes the installed sink; records fall back to stderr.
pub fn clear_sink() {
    let mut slot = SINK.lock().unwrap_or_else(|e| e.into_inner());
    *slot = None;
}

/// Delivers a record to the installed sink, or to stderr when none is set.
///
/// The slot lock is released before the sink runs. This function never
/// panics; a poisoned slot is recovered, stderr failures are ignored.
pub fn emit(ctx: ErrorContext) {
    let sink = {
        let slot = SINK.lock().unwrap_or_else(|e| e.into_inner());
        slot.clone()
    };
    match sink {
        Some(sink) => sink(&ctx),
        None => {
            let stderr = std::io::stderr();
            let _ = writeln!(stderr.lock(), "{ctx}");
        }
    }
}

/// Reports a diagnostic without a request snapshot, capturing the source
/// location of the call site.
#[macro_export]
macro_rules! report {
    ($subsystem:expr, $operation:expr, $errno:expr, $($arg:tt)+) => {
        $crate::diag::emit($crate::diag::ErrorContext::new(
            $subsystem,
            $operation,
            $errno,
            format!($($arg)+),
            file!(),
            line!(),
            module_path!(),
            None,
        ))
    };
}

/// Reports a diagnostic carrying a snapshot of `$req`.
#[macro_export]
macro_rules! report_request {
    ($subsystem:expr, $operation:expr, $errno:expr, $req:expr, $($arg:tt)+) => {
        $crate::diag::emit($crate::diag::ErrorContext::new(
            $subsystem,
            $operation,
            $errno,
            format!($($arg)+),
            file!(),
            line!(),
            module_path!(),
            Some($crate::diag::RequestSnapshot::of($req)),
        ))
    };
}
