//! Configuration constants for the dsio runtime
//!
//! This module contains tunable parameters that affect runtime behavior,
//! particularly around queue depths and device synchronization.

/// Default submission depth for the ring backend
///
/// This controls the size of the io_uring submission and completion queues.
/// Each dispatcher batch can hold at most this many in-flight entries;
/// overflow within a batch is rejected with `EBUSY`.
pub const DEFAULT_RING_ENTRIES: u32 = 256;

/// Upper bound on a single device fence wait, in nanoseconds
///
/// The GPU-staging backend waits on each copy fence with this timeout.
/// A timeout is reported as a diagnostic and surfaces as an I/O failure on
/// the request; it does not tear the backend down.
pub const FENCE_TIMEOUT_NS: u64 = 1_000_000_000;

/// Initial capacity for the queue's pending list
///
/// Pre-allocating the pending list reduces reallocation during enqueue
/// bursts between `submit_all` calls.
pub const PENDING_LIST_CAPACITY: usize = 64;
