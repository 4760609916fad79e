//! Build script for dsio
//!
//! Detects whether the compilation host can use the io_uring ring backend.
//! The ring backend needs Linux with kernel 5.10+; older kernels and other
//! platforms fall back to the CPU thread-pool backend at the call site.
//!
//! Sets the `has_io_uring` configuration flag consumed by conditional
//! compilation in `src/backend/uring.rs` and the ring integration tests.
//! The compilation machine and runtime machine are assumed to be the same.

use std::process::Command;

const RING_BASELINE: (u32, u32) = (5, 10);

fn main() {
    // Emit check-cfg hints so `cfg(has_io_uring)` is accepted by the compiler
    println!("cargo:rustc-check-cfg=cfg(has_io_uring)");

    if cfg!(target_os = "linux") {
        match kernel_release() {
            Ok(version) if version >= RING_BASELINE => {
                eprintln!("Kernel {:?} supports io_uring: enabling ring backend", version);
                println!("cargo:rustc-cfg=has_io_uring");
            }
            Ok(version) => {
                eprintln!(
                    "Kernel {:?} predates the io_uring {:?} baseline: ring backend disabled",
                    version, RING_BASELINE
                );
            }
            Err(e) => {
                eprintln!("Failed to determine kernel version ({}): ring backend disabled", e);
            }
        }
    }
}

/// Reads `uname -r` and extracts the leading `major.minor` pair from a
/// release string such as "5.10.0-8-generic". The patch level and any
/// distro suffix are irrelevant to the 5.10 gate and are ignored.
fn kernel_release() -> Result<(u32, u32), Box<dyn std::error::Error>> {
    let output = Command::new("uname").arg("-r").output()?;
    let release = String::from_utf8(output.stdout)?;
    let mut parts = release.trim().split(['.', '-']);
    let major = parts.next().ok_or("empty release string")?.parse()?;
    let minor = parts.next().ok_or("release string has no minor version")?.parse()?;
    Ok((major, minor))
}
