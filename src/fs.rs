//! File helpers for positional I/O.
//!
//! The runtime itself only sees raw file descriptors; this module gives
//! embedders and tests a convenient way to produce them. A [`StorageFile`]
//! owns its descriptor and closes it on drop, after the caller has
//! quiesced any requests that reference it.

use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::path::Path;

use nix::fcntl::OFlag;
use nix::sys::stat::Mode;

/// An open byte-addressable file usable with [`crate::request::Request`].
#[derive(Debug)]
pub struct StorageFile {
    inner: std::fs::File,
}

impl StorageFile {
    /// Opens an existing file for positional reads and writes.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let fd = nix::fcntl::open(path.as_ref(), OFlag::O_RDWR, Mode::empty())
            .map_err(io::Error::from)?;
        // SAFETY: fd was just opened and is exclusively ours.
        Ok(Self {
            inner: unsafe { std::fs::File::from_raw_fd(fd) },
        })
    }

    /// Creates (or truncates) a file for positional reads and writes.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let fd = nix::fcntl::open(
            path.as_ref(),
            OFlag::O_RDWR | OFlag::O_CREAT | OFlag::O_TRUNC,
            Mode::from_bits_truncate(0o644),
        )
        .map_err(io::Error::from)?;
        // SAFETY: fd was just opened and is exclusively ours.
        Ok(Self {
            inner: unsafe { std::fs::File::from_raw_fd(fd) },
        })
    }

    /// Current file length in bytes.
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.inner.metadata()?.len())
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl AsRawFd for StorageFile {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn create_then_open_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.bin");

        let created = StorageFile::create(&path).unwrap();
        assert!(created.is_empty().unwrap());
        assert!(created.as_raw_fd() >= 0);
        drop(created);

        std::fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .write_all(b"abc")
            .unwrap();

        let opened = StorageFile::open(&path).unwrap();
        assert_eq!(opened.len().unwrap(), 3);
    }
}
