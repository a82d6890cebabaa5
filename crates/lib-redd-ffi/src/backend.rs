//! The call surface of the ReDD client library.
//!
//! [`ReddBackend`] mirrors the nine C entry points one to one. The resolved
//! symbol table implements it for the real library; tests substitute an
//! in-process fake.

use std::ffi::{c_int, c_long, CStr};

/// Opaque file handle returned by `redd_open`.
///
/// The value is only meaningful to the backend that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BackendFd(usize);

impl BackendFd {
    /// The `(void*)-1` failure sentinel.
    pub const INVALID: Self = Self(usize::MAX);

    /// Wrap a raw handle value produced by a backend.
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// Raw handle value, for handing back to the backend.
    pub const fn as_raw(self) -> usize {
        self.0
    }

    /// Null and `-1` are both failure returns from `redd_open`.
    pub const fn is_valid(self) -> bool {
        self.0 != 0 && self.0 != usize::MAX
    }
}

/// Entry points of the ReDD client library.
///
/// Return conventions follow the C API: negative sizes and offsets signal
/// failure, and the reason is available from [`errno`](ReddBackend::errno).
pub trait ReddBackend: Send + Sync {
    /// `redd_init`. Zero on success.
    fn init(&self) -> c_int;

    /// `redd_open`. Returns an invalid handle on failure.
    fn open(&self, name: &CStr, flags: c_int, permissions: c_int) -> BackendFd;

    /// `redd_read`. Bytes read, zero at end of file, negative on failure.
    fn read(&self, fd: BackendFd, into: &mut [u8]) -> isize;

    /// `redd_write`. Bytes written, negative on failure.
    fn write(&self, fd: BackendFd, from: &[u8]) -> isize;

    /// `redd_lseek64`. New absolute offset, negative on failure.
    fn lseek(&self, fd: BackendFd, offset: i64, whence: c_int) -> i64;

    /// `redd_close`. Zero on success.
    fn close(&self, fd: BackendFd) -> c_int;

    /// `redd_term`. Zero on success.
    fn term(&self) -> c_int;

    /// `redd_errno`. Code of the most recent failure.
    fn errno(&self) -> c_long;

    /// `redd_strerror`. Description of an error code.
    fn strerror(&self, code: c_long) -> String;

    /// Current error code together with its description.
    fn last_error(&self) -> (i64, String) {
        let code = self.errno();
        (code as i64, self.strerror(code))
    }
}
