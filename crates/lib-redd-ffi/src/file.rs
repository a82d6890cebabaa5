//! POSIX-like file object on top of the ReDD client library.
//!
//! [`ReddFile`] implements the portable [`Storage`] contract: it translates
//! [`IoFlags`] into native open flags, loops partial reads and writes to
//! completion, and turns `redd_errno`/`redd_strerror` into [`ReddError`]s.

use crate::backend::{BackendFd, ReddBackend};
use crate::binding::{BindingLease, BindingManager};
use crate::error::{ReddError, ReddResult};
use lib_storage::{IoFlags, IoOffset, IoSize, Relative, Storage, DEFAULT_PERMISSIONS};
use std::ffi::{c_int, CString};
use std::marker::PhantomData;
use std::sync::Arc;

/// Configuration for file I/O.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Consecutive zero-byte writes tolerated before a write is failed.
    ///
    /// A write that makes no progress without setting `redd_errno` would
    /// otherwise loop forever.
    pub max_stalled_writes: u32,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            max_stalled_writes: 8,
        }
    }
}

/// Translate portable open flags into the backend's `O_*` flags.
///
/// Bits without a native counterpart are ignored.
pub fn native_open_flags(flags: IoFlags) -> c_int {
    let mut native = 0;

    let read = flags.contains(IoFlags::OPEN_READ);
    let write = flags.contains(IoFlags::OPEN_WRITE);
    if read && write {
        native |= libc::O_RDWR;
    } else if read {
        native |= libc::O_RDONLY;
    } else if write {
        native |= libc::O_WRONLY;
    }

    if flags.contains(IoFlags::OPEN_NONBLOCK) {
        native |= libc::O_NONBLOCK;
    }
    if flags.contains(IoFlags::OPEN_APPEND) {
        native |= libc::O_APPEND;
    }
    if flags.contains(IoFlags::OPEN_CREATE) {
        native |= libc::O_CREAT;
    }
    if flags.contains(IoFlags::OPEN_EXCLUSIVE) {
        native |= libc::O_EXCL;
    }
    if flags.contains(IoFlags::OPEN_TRUNCATE) {
        native |= libc::O_TRUNC;
    }

    native
}

/// Native `whence` for a seek origin.
pub fn native_whence(whence: Relative) -> c_int {
    match whence {
        Relative::Set => libc::SEEK_SET,
        Relative::Current => libc::SEEK_CUR,
        Relative::End => libc::SEEK_END,
    }
}

/// A file on ReDD storage.
///
/// Holds one backend handle at a time. Dropping the file while it is still
/// open is logged as an error and the handle is closed silently.
///
/// # Thread Safety
///
/// `ReddFile` is `Send` but intentionally `!Sync`: the backend gives no
/// guarantee about concurrent calls on one handle, so callers that share a
/// file across threads must serialize access themselves (e.g. with a
/// `Mutex<ReddFile>`).
pub struct ReddFile {
    /// Keeps the library loaded and provides the entry points.
    lease: BindingLease,

    /// Backend handle while open.
    fd: Option<BackendFd>,

    /// Name passed to the last `open`, for diagnostics.
    name: String,

    /// Whether this adapter considers itself responsible for an open file.
    open: bool,

    config: FileConfig,

    _not_sync: PhantomData<std::cell::Cell<()>>,
}

impl ReddFile {
    /// Create a closed file on top of a binding lease.
    pub fn new(lease: BindingLease) -> Self {
        Self::with_config(lease, FileConfig::default())
    }

    /// Create a closed file with custom I/O configuration.
    pub fn with_config(lease: BindingLease, config: FileConfig) -> Self {
        Self {
            lease,
            fd: None,
            name: String::new(),
            open: false,
            config,
            _not_sync: PhantomData,
        }
    }

    /// Load the library through `manager` if needed and open `name`.
    pub fn open_with(
        manager: &Arc<BindingManager>,
        name: &str,
        flags: IoFlags,
        permissions: u32,
    ) -> ReddResult<Self> {
        let mut file = Self::new(manager.acquire()?);
        file.open(name, flags, permissions)?;
        Ok(file)
    }

    /// Open `name` read-only through `manager`.
    pub fn open_read(manager: &Arc<BindingManager>, name: &str) -> ReddResult<Self> {
        Self::open_with(manager, name, IoFlags::OPEN_READ, DEFAULT_PERMISSIONS)
    }

    /// Name of the file last opened.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a backend handle is held.
    pub fn is_open(&self) -> bool {
        self.open
    }

    fn backend(&self) -> &dyn ReddBackend {
        self.lease.backend()
    }

    /// Create (or truncate) `name` for writing.
    pub fn create(&mut self, name: &str, exclusive: bool, permissions: u32) -> ReddResult<()> {
        self.open(name, IoFlags::for_create(exclusive), permissions)
    }

    /// Open `name`, closing any file this adapter already holds.
    pub fn open(&mut self, name: &str, flags: IoFlags, permissions: u32) -> ReddResult<()> {
        self.name = name.to_string();

        if name.is_empty() {
            return Err(ReddError::invalid_argument(
                "open",
                name,
                "cannot open a file without a name",
            ));
        }
        if !flags.has_access_mode() {
            return Err(ReddError::invalid_argument(
                "open",
                name,
                "must open file at least for read or write",
            ));
        }
        let c_name = CString::new(name).map_err(|_| {
            ReddError::invalid_argument("open", name, "name contains a NUL byte")
        })?;
        let mode = c_int::try_from(permissions).map_err(|_| {
            ReddError::invalid_argument(
                "open",
                name,
                format!("permissions {:#o} out of range", permissions),
            )
        })?;

        if self.fd.is_some() && self.open {
            tracing::error!(name = %name, "Opening ReDD file while a previous file is still open; closing it first");
            self.close_handle();
        }

        let native = native_open_flags(flags);
        let fd = self.backend().open(&c_name, native, mode);
        if !fd.is_valid() {
            let (code, message) = self.backend().last_error();
            return Err(ReddError::Open {
                name: self.name.clone(),
                flags: native,
                permissions,
                code,
                message,
            });
        }

        self.fd = Some(fd);
        self.open = true;

        tracing::info!(name = %name, flags = ?flags, "Opened ReDD file");
        Ok(())
    }

    /// Seek with a raw numeric origin (0 = set, 1 = current, 2 = end).
    ///
    /// Unknown origins are rejected before the backend is called.
    pub fn position_raw(&mut self, offset: IoOffset, whence: i32) -> ReddResult<IoOffset> {
        self.require_open("position")?;
        let whence = Relative::try_from(whence).map_err(|raw| {
            ReddError::invalid_argument(
                "position",
                self.name.as_str(),
                format!("incorrect 'whence' parameter {}", raw),
            )
        })?;
        self.position(offset, whence)
    }

    fn require_open(&self, operation: &'static str) -> ReddResult<BackendFd> {
        self.fd.ok_or_else(|| {
            ReddError::illegal_state(operation, self.name.as_str(), "called on a closed file")
        })
    }

    fn seek(&self, fd: BackendFd, offset: IoOffset, whence: c_int) -> ReddResult<IoOffset> {
        let result = self.backend().lseek(fd, offset, whence);
        if result < 0 {
            let (code, message) = self.backend().last_error();
            return Err(ReddError::Seek {
                name: self.name.clone(),
                offset,
                whence,
                code,
                message,
            });
        }
        Ok(result)
    }

    /// Close the backend handle, warning on failure, and mark closed.
    fn close_handle(&mut self) {
        if let Some(fd) = self.fd.take() {
            if self.backend().close(fd) != 0 {
                let (code, message) = self.backend().last_error();
                tracing::warn!(
                    name = %self.name,
                    code,
                    message = %message,
                    "redd_close failed"
                );
            }
        }
        self.open = false;
    }

    fn read_failed(&self, requested: usize, code: i64, message: String) -> ReddError {
        ReddError::Read {
            name: self.name.clone(),
            requested,
            code,
            message,
        }
    }

    fn write_failed(&self, requested: usize, code: i64, message: String) -> ReddError {
        ReddError::Write {
            name: self.name.clone(),
            requested,
            code,
            message,
        }
    }
}

impl Storage for ReddFile {
    type Error = ReddError;

    fn read(&mut self, into: &mut [u8]) -> ReddResult<IoSize> {
        let fd = self.require_open("read")?;
        let n = into.len();
        let mut done = 0;

        while done < n {
            let remaining = n - done;
            let s = self.backend().read(fd, &mut into[done..]);
            if s < 0 {
                let (code, message) = self.backend().last_error();
                return Err(self.read_failed(remaining, code, message));
            }
            if s == 0 {
                // end of file
                break;
            }
            let s = s as usize;
            if s > remaining {
                return Err(self.read_failed(
                    remaining,
                    0,
                    format!("backend reported {} bytes for a {} byte read", s, remaining),
                ));
            }
            done += s;
        }

        Ok(done)
    }

    fn write(&mut self, from: &[u8]) -> ReddResult<IoSize> {
        let fd = self.require_open("write")?;
        let n = from.len();
        let mut done = 0;
        let mut stalled = 0;

        while done < n {
            let remaining = n - done;
            // redd_errno is sticky; only a change during this call means the
            // zero-byte write failed.
            let errno_before = self.backend().errno();
            let s = self.backend().write(fd, &from[done..]);
            if s < 0 {
                let (code, message) = self.backend().last_error();
                return Err(self.write_failed(remaining, code, message));
            }
            if s == 0 {
                if self.backend().errno() != errno_before {
                    let (code, message) = self.backend().last_error();
                    return Err(self.write_failed(remaining, code, message));
                }
                stalled += 1;
                if stalled >= self.config.max_stalled_writes {
                    return Err(self.write_failed(
                        remaining,
                        0,
                        format!("no progress after {} attempts", stalled),
                    ));
                }
                tracing::debug!(name = %self.name, stalled, remaining, "redd_write made no progress, retrying");
                continue;
            }
            let s = s as usize;
            if s > remaining {
                return Err(self.write_failed(
                    remaining,
                    0,
                    format!("backend reported {} bytes for a {} byte write", s, remaining),
                ));
            }
            stalled = 0;
            done += s;
        }

        Ok(done)
    }

    fn position(&mut self, offset: IoOffset, whence: Relative) -> ReddResult<IoOffset> {
        let fd = self.require_open("position")?;

        let mut result = self.seek(fd, offset, native_whence(whence))?;

        // Some backends report a wrong offset for end-relative seeks; pin the
        // position to the reported value so the two agree.
        if whence == Relative::End {
            result = self.seek(fd, result, libc::SEEK_SET)?;
        }

        Ok(result)
    }

    fn resize(&mut self, _size: IoOffset) -> ReddResult<()> {
        Err(ReddError::Unsupported {
            operation: "resize",
            name: self.name.clone(),
        })
    }

    /// Close the file. Never fails: backend close errors are logged.
    fn close(&mut self) -> ReddResult<()> {
        if self.fd.is_none() {
            tracing::error!(name = %self.name, "close() called but the ReDD file is not open");
            self.open = false;
            return Ok(());
        }

        self.close_handle();
        tracing::debug!(name = %self.name, "Closed ReDD file");
        Ok(())
    }

    fn abort(&mut self) {
        if let Some(fd) = self.fd.take() {
            self.backend().close(fd);
        }
        self.open = false;
    }
}

impl Drop for ReddFile {
    fn drop(&mut self) {
        if self.open {
            tracing::error!(
                name = %self.name,
                "ReDD file dropped while still open"
            );
        }
        self.abort();
    }
}

impl std::fmt::Debug for ReddFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReddFile")
            .field("name", &self.name)
            .field("open", &self.open)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::AdapterLoadLock;
    use crate::testing::{FakeBackend, FakeLoader};

    struct Fixture {
        backend: Arc<FakeBackend>,
        manager: Arc<BindingManager>,
    }

    impl Fixture {
        fn new() -> Self {
            let backend = FakeBackend::new();
            let loader = FakeLoader::new(backend.clone());
            let manager = Arc::new(
                BindingManager::new(loader).with_lock(Arc::new(AdapterLoadLock::new())),
            );
            Self { backend, manager }
        }

        fn file(&self) -> ReddFile {
            ReddFile::new(self.manager.acquire().unwrap())
        }
    }

    #[test]
    fn test_flag_translation() {
        assert_eq!(native_open_flags(IoFlags::OPEN_READ), libc::O_RDONLY);
        assert_eq!(native_open_flags(IoFlags::OPEN_WRITE), libc::O_WRONLY);
        assert_eq!(
            native_open_flags(IoFlags::OPEN_READ | IoFlags::OPEN_WRITE),
            libc::O_RDWR
        );
        assert_eq!(
            native_open_flags(IoFlags::for_create(true)),
            libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC | libc::O_EXCL
        );
        assert_eq!(
            native_open_flags(IoFlags::OPEN_WRITE | IoFlags::OPEN_APPEND | IoFlags::OPEN_NONBLOCK),
            libc::O_WRONLY | libc::O_APPEND | libc::O_NONBLOCK
        );
        // Unbuffered and notty have no native counterpart.
        assert_eq!(
            native_open_flags(IoFlags::OPEN_READ | IoFlags::OPEN_UNBUFFERED | IoFlags::OPEN_NOTCTTY),
            libc::O_RDONLY
        );
    }

    #[test]
    fn test_open_close_close() {
        let fx = Fixture::new();
        fx.backend.add_file("/store/data", b"hello");

        let access = [
            IoFlags::OPEN_READ,
            IoFlags::OPEN_WRITE,
            IoFlags::OPEN_READ | IoFlags::OPEN_WRITE,
            IoFlags::OPEN_READ | IoFlags::OPEN_NONBLOCK,
            IoFlags::OPEN_WRITE | IoFlags::OPEN_APPEND,
            IoFlags::OPEN_WRITE | IoFlags::OPEN_CREATE | IoFlags::OPEN_TRUNCATE,
        ];
        for flags in access {
            let mut file = fx.file();
            file.open("/store/data", flags, 0o644).unwrap();
            assert!(file.is_open());
            file.close().unwrap();
            assert!(!file.is_open());
            file.close().unwrap();
        }
        assert_eq!(fx.backend.calls().close, access.len());
        assert_eq!(fx.backend.open_handles(), 0);
    }

    #[test]
    fn test_open_rejects_empty_name_before_backend() {
        let fx = Fixture::new();
        let mut file = fx.file();

        let err = file.open("", IoFlags::OPEN_READ, 0o666).unwrap_err();
        assert!(matches!(err, ReddError::InvalidArgument { .. }));
        assert_eq!(fx.backend.calls().open, 0);
        assert!(!file.is_open());
    }

    #[test]
    fn test_open_requires_read_or_write() {
        let fx = Fixture::new();
        let mut file = fx.file();

        for flags in [IoFlags::NONE, IoFlags::OPEN_CREATE | IoFlags::OPEN_TRUNCATE] {
            let err = file.open("/store/x", flags, 0o666).unwrap_err();
            assert!(matches!(err, ReddError::InvalidArgument { .. }));
        }
        assert_eq!(fx.backend.calls().open, 0);
    }

    #[test]
    fn test_open_rejects_out_of_range_permissions() {
        let fx = Fixture::new();
        fx.backend.add_file("/in", b"abc");
        let mut file = fx.file();

        let err = file.open("/in", IoFlags::OPEN_READ, u32::MAX).unwrap_err();
        assert!(matches!(err, ReddError::InvalidArgument { .. }));
        assert!(err.is_caller_error());
        assert_eq!(fx.backend.calls().open, 0);

        file.open("/in", IoFlags::OPEN_READ, 0o7777).unwrap();
        assert!(file.is_open());
    }

    #[test]
    fn test_open_failure_carries_backend_error() {
        let fx = Fixture::new();
        let mut file = fx.file();

        let err = file.open("/store/missing", IoFlags::OPEN_READ, 0o666).unwrap_err();
        match &err {
            ReddError::Open { name, code, message, .. } => {
                assert_eq!(name, "/store/missing");
                assert_eq!(*code, libc::ENOENT as i64);
                assert_eq!(message, "No such file or directory");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!file.is_open());
    }

    #[test]
    fn test_reopen_closes_previous_handle() {
        let fx = Fixture::new();
        fx.backend.add_file("/a", b"a");
        fx.backend.add_file("/b", b"b");
        let mut file = fx.file();

        file.open("/a", IoFlags::OPEN_READ, 0o666).unwrap();
        file.open("/b", IoFlags::OPEN_READ, 0o666).unwrap();

        assert_eq!(fx.backend.calls().close, 1);
        assert_eq!(fx.backend.open_handles(), 1);
        assert_eq!(file.name(), "/b");
    }

    #[test]
    fn test_create_exclusive() {
        let fx = Fixture::new();
        let mut file = fx.file();

        file.create("/new", true, 0o600).unwrap();
        assert_eq!(
            fx.backend.last_open_flags(),
            Some(libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC | libc::O_EXCL)
        );
        file.close().unwrap();

        let err = file.create("/new", true, 0o600).unwrap_err();
        assert_eq!(err.backend_code(), Some(libc::EEXIST as i64));
    }

    #[test]
    fn test_write_resumes_after_short_writes() {
        let fx = Fixture::new();
        let mut file = fx.file();
        file.create("/out", false, 0o644).unwrap();

        let data: Vec<u8> = (0..32u8).collect();
        fx.backend.script_writes([1, 3, 32]);

        assert_eq!(file.write(&data).unwrap(), data.len());
        assert_eq!(fx.backend.calls().write, 3);
        assert_eq!(fx.backend.file_contents("/out").unwrap(), data);
    }

    #[test]
    fn test_write_empty_buffer() {
        let fx = Fixture::new();
        let mut file = fx.file();
        file.create("/out", false, 0o644).unwrap();

        assert_eq!(file.write(&[]).unwrap(), 0);
        assert_eq!(fx.backend.calls().write, 0);
    }

    #[test]
    fn test_write_failure() {
        let fx = Fixture::new();
        let mut file = fx.file();
        file.create("/out", false, 0o644).unwrap();
        fx.backend.script_writes([2, -1]);
        fx.backend.set_errno(libc::EIO as i64);

        let err = file.write(b"abcdef").unwrap_err();
        match &err {
            ReddError::Write { requested, code, .. } => {
                assert_eq!(*requested, 4);
                assert_eq!(*code, libc::EIO as i64);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(file.is_open());
    }

    #[test]
    fn test_write_stall_is_bounded() {
        let fx = Fixture::new();
        let lease = fx.manager.acquire().unwrap();
        let mut file = ReddFile::with_config(lease, FileConfig { max_stalled_writes: 3 });
        file.create("/out", false, 0o644).unwrap();
        fx.backend.script_writes([0, 0, 0, 0, 0]);

        let err = file.write(b"abc").unwrap_err();
        assert!(matches!(err, ReddError::Write { code: 0, .. }));
        assert!(err.to_string().contains("no progress"));
        assert_eq!(fx.backend.calls().write, 3);
    }

    #[test]
    fn test_write_stall_recovers() {
        let fx = Fixture::new();
        let mut file = fx.file();
        file.create("/out", false, 0o644).unwrap();
        fx.backend.script_writes([0, 0, 2, 0, 10]);

        assert_eq!(file.write(b"abcd").unwrap(), 4);
        assert_eq!(fx.backend.file_contents("/out").unwrap(), b"abcd");
    }

    #[test]
    fn test_write_stall_ignores_stale_errno() {
        let fx = Fixture::new();
        let mut file = fx.file();
        assert!(file.open("/missing", IoFlags::OPEN_READ, 0o666).is_err());
        file.create("/out", false, 0o644).unwrap();
        fx.backend.script_writes([0, 3]);

        assert_eq!(file.write(b"abc").unwrap(), 3);
        assert_eq!(fx.backend.calls().write, 2);
        assert_eq!(fx.backend.file_contents("/out").unwrap(), b"abc");
    }

    #[test]
    fn test_write_stall_with_new_errno_fails() {
        let fx = Fixture::new();
        let mut file = fx.file();
        file.create("/out", false, 0o644).unwrap();
        fx.backend.set_stall_errno(libc::EIO as i64);
        fx.backend.script_writes([1, 0, 5]);

        let err = file.write(b"abcd").unwrap_err();
        match &err {
            ReddError::Write { requested, code, message, .. } => {
                assert_eq!(*requested, 3);
                assert_eq!(*code, libc::EIO as i64);
                assert_eq!(message, "Input/output error");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fx.backend.calls().write, 2);
    }

    #[test]
    fn test_read_stops_at_eof() {
        let fx = Fixture::new();
        fx.backend.add_file("/in", b"0123456789");
        let mut file = fx.file();
        file.open("/in", IoFlags::OPEN_READ, 0o666).unwrap();
        fx.backend.script_reads([4, 1]);

        let mut buf = [0u8; 64];
        assert_eq!(file.read(&mut buf).unwrap(), 10);
        assert_eq!(&buf[..10], b"0123456789");

        assert_eq!(file.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_read_failure() {
        let fx = Fixture::new();
        fx.backend.add_file("/in", b"0123456789");
        let mut file = fx.file();
        file.open("/in", IoFlags::OPEN_READ, 0o666).unwrap();
        fx.backend.script_reads([-1]);
        fx.backend.set_errno(libc::EIO as i64);

        let mut buf = [0u8; 4];
        let err = file.read(&mut buf).unwrap_err();
        assert!(matches!(err, ReddError::Read { requested: 4, .. }));
        assert!(err.to_string().contains("Input/output error"));
    }

    #[test]
    fn test_io_on_closed_file_is_illegal() {
        let fx = Fixture::new();
        let mut file = fx.file();
        let mut buf = [0u8; 4];

        assert!(matches!(file.read(&mut buf), Err(ReddError::IllegalState { .. })));
        assert!(matches!(file.write(b"x"), Err(ReddError::IllegalState { .. })));
        assert!(matches!(
            file.position(0, Relative::Set),
            Err(ReddError::IllegalState { .. })
        ));
        let calls = fx.backend.calls();
        assert_eq!(calls.read + calls.write + calls.lseek, 0);
    }

    #[test]
    fn test_position_rejects_unknown_whence() {
        let fx = Fixture::new();
        fx.backend.add_file("/in", b"abc");
        let mut file = fx.file();
        file.open("/in", IoFlags::OPEN_READ, 0o666).unwrap();

        for whence in [-1, 3, 42] {
            let err = file.position_raw(0, whence).unwrap_err();
            assert!(matches!(err, ReddError::InvalidArgument { .. }));
        }
        assert_eq!(fx.backend.calls().lseek, 0);

        assert_eq!(file.position_raw(1, 0).unwrap(), 1);
    }

    #[test]
    fn test_end_seek_is_normalized() {
        let fx = Fixture::new();
        fx.backend.add_file("/in", b"abcdef");
        fx.backend.set_end_seek_quirk(true);
        let mut file = fx.file();
        file.open("/in", IoFlags::OPEN_READ, 0o666).unwrap();

        assert_eq!(file.position(-2, Relative::End).unwrap(), 4);
        assert_eq!(
            fx.backend.seeks(),
            vec![(-2, libc::SEEK_END), (4, libc::SEEK_SET)]
        );

        let mut buf = [0u8; 2];
        assert_eq!(file.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"ef");
    }

    #[test]
    fn test_misreported_end_offset_is_pinned() {
        let fx = Fixture::new();
        fx.backend.add_file("/in", b"abcdef");
        fx.backend.misreport_next_end_seek(1);
        let mut file = fx.file();
        file.open("/in", IoFlags::OPEN_READ, 0o666).unwrap();

        // The reported offset wins; the cursor is moved to match it.
        assert_eq!(file.position(-2, Relative::End).unwrap(), 5);
        assert_eq!(
            fx.backend.seeks(),
            vec![(-2, libc::SEEK_END), (5, libc::SEEK_SET)]
        );
        let mut buf = [0u8; 4];
        assert_eq!(file.read(&mut buf).unwrap(), 1);
        assert_eq!(&buf[..1], b"f");

        assert_eq!(file.position(-2, Relative::End).unwrap(), 4);
    }

    #[test]
    fn test_set_and_current_seek_once() {
        let fx = Fixture::new();
        fx.backend.add_file("/in", b"abcdef");
        let mut file = fx.file();
        file.open("/in", IoFlags::OPEN_READ, 0o666).unwrap();

        assert_eq!(file.position(2, Relative::Set).unwrap(), 2);
        assert_eq!(file.position(1, Relative::Current).unwrap(), 3);
        assert_eq!(file.size().unwrap(), 6);
        assert_eq!(file.current_position().unwrap(), 3);
    }

    #[test]
    fn test_seek_failure() {
        let fx = Fixture::new();
        fx.backend.add_file("/in", b"abc");
        let mut file = fx.file();
        file.open("/in", IoFlags::OPEN_READ, 0o666).unwrap();

        let err = file.position(-10, Relative::Set).unwrap_err();
        match &err {
            ReddError::Seek { offset, whence, code, .. } => {
                assert_eq!(*offset, -10);
                assert_eq!(*whence, libc::SEEK_SET);
                assert_eq!(*code, libc::EINVAL as i64);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resize_unsupported() {
        let fx = Fixture::new();
        fx.backend.add_file("/in", b"abc");
        let mut file = fx.file();

        assert!(matches!(file.resize(0), Err(ReddError::Unsupported { .. })));
        file.open("/in", IoFlags::OPEN_READ | IoFlags::OPEN_WRITE, 0o666).unwrap();
        assert!(matches!(file.resize(10), Err(ReddError::Unsupported { .. })));
        file.close().unwrap();
        assert!(matches!(file.resize(-1), Err(ReddError::Unsupported { .. })));
    }

    #[test]
    fn test_close_failure_is_not_escalated() {
        let fx = Fixture::new();
        fx.backend.add_file("/in", b"abc");
        fx.backend.set_close_status(-1);
        let mut file = fx.file();
        file.open("/in", IoFlags::OPEN_READ, 0o666).unwrap();

        file.close().unwrap();
        assert!(!file.is_open());
        assert_eq!(fx.backend.open_handles(), 0);
    }

    #[test]
    fn test_abort_clears_handle() {
        let fx = Fixture::new();
        fx.backend.add_file("/in", b"abc");
        fx.backend.set_close_status(-1);
        let mut file = fx.file();
        file.open("/in", IoFlags::OPEN_READ, 0o666).unwrap();

        file.abort();
        assert!(!file.is_open());
        file.abort();
        assert_eq!(fx.backend.calls().close, 1);
    }

    #[test]
    fn test_drop_while_open_releases_handle() {
        let fx = Fixture::new();
        fx.backend.add_file("/in", b"abc");
        {
            let mut file = fx.file();
            file.open("/in", IoFlags::OPEN_READ, 0o666).unwrap();
        }
        assert_eq!(fx.backend.open_handles(), 0);
        assert!(!fx.manager.is_loaded());
    }

    #[test]
    fn test_open_with_loads_library() {
        let fx = Fixture::new();
        fx.backend.add_file("/in", b"abc");

        let mut file = ReddFile::open_read(&fx.manager, "/in").unwrap();
        assert!(fx.manager.is_loaded());
        assert_eq!(fx.manager.lease_count(), 1);

        file.close().unwrap();
        drop(file);
        assert_eq!(fx.manager.lease_count(), 0);
        assert_eq!(fx.backend.calls().term, 1);
    }
}
