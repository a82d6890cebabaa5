//! In-process stand-ins for the ReDD client library.
//!
//! [`FakeBackend`] keeps files in memory and lets tests script short
//! transfers, failures and backend quirks. [`FakeLoader`] hands it to a
//! [`BindingManager`](crate::BindingManager) in place of a real `dlopen`.

use crate::backend::{BackendFd, ReddBackend};
use crate::error::{ReddError, ReddResult};
use crate::loader::{LibraryImage, LibraryLoader};
use std::collections::{HashMap, VecDeque};
use std::ffi::{c_int, c_long, CStr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Number of calls made to each entry point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub init: usize,
    pub open: usize,
    pub read: usize,
    pub write: usize,
    pub lseek: usize,
    pub close: usize,
    pub term: usize,
}

struct OpenFile {
    name: String,
    pos: usize,
    append: bool,
}

#[derive(Default)]
struct FakeState {
    files: HashMap<String, Vec<u8>>,
    handles: HashMap<usize, OpenFile>,
    next_fd: usize,
    errno: c_long,
    calls: CallCounts,
    read_script: VecDeque<isize>,
    write_script: VecDeque<isize>,
    seeks: Vec<(i64, c_int)>,
    last_open_flags: Option<c_int>,
    init_status: c_int,
    term_status: c_int,
    close_status: c_int,
    end_seek_quirk: bool,
    end_seek_misreport: Option<i64>,
    stall_errno: Option<c_long>,
    init_delay: Option<Duration>,
}

/// Memory-backed implementation of the ReDD entry points.
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    /// Create an empty backend.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                next_fd: 0x10,
                ..FakeState::default()
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store a file.
    pub fn add_file(&self, name: &str, contents: &[u8]) {
        self.state().files.insert(name.to_string(), contents.to_vec());
    }

    /// Contents of a stored file.
    pub fn file_contents(&self, name: &str) -> Option<Vec<u8>> {
        self.state().files.get(name).cloned()
    }

    /// Cap successive reads: `n >= 0` transfers at most `n` bytes, negative fails.
    pub fn script_reads(&self, script: impl IntoIterator<Item = isize>) {
        self.state().read_script.extend(script);
    }

    /// Cap successive writes: `n > 0` transfers at most `n` bytes, zero makes
    /// no progress, negative fails.
    pub fn script_writes(&self, script: impl IntoIterator<Item = isize>) {
        self.state().write_script.extend(script);
    }

    /// Value reported by `redd_errno`.
    pub fn set_errno(&self, code: i64) {
        self.state().errno = code as c_long;
    }

    /// Return value of `redd_init`.
    pub fn set_init_status(&self, status: c_int) {
        self.state().init_status = status;
    }

    /// Return value of `redd_term`.
    pub fn set_term_status(&self, status: c_int) {
        self.state().term_status = status;
    }

    /// Return value of `redd_close`. The handle is released either way.
    pub fn set_close_status(&self, status: c_int) {
        self.state().close_status = status;
    }

    /// End-relative seeks report the right offset but leave the cursor where it was.
    pub fn set_end_seek_quirk(&self, enabled: bool) {
        self.state().end_seek_quirk = enabled;
    }

    /// The next end-relative seek moves the cursor correctly but reports
    /// `delta` bytes past the real offset. One-shot.
    pub fn misreport_next_end_seek(&self, delta: i64) {
        self.state().end_seek_misreport = Some(delta);
    }

    /// Scripted zero-progress writes set `redd_errno` to `code`.
    pub fn set_stall_errno(&self, code: i64) {
        self.state().stall_errno = Some(code as c_long);
    }

    /// Sleep inside `redd_init`, widening race windows in concurrency tests.
    pub fn set_init_delay(&self, delay: Duration) {
        self.state().init_delay = Some(delay);
    }

    /// Calls made so far.
    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    /// Every `(offset, whence)` passed to `redd_lseek64`.
    pub fn seeks(&self) -> Vec<(i64, c_int)> {
        self.state().seeks.clone()
    }

    /// Native flags of the most recent `redd_open`.
    pub fn last_open_flags(&self) -> Option<c_int> {
        self.state().last_open_flags
    }

    /// Handles currently open.
    pub fn open_handles(&self) -> usize {
        self.state().handles.len()
    }

    fn fail<T>(state: &mut FakeState, code: c_int, value: T) -> T {
        state.errno = code as c_long;
        value
    }
}

impl ReddBackend for FakeBackend {
    fn init(&self) -> c_int {
        let delay = {
            let mut state = self.state();
            state.calls.init += 1;
            state.init_delay
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        self.state().init_status
    }

    fn open(&self, name: &CStr, flags: c_int, _permissions: c_int) -> BackendFd {
        let mut state = self.state();
        state.calls.open += 1;
        state.last_open_flags = Some(flags);

        let name = name.to_string_lossy().into_owned();
        let exists = state.files.contains_key(&name);
        if exists && flags & libc::O_CREAT != 0 && flags & libc::O_EXCL != 0 {
            return Self::fail(&mut state, libc::EEXIST, BackendFd::INVALID);
        }
        if !exists {
            if flags & libc::O_CREAT == 0 {
                return Self::fail(&mut state, libc::ENOENT, BackendFd::INVALID);
            }
            state.files.insert(name.clone(), Vec::new());
        }
        if flags & libc::O_TRUNC != 0 {
            if let Some(data) = state.files.get_mut(&name) {
                data.clear();
            }
        }

        let fd = state.next_fd;
        state.next_fd += 1;
        state.handles.insert(
            fd,
            OpenFile {
                name,
                pos: 0,
                append: flags & libc::O_APPEND != 0,
            },
        );
        BackendFd::from_raw(fd)
    }

    fn read(&self, fd: BackendFd, into: &mut [u8]) -> isize {
        let mut state = self.state();
        state.calls.read += 1;

        let cap = match state.read_script.pop_front() {
            Some(n) if n < 0 => return Self::fail(&mut state, libc::EIO, -1),
            Some(n) => n as usize,
            None => usize::MAX,
        };

        let FakeState { files, handles, .. } = &mut *state;
        let Some(file) = handles.get_mut(&fd.as_raw()) else {
            return Self::fail(&mut state, libc::EBADF, -1);
        };
        let data = files.get(&file.name).map(Vec::as_slice).unwrap_or_default();

        let available = data.len().saturating_sub(file.pos);
        let n = into.len().min(cap).min(available);
        if n == 0 {
            return 0;
        }
        into[..n].copy_from_slice(&data[file.pos..file.pos + n]);
        file.pos += n;
        n as isize
    }

    fn write(&self, fd: BackendFd, from: &[u8]) -> isize {
        let mut state = self.state();
        state.calls.write += 1;

        let cap = match state.write_script.pop_front() {
            Some(n) if n < 0 => return Self::fail(&mut state, libc::EIO, -1),
            Some(0) => {
                if let Some(code) = state.stall_errno {
                    state.errno = code;
                }
                return 0;
            }
            Some(n) => n as usize,
            None => usize::MAX,
        };

        let FakeState { files, handles, .. } = &mut *state;
        let Some(file) = handles.get_mut(&fd.as_raw()) else {
            return Self::fail(&mut state, libc::EBADF, -1);
        };
        let data = files.entry(file.name.clone()).or_default();

        if file.append {
            file.pos = data.len();
        }
        let n = from.len().min(cap);
        let end = file.pos + n;
        if end > data.len() {
            data.resize(end, 0);
        }
        data[file.pos..end].copy_from_slice(&from[..n]);
        file.pos = end;
        n as isize
    }

    fn lseek(&self, fd: BackendFd, offset: i64, whence: c_int) -> i64 {
        let mut state = self.state();
        state.calls.lseek += 1;
        state.seeks.push((offset, whence));
        let quirk = state.end_seek_quirk;

        let FakeState { files, handles, .. } = &mut *state;
        let Some(file) = handles.get_mut(&fd.as_raw()) else {
            return Self::fail(&mut state, libc::EBADF, -1);
        };
        let len = files.get(&file.name).map_or(0, Vec::len) as i64;

        let base = match whence {
            libc::SEEK_SET => 0,
            libc::SEEK_CUR => file.pos as i64,
            libc::SEEK_END => len,
            _ => return Self::fail(&mut state, libc::EINVAL, -1),
        };
        let target = base + offset;
        if target < 0 {
            return Self::fail(&mut state, libc::EINVAL, -1);
        }
        if !(quirk && whence == libc::SEEK_END) {
            file.pos = target as usize;
        }
        if whence == libc::SEEK_END {
            if let Some(delta) = state.end_seek_misreport.take() {
                return target + delta;
            }
        }
        target
    }

    fn close(&self, fd: BackendFd) -> c_int {
        let mut state = self.state();
        state.calls.close += 1;
        if state.handles.remove(&fd.as_raw()).is_none() {
            return Self::fail(&mut state, libc::EBADF, -1);
        }
        if state.close_status != 0 {
            let status = state.close_status;
            return Self::fail(&mut state, libc::EIO, status);
        }
        0
    }

    fn term(&self) -> c_int {
        let mut state = self.state();
        state.calls.term += 1;
        state.term_status
    }

    fn errno(&self) -> c_long {
        self.state().errno
    }

    fn strerror(&self, code: c_long) -> String {
        match code as c_int {
            0 => "Success".to_string(),
            libc::ENOENT => "No such file or directory".to_string(),
            libc::EIO => "Input/output error".to_string(),
            libc::EBADF => "Bad file descriptor".to_string(),
            libc::EEXIST => "File exists".to_string(),
            libc::EINVAL => "Invalid argument".to_string(),
            other => format!("error {}", other),
        }
    }
}

#[derive(Default)]
struct LoaderStats {
    loads: AtomicUsize,
    releases: AtomicUsize,
    fail_release: AtomicBool,
    fail_symbol: Mutex<Option<&'static str>>,
}

/// Loader that "maps" a [`FakeBackend`].
pub struct FakeLoader {
    backend: Arc<FakeBackend>,
    stats: Arc<LoaderStats>,
}

impl FakeLoader {
    /// Create a loader for `backend`.
    pub fn new(backend: Arc<FakeBackend>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            stats: Arc::new(LoaderStats::default()),
        })
    }

    /// Make loading fail as if `symbol` were missing from the library.
    pub fn fail_symbol(&self, symbol: &'static str) {
        *self
            .stats
            .fail_symbol
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(symbol);
    }

    /// Make every image release report an error.
    pub fn fail_release(&self) {
        self.stats.fail_release.store(true, Ordering::SeqCst);
    }

    /// Successful loads so far.
    pub fn loads(&self) -> usize {
        self.stats.loads.load(Ordering::SeqCst)
    }

    /// Image releases so far, failed or not.
    pub fn releases(&self) -> usize {
        self.stats.releases.load(Ordering::SeqCst)
    }
}

impl LibraryLoader for FakeLoader {
    fn library_name(&self) -> String {
        "libredd-fake".to_string()
    }

    fn load(&self) -> ReddResult<Box<dyn LibraryImage>> {
        let missing = *self
            .stats
            .fail_symbol
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(symbol) = missing {
            return Err(ReddError::symbol_resolution(
                symbol,
                "undefined symbol in libredd-fake",
            ));
        }

        self.stats.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeImage {
            backend: self.backend.clone(),
            stats: self.stats.clone(),
        }))
    }
}

struct FakeImage {
    backend: Arc<FakeBackend>,
    stats: Arc<LoaderStats>,
}

impl LibraryImage for FakeImage {
    fn name(&self) -> &str {
        "libredd-fake"
    }

    fn backend(&self) -> Arc<dyn ReddBackend> {
        self.backend.clone()
    }

    fn release(self: Box<Self>) -> Result<(), String> {
        self.stats.releases.fetch_add(1, Ordering::SeqCst);
        if self.stats.fail_release.load(Ordering::SeqCst) {
            return Err("dlclose: image busy".to_string());
        }
        Ok(())
    }
}
