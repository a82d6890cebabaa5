//! Dynamic library loading for the ReDD client.
//!
//! This module handles loading the client shared library and extracting the
//! nine required `redd_*` symbols into an immutable [`SymbolTable`].

use crate::backend::{BackendFd, ReddBackend};
use crate::error::{ReddError, ReddResult};
use libloading::{Library, Symbol};
use std::ffi::{c_char, c_int, c_long, c_void, CStr, OsString};
use std::mem;
use std::sync::Arc;

/// `int redd_init(void);`
pub type ReddInitFn = unsafe extern "C" fn() -> c_int;

/// `void *redd_open(const char *name, int flags, int mode);`
pub type ReddOpenFn =
    unsafe extern "C" fn(name: *const c_char, flags: c_int, mode: c_int) -> *mut c_void;

/// `ssize_t redd_read(void *fd, void *buf, size_t count);`
pub type ReddReadFn = unsafe extern "C" fn(fd: *mut c_void, buf: *mut c_void, count: usize) -> isize;

/// `ssize_t redd_write(void *fd, const void *buf, size_t count);`
pub type ReddWriteFn =
    unsafe extern "C" fn(fd: *mut c_void, buf: *const c_void, count: usize) -> isize;

/// `int64_t redd_lseek64(void *fd, int64_t offset, int whence);`
pub type ReddLseekFn = unsafe extern "C" fn(fd: *mut c_void, offset: i64, whence: c_int) -> i64;

/// `int redd_close(void *fd);`
pub type ReddCloseFn = unsafe extern "C" fn(fd: *mut c_void) -> c_int;

/// `int redd_term(void);`
pub type ReddTermFn = unsafe extern "C" fn() -> c_int;

/// `long redd_errno(void);`
pub type ReddErrnoFn = unsafe extern "C" fn() -> c_long;

/// `const char *redd_strerror(long code);`
pub type ReddStrerrorFn = unsafe extern "C" fn(code: c_long) -> *const c_char;

/// Symbol names, in resolution order.
pub const REQUIRED_SYMBOLS: [&str; 9] = [
    "redd_init",
    "redd_open",
    "redd_read",
    "redd_write",
    "redd_lseek64",
    "redd_close",
    "redd_term",
    "redd_errno",
    "redd_strerror",
];

/// Resolved entry points of one loaded library image.
///
/// Built once by [`ReddLibrary::open`]; never re-resolved. The pointers are
/// valid only while the owning image stays mapped.
#[derive(Clone, Copy)]
pub struct SymbolTable {
    init: ReddInitFn,
    open: ReddOpenFn,
    read: ReddReadFn,
    write: ReddWriteFn,
    lseek: ReddLseekFn,
    close: ReddCloseFn,
    term: ReddTermFn,
    errno: ReddErrnoFn,
    strerror: ReddStrerrorFn,
}

impl SymbolTable {
    /// Resolve every required symbol, failing on the first missing one.
    ///
    /// # Safety
    ///
    /// The library must export the `redd_*` functions with the C signatures
    /// documented on the `Redd*Fn` aliases.
    unsafe fn resolve(library: &Library) -> ReddResult<Self> {
        unsafe {
            Ok(Self {
                init: resolve_symbol(library, "redd_init")?,
                open: resolve_symbol(library, "redd_open")?,
                read: resolve_symbol(library, "redd_read")?,
                write: resolve_symbol(library, "redd_write")?,
                lseek: resolve_symbol(library, "redd_lseek64")?,
                close: resolve_symbol(library, "redd_close")?,
                term: resolve_symbol(library, "redd_term")?,
                errno: resolve_symbol(library, "redd_errno")?,
                strerror: resolve_symbol(library, "redd_strerror")?,
            })
        }
    }
}

impl ReddBackend for SymbolTable {
    fn init(&self) -> c_int {
        unsafe { (self.init)() }
    }

    fn open(&self, name: &CStr, flags: c_int, permissions: c_int) -> BackendFd {
        let fd = unsafe { (self.open)(name.as_ptr(), flags, permissions) };
        BackendFd::from_raw(fd as usize)
    }

    fn read(&self, fd: BackendFd, into: &mut [u8]) -> isize {
        unsafe {
            (self.read)(
                fd.as_raw() as *mut c_void,
                into.as_mut_ptr().cast(),
                into.len(),
            )
        }
    }

    fn write(&self, fd: BackendFd, from: &[u8]) -> isize {
        unsafe { (self.write)(fd.as_raw() as *mut c_void, from.as_ptr().cast(), from.len()) }
    }

    fn lseek(&self, fd: BackendFd, offset: i64, whence: c_int) -> i64 {
        unsafe { (self.lseek)(fd.as_raw() as *mut c_void, offset, whence) }
    }

    fn close(&self, fd: BackendFd) -> c_int {
        unsafe { (self.close)(fd.as_raw() as *mut c_void) }
    }

    fn term(&self) -> c_int {
        unsafe { (self.term)() }
    }

    fn errno(&self) -> c_long {
        unsafe { (self.errno)() }
    }

    fn strerror(&self, code: c_long) -> String {
        let text = unsafe { read_c_string((self.strerror)(code)) };
        text.unwrap_or_else(|| format!("unknown error {}", code))
    }
}

/// Look up one symbol and reinterpret its address as the function type `F`.
///
/// A null address is a failure even when the loader reports success.
///
/// # Safety
///
/// `F` must be a function pointer type matching the symbol's real signature.
unsafe fn resolve_symbol<F: Copy>(library: &Library, symbol: &'static str) -> ReddResult<F> {
    debug_assert_eq!(mem::size_of::<F>(), mem::size_of::<*mut c_void>());

    let address: Symbol<'_, *mut c_void> = unsafe { library.get(symbol.as_bytes()) }
        .map_err(|e| ReddError::symbol_resolution(symbol, e.to_string()))?;
    let address: *mut c_void = *address;
    if address.is_null() {
        return Err(ReddError::symbol_resolution(
            symbol,
            "loader returned a null address",
        ));
    }

    tracing::trace!(symbol, ?address, "Resolved symbol");
    // SAFETY: caller guarantees F is the symbol's function pointer type, and
    // function pointers have the same size as data pointers on supported targets.
    Ok(unsafe { mem::transmute_copy::<*mut c_void, F>(&address) })
}

/// Read a C string, returning None if null.
///
/// # Safety
/// The pointer must be null or point to a valid null-terminated C string.
unsafe fn read_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: Caller guarantees ptr is valid if not null
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

/// A mapped library image that can be released again.
pub trait LibraryImage: Send + Sync {
    /// Name the image was loaded under, for diagnostics.
    fn name(&self) -> &str;

    /// Entry points of this image.
    fn backend(&self) -> Arc<dyn ReddBackend>;

    /// Unmap the image. The returned error text is for logging only.
    fn release(self: Box<Self>) -> Result<(), String>;
}

/// Produces library images with all required symbols resolved.
pub trait LibraryLoader: Send + Sync {
    /// Name of the library this loader maps.
    fn library_name(&self) -> String;

    /// Map the library and resolve its symbols.
    ///
    /// Does not call `redd_init`; that is the binding manager's job.
    fn load(&self) -> ReddResult<Box<dyn LibraryImage>>;
}

impl<L: LibraryLoader + ?Sized> LibraryLoader for Arc<L> {
    fn library_name(&self) -> String {
        (**self).library_name()
    }

    fn load(&self) -> ReddResult<Box<dyn LibraryImage>> {
        (**self).load()
    }
}

/// The loaded ReDD client library with its resolved symbol table.
pub struct ReddLibrary {
    /// The underlying dynamic library handle.
    library: Library,

    /// Name or path the library was loaded from.
    name: String,

    /// Entry points resolved against `library`.
    symbols: Arc<SymbolTable>,
}

impl ReddLibrary {
    /// Load the client library by name or path and resolve all symbols.
    ///
    /// A bare file name goes through the platform loader search path.
    /// Loading runs the library's initializers, so `name` must refer to a
    /// genuine ReDD client exporting the documented C API.
    pub fn open(name: impl Into<OsString>) -> ReddResult<Self> {
        let name = name.into();
        let library_name = name.to_string_lossy().into_owned();

        let library =
            unsafe { Library::new(&name) }.map_err(|e| ReddError::load_error(&library_name, e))?;

        // `library` is dropped (unmapped) if any symbol is missing
        let symbols = unsafe { SymbolTable::resolve(&library) }?;

        tracing::debug!(library = %library_name, symbols = REQUIRED_SYMBOLS.len(), "Loaded ReDD library");

        Ok(Self {
            library,
            name: library_name,
            symbols: Arc::new(symbols),
        })
    }

    /// The resolved entry points.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }
}

impl LibraryImage for ReddLibrary {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> Arc<dyn ReddBackend> {
        self.symbols.clone()
    }

    fn release(self: Box<Self>) -> Result<(), String> {
        let Self { library, name, .. } = *self;
        library.close().map_err(|e| {
            tracing::trace!(library = %name, error = %e, "dlclose failed");
            e.to_string()
        })
    }
}

/// Loads the client library through the platform dynamic loader.
#[derive(Clone, Debug)]
pub struct DynamicLoader {
    name: OsString,
}

impl DynamicLoader {
    /// Loader for an explicit library name or path.
    pub fn new(name: impl Into<OsString>) -> Self {
        Self { name: name.into() }
    }

    /// Platform file name of the client library (`libredd.so`, `libredd.dylib`, `redd.dll`).
    pub fn default_library_name() -> OsString {
        libloading::library_filename("redd")
    }
}

impl Default for DynamicLoader {
    fn default() -> Self {
        Self::new(Self::default_library_name())
    }
}

impl LibraryLoader for DynamicLoader {
    fn library_name(&self) -> String {
        self.name.to_string_lossy().into_owned()
    }

    fn load(&self) -> ReddResult<Box<dyn LibraryImage>> {
        Ok(Box::new(ReddLibrary::open(self.name.clone())?))
    }
}
