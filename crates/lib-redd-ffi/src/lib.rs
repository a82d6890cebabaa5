//! # lib-redd-ffi
//!
//! Runtime-loaded bindings for the ReDD remote storage client.
//!
//! This crate loads the vendor client library (`libredd`) on demand and
//! exposes its files through the portable [`lib_storage::Storage`] contract.
//! It handles:
//!
//! - Dynamic library loading with `libloading`
//! - Resolution of the nine `redd_*` entry points into a typed table
//! - One-time `redd_init`/`redd_term` under a process-wide load lock
//! - A POSIX-like file adapter with flag translation, partial I/O loops
//!   and uniform error reporting
//!
//! # Example
//!
//! ```no_run
//! use lib_redd_ffi::{BindingManager, ReddFile};
//! use lib_storage::Storage;
//!
//! # fn main() -> Result<(), lib_redd_ffi::ReddError> {
//! let manager = BindingManager::global();
//! let mut file = ReddFile::open_read(&manager, "/store/run42.root")?;
//! let mut header = [0u8; 64];
//! let n = file.read(&mut header)?;
//! file.close()?;
//! # let _ = n;
//! # Ok(())
//! # }
//! ```
//!
//! # Threading
//!
//! Loading and unloading are serialized across every adapter in the process.
//! Reads and writes are not; a single [`ReddFile`] must not be used from
//! several threads at once.

pub mod backend;
pub mod binding;
pub mod error;
pub mod file;
pub mod loader;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use backend::{BackendFd, ReddBackend};
pub use binding::{AdapterLoadLock, BindingLease, BindingManager, BindingOptions, LoadGuard};
pub use error::{ReddError, ReddResult};
pub use file::{native_open_flags, native_whence, FileConfig, ReddFile};
pub use loader::{DynamicLoader, LibraryImage, LibraryLoader, ReddLibrary, SymbolTable};
