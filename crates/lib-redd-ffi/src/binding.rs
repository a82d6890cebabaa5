//! Process-wide ownership of the loaded ReDD library.
//!
//! The [`BindingManager`] maps the client library, resolves its entry points,
//! calls `redd_init` once, and tears everything down again with `redd_term`
//! and an unmap. Every load/unload transition runs under an
//! [`AdapterLoadLock`] so that concurrently constructed adapters never race
//! on library (de)initialization.
//!
//! File adapters hold a [`BindingLease`]. While any lease is alive the
//! library stays mapped; dropping the last one unloads it (unless
//! [`BindingOptions::unload_when_idle`] is off).
//!
//! I/O through a lease is *not* serialized by the load lock.

use crate::backend::ReddBackend;
use crate::error::{ReddError, ReddResult};
use crate::loader::{DynamicLoader, LibraryImage, LibraryLoader};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// Helper trait to recover from poisoned mutexes.
///
/// A panic while a load or unload was in progress must not make every later
/// adapter construction panic as well; the state it protects is only ever
/// replaced wholesale.
trait RecoverMutex<T> {
    fn lock_recover(&self) -> MutexGuard<'_, T>;
}

impl<T> RecoverMutex<T> for Mutex<T> {
    fn lock_recover(&self) -> MutexGuard<'_, T> {
        self.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Mutex was poisoned, recovering data");
            poisoned.into_inner()
        })
    }
}

/// The lock serializing library load and unload.
///
/// One instance normally lives for the whole process
/// ([`AdapterLoadLock::global`]); tests may inject their own.
#[derive(Debug, Default)]
pub struct AdapterLoadLock {
    inner: Mutex<()>,
}

impl AdapterLoadLock {
    /// Create an independent lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide lock shared by default-constructed managers.
    pub fn global() -> Arc<Self> {
        static GLOBAL_LOCK: OnceLock<Arc<AdapterLoadLock>> = OnceLock::new();
        GLOBAL_LOCK.get_or_init(|| Arc::new(Self::new())).clone()
    }

    /// Acquire the lock for the duration of the returned guard.
    pub fn acquire(&self) -> LoadGuard<'_> {
        LoadGuard {
            _guard: self.inner.lock_recover(),
        }
    }
}

/// Scoped hold on an [`AdapterLoadLock`]; released when dropped.
pub struct LoadGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::error!("Releasing ReDD load lock while unwinding");
        }
    }
}

/// Manager behaviour switches.
#[derive(Clone, Debug)]
pub struct BindingOptions {
    /// Unload the library as soon as the last lease is dropped.
    pub unload_when_idle: bool,
}

impl Default for BindingOptions {
    fn default() -> Self {
        Self {
            unload_when_idle: true,
        }
    }
}

/// Mutable binding state. Only changed while the load lock is held.
#[derive(Default)]
struct BindingState {
    loaded: bool,
    image: Option<Box<dyn LibraryImage>>,
    backend: Option<Arc<dyn ReddBackend>>,
    leases: usize,
}

/// Owner of the process's ReDD library binding.
pub struct BindingManager {
    loader: Box<dyn LibraryLoader>,
    lock: Arc<AdapterLoadLock>,
    options: BindingOptions,
    state: Mutex<BindingState>,
}

static GLOBAL_MANAGER: OnceLock<Arc<BindingManager>> = OnceLock::new();

impl BindingManager {
    /// Create a manager using the process-wide load lock.
    pub fn new(loader: impl LibraryLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            lock: AdapterLoadLock::global(),
            options: BindingOptions::default(),
            state: Mutex::new(BindingState::default()),
        }
    }

    /// Use `lock` instead of the process-wide load lock.
    pub fn with_lock(mut self, lock: Arc<AdapterLoadLock>) -> Self {
        self.lock = lock;
        self
    }

    /// Replace the manager options.
    pub fn with_options(mut self, options: BindingOptions) -> Self {
        self.options = options;
        self
    }

    /// The process-wide manager.
    ///
    /// Created on first use with the default [`DynamicLoader`] unless another
    /// manager was installed first with [`install_global`](Self::install_global).
    pub fn global() -> Arc<Self> {
        GLOBAL_MANAGER
            .get_or_init(|| Arc::new(Self::new(DynamicLoader::default())))
            .clone()
    }

    /// Install `manager` as the process-wide manager.
    ///
    /// Fails (handing the manager back) if one is already in place.
    pub fn install_global(manager: Arc<Self>) -> Result<(), Arc<Self>> {
        GLOBAL_MANAGER.set(manager)
    }

    /// Name of the library this manager loads.
    pub fn library_name(&self) -> String {
        self.loader.library_name()
    }

    /// Whether the library is currently mapped and initialized.
    pub fn is_loaded(&self) -> bool {
        self.state.lock_recover().loaded
    }

    /// Number of outstanding leases.
    pub fn lease_count(&self) -> usize {
        self.state.lock_recover().leases
    }

    /// Load and initialize the library if it is not loaded yet.
    pub fn ensure_loaded(&self) -> ReddResult<()> {
        let _guard = self.lock.acquire();
        let mut state = self.state.lock_recover();
        self.load_locked(&mut state)
    }

    /// Terminate and unmap the library if it is loaded.
    ///
    /// Refused while leases are outstanding. Failures are logged only.
    pub fn ensure_unloaded(&self) {
        let _guard = self.lock.acquire();
        let mut state = self.state.lock_recover();
        if state.leases > 0 {
            tracing::error!(
                library = %self.library_name(),
                leases = state.leases,
                "Refusing to unload ReDD library while adapters still use it"
            );
            return;
        }
        self.unload_locked(&mut state);
    }

    /// Ensure the library is loaded and take a lease on it.
    pub fn acquire(self: &Arc<Self>) -> ReddResult<BindingLease> {
        let _guard = self.lock.acquire();
        let mut state = self.state.lock_recover();
        self.load_locked(&mut state)?;

        let backend = match &state.backend {
            Some(backend) => backend.clone(),
            None => {
                return Err(ReddError::illegal_state(
                    "acquire",
                    self.library_name(),
                    "library marked loaded without a symbol table",
                ))
            }
        };
        state.leases += 1;

        Ok(BindingLease {
            manager: self.clone(),
            backend,
        })
    }

    fn release_lease(&self) {
        let _guard = self.lock.acquire();
        let mut state = self.state.lock_recover();
        state.leases = state.leases.saturating_sub(1);
        if state.leases == 0 && self.options.unload_when_idle {
            self.unload_locked(&mut state);
        }
    }

    fn load_locked(&self, state: &mut BindingState) -> ReddResult<()> {
        if state.loaded {
            return Ok(());
        }

        let library = self.library_name();
        tracing::debug!(library = %library, "Loading ReDD library");

        let image = self.loader.load().map_err(|e| {
            tracing::error!(library = %library, error = %e, "Failed to load ReDD library");
            e
        })?;
        tracing::debug!(library = %library, image = image.name(), "Resolved ReDD entry points");
        let backend = image.backend();

        let status = backend.init();
        if status != 0 {
            let (code, message) = backend.last_error();
            tracing::error!(
                library = %library,
                status,
                code,
                message = %message,
                "redd_init failed"
            );
            drop(backend);
            if let Err(reason) = image.release() {
                tracing::error!(library = %library, reason = %reason, "Failed to unload ReDD library after init failure");
            }
            return Err(ReddError::BackendInit {
                status,
                code,
                message,
            });
        }

        state.image = Some(image);
        state.backend = Some(backend);
        state.loaded = true;

        tracing::info!(library = %library, "ReDD library initialized");
        Ok(())
    }

    fn unload_locked(&self, state: &mut BindingState) {
        if !state.loaded {
            return;
        }

        let library = self.library_name();
        tracing::debug!(library = %library, "Unloading ReDD library");

        if let Some(backend) = &state.backend {
            let status = backend.term();
            if status != 0 {
                let (code, message) = backend.last_error();
                tracing::error!(
                    library = %library,
                    status,
                    code,
                    message = %message,
                    "redd_term failed, unloading anyway"
                );
            }
        }

        if let Some(image) = state.image.take() {
            if let Err(reason) = image.release() {
                tracing::error!(library = %library, reason = %reason, "Failed to unload ReDD library");
            }
        }

        state.loaded = false;
        state.backend = None;
        tracing::debug!(library = %library, "ReDD library unloaded");
    }
}

impl Drop for BindingManager {
    fn drop(&mut self) {
        let _guard = self.lock.acquire();
        let mut state = self.state.lock_recover();
        self.unload_locked(&mut state);
    }
}

/// A counted claim on a loaded library.
///
/// Holding a lease keeps the symbol table valid. It is the only way file
/// adapters reach the backend.
pub struct BindingLease {
    manager: Arc<BindingManager>,
    backend: Arc<dyn ReddBackend>,
}

impl BindingLease {
    /// The manager this lease was taken from.
    pub fn manager(&self) -> &Arc<BindingManager> {
        &self.manager
    }

    pub(crate) fn backend(&self) -> &dyn ReddBackend {
        self.backend.as_ref()
    }
}

impl Drop for BindingLease {
    fn drop(&mut self) {
        self.manager.release_lease();
    }
}

impl std::fmt::Debug for BindingLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingLease")
            .field("library", &self.manager.library_name())
            .finish()
    }
}
