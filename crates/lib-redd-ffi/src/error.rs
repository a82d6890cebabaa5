//! Error types for ReDD adapter operations.

use thiserror::Error;

/// Errors that can occur while loading the ReDD library or using a file.
#[derive(Debug, Error)]
pub enum ReddError {
    /// Failed to load the shared library.
    #[error("Failed to load library '{library}': {source}")]
    Load {
        library: String,
        #[source]
        source: libloading::Error,
    },

    /// Required symbol missing or resolved to a null address.
    #[error("Symbol '{symbol}' could not be resolved: {reason}")]
    SymbolResolution { symbol: &'static str, reason: String },

    /// `redd_init` returned a non-zero status.
    #[error("redd_init() failed with status {status}: error '{message}' (redd_errno={code})")]
    BackendInit {
        status: i32,
        code: i64,
        message: String,
    },

    /// Caller passed an argument the operation cannot accept.
    #[error("{operation}(name='{name}'): {reason}")]
    InvalidArgument {
        operation: &'static str,
        name: String,
        reason: String,
    },

    /// Operation is not valid in the adapter's current state.
    #[error("{operation}(name='{name}'): {reason}")]
    IllegalState {
        operation: &'static str,
        name: String,
        reason: String,
    },

    /// `redd_open` returned an invalid handle.
    #[error(
        "redd_open(name='{name}', flags={flags:#x}, permissions={permissions:#o}) \
         failed with error '{message}' (redd_errno={code})"
    )]
    Open {
        name: String,
        flags: i32,
        permissions: u32,
        code: i64,
        message: String,
    },

    /// `redd_read` failed.
    #[error("redd_read(name='{name}', n={requested}) failed with error '{message}' (redd_errno={code})")]
    Read {
        name: String,
        requested: usize,
        code: i64,
        message: String,
    },

    /// `redd_write` failed or stopped making progress.
    #[error("redd_write(name='{name}', n={requested}) failed with error '{message}' (redd_errno={code})")]
    Write {
        name: String,
        requested: usize,
        code: i64,
        message: String,
    },

    /// `redd_lseek64` failed.
    #[error(
        "redd_lseek64(name='{name}', offset={offset}, whence={whence}) \
         failed with error '{message}' (redd_errno={code})"
    )]
    Seek {
        name: String,
        offset: i64,
        whence: i32,
        code: i64,
        message: String,
    },

    /// The backend has no equivalent for this operation.
    #[error("{operation}(name='{name}') not implemented")]
    Unsupported {
        operation: &'static str,
        name: String,
    },
}

impl ReddError {
    /// Create a load error.
    pub fn load_error(library: impl Into<String>, source: libloading::Error) -> Self {
        Self::Load {
            library: library.into(),
            source,
        }
    }

    /// Create a symbol resolution error.
    pub fn symbol_resolution(symbol: &'static str, reason: impl Into<String>) -> Self {
        Self::SymbolResolution {
            symbol,
            reason: reason.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(
        operation: &'static str,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidArgument {
            operation,
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an illegal state error.
    pub fn illegal_state(
        operation: &'static str,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::IllegalState {
            operation,
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Backend error code carried by this error, if any.
    pub fn backend_code(&self) -> Option<i64> {
        match self {
            Self::BackendInit { code, .. }
            | Self::Open { code, .. }
            | Self::Read { code, .. }
            | Self::Write { code, .. }
            | Self::Seek { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Check if this error happened while bringing the library up.
    ///
    /// Such errors leave the binding unloaded; no adapter can be built.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Load { .. } | Self::SymbolResolution { .. } | Self::BackendInit { .. }
        )
    }

    /// Check if the caller misused the adapter.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. } | Self::IllegalState { .. })
    }
}

/// Result type for ReDD operations.
pub type ReddResult<T> = Result<T, ReddError>;
