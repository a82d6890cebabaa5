//! The storage contract implemented by backend adapters.

use std::fmt;

/// Byte count for a single transfer.
pub type IoSize = usize;

/// Signed file offset.
pub type IoOffset = i64;

/// Default permission bits for newly created files.
pub const DEFAULT_PERMISSIONS: u32 = 0o666;

/// Origin for [`Storage::position`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Relative {
    /// From the start of the file.
    Set,
    /// From the current position.
    Current,
    /// From the end of the file.
    End,
}

impl Relative {
    /// Numeric origin as understood by the storage interface (0, 1, 2).
    pub const fn as_raw(self) -> i32 {
        match self {
            Self::Set => 0,
            Self::Current => 1,
            Self::End => 2,
        }
    }
}

impl TryFrom<i32> for Relative {
    type Error = i32;

    /// Convert a raw origin; the unrecognized value is handed back on failure.
    fn try_from(raw: i32) -> Result<Self, i32> {
        match raw {
            0 => Ok(Self::Set),
            1 => Ok(Self::Current),
            2 => Ok(Self::End),
            other => Err(other),
        }
    }
}

impl fmt::Display for Relative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Set => "set",
            Self::Current => "current",
            Self::End => "end",
        };
        f.write_str(name)
    }
}

/// A seekable byte store.
///
/// Implementations are single-owner objects: every mutating call takes
/// `&mut self`, and sharing one instance across threads needs external
/// synchronization.
pub trait Storage {
    /// Error reported by this storage.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read up to `into.len()` bytes. Returns fewer only at end of file.
    fn read(&mut self, into: &mut [u8]) -> Result<IoSize, Self::Error>;

    /// Write all of `from`. Returns `from.len()` on success.
    fn write(&mut self, from: &[u8]) -> Result<IoSize, Self::Error>;

    /// Move the file position and return the new absolute offset.
    fn position(&mut self, offset: IoOffset, whence: Relative) -> Result<IoOffset, Self::Error>;

    /// Set the file length.
    fn resize(&mut self, size: IoOffset) -> Result<(), Self::Error>;

    /// Release the underlying handle.
    fn close(&mut self) -> Result<(), Self::Error>;

    /// Release the underlying handle without reporting errors.
    fn abort(&mut self);

    /// Push buffered data to the backend. Unbuffered storages have nothing to do.
    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Current absolute offset.
    fn current_position(&mut self) -> Result<IoOffset, Self::Error> {
        self.position(0, Relative::Current)
    }

    /// Seek back to the start of the file.
    fn rewind(&mut self) -> Result<(), Self::Error> {
        self.position(0, Relative::Set).map(|_| ())
    }

    /// File length, leaving the position unchanged.
    fn size(&mut self) -> Result<IoOffset, Self::Error> {
        let here = self.current_position()?;
        let size = self.position(0, Relative::End)?;
        self.position(here, Relative::Set)?;
        Ok(size)
    }
}
