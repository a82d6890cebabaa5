//! Portable open flags.
//!
//! These bits describe *intent* (read, write, create, ...) and are translated
//! by each backend into its native open flags. Bits a backend does not
//! understand are carried along and ignored by it.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// A set of portable open flags.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct IoFlags(u32);

impl IoFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// Open for reading.
    pub const OPEN_READ: Self = Self(1);
    /// Open for writing.
    pub const OPEN_WRITE: Self = Self(2);
    /// Non-blocking I/O.
    pub const OPEN_NONBLOCK: Self = Self(4);
    /// Writes always go to the end of the file.
    pub const OPEN_APPEND: Self = Self(8);
    /// Unbuffered access; backends without a buffering layer ignore it.
    pub const OPEN_UNBUFFERED: Self = Self(16);
    /// Create the file if it does not exist.
    pub const OPEN_CREATE: Self = Self(32);
    /// Fail if the file already exists (with `OPEN_CREATE`).
    pub const OPEN_EXCLUSIVE: Self = Self(64);
    /// Truncate an existing file to zero length.
    pub const OPEN_TRUNCATE: Self = Self(128);
    /// Do not make the file the controlling terminal.
    pub const OPEN_NOTCTTY: Self = Self(256);

    /// Build a flag set from raw bits. Unknown bits are retained.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits of this set.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any bit of `other` is set in `self`.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// True if the set asks for read or write access (or both).
    pub const fn has_access_mode(self) -> bool {
        self.intersects(Self(Self::OPEN_READ.0 | Self::OPEN_WRITE.0))
    }

    /// Flags used by `create`: create, write and truncate, optionally exclusive.
    pub const fn for_create(exclusive: bool) -> Self {
        let base = Self::OPEN_CREATE.0 | Self::OPEN_WRITE.0 | Self::OPEN_TRUNCATE.0;
        if exclusive {
            Self(base | Self::OPEN_EXCLUSIVE.0)
        } else {
            Self(base)
        }
    }
}

impl BitOr for IoFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for IoFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for IoFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for IoFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(IoFlags, &str); 9] = [
            (IoFlags::OPEN_READ, "READ"),
            (IoFlags::OPEN_WRITE, "WRITE"),
            (IoFlags::OPEN_NONBLOCK, "NONBLOCK"),
            (IoFlags::OPEN_APPEND, "APPEND"),
            (IoFlags::OPEN_UNBUFFERED, "UNBUFFERED"),
            (IoFlags::OPEN_CREATE, "CREATE"),
            (IoFlags::OPEN_EXCLUSIVE, "EXCLUSIVE"),
            (IoFlags::OPEN_TRUNCATE, "TRUNCATE"),
            (IoFlags::OPEN_NOTCTTY, "NOTCTTY"),
        ];

        let mut names: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            names.push("NONE");
        }
        write!(f, "IoFlags({})", names.join(" | "))
    }
}
