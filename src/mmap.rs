//! Backing storage for a database
//!
//! A database is either read into memory or memory-mapped. Both present
//! the whole file as one immutable byte slice.
//!
//! # Safety
//!
//! A memory map reflects the file on disk, so the file must not be
//! truncated or rewritten while a [`Reader`](crate::Reader) has it open.
//! Replace database files by writing a new file and renaming it over the
//! old one.
//!
//! # Example
//!
//! ```no_run
//! use mmdb_reader::{Reader, Source};
//!
//! let source = Source::open("GeoLite2-City.mmdb")?;
//! println!("mapped: {}, {} bytes", source.is_mapped(), source.len());
//! let reader = Reader::from_source(source)?;
//! # Ok::<(), mmdb_reader::MmdbError>(())
//! ```

use crate::error::{MmdbError, Result};
use log::debug;
use memmap2::Mmap;
use std::fs::File;
use std::io::{self, Read};
use std::ops::Deref;
use std::path::Path;

/// Bytes of a database file
pub enum Source {
    /// Heap copy, freed with the reader
    Owned(Vec<u8>),
    /// Read-only memory map, unmapped when dropped
    Mapped(Mmap),
}

impl Source {
    /// Memory-map the file at `path`
    ///
    /// Falls back to reading the file into memory on platforms where
    /// mapping is unsupported.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be opened or read
    /// - The file is empty
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let io_error = |e: io::Error| MmdbError::Io(format!("open {}: {}", path.display(), e));

        let file = File::open(path).map_err(io_error)?;
        let size = file.metadata().map_err(io_error)?.len();
        if size == 0 {
            return Err(MmdbError::Io("file is empty".to_string()));
        }
        let size = usize::try_from(size)
            .map_err(|_| MmdbError::Io(format!("open {}: file too large", path.display())))?;

        // SAFETY: the map is read-only and callers must not modify the file
        // while it is open (see module docs).
        match unsafe { Mmap::map(&file) } {
            Ok(mmap) => Ok(Source::Mapped(mmap)),
            Err(e) if e.kind() == io::ErrorKind::Unsupported => {
                debug!(
                    "memory mapping unsupported for {}, reading {} bytes",
                    path.display(),
                    size
                );
                let mut data = Vec::with_capacity(size);
                (&file).read_to_end(&mut data).map_err(io_error)?;
                Ok(Source::Owned(data))
            }
            Err(e) => Err(MmdbError::Io(format!("mmap {}: {}", path.display(), e))),
        }
    }

    /// Whether the bytes are memory-mapped
    pub fn is_mapped(&self) -> bool {
        matches!(self, Source::Mapped(_))
    }

    /// The whole file
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Source::Owned(v) => v.as_slice(),
            Source::Mapped(m) => &m[..],
        }
    }
}

impl Deref for Source {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for Source {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl From<Vec<u8>> for Source {
    fn from(data: Vec<u8>) -> Self {
        Source::Owned(data)
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_mapped() { "Mapped" } else { "Owned" };
        f.debug_struct("Source")
            .field("kind", &kind)
            .field("len", &self.len())
            .finish()
    }
}
