//! Memory-mapped backing storage for the scrolling buffer.

use crate::error::{Result, WeirError};
use memmap2::MmapMut;
use std::path::{Path, PathBuf};

/// A contiguous memory-mapped file divided into `slot_count` windows of
/// `slot_size` bytes each.
///
/// The backing file is anonymous in spirit: it gets a unique name in the
/// caller's directory, never outlives the buffer, and is unlinked by
/// [`Segment::remove`] at shutdown. The file handle is dropped right after
/// mapping; the mapping keeps the file contents live.
pub(crate) struct Segment {
    path: PathBuf,
    map: MmapMut,
    slot_size: usize,
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("path", &self.path)
            .field("slot_size", &self.slot_size)
            .finish_non_exhaustive()
    }
}

impl Segment {
    /// Create the backing file in `dir` and map it read-write.
    ///
    /// On any failure after the file exists, the file is cleaned up; cleanup
    /// errors are appended to the returned error.
    pub(crate) fn create(dir: &Path, slot_size: usize, slot_count: usize) -> Result<Segment> {
        let file = tempfile::Builder::new()
            .prefix(".scroll-")
            .tempfile_in(dir)
            .map_err(|e| WeirError::BufferCreate {
                dir: dir.to_path_buf(),
                cause: e.to_string(),
            })?;

        let len = (slot_size as u64) * (slot_count as u64);
        if let Err(e) = file.as_file().set_len(len) {
            return Err(Self::create_failed(file, e));
        }

        // SAFETY: the file is exclusively ours (fresh temp file) and stays
        // untouched on disk until `remove` unlinks it.
        let map = match unsafe { MmapMut::map_mut(file.as_file()) } {
            Ok(map) => map,
            Err(e) => return Err(Self::create_failed(file, e)),
        };

        // Persist the file past the handle; the descriptor is closed here.
        // The mapping keeps the inode alive until `remove`.
        let path = match file.keep() {
            Ok((handle, path)) => {
                drop(handle);
                path
            }
            Err(e) => {
                return Err(WeirError::BufferCreate {
                    dir: dir.to_path_buf(),
                    cause: e.to_string(),
                });
            }
        };

        Ok(Segment {
            path,
            map,
            slot_size,
        })
    }

    fn create_failed(file: tempfile::NamedTempFile, e: std::io::Error) -> WeirError {
        let path = file.path().to_path_buf();
        let cause = match file.close() {
            Ok(()) => e.to_string(),
            Err(cleanup) => format!("{e} (suppressed: {cleanup})"),
        };
        WeirError::BufferMap { path, cause }
    }

    /// The bytes of slot `index`.
    pub(crate) fn slot(&self, index: usize) -> &[u8] {
        let start = index * self.slot_size;
        &self.map[start..start + self.slot_size]
    }

    /// The bytes of slot `index`, writable.
    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut [u8] {
        let start = index * self.slot_size;
        &mut self.map[start..start + self.slot_size]
    }

    /// Release the mapping and unlink the backing file.
    pub(crate) fn remove(self) -> Result<()> {
        let Segment { path, map, .. } = self;
        drop(map);
        std::fs::remove_file(&path).map_err(|e| WeirError::BufferRemove {
            path,
            cause: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_sizes_and_removes_file() {
        let dir = tempdir().unwrap();

        let seg = Segment::create(dir.path(), 16, 4).unwrap();
        let path = seg.path.clone();
        assert!(path.exists());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 64);

        seg.remove().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn slots_are_disjoint_windows() {
        let dir = tempdir().unwrap();

        let mut seg = Segment::create(dir.path(), 4, 2).unwrap();
        seg.slot_mut(0).copy_from_slice(b"aaaa");
        seg.slot_mut(1).copy_from_slice(b"bbbb");

        assert_eq!(seg.slot(0), b"aaaa");
        assert_eq!(seg.slot(1), b"bbbb");
        seg.remove().unwrap();
    }

    #[test]
    fn create_in_missing_dir_fails() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");

        let err = Segment::create(&missing, 16, 2).unwrap_err();
        assert_eq!(err.code(), "E001");
    }
}
