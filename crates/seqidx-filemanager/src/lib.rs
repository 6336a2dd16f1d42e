//! # seqidx-filemanager — the File Manager and atomic three-rename flip
//!
//! Owns the three paths (`P_index`, `P_writable`, `P_passing`) and the two
//! memory-mapped files backing them. The rename discipline is write-to-tmp,
//! fsync, rename, with a documented fallback when rename fails, extended
//! from a single rename to a three-rename passing-place dance so a crash
//! between any two of the renames still leaves a recoverable file on disk.

use byteorder::{ByteOrder, LittleEndian};
use memmap2::MmapMut;
use seqidx_format::{ConstructionError, ErrorSink, IndexError, MessageHeader, CHECKSUM_SIZE};
use seqidx_sector::SectorFramer;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileManagerError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("rename failed: {src} -> {dst}")]
    RenameFailed { src: String, dst: String },
}

impl FileManagerError {
    /// Projects this error onto the [`IndexError`] vocabulary the sink
    /// understands, when it corresponds to one of its named kinds.
    #[must_use]
    pub fn as_index_error(&self) -> Option<IndexError> {
        match self {
            FileManagerError::RenameFailed { src, dst } => Some(IndexError::RenameFailed {
                src: src.clone(),
                dst: dst.clone(),
            }),
            FileManagerError::Io(_) => None,
        }
    }
}

/// Which path the recovered buffer was actually read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySource {
    /// `P_index` held a valid, non-blank buffer.
    Index,
    /// `P_index` was missing but `P_passing` survived a crash between the
    /// first and second rename of a prior flip.
    PassingPlace,
    /// Neither file held prior data; a fresh blank buffer was created.
    Blank,
}

pub struct RecoveryOutcome {
    pub source: RecoverySource,
    pub schema_mismatch: bool,
}

pub struct FileManager {
    index_path: PathBuf,
    writable_path: PathBuf,
    passing_path: PathBuf,
    file_capacity: u64,
    index_mmap: Option<MmapMut>,
    writable_mmap: Option<MmapMut>,
}

impl FileManager {
    #[must_use]
    pub fn passing_place(&self) -> &Path {
        &self.passing_path
    }

    #[must_use]
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    #[must_use]
    pub fn writable_path(&self) -> &Path {
        &self.writable_path
    }

    fn sibling(base: &Path, suffix: &str) -> PathBuf {
        let mut name = base.as_os_str().to_owned();
        name.push(".");
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Opens the index at `index_path`, recovering from whichever of the
    /// three passing-place files are present on disk, and returns the
    /// manager plus the recovered (or freshly blanked) buffer bytes, ready
    /// to seed a writer's in-memory buffer.
    pub fn open_or_recover(
        index_path: impl Into<PathBuf>,
        file_capacity: u64,
        record_region_len: u64,
        position_region_len: u64,
        sink: &dyn ErrorSink,
    ) -> Result<(Self, Vec<u8>, RecoveryOutcome), ConstructionError> {
        let index_path = index_path.into();
        let writable_path = Self::sibling(&index_path, "write");
        let passing_path = Self::sibling(&index_path, "passing");

        Self::recover(
            index_path,
            writable_path,
            passing_path,
            file_capacity,
            record_region_len,
            position_region_len,
            sink,
        )
    }

    fn recover(
        index_path: PathBuf,
        writable_path: PathBuf,
        passing_path: PathBuf,
        file_capacity: u64,
        record_region_len: u64,
        position_region_len: u64,
        sink: &dyn ErrorSink,
    ) -> Result<(Self, Vec<u8>, RecoveryOutcome), ConstructionError> {
        if index_path.exists() {
            let bytes = fs::read(&index_path).map_err(|_| ConstructionError::SizeMismatch {
                disk: 0,
                memory: file_capacity,
            })?;
            if bytes.len() as u64 != file_capacity {
                return Err(ConstructionError::SizeMismatch {
                    disk: bytes.len() as u64,
                    memory: file_capacity,
                });
            }

            let header = MessageHeader::read_from(&bytes);
            let first_sector_checksum =
                LittleEndian::read_u32(&bytes[record_first_checksum_offset()..]);
            let looks_populated = !header.is_zero() || first_sector_checksum != 0;

            let schema_mismatch = looks_populated && !header.matches_current();
            if schema_mismatch {
                sink.on_error(IndexError::SchemaMismatch {
                    found: header,
                    expected: MessageHeader::current(),
                });
            }

            if !writable_path.exists() {
                let blank = Self::blank_buffer(file_capacity, record_region_len, position_region_len);
                Self::write_whole_file(&writable_path, &blank)?;
            }

            let (index_mmap, writable_mmap) =
                Self::open_both(&index_path, &writable_path, file_capacity)?;

            let manager = FileManager {
                index_path,
                writable_path,
                passing_path,
                file_capacity,
                index_mmap: Some(index_mmap),
                writable_mmap: Some(writable_mmap),
            };

            let source = if looks_populated && !schema_mismatch {
                RecoverySource::Index
            } else {
                RecoverySource::Blank
            };
            let bytes = if schema_mismatch {
                Self::blank_buffer(file_capacity, record_region_len, position_region_len)
            } else {
                bytes
            };

            return Ok((
                manager,
                bytes,
                RecoveryOutcome {
                    source,
                    schema_mismatch,
                },
            ));
        }

        if passing_path.exists() {
            fs::rename(&passing_path, &index_path).map_err(|_| ConstructionError::SizeMismatch {
                disk: 0,
                memory: file_capacity,
            })?;
            Self::fsync_parent(&index_path);
            let (manager, bytes, mut outcome) = Self::recover(
                index_path,
                writable_path,
                passing_path,
                file_capacity,
                record_region_len,
                position_region_len,
                sink,
            )?;
            if matches!(outcome.source, RecoverySource::Index) {
                outcome.source = RecoverySource::PassingPlace;
            }
            return Ok((manager, bytes, outcome));
        }

        // Brand new: neither file exists. Create both, blank.
        let blank = Self::blank_buffer(file_capacity, record_region_len, position_region_len);
        Self::write_whole_file(&index_path, &blank)?;
        Self::write_whole_file(&writable_path, &blank)?;
        Self::fsync_parent(&index_path);

        let (index_mmap, writable_mmap) = Self::open_both(&index_path, &writable_path, file_capacity)?;
        let manager = FileManager {
            index_path,
            writable_path,
            passing_path,
            file_capacity,
            index_mmap: Some(index_mmap),
            writable_mmap: Some(writable_mmap),
        };

        Ok((
            manager,
            blank,
            RecoveryOutcome {
                source: RecoverySource::Blank,
                schema_mismatch: false,
            },
        ))
    }

    fn open_both(
        index_path: &Path,
        writable_path: &Path,
        file_capacity: u64,
    ) -> Result<(MmapMut, MmapMut), ConstructionError> {
        let index_mmap = Self::open_mmap(index_path, file_capacity)?;
        let writable_mmap = Self::open_mmap(writable_path, file_capacity)?;
        Ok((index_mmap, writable_mmap))
    }

    fn open_mmap(path: &Path, file_capacity: u64) -> Result<MmapMut, ConstructionError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|_| ConstructionError::SizeMismatch {
                disk: 0,
                memory: file_capacity,
            })?;
        // SAFETY: the file is exclusively owned by this process for the
        // index's lifetime; no other process or thread truncates it while
        // mapped.
        unsafe {
            MmapMut::map_mut(&file).map_err(|_| ConstructionError::SizeMismatch {
                disk: 0,
                memory: file_capacity,
            })
        }
    }

    fn write_whole_file(path: &Path, bytes: &[u8]) -> Result<(), ConstructionError> {
        let mut file = File::create(path).map_err(|_| ConstructionError::SizeMismatch {
            disk: 0,
            memory: bytes.len() as u64,
        })?;
        file.write_all(bytes).map_err(|_| ConstructionError::SizeMismatch {
            disk: 0,
            memory: bytes.len() as u64,
        })?;
        file.sync_all().ok();
        Ok(())
    }

    /// Builds a brand-new blank buffer: the message header plus
    /// well-formed (valid-checksum) empty sectors across both regions.
    #[must_use]
    pub fn blank_buffer(file_capacity: u64, record_region_len: u64, position_region_len: u64) -> Vec<u8> {
        debug_assert_eq!(record_region_len + position_region_len, file_capacity);
        let mut buf = vec![0u8; file_capacity as usize];
        MessageHeader::current().write_to(&mut buf[..seqidx_format::MESSAGE_HEADER_SIZE]);

        let mut record_framer =
            SectorFramer::with_default_sector_size(0, record_region_len as usize);
        for sector_start in (0..record_region_len as usize).step_by(record_framer.sector_size()) {
            record_framer.mark_dirty(sector_start);
        }
        record_framer.update_checksums(&mut buf[0..record_region_len as usize]);

        let mut position_framer = SectorFramer::with_default_sector_size(
            record_region_len as usize,
            position_region_len as usize,
        );
        for sector_start in (0..position_region_len as usize).step_by(position_framer.sector_size()) {
            position_framer.mark_dirty(sector_start);
        }
        position_framer.update_checksums(&mut buf[record_region_len as usize..]);

        buf
    }

    /// Copies `buffer` into the `writable` mapping, fsyncs it, then
    /// performs the three-rename flip, swapping (POSIX) or reopening
    /// (Windows) the mapped-file handles on success. On any rename
    /// failure the flip is aborted, the handles are left unswapped, and
    /// the error is returned for the caller to route to the error sink.
    pub fn flush(&mut self, buffer: &[u8]) -> Result<(), FileManagerError> {
        debug_assert_eq!(buffer.len(), self.file_capacity as usize);
        {
            let writable = self
                .writable_mmap
                .as_mut()
                .expect("writable mapping missing outside a flip");
            writable.copy_from_slice(buffer);
            writable.flush()?;
        }

        #[cfg(windows)]
        {
            // Windows refuses to rename a file that is still memory-mapped;
            // unmap both before the rename dance.
            self.index_mmap = None;
            self.writable_mmap = None;
        }

        let flip_result = self.rename_flip();

        #[cfg(windows)]
        {
            // A failed flip can leave one of `index_path`/`writable_path`
            // missing partway through the rename sequence; restore the
            // canonical two-file layout from `passing_path` before
            // remapping, so a later flush can retry instead of finding
            // both handles permanently gone.
            if flip_result.is_err() {
                self.reconcile_paths_after_failed_flip();
            }
            let index = Self::open_mmap(&self.index_path, self.file_capacity);
            let writable = Self::open_mmap(&self.writable_path, self.file_capacity);
            if let (Ok(index), Ok(writable)) = (index, writable) {
                self.index_mmap = Some(index);
                self.writable_mmap = Some(writable);
            }
        }

        flip_result?;

        #[cfg(not(windows))]
        {
            // On POSIX, renaming an open-mapped file is legal and does not
            // disturb the mapping; the roles simply swap.
            std::mem::swap(&mut self.index_mmap, &mut self.writable_mmap);
        }

        Ok(())
    }

    /// Restores a two-file layout after `rename_flip` failed partway
    /// through its three renames, by inspecting which of the three paths
    /// actually exist — the same reasoning `open_or_recover` applies at
    /// construction time, applied here in-process instead of across a
    /// restart.
    #[cfg(windows)]
    fn reconcile_paths_after_failed_flip(&self) {
        let index_exists = self.index_path.exists();
        let writable_exists = self.writable_path.exists();
        let passing_exists = self.passing_path.exists();

        if !index_exists && passing_exists {
            // Rename 1 (index -> passing) succeeded, rename 2 failed:
            // restore the canonical path.
            let _ = fs::rename(&self.passing_path, &self.index_path);
        } else if !writable_exists && passing_exists {
            // Renames 1 and 2 succeeded, rename 3 failed: the flip's data
            // effect already landed at `index_path`; just restore the
            // scratch file.
            let _ = fs::rename(&self.passing_path, &self.writable_path);
        }
    }

    fn rename_flip(&self) -> Result<(), FileManagerError> {
        Self::rename(&self.index_path, &self.passing_path)?;
        Self::fsync_parent(&self.index_path);
        Self::rename(&self.writable_path, &self.index_path)?;
        Self::fsync_parent(&self.index_path);
        Self::rename(&self.passing_path, &self.writable_path)?;
        Self::fsync_parent(&self.index_path);
        Ok(())
    }

    fn rename(src: &Path, dst: &Path) -> Result<(), FileManagerError> {
        fs::rename(src, dst).map_err(|_| FileManagerError::RenameFailed {
            src: src.display().to_string(),
            dst: dst.display().to_string(),
        })
    }

    /// Best-effort directory fsync after a rename phase, closing the gap
    /// where a crash before the directory entry reaches disk could lose the
    /// rename itself. A failure here is not itself a flip failure — it is a
    /// best-effort durability hardening step, not a correctness requirement
    /// of the rename itself.
    #[cfg(not(windows))]
    fn fsync_parent(path: &Path) {
        if let Some(parent) = path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }
    }

    #[cfg(windows)]
    fn fsync_parent(_path: &Path) {
        // Windows has no portable directory-fsync equivalent; NTFS
        // metadata journaling covers rename durability instead.
    }
}

fn record_first_checksum_offset() -> usize {
    // Sector 0's checksum trailer sits at the end of its payload.
    seqidx_format::SECTOR_SIZE - CHECKSUM_SIZE
}

#[cfg(test)]
mod tests;
