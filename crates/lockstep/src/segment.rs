//! Named shared-memory segments.
//!
//! A segment is a file under `/dev/shm` mapped read-write. Its layout is
//! fixed: the Node control block at offset 0, the payload slot next, then
//! the bulk area for large payloads, each region cache-line aligned.
//! Creation is idempotent per address; reopening an existing segment with a
//! larger layout grows the file, never shrinks it. Unlinking removes the
//! name from the host while existing mappings stay valid until unmapped.

use crate::errors::LockstepError;
use crate::names;
use crate::node::Node;
use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::io;
use std::mem;
use std::os::unix::fs::OpenOptionsExt;

const REGION_ALIGN: usize = 64;

pub struct Segment {
    _mmap: MmapMut,
    base: *mut u8,
    len: usize,
    address: String,
}

unsafe impl Send for Segment {}

impl Segment {
    /// Open the segment backing `address`, creating it when absent. The
    /// file is grown to `size` bytes if it is smaller.
    pub fn open_or_create(address: &str, size: usize) -> Result<Self, LockstepError> {
        let path = names::segment_path(address)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .open(&path)?;

        if (file.metadata()?.len() as usize) < size {
            file.set_len(size as u64).map_err(|e| {
                if e.raw_os_error() == Some(libc::ENOSPC) {
                    LockstepError::InsufficientMemory(size)
                } else {
                    LockstepError::Io(e)
                }
            })?;
        }

        Self::map(file, address)
    }

    /// Strictly open an existing segment, mapping its current length.
    pub fn open_existing(address: &str) -> Result<Self, LockstepError> {
        let path = names::segment_path(address)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    LockstepError::SegmentNotFound(address.to_string())
                } else {
                    LockstepError::Io(e)
                }
            })?;

        Self::map(file, address)
    }

    fn map(file: std::fs::File, address: &str) -> Result<Self, LockstepError> {
        let len = file.metadata()?.len() as usize;
        let mut mmap = unsafe { MmapOptions::new().len(len).map_mut(&file)? };
        let base = mmap.as_mut_ptr();
        Ok(Self {
            _mmap: mmap,
            base,
            len,
            address: address.to_string(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn base(&self) -> *mut u8 {
        self.base
    }

    /// Remove the segment's name from the host. Mappings held by attached
    /// processes remain valid until each unmaps.
    pub fn unlink(address: &str) -> Result<(), LockstepError> {
        let path = names::segment_path(address)?;
        std::fs::remove_file(path)?;
        Ok(())
    }
}

/// Byte offsets of the three segment regions for payload type `T`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SegmentLayout {
    pub slot: usize,
    pub data: usize,
    pub total: usize,
}

pub(crate) fn layout<T>(payload_bytes: usize) -> SegmentLayout {
    let slot = align_up(mem::size_of::<Node>(), REGION_ALIGN);
    let data = align_up(slot + mem::size_of::<T>(), REGION_ALIGN);
    SegmentLayout {
        slot,
        data,
        total: data + payload_bytes,
    }
}

fn align_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}
