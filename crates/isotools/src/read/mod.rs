//! Reading existing ISO 9660 images.
//!
//! [`IsoFileSystem`] parses the volume descriptor sequence eagerly and
//! everything else lazily: directory extents are read as the entry
//! iterator reaches them, file content as an [`EntryReader`] is consumed.
//! The underlying source sits behind a mutex so multiple readers can share
//! it; each read seeks and reads as one atomic unit.

pub mod descriptors;
pub mod entry;

use std::io::{Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::prelude::*;

pub use descriptors::{ParsedDirectoryRecord, VolumeDescriptor, VolumeDescriptorSet};
pub use entry::{Entries, EntryReader, FileEntry};

pub(crate) struct Inner<R> {
  source: Mutex<R>,
  closed: AtomicBool,
  /// Recorded volume end in bytes; extents past it are corrupt.
  volume_end: u64,
}

impl<R: Read + Seek> Inner<R> {
  /// Read a whole extent into memory. The declared length is checked
  /// against the recorded volume size before any allocation, so a corrupt
  /// directory record cannot demand gigabytes.
  pub(crate) fn read_extent(&self, lba: u32, length: usize) -> Result<Vec<u8>> {
    let offset = lba as u64 * crate::spec::LOGICAL_BLOCK_SIZE as u64;
    if offset + length as u64 > self.volume_end {
      return Err(Error::Format(format!(
        "extent at sector {lba} ({length} bytes) extends past the recorded volume end"
      )));
    }

    let mut data = vec![0u8; length];
    let read = self.read_at(offset, &mut data)?;

    if read < length {
      return Err(Error::Format(format!(
        "extent at sector {lba} truncated: {read} of {length} bytes"
      )));
    }

    Ok(data)
  }

  /// Seek and read under the lock as one unit.
  pub(crate) fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
    if self.closed.load(Ordering::Acquire) {
      return Err(Error::Closed);
    }

    let mut source = self.source.lock().unwrap_or_else(|poison| poison.into_inner());
    source.seek(SeekFrom::Start(offset))?;

    let mut read = 0;
    while read < buf.len() {
      match source.read(&mut buf[read..])? {
        0 => break,
        n => read += n,
      }
    }

    Ok(read)
  }
}

/// An opened ISO 9660 image.
pub struct IsoFileSystem<R> {
  inner: Arc<Inner<R>>,
  descriptors: VolumeDescriptorSet,
}

impl<R: Read + Seek> IsoFileSystem<R> {
  /// Open an image, parsing its volume descriptor sequence.
  pub fn open(mut source: R) -> Result<Self> {
    source.seek(SeekFrom::Start(0))?;
    let descriptors = VolumeDescriptorSet::read(&mut source)?;

    log::debug!(
      "Opened image: volume {:?}, {} sectors, Joliet: {}",
      descriptors.primary.volume_identifier,
      descriptors.primary.volume_space_size,
      descriptors.supplementary.is_some()
    );

    Ok(Self {
      inner: Arc::new(Inner {
        source: Mutex::new(source),
        closed: AtomicBool::new(false),
        volume_end: descriptors.primary.volume_space_size as u64
          * crate::spec::LOGICAL_BLOCK_SIZE as u64,
      }),
      descriptors,
    })
  }

  pub fn descriptors(&self) -> &VolumeDescriptorSet {
    &self.descriptors
  }

  /// Iterate entries breadth-first, using Joliet names when the image has
  /// a recognized supplementary descriptor.
  pub fn entries(&self) -> Entries<R> {
    Entries::new(self.inner.clone(), self.descriptors.preferred().clone())
  }

  /// Iterate the plain ISO 9660 hierarchy regardless of Joliet presence.
  pub fn primary_entries(&self) -> Entries<R> {
    Entries::new(self.inner.clone(), self.descriptors.primary.clone())
  }

  /// Open a streaming reader over a file entry's content.
  pub fn open_entry(&self, entry: &FileEntry) -> Result<EntryReader<R>> {
    if entry.directory {
      return Err(Error::NotAFile(entry.path.clone().into()));
    }

    Ok(EntryReader::new(self.inner.clone(), entry))
  }

  /// Close the filesystem. Existing readers and iterators fail with
  /// [`Error::Closed`] from then on.
  pub fn close(&self) {
    self.inner.closed.store(true, Ordering::Release);
  }

  pub fn is_closed(&self) -> bool {
    self.inner.closed.load(Ordering::Acquire)
  }
}
