//! Breadth-first entry iteration and lazy file content access.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::prelude::*;
use crate::read::descriptors::{ParsedDirectoryRecord, VolumeDescriptor};
use crate::read::Inner;
use crate::serialize::RecordedDateTime;
use crate::spec::LOGICAL_BLOCK_SIZE;

/// One entry of the image, resolved against the browsed hierarchy.
#[derive(Debug, Clone)]
pub struct FileEntry {
  /// Decoded name with any version suffix dropped; empty for the root.
  pub name: String,
  /// Slash-separated path from the root; empty for the root itself.
  pub path: String,
  pub extent_location: u32,
  pub data_length: u32,
  pub directory: bool,
  pub recording_date: RecordedDateTime,
}

struct DirectoryData {
  data: Vec<u8>,
  offset: usize,
  path: String,
}

/// Iterates the entries of one directory hierarchy breadth-first, root
/// first. Directory extents are read on demand, one at a time.
pub struct Entries<R> {
  inner: Arc<Inner<R>>,
  descriptor: VolumeDescriptor,
  queue: VecDeque<(u32, u32, String)>,
  current: Option<DirectoryData>,
  yielded_root: bool,
  failed: bool,
}

impl<R> Entries<R> {
  pub(crate) fn new(inner: Arc<Inner<R>>, descriptor: VolumeDescriptor) -> Self {
    Self {
      inner,
      descriptor,
      queue: VecDeque::new(),
      current: None,
      yielded_root: false,
      failed: false,
    }
  }

  /// Advance to the next record in the current directory extent. A zero
  /// length byte either marks the sector-padding tail (rest of the sector
  /// is zero) or a gap to scan past. A nonzero length byte that does not
  /// parse as a record is leftover garbage in such a gap and is discarded.
  fn next_record(dir: &mut DirectoryData) -> Option<ParsedDirectoryRecord> {
    let sector = LOGICAL_BLOCK_SIZE as usize;

    while dir.offset < dir.data.len() {
      if dir.data[dir.offset] == 0 {
        let sector_end = ((dir.offset / sector) + 1) * sector;
        let sector_end = sector_end.min(dir.data.len());

        if dir.data[dir.offset..sector_end].iter().all(|b| *b == 0) {
          dir.offset = sector_end;
        } else {
          dir.offset += 2;
        }
        continue;
      }

      match ParsedDirectoryRecord::parse(&dir.data[dir.offset..]) {
        Ok(Some(record)) => {
          dir.offset += record.length as usize;
          return Some(record);
        }
        Ok(None) => {}
        Err(error) => {
          log::warn!(
            "Discarding malformed directory record in {:?}: {error}",
            dir.path
          );
          dir.offset += 2;
        }
      }
    }

    None
  }
}

impl<R: std::io::Read + std::io::Seek> Iterator for Entries<R> {
  type Item = Result<FileEntry>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.failed {
      return None;
    }

    if !self.yielded_root {
      self.yielded_root = true;
      let root = &self.descriptor.root;
      self
        .queue
        .push_back((root.extent_location, root.data_length, String::new()));

      return Some(Ok(FileEntry {
        name: String::new(),
        path: String::new(),
        extent_location: root.extent_location,
        data_length: root.data_length,
        directory: true,
        recording_date: root.recording_date,
      }));
    }

    loop {
      if let Some(dir) = &mut self.current {
        match Self::next_record(dir) {
          Some(record) => {
            if record.is_self_or_parent() {
              continue;
            }

            let name = record.name(self.descriptor.encoding);
            let path = if dir.path.is_empty() {
              name.clone()
            } else {
              format!("{}/{}", dir.path, name)
            };

            if record.is_directory() {
              self
                .queue
                .push_back((record.extent_location, record.data_length, path.clone()));
            }

            return Some(Ok(FileEntry {
              name,
              path,
              extent_location: record.extent_location,
              data_length: record.data_length,
              directory: record.is_directory(),
              recording_date: record.recording_date,
            }));
          }
          None => {
            self.current = None;
          }
        }
      }

      let (extent, length, path) = self.queue.pop_front()?;
      match self.inner.read_extent(extent, length as usize) {
        Ok(data) => {
          self.current = Some(DirectoryData {
            data,
            offset: 0,
            path,
          });
        }
        Err(error) => {
          self.failed = true;
          return Some(Err(error));
        }
      }
    }
  }
}

/// Streaming reader over one file entry's extent.
///
/// Each `read` seeks and reads under the filesystem lock as one unit, so
/// multiple readers can interleave safely on the same underlying source.
pub struct EntryReader<R> {
  inner: Arc<Inner<R>>,
  base: u64,
  position: u64,
  remaining: u64,
}

impl<R> EntryReader<R> {
  pub(crate) fn new(inner: Arc<Inner<R>>, entry: &FileEntry) -> Self {
    Self {
      inner,
      base: entry.extent_location as u64 * LOGICAL_BLOCK_SIZE as u64,
      position: 0,
      remaining: entry.data_length as u64,
    }
  }

  /// Bytes left to read.
  pub fn remaining(&self) -> u64 {
    self.remaining
  }
}

impl<R: std::io::Read + std::io::Seek> std::io::Read for EntryReader<R> {
  fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
    if self.remaining == 0 || buf.is_empty() {
      return Ok(0);
    }

    let want = (buf.len() as u64).min(self.remaining) as usize;
    let read = self
      .inner
      .read_at(self.base + self.position, &mut buf[..want])
      .map_err(std::io::Error::other)?;

    self.position += read as u64;
    self.remaining -= read as u64;
    Ok(read)
  }
}
