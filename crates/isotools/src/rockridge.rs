//! SUSP and Rock Ridge (RRIP) system-use entries.
//!
//! Rock Ridge rides in the system-use area of each directory record: an
//! `SP` indicator on the root `.` record, then per-record `PX` (POSIX
//! attributes), `NM` (alternate name) and the relocation triple `RE`/`CL`/
//! `PL` for directories moved out of over-deep hierarchies. In mkisofs
//! compatibility mode the deprecated `RR` overview entry is emitted and
//! `PX` uses the 36-byte RRIP v1.09 shape without the serial number.

use crate::config::RockRidgeConfig;
use crate::serialize::put_u32_both;

pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;

pub const DEFAULT_FILE_MODE: u32 = 0o644;
pub const DEFAULT_DIR_MODE: u32 = 0o755;

// RR entry flag bits (RRIP v1.09 4.3).
const RR_PX: u8 = 0x01;
const RR_NM: u8 = 0x08;
const RR_CL: u8 = 0x10;
const RR_PL: u8 = 0x20;
const RR_RE: u8 = 0x40;

/// Match a glob-style pattern (`*` and `?` wildcards) against a logical
/// path. `*` matches any run of characters including separators.
pub fn glob_match(pattern: &str, text: &str) -> bool {
  let pattern = pattern.as_bytes();
  let text = text.as_bytes();

  let (mut p, mut t) = (0, 0);
  let mut backtrack: Option<(usize, usize)> = None;

  while t < text.len() {
    if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == text[t]) {
      p += 1;
      t += 1;
    } else if p < pattern.len() && pattern[p] == b'*' {
      backtrack = Some((p, t));
      p += 1;
    } else if let Some((star, matched)) = backtrack {
      p = star + 1;
      t = matched + 1;
      backtrack = Some((star, matched + 1));
    } else {
      return false;
    }
  }

  while p < pattern.len() && pattern[p] == b'*' {
    p += 1;
  }

  p == pattern.len()
}

/// Resolve the POSIX mode for an entry. Patterns are consulted in
/// registration order and the first match wins; the file-type bits are
/// always forced onto the result.
pub fn resolve_mode(config: &RockRidgeConfig, logical_path: &str, is_directory: bool) -> u32 {
  let permissions = config
    .permissions()
    .iter()
    .find(|(pattern, _)| glob_match(pattern, logical_path))
    .map(|(_, mode)| *mode);

  let mode = permissions.unwrap_or(if is_directory {
    DEFAULT_DIR_MODE
  } else {
    DEFAULT_FILE_MODE
  });

  mode | if is_directory { S_IFDIR } else { S_IFREG }
}

/// Builds the system-use byte strings for one directory hierarchy.
pub struct SystemUseEntries {
  mkisofs_compatibility: bool,
}

impl SystemUseEntries {
  pub fn new(config: &RockRidgeConfig) -> Self {
    Self {
      mkisofs_compatibility: config.mkisofs_compatibility,
    }
  }

  fn px_extent(&self) -> usize {
    // v1.12 appends an 8-byte serial number dual field.
    if self.mkisofs_compatibility {
      36
    } else {
      44
    }
  }

  fn push_rr(&self, out: &mut Vec<u8>, flags: u8) {
    if self.mkisofs_compatibility {
      out.extend_from_slice(&[b'R', b'R', 5, 1, flags]);
    }
  }

  fn push_px(&self, out: &mut Vec<u8>, mode: u32, links: u32) {
    let len = self.px_extent();
    let start = out.len();
    out.resize(start + len, 0);

    let px = &mut out[start..];
    px[0] = b'P';
    px[1] = b'X';
    px[2] = len as u8;
    px[3] = 1;
    put_u32_both(px, 4, mode);
    put_u32_both(px, 12, links);
    put_u32_both(px, 20, 0); // uid
    put_u32_both(px, 28, 0); // gid
  }

  fn push_nm(&self, out: &mut Vec<u8>, name: &str) {
    let bytes = name.as_bytes();
    out.extend_from_slice(&[b'N', b'M', (5 + bytes.len()) as u8, 1, 0]);
    out.extend_from_slice(bytes);
  }

  fn push_re(&self, out: &mut Vec<u8>) {
    out.extend_from_slice(&[b'R', b'E', 4, 1]);
  }

  fn push_child_link(&self, out: &mut Vec<u8>, extent: u32) {
    let start = out.len();
    out.resize(start + 12, 0);
    let cl = &mut out[start..];
    cl[0] = b'C';
    cl[1] = b'L';
    cl[2] = 12;
    cl[3] = 1;
    put_u32_both(cl, 4, extent);
  }

  fn push_parent_link(&self, out: &mut Vec<u8>, extent: u32) {
    let start = out.len();
    out.resize(start + 12, 0);
    let pl = &mut out[start..];
    pl[0] = b'P';
    pl[1] = b'L';
    pl[2] = 12;
    pl[3] = 1;
    put_u32_both(pl, 4, extent);
  }

  /// Pad to an even length so the enclosing directory record stays even.
  fn finish(&self, mut out: Vec<u8>) -> Vec<u8> {
    if out.len() % 2 != 0 {
      out.push(0);
    }
    out
  }

  /// System use for the root directory's `.` record: the `SP` indicator
  /// announcing SUSP to readers, then the usual attributes.
  pub fn for_root_dot(&self, mode: u32, links: u32) -> Vec<u8> {
    let mut out = vec![b'S', b'P', 7, 1, 0xbe, 0xef, 0];
    self.push_rr(&mut out, RR_PX);
    self.push_px(&mut out, mode, links);
    self.finish(out)
  }

  /// System use for a non-root `.` record.
  pub fn for_dot(&self, mode: u32, links: u32) -> Vec<u8> {
    let mut out = vec![];
    self.push_rr(&mut out, RR_PX);
    self.push_px(&mut out, mode, links);
    self.finish(out)
  }

  /// System use for a `..` record. A relocated directory additionally
  /// carries a `PL` entry pointing at its original parent's extent.
  pub fn for_dot_dot(&self, mode: u32, links: u32, original_parent: Option<u32>) -> Vec<u8> {
    let mut out = vec![];
    let mut flags = RR_PX;
    if original_parent.is_some() {
      flags |= RR_PL;
    }

    self.push_rr(&mut out, flags);
    self.push_px(&mut out, mode, links);
    if let Some(extent) = original_parent {
      self.push_parent_link(&mut out, extent);
    }
    self.finish(out)
  }

  /// System use for a named child record. `relocated` marks a directory
  /// that was moved into the store (`RE`); `child_link` marks the
  /// zero-length placeholder left at its original location (`CL`).
  pub fn for_entry(
    &self,
    name: &str,
    mode: u32,
    links: u32,
    relocated: bool,
    child_link: Option<u32>,
  ) -> Vec<u8> {
    let mut out = vec![];
    let mut flags = RR_PX | RR_NM;
    if relocated {
      flags |= RR_RE;
    }
    if child_link.is_some() {
      flags |= RR_CL;
    }

    self.push_rr(&mut out, flags);
    self.push_px(&mut out, mode, links);
    self.push_nm(&mut out, name);
    if relocated {
      self.push_re(&mut out);
    }
    if let Some(extent) = child_link {
      self.push_child_link(&mut out, extent);
    }
    self.finish(out)
  }
}
