//! Parsing the volume descriptor sequence of an existing image.

use std::io::Read;

use crate::prelude::*;
use crate::serialize::{
  get_str_field, get_u16_both, get_u32_both, get_u32_le, AsciiDateTime, RecordedDateTime,
  TextEncoding,
};
use crate::spec::{escape_sequences, FileFlags, VolumeDescriptorType, LOGICAL_BLOCK_SIZE};

/// A parsed Primary or Supplementary volume descriptor.
#[derive(Debug, Clone)]
pub struct VolumeDescriptor {
  pub encoding: TextEncoding,
  pub system_identifier: String,
  pub volume_identifier: String,
  pub volume_space_size: u32,
  pub logical_block_size: u16,
  pub path_table_size: u32,
  pub type_l_path_table_location: u32,
  pub type_m_path_table_location: u32,
  pub root: ParsedDirectoryRecord,
  pub volume_set_identifier: String,
  pub publisher_identifier: String,
  pub data_preparer_identifier: String,
  pub application_identifier: String,
  pub creation_date: AsciiDateTime,
  pub modification_date: AsciiDateTime,
}

/// One directory record as read off disc.
#[derive(Debug, Clone)]
pub struct ParsedDirectoryRecord {
  pub length: u8,
  pub extent_location: u32,
  pub data_length: u32,
  pub recording_date: RecordedDateTime,
  pub file_flags: FileFlags,
  pub identifier: Vec<u8>,
}

impl ParsedDirectoryRecord {
  /// Parse the record starting at `buf[0]`. A zero length byte means there
  /// is no record here.
  pub fn parse(buf: &[u8]) -> Result<Option<Self>> {
    let length = buf[0];
    if length == 0 {
      return Ok(None);
    }

    if (length as usize) > buf.len() || length < 34 {
      return Err(Error::Format(format!(
        "directory record length {length} out of bounds"
      )));
    }

    let identifier_len = buf[32] as usize;
    if 33 + identifier_len > length as usize {
      return Err(Error::Format(format!(
        "directory record identifier overruns the record ({identifier_len} bytes)"
      )));
    }

    Ok(Some(Self {
      length,
      extent_location: get_u32_both(buf, 2),
      data_length: get_u32_both(buf, 10),
      recording_date: RecordedDateTime::decode(&buf[18..25]),
      file_flags: FileFlags::from_bits_retain(buf[25]),
      identifier: buf[33..33 + identifier_len].to_vec(),
    }))
  }

  pub fn is_directory(&self) -> bool {
    self.file_flags.contains(FileFlags::DIRECTORY)
  }

  /// Whether this is the `.` or `..` record of its directory.
  pub fn is_self_or_parent(&self) -> bool {
    self.identifier == [0] || self.identifier == [1]
  }

  /// Decode the identifier to a name, dropping any `;n` version suffix.
  pub fn name(&self, encoding: TextEncoding) -> String {
    let decoded = match self.identifier.as_slice() {
      [0] => return ".".into(),
      [1] => return "..".into(),
      bytes => get_str_field(bytes, 0, bytes.len(), encoding),
    };

    match decoded.split_once(';') {
      Some((name, _)) => name.to_string(),
      None => decoded,
    }
  }
}

fn parse_standard(buf: &[u8], encoding: TextEncoding) -> Result<VolumeDescriptor> {
  let logical_block_size = get_u16_both(buf, 128);
  if logical_block_size != LOGICAL_BLOCK_SIZE {
    return Err(Error::Format(format!(
      "unsupported logical block size: {logical_block_size}"
    )));
  }

  let root = ParsedDirectoryRecord::parse(&buf[156..190])?
    .ok_or_else(|| Error::Format("descriptor carries no root directory record".into()))?;

  Ok(VolumeDescriptor {
    encoding,
    system_identifier: get_str_field(buf, 8, 32, encoding),
    volume_identifier: get_str_field(buf, 40, 32, encoding),
    volume_space_size: get_u32_both(buf, 80),
    logical_block_size,
    path_table_size: get_u32_both(buf, 132),
    type_l_path_table_location: get_u32_le(buf, 140),
    type_m_path_table_location: crate::serialize::get_u32_be(buf, 148),
    root,
    volume_set_identifier: get_str_field(buf, 190, 128, encoding),
    publisher_identifier: get_str_field(buf, 318, 128, encoding),
    data_preparer_identifier: get_str_field(buf, 446, 128, encoding),
    application_identifier: get_str_field(buf, 574, 128, encoding),
    creation_date: AsciiDateTime::decode(&buf[813..830]),
    modification_date: AsciiDateTime::decode(&buf[830..847]),
  })
}

/// The recognized descriptors of one image.
#[derive(Debug, Clone)]
pub struct VolumeDescriptorSet {
  pub primary: VolumeDescriptor,
  /// First supplementary descriptor with a recognized UCS-2 escape
  /// sequence, if any.
  pub supplementary: Option<VolumeDescriptor>,
  /// Boot catalog location from an El Torito boot record, if any.
  pub boot_catalog_location: Option<u32>,
}

impl VolumeDescriptorSet {
  /// Read descriptors starting at sector 16 until the set terminator.
  /// The first primary and first recognized supplementary descriptor win;
  /// duplicates and unrecognized descriptors are skipped with a warning.
  pub fn read<R: Read>(source: &mut R) -> Result<Self> {
    let mut primary = None;
    let mut supplementary = None;
    let mut boot_catalog_location = None;

    let mut skip = vec![0u8; 16 * LOGICAL_BLOCK_SIZE as usize];
    source.read_exact(&mut skip)?;

    let mut buf = vec![0u8; LOGICAL_BLOCK_SIZE as usize];
    loop {
      source.read_exact(&mut buf)?;

      if &buf[1..6] != b"CD001" {
        return Err(Error::Format(format!(
          "unknown standard identifier: {:?}",
          &buf[1..6]
        )));
      }

      match VolumeDescriptorType::from(buf[0]) {
        VolumeDescriptorType::Primary => {
          if primary.is_some() {
            log::warn!("Duplicate primary volume descriptor, keeping the first");
            continue;
          }
          primary = Some(parse_standard(&buf, TextEncoding::Ascii)?);
        }
        VolumeDescriptorType::Supplementary => {
          if !escape_sequences::recognized(&buf[88..120]) {
            log::warn!(
              "Skipping supplementary descriptor with unrecognized escape sequences: {:?}",
              &buf[88..91]
            );
            continue;
          }
          if supplementary.is_some() {
            log::warn!("Duplicate supplementary volume descriptor, keeping the first");
            continue;
          }
          supplementary = Some(parse_standard(&buf, TextEncoding::Ucs2Be)?);
        }
        VolumeDescriptorType::BootRecord => {
          boot_catalog_location = Some(get_u32_le(&buf, 71));
        }
        VolumeDescriptorType::Terminator => break,
        other => {
          log::warn!("Skipping unhandled volume descriptor: {other:?}");
        }
      }
    }

    let primary = primary.ok_or_else(|| {
      Error::Format("descriptor set terminated without a primary volume descriptor".into())
    })?;

    Ok(Self {
      primary,
      supplementary,
      boot_catalog_location,
    })
  }

  /// The descriptor to browse: Joliet names when available, plain ISO 9660
  /// otherwise.
  pub fn preferred(&self) -> &VolumeDescriptor {
    self.supplementary.as_ref().unwrap_or(&self.primary)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::serialize::{put_u16_both, put_u32_both};

  fn block(descriptor_type: u8) -> Vec<u8> {
    let mut buf = vec![0u8; 2048];
    buf[0] = descriptor_type;
    buf[1..6].copy_from_slice(b"CD001");
    buf[6] = 1;
    buf
  }

  fn standard_block(descriptor_type: u8) -> Vec<u8> {
    let mut buf = block(descriptor_type);
    put_u16_both(&mut buf, 128, 2048);
    buf[156] = 34;
    put_u32_both(&mut buf[156..], 2, 23);
    put_u32_both(&mut buf[156..], 10, 2048);
    buf[156 + 25] = 2;
    buf[156 + 32] = 1;
    buf
  }

  fn image(blocks: Vec<Vec<u8>>) -> Vec<u8> {
    let mut image = vec![0u8; 16 * 2048];
    for block in blocks {
      image.extend_from_slice(&block);
    }
    image
  }

  #[test]
  fn terminator_before_primary_is_fatal() {
    let image = image(vec![block(255)]);
    let error = VolumeDescriptorSet::read(&mut image.as_slice()).unwrap_err();
    assert!(matches!(error, Error::Format(_)));
  }

  #[test]
  fn nonstandard_block_size_is_fatal() {
    let mut primary = standard_block(1);
    put_u16_both(&mut primary, 128, 4096);

    let image = image(vec![primary, block(255)]);
    assert!(VolumeDescriptorSet::read(&mut image.as_slice()).is_err());
  }

  #[test]
  fn unrecognized_supplementary_is_skipped() {
    let mut bogus = standard_block(2);
    bogus[88..91].copy_from_slice(b"%/Z");

    let image = image(vec![standard_block(1), bogus, block(255)]);
    let set = VolumeDescriptorSet::read(&mut image.as_slice()).unwrap();
    assert!(set.supplementary.is_none());
  }

  #[test]
  fn level_2_escape_sequences_are_recognized() {
    let mut joliet = standard_block(2);
    joliet[88..91].copy_from_slice(b"%/C");

    let image = image(vec![standard_block(1), joliet, block(255)]);
    let set = VolumeDescriptorSet::read(&mut image.as_slice()).unwrap();
    assert!(set.supplementary.is_some());
    assert_eq!(set.preferred().encoding, TextEncoding::Ucs2Be);
  }

  #[test]
  fn first_primary_wins() {
    let mut first = standard_block(1);
    put_u32_both(&mut first, 80, 111);
    let mut second = standard_block(1);
    put_u32_both(&mut second, 80, 222);

    let image = image(vec![first, second, block(255)]);
    let set = VolumeDescriptorSet::read(&mut image.as_slice()).unwrap();
    assert_eq!(set.primary.volume_space_size, 111);
  }

  #[test]
  fn boot_record_location_is_captured() {
    let mut boot = block(0);
    boot[71..75].copy_from_slice(&19u32.to_le_bytes());

    let image = image(vec![standard_block(1), boot, block(255)]);
    let set = VolumeDescriptorSet::read(&mut image.as_slice()).unwrap();
    assert_eq!(set.boot_catalog_location, Some(19));
  }

  #[test]
  fn version_suffix_is_stripped_from_names() {
    let record = ParsedDirectoryRecord {
      length: 44,
      extent_location: 30,
      data_length: 5,
      recording_date: RecordedDateTime::decode(&[0; 7]),
      file_flags: FileFlags::empty(),
      identifier: b"HELLO.TXT;1".to_vec(),
    };
    assert_eq!(record.name(TextEncoding::Ascii), "HELLO.TXT");
  }
}
