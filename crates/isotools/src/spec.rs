//! On-disc ISO 9660 structures and their byte-exact serialization.
//!
//! Field offsets follow ECMA-119 byte positions (1-based in the standard,
//! 0-based here). Volume descriptors occupy one 2048-byte logical block
//! each, starting after the 16 reserved system blocks.

use crate::prelude::*;
use crate::serialize::{
  self, AsciiDateTime, Endianness, IsoSerialize, RecordedDateTime, TextEncoding,
};

/// ISO 9660 logical block size. Declared in every volume descriptor; the
/// reader rejects images declaring anything else.
pub const LOGICAL_BLOCK_SIZE: u16 = 2048;

/// Blocks reserved for the system area at the start of the image.
pub const RESERVED_BLOCKS: u32 = 16;

/// Informational path length ceiling (ISO 9660 6.8.2.1).
pub const MAX_PATH_LENGTH: usize = 255;

/// Fixed extent of a `.`/`..`/root directory record.
pub const SELF_RECORD_EXTENT: usize = 34;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardIdentifier {
  /// Standard ISO 9660 identifier; "CD001".
  Cd001,
  /// Any other identifier.
  Other([u8; 5]),
}

impl StandardIdentifier {
  pub fn as_bytes(&self) -> &[u8; 5] {
    match self {
      StandardIdentifier::Cd001 => b"CD001",
      StandardIdentifier::Other(v) => v,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeDescriptorType {
  BootRecord,
  Primary,
  Supplementary,
  Partition,
  Terminator,
  Other(u8),
}

impl From<u8> for VolumeDescriptorType {
  fn from(v: u8) -> Self {
    match v {
      0 => VolumeDescriptorType::BootRecord,
      1 => VolumeDescriptorType::Primary,
      2 => VolumeDescriptorType::Supplementary,
      3 => VolumeDescriptorType::Partition,
      255 => VolumeDescriptorType::Terminator,
      v => VolumeDescriptorType::Other(v),
    }
  }
}

impl From<VolumeDescriptorType> for u8 {
  fn from(v: VolumeDescriptorType) -> u8 {
    match v {
      VolumeDescriptorType::BootRecord => 0,
      VolumeDescriptorType::Primary => 1,
      VolumeDescriptorType::Supplementary => 2,
      VolumeDescriptorType::Partition => 3,
      VolumeDescriptorType::Terminator => 255,
      VolumeDescriptorType::Other(v) => v,
    }
  }
}

bitflags::bitflags! {
  #[derive(Debug, Clone, Copy, PartialEq, Eq)]
  pub struct FileFlags: u8 {
    const EXISTENCE = 1 << 0;
    const DIRECTORY = 1 << 1;
    const ASSOCIATED_FILE = 1 << 2;
    const RECORD = 1 << 3;
    const PROTECTION = 1 << 4;
    const MULTI_EXTENT = 1 << 7;
  }
}

/// Joliet escape sequence triples identifying the UCS-2 level of a
/// supplementary volume descriptor (ISO/IEC 2022 designations).
pub mod escape_sequences {
  pub const UCS2_LEVEL_1: &[u8; 3] = b"%/@";
  pub const UCS2_LEVEL_2: &[u8; 3] = b"%/C";
  pub const UCS2_LEVEL_3: &[u8; 3] = b"%/E";

  /// The 32-byte escape sequences field for a given level triple.
  pub fn field(triple: &[u8; 3]) -> [u8; 32] {
    let mut field = [0u8; 32];
    field[..3].copy_from_slice(triple);
    field
  }

  /// Whether the given field designates a recognized UCS-2 level.
  pub fn recognized(field: &[u8]) -> bool {
    let triple = &field[..3];
    (triple == UCS2_LEVEL_1 || triple == UCS2_LEVEL_2 || triple == UCS2_LEVEL_3)
      && field[3..].iter().all(|b| *b == 0)
  }
}

/// Root directory record as embedded in a standard volume descriptor:
/// a fixed 34-byte directory record whose identifier is the single byte 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootDirectoryRecord {
  pub extent_location: u32,
  pub data_length: u32,
  pub recording_date: RecordedDateTime,
}

impl IsoSerialize for RootDirectoryRecord {
  fn extent(&self) -> usize {
    SELF_RECORD_EXTENT
  }

  fn serialize(&self, buf: &mut [u8]) -> Result<()> {
    buf[..SELF_RECORD_EXTENT].fill(0);
    buf[0] = SELF_RECORD_EXTENT as u8;
    serialize::put_u32_both(buf, 2, self.extent_location);
    serialize::put_u32_both(buf, 10, self.data_length);
    self.recording_date.encode(&mut buf[18..25]);
    buf[25] = FileFlags::DIRECTORY.bits();
    serialize::put_u16_both(buf, 28, 1);
    buf[32] = 1;
    buf[33] = 0;
    Ok(())
  }
}

/// Discriminates the two descriptor layouts that share the standard body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StandardDescriptorKind {
  Primary,
  /// Joliet supplementary descriptor; the escape sequences select the
  /// UCS-2 level used for every identifier field.
  Supplementary { escape_sequences: [u8; 32] },
}

/// Primary or Supplementary volume descriptor. The two share the same
/// field layout; the supplementary variant adds the escape sequences field
/// and encodes its identifiers in UCS-2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardVolumeDescriptor {
  pub kind: StandardDescriptorKind,
  pub system_identifier: String,
  pub volume_identifier: String,
  pub volume_space_size: u32,
  pub volume_set_size: u16,
  pub volume_sequence_number: u16,
  pub logical_block_size: u16,
  pub path_table_size: u32,
  pub type_l_path_table_location: u32,
  pub optional_type_l_path_table_location: u32,
  pub type_m_path_table_location: u32,
  pub optional_type_m_path_table_location: u32,
  pub root_directory_record: RootDirectoryRecord,
  pub volume_set_identifier: String,
  pub publisher_identifier: String,
  pub data_preparer_identifier: String,
  pub application_identifier: String,
  pub creation_date: AsciiDateTime,
  pub modification_date: AsciiDateTime,
  pub expiration_date: AsciiDateTime,
  pub effective_date: AsciiDateTime,
}

impl StandardVolumeDescriptor {
  pub fn encoding(&self) -> TextEncoding {
    match self.kind {
      StandardDescriptorKind::Primary => TextEncoding::Ascii,
      StandardDescriptorKind::Supplementary { .. } => TextEncoding::Ucs2Be,
    }
  }

  fn type_code(&self) -> u8 {
    match self.kind {
      StandardDescriptorKind::Primary => VolumeDescriptorType::Primary.into(),
      StandardDescriptorKind::Supplementary { .. } => VolumeDescriptorType::Supplementary.into(),
    }
  }
}

impl IsoSerialize for StandardVolumeDescriptor {
  fn extent(&self) -> usize {
    LOGICAL_BLOCK_SIZE as usize
  }

  fn serialize(&self, buf: &mut [u8]) -> Result<()> {
    let enc = self.encoding();

    buf[..LOGICAL_BLOCK_SIZE as usize].fill(0);
    buf[0] = self.type_code();
    buf[1..6].copy_from_slice(StandardIdentifier::Cd001.as_bytes());
    buf[6] = 1; // descriptor version

    serialize::put_str_field(buf, 8, 32, &self.system_identifier, enc);
    serialize::put_str_field(buf, 40, 32, &self.volume_identifier, enc);
    serialize::put_u32_both(buf, 80, self.volume_space_size);

    if let StandardDescriptorKind::Supplementary { escape_sequences } = &self.kind {
      buf[88..120].copy_from_slice(escape_sequences);
    }

    serialize::put_u16_both(buf, 120, self.volume_set_size);
    serialize::put_u16_both(buf, 124, self.volume_sequence_number);
    serialize::put_u16_both(buf, 128, self.logical_block_size);
    serialize::put_u32_both(buf, 132, self.path_table_size);
    serialize::put_u32_le(buf, 140, self.type_l_path_table_location);
    serialize::put_u32_le(buf, 144, self.optional_type_l_path_table_location);
    serialize::put_u32_be(buf, 148, self.type_m_path_table_location);
    serialize::put_u32_be(buf, 152, self.optional_type_m_path_table_location);

    self.root_directory_record.serialize(&mut buf[156..190])?;

    serialize::put_str_field(buf, 190, 128, &self.volume_set_identifier, enc);
    serialize::put_str_field(buf, 318, 128, &self.publisher_identifier, enc);
    serialize::put_str_field(buf, 446, 128, &self.data_preparer_identifier, enc);
    serialize::put_str_field(buf, 574, 128, &self.application_identifier, enc);

    // Copyright, abstract and bibliographic file identifiers are left at
    // their padded defaults.
    serialize::put_str_field(buf, 702, 37, "", enc);
    serialize::put_str_field(buf, 739, 37, "", enc);
    serialize::put_str_field(buf, 776, 37, "", enc);

    self.creation_date.encode(&mut buf[813..830]);
    self.modification_date.encode(&mut buf[830..847]);
    self.expiration_date.encode(&mut buf[847..864]);
    self.effective_date.encode(&mut buf[864..881]);

    buf[881] = 1; // file structure version

    Ok(())
  }
}

/// El Torito boot record volume descriptor: announces the boot catalog
/// location within the descriptor sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootRecordVolumeDescriptor {
  pub boot_catalog_location: u32,
}

impl BootRecordVolumeDescriptor {
  pub const BOOT_SYSTEM_IDENTIFIER: &'static [u8] = b"EL TORITO SPECIFICATION";
}

impl IsoSerialize for BootRecordVolumeDescriptor {
  fn extent(&self) -> usize {
    LOGICAL_BLOCK_SIZE as usize
  }

  fn serialize(&self, buf: &mut [u8]) -> Result<()> {
    buf[..LOGICAL_BLOCK_SIZE as usize].fill(0);
    buf[0] = VolumeDescriptorType::BootRecord.into();
    buf[1..6].copy_from_slice(StandardIdentifier::Cd001.as_bytes());
    buf[6] = 1;
    // Boot system identifier is zero-padded, not space-padded.
    buf[7..7 + Self::BOOT_SYSTEM_IDENTIFIER.len()].copy_from_slice(Self::BOOT_SYSTEM_IDENTIFIER);
    serialize::put_u32_le(buf, 71, self.boot_catalog_location);
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeDescriptorSetTerminator;

impl IsoSerialize for VolumeDescriptorSetTerminator {
  fn extent(&self) -> usize {
    LOGICAL_BLOCK_SIZE as usize
  }

  fn serialize(&self, buf: &mut [u8]) -> Result<()> {
    buf[..LOGICAL_BLOCK_SIZE as usize].fill(0);
    buf[0] = VolumeDescriptorType::Terminator.into();
    buf[1..6].copy_from_slice(StandardIdentifier::Cd001.as_bytes());
    buf[6] = 1;
    Ok(())
  }
}

/// On-disc directory record. The identifier holds the final on-disc bytes
/// (including any `;1` version suffix); the system use area carries Rock
/// Ridge entries when enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
  pub extended_attribute_length: u8,
  pub extent_location: u32,
  pub data_length: u32,
  pub recording_date: RecordedDateTime,
  pub file_flags: FileFlags,
  pub file_unit_size: u8,
  pub interleave_gap_size: u8,
  pub volume_sequence_number: u16,
  pub identifier: Vec<u8>,
  pub system_use: Vec<u8>,
}

impl DirectoryRecord {
  /// Record length for an identifier/system-use combination. Records are
  /// always even in length; a pad byte follows an even-length identifier.
  pub fn extent_for(identifier_len: usize, system_use_len: usize) -> usize {
    33 + identifier_len + (1 - identifier_len % 2) + system_use_len
  }
}

impl IsoSerialize for DirectoryRecord {
  fn extent(&self) -> usize {
    Self::extent_for(self.identifier.len(), self.system_use.len())
  }

  fn serialize(&self, buf: &mut [u8]) -> Result<()> {
    let extent = self.extent();

    buf[..extent].fill(0);
    buf[0] = extent as u8;
    buf[1] = self.extended_attribute_length;
    serialize::put_u32_both(buf, 2, self.extent_location);
    serialize::put_u32_both(buf, 10, self.data_length);
    self.recording_date.encode(&mut buf[18..25]);
    buf[25] = self.file_flags.bits();
    buf[26] = self.file_unit_size;
    buf[27] = self.interleave_gap_size;
    serialize::put_u16_both(buf, 28, self.volume_sequence_number);
    buf[32] = self.identifier.len() as u8;
    buf[33..33 + self.identifier.len()].copy_from_slice(&self.identifier);

    let su_offset = extent - self.system_use.len();
    buf[su_offset..extent].copy_from_slice(&self.system_use);

    Ok(())
  }
}

/// One path table entry. The four on-disc copies serialize the same
/// records with opposite endianness for the L-type and M-type pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTableRecord {
  pub extent_location: u32,
  pub parent_directory_number: u16,
  pub identifier: Vec<u8>,
}

impl PathTableRecord {
  pub fn extent(&self) -> usize {
    8 + self.identifier.len() + self.identifier.len() % 2
  }

  pub fn serialize_endian(&self, endian: Endianness, buf: &mut [u8]) -> Result<()> {
    buf[..self.extent()].fill(0);
    buf[0] = self.identifier.len() as u8;
    buf[1] = 0; // extended attribute record length

    match endian {
      Endianness::Little => {
        serialize::put_u32_le(buf, 2, self.extent_location);
        serialize::put_u16_le(buf, 6, self.parent_directory_number);
      }
      Endianness::Big => {
        serialize::put_u32_be(buf, 2, self.extent_location);
        serialize::put_u16_be(buf, 6, self.parent_directory_number);
      }
    }

    buf[8..8 + self.identifier.len()].copy_from_slice(&self.identifier);

    Ok(())
  }
}
