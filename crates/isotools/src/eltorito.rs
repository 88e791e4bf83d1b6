//! El Torito boot catalog and boot info table.
//!
//! A bootable image carries a Boot Record volume descriptor pointing at a
//! one-sector boot catalog. The catalog opens with a validation entry
//! (checksummed, `0x55 0xAA` terminated) followed by the initial/default
//! entry describing where firmware finds the boot image and how to load it.

use crate::config::ElToritoConfig;
use crate::prelude::*;
use crate::serialize::{get_u32_le, put_u16_le, put_u32_le, IsoSerialize};
use crate::spec::LOGICAL_BLOCK_SIZE;

const BOOTABLE: u8 = 0x88;

/// The boot catalog sector: validation entry plus initial entry.
#[derive(Debug, Clone)]
pub struct BootCatalog {
  pub platform_id: u8,
  /// Manufacturer/developer identifier, up to 24 bytes.
  pub id_string: String,
  pub media_type: u8,
  pub load_segment: u16,
  /// Virtual 512-byte sectors to load in no-emulation mode.
  pub sector_count: u16,
  /// LBA of the boot image.
  pub load_rba: u32,
}

impl BootCatalog {
  pub fn new(config: &ElToritoConfig, load_rba: u32) -> Self {
    Self {
      platform_id: config.platform_id.code(),
      id_string: config.boot_image_id.clone(),
      media_type: config.emulation.code(),
      load_segment: config.load_segment,
      sector_count: config.sector_count,
      load_rba,
    }
  }

  fn validation_entry(&self) -> [u8; 32] {
    let mut entry = [0u8; 32];
    entry[0] = 0x01;
    entry[1] = self.platform_id;

    let id = self.id_string.as_bytes();
    let len = id.len().min(24);
    entry[4..4 + len].copy_from_slice(&id[..len]);

    entry[30] = 0x55;
    entry[31] = 0xaa;

    // Checksum word makes all sixteen 16-bit words sum to zero.
    let sum = entry
      .chunks_exact(2)
      .map(|w| u16::from_le_bytes([w[0], w[1]]) as u32)
      .sum::<u32>();
    put_u16_le(&mut entry, 28, (0x10000 - (sum & 0xffff)) as u16);

    entry
  }

  fn initial_entry(&self) -> [u8; 32] {
    let mut entry = [0u8; 32];
    entry[0] = BOOTABLE;
    entry[1] = self.media_type;
    put_u16_le(&mut entry, 2, self.load_segment);
    put_u16_le(&mut entry, 6, self.sector_count);
    put_u32_le(&mut entry, 8, self.load_rba);
    entry
  }
}

impl IsoSerialize for BootCatalog {
  fn extent(&self) -> usize {
    LOGICAL_BLOCK_SIZE as usize
  }

  fn serialize(&self, buf: &mut [u8]) -> Result<()> {
    buf[..32].copy_from_slice(&self.validation_entry());
    buf[32..64].copy_from_slice(&self.initial_entry());
    Ok(())
  }
}

/// Patch a 56-byte boot info table into a boot image at offset 8, the spot
/// isolinux and GRUB expect. The checksum covers every 32-bit little-endian
/// word from offset 64 to the end of the image.
pub fn patch_boot_info_table(image: &mut [u8], pvd_lba: u32, boot_lba: u32) -> Result<()> {
  if image.len() < 64 {
    return Err(Error::Format(format!(
      "boot image too small for a boot info table: {} bytes",
      image.len()
    )));
  }

  let mut checksum = 0u32;
  for word in image[64..].chunks(4) {
    let mut padded = [0u8; 4];
    padded[..word.len()].copy_from_slice(word);
    checksum = checksum.wrapping_add(get_u32_le(&padded, 0));
  }

  let length = image.len() as u32;
  let table = &mut image[8..64];
  table.fill(0);
  put_u32_le(table, 0, pvd_lba);
  put_u32_le(table, 4, boot_lba);
  put_u32_le(table, 8, length);
  put_u32_le(table, 12, checksum);

  Ok(())
}
