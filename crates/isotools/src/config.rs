//! Build configuration.
//!
//! Each option maps 1:1 to a field consumed by the naming engine, the
//! layout builder or a codec. Setters validate eagerly so a bad value is
//! rejected before any I/O begins. Empty identifier strings leave the
//! descriptor defaults in place.

use std::path::PathBuf;

use crate::prelude::*;

/// ISO 9660 interchange level. Level 1 enforces strict 8.3 names; levels
/// 2 and 3 relax to 31-character directories and 30-byte file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterchangeLevel {
  Level1,
  Level2,
  Level3,
}

impl InterchangeLevel {
  pub fn from_number(level: u8) -> Result<Self> {
    match level {
      1 => Ok(InterchangeLevel::Level1),
      2 => Ok(InterchangeLevel::Level2),
      3 => Ok(InterchangeLevel::Level3),
      other => Err(Error::Config(format!("invalid interchange level: {other}"))),
    }
  }
}

#[derive(Debug, Clone)]
pub struct Iso9660Config {
  pub system_id: String,
  pub volume_id: String,
  pub volume_set_id: String,
  pub publisher: String,
  pub preparer: String,
  pub application: String,
  pub volume_sequence_number: u16,
  pub volume_set_size: u16,
  pub interchange_level: InterchangeLevel,
  /// Relax the ISO 9660 d-character set to printable ASCII with a minimal
  /// `[*/:;?\]` escape.
  pub allow_ascii: bool,
  /// Relocate directories nested deeper than 8 levels.
  pub restrict_dir_depth_to_8: bool,
  /// Emit a trailing dot for extensionless file identifiers.
  pub force_dot_delimiter: bool,
  /// Pad the image end to a 150-sector boundary, as pressed media expects.
  pub pad_end: bool,
  /// Extension substitutions consulted before blindly truncating an
  /// over-long extension, e.g. `("JPEG", "JPG")`.
  pub extension_mapping: Vec<(String, String)>,
}

impl Default for Iso9660Config {
  fn default() -> Self {
    Self {
      system_id: String::new(),
      volume_id: String::new(),
      volume_set_id: String::new(),
      publisher: String::new(),
      preparer: String::new(),
      application: String::new(),
      volume_sequence_number: 1,
      volume_set_size: 1,
      interchange_level: InterchangeLevel::Level1,
      allow_ascii: false,
      restrict_dir_depth_to_8: true,
      force_dot_delimiter: true,
      pad_end: true,
      extension_mapping: Vec::new(),
    }
  }
}

impl Iso9660Config {
  pub fn set_interchange_level(&mut self, level: u8) -> Result<()> {
    self.interchange_level = InterchangeLevel::from_number(level)?;
    Ok(())
  }
}

#[derive(Debug, Clone)]
pub struct JolietConfig {
  /// Maximum filename length in characters. Values above 64 break Joliet
  /// interoperability and are recorded as a warning.
  pub max_filename_length: u16,
  /// Escalate filename truncation from a warning to a hard failure.
  pub fail_on_truncation: bool,
  pub force_dot_delimiter: bool,
}

impl Default for JolietConfig {
  fn default() -> Self {
    Self {
      max_filename_length: 64,
      fail_on_truncation: false,
      force_dot_delimiter: true,
    }
  }
}

impl JolietConfig {
  pub fn set_max_filename_length(&mut self, length: u16) -> Result<()> {
    if length == 0 {
      return Err(Error::Config(format!(
        "invalid maximum Joliet filename length: {length}"
      )));
    }
    self.max_filename_length = length;
    Ok(())
  }
}

#[derive(Debug, Clone)]
pub struct RockRidgeConfig {
  /// Emit RRIP v1.09 structures the way mkisofs does (RR entries present,
  /// PX entries without the serial number field).
  pub mkisofs_compatibility: bool,
  /// Prefix the moved-directories store with a dot so listings hide it.
  pub hide_moved_directories_store: bool,
  /// Replace characters outside `[-A-Za-z0-9._]` in Rock Ridge names.
  pub force_portable_filename_character_set: bool,
  /// Name of the directory receiving relocated deep directories.
  pub moved_directories_store_name: String,
  // Filename lengths are not restricted by Rock Ridge,
  // these are just safe defaults.
  pub max_directory_length: usize,
  pub max_filename_length: usize,
  permissions: Vec<(String, u32)>,
}

impl Default for RockRidgeConfig {
  fn default() -> Self {
    Self {
      mkisofs_compatibility: false,
      hide_moved_directories_store: true,
      force_portable_filename_character_set: true,
      moved_directories_store_name: "rr_moved".into(),
      max_directory_length: 255,
      max_filename_length: 255,
      permissions: Vec::new(),
    }
  }
}

impl RockRidgeConfig {
  pub fn set_max_directory_length(&mut self, length: usize) -> Result<()> {
    if length == 0 {
      return Err(Error::Config(format!(
        "invalid maximum directory length: {length}"
      )));
    }
    self.max_directory_length = length;
    Ok(())
  }

  pub fn set_max_filename_length(&mut self, length: usize) -> Result<()> {
    if length == 0 {
      return Err(Error::Config(format!(
        "invalid maximum filename length: {length}"
      )));
    }
    self.max_filename_length = length;
    Ok(())
  }

  /// Register a POSIX mode for entries whose logical path matches the
  /// glob-style pattern. Patterns are tested in registration order and the
  /// first match wins.
  pub fn add_mode_for_pattern(&mut self, pattern: impl Into<String>, mode: u32) {
    let pattern = pattern.into();
    log::info!("Recording pattern {:?} with mode {:o}", pattern, mode);
    self.permissions.push((pattern, mode));
  }

  pub fn permissions(&self) -> &[(String, u32)] {
    &self.permissions
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootPlatformId {
  X86,
  PowerPc,
  Mac,
  Efi,
}

impl BootPlatformId {
  /// Parse the loose platform spellings accepted by the configuration
  /// surface; anything unrecognized falls back to x86.
  pub fn parse(s: &str) -> Self {
    if s.eq_ignore_ascii_case("mac")
      || s.eq_ignore_ascii_case("macintosh")
      || s.eq_ignore_ascii_case("apple")
    {
      BootPlatformId::Mac
    } else if s.eq_ignore_ascii_case("ppc") || s.eq_ignore_ascii_case("powerpc") {
      BootPlatformId::PowerPc
    } else if s.eq_ignore_ascii_case("efi") {
      BootPlatformId::Efi
    } else {
      BootPlatformId::X86
    }
  }

  pub fn code(&self) -> u8 {
    match self {
      BootPlatformId::X86 => 0x00,
      BootPlatformId::PowerPc => 0x01,
      BootPlatformId::Mac => 0x02,
      BootPlatformId::Efi => 0xef,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootEmulation {
  NoEmulation,
  Floppy12M,
  Floppy144M,
  Floppy288M,
  HardDisk,
}

impl BootEmulation {
  /// Parse the loose emulation spellings accepted by the configuration
  /// surface; anything unrecognized means no emulation.
  pub fn parse(s: &str) -> Self {
    let lower = s.to_ascii_lowercase();

    if lower.contains("44") {
      BootEmulation::Floppy144M
    } else if lower.contains("88") {
      BootEmulation::Floppy288M
    } else if lower.contains("1.2") || (lower.contains('1') && lower.contains('2')) {
      BootEmulation::Floppy12M
    } else if lower.contains("hd") || lower.contains("hard") {
      BootEmulation::HardDisk
    } else {
      BootEmulation::NoEmulation
    }
  }

  pub fn code(&self) -> u8 {
    match self {
      BootEmulation::NoEmulation => 0,
      BootEmulation::Floppy12M => 1,
      BootEmulation::Floppy144M => 2,
      BootEmulation::Floppy288M => 3,
      BootEmulation::HardDisk => 4,
    }
  }
}

#[derive(Debug, Clone)]
pub struct ElToritoConfig {
  pub boot_image: PathBuf,
  pub platform_id: BootPlatformId,
  pub emulation: BootEmulation,
  /// Manufacturer/developer identifier stored in the validation entry.
  pub boot_image_id: String,
  /// Virtual sectors (512 bytes) to load in no-emulation mode.
  pub sector_count: u16,
  pub load_segment: u16,
  /// Patch a boot info table into the boot image at offset 8.
  pub gen_boot_info_table: bool,
}

impl ElToritoConfig {
  pub fn new(boot_image: impl Into<PathBuf>) -> Self {
    Self {
      boot_image: boot_image.into(),
      platform_id: BootPlatformId::X86,
      emulation: BootEmulation::NoEmulation,
      boot_image_id: String::new(),
      sector_count: 1,
      load_segment: 0,
      gen_boot_info_table: false,
    }
  }

  pub fn set_sector_count(&mut self, count: u16) -> Result<()> {
    if count == 0 {
      return Err(Error::Config(format!("invalid boot sector count: {count}")));
    }
    self.sector_count = count;
    Ok(())
  }
}

/// Everything one image build needs, derived once and threaded through the
/// layout builder and codecs.
#[derive(Debug, Clone, Default)]
pub struct ImageOptions {
  pub iso9660: Iso9660Config,
  pub joliet: Option<JolietConfig>,
  pub rock_ridge: Option<RockRidgeConfig>,
  pub el_torito: Option<ElToritoConfig>,
}

impl ImageOptions {
  /// Name of the moved-directories store, honoring the hide flag.
  pub(crate) fn moved_store_name(&self) -> String {
    let rr = self.rock_ridge.clone().unwrap_or_default();

    if rr.hide_moved_directories_store {
      format!(".{}", rr.moved_directories_store_name)
    } else {
      rr.moved_directories_store_name
    }
  }
}
