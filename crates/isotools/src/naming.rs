//! Naming conventions: mapping arbitrary filesystem names onto the rules
//! of each directory hierarchy recorded in the image.
//!
//! One convention instance exists per active standard (ISO 9660, Joliet,
//! Rock Ridge), derived once from configuration and fixed for the whole
//! build. The layout builder applies them per entry and deduplicates the
//! results against siblings already named in the same directory.

use crate::config::{InterchangeLevel, Iso9660Config, JolietConfig, RockRidgeConfig};
use crate::prelude::*;
use crate::spec::MAX_PATH_LENGTH;

/// A resolved file name, stem and extension kept apart so length budgets
/// can be applied to each side separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileName {
  pub stem: String,
  pub extension: String,
}

/// Split a source file name at its last dot. `archive.tar.gz` becomes
/// `("archive.tar", "gz")`; a leading dot belongs to the stem.
pub fn split_name(name: &str) -> (&str, &str) {
  match name.rfind('.') {
    Some(pos) if pos > 0 => (&name[..pos], &name[pos + 1..]),
    _ => (name, ""),
  }
}

fn truncate_chars(s: &str, max: usize) -> String {
  s.chars().take(max).collect()
}

/// Rules one naming standard imposes on directory and file names.
pub trait NamingConvention {
  fn id(&self) -> &'static str;

  fn apply_directory(&self, name: &str, warnings: &mut Vec<Warning>) -> Result<String>;

  fn apply_file(&self, stem: &str, extension: &str, warnings: &mut Vec<Warning>)
    -> Result<FileName>;

  /// Sibling equality for deduplication purposes.
  fn names_equal(&self, a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
  }

  /// Maximum directory name length under this convention.
  fn directory_budget(&self) -> usize;

  /// Maximum stem length given an extension of `extension_len` characters.
  fn stem_budget(&self, extension_len: usize) -> usize;

  /// Final on-disc rendering of a resolved file name.
  fn render_file(&self, name: &FileName) -> String {
    if name.extension.is_empty() {
      name.stem.clone()
    } else {
      format!("{}.{}", name.stem, name.extension)
    }
  }

  /// Path lengths beyond 255 bytes only warn; the constraint is
  /// informational (ISO 9660 6.8.2.1).
  fn check_path_length(&self, path: &str, warnings: &mut Vec<Warning>) {
    if path.len() > MAX_PATH_LENGTH {
      log::warn!("{}: Path length exceeds limit: {}", self.id(), path);
      warnings.push(Warning::PathLength(path.to_string()));
    }
  }
}

/// Strict ISO 9660 naming: uppercase `[A-Z0-9_]`, 8.3 at interchange
/// level 1, 31-character directories and 30-byte combined file names at
/// higher levels.
pub struct Iso9660Names {
  enforce_8_plus_3: bool,
  force_charset: bool,
  force_dot_delimiter: bool,
  max_directory_length: usize,
  extension_mapping: Vec<(String, String)>,
}

impl Iso9660Names {
  pub fn new(config: &Iso9660Config) -> Self {
    let enforce_8_plus_3 = config.interchange_level == InterchangeLevel::Level1;

    Self {
      enforce_8_plus_3,
      force_charset: !config.allow_ascii,
      force_dot_delimiter: config.force_dot_delimiter,
      max_directory_length: if enforce_8_plus_3 { 8 } else { 31 },
      extension_mapping: config
        .extension_mapping
        .iter()
        .map(|(from, to)| (from.to_uppercase(), to.clone()))
        .collect(),
    }
  }

  fn normalize(&self, name: &str) -> String {
    if self.force_charset {
      name
        .to_uppercase()
        .chars()
        .map(|c| match c {
          'A'..='Z' | '0'..='9' | '_' => c,
          _ => '_',
        })
        .collect()
    } else {
      name
        .chars()
        .map(|c| match c {
          '*' | '/' | ':' | ';' | '?' | '\\' => '_',
          c => c,
        })
        .collect()
    }
  }

  fn map_extension(&self, extension: &str) -> Option<String> {
    self
      .extension_mapping
      .iter()
      .find(|(from, _)| from == extension)
      .map(|(_, to)| self.normalize(to))
  }
}

impl NamingConvention for Iso9660Names {
  fn id(&self) -> &'static str {
    "ISO 9660"
  }

  fn apply_directory(&self, name: &str, _warnings: &mut Vec<Warning>) -> Result<String> {
    let mut name = self.normalize(name);

    if name.chars().count() > self.max_directory_length {
      name = truncate_chars(&name, self.max_directory_length);
    }

    if name.is_empty() {
      return Err(Error::naming(self.id(), "Empty directory name encountered"));
    }

    Ok(name)
  }

  fn apply_file(
    &self,
    stem: &str,
    extension: &str,
    _warnings: &mut Vec<Warning>,
  ) -> Result<FileName> {
    let mut stem = self.normalize(stem);
    let mut extension = self.normalize(extension);

    if stem.is_empty() && extension.is_empty() {
      return Err(Error::naming(self.id(), "Empty file name encountered"));
    }

    if self.enforce_8_plus_3 {
      if stem.chars().count() > 8 {
        stem = truncate_chars(&stem, 8);
      }
      if extension.chars().count() > 3 {
        extension = match self.map_extension(&extension) {
          Some(mapped) if mapped.chars().count() <= 3 => mapped,
          _ => truncate_chars(&extension, 3),
        };
      }
    } else {
      // An extension alone over the 30-character ceiling gives way first.
      if extension.chars().count() > 30 {
        extension = match self.map_extension(&extension) {
          Some(mapped) if mapped.chars().count() <= 30 => mapped,
          _ => truncate_chars(&extension, 30),
        };
      }

      // ISO 9660 7.5.1: shorten the longer of the two.
      if stem.chars().count() + extension.chars().count() > 30 {
        if stem.chars().count() >= extension.chars().count() {
          stem = truncate_chars(&stem, 30usize.saturating_sub(extension.chars().count()));
        } else {
          extension = match self.map_extension(&extension) {
            Some(mapped) if stem.chars().count() + mapped.chars().count() <= 30 => mapped,
            _ => truncate_chars(&extension, 30usize.saturating_sub(stem.chars().count())),
          };
        }
      }
    }

    Ok(FileName { stem, extension })
  }

  fn directory_budget(&self) -> usize {
    self.max_directory_length
  }

  fn stem_budget(&self, extension_len: usize) -> usize {
    if self.enforce_8_plus_3 {
      8
    } else {
      30usize.saturating_sub(extension_len)
    }
  }

  fn render_file(&self, name: &FileName) -> String {
    if name.extension.is_empty() {
      if self.force_dot_delimiter {
        format!("{}.", name.stem)
      } else {
        name.stem.clone()
      }
    } else {
      format!("{}.{}", name.stem, name.extension)
    }
  }
}

/// Joliet naming: UCS-2 compatible characters, a configurable length
/// ceiling (64 by default) and a forced dot delimiter policy.
pub struct JolietNames {
  max_filename_length: usize,
  fail_on_truncation: bool,
  force_dot_delimiter: bool,
}

impl JolietNames {
  pub fn new(config: &JolietConfig) -> Self {
    Self {
      max_filename_length: config.max_filename_length as usize,
      fail_on_truncation: config.fail_on_truncation,
      force_dot_delimiter: config.force_dot_delimiter,
    }
  }

  fn normalize(&self, name: &str) -> String {
    name
      .chars()
      .map(|c| match c {
        '*' | '/' | ':' | ';' | '?' | '\\' => '_',
        c if (c as u32) < 0x20 || (c as u32) > 0xffff => '_',
        c => c,
      })
      .collect()
  }

  fn truncated(&self, original: &str, truncated: &str, warnings: &mut Vec<Warning>) -> Result<()> {
    if self.fail_on_truncation {
      return Err(Error::naming(
        self.id(),
        format!("Filename would be truncated: {original:?}"),
      ));
    }

    log::warn!("{}: truncating {:?} to {:?}", self.id(), original, truncated);
    warnings.push(Warning::JolietTruncation {
      name: original.to_string(),
      truncated: truncated.to_string(),
    });

    Ok(())
  }
}

impl NamingConvention for JolietNames {
  fn id(&self) -> &'static str {
    "Joliet"
  }

  fn apply_directory(&self, name: &str, warnings: &mut Vec<Warning>) -> Result<String> {
    let normalized = self.normalize(name);

    if normalized.is_empty() {
      return Err(Error::naming(self.id(), "Empty directory name encountered"));
    }

    if normalized.chars().count() > self.max_filename_length {
      let shortened = truncate_chars(&normalized, self.max_filename_length);
      self.truncated(&normalized, &shortened, warnings)?;
      return Ok(shortened);
    }

    Ok(normalized)
  }

  fn apply_file(
    &self,
    stem: &str,
    extension: &str,
    warnings: &mut Vec<Warning>,
  ) -> Result<FileName> {
    let mut stem = self.normalize(stem);
    let mut extension = self.normalize(extension);

    if stem.is_empty() && extension.is_empty() {
      return Err(Error::naming(self.id(), "Empty file name encountered"));
    }

    let delimiter = if extension.is_empty() && !self.force_dot_delimiter {
      0
    } else {
      1
    };
    let total = stem.chars().count() + extension.chars().count() + delimiter;

    if total > self.max_filename_length {
      let original = self.render_file(&FileName {
        stem: stem.clone(),
        extension: extension.clone(),
      });

      let over = total - self.max_filename_length;
      if stem.chars().count() >= extension.chars().count() {
        stem = truncate_chars(&stem, stem.chars().count().saturating_sub(over));
      } else {
        extension = truncate_chars(&extension, extension.chars().count().saturating_sub(over));
      }

      let shortened = self.render_file(&FileName {
        stem: stem.clone(),
        extension: extension.clone(),
      });
      self.truncated(&original, &shortened, warnings)?;
    }

    Ok(FileName { stem, extension })
  }

  fn directory_budget(&self) -> usize {
    self.max_filename_length
  }

  fn stem_budget(&self, extension_len: usize) -> usize {
    let delimiter = if extension_len == 0 && !self.force_dot_delimiter {
      0
    } else {
      1
    };
    self
      .max_filename_length
      .saturating_sub(extension_len + delimiter)
  }

  fn render_file(&self, name: &FileName) -> String {
    if name.extension.is_empty() {
      if self.force_dot_delimiter {
        format!("{}.", name.stem)
      } else {
        name.stem.clone()
      }
    } else {
      format!("{}.{}", name.stem, name.extension)
    }
  }
}

/// Rock Ridge naming: POSIX portable characters (optional) and generous
/// 255-byte defaults. One byte is reserved for the dot delimiter when an
/// extension is present.
pub struct RockRidgeNames {
  force_portable_charset: bool,
  max_directory_length: usize,
  max_filename_length: usize,
}

impl RockRidgeNames {
  pub fn new(config: &RockRidgeConfig) -> Self {
    Self {
      force_portable_charset: config.force_portable_filename_character_set,
      max_directory_length: config.max_directory_length,
      max_filename_length: config.max_filename_length,
    }
  }

  fn normalize(&self, name: &str) -> String {
    if !self.force_portable_charset {
      return name.to_string();
    }

    name
      .chars()
      .map(|c| match c {
        '-' | '.' | '_' | 'A'..='Z' | 'a'..='z' | '0'..='9' => c,
        _ => '_',
      })
      .collect()
  }
}

impl NamingConvention for RockRidgeNames {
  fn id(&self) -> &'static str {
    "Rock Ridge"
  }

  fn apply_directory(&self, name: &str, _warnings: &mut Vec<Warning>) -> Result<String> {
    let mut name = self.normalize(name);

    if name.is_empty() {
      return Err(Error::naming(self.id(), "Empty directory name encountered"));
    }

    if name.chars().count() > self.max_directory_length {
      name = truncate_chars(&name, self.max_directory_length);
    }

    Ok(name)
  }

  fn apply_file(
    &self,
    stem: &str,
    extension: &str,
    _warnings: &mut Vec<Warning>,
  ) -> Result<FileName> {
    let mut stem = self.normalize(stem);
    let extension = self.normalize(extension);

    if stem.is_empty() && extension.is_empty() {
      return Err(Error::naming(self.id(), "Empty file name encountered"));
    }

    let budget = self.stem_budget(extension.chars().count());
    if stem.chars().count() > budget {
      stem = truncate_chars(&stem, budget);
    }

    Ok(FileName { stem, extension })
  }

  fn names_equal(&self, a: &str, b: &str) -> bool {
    a == b
  }

  fn directory_budget(&self) -> usize {
    self.max_directory_length
  }

  fn stem_budget(&self, extension_len: usize) -> usize {
    if extension_len == 0 {
      self.max_filename_length
    } else {
      // One byte reserved for the dot delimiter.
      self.max_filename_length.saturating_sub(extension_len + 1)
    }
  }
}

/// Resolve a directory name against siblings already taken in the same
/// parent, mangling with a numeric suffix on collision.
pub fn deduplicate_directory(
  convention: &dyn NamingConvention,
  name: String,
  taken: &[String],
) -> String {
  let collides = |candidate: &str| taken.iter().any(|t| convention.names_equal(t, candidate));

  if !collides(&name) {
    return name;
  }

  for counter in 1u32.. {
    let suffix = counter.to_string();
    let budget = convention.directory_budget().saturating_sub(suffix.len());
    let candidate = format!("{}{}", truncate_chars(&name, budget), suffix);

    if !collides(&candidate) {
      return candidate;
    }
  }

  unreachable!()
}

/// Resolve a file name against taken sibling identifiers, mangling the
/// stem with a numeric suffix on collision while staying inside the
/// convention's stem budget.
pub fn deduplicate_file(
  convention: &dyn NamingConvention,
  name: FileName,
  taken: &[String],
) -> FileName {
  let collides = |candidate: &FileName| {
    let rendered = convention.render_file(candidate);
    taken.iter().any(|t| convention.names_equal(t, &rendered))
  };

  if !collides(&name) {
    return name;
  }

  for counter in 1u32.. {
    let suffix = counter.to_string();
    let budget = convention
      .stem_budget(name.extension.len())
      .saturating_sub(suffix.len());
    let candidate = FileName {
      stem: format!("{}{}", truncate_chars(&name.stem, budget), suffix),
      extension: name.extension.clone(),
    };

    if !collides(&candidate) {
      return candidate;
    }
  }

  unreachable!()
}
