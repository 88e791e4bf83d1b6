//! Rendering a resolved layout into an image stream.
//!
//! The writer emits strictly sequentially: the 16 reserved system blocks,
//! the volume descriptor sequence, the path table copies, the directory
//! extents of each hierarchy, the boot catalog and finally file data, with
//! zero padding between extents. Every extent location was fixed by the
//! layout pass, so writing is a single forward walk.

use std::io::Write;

use crate::config::ImageOptions;
use crate::eltorito::{patch_boot_info_table, BootCatalog};
use crate::layout::{Hierarchy, Layout, PathTableSet};
use crate::prelude::*;
use crate::rockridge::SystemUseEntries;
use crate::serialize::{AsciiDateTime, Endianness, IsoSerialize, RecordedDateTime};
use crate::spec::{
  escape_sequences, BootRecordVolumeDescriptor, DirectoryRecord, FileFlags, RootDirectoryRecord,
  StandardDescriptorKind, StandardVolumeDescriptor, VolumeDescriptorSetTerminator,
  LOGICAL_BLOCK_SIZE, RESERVED_BLOCKS,
};
use crate::tree::{NodeId, NodeKind, Tree};

/// Outcome of a successful build: the image was written in full, possibly
/// with non-fatal policy warnings worth surfacing.
#[derive(Debug)]
pub struct BuildReport {
  pub warnings: Vec<Warning>,
  pub total_sectors: u32,
}

/// Builds ISO 9660 images from an entry tree.
pub struct IsoWriter {
  tree: Tree,
  options: ImageOptions,
}

impl IsoWriter {
  pub fn new(options: ImageOptions) -> Self {
    Self {
      tree: Tree::new(),
      options,
    }
  }

  /// Replace the current tree with the contents of a host directory.
  pub fn capture(&mut self, path: impl AsRef<std::path::Path>) -> Result<()> {
    self.tree = Tree::capture(path)?;
    Ok(())
  }

  /// Replace the current tree with an explicitly assembled one.
  pub fn set_tree(&mut self, tree: Tree) {
    self.tree = tree;
  }

  pub fn tree_mut(&mut self) -> &mut Tree {
    &mut self.tree
  }

  /// Lay out and render the image.
  pub fn finalize<W: Write>(self, writer: W) -> Result<BuildReport> {
    let layout = Layout::build(self.tree, self.options)?;
    render(&layout, writer)
  }
}

fn render<W: Write>(layout: &Layout, writer: W) -> Result<BuildReport> {
  let now = chrono::Utc::now();
  let mut out = SectorWriter::new(writer);

  out.pad_to_sector(RESERVED_BLOCKS)?;
  write_descriptors(layout, &mut out, now)?;
  write_path_tables(layout, &mut out)?;
  write_directories(layout, &mut out, now.into())?;

  if let Some(boot) = &layout.boot {
    out.pad_to_sector(boot.catalog_lba)?;
    let el_torito = layout
      .options
      .el_torito
      .as_ref()
      .ok_or_else(|| Error::Config("boot layout without El Torito configuration".into()))?;
    let load_rba = layout.tree.node(boot.image).extent.unwrap_or(0);
    out.write_serialized(&BootCatalog::new(el_torito, load_rba))?;
  }

  write_file_data(layout, &mut out)?;
  out.pad_to_sector(layout.total_sectors)?;

  log::info!(
    "Image written: {} sectors, {} warnings",
    layout.total_sectors,
    layout.warnings.len()
  );

  Ok(BuildReport {
    warnings: layout.warnings.clone(),
    total_sectors: layout.total_sectors,
  })
}

fn standard_descriptor(
  layout: &Layout,
  kind: StandardDescriptorKind,
  now: chrono::DateTime<chrono::Utc>,
) -> StandardVolumeDescriptor {
  let config = &layout.options.iso9660;
  let root = layout.tree.node(layout.tree.root());

  let (tables, root_extent, root_length) = match kind {
    StandardDescriptorKind::Primary => (
      &layout.iso_path_tables,
      root.extent.unwrap_or(0),
      root.data_length,
    ),
    StandardDescriptorKind::Supplementary { .. } => {
      let tables = layout.joliet_path_tables.as_ref().unwrap_or(&layout.iso_path_tables);
      (
        tables,
        root.joliet_extent.unwrap_or(0),
        root.joliet_data_length,
      )
    }
  };

  StandardVolumeDescriptor {
    kind,
    system_identifier: config.system_id.clone(),
    volume_identifier: config.volume_id.clone(),
    volume_space_size: layout.total_sectors,
    volume_set_size: config.volume_set_size,
    volume_sequence_number: config.volume_sequence_number,
    logical_block_size: LOGICAL_BLOCK_SIZE,
    path_table_size: tables.size,
    type_l_path_table_location: tables.type_l,
    optional_type_l_path_table_location: tables.optional_l,
    type_m_path_table_location: tables.type_m,
    optional_type_m_path_table_location: tables.optional_m,
    root_directory_record: RootDirectoryRecord {
      extent_location: root_extent,
      data_length: root_length,
      recording_date: now.into(),
    },
    volume_set_identifier: config.volume_set_id.clone(),
    publisher_identifier: config.publisher.clone(),
    data_preparer_identifier: config.preparer.clone(),
    application_identifier: config.application.clone(),
    creation_date: now.into(),
    modification_date: now.into(),
    expiration_date: AsciiDateTime::unspecified(),
    effective_date: AsciiDateTime::unspecified(),
  }
}

fn write_descriptors<W: Write>(
  layout: &Layout,
  out: &mut SectorWriter<W>,
  now: chrono::DateTime<chrono::Utc>,
) -> Result<()> {
  out.write_serialized(&standard_descriptor(
    layout,
    StandardDescriptorKind::Primary,
    now,
  ))?;

  if let Some(boot) = &layout.boot {
    out.write_serialized(&BootRecordVolumeDescriptor {
      boot_catalog_location: boot.catalog_lba,
    })?;
  }

  if layout.options.joliet.is_some() {
    out.write_serialized(&standard_descriptor(
      layout,
      StandardDescriptorKind::Supplementary {
        escape_sequences: escape_sequences::field(escape_sequences::UCS2_LEVEL_3),
      },
      now,
    ))?;
  }

  out.write_serialized(&VolumeDescriptorSetTerminator)?;
  Ok(())
}

fn write_path_tables<W: Write>(layout: &Layout, out: &mut SectorWriter<W>) -> Result<()> {
  write_path_table_set(layout, Hierarchy::Iso9660, &layout.iso_path_tables, out)?;

  if let Some(tables) = &layout.joliet_path_tables {
    write_path_table_set(layout, Hierarchy::Joliet, tables, out)?;
  }

  Ok(())
}

fn write_path_table_set<W: Write>(
  layout: &Layout,
  hierarchy: Hierarchy,
  tables: &PathTableSet,
  out: &mut SectorWriter<W>,
) -> Result<()> {
  let records = layout.path_table_records(hierarchy);

  let render = |endian: Endianness| -> Result<Vec<u8>> {
    let mut buf = vec![0u8; tables.size as usize];
    let mut offset = 0;
    for record in &records {
      record.serialize_endian(endian, &mut buf[offset..])?;
      offset += record.extent();
    }
    Ok(buf)
  };

  let little = render(Endianness::Little)?;
  let big = render(Endianness::Big)?;

  for (lba, table) in [
    (tables.type_l, &little),
    (tables.optional_l, &little),
    (tables.type_m, &big),
    (tables.optional_m, &big),
  ] {
    out.pad_to_sector(lba)?;
    out.write_all(table)?;
  }

  Ok(())
}

fn write_directories<W: Write>(
  layout: &Layout,
  out: &mut SectorWriter<W>,
  now: RecordedDateTime,
) -> Result<()> {
  let system_use = layout
    .options
    .rock_ridge
    .as_ref()
    .map(SystemUseEntries::new);

  for dir in &layout.directories {
    let extent = layout.tree.node(*dir).extent.unwrap_or(0);
    out.pad_to_sector(extent)?;
    let data = render_directory(layout, *dir, Hierarchy::Iso9660, system_use.as_ref(), now)?;
    out.write_all(&data)?;
  }

  if layout.options.joliet.is_some() {
    for dir in &layout.directories {
      let extent = layout.tree.node(*dir).joliet_extent.unwrap_or(0);
      out.pad_to_sector(extent)?;
      let data = render_directory(layout, *dir, Hierarchy::Joliet, None, now)?;
      out.write_all(&data)?;
    }
  }

  Ok(())
}

/// Hard links reported for a directory: `.`, `..` and one per child
/// directory.
fn directory_links(tree: &Tree, id: NodeId) -> u32 {
  2 + tree
    .node(id)
    .children()
    .iter()
    .filter(|child| tree.node(**child).is_directory())
    .count() as u32
}

fn render_directory(
  layout: &Layout,
  dir: NodeId,
  hierarchy: Hierarchy,
  system_use: Option<&SystemUseEntries>,
  now: RecordedDateTime,
) -> Result<Vec<u8>> {
  let tree = &layout.tree;
  let node = tree.node(dir);
  let sequence = layout.options.iso9660.volume_sequence_number;

  let (own_extent, own_length) = match hierarchy {
    Hierarchy::Iso9660 => (node.extent.unwrap_or(0), node.data_length),
    Hierarchy::Joliet => (node.joliet_extent.unwrap_or(0), node.joliet_data_length),
  };

  let parent = node.parent.unwrap_or(dir);
  let parent_node = tree.node(parent);
  let (parent_extent, parent_length) = match hierarchy {
    Hierarchy::Iso9660 => (parent_node.extent.unwrap_or(0), parent_node.data_length),
    Hierarchy::Joliet => (
      parent_node.joliet_extent.unwrap_or(0),
      parent_node.joliet_data_length,
    ),
  };

  let mut records = Vec::new();

  let self_record = |identifier: u8, extent, length, su: Vec<u8>| DirectoryRecord {
    extended_attribute_length: 0,
    extent_location: extent,
    data_length: length,
    recording_date: now,
    file_flags: FileFlags::DIRECTORY,
    file_unit_size: 0,
    interleave_gap_size: 0,
    volume_sequence_number: sequence,
    identifier: vec![identifier],
    system_use: su,
  };

  let links = directory_links(tree, dir);
  let mode = node.posix_mode.unwrap_or(0);
  let (dot_su, dot_dot_su) = match system_use {
    Some(su) => {
      let dot = if node.parent.is_none() {
        su.for_root_dot(mode, links)
      } else {
        su.for_dot(mode, links)
      };
      let original = node
        .original_parent
        .map(|id| tree.node(id).extent.unwrap_or(0));
      let parent_mode = parent_node.posix_mode.unwrap_or(0);
      let parent_links = directory_links(tree, parent);
      (dot, su.for_dot_dot(parent_mode, parent_links, original))
    }
    None => (Vec::new(), Vec::new()),
  };

  records.push(self_record(0, own_extent, own_length, dot_su));
  records.push(self_record(1, parent_extent, parent_length, dot_dot_su));

  for child in node.children() {
    let child_node = tree.node(*child);

    if hierarchy == Hierarchy::Joliet && child_node.names.joliet.is_none() {
      continue;
    }

    let (flags, extent, length) = match (&child_node.kind, hierarchy) {
      (NodeKind::Directory { .. }, Hierarchy::Iso9660) => (
        FileFlags::DIRECTORY,
        child_node.extent.unwrap_or(0),
        child_node.data_length,
      ),
      (NodeKind::Directory { .. }, Hierarchy::Joliet) => (
        FileFlags::DIRECTORY,
        child_node.joliet_extent.unwrap_or(0),
        child_node.joliet_data_length,
      ),
      (NodeKind::File { .. }, _) => (
        FileFlags::empty(),
        child_node.extent.unwrap_or(0),
        child_node.data_length,
      ),
      // The placeholder reads as an empty file; Rock Ridge readers follow
      // its child link instead.
      (NodeKind::RelocationMark { .. }, _) => (FileFlags::empty(), 0, 0),
    };

    let su = match system_use {
      Some(su) => {
        let name = child_node.names.rock_ridge.clone().unwrap_or_default();
        let child_links = if child_node.is_directory() {
          directory_links(tree, *child)
        } else {
          1
        };
        let child_link = match &child_node.kind {
          NodeKind::RelocationMark { target } => Some(tree.node(*target).extent.unwrap_or(0)),
          _ => None,
        };
        su.for_entry(
          &name,
          child_node.posix_mode.unwrap_or(0),
          child_links,
          child_node.original_parent.is_some(),
          child_link,
        )
      }
      None => Vec::new(),
    };

    records.push(DirectoryRecord {
      extended_attribute_length: 0,
      extent_location: extent,
      data_length: length,
      recording_date: now,
      file_flags: flags,
      file_unit_size: 0,
      interleave_gap_size: 0,
      volume_sequence_number: sequence,
      identifier: hierarchy.identifier(child_node),
      system_use: su,
    });
  }

  let mut buf = vec![0u8; own_length as usize];
  let sector = LOGICAL_BLOCK_SIZE as usize;
  let mut offset = 0;

  for record in &records {
    let len = record.extent();
    let within = offset % sector;
    if within + len > sector {
      offset += sector - within;
    }
    record.serialize(&mut buf[offset..offset + len])?;
    offset += len;
  }

  Ok(buf)
}

fn write_file_data<W: Write>(layout: &Layout, out: &mut SectorWriter<W>) -> Result<()> {
  let boot_image = layout.boot.as_ref().map(|boot| boot.image);
  let patch_table = layout
    .options
    .el_torito
    .as_ref()
    .is_some_and(|et| et.gen_boot_info_table);

  for dir in &layout.directories {
    for child in layout.tree.node(*dir).children() {
      let node = layout.tree.node(*child);
      let NodeKind::File { content } = &node.kind else {
        continue;
      };

      out.pad_to_sector(node.extent.unwrap_or(0))?;

      if boot_image == Some(*child) && patch_table {
        let mut image = Vec::with_capacity(node.data_length as usize);
        content.copy_to(&mut image)?;
        patch_boot_info_table(&mut image, RESERVED_BLOCKS, node.extent.unwrap_or(0))?;
        out.write_all(&image)?;
      } else {
        let written = content.copy_to(&mut out.inner)?;
        out.position += written;
      }
    }
  }

  Ok(())
}

/// Forward-only sector-aligned writer tracking its absolute position.
struct SectorWriter<W> {
  inner: W,
  position: u64,
}

impl<W: Write> SectorWriter<W> {
  fn new(inner: W) -> Self {
    Self { inner, position: 0 }
  }

  fn write_all(&mut self, buf: &[u8]) -> Result<()> {
    self.inner.write_all(buf)?;
    self.position += buf.len() as u64;
    Ok(())
  }

  fn write_serialized(&mut self, value: &impl IsoSerialize) -> Result<()> {
    let mut buf = vec![0u8; value.extent()];
    value.serialize(&mut buf)?;
    self.write_all(&buf)
  }

  /// Zero-fill up to the start of the given sector. Writing is strictly
  /// forward; a target behind the current position is a layout bug.
  fn pad_to_sector(&mut self, lba: u32) -> Result<()> {
    let target = lba as u64 * LOGICAL_BLOCK_SIZE as u64;

    if target < self.position {
      return Err(Error::Format(format!(
        "write position {} already past sector {lba}",
        self.position
      )));
    }

    const ZEROS: [u8; 4096] = [0u8; 4096];
    let mut remaining = target - self.position;
    while remaining > 0 {
      let chunk = remaining.min(ZEROS.len() as u64) as usize;
      self.inner.write_all(&ZEROS[..chunk])?;
      self.position += chunk as u64;
      remaining -= chunk as u64;
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::JolietConfig;
  use crate::serialize::{get_u16_both, get_u32_both, get_u32_le};

  fn build(options: ImageOptions, populate: impl FnOnce(&mut Tree)) -> (Vec<u8>, BuildReport) {
    let mut writer = IsoWriter::new(options);
    populate(writer.tree_mut());

    let mut image = Vec::new();
    let report = writer.finalize(&mut image).unwrap();
    (image, report)
  }

  #[test]
  fn image_length_matches_reported_sectors() {
    let (image, report) = build(ImageOptions::default(), |tree| {
      tree.insert_file("hello.txt", b"hello".to_vec().into()).unwrap();
    });

    assert_eq!(image.len() as u64, report.total_sectors as u64 * 2048);
  }

  #[test]
  fn primary_descriptor_lands_at_sector_16() {
    let (image, report) = build(ImageOptions::default(), |tree| {
      tree.insert_file("hello.txt", b"hello".to_vec().into()).unwrap();
    });

    let pvd = &image[16 * 2048..17 * 2048];
    assert_eq!(pvd[0], 1);
    assert_eq!(&pvd[1..6], b"CD001");
    assert_eq!(get_u16_both(pvd, 128), 2048);
    assert_eq!(get_u32_both(pvd, 80), report.total_sectors);

    // No Joliet, no boot: the terminator follows immediately.
    let terminator = &image[17 * 2048..18 * 2048];
    assert_eq!(terminator[0], 255);
    assert_eq!(&terminator[1..6], b"CD001");
  }

  #[test]
  fn root_directory_opens_with_self_records() {
    let (image, _) = build(ImageOptions::default(), |tree| {
      tree.insert_file("hello.txt", b"hello".to_vec().into()).unwrap();
    });

    let pvd = &image[16 * 2048..17 * 2048];
    let root_extent = get_u32_both(&pvd[156..], 2) as usize;
    let root = &image[root_extent * 2048..(root_extent + 1) * 2048];

    // `.` and `..` of the root both point at the root itself.
    assert_eq!(root[0], 34);
    assert_eq!(root[32], 1);
    assert_eq!(root[33], 0);
    assert_eq!(get_u32_both(&root[34..], 2) as usize, root_extent);
    assert_eq!(root[66], 1);
    assert_eq!(root[67], 1);

    // Then the single file record.
    let record = &root[68..];
    let id_len = record[32] as usize;
    assert_eq!(&record[33..33 + id_len], b"HELLO.TXT;1");

    let file_extent = get_u32_both(record, 2) as usize;
    assert_eq!(get_u32_both(record, 10), 5);
    assert_eq!(&image[file_extent * 2048..file_extent * 2048 + 5], b"hello");
  }

  #[test]
  fn joliet_descriptor_references_its_own_hierarchy() {
    let options = ImageOptions {
      joliet: Some(JolietConfig::default()),
      ..Default::default()
    };
    let (image, _) = build(options, |tree| {
      tree
        .insert_file("Long Mixed Case.txt", b"x".to_vec().into())
        .unwrap();
    });

    let svd = &image[17 * 2048..18 * 2048];
    assert_eq!(svd[0], 2);
    assert_eq!(&svd[88..91], b"%/E");

    let pvd = &image[16 * 2048..17 * 2048];
    let iso_root = get_u32_both(&pvd[156..], 2);
    let joliet_root = get_u32_both(&svd[156..], 2);
    assert_ne!(iso_root, joliet_root);

    // The Joliet file record carries the UCS-2 name unmangled.
    let root = &image[joliet_root as usize * 2048..(joliet_root as usize + 1) * 2048];
    let record = &root[68..];
    let id_len = record[32] as usize;
    let name: Vec<u8> = crate::serialize::ucs2_bytes("Long Mixed Case.txt;1");
    assert_eq!(&record[33..33 + id_len], &name[..]);
  }

  #[test]
  fn path_tables_come_in_four_copies() {
    let (image, _) = build(ImageOptions::default(), |tree| {
      tree.insert_file("dir/file.bin", vec![1, 2, 3].into()).unwrap();
    });

    let pvd = &image[16 * 2048..17 * 2048];
    let size = get_u32_both(pvd, 132) as usize;
    let l = get_u32_le(pvd, 140) as usize;
    let m = get_u32_be_at(pvd, 148) as usize;

    // Root record then "DIR" in the little-endian table.
    let table = &image[l * 2048..l * 2048 + size];
    assert_eq!(table[0], 1);
    assert_eq!(get_u32_le(table, 2), get_u32_both(&pvd[156..], 2));
    assert_eq!(&table[10 + 8..10 + 11], b"DIR");

    // The M table holds the same records big-endian.
    let m_table = &image[m * 2048..m * 2048 + size];
    assert_eq!(get_u32_be_at(m_table, 2), get_u32_both(&pvd[156..], 2));
  }

  fn get_u32_be_at(buf: &[u8], off: usize) -> u32 {
    crate::serialize::get_u32_be(buf, off)
  }

  #[test]
  fn rock_ridge_root_announces_susp() {
    let options = ImageOptions {
      rock_ridge: Some(crate::config::RockRidgeConfig::default()),
      ..Default::default()
    };
    let (image, _) = build(options, |tree| {
      tree.insert_file("hello world.txt", b"hi".to_vec().into()).unwrap();
    });

    let pvd = &image[16 * 2048..17 * 2048];
    let root_extent = get_u32_both(&pvd[156..], 2) as usize;
    let root = &image[root_extent * 2048..(root_extent + 1) * 2048];

    // System use of the root `.` record starts right after the 34-byte
    // fixed part and opens with the SP indicator.
    assert_eq!(&root[34..41], &[b'S', b'P', 7, 1, 0xbe, 0xef, 0]);

    // The file record's NM entry preserves the original-style name.
    let haystack = &root[..2048];
    let nm = b"hello_world.txt";
    assert!(haystack
      .windows(nm.len())
      .any(|window| window == nm.as_slice()));
  }
}
