//! Image layout: turning an annotated entry tree into concrete extents.
//!
//! Layout happens in passes over the tree. Deep directories are relocated
//! first so every later pass sees the final shape, then each active naming
//! convention resolves and deduplicates on-disc names, then directory data
//! lengths are computed, and finally every structure is assigned a logical
//! block address in a fixed order: ISO 9660 path tables, Joliet path
//! tables, ISO 9660 directory extents, Joliet directory extents, the boot
//! catalog, and file data.

use std::collections::HashMap;

use crate::config::ImageOptions;
use crate::lba::LbaAllocator;
use crate::naming::{
  deduplicate_directory, deduplicate_file, split_name, Iso9660Names, JolietNames, NamingConvention,
  RockRidgeNames,
};
use crate::path::IsoPath;
use crate::prelude::*;
use crate::rockridge::{resolve_mode, SystemUseEntries};
use crate::serialize::ucs2_bytes;
use crate::spec::{
  DirectoryRecord, LOGICAL_BLOCK_SIZE, RESERVED_BLOCKS, SELF_RECORD_EXTENT,
};
use crate::tree::{NodeId, NodeKind, Tree};

/// Maximum directory nesting before relocation kicks in.
const MAX_DIRECTORY_DEPTH: usize = 8;

/// Sectors per pressed-media pregap unit; images are padded to a multiple.
const PAD_SECTOR_MULTIPLE: u32 = 150;

/// ISO 9660 file identifiers carry a version number.
pub const VERSION_SUFFIX: &str = ";1";

/// Locations of the four on-disc copies of one path table.
#[derive(Debug, Clone, Copy)]
pub struct PathTableSet {
  pub size: u32,
  pub type_l: u32,
  pub optional_l: u32,
  pub type_m: u32,
  pub optional_m: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct BootLayout {
  pub catalog_lba: u32,
  /// The boot image is an ordinary file entry; its extent doubles as the
  /// load RBA.
  pub image: NodeId,
}

/// The fully-resolved image layout the writer renders verbatim.
pub struct Layout {
  pub tree: Tree,
  pub options: ImageOptions,
  pub warnings: Vec<Warning>,
  /// Directories in breadth-first order; also the path table record order.
  pub directories: Vec<NodeId>,
  pub iso_path_tables: PathTableSet,
  pub joliet_path_tables: Option<PathTableSet>,
  pub boot: Option<BootLayout>,
  pub total_sectors: u32,
  pub descriptor_count: u32,
}

impl Layout {
  pub fn build(mut tree: Tree, options: ImageOptions) -> Result<Self> {
    let mut warnings = Vec::new();

    if let Some(joliet) = &options.joliet {
      if joliet.max_filename_length > 64 {
        log::warn!(
          "Joliet filename limit {} exceeds the standard 64",
          joliet.max_filename_length
        );
        warnings.push(Warning::JolietLimitNonStandard(joliet.max_filename_length));
      }
    }

    if options.iso9660.restrict_dir_depth_to_8 {
      relocate_deep_directories(&mut tree, &options)?;
    }

    resolve_names(&mut tree, &options, &mut warnings)?;
    resolve_modes(&mut tree, &options);

    let directories = tree.directories_breadth_first();

    let iso_table_size = path_table_size(&tree, &directories, Hierarchy::Iso9660);
    let joliet_table_size = options
      .joliet
      .as_ref()
      .map(|_| path_table_size(&tree, &directories, Hierarchy::Joliet));

    size_directories(&mut tree, &directories, &options);

    // Descriptor sequence: primary, then boot record, then supplementary,
    // then the set terminator.
    let descriptor_count = 2
      + u32::from(options.el_torito.is_some())
      + u32::from(options.joliet.is_some());

    let mut allocator = LbaAllocator::new(
      LOGICAL_BLOCK_SIZE as u32,
      RESERVED_BLOCKS + descriptor_count,
    );

    let iso_path_tables = allocate_path_tables(&mut allocator, iso_table_size);
    let joliet_path_tables =
      joliet_table_size.map(|size| allocate_path_tables(&mut allocator, size));

    for id in &directories {
      let length = tree.node(*id).data_length;
      tree.node_mut(*id).extent = Some(allocator.allocate(length));
    }

    if options.joliet.is_some() {
      for id in &directories {
        let length = tree.node(*id).joliet_data_length;
        tree.node_mut(*id).joliet_extent = Some(allocator.allocate(length));
      }
    }

    let boot = match &options.el_torito {
      Some(el_torito) => {
        let logical = el_torito.boot_image.to_string_lossy();
        let image = find_file(&tree, IsoPath::new(&logical)).ok_or_else(|| {
          Error::Config(format!("boot image not found in the image tree: {logical}"))
        })?;

        Some(BootLayout {
          catalog_lba: allocator.allocate(LOGICAL_BLOCK_SIZE as u32),
          image,
        })
      }
      None => None,
    };

    allocate_file_data(&mut tree, &directories, &mut allocator)?;

    let mut total_sectors = allocator.next_lba();
    if options.iso9660.pad_end {
      total_sectors = total_sectors.div_ceil(PAD_SECTOR_MULTIPLE) * PAD_SECTOR_MULTIPLE;
    }

    Ok(Self {
      tree,
      options,
      warnings,
      directories,
      iso_path_tables,
      joliet_path_tables,
      boot,
      total_sectors,
      descriptor_count,
    })
  }

  /// Path table records in table order, little or big endian agnostic.
  pub fn path_table_records(&self, hierarchy: Hierarchy) -> Vec<crate::spec::PathTableRecord> {
    let numbers: HashMap<NodeId, u16> = self
      .directories
      .iter()
      .enumerate()
      .map(|(ix, id)| (*id, (ix + 1) as u16))
      .collect();

    self
      .directories
      .iter()
      .map(|id| {
        let node = self.tree.node(*id);
        let parent = node.parent.map(|p| numbers[&p]).unwrap_or(1);

        crate::spec::PathTableRecord {
          extent_location: match hierarchy {
            Hierarchy::Iso9660 => node.extent.unwrap_or(0),
            Hierarchy::Joliet => node.joliet_extent.unwrap_or(0),
          },
          parent_directory_number: parent,
          identifier: if node.parent.is_none() {
            vec![0]
          } else {
            hierarchy.identifier(node)
          },
        }
      })
      .collect()
  }
}

/// Which of the two recorded directory hierarchies is being rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hierarchy {
  Iso9660,
  Joliet,
}

impl Hierarchy {
  /// On-disc identifier bytes for a named entry, version suffix included
  /// for files.
  pub fn identifier(&self, node: &crate::tree::Node) -> Vec<u8> {
    let (name, versioned) = match &node.kind {
      NodeKind::File { .. } => (node.names_for(*self), true),
      _ => (node.names_for(*self), false),
    };

    let name = name.unwrap_or_default();
    match self {
      Hierarchy::Iso9660 => {
        let mut id = name.into_bytes();
        if versioned {
          id.extend_from_slice(VERSION_SUFFIX.as_bytes());
        }
        id
      }
      Hierarchy::Joliet => {
        let mut id = ucs2_bytes(&name);
        if versioned {
          id.extend_from_slice(&ucs2_bytes(VERSION_SUFFIX));
        }
        id
      }
    }
  }
}

impl crate::tree::Node {
  pub(crate) fn names_for(&self, hierarchy: Hierarchy) -> Option<String> {
    match hierarchy {
      Hierarchy::Iso9660 => self.names.iso9660.clone(),
      Hierarchy::Joliet => self.names.joliet.clone(),
    }
  }
}

/// Move directories nested too deep into the moved-directories store,
/// walking top-down so a relocated subtree is only processed once.
fn relocate_deep_directories(tree: &mut Tree, options: &ImageOptions) -> Result<()> {
  let mut store = None;

  loop {
    let too_deep = tree
      .directories_breadth_first()
      .into_iter()
      .find(|id| tree.node(*id).is_directory() && tree.depth(*id) > MAX_DIRECTORY_DEPTH);

    let Some(deep) = too_deep else {
      return Ok(());
    };

    let store = match store {
      Some(id) => id,
      None => {
        let id = tree.add_directory(tree.root(), &options.moved_store_name())?;
        store = Some(id);
        id
      }
    };

    log::debug!(
      "Relocating over-deep directory {:?}",
      tree.logical_path(deep)
    );
    tree.relocate_directory(deep, store);
  }
}

/// Resolve every entry's on-disc names under each active convention and
/// deduplicate against siblings, then sort children into ISO 9660 record
/// order.
fn resolve_names(
  tree: &mut Tree,
  options: &ImageOptions,
  warnings: &mut Vec<Warning>,
) -> Result<()> {
  let iso = Iso9660Names::new(&options.iso9660);
  let joliet = options.joliet.as_ref().map(JolietNames::new);
  let rock_ridge = options.rock_ridge.as_ref().map(RockRidgeNames::new);

  for dir in tree.directories_breadth_first() {
    let children = tree.node(dir).children().to_vec();

    let mut iso_taken: Vec<String> = Vec::new();
    let mut joliet_taken: Vec<String> = Vec::new();
    let mut rr_taken: Vec<String> = Vec::new();

    for child in children {
      let name = tree.node(child).name().to_string();
      let directory_like = !matches!(tree.node(child).kind, NodeKind::File { .. });

      let resolved = apply_convention(&iso, &name, directory_like, &mut iso_taken, warnings)?;
      tree.node_mut(child).names.iso9660 = Some(resolved);

      // Relocation placeholders only exist for Rock Ridge readers; the
      // Joliet hierarchy omits them.
      let placeholder = matches!(tree.node(child).kind, NodeKind::RelocationMark { .. });

      if let Some(joliet) = &joliet {
        if !placeholder {
          let resolved = apply_convention(joliet, &name, directory_like, &mut joliet_taken, warnings)?;
          tree.node_mut(child).names.joliet = Some(resolved);
        }
      }

      if let Some(rock_ridge) = &rock_ridge {
        let resolved = apply_convention(rock_ridge, &name, directory_like, &mut rr_taken, warnings)?;
        tree.node_mut(child).names.rock_ridge = Some(resolved);
      }
    }

    sort_children(tree, dir);
  }

  check_path_lengths(tree, &iso, warnings);

  Ok(())
}

fn apply_convention(
  convention: &dyn NamingConvention,
  name: &str,
  directory_like: bool,
  taken: &mut Vec<String>,
  warnings: &mut Vec<Warning>,
) -> Result<String> {
  let resolved = if directory_like {
    let applied = convention.apply_directory(name, warnings)?;
    deduplicate_directory(convention, applied, taken)
  } else {
    let (stem, extension) = split_name(name);
    let applied = convention.apply_file(stem, extension, warnings)?;
    convention.render_file(&deduplicate_file(convention, applied, taken))
  };

  taken.push(resolved.clone());
  Ok(resolved)
}

/// ISO 9660 requires directory records sorted by identifier bytes.
fn sort_children(tree: &mut Tree, dir: NodeId) {
  let mut children = tree.node(dir).children().to_vec();
  children.sort_by(|a, b| {
    Hierarchy::Iso9660
      .identifier(tree.node(*a))
      .cmp(&Hierarchy::Iso9660.identifier(tree.node(*b)))
  });

  if let NodeKind::Directory { children: slot } = &mut tree.node_mut(dir).kind {
    *slot = children;
  }
}

fn check_path_lengths(tree: &Tree, iso: &Iso9660Names, warnings: &mut Vec<Warning>) {
  for dir in tree.directories_breadth_first() {
    for child in tree.node(dir).children() {
      let mut parts = Vec::new();
      let mut current = Some(*child);
      while let Some(id) = current {
        let node = tree.node(id);
        if let Some(name) = &node.names.iso9660 {
          parts.push(name.clone());
        }
        current = node.parent;
      }
      parts.reverse();
      iso.check_path_length(&parts.join("/"), warnings);
    }
  }
}

fn resolve_modes(tree: &mut Tree, options: &ImageOptions) {
  let Some(rock_ridge) = &options.rock_ridge else {
    return;
  };

  for dir in tree.directories_breadth_first() {
    for child in tree.node(dir).children().to_vec() {
      let path = tree.logical_path(child);
      let directory = tree.node(child).is_directory();
      tree.node_mut(child).posix_mode = Some(resolve_mode(rock_ridge, &path, directory));
    }

    let path = tree.logical_path(dir);
    tree.node_mut(dir).posix_mode = Some(resolve_mode(rock_ridge, &path, true));
  }
}

fn path_table_size(tree: &Tree, directories: &[NodeId], hierarchy: Hierarchy) -> u32 {
  directories
    .iter()
    .map(|id| {
      let node = tree.node(*id);
      let identifier_len = if node.parent.is_none() {
        1
      } else {
        hierarchy.identifier(node).len()
      };
      (8 + identifier_len + identifier_len % 2) as u32
    })
    .sum()
}

fn allocate_path_tables(allocator: &mut LbaAllocator, size: u32) -> PathTableSet {
  PathTableSet {
    size,
    type_l: allocator.allocate(size),
    optional_l: allocator.allocate(size),
    type_m: allocator.allocate(size),
    optional_m: allocator.allocate(size),
  }
}

/// Compute the recorded data length of every directory in both
/// hierarchies. Directory records never straddle a sector boundary; a
/// record that would is pushed to the next sector.
fn size_directories(tree: &mut Tree, directories: &[NodeId], options: &ImageOptions) {
  let system_use = options.rock_ridge.as_ref().map(SystemUseEntries::new);

  for dir in directories {
    let node = tree.node(*dir);
    let root = node.parent.is_none();

    let mut iso_lengths = Vec::new();
    let mut joliet_lengths = Vec::new();

    // `.` and `..` records open every directory extent.
    let (dot_su, dot_dot_su) = match &system_use {
      Some(su) => {
        let mode = node.posix_mode.unwrap_or(0);
        let dot = if root {
          su.for_root_dot(mode, 2)
        } else {
          su.for_dot(mode, 2)
        };
        let relocated = node.original_parent.map(|_| 0);
        (dot.len(), su.for_dot_dot(mode, 2, relocated).len())
      }
      None => (0, 0),
    };
    iso_lengths.push(SELF_RECORD_EXTENT + dot_su);
    iso_lengths.push(SELF_RECORD_EXTENT + dot_dot_su);
    joliet_lengths.push(SELF_RECORD_EXTENT);
    joliet_lengths.push(SELF_RECORD_EXTENT);

    for child in node.children() {
      let child_node = tree.node(*child);

      let su_len = match &system_use {
        Some(su) => {
          let name = child_node.names.rock_ridge.clone().unwrap_or_default();
          let relocated = child_node.original_parent.is_some();
          let child_link =
            matches!(child_node.kind, NodeKind::RelocationMark { .. }).then_some(0);
          su.for_entry(
            &name,
            child_node.posix_mode.unwrap_or(0),
            1,
            relocated,
            child_link,
          )
          .len()
        }
        None => 0,
      };

      let iso_id = Hierarchy::Iso9660.identifier(child_node).len();
      iso_lengths.push(DirectoryRecord::extent_for(iso_id, su_len));

      if child_node.names.joliet.is_some() {
        let joliet_id = Hierarchy::Joliet.identifier(child_node).len();
        joliet_lengths.push(DirectoryRecord::extent_for(joliet_id, 0));
      }
    }

    let node = tree.node_mut(*dir);
    node.data_length = directory_data_length(&iso_lengths);
    node.joliet_data_length = directory_data_length(&joliet_lengths);
  }
}

fn directory_data_length(record_lengths: &[usize]) -> u32 {
  let sector = LOGICAL_BLOCK_SIZE as usize;
  let mut offset = 0usize;

  for len in record_lengths {
    let within = offset % sector;
    if within + len > sector {
      offset += sector - within;
    }
    offset += len;
  }

  (offset.div_ceil(sector) * sector) as u32
}

fn allocate_file_data(
  tree: &mut Tree,
  directories: &[NodeId],
  allocator: &mut LbaAllocator,
) -> Result<()> {
  for dir in directories {
    for child in tree.node(*dir).children().to_vec() {
      let NodeKind::File { content } = &tree.node(child).kind else {
        continue;
      };

      let size = content.extent();
      let size = u32::try_from(size).map_err(|_| {
        Error::Format(format!(
          "file too large for a single extent: {:?} ({size} bytes)",
          tree.logical_path(child)
        ))
      })?;

      let node = tree.node_mut(child);
      node.extent = Some(allocator.allocate(size));
      node.data_length = size;
    }
  }

  Ok(())
}

/// Look a file entry up by logical path.
fn find_file(tree: &Tree, path: &IsoPath) -> Option<NodeId> {
  let mut current = tree.root();

  for part in path.components() {
    current = tree
      .node(current)
      .children()
      .iter()
      .copied()
      .find(|id| tree.node(*id).name() == part)?;
  }

  matches!(tree.node(current).kind, NodeKind::File { .. }).then_some(current)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{JolietConfig, RockRidgeConfig};

  fn deep_tree(levels: usize) -> Tree {
    let mut tree = Tree::new();
    let path = (0..levels).map(|ix| format!("d{ix}")).collect::<Vec<_>>();
    tree.make_directories(IsoPath::new(&path.join("/"))).unwrap();
    tree
  }

  #[test]
  fn eight_levels_stay_in_place() {
    let layout = Layout::build(deep_tree(8), ImageOptions::default()).unwrap();
    assert!(!layout
      .directories
      .iter()
      .any(|id| layout.tree.node(*id).original_parent.is_some()));
  }

  #[test]
  fn ninth_level_is_relocated_into_the_store() {
    let mut tree = deep_tree(9);
    tree
      .insert_file("d0/d1/d2/d3/d4/d5/d6/d7/d8/file.txt", Vec::new().into())
      .unwrap();

    let options = ImageOptions {
      rock_ridge: Some(RockRidgeConfig::default()),
      ..Default::default()
    };
    let layout = Layout::build(tree, options).unwrap();

    let relocated = layout
      .directories
      .iter()
      .find(|id| layout.tree.node(**id).original_parent.is_some())
      .copied()
      .expect("deep directory should be relocated");

    assert_eq!(layout.tree.logical_path(relocated), ".rr_moved/d8");
    assert!(layout
      .directories
      .iter()
      .all(|id| layout.tree.depth(*id) <= MAX_DIRECTORY_DEPTH));
  }

  #[test]
  fn relocation_can_be_disabled() {
    let mut options = ImageOptions::default();
    options.iso9660.restrict_dir_depth_to_8 = false;

    let layout = Layout::build(deep_tree(10), options).unwrap();
    assert!(!layout
      .directories
      .iter()
      .any(|id| layout.tree.node(*id).original_parent.is_some()));
    assert!(layout
      .directories
      .iter()
      .any(|id| layout.tree.depth(*id) == 10));
  }

  #[test]
  fn directory_records_never_straddle_sectors() {
    // 51 records of 40 bytes fit in one sector; a 52nd would cross the
    // boundary and gets pushed to a second sector.
    let lengths = vec![40usize; 51];
    assert_eq!(directory_data_length(&lengths), 2048);
    let lengths = vec![40usize; 52];
    assert_eq!(directory_data_length(&lengths), 4096);

    let lengths = vec![2000usize, 100];
    assert_eq!(directory_data_length(&lengths), 4096);
  }

  #[test]
  fn allocation_order_is_stable() {
    let mut tree = Tree::new();
    tree.insert_file("a/hello.txt", b"hi".to_vec().into()).unwrap();

    let options = ImageOptions {
      joliet: Some(JolietConfig::default()),
      ..Default::default()
    };
    let layout = Layout::build(tree, options).unwrap();

    // Primary + supplementary + terminator descriptors.
    assert_eq!(layout.descriptor_count, 3);

    let tables = layout.iso_path_tables;
    assert_eq!(tables.type_l, RESERVED_BLOCKS + 3);
    assert!(tables.optional_l > tables.type_l);
    assert!(tables.type_m > tables.optional_l);

    let joliet = layout.joliet_path_tables.unwrap();
    assert!(joliet.type_l > tables.optional_m);

    let root = layout.tree.root();
    let root_extent = layout.tree.node(root).extent.unwrap();
    assert!(root_extent > joliet.optional_m);
    assert!(layout.tree.node(root).joliet_extent.unwrap() > root_extent);
  }

  #[test]
  fn image_is_padded_to_a_pregap_multiple() {
    let mut tree = Tree::new();
    tree.insert_file("f.txt", b"x".to_vec().into()).unwrap();

    let layout = Layout::build(tree, ImageOptions::default()).unwrap();
    assert_eq!(layout.total_sectors % PAD_SECTOR_MULTIPLE, 0);
  }

  #[test]
  fn path_table_parent_numbers_are_breadth_first() {
    let mut tree = Tree::new();
    tree.make_directories(IsoPath::new("a/b")).unwrap();
    tree.make_directories(IsoPath::new("c")).unwrap();

    let layout = Layout::build(tree, ImageOptions::default()).unwrap();
    let records = layout.path_table_records(Hierarchy::Iso9660);

    assert_eq!(records[0].identifier, vec![0]);
    assert_eq!(records[0].parent_directory_number, 1);
    assert_eq!(records[1].identifier, b"A".to_vec());
    assert_eq!(records[1].parent_directory_number, 1);
    // "B" sits under "A", which is table entry 2.
    let b = records.iter().find(|r| r.identifier == b"B".to_vec()).unwrap();
    assert_eq!(b.parent_directory_number, 2);
  }

  #[test]
  fn version_suffix_only_applies_to_files() {
    let mut tree = Tree::new();
    tree.insert_file("dir/file.txt", Vec::new().into()).unwrap();

    let layout = Layout::build(tree, ImageOptions::default()).unwrap();
    let dir = layout.tree.node(layout.tree.root()).children()[0];
    assert_eq!(Hierarchy::Iso9660.identifier(layout.tree.node(dir)), b"DIR");

    let file = layout.tree.node(dir).children()[0];
    assert_eq!(
      Hierarchy::Iso9660.identifier(layout.tree.node(file)),
      b"FILE.TXT;1"
    );
  }
}
