//! End-to-end build-then-open tests over in-memory images.

use std::io::{Cursor, Read};

use isotools::{
  ElToritoConfig, ImageOptions, IsoFileSystem, IsoWriter, JolietConfig, RockRidgeConfig,
};

fn build_image(options: ImageOptions, populate: impl FnOnce(&mut isotools::Tree)) -> Vec<u8> {
  let mut writer = IsoWriter::new(options);
  populate(writer.tree_mut());

  let mut image = Vec::new();
  writer.finalize(&mut image).expect("image build failed");
  image
}

#[test]
fn round_trip_preserves_structure_and_content() {
  let options = ImageOptions {
    joliet: Some(JolietConfig::default()),
    ..Default::default()
  };

  let image = build_image(options, |tree| {
    tree
      .insert_file("docs/Read Me First.txt", b"hello there".to_vec().into())
      .unwrap();
    tree
      .insert_file("docs/guide/intro.md", b"# intro".to_vec().into())
      .unwrap();
    tree.insert_file("empty.bin", Vec::new().into()).unwrap();
  });

  let fs = IsoFileSystem::open(Cursor::new(image)).unwrap();

  // Joliet names survive unmangled.
  let entries: Vec<_> = fs.entries().map(|e| e.unwrap()).collect();
  let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
  assert!(paths.contains(&"docs/Read Me First.txt"));
  assert!(paths.contains(&"docs/guide/intro.md"));
  assert!(paths.contains(&"empty.bin"));

  // Breadth-first: the root comes first, files before deeper levels.
  assert_eq!(entries[0].path, "");
  assert!(entries[0].directory);
  let guide = paths.iter().position(|p| *p == "docs/guide").unwrap();
  let intro = paths.iter().position(|p| *p == "docs/guide/intro.md").unwrap();
  assert!(guide < intro);

  // The plain hierarchy shows the mangled 8.3 names.
  let iso_paths: Vec<String> = fs
    .primary_entries()
    .map(|e| e.unwrap().path)
    .collect();
  assert!(iso_paths.contains(&"DOCS/READ_ME_.TXT".to_string()));

  // Content reads back through the lazy reader.
  let entry = entries
    .iter()
    .find(|e| e.path == "docs/Read Me First.txt")
    .unwrap();
  let mut content = Vec::new();
  fs.open_entry(entry).unwrap().read_to_end(&mut content).unwrap();
  assert_eq!(content, b"hello there");

  let empty = entries.iter().find(|e| e.path == "empty.bin").unwrap();
  let mut content = Vec::new();
  fs.open_entry(empty).unwrap().read_to_end(&mut content).unwrap();
  assert!(content.is_empty());
}

#[test]
fn sibling_collisions_get_numeric_suffixes() {
  let image = build_image(ImageOptions::default(), |tree| {
    tree
      .insert_file("my document.txt", b"a".to_vec().into())
      .unwrap();
    tree
      .insert_file("my.document.txt", b"b".to_vec().into())
      .unwrap();
  });

  let fs = IsoFileSystem::open(Cursor::new(image)).unwrap();
  let names: Vec<String> = fs
    .primary_entries()
    .filter_map(|e| {
      let e = e.unwrap();
      (!e.directory).then_some(e.name)
    })
    .collect();

  assert_eq!(names.len(), 2);
  assert_ne!(names[0], names[1]);
}

#[test]
fn deep_directories_are_relocated_below_eight_levels() {
  let options = ImageOptions {
    rock_ridge: Some(RockRidgeConfig::default()),
    ..Default::default()
  };

  let image = build_image(options, |tree| {
    tree
      .insert_file("a/b/c/d/e/f/g/h/i/j/deep.txt", b"deep".to_vec().into())
      .unwrap();
  });

  let fs = IsoFileSystem::open(Cursor::new(image)).unwrap();
  let entries: Vec<_> = fs.primary_entries().map(|e| e.unwrap()).collect();

  // The moved-directories store shows up at the root.
  assert!(entries
    .iter()
    .any(|e| e.directory && !e.path.contains('/') && e.path.starts_with("_RR")));

  // No remaining directory is deeper than eight levels, and the file is
  // still reachable somewhere.
  for entry in &entries {
    if entry.directory {
      assert!(entry.path.split('/').count() <= 8, "too deep: {}", entry.path);
    }
  }
  assert!(entries.iter().any(|e| e.name == "DEEP.TXT"));
}

#[test]
fn bootable_image_carries_a_valid_catalog() {
  let boot_code = vec![0x90u8; 1024];
  let mut options = ImageOptions::default();
  let mut el_torito = ElToritoConfig::new("boot/loader.bin");
  el_torito.boot_image_id = "TEST".into();
  el_torito.sector_count = 4;
  options.el_torito = Some(el_torito);

  let expected = boot_code.clone();
  let image = build_image(options, move |tree| {
    tree.insert_file("boot/loader.bin", boot_code.into()).unwrap();
  });

  let fs = IsoFileSystem::open(Cursor::new(&image[..])).unwrap();
  let catalog_lba = fs
    .descriptors()
    .boot_catalog_location
    .expect("boot record missing") as usize;

  let catalog = &image[catalog_lba * 2048..(catalog_lba + 1) * 2048];

  // Validation entry: header, zero word sum, 55AA trailer.
  assert_eq!(catalog[0], 0x01);
  assert_eq!(&catalog[30..32], &[0x55, 0xaa]);
  let sum: u32 = catalog[..32]
    .chunks_exact(2)
    .map(|w| u16::from_le_bytes([w[0], w[1]]) as u32)
    .sum();
  assert_eq!(sum & 0xffff, 0);

  // Initial entry points at the boot image content.
  assert_eq!(catalog[32], 0x88);
  let load_rba = u32::from_le_bytes([catalog[40], catalog[41], catalog[42], catalog[43]]) as usize;
  assert_eq!(&image[load_rba * 2048..load_rba * 2048 + 1024], &expected[..]);
}

#[test]
fn joliet_truncation_is_reported_not_fatal() {
  let mut writer = IsoWriter::new(ImageOptions {
    joliet: Some(JolietConfig::default()),
    ..Default::default()
  });
  writer
    .tree_mut()
    .insert_file(format!("{}.txt", "x".repeat(100)), b"x".to_vec().into())
    .unwrap();

  let mut image = Vec::new();
  let report = writer.finalize(&mut image).unwrap();

  assert!(report
    .warnings
    .iter()
    .any(|w| matches!(w, isotools::Warning::JolietTruncation { .. })));
}

#[test]
fn truncation_failure_mode_aborts_the_build() {
  let mut writer = IsoWriter::new(ImageOptions {
    joliet: Some(JolietConfig {
      fail_on_truncation: true,
      ..Default::default()
    }),
    ..Default::default()
  });
  writer
    .tree_mut()
    .insert_file(format!("{}.txt", "x".repeat(100)), b"x".to_vec().into())
    .unwrap();

  assert!(writer.finalize(&mut Vec::new()).is_err());
}
