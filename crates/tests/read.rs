//! Reader behavior against well-formed and malformed images.

use std::io::{Cursor, Read};

use isotools::{Error, ImageOptions, IsoFileSystem, IsoWriter};

fn descriptor_block(descriptor_type: u8) -> Vec<u8> {
  let mut buf = vec![0u8; 2048];
  buf[0] = descriptor_type;
  buf[1..6].copy_from_slice(b"CD001");
  buf[6] = 1;
  buf
}

fn primary_block(block_size: u16) -> Vec<u8> {
  let mut buf = descriptor_block(1);
  buf[128..130].copy_from_slice(&block_size.to_le_bytes());
  buf[130..132].copy_from_slice(&block_size.to_be_bytes());
  // Minimal root directory record at offset 156.
  buf[156] = 34;
  buf[156 + 25] = 2;
  buf[156 + 32] = 1;
  buf
}

fn craft_image(blocks: Vec<Vec<u8>>) -> Vec<u8> {
  let mut image = vec![0u8; 16 * 2048];
  for block in blocks {
    image.extend_from_slice(&block);
  }
  image
}

fn sample_image() -> Vec<u8> {
  let mut writer = IsoWriter::new(ImageOptions::default());
  writer
    .tree_mut()
    .insert_file("data/payload.bin", vec![7u8; 5000].into())
    .unwrap();

  let mut image = Vec::new();
  writer.finalize(&mut image).unwrap();
  image
}

#[test]
fn terminator_before_primary_is_fatal() {
  let image = craft_image(vec![descriptor_block(255)]);
  assert!(matches!(
    IsoFileSystem::open(Cursor::new(image)),
    Err(Error::Format(_))
  ));
}

#[test]
fn foreign_block_size_is_rejected() {
  let image = craft_image(vec![primary_block(4096), descriptor_block(255)]);
  assert!(IsoFileSystem::open(Cursor::new(image)).is_err());
}

#[test]
fn all_ucs2_levels_are_accepted() {
  for triple in [b"%/@", b"%/C", b"%/E"] {
    let mut joliet = primary_block(2048);
    joliet[0] = 2;
    joliet[88..91].copy_from_slice(triple);

    let image = craft_image(vec![primary_block(2048), joliet, descriptor_block(255)]);
    let fs = IsoFileSystem::open(Cursor::new(image)).unwrap();
    assert!(
      fs.descriptors().supplementary.is_some(),
      "escape sequence {:?} not recognized",
      std::str::from_utf8(triple).unwrap()
    );
  }
}

#[test]
fn unknown_escape_sequences_fall_back_to_primary() {
  let mut bogus = primary_block(2048);
  bogus[0] = 2;
  bogus[88..91].copy_from_slice(b"%/Z");

  let image = craft_image(vec![primary_block(2048), bogus, descriptor_block(255)]);
  let fs = IsoFileSystem::open(Cursor::new(image)).unwrap();
  assert!(fs.descriptors().supplementary.is_none());
}

fn root_extent_of(image: &[u8]) -> usize {
  let pvd = 16 * 2048;
  u32::from_le_bytes(image[pvd + 158..pvd + 162].try_into().unwrap()) as usize
}

#[test]
fn garbage_in_directory_padding_is_skipped() {
  let mut image = sample_image();
  let root = root_extent_of(&image);

  // Drop a bogus record (length byte below the 34-byte minimum) into the
  // zero padding after the root's last record.
  let tail = root * 2048 + 2000;
  image[tail] = 17;
  image[tail + 1] = 0xab;

  let fs = IsoFileSystem::open(Cursor::new(image)).unwrap();
  let paths: Vec<String> = fs.primary_entries().map(|e| e.unwrap().path).collect();
  assert!(paths.iter().any(|p| p == "DATA/PAYLOAD.BIN"));
}

#[test]
fn oversized_directory_length_is_rejected_before_allocation() {
  let mut image = sample_image();
  let root = root_extent_of(&image);

  // Corrupt the subdirectory record after `.` and `..`: a declared data
  // length with the high bit set reaches far past the volume end.
  let record = root * 2048 + 68;
  image[record + 10..record + 14].copy_from_slice(&0x8000_0800u32.to_le_bytes());
  image[record + 14..record + 18].copy_from_slice(&0x8000_0800u32.to_be_bytes());

  let fs = IsoFileSystem::open(Cursor::new(image)).unwrap();
  let result: Result<Vec<_>, _> = fs.primary_entries().collect();
  assert!(matches!(result, Err(Error::Format(_))));
}

#[test]
fn entry_reader_streams_in_small_chunks() {
  let fs = IsoFileSystem::open(Cursor::new(sample_image())).unwrap();
  let entry = fs
    .entries()
    .map(|e| e.unwrap())
    .find(|e| !e.directory)
    .unwrap();
  assert_eq!(entry.data_length, 5000);

  let mut reader = fs.open_entry(&entry).unwrap();
  assert_eq!(reader.remaining(), 5000);

  let mut total = Vec::new();
  let mut chunk = [0u8; 333];
  loop {
    let n = reader.read(&mut chunk).unwrap();
    if n == 0 {
      break;
    }
    total.extend_from_slice(&chunk[..n]);
  }

  // The reader stops at the recorded length, not the sector boundary.
  assert_eq!(total.len(), 5000);
  assert!(total.iter().all(|b| *b == 7));
  assert_eq!(reader.remaining(), 0);
}

#[test]
fn directories_cannot_be_opened_as_files() {
  let fs = IsoFileSystem::open(Cursor::new(sample_image())).unwrap();
  let dir = fs
    .entries()
    .map(|e| e.unwrap())
    .find(|e| e.directory && !e.path.is_empty())
    .unwrap();

  assert!(matches!(fs.open_entry(&dir), Err(Error::NotAFile(_))));
}

#[test]
fn closed_filesystem_fails_readers_and_iterators() {
  let fs = IsoFileSystem::open(Cursor::new(sample_image())).unwrap();
  let entry = fs
    .entries()
    .map(|e| e.unwrap())
    .find(|e| !e.directory)
    .unwrap();

  let mut reader = fs.open_entry(&entry).unwrap();
  fs.close();
  assert!(fs.is_closed());

  let mut buf = [0u8; 16];
  assert!(reader.read(&mut buf).is_err());

  // The root entry needs no I/O, but descending into it does.
  let mut entries = fs.entries();
  assert!(entries.next().unwrap().is_ok());
  assert!(matches!(entries.next(), Some(Err(Error::Closed))));
}

#[test]
fn two_readers_share_the_source_safely() {
  let fs = IsoFileSystem::open(Cursor::new(sample_image())).unwrap();
  let entry = fs
    .entries()
    .map(|e| e.unwrap())
    .find(|e| !e.directory)
    .unwrap();

  let mut first = fs.open_entry(&entry).unwrap();
  let mut second = fs.open_entry(&entry).unwrap();

  // Interleaved reads each make independent progress.
  let mut a = [0u8; 100];
  let mut b = [0u8; 100];
  first.read_exact(&mut a).unwrap();
  second.read_exact(&mut b).unwrap();
  first.read_exact(&mut a).unwrap();

  assert_eq!(first.remaining(), 4800);
  assert_eq!(second.remaining(), 4900);
}
