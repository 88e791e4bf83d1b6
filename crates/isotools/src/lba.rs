//! Logical block address allocation for the write path.

/// Hands out sector-aligned extents in increasing order.
pub struct LbaAllocator {
  sector_size: u32,
  next_lba: u32,
}

impl LbaAllocator {
  pub fn new(sector_size: u32, offset: u32) -> Self {
    Self {
      sector_size,
      next_lba: offset,
    }
  }

  /// Allocate an extent large enough for `size` bytes and return its LBA.
  /// Zero-sized allocations still consume one sector so every extent has a
  /// distinct, valid location.
  pub fn allocate(&mut self, size: u32) -> u32 {
    let lba = self.next_lba;
    let sectors = (size.div_ceil(self.sector_size)).max(1);
    self.next_lba += sectors;
    lba
  }

  /// The next unallocated LBA; after layout this is the total image size
  /// in sectors.
  pub fn next_lba(&self) -> u32 {
    self.next_lba
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn allocations_are_sector_granular() {
    let mut allocator = LbaAllocator::new(2048, 20);
    assert_eq!(allocator.allocate(1), 20);
    assert_eq!(allocator.allocate(2048), 21);
    assert_eq!(allocator.allocate(2049), 22);
    assert_eq!(allocator.allocate(0), 24);
    assert_eq!(allocator.next_lba(), 25);
  }
}
