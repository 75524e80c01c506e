// Block-size quad-tree (C4): decodes and maintains a per-4x4-cell
// transform-size map from range-coded superblock descriptors.
//
// A superblock is 32x32 luma pixels, i.e. an 8x8 grid of 4x4 cells. The map
// is stored with a 4-cell apron on all sides so that neighbor lookups at
// the frame boundary don't need bounds checks; apron cells read back as 3
// (the largest size), matching SPEC_FULL.md §3.

use crate::cdf::SPLIT_PROB_Q15;
use crate::entropy::EntropyDecoder;
use crate::error::{Error, Result};

pub const APRON: i32 = 4;

/// The per-4x4-cell map of transform sizes, `0..=3` meaning `4, 8, 16, 32`.
pub struct BlockSizeMap {
  /// cells_per_row/col include the apron on both sides.
  stride: usize,
  cells_per_col: usize,
  cells: Vec<u8>,
}

impl BlockSizeMap {
  pub fn new(nhsb: usize, nvsb: usize) -> Self {
    let cells_per_row = nhsb * 8 + 2 * APRON as usize;
    let cells_per_col = nvsb * 8 + 2 * APRON as usize;
    let mut cells = vec![3u8; cells_per_row * cells_per_col];
    // The constructor already fills every cell (including the apron) with
    // 3, matching the "apron initialized to the largest size" invariant;
    // the real content is overwritten as superblocks decode.
    for c in cells.iter_mut() {
      *c = 3;
    }
    Self { stride: cells_per_row, cells_per_col, cells }
  }

  fn index(&self, bx: i32, by: i32) -> usize {
    let row = (by + APRON) as usize;
    let col = (bx + APRON) as usize;
    row * self.stride + col
  }

  /// Read the size class at cell `(bx, by)` in 4x4-cell units, relative to
  /// the top-left of the frame. Out-of-range reads return 3 (the apron
  /// value) by construction, since the backing storage itself carries the
  /// apron.
  pub fn get(&self, bx: i32, by: i32) -> u8 {
    let row = by + APRON;
    let col = bx + APRON;
    if row < 0 || col < 0 || row as usize >= self.cells_per_col || col as usize >= self.stride {
      return 3;
    }
    self.cells[self.index(bx, by)]
  }

  fn set_region(&mut self, bx: i32, by: i32, cells: usize, ln: u8) {
    for dy in 0..cells {
      for dx in 0..cells {
        let idx = self.index(bx + dx as i32, by + dy as i32);
        self.cells[idx] = ln;
      }
    }
  }

  /// Decode one superblock's nested block-size description, starting from
  /// the 32x32 root and recursively asking "does this split?" down to the
  /// 4x4 leaves.
  pub fn decode_superblock(&mut self, dec: &mut EntropyDecoder, sbx: usize, sby: usize) -> Result<()> {
    let bx0 = (sbx * 8) as i32;
    let by0 = (sby * 8) as i32;
    self.decode_node(dec, bx0, by0, 3)
  }

  fn decode_node(&mut self, dec: &mut EntropyDecoder, bx: i32, by: i32, ln: u8) -> Result<()> {
    let cells = 1usize << ln; // cells-per-side covered by a block of this ln
    if ln == 0 {
      self.set_region(bx, by, 1, 0);
      return Ok(());
    }
    let split = dec
      .decode_bool(SPLIT_PROB_Q15[(ln - 1) as usize])
      .map_err(Error::from)?;
    if !split {
      self.set_region(bx, by, cells, ln);
      return Ok(());
    }
    let half = cells as i32 / 2;
    self.decode_node(dec, bx, by, ln - 1)?;
    self.decode_node(dec, bx + half, by, ln - 1)?;
    self.decode_node(dec, bx, by + half, ln - 1)?;
    self.decode_node(dec, bx + half, by + half, ln - 1)?;
    Ok(())
  }

  /// Check the quad-tree consistency invariant from SPEC_FULL.md §8: for
  /// every aligned `2^k x 2^k` region, if any cell holds value `>= k` then
  /// every cell in that region holds the same value. Used by tests; not
  /// called on the decode hot path.
  #[cfg(test)]
  pub fn is_consistent(&self, nhsb: usize, nvsb: usize) -> bool {
    for sby in 0..nvsb {
      for sbx in 0..nhsb {
        let bx0 = (sbx * 8) as i32;
        let by0 = (sby * 8) as i32;
        for k in 1..=3u8 {
          let region = 1i32 << k;
          let mut y = 0;
          while y < 8 {
            let mut x = 0;
            while x < 8 {
              let v0 = self.get(bx0 + x, by0 + y);
              if v0 >= k {
                for dy in 0..region {
                  for dx in 0..region {
                    if self.get(bx0 + x + dx, by0 + y + dy) != v0 {
                      return false;
                    }
                  }
                }
              }
              x += region;
            }
            y += region;
          }
        }
      }
    }
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn apron_reads_as_largest_size() {
    let map = BlockSizeMap::new(2, 2);
    assert_eq!(map.get(-1, -1), 3);
    assert_eq!(map.get(100, 100), 3);
  }

  #[test]
  fn decoded_map_is_quadtree_consistent() {
    let buf = [0x55u8; 256];
    let mut dec = EntropyDecoder::new(&buf);
    let mut map = BlockSizeMap::new(2, 2);
    for sby in 0..2 {
      for sbx in 0..2 {
        map.decode_superblock(&mut dec, sbx, sby).unwrap();
      }
    }
    assert!(map.is_consistent(2, 2));
  }
}
