// Directional dering post-filter (C11): applied at superblock granularity
// after the postfilter, per 8x8 block, per SPEC_FULL.md §4.10.

use crate::array2d::Array2D;

/// The 8 candidate directions, each a `(dy, dx)` step used when walking a
/// line of pixels orthogonal to the direction.
const DIRECTIONS: [(i32, i32); 8] = [(0, 1), (1, 2), (1, 1), (2, 1), (1, 0), (2, -1), (1, -1), (1, -2)];

const BLOCK: usize = 8;
const SB_BLOCKS: usize = 4; // a 32x32 superblock spans a 4x4 grid of 8x8 blocks

fn clamp_idx(v: i32, bound: usize) -> usize {
  v.clamp(0, bound as i32 - 1) as usize
}

/// Sum, over all lines orthogonal to `dir` inside the 8x8 block, of
/// `sum_x^2 - (sum_x)^2 / line_len`. The `sum_x^2` term is identical
/// across all directions (it's just the block's total squared energy)
/// so direction search only needs the (far cheaper) second term; this
/// function still returns the full cost so it reads directly against the
/// spec text, and `best_direction` relies only on relative ordering.
fn direction_cost(block: &[[i32; BLOCK]; BLOCK], dir: (i32, i32)) -> i64 {
  let mut visited = [[false; BLOCK]; BLOCK];
  let mut cost = 0i64;
  for y0 in 0..BLOCK {
    for x0 in 0..BLOCK {
      if visited[y0][x0] {
        continue;
      }
      let mut sum = 0i64;
      let mut len = 0i64;
      let mut coords = Vec::new();
      let (mut y, mut x) = (y0 as i32, x0 as i32);
      while y >= 0 && y < BLOCK as i32 && x >= 0 && x < BLOCK as i32 {
        coords.push((y as usize, x as usize));
        sum += block[y as usize][x as usize] as i64;
        len += 1;
        y += dir.0;
        x += dir.1;
      }
      let (mut y, mut x) = (y0 as i32 - dir.0, x0 as i32 - dir.1);
      while y >= 0 && y < BLOCK as i32 && x >= 0 && x < BLOCK as i32 {
        coords.push((y as usize, x as usize));
        sum += block[y as usize][x as usize] as i64;
        len += 1;
        y -= dir.0;
        x -= dir.1;
      }
      for &(cy, cx) in &coords {
        visited[cy][cx] = true;
      }
      if len > 0 {
        cost -= (sum * sum) / len;
      }
    }
  }
  cost
}

fn best_direction(block: &[[i32; BLOCK]; BLOCK]) -> usize {
  let mut best = 0;
  let mut best_cost = i64::MIN;
  for (i, &dir) in DIRECTIONS.iter().enumerate() {
    let cost = direction_cost(block, dir);
    if cost > best_cost {
      best_cost = cost;
      best = i;
    }
  }
  best
}

fn block_variance(block: &[[i32; BLOCK]; BLOCK]) -> i64 {
  let mut sum = 0i64;
  let mut sum_sq = 0i64;
  for row in block {
    for &v in row {
      sum += v as i64;
      sum_sq += (v as i64) * (v as i64);
    }
  }
  let n = (BLOCK * BLOCK) as i64;
  (sum_sq - (sum * sum) / n).max(0) / n
}

/// Variance over an arbitrary `h x w` region, clamped at plane edges the
/// same way `extract_block` is. Used to compute the enclosing
/// superblock's variance once per superblock rather than re-deriving it
/// per 8x8 child block.
fn region_variance(plane: &Array2D<i32>, y0: usize, x0: usize, h: usize, w: usize) -> i64 {
  let mut sum = 0i64;
  let mut sum_sq = 0i64;
  let n = (h * w) as i64;
  for dy in 0..h {
    for dx in 0..w {
      let y = clamp_idx((y0 + dy) as i32, plane.rows());
      let x = clamp_idx((x0 + dx) as i32, plane.cols());
      let v = plane[y][x] as i64;
      sum += v;
      sum_sq += v * v;
    }
  }
  if n == 0 {
    0
  } else {
    (sum_sq - (sum * sum) / n).max(0) / n
  }
}

/// `x^0.16`-style adjustment, approximated in integer fixed point via a
/// short piecewise table over `log2(v1*v2)`: the table only needs to be
/// monotonic and roughly concave, since its role is to damp the threshold
/// at high variance products.
fn thresh_adjust(v1v2: i64) -> i32 {
  if v1v2 <= 0 {
    return 1;
  }
  let log2 = 63 - v1v2.leading_zeros() as i32;
  (8 + log2.clamp(0, 24) / 2).clamp(1, 32)
}

fn extract_block(plane: &Array2D<i32>, y0: usize, x0: usize) -> [[i32; BLOCK]; BLOCK] {
  let mut block = [[0i32; BLOCK]; BLOCK];
  for dy in 0..BLOCK {
    for dx in 0..BLOCK {
      let y = clamp_idx((y0 + dy) as i32, plane.rows());
      let x = clamp_idx((x0 + dx) as i32, plane.cols());
      block[dy][dx] = plane[y][x];
    }
  }
  block
}

/// Dering one 8x8 block in place. `sb_variance` is the enclosing
/// superblock's variance divided by its area, `q_threshold` the
/// quantizer-indexed base threshold, and `skip` whether the 3x3 (luma)
/// or 4x4 (chroma) skip-mask around the block is fully set -- in which
/// case no filtering happens at all.
pub fn dering_block(plane: &mut Array2D<i32>, y0: usize, x0: usize, q_threshold: i32, sb_variance: i64, skip: bool) {
  if skip {
    return;
  }
  let original = extract_block(plane, y0, x0);
  let dir = DIRECTIONS[best_direction(&original)];
  let orth = (-dir.1, dir.0);

  let v1 = block_variance(&original) >> 6;
  let v2 = sb_variance;
  let threshold = (q_threshold as i64 * thresh_adjust(v1 * v2).max(1) as i64 / 16) as i32;
  if threshold <= 0 {
    return;
  }

  for dy in 0..BLOCK {
    for dx in 0..BLOCK {
      let center = original[dy][dx];
      let mut sum = center;
      let mut taps = 1;

      for sign in [-1i32, 1] {
        let ny = dy as i32 + sign * dir.0;
        let nx = dx as i32 + sign * dir.1;
        if (0..BLOCK as i32).contains(&ny) && (0..BLOCK as i32).contains(&nx) {
          let v = original[ny as usize][nx as usize];
          if (v - center).abs() < threshold {
            sum += v;
            taps += 1;
          }
        }
      }
      let directional = sum / taps;

      let orth_threshold = threshold.min(threshold / 3 + (directional - center).abs());
      let mut osum = directional;
      let mut otaps = 1;
      for step in [-2i32, -1, 1, 2] {
        let ny = dy as i32 + step * orth.0;
        let nx = dx as i32 + step * orth.1;
        if (0..BLOCK as i32).contains(&ny) && (0..BLOCK as i32).contains(&nx) {
          let v = original[ny as usize][nx as usize];
          if (v - directional).abs() < orth_threshold {
            osum += v;
            otaps += 1;
          }
        }
      }
      let filtered = osum / otaps;

      let y = clamp_idx((y0 + dy) as i32, plane.rows());
      let x = clamp_idx((x0 + dx) as i32, plane.cols());
      plane[y][x] = filtered;
    }
  }
}

/// Apply dering to a full plane, superblock by superblock (a 4x4 grid of
/// 8x8 blocks each), raster order. `skip_mask(bx, by)` reports whether the
/// block at 8x8-cell coordinate `(bx, by)` should be treated as fully
/// skipped. The superblock variance `v2` (SPEC_FULL.md §4.10) is computed
/// once per superblock, over every child 8x8 block it contains, rather
/// than re-derived per block from the same data as `v1`.
pub fn apply_dering_plane(plane: &mut Array2D<i32>, q_threshold: i32, skip_mask: impl Fn(usize, usize) -> bool) {
  let rows = plane.rows();
  let cols = plane.cols();
  let bx_count = (cols + BLOCK - 1) / BLOCK;
  let by_count = (rows + BLOCK - 1) / BLOCK;
  let sbx_count = (bx_count + SB_BLOCKS - 1) / SB_BLOCKS;
  let sby_count = (by_count + SB_BLOCKS - 1) / SB_BLOCKS;
  let sb_pixels = SB_BLOCKS * BLOCK;

  for sby in 0..sby_count {
    for sbx in 0..sbx_count {
      let sb_variance = region_variance(plane, sby * sb_pixels, sbx * sb_pixels, sb_pixels, sb_pixels) / (BLOCK * BLOCK) as i64;

      for dy in 0..SB_BLOCKS {
        for dx in 0..SB_BLOCKS {
          let bx = sbx * SB_BLOCKS + dx;
          let by = sby * SB_BLOCKS + dy;
          if bx >= bx_count || by >= by_count {
            continue;
          }
          let x0 = bx * BLOCK;
          let y0 = by * BLOCK;
          dering_block(plane, y0, x0, q_threshold, sb_variance, skip_mask(bx, by));
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dering_is_a_no_op_on_fully_skipped_block() {
    let mut plane = Array2D::<i32>::zeroed(8, 8);
    plane.fill_with(|i, j| ((i * 8 + j) % 7) as i32 - 3);
    let before = plane.clone();
    dering_block(&mut plane, 0, 0, 64, 100, true);
    for i in 0..8 {
      for j in 0..8 {
        assert_eq!(plane[i][j], before[i][j]);
      }
    }
  }

  #[test]
  fn dering_does_not_panic_on_flat_block() {
    let mut plane = Array2D::<i32>::zeroed(16, 16);
    plane.fill_with(|_, _| 10);
    apply_dering_plane(&mut plane, 64, |_, _| false);
    for i in 0..16 {
      for j in 0..16 {
        assert_eq!(plane[i][j], 10);
      }
    }
  }
}
