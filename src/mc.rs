// Motion compensation (C6): interface only. Producing a motion-compensated
// prediction plane from a reference frame and the MV grid is explicitly
// out of scope (SPEC_FULL.md §1); this crate defines the boundary the
// frame engine calls through so a real implementation can be dropped in.

use crate::array2d::Array2D;
use crate::mv::MvGrid;

/// Fills `mc` (the spatial MC-predictor plane) from `reference` and
/// `grid`. The reference decoder this crate grew from never implemented
/// motion search or sub-pel interpolation; the default implementation
/// here is the simplest possible collaborator that satisfies the frame
/// engine's contract (a plane of the right shape, deterministic given its
/// inputs) without claiming to be a real motion compensator.
pub trait MotionCompensator {
  fn predict(&self, reference: &Array2D<u8>, grid: &MvGrid, xdec: u32, ydec: u32, mc: &mut Array2D<i32>);
}

/// Nearest-neighbor, whole-pixel-only compensator: for each destination
/// pixel, round its grid-level motion vector to the nearest 4-pixel grid
/// point, shift by `>> (3 - mv_res-independent 1/8-pel unit)`, and copy
/// the referenced reference-frame pixel (clamped to the reference
/// bounds). Good enough to exercise C10's call-through contract and the
/// zero-MV round-trip scenario in SPEC_FULL.md §8, not intended as a
/// quality motion compensator.
pub struct CopyCompensator;

impl MotionCompensator for CopyCompensator {
  fn predict(&self, reference: &Array2D<u8>, grid: &MvGrid, xdec: u32, ydec: u32, mc: &mut Array2D<i32>) {
    let h = mc.rows();
    let w = mc.cols();
    for y in 0..h {
      for x in 0..w {
        let gx = ((x << xdec) / 4).min(grid.cols - 1);
        let gy = ((y << ydec) / 4).min(grid.rows - 1);
        let p = grid.get(gx, gy);
        let (mvx, mvy) = if p.valid { p.mv } else { (0, 0) };
        let sx = clamp_coord(x as i32 + (mvx >> (3 + xdec as i32)), w);
        let sy = clamp_coord(y as i32 + (mvy >> (3 + ydec as i32)), h);
        mc[y][x] = reference[sy][sx] as i32 - 128;
      }
    }
  }
}

fn clamp_coord(v: i32, bound: usize) -> usize {
  v.clamp(0, bound as i32 - 1) as usize
}
