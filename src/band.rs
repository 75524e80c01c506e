// Band decoder (C9): per-transform-block orchestration tying together the
// MC predictor, intra prediction, zig-zag permutation, PVQ de-quantization
// and the inverse transform, per SPEC_FULL.md §4.8.

use crate::array2d::Array2D;
use crate::consts::{scan_for_size, TRANS_ADJ_Q8};
use crate::entropy::EntropyDecoder;
use crate::error::Result;
use crate::intra::IntraModeMap;
use crate::pvq::{self, AcResult, PlaneModels};
use crate::txfm::{fdct_2d, idct_2d, ln_for_size};

/// Everything one `decode_block` call needs that outlives a single block:
/// the plane's adaptive models and the scale/run_pvq flags decided once
/// per plane per frame (SPEC_FULL.md §4.9 step 4).
pub struct PlaneDecodeState<'a> {
  pub models: &'a mut PlaneModels,
  pub scale: i32,
  pub run_pvq: bool,
  pub is_keyframe: bool,
  pub plane_index: usize,
  /// Whether chroma planes should predict from the co-located luma
  /// frequency data, per the CLI/`Engine::set_chroma_from_luma` flag.
  pub chroma_from_luma: bool,
}

/// Decode one transform block of size `n` at pixel position `(px, py)`.
/// `mc` is the (already prefiltered, inter-only) motion-compensated
/// predictor plane; `d` receives the frequency-domain reconstruction;
/// `c` receives the spatial reconstruction the postfilter will later
/// operate on. `intra`/`l_plane` are only consulted on keyframes. `up`,
/// `left` and `ul` are the already-decoded frequency-domain neighbor
/// blocks immediately above, to the left, and diagonally above-left of
/// this one (in raster/quad-tree visitation order they are always
/// decoded first, or `None` at a frame boundary).
#[allow(clippy::too_many_arguments)]
pub fn decode_block(
  dec: &mut EntropyDecoder,
  state: &mut PlaneDecodeState<'_>,
  intra: Option<&mut IntraModeMap>,
  l_plane: Option<&Array2D<i32>>,
  mc: Option<&Array2D<i32>>,
  up: Option<&Array2D<i32>>,
  left: Option<&Array2D<i32>>,
  ul: Option<&Array2D<i32>>,
  bx: usize,
  by: usize,
  px: usize,
  py: usize,
  n: usize,
) -> Result<(Array2D<i32>, Array2D<i32>, i32, i32)> {
  let n2 = n * n;

  // Step 1: forward-transform the MC predictor (inter blocks only).
  let mut md = Array2D::<i32>::zeroed(n, n);
  if !state.is_keyframe {
    if let Some(mc) = mc {
      for i in 0..n {
        for j in 0..n {
          md[i][j] = mc[py + i][px + j];
        }
      }
      fdct_2d(&mut md);
    }
  }

  // Step 2: build the flat predictor vector, intra on keyframes, else a
  // copy of the MC frequency-domain predictor.
  let mut pred = vec![0i32; n2];
  if state.is_keyframe {
    if let (Some(intra), cells) = (intra, 1usize.max(n / 4)) {
      let (_mode, pred_block) = intra.decode_luma_block(dec, bx, by, cells, up, left, ul, n)?;
      for i in 0..n {
        for j in 0..n {
          pred[i * n + j] = pred_block[i][j];
        }
      }
      if state.plane_index > 0 && state.chroma_from_luma {
        if let Some(l) = l_plane {
          let cfl = intra.chroma_from_luma(bx, by, l, n);
          for i in 0..n {
            for j in 0..n {
              pred[i * n + j] = cfl[i][j];
            }
          }
        }
      }
    }
  } else {
    for i in 0..n {
      for j in 0..n {
        pred[i * n + j] = md[i][j];
      }
    }
  }

  // Step 3: zig-zag permute into scan order.
  let scan = scan_for_size(n);
  let mut predt = vec![0i32; n2];
  for (k, &(r, c)) in scan.iter().enumerate() {
    predt[k] = pred[r as usize * n + c as usize];
  }

  // Step 4: de-quantize.
  let (dc, ac): (i32, AcResult) = if state.scale == 0 {
    (predt[0], AcResult { coeffs: vec![0; n2 - 1], k: 0, count: 0 })
  } else if !state.run_pvq {
    pvq::decode_dc_laplace_path(dec, state.models, &predt, state.scale, n2)?
  } else {
    let trans_adj_q8 = TRANS_ADJ_Q8[ln_for_size(n)];
    pvq::decode_gain_theta_path(dec, state.models, &predt, state.scale, trans_adj_q8, 0, state.is_keyframe, n2)?
  };

  let mut dequantized = vec![0i32; n2];
  dequantized[0] = dc;
  dequantized[1..].copy_from_slice(&ac.coeffs);

  // Step 5: inverse zig-zag into the frequency-domain output plane `d`.
  let mut d = Array2D::<i32>::zeroed(n, n);
  for (k, &(r, c)) in scan.iter().enumerate() {
    d[r as usize][c as usize] = dequantized[k];
  }

  // Step 6: IDCT into the spatial reconstruction plane `c`.
  let mut c = d.clone();
  idct_2d(&mut c);

  Ok((d, c, ac.k, ac.count))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::entropy::EntropyDecoder;

  #[test]
  fn keyframe_block_with_zero_scale_is_dc_passthrough() {
    let buf = [0x5Au8; 64];
    let mut dec = EntropyDecoder::new(&buf);
    let mut models = PlaneModels::new();
    let mut state =
      PlaneDecodeState { models: &mut models, scale: 0, run_pvq: false, is_keyframe: true, plane_index: 0, chroma_from_luma: false };
    let mut intra = IntraModeMap::new(8, 8);
    let (d, _c, _k, _count) =
      decode_block(&mut dec, &mut state, Some(&mut intra), None, None, None, None, None, 0, 0, 0, 0, 4).unwrap();
    for i in 0..4 {
      for j in 1..4 {
        if i != 0 {
          assert_eq!(d[i][j], 0);
        }
      }
    }
  }

  #[test]
  fn inter_block_with_no_mc_predictor_decodes_without_panicking() {
    let buf = [0x91u8; 128];
    let mut dec = EntropyDecoder::new(&buf);
    let mut models = PlaneModels::new();
    let mut state =
      PlaneDecodeState { models: &mut models, scale: 4, run_pvq: false, is_keyframe: false, plane_index: 0, chroma_from_luma: false };
    let _ = decode_block(&mut dec, &mut state, None, None, None, None, None, None, 0, 0, 0, 0, 8).unwrap();
  }
}
