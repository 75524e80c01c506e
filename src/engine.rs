// Frame engine (C10): the packet state machine, per-frame algorithm, and
// reference-ring/coefficient-plane bookkeeping described in SPEC_FULL.md
// §4.9 and §6.

use std::rc::Rc;

use log::{debug, trace, warn};

use crate::array2d::Array2D;
use crate::band::{decode_block, PlaneDecodeState};
use crate::block_size::{BlockSizeMap, APRON};
use crate::dering::apply_dering_plane;
use crate::entropy::EntropyDecoder;
use crate::error::{Error, Result};
use crate::filter::{apply_postfilter_plane, apply_prefilter_plane};
use crate::frame::{CoeffPlanes, Frame, ReferenceRing};
use crate::intra::IntraModeMap;
use crate::mc::{CopyCompensator, MotionCompensator};
use crate::mv::MvGrid;
use crate::pvq::{PlaneModels, RowAdaptContext};
use crate::txfm::size_for_ln;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
  Empty,
  Data,
  Done,
}

/// Immutable picture geometry supplied at `alloc` time.
pub struct PictureInfo {
  pub width: usize,
  pub height: usize,
  /// `(xdec, ydec)` per plane; plane 0 is luma and must be `(0, 0)`.
  pub planes: Vec<(u32, u32)>,
}

const SUPERBLOCK_SIZE: usize = 32;

pub struct Engine {
  state: State,
  info: PictureInfo,
  ring: ReferenceRing,
  nhsb: usize,
  nvsb: usize,
  frame_count: u64,
  chroma_from_luma: bool,
  mc: Box<dyn MotionCompensator>,
}

impl Engine {
  /// `alloc(info) -> engine`, per SPEC_FULL.md §6. Returns `Fault` for a
  /// picture with no planes or a non-positive size instead of `null`.
  pub fn alloc(info: PictureInfo) -> Result<Self> {
    if info.width == 0 || info.height == 0 {
      return Err(Error::Fault("picture dimensions"));
    }
    if info.planes.is_empty() {
      return Err(Error::Fault("plane count"));
    }
    let nhsb = (info.width + SUPERBLOCK_SIZE - 1) / SUPERBLOCK_SIZE;
    let nvsb = (info.height + SUPERBLOCK_SIZE - 1) / SUPERBLOCK_SIZE;
    Ok(Self {
      state: State::Empty,
      info,
      ring: ReferenceRing::new(4),
      nhsb,
      nvsb,
      frame_count: 0,
      chroma_from_luma: false,
      mc: Box::new(CopyCompensator),
    })
  }

  /// Per the Open Question decision in SPEC_FULL.md §9: chroma-from-luma
  /// is implemented but disabled by default.
  pub fn set_chroma_from_luma(&mut self, enabled: bool) {
    self.chroma_from_luma = enabled;
  }

  /// `ctl(engine, req, ...)`; no requests are mandated, so every code is
  /// `unimplemented`.
  pub fn ctl(&mut self, req: u32) -> Result<()> {
    Err(Error::Unimplemented(req))
  }

  /// Borrow a decoded picture by the ring index returned from
  /// `decode_packet_in`. Valid until the next call to
  /// `decode_packet_in`, per SPEC_FULL.md §6.
  pub fn picture(&self, ring_idx: usize) -> Option<&crate::frame::Frame> {
    self.ring.get(ring_idx as i32)
  }

  /// `decode_packet_in`: the sole data-plane entry point. Returns the
  /// ring index of the freshly decoded picture on success.
  pub fn decode_packet_in(&mut self, packet: &[u8]) -> Result<usize> {
    if self.state == State::Done {
      return Err(Error::InvalidState);
    }
    if packet.is_empty() {
      return Err(Error::Fault("packet"));
    }

    let mut dec = EntropyDecoder::new(packet);

    let framing_bit = dec.decode_bits(1).map_err(Error::from)?;
    if framing_bit != 0 {
      warn!("rejecting packet: framing bit was {}, expected 0", framing_bit);
      return Err(Error::BadPacket("framing bit mismatch".to_string()));
    }
    let is_keyframe = dec.decode_bits(1).map_err(Error::from)? != 0;
    trace!("decoding {} frame {}", if is_keyframe { "key" } else { "inter" }, self.frame_count);

    let result = self.decode_frame(&mut dec, is_keyframe);
    match result {
      Ok(idx) => {
        self.state = State::Data;
        self.frame_count += 1;
        Ok(idx)
      }
      Err(e) => {
        warn!("packet {} rejected: {}", self.frame_count, e);
        Err(e)
      }
    }
  }

  /// Mark the stream finished; any later `decode_packet_in` call fails
  /// with `InvalidState`.
  pub fn end_of_stream(&mut self) {
    debug!("engine reached end of stream after {} frames", self.frame_count);
    self.state = State::Done;
  }

  fn decode_frame(&mut self, dec: &mut EntropyDecoder, is_keyframe: bool) -> Result<usize> {
    // Step 1: reserve (but don't yet commit) the next reference slot.
    let ring_idx = self.ring.reserve_next();

    // Step 2: block-size map.
    let mut bsize = BlockSizeMap::new(self.nhsb, self.nvsb);
    for sby in 0..self.nvsb {
      for sbx in 0..self.nhsb {
        bsize.decode_superblock(dec, sbx, sby)?;
      }
    }
    let _ = APRON; // apron is built into BlockSizeMap; referenced for documentation.

    // Step 3: MV grid + MC + prefilter (inter frames only).
    let mut grid = MvGrid::new(self.nhsb, self.nvsb);
    let mut mv_res = 0u32;
    if !is_keyframe {
      mv_res = dec.decode_uint(3).map_err(Error::from)?;
      grid.decode(dec, mv_res)?;
    }

    let plane_count = self.info.planes.len();
    let mut coeffs: Vec<CoeffPlanes> = self
      .info
      .planes
      .iter()
      .map(|&(xdec, ydec)| CoeffPlanes::new(self.info.width >> xdec, self.info.height >> ydec))
      .collect();

    if !is_keyframe {
      if let Some(prev_frame) = self.ring.get(self.ring.prev_index()) {
        for (pli, &(xdec, ydec)) in self.info.planes.iter().enumerate() {
          let reference = plane_to_array2d(prev_frame.plane(pli));
          self.mc.predict(&reference, &grid, xdec, ydec, &mut coeffs[pli].mc);
          apply_prefilter_plane(&mut coeffs[pli].mc, SUPERBLOCK_SIZE >> xdec.max(ydec), self.nhsb, self.nvsb);
        }
      }
    }

    // Step 4: per-plane scale / run_pvq flags and adaptive models.
    let mut scales = vec![0i32; plane_count];
    let mut run_pvqs = vec![false; plane_count];
    let mut models: Vec<PlaneModels> = (0..plane_count).map(|_| PlaneModels::new()).collect();
    for pli in 0..plane_count {
      let scale = dec.decode_uint(512).map_err(Error::from)? as i32;
      scales[pli] = scale;
      run_pvqs[pli] = if scale > 0 { dec.decode_bool(16384).map_err(Error::from)? } else { false };
    }

    let mut intra = IntraModeMap::new(self.info.width / 4 + 1, self.info.height / 4 + 1);

    // Step 5/6: superblock raster iteration, per-plane quad-tree descent.
    // Luma (plane 0) decodes first in each superblock; its freshly
    // populated `d` plane is then Rc-shared into every chroma plane's `l`
    // field so chroma-from-luma prediction reads real, just-decoded luma
    // frequency data instead of a stale pre-decode snapshot.
    for sby in 0..self.nvsb {
      let mut row_ctx = RowAdaptContext::new();
      for sbx in 0..self.nhsb {
        for pli in 0..plane_count {
          let (xdec, ydec) = self.info.planes[pli];
          let mut state = PlaneDecodeState {
            models: &mut models[pli],
            scale: scales[pli],
            run_pvq: run_pvqs[pli],
            is_keyframe,
            plane_index: pli,
            chroma_from_luma: self.chroma_from_luma,
          };
          decode_quadtree(
            dec,
            &bsize,
            sbx,
            sby,
            xdec,
            ydec,
            &mut state,
            if pli == 0 { Some(&mut intra) } else { None },
            coeffs[pli].l.as_deref(),
            &mut coeffs[pli],
            &mut row_ctx,
          )?;

          if pli == 0 && plane_count > 1 {
            let luma_snapshot: Rc<Array2D<i32>> = Rc::new(coeffs[0].d.clone());
            for chroma_pli in 1..plane_count {
              coeffs[chroma_pli].l = Some(luma_snapshot.clone());
            }
          }
        }
      }
      let _ = row_ctx.promote();
    }

    // Step 7: postfilter the reconstructed planes.
    for (pli, &(xdec, ydec)) in self.info.planes.iter().enumerate() {
      apply_postfilter_plane(&mut coeffs[pli].c, SUPERBLOCK_SIZE >> xdec.max(ydec), self.nhsb, self.nvsb);
    }

    // Step 7b: optional dering, applied last. A plane decoded with scale 0
    // carries no AC texture to dering, so its blocks are treated as fully
    // skipped rather than running the direction search against silence.
    for (pli, coeff) in coeffs.iter_mut().enumerate() {
      let scale = scales[pli];
      if scale == 0 {
        continue;
      }
      apply_dering_plane(&mut coeff.c, scale * 2, |_, _| false);
    }

    // Step 8: clamp to [0, 255] and write into the reserved reference slot.
    let mut out = Frame::new(self.info.width, self.info.height, &self.info.planes);
    for (pli, coeff) in coeffs.iter().enumerate() {
      let plane = out.plane_mut(pli);
      for y in 0..plane.height {
        for x in 0..plane.width {
          let v = (coeff.c[y][x] + 128).clamp(0, 255) as u8;
          plane.set(x, y, v);
        }
      }
    }
    self.ring.commit(ring_idx, out, is_keyframe);

    Ok(ring_idx)
  }
}

fn plane_to_array2d(plane: &crate::frame::Plane) -> Array2D<u8> {
  let mut out = Array2D::<u8>::zeroed(plane.height, plane.width);
  out.fill_with(|y, x| plane.get(x, y));
  out
}

/// Copy an `n`x`n` window out of `plane` at `(y0, x0)`, or `None` if any
/// part of it would fall off the plane (frame boundary, no neighbor). The
/// quad-tree's fixed `(0,0), (1,0), (0,1), (1,1)` child visitation order
/// guarantees that up/left/up-left neighbors are always already decoded
/// into `plane` by the time a block asks for them, so this never reads
/// stale or not-yet-written data.
fn extract_neighbor(plane: &Array2D<i32>, y0: i32, x0: i32, n: usize) -> Option<Array2D<i32>> {
  if y0 < 0 || x0 < 0 {
    return None;
  }
  let (y0, x0) = (y0 as usize, x0 as usize);
  if y0 + n > plane.rows() || x0 + n > plane.cols() {
    return None;
  }
  let mut out = Array2D::<i32>::zeroed(n, n);
  out.fill_with(|i, j| plane[y0 + i][x0 + j]);
  Some(out)
}

/// Build the local `n`x`n` chroma-from-luma predictor window co-located
/// with the chroma block at luma-plane pixel position `(luma_px, luma_py)`,
/// decimating by `xdec`/`ydec` so each chroma sample maps to its
/// corresponding luma sample rather than reading the whole luma plane at
/// chroma-local indices.
fn extract_cfl_window(luma: &Array2D<i32>, luma_px: usize, luma_py: usize, xdec: u32, ydec: u32, n: usize) -> Array2D<i32> {
  let mut out = Array2D::<i32>::zeroed(n, n);
  out.fill_with(|i, j| {
    let ly = (luma_py + (i << ydec)).min(luma.rows().saturating_sub(1));
    let lx = (luma_px + (j << xdec)).min(luma.cols().saturating_sub(1));
    luma[ly][lx]
  });
  out
}

/// Explicit-stack quad-tree descent (SPEC_FULL.md §4.9's implementation
/// note): a fixed child visitation order `(0,0), (1,0), (0,1), (1,1)`,
/// pushed and popped instead of recursed.
#[allow(clippy::too_many_arguments)]
fn decode_quadtree(
  dec: &mut EntropyDecoder,
  bsize: &BlockSizeMap,
  sbx: usize,
  sby: usize,
  xdec: u32,
  ydec: u32,
  state: &mut PlaneDecodeState<'_>,
  mut intra: Option<&mut IntraModeMap>,
  luma_d: Option<&Array2D<i32>>,
  coeff: &mut CoeffPlanes,
  row_ctx: &mut RowAdaptContext,
) -> Result<()> {
  let bx0 = (sbx * 8) as i32;
  let by0 = (sby * 8) as i32;
  let mut stack: Vec<(i32, i32, u8)> = vec![(bx0, by0, 3)];

  while let Some((bx, by, ln)) = stack.pop() {
    let actual_ln = bsize.get(bx, by).min(ln);
    if actual_ln < ln {
      // The cell this corner covers is smaller than the node we pushed;
      // split into the four children at the next size down and retry.
      let half = 1i32 << (ln - 1);
      stack.push((bx + half, by + half, ln - 1));
      stack.push((bx, by + half, ln - 1));
      stack.push((bx + half, by, ln - 1));
      stack.push((bx, by, ln - 1));
      continue;
    }

    let n = size_for_ln(actual_ln as usize);
    let px = ((bx as usize) * 4) >> xdec;
    let py = ((by as usize) * 4) >> ydec;
    if px + n > coeff.c.cols() || py + n > coeff.c.rows() {
      continue;
    }

    // Already-decoded neighbor frequency blocks, read from this plane's
    // own `d` buffer: the quad-tree visitation order guarantees up/left/
    // up-left are always written before the current block is reached.
    let up = extract_neighbor(&coeff.d, py as i32 - n as i32, px as i32, n);
    let left = extract_neighbor(&coeff.d, py as i32, px as i32 - n as i32, n);
    let ul = extract_neighbor(&coeff.d, py as i32 - n as i32, px as i32 - n as i32, n);

    let cfl_window = if state.plane_index > 0 && state.chroma_from_luma {
      luma_d.map(|l| extract_cfl_window(l, bx.max(0) as usize * 4, by.max(0) as usize * 4, xdec, ydec, n))
    } else {
      None
    };

    let (d, c, k, count) = decode_block(
      dec,
      state,
      intra.as_deref_mut(),
      cfl_window.as_ref(),
      Some(&coeff.mc),
      up.as_ref(),
      left.as_ref(),
      ul.as_ref(),
      bx.max(0) as usize,
      by.max(0) as usize,
      px,
      py,
      n,
    )?;

    for i in 0..n {
      for j in 0..n {
        coeff.d[py + i][px + j] = d[i][j];
        coeff.c[py + i][px + j] = c[i][j];
      }
    }
    row_ctx.accumulate(k, count);
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn mono_info(size: usize) -> PictureInfo {
    PictureInfo { width: size, height: size, planes: vec![(0, 0)] }
  }

  #[test]
  fn all_zero_keyframe_scale_zero_reconstructs_to_gray() {
    let mut engine = Engine::alloc(mono_info(32)).unwrap();
    // An all-zero packet decodes every bit/bool/uint symbol as 0 under
    // this range coder (code starts at 0 and every `decode_bool` sees a
    // "false" bucket that covers value 0): framing bit 0, no split, no
    // MV, scale 0 on the one plane. With scale 0 the DC/AC path is a
    // direct zero passthrough regardless of the (also zero-decoded)
    // keyframe bit, so reconstruction is flat 128 either way.
    let packet = vec![0u8; 256];
    let idx = engine.decode_packet_in(&packet).unwrap();
    assert_eq!(idx, 0);
    let frame = engine.ring.get(idx as i32).unwrap();
    for y in 0..32 {
      for x in 0..32 {
        assert_eq!(frame.y().get(x, y), 128);
      }
    }
  }

  #[test]
  fn engine_rejects_packets_after_end_of_stream() {
    let mut engine = Engine::alloc(mono_info(32)).unwrap();
    let packet = vec![0u8; 256];
    engine.decode_packet_in(&packet).unwrap();
    engine.end_of_stream();
    let err = engine.decode_packet_in(&packet).unwrap_err();
    assert_eq!(err, Error::InvalidState);
  }

  #[test]
  fn alloc_rejects_zero_sized_picture() {
    let info = PictureInfo { width: 0, height: 32, planes: vec![(0, 0)] };
    assert!(Engine::alloc(info).is_err());
  }
}
