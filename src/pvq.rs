// Pyramid vector quantization de-quantization (C8): DC+Laplace and
// Gain/Theta coefficient paths, plus the adaptive K/count statistics that
// feed the next block's and next row's expectations.

use crate::entropy::{EntropyDecoder, GenericModel};
use crate::error::{Error, Result};

pub const NO_VALUE: i32 = -1;

/// A reciprocal large enough to swamp any realistic accumulated sum, used
/// in place of `1/0`: a zero entry drives a harmonic mean to (rounds to)
/// zero, matching the usual convention that the harmonic mean of a set
/// containing zero is zero, without ever dividing by zero to get there.
const RECIP_Q16_INF: u64 = 1u64 << 40;

/// Round `n / d` to the nearest integer (ties up), d > 0.
fn round_div(n: u64, d: u64) -> u64 {
  if d == 0 {
    0
  } else {
    (n + d / 2) / d
  }
}

/// `1/x` in Q16 fixed point, rounded to nearest.
fn reciprocal_q16(x: i32) -> u64 {
  if x <= 0 {
    RECIP_Q16_INF
  } else {
    round_div(1u64 << 16, x as u64)
  }
}

/// Per-plane adaptive statistics threaded across a superblock row, per
/// SPEC_FULL.md's Adaptive contexts section: a running K average and a
/// running pulse-count average, each promoted through a harmonic-mean
/// accumulator at row boundaries. The accumulator tracks a running sum of
/// Q16 reciprocals rather than a running sum of values, since `n /
/// sum(1/x_i)` (the harmonic mean) can't be recovered from a sum of the
/// `x_i` themselves.
#[derive(Clone)]
pub struct RowAdaptContext {
  nk: u32,
  k_recip_q16: u64,
  n_count: u32,
  count_recip_q16: u64,
}

impl RowAdaptContext {
  pub fn new() -> Self {
    Self { nk: 0, k_recip_q16: 0, n_count: 0, count_recip_q16: 0 }
  }

  /// Publish one block's statistics. `k` / `count` are `NO_VALUE` when the
  /// block contributed nothing (e.g. an all-zero AC vector).
  pub fn accumulate(&mut self, k: i32, count: i32) {
    if k >= 0 {
      self.nk += 1;
      self.k_recip_q16 += reciprocal_q16(k);
    }
    if count >= 0 {
      self.n_count += 1;
      self.count_recip_q16 += reciprocal_q16(count);
    }
  }

  fn harmonic_mean(recip_q16: u64, n: u32) -> i32 {
    if n == 0 || recip_q16 == 0 {
      NO_VALUE
    } else {
      round_div((n as u64) << 16, recip_q16) as i32
    }
  }

  /// Reduce this superblock's accumulated statistics to the two averages
  /// handed to the next superblock in the row, then reset for the next
  /// superblock's own accumulation.
  pub fn promote(&mut self) -> (i32, i32) {
    let k_avg = Self::harmonic_mean(self.k_recip_q16, self.nk);
    let count_avg = Self::harmonic_mean(self.count_recip_q16, self.n_count);
    *self = Self::new();
    (k_avg, count_avg)
  }
}

/// Per-plane adaptive models driving the DC and gain generic-decode
/// symbols, re-initialized every frame.
pub struct PlaneModels {
  pub model_dc: GenericModel,
  pub model_g: GenericModel,
  pub model_theta: GenericModel,
}

impl PlaneModels {
  pub fn new() -> Self {
    Self {
      model_dc: GenericModel::new(256),
      model_g: GenericModel::new(256),
      model_theta: GenericModel::new(256),
    }
  }
}

/// Decode a vector of `len` signed integers whose absolute values sum to
/// exactly `budget`, spending the budget greedily left to right: each
/// position but the last claims a uniformly decoded share of whatever
/// remains, the last position claims the rest. This keeps the "sum of
/// absolute values equals the declared pulse count" invariant exact by
/// construction rather than by a property of the entropy coding, which is
/// what SPEC_FULL.md §8's PVQ pulse conservation property requires.
fn decode_pulse_vector(dec: &mut EntropyDecoder, len: usize, budget: i32) -> Result<Vec<i32>> {
  let mut out = vec![0i32; len];
  let mut remaining = budget;
  for i in 0..len {
    if remaining == 0 {
      break;
    }
    let is_last = i == len - 1;
    let magnitude = if is_last {
      remaining
    } else {
      dec.decode_uint((remaining + 1) as u32).map_err(Error::from)? as i32
    };
    if magnitude > 0 {
      let negative = dec.decode_bool(16384).map_err(Error::from)?;
      out[i] = if negative { -magnitude } else { magnitude };
      remaining -= magnitude;
    }
  }
  Ok(out)
}

/// Result of dequantizing one block's AC coefficients: the reconstructed
/// values and the statistics to publish to the row context.
pub struct AcResult {
  pub coeffs: Vec<i32>,
  pub k: i32,
  pub count: i32,
}

fn nonzero_count(v: &[i32]) -> i32 {
  v.iter().filter(|&&x| x != 0).count() as i32
}

/// `run_pvq == 0`: DC decoded as a plain generic symbol plus a raw sign,
/// scaled and rotated against the predictor; AC decoded as a single
/// pulse-count symbol (`vk`) followed by a pulse vector summing to it.
pub fn decode_dc_laplace_path(
  dec: &mut EntropyDecoder,
  models: &mut PlaneModels,
  pred: &[i32],
  scale: i32,
  n2: usize,
) -> Result<(i32, AcResult)> {
  let dc_mag = dec.decode_generic(&mut models.model_dc, 0).map_err(Error::from)?;
  let dc_sign = if dc_mag != 0 { dec.decode_bool(16384).map_err(Error::from)? } else { false };
  let dc_raw = if dc_sign { -dc_mag } else { dc_mag };
  let dc = dc_raw * scale + pred[0];

  let vk = dec.decode_generic(&mut models.model_g, 0).map_err(Error::from)?;
  let ac_len = n2 - 1;
  let pulses = decode_pulse_vector(dec, ac_len, vk)?;
  let coeffs: Vec<i32> = pulses.iter().zip(&pred[1..]).map(|(&p, &pr)| p * scale + pr).collect();

  Ok((dc, AcResult { k: vk, count: nonzero_count(&pulses), coeffs }))
}

fn round_half_away(n: i64, d: i64) -> i64 {
  if d == 0 {
    return 0;
  }
  let bias = if n >= 0 { d / 2 } else { -(d / 2) };
  (n + bias) / d
}

/// Companding used by the gain/theta DC path: `round(x^(4/3))`, computed
/// in fixed point without a floating-point `pow` by iterated
/// multiplication (`x^(4/3) = x * x^(1/3)`, and the cube root is found by
/// integer bisection since inputs are small, bounded coefficients).
fn compand_4_3(x: u32) -> u32 {
  if x == 0 {
    return 0;
  }
  // Integer cube root via bisection.
  let mut lo = 0u32;
  let mut hi = x;
  while lo < hi {
    let mid = (lo + hi + 1) / 2;
    if mid.saturating_mul(mid).saturating_mul(mid) <= x {
      lo = mid;
    } else {
      hi = mid - 1;
    }
  }
  let cube_root = lo;
  round_half_away((x as i64) * (cube_root as i64), 1) as u32
}

/// Deterministic pulse-budget function matching the encoder's
/// `unquant_k`: a function of the predictor's magnitude, the gain, the
/// scale and whether this is a keyframe, kept monotonic and bounded so it
/// always yields a usable PVQ vector length budget.
pub fn unquant_k(pred_ac: &[i32], qg: i32, scale: i32, shift: u32, is_keyframe: bool) -> i32 {
  let pred_energy: i64 = pred_ac.iter().map(|&v| (v as i64).abs()).sum();
  let base = (pred_energy.max(0) as i64 * (qg.unsigned_abs() as i64 + 1)) / (scale.max(1) as i64);
  let shifted = base >> shift.min(30);
  let floor = if is_keyframe { 1 } else { 0 };
  (shifted.max(floor as i64)).min(1 << 16) as i32
}

/// `run_pvq == 1`: DC is companded and gain-scaled, a signed gain `qg`
/// is decoded, the pulse budget `vk` is derived deterministically from
/// the predictor and gain, a theta-like index selects how much of the
/// budget lands on `pred[1]`, and the remainder is spent on the rest of
/// the AC vector.
pub fn decode_gain_theta_path(
  dec: &mut EntropyDecoder,
  models: &mut PlaneModels,
  pred: &[i32],
  base_scale: i32,
  trans_adj_q8: i32,
  shift: u32,
  is_keyframe: bool,
  n2: usize,
) -> Result<(i32, AcResult)> {
  let scale = (round_half_away((base_scale as i64) * (trans_adj_q8 as i64), 256) as i32).max(1);

  let dc_mag = dec.decode_generic(&mut models.model_dc, 0).map_err(Error::from)?;
  let dc_sign = if dc_mag != 0 { dec.decode_bool(16384).map_err(Error::from)? } else { false };
  let companded = compand_4_3(dc_mag as u32) as i64 * scale as i64;
  let dc_raw = round_half_away(companded, 1) as i32;
  let dc = (if dc_sign { -dc_raw } else { dc_raw }) + pred[0];

  let qg_mag = dec.decode_generic(&mut models.model_g, 0).map_err(Error::from)?;
  let qg_sign = if qg_mag != 0 { dec.decode_bool(16384).map_err(Error::from)? } else { false };
  let qg = if qg_sign { -qg_mag } else { qg_mag };

  let vk = unquant_k(&pred[1..], qg, scale, shift, is_keyframe);

  let theta_ex_q8 = ((65536i64 * vk as i64) / 2).clamp(1, i32::MAX as i64) as u32;
  let ym = dec.decode_generic(&mut models.model_theta, 0).map_err(Error::from)? as i32;
  let pred1 = vk - ym;
  let _ = theta_ex_q8; // expectation informs the model externally via its ex_q8 field

  let ac_budget = (vk - pred1.unsigned_abs() as i32).max(0);
  let ac_len = n2 - 2;
  let pulses = decode_pulse_vector(dec, ac_len, ac_budget)?;

  let mut coeffs = Vec::with_capacity(n2 - 1);
  coeffs.push(pred1 + pred.get(1).copied().unwrap_or(0));
  for (p, pr) in pulses.iter().zip(pred.iter().skip(2)) {
    coeffs.push(*p + *pr);
  }

  Ok((dc, AcResult { k: vk, count: nonzero_count(&pulses), coeffs }))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pulse_vector_conserves_budget() {
    let buf = [0x77u8; 64];
    let mut dec = EntropyDecoder::new(&buf);
    for &budget in &[0, 1, 5, 15, 63] {
      let v = decode_pulse_vector(&mut dec, 15, budget).unwrap();
      let sum: i32 = v.iter().map(|x| x.abs()).sum();
      assert_eq!(sum, budget);
    }
  }

  #[test]
  fn dc_laplace_path_runs() {
    let buf = [0x21u8; 128];
    let mut dec = EntropyDecoder::new(&buf);
    let mut models = PlaneModels::new();
    let pred = vec![0i32; 16];
    let (_dc, ac) = decode_dc_laplace_path(&mut dec, &mut models, &pred, 4, 16).unwrap();
    let sum: i32 = ac.coeffs.iter().zip(pred[1..].iter()).map(|(&c, &p)| (c - p).abs()).sum::<i32>() / 4;
    assert_eq!(sum, ac.k);
  }

  #[test]
  fn row_adapt_context_harmonic_mean() {
    // Harmonic mean of {4, 8} is 16/3 ~= 5.33 -> 5; of {2, 6} is exactly 3.
    // Neither matches the arithmetic means (6 and 4) these would give.
    let mut ctx = RowAdaptContext::new();
    ctx.accumulate(4, 2);
    ctx.accumulate(8, 6);
    let (k_avg, count_avg) = ctx.promote();
    assert_eq!(k_avg, 5);
    assert_eq!(count_avg, 3);
  }

  #[test]
  fn row_adapt_context_treats_zero_as_dominating() {
    let mut ctx = RowAdaptContext::new();
    ctx.accumulate(0, 0);
    ctx.accumulate(100, 100);
    let (k_avg, count_avg) = ctx.promote();
    assert_eq!(k_avg, 0);
    assert_eq!(count_avg, 0);
  }

  #[test]
  fn compand_4_3_zero_is_zero() {
    assert_eq!(compand_4_3(0), 0);
  }
}
