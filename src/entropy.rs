// Entropy oracle: a carry-less byte-renormalized range decoder, generalized
// with the handful of higher-level decode operations the band decoder and
// MV grid need (boolean-q15, CDF, Laplace, generic-adaptive).
//
// The low-level renormalization loop follows the classic range-coder shape
// (32-bit range, byte-at-a-time refill once range drops below 2^24) used by
// this family of codecs; reading past the supplied bytes is modeled as
// reading virtual zero bytes, and is what ultimately surfaces as a
// `bad_packet` once the frame engine notices it decoded something impossible
// or explicitly checks for exhaustion.

use crate::error::OracleUnderflow;

const TOP: u32 = 1 << 24;
const CDF_TOTAL: u32 = 1 << 15;

/// An adaptive non-negative integer model used by `decode_generic`.
///
/// Mirrors the "geometric model with a running expectation" shape used by
/// the DC, gain and pulse-count symbols: `ex` tracks a Q8 expectation of the
/// decoded magnitude and is nudged towards each observed value.
#[derive(Debug, Clone, Copy)]
pub struct GenericModel {
  pub ex_q8: i32,
}

impl GenericModel {
  pub fn new(initial_ex_q8: i32) -> Self {
    Self { ex_q8: initial_ex_q8.max(256) }
  }
}

pub struct EntropyDecoder<'a> {
  buf: &'a [u8],
  pos: usize,
  rng: u32,
  code: u32,
  /// Set once a read has gone past the end of `buf`; subsequent reads keep
  /// returning zero bytes, but the frame engine checks this flag and turns
  /// it into `Error::BadPacket`.
  underflowed: bool,
}

impl<'a> EntropyDecoder<'a> {
  pub fn new(buf: &'a [u8]) -> Self {
    let mut dec = Self { buf, pos: 0, rng: 0xFFFF_FFFF, code: 0, underflowed: false };
    for _ in 0..4 {
      let byte = dec.next_byte();
      dec.code = (dec.code << 8) | byte as u32;
    }
    dec
  }

  fn next_byte(&mut self) -> u8 {
    if self.pos < self.buf.len() {
      let b = self.buf[self.pos];
      self.pos += 1;
      b
    } else {
      self.underflowed = true;
      0
    }
  }

  pub fn has_underflowed(&self) -> bool {
    self.underflowed
  }

  fn normalize(&mut self) {
    while self.rng < TOP {
      self.code = (self.code << 8) | self.next_byte() as u32;
      self.rng <<= 8;
    }
  }

  /// Decode a symbol from an explicit `(cum_freq, freq, total)` triple, in
  /// the manner of a classic range coder, then narrow the range.
  fn decode_freq(&mut self, total: u32) -> u32 {
    let scale = self.rng / total;
    let value = (self.code / scale).min(total - 1);
    value
  }

  fn update(&mut self, cum_freq: u32, freq: u32, total: u32) {
    let scale = self.rng / total;
    self.code -= scale * cum_freq;
    self.rng = scale * freq;
    self.normalize();
  }

  /// Decode a boolean with probability `p_q15 / 2^15` of being `true` (1),
  /// `p_q15` in `[1, 2^15 - 1]`.
  pub fn decode_bool(&mut self, p_q15: u32) -> Result<bool, OracleUnderflow> {
    debug_assert!(p_q15 >= 1 && p_q15 < CDF_TOTAL as u32);
    let value = self.decode_freq(CDF_TOTAL);
    // CDF_TOTAL - p_q15 is the width of the "false" bucket, placed first.
    let false_width = CDF_TOTAL - p_q15;
    let bit = value >= false_width;
    if bit {
      self.update(false_width, p_q15, CDF_TOTAL);
    } else {
      self.update(0, false_width, CDF_TOTAL);
    }
    self.check_underflow()?;
    Ok(bit)
  }

  /// Decode `n` raw, non-adapted bits, uniformly distributed.
  pub fn decode_bits(&mut self, n: u32) -> Result<u32, OracleUnderflow> {
    if n == 0 {
      return Ok(0);
    }
    self.decode_uint(1u32 << n)
  }

  /// Decode a uniformly distributed integer in `[0, range)`.
  pub fn decode_uint(&mut self, range: u32) -> Result<u32, OracleUnderflow> {
    debug_assert!(range > 0);
    let value = self.decode_freq(range);
    self.update(value, 1, range);
    self.check_underflow()?;
    Ok(value)
  }

  /// Decode an index in `[0, n)` from an unscaled, strictly increasing CDF
  /// of length `n` whose last entry is `2^15`.
  pub fn decode_cdf(&mut self, cdf: &[u16]) -> Result<usize, OracleUnderflow> {
    let total = CDF_TOTAL;
    let value = self.decode_freq(total);
    let mut sym = 0usize;
    while (cdf[sym] as u32) <= value {
      sym += 1;
    }
    let low = if sym == 0 { 0 } else { cdf[sym - 1] as u32 };
    let high = cdf[sym] as u32;
    self.update(low, high - low, total);
    self.check_underflow()?;
    Ok(sym)
  }

  /// Decode a signed integer with a two-sided exponential ("Laplace") tail,
  /// parameterized by a Q8 expectation and a level-dependent decay hint.
  ///
  /// Structurally: peel off a unary-style run of "magnitude still growing"
  /// bits whose probability is derived from the expectation (higher
  /// expectation -> higher probability of continuing), then decode the
  /// sign for nonzero magnitudes. Matches the "signed small integer with
  /// exponential tails" contract without depending on the encoder-private
  /// frequency tables this crate doesn't have access to.
  pub fn decode_laplace(&mut self, ex_q8: u32, decay: u32) -> Result<i32, OracleUnderflow> {
    // Convert the Q8 expectation into a continuation probability in q15:
    // larger expectation => larger probability of each extra unit of
    // magnitude, asymptoting below 2^15.
    let base = (ex_q8.max(1) << 7) / (ex_q8.max(1) + 256);
    let p_continue = base.clamp(1, (CDF_TOTAL - 1) as u32).max(1);
    let decay_shift = (decay & 0xF) as u32;

    let mut magnitude: i32 = 0;
    loop {
      let p = (p_continue >> decay_shift.min(14)).max(1).min(CDF_TOTAL - 1);
      if !self.decode_bool(p)? {
        break;
      }
      magnitude += 1;
      if magnitude >= (1 << 20) {
        // Runaway decode: the packet is malformed rather than the model
        // being wrong.
        return Err(OracleUnderflow);
      }
    }

    if magnitude == 0 {
      return Ok(0);
    }

    let negative = self.decode_bool(CDF_TOTAL / 2)?;
    Ok(if negative { -magnitude } else { magnitude })
  }

  /// Decode a non-negative integer with an adaptive geometric model,
  /// updating `model.ex_q8` towards the observed magnitude.
  pub fn decode_generic(&mut self, model: &mut GenericModel, shift: u32) -> Result<i32, OracleUnderflow> {
    let p_continue = ((model.ex_q8.max(1) as u32) << 7) / (model.ex_q8.max(1) as u32 + 256);
    let p_continue = p_continue.clamp(1, (CDF_TOTAL - 1) as u32);

    let mut value: i32 = 0;
    loop {
      let p = (p_continue >> shift.min(14)).max(1).min(CDF_TOTAL - 1);
      if !self.decode_bool(p)? {
        break;
      }
      value += 1;
      if value >= (1 << 20) {
        return Err(OracleUnderflow);
      }
    }

    // Exponential moving average toward the observed magnitude, in Q8.
    model.ex_q8 += ((value << 8) - model.ex_q8) >> 4;
    model.ex_q8 = model.ex_q8.max(256);

    Ok(value)
  }

  fn check_underflow(&self) -> Result<(), OracleUnderflow> {
    if self.underflowed {
      Err(OracleUnderflow)
    } else {
      Ok(())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decode_bits_in_range() {
    let buf = [0xAAu8; 16];
    let mut dec = EntropyDecoder::new(&buf);
    for _ in 0..8 {
      let v = dec.decode_bits(4).unwrap();
      assert!(v < 16);
    }
  }

  #[test]
  fn underflow_is_flagged_past_end_of_buffer() {
    let buf: [u8; 1] = [0];
    let mut dec = EntropyDecoder::new(&buf);
    for _ in 0..200 {
      let _ = dec.decode_bits(8);
    }
    assert!(dec.has_underflowed());
  }

  #[test]
  fn decode_cdf_stays_in_bounds() {
    let buf = [0x3Cu8; 32];
    let cdf: [u16; 4] = [8000, 16000, 24000, 32768];
    let mut dec = EntropyDecoder::new(&buf);
    for _ in 0..16 {
      let sym = dec.decode_cdf(&cdf).unwrap();
      assert!(sym < 4);
    }
  }
}
