// Fixed probability tables used by the block-size quad-tree and intra
// prediction mode decode. Unlike the MV-grid and filter tables, these have
// no literal reference source (the reference decoder's tables live in
// files this crate was not given); the shapes below follow the contract in
// SPEC_FULL.md §4.4/§4.6 ("a fixed probability table" / "per-level
// probability") with plausible, monotonic q15 values.

/// Number of distinct transform sizes in the quad-tree: 4, 8, 16, 32.
pub const NUM_BLOCK_SIZES: usize = 4;

/// Probability (q15) that a block at a given size further splits into four
/// children of the next size down. Indexed by `ln` of the *parent* size,
/// i.e. `SPLIT_PROB_Q15[2]` gates a 32x32 block splitting into 16x16s.
/// Size index 0 (4x4) cannot split further and has no entry.
pub const SPLIT_PROB_Q15: [u32; 3] = [
  18000, // 8x8 -> 4x4
  20000, // 16x16 -> 8x8
  22000, // 32x32 -> 16x16
];

/// Number of luma intra prediction modes.
pub const NUM_INTRA_MODES: usize = 8;

/// Base (unscaled, context-free) CDF over intra modes, combined at decode
/// time with the running `mode_p0` frequency table (SPEC_FULL.md §4.6).
pub const INTRA_MODE_BASE_CDF: [u16; NUM_INTRA_MODES] = [
  6000, 12000, 17000, 21000, 24500, 27500, 30500, 32768,
];
