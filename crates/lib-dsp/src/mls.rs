//! Maximum Length Sequence (MLS) generation.
//!
//! An MLS of order `N` is produced by an `N`-stage linear feedback shift
//! register with a primitive tap polynomial. Its period is `P = 2^N - 1` and,
//! mapped to ±1, its circular autocorrelation is `P` at lag 0 and `-1`
//! everywhere else. The deconvolver relies on that property.

use crate::error::{DspError, DspResult};

/// Smallest supported order.
pub const MIN_ORDER: u32 = 2;

/// Largest supported order.
pub const MAX_ORDER: u32 = 16;

/// Feedback tap masks indexed by `order - MIN_ORDER`.
///
/// Bit `k` set means register position `k` contributes to the feedback sum.
/// Position 0 is the input end of the register, position `N - 1` the output.
const TAP_MASKS: [u32; (MAX_ORDER - MIN_ORDER + 1) as usize] = [
    0x0003, // 2
    0x0006, // 3
    0x000c, // 4
    0x0014, // 5
    0x0030, // 6
    0x0048, // 7
    0x00b8, // 8
    0x0110, // 9
    0x0240, // 10
    0x0500, // 11
    0x0ca0, // 12
    0x1b00, // 13
    0x3088, // 14
    0x6000, // 15
    0xd008, // 16
];

/// Validated MLS order `N`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MlsOrder(u32);

impl MlsOrder {
    /// Validate an order against the tap table.
    pub fn new(order: u32) -> DspResult<Self> {
        if !(MIN_ORDER..=MAX_ORDER).contains(&order) {
            return Err(DspError::InvalidOrder(order));
        }
        Ok(Self(order))
    }

    /// All supported orders, ascending.
    pub fn all() -> impl Iterator<Item = MlsOrder> {
        (MIN_ORDER..=MAX_ORDER).map(MlsOrder)
    }

    /// The raw order `N`.
    #[inline]
    pub fn get(&self) -> u32 {
        self.0
    }

    /// Sequence length `P = 2^N - 1`.
    #[inline]
    pub fn sequence_len(&self) -> usize {
        (1usize << self.0) - 1
    }

    /// Hadamard transform size `P + 1 = 2^N`.
    #[inline]
    pub fn transform_len(&self) -> usize {
        1usize << self.0
    }

    fn tap_mask(&self) -> u32 {
        TAP_MASKS[(self.0 - MIN_ORDER) as usize]
    }
}

impl TryFrom<u32> for MlsOrder {
    type Error = DspError;

    fn try_from(order: u32) -> DspResult<Self> {
        Self::new(order)
    }
}

impl std::fmt::Display for MlsOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MLS-{}", self.0)
    }
}

/// Linear feedback shift register stepping one MLS bit at a time.
#[derive(Clone, Debug)]
pub struct Lfsr {
    /// Register contents, bit `k` = position `k`.
    state: u32,

    /// Feedback taps (XOR mask).
    taps: u32,

    /// Mask covering the `N` register bits.
    mask: u32,

    order: MlsOrder,
}

impl Lfsr {
    /// Create a register for `order`, initialised to all ones.
    pub fn new(order: MlsOrder) -> Self {
        let mask = (1u32 << order.get()) - 1;
        Self {
            state: mask,
            taps: order.tap_mask(),
            mask,
            order,
        }
    }

    /// Emit the next bit.
    ///
    /// The emitted bit is the register's last position; the register then
    /// shifts one place towards the output and the feedback bit enters at
    /// position 0.
    #[inline]
    pub fn next_bit(&mut self) -> u8 {
        let feedback = (self.state & self.taps).count_ones() & 1;
        let out = (self.state >> (self.order.get() - 1)) & 1;
        self.state = ((self.state << 1) | feedback) & self.mask;
        out as u8
    }

    /// Current register contents.
    pub fn state(&self) -> u32 {
        self.state
    }
}

/// One full period of a maximum length sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaximumLengthSequence {
    order: MlsOrder,
    bits: Vec<u8>,
}

impl MaximumLengthSequence {
    /// Generate the sequence for `order`.
    pub fn generate(order: MlsOrder) -> Self {
        let len = order.sequence_len();
        let mut lfsr = Lfsr::new(order);
        let bits: Vec<u8> = (0..len).map(|_| lfsr.next_bit()).collect();

        tracing::debug!(order = order.get(), len, "generated MLS");

        Self { order, bits }
    }

    /// Order of the sequence.
    #[inline]
    pub fn order(&self) -> MlsOrder {
        self.order
    }

    /// Sequence length `P`.
    #[inline]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Always false: every supported order yields at least 3 bits.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// The raw 0/1 bits.
    #[inline]
    pub fn bits(&self) -> &[u8] {
        &self.bits
    }

    /// Bit at circular position `index` (taken modulo `P`).
    #[inline]
    pub fn bit_circular(&self, index: isize) -> u8 {
        let p = self.bits.len() as isize;
        self.bits[index.rem_euclid(p) as usize]
    }

    /// Bipolar excitation: 0 maps to +1, 1 maps to -1.
    pub fn excitation(&self) -> Vec<f64> {
        self.bits.iter().map(|&b| bipolar(b)).collect()
    }

    /// Write the bipolar excitation into `out`.
    pub fn write_excitation(&self, out: &mut [f64]) -> DspResult<()> {
        if out.len() != self.bits.len() {
            return Err(DspError::size_mismatch(self.bits.len(), out.len()));
        }
        for (o, &b) in out.iter_mut().zip(&self.bits) {
            *o = bipolar(b);
        }
        Ok(())
    }

    /// Direct circular autocorrelation of the bipolar sequence, O(P²).
    ///
    /// Element `k` is `Σ_i x[i]·x[(i+k) mod P]`.
    pub fn circular_autocorrelation(&self) -> Vec<i64> {
        let p = self.bits.len();
        let x: Vec<i64> = self.bits.iter().map(|&b| 1 - 2 * b as i64).collect();
        (0..p)
            .map(|k| (0..p).map(|i| x[i] * x[(i + k) % p]).sum())
            .collect()
    }
}

#[inline]
fn bipolar(bit: u8) -> f64 {
    1.0 - 2.0 * bit as f64
}
