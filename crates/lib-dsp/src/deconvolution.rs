//! MLS deconvolution through the permuted fast Hadamard transform.
//!
//! Recovering an impulse response from one period of MLS response amounts
//! to a circular cross-correlation with the bipolar excitation. With the
//! tags of [`PermutationTags`] that correlation becomes
//!
//! ```text
//! perm[0]            = -Σ captured
//! perm[1 + TagS[i]]  = captured[i]
//! perm               = H · perm
//! resp[i]            = perm[1 + TagL[i]] / (P + 1)
//! resp[P]            = 0
//! ```
//!
//! which costs O(P log P) instead of O(P²). Each step is a separate type
//! ([`PermutedSignal`] → [`HadamardSpectrum`] → [`ImpulseResponse`]) so the
//! stages cannot be run out of order, and all of them move the same buffers
//! along instead of allocating.

use crate::error::{DspError, DspResult};
use crate::hadamard::fast_hadamard_inplace;
use crate::mls::{MaximumLengthSequence, MlsOrder};
use crate::tags::PermutationTags;
use std::sync::Arc;
use std::time::Instant;

/// Fast MLS deconvolver for one order.
#[derive(Clone, Debug)]
pub struct Deconvolver {
    tags: Arc<PermutationTags>,
}

impl Deconvolver {
    /// Create a deconvolver from prebuilt tags.
    pub fn new(tags: Arc<PermutationTags>) -> Self {
        Self { tags }
    }

    /// Build tags for `mls` and wrap them.
    pub fn from_sequence(mls: &MaximumLengthSequence) -> Self {
        Self::new(Arc::new(PermutationTags::build(mls)))
    }

    pub fn order(&self) -> MlsOrder {
        self.tags.order()
    }

    /// Sequence length `P`; captures must have exactly this many samples.
    pub fn sequence_len(&self) -> usize {
        self.tags.len()
    }

    pub fn tags(&self) -> &Arc<PermutationTags> {
        &self.tags
    }

    /// Stage 1: reorder `captured` into Hadamard input order.
    ///
    /// `scratch` is reused as the `P + 1` permutation buffer.
    ///
    /// # Errors
    ///
    /// `SizeMismatch` if `captured.len() != P`. Nothing is written in that
    /// case.
    pub fn permute_in(&self, captured: &[f64], mut scratch: Vec<f64>) -> DspResult<PermutedSignal> {
        let p = self.tags.len();
        if captured.len() != p {
            return Err(DspError::size_mismatch(p, captured.len()));
        }

        scratch.clear();
        scratch.resize(p + 1, 0.0);

        scratch[0] = -captured.iter().sum::<f64>();
        for (&tag, &sample) in self.tags.tag_s().iter().zip(captured) {
            scratch[tag + 1] = sample;
        }

        Ok(PermutedSignal {
            order: self.tags.order(),
            buffer: scratch,
        })
    }

    /// Run all stages on `captured` with freshly allocated buffers.
    pub fn deconvolve(&self, captured: &[f64]) -> DspResult<ImpulseResponse> {
        self.deconvolve_with(captured, Vec::new(), Vec::new())
    }

    /// Run all stages reusing caller-owned buffers.
    ///
    /// Get the buffers back with [`ImpulseResponse::into_buffers`].
    pub fn deconvolve_with(
        &self,
        captured: &[f64],
        scratch: Vec<f64>,
        response: Vec<f64>,
    ) -> DspResult<ImpulseResponse> {
        let start = Instant::now();

        let response = self
            .permute_in(captured, scratch)?
            .transform()?
            .permute_out(&self.tags, response)?;

        tracing::debug!(
            order = self.tags.order().get(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "deconvolved capture"
        );

        Ok(response)
    }
}

/// Captured period reordered by `TagS`, DC term in slot 0.
#[derive(Debug)]
pub struct PermutedSignal {
    order: MlsOrder,
    buffer: Vec<f64>,
}

impl PermutedSignal {
    /// The `P + 1` permutation buffer.
    pub fn as_slice(&self) -> &[f64] {
        &self.buffer
    }

    /// Stage 2: in-place fast Hadamard transform.
    pub fn transform(mut self) -> DspResult<HadamardSpectrum> {
        fast_hadamard_inplace(&mut self.buffer)?;
        Ok(HadamardSpectrum {
            order: self.order,
            buffer: self.buffer,
        })
    }
}

/// Permutation buffer after the Hadamard transform.
#[derive(Debug)]
pub struct HadamardSpectrum {
    order: MlsOrder,
    buffer: Vec<f64>,
}

impl HadamardSpectrum {
    pub fn as_slice(&self) -> &[f64] {
        &self.buffer
    }

    /// Stages 3 and 4: read the taps out in time order, normalize by
    /// `P + 1`, and pad the trailing slot with zero.
    ///
    /// # Errors
    ///
    /// `SizeMismatch` if `tags` belong to a different order.
    pub fn permute_out(
        self,
        tags: &PermutationTags,
        mut response: Vec<f64>,
    ) -> DspResult<ImpulseResponse> {
        let p = tags.len();
        if self.buffer.len() != p + 1 {
            return Err(DspError::size_mismatch(p + 1, self.buffer.len()));
        }

        let scale = 1.0 / (p + 1) as f64;
        response.clear();
        response.extend(tags.tag_l().iter().map(|&tag| self.buffer[tag + 1] * scale));
        response.push(0.0);

        Ok(ImpulseResponse {
            order: self.order,
            values: response,
            scratch: self.buffer,
        })
    }
}

/// Deconvolved impulse response: `P` taps followed by a zero pad.
#[derive(Debug)]
pub struct ImpulseResponse {
    order: MlsOrder,
    values: Vec<f64>,
    scratch: Vec<f64>,
}

impl ImpulseResponse {
    pub fn order(&self) -> MlsOrder {
        self.order
    }

    /// The `P` time-ordered taps.
    pub fn taps(&self) -> &[f64] {
        &self.values[..self.values.len() - 1]
    }

    /// All `P + 1` values, the last one always 0.
    pub fn padded(&self) -> &[f64] {
        &self.values
    }

    /// Return `(response, scratch)` storage for reuse.
    pub fn into_buffers(self) -> (Vec<f64>, Vec<f64>) {
        (self.values, self.scratch)
    }
}

/// Reference deconvolution by direct circular cross-correlation, O(P²).
///
/// `resp[k] = (Σ_i captured[i]·x[(i - k) mod P] - Σ captured) / (P + 1)`,
/// where `x` is the bipolar excitation. Returns `P + 1` values with the
/// same zero pad as the fast path.
pub fn direct_deconvolve(mls: &MaximumLengthSequence, captured: &[f64]) -> DspResult<Vec<f64>> {
    let p = mls.len();
    if captured.len() != p {
        return Err(DspError::size_mismatch(p, captured.len()));
    }

    let excitation = mls.excitation();
    let total: f64 = captured.iter().sum();
    let scale = 1.0 / (p + 1) as f64;

    let mut response: Vec<f64> = (0..p)
        .map(|k| {
            let corr: f64 = captured
                .iter()
                .enumerate()
                .map(|(i, &y)| y * excitation[(i + p - k) % p])
                .sum();
            (corr - total) * scale
        })
        .collect();
    response.push(0.0);

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convolution::circular_convolve;

    const FILTER: [f64; 5] = [2.0, 0.4, 0.2, -0.1, -0.8];

    fn setup(order: u32) -> (MaximumLengthSequence, Deconvolver) {
        let mls = MaximumLengthSequence::generate(MlsOrder::new(order).unwrap());
        let deconvolver = Deconvolver::from_sequence(&mls);
        (mls, deconvolver)
    }

    #[test]
    fn test_recovers_filter_order4() {
        let (mls, deconvolver) = setup(4);
        let captured = circular_convolve(&mls.excitation(), &FILTER);

        let ir = deconvolver.deconvolve(&captured).unwrap();
        let resp = ir.padded();

        assert_eq!(resp.len(), 16);
        for (i, &h) in FILTER.iter().enumerate() {
            assert!((resp[i] - h).abs() < 1e-6, "tap {i}: {} vs {h}", resp[i]);
        }
        for (i, &v) in resp[5..15].iter().enumerate() {
            assert!(v.abs() < 1e-6, "tap {} should be 0, got {v}", i + 5);
        }
        assert_eq!(resp[15], 0.0);
    }

    #[test]
    fn test_recovers_filter_order10() {
        let (mls, deconvolver) = setup(10);
        let captured = circular_convolve(&mls.excitation(), &FILTER);
        let ir = deconvolver.deconvolve(&captured).unwrap();

        assert_eq!(ir.taps().len(), 1023);
        for (i, &h) in FILTER.iter().enumerate() {
            assert!((ir.taps()[i] - h).abs() < 1e-9);
        }
        assert!(ir.taps()[5..].iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn test_fast_matches_direct() {
        for order in 2..=9 {
            let (mls, deconvolver) = setup(order);
            let captured: Vec<f64> = (0..mls.len())
                .map(|i| ((i * 37 + 11) % 23) as f64 / 7.0 - 1.5)
                .collect();

            let fast = deconvolver.deconvolve(&captured).unwrap();
            let direct = direct_deconvolve(&mls, &captured).unwrap();

            for (i, (&a, &b)) in fast.padded().iter().zip(&direct).enumerate() {
                assert!((a - b).abs() < 1e-9, "order {order} tap {i}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn test_pad_is_zero_for_any_input() {
        let (mls, deconvolver) = setup(6);
        let captured = vec![1.0e6; mls.len()];
        let ir = deconvolver.deconvolve(&captured).unwrap();
        assert_eq!(*ir.padded().last().unwrap(), 0.0);
    }

    #[test]
    fn test_short_capture_rejected() {
        let (mls, deconvolver) = setup(4);
        let captured = vec![0.0; mls.len() - 1];

        assert_eq!(
            deconvolver.deconvolve(&captured).unwrap_err(),
            DspError::SizeMismatch { expected: 15, actual: 14 }
        );
        assert!(direct_deconvolve(&mls, &captured).is_err());
    }

    #[test]
    fn test_stages_reuse_buffers() {
        let (mls, deconvolver) = setup(5);
        let captured = circular_convolve(&mls.excitation(), &FILTER);

        let scratch = Vec::with_capacity(32);
        let scratch_ptr = scratch.as_ptr();

        let permuted = deconvolver.permute_in(&captured, scratch).unwrap();
        assert_eq!(permuted.as_slice().len(), 32);
        assert!((permuted.as_slice()[0] + captured.iter().sum::<f64>()).abs() < 1e-12);

        let spectrum = permuted.transform().unwrap();
        let ir = spectrum
            .permute_out(deconvolver.tags(), Vec::new())
            .unwrap();
        let (_, scratch) = ir.into_buffers();

        assert_eq!(scratch.as_ptr(), scratch_ptr);
    }
}
