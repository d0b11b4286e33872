//! In-place fast Walsh–Hadamard transform.
//!
//! Computes `y = H · x` for the Sylvester-ordered Hadamard matrix of size
//! `2^N` using `N` radix-2 butterfly stages. The transform is unnormalized;
//! applying it twice multiplies the input by its length.

use crate::error::{DspError, DspResult};

/// Transform `data` in place.
///
/// The span starts at half the length and halves each stage; every butterfly
/// replaces the pair `(a, b)` with `(a + b, a - b)`.
///
/// # Errors
///
/// `InvalidTransformSize` if the length is not a power of two.
pub fn fast_hadamard_inplace(data: &mut [f64]) -> DspResult<()> {
    let len = data.len();
    if !len.is_power_of_two() {
        return Err(DspError::InvalidTransformSize(len));
    }

    let mut block = len;
    while block > 1 {
        let half = block >> 1;
        for j in 0..half {
            for i in (j..len).step_by(block) {
                let a = data[i];
                let b = data[i + half];
                data[i] = a + b;
                data[i + half] = a - b;
            }
        }
        block = half;
    }

    Ok(())
}

/// Transform a copy of `data`.
pub fn fast_hadamard(data: &[f64]) -> DspResult<Vec<f64>> {
    let mut out = data.to_vec();
    fast_hadamard_inplace(&mut out)?;
    Ok(out)
}
