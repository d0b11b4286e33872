//! Permutation tags that map MLS deconvolution onto a Hadamard transform.
//!
//! The circulant matrix formed from the cyclic shifts of a bipolar MLS
//! factors as `L · H · S`, where `H` is a Sylvester Hadamard matrix of size
//! `P + 1` and `L`, `S` are permutation matrices. `TagS` and `TagL` encode
//! those permutations: `TagS` reorders the captured signal into Hadamard
//! input order, `TagL` reads the impulse response back out in time order.
//!
//! Both tags take the `P` non-zero `N`-bit codes `1..=P`. They are stored
//! zero-based (`code - 1`), so each table is a permutation of `0..P`; slot
//! `tag + 1` of the `P + 1` transform buffer is the one it addresses, slot 0
//! being reserved for the DC term.

use crate::error::{DspError, DspResult};
use crate::mls::{MaximumLengthSequence, MlsOrder};

/// Tag tables for one MLS order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermutationTags {
    order: MlsOrder,

    /// Output permutation (Hadamard row → response tap).
    tag_l: Vec<usize>,

    /// Input permutation (captured sample → Hadamard column).
    tag_s: Vec<usize>,
}

impl PermutationTags {
    /// Build both tag tables from a generated sequence.
    pub fn build(mls: &MaximumLengthSequence) -> Self {
        let tag_s = build_tag_s(mls);
        let tag_l = build_tag_l(mls);

        tracing::debug!(order = mls.order().get(), len = mls.len(), "built permutation tags");

        Self {
            order: mls.order(),
            tag_l,
            tag_s,
        }
    }

    /// Order the tags were built for.
    #[inline]
    pub fn order(&self) -> MlsOrder {
        self.order
    }

    /// Sequence length `P`.
    #[inline]
    pub fn len(&self) -> usize {
        self.tag_s.len()
    }

    /// Never true for tags built from a sequence, since `P ≥ 3`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tag_s.is_empty()
    }

    /// `TagL`, zero-based.
    #[inline]
    pub fn tag_l(&self) -> &[usize] {
        &self.tag_l
    }

    /// `TagS`, zero-based.
    #[inline]
    pub fn tag_s(&self) -> &[usize] {
        &self.tag_s
    }

    /// Check that both tables are permutations of `0..P`.
    pub fn validate(&self) -> DspResult<()> {
        check_permutation("TagL", &self.tag_l)?;
        check_permutation("TagS", &self.tag_s)
    }
}

/// Value of the `N` bits ending at circular position `column`, most recent
/// bit most significant.
#[inline]
fn window_code(mls: &MaximumLengthSequence, column: usize) -> usize {
    let n = mls.order().get() as usize;
    (0..n).fold(0usize, |acc, j| {
        let bit = mls.bit_circular(column as isize - j as isize) as usize;
        acc | (bit << (n - 1 - j))
    })
}

fn build_tag_s(mls: &MaximumLengthSequence) -> Vec<usize> {
    (0..mls.len()).map(|i| window_code(mls, i) - 1).collect()
}

fn build_tag_l(mls: &MaximumLengthSequence) -> Vec<usize> {
    let n = mls.order().get() as usize;
    let p = mls.len();

    // Columns whose window code is exactly 2^j.
    let mut basis = vec![0usize; n];
    for column in 0..p {
        let code = window_code(mls, column);
        if code.is_power_of_two() {
            basis[code.trailing_zeros() as usize] = column;
        }
    }

    (0..p)
        .map(|row| {
            let code = basis.iter().enumerate().fold(0usize, |acc, (j, &column)| {
                let bit = mls.bit_circular(column as isize - row as isize) as usize;
                acc | (bit << j)
            });
            code - 1
        })
        .collect()
}

fn check_permutation(name: &str, table: &[usize]) -> DspResult<()> {
    let mut seen = vec![false; table.len()];
    for (i, &v) in table.iter().enumerate() {
        if v >= table.len() {
            return Err(DspError::InvalidPermutation(format!(
                "{name}[{i}] = {v} is out of range 0..{}",
                table.len()
            )));
        }
        if std::mem::replace(&mut seen[v], true) {
            return Err(DspError::InvalidPermutation(format!(
                "{name} repeats value {v} at index {i}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_permutations_for_all_orders() {
        for order in MlsOrder::all() {
            let mls = MaximumLengthSequence::generate(order);
            let tags = PermutationTags::build(&mls);

            assert_eq!(tags.len(), order.sequence_len());
            assert_eq!(tags.tag_l().len(), order.sequence_len());
            tags.validate()
                .unwrap_or_else(|e| panic!("{order}: {e}"));
        }
    }

    #[test]
    fn test_tag_s_order4() {
        // Windows of the order-4 sequence 111100010011010, read backwards
        // from each position with wrap-around.
        let mls = MaximumLengthSequence::generate(MlsOrder::new(4).unwrap());
        let tags = PermutationTags::build(&mls);

        assert_eq!(window_code(&mls, 3), 0b1111);
        assert_eq!(tags.tag_s()[3], 14);
        assert_eq!(window_code(&mls, 0), 0b1010);
        assert_eq!(tags.tag_s()[0], 9);
    }

    #[test]
    fn test_check_permutation_rejects_duplicates() {
        assert!(check_permutation("t", &[0, 2, 1]).is_ok());
        assert!(matches!(
            check_permutation("t", &[0, 1, 1]),
            Err(DspError::InvalidPermutation(_))
        ));
        assert!(matches!(
            check_permutation("t", &[0, 3, 1]),
            Err(DspError::InvalidPermutation(_))
        ));
    }
}
