//! Elias-Fano codec for monotone sequences.
//!
//! Values are split into low bits, packed at fixed width, and high bits,
//! written in unary into a bit vector. Random access selects the i-th set
//! bit of the high part through sampled positions, so lookups stay constant
//! time in expectation. Repeated values are allowed; the sequence only has
//! to be non-decreasing.

use crate::bits::CompactVector;
use crate::visit::{Visit, Visitor};
use std::io;

const SELECT_SAMPLE: u64 = 1024;

#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EliasFano {
    len: u64,
    low_bits: u64,
    lower: CompactVector,
    upper: Vec<u64>,
    samples: Vec<u64>,
}

impl EliasFano {
    /// Encodes a non-decreasing sequence.
    pub fn encode(&mut self, values: &[u64]) {
        let universe = match values.last() {
            Some(&u) => u,
            None => {
                *self = Self::default();
                return;
            }
        };
        let n = values.len() as u64;
        self.len = n;

        let ratio = universe / n;
        self.low_bits = if ratio >= 2 {
            63 - ratio.leading_zeros() as u64
        } else {
            0
        };

        if self.low_bits > 0 {
            let mask = (1u64 << self.low_bits) - 1;
            let lows: Vec<u64> = values.iter().map(|&v| v & mask).collect();
            self.lower = CompactVector::with_width(&lows, self.low_bits);
        } else {
            self.lower = CompactVector::default();
        }

        let upper_bits = (universe >> self.low_bits) + n + 1;
        self.upper = vec![0u64; upper_bits.div_ceil(64) as usize];
        self.samples = Vec::with_capacity((n / SELECT_SAMPLE + 1) as usize);
        for (i, &v) in values.iter().enumerate() {
            debug_assert!(i == 0 || values[i - 1] <= v, "sequence must be non-decreasing");
            let pos = (v >> self.low_bits) + i as u64;
            self.upper[(pos >> 6) as usize] |= 1u64 << (pos & 63);
            if (i as u64) % SELECT_SAMPLE == 0 {
                self.samples.push(pos);
            }
        }
    }

    #[inline]
    pub fn access(&self, i: u64) -> u64 {
        debug_assert!(i < self.len);
        let high = self.select(i) - i;
        if self.low_bits == 0 {
            high
        } else {
            (high << self.low_bits) | self.lower.access(i)
        }
    }

    /// Position of the set bit with the given rank in the upper bit vector.
    fn select(&self, rank: u64) -> u64 {
        let block = (rank / SELECT_SAMPLE) as usize;
        let start = self.samples[block];
        let mut count = block as u64 * SELECT_SAMPLE;
        let mut word_idx = (start >> 6) as usize;
        let mut word = self.upper[word_idx] & (u64::MAX << (start & 63));
        loop {
            let ones = word.count_ones() as u64;
            if count + ones > rank {
                let mut w = word;
                for _ in 0..(rank - count) {
                    w &= w - 1;
                }
                return (word_idx as u64) * 64 + w.trailing_zeros() as u64;
            }
            count += ones;
            word_idx += 1;
            word = self.upper[word_idx];
        }
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn num_bits(&self) -> u64 {
        8 * (8 + 8)
            + self.lower.num_bits()
            + 64 * (self.upper.len() as u64 + self.samples.len() as u64)
    }
}

impl Visit for EliasFano {
    fn visit<V: Visitor>(&mut self, visitor: &mut V) -> io::Result<()> {
        visitor.visit_u64(&mut self.len)?;
        visitor.visit_u64(&mut self.low_bits)?;
        self.lower.visit(visitor)?;
        visitor.visit_u64_vec(&mut self.upper)?;
        visitor.visit_u64_vec(&mut self.samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::mix64;

    fn check_roundtrip(values: &[u64]) {
        let mut ef = EliasFano::default();
        ef.encode(values);
        assert_eq!(ef.len(), values.len() as u64);
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(ef.access(i as u64), v, "i = {}", i);
        }
    }

    #[test]
    fn sparse_sequence() {
        let values: Vec<u64> = (0..500u64).map(|i| i * 1000 + (mix64(i) % 997)).collect();
        let mut sorted = values.clone();
        sorted.sort_unstable();
        check_roundtrip(&sorted);
    }

    #[test]
    fn dense_sequence_with_repeats() {
        let mut values = Vec::new();
        let mut v = 0u64;
        for i in 0..5000u64 {
            if mix64(i) % 3 == 0 {
                v += mix64(i) % 5;
            }
            values.push(v);
        }
        // spans several select samples
        check_roundtrip(&values);
    }

    #[test]
    fn all_zero() {
        check_roundtrip(&[0, 0, 0, 0]);
    }

    #[test]
    fn single_value() {
        check_roundtrip(&[12345]);
    }

    #[test]
    fn empty() {
        let mut ef = EliasFano::default();
        ef.encode(&[]);
        assert!(ef.is_empty());
    }
}
