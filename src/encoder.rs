//! Pilot-table codecs.
//!
//! An encoder compresses the per-bucket pilot sequence and answers random
//! access in constant time. The choice only moves the storage cost; the hash
//! function's output is identical under every codec.

use crate::bits::CompactVector;
use crate::elias_fano::EliasFano;
use crate::visit::{Visit, Visitor};
use hashbrown::HashMap;
use std::io;

/// Codec over unsigned integer sequences.
pub trait Encoder: Default + Visit {
    fn encode(&mut self, values: &[u64]);
    fn access(&self, i: u64) -> u64;
    fn num_bits(&self) -> u64;
}

/// Plain fixed-width encoding. Fastest access, largest storage.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompactEncoder {
    values: CompactVector,
}

impl Encoder for CompactEncoder {
    fn encode(&mut self, values: &[u64]) {
        self.values = CompactVector::from_values(values);
    }

    #[inline]
    fn access(&self, i: u64) -> u64 {
        self.values.access(i)
    }

    fn num_bits(&self) -> u64 {
        self.values.num_bits()
    }
}

impl Visit for CompactEncoder {
    fn visit<V: Visitor>(&mut self, visitor: &mut V) -> io::Result<()> {
        self.values.visit(visitor)
    }
}

/// Distinct values interned into a small dictionary; the sequence stores
/// dictionary ranks at fixed width. Pays off whenever the pilot alphabet is
/// much smaller than the pilot range.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DictionaryEncoder {
    ranks: CompactVector,
    dict: CompactVector,
}

impl Encoder for DictionaryEncoder {
    fn encode(&mut self, values: &[u64]) {
        let mut interned: HashMap<u64, u64> = HashMap::with_capacity(values.len());
        let mut dict: Vec<u64> = Vec::new();
        let mut ranks: Vec<u64> = Vec::with_capacity(values.len());
        for &v in values {
            let next = dict.len() as u64;
            let rank = *interned.entry(v).or_insert_with(|| {
                dict.push(v);
                next
            });
            ranks.push(rank);
        }
        self.ranks = CompactVector::from_values(&ranks);
        self.dict = CompactVector::from_values(&dict);
    }

    #[inline]
    fn access(&self, i: u64) -> u64 {
        self.dict.access(self.ranks.access(i))
    }

    fn num_bits(&self) -> u64 {
        self.ranks.num_bits() + self.dict.num_bits()
    }
}

impl Visit for DictionaryEncoder {
    fn visit<V: Visitor>(&mut self, visitor: &mut V) -> io::Result<()> {
        self.ranks.visit(visitor)?;
        self.dict.visit(visitor)
    }
}

/// Splits the sequence at 30% and encodes each part independently.
///
/// The split lines up with the skew bucketer's dense prefix: front buckets
/// are placed early into an empty table and draw pilots from a different
/// distribution than the sparse tail, so separate dictionaries stay small.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DualEncoder<F: Encoder, B: Encoder> {
    front_len: u64,
    front: F,
    back: B,
}

impl<F: Encoder, B: Encoder> Encoder for DualEncoder<F, B> {
    fn encode(&mut self, values: &[u64]) {
        let split = (values.len() as f64 * 0.3) as usize;
        self.front_len = split as u64;
        self.front.encode(&values[..split]);
        self.back.encode(&values[split..]);
    }

    #[inline]
    fn access(&self, i: u64) -> u64 {
        if i < self.front_len {
            self.front.access(i)
        } else {
            self.back.access(i - self.front_len)
        }
    }

    fn num_bits(&self) -> u64 {
        64 + self.front.num_bits() + self.back.num_bits()
    }
}

impl<F: Encoder, B: Encoder> Visit for DualEncoder<F, B> {
    fn visit<V: Visitor>(&mut self, visitor: &mut V) -> io::Result<()> {
        visitor.visit_u64(&mut self.front_len)?;
        self.front.visit(visitor)?;
        self.back.visit(visitor)
    }
}

/// The dictionary-of-dictionaries codec, the usual best pick for pilots.
pub type DictionaryDictionary = DualEncoder<DictionaryEncoder, DictionaryEncoder>;

/// Elias-Fano over the pilots' prefix sums.
///
/// The running sum is monotone even though the pilots are not. Smallest of
/// the codecs on typical pilot tables; access pays for it with two selects.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EliasFanoEncoder {
    prefix: EliasFano,
}

impl Encoder for EliasFanoEncoder {
    fn encode(&mut self, values: &[u64]) {
        let mut sum = 0u64;
        let prefix: Vec<u64> = values
            .iter()
            .map(|&v| {
                sum += v;
                sum
            })
            .collect();
        self.prefix.encode(&prefix);
    }

    #[inline]
    fn access(&self, i: u64) -> u64 {
        if i == 0 {
            self.prefix.access(0)
        } else {
            self.prefix.access(i) - self.prefix.access(i - 1)
        }
    }

    fn num_bits(&self) -> u64 {
        self.prefix.num_bits()
    }
}

impl Visit for EliasFanoEncoder {
    fn visit<V: Visitor>(&mut self, visitor: &mut V) -> io::Result<()> {
        self.prefix.visit(visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::mix64;

    fn pilot_like_sequence(n: u64) -> Vec<u64> {
        // skewed toward small values, with a rare large tail
        (0..n)
            .map(|i| {
                let r = mix64(i);
                match r % 10 {
                    0..=5 => r % 4,
                    6..=8 => r % 32,
                    _ => r % 300,
                }
            })
            .collect()
    }

    fn check<E: Encoder>(values: &[u64]) -> u64 {
        let mut enc = E::default();
        enc.encode(values);
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(enc.access(i as u64), v, "i = {}", i);
        }
        enc.num_bits()
    }

    #[test]
    fn compact_reproduces_sequence() {
        check::<CompactEncoder>(&pilot_like_sequence(2000));
    }

    #[test]
    fn dictionary_reproduces_sequence() {
        check::<DictionaryEncoder>(&pilot_like_sequence(2000));
    }

    #[test]
    fn dual_reproduces_sequence_across_split() {
        check::<DictionaryDictionary>(&pilot_like_sequence(2000));
        // lengths around the split boundary
        for n in 0..12u64 {
            check::<DictionaryDictionary>(&pilot_like_sequence(n));
        }
    }

    #[test]
    fn elias_fano_reproduces_sequence() {
        check::<EliasFanoEncoder>(&pilot_like_sequence(2000));
        check::<EliasFanoEncoder>(&[0]);
        check::<EliasFanoEncoder>(&[0, 0, 7, 0, 3]);
    }

    #[test]
    fn dictionary_beats_compact_on_skewed_data() {
        let values: Vec<u64> = (0..5000u64).map(|i| if i % 50 == 0 { 1 << 40 } else { i % 7 }).collect();
        let compact = check::<CompactEncoder>(&values);
        let dict = check::<DictionaryEncoder>(&values);
        assert!(dict < compact);
    }
}
