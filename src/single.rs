//! The single-partition perfect hash function.

use crate::bucketer::SkewBucketer;
use crate::config::{BuildConfig, BuildTimings};
use crate::elias_fano::EliasFano;
use crate::encoder::Encoder;
use crate::error::BuildError;
use crate::fastmod::{compute_m_u64, fastmod_u64};
use crate::hash::{default_hash64, Hash128, KeyHasher};
use crate::single_builder::SingleBuilder;
use crate::visit::{LoadVisitor, SaveVisitor, SizeVisitor, Visit, Visitor};
use std::borrow::Borrow;
use std::io::{self, Read, Write};
use std::marker::PhantomData;
use std::time::Instant;

/// A perfect hash function over one key set.
///
/// With `MINIMAL = true` the output range is exactly `[0, num_keys)`;
/// otherwise it is `[0, table_size)`. Hasher, encoder and minimality are
/// compile-time parameters, so each combination monomorphizes to its own
/// query path. Keys outside the build set get arbitrary but well-defined
/// answers.
pub struct SinglePhf<H: KeyHasher, E: Encoder, const MINIMAL: bool> {
    seed: u64,
    num_keys: u64,
    table_size: u64,
    m: u128,
    bucketer: SkewBucketer,
    pilots: E,
    free_slots: EliasFano,
    _hasher: PhantomData<H>,
}

impl<H: KeyHasher, E: Encoder, const MINIMAL: bool> Default for SinglePhf<H, E, MINIMAL> {
    fn default() -> Self {
        Self {
            seed: 0,
            num_keys: 0,
            table_size: 0,
            m: 0,
            bucketer: SkewBucketer::default(),
            pilots: E::default(),
            free_slots: EliasFano::default(),
            _hasher: PhantomData,
        }
    }
}

impl<H: KeyHasher, E: Encoder, const MINIMAL: bool> SinglePhf<H, E, MINIMAL> {
    /// Builds the function over `keys` in memory.
    pub fn build<K>(keys: &[K], config: &BuildConfig) -> Result<(Self, BuildTimings), BuildError>
    where
        H::Key: Sync,
        K: Borrow<H::Key> + Sync,
    {
        check_minimal::<MINIMAL>(config)?;
        let mut builder = SingleBuilder::default();
        let mut timings = builder.build_from_keys::<H, K>(keys, config)?;
        let mut phf = Self::default();
        timings.encoding_seconds = phf.assemble(&builder, config)?;
        Ok((phf, timings))
    }

    /// Encodes a finished builder into the queryable form. Returns the time
    /// spent encoding.
    pub(crate) fn assemble(
        &mut self,
        builder: &SingleBuilder,
        config: &BuildConfig,
    ) -> Result<f64, BuildError> {
        check_minimal::<MINIMAL>(config)?;
        let start = Instant::now();
        self.seed = builder.seed();
        self.num_keys = builder.num_keys();
        self.table_size = builder.table_size();
        self.m = compute_m_u64(self.table_size);
        self.bucketer = builder.bucketer().clone();
        self.pilots.encode(builder.pilots());
        if MINIMAL && self.num_keys < self.table_size {
            self.free_slots.encode(builder.free_slots());
        }
        Ok(start.elapsed().as_secs_f64())
    }

    /// The query entry point.
    #[inline]
    pub fn index(&self, key: &H::Key) -> u64 {
        self.position(H::hash(key, self.seed))
    }

    #[inline]
    pub fn position(&self, hash: Hash128) -> u64 {
        let bucket = self.bucketer.bucket(hash.first());
        let pilot = self.pilots.access(bucket);
        let hp = default_hash64(pilot, self.seed);
        let p = fastmod_u64(hash.second() ^ hp, self.m, self.table_size);
        if MINIMAL {
            if p < self.num_keys {
                return p;
            }
            return self.free_slots.access(p - self.num_keys);
        }
        p
    }

    #[inline]
    pub fn num_keys(&self) -> u64 {
        self.num_keys
    }

    #[inline]
    pub fn table_size(&self) -> u64 {
        self.table_size
    }

    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn num_bits_for_pilots(&self) -> u64 {
        8 * (8 + 8 + 8 + 16) + self.bucketer.num_bits() + self.pilots.num_bits()
    }

    pub fn num_bits_for_mapper(&self) -> u64 {
        if self.free_slots.is_empty() {
            0
        } else {
            self.free_slots.num_bits()
        }
    }

    /// Total storage cost in bits.
    pub fn num_bits(&self) -> u64 {
        self.num_bits_for_pilots() + self.num_bits_for_mapper()
    }

    /// Writes the function as its field walk; see [`crate::visit`].
    pub fn save<W: Write>(&mut self, writer: W) -> io::Result<()> {
        let mut visitor = SaveVisitor::new(writer);
        self.visit(&mut visitor)
    }

    pub fn load<R: Read>(reader: R) -> io::Result<Self> {
        let mut phf = Self::default();
        let mut visitor = LoadVisitor::new(reader);
        phf.visit(&mut visitor)?;
        Ok(phf)
    }

    pub fn serialized_bytes(&mut self) -> io::Result<u64> {
        let mut visitor = SizeVisitor::new();
        self.visit(&mut visitor)?;
        Ok(visitor.num_bytes())
    }
}

pub(crate) fn check_minimal<const MINIMAL: bool>(config: &BuildConfig) -> Result<(), BuildError> {
    if config.minimal != MINIMAL {
        return Err(BuildError::InvalidConfig(
            "config.minimal does not match the function's minimality",
        ));
    }
    Ok(())
}

impl<H: KeyHasher, E: Encoder, const MINIMAL: bool> Visit for SinglePhf<H, E, MINIMAL> {
    fn visit<V: Visitor>(&mut self, visitor: &mut V) -> io::Result<()> {
        visitor.visit_u64(&mut self.seed)?;
        visitor.visit_u64(&mut self.num_keys)?;
        visitor.visit_u64(&mut self.table_size)?;
        visitor.visit_u128(&mut self.m)?;
        self.bucketer.visit(visitor)?;
        self.pilots.visit(visitor)?;
        self.free_slots.visit(visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{CompactEncoder, DictionaryDictionary};
    use crate::hash::Mix64Hasher;
    use hashbrown::HashSet;

    fn config(minimal: bool) -> BuildConfig {
        BuildConfig {
            minimal,
            seed: 3,
            ..BuildConfig::default()
        }
    }

    #[test]
    fn minimal_build_is_a_bijection() {
        let keys: Vec<u64> = (0..2000u64).map(|i| i * 131 + 11).collect();
        let (phf, _) =
            SinglePhf::<Mix64Hasher, DictionaryDictionary, true>::build(&keys, &config(true))
                .unwrap();
        let mut seen = HashSet::with_capacity(keys.len());
        for k in &keys {
            let p = phf.index(k);
            assert!(p < keys.len() as u64);
            assert!(seen.insert(p), "duplicate position {}", p);
        }
    }

    #[test]
    fn non_minimal_build_stays_in_table_range() {
        let keys: Vec<u64> = (0..2000u64).collect();
        let (phf, _) =
            SinglePhf::<Mix64Hasher, CompactEncoder, false>::build(&keys, &config(false)).unwrap();
        let mut seen = HashSet::with_capacity(keys.len());
        for k in &keys {
            let p = phf.index(k);
            assert!(p < phf.table_size());
            assert!(seen.insert(p));
        }
        assert_eq!(phf.num_bits_for_mapper(), 0);
    }

    #[test]
    fn minimality_mismatch_is_rejected() {
        let keys: Vec<u64> = (0..100u64).collect();
        assert!(matches!(
            SinglePhf::<Mix64Hasher, CompactEncoder, true>::build(&keys, &config(false)),
            Err(BuildError::InvalidConfig(_))
        ));
    }

    #[test]
    fn single_key_maps_to_zero() {
        let keys = [0xDEAD_BEEFu64];
        let (phf, _) =
            SinglePhf::<Mix64Hasher, CompactEncoder, true>::build(&keys, &config(true)).unwrap();
        assert_eq!(phf.index(&keys[0]), 0);
        assert_eq!(phf.num_keys(), 1);
    }

    #[test]
    fn save_load_answers_identically() {
        let keys: Vec<u64> = (0..1500u64).map(|i| i.wrapping_mul(0x2545_F491_4F6C_DD1D)).collect();
        let (mut phf, _) =
            SinglePhf::<Mix64Hasher, DictionaryDictionary, true>::build(&keys, &config(true))
                .unwrap();
        let mut bytes = Vec::new();
        phf.save(&mut bytes).unwrap();
        assert_eq!(phf.serialized_bytes().unwrap(), bytes.len() as u64);
        let loaded =
            SinglePhf::<Mix64Hasher, DictionaryDictionary, true>::load(bytes.as_slice()).unwrap();
        for k in &keys {
            assert_eq!(phf.index(k), loaded.index(k));
        }
    }
}
