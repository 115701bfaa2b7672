//! The partitioned perfect hash function.

use crate::bucketer::UniformBucketer;
use crate::config::{BuildConfig, BuildTimings};
use crate::encoder::Encoder;
use crate::error::BuildError;
use crate::hash::{Hash128, KeyHasher};
use crate::partitioned_builder::PartitionedBuilder;
use crate::single::{check_minimal, SinglePhf};
use crate::visit::{LoadVisitor, SaveVisitor, SizeVisitor, Visit, Visitor};
use std::borrow::Borrow;
use std::io::{self, Read, Write};
use std::time::Instant;

struct Partition<H: KeyHasher, E: Encoder, const MINIMAL: bool> {
    offset: u64,
    phf: SinglePhf<H, E, MINIMAL>,
}

impl<H: KeyHasher, E: Encoder, const MINIMAL: bool> Default for Partition<H, E, MINIMAL> {
    fn default() -> Self {
        Self {
            offset: 0,
            phf: SinglePhf::default(),
        }
    }
}

/// A perfect hash function assembled from independently built partitions.
///
/// Queries route through a uniform bucketer on `hash.mix()` to one
/// partition-local [`SinglePhf`], then add that partition's offset. The
/// offsets concatenate the partition ranges, so minimality of the parts
/// gives minimality of the whole.
pub struct PartitionedPhf<H: KeyHasher, E: Encoder, const MINIMAL: bool> {
    seed: u64,
    num_keys: u64,
    table_size: u64,
    bucketer: UniformBucketer,
    partitions: Vec<Partition<H, E, MINIMAL>>,
}

impl<H: KeyHasher, E: Encoder, const MINIMAL: bool> Default for PartitionedPhf<H, E, MINIMAL> {
    fn default() -> Self {
        Self {
            seed: 0,
            num_keys: 0,
            table_size: 0,
            bucketer: UniformBucketer::default(),
            partitions: Vec::new(),
        }
    }
}

impl<H: KeyHasher, E: Encoder, const MINIMAL: bool> PartitionedPhf<H, E, MINIMAL> {
    /// Builds the function over `keys` in memory, sharding into
    /// `config.num_partitions` sub-problems on `config.num_threads` threads.
    pub fn build<K>(keys: &[K], config: &BuildConfig) -> Result<(Self, BuildTimings), BuildError>
    where
        H::Key: Sync,
        K: Borrow<H::Key> + Sync,
    {
        check_minimal::<MINIMAL>(config)?;
        let mut builder = PartitionedBuilder::default();
        let mut timings = builder.build_from_keys::<H, K>(keys, config)?;
        let mut phf = Self::default();
        timings.encoding_seconds = phf.assemble(&builder, config)?;
        Ok((phf, timings))
    }

    fn assemble(
        &mut self,
        builder: &PartitionedBuilder,
        config: &BuildConfig,
    ) -> Result<f64, BuildError> {
        check_minimal::<MINIMAL>(config)?;
        let start = Instant::now();
        self.seed = builder.seed();
        self.num_keys = builder.num_keys();
        self.table_size = builder.table_size();
        self.bucketer = builder.bucketer().clone();
        self.partitions.clear();
        self.partitions.reserve(builder.builders().len());
        for (sub, &offset) in builder.builders().iter().zip(builder.offsets()) {
            let mut phf = SinglePhf::default();
            phf.assemble(sub, config)?;
            self.partitions.push(Partition { offset, phf });
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
        let b = self.bucketer.bucket(hash.mix());
        let partition = &self.partitions[b as usize];
        partition.offset + partition.phf.position(hash)
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

    #[inline]
    pub fn num_partitions(&self) -> u64 {
        self.partitions.len() as u64
    }

    pub fn num_bits_for_pilots(&self) -> u64 {
        let mut bits = 8 * (8 + 8 + 8 + 8) + self.bucketer.num_bits();
        for partition in &self.partitions {
            bits += 64 + partition.phf.num_bits_for_pilots();
        }
        bits
    }

    pub fn num_bits_for_mapper(&self) -> u64 {
        self.partitions
            .iter()
            .map(|p| p.phf.num_bits_for_mapper())
            .sum()
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

impl<H: KeyHasher, E: Encoder, const MINIMAL: bool> Visit for PartitionedPhf<H, E, MINIMAL> {
    fn visit<V: Visitor>(&mut self, visitor: &mut V) -> io::Result<()> {
        visitor.visit_u64(&mut self.seed)?;
        visitor.visit_u64(&mut self.num_keys)?;
        visitor.visit_u64(&mut self.table_size)?;
        self.bucketer.visit(visitor)?;
        let mut len = self.partitions.len() as u64;
        visitor.visit_u64(&mut len)?;
        self.partitions.resize_with(len as usize, Partition::default);
        for partition in &mut self.partitions {
            visitor.visit_u64(&mut partition.offset)?;
            partition.phf.visit(visitor)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::DictionaryDictionary;
    use crate::hash::Mix64Hasher;
    use hashbrown::HashSet;

    #[test]
    fn collapsed_partitioned_build_is_a_bijection() {
        let keys: Vec<u64> = (0..5000u64).map(|i| i * 3 + 1).collect();
        let config = BuildConfig {
            num_partitions: 8,
            num_threads: 2,
            seed: 11,
            ..BuildConfig::default()
        };
        let (phf, _) =
            PartitionedPhf::<Mix64Hasher, DictionaryDictionary, true>::build(&keys, &config)
                .unwrap();
        assert_eq!(phf.num_partitions(), 1);
        let mut seen = HashSet::with_capacity(keys.len());
        for k in &keys {
            let p = phf.index(k);
            assert!(p < keys.len() as u64);
            assert!(seen.insert(p));
        }
    }

    #[test]
    fn minimality_mismatch_is_rejected() {
        let keys: Vec<u64> = (0..100u64).collect();
        let config = BuildConfig {
            minimal: false,
            seed: 11,
            ..BuildConfig::default()
        };
        assert!(matches!(
            PartitionedPhf::<Mix64Hasher, DictionaryDictionary, true>::build(&keys, &config),
            Err(BuildError::InvalidConfig(_))
        ));
    }
}
