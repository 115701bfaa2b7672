//! Partitioned construction driver.
//!
//! Keys are sharded into independent sub-problems on `hash.mix()`, each built
//! by its own [`SingleBuilder`], optionally on parallel OS threads. A thread
//! owns a contiguous range of partitions and builds them sequentially; the
//! shared `taken` bit set inside a partition forbids going finer than that.

use crate::bucketer::UniformBucketer;
use crate::config::{BuildConfig, BuildTimings, MIN_PARTITION_SIZE};
use crate::error::BuildError;
use crate::hash::{Hash128, KeyHasher};
use crate::single_builder::{check_hash_collision_probability, hash_keys, SingleBuilder};
use log::info;
use std::borrow::Borrow;
use std::thread;
use std::time::Instant;

#[derive(Clone, Debug, Default)]
pub struct PartitionedBuilder {
    seed: u64,
    num_keys: u64,
    table_size: u64,
    num_partitions: u64,
    bucketer: UniformBucketer,
    offsets: Vec<u64>,
    builders: Vec<SingleBuilder>,
}

impl PartitionedBuilder {
    pub fn build_from_keys<H, K>(
        &mut self,
        keys: &[K],
        config: &BuildConfig,
    ) -> Result<BuildTimings, BuildError>
    where
        H: KeyHasher,
        H::Key: Sync,
        K: Borrow<H::Key> + Sync,
    {
        config.validate()?;
        if keys.is_empty() {
            return Err(BuildError::EmptyInput);
        }
        check_hash_collision_probability::<H>(keys.len() as u64)?;

        let seed = config.resolved_seed();
        let start = Instant::now();
        let num_keys = keys.len() as u64;

        let mut num_partitions = config.num_partitions;
        if num_partitions > 1
            && (num_keys as f64 / num_partitions as f64) < MIN_PARTITION_SIZE as f64
        {
            num_partitions = 1;
        }
        if config.verbose {
            info!("building {} partitions over {} keys", num_partitions, num_keys);
        }

        self.seed = seed;
        self.num_keys = num_keys;
        self.num_partitions = num_partitions;
        self.bucketer = UniformBucketer::new(num_partitions);

        let hashes = hash_keys::<H, K>(keys, seed);
        let average = num_keys as f64 / num_partitions as f64;
        let mut partitions: Vec<Vec<Hash128>> = (0..num_partitions)
            .map(|_| Vec::with_capacity((1.5 * average) as usize))
            .collect();
        for h in &hashes {
            partitions[self.bucketer.bucket(h.mix()) as usize].push(*h);
        }
        drop(hashes);

        // Per-partition sizing. Offsets concatenate partition-local ranges:
        // key counts when minimal, table sizes otherwise.
        self.table_size = 0;
        self.offsets = Vec::with_capacity(num_partitions as usize);
        let mut cumulative = 0u64;
        for partition in &partitions {
            let size = partition.len() as u64;
            let mut table_size = (size as f64 / config.alpha).ceil() as u64;
            if table_size == 0 || table_size.is_power_of_two() {
                table_size += 1;
            }
            self.table_size += table_size;
            self.offsets.push(cumulative);
            cumulative += if config.minimal { size } else { table_size };
        }

        // Sub-builders split the derived global bucket count and run quiet
        // and single-threaded; parallelism lives across partitions only.
        let total_buckets = ((config.c * num_keys as f64) / (num_keys.max(2) as f64).log2())
            .ceil() as u64;
        let mut sub_config = config.clone();
        sub_config.seed = seed;
        sub_config.num_partitions = num_partitions;
        sub_config.num_buckets = (total_buckets / num_partitions).max(1);
        sub_config.num_threads = 1;
        sub_config.verbose = false;

        let partitioning_seconds = start.elapsed().as_secs_f64();

        self.builders = vec![SingleBuilder::default(); num_partitions as usize];
        let (mapping_ordering_seconds, searching_seconds) = build_partitions(
            &partitions,
            &mut self.builders,
            &sub_config,
            config.num_threads,
        )?;

        Ok(BuildTimings {
            partitioning_seconds,
            mapping_ordering_seconds,
            searching_seconds,
            encoding_seconds: 0.0,
        })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn num_keys(&self) -> u64 {
        self.num_keys
    }

    pub fn table_size(&self) -> u64 {
        self.table_size
    }

    pub fn num_partitions(&self) -> u64 {
        self.num_partitions
    }

    pub fn bucketer(&self) -> &UniformBucketer {
        &self.bucketer
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    pub fn builders(&self) -> &[SingleBuilder] {
        &self.builders
    }
}

/// Builds every partition, spreading contiguous ranges over `num_threads`
/// scoped threads. All threads run to completion; the failure with the
/// lowest partition index wins. Reported times are per-thread maxima.
fn build_partitions(
    partitions: &[Vec<Hash128>],
    builders: &mut [SingleBuilder],
    config: &BuildConfig,
    num_threads: u64,
) -> Result<(f64, f64), BuildError> {
    let seed = config.seed;
    let num_partitions = partitions.len();

    if num_threads > 1 && num_partitions > 1 {
        let per_thread = num_partitions.div_ceil(num_threads as usize);
        let mut first_failure: Option<(usize, BuildError)> = None;
        let mut mapping_max = 0.0f64;
        let mut searching_max = 0.0f64;
        thread::scope(|scope| {
            let mut handles = Vec::new();
            for (t, (chunk, chunk_builders)) in partitions
                .chunks(per_thread)
                .zip(builders.chunks_mut(per_thread))
                .enumerate()
            {
                let base = t * per_thread;
                handles.push(scope.spawn(move || {
                    let mut mapping = 0.0f64;
                    let mut searching = 0.0f64;
                    for (i, (partition, builder)) in
                        chunk.iter().zip(chunk_builders.iter_mut()).enumerate()
                    {
                        match builder.build_from_hashes(partition, seed, config) {
                            Ok(timings) => {
                                mapping += timings.mapping_ordering_seconds;
                                searching += timings.searching_seconds;
                            }
                            Err(e) => return Err((base + i, e)),
                        }
                    }
                    Ok((mapping, searching))
                }));
            }
            for handle in handles {
                match handle.join() {
                    Ok(Ok((mapping, searching))) => {
                        mapping_max = mapping_max.max(mapping);
                        searching_max = searching_max.max(searching);
                    }
                    Ok(Err((index, e))) => {
                        if first_failure.as_ref().map_or(true, |(first, _)| index < *first) {
                            first_failure = Some((index, e));
                        }
                    }
                    Err(payload) => std::panic::resume_unwind(payload),
                }
            }
        });
        if let Some((_, e)) = first_failure {
            return Err(e);
        }
        Ok((mapping_max, searching_max))
    } else {
        let mut mapping = 0.0f64;
        let mut searching = 0.0f64;
        for (partition, builder) in partitions.iter().zip(builders.iter_mut()) {
            let timings = builder.build_from_hashes(partition, seed, config)?;
            mapping += timings.mapping_ordering_seconds;
            searching += timings.searching_seconds;
        }
        Ok((mapping, searching))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Mix64Hasher;

    #[test]
    fn small_inputs_collapse_to_one_partition() {
        let keys: Vec<u64> = (0..1000u64).collect();
        let config = BuildConfig {
            num_partitions: 16,
            seed: 5,
            ..BuildConfig::default()
        };
        let mut builder = PartitionedBuilder::default();
        builder
            .build_from_keys::<Mix64Hasher, u64>(&keys, &config)
            .unwrap();
        assert_eq!(builder.num_partitions(), 1);
        assert_eq!(builder.offsets(), &[0]);
    }

    #[test]
    fn minimal_offsets_concatenate_key_counts() {
        let keys: Vec<u64> = (0..150_000u64).map(|i| i * 7 + 3).collect();
        let config = BuildConfig {
            num_partitions: 3,
            num_threads: 2,
            seed: 5,
            ..BuildConfig::default()
        };
        let mut builder = PartitionedBuilder::default();
        let timings = builder
            .build_from_keys::<Mix64Hasher, u64>(&keys, &config)
            .unwrap();
        assert_eq!(builder.num_partitions(), 3);
        assert!(timings.partitioning_seconds > 0.0);
        assert!(timings.searching_seconds > 0.0);

        let sizes: Vec<u64> = builder.builders().iter().map(|b| b.num_keys()).collect();
        assert_eq!(sizes.iter().sum::<u64>(), 150_000);
        let mut cumulative = 0u64;
        for (offset, size) in builder.offsets().iter().zip(&sizes) {
            assert_eq!(*offset, cumulative);
            cumulative += size;
        }
        let table_total: u64 = builder.builders().iter().map(|b| b.table_size()).sum();
        assert_eq!(table_total, builder.table_size());
    }
}
