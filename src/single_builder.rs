//! In-memory builder for one (possibly partition-local) key set.
//!
//! Produces the raw pilot table and free-slot list; encoding happens later,
//! at function assembly. The pipeline is: hash, map hashes to buckets, order
//! buckets by decreasing size, then search a pilot per bucket against a
//! shared occupancy bit set.

use crate::bits::BitVec;
use crate::bucketer::SkewBucketer;
use crate::config::{BuildConfig, BuildTimings};
use crate::error::BuildError;
use crate::fastmod::{compute_m_u64, fastmod_u64};
use crate::hash::{default_hash64, Hash128, KeyHasher};
use log::info;
use std::borrow::Borrow;
use std::time::Instant;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Clone, Debug, Default)]
pub struct SingleBuilder {
    seed: u64,
    num_keys: u64,
    table_size: u64,
    bucketer: SkewBucketer,
    pilots: Vec<u64>,
    free_slots: Vec<u64>,
}

impl SingleBuilder {
    /// Hashes `keys` with a resolved seed and builds. The public entry point
    /// for a standalone single-partition function.
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
        let hashes = hash_keys::<H, K>(keys, seed);
        let hashing_seconds = start.elapsed().as_secs_f64();

        let mut timings = self.build_from_hashes(&hashes, seed, config)?;
        timings.mapping_ordering_seconds += hashing_seconds;
        Ok(timings)
    }

    /// Builds from pre-hashed keys. Empty inputs are tolerated here so the
    /// partitioned driver can hand over sparse partitions.
    pub fn build_from_hashes(
        &mut self,
        hashes: &[Hash128],
        seed: u64,
        config: &BuildConfig,
    ) -> Result<BuildTimings, BuildError> {
        config.validate()?;
        let n = hashes.len() as u64;

        let mapping_start = Instant::now();

        // 1) Sizing. A power-of-two table interacts poorly with the pilot
        //    mixing, so bump it by one (this also covers the empty case).
        let mut table_size = (n as f64 / config.alpha).ceil() as u64;
        if table_size == 0 || table_size.is_power_of_two() {
            table_size += 1;
        }
        let num_buckets = if config.num_buckets != 0 {
            config.num_buckets
        } else {
            ((config.c * n as f64) / (n.max(2) as f64).log2())
                .ceil()
                .max(1.0) as u64
        };
        let bucketer = SkewBucketer::new(num_buckets);
        let m = compute_m_u64(table_size);

        // 2) Mapping: counting-sort hashes into per-bucket ranges.
        let nb = num_buckets as usize;
        let mut counts = vec![0u64; nb];
        let mut bucket_of = vec![0u64; hashes.len()];
        for (i, h) in hashes.iter().enumerate() {
            let b = bucketer.bucket(h.first());
            bucket_of[i] = b;
            counts[b as usize] += 1;
        }
        let mut offsets = vec![0u64; nb + 1];
        for b in 0..nb {
            offsets[b + 1] = offsets[b] + counts[b];
        }
        let mut cursor = offsets[..nb].to_vec();
        let mut items = vec![0u64; hashes.len()];
        for (i, &b) in bucket_of.iter().enumerate() {
            let pos = cursor[b as usize];
            items[pos as usize] = i as u64;
            cursor[b as usize] = pos + 1;
        }
        drop(bucket_of);
        drop(cursor);

        // 3) Ordering within buckets, plus the only non-termination hazard:
        //    two keys with equal `second` in one bucket share a slot under
        //    every pilot, which is indistinguishable from a duplicate key.
        for b in 0..nb {
            let range = offsets[b] as usize..offsets[b + 1] as usize;
            let bucket_items = &mut items[range];
            bucket_items.sort_unstable_by_key(|&i| hashes[i as usize].second());
            for w in bucket_items.windows(2) {
                if hashes[w[0] as usize].second() == hashes[w[1] as usize].second() {
                    return Err(BuildError::SeedCollision);
                }
            }
        }

        // 4) Ordering across buckets: decreasing size, index-ascending within
        //    a size class, so the search is deterministic.
        let order = order_by_decreasing_size(&counts);
        let mapping_ordering_seconds = mapping_start.elapsed().as_secs_f64();

        if config.verbose {
            info!(
                "mapped {} keys into {} buckets over {} slots",
                n, num_buckets, table_size
            );
        }

        // 5) Pilot search. In-bucket slot distinctness is tracked by epoch
        //    marks so the scratch array never needs clearing.
        let search_start = Instant::now();
        let mut taken = BitVec::new(table_size);
        let mut pilots = vec![0u64; nb];
        let mut seen_epoch = vec![0u32; table_size as usize];
        let mut epoch = 0u32;
        let mut trial: Vec<u64> = Vec::new();

        for &b in &order {
            let bucket_items = &items[offsets[b as usize] as usize..offsets[b as usize + 1] as usize];
            if bucket_items.is_empty() {
                // ordered by decreasing size: everything after this is empty too
                break;
            }

            let mut pilot = 0u64;
            loop {
                epoch = epoch.wrapping_add(1);
                if epoch == 0 {
                    seen_epoch.fill(0);
                    epoch = 1;
                }
                let hp = default_hash64(pilot, seed);
                trial.clear();
                let mut ok = true;
                for &i in bucket_items {
                    let h = hashes[i as usize];
                    let slot = fastmod_u64(h.second() ^ hp, m, table_size);
                    if taken.test(slot) {
                        ok = false;
                        break;
                    }
                    let mark = unsafe { seen_epoch.get_unchecked_mut(slot as usize) };
                    if *mark == epoch {
                        ok = false;
                        break;
                    }
                    *mark = epoch;
                    trial.push(slot);
                }
                if ok {
                    for &slot in &trial {
                        taken.set(slot);
                    }
                    pilots[b as usize] = pilot;
                    break;
                }
                if pilot == u64::MAX {
                    return Err(BuildError::SeedCollision);
                }
                pilot += 1;
            }
        }
        let searching_seconds = search_start.elapsed().as_secs_f64();

        if config.verbose {
            info!("searched pilots for {} buckets", num_buckets);
        }

        // 6) Free slots: one entry per slot in [n, table_size). Taken slots
        //    map to the next untaken slot from the bottom (always below n);
        //    untaken slots repeat the previous value to keep the sequence
        //    non-decreasing and are never looked up.
        let mut free_slots = Vec::new();
        if config.minimal && n < table_size {
            free_slots.reserve((table_size - n) as usize);
            let mut untaken = 0u64;
            let mut last = 0u64;
            for p in n..table_size {
                if taken.test(p) {
                    while taken.test(untaken) {
                        untaken += 1;
                    }
                    last = untaken;
                    free_slots.push(untaken);
                    untaken += 1;
                } else {
                    free_slots.push(last);
                }
            }
        }

        self.seed = seed;
        self.num_keys = n;
        self.table_size = table_size;
        self.bucketer = bucketer;
        self.pilots = pilots;
        self.free_slots = free_slots;

        Ok(BuildTimings {
            partitioning_seconds: 0.0,
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

    pub fn bucketer(&self) -> &SkewBucketer {
        &self.bucketer
    }

    pub fn pilots(&self) -> &[u64] {
        &self.pilots
    }

    pub fn free_slots(&self) -> &[u64] {
        &self.free_slots
    }
}

pub(crate) fn hash_keys<H, K>(keys: &[K], seed: u64) -> Vec<Hash128>
where
    H: KeyHasher,
    H::Key: Sync,
    K: Borrow<H::Key> + Sync,
{
    #[cfg(feature = "parallel")]
    {
        return keys.par_iter().map(|k| H::hash(k.borrow(), seed)).collect();
    }
    #[cfg(not(feature = "parallel"))]
    {
        return keys.iter().map(|k| H::hash(k.borrow(), seed)).collect();
    }
}

pub(crate) fn check_hash_collision_probability<H: KeyHasher>(n: u64) -> Result<(), BuildError> {
    // With a 128-bit digest the expected birthday collision is negligible for
    // any in-memory n; 64-bit families are cut off where it stops being so.
    if H::BITS == 64 && n > (1u64 << 30) {
        return Err(BuildError::InvalidConfig(
            "too many keys for a 64-bit hash family; use a 128-bit hasher",
        ));
    }
    Ok(())
}

/// Counting sort of bucket ids by decreasing load; ascending id inside a
/// size class keeps the result stable.
fn order_by_decreasing_size(counts: &[u64]) -> Vec<u64> {
    let max_len = counts.iter().copied().max().unwrap_or(0) as usize;
    let mut freq = vec![0u64; max_len + 1];
    for &c in counts {
        freq[c as usize] += 1;
    }
    let mut next = vec![0u64; max_len + 1];
    let mut acc = 0u64;
    for len in (0..=max_len).rev() {
        next[len] = acc;
        acc += freq[len];
    }
    let mut order = vec![0u64; counts.len()];
    for (bucket, &c) in counts.iter().enumerate() {
        let pos = next[c as usize];
        order[pos as usize] = bucket as u64;
        next[c as usize] = pos + 1;
    }
    order
}
