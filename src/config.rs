use crate::error::BuildError;
use rand::Rng;

/// Partitions smaller than this on average are not worth the bookkeeping;
/// the partitioned builder falls back to a single partition below it.
pub const MIN_PARTITION_SIZE: u64 = 50_000;

/// Build parameters. Read-only once construction starts.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BuildConfig {
    /// Bucket density: the bucket count grows as `c * n / log2 n`. Larger
    /// values mean more, smaller buckets and faster pilot search at a
    /// storage cost.
    pub c: f64,
    /// Load factor `n / table_size`, in (0, 1].
    pub alpha: f64,
    /// Compact the output range to `[0, n)`.
    pub minimal: bool,
    /// 64-bit seed; 0 picks a random one.
    pub seed: u64,
    pub num_partitions: u64,
    /// 0 derives the bucket count from `c`.
    pub num_buckets: u64,
    pub num_threads: u64,
    /// Progress output through the `log` facade.
    pub verbose: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            c: 6.0,
            alpha: 0.94,
            minimal: true,
            seed: 0,
            num_partitions: 1,
            num_buckets: 0,
            num_threads: 1,
            verbose: false,
        }
    }
}

impl BuildConfig {
    pub(crate) fn validate(&self) -> Result<(), BuildError> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(BuildError::InvalidConfig("alpha must be in (0, 1]"));
        }
        if self.c <= 0.0 {
            return Err(BuildError::InvalidConfig("c must be positive"));
        }
        if self.num_partitions == 0 {
            return Err(BuildError::InvalidConfig("num_partitions must be at least 1"));
        }
        if self.num_threads == 0 {
            return Err(BuildError::InvalidConfig("num_threads must be at least 1"));
        }
        Ok(())
    }

    /// Resolves the 0 sentinel to a random seed.
    pub(crate) fn resolved_seed(&self) -> u64 {
        if self.seed != 0 {
            self.seed
        } else {
            rand::thread_rng().gen()
        }
    }
}

/// Wall-clock durations of the build phases, in seconds.
///
/// In partitioned builds, mapping and searching aggregate as per-thread
/// maxima: an approximation of wall-clock time, not a sum of work.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BuildTimings {
    pub partitioning_seconds: f64,
    pub mapping_ordering_seconds: f64,
    pub searching_seconds: f64,
    pub encoding_seconds: f64,
}
