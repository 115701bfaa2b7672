//! pilot_mph — minimal perfect hashing via per-bucket pilot search.
//!
//! Given a static set of `n` distinct keys, builds a function mapping them
//! bijectively onto `[0, n)` (or onto a slightly larger table when the
//! minimal remap is disabled). The function is built once and then queried
//! in constant time; keys outside the set get arbitrary but well-defined
//! answers, with no membership guarantee.
//!
//! Construction hashes every key, groups hashes into buckets, and searches a
//! per-bucket *pilot* value that steers the whole bucket into free slots of
//! the table. A skewed bucketer front-loads the hard buckets, and an
//! Elias-Fano remap of the free slots compacts the range to `[0, n)`. Large
//! sets can be sharded into partitions built concurrently.
//!
//! ```
//! use pilot_mph::{BuildConfig, DictionaryDictionary, Mix64Hasher, SinglePhf};
//!
//! let keys: Vec<u64> = (0..10_000u64).map(|i| i * 37 + 5).collect();
//! let config = BuildConfig { seed: 1, ..BuildConfig::default() };
//! let (phf, _timings) =
//!     SinglePhf::<Mix64Hasher, DictionaryDictionary, true>::build(&keys, &config).unwrap();
//! assert!(phf.index(&keys[42]) < keys.len() as u64);
//! ```

mod bits;
mod bucketer;
mod config;
mod elias_fano;
mod encoder;
mod error;
mod fastmod;
mod hash;
mod partitioned;
mod partitioned_builder;
mod single;
mod single_builder;
mod visit;

pub use bucketer::{SkewBucketer, UniformBucketer};
pub use config::{BuildConfig, BuildTimings, MIN_PARTITION_SIZE};
pub use elias_fano::EliasFano;
pub use encoder::{
    CompactEncoder, DictionaryDictionary, DictionaryEncoder, DualEncoder, EliasFanoEncoder,
    Encoder,
};
pub use error::BuildError;
pub use fastmod::{compute_m_u64, fastdiv_u64, fastmod_u64};
pub use hash::{default_hash64, Hash128, KeyHasher, Mix64Hasher, WyHasher};
pub use partitioned::PartitionedPhf;
pub use partitioned_builder::PartitionedBuilder;
pub use single::SinglePhf;
pub use single_builder::SingleBuilder;
pub use visit::{LoadVisitor, SaveVisitor, SizeVisitor, Visit, Visitor};
