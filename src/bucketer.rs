//! Deterministic maps from 64-bit hash halves to bucket indices.

use crate::fastmod::{compute_m_u64, fastmod_u64};
use crate::visit::{Visit, Visitor};
use std::io;

/// Uniform map onto `[0, num_buckets)`. Used for partitioning and wherever
/// an even spread is wanted.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UniformBucketer {
    num_buckets: u64,
    m: u128,
}

impl UniformBucketer {
    pub fn new(num_buckets: u64) -> Self {
        assert!(num_buckets > 0, "bucketer needs at least one bucket");
        Self {
            num_buckets,
            m: compute_m_u64(num_buckets),
        }
    }

    #[inline]
    pub fn bucket(&self, x: u64) -> u64 {
        fastmod_u64(x, self.m, self.num_buckets)
    }

    #[inline]
    pub fn num_buckets(&self) -> u64 {
        self.num_buckets
    }

    pub fn num_bits(&self) -> u64 {
        8 * (8 + 16)
    }
}

impl Visit for UniformBucketer {
    fn visit<V: Visitor>(&mut self, visitor: &mut V) -> io::Result<()> {
        visitor.visit_u64(&mut self.num_buckets)?;
        visitor.visit_u128(&mut self.m)
    }
}

/// Skewed map onto `[0, num_buckets)`.
///
/// A dense prefix of ~30% of the buckets receives ~60% of the keys, so the
/// hardest buckets are placed while the table is still empty and their pilots
/// stay small.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SkewBucketer {
    num_dense: u64,
    num_sparse: u64,
    m_dense: u128,
    m_sparse: u128,
    threshold: u64,
}

impl SkewBucketer {
    pub fn new(num_buckets: u64) -> Self {
        Self::with_ratios(num_buckets, 0.3, 0.6)
    }

    /// `dense_fraction` of the buckets receive `dense_probability` of the
    /// keys. The defaults (0.3, 0.6) are tuned; at least one sparse bucket
    /// always remains.
    pub fn with_ratios(num_buckets: u64, dense_fraction: f64, dense_probability: f64) -> Self {
        assert!(num_buckets > 0, "bucketer needs at least one bucket");
        let num_dense = ((dense_fraction * num_buckets as f64) as u64).min(num_buckets - 1);
        let num_sparse = num_buckets - num_dense;
        Self {
            num_dense,
            num_sparse,
            m_dense: if num_dense > 0 { compute_m_u64(num_dense) } else { 0 },
            m_sparse: compute_m_u64(num_sparse),
            threshold: if num_dense > 0 {
                (dense_probability * u64::MAX as f64) as u64
            } else {
                0
            },
        }
    }

    #[inline]
    pub fn bucket(&self, x: u64) -> u64 {
        if x < self.threshold {
            fastmod_u64(x, self.m_dense, self.num_dense)
        } else {
            self.num_dense + fastmod_u64(x, self.m_sparse, self.num_sparse)
        }
    }

    #[inline]
    pub fn num_buckets(&self) -> u64 {
        self.num_dense + self.num_sparse
    }

    pub fn num_bits(&self) -> u64 {
        8 * (8 + 8 + 16 + 16 + 8)
    }
}

impl Visit for SkewBucketer {
    fn visit<V: Visitor>(&mut self, visitor: &mut V) -> io::Result<()> {
        visitor.visit_u64(&mut self.num_dense)?;
        visitor.visit_u64(&mut self.num_sparse)?;
        visitor.visit_u128(&mut self.m_dense)?;
        visitor.visit_u128(&mut self.m_sparse)?;
        visitor.visit_u64(&mut self.threshold)
    }
}
