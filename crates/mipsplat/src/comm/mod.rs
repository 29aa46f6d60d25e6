// src/comm/mod.rs
//! Collective operations over a group of cooperating ranks.
//!
//! The painter never reaches for a process-wide default group; callers inject
//! one (or `None` for single-process rendering).
//!
//! - [`ThreadGroup`]: ranks are threads of one process.
//! - [`TcpGroup`]: ranks are separate processes connected to rank 0 over TCP.
//!
//! All collectives block until every rank of the group has called the same
//! collective. A rank that skips a call stalls the others indefinitely.

pub mod local;
pub mod tcp;

pub use self::local::{ThreadGroup, ThreadRank};
pub use self::tcp::{RootListener, TcpGroup};

use crate::error::CommError;

/// Element-wise reduction applied across ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReduceOp {
    Min = 0,
    Max = 1,
}

impl ReduceOp {
    #[inline(always)]
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            ReduceOp::Min => a.min(b),
            ReduceOp::Max => a.max(b),
        }
    }

    /// Folds `other` into `acc` element by element.
    #[inline]
    pub fn fold_into(self, acc: &mut [f64], other: &[f64]) {
        for (a, &b) in acc.iter_mut().zip(other) {
            *a = self.apply(*a, b);
        }
    }

    pub(crate) fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(ReduceOp::Min),
            1 => Some(ReduceOp::Max),
            _ => None,
        }
    }
}

/// A handle on one rank of a process group.
pub trait ProcessGroup: Send + Sync {
    /// This rank's id in `0..size()`.
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Element-wise reduction delivered to every rank.
    fn all_reduce(&self, values: &[f64], op: ReduceOp) -> Result<Vec<f64>, CommError>;

    /// Element-wise reduction delivered to `root` only; other ranks get `None`.
    fn reduce(
        &self,
        values: &[f64],
        op: ReduceOp,
        root: usize,
    ) -> Result<Option<Vec<f64>>, CommError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_is_element_wise() {
        let mut acc = vec![1.0, 5.0, f64::MIN];
        ReduceOp::Max.fold_into(&mut acc, &[3.0, 2.0, f64::MIN]);
        assert_eq!(acc, vec![3.0, 5.0, f64::MIN]);

        ReduceOp::Min.fold_into(&mut acc, &[0.0, 9.0, 4.0]);
        assert_eq!(acc, vec![0.0, 5.0, f64::MIN]);
    }
}
