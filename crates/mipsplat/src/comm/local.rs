//! In-process process group: each rank is a thread, and collectives meet at a
//! shared rendezvous guarded by a `parking_lot` mutex and condvar.

use super::{ProcessGroup, ReduceOp};
use crate::error::CommError;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// Factory for the ranks of an in-process group.
pub struct ThreadGroup;

impl ThreadGroup {
    /// Creates `size` connected ranks. Hand one to each thread.
    pub fn new(size: usize) -> Vec<ThreadRank> {
        let size = size.max(1);
        let shared = Arc::new(Rendezvous {
            size,
            round: Mutex::new(Round::default()),
            cv: Condvar::new(),
        });
        (0..size)
            .map(|rank| ThreadRank {
                rank,
                shared: shared.clone(),
            })
            .collect()
    }
}

/// One rank of a [`ThreadGroup`].
pub struct ThreadRank {
    rank: usize,
    shared: Arc<Rendezvous>,
}

struct Rendezvous {
    size: usize,
    round: Mutex<Round>,
    cv: Condvar,
}

#[derive(Default)]
struct Round {
    /// Bumped each time a round's result becomes available.
    generation: u64,
    /// Ranks that have contributed to the round being filled.
    arrived: usize,
    /// Ranks that have picked up the published result.
    departed: usize,
    /// Set while a published result is still being read.
    draining: bool,
    op: Option<ReduceOp>,
    acc: Vec<f64>,
    result: Arc<Vec<f64>>,
    mismatch: Option<Mismatch>,
}

#[derive(Clone, Copy)]
enum Mismatch {
    Length { rank: usize, expected: usize, got: usize },
    Op { rank: usize, expected: ReduceOp, got: ReduceOp },
}

impl From<Mismatch> for CommError {
    fn from(m: Mismatch) -> Self {
        match m {
            Mismatch::Length { rank, expected, got } => {
                CommError::LengthMismatch { rank, expected, got }
            }
            Mismatch::Op { rank, expected, got } => CommError::Protocol {
                rank,
                detail: format!("expected {:?} reduction, got {:?}", expected, got),
            },
        }
    }
}

impl ThreadRank {
    /// Contributes `values` to the current round and returns the combined
    /// buffer once every rank has contributed.
    fn exchange(&self, values: &[f64], op: ReduceOp) -> Result<Arc<Vec<f64>>, CommError> {
        let sh = &*self.shared;
        let mut round = sh.round.lock();

        // A previous round's result may still be in flight to slower readers.
        while round.draining {
            sh.cv.wait(&mut round);
        }

        if round.arrived == 0 {
            round.op = Some(op);
            round.acc = values.to_vec();
            round.mismatch = None;
        } else if round.acc.len() != values.len() {
            let expected = round.acc.len();
            round.mismatch.get_or_insert(Mismatch::Length {
                rank: self.rank,
                expected,
                got: values.len(),
            });
        } else if let Some(first) = round.op.filter(|&first| first != op) {
            round.mismatch.get_or_insert(Mismatch::Op {
                rank: self.rank,
                expected: first,
                got: op,
            });
        } else {
            op.fold_into(&mut round.acc, values);
        }
        round.arrived += 1;

        let my_generation = round.generation;
        if round.arrived == sh.size {
            let acc = std::mem::take(&mut round.acc);
            round.result = Arc::new(acc);
            round.generation += 1;
            round.draining = true;
            sh.cv.notify_all();
        } else {
            while round.generation == my_generation {
                sh.cv.wait(&mut round);
            }
        }

        let result = round.result.clone();
        let mismatch = round.mismatch;
        round.departed += 1;
        if round.departed == sh.size {
            round.arrived = 0;
            round.departed = 0;
            round.draining = false;
            round.op = None;
            round.result = Arc::new(Vec::new());
            sh.cv.notify_all();
        }
        drop(round);

        match mismatch {
            Some(m) => Err(m.into()),
            None => Ok(result),
        }
    }
}

impl ProcessGroup for ThreadRank {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn all_reduce(&self, values: &[f64], op: ReduceOp) -> Result<Vec<f64>, CommError> {
        let combined = self.exchange(values, op)?;
        Ok(combined.as_ref().clone())
    }

    fn reduce(
        &self,
        values: &[f64],
        op: ReduceOp,
        root: usize,
    ) -> Result<Option<Vec<f64>>, CommError> {
        if root >= self.shared.size {
            return Err(CommError::InvalidRank {
                rank: root,
                size: self.shared.size,
            });
        }
        let combined = self.exchange(values, op)?;
        Ok((self.rank == root).then(|| combined.as_ref().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn all_reduce_reaches_every_rank() {
        let ranks = ThreadGroup::new(4);
        let results: Vec<Vec<f64>> = thread::scope(|s| {
            let handles: Vec<_> = ranks
                .iter()
                .map(|r| {
                    s.spawn(move || {
                        let v = r.rank() as f64;
                        r.all_reduce(&[v, -v], ReduceOp::Max).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for r in results {
            assert_eq!(r, vec![3.0, 0.0]);
        }
    }

    #[test]
    fn reduce_only_delivers_to_root() {
        let ranks = ThreadGroup::new(3);
        let results: Vec<Option<Vec<f64>>> = thread::scope(|s| {
            let handles: Vec<_> = ranks
                .iter()
                .map(|r| s.spawn(move || r.reduce(&[r.rank() as f64], ReduceOp::Min, 0).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results[0], Some(vec![0.0]));
        assert!(results[1].is_none());
        assert!(results[2].is_none());
    }

    #[test]
    fn back_to_back_rounds_do_not_mix() {
        let ranks = ThreadGroup::new(3);
        thread::scope(|s| {
            for r in &ranks {
                s.spawn(move || {
                    for round in 0..50 {
                        let v = (round * 10 + r.rank()) as f64;
                        let got = r.all_reduce(&[v], ReduceOp::Max).unwrap();
                        assert_eq!(got, vec![(round * 10 + 2) as f64]);
                    }
                });
            }
        });
    }

    #[test]
    fn length_mismatch_is_reported() {
        let ranks = ThreadGroup::new(2);
        let errs: Vec<bool> = thread::scope(|s| {
            let handles: Vec<_> = ranks
                .iter()
                .map(|r| {
                    s.spawn(move || {
                        let buf = vec![0.0; 2 + r.rank()];
                        r.all_reduce(&buf, ReduceOp::Max).is_err()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(errs, vec![true, true]);
    }

    #[test]
    fn single_rank_group_is_identity() {
        let ranks = ThreadGroup::new(1);
        let out = ranks[0].reduce(&[1.0, 2.0], ReduceOp::Max, 0).unwrap();
        assert_eq!(out, Some(vec![1.0, 2.0]));
    }
}
