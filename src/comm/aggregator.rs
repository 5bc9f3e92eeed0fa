//! Distributed convergence reduction
//!
//! Every participant computes, over its own interior cells, a residual
//! 1-norm and a count of cells above tolerance. The aggregator turns these
//! into identical global values on every participant:
//!
//! ```text
//!   barrier
//!   gather   ranks 1..N send (norm, count) to the coordinator,
//!            which accumulates them in rank order
//!   barrier
//!   bcast    global norm
//!   barrier
//!   bcast    global count
//!   barrier
//! ```
//!
//! The sequence runs once per outer Newton iteration, so a linear gather is
//! adequate. Any failure along the way is returned as
//! [`SolverError::Communication`] and must abort the run.

use super::{Communicator, Message, COORDINATOR};
use crate::error::{SolverError, SolverResult};

/// Convergence summary of one participant's partition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalConvergence {
    pub residual_norm: f64,
    pub unconverged: usize,
}

/// Convergence summary of the whole grid, identical on every participant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalConvergence {
    pub residual_norm: f64,
    pub unconverged: usize,
}

impl GlobalConvergence {
    pub fn converged(&self) -> bool {
        self.unconverged == 0
    }
}

/// Reduces local convergence summaries across a process group
pub struct ConvergenceAggregator {
    comm: Box<dyn Communicator>,
}

impl std::fmt::Debug for ConvergenceAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvergenceAggregator")
            .field("rank", &self.comm.rank())
            .field("size", &self.comm.size())
            .finish()
    }
}

impl ConvergenceAggregator {
    pub fn new(comm: Box<dyn Communicator>) -> Self {
        Self { comm }
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    pub fn is_coordinator(&self) -> bool {
        self.comm.is_coordinator()
    }

    fn unexpected(&self, what: &str, found: Message) -> SolverError {
        SolverError::Communication {
            rank: self.comm.rank(),
            reason: format!("expected {what}, received {found:?}"),
        }
    }

    fn expect_norm(&self, message: Message) -> SolverResult<f64> {
        match message {
            Message::Norm(norm) => Ok(norm),
            other => Err(self.unexpected("a residual norm", other)),
        }
    }

    fn expect_count(&self, message: Message) -> SolverResult<usize> {
        match message {
            Message::Count(count) => Ok(count),
            other => Err(self.unexpected("a cell count", other)),
        }
    }

    /// Sum norms and counts over the group; every participant must call this
    pub fn reduce(&self, local: LocalConvergence) -> SolverResult<GlobalConvergence> {
        let comm = self.comm.as_ref();

        comm.barrier()?;

        let mut total = GlobalConvergence {
            residual_norm: local.residual_norm,
            unconverged: local.unconverged,
        };
        if comm.rank() == COORDINATOR {
            for source in (0..comm.size()).filter(|&r| r != COORDINATOR) {
                total.residual_norm += self.expect_norm(comm.recv(source)?)?;
                total.unconverged += self.expect_count(comm.recv(source)?)?;
            }
        } else {
            comm.send(COORDINATOR, Message::Norm(local.residual_norm))?;
            comm.send(COORDINATOR, Message::Count(local.unconverged))?;
        }

        comm.barrier()?;
        let is_root = comm.rank() == COORDINATOR;
        let norm = comm.broadcast(COORDINATOR, is_root.then_some(Message::Norm(total.residual_norm)))?;
        total.residual_norm = self.expect_norm(norm)?;

        comm.barrier()?;
        let count = comm.broadcast(COORDINATOR, is_root.then_some(Message::Count(total.unconverged)))?;
        total.unconverged = self.expect_count(count)?;

        comm.barrier()?;
        Ok(total)
    }
}
