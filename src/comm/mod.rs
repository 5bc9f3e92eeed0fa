//! Process-group communication
//!
//! The Newton corrector runs in lockstep on every participant of a process
//! group, each owning one grid partition. The only data it exchanges is the
//! pair of convergence scalars reduced once per outer iteration
//! ([`aggregator`]).
//!
//! [`Communicator`] is the point-to-point + barrier surface the aggregator
//! needs. Two implementations ship with the crate:
//!
//! - [`SingleProcess`]: a group of one (serial runs)
//! - [`LocalCommunicator`]: N participants on threads of one process, wired
//!   with `crossbeam-channel`
//!
//! A message-passing runtime plugs in by implementing the trait.

pub mod aggregator;
mod local;

pub use aggregator::{ConvergenceAggregator, GlobalConvergence, LocalConvergence};
pub use local::LocalCommunicator;

use crate::error::{SolverError, SolverResult};

/// Rank of the coordinator of every collective
pub const COORDINATOR: usize = 0;

/// Payload of a point-to-point message
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Message {
    Norm(f64),
    Count(usize),
}

/// Point-to-point messaging and barriers within a fixed process group
///
/// All calls block. Any `Err` is a communication failure and is fatal for
/// the whole run.
pub trait Communicator: Send {
    fn rank(&self) -> usize;

    /// Number of participants
    fn size(&self) -> usize;

    fn send(&self, dest: usize, message: Message) -> SolverResult<()>;

    fn recv(&self, source: usize) -> SolverResult<Message>;

    /// Block until every participant has reached the barrier
    fn barrier(&self) -> SolverResult<()>;

    /// Distribute `message` from `root` to everyone
    ///
    /// `root` must pass `Some`; other ranks pass `None` and receive the
    /// root's value.
    fn broadcast(&self, root: usize, message: Option<Message>) -> SolverResult<Message> {
        if self.rank() == root {
            let message = message.ok_or_else(|| SolverError::Communication {
                rank: root,
                reason: "broadcast root has nothing to send".to_string(),
            })?;
            for dest in (0..self.size()).filter(|&dest| dest != root) {
                self.send(dest, message)?;
            }
            Ok(message)
        } else {
            self.recv(root)
        }
    }

    fn is_coordinator(&self) -> bool {
        self.rank() == COORDINATOR
    }
}

/// A process group of one
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl Communicator for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&self, dest: usize, _message: Message) -> SolverResult<()> {
        Err(SolverError::Communication {
            rank: 0,
            reason: format!("no peer {dest} in a single-process group"),
        })
    }

    fn recv(&self, source: usize) -> SolverResult<Message> {
        Err(SolverError::Communication {
            rank: 0,
            reason: format!("no peer {source} in a single-process group"),
        })
    }

    fn barrier(&self) -> SolverResult<()> {
        Ok(())
    }
}
