//! In-process communicator over channels

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::{Communicator, Message, COORDINATOR};
use crate::error::{SolverError, SolverResult};

/// `senders[src][dst]` and `receivers[dst][src]` of a fully connected mesh
type Mesh<T> = (Vec<Vec<Sender<T>>>, Vec<Vec<Receiver<T>>>);

fn mesh<T>(size: usize) -> Mesh<T> {
    let mut senders = Vec::with_capacity(size);
    let mut receivers: Vec<Vec<Receiver<T>>> = (0..size).map(|_| Vec::new()).collect();
    for _src in 0..size {
        let mut row = Vec::with_capacity(size);
        for inbox in receivers.iter_mut() {
            let (tx, rx) = unbounded();
            row.push(tx);
            inbox.push(rx);
        }
        senders.push(row);
    }
    (senders, receivers)
}

/// One participant of a thread-backed process group
///
/// Every ordered pair of ranks has its own FIFO channel, so messages between
/// two participants arrive in the order they were sent. Barriers run over a
/// second set of channels through the coordinator: a participant that drops
/// its communicator (returns early or panics) disconnects them, and every
/// peer waiting on it gets a [`SolverError::Communication`] instead of
/// blocking forever.
#[derive(Debug)]
pub struct LocalCommunicator {
    rank: usize,

    /// `outbox[dest]`: channel rank → dest
    outbox: Vec<Sender<Message>>,

    /// `inbox[source]`: channel source → rank
    inbox: Vec<Receiver<Message>>,

    /// Barrier tokens, same layout as `outbox` and `inbox`
    token_out: Vec<Sender<()>>,
    token_in: Vec<Receiver<()>>,
}

impl LocalCommunicator {
    /// Create a fully connected group of `size` participants, one per rank
    pub fn group(size: usize) -> SolverResult<Vec<Self>> {
        if size == 0 {
            return Err(SolverError::InvalidConfiguration(
                "a process group needs at least one participant".to_string(),
            ));
        }

        let (senders, receivers) = mesh::<Message>(size);
        let (tokens_out, tokens_in) = mesh::<()>(size);

        let group = senders
            .into_iter()
            .zip(receivers)
            .zip(tokens_out.into_iter().zip(tokens_in))
            .enumerate()
            .map(|(rank, ((outbox, inbox), (token_out, token_in)))| Self {
                rank,
                outbox,
                inbox,
                token_out,
                token_in,
            })
            .collect();

        Ok(group)
    }

    fn check_peer(&self, peer: usize) -> SolverResult<()> {
        if peer >= self.size() || peer == self.rank {
            return Err(SolverError::Communication {
                rank: self.rank,
                reason: format!("invalid peer {peer} in a group of {}", self.size()),
            });
        }
        Ok(())
    }

    fn departed(&self, peer: usize) -> SolverError {
        SolverError::Communication {
            rank: self.rank,
            reason: format!("rank {peer} has left the group"),
        }
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.outbox.len()
    }

    fn send(&self, dest: usize, message: Message) -> SolverResult<()> {
        self.check_peer(dest)?;
        self.outbox[dest].send(message).map_err(|_| self.departed(dest))
    }

    fn recv(&self, source: usize) -> SolverResult<Message> {
        self.check_peer(source)?;
        self.inbox[source].recv().map_err(|_| self.departed(source))
    }

    /// Gather an arrival token at the coordinator, then release everyone
    fn barrier(&self) -> SolverResult<()> {
        let peers = (0..self.size()).filter(|&r| r != COORDINATOR);

        if self.rank == COORDINATOR {
            for peer in peers.clone() {
                self.token_in[peer].recv().map_err(|_| self.departed(peer))?;
            }
            for peer in peers {
                self.token_out[peer].send(()).map_err(|_| self.departed(peer))?;
            }
        } else {
            self.token_out[COORDINATOR].send(()).map_err(|_| self.departed(COORDINATOR))?;
            self.token_in[COORDINATOR].recv().map_err(|_| self.departed(COORDINATOR))?;
        }
        Ok(())
    }
}
