//! In-process transport. Messages still travel as encoded JSON lines so the
//! loopback exercises the same codec as a socket.

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use tracing::warn;

use super::remote::{LinkError, ReplicaHub, ReplicaLink};
use super::wire::{
    decode_line, encode_line, AuthorityMessage, ReplicaId, ReplicaMessage, PROTOCOL_VERSION,
};

struct LoopbackPeer {
    replica: ReplicaId,
    outbound: Sender<String>,
    welcomed: bool,
}

pub struct LoopbackHub {
    inbound_tx: Sender<(ReplicaId, String)>,
    inbound_rx: Receiver<(ReplicaId, String)>,
    peers: Vec<LoopbackPeer>,
    next_replica: u32,
}

pub struct LoopbackLink {
    replica: ReplicaId,
    outbound: Sender<(ReplicaId, String)>,
    inbound: Receiver<String>,
}

impl Default for LoopbackHub {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackHub {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = unbounded();
        Self {
            inbound_tx,
            inbound_rx,
            peers: Vec::new(),
            next_replica: 1,
        }
    }

    /// Opens a new replica connection. The replica is greeted on the next `admit`.
    pub fn connect(&mut self) -> LoopbackLink {
        let replica = ReplicaId(self.next_replica);
        self.next_replica += 1;
        let (outbound, inbound) = unbounded();
        self.peers.push(LoopbackPeer {
            replica,
            outbound,
            welcomed: false,
        });
        LoopbackLink {
            replica,
            outbound: self.inbound_tx.clone(),
            inbound,
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

impl ReplicaHub for LoopbackHub {
    fn admit(&mut self, tick: u64) -> Result<Vec<ReplicaId>, LinkError> {
        let mut admitted = Vec::new();
        for peer in self.peers.iter_mut().filter(|peer| !peer.welcomed) {
            let line = encode_line(&AuthorityMessage::Welcome {
                protocol: PROTOCOL_VERSION,
                replica: peer.replica,
                tick,
            })?;
            peer.welcomed = peer.outbound.send(line).is_ok();
            if peer.welcomed {
                admitted.push(peer.replica);
            }
        }
        Ok(admitted)
    }

    fn poll_submissions(&mut self) -> Result<Vec<(ReplicaId, ReplicaMessage)>, LinkError> {
        let mut submissions = Vec::new();
        for (replica, line) in self.inbound_rx.try_iter() {
            submissions.push((replica, decode_line(&line)?));
        }
        Ok(submissions)
    }

    fn broadcast(&mut self, message: &AuthorityMessage) -> Result<(), LinkError> {
        let line = encode_line(message)?;
        self.peers.retain(|peer| {
            if !peer.welcomed {
                return true;
            }
            let delivered = peer.outbound.send(line.clone()).is_ok();
            if !delivered {
                warn!(replica = %peer.replica, "loopback_replica_dropped");
            }
            delivered
        });
        Ok(())
    }
}

impl LoopbackLink {
    pub fn replica(&self) -> ReplicaId {
        self.replica
    }
}

impl ReplicaLink for LoopbackLink {
    fn send(&mut self, message: &ReplicaMessage) -> Result<(), LinkError> {
        let line = encode_line(message)?;
        self.outbound
            .send((self.replica, line))
            .map_err(|_| LinkError::Disconnected)
    }

    fn poll(&mut self) -> Result<Vec<AuthorityMessage>, LinkError> {
        let mut messages = Vec::new();
        loop {
            match self.inbound.try_recv() {
                Ok(line) => messages.push(decode_line(&line)?),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if messages.is_empty() {
                        return Err(LinkError::Disconnected);
                    }
                    break;
                }
            }
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Intent;
    use crate::world::EntityId;

    #[test]
    fn replicas_are_welcomed_once_and_then_receive_broadcasts() {
        let mut hub = LoopbackHub::new();
        let mut link = hub.connect();
        assert_eq!(hub.admit(0).expect("admit"), vec![ReplicaId(1)]);
        assert!(hub.admit(0).expect("admit again").is_empty());
        hub.broadcast(&AuthorityMessage::TickCompleted { tick: 1 })
            .expect("broadcast");

        let received = link.poll().expect("poll");
        assert_eq!(received.len(), 2);
        assert!(matches!(
            received[0],
            AuthorityMessage::Welcome {
                replica: ReplicaId(1),
                tick: 0,
                ..
            }
        ));
        assert_eq!(received[1], AuthorityMessage::TickCompleted { tick: 1 });
    }

    #[test]
    fn submissions_arrive_tagged_with_their_replica() {
        let mut hub = LoopbackHub::new();
        let _first = hub.connect();
        let mut second = hub.connect();
        let message = ReplicaMessage::Submit {
            sequence: 1,
            intent: Intent::UnregisterEntity {
                entity: EntityId(9),
                show_death_animation: false,
            },
        };
        second.send(&message).expect("send");
        let submissions = hub.poll_submissions().expect("poll");
        assert_eq!(submissions, vec![(ReplicaId(2), message)]);
    }

    #[test]
    fn dropped_replicas_are_pruned_on_broadcast() {
        let mut hub = LoopbackHub::new();
        let link = hub.connect();
        hub.admit(0).expect("admit");
        drop(link);
        hub.broadcast(&AuthorityMessage::TickCompleted { tick: 1 })
            .expect("broadcast");
        assert_eq!(hub.peer_count(), 0);
    }
}
