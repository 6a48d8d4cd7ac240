//! Remote authority: one process applies intents, every replica follows its echoes.

use std::collections::BTreeSet;
use std::io;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::wire::{AuthorityMessage, Origin, ReplicaId, ReplicaMessage, WireError, PROTOCOL_VERSION};
use super::{CommandFunnel, Intent, IntentOutcome, LocalAuthority, Submission};
use crate::sim::{SimError, Simulation, TickReport};

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("peer disconnected")]
    Disconnected,
    #[error("protocol version {found} is not supported (expected {expected})")]
    ProtocolMismatch { expected: u32, found: u32 },
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("link i/o failed: {0}")]
    Io(#[from] io::Error),
}

/// Authority-side transport to every connected replica.
pub trait ReplicaHub {
    /// Greets replicas that connected since the last call and returns their ids.
    fn admit(&mut self, tick: u64) -> Result<Vec<ReplicaId>, LinkError>;
    /// Replica messages received since the last poll, in arrival order.
    fn poll_submissions(&mut self) -> Result<Vec<(ReplicaId, ReplicaMessage)>, LinkError>;
    /// Sends to every replica. Replicas that went away are dropped, not reported.
    fn broadcast(&mut self, message: &AuthorityMessage) -> Result<(), LinkError>;
}

/// Replica-side transport to the authority.
pub trait ReplicaLink {
    fn send(&mut self, message: &ReplicaMessage) -> Result<(), LinkError>;
    fn poll(&mut self) -> Result<Vec<AuthorityMessage>, LinkError>;
}

/// The authoritative process. Wraps a local authority and echoes every
/// applied intent, and every completed tick, to all replicas.
pub struct AuthorityServer<H: ReplicaHub> {
    authority: LocalAuthority,
    hub: H,
}

impl<H: ReplicaHub> AuthorityServer<H> {
    pub fn new(authority: LocalAuthority, hub: H) -> Self {
        Self { authority, hub }
    }

    pub fn authority(&self) -> &LocalAuthority {
        &self.authority
    }

    pub fn authority_mut(&mut self) -> &mut LocalAuthority {
        &mut self.authority
    }

    pub fn hub_mut(&mut self) -> &mut H {
        &mut self.hub
    }

    pub fn into_parts(self) -> (LocalAuthority, H) {
        (self.authority, self.hub)
    }

    /// Admits new replicas and applies every pending submission. Returns the
    /// number of submissions applied.
    pub fn pump(&mut self) -> Result<usize, SimError> {
        let tick = self.authority.simulation().current_tick();
        for replica in self.hub.admit(tick)? {
            info!(%replica, tick, "replica_admitted");
        }

        let submissions = self.hub.poll_submissions()?;
        let count = submissions.len();
        for (replica, message) in submissions {
            match message {
                ReplicaMessage::Submit { sequence, intent } => {
                    self.apply_and_echo(Some(Origin { replica, sequence }), intent)?;
                }
            }
        }
        Ok(count)
    }

    pub fn tick(&mut self) -> Result<TickReport, SimError> {
        let report = self.authority.tick()?;
        self.hub
            .broadcast(&AuthorityMessage::TickCompleted { tick: report.tick })?;
        Ok(report)
    }

    fn apply_and_echo(
        &mut self,
        origin: Option<Origin>,
        intent: Intent,
    ) -> Result<IntentOutcome, SimError> {
        let tick = self.authority.simulation().current_tick();
        let (intent, outcome) = self.authority.apply(intent)?;
        self.hub.broadcast(&AuthorityMessage::Applied {
            origin,
            tick,
            intent,
            outcome,
        })?;
        Ok(outcome)
    }
}

impl<H: ReplicaHub> CommandFunnel for AuthorityServer<H> {
    fn submit(&mut self, intent: Intent) -> Result<Submission, SimError> {
        let outcome = self.apply_and_echo(None, intent)?;
        Ok(Submission::Applied(outcome))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicaPump {
    pub applied: usize,
    pub ticks: usize,
}

/// A non-authoritative copy of the simulation. Submissions are forwarded and
/// only take effect when the authority echoes them back; ticks run only when
/// the authority reports them complete.
pub struct RemoteReplica<L: ReplicaLink> {
    sim: Simulation,
    link: L,
    replica: Option<ReplicaId>,
    next_sequence: u64,
    in_flight: BTreeSet<u64>,
    acknowledged: Vec<(u64, IntentOutcome)>,
    outcome_mismatches: u64,
}

impl<L: ReplicaLink> RemoteReplica<L> {
    /// `sim` must be built from the same config, terrain and catalog as the
    /// authority's and must not have been mutated.
    pub fn new(sim: Simulation, link: L) -> Self {
        Self {
            sim,
            link,
            replica: None,
            next_sequence: 1,
            in_flight: BTreeSet::new(),
            acknowledged: Vec::new(),
            outcome_mismatches: 0,
        }
    }

    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    pub fn simulation_mut(&mut self) -> &mut Simulation {
        &mut self.sim
    }

    pub fn replica_id(&self) -> Option<ReplicaId> {
        self.replica
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn outcome_mismatches(&self) -> u64 {
        self.outcome_mismatches
    }

    /// Outcomes of this replica's own submissions, by sequence, in echo order.
    pub fn take_acknowledgements(&mut self) -> Vec<(u64, IntentOutcome)> {
        std::mem::take(&mut self.acknowledged)
    }

    /// Applies everything the authority has sent since the last pump.
    pub fn pump(&mut self) -> Result<ReplicaPump, SimError> {
        let mut pump = ReplicaPump::default();
        for message in self.link.poll()? {
            self.handle(message, &mut pump)?;
        }
        Ok(pump)
    }

    fn handle(&mut self, message: AuthorityMessage, pump: &mut ReplicaPump) -> Result<(), SimError> {
        let current = self.sim.current_tick();
        match message {
            AuthorityMessage::Welcome {
                protocol,
                replica,
                tick,
            } => {
                if protocol != PROTOCOL_VERSION {
                    return Err(LinkError::ProtocolMismatch {
                        expected: PROTOCOL_VERSION,
                        found: protocol,
                    }
                    .into());
                }
                if tick != current {
                    return Err(SimError::TickDesync {
                        authority: tick,
                        replica: current,
                    });
                }
                info!(%replica, tick, "replica_welcomed");
                self.replica = Some(replica);
            }
            AuthorityMessage::Applied {
                origin,
                tick,
                intent,
                outcome,
            } => {
                if tick != current {
                    return Err(SimError::TickDesync {
                        authority: tick,
                        replica: current,
                    });
                }
                let local = self.sim.apply_intent(&intent)?;
                if local != outcome {
                    self.outcome_mismatches += 1;
                    warn!(
                        tick,
                        intent = intent.name(),
                        authority = ?outcome,
                        replica = ?local,
                        "replica_outcome_desync"
                    );
                }
                if let Some(origin) = origin.filter(|origin| Some(origin.replica) == self.replica) {
                    self.in_flight.remove(&origin.sequence);
                    self.acknowledged.push((origin.sequence, outcome));
                }
                pump.applied += 1;
            }
            AuthorityMessage::TickCompleted { tick } => {
                if tick != current + 1 {
                    return Err(SimError::TickDesync {
                        authority: tick,
                        replica: current,
                    });
                }
                self.sim.tick()?;
                pump.ticks += 1;
            }
        }
        Ok(())
    }
}

impl<L: ReplicaLink> CommandFunnel for RemoteReplica<L> {
    fn submit(&mut self, intent: Intent) -> Result<Submission, SimError> {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let name = intent.name();
        self.link.send(&ReplicaMessage::Submit { sequence, intent })?;
        self.in_flight.insert(sequence);
        debug!(sequence, intent = name, "intent_forwarded");
        Ok(Submission::Forwarded { sequence })
    }
}
