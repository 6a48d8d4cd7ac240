mod funnel;
mod intent;
mod local;
mod loopback;
pub mod mutation;
mod remote;
pub mod wire;

pub use funnel::{CommandFunnel, Submission};
pub use intent::{Intent, IntentOutcome, RejectReason};
pub use local::LocalAuthority;
pub use loopback::{LoopbackHub, LoopbackLink};
pub use remote::{
    AuthorityServer, LinkError, RemoteReplica, ReplicaHub, ReplicaLink, ReplicaPump,
};
pub use wire::{AuthorityMessage, Origin, ReplicaId, ReplicaMessage, WireError};
