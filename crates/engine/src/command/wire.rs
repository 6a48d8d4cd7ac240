//! Newline-delimited JSON messages exchanged between an authority and its replicas.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Intent, IntentOutcome};

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(pub u32);

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "replica-{}", self.0)
    }
}

/// Which replica submission an echoed intent answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub replica: ReplicaId,
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicaMessage {
    Submit { sequence: u64, intent: Intent },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorityMessage {
    /// First message on every connection.
    Welcome {
        protocol: u32,
        replica: ReplicaId,
        tick: u64,
    },
    /// An intent the authority applied, with ids resolved. `origin` is `None`
    /// for intents submitted by the authority's own process.
    Applied {
        origin: Option<Origin>,
        tick: u64,
        intent: Intent,
        outcome: IntentOutcome,
    },
    TickCompleted {
        tick: u64,
    },
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode line {line:?}: {source}")]
    Decode {
        line: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Encodes one message as a single JSON line, trailing newline included.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, WireError> {
    let mut line = serde_json::to_string(message).map_err(WireError::Encode)?;
    line.push('\n');
    Ok(line)
}

pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, WireError> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    serde_json::from_str(trimmed).map_err(|source| WireError::Decode {
        line: trimmed.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::EntityId;

    #[test]
    fn encoded_messages_are_single_lines() {
        let message = AuthorityMessage::Applied {
            origin: Some(Origin {
                replica: ReplicaId(2),
                sequence: 7,
            }),
            tick: 4,
            intent: Intent::UnregisterEntity {
                entity: EntityId(3),
                show_death_animation: true,
            },
            outcome: IntentOutcome::UnregisterScheduled {
                entity: EntityId(3),
            },
        };
        let line = encode_line(&message).expect("encode");
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        let decoded: AuthorityMessage = decode_line(&line).expect("decode");
        assert_eq!(decoded, message);
    }

    #[test]
    fn decode_errors_keep_the_offending_line() {
        let err = decode_line::<ReplicaMessage>("{\"Submit\":{}}\n").expect_err("missing fields");
        match err {
            WireError::Decode { line, .. } => assert_eq!(line, "{\"Submit\":{}}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
