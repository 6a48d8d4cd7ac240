use sha2::{Digest, Sha256};

use super::ReplayError;
use crate::sim::NotificationEnvelope;

/// Running SHA-256 over a notification stream. Two runs that emit the same
/// notifications in the same order finish with the same hex digest.
#[derive(Debug, Clone, Default)]
pub struct NotificationDigest {
    hasher: Sha256,
    count: u64,
}

impl NotificationDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb(&mut self, envelopes: &[NotificationEnvelope]) -> Result<(), ReplayError> {
        for envelope in envelopes {
            let bytes = serde_json::to_vec(envelope).map_err(ReplayError::Encode)?;
            self.hasher.update(&bytes);
            self.hasher.update([0u8]);
            self.count += 1;
        }
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn finish(self) -> String {
        to_hex_lower(&self.hasher.finalize())
    }
}

fn to_hex_lower(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::Notification;
    use crate::world::EntityId;

    fn envelope(tick: u64, entity: u64) -> NotificationEnvelope {
        NotificationEnvelope {
            tick,
            notification: Notification::AbilitySetChanged {
                entity: EntityId(entity),
            },
        }
    }

    #[test]
    fn digest_is_order_sensitive() {
        let mut forward = NotificationDigest::new();
        forward
            .absorb(&[envelope(1, 1), envelope(1, 2)])
            .expect("absorb");
        let mut reversed = NotificationDigest::new();
        reversed
            .absorb(&[envelope(1, 2), envelope(1, 1)])
            .expect("absorb");
        assert_eq!(forward.count(), 2);
        assert_ne!(forward.finish(), reversed.finish());
    }

    #[test]
    fn chunking_does_not_change_the_digest() {
        let mut whole = NotificationDigest::new();
        whole
            .absorb(&[envelope(1, 1), envelope(2, 1)])
            .expect("absorb");
        let mut split = NotificationDigest::new();
        split.absorb(&[envelope(1, 1)]).expect("absorb");
        split.absorb(&[envelope(2, 1)]).expect("absorb");
        let digest = whole.finish();
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, split.finish());
    }
}
