/*
    Mailbox delivery confirmation

    The receiver of a mailbox entry proves delivery by signing
    `"MAILBOX_DELIVERED" || map key`. The store then deletes the entry outright,
    without leaving a tombstone.
*/

use crate::core_identity::{Keypair, PublicKey, Signature};

use super::map_key::MapKey;

pub const MAILBOX_DELIVERED_DOMAIN: &[u8] = b"MAILBOX_DELIVERED";

#[derive(Debug, Clone)]
pub struct MailboxDelivery {
    pub map_key: MapKey,
    pub receiver_public_key: PublicKey,
    pub signature: Signature,
}

impl MailboxDelivery {
    pub fn sign(map_key: MapKey, receiver: &Keypair) -> Self {
        MailboxDelivery {
            map_key,
            receiver_public_key: receiver.public_key(),
            signature: receiver.sign(&delivery_signing_bytes(&map_key)),
        }
    }

    pub fn verify(&self) -> bool {
        self.receiver_public_key.verify(&delivery_signing_bytes(&self.map_key), &self.signature)
    }
}

fn delivery_signing_bytes(map_key: &MapKey) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(MAILBOX_DELIVERED_DOMAIN.len() + 32);
    bytes.extend_from_slice(MAILBOX_DELIVERED_DOMAIN);
    bytes.extend_from_slice(map_key.as_bytes());
    bytes
}
