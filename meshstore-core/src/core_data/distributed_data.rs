/*
    DistributedData - payload capability trait and the trust-tier wrapper

    A payload is opaque to the store. It only has to expose a canonical
    serialization (hashed into the MapKey and signed by privileged roles), a
    self-check, an optional author-binding rule, and its MetaData.

    The tier a payload lives in is a tagged union rather than a wrapper chain:
    - Authenticated: any keypair may publish
    - Authorized:    additionally signed by one of a set of privileged keys
    - Mailbox:       addressed to one recipient, never gossiped through inventories

    The MapKey hashes the tier data along with the payload (receiver key for
    mailbox data; co-signer key, co-signature and static flag for authorized
    data). The author signs the MapKey, so none of it can be rewritten in transit.
*/

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::core_identity::{Keypair, PublicKey, Signature};

use super::map_key::MapKey;
use super::meta_data::MetaData;

/// Prefix of the bytes a privileged key signs for authorized payloads
pub const AUTHORIZED_DATA_DOMAIN: &[u8] = b"AUTHORIZED_DATA";

const TIER_AUTHENTICATED: u8 = 0;
const TIER_AUTHORIZED: u8 = 1;
const TIER_MAILBOX: u8 = 2;

/// Capability trait implemented by every storable payload
pub trait DistributedData: Send + Sync + fmt::Debug + 'static {
    /// Canonical serialization, hashed for the MapKey and signed
    fn serialize(&self) -> Vec<u8>;

    /// Internal consistency check
    fn verify(&self) -> Result<(), String>;

    /// Payload-specific extra rule, e.g. binding the payload to its author
    fn is_data_invalid(&self, _author_pub_key_hash: &[u8; 32]) -> bool {
        false
    }

    /// Relative bandwidth/processing weight
    fn cost_factor(&self) -> f64 {
        1.0
    }

    fn meta_data(&self) -> &MetaData;

    /// Tier this payload type must be published in
    fn required_tier(&self) -> DataTier {
        DataTier::Authenticated
    }

    fn as_any(&self) -> &dyn Any;
}

pub type DataRef = Arc<dyn DistributedData>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataTier {
    Authenticated,
    Authorized,
    Mailbox,
}

impl fmt::Display for DataTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataTier::Authenticated => write!(f, "authenticated"),
            DataTier::Authorized => write!(f, "authorized"),
            DataTier::Mailbox => write!(f, "mailbox"),
        }
    }
}

/// Payload co-signed by a privileged key
#[derive(Debug, Clone)]
pub struct AuthorizedData {
    pub data: DataRef,
    pub authorized_public_key: PublicKey,
    pub authorized_signature: Signature,
    /// Checked against the well-known static keys instead of the dynamic set
    pub static_public_keys_provided: bool,
}

impl AuthorizedData {
    /// Sign `data` with a privileged keypair
    pub fn sign(data: DataRef, privileged: &Keypair, static_public_keys_provided: bool) -> Self {
        let authorized_signature = privileged.sign(&authorized_signing_bytes(data.as_ref()));
        AuthorizedData {
            data,
            authorized_public_key: privileged.public_key(),
            authorized_signature,
            static_public_keys_provided,
        }
    }

    pub fn verify_authorized_signature(&self) -> bool {
        self.authorized_public_key
            .verify(&authorized_signing_bytes(self.data.as_ref()), &self.authorized_signature)
    }
}

/// Payload addressed to a single recipient
#[derive(Debug, Clone)]
pub struct MailboxData {
    pub data: DataRef,
    pub receiver_public_key: PublicKey,
}

/// A payload together with its trust tier
#[derive(Debug, Clone)]
pub enum ProtectedData {
    Authenticated(DataRef),
    Authorized(AuthorizedData),
    Mailbox(MailboxData),
}

impl ProtectedData {
    pub fn authenticated(data: DataRef) -> Self {
        ProtectedData::Authenticated(data)
    }

    pub fn authorized(data: DataRef, privileged: &Keypair, static_public_keys_provided: bool) -> Self {
        ProtectedData::Authorized(AuthorizedData::sign(data, privileged, static_public_keys_provided))
    }

    pub fn mailbox(data: DataRef, receiver_public_key: PublicKey) -> Self {
        ProtectedData::Mailbox(MailboxData { data, receiver_public_key })
    }

    pub fn data(&self) -> &DataRef {
        match self {
            ProtectedData::Authenticated(data) => data,
            ProtectedData::Authorized(authorized) => &authorized.data,
            ProtectedData::Mailbox(mailbox) => &mailbox.data,
        }
    }

    pub fn tier(&self) -> DataTier {
        match self {
            ProtectedData::Authenticated(_) => DataTier::Authenticated,
            ProtectedData::Authorized(_) => DataTier::Authorized,
            ProtectedData::Mailbox(_) => DataTier::Mailbox,
        }
    }

    /// Bytes hashed into the MapKey: tier tag, payload and the tier data
    pub fn serialize_for_hash(&self) -> Vec<u8> {
        let payload = self.data().serialize();
        let mut bytes = Vec::with_capacity(payload.len() + 32 + 65);
        match self {
            ProtectedData::Authenticated(_) => {
                bytes.push(TIER_AUTHENTICATED);
                bytes.extend_from_slice(&payload);
            }
            ProtectedData::Authorized(authorized) => {
                bytes.push(TIER_AUTHORIZED);
                bytes.extend_from_slice(&payload);
                bytes.extend_from_slice(authorized.authorized_public_key.as_bytes());
                bytes.extend_from_slice(authorized.authorized_signature.as_bytes());
                bytes.push(authorized.static_public_keys_provided as u8);
            }
            ProtectedData::Mailbox(mailbox) => {
                bytes.push(TIER_MAILBOX);
                bytes.extend_from_slice(&payload);
                bytes.extend_from_slice(mailbox.receiver_public_key.as_bytes());
            }
        }
        bytes
    }

    pub fn map_key(&self) -> MapKey {
        MapKey::hash(&self.serialize_for_hash())
    }

    pub fn type_name(&self) -> &str {
        &self.data().meta_data().type_name
    }

    pub fn receiver(&self) -> Option<&PublicKey> {
        match self {
            ProtectedData::Mailbox(mailbox) => Some(&mailbox.receiver_public_key),
            _ => None,
        }
    }
}

/// Bytes a privileged key signs for an authorized payload
pub fn authorized_signing_bytes(data: &dyn DistributedData) -> Vec<u8> {
    let payload = data.serialize();
    let mut bytes = Vec::with_capacity(AUTHORIZED_DATA_DOMAIN.len() + payload.len());
    bytes.extend_from_slice(AUTHORIZED_DATA_DOMAIN);
    bytes.extend_from_slice(&payload);
    bytes
}
