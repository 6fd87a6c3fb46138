/*
    PayloadCodec - wire format for entries and requests

    The domain model only knows `serialize()` for hashing and signing. Moving
    entries between nodes or to disk goes through bincode DTOs defined here.

    Payload bytes are the payload's canonical serialization; turning them back
    into a typed payload needs a decoder registered per type name. MetaData is
    never taken from the wire: the decoder receives the local registry's entry.
*/

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core_identity::{PublicKey, Signature};

use super::distributed_data::{AuthorizedData, DataRef, MailboxData, ProtectedData};
use super::entry::{MutationKind, VersionedEntry};
use super::errors::CodecError;
use super::map_key::MapKey;
use super::meta_data::{MetaData, MetaDataRegistry};
use super::request::{AddRequest, MutationRequest, RefreshRequest, RemoveRequest};

/// Rebuilds a typed payload from its canonical bytes
pub type PayloadDecoder = fn(&[u8], &MetaData) -> Result<DataRef, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireTier {
    Authenticated,
    Authorized {
        authorized_public_key: PublicKey,
        authorized_signature: Signature,
        static_public_keys_provided: bool,
    },
    Mailbox {
        receiver_public_key: PublicKey,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireData {
    pub type_name: String,
    pub tier: WireTier,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEntry {
    pub map_key: MapKey,
    pub kind: MutationKind,
    pub sequence_number: u32,
    pub created_at_millis: i64,
    pub author_public_key: PublicKey,
    pub signature: Signature,
    pub type_name: String,
    pub data: Option<WireData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireRequest {
    Add {
        data: WireData,
        sequence_number: u32,
        created_at_millis: i64,
        author_public_key: PublicKey,
        signature: Signature,
    },
    Refresh {
        map_key: MapKey,
        sequence_number: u32,
        created_at_millis: i64,
        author_public_key: PublicKey,
        signature: Signature,
    },
    Remove {
        map_key: MapKey,
        sequence_number: u32,
        created_at_millis: i64,
        author_public_key: PublicKey,
        signature: Signature,
    },
}

/// Converts domain objects to and from wire DTOs
pub struct PayloadCodec {
    registry: MetaDataRegistry,
    decoders: HashMap<String, PayloadDecoder>,
}

impl PayloadCodec {
    pub fn new(registry: MetaDataRegistry) -> Self {
        PayloadCodec { registry, decoders: HashMap::new() }
    }

    pub fn register_decoder(&mut self, type_name: impl Into<String>, decoder: PayloadDecoder) -> &mut Self {
        self.decoders.insert(type_name.into(), decoder);
        self
    }

    pub fn registry(&self) -> &MetaDataRegistry {
        &self.registry
    }

    pub fn encode_data(&self, data: &ProtectedData) -> WireData {
        let tier = match data {
            ProtectedData::Authenticated(_) => WireTier::Authenticated,
            ProtectedData::Authorized(authorized) => WireTier::Authorized {
                authorized_public_key: authorized.authorized_public_key,
                authorized_signature: authorized.authorized_signature.clone(),
                static_public_keys_provided: authorized.static_public_keys_provided,
            },
            ProtectedData::Mailbox(mailbox) => {
                WireTier::Mailbox { receiver_public_key: mailbox.receiver_public_key }
            }
        };

        WireData {
            type_name: data.type_name().to_string(),
            tier,
            payload: data.data().serialize(),
        }
    }

    pub fn decode_data(&self, wire: WireData) -> Result<ProtectedData, CodecError> {
        let meta = self
            .registry
            .get(&wire.type_name)
            .ok_or_else(|| CodecError::UnknownDataType(wire.type_name.clone()))?;
        let decoder = self
            .decoders
            .get(&wire.type_name)
            .ok_or_else(|| CodecError::UnknownDataType(wire.type_name.clone()))?;

        let data = decoder(&wire.payload, meta).map_err(|reason| CodecError::InvalidPayload {
            type_name: wire.type_name.clone(),
            reason,
        })?;

        Ok(match wire.tier {
            WireTier::Authenticated => ProtectedData::Authenticated(data),
            WireTier::Authorized {
                authorized_public_key,
                authorized_signature,
                static_public_keys_provided,
            } => ProtectedData::Authorized(AuthorizedData {
                data,
                authorized_public_key,
                authorized_signature,
                static_public_keys_provided,
            }),
            WireTier::Mailbox { receiver_public_key } => {
                ProtectedData::Mailbox(MailboxData { data, receiver_public_key })
            }
        })
    }

    pub fn encode_entry(&self, entry: &VersionedEntry) -> WireEntry {
        WireEntry {
            map_key: entry.map_key,
            kind: entry.kind,
            sequence_number: entry.sequence_number,
            created_at_millis: entry.created_at_millis,
            author_public_key: entry.author_public_key,
            signature: entry.signature.clone(),
            type_name: entry.meta_data.type_name.clone(),
            data: entry.data.as_ref().map(|data| self.encode_data(data)),
        }
    }

    pub fn decode_entry(&self, wire: WireEntry) -> Result<VersionedEntry, CodecError> {
        let meta_data = self
            .registry
            .get(&wire.type_name)
            .cloned()
            .ok_or_else(|| CodecError::UnknownDataType(wire.type_name.clone()))?;

        let data = match wire.data {
            Some(data) => {
                if data.type_name != wire.type_name {
                    return Err(CodecError::MalformedField { field: "data.type_name" });
                }
                Some(self.decode_data(data)?)
            }
            None => None,
        };

        Ok(VersionedEntry {
            map_key: wire.map_key,
            kind: wire.kind,
            sequence_number: wire.sequence_number,
            created_at_millis: wire.created_at_millis,
            author_public_key: wire.author_public_key,
            signature: wire.signature,
            meta_data,
            data,
        })
    }

    pub fn encode_request(&self, request: &MutationRequest) -> WireRequest {
        match request {
            MutationRequest::Add(req) => WireRequest::Add {
                data: self.encode_data(&req.data),
                sequence_number: req.sequence_number,
                created_at_millis: req.created_at_millis,
                author_public_key: req.author_public_key,
                signature: req.signature.clone(),
            },
            MutationRequest::Refresh(req) => WireRequest::Refresh {
                map_key: req.map_key,
                sequence_number: req.sequence_number,
                created_at_millis: req.created_at_millis,
                author_public_key: req.author_public_key,
                signature: req.signature.clone(),
            },
            MutationRequest::Remove(req) => WireRequest::Remove {
                map_key: req.map_key,
                sequence_number: req.sequence_number,
                created_at_millis: req.created_at_millis,
                author_public_key: req.author_public_key,
                signature: req.signature.clone(),
            },
        }
    }

    pub fn decode_request(&self, wire: WireRequest) -> Result<MutationRequest, CodecError> {
        Ok(match wire {
            WireRequest::Add { data, sequence_number, created_at_millis, author_public_key, signature } => {
                MutationRequest::Add(AddRequest {
                    data: self.decode_data(data)?,
                    sequence_number,
                    created_at_millis,
                    author_public_key,
                    signature,
                })
            }
            WireRequest::Refresh { map_key, sequence_number, created_at_millis, author_public_key, signature } => {
                MutationRequest::Refresh(RefreshRequest {
                    map_key,
                    sequence_number,
                    created_at_millis,
                    author_public_key,
                    signature,
                })
            }
            WireRequest::Remove { map_key, sequence_number, created_at_millis, author_public_key, signature } => {
                MutationRequest::Remove(RemoveRequest {
                    map_key,
                    sequence_number,
                    created_at_millis,
                    author_public_key,
                    signature,
                })
            }
        })
    }

    pub fn request_to_bytes(&self, request: &MutationRequest) -> Result<Vec<u8>, CodecError> {
        to_bytes(&self.encode_request(request))
    }

    pub fn request_from_bytes(&self, bytes: &[u8]) -> Result<MutationRequest, CodecError> {
        self.decode_request(from_bytes(bytes)?)
    }

    pub fn entry_to_bytes(&self, entry: &VersionedEntry) -> Result<Vec<u8>, CodecError> {
        to_bytes(&self.encode_entry(entry))
    }

    pub fn entry_from_bytes(&self, bytes: &[u8]) -> Result<VersionedEntry, CodecError> {
        self.decode_entry(from_bytes(bytes)?)
    }
}

pub fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(bincode::serialize(value)?)
}

pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(bincode::deserialize(bytes)?)
}
