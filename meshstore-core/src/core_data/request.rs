/*
    Mutation requests - inbound add/refresh/remove

    Produced by local publishers or by remote peers via the transport layer. Add
    carries the payload; refresh and remove only address the slot by MapKey.
*/

use crate::core_identity::{Keypair, PublicKey, Signature};

use super::distributed_data::ProtectedData;
use super::entry::{signing_bytes, MutationKind};
use super::map_key::MapKey;

#[derive(Debug, Clone)]
pub struct AddRequest {
    pub data: ProtectedData,
    pub sequence_number: u32,
    pub created_at_millis: i64,
    pub author_public_key: PublicKey,
    pub signature: Signature,
}

impl AddRequest {
    pub fn sign(data: ProtectedData, sequence_number: u32, created_at_millis: i64, author: &Keypair) -> Self {
        let map_key = data.map_key();
        let signature =
            author.sign(&signing_bytes(MutationKind::Add, sequence_number, created_at_millis, &map_key));
        AddRequest {
            data,
            sequence_number,
            created_at_millis,
            author_public_key: author.public_key(),
            signature,
        }
    }

    pub fn map_key(&self) -> MapKey {
        self.data.map_key()
    }
}

/// Re-signs an existing entry with a newer creation time
#[derive(Debug, Clone)]
pub struct RefreshRequest {
    pub map_key: MapKey,
    pub sequence_number: u32,
    pub created_at_millis: i64,
    pub author_public_key: PublicKey,
    pub signature: Signature,
}

impl RefreshRequest {
    pub fn sign(map_key: MapKey, sequence_number: u32, created_at_millis: i64, author: &Keypair) -> Self {
        let signature = author.sign(&signing_bytes(
            MutationKind::Refresh,
            sequence_number,
            created_at_millis,
            &map_key,
        ));
        RefreshRequest {
            map_key,
            sequence_number,
            created_at_millis,
            author_public_key: author.public_key(),
            signature,
        }
    }
}

/// Replaces an entry with a tombstone
#[derive(Debug, Clone)]
pub struct RemoveRequest {
    pub map_key: MapKey,
    pub sequence_number: u32,
    pub created_at_millis: i64,
    pub author_public_key: PublicKey,
    pub signature: Signature,
}

impl RemoveRequest {
    pub fn sign(map_key: MapKey, sequence_number: u32, created_at_millis: i64, author: &Keypair) -> Self {
        let signature = author.sign(&signing_bytes(
            MutationKind::Remove,
            sequence_number,
            created_at_millis,
            &map_key,
        ));
        RemoveRequest {
            map_key,
            sequence_number,
            created_at_millis,
            author_public_key: author.public_key(),
            signature,
        }
    }
}

#[derive(Debug, Clone)]
pub enum MutationRequest {
    Add(AddRequest),
    Refresh(RefreshRequest),
    Remove(RemoveRequest),
}

impl MutationRequest {
    pub fn kind(&self) -> MutationKind {
        match self {
            MutationRequest::Add(_) => MutationKind::Add,
            MutationRequest::Refresh(_) => MutationKind::Refresh,
            MutationRequest::Remove(_) => MutationKind::Remove,
        }
    }

    pub fn map_key(&self) -> MapKey {
        match self {
            MutationRequest::Add(req) => req.map_key(),
            MutationRequest::Refresh(req) => req.map_key,
            MutationRequest::Remove(req) => req.map_key,
        }
    }

    pub fn sequence_number(&self) -> u32 {
        match self {
            MutationRequest::Add(req) => req.sequence_number,
            MutationRequest::Refresh(req) => req.sequence_number,
            MutationRequest::Remove(req) => req.sequence_number,
        }
    }

    pub fn author_public_key(&self) -> &PublicKey {
        match self {
            MutationRequest::Add(req) => &req.author_public_key,
            MutationRequest::Refresh(req) => &req.author_public_key,
            MutationRequest::Remove(req) => &req.author_public_key,
        }
    }
}

impl From<AddRequest> for MutationRequest {
    fn from(req: AddRequest) -> Self {
        MutationRequest::Add(req)
    }
}

impl From<RefreshRequest> for MutationRequest {
    fn from(req: RefreshRequest) -> Self {
        MutationRequest::Refresh(req)
    }
}

impl From<RemoveRequest> for MutationRequest {
    fn from(req: RemoveRequest) -> Self {
        MutationRequest::Remove(req)
    }
}
