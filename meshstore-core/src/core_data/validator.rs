/*
    MutationValidator - stateless checks gating every store mutation

    Checks run fail-fast, in order:
    1. payload self-check (verify, is_data_invalid, tier, map key, type)
    2. authorization tier (privileged key co-signature)
    3. author signature, author continuity with the stored entry
    4. sequence number against the stored entry
    5. structural legality (refresh/remove need a live prior entry)
    6. size and TTL limits

    A refresh or remove of a slot that does not exist is reported as unknown
    before the sequence check, since there is no sequence to compare against.

    The validator never mutates state. The store runs it while holding the slot
    lock, so the `current` it sees is the state the mutation will replace.
*/

use std::sync::Arc;

use crate::core_identity::{PublicKey, Signature};

use super::authorization::PrivilegedKeys;
use super::clock::Clock;
use super::distributed_data::ProtectedData;
use super::entry::{signing_bytes, MutationKind, VersionedEntry};
use super::errors::MutationError;
use super::map_key::MapKey;
use super::meta_data::MetaData;
use super::request::{AddRequest, RefreshRequest, RemoveRequest};

/// How incoming sequence numbers relate to the stored one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencePolicy {
    /// Live requests: `incoming == current + 1`
    Strict,
    /// Records applied from a peer's inventory: `incoming > current`
    Monotonic,
}

/// View of a mutation under validation
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub kind: MutationKind,
    pub map_key: MapKey,
    pub sequence_number: u32,
    pub created_at_millis: i64,
    pub author_public_key: &'a PublicKey,
    pub signature: &'a Signature,
    pub data: Option<&'a ProtectedData>,
}

impl<'a> Candidate<'a> {
    pub fn add(req: &'a AddRequest, map_key: MapKey) -> Self {
        Candidate {
            kind: MutationKind::Add,
            map_key,
            sequence_number: req.sequence_number,
            created_at_millis: req.created_at_millis,
            author_public_key: &req.author_public_key,
            signature: &req.signature,
            data: Some(&req.data),
        }
    }

    pub fn refresh(req: &'a RefreshRequest) -> Self {
        Candidate {
            kind: MutationKind::Refresh,
            map_key: req.map_key,
            sequence_number: req.sequence_number,
            created_at_millis: req.created_at_millis,
            author_public_key: &req.author_public_key,
            signature: &req.signature,
            data: None,
        }
    }

    pub fn remove(req: &'a RemoveRequest) -> Self {
        Candidate {
            kind: MutationKind::Remove,
            map_key: req.map_key,
            sequence_number: req.sequence_number,
            created_at_millis: req.created_at_millis,
            author_public_key: &req.author_public_key,
            signature: &req.signature,
            data: None,
        }
    }

    pub fn from_entry(entry: &'a VersionedEntry) -> Self {
        Candidate {
            kind: entry.kind,
            map_key: entry.map_key,
            sequence_number: entry.sequence_number,
            created_at_millis: entry.created_at_millis,
            author_public_key: &entry.author_public_key,
            signature: &entry.signature,
            data: entry.data.as_ref(),
        }
    }
}

/// Validates mutations for one data type
pub struct MutationValidator {
    meta: MetaData,
    privileged_keys: Arc<PrivilegedKeys>,
    clock: Arc<dyn Clock>,
}

impl MutationValidator {
    pub fn new(meta: MetaData, privileged_keys: Arc<PrivilegedKeys>, clock: Arc<dyn Clock>) -> Self {
        MutationValidator { meta, privileged_keys, clock }
    }

    pub fn meta_data(&self) -> &MetaData {
        &self.meta
    }

    pub fn privileged_keys(&self) -> &Arc<PrivilegedKeys> {
        &self.privileged_keys
    }

    pub fn validate(
        &self,
        current: Option<&VersionedEntry>,
        candidate: &Candidate<'_>,
        policy: SequencePolicy,
    ) -> Result<(), MutationError> {
        self.check_payload(candidate, policy)?;
        self.check_authorization(candidate)?;
        self.check_signature(current, candidate)?;

        if current.is_none() && policy == SequencePolicy::Strict && candidate.kind != MutationKind::Add {
            return Err(MutationError::UnknownEntryForRefreshOrRemove { map_key: candidate.map_key });
        }

        self.check_sequence(current, candidate, policy)?;
        self.check_structure(current, candidate, policy)?;
        self.check_limits(candidate)
    }

    /// Whether an authorized payload is co-signed by an accepted privileged key.
    /// Non-authorized payloads are always accepted.
    pub fn is_authorized(&self, data: &ProtectedData) -> bool {
        match data {
            ProtectedData::Authorized(authorized) => {
                self.privileged_keys
                    .accepts(&authorized.authorized_public_key, authorized.static_public_keys_provided)
                    && authorized.verify_authorized_signature()
            }
            _ => true,
        }
    }

    fn check_payload(&self, c: &Candidate<'_>, policy: SequencePolicy) -> Result<(), MutationError> {
        let map_key = c.map_key;
        let invalid = |reason: &str| MutationError::PayloadInvalid { map_key, reason: reason.to_string() };

        let data = match (c.kind, c.data) {
            (MutationKind::Remove, Some(_)) => return Err(invalid("tombstone carries a payload")),
            (MutationKind::Remove, None) => return Ok(()),
            (MutationKind::Refresh, None) if policy == SequencePolicy::Strict => return Ok(()),
            (_, None) => return Err(invalid("missing payload")),
            (_, Some(data)) => data,
        };

        let payload = data.data();
        if payload.meta_data().type_name != self.meta.type_name {
            return Err(MutationError::UnknownDataType {
                type_name: payload.meta_data().type_name.clone(),
            });
        }
        if data.map_key() != map_key {
            return Err(invalid("map key does not match payload hash"));
        }
        if data.tier() != payload.required_tier() {
            return Err(MutationError::PayloadInvalid {
                map_key,
                reason: format!("payload must be published as {} data", payload.required_tier()),
            });
        }
        if let Err(reason) = payload.verify() {
            return Err(MutationError::PayloadInvalid { map_key, reason });
        }
        if payload.is_data_invalid(&c.author_public_key.hash()) {
            return Err(invalid("payload rejected for author"));
        }
        Ok(())
    }

    fn check_authorization(&self, c: &Candidate<'_>) -> Result<(), MutationError> {
        match c.data {
            Some(data) if !self.is_authorized(data) => {
                Err(MutationError::PrivilegedKeyMismatch { map_key: c.map_key })
            }
            _ => Ok(()),
        }
    }

    fn check_signature(
        &self,
        current: Option<&VersionedEntry>,
        c: &Candidate<'_>,
    ) -> Result<(), MutationError> {
        let signed = signing_bytes(c.kind, c.sequence_number, c.created_at_millis, &c.map_key);
        if !c.author_public_key.verify(&signed, c.signature) {
            return Err(MutationError::SignatureInvalid { map_key: c.map_key });
        }

        match current {
            Some(entry) if entry.author_public_key != *c.author_public_key => {
                Err(MutationError::AuthorKeyMismatch { map_key: c.map_key })
            }
            _ => Ok(()),
        }
    }

    fn check_sequence(
        &self,
        current: Option<&VersionedEntry>,
        c: &Candidate<'_>,
        policy: SequencePolicy,
    ) -> Result<(), MutationError> {
        let map_key = c.map_key;
        let incoming = c.sequence_number;
        let current_seq = current.map(|e| e.sequence_number).unwrap_or(0);

        if let Some(entry) = current {
            if entry.sequence_number == incoming && entry.signature == *c.signature {
                return Err(MutationError::AlreadyReceived { map_key, sequence_number: incoming });
            }
        }

        if incoming <= current_seq {
            return Err(MutationError::SequenceTooLow { map_key, current: current_seq, incoming });
        }

        if policy == SequencePolicy::Strict && current_seq.checked_add(1) != Some(incoming) {
            return Err(MutationError::SequenceGap { map_key, current: current_seq, incoming });
        }

        Ok(())
    }

    fn check_structure(
        &self,
        current: Option<&VersionedEntry>,
        c: &Candidate<'_>,
        policy: SequencePolicy,
    ) -> Result<(), MutationError> {
        if policy == SequencePolicy::Monotonic {
            return Ok(());
        }

        match (c.kind, current) {
            (MutationKind::Refresh | MutationKind::Remove, Some(entry)) if entry.is_tombstone() => {
                Err(MutationError::AlreadyRemoved { map_key: c.map_key })
            }
            _ => Ok(()),
        }
    }

    fn check_limits(&self, c: &Candidate<'_>) -> Result<(), MutationError> {
        if let Some(data) = c.data {
            let size = data.data().serialize().len();
            if size > self.meta.max_size_bytes {
                return Err(MutationError::PayloadTooLarge {
                    map_key: c.map_key,
                    size,
                    max: self.meta.max_size_bytes,
                });
            }
        }

        if self.meta.is_expired(c.created_at_millis, self.clock.now_millis()) {
            return Err(MutationError::Expired { map_key: c.map_key });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_data::clock::ManualClock;
    use crate::core_data::distributed_data::DataTier;
    use crate::core_identity::Keypair;
    use crate::test_utils::fixtures::{test_meta, TestPayload};

    const NOW: i64 = 1_700_000_000_000;

    fn validator(keys: Arc<PrivilegedKeys>) -> MutationValidator {
        MutationValidator::new(test_meta(), keys, Arc::new(ManualClock::new(NOW)))
    }

    fn add(author: &Keypair, body: &str, seq: u32) -> AddRequest {
        AddRequest::sign(ProtectedData::authenticated(TestPayload::new(body)), seq, NOW, author)
    }

    fn stored(req: &AddRequest) -> VersionedEntry {
        VersionedEntry {
            map_key: req.map_key(),
            kind: MutationKind::Add,
            sequence_number: req.sequence_number,
            created_at_millis: req.created_at_millis,
            author_public_key: req.author_public_key,
            signature: req.signature.clone(),
            meta_data: test_meta(),
            data: Some(req.data.clone()),
        }
    }

    #[test]
    fn test_first_add_accepted() {
        let v = validator(Arc::new(PrivilegedKeys::new()));
        let req = add(&Keypair::generate(), "hello", 1);
        assert!(v.validate(None, &Candidate::add(&req, req.map_key()), SequencePolicy::Strict).is_ok());
    }

    #[test]
    fn test_first_add_must_start_at_one() {
        let v = validator(Arc::new(PrivilegedKeys::new()));
        let req = add(&Keypair::generate(), "hello", 2);
        let err = v
            .validate(None, &Candidate::add(&req, req.map_key()), SequencePolicy::Strict)
            .unwrap_err();
        assert!(matches!(err, MutationError::SequenceGap { current: 0, incoming: 2, .. }));
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let v = validator(Arc::new(PrivilegedKeys::new()));
        let mut req = add(&Keypair::generate(), "hello", 1);
        req.sequence_number = 5;

        let err = v
            .validate(None, &Candidate::add(&req, req.map_key()), SequencePolicy::Strict)
            .unwrap_err();
        assert!(matches!(err, MutationError::SignatureInvalid { .. }));
    }

    #[test]
    fn test_duplicate_is_already_received() {
        let v = validator(Arc::new(PrivilegedKeys::new()));
        let req = add(&Keypair::generate(), "hello", 1);
        let current = stored(&req);

        let err = v
            .validate(Some(&current), &Candidate::add(&req, req.map_key()), SequencePolicy::Strict)
            .unwrap_err();
        assert!(err.is_benign());
    }

    #[test]
    fn test_other_author_is_rejected() {
        let v = validator(Arc::new(PrivilegedKeys::new()));
        let first = add(&Keypair::generate(), "hello", 1);
        let current = stored(&first);
        let second = add(&Keypair::generate(), "hello", 2);

        let err = v
            .validate(Some(&current), &Candidate::add(&second, second.map_key()), SequencePolicy::Strict)
            .unwrap_err();
        assert!(matches!(err, MutationError::AuthorKeyMismatch { .. }));
    }

    #[test]
    fn test_refresh_unknown_key() {
        let v = validator(Arc::new(PrivilegedKeys::new()));
        let kp = Keypair::generate();
        let req = RefreshRequest::sign(MapKey::hash(b"missing"), 2, NOW, &kp);

        let err = v.validate(None, &Candidate::refresh(&req), SequencePolicy::Strict).unwrap_err();
        assert!(matches!(err, MutationError::UnknownEntryForRefreshOrRemove { .. }));
    }

    #[test]
    fn test_monotonic_accepts_gaps_but_not_rollback() {
        let v = validator(Arc::new(PrivilegedKeys::new()));
        let kp = Keypair::generate();
        let first = add(&kp, "hello", 1);
        let current = stored(&first);

        let jump = add(&kp, "hello", 5);
        assert!(v
            .validate(Some(&current), &Candidate::add(&jump, jump.map_key()), SequencePolicy::Monotonic)
            .is_ok());

        let strict = v
            .validate(Some(&current), &Candidate::add(&jump, jump.map_key()), SequencePolicy::Strict)
            .unwrap_err();
        assert!(matches!(strict, MutationError::SequenceGap { current: 1, incoming: 5, .. }));
    }

    #[test]
    fn test_payload_too_large() {
        let v = validator(Arc::new(PrivilegedKeys::new()));
        let big = "x".repeat(test_meta().max_size_bytes + 1);
        let req = add(&Keypair::generate(), &big, 1);

        let err = v
            .validate(None, &Candidate::add(&req, req.map_key()), SequencePolicy::Strict)
            .unwrap_err();
        assert!(matches!(err, MutationError::PayloadTooLarge { .. }));
    }

    #[test]
    fn test_invalid_payload_rejected_first() {
        let v = validator(Arc::new(PrivilegedKeys::new()));
        let req = add(&Keypair::generate(), TestPayload::INVALID_BODY, 1);

        let err = v
            .validate(None, &Candidate::add(&req, req.map_key()), SequencePolicy::Strict)
            .unwrap_err();
        assert!(matches!(err, MutationError::PayloadInvalid { .. }));
    }

    #[test]
    fn test_expired_add_rejected() {
        let v = validator(Arc::new(PrivilegedKeys::new()));
        let kp = Keypair::generate();
        let created = NOW - test_meta().ttl_millis - 1;
        let req = AddRequest::sign(ProtectedData::authenticated(TestPayload::new("old")), 1, created, &kp);

        let err = v
            .validate(None, &Candidate::add(&req, req.map_key()), SequencePolicy::Strict)
            .unwrap_err();
        assert!(matches!(err, MutationError::Expired { .. }));
    }

    #[test]
    fn test_authorized_tier() {
        let privileged = Keypair::generate();
        let outsider = Keypair::generate();
        let author = Keypair::generate();
        let v = validator(Arc::new(PrivilegedKeys::with_keys([privileged.public_key()])));

        let payload = TestPayload::with_tier("notice", DataTier::Authorized);
        let ok = AddRequest::sign(ProtectedData::authorized(payload.clone(), &privileged, false), 1, NOW, &author);
        assert!(v.validate(None, &Candidate::add(&ok, ok.map_key()), SequencePolicy::Strict).is_ok());

        let bad = AddRequest::sign(ProtectedData::authorized(payload, &outsider, false), 1, NOW, &author);
        let err = v
            .validate(None, &Candidate::add(&bad, bad.map_key()), SequencePolicy::Strict)
            .unwrap_err();
        assert!(matches!(err, MutationError::PrivilegedKeyMismatch { .. }));
    }

    #[test]
    fn test_authorized_payload_published_as_authenticated() {
        let v = validator(Arc::new(PrivilegedKeys::new()));
        let payload = TestPayload::with_tier("notice", DataTier::Authorized);
        let req = AddRequest::sign(ProtectedData::authenticated(payload), 1, NOW, &Keypair::generate());

        let err = v
            .validate(None, &Candidate::add(&req, req.map_key()), SequencePolicy::Strict)
            .unwrap_err();
        assert!(matches!(err, MutationError::PayloadInvalid { .. }));
    }
}
