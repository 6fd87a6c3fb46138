//! Test fixtures for creating common test objects
//!
//! `TestPayload` is a minimal payload type whose tier and metadata can be chosen
//! per test. Its canonical bytes are a tier byte followed by the body.

use std::any::Any;
use std::sync::Arc;

use crate::core_data::meta_data::{MAX_SIZE_1_KB, TTL_10_DAYS};
use crate::core_data::payloads::{builtin_registry, register_builtin_decoders};
use crate::core_data::{DataRef, DataTier, DistributedData, MetaData, MetaDataRegistry, PayloadCodec};
use crate::core_identity::Keypair;

pub fn test_meta() -> MetaData {
    MetaData::new(TestPayload::TYPE_NAME, TTL_10_DAYS, MAX_SIZE_1_KB)
}

/// Built-in types plus `TestPayload`, all decodable
pub fn test_registry() -> MetaDataRegistry {
    let mut registry = builtin_registry();
    registry.register(test_meta());
    registry
}

pub fn test_codec() -> PayloadCodec {
    let mut codec = PayloadCodec::new(test_registry());
    register_builtin_decoders(&mut codec);
    codec.register_decoder(TestPayload::TYPE_NAME, TestPayload::decode);
    codec
}

/// Deterministic keypair, distinct per `id`
pub fn keypair(id: u8) -> Keypair {
    Keypair::from_seed([id; 32])
}

#[derive(Debug, Clone)]
pub struct TestPayload {
    pub body: String,
    pub tier: DataTier,
    meta: MetaData,
}

impl TestPayload {
    pub const TYPE_NAME: &'static str = "TestPayload";

    /// Body that fails `verify()`
    pub const INVALID_BODY: &'static str = "<invalid>";

    pub fn new(body: impl Into<String>) -> DataRef {
        Self::with_tier(body, DataTier::Authenticated)
    }

    pub fn with_tier(body: impl Into<String>, tier: DataTier) -> DataRef {
        Self::with_meta(body, tier, test_meta())
    }

    pub fn with_meta(body: impl Into<String>, tier: DataTier, meta: MetaData) -> DataRef {
        Arc::new(TestPayload { body: body.into(), tier, meta })
    }

    pub fn decode(bytes: &[u8], meta: &MetaData) -> Result<DataRef, String> {
        let (tier, body) = bytes.split_first().ok_or("empty payload")?;
        let tier = match tier {
            0 => DataTier::Authenticated,
            1 => DataTier::Authorized,
            2 => DataTier::Mailbox,
            other => return Err(format!("unknown tier byte {}", other)),
        };
        let body = String::from_utf8(body.to_vec()).map_err(|e| e.to_string())?;
        Ok(Self::with_meta(body, tier, meta.clone()))
    }
}

impl DistributedData for TestPayload {
    fn serialize(&self) -> Vec<u8> {
        let tier = match self.tier {
            DataTier::Authenticated => 0u8,
            DataTier::Authorized => 1,
            DataTier::Mailbox => 2,
        };
        let mut bytes = Vec::with_capacity(1 + self.body.len());
        bytes.push(tier);
        bytes.extend_from_slice(self.body.as_bytes());
        bytes
    }

    fn verify(&self) -> Result<(), String> {
        if self.body == Self::INVALID_BODY {
            return Err("invalid test body".to_string());
        }
        Ok(())
    }

    fn meta_data(&self) -> &MetaData {
        &self.meta
    }

    fn required_tier(&self) -> DataTier {
        self.tier
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
