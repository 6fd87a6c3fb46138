/*
    Built-in payload types

    - TextMessage     public chat text, authenticated, bound to its author
    - PrivateMessage  direct text to one receiver, mailbox tier
    - AlertNotice     network-wide alert, co-signed by a privileged role

    Canonical byte layouts (also the wire payload):
    - TextMessage / PrivateMessage: author key hash (32) || utf-8 text
    - AlertNotice: level (1) || issued_at (i64 BE) || utf-8 message
*/

use std::any::Any;
use std::sync::Arc;

use crate::core_identity::PublicKey;

use super::codec::PayloadCodec;
use super::distributed_data::{DataRef, DataTier, DistributedData};
use super::meta_data::{
    MetaData, MetaDataRegistry, HIGH_PRIORITY, MAX_SIZE_10_KB, MAX_SIZE_20_KB, TTL_10_DAYS, TTL_15_DAYS,
};

pub const MAX_TEXT_LENGTH: usize = 10_000;
pub const MAX_ALERT_LENGTH: usize = 2_000;

pub fn text_message_meta() -> MetaData {
    MetaData::new(TextMessage::TYPE_NAME, TTL_10_DAYS, MAX_SIZE_20_KB)
}

pub fn private_message_meta() -> MetaData {
    MetaData::new(PrivateMessage::TYPE_NAME, TTL_15_DAYS, MAX_SIZE_20_KB)
}

pub fn alert_notice_meta() -> MetaData {
    MetaData::new(AlertNotice::TYPE_NAME, TTL_15_DAYS, MAX_SIZE_10_KB).with_priority(HIGH_PRIORITY)
}

/// Registry with all built-in types
pub fn builtin_registry() -> MetaDataRegistry {
    vec![text_message_meta(), private_message_meta(), alert_notice_meta()].into_iter().collect()
}

/// Register decoders for all built-in types
pub fn register_builtin_decoders(codec: &mut PayloadCodec) {
    codec
        .register_decoder(TextMessage::TYPE_NAME, TextMessage::decode)
        .register_decoder(PrivateMessage::TYPE_NAME, PrivateMessage::decode)
        .register_decoder(AlertNotice::TYPE_NAME, AlertNotice::decode);
}

fn encode_authored_text(author_pub_key_hash: &[u8; 32], text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(32 + text.len());
    bytes.extend_from_slice(author_pub_key_hash);
    bytes.extend_from_slice(text.as_bytes());
    bytes
}

fn decode_authored_text(bytes: &[u8]) -> Result<([u8; 32], String), String> {
    if bytes.len() < 32 {
        return Err("payload shorter than author hash".to_string());
    }
    let (hash, text) = bytes.split_at(32);
    let mut author_pub_key_hash = [0u8; 32];
    author_pub_key_hash.copy_from_slice(hash);
    let text = String::from_utf8(text.to_vec()).map_err(|e| e.to_string())?;
    Ok((author_pub_key_hash, text))
}

fn check_text(text: &str, max: usize) -> Result<(), String> {
    let length = text.chars().count();
    if length > max {
        return Err(format!("text too long: {} > {} characters", length, max));
    }
    Ok(())
}

/// Public chat message
#[derive(Debug, Clone)]
pub struct TextMessage {
    pub text: String,
    pub author_pub_key_hash: [u8; 32],
    meta: MetaData,
}

impl TextMessage {
    pub const TYPE_NAME: &'static str = "TextMessage";

    pub fn new(text: impl Into<String>, author: &PublicKey) -> DataRef {
        Arc::new(TextMessage {
            text: text.into(),
            author_pub_key_hash: author.hash(),
            meta: text_message_meta(),
        })
    }

    pub fn decode(bytes: &[u8], meta: &MetaData) -> Result<DataRef, String> {
        let (author_pub_key_hash, text) = decode_authored_text(bytes)?;
        Ok(Arc::new(TextMessage { text, author_pub_key_hash, meta: meta.clone() }))
    }
}

impl DistributedData for TextMessage {
    fn serialize(&self) -> Vec<u8> {
        encode_authored_text(&self.author_pub_key_hash, &self.text)
    }

    fn verify(&self) -> Result<(), String> {
        check_text(&self.text, MAX_TEXT_LENGTH)
    }

    /// Only the author named inside the message may publish it
    fn is_data_invalid(&self, author_pub_key_hash: &[u8; 32]) -> bool {
        self.author_pub_key_hash != *author_pub_key_hash
    }

    fn meta_data(&self) -> &MetaData {
        &self.meta
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Direct message delivered through the mailbox tier
#[derive(Debug, Clone)]
pub struct PrivateMessage {
    pub text: String,
    pub author_pub_key_hash: [u8; 32],
    meta: MetaData,
}

impl PrivateMessage {
    pub const TYPE_NAME: &'static str = "PrivateMessage";

    pub fn new(text: impl Into<String>, author: &PublicKey) -> DataRef {
        Arc::new(PrivateMessage {
            text: text.into(),
            author_pub_key_hash: author.hash(),
            meta: private_message_meta(),
        })
    }

    pub fn decode(bytes: &[u8], meta: &MetaData) -> Result<DataRef, String> {
        let (author_pub_key_hash, text) = decode_authored_text(bytes)?;
        Ok(Arc::new(PrivateMessage { text, author_pub_key_hash, meta: meta.clone() }))
    }
}

impl DistributedData for PrivateMessage {
    fn serialize(&self) -> Vec<u8> {
        encode_authored_text(&self.author_pub_key_hash, &self.text)
    }

    fn verify(&self) -> Result<(), String> {
        check_text(&self.text, MAX_TEXT_LENGTH)
    }

    fn is_data_invalid(&self, author_pub_key_hash: &[u8; 32]) -> bool {
        self.author_pub_key_hash != *author_pub_key_hash
    }

    fn meta_data(&self) -> &MetaData {
        &self.meta
    }

    fn required_tier(&self) -> DataTier {
        DataTier::Mailbox
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info = 0,
    Warning = 1,
    Emergency = 2,
}

impl AlertLevel {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(AlertLevel::Info),
            1 => Some(AlertLevel::Warning),
            2 => Some(AlertLevel::Emergency),
            _ => None,
        }
    }
}

/// Network-wide alert published by a privileged role
#[derive(Debug, Clone)]
pub struct AlertNotice {
    pub level: AlertLevel,
    pub issued_at_millis: i64,
    pub message: String,
    meta: MetaData,
}

impl AlertNotice {
    pub const TYPE_NAME: &'static str = "AlertNotice";

    pub fn new(level: AlertLevel, issued_at_millis: i64, message: impl Into<String>) -> DataRef {
        Arc::new(AlertNotice { level, issued_at_millis, message: message.into(), meta: alert_notice_meta() })
    }

    pub fn decode(bytes: &[u8], meta: &MetaData) -> Result<DataRef, String> {
        if bytes.len() < 9 {
            return Err("alert shorter than header".to_string());
        }
        let level = AlertLevel::from_byte(bytes[0]).ok_or("unknown alert level")?;
        let mut issued = [0u8; 8];
        issued.copy_from_slice(&bytes[1..9]);
        let message = String::from_utf8(bytes[9..].to_vec()).map_err(|e| e.to_string())?;

        Ok(Arc::new(AlertNotice {
            level,
            issued_at_millis: i64::from_be_bytes(issued),
            message,
            meta: meta.clone(),
        }))
    }
}

impl DistributedData for AlertNotice {
    fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(9 + self.message.len());
        bytes.push(self.level as u8);
        bytes.extend_from_slice(&self.issued_at_millis.to_be_bytes());
        bytes.extend_from_slice(self.message.as_bytes());
        bytes
    }

    fn verify(&self) -> Result<(), String> {
        if self.message.is_empty() {
            return Err("empty alert message".to_string());
        }
        check_text(&self.message, MAX_ALERT_LENGTH)
    }

    fn meta_data(&self) -> &MetaData {
        &self.meta
    }

    fn required_tier(&self) -> DataTier {
        DataTier::Authorized
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
