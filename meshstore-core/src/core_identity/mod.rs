//! Identity module
//!
//! Key material for authors and privileged roles.

mod keypair;

pub use keypair::{Keypair, PublicKey, Signature};
