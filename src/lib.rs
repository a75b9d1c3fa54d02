//! `keyholderd`: a multi-user SSH agent daemon. Holds private keys in
//! memory and signs authentication challenges on behalf of distinct local
//! users, gating each key by group membership rather than trusting every
//! client equally.

pub mod config;
pub mod error;
pub mod handler;
pub mod keys;
pub mod lock;
pub mod logging;
pub mod mlock;
pub mod peer;
pub mod policy;
pub mod server;
pub mod store;
pub mod wire;
