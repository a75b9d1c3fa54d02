//! Strict parser for the `SSH_MSG_USERAUTH_REQUEST` public-key-authentication
//! payload that a `SIGN_REQUEST`'s `data` field is required to contain.
//!
//! The agent protocol itself doesn't care what bytes it's asked to sign;
//! this daemon is deliberately stricter than a stock `ssh-agent` and refuses
//! to sign anything that isn't a well-formed authentication request, so a
//! compromised or careless client can't use the agent as a generic signing
//! oracle.

use std::io::Cursor;

use crate::error::{AgentError, Result};
use crate::wire::mpint::{read_bool, read_string, read_u8, read_utf8};

const SSH_MSG_USERAUTH_REQUEST: u8 = 50;

/// The parsed fields of a `SSH_MSG_USERAUTH_REQUEST` public-key variant.
/// Only the fields the codec actually inspects are kept.
#[derive(Debug, PartialEq, Eq)]
pub struct UserAuthRequest {
    pub session_id: Vec<u8>,
    pub user: String,
    pub service: String,
    pub pubkey_algo: String,
    pub pubkey_blob: Vec<u8>,
}

/// Parse and validate `data` as a public-key `SSH_MSG_USERAUTH_REQUEST`.
///
/// Every field is checked; trailing bytes after the public key blob are
/// rejected, matching the "no partial or lenient parsing" rule for the
/// rest of the codec.
pub fn parse(data: &[u8]) -> Result<UserAuthRequest> {
    let mut cur = Cursor::new(data);

    let session_id = read_string(&mut cur)?;

    let msg_type = read_u8(&mut cur)?;
    if msg_type != SSH_MSG_USERAUTH_REQUEST {
        return Err(AgentError::Protocol(format!(
            "expected SSH_MSG_USERAUTH_REQUEST (50), got {msg_type}"
        )));
    }

    let user = read_utf8(&mut cur)?;
    let service = read_utf8(&mut cur)?;

    let method = read_utf8(&mut cur)?;
    if method != "publickey" {
        return Err(AgentError::Protocol(format!(
            "expected \"publickey\" auth method, got {method:?}"
        )));
    }

    let has_signature = read_bool(&mut cur)?;
    if !has_signature {
        return Err(AgentError::Protocol(
            "expected the public-key-request boolean to be true".into(),
        ));
    }

    let pubkey_algo = read_utf8(&mut cur)?;
    let pubkey_blob = read_string(&mut cur)?;

    if (cur.position() as usize) != data.len() {
        return Err(AgentError::Protocol(
            "trailing bytes after SSH_MSG_USERAUTH_REQUEST".into(),
        ));
    }

    Ok(UserAuthRequest {
        session_id,
        user,
        service,
        pubkey_algo,
        pubkey_blob,
    })
}
