//! The SSH agent wire protocol: framing, the request/response message set,
//! and the nested structures inside `ADD_IDENTITY` and `SIGN_REQUEST`.
//!
//! Every message on the wire is a 4-byte big-endian length followed by
//! that many payload bytes, the first of which is a message code. This
//! module turns that byte stream into (and back out of) [`Request`] and
//! [`Response`] values; it performs no authorization and touches no key
//! material.

pub mod auth_request;
pub mod mpint;

use std::io::Cursor;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{AgentError, Result};
use mpint::{read_mpint, read_string, read_u32, read_u8, read_utf8, write_string, write_u32, write_utf8};

/// Largest frame the codec will allocate a buffer for, per the protocol's
/// historical limit. Checked against the *declared* length before any
/// payload allocation happens.
pub const MAX_FRAME_LEN: usize = 256 * 1024;

const SSH_AGENT_FAILURE: u8 = 5;
const SSH_AGENT_SUCCESS: u8 = 6;
const SSH_AGENTC_REQUEST_IDENTITIES: u8 = 11;
const SSH_AGENT_IDENTITIES_ANSWER: u8 = 12;
const SSH_AGENTC_SIGN_REQUEST: u8 = 13;
const SSH_AGENT_SIGN_RESPONSE: u8 = 14;
const SSH_AGENTC_ADD_IDENTITY: u8 = 17;
const SSH_AGENTC_REMOVE_IDENTITY: u8 = 18;
const SSH_AGENTC_REMOVE_ALL_IDENTITIES: u8 = 19;
const SSH_AGENTC_LOCK: u8 = 22;
const SSH_AGENTC_UNLOCK: u8 = 23;

/// The RSA-specific fields of an `ADD_IDENTITY` request, still in their raw
/// unsigned-magnitude wire form (mpints with any sign-padding stripped).
#[derive(Debug, Clone)]
pub struct RsaKeyFields {
    pub n: Vec<u8>,
    pub e: Vec<u8>,
    pub d: Vec<u8>,
    pub iqmp: Vec<u8>,
    pub p: Vec<u8>,
    pub q: Vec<u8>,
}

/// The Ed25519-specific fields of an `ADD_IDENTITY` request.
#[derive(Debug, Clone)]
pub struct Ed25519KeyFields {
    pub public: [u8; 32],
    pub secret: [u8; 64],
}

/// Algorithm-tagged private-key material carried by `ADD_IDENTITY`.
#[derive(Debug, Clone)]
pub enum AddIdentityFields {
    Rsa(RsaKeyFields),
    Ed25519(Ed25519KeyFields),
}

/// A fully decoded client request.
#[derive(Debug, Clone)]
pub enum Request {
    RequestIdentities,
    AddIdentity {
        fields: AddIdentityFields,
        comment: String,
    },
    RemoveIdentity {
        key_blob: Vec<u8>,
    },
    RemoveAllIdentities,
    SignRequest {
        key_blob: Vec<u8>,
        data: Vec<u8>,
        flags: u32,
    },
    Lock {
        passphrase: Vec<u8>,
    },
    Unlock {
        passphrase: Vec<u8>,
    },
    /// A recognized-but-unhandled code, or one this agent never implements
    /// (e.g. the legacy SSH1 message set). Always answered with `FAILURE`.
    Unimplemented(u8),
}

/// One entry in an `IDENTITIES_ANSWER`.
#[derive(Debug, Clone)]
pub struct Identity {
    pub key_blob: Vec<u8>,
    pub comment: String,
}

/// A response ready to be framed and written back to the client.
#[derive(Debug, Clone)]
pub enum Response {
    Success,
    Failure,
    Identities(Vec<Identity>),
    /// The fully assembled `length-prefixed algo tag || length-prefixed raw
    /// signature` blob, as produced by [`crate::keys::LoadedKey::sign`].
    SignResponse(Vec<u8>),
}

/// Read one frame from `reader` and decode it into a [`Request`].
///
/// Returns `Ok(None)` on a clean end-of-stream at the start of a frame
/// (the connection should be closed); a [`AgentError::Protocol`] leaves the
/// connection open (the caller answers `FAILURE` and keeps serving); a
/// [`AgentError::Transport`] means the socket itself is broken.
pub async fn read_request<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Request>> {
    let payload = match read_frame(reader).await? {
        Some(p) => p,
        None => return Ok(None),
    };
    decode_request(&payload).map(Some)
}

async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(AgentError::Transport(e)),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(AgentError::Protocol(format!(
            "frame of {len} bytes exceeds the {MAX_FRAME_LEN}-byte limit"
        )));
    }
    if len < 1 {
        return Err(AgentError::Protocol("frame has no payload".into()));
    }
    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(AgentError::Transport)?;
    Ok(Some(payload))
}

fn decode_request(payload: &[u8]) -> Result<Request> {
    let mut cur = Cursor::new(payload);
    let code = read_u8(&mut cur)?;
    match code {
        SSH_AGENTC_REQUEST_IDENTITIES => Ok(Request::RequestIdentities),
        SSH_AGENTC_ADD_IDENTITY => decode_add_identity(&mut cur),
        SSH_AGENTC_REMOVE_IDENTITY => {
            let key_blob = read_string(&mut cur)?;
            Ok(Request::RemoveIdentity { key_blob })
        }
        SSH_AGENTC_REMOVE_ALL_IDENTITIES => Ok(Request::RemoveAllIdentities),
        SSH_AGENTC_SIGN_REQUEST => {
            let key_blob = read_string(&mut cur)?;
            let data = read_string(&mut cur)?;
            let flags = read_u32(&mut cur)?;
            Ok(Request::SignRequest {
                key_blob,
                data,
                flags,
            })
        }
        SSH_AGENTC_LOCK => {
            let passphrase = read_string(&mut cur)?;
            Ok(Request::Lock { passphrase })
        }
        SSH_AGENTC_UNLOCK => {
            let passphrase = read_string(&mut cur)?;
            Ok(Request::Unlock { passphrase })
        }
        other => Ok(Request::Unimplemented(other)),
    }
}

fn decode_add_identity(cur: &mut Cursor<&[u8]>) -> Result<Request> {
    let algo = read_utf8(cur)?;
    let fields = match algo.as_str() {
        "ssh-rsa" => {
            let n = read_mpint(cur)?;
            let e = read_mpint(cur)?;
            let d = read_mpint(cur)?;
            let iqmp = read_mpint(cur)?;
            let p = read_mpint(cur)?;
            let q = read_mpint(cur)?;
            AddIdentityFields::Rsa(RsaKeyFields { n, e, d, iqmp, p, q })
        }
        "ssh-ed25519" => {
            let public = read_fixed::<32>(cur, "ed25519 public key")?;
            let secret = read_fixed::<64>(cur, "ed25519 secret key")?;
            AddIdentityFields::Ed25519(Ed25519KeyFields { public, secret })
        }
        other => {
            return Err(AgentError::Protocol(format!(
                "unsupported key type for ADD_IDENTITY: {other}"
            )))
        }
    };
    let comment = read_utf8(cur)?;
    Ok(Request::AddIdentity { fields, comment })
}

fn read_fixed<const N: usize>(cur: &mut Cursor<&[u8]>, what: &str) -> Result<[u8; N]> {
    let bytes = read_string(cur)?;
    bytes
        .try_into()
        .map_err(|_| AgentError::Protocol(format!("{what} must be exactly {N} bytes")))
}

/// Frame and write `response` to `writer`.
pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &Response,
) -> Result<()> {
    let body = encode_response(response);
    if body.len() > MAX_FRAME_LEN {
        return Err(AgentError::Protocol("constructed response too large".into()));
    }
    let len = body.len() as u32;
    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(AgentError::Transport)?;
    writer.write_all(&body).await.map_err(AgentError::Transport)?;
    writer.flush().await.map_err(AgentError::Transport)?;
    Ok(())
}

fn encode_response(response: &Response) -> Vec<u8> {
    let mut body = Vec::new();
    match response {
        Response::Success => body.push(SSH_AGENT_SUCCESS),
        Response::Failure => body.push(SSH_AGENT_FAILURE),
        Response::Identities(identities) => {
            body.push(SSH_AGENT_IDENTITIES_ANSWER);
            // Infallible: writes into a growable Vec never fail.
            write_u32(&mut body, identities.len() as u32).expect("in-memory write");
            for id in identities {
                write_string(&mut body, &id.key_blob).expect("in-memory write");
                write_utf8(&mut body, &id.comment).expect("in-memory write");
            }
        }
        Response::SignResponse(sig_blob) => {
            body.push(SSH_AGENT_SIGN_RESPONSE);
            write_string(&mut body, sig_blob).expect("in-memory write");
        }
    }
    body
}
