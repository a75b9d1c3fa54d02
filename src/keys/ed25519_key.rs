//! Ed25519 private keys: construction from the wire's 32-byte public / 64-byte
//! secret pair, and deterministic RFC 8032 signing.

use ed25519_dalek::{Signer, SigningKey};
use zeroize::Zeroize;

use crate::error::{AgentError, Result};
use crate::wire::mpint::{write_string, write_utf8};
use crate::wire::Ed25519KeyFields;

use super::Fingerprint;

pub struct Ed25519Identity {
    signing_key: SigningKey,
    public_key_blob: Vec<u8>,
    comment: String,
    fingerprint: Fingerprint,
}

impl Ed25519Identity {
    pub fn from_wire_fields(fields: &Ed25519KeyFields, comment: String) -> Result<Self> {
        // The wire's 64-byte "secret key" is seed(32) || public(32); only
        // the seed feeds key derivation.
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&fields.secret[..32]);
        let signing_key = SigningKey::from_bytes(&seed);
        seed.zeroize();

        if signing_key.verifying_key().to_bytes() != fields.public {
            return Err(AgentError::Protocol(
                "ed25519 public key does not match the supplied secret key".into(),
            ));
        }

        let public_key_blob = encode_public_key_blob(&fields.public);
        let fingerprint = Fingerprint::of_blob(&public_key_blob);

        Ok(Ed25519Identity {
            signing_key,
            public_key_blob,
            comment,
            fingerprint,
        })
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn public_key_blob(&self) -> &[u8] {
        &self.public_key_blob
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Sign `data`. Flags are not meaningful for Ed25519 and must be zero.
    pub fn sign(&self, data: &[u8], flags: u32) -> Result<Vec<u8>> {
        if flags != 0 {
            return Err(AgentError::Protocol(format!(
                "ed25519 signing flags must be zero, got {flags:#x}"
            )));
        }
        let signature = self.signing_key.sign(data);

        let mut out = Vec::new();
        write_utf8(&mut out, "ssh-ed25519").map_err(AgentError::Transport)?;
        write_string(&mut out, &signature.to_bytes()).map_err(AgentError::Transport)?;
        Ok(out)
    }
}

fn encode_public_key_blob(public: &[u8; 32]) -> Vec<u8> {
    let mut blob = Vec::new();
    write_utf8(&mut blob, "ssh-ed25519").expect("in-memory write");
    write_string(&mut blob, public).expect("in-memory write");
    blob
}
