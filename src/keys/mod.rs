//! Loaded private keys: fingerprinting, and RSA/Ed25519 signing.
//!
//! Nothing in this module touches authorization or the wire framing; it
//! turns the algorithm-specific fields decoded by [`crate::wire`] into a
//! [`LoadedKey`] that knows how to fingerprint and sign itself.

mod ed25519_key;
mod rsa_key;

use std::fmt;

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::wire::AddIdentityFields;

pub use ed25519_key::Ed25519Identity;
pub use rsa_key::RsaIdentity;

/// SHA-256 digest of a public-key blob. The stable identity of a key
/// throughout this daemon: the key store, policy cache, and wire protocol
/// all address keys by fingerprint rather than by blob or comment.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of_blob(blob: &[u8]) -> Self {
        let digest = Sha256::digest(blob);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Fingerprint(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

/// A private key installed via `ADD_IDENTITY`, tagged by algorithm.
///
/// Both variants zeroize their secret material on drop; see the `Drop`
/// impls in `rsa_key` and `ed25519_key`.
pub enum LoadedKey {
    Rsa(RsaIdentity),
    Ed25519(Ed25519Identity),
}

impl LoadedKey {
    /// Build a `LoadedKey` from the fields decoded out of an `ADD_IDENTITY`
    /// request, validating the key material along the way.
    pub fn from_wire(fields: &AddIdentityFields, comment: String) -> Result<Self> {
        match fields {
            AddIdentityFields::Rsa(fields) => {
                Ok(LoadedKey::Rsa(RsaIdentity::from_wire_fields(fields, comment)?))
            }
            AddIdentityFields::Ed25519(fields) => Ok(LoadedKey::Ed25519(
                Ed25519Identity::from_wire_fields(fields, comment)?,
            )),
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        match self {
            LoadedKey::Rsa(k) => k.fingerprint(),
            LoadedKey::Ed25519(k) => k.fingerprint(),
        }
    }

    pub fn public_key_blob(&self) -> &[u8] {
        match self {
            LoadedKey::Rsa(k) => k.public_key_blob(),
            LoadedKey::Ed25519(k) => k.public_key_blob(),
        }
    }

    pub fn comment(&self) -> &str {
        match self {
            LoadedKey::Rsa(k) => k.comment(),
            LoadedKey::Ed25519(k) => k.comment(),
        }
    }

    /// Sign `data`, already validated as a well-formed authentication
    /// request by the caller. Returns the assembled
    /// `algo-tag || raw-signature` blob described in §4.1.
    pub fn sign(&self, data: &[u8], flags: u32) -> Result<Vec<u8>> {
        match self {
            LoadedKey::Rsa(k) => k.sign(data, flags),
            LoadedKey::Ed25519(k) => k.sign(data, flags),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_for_the_same_blob() {
        let blob = b"ssh-ed25519 fake blob bytes";
        let a = Fingerprint::of_blob(blob);
        let b = Fingerprint::of_blob(blob);
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_differs_for_different_blobs() {
        let a = Fingerprint::of_blob(b"blob-one");
        let b = Fingerprint::of_blob(b"blob-two");
        assert_ne!(a, b);
    }
}
