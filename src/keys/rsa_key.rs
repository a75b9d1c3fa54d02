//! RSA private keys: construction from raw wire fields, PKCS#1 v1.5
//! signing with SHA-1/SHA-256/SHA-512 selected by the caller's flags.

use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Pkcs1v15Sign, RsaPrivateKey};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::error::{AgentError, Result};
use crate::wire::mpint::{write_mpint, write_utf8, write_string};
use crate::wire::RsaKeyFields;

use super::Fingerprint;

/// `SSH_AGENT_RSA_SHA2_256` / `SSH_AGENT_RSA_SHA2_512`, per the agent
/// protocol extension (RFC 8332 §4.2).
const FLAG_SHA2_256: u32 = 0x02;
const FLAG_SHA2_512: u32 = 0x04;

pub struct RsaIdentity {
    private_key: RsaPrivateKey,
    public_key_blob: Vec<u8>,
    comment: String,
    fingerprint: Fingerprint,
}

impl RsaIdentity {
    pub fn from_wire_fields(fields: &RsaKeyFields, comment: String) -> Result<Self> {
        let n = BigUint::from_bytes_be(&fields.n);
        let e = BigUint::from_bytes_be(&fields.e);
        let d = BigUint::from_bytes_be(&fields.d);
        let p = BigUint::from_bytes_be(&fields.p);
        let q = BigUint::from_bytes_be(&fields.q);
        let wire_iqmp = BigUint::from_bytes_be(&fields.iqmp);

        if !iqmp_satisfies_congruence(&p, &q, &wire_iqmp) {
            tracing::warn!(
                comment = %comment,
                "ADD_IDENTITY: wire-supplied iqmp does not satisfy q * iqmp == 1 (mod p); \
                 proceeding with CRT parameters recomputed from p and q"
            );
        }

        let private_key = RsaPrivateKey::from_components(n, e, d, vec![p, q])
            .map_err(|e| AgentError::Protocol(format!("invalid RSA key material: {e}")))?;
        private_key
            .validate()
            .map_err(|e| AgentError::Protocol(format!("RSA key failed validation: {e}")))?;

        let public_key_blob = encode_public_key_blob(&private_key);
        let fingerprint = Fingerprint::of_blob(&public_key_blob);

        Ok(RsaIdentity {
            private_key,
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

    /// Sign `data` with the hash selected by `flags`. Any flag value other
    /// than 0, `FLAG_SHA2_256`, or `FLAG_SHA2_512` is refused.
    pub fn sign(&self, data: &[u8], flags: u32) -> Result<Vec<u8>> {
        let (algo_tag, raw_sig) = match flags {
            0 => {
                let digest = Sha1::digest(data);
                let sig = self
                    .private_key
                    .sign(Pkcs1v15Sign::new::<Sha1>(), &digest)
                    .map_err(|e| AgentError::Protocol(format!("RSA SHA-1 signing failed: {e}")))?;
                ("ssh-rsa", sig)
            }
            FLAG_SHA2_256 => {
                let digest = Sha256::digest(data);
                let sig = self
                    .private_key
                    .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
                    .map_err(|e| AgentError::Protocol(format!("RSA SHA-256 signing failed: {e}")))?;
                ("rsa-sha2-256", sig)
            }
            FLAG_SHA2_512 => {
                let digest = Sha512::digest(data);
                let sig = self
                    .private_key
                    .sign(Pkcs1v15Sign::new::<Sha512>(), &digest)
                    .map_err(|e| AgentError::Protocol(format!("RSA SHA-512 signing failed: {e}")))?;
                ("rsa-sha2-512", sig)
            }
            other => {
                return Err(AgentError::Protocol(format!(
                    "unsupported RSA sign flags: {other:#x}"
                )))
            }
        };

        let mut out = Vec::new();
        write_utf8(&mut out, algo_tag).map_err(AgentError::Transport)?;
        write_string(&mut out, &raw_sig).map_err(AgentError::Transport)?;
        Ok(out)
    }
}

impl Drop for RsaIdentity {
    fn drop(&mut self) {
        // `RsaPrivateKey` zeroizes its own buffers on drop; nothing further
        // to scrub here beyond the blob and comment, which aren't secret.
    }
}

fn encode_public_key_blob(key: &RsaPrivateKey) -> Vec<u8> {
    let mut blob = Vec::new();
    write_utf8(&mut blob, "ssh-rsa").expect("in-memory write");
    write_mpint(&mut blob, &key.e().to_bytes_be()).expect("in-memory write");
    write_mpint(&mut blob, &key.n().to_bytes_be()).expect("in-memory write");
    blob
}

/// Check the defining property of the CRT coefficient (`q * iqmp == 1 mod
/// p`) rather than recomputing a modular inverse from scratch; equivalent
/// for validation purposes and avoids pulling in a second bignum API.
fn iqmp_satisfies_congruence(p: &BigUint, q: &BigUint, iqmp: &BigUint) -> bool {
    if p == &BigUint::from(0u32) {
        return false;
    }
    (iqmp * q) % p == BigUint::from(1u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key_fields() -> RsaKeyFields {
        use rand_core::OsRng;
        let key = RsaPrivateKey::new(&mut OsRng, 1024).expect("generate test RSA key");
        let primes = key.primes();
        RsaKeyFields {
            n: key.n().to_bytes_be(),
            e: key.e().to_bytes_be(),
            d: key.d().to_bytes_be(),
            iqmp: vec![],
            p: primes[0].to_bytes_be(),
            q: primes[1].to_bytes_be(),
        }
    }

    #[test]
    fn fingerprint_depends_on_public_key_only() {
        let fields = sample_key_fields();
        let identity = RsaIdentity::from_wire_fields(&fields, "k1".into()).unwrap();
        let expected = Fingerprint::of_blob(identity.public_key_blob());
        assert_eq!(identity.fingerprint(), expected);
    }

    #[test]
    fn signs_with_each_supported_flag() {
        let fields = sample_key_fields();
        let identity = RsaIdentity::from_wire_fields(&fields, "k1".into()).unwrap();
        let data = b"authentication challenge bytes";

        for (flags, tag) in [(0u32, "ssh-rsa"), (FLAG_SHA2_256, "rsa-sha2-256"), (FLAG_SHA2_512, "rsa-sha2-512")] {
            let sig_blob = identity.sign(data, flags).unwrap();
            let mut cur = std::io::Cursor::new(sig_blob.as_slice());
            let got_tag = crate::wire::mpint::read_utf8(&mut cur).unwrap();
            assert_eq!(got_tag, tag);
            let raw_sig = crate::wire::mpint::read_string(&mut cur).unwrap();
            assert!(!raw_sig.is_empty());
        }
    }

    #[test]
    fn rejects_unsupported_flag_combination() {
        let fields = sample_key_fields();
        let identity = RsaIdentity::from_wire_fields(&fields, "k1".into()).unwrap();
        let err = identity.sign(b"data", 0x06).unwrap_err();
        assert!(matches!(err, AgentError::Protocol(_)));
    }

    #[test]
    fn accepts_a_mismatched_iqmp_without_failing() {
        let mut fields = sample_key_fields();
        fields.iqmp = vec![0x01]; // almost certainly wrong for this p, q
        assert!(RsaIdentity::from_wire_fields(&fields, "k1".into()).is_ok());
    }
}
