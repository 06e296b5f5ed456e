//! Operator challenge-response auth (SPEC_FULL §2 "Operator
//! challenge-response auth"; spec.md §4.3/§6 numerics 740/741).
//!
//! The server RSA-encrypts a random blob with the oper's public key
//! (configured server-side) and streams it base64-encoded across one or
//! more `RPL_RSACHALLENGE2` (740) lines, terminated by
//! `RPL_ENDOFRSACHALLENGE2` (741). The client decrypts with the matching
//! private key and replies `CHALLENGE +<sha1 of the decrypted blob>`.
//! `original_source/opm/ircpresence.py` delegates this to the external
//! `ircchallenge` package; kept here as a trait so the presence doesn't
//! need to know which crypto backend implements it.

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey};
use sha1::{Digest, Sha1};

pub trait OperChallenge: Send {
    /// Append one 740-numeric's base64 fragment.
    fn push(&mut self, fragment: &str);

    /// Decrypt the accumulated fragments and return the `CHALLENGE +...`
    /// response hex digest.
    fn finalise(&mut self) -> anyhow::Result<String>;
}

/// Production implementation backed by an operator's RSA private key file.
pub struct RsaChallenge {
    key: RsaPrivateKey,
    buffer: String,
}

impl RsaChallenge {
    pub fn from_pem(pem: &str) -> anyhow::Result<Self> {
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|_| anyhow::anyhow!("could not parse RSA operator key"))?;
        Ok(Self { key, buffer: String::new() })
    }
}

impl OperChallenge for RsaChallenge {
    fn push(&mut self, fragment: &str) {
        self.buffer.push_str(fragment);
    }

    fn finalise(&mut self) -> anyhow::Result<String> {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;

        let encrypted = STANDARD.decode(self.buffer.as_bytes())?;
        self.buffer.clear();
        let decrypted = self
            .key
            .decrypt(Pkcs1v15Encrypt, &encrypted)
            .map_err(|e| anyhow::anyhow!("RSA challenge decrypt failed: {e}"))?;

        let mut hasher = Sha1::new();
        hasher.update(&decrypted);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fake(Vec<String>);
    impl OperChallenge for Fake {
        fn push(&mut self, fragment: &str) {
            self.0.push(fragment.to_string());
        }
        fn finalise(&mut self) -> anyhow::Result<String> {
            Ok(self.0.join(""))
        }
    }

    #[test]
    fn trait_object_accumulates_fragments_in_order() {
        let mut c: Box<dyn OperChallenge> = Box::new(Fake(Vec::new()));
        c.push("abc");
        c.push("def");
        assert_eq!(c.finalise().unwrap(), "abcdef");
    }
}
