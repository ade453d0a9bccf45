//! `Verfer`: a `Matter` subtype wrapping an Ed25519 public key, with a
//! `verify` method that checks a raw signature against a serialization.

use crate::cesr::{mtr_dex, BaseMatter, Matter, VERFER_DEX};
use crate::error::{Error, Result};
use sodiumoxide::crypto::sign::ed25519;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verfer {
    base: BaseMatter,
}

impl Verfer {
    /// Wraps a raw 32-byte Ed25519 public key. `transferable=false` selects
    /// the non-transferable code (`ED25519N`, used for witness and
    /// non-transferable AID prefixes); `true` selects the transferable
    /// signing-key code (`ED25519`).
    pub fn new(raw: &[u8], transferable: bool) -> Result<Self> {
        let code = if transferable { mtr_dex::ED25519 } else { mtr_dex::ED25519N };
        Ok(Self { base: BaseMatter::new(raw, code)? })
    }

    pub fn from_qb64(qb64: &str) -> Result<Self> {
        let base = BaseMatter::from_qb64(qb64)?;
        if !VERFER_DEX.contains(&base.code()) {
            return Err(Error::InvalidCode(format!("not a verifier code: {}", base.code())));
        }
        Ok(Self { base })
    }

    pub fn is_transferable(&self) -> bool {
        Matter::is_transferable(self)
    }

    /// Verifies a detached raw Ed25519 signature over `ser`.
    pub fn verify(&self, sig: &[u8], ser: &[u8]) -> Result<bool> {
        let key = ed25519::PublicKey::from_slice(self.base.raw())
            .ok_or_else(|| Error::SignatureInvalid("malformed verifier key".into()))?;
        let sig = ed25519::Signature::from_bytes(sig)
            .map_err(|_| Error::SignatureInvalid("malformed signature bytes".into()))?;
        Ok(ed25519::verify_detached(&sig, ser, &key))
    }
}

impl Matter for Verfer {
    fn code(&self) -> &str {
        self.base.code()
    }
    fn raw(&self) -> &[u8] {
        self.base.raw()
    }
    fn qb64b(&self) -> Vec<u8> {
        self.base.qb64b()
    }
    fn qb2(&self) -> Vec<u8> {
        self.base.qb2()
    }
}
