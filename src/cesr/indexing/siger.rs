//! `Siger`: an indexed Ed25519 signature, carrying the position of its
//! signing key within the current key list of the identifier it signs for
//! and, for rotation events, the position of that same key's digest in the
//! prior event's next-key-digest list.

use super::{idr_dex, BaseIndexer, Indexer};
use crate::cesr::verfer::Verfer;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct Siger {
    base: BaseIndexer,
    verfer: Option<Verfer>,
}

impl Siger {
    /// `ondex` is the signing key's position in the prior event's `n`
    /// digest list; pass `None` for non-rotation events, where there is no
    /// prior next-key list to expose. The derivation code is chosen to fit:
    /// no ondex selects the current-only code, a coinciding ondex selects
    /// the compact single-digit code, and a distinct ondex selects the
    /// dual-indexed code.
    pub fn new(raw: &[u8], index: usize, ondex: Option<usize>) -> Result<Self> {
        let code = match ondex {
            None => idr_dex::ED25519_CRT_SIG,
            Some(on) if on == index => idr_dex::ED25519_SIG,
            Some(_) => idr_dex::ED25519_BIG_SIG,
        };
        Ok(Self { base: BaseIndexer::new(raw, code, index, ondex)?, verfer: None })
    }

    pub fn from_qb64(qb64: &str) -> Result<Self> {
        Ok(Self { base: BaseIndexer::from_qb64(qb64)?, verfer: None })
    }

    /// Attaches the verifier key this signature should be checked against,
    /// resolved by the caller from the key state at the signed event's `sn`.
    pub fn with_verfer(mut self, verfer: Verfer) -> Self {
        self.verfer = Some(verfer);
        self
    }

    pub fn verfer(&self) -> Option<&Verfer> {
        self.verfer.as_ref()
    }

    pub fn verify(&self, ser: &[u8]) -> Result<bool> {
        match &self.verfer {
            Some(v) => v.verify(self.base.raw(), ser),
            None => Err(crate::error::Error::SignatureInvalid(
                "siger has no resolved verfer to check against".into(),
            )),
        }
    }
}

impl Indexer for Siger {
    fn code(&self) -> &str {
        self.base.code()
    }
    fn raw(&self) -> &[u8] {
        self.base.raw()
    }
    fn index(&self) -> usize {
        self.base.index()
    }
    fn ondex(&self) -> Option<usize> {
        self.base.ondex()
    }
    fn qb64b(&self) -> Vec<u8> {
        self.base.qb64b()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cesr::signer::Signer;

    #[test]
    fn indexed_signature_round_trips() {
        let signer = Signer::new_random(true).unwrap();
        let siger = signer.sign_indexed(b"event", 3, None).unwrap();
        let back = Siger::from_qb64(&siger.qb64()).unwrap();
        assert_eq!(back.index(), 3);
        assert_eq!(back.ondex(), None);
        assert_eq!(back.raw(), siger.raw());
    }

    #[test]
    fn verifies_against_attached_verfer() {
        let signer = Signer::new_random(true).unwrap();
        let siger = signer
            .sign_indexed(b"event", 0, None)
            .unwrap()
            .with_verfer(signer.verfer().clone());
        assert!(siger.verify(b"event").unwrap());
    }

    #[test]
    fn coinciding_ondex_uses_compact_code_and_round_trips() {
        let signer = Signer::new_random(true).unwrap();
        let siger = signer.sign_indexed(b"event", 2, Some(2)).unwrap();
        assert_eq!(siger.code(), idr_dex::ED25519_SIG);
        let back = Siger::from_qb64(&siger.qb64()).unwrap();
        assert_eq!(back.index(), 2);
        assert_eq!(back.ondex(), Some(2));
    }

    #[test]
    fn distinct_ondex_uses_dual_code_and_round_trips() {
        let signer = Signer::new_random(true).unwrap();
        let siger = signer.sign_indexed(b"event", 0, Some(4)).unwrap();
        assert_eq!(siger.code(), idr_dex::ED25519_BIG_SIG);
        let back = Siger::from_qb64(&siger.qb64()).unwrap();
        assert_eq!(back.index(), 0);
        assert_eq!(back.ondex(), Some(4));
    }
}
