//! `Signer`: a `Matter` subtype wrapping an Ed25519 private key seed, able to
//! produce a detached signature (`Cigar`) over a serialization. Also defines
//! `Cigar`, the non-indexed signature `Matter`.

use crate::cesr::{mtr_dex, BaseMatter, Matter};
use crate::cesr::verfer::Verfer;
use crate::error::{Error, Result};
use sodiumoxide::crypto::sign::ed25519;

#[derive(Debug, Clone)]
pub struct Signer {
    base: BaseMatter,
    verfer: Verfer,
}

impl Signer {
    /// Derives a `Signer` from a 32-byte Ed25519 seed.
    pub fn new(raw: &[u8], transferable: bool) -> Result<Self> {
        let base = BaseMatter::new(raw, mtr_dex::ED25519_SEED)?;
        let seed = ed25519::Seed::from_slice(raw)
            .ok_or_else(|| Error::Codec("invalid ed25519 seed length".into()))?;
        let (pk, _sk) = ed25519::keypair_from_seed(&seed);
        let verfer = Verfer::new(pk.as_ref(), transferable)?;
        Ok(Self { base, verfer })
    }

    /// Generates a fresh random signing key.
    pub fn new_random(transferable: bool) -> Result<Self> {
        let (_pk, sk) = ed25519::gen_keypair();
        // The seed is the first 32 bytes of the libsodium secret key.
        let seed = &sk.as_ref()[..ed25519::SEEDBYTES];
        Self::new(seed, transferable)
    }

    pub fn verfer(&self) -> &Verfer {
        &self.verfer
    }

    /// Signs `ser`, producing a detached non-indexed signature.
    pub fn sign(&self, ser: &[u8]) -> Result<Cigar> {
        let seed = ed25519::Seed::from_slice(self.base.raw())
            .ok_or_else(|| Error::Codec("invalid ed25519 seed length".into()))?;
        let (_pk, sk) = ed25519::keypair_from_seed(&seed);
        let sig = ed25519::sign_detached(ser, &sk);
        Cigar::new(sig.as_ref(), self.verfer.clone())
    }

    /// Signs `ser`, producing an indexed signature attached to witness/
    /// signer position `index` in a multi-sig group (and optionally a
    /// separate `ondex` for rotated key lists).
    pub fn sign_indexed(
        &self,
        ser: &[u8],
        index: usize,
        ondex: Option<usize>,
    ) -> Result<crate::cesr::indexing::siger::Siger> {
        let seed = ed25519::Seed::from_slice(self.base.raw())
            .ok_or_else(|| Error::Codec("invalid ed25519 seed length".into()))?;
        let (_pk, sk) = ed25519::keypair_from_seed(&seed);
        let sig = ed25519::sign_detached(ser, &sk);
        crate::cesr::indexing::siger::Siger::new(sig.as_ref(), index, ondex)
    }
}

impl Matter for Signer {
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

/// A detached, non-indexed Ed25519 signature paired with the `Verfer` it
/// verifies against.
#[derive(Debug, Clone)]
pub struct Cigar {
    base: BaseMatter,
    verfer: Verfer,
}

impl Cigar {
    pub fn new(raw: &[u8], verfer: Verfer) -> Result<Self> {
        Ok(Self { base: BaseMatter::new(raw, mtr_dex::ED25519_SIG)?, verfer })
    }

    pub fn verfer(&self) -> &Verfer {
        &self.verfer
    }

    pub fn verify(&self, ser: &[u8]) -> Result<bool> {
        self.verfer.verify(self.base.raw(), ser)
    }
}

impl Matter for Cigar {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signs_and_verifies() {
        let signer = Signer::new_random(true).unwrap();
        let cigar = signer.sign(b"message").unwrap();
        assert!(cigar.verify(b"message").unwrap());
        assert!(!cigar.verify(b"tampered").unwrap());
    }

    #[test]
    fn deterministic_from_seed() {
        let seed = [3u8; 32];
        let a = Signer::new(&seed, true).unwrap();
        let b = Signer::new(&seed, true).unwrap();
        assert_eq!(a.verfer().qb64(), b.verfer().qb64());
    }

    #[test]
    fn indexed_signature_carries_index() {
        let signer = Signer::new_random(true).unwrap();
        let siger = signer.sign_indexed(b"message", 2, None).unwrap();
        use crate::cesr::indexing::Indexer;
        assert_eq!(siger.index(), 2);
    }
}
