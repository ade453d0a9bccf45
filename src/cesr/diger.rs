//! `Diger`: a `Matter` subtype whose raw value is a content digest, with a
//! `verify` method that recomputes the digest of a serialization and
//! compares it against `raw`.

use crate::cesr::{mtr_dex, BaseMatter, Matter, DIG_DEX};
use crate::error::{Error, Result};
use blake2::Digest as Blake2Digest;
use sha2::Digest as Sha2Digest;
use sha3::Digest as Sha3Digest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diger {
    base: BaseMatter,
}

impl Diger {
    /// Builds a `Diger` from an already-computed digest `raw` under `code`.
    pub fn new(raw: &[u8], code: &str) -> Result<Self> {
        if !DIG_DEX.contains(&code) {
            return Err(Error::InvalidCode(format!("not a digest code: {code}")));
        }
        Ok(Self { base: BaseMatter::new(raw, code)? })
    }

    /// Digests `ser` under `code` (default Blake3-256) and wraps the result.
    pub fn from_ser(ser: &[u8], code: Option<&str>) -> Result<Self> {
        let code = code.unwrap_or(mtr_dex::BLAKE3_256);
        let raw = digest_bytes(ser, code)?;
        Self::new(&raw, code)
    }

    pub fn from_qb64(qb64: &str) -> Result<Self> {
        let base = BaseMatter::from_qb64(qb64)?;
        if !DIG_DEX.contains(&base.code()) {
            return Err(Error::InvalidCode(format!("not a digest code: {}", base.code())));
        }
        Ok(Self { base })
    }

    /// True when `ser` digests (under this `Diger`'s own code) to `raw`.
    pub fn verify(&self, ser: &[u8]) -> Result<bool> {
        let recomputed = digest_bytes(ser, self.base.code())?;
        Ok(recomputed == self.base.raw())
    }
}

fn digest_bytes(ser: &[u8], code: &str) -> Result<Vec<u8>> {
    let out = match code {
        mtr_dex::BLAKE3_256 => blake3::hash(ser).as_bytes().to_vec(),
        mtr_dex::BLAKE2B_256 => blake2b_256(ser),
        mtr_dex::BLAKE2S_256 => {
            let mut h = blake2::Blake2s256::new();
            h.update(ser);
            h.finalize().to_vec()
        }
        mtr_dex::SHA3_256 => {
            let mut h = sha3::Sha3_256::new();
            h.update(ser);
            h.finalize().to_vec()
        }
        mtr_dex::SHA2_256 => {
            let mut h = sha2::Sha256::new();
            h.update(ser);
            h.finalize().to_vec()
        }
        _ => return Err(Error::InvalidCode(format!("not a digest code: {code}"))),
    };
    Ok(out)
}

// Blake2b-256 is Blake2b truncated to a 32-byte digest via its
// variable-output hasher, which has a slightly different API than the
// fixed-output Digest trait used for the other algorithms here.
fn blake2b_256(ser: &[u8]) -> Vec<u8> {
    use blake2::digest::{Update, VariableOutput};
    let mut hasher = blake2::Blake2bVar::new(32).expect("32 is a valid Blake2b output size");
    hasher.update(ser);
    let mut out = vec![0u8; 32];
    hasher.finalize_variable(&mut out).expect("output buffer matches requested size");
    out
}

impl Matter for Diger {
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
