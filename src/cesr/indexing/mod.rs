//! Indexed signature primitives: signatures tagged with the position of the
//! signing key within an identifier's current key list, so a verifier can
//! match each attached signature to the verifier key it must check.
//!
//! Some codes also carry a second, "other" index (`ondex`): the position
//! the same key's digest occupies in the *prior* event's next-key-digest
//! list. A rotation's attached signatures use this to prove which
//! pre-rotation commitment each revealed key satisfies, independently of
//! the rotation's own self-declared signing threshold.

pub mod siger;

use crate::cesr::{b64_to_int, int_to_b64, HARDS};
use crate::error::{Error, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

/// Indexed-signature derivation codes.
#[allow(dead_code)]
pub mod idr_dex {
    /// Ed25519 signature whose index doubles as its ondex (current and
    /// prior-next positions coincide).
    pub const ED25519_SIG: &str = "A";
    /// Ed25519 signature that carries no ondex at all (current list only,
    /// as for `icp`/`ixn` where there is no prior next-key list to expose).
    pub const ED25519_CRT_SIG: &str = "B";
    /// Ed25519 signature with a distinct index and ondex.
    pub const ED25519_BIG_SIG: &str = "2A";
}

/// Codes whose ondex, when not explicitly given, defaults to the index
/// (the two coincide unless overridden with a genuinely different value).
const IDX_BTH_SIG_DEX: &[&str] = &[idr_dex::ED25519_SIG, idr_dex::ED25519_BIG_SIG];
/// Codes that never carry an ondex.
const IDX_CRT_SIG_DEX: &[&str] = &[idr_dex::ED25519_CRT_SIG];

/// Indexed-code sizage: like [`crate::cesr::Sizage`] but with an added
/// `os`, the number of the soft part's characters given over to the
/// ondex (the remaining `ss - os` encode the index).
#[derive(Debug, Clone, Copy)]
struct Xizage {
    hs: usize,
    ss: usize,
    os: usize,
    fs: Option<usize>,
    ls: usize,
}

fn sizes_for(code: &str) -> Result<Xizage> {
    match code {
        idr_dex::ED25519_SIG | idr_dex::ED25519_CRT_SIG => {
            Ok(Xizage { hs: 1, ss: 1, os: 0, fs: Some(88), ls: 0 })
        }
        idr_dex::ED25519_BIG_SIG => Ok(Xizage { hs: 2, ss: 4, os: 2, fs: Some(92), ls: 0 }),
        _ => Err(Error::InvalidCode(format!("unknown indexer code: {code}"))),
    }
}

/// Full qb64 character length of the indexed-signature code that opens
/// `qb64`, without decoding the rest — used to split a group of
/// variable-width indexed signatures (`A`/`B` at 88 chars, `2A` at 92).
pub fn peek_fs(qb64: &str) -> Result<usize> {
    let first = qb64.chars().next().ok_or_else(|| Error::Codec("empty indexed material".into()))?;
    let hs = *HARDS.get(&first).ok_or_else(|| Error::InvalidCode(format!("unknown hard code char: {first}")))?;
    if qb64.len() < hs {
        return Err(Error::InsufficientMaterial(hs - qb64.len()));
    }
    let sizes = sizes_for(&qb64[..hs])?;
    sizes.fs.ok_or_else(|| Error::InvalidCode(format!("code {} is not fixed size", &qb64[..hs])))
}

/// Trait for indexed-signature `Matter`-like primitives.
pub trait Indexer {
    fn code(&self) -> &str;
    fn raw(&self) -> &[u8];
    fn index(&self) -> usize;
    /// The "other" index: the position in the prior event's next-key
    /// digest list this signature's key satisfies. `None` for codes that
    /// don't carry one (current-list-only signatures).
    fn ondex(&self) -> Option<usize>;
    fn qb64(&self) -> String {
        String::from_utf8(self.qb64b()).expect("qb64 is always valid utf8")
    }
    fn qb64b(&self) -> Vec<u8>;
}

/// Shared implementation backing [`siger::Siger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseIndexer {
    code: String,
    raw: Vec<u8>,
    index: usize,
    ondex: Option<usize>,
}

impl BaseIndexer {
    pub fn new(raw: &[u8], code: &str, index: usize, ondex: Option<usize>) -> Result<Self> {
        let sizes = sizes_for(code)?;
        let cs = sizes.hs + sizes.ss;
        let ms = sizes.ss.saturating_sub(sizes.os);
        let max_index = 64usize.saturating_pow(ms as u32).saturating_sub(1);
        if index > max_index {
            return Err(Error::Codec(format!("index {index} exceeds range for code {code}")));
        }

        let ondex = if IDX_CRT_SIG_DEX.contains(&code) {
            if ondex.is_some() {
                return Err(Error::Codec(format!("code {code} does not carry an ondex")));
            }
            None
        } else if IDX_BTH_SIG_DEX.contains(&code) {
            match ondex {
                None => Some(index),
                Some(on) => {
                    if sizes.os == 0 && on != index {
                        return Err(Error::Codec(format!(
                            "ondex {on} must equal index {index} for single-digit code {code}"
                        )));
                    }
                    let max_ondex = 64usize.saturating_pow(sizes.os as u32).saturating_sub(1);
                    if sizes.os != 0 && on > max_ondex {
                        return Err(Error::Codec(format!("ondex {on} exceeds range for code {code}")));
                    }
                    Some(on)
                }
            }
        } else {
            None
        };

        let fs = sizes.fs.expect("all supported indexer codes are fixed size");
        let expected_raw = raw_size(fs, cs, sizes.ls);
        if raw.len() != expected_raw {
            return Err(Error::InvalidRawSize {
                code: code.to_string(),
                expected: expected_raw,
                actual: raw.len(),
            });
        }
        Ok(Self { code: code.to_string(), raw: raw.to_vec(), index, ondex })
    }

    pub fn from_qb64(qb64: &str) -> Result<Self> {
        let bytes = qb64.as_bytes();
        if bytes.is_empty() {
            return Err(Error::Codec("empty indexed material".into()));
        }
        let first = qb64.chars().next().expect("checked non-empty above");
        let hs = *HARDS.get(&first).ok_or_else(|| Error::InvalidCode(format!("unknown hard code char: {first}")))?;
        if qb64.len() < hs {
            return Err(Error::InsufficientMaterial(hs - qb64.len()));
        }
        let hard = &qb64[..hs];
        let sizes = sizes_for(hard)?;
        let cs = sizes.hs + sizes.ss;
        if bytes.len() < cs {
            return Err(Error::InsufficientMaterial(cs - bytes.len()));
        }
        let soft = &qb64[hs..cs];
        let ms = sizes.ss - sizes.os;
        let index = b64_to_int(&soft[..ms])?;
        let ondex = if sizes.os > 0 {
            Some(b64_to_int(&soft[ms..])?)
        } else if IDX_BTH_SIG_DEX.contains(&hard) {
            Some(index)
        } else {
            None
        };
        let fs = sizes.fs.expect("all supported indexer codes are fixed size");
        if bytes.len() < fs {
            return Err(Error::InsufficientMaterial(fs - bytes.len()));
        }

        let ps = cs % 4;
        let mut base = vec![b'A'; ps];
        base.extend_from_slice(&bytes[cs..fs]);
        let paw = URL_SAFE_NO_PAD.decode(&base)?;
        let raw = paw[ps.min(paw.len())..].to_vec();

        Ok(Self { code: hard.to_string(), raw, index, ondex })
    }
}

fn raw_size(fs: usize, cs: usize, ls: usize) -> usize {
    let ps = cs % 4;
    ((fs - cs + ps) * 3) / 4 - ls - ps
}

impl Indexer for BaseIndexer {
    fn code(&self) -> &str {
        &self.code
    }
    fn raw(&self) -> &[u8] {
        &self.raw
    }
    fn index(&self) -> usize {
        self.index
    }
    fn ondex(&self) -> Option<usize> {
        self.ondex
    }
    fn qb64b(&self) -> Vec<u8> {
        let sizes = sizes_for(&self.code).expect("code already validated");
        let cs = sizes.hs + sizes.ss;
        let ps = cs % 4;
        let mut padded = vec![0u8; ps];
        padded.extend_from_slice(&self.raw);
        let encoded = URL_SAFE_NO_PAD.encode(&padded);
        let trimmed = &encoded.as_bytes()[ps..];

        let ms = sizes.ss - sizes.os;
        let mut out = self.code.as_bytes().to_vec();
        out.extend_from_slice(int_to_b64(self.index, ms).as_bytes());
        if sizes.os > 0 {
            out.extend_from_slice(int_to_b64(self.ondex.unwrap_or(self.index), sizes.os).as_bytes());
        }
        out.extend_from_slice(trimmed);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_index() {
        let sig = [9u8; 64];
        let bi = BaseIndexer::new(&sig, idr_dex::ED25519_SIG, 5, None).unwrap();
        let qb64 = bi.qb64();
        assert_eq!(qb64.len(), 88);
        let back = BaseIndexer::from_qb64(&qb64).unwrap();
        assert_eq!(back.index(), 5);
        assert_eq!(back.ondex(), Some(5));
        assert_eq!(back.raw(), sig);
    }

    #[test]
    fn rejects_out_of_range_index() {
        let sig = [9u8; 64];
        assert!(BaseIndexer::new(&sig, idr_dex::ED25519_SIG, 64, None).is_err());
    }

    #[test]
    fn crt_code_never_carries_an_ondex() {
        let sig = [9u8; 64];
        let bi = BaseIndexer::new(&sig, idr_dex::ED25519_CRT_SIG, 2, None).unwrap();
        assert_eq!(bi.ondex(), None);
        assert!(BaseIndexer::new(&sig, idr_dex::ED25519_CRT_SIG, 2, Some(1)).is_err());
    }

    #[test]
    fn dual_indexed_code_round_trips_distinct_ondex() {
        let sig = [9u8; 64];
        let bi = BaseIndexer::new(&sig, idr_dex::ED25519_BIG_SIG, 1, Some(3)).unwrap();
        let qb64 = bi.qb64();
        assert_eq!(qb64.len(), 92);
        let back = BaseIndexer::from_qb64(&qb64).unwrap();
        assert_eq!(back.index(), 1);
        assert_eq!(back.ondex(), Some(3));
        assert_eq!(back.raw(), sig);
    }
}
