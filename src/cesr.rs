//! CESR (Composable Event Streaming Representation) primitive codec.
//!
//! A `Matter` is a cryptographic value (key, digest, signature, ...) paired
//! with a derivation code. The fully qualified base64 form (`qb64`) is
//! `<code><base64url(raw)>`; the fully qualified binary form (`qb2`) is the
//! same value with the code portion packed into 6-bit sextets instead of
//! base64 characters. Round-tripping through either form must reproduce the
//! exact original `(code, raw)` pair.

pub mod counting;
pub mod diger;
pub mod indexing;
pub mod signer;
pub mod tholder;
pub mod verfer;

use crate::error::{Error, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Derivation codes used throughout the core. Only the subset the spec
/// actually names is given a constant; [`sizes_for`] is the source of truth.
#[allow(dead_code)]
pub mod mtr_dex {
    pub const ED25519_SEED: &str = "A";
    pub const ED25519N: &str = "B";
    pub const X25519: &str = "C";
    pub const ED25519: &str = "D";
    pub const BLAKE3_256: &str = "E";
    pub const BLAKE2B_256: &str = "F";
    pub const BLAKE2S_256: &str = "G";
    pub const SHA3_256: &str = "H";
    pub const SHA2_256: &str = "I";
    pub const ED25519_SIG: &str = "0B";
    pub const ECDSA_256K1_SIG: &str = "0C";
}

/// Digest derivation codes recognized by [`diger`].
pub const DIG_DEX: &[&str] = &[
    mtr_dex::BLAKE3_256,
    mtr_dex::BLAKE2B_256,
    mtr_dex::BLAKE2S_256,
    mtr_dex::SHA3_256,
    mtr_dex::SHA2_256,
];

/// Non-transferable verifier codes.
pub const NON_TRANS_DEX: &[&str] = &[mtr_dex::ED25519N];

/// Codes that may stand as an AID prefix.
pub const PRE_DEX: &[&str] = &[
    mtr_dex::ED25519N,
    mtr_dex::ED25519,
    mtr_dex::BLAKE3_256,
    mtr_dex::BLAKE2B_256,
    mtr_dex::BLAKE2S_256,
    mtr_dex::SHA3_256,
    mtr_dex::SHA2_256,
];

/// Verifier (public key) codes.
pub const VERFER_DEX: &[&str] = &[mtr_dex::ED25519N, mtr_dex::ED25519];

/// Non-indexed signature codes.
pub const SIG_DEX: &[&str] = &[mtr_dex::ED25519_SIG, mtr_dex::ECDSA_256K1_SIG];

/// Code sizage: hard size (`hs`), soft size (`ss`), extra pad chars in the
/// soft part reserved for future size growth (`xs`), full size in
/// characters when fixed (`fs`), and lead pad bytes (`ls`).
#[derive(Debug, Clone, Copy)]
pub struct Sizage {
    pub hs: usize,
    pub ss: usize,
    pub xs: usize,
    pub fs: Option<usize>,
    pub ls: usize,
}

/// Maps the first character of a code to its hard size (`hs`), mirroring
/// KERI's `Hards` table: A-Z/a-z are 1-char codes, '0'-'9' are 2-char codes.
pub static HARDS: Lazy<HashMap<char, usize>> = Lazy::new(|| {
    let mut m = HashMap::new();
    for c in 'A'..='Z' {
        m.insert(c, 1);
    }
    for c in 'a'..='z' {
        m.insert(c, 1);
    }
    for c in '0'..='9' {
        m.insert(c, 2);
    }
    m
});

fn sizes_for(code: &str) -> Result<Sizage> {
    use mtr_dex::*;
    let s = match code {
        ED25519_SEED | ED25519N | ED25519 | X25519 | BLAKE3_256 | BLAKE2B_256 | BLAKE2S_256
        | SHA3_256 | SHA2_256 => Sizage { hs: 1, ss: 0, xs: 0, fs: Some(44), ls: 0 },
        ED25519_SIG | ECDSA_256K1_SIG => Sizage { hs: 2, ss: 0, xs: 0, fs: Some(88), ls: 0 },
        _ => return Err(Error::InvalidCode(format!("unknown code: {code}"))),
    };
    Ok(s)
}

/// Full qb64 character length of a fixed-size code, e.g. 44 for a Blake3-256
/// digest. Used to size SAID placeholders before the digest is known.
pub fn full_size(code: &str) -> Result<usize> {
    let s = sizes_for(code)?;
    s.fs.ok_or_else(|| Error::InvalidCode(format!("code {code} is not fixed size")))
}

fn raw_size(code: &str) -> Result<usize> {
    let s = sizes_for(code)?;
    let fs = s.fs.ok_or_else(|| Error::InvalidCode(format!("variable sized code: {code}")))?;
    let cs = s.hs + s.ss;
    Ok(((fs - cs) * 3) / 4 - s.ls)
}

/// Core trait for all cryptographically typed primitives.
pub trait Matter {
    fn code(&self) -> &str;
    fn raw(&self) -> &[u8];

    fn qb64(&self) -> String {
        String::from_utf8(self.qb64b()).expect("qb64 is always valid utf8")
    }
    fn qb64b(&self) -> Vec<u8>;
    fn qb2(&self) -> Vec<u8>;

    fn is_transferable(&self) -> bool {
        !NON_TRANS_DEX.contains(&self.code())
    }
    fn is_digestive(&self) -> bool {
        DIG_DEX.contains(&self.code())
    }
    fn is_prefixive(&self) -> bool {
        PRE_DEX.contains(&self.code())
    }
}

/// Base implementation of [`Matter`]; specific primitives (`Diger`, `Verfer`,
/// `Cigar`, ...) wrap a `BaseMatter` and add semantic constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseMatter {
    code: String,
    raw: Vec<u8>,
}

impl BaseMatter {
    pub fn new(raw: &[u8], code: &str) -> Result<Self> {
        let sizes = sizes_for(code)?;
        if sizes.fs.is_some() {
            let expected = raw_size(code)?;
            if raw.len() != expected {
                return Err(Error::InvalidRawSize {
                    code: code.to_string(),
                    expected,
                    actual: raw.len(),
                });
            }
        }
        Ok(Self { code: code.to_string(), raw: raw.to_vec() })
    }

    pub fn from_qb64(qb64: &str) -> Result<Self> {
        Self::from_qb64b(qb64.as_bytes())
    }

    pub fn from_qb64b(qb64b: &[u8]) -> Result<Self> {
        if qb64b.is_empty() {
            return Err(Error::Codec("empty material".into()));
        }
        let first = qb64b[0] as char;
        if first == '-' {
            return Err(Error::Codec("unexpected count code while extracting Matter".into()));
        }
        let hs = *HARDS
            .get(&first)
            .ok_or_else(|| Error::InvalidCode(format!("unsupported code start char={first}")))?;
        if qb64b.len() < hs {
            return Err(Error::InsufficientMaterial(hs - qb64b.len()));
        }
        let hard = std::str::from_utf8(&qb64b[..hs])?;
        let sizes = sizes_for(hard)?;
        let ss = sizes.ss;
        let ls = sizes.ls;
        let cs = hs + ss;
        if qb64b.len() < cs {
            return Err(Error::InsufficientMaterial(cs - qb64b.len()));
        }
        let soft = std::str::from_utf8(&qb64b[hs..cs])?;

        let fs = match sizes.fs {
            Some(fs) => fs,
            None => {
                if soft.is_empty() {
                    return Err(Error::Codec("empty soft part for variable sized code".into()));
                }
                let n = b64_to_int(soft)?;
                n * 4 + cs
            }
        };
        if qb64b.len() < fs {
            return Err(Error::InsufficientMaterial(fs - qb64b.len()));
        }

        let ps = cs % 4; // prepad chars needed to reach 24-bit alignment
        let mut base = vec![b'A'; ps];
        base.extend_from_slice(&qb64b[cs..fs]);
        let paw = URL_SAFE_NO_PAD.decode(&base)?;

        if ps + ls > 0 {
            let pad = &paw[..(ps + ls).min(paw.len())];
            if pad.iter().any(|&b| b != 0) {
                let hex: String = pad.iter().map(|b| format!("{b:02x}")).collect();
                return Err(Error::NonZeroMidpad(hex));
            }
        }

        let raw = paw[(ps + ls).min(paw.len())..].to_vec();
        let expected_raw_len = ((fs - cs) * 3) / 4 - ls;
        if raw.len() != expected_raw_len {
            return Err(Error::MisalignedCode(format!(
                "improperly qualified material for code {hard}"
            )));
        }

        Ok(Self { code: hard.to_string(), raw })
    }

    pub fn from_qb2(qb2: &[u8]) -> Result<Self> {
        // qb2 is simply the unpadded base64url decoding of the qb64 text; we
        // recover the same bytes here and hand them to the base64
        // re-encoder, which re-derives code/raw identically to from_qb64.
        let qb64 = URL_SAFE_NO_PAD.encode(qb2);
        Self::from_qb64(&qb64)
    }
}

impl Matter for BaseMatter {
    fn code(&self) -> &str {
        &self.code
    }
    fn raw(&self) -> &[u8] {
        &self.raw
    }
    fn qb64b(&self) -> Vec<u8> {
        infil(&self.code, &self.raw)
    }
    fn qb2(&self) -> Vec<u8> {
        URL_SAFE_NO_PAD
            .decode(pad_for_decode(&self.qb64()))
            .expect("qb64 produced by this codec is always validly padded")
    }
}

/// Encode `code || base64url(lead_pad || raw)`, left-padded so the whole
/// quadlet is 24-bit aligned (`infil` in the reference terminology).
fn infil(code: &str, raw: &[u8]) -> Vec<u8> {
    let sizes = sizes_for(code).expect("code already validated by constructor");
    let hs = sizes.hs;
    let ss = sizes.ss;
    let ls = sizes.ls;
    let cs = hs + ss;
    let rs = raw.len();
    let ps = (3 - ((rs + ls) % 3)) % 3;
    debug_assert_eq!(ps, cs % 4, "code size and raw size disagree on padding");

    let mut padded = vec![0u8; ps + ls];
    padded.extend_from_slice(raw);
    let encoded = URL_SAFE_NO_PAD.encode(&padded);
    let trimmed = &encoded.as_bytes()[ps..];

    let mut out = code.as_bytes().to_vec();
    out.extend_from_slice(trimmed);
    out
}

fn pad_for_decode(qb64: &str) -> String {
    let mut s = qb64.to_string();
    while s.len() % 4 != 0 {
        s.push('A');
    }
    s
}

/// Base64url alphabet value of a character, as used by the soft (size)
/// portion of variable-sized codes.
pub fn b64_char_to_int(c: char) -> Result<usize> {
    let v = match c {
        'A'..='Z' => c as usize - 'A' as usize,
        'a'..='z' => c as usize - 'a' as usize + 26,
        '0'..='9' => c as usize - '0' as usize + 52,
        '-' => 62,
        '_' => 63,
        _ => return Err(Error::Codec(format!("invalid base64 character: {c}"))),
    };
    Ok(v)
}

pub fn b64_to_int(b64: &str) -> Result<usize> {
    let mut n = 0usize;
    for c in b64.chars() {
        n = n * 64 + b64_char_to_int(c)?;
    }
    Ok(n)
}

pub fn int_to_b64(mut n: usize, digits: usize) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
    let mut out = vec![0u8; digits];
    for i in (0..digits).rev() {
        out[i] = ALPHABET[n % 64];
        n /= 64;
    }
    String::from_utf8(out).unwrap()
}
