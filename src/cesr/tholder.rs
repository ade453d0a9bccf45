//! `Tholder`: parses and evaluates a KEL signing threshold (`kt`/`nt`).
//!
//! A threshold is either a plain count of required signatures (`"2"`) or a
//! fractional-weight scheme (`["1/2", "1/2", "1/2"]`, optionally split into
//! multiple clauses `[["1/2", "1/2"], ["1"]]`) where each clause must
//! independently sum its satisfied weights to at least one.

use crate::error::{Error, Result};
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Zero};
use serde_json::Value as Json;

#[derive(Debug, Clone, PartialEq)]
pub enum Threshold {
    Numeric(u32),
    Weighted(Vec<Vec<BigRational>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tholder {
    thold: Threshold,
}

impl Tholder {
    pub fn numeric(n: u32) -> Self {
        Self { thold: Threshold::Numeric(n) }
    }

    pub fn weighted(clauses: Vec<Vec<String>>) -> Result<Self> {
        let mut parsed = Vec::with_capacity(clauses.len());
        for clause in clauses {
            let mut weights = Vec::with_capacity(clause.len());
            for w in clause {
                weights.push(parse_fraction(&w)?);
            }
            if weights.is_empty() {
                return Err(Error::Codec("weighted threshold clause is empty".into()));
            }
            parsed.push(weights);
        }
        if parsed.is_empty() {
            return Err(Error::Codec("weighted threshold has no clauses".into()));
        }
        Ok(Self { thold: Threshold::Weighted(parsed) })
    }

    /// Parses a `kt`/`nt` JSON field: a number, a numeric hex string, a
    /// flat array of fraction strings, or an array of arrays of them.
    pub fn from_json(v: &Json) -> Result<Self> {
        match v {
            Json::Number(n) => {
                let i = n
                    .as_u64()
                    .ok_or_else(|| Error::Codec("threshold number out of range".into()))?;
                Ok(Self::numeric(i as u32))
            }
            Json::String(s) => {
                if let Ok(i) = u32::from_str_radix(s.trim_start_matches("0x"), 16) {
                    Ok(Self::numeric(i))
                } else {
                    Err(Error::Codec(format!("unparseable threshold string: {s}")))
                }
            }
            Json::Array(items) => {
                if items.is_empty() {
                    return Err(Error::Codec("empty threshold array".into()));
                }
                if items.iter().all(|i| i.is_array()) {
                    let mut clauses = Vec::with_capacity(items.len());
                    for clause in items {
                        let mut weights = Vec::new();
                        for w in clause.as_array().unwrap() {
                            weights.push(as_weight_string(w)?);
                        }
                        clauses.push(weights);
                    }
                    Self::weighted(clauses)
                } else {
                    let mut weights = Vec::with_capacity(items.len());
                    for w in items {
                        weights.push(as_weight_string(w)?);
                    }
                    Self::weighted(vec![weights])
                }
            }
            _ => Err(Error::Codec("threshold must be a number, string, or array".into())),
        }
    }

    /// Minimum number of key slots this threshold ranges over (the `isith`
    /// validation against the provided key count uses this).
    pub fn size(&self) -> usize {
        match &self.thold {
            Threshold::Numeric(n) => *n as usize,
            Threshold::Weighted(clauses) => clauses.iter().map(|c| c.len()).sum(),
        }
    }

    /// True when the signatures at `indices` (0-based positions into the
    /// key list) satisfy this threshold.
    pub fn satisfy(&self, indices: &[usize]) -> bool {
        match &self.thold {
            Threshold::Numeric(n) => indices.len() >= *n as usize,
            Threshold::Weighted(clauses) => {
                let satisfied: std::collections::HashSet<usize> = indices.iter().copied().collect();
                let mut offset = 0usize;
                for clause in clauses {
                    let mut sum = BigRational::zero();
                    for (i, w) in clause.iter().enumerate() {
                        if satisfied.contains(&(offset + i)) {
                            sum += w;
                        }
                    }
                    if sum < BigRational::one() {
                        return false;
                    }
                    offset += clause.len();
                }
                true
            }
        }
    }

    /// Serializes back to the JSON shape used in the `kt`/`nt` event field.
    pub fn to_json(&self) -> Json {
        match &self.thold {
            Threshold::Numeric(n) => Json::String(format!("{n:x}")),
            Threshold::Weighted(clauses) => {
                if clauses.len() == 1 {
                    Json::Array(clauses[0].iter().map(fraction_to_json).collect())
                } else {
                    Json::Array(
                        clauses
                            .iter()
                            .map(|c| Json::Array(c.iter().map(fraction_to_json).collect()))
                            .collect(),
                    )
                }
            }
        }
    }

    pub fn thold(&self) -> &Threshold {
        &self.thold
    }

    /// Asserts this threshold is satisfiable against a key list of size
    /// `n`: a numeric threshold must not exceed `n`, and every weighted
    /// clause's fractions must sum to at least one — a clause summing to
    /// less than one can never be satisfied no matter which of its keys
    /// sign, silently producing an unreachable identity/credential.
    pub fn validate(&self, n: usize) -> Result<()> {
        match &self.thold {
            Threshold::Numeric(t) => {
                if *t as usize > n {
                    return Err(Error::Codec(format!("threshold {t} exceeds key count {n}")));
                }
            }
            Threshold::Weighted(clauses) => {
                let total: usize = clauses.iter().map(|c| c.len()).sum();
                if total > n {
                    return Err(Error::Codec(format!("weighted threshold spans {total} keys but only {n} are given")));
                }
                for (i, clause) in clauses.iter().enumerate() {
                    let sum: BigRational = clause.iter().fold(BigRational::zero(), |acc, w| acc + w);
                    if sum < BigRational::one() {
                        return Err(Error::Codec(format!(
                            "weighted threshold clause {i} sums to {sum}, less than the required 1"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

fn as_weight_string(v: &Json) -> Result<String> {
    match v {
        Json::String(s) => Ok(s.clone()),
        Json::Number(n) => Ok(n.to_string()),
        _ => Err(Error::Codec("threshold weight must be a number or string".into())),
    }
}

fn parse_fraction(s: &str) -> Result<BigRational> {
    if let Some((num, den)) = s.split_once('/') {
        let n: BigInt = num
            .parse()
            .map_err(|_| Error::Codec(format!("bad fraction numerator: {s}")))?;
        let d: BigInt = den
            .parse()
            .map_err(|_| Error::Codec(format!("bad fraction denominator: {s}")))?;
        if d.is_zero() {
            return Err(Error::Codec(format!("zero denominator in fraction: {s}")));
        }
        Ok(BigRational::new(n, d))
    } else {
        let n: BigInt = s.parse().map_err(|_| Error::Codec(format!("bad threshold weight: {s}")))?;
        Ok(BigRational::new(n, BigInt::one()))
    }
}

fn fraction_to_json(r: &BigRational) -> Json {
    if r.denom() == &BigInt::one() {
        Json::String(r.numer().to_string())
    } else {
        Json::String(format!("{}/{}", r.numer(), r.denom()))
    }
}
