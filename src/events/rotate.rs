//! Rotation (`rot`/`drt`) event builder: establishes a new current key
//! state by revealing keys committed to by the prior event's `n` digests,
//! and commits to a new next-key digest set for the following rotation.

use super::{ample, ilks, Serder};
use crate::cesr::diger::Diger;
use crate::cesr::tholder::Tholder;
use crate::cesr::verfer::Verfer;
use crate::cesr::Matter;
use crate::error::{Error, Result};
use crate::version::PROTO_KERI;
use serde_json::{Map, Value};
use std::collections::HashSet;

pub struct RotateEventBuilder {
    pre: String,
    dig: String,
    keys: Vec<Verfer>,
    isith: Option<Tholder>,
    ndigs: Vec<Diger>,
    nsith: Option<Tholder>,
    sn: u64,
    ilk: &'static str,
    toad: Option<u32>,
    cuts: Vec<String>,
    adds: Vec<String>,
    data: Vec<Value>,
}

impl RotateEventBuilder {
    pub fn new(pre: impl Into<String>, dig: impl Into<String>) -> Self {
        Self {
            pre: pre.into(),
            dig: dig.into(),
            keys: Vec::new(),
            isith: None,
            ndigs: Vec::new(),
            nsith: None,
            sn: 1,
            ilk: ilks::ROT,
            toad: None,
            cuts: Vec::new(),
            adds: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn with_keys(mut self, keys: Vec<Verfer>) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_isith(mut self, isith: Tholder) -> Self {
        self.isith = Some(isith);
        self
    }

    pub fn with_next_digests(mut self, ndigs: Vec<Diger>) -> Self {
        self.ndigs = ndigs;
        self
    }

    pub fn with_nsith(mut self, nsith: Tholder) -> Self {
        self.nsith = Some(nsith);
        self
    }

    pub fn with_sn(mut self, sn: u64) -> Self {
        self.sn = sn;
        self
    }

    pub fn as_delegated(mut self) -> Self {
        self.ilk = ilks::DRT;
        self
    }

    pub fn with_toad(mut self, toad: u32) -> Self {
        self.toad = Some(toad);
        self
    }

    pub fn with_cuts(mut self, cuts: Vec<String>) -> Self {
        self.cuts = cuts;
        self
    }

    pub fn with_adds(mut self, adds: Vec<String>) -> Self {
        self.adds = adds;
        self
    }

    pub fn with_data(mut self, data: Vec<Value>) -> Self {
        self.data = data;
        self
    }

    pub fn build(self) -> Result<Serder> {
        if self.sn == 0 {
            return Err(Error::MalformedEvent("rotation events require sn >= 1".into()));
        }
        if self.keys.is_empty() {
            return Err(Error::MalformedEvent("rotation requires at least one key".into()));
        }

        let isith = self.isith.unwrap_or_else(|| Tholder::numeric(ample(self.keys.len())));
        isith
            .validate(self.keys.len())
            .map_err(|e| Error::MalformedEvent(format!("signing threshold invalid: {e}")))?;

        let nsith = self.nsith.unwrap_or_else(|| Tholder::numeric(ample(self.ndigs.len())));
        if !self.ndigs.is_empty() {
            nsith
                .validate(self.ndigs.len())
                .map_err(|e| Error::MalformedEvent(format!("next signing threshold invalid: {e}")))?;
        }

        let cut_set: HashSet<&String> = self.cuts.iter().collect();
        let add_set: HashSet<&String> = self.adds.iter().collect();
        if cut_set.len() != self.cuts.len() || add_set.len() != self.adds.len() {
            return Err(Error::MalformedEvent("duplicate witness in cuts/adds".into()));
        }
        if cut_set.intersection(&add_set).next().is_some() {
            return Err(Error::MalformedEvent("witness present in both cuts and adds".into()));
        }

        let toad = self.toad.unwrap_or(0);

        let mut ked = Map::new();
        ked.insert("v".into(), Value::String(String::new()));
        ked.insert("t".into(), Value::String(self.ilk.into()));
        ked.insert("d".into(), Value::String(String::new()));
        ked.insert("i".into(), Value::String(self.pre));
        ked.insert("s".into(), Value::String(format!("{:x}", self.sn)));
        ked.insert("p".into(), Value::String(self.dig));
        ked.insert("kt".into(), isith.to_json());
        ked.insert(
            "k".into(),
            Value::Array(self.keys.iter().map(|k| Value::String(k.qb64())).collect()),
        );
        ked.insert("nt".into(), nsith.to_json());
        ked.insert(
            "n".into(),
            Value::Array(self.ndigs.iter().map(|d| Value::String(d.qb64())).collect()),
        );
        ked.insert("bt".into(), Value::String(format!("{toad:x}")));
        ked.insert("br".into(), Value::Array(self.cuts.into_iter().map(Value::String).collect()));
        ked.insert("ba".into(), Value::Array(self.adds.into_iter().map(Value::String).collect()));
        ked.insert("a".into(), Value::Array(self.data));

        Serder::from_ked(ked, PROTO_KERI)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cesr::signer::Signer;

    #[test]
    fn builds_rotation_event() {
        let signer = Signer::new_random(true).unwrap();
        let serder = RotateEventBuilder::new("Epre", "Edig")
            .with_keys(vec![signer.verfer().clone()])
            .with_sn(1)
            .build()
            .unwrap();
        assert_eq!(serder.ilk(), ilks::ROT);
        assert_eq!(serder.pre(), "Epre");
        assert_eq!(serder.sn().unwrap(), 1);
    }

    #[test]
    fn rejects_overlap_between_cuts_and_adds() {
        let signer = Signer::new_random(true).unwrap();
        let err = RotateEventBuilder::new("Epre", "Edig")
            .with_keys(vec![signer.verfer().clone()])
            .with_cuts(vec!["Bwit1".into()])
            .with_adds(vec!["Bwit1".into()])
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn rejects_sn_zero() {
        let signer = Signer::new_random(true).unwrap();
        let err = RotateEventBuilder::new("Epre", "Edig")
            .with_keys(vec![signer.verfer().clone()])
            .with_sn(0)
            .build();
        assert!(err.is_err());
    }
}
