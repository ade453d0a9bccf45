//! Inception (`icp`/`dip`) event builder: establishes an identifier's first
//! key state and, for the self-addressing form, derives its AID from the
//! event's own SAID.

use super::{ample, ilks, Serder};
use crate::cesr::diger::Diger;
use crate::cesr::tholder::Tholder;
use crate::cesr::verfer::Verfer;
use crate::cesr::Matter;
use crate::error::{Error, Result};
use crate::version::PROTO_KERI;
use serde_json::{Map, Value};
use std::collections::HashSet;

#[derive(Default)]
pub struct InceptionEventBuilder {
    keys: Vec<Verfer>,
    isith: Option<Tholder>,
    ndigs: Vec<Diger>,
    nsith: Option<Tholder>,
    toad: Option<u32>,
    wits: Vec<String>,
    cnfg: Vec<String>,
    data: Vec<Value>,
    delpre: Option<String>,
}

impl InceptionEventBuilder {
    pub fn new() -> Self {
        Self::default()
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

    pub fn with_toad(mut self, toad: u32) -> Self {
        self.toad = Some(toad);
        self
    }

    pub fn with_wits(mut self, wits: Vec<String>) -> Self {
        self.wits = wits;
        self
    }

    pub fn with_cnfg(mut self, cnfg: Vec<String>) -> Self {
        self.cnfg = cnfg;
        self
    }

    pub fn with_data(mut self, data: Vec<Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_delpre(mut self, delpre: String) -> Self {
        self.delpre = Some(delpre);
        self
    }

    pub fn build(self) -> Result<Serder> {
        if self.keys.is_empty() {
            return Err(Error::MalformedEvent("inception requires at least one key".into()));
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

        let mut seen = HashSet::new();
        for w in &self.wits {
            if !seen.insert(w) {
                return Err(Error::MalformedEvent(format!("duplicate witness AID: {w}")));
            }
        }
        let toad = self.toad.unwrap_or_else(|| ample(self.wits.len()));
        if toad as usize > self.wits.len() {
            return Err(Error::MalformedEvent("witness threshold exceeds witness count".into()));
        }

        let ilk = if self.delpre.is_some() { ilks::DIP } else { ilks::ICP };

        let mut ked = Map::new();
        ked.insert("v".into(), Value::String(String::new()));
        ked.insert("t".into(), Value::String(ilk.into()));
        ked.insert("d".into(), Value::String(String::new()));
        ked.insert("i".into(), Value::String(String::new()));
        ked.insert("s".into(), Value::String("0".into()));
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
        ked.insert("b".into(), Value::Array(self.wits.into_iter().map(Value::String).collect()));
        ked.insert("c".into(), Value::Array(self.cnfg.into_iter().map(Value::String).collect()));
        ked.insert("a".into(), Value::Array(self.data));
        if let Some(dp) = &self.delpre {
            ked.insert("di".into(), Value::String(dp.clone()));
        }

        let single_key_prefix = self.keys.len() == 1 && isith.size() == 1 && self.delpre.is_none();

        if single_key_prefix {
            ked.insert("i".into(), Value::String(self.keys[0].qb64()));
            Serder::from_ked(ked, PROTO_KERI)
        } else {
            Serder::from_ked_multi(ked, &["i", "d"], PROTO_KERI)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cesr::signer::Signer;
    use crate::events::ilks;

    #[test]
    fn single_key_non_transferable_prefix_equals_key() {
        let signer = Signer::new_random(false).unwrap();
        let serder = InceptionEventBuilder::new().with_keys(vec![signer.verfer().clone()]).build().unwrap();
        assert_eq!(serder.ilk(), ilks::ICP);
        assert_eq!(serder.pre(), signer.verfer().qb64());
        assert_eq!(serder.sn().unwrap(), 0);
    }

    #[test]
    fn multi_key_is_self_addressing() {
        let a = Signer::new_random(true).unwrap();
        let b = Signer::new_random(true).unwrap();
        let serder = InceptionEventBuilder::new()
            .with_keys(vec![a.verfer().clone(), b.verfer().clone()])
            .build()
            .unwrap();
        assert_eq!(serder.pre(), serder.said());
    }

    #[test]
    fn rejects_threshold_above_key_count() {
        let a = Signer::new_random(true).unwrap();
        let err = InceptionEventBuilder::new()
            .with_keys(vec![a.verfer().clone()])
            .with_isith(Tholder::numeric(2))
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn rejects_unsatisfiable_weighted_threshold() {
        let a = Signer::new_random(true).unwrap();
        let b = Signer::new_random(true).unwrap();
        let err = InceptionEventBuilder::new()
            .with_keys(vec![a.verfer().clone(), b.verfer().clone()])
            .with_isith(Tholder::weighted(vec![vec!["1/3".into(), "1/3".into()]]).unwrap())
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn rejects_duplicate_witnesses() {
        let a = Signer::new_random(true).unwrap();
        let err = InceptionEventBuilder::new()
            .with_keys(vec![a.verfer().clone()])
            .with_wits(vec!["Bwit1".into(), "Bwit1".into()])
            .build();
        assert!(err.is_err());
    }
}
