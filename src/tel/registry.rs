//! TEL event builders: `vcp` (registry inception), `iss`/`rev` (credential
//! issuance/revocation), and nested-registry `ixn` anchors.

use super::ilks;
use crate::error::{Error, Result};
use crate::events::{ample, Serder};
use crate::version::PROTO_KERI;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Builds a registry inception (`vcp`) event. The registry's own prefix is
/// self-addressing, just as a multi-sig KEL inception is.
pub struct RegistryInceptionBuilder {
    issuer_pre: String,
    backers: Vec<String>,
    toad: Option<u32>,
    no_backers: bool,
    est_only: bool,
    parent: Option<String>,
}

impl RegistryInceptionBuilder {
    pub fn new(issuer_pre: impl Into<String>) -> Self {
        Self {
            issuer_pre: issuer_pre.into(),
            backers: Vec::new(),
            toad: None,
            no_backers: false,
            est_only: false,
            parent: None,
        }
    }

    pub fn with_backers(mut self, backers: Vec<String>) -> Self {
        self.backers = backers;
        self
    }

    pub fn with_toad(mut self, toad: u32) -> Self {
        self.toad = Some(toad);
        self
    }

    /// Marks the registry as never using backers (`NB` config flag); no
    /// backer receipts are ever required for issuance/revocation events.
    pub fn no_backers(mut self) -> Self {
        self.no_backers = true;
        self
    }

    /// Nests this registry under `parent_regk`: the built `vcp` carries
    /// `e.parent.n = parent_regk`. The caller is still responsible for
    /// anchoring the child's SAID into the parent TEL with a
    /// [`RegistryInteractionBuilder`] seal and into the issuer KEL with an
    /// interaction event, per the usual registry-anchoring convention.
    pub fn with_parent(mut self, parent_regk: impl Into<String>) -> Self {
        self.parent = Some(parent_regk.into());
        self
    }

    pub fn build(self) -> Result<Serder> {
        let mut seen = HashSet::new();
        for b in &self.backers {
            if !seen.insert(b) {
                return Err(Error::MalformedEvent(format!("duplicate backer AID: {b}")));
            }
        }
        if self.no_backers && !self.backers.is_empty() {
            return Err(Error::MalformedEvent("no_backers registry cannot list backers".into()));
        }
        let toad = self.toad.unwrap_or_else(|| ample(self.backers.len()));

        let mut cnfg = Vec::new();
        if self.no_backers {
            cnfg.push(Value::String("NB".into()));
        }
        if self.est_only {
            cnfg.push(Value::String("EO".into()));
        }

        let mut ked = Map::new();
        ked.insert("v".into(), Value::String(String::new()));
        ked.insert("t".into(), Value::String(ilks::VCP.into()));
        ked.insert("d".into(), Value::String(String::new()));
        ked.insert("i".into(), Value::String(String::new()));
        ked.insert("ii".into(), Value::String(self.issuer_pre));
        ked.insert("s".into(), Value::String("0".into()));
        ked.insert("c".into(), Value::Array(cnfg));
        ked.insert("bt".into(), Value::String(format!("{toad:x}")));
        ked.insert("b".into(), Value::Array(self.backers.into_iter().map(Value::String).collect()));
        if let Some(parent_regk) = self.parent {
            let mut parent = Map::new();
            parent.insert("n".into(), Value::String(parent_regk));
            let mut e = Map::new();
            e.insert("parent".into(), Value::Object(parent));
            ked.insert("e".into(), Value::Object(e));
        }

        Serder::from_ked_multi(ked, &["i", "d"], PROTO_KERI)
    }
}

/// Reads the `e.parent.n` field of a registry inception event, if present,
/// naming the registry this one is nested under.
pub fn parent_registry(vcp: &Serder) -> Option<String> {
    vcp.get("e")?.get("parent")?.get("n")?.as_str().map(|s| s.to_string())
}

/// Builds a credential issuance (`iss`) event.
pub struct IssuanceEventBuilder {
    cred_said: String,
    regk: String,
}

impl IssuanceEventBuilder {
    pub fn new(cred_said: impl Into<String>, regk: impl Into<String>) -> Self {
        Self { cred_said: cred_said.into(), regk: regk.into() }
    }

    pub fn build(self) -> Result<Serder> {
        let mut ked = Map::new();
        ked.insert("v".into(), Value::String(String::new()));
        ked.insert("t".into(), Value::String(ilks::ISS.into()));
        ked.insert("d".into(), Value::String(String::new()));
        ked.insert("i".into(), Value::String(self.cred_said));
        ked.insert("s".into(), Value::String("0".into()));
        ked.insert("ri".into(), Value::String(self.regk));
        Serder::from_ked(ked, PROTO_KERI)
    }
}

/// Builds a credential revocation (`rev`) event.
pub struct RevocationEventBuilder {
    cred_said: String,
    regk: String,
    iss_said: String,
}

impl RevocationEventBuilder {
    pub fn new(cred_said: impl Into<String>, regk: impl Into<String>, iss_said: impl Into<String>) -> Self {
        Self { cred_said: cred_said.into(), regk: regk.into(), iss_said: iss_said.into() }
    }

    pub fn build(self) -> Result<Serder> {
        let mut ked = Map::new();
        ked.insert("v".into(), Value::String(String::new()));
        ked.insert("t".into(), Value::String(ilks::REV.into()));
        ked.insert("d".into(), Value::String(String::new()));
        ked.insert("i".into(), Value::String(self.cred_said));
        ked.insert("s".into(), Value::String("1".into()));
        ked.insert("p".into(), Value::String(self.iss_said));
        ked.insert("ri".into(), Value::String(self.regk));
        Serder::from_ked(ked, PROTO_KERI)
    }
}

/// Builds a registry interaction (`ixn`) event: anchors seals (e.g. a
/// nested child registry's inception SAID) into the parent registry's TEL
/// without altering issuance state.
pub struct RegistryInteractionBuilder {
    regk: String,
    dig: String,
    sn: u64,
    data: Vec<Value>,
}

impl RegistryInteractionBuilder {
    pub fn new(regk: impl Into<String>, dig: impl Into<String>) -> Self {
        Self { regk: regk.into(), dig: dig.into(), sn: 1, data: Vec::new() }
    }

    pub fn with_sn(mut self, sn: u64) -> Self {
        self.sn = sn;
        self
    }

    pub fn with_data(mut self, data: Vec<Value>) -> Self {
        self.data = data;
        self
    }

    /// Anchors `seals` into this registry interaction's `a` array — the
    /// usual case being a child registry's `{i, d}` inception seal.
    pub fn with_seals(mut self, seals: &[crate::events::Seal]) -> Self {
        self.data.extend(seals.iter().map(crate::events::Seal::to_json));
        self
    }

    pub fn build(self) -> Result<Serder> {
        if self.sn == 0 {
            return Err(Error::MalformedEvent("registry interaction events require sn >= 1".into()));
        }
        let mut ked = Map::new();
        ked.insert("v".into(), Value::String(String::new()));
        ked.insert("t".into(), Value::String(ilks::IXN.into()));
        ked.insert("d".into(), Value::String(String::new()));
        ked.insert("i".into(), Value::String(self.regk.clone()));
        ked.insert("s".into(), Value::String(format!("{:x}", self.sn)));
        ked.insert("p".into(), Value::String(self.dig));
        // Self-referencing `ri` disambiguates a TEL ixn from a KEL ixn by
        // event shape alone, without needing to know which log `i` belongs to.
        ked.insert("ri".into(), Value::String(self.regk));
        ked.insert("a".into(), Value::Array(self.data));
        Serder::from_ked(ked, PROTO_KERI)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_inception_is_self_addressing() {
        let serder = RegistryInceptionBuilder::new("Eissuer").no_backers().build().unwrap();
        assert_eq!(serder.pre(), serder.said());
        assert_eq!(serder.ilk(), ilks::VCP);
    }

    #[test]
    fn issuance_and_revocation_chain_by_credential_said() {
        let reg = RegistryInceptionBuilder::new("Eissuer").no_backers().build().unwrap();
        let iss = IssuanceEventBuilder::new("Ecred", reg.pre()).build().unwrap();
        assert_eq!(iss.pre(), "Ecred");
        assert_eq!(iss.get("ri").unwrap().as_str().unwrap(), reg.pre());

        let rev = RevocationEventBuilder::new("Ecred", reg.pre(), iss.said()).build().unwrap();
        assert_eq!(rev.prior(), Some(iss.said()));
        assert_eq!(rev.sn().unwrap(), 1);
    }

    #[test]
    fn nested_registry_carries_parent_link() {
        let parent = RegistryInceptionBuilder::new("Eissuer").no_backers().build().unwrap();
        let child = RegistryInceptionBuilder::new("Eissuer")
            .no_backers()
            .with_parent(parent.pre())
            .build()
            .unwrap();
        assert_eq!(parent_registry(&child).as_deref(), Some(parent.pre()));
        assert_eq!(parent_registry(&parent), None);
    }

    #[test]
    fn rejects_duplicate_backers() {
        let err = RegistryInceptionBuilder::new("Eissuer")
            .with_backers(vec!["Ebacker".into(), "Ebacker".into()])
            .build();
        assert!(err.is_err());
    }
}
