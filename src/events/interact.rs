//! Interaction (`ixn`) event builder: a non-establishment event that
//! anchors seals (`a`) without changing key state.

use super::{ilks, Seal, Serder};
use crate::error::{Error, Result};
use crate::version::PROTO_KERI;
use serde_json::{Map, Value};

pub struct InteractEventBuilder {
    pre: String,
    dig: String,
    sn: u64,
    data: Vec<Value>,
}

impl InteractEventBuilder {
    pub fn new(pre: impl Into<String>, dig: impl Into<String>) -> Self {
        Self { pre: pre.into(), dig: dig.into(), sn: 1, data: Vec::new() }
    }

    pub fn with_sn(mut self, sn: u64) -> Self {
        self.sn = sn;
        self
    }

    pub fn with_data(mut self, data: Vec<Value>) -> Self {
        self.data = data;
        self
    }

    /// Anchors `seals` (e.g. a registry inception seal) into this
    /// interaction's `a` array, in addition to any raw `with_data` entries.
    pub fn with_seals(mut self, seals: &[Seal]) -> Self {
        self.data.extend(seals.iter().map(Seal::to_json));
        self
    }

    pub fn build(self) -> Result<Serder> {
        if self.sn == 0 {
            return Err(Error::MalformedEvent("interaction events require sn >= 1".into()));
        }
        let mut ked = Map::new();
        ked.insert("v".into(), Value::String(String::new()));
        ked.insert("t".into(), Value::String(ilks::IXN.into()));
        ked.insert("d".into(), Value::String(String::new()));
        ked.insert("i".into(), Value::String(self.pre));
        ked.insert("s".into(), Value::String(format!("{:x}", self.sn)));
        ked.insert("p".into(), Value::String(self.dig));
        ked.insert("a".into(), Value::Array(self.data));
        Serder::from_ked(ked, PROTO_KERI)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ilks;

    #[test]
    fn builds_interaction_event() {
        let serder = InteractEventBuilder::new("Epre", "Edig").with_sn(1).build().unwrap();
        assert_eq!(serder.ilk(), ilks::IXN);
        assert_eq!(serder.pre(), "Epre");
        assert_eq!(serder.prior(), Some("Edig"));
        assert_eq!(serder.sn().unwrap(), 1);
        assert_eq!(serder.get("a").unwrap().as_array().unwrap().len(), 0);
    }

    #[test]
    fn rejects_zero_sn() {
        assert!(InteractEventBuilder::new("Epre", "Edig").with_sn(0).build().is_err());
    }
}
