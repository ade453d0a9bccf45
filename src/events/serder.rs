//! `Serder`: a parsed/self-addressed event, pairing the in-memory JSON map
//! with the exact canonical bytes it was (or would be) serialized to.
//!
//! Every KEL, TEL, and ACDC structure in this crate resolves to a `Serder`:
//! construction from field values computes `v` and `d` (and for
//! self-addressing KEL inception events, `i`) in one pass; parsing from raw
//! bytes re-derives `d` and checks it against the embedded value, so a
//! `Serder` that exists has already been SAID-verified.

use crate::error::{Error, Result};
use crate::said::{saidify_versioned, saidify_versioned_multi, verify_said, DEFAULT_SAID_CODE};
use crate::version::{parse_version_string, Kind};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Serder {
    ked: Map<String, Value>,
    raw: Vec<u8>,
}

impl Serder {
    /// Builds a `Serder` from field values, computing `v` and `d` (a single
    /// SAID label).
    pub fn from_ked(mut ked: Map<String, Value>, proto: &str) -> Result<Self> {
        let (_said, raw) = saidify_versioned(&mut ked, "d", DEFAULT_SAID_CODE, proto, 1, 0, Kind::Json)?;
        Ok(Self { ked, raw })
    }

    /// Builds a `Serder` stamping the same computed SAID into every label
    /// in `labels` (self-addressing KEL inception events set both `i` and
    /// `d` this way).
    pub fn from_ked_multi(mut ked: Map<String, Value>, labels: &[&str], proto: &str) -> Result<Self> {
        let (_said, raw) =
            saidify_versioned_multi(&mut ked, labels, DEFAULT_SAID_CODE, proto, 1, 0, Kind::Json)?;
        Ok(Self { ked, raw })
    }

    /// Parses and SAID-verifies a raw serialized event.
    pub fn from_raw(raw: &[u8], proto: &str) -> Result<Self> {
        let value: Value = serde_json::from_slice(raw)?;
        let ked = value
            .as_object()
            .ok_or_else(|| Error::MalformedEvent("event is not a JSON object".into()))?
            .clone();

        let v = ked
            .get("v")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::MalformedEvent("missing version string".into()))?;
        let parsed = parse_version_string(proto, v)?;
        if parsed.size != raw.len() {
            return Err(Error::MalformedEvent(format!(
                "version string size {} does not match raw length {}",
                parsed.size,
                raw.len()
            )));
        }

        if !verify_said(&Value::Object(ked.clone()), "d")? {
            return Err(Error::SaidMismatch {
                expected: ked.get("d").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                computed: "recomputed digest did not match".to_string(),
            });
        }

        Ok(Self { ked, raw: raw.to_vec() })
    }

    pub fn ked(&self) -> &Map<String, Value> {
        &self.ked
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn said(&self) -> &str {
        self.ked.get("d").and_then(|v| v.as_str()).unwrap_or_default()
    }

    pub fn pre(&self) -> &str {
        self.ked.get("i").and_then(|v| v.as_str()).unwrap_or_default()
    }

    pub fn ilk(&self) -> &str {
        self.ked.get("t").and_then(|v| v.as_str()).unwrap_or_default()
    }

    pub fn sn(&self) -> Result<u64> {
        let s = self
            .ked
            .get("s")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::MalformedEvent("missing sequence number".into()))?;
        u64::from_str_radix(s, 16).map_err(|_| Error::MalformedEvent(format!("bad sequence number: {s}")))
    }

    pub fn prior(&self) -> Option<&str> {
        self.ked.get("p").and_then(|v| v.as_str())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.ked.get(field)
    }
}

pub fn hex_sn(sn: u64) -> String {
    format!("{sn:x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::PROTO_KERI;
    use serde_json::json;

    #[test]
    fn round_trips_through_raw() {
        let ked = json!({
            "v": "",
            "t": "icn",
            "d": "",
            "i": "some-prefix",
            "s": "0",
        })
        .as_object()
        .unwrap()
        .clone();
        let serder = Serder::from_ked(ked, PROTO_KERI).unwrap();
        let back = Serder::from_raw(serder.raw(), PROTO_KERI).unwrap();
        assert_eq!(back.said(), serder.said());
        assert_eq!(back.sn().unwrap(), 0);
    }

    #[test]
    fn detects_tampered_raw() {
        let ked = json!({"v": "", "t": "icn", "d": "", "i": "p", "s": "0"})
            .as_object()
            .unwrap()
            .clone();
        let serder = Serder::from_ked(ked, PROTO_KERI).unwrap();
        let mut tampered = serder.raw().to_vec();
        let last = tampered.len() - 2;
        tampered[last] ^= 0xff;
        assert!(Serder::from_raw(&tampered, PROTO_KERI).is_err());
    }
}
