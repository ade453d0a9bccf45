//! KEL (Key Event Log) event builders and the shared `Serder` wrapper.

pub mod incept;
pub mod interact;
pub mod rotate;
pub mod serder;

pub use serder::Serder;

use serde_json::{Map, Value};

/// Witness receipt threshold default: `max(1, ceil(n/2))`.
pub fn ample(n: usize) -> u32 {
    if n == 0 {
        return 0;
    }
    std::cmp::max(1, ((n as f64) / 2.0).ceil() as u32)
}

/// KEL event type labels (the `t` field).
#[allow(dead_code)]
pub mod ilks {
    pub const ICP: &str = "icp";
    pub const ROT: &str = "rot";
    pub const IXN: &str = "ixn";
    pub const DIP: &str = "dip";
    pub const DRT: &str = "drt";
}

/// A seal: a reference to another event or object by SAID, anchored into
/// an `ixn` event's `a` array. The two-field form (`{i, d}`) anchors an
/// object addressed by its own SAID (e.g. a registry's `vcp`); the
/// three-field form (`{i, s, d}`) additionally pins the sequence number of
/// the anchored KEL/TEL event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seal {
    pub i: String,
    pub s: Option<u64>,
    pub d: String,
}

impl Seal {
    /// A seal anchoring an object by SAID alone (e.g. a registry inception).
    pub fn object(i: impl Into<String>, d: impl Into<String>) -> Self {
        Self { i: i.into(), s: None, d: d.into() }
    }

    /// A seal anchoring a specific numbered event in another KEL/TEL.
    pub fn event(i: impl Into<String>, s: u64, d: impl Into<String>) -> Self {
        Self { i: i.into(), s: Some(s), d: d.into() }
    }

    pub fn to_json(&self) -> Value {
        let mut m = Map::new();
        m.insert("i".into(), Value::String(self.i.clone()));
        if let Some(sn) = self.s {
            m.insert("s".into(), Value::String(format!("{sn:x}")));
        }
        m.insert("d".into(), Value::String(self.d.clone()));
        Value::Object(m)
    }

    /// Reads a seal back out of a JSON value from an event's `a` array.
    pub fn from_json(v: &Value) -> Option<Self> {
        let i = v.get("i")?.as_str()?.to_string();
        let d = v.get("d")?.as_str()?.to_string();
        let s = match v.get("s") {
            Some(Value::String(s)) => Some(u64::from_str_radix(s, 16).ok()?),
            _ => None,
        };
        Some(Self { i, s, d })
    }
}
