//! SAID (Self-Addressing IDentifier) computation: a digest embedded in its
//! own content. The labeled field is first filled with a same-length
//! placeholder of `#` characters, the structure is serialized to canonical
//! (insertion-ordered, whitespace-free) JSON, a digest of that serialization
//! is computed, and the placeholder is replaced with the digest's qb64.
//! Because the placeholder and the eventual SAID have identical length,
//! this single substitution never perturbs any size-dependent field.

use crate::cesr::diger::Diger;
use crate::cesr::{full_size, BaseMatter, Matter};
use crate::error::{Error, Result};
use crate::version::{version_string, Kind, VERSION_FULL_SPAN};
use serde_json::{Map, Value};

/// Default digest code for SAID computation across the core.
pub const DEFAULT_SAID_CODE: &str = crate::cesr::mtr_dex::BLAKE3_256;

fn set_placeholder(obj: &mut Map<String, Value>, label: &str, code: &str) -> Result<()> {
    let fs = full_size(code)?;
    obj.insert(label.to_string(), Value::String("#".repeat(fs)));
    Ok(())
}

/// Computes and embeds the SAID for `label` in `obj` under `code`, mutating
/// `obj` in place and returning the computed SAID qb64.
pub fn saidify(obj: &mut Map<String, Value>, label: &str, code: &str) -> Result<String> {
    set_placeholder(obj, label, code)?;
    let ser = serde_json::to_vec(&Value::Object(obj.clone()))?;
    let digest = Diger::from_ser(&ser, Some(code))?;
    let said = digest.qb64();
    obj.insert(label.to_string(), Value::String(said.clone()));
    Ok(said)
}

/// Computes and embeds both the `v` version-string field and the `label`
/// SAID field, returning the SAID and the final canonical serialization.
/// The version-string size is filled in during the same pass that computes
/// the digest, since the placeholder and final forms of both fields share
/// a fixed width.
pub fn saidify_versioned(
    obj: &mut Map<String, Value>,
    label: &str,
    code: &str,
    proto: &str,
    major: u8,
    minor: u8,
    kind: Kind,
) -> Result<(String, Vec<u8>)> {
    set_placeholder(obj, label, code)?;
    obj.insert("v".to_string(), Value::String("_".repeat(VERSION_FULL_SPAN)));

    let probe = serde_json::to_vec(&Value::Object(obj.clone()))?;
    let size = probe.len();
    let v = version_string(proto, major, minor, kind, size)?;
    obj.insert("v".to_string(), Value::String(v));

    let ser = serde_json::to_vec(&Value::Object(obj.clone()))?;
    if ser.len() != size {
        return Err(Error::MalformedEvent(
            "serialized size changed after fixing version string placeholder".into(),
        ));
    }

    let digest = Diger::from_ser(&ser, Some(code))?;
    let said = digest.qb64();
    obj.insert(label.to_string(), Value::String(said.clone()));

    let final_ser = serde_json::to_vec(&Value::Object(obj.clone()))?;
    Ok((said, final_ser))
}

/// Like [`saidify_versioned`], but stamps the *same* computed SAID into
/// every field named in `labels`. Self-addressing KEL inception events use
/// this to set both `i` (the identifier prefix) and `d` (the event digest)
/// to the identifier's founding SAID.
pub fn saidify_versioned_multi(
    obj: &mut Map<String, Value>,
    labels: &[&str],
    code: &str,
    proto: &str,
    major: u8,
    minor: u8,
    kind: Kind,
) -> Result<(String, Vec<u8>)> {
    for label in labels {
        set_placeholder(obj, label, code)?;
    }
    obj.insert("v".to_string(), Value::String("_".repeat(VERSION_FULL_SPAN)));

    let probe = serde_json::to_vec(&Value::Object(obj.clone()))?;
    let size = probe.len();
    let v = version_string(proto, major, minor, kind, size)?;
    obj.insert("v".to_string(), Value::String(v));

    let ser = serde_json::to_vec(&Value::Object(obj.clone()))?;
    if ser.len() != size {
        return Err(Error::MalformedEvent(
            "serialized size changed after fixing version string placeholder".into(),
        ));
    }

    let digest = Diger::from_ser(&ser, Some(code))?;
    let said = digest.qb64();
    for label in labels {
        obj.insert(label.to_string(), Value::String(said.clone()));
    }

    let final_ser = serde_json::to_vec(&Value::Object(obj.clone()))?;
    Ok((said, final_ser))
}

/// Recomputes the SAID of `obj`'s `label` field and checks it against the
/// value stored there.
pub fn verify_said(obj: &Value, label: &str) -> Result<bool> {
    let map = obj
        .as_object()
        .ok_or_else(|| Error::MalformedEvent("SAID verification requires a JSON object".into()))?;
    let said = map
        .get(label)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::NotFound(format!("missing SAID field: {label}")))?
        .to_string();

    let digest = Diger::from_qb64(&said)?;
    let code = BaseMatter::from_qb64(&said)?.code().to_string();

    let mut clone = map.clone();
    set_placeholder(&mut clone, label, &code)?;
    let ser = serde_json::to_vec(&Value::Object(clone))?;
    digest.verify(&ser)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn saidify_embeds_reproducible_digest() {
        let mut obj = json!({"a": "hello", "b": 1, "d": ""}).as_object().unwrap().clone();
        let said = saidify(&mut obj, "d", DEFAULT_SAID_CODE).unwrap();
        assert_eq!(said.len(), 44);
        let value = Value::Object(obj);
        assert!(verify_said(&value, "d").unwrap());
    }

    #[test]
    fn tampering_breaks_verification() {
        let mut obj = json!({"a": "hello", "d": ""}).as_object().unwrap().clone();
        saidify(&mut obj, "d", DEFAULT_SAID_CODE).unwrap();
        obj.insert("a".to_string(), Value::String("goodbye".to_string()));
        let value = Value::Object(obj);
        assert!(!verify_said(&value, "d").unwrap());
    }

    #[test]
    fn saidify_versioned_has_consistent_size() {
        let mut obj = json!({"v": "", "t": "icp", "d": ""}).as_object().unwrap().clone();
        let (said, ser) = saidify_versioned(
            &mut obj,
            "d",
            DEFAULT_SAID_CODE,
            crate::version::PROTO_KERI,
            1,
            0,
            Kind::Json,
        )
        .unwrap();
        assert_eq!(said.len(), 44);
        assert_eq!(ser.len(), serde_json::to_vec(&obj).unwrap().len());
        let v = obj.get("v").unwrap().as_str().unwrap();
        let parsed = crate::version::parse_version_string(crate::version::PROTO_KERI, v).unwrap();
        assert_eq!(parsed.size, ser.len());
    }
}
