//! CESR stream parsing: splits a raw byte stream into its framed event body
//! and any trailing attachment group, and classifies the event for KEL/TEL
//! indexing.
//!
//! The split never guesses where the JSON body ends by bracket counting —
//! it trusts the `v` field's embedded byte-length, the same way [`crate::said`]
//! computes it. This is the one fact a parser can rely on without first
//! fully decoding the JSON.

use crate::error::{Error, Result};
use crate::events::Serder;
use crate::version::sniff;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// KEL event type labels, duplicated here (rather than imported) because
/// classification only needs the string set, not the builder machinery.
const KEL_ILKS: &[&str] = &["icp", "rot", "ixn", "dip", "drt"];
const TEL_ILKS: &[&str] = &["vcp", "iss", "rev", "ixn"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Kel,
    Tel,
    Acdc,
}

/// Parsed metadata projected from an event's fields, used by the store and
/// indexer without needing to re-walk the full `Serder`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub kind: EventKind,
    pub t: String,
    pub d: String,
    pub i: String,
    pub s: Option<u64>,
    pub p: Option<String>,
    pub ri: Option<String>,
    pub ii: Option<String>,
    pub k: Option<Vec<String>>,
    pub n: Option<Vec<String>>,
    pub kt: Option<Value>,
    pub nt: Option<Value>,
    pub a: Option<Value>,
    pub e: Option<Value>,
    pub dt: Option<String>,
}

pub struct ParsedFrame {
    pub event: Serder,
    pub meta: Meta,
    pub attachments: Option<Vec<u8>>,
}

/// Strips a single leading CESR cold-start `-` framing byte if present
/// (never emitted by this crate's own builders, but accepted on input for
/// interop with streams framed that way).
fn strip_leading_dash(bytes: &[u8]) -> &[u8] {
    if bytes.first() == Some(&b'-') && bytes.get(1) != Some(&b'A') {
        &bytes[1..]
    } else {
        bytes
    }
}

/// Splits `bytes` into the exact serialized event body (as sized by its own
/// `v` field) and whatever remains after it, trimming a single separating
/// `\n` or `\r\n` off the remainder.
pub fn split_frame(bytes: &[u8]) -> Result<(&[u8], &[u8])> {
    let stripped = strip_leading_dash(bytes);
    let sniffed = sniff(stripped)?;
    let body_end = sniffed.version.size;
    if stripped.len() < body_end {
        return Err(Error::MalformedEvent(format!(
            "stream shorter ({}) than declared event size ({body_end})",
            stripped.len()
        )));
    }
    let body = &stripped[..body_end];
    let mut rest = &stripped[body_end..];
    if rest.first() == Some(&b'\r') && rest.get(1) == Some(&b'\n') {
        rest = &rest[2..];
    } else if rest.first() == Some(&b'\n') {
        rest = &rest[1..];
    }
    Ok((body, rest))
}

fn classify(t: &str, has_ri: bool) -> Result<EventKind> {
    if KEL_ILKS.contains(&t) && !has_ri {
        Ok(EventKind::Kel)
    } else if TEL_ILKS.contains(&t) && (has_ri || t == "vcp") {
        Ok(EventKind::Tel)
    } else if t.is_empty() {
        Ok(EventKind::Acdc)
    } else {
        Err(Error::MalformedEvent(format!("unrecognized event type: {t}")))
    }
}

fn string_array(serder: &Serder, field: &str) -> Option<Vec<String>> {
    serder.get(field)?.as_array().map(|a| {
        a.iter().filter_map(|v| v.as_str().map(|s| s.to_string())).collect()
    })
}

/// Parses and SAID-verifies a raw event, splitting off any attachment group
/// and projecting the metadata the store/indexer need.
///
/// `t=""` (no `t` field, as with a bare ACDC) classifies as [`EventKind::Acdc`].
pub fn parse(raw: &[u8]) -> Result<ParsedFrame> {
    let (body, rest) = split_frame(raw)?;
    let sniffed = sniff(body)?;
    let event = Serder::from_raw(body, &sniffed.proto)?;

    let t = event.get("t").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let i = event.get("i").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let ri = event.get("ri").and_then(|v| v.as_str()).map(|s| s.to_string());
    let kind = classify(&t, ri.is_some())?;

    let meta = Meta {
        kind,
        t,
        d: event.said().to_string(),
        i,
        s: event.sn().ok(),
        p: event.prior().map(|s| s.to_string()),
        ri,
        ii: event.get("ii").and_then(|v| v.as_str()).map(|s| s.to_string()),
        k: string_array(&event, "k"),
        n: string_array(&event, "n"),
        kt: event.get("kt").cloned(),
        nt: event.get("nt").cloned(),
        a: event.get("a").cloned(),
        e: event.get("e").cloned(),
        dt: event.get("dt").and_then(|v| v.as_str()).map(|s| s.to_string()),
    };

    Ok(ParsedFrame { event, meta, attachments: if rest.is_empty() { None } else { Some(rest.to_vec()) } })
}
