//! KERI/ACDC version string: `<PROTO><major><minor><KIND><hex6 size>_`.
//!
//! Every top-level event and ACDC carries a `v` field of exactly
//! [`VERSION_FULL_SPAN`] characters. The size field is the serialized byte
//! length of the whole message, which is only known after serialization —
//! so building one is a two-pass process: serialize once with a zeroed
//! size placeholder to learn the length, patch the sizing field, then
//! re-serialize.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

pub const VERSION_RAW_SIZE: usize = 6;
pub const VERSION_FULL_SPAN: usize = 17;
pub const VERSION_TERM: char = '_';

pub const PROTO_KERI: &str = "KERI";
pub const PROTO_ACDC: &str = "ACDC";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Json,
}

impl Kind {
    fn as_str(self) -> &'static str {
        match self {
            Kind::Json => "JSON",
        }
    }
}

static VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<proto>[A-Z]{4})(?P<major>[0-9a-f])(?P<minor>[0-9a-f])(?P<kind>[A-Z]{4})(?P<size>[0-9a-f]{6})_$")
        .expect("static version regex is valid")
});

/// Builds a version string with `size` already known.
pub fn version_string(proto: &str, major: u8, minor: u8, kind: Kind, size: usize) -> Result<String> {
    if proto.len() != 4 || !proto.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(Error::MalformedEvent(format!("invalid protocol code: {proto}")));
    }
    if major > 15 || minor > 15 {
        return Err(Error::MalformedEvent("version major/minor must fit in one hex digit".into()));
    }
    if size >= 16usize.pow(VERSION_RAW_SIZE as u32) {
        return Err(Error::MalformedEvent(format!("size {size} exceeds version field capacity")));
    }
    Ok(format!(
        "{proto}{major:x}{minor:x}{kind}{size:0width$x}{term}",
        kind = kind.as_str(),
        width = VERSION_RAW_SIZE,
        term = VERSION_TERM
    ))
}

/// A version string with a zero size, used as the first-pass placeholder.
pub fn version_string_placeholder(proto: &str, major: u8, minor: u8, kind: Kind) -> Result<String> {
    version_string(proto, major, minor, kind, 0)
}

#[derive(Debug, Clone, Copy)]
pub struct ParsedVersion {
    pub major: u8,
    pub minor: u8,
    pub size: usize,
}

pub fn parse_version_string(proto: &str, v: &str) -> Result<ParsedVersion> {
    if v.len() != VERSION_FULL_SPAN {
        return Err(Error::MalformedEvent(format!(
            "version string must be {VERSION_FULL_SPAN} characters, got {}",
            v.len()
        )));
    }
    let caps = VERSION_RE
        .captures(v)
        .ok_or_else(|| Error::MalformedEvent(format!("malformed version string: {v}")))?;
    if &caps["proto"] != proto {
        return Err(Error::MalformedEvent(format!(
            "version string protocol mismatch: expected {proto}, got {}",
            &caps["proto"]
        )));
    }
    let major = u8::from_str_radix(&caps["major"], 16).unwrap();
    let minor = u8::from_str_radix(&caps["minor"], 16).unwrap();
    let size = usize::from_str_radix(&caps["size"], 16).unwrap();
    Ok(ParsedVersion { major, minor, size })
}

/// A version string located inside a byte stream, with the protocol it
/// names and the byte offset at which it starts.
#[derive(Debug, Clone)]
pub struct Sniff {
    pub proto: String,
    pub offset: usize,
    pub version: ParsedVersion,
}

static V_FIELD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""v":"(?P<proto>KERI|ACDC)[0-9a-f]{2}JSON[0-9a-f]{6}_""#)
        .expect("static v-field regex is valid")
});

/// Locates the `"v":"..."` field near the start of a serialized event and
/// parses its version string, without requiring the caller to already know
/// which protocol (`KERI`/`ACDC`) produced the stream. Only scans a bounded
/// prefix since the version field is always among the first few builder
/// fields.
pub fn sniff(bytes: &[u8]) -> Result<Sniff> {
    let window = &bytes[..bytes.len().min(256)];
    let text = std::str::from_utf8(window)?;
    let caps = V_FIELD_RE
        .captures(text)
        .ok_or_else(|| Error::MalformedEvent("no version string found in stream".into()))?;
    let whole = caps.get(0).expect("capture group 0 always matches");
    let proto = caps["proto"].to_string();
    // whole match is `"v":"<17-char version string>"`; strip the `"v":"` lead-in and trailing quote.
    let v_str = &whole.as_str()[5..whole.as_str().len() - 1];
    let version = parse_version_string(&proto, v_str)?;
    Ok(Sniff { proto, offset: whole.start(), version })
}
