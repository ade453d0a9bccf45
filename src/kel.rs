//! KEL (Key Event Log) state machine: replays a chain of establishment and
//! non-establishment events into the current key state, checking chain
//! continuity, pre-rotation commitments, and signature thresholds as it
//! goes.

use crate::cesr::diger::Diger;
use crate::cesr::indexing::siger::Siger;
use crate::cesr::indexing::Indexer;
use crate::cesr::mtr_dex;
use crate::cesr::tholder::Tholder;
use crate::cesr::verfer::Verfer;
use crate::cesr::Matter;
use crate::error::{Error, Result};
use crate::events::{ilks, Serder};

/// The key state resulting from replaying a KEL prefix up to some event.
#[derive(Debug, Clone)]
pub struct KeyState {
    pub pre: String,
    pub sn: u64,
    pub ilk: String,
    pub last_said: String,
    pub keys: Vec<Verfer>,
    pub isith: Tholder,
    pub ndigs: Vec<Diger>,
    pub nsith: Tholder,
    pub toad: u32,
    pub wits: Vec<String>,
    pub delegator: Option<String>,
}

impl KeyState {
    pub fn from_inception(serder: &Serder) -> Result<Self> {
        let ilk = serder.ilk().to_string();
        if ilk != ilks::ICP && ilk != ilks::DIP {
            return Err(Error::ChainViolation(format!("expected icp/dip, got {ilk}")));
        }
        let keys = string_array(serder, "k")?
            .iter()
            .map(|q| Verfer::from_qb64(q))
            .collect::<Result<Vec<_>>>()?;
        let ndigs = string_array(serder, "n")?
            .iter()
            .map(|q| Diger::from_qb64(q))
            .collect::<Result<Vec<_>>>()?;
        let isith = Tholder::from_json(serder.get("kt").ok_or_else(missing_kt)?)?;
        let nsith = Tholder::from_json(serder.get("nt").ok_or_else(missing_nt)?)?;
        let wits = string_array(serder, "b")?;
        let toad = u32::from_str_radix(
            serder.get("bt").and_then(|v| v.as_str()).unwrap_or("0"),
            16,
        )
        .map_err(|_| Error::MalformedEvent("bad toad field".into()))?;
        let delegator = serder.get("di").and_then(|v| v.as_str()).map(|s| s.to_string());

        Ok(Self {
            pre: serder.pre().to_string(),
            sn: 0,
            ilk,
            last_said: serder.said().to_string(),
            keys,
            isith,
            ndigs,
            nsith,
            toad,
            wits,
            delegator,
        })
    }

    /// Verifies `sigers` against the key state *in effect when `serder` was
    /// signed* (i.e. `self`, the state as of the prior event for an
    /// establishment event about to be applied, or the current state for a
    /// non-establishment event) and that the satisfied indices meet
    /// `self.isith`.
    pub fn verify_signatures(&self, serder: &Serder, sigers: &[Siger]) -> Result<()> {
        let mut indices = Vec::with_capacity(sigers.len());
        for siger in sigers {
            let idx = siger.index();
            let verfer = self
                .keys
                .get(idx)
                .ok_or_else(|| Error::SignatureInvalid(format!("signature index {idx} out of range")))?;
            if !verfer.verify(siger.raw(), serder.raw())? {
                return Err(Error::SignatureInvalid(format!("signature at index {idx} failed to verify")));
            }
            indices.push(idx);
        }
        if !self.isith.satisfy(&indices) {
            return Err(Error::ThresholdNotMet { verified: indices.len(), required: self.isith.size() });
        }
        Ok(())
    }

    /// Verifies a rotation/delegated-rotation event's attached signatures
    /// against two separate thresholds: `next` (the key state the event
    /// itself establishes) by `index`, for its own self-declared `kt`; and
    /// `self` (the prior state, holding the pre-rotation commitment) by
    /// `ondex`, for `self.nsith`. A signature only counts toward the prior
    /// threshold when its declared `ondex` names a prior `n` slot whose
    /// digest the signing key actually matches — an attacker can't claim
    /// an arbitrary ondex to manufacture satisfaction.
    pub fn verify_rotation_signatures(&self, next: &KeyState, serder: &Serder, sigers: &[Siger]) -> Result<()> {
        let mut indices = Vec::with_capacity(sigers.len());
        let mut ondices = Vec::with_capacity(sigers.len());
        for siger in sigers {
            let idx = siger.index();
            let verfer = next
                .keys
                .get(idx)
                .ok_or_else(|| Error::SignatureInvalid(format!("signature index {idx} out of range")))?;
            if !verfer.verify(siger.raw(), serder.raw())? {
                return Err(Error::SignatureInvalid(format!("signature at index {idx} failed to verify")));
            }
            indices.push(idx);

            if let Some(ondex) = siger.ondex() {
                if let Some(digest) = self.ndigs.get(ondex) {
                    if digest.verify(verfer.qb64().as_bytes())? {
                        ondices.push(ondex);
                    }
                }
            }
        }
        if !next.isith.satisfy(&indices) {
            return Err(Error::ThresholdNotMet { verified: indices.len(), required: next.isith.size() });
        }
        if !self.nsith.satisfy(&ondices) {
            return Err(Error::ThresholdNotMet { verified: ondices.len(), required: self.nsith.size() });
        }
        Ok(())
    }

    /// Applies a rotation (`rot`/`drt`) event, checking chain continuity and
    /// the pre-rotation commitment between this state's `ndigs` and the new
    /// event's revealed keys.
    pub fn apply_rotation(&self, serder: &Serder) -> Result<Self> {
        let ilk = serder.ilk().to_string();
        if ilk != ilks::ROT && ilk != ilks::DRT {
            return Err(Error::ChainViolation(format!("expected rot/drt, got {ilk}")));
        }
        self.check_chain(serder)?;

        let keys = string_array(serder, "k")?
            .iter()
            .map(|q| Verfer::from_qb64(q))
            .collect::<Result<Vec<_>>>()?;

        for key in &keys {
            if !digest_matches_any(&self.ndigs, key)? {
                return Err(Error::ChainViolation(format!(
                    "rotated key {} does not match any prior-committed next-key digest",
                    key.qb64()
                )));
            }
        }

        let isith = Tholder::from_json(serder.get("kt").ok_or_else(missing_kt)?)?;
        if isith.size() > keys.len() {
            return Err(Error::ChainViolation("new signing threshold exceeds new key count".into()));
        }
        let ndigs = string_array(serder, "n")?
            .iter()
            .map(|q| Diger::from_qb64(q))
            .collect::<Result<Vec<_>>>()?;
        let nsith = Tholder::from_json(serder.get("nt").ok_or_else(missing_nt)?)?;

        let mut wits = self.wits.clone();
        for cut in string_array(serder, "br")? {
            wits.retain(|w| w != &cut);
        }
        for add in string_array(serder, "ba")? {
            if wits.contains(&add) {
                return Err(Error::ChainViolation(format!("witness {add} added but already present")));
            }
            wits.push(add);
        }
        let toad = u32::from_str_radix(
            serder.get("bt").and_then(|v| v.as_str()).unwrap_or("0"),
            16,
        )
        .map_err(|_| Error::MalformedEvent("bad toad field".into()))?;

        Ok(Self {
            pre: self.pre.clone(),
            sn: serder.sn()?,
            ilk,
            last_said: serder.said().to_string(),
            keys,
            isith,
            ndigs,
            nsith,
            toad,
            wits,
            delegator: self.delegator.clone(),
        })
    }

    /// Applies an interaction (`ixn`) event: no key-state change beyond
    /// `sn`/`last_said`.
    pub fn apply_interaction(&self, serder: &Serder) -> Result<Self> {
        if serder.ilk() != ilks::IXN {
            return Err(Error::ChainViolation(format!("expected ixn, got {}", serder.ilk())));
        }
        self.check_chain(serder)?;
        Ok(Self { sn: serder.sn()?, ilk: ilks::IXN.to_string(), last_said: serder.said().to_string(), ..self.clone() })
    }

    fn check_chain(&self, serder: &Serder) -> Result<()> {
        if serder.pre() != self.pre {
            return Err(Error::ChainViolation(format!(
                "event prefix {} does not match KEL prefix {}",
                serder.pre(),
                self.pre
            )));
        }
        let sn = serder.sn()?;
        if sn != self.sn + 1 {
            return Err(Error::ChainViolation(format!(
                "event sn {sn} is not the successor of current sn {}",
                self.sn
            )));
        }
        let prior = serder
            .prior()
            .ok_or_else(|| Error::MalformedEvent("non-inception event missing prior digest".into()))?;
        if prior != self.last_said {
            return Err(Error::ChainViolation(format!(
                "event prior digest {prior} does not match expected {}",
                self.last_said
            )));
        }
        Ok(())
    }
}

fn string_array(serder: &Serder, field: &str) -> Result<Vec<String>> {
    match serder.get(field) {
        None => Ok(Vec::new()),
        Some(v) => v
            .as_array()
            .ok_or_else(|| Error::MalformedEvent(format!("field {field} is not an array")))?
            .iter()
            .map(|e| {
                e.as_str()
                    .map(|s| s.to_string())
                    .ok_or_else(|| Error::MalformedEvent(format!("field {field} contains a non-string entry")))
            })
            .collect(),
    }
}

/// True when `key`'s digest appears anywhere in `ndigs` — a rotation may
/// reveal any subset of the previously committed next keys that still
/// satisfies `nsith`, not necessarily all of them in commitment order.
fn digest_matches_any(ndigs: &[Diger], key: &Verfer) -> Result<bool> {
    for digest in ndigs {
        if digest.verify(key.qb64().as_bytes())? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn missing_kt() -> Error {
    Error::MalformedEvent("missing kt (signing threshold) field".into())
}
fn missing_nt() -> Error {
    Error::MalformedEvent("missing nt (next signing threshold) field".into())
}

/// Replays a full KEL prefix (inception followed by zero or more
/// establishment/non-establishment events, each paired with its attached
/// indexed signatures) and returns the resulting key state.
pub fn replay(events: &[(Serder, Vec<Siger>)]) -> Result<KeyState> {
    let (first, first_sigs) = events
        .first()
        .ok_or_else(|| Error::MalformedEvent("KEL replay requires at least one event".into()))?;
    let mut state = KeyState::from_inception(first)?;
    state.verify_signatures(first, first_sigs)?;

    for (serder, sigers) in &events[1..] {
        match serder.ilk() {
            ilks::ROT | ilks::DRT => {
                let next_state = state.apply_rotation(serder)?;
                state.verify_rotation_signatures(&next_state, serder, sigers)?;
                state = next_state;
            }
            ilks::IXN => {
                let next_state = state.apply_interaction(serder)?;
                state.verify_signatures(serder, sigers)?;
                state = next_state;
            }
            other => return Err(Error::ChainViolation(format!("unexpected event type in KEL: {other}"))),
        }
    }

    Ok(state)
}
