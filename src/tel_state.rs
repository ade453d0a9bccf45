//! TEL (Transaction Event Log) state machine: replays registry inception/
//! interaction events into registry state, and issuance/revocation pairs
//! into a credential's status. Revocation is a one-way transition —
//! status only ever moves `Issued -> Revoked`, never back.

use crate::error::{Error, Result};
use crate::events::Serder;
use crate::tel::ilks;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    Issued { at_sn: u64 },
    Revoked { at_sn: u64 },
}

#[derive(Debug, Clone)]
pub struct RegistryState {
    pub regk: String,
    pub issuer: String,
    pub sn: u64,
    pub last_said: String,
    pub backers: Vec<String>,
    pub toad: u32,
}

impl RegistryState {
    pub fn from_inception(serder: &Serder) -> Result<Self> {
        if serder.ilk() != ilks::VCP {
            return Err(Error::ChainViolation(format!("expected vcp, got {}", serder.ilk())));
        }
        let issuer = serder
            .get("ii")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::MalformedEvent("registry inception missing ii".into()))?
            .to_string();
        let backers = string_array(serder, "b")?;
        let toad = u32::from_str_radix(serder.get("bt").and_then(|v| v.as_str()).unwrap_or("0"), 16)
            .map_err(|_| Error::MalformedEvent("bad toad field".into()))?;
        Ok(Self {
            regk: serder.pre().to_string(),
            issuer,
            sn: 0,
            last_said: serder.said().to_string(),
            backers,
            toad,
        })
    }

    pub fn apply_interaction(&self, serder: &Serder) -> Result<Self> {
        if serder.ilk() != ilks::IXN {
            return Err(Error::ChainViolation(format!("expected ixn, got {}", serder.ilk())));
        }
        if serder.pre() != self.regk {
            return Err(Error::ChainViolation("registry interaction prefix mismatch".into()));
        }
        let sn = serder.sn()?;
        if sn != self.sn + 1 {
            return Err(Error::ChainViolation(format!(
                "registry event sn {sn} is not successor of {}",
                self.sn
            )));
        }
        if serder.prior() != Some(self.last_said.as_str()) {
            return Err(Error::ChainViolation("registry interaction prior digest mismatch".into()));
        }
        Ok(Self { sn, last_said: serder.said().to_string(), ..self.clone() })
    }
}

/// Replays an `iss` event optionally followed by a `rev` event, all
/// addressing the same credential SAID, into a [`CredentialStatus`].
pub fn replay_credential(events: &[Serder]) -> Result<CredentialStatus> {
    let first = events
        .first()
        .ok_or_else(|| Error::MalformedEvent("credential TEL replay requires at least one event".into()))?;
    if first.ilk() != ilks::ISS {
        return Err(Error::ChainViolation(format!("expected iss, got {}", first.ilk())));
    }
    let cred = first.pre().to_string();
    let mut status = CredentialStatus::Issued { at_sn: 0 };
    let mut last_said = first.said().to_string();

    for event in &events[1..] {
        if event.pre() != cred {
            return Err(Error::ChainViolation("TEL event addresses a different credential".into()));
        }
        match event.ilk() {
            ilks::REV => {
                if event.prior() != Some(last_said.as_str()) {
                    return Err(Error::ChainViolation("revocation prior digest mismatch".into()));
                }
                let sn = event.sn()?;
                if sn != 1 {
                    return Err(Error::ChainViolation("revocation must be at sn 1".into()));
                }
                status = CredentialStatus::Revoked { at_sn: sn };
                last_said = event.said().to_string();
            }
            other => return Err(Error::ChainViolation(format!("unexpected TEL event after issuance: {other}"))),
        }
    }

    Ok(status)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tel::registry::{IssuanceEventBuilder, RegistryInceptionBuilder, RevocationEventBuilder};

    #[test]
    fn credential_starts_issued_then_revokes() {
        let reg = RegistryInceptionBuilder::new("Eissuer").no_backers().build().unwrap();
        let iss = IssuanceEventBuilder::new("Ecred", reg.pre()).build().unwrap();
        let status = replay_credential(&[iss.clone()]).unwrap();
        assert_eq!(status, CredentialStatus::Issued { at_sn: 0 });

        let rev = RevocationEventBuilder::new("Ecred", reg.pre(), iss.said()).build().unwrap();
        let status = replay_credential(&[iss, rev]).unwrap();
        assert_eq!(status, CredentialStatus::Revoked { at_sn: 1 });
    }

    #[test]
    fn rejects_revocation_with_wrong_prior() {
        let reg = RegistryInceptionBuilder::new("Eissuer").no_backers().build().unwrap();
        let iss = IssuanceEventBuilder::new("Ecred", reg.pre()).build().unwrap();
        let rev = RevocationEventBuilder::new("Ecred", reg.pre(), "Ewrong").build().unwrap();
        assert!(replay_credential(&[iss, rev]).is_err());
    }
}
