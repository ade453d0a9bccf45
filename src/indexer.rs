//! Write-time indexer: a parallel, not-derived structure kept alongside the
//! store. Every `putEvent` call is followed by `addKelEvent`/`addTelEvent`,
//! which re-parses the stored bytes from scratch, resolves the expected
//! signing keys by querying the relevant KEL independently of whatever the
//! writer claimed, and re-verifies the attached signatures before recording
//! an entry. A signature that verified once at write time but can no longer
//! be reconstructed as valid here means the store and the index have
//! diverged — `verify_integrity` is how that divergence surfaces.

use crate::attachment::{verify_event, verify_rotation_event};
use crate::cesr::diger::Diger;
use crate::cesr::tholder::Tholder;
use crate::cesr::verfer::Verfer;
use crate::error::{Error, Result};
use crate::parser::{self, EventKind, Meta};
use crate::store::{BatchOp, ListOpts, Store};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, error, warn};

const KEL_ESTABLISHMENT_ILKS: &[&str] = &["icp", "rot", "dip", "drt"];

/// A verified entry in a KEL's structured index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KelEntry {
    pub said: String,
    pub sn: u64,
    pub t: String,
    pub verified: bool,
    pub signing_keys: Vec<String>,
    pub required: usize,
    pub verified_count: usize,
}

/// A verified entry in a TEL's structured index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelEntry {
    pub said: String,
    pub t: String,
    pub ri: String,
    pub verified: bool,
    pub signing_keys: Vec<String>,
    pub required: usize,
    pub verified_count: usize,
}

/// One problem surfaced by [`verify_integrity`], named after the taxonomy
/// the write-time indexer's fail-fast contract promises.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityIssue {
    pub kind: IntegrityIssueKind,
    pub said: String,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrityIssueKind {
    EventMismatch,
    MissingEvent,
    InvalidSignature,
    CorruptedData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub valid: bool,
    pub issues: Vec<IntegrityIssue>,
}

/// Everything `exportState` needs about one alias scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AliasExport {
    pub schemas: BTreeMap<String, String>,
    #[serde(rename = "KELs")]
    pub kels: BTreeMap<String, String>,
    #[serde(rename = "TELs")]
    pub tels: BTreeMap<String, String>,
    #[serde(rename = "ACDCs")]
    pub acdcs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportState {
    pub version: String,
    pub generated_at: String,
    pub kels: BTreeMap<String, Vec<KelEntry>>,
    pub tels: BTreeMap<String, Vec<TelEntry>>,
    pub alias_by_id: AliasExport,
    pub ids_by_alias: AliasExport,
}

/// Walks a KEL's raw events (`<= upto_sn` when given) from the end looking
/// for the most recent establishment event, returning its full metadata.
async fn latest_establishment_meta(store: &Store, aid: &str, upto_sn: Option<u64>) -> Result<Meta> {
    let raws = store.list_kel(aid, None, upto_sn).await?;
    for raw in raws.iter().rev() {
        let parsed = parser::parse(raw)?;
        if parsed.meta.kind == EventKind::Kel && KEL_ESTABLISHMENT_ILKS.contains(&parsed.meta.t.as_str()) {
            return Ok(parsed.meta);
        }
    }
    Err(Error::Integrity { said: aid.to_string(), reason: "no establishment event found in KEL".into() })
}

/// The most recent establishment event's `k`/`kt`: the keys and threshold a
/// later non-establishment event of that KEL must satisfy.
async fn latest_establishment(store: &Store, aid: &str, upto_sn: Option<u64>) -> Result<(Vec<Verfer>, Tholder)> {
    let meta = latest_establishment_meta(store, aid, upto_sn).await?;
    let keys = meta
        .k
        .ok_or_else(|| Error::Integrity { said: meta.d.clone(), reason: "establishment event missing k".into() })?;
    let verfers = keys.iter().map(|k| Verfer::from_qb64(k)).collect::<Result<Vec<_>>>()?;
    let kt = meta.kt.unwrap_or(Value::Number(1.into()));
    Ok((verfers, Tholder::from_json(&kt)?))
}

/// The most recent establishment event's `n`/`nt`: the pre-rotation
/// commitment a following rotation event must satisfy.
async fn latest_next_commitment(store: &Store, aid: &str, upto_sn: Option<u64>) -> Result<(Vec<Diger>, Tholder)> {
    let meta = latest_establishment_meta(store, aid, upto_sn).await?;
    let ndigs = meta.n.unwrap_or_default();
    let digers = ndigs.iter().map(|d| Diger::from_qb64(d)).collect::<Result<Vec<_>>>()?;
    let nt = meta.nt.unwrap_or(Value::Number(0.into()));
    Ok((digers, Tholder::from_json(&nt)?))
}

/// Resolves everything needed to verify a `rot`/`drt` event's signatures:
/// the keys and threshold it declares for itself, plus the prior
/// establishment event's next-key digests and threshold its signatures
/// must separately expose (see [`verify_rotation_event`]).
async fn resolve_rotation_verification(
    store: &Store,
    meta: &Meta,
) -> Result<(Vec<Verfer>, Tholder, Vec<Diger>, Tholder)> {
    let keys = meta
        .k
        .clone()
        .ok_or_else(|| Error::Integrity { said: meta.d.clone(), reason: "rotation event missing k".into() })?;
    let verfers = keys.iter().map(|k| Verfer::from_qb64(k)).collect::<Result<Vec<_>>>()?;
    let kt = meta.kt.clone().unwrap_or(Value::Number(1.into()));
    let threshold = Tholder::from_json(&kt)?;

    let sn = meta
        .s
        .ok_or_else(|| Error::Integrity { said: meta.d.clone(), reason: "rotation event missing s".into() })?;
    let (prior_ndigs, prior_nsith) = latest_next_commitment(store, &meta.i, Some(sn.saturating_sub(1))).await?;

    Ok((verfers, threshold, prior_ndigs, prior_nsith))
}

/// Signer resolution table (spec table in C9): picks the key source for
/// each event kind without trusting anything the event itself claims about
/// who should have signed it. `rot`/`drt` are resolved separately, by
/// [`resolve_rotation_verification`], since they need the prior event's
/// next-key commitment in addition to their own declared keys.
async fn resolve_signing_keys(store: &Store, meta: &Meta) -> Result<(Vec<Verfer>, Tholder)> {
    match meta.kind {
        EventKind::Kel => match meta.t.as_str() {
            "icp" | "dip" => {
                let keys = meta.k.clone().ok_or_else(|| {
                    Error::Integrity { said: meta.d.clone(), reason: "inception event missing k".into() }
                })?;
                let verfers = keys.iter().map(|k| Verfer::from_qb64(k)).collect::<Result<Vec<_>>>()?;
                let kt = meta.kt.clone().unwrap_or(Value::Number(1.into()));
                Ok((verfers, Tholder::from_json(&kt)?))
            }
            "ixn" => latest_establishment(store, &meta.i, meta.s.map(|s| s.saturating_sub(1))).await,
            other => Err(Error::MalformedEvent(format!("unexpected KEL event type: {other}"))),
        },
        EventKind::Tel => match meta.t.as_str() {
            "vcp" => {
                let issuer = meta
                    .ii
                    .clone()
                    .ok_or_else(|| Error::Integrity { said: meta.d.clone(), reason: "vcp missing ii".into() })?;
                latest_establishment(store, &issuer, None).await
            }
            "iss" | "rev" | "ixn" => {
                let ri = meta
                    .ri
                    .clone()
                    .ok_or_else(|| Error::Integrity { said: meta.d.clone(), reason: "TEL event missing ri".into() })?;
                let vcp_meta = store.get_meta(&ri).await?;
                let issuer = vcp_meta
                    .ii
                    .ok_or_else(|| Error::Integrity { said: ri.clone(), reason: "vcp missing ii".into() })?;
                latest_establishment(store, &issuer, None).await
            }
            other => Err(Error::MalformedEvent(format!("unexpected TEL event type: {other}"))),
        },
        EventKind::Acdc => Err(Error::MalformedEvent("ACDC blocks are not independently signed events".into())),
    }
}

/// Re-parses, re-resolves signing keys, and re-verifies `said`'s stored
/// bytes, then appends a [`KelEntry`] to `xref:kel:<aid>`.
pub async fn add_kel_event(store: &Store, said: &str) -> Result<KelEntry> {
    let raw = store.get_event(said).await?;
    let meta = store.get_meta(said).await?;
    if meta.kind != EventKind::Kel {
        return Err(Error::MalformedEvent(format!("{said} is not a KEL event")));
    }

    let (keys, result) = if matches!(meta.t.as_str(), "rot" | "drt") {
        let (keys, threshold, prior_ndigs, prior_nsith) = resolve_rotation_verification(store, &meta).await?;
        let result = verify_rotation_event(&raw, &keys, &threshold, &prior_ndigs, &prior_nsith)?;
        (keys, result)
    } else {
        let (keys, threshold) = resolve_signing_keys(store, &meta).await?;
        let result = verify_event(&raw, &keys, &threshold)?;
        (keys, result)
    };

    let entry = KelEntry {
        said: said.to_string(),
        sn: meta.s.unwrap_or_default(),
        t: meta.t.clone(),
        verified: result.valid,
        signing_keys: keys.iter().map(|k| k.qb64()).collect(),
        required: result.required_count,
        verified_count: result.verified_count,
    };
    if !entry.verified {
        error!(said = %said, errors = ?result.errors, "KEL event failed write-time verification");
        return Err(Error::Integrity {
            said: said.to_string(),
            reason: format!("signature verification failed: {:?}", result.errors),
        });
    }

    store
        .kv()
        .put(&format!("xref:kel:{}/{:x}", meta.i, entry.sn), serde_json::to_vec(&entry)?)
        .await?;
    debug!(aid = %meta.i, sn = entry.sn, said = %said, "indexed KEL event");
    Ok(entry)
}

/// Re-parses, re-resolves signing keys, and re-verifies `said`'s stored
/// bytes, then appends a [`TelEntry`] to `xref:tel:<ri>`.
pub async fn add_tel_event(store: &Store, said: &str) -> Result<TelEntry> {
    let raw = store.get_event(said).await?;
    let meta = store.get_meta(said).await?;
    if meta.kind != EventKind::Tel {
        return Err(Error::MalformedEvent(format!("{said} is not a TEL event")));
    }

    let (keys, threshold) = resolve_signing_keys(store, &meta).await?;
    let result = verify_event(&raw, &keys, &threshold)?;
    let ri = meta.ri.clone().unwrap_or_else(|| meta.i.clone());

    let entry = TelEntry {
        said: said.to_string(),
        t: meta.t.clone(),
        ri: ri.clone(),
        verified: result.valid,
        signing_keys: keys.iter().map(|k| k.qb64()).collect(),
        required: result.required_count,
        verified_count: result.verified_count,
    };
    if !entry.verified {
        return Err(Error::Integrity {
            said: said.to_string(),
            reason: format!("signature verification failed: {:?}", result.errors),
        });
    }

    store.kv().put(&format!("xref:tel:{ri}/{said}"), serde_json::to_vec(&entry)?).await?;
    Ok(entry)
}

fn second_segment(key: &str, prefix: &str) -> Option<String> {
    key.strip_prefix(prefix)?.split('/').next().map(|s| s.to_string())
}

/// Lists every AID with at least one KEL event in the store, sorted.
pub async fn discover_aids(store: &Store) -> Result<Vec<String>> {
    let entries = store.kv().list("idx/kel/", ListOpts { keys_only: true, limit: None }).await?;
    let mut aids: Vec<String> = entries.iter().filter_map(|(k, _)| second_segment(k, "idx/kel/")).collect();
    aids.sort();
    aids.dedup();
    Ok(aids)
}

/// Lists every registry with at least one TEL event in the store, sorted.
pub async fn discover_registries(store: &Store) -> Result<Vec<String>> {
    let entries = store.kv().list("idx/tel/", ListOpts { keys_only: true, limit: None }).await?;
    let mut ris: Vec<String> = entries.iter().filter_map(|(k, _)| second_segment(k, "idx/tel/")).collect();
    ris.sort();
    ris.dedup();
    Ok(ris)
}

/// Convenience combinator for [`crate::graph`], which needs both sets
/// up front to restrict its walk to a single AID's reachable registries.
pub async fn discover_aids_and_registries(store: &Store) -> Result<(Vec<String>, Vec<String>)> {
    Ok((discover_aids(store).await?, discover_registries(store).await?))
}

/// Cross-checks the store's primary log against this module's structured
/// index for every discovered KEL and TEL: matching event counts, matching
/// SAIDs, and signatures that still verify against the recorded keys.
pub async fn verify_integrity(store: &Store) -> Result<IntegrityReport> {
    let mut issues = Vec::new();

    for aid in discover_aids(store).await? {
        let logged = store.list_kel(&aid, None, None).await?;
        let indexed = store.kv().list(&format!("xref:kel:{aid}/"), ListOpts::default()).await?;

        if logged.len() != indexed.len() {
            issues.push(IntegrityIssue {
                kind: IntegrityIssueKind::EventMismatch,
                said: aid.clone(),
                detail: format!("store has {} events, index has {}", logged.len(), indexed.len()),
            });
        }

        for raw in &logged {
            let meta = parser::parse(raw)?.meta;
            let xref_key = format!("xref:kel:{}/{:x}", aid, meta.s.unwrap_or_default());
            match store.kv().get(&xref_key).await? {
                None => issues.push(IntegrityIssue {
                    kind: IntegrityIssueKind::MissingEvent,
                    said: meta.d.clone(),
                    detail: format!("no xref entry at {xref_key}"),
                }),
                Some(bytes) => match serde_json::from_slice::<KelEntry>(&bytes) {
                    Ok(entry) if entry.said != meta.d => issues.push(IntegrityIssue {
                        kind: IntegrityIssueKind::CorruptedData,
                        said: meta.d.clone(),
                        detail: format!("xref entry SAID {} does not match stored event {}", entry.said, meta.d),
                    }),
                    Ok(entry) => {
                        let verfers: Vec<Verfer> = entry
                            .signing_keys
                            .iter()
                            .filter_map(|k| Verfer::from_qb64(k).ok())
                            .collect();
                        let threshold = Tholder::numeric(entry.required as u32);
                        match verify_event(raw, &verfers, &threshold) {
                            Ok(result) if result.valid => {}
                            Ok(_) => issues.push(IntegrityIssue {
                                kind: IntegrityIssueKind::InvalidSignature,
                                said: meta.d.clone(),
                                detail: "recorded signatures no longer verify".into(),
                            }),
                            Err(e) => issues.push(IntegrityIssue {
                                kind: IntegrityIssueKind::InvalidSignature,
                                said: meta.d.clone(),
                                detail: e.to_string(),
                            }),
                        }
                    }
                    Err(e) => issues.push(IntegrityIssue {
                        kind: IntegrityIssueKind::CorruptedData,
                        said: meta.d.clone(),
                        detail: format!("xref entry unparseable: {e}"),
                    }),
                },
            }
        }
    }

    for ri in discover_registries(store).await? {
        let logged = store.list_tel(&ri).await?;
        let indexed = store.kv().list(&format!("xref:tel:{ri}/"), ListOpts::default()).await?;
        if logged.len() != indexed.len() {
            issues.push(IntegrityIssue {
                kind: IntegrityIssueKind::EventMismatch,
                said: ri.clone(),
                detail: format!("store has {} events, index has {}", logged.len(), indexed.len()),
            });
        }
        for raw in &logged {
            let meta = parser::parse(raw)?.meta;
            let xref_key = format!("xref:tel:{ri}/{}", meta.d);
            if store.kv().get(&xref_key).await?.is_none() {
                issues.push(IntegrityIssue {
                    kind: IntegrityIssueKind::MissingEvent,
                    said: meta.d.clone(),
                    detail: format!("no xref entry at {xref_key}"),
                });
            }
        }
    }

    Ok(IntegrityReport { valid: issues.is_empty(), issues })
}

/// Rebuilds `xref:*` from scratch by walking every stored event (`ev/*`).
/// The recovery path for a `putEvent` whose KV batch committed but whose
/// indexer append was cancelled before completing.
pub async fn reindex(store: &Store) -> Result<()> {
    let entries = store.kv().list("ev/", ListOpts::default()).await?;
    let mut kel_saids = Vec::new();
    let mut tel_saids = Vec::new();
    for (key, _) in entries {
        let Some(said) = key.strip_prefix("ev/") else { continue };
        match store.get_meta(said).await?.kind {
            EventKind::Kel => kel_saids.push(said.to_string()),
            EventKind::Tel => tel_saids.push(said.to_string()),
            EventKind::Acdc => {}
        }
    }
    for said in kel_saids {
        add_kel_event(store, &said).await?;
    }
    for said in tel_saids {
        add_tel_event(store, &said).await?;
    }
    Ok(())
}

/// Produces the single offline-audit JSON blob described in §4.9:
/// every KEL/TEL's structured index plus both directions of every alias
/// scope, all as plain maps ready to serialize.
pub async fn export_state(store: &Store, generated_at: impl Into<String>) -> Result<ExportState> {
    use crate::store::Scope;

    let mut kels = BTreeMap::new();
    for aid in discover_aids(store).await? {
        let entries = store.kv().list(&format!("xref:kel:{aid}/"), ListOpts::default()).await?;
        let mut parsed: Vec<KelEntry> = entries
            .into_iter()
            .filter_map(|(_, v)| v.and_then(|b| serde_json::from_slice(&b).ok()))
            .collect();
        parsed.sort_by_key(|e| e.sn);
        kels.insert(aid, parsed);
    }

    let mut tels = BTreeMap::new();
    for ri in discover_registries(store).await? {
        let entries = store.kv().list(&format!("xref:tel:{ri}/"), ListOpts::default()).await?;
        let parsed: Vec<TelEntry> = entries
            .into_iter()
            .filter_map(|(_, v)| v.and_then(|b| serde_json::from_slice(&b).ok()))
            .collect();
        tels.insert(ri, parsed);
    }

    let collect_scope = |scope: Scope| async move {
        let aliases = store.list_aliases(scope).await?;
        Result::Ok(aliases.into_iter().collect::<BTreeMap<_, _>>())
    };

    let ids_by_alias = AliasExport {
        schemas: collect_scope(Scope::Schema).await?,
        kels: collect_scope(Scope::Kel).await?,
        tels: collect_scope(Scope::Tel).await?,
        acdcs: collect_scope(Scope::Acdc).await?,
    };
    let mut alias_by_id = AliasExport::default();
    for (alias, id) in &ids_by_alias.schemas {
        alias_by_id.schemas.insert(id.clone(), alias.clone());
    }
    for (alias, id) in &ids_by_alias.kels {
        alias_by_id.kels.insert(id.clone(), alias.clone());
    }
    for (alias, id) in &ids_by_alias.tels {
        alias_by_id.tels.insert(id.clone(), alias.clone());
    }
    for (alias, id) in &ids_by_alias.acdcs {
        alias_by_id.acdcs.insert(id.clone(), alias.clone());
    }

    Ok(ExportState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        generated_at: generated_at.into(),
        kels,
        tels,
        alias_by_id,
        ids_by_alias,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::build_signed_stream;
    use crate::cesr::signer::Signer;
    use crate::events::incept::InceptionEventBuilder;
    use crate::events::interact::InteractEventBuilder;
    use crate::store::MemoryKv;
    use std::sync::Arc;

    fn store() -> Store {
        Store::new(Arc::new(MemoryKv::new()))
    }

    #[tokio::test]
    async fn add_kel_event_verifies_inception_against_its_own_keys() {
        let store = store();
        let signer = Signer::new_random(true).unwrap();
        let icp = InceptionEventBuilder::new().with_keys(vec![signer.verfer().clone()]).build().unwrap();
        let siger = signer.sign_indexed(icp.raw(), 0, None).unwrap();
        let stream = build_signed_stream(icp.raw(), &[siger]).unwrap();
        store.put_event(&stream).await.unwrap();

        let entry = add_kel_event(&store, icp.said()).await.unwrap();
        assert!(entry.verified);
        assert_eq!(entry.sn, 0);
    }

    #[tokio::test]
    async fn add_kel_event_resolves_rotation_keys_from_the_rotation_itself() {
        use crate::cesr::diger::Diger;
        use crate::cesr::mtr_dex;
        use crate::events::rotate::RotateEventBuilder;

        let store = store();
        let k0 = Signer::new_random(true).unwrap();
        let k1 = Signer::new_random(true).unwrap();
        let n1 = Diger::from_ser(k1.verfer().qb64().as_bytes(), Some(mtr_dex::BLAKE3_256)).unwrap();

        let icp = InceptionEventBuilder::new()
            .with_keys(vec![k0.verfer().clone()])
            .with_next_digests(vec![n1])
            .build()
            .unwrap();
        let icp_sig = k0.sign_indexed(icp.raw(), 0, None).unwrap();
        store.put_event(&build_signed_stream(icp.raw(), &[icp_sig]).unwrap()).await.unwrap();
        add_kel_event(&store, icp.said()).await.unwrap();

        let rot = RotateEventBuilder::new(icp.pre(), icp.said())
            .with_keys(vec![k1.verfer().clone()])
            .with_sn(1)
            .build()
            .unwrap();
        let rot_sig = k1.sign_indexed(rot.raw(), 0, Some(0)).unwrap();
        store.put_event(&build_signed_stream(rot.raw(), &[rot_sig]).unwrap()).await.unwrap();

        let entry = add_kel_event(&store, rot.said()).await.unwrap();
        assert!(entry.verified);
        assert_eq!(entry.signing_keys, vec![k1.verfer().qb64()]);
    }

    #[tokio::test]
    async fn add_kel_event_rejects_rotation_not_exposing_prior_nsith() {
        use crate::cesr::diger::Diger;
        use crate::cesr::mtr_dex;
        use crate::events::rotate::RotateEventBuilder;

        let store = store();
        let k0 = Signer::new_random(true).unwrap();
        let k1 = Signer::new_random(true).unwrap();
        let k2 = Signer::new_random(true).unwrap();
        let n1 = Diger::from_ser(k1.verfer().qb64().as_bytes(), Some(mtr_dex::BLAKE3_256)).unwrap();
        let n2 = Diger::from_ser(k2.verfer().qb64().as_bytes(), Some(mtr_dex::BLAKE3_256)).unwrap();

        let icp = InceptionEventBuilder::new()
            .with_keys(vec![k0.verfer().clone()])
            .with_next_digests(vec![n1, n2])
            .with_nsith(Tholder::numeric(2))
            .build()
            .unwrap();
        let icp_sig = k0.sign_indexed(icp.raw(), 0, None).unwrap();
        store.put_event(&build_signed_stream(icp.raw(), &[icp_sig]).unwrap()).await.unwrap();
        add_kel_event(&store, icp.said()).await.unwrap();

        // Only reveals k1 of the two nt=2 committed next keys, with a
        // self-declared kt=1 an attacker holding just that key could craft.
        let rot = RotateEventBuilder::new(icp.pre(), icp.said())
            .with_keys(vec![k1.verfer().clone()])
            .with_isith(Tholder::numeric(1))
            .with_sn(1)
            .build()
            .unwrap();
        let rot_sig = k1.sign_indexed(rot.raw(), 0, Some(0)).unwrap();
        store.put_event(&build_signed_stream(rot.raw(), &[rot_sig]).unwrap()).await.unwrap();

        assert!(add_kel_event(&store, rot.said()).await.is_err());
    }

    #[tokio::test]
    async fn add_kel_event_resolves_ixn_keys_from_prior_inception() {
        let store = store();
        let signer = Signer::new_random(true).unwrap();
        let icp = InceptionEventBuilder::new().with_keys(vec![signer.verfer().clone()]).build().unwrap();
        let icp_sig = signer.sign_indexed(icp.raw(), 0, None).unwrap();
        store.put_event(&build_signed_stream(icp.raw(), &[icp_sig]).unwrap()).await.unwrap();
        add_kel_event(&store, icp.said()).await.unwrap();

        let ixn = InteractEventBuilder::new(icp.pre(), icp.said()).with_sn(1).build().unwrap();
        let ixn_sig = signer.sign_indexed(ixn.raw(), 0, None).unwrap();
        store.put_event(&build_signed_stream(ixn.raw(), &[ixn_sig]).unwrap()).await.unwrap();

        let entry = add_kel_event(&store, ixn.said()).await.unwrap();
        assert!(entry.verified);
        assert_eq!(entry.sn, 1);
    }

    #[tokio::test]
    async fn add_kel_event_fails_closed_on_bad_signature() {
        let store = store();
        let signer = Signer::new_random(true).unwrap();
        let other = Signer::new_random(true).unwrap();
        let icp = InceptionEventBuilder::new().with_keys(vec![signer.verfer().clone()]).build().unwrap();
        let bad_sig = other.sign_indexed(icp.raw(), 0, None).unwrap();
        store.put_event(&build_signed_stream(icp.raw(), &[bad_sig]).unwrap()).await.unwrap();

        assert!(add_kel_event(&store, icp.said()).await.is_err());
    }

    #[tokio::test]
    async fn verify_integrity_clean_store_reports_no_issues() {
        let store = store();
        let signer = Signer::new_random(true).unwrap();
        let icp = InceptionEventBuilder::new().with_keys(vec![signer.verfer().clone()]).build().unwrap();
        let siger = signer.sign_indexed(icp.raw(), 0, None).unwrap();
        store.put_event(&build_signed_stream(icp.raw(), &[siger]).unwrap()).await.unwrap();
        add_kel_event(&store, icp.said()).await.unwrap();

        let report = verify_integrity(&store).await.unwrap();
        assert!(report.valid);
        assert!(report.issues.is_empty());
    }

    #[tokio::test]
    async fn verify_integrity_flags_missing_xref_entry() {
        let store = store();
        let signer = Signer::new_random(true).unwrap();
        let icp = InceptionEventBuilder::new().with_keys(vec![signer.verfer().clone()]).build().unwrap();
        let siger = signer.sign_indexed(icp.raw(), 0, None).unwrap();
        store.put_event(&build_signed_stream(icp.raw(), &[siger]).unwrap()).await.unwrap();
        // Deliberately skip add_kel_event to simulate a cancelled append.

        let report = verify_integrity(&store).await.unwrap();
        assert!(!report.valid);
        assert!(report.issues.iter().any(|i| i.kind == IntegrityIssueKind::MissingEvent));
    }

    #[tokio::test]
    async fn reindex_rebuilds_xref_from_raw_events() {
        let store = store();
        let signer = Signer::new_random(true).unwrap();
        let icp = InceptionEventBuilder::new().with_keys(vec![signer.verfer().clone()]).build().unwrap();
        let siger = signer.sign_indexed(icp.raw(), 0, None).unwrap();
        store.put_event(&build_signed_stream(icp.raw(), &[siger]).unwrap()).await.unwrap();

        reindex(&store).await.unwrap();
        let report = verify_integrity(&store).await.unwrap();
        assert!(report.valid);
    }

    #[tokio::test]
    async fn export_state_includes_kel_entries_and_aliases() {
        let store = store();
        let signer = Signer::new_random(true).unwrap();
        let icp = InceptionEventBuilder::new().with_keys(vec![signer.verfer().clone()]).build().unwrap();
        let siger = signer.sign_indexed(icp.raw(), 0, None).unwrap();
        store.put_event(&build_signed_stream(icp.raw(), &[siger]).unwrap()).await.unwrap();
        add_kel_event(&store, icp.said()).await.unwrap();
        store.put_alias(crate::store::Scope::Kel, "alice", icp.pre()).await.unwrap();

        let state = export_state(&store, "2026-07-28T00:00:00Z").await.unwrap();
        assert_eq!(state.kels.get(icp.pre()).unwrap().len(), 1);
        assert_eq!(state.ids_by_alias.kels.get("alice").unwrap(), icp.pre());
        assert_eq!(state.alias_by_id.kels.get(icp.pre()).unwrap(), "alice");
    }
}
