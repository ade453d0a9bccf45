//! End-to-end scenarios wiring event builders, the attachment protocol, the
//! store, and the write-time indexer together, mirroring the seeded
//! scenarios used to validate this core during development.

use keri_acdc_core::acdc::AcdcBuilder;
use keri_acdc_core::attachment::{build_signed_stream, verify_event};
use keri_acdc_core::cesr::diger::Diger;
use keri_acdc_core::cesr::mtr_dex;
use keri_acdc_core::cesr::signer::Signer;
use keri_acdc_core::cesr::tholder::Tholder;
use keri_acdc_core::events::incept::InceptionEventBuilder;
use keri_acdc_core::events::interact::InteractEventBuilder;
use keri_acdc_core::events::rotate::RotateEventBuilder;
use keri_acdc_core::events::Seal;
use keri_acdc_core::graph::{build_graph, EdgeKind, GraphOpts, NodeKind};
use keri_acdc_core::indexer::{add_kel_event, add_tel_event, verify_integrity};
use keri_acdc_core::said::verify_said;
use keri_acdc_core::store::{MemoryKv, Store};
use keri_acdc_core::tel::registry::{
    parent_registry, IssuanceEventBuilder, RegistryInceptionBuilder, RegistryInteractionBuilder,
    RevocationEventBuilder,
};
use keri_acdc_core::tel_state::{replay_credential, CredentialStatus};
use keri_acdc_core::Matter;
use std::sync::Arc;

fn store() -> Store {
    Store::new(Arc::new(MemoryKv::new()))
}

fn signer_from_seed(byte: u8, transferable: bool) -> Signer {
    Signer::new(&[byte; 32], transferable).unwrap()
}

/// S1. Single-key identity: inception's AID equals the signer's own qb64,
/// the event round-trips through the store, and its lone signature clears
/// a threshold-1 verification.
#[tokio::test]
async fn s1_single_key_identity() {
    let store = store();
    let signer = signer_from_seed(0x01, true);

    let icp = InceptionEventBuilder::new().with_keys(vec![signer.verfer().clone()]).build().unwrap();
    assert_eq!(icp.pre(), signer.verfer().qb64());

    let siger = signer.sign_indexed(icp.raw(), 0, None).unwrap();
    let stream = build_signed_stream(icp.raw(), &[siger]).unwrap();
    store.put_event(&stream).await.unwrap();

    let kel = store.list_kel(icp.pre(), None, None).await.unwrap();
    assert_eq!(kel.len(), 1);

    let result = verify_event(&stream, &[signer.verfer().clone()], &Tholder::numeric(1)).unwrap();
    assert!(result.valid);

    add_kel_event(&store, icp.said()).await.unwrap();
    let report = verify_integrity(&store).await.unwrap();
    assert!(report.valid, "{:?}", report.issues);
}

/// S1 (pre-rotation variant). Single-key identity built with a non-empty
/// `ndigs` commitment still yields `AID == verfer.qb64`, per spec.md §8 S1
/// (`incept({keys:[verfer], ndigs:[diger(verfer)]})`). A prior bug gated
/// the key-as-prefix shortcut on `ndigs` being empty, which this test would
/// have caught.
#[tokio::test]
async fn s1_single_key_identity_with_pre_rotation_commitment() {
    let signer = signer_from_seed(0x02, true);
    let ndig = Diger::from_ser(signer.verfer().qb64().as_bytes(), Some(mtr_dex::BLAKE3_256)).unwrap();

    let icp = InceptionEventBuilder::new()
        .with_keys(vec![signer.verfer().clone()])
        .with_next_digests(vec![ndig])
        .build()
        .unwrap();
    assert_eq!(icp.pre(), signer.verfer().qb64());
}

/// S2. Key rotation: two rotations chain correctly by sequence number and
/// prior digest, and each rotation's revealed key matches the prior event's
/// pre-rotation commitment.
#[tokio::test]
async fn s2_key_rotation() {
    let store = store();
    let k0 = signer_from_seed(0x10, true);
    let k1 = signer_from_seed(0x11, true);
    let k2 = signer_from_seed(0x12, true);

    let n1 = Diger::from_ser(k1.verfer().qb64().as_bytes(), Some(mtr_dex::BLAKE3_256)).unwrap();
    let icp = InceptionEventBuilder::new()
        .with_keys(vec![k0.verfer().clone()])
        .with_next_digests(vec![n1.clone()])
        .build()
        .unwrap();
    let icp_sig = k0.sign_indexed(icp.raw(), 0, None).unwrap();
    store.put_event(&build_signed_stream(icp.raw(), &[icp_sig]).unwrap()).await.unwrap();
    add_kel_event(&store, icp.said()).await.unwrap();

    assert!(n1.verify(k1.verfer().qb64().as_bytes()).unwrap());

    let n2 = Diger::from_ser(k2.verfer().qb64().as_bytes(), Some(mtr_dex::BLAKE3_256)).unwrap();
    let rot = RotateEventBuilder::new(icp.pre(), icp.said())
        .with_keys(vec![k1.verfer().clone()])
        .with_next_digests(vec![n2.clone()])
        .with_sn(1)
        .build()
        .unwrap();
    assert_eq!(rot.sn().unwrap(), 1);
    assert_eq!(rot.prior(), Some(icp.said()));
    // A rotation is self-signing: it is signed with the very keys it
    // reveals (the ones whose digests were committed to in the prior
    // event's `n`), not the keys it replaces, so `rot` is signed with k1.
    // Its ondex (0) names the slot in icp's `n` that k1's digest satisfies,
    // proving the pre-rotation commitment alongside the rotation's own kt.
    let rot_sig = k1.sign_indexed(rot.raw(), 0, Some(0)).unwrap();
    store.put_event(&build_signed_stream(rot.raw(), &[rot_sig]).unwrap()).await.unwrap();
    add_kel_event(&store, rot.said()).await.unwrap();

    let rot2 = RotateEventBuilder::new(icp.pre(), rot.said()).with_keys(vec![k2.verfer().clone()]).with_sn(2).build().unwrap();
    assert_eq!(rot2.sn().unwrap(), 2);
    let rot2_sig = k2.sign_indexed(rot2.raw(), 0, Some(0)).unwrap();
    store.put_event(&build_signed_stream(rot2.raw(), &[rot2_sig]).unwrap()).await.unwrap();
    add_kel_event(&store, rot2.said()).await.unwrap();

    let kel = store.list_kel(icp.pre(), None, None).await.unwrap();
    assert_eq!(kel.len(), 3);

    let report = verify_integrity(&store).await.unwrap();
    assert!(report.valid, "{:?}", report.issues);
}

/// S3. Registry inception anchored in the issuer's KEL, followed by
/// credential issuance and revocation; status replay ends at `revoked`.
#[tokio::test]
async fn s3_registry_credential_revoke() {
    let store = store();
    let issuer = signer_from_seed(0x20, true);

    let icp = InceptionEventBuilder::new().with_keys(vec![issuer.verfer().clone()]).build().unwrap();
    let icp_sig = issuer.sign_indexed(icp.raw(), 0, None).unwrap();
    store.put_event(&build_signed_stream(icp.raw(), &[icp_sig]).unwrap()).await.unwrap();
    add_kel_event(&store, icp.said()).await.unwrap();

    let vcp = RegistryInceptionBuilder::new(icp.pre()).no_backers().build().unwrap();
    let vcp_sig = issuer.sign_indexed(vcp.raw(), 0, None).unwrap();
    store.put_event(&build_signed_stream(vcp.raw(), &[vcp_sig]).unwrap()).await.unwrap();

    let anchor = InteractEventBuilder::new(icp.pre(), icp.said())
        .with_sn(1)
        .with_seals(&[Seal::object(vcp.pre(), vcp.said())])
        .build()
        .unwrap();
    let anchor_sig = issuer.sign_indexed(anchor.raw(), 0, None).unwrap();
    store.put_event(&build_signed_stream(anchor.raw(), &[anchor_sig]).unwrap()).await.unwrap();
    add_kel_event(&store, anchor.said()).await.unwrap();
    add_tel_event(&store, vcp.said()).await.unwrap();

    let cred = AcdcBuilder::new(icp.pre(), "ESchemaPlaceholder0000000000000000000001")
        .with_registry(vcp.pre())
        .with_attr("name", serde_json::json!("alice"))
        .build()
        .unwrap();
    store.put_acdc(cred.said(), cred.raw()).await.unwrap();

    let iss = IssuanceEventBuilder::new(cred.said(), vcp.pre()).build().unwrap();
    let iss_sig = issuer.sign_indexed(iss.raw(), 0, None).unwrap();
    store.put_event(&build_signed_stream(iss.raw(), &[iss_sig]).unwrap()).await.unwrap();
    add_tel_event(&store, iss.said()).await.unwrap();

    let rev = RevocationEventBuilder::new(cred.said(), vcp.pre(), iss.said()).build().unwrap();
    let rev_sig = issuer.sign_indexed(rev.raw(), 0, None).unwrap();
    store.put_event(&build_signed_stream(rev.raw(), &[rev_sig]).unwrap()).await.unwrap();
    add_tel_event(&store, rev.said()).await.unwrap();

    let tel = store.list_tel(vcp.pre()).await.unwrap();
    assert_eq!(tel.len(), 3);

    let status = replay_credential(&[iss.clone(), rev.clone()]).unwrap();
    assert_eq!(status, CredentialStatus::Revoked { at_sn: 1 });

    let report = verify_integrity(&store).await.unwrap();
    assert!(report.valid, "{:?}", report.issues);
}

/// S4. A child registry nested under a parent, anchored both in the
/// issuer's KEL and in the parent's own TEL; the graph builder surfaces the
/// nesting as a `ParentRegistry` edge and integrity still holds.
#[tokio::test]
async fn s4_nested_registry() {
    let store = store();
    let issuer = signer_from_seed(0x30, true);

    let icp = InceptionEventBuilder::new().with_keys(vec![issuer.verfer().clone()]).build().unwrap();
    let icp_sig = issuer.sign_indexed(icp.raw(), 0, None).unwrap();
    store.put_event(&build_signed_stream(icp.raw(), &[icp_sig]).unwrap()).await.unwrap();
    add_kel_event(&store, icp.said()).await.unwrap();

    let parent = RegistryInceptionBuilder::new(icp.pre()).no_backers().build().unwrap();
    let parent_sig = issuer.sign_indexed(parent.raw(), 0, None).unwrap();
    store.put_event(&build_signed_stream(parent.raw(), &[parent_sig]).unwrap()).await.unwrap();

    let anchor_parent = InteractEventBuilder::new(icp.pre(), icp.said())
        .with_sn(1)
        .with_seals(&[Seal::object(parent.pre(), parent.said())])
        .build()
        .unwrap();
    let anchor_parent_sig = issuer.sign_indexed(anchor_parent.raw(), 0, None).unwrap();
    store.put_event(&build_signed_stream(anchor_parent.raw(), &[anchor_parent_sig]).unwrap()).await.unwrap();
    add_kel_event(&store, anchor_parent.said()).await.unwrap();
    add_tel_event(&store, parent.said()).await.unwrap();

    let child = RegistryInceptionBuilder::new(icp.pre()).no_backers().with_parent(parent.pre()).build().unwrap();
    assert_eq!(parent_registry(&child).as_deref(), Some(parent.pre()));
    let child_sig = issuer.sign_indexed(child.raw(), 0, None).unwrap();
    store.put_event(&build_signed_stream(child.raw(), &[child_sig]).unwrap()).await.unwrap();

    let anchor_child = InteractEventBuilder::new(icp.pre(), anchor_parent.said())
        .with_sn(2)
        .with_seals(&[Seal::object(child.pre(), child.said())])
        .build()
        .unwrap();
    let anchor_child_sig = issuer.sign_indexed(anchor_child.raw(), 0, None).unwrap();
    store.put_event(&build_signed_stream(anchor_child.raw(), &[anchor_child_sig]).unwrap()).await.unwrap();
    add_kel_event(&store, anchor_child.said()).await.unwrap();
    add_tel_event(&store, child.said()).await.unwrap();

    let parent_ixn = RegistryInteractionBuilder::new(parent.pre(), parent.said())
        .with_sn(1)
        .with_seals(&[Seal::object(child.pre(), child.said())])
        .build()
        .unwrap();
    let parent_ixn_sig = issuer.sign_indexed(parent_ixn.raw(), 0, None).unwrap();
    store.put_event(&build_signed_stream(parent_ixn.raw(), &[parent_ixn_sig]).unwrap()).await.unwrap();
    add_tel_event(&store, parent_ixn.said()).await.unwrap();

    let graph = build_graph(&store, GraphOpts::default()).await.unwrap();
    assert!(graph
        .nodes
        .iter()
        .any(|n| n.id == parent.pre() && n.kind == NodeKind::TelRegistry));
    assert!(graph
        .nodes
        .iter()
        .any(|n| n.id == child.pre() && n.kind == NodeKind::TelRegistry));
    assert!(graph
        .edges
        .iter()
        .any(|e| e.from == child.pre() && e.to == parent.pre() && e.kind == EdgeKind::ParentRegistry));

    let report = verify_integrity(&store).await.unwrap();
    assert!(report.valid, "{:?}", report.issues);
}

/// S5. Tamper detection: flipping a byte in a stored event's attached
/// signature makes `verify_integrity` surface an `invalid-signature` issue
/// for that event's SAID, without touching any other KEL.
#[tokio::test]
async fn s5_tamper_detection() {
    let store = store();
    let signer = signer_from_seed(0x40, true);

    let icp = InceptionEventBuilder::new().with_keys(vec![signer.verfer().clone()]).build().unwrap();
    let siger = signer.sign_indexed(icp.raw(), 0, None).unwrap();
    let stream = build_signed_stream(icp.raw(), &[siger]).unwrap();
    store.put_event(&stream).await.unwrap();
    add_kel_event(&store, icp.said()).await.unwrap();

    // Flip a byte inside the attached signature's base64 text, well clear of
    // the final character (whose low bits can be masked off by padding), and
    // after the event body's trailing newline, leaving the event's own SAID
    // (and thus the raw event bytes the indexer re-parses) untouched.
    let mut tampered = stream.clone();
    let idx = tampered.len() - 10;
    let original = tampered[idx];
    tampered[idx] = if original == b'A' { b'B' } else { b'A' };
    store.kv().put(&format!("ev/{}", icp.said()), tampered).await.unwrap();

    let report = verify_integrity(&store).await.unwrap();
    assert!(!report.valid);
    assert!(report
        .issues
        .iter()
        .any(|i| i.said == icp.said() && matches!(i.kind, keri_acdc_core::indexer::IntegrityIssueKind::InvalidSignature)));
}

/// S6. SAID-verified import: mutating an exported ACDC's attribute after
/// the fact makes `verify_said` fail, refusing the tampered re-import.
#[tokio::test]
async fn s6_said_verified_import() {
    let acdc = AcdcBuilder::new("EissuerPlaceholder000000000000000000000001", "ESchemaPlaceholder0000000000000000000001")
        .with_attr("name", serde_json::json!("alice"))
        .build()
        .unwrap();

    let exported = acdc.raw().to_vec();

    let mut value: serde_json::Value = serde_json::from_slice(&exported).unwrap();
    assert!(verify_said(&value, "d").unwrap());

    let attrs = value.get_mut("a").unwrap().as_object_mut().unwrap();
    attrs.insert("name".into(), serde_json::json!("mallory"));
    assert!(!verify_said(&value, "d").unwrap());
}
