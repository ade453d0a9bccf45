//! Indexed-signature attachment protocol: frames a signed event as
//! `event_bytes || "\n" || counter || sig...`, and verifies an attached
//! group against a set of expected keys and a threshold.

use crate::cesr::counting::{frame_indexed_sig_group, parse_indexed_sig_group};
use crate::cesr::diger::Diger;
use crate::cesr::indexing::siger::Siger;
use crate::cesr::indexing::Indexer;
use crate::cesr::tholder::Tholder;
use crate::cesr::verfer::Verfer;
use crate::error::{Error, Result};
use crate::parser::split_frame;

/// Concatenates an event with its indexed-signature attachment group,
/// producing the bytes a verifier receives and a store persists.
pub fn build_signed_stream(event_raw: &[u8], sigers: &[Siger]) -> Result<Vec<u8>> {
    let group = frame_indexed_sig_group(&sigers.iter().map(|s| s.qb64()).collect::<Vec<_>>())?;
    let mut out = event_raw.to_vec();
    out.push(b'\n');
    out.extend_from_slice(group.as_bytes());
    Ok(out)
}

/// Splits a signed stream into its event slice and attachment slice, using
/// the event's own declared size (see [`crate::parser::split_frame`]).
pub fn parse_cesr_stream(bytes: &[u8]) -> Result<(&[u8], Option<&[u8]>)> {
    let (event, rest) = split_frame(bytes)?;
    Ok((event, if rest.is_empty() { None } else { Some(rest) }))
}

/// Parses a `-A..` indexed-signature group into its component [`Siger`]s,
/// unresolved (no verifier key attached yet).
pub fn parse_indexed_signatures(sig_slice: &[u8]) -> Result<Vec<Siger>> {
    let text = std::str::from_utf8(sig_slice)?;
    let (sig_strs, rest) = parse_indexed_sig_group(text)?;
    if !rest.is_empty() {
        return Err(Error::Codec("trailing bytes after indexed signature group".into()));
    }
    sig_strs.iter().map(|s| Siger::from_qb64(s)).collect()
}

/// Outcome of verifying an indexed-signature group against a key list and
/// threshold: diagnostic strings accumulate rather than aborting on the
/// first failure, so a caller can inspect every problem in the group.
#[derive(Debug, Clone)]
pub struct VerifyResult {
    pub valid: bool,
    pub verified_count: usize,
    pub required_count: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Verifies a signed stream's attached indexed signatures against
/// `expected_keys` (the key list in effect for this event, by index) and
/// `threshold`. Out-of-range indices and failed verifications are recorded
/// as errors but don't stop the scan of remaining signatures; more valid
/// signatures than the threshold requires is a warning, not a failure.
pub fn verify_event(signed_bytes: &[u8], expected_keys: &[Verfer], threshold: &Tholder) -> Result<VerifyResult> {
    let (event, sig_slice) = parse_cesr_stream(signed_bytes)?;
    let sig_slice = sig_slice.ok_or_else(|| Error::SignatureInvalid("no attached signature group".into()))?;
    let sigers = parse_indexed_signatures(sig_slice)?;

    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut satisfied_indices = Vec::new();
    let mut seen_indices = std::collections::HashSet::new();

    for siger in &sigers {
        let idx = siger.index();
        let Some(verfer) = expected_keys.get(idx) else {
            errors.push(format!("signature index {idx} has no corresponding key (key list has {})", expected_keys.len()));
            continue;
        };
        if !seen_indices.insert(idx) {
            warnings.push(format!("duplicate signature at index {idx}"));
            continue;
        }
        match verfer.verify(siger.raw(), event) {
            Ok(true) => satisfied_indices.push(idx),
            Ok(false) => errors.push(format!("signature at index {idx} failed to verify")),
            Err(e) => errors.push(format!("signature at index {idx} malformed: {e}")),
        }
    }

    let valid = threshold.satisfy(&satisfied_indices);
    if valid && satisfied_indices.len() > threshold.size() {
        warnings.push(format!(
            "{} valid signatures exceed the {} required by threshold",
            satisfied_indices.len(),
            threshold.size()
        ));
    }

    Ok(VerifyResult {
        valid,
        verified_count: satisfied_indices.len(),
        required_count: threshold.size(),
        errors,
        warnings,
    })
}

/// Verifies a rotation/delegated-rotation event's attached signatures
/// against both its own new signing threshold (`keys`/`threshold`, by
/// `index`) and, via each signature's `ondex`, the prior event's
/// pre-rotation threshold (`prior_ndigs`/`prior_nsith`) — mirroring
/// [`crate::kel::KeyState::verify_rotation_signatures`] for callers that
/// resolve keys from the store rather than from a replayed [`KeyState`].
/// An `ondex` only counts toward `prior_nsith` when the signing key's
/// digest actually matches the prior commitment at that slot.
pub fn verify_rotation_event(
    signed_bytes: &[u8],
    keys: &[Verfer],
    threshold: &Tholder,
    prior_ndigs: &[Diger],
    prior_nsith: &Tholder,
) -> Result<VerifyResult> {
    let (event, sig_slice) = parse_cesr_stream(signed_bytes)?;
    let sig_slice = sig_slice.ok_or_else(|| Error::SignatureInvalid("no attached signature group".into()))?;
    let sigers = parse_indexed_signatures(sig_slice)?;

    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut indices = Vec::new();
    let mut ondices = Vec::new();
    let mut seen_indices = std::collections::HashSet::new();

    for siger in &sigers {
        let idx = siger.index();
        let Some(verfer) = keys.get(idx) else {
            errors.push(format!("signature index {idx} has no corresponding key (key list has {})", keys.len()));
            continue;
        };
        if !seen_indices.insert(idx) {
            warnings.push(format!("duplicate signature at index {idx}"));
            continue;
        }
        match verfer.verify(siger.raw(), event) {
            Ok(true) => {
                indices.push(idx);
                if let Some(ondex) = siger.ondex() {
                    if let Some(digest) = prior_ndigs.get(ondex) {
                        if digest.verify(verfer.qb64().as_bytes()).unwrap_or(false) {
                            ondices.push(ondex);
                        }
                    }
                }
            }
            Ok(false) => errors.push(format!("signature at index {idx} failed to verify")),
            Err(e) => errors.push(format!("signature at index {idx} malformed: {e}")),
        }
    }

    let satisfies_current = threshold.satisfy(&indices);
    let satisfies_prior = prior_nsith.satisfy(&ondices);
    if satisfies_current && !satisfies_prior {
        errors.push(format!(
            "rotation signatures expose ondices {ondices:?}, which do not satisfy the prior next-threshold"
        ));
    }
    let valid = satisfies_current && satisfies_prior;
    if valid && indices.len() > threshold.size() {
        warnings.push(format!(
            "{} valid signatures exceed the {} required by threshold",
            indices.len(),
            threshold.size()
        ));
    }

    Ok(VerifyResult {
        valid,
        verified_count: indices.len(),
        required_count: threshold.size(),
        errors,
        warnings,
    })
}
