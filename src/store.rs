//! Storage abstraction: an opaque byte-addressed key-value interface, and
//! the key layout (`ev/`, `meta/`, `idx/`, `head/`, `map/`, `acdc/`,
//! `schema/`) built on top of it for KEL/TEL/ACDC persistence.
//!
//! The [`Kv`] trait is the only seam a concrete backend needs to fill; this
//! crate ships [`MemoryKv`] as a minimal in-process fixture for tests and
//! examples, not a production adaptor — disk-backed and other in-memory
//! adaptors are external collaborators (see the crate-level docs).

use crate::error::{Error, Result};
use crate::parser::{self, EventKind, Meta};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// One write in a [`Kv::batch`] call.
#[derive(Debug, Clone)]
pub enum BatchOp {
    Put(String, Vec<u8>),
    Del(String),
}

/// Options for [`Kv::list`].
#[derive(Debug, Clone, Default)]
pub struct ListOpts {
    pub keys_only: bool,
    pub limit: Option<usize>,
}

/// Abstract key-value store. Keys are opaque strings (in practice, `/`-
/// delimited paths); values are byte arrays. Every operation may suspend
/// awaiting I/O, so the trait is async even though [`MemoryKv`] never
/// actually yields.
#[async_trait]
pub trait Kv: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn del(&self, key: &str) -> Result<()>;
    /// Lists entries whose key starts with `prefix`, lexicographically
    /// ordered. When `keys_only`, values in the result are `None`.
    async fn list(&self, prefix: &str, opts: ListOpts) -> Result<Vec<(String, Option<Vec<u8>>)>>;
    /// Applies `ops` as a single atomic unit if the backend supports it.
    /// [`MemoryKv`] always applies atomically (the whole call holds one lock).
    async fn batch(&self, ops: Vec<BatchOp>) -> Result<()>;
}

/// A `BTreeMap`-backed [`Kv`] fixture: atomic batches (one mutex guards the
/// whole call), lexicographic `list` ordering for free. Not a durability
/// story — state is lost when the process exits.
#[derive(Default)]
pub struct MemoryKv {
    data: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Kv for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.lock().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.data.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.data.lock().remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str, opts: ListOpts) -> Result<Vec<(String, Option<Vec<u8>>)>> {
        let data = self.data.lock();
        let mut out = Vec::new();
        for (k, v) in data.range(prefix.to_string()..) {
            if !k.starts_with(prefix) {
                break;
            }
            out.push((k.clone(), if opts.keys_only { None } else { Some(v.clone()) }));
            if let Some(limit) = opts.limit {
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }

    async fn batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        let mut data = self.data.lock();
        for op in ops {
            match op {
                BatchOp::Put(k, v) => {
                    data.insert(k, v);
                }
                BatchOp::Del(k) => {
                    data.remove(&k);
                }
            }
        }
        Ok(())
    }
}

/// Alias scopes recognized by the store's secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Kel,
    Tel,
    Schema,
    Acdc,
    Contact,
    Remotes,
}

impl Scope {
    fn as_str(self) -> &'static str {
        match self {
            Scope::Kel => "kel",
            Scope::Tel => "tel",
            Scope::Schema => "schema",
            Scope::Acdc => "acdc",
            Scope::Contact => "contact",
            Scope::Remotes => "remotes",
        }
    }
}

/// A put event's outcome, summarizing the write so the indexer can decide
/// whether/how to project it without re-parsing.
#[derive(Debug, Clone)]
pub struct PutEventResult {
    pub said: String,
    pub meta: Meta,
}

/// The KEL/TEL/ACDC key layout on top of an abstract [`Kv`].
pub struct Store {
    kv: Arc<dyn Kv>,
}

impl Store {
    pub fn new(kv: Arc<dyn Kv>) -> Self {
        Self { kv }
    }

    /// Direct access to the underlying [`Kv`], used by the indexer (§4.9) to
    /// write its own `xref:*` projections through the same store API rather
    /// than bypassing it.
    pub fn kv(&self) -> &Arc<dyn Kv> {
        &self.kv
    }

    /// Parses, SAID-verifies, and persists a raw signed event, writing the
    /// raw bytes, projected metadata, the appropriate sequence/timestamp
    /// index, the prior-event index, and the log's HEAD pointer as one
    /// batch.
    pub async fn put_event(&self, raw: &[u8]) -> Result<PutEventResult> {
        let parsed = parser::parse(raw)?;
        let said = parsed.meta.d.clone();

        if self.kv.get(&format!("ev/{said}")).await?.is_some() {
            warn!(said = %said, "rejecting duplicate putEvent");
            return Err(Error::Conflict(format!("event already stored: {said}")));
        }

        let mut ops = vec![
            BatchOp::Put(format!("ev/{said}"), raw.to_vec()),
            BatchOp::Put(format!("meta/{said}"), serde_json::to_vec(&parsed.meta)?),
        ];

        match parsed.meta.kind {
            EventKind::Kel => {
                let sn = parsed
                    .meta
                    .s
                    .ok_or_else(|| Error::MalformedEvent("KEL event missing sequence number".into()))?;
                ops.push(BatchOp::Put(format!("idx/kel/{}/{:x}", parsed.meta.i, sn), said.clone().into_bytes()));
                ops.push(BatchOp::Put(format!("head/kel/{}", parsed.meta.i), said.clone().into_bytes()));
            }
            EventKind::Tel => {
                let ri = parsed.meta.ri.clone().unwrap_or_else(|| parsed.meta.i.clone());
                let ts = chrono::Utc::now().to_rfc3339();
                ops.push(BatchOp::Put(format!("idx/tel/{ri}/{said}"), ts.into_bytes()));
                ops.push(BatchOp::Put(format!("head/tel/{ri}"), said.clone().into_bytes()));
            }
            EventKind::Acdc => {}
        }

        if let Some(prior) = &parsed.meta.p {
            ops.push(BatchOp::Put(format!("idx/prev/{prior}"), said.clone().into_bytes()));
        }

        self.kv.batch(ops).await?;
        debug!(said = %said, kind = ?parsed.meta.kind, t = %parsed.meta.t, "stored event");
        Ok(PutEventResult { said, meta: parsed.meta })
    }

    pub async fn get_event(&self, said: &str) -> Result<Vec<u8>> {
        self.kv
            .get(&format!("ev/{said}"))
            .await?
            .ok_or_else(|| Error::NotFound(format!("event not found: {said}")))
    }

    pub async fn get_meta(&self, said: &str) -> Result<Meta> {
        let bytes = self
            .kv
            .get(&format!("meta/{said}"))
            .await?
            .ok_or_else(|| Error::NotFound(format!("event metadata not found: {said}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Lists a KEL's raw events in sequence-number order (optionally
    /// restricted to `[from, to]`, inclusive).
    pub async fn list_kel(&self, aid: &str, from: Option<u64>, to: Option<u64>) -> Result<Vec<Vec<u8>>> {
        let prefix = format!("idx/kel/{aid}/");
        let entries = self.kv.list(&prefix, ListOpts::default()).await?;
        let mut numbered: Vec<(u64, String)> = entries
            .into_iter()
            .filter_map(|(k, v)| {
                let hex = k.strip_prefix(&prefix)?;
                let sn = u64::from_str_radix(hex, 16).ok()?;
                let said = String::from_utf8(v?).ok()?;
                Some((sn, said))
            })
            .collect();
        numbered.sort_by_key(|(sn, _)| *sn);

        let mut out = Vec::new();
        for (sn, said) in numbered {
            if from.is_some_and(|f| sn < f) || to.is_some_and(|t| sn > t) {
                continue;
            }
            out.push(self.get_event(&said).await?);
        }
        Ok(out)
    }

    /// Lists a TEL's raw events in insertion order (by the stored timestamp
    /// value, which is insertion-monotone).
    pub async fn list_tel(&self, ri: &str) -> Result<Vec<Vec<u8>>> {
        let prefix = format!("idx/tel/{ri}/");
        let entries = self.kv.list(&prefix, ListOpts::default()).await?;
        let mut timestamped: Vec<(String, String)> = entries
            .into_iter()
            .filter_map(|(k, v)| {
                let said = k.strip_prefix(&prefix)?.to_string();
                let ts = String::from_utf8(v?).ok()?;
                Some((ts, said))
            })
            .collect();
        timestamped.sort_by(|a, b| a.0.cmp(&b.0));

        let mut out = Vec::new();
        for (_, said) in timestamped {
            out.push(self.get_event(&said).await?);
        }
        Ok(out)
    }

    /// Returns the successor(s) of `prior_said` via the single-chain
    /// `idx/prev` index. Per the spec's open question (a), forks silently
    /// overwrite the single recorded successor; branching KELs are not
    /// representable under this key layout.
    pub async fn get_by_prior(&self, prior_said: &str) -> Result<Option<String>> {
        let bytes = self.kv.get(&format!("idx/prev/{prior_said}")).await?;
        Ok(bytes.map(|b| String::from_utf8_lossy(&b).to_string()))
    }

    pub async fn get_head(&self, aid_or_ri: &str, is_tel: bool) -> Result<Option<String>> {
        let key = if is_tel { format!("head/tel/{aid_or_ri}") } else { format!("head/kel/{aid_or_ri}") };
        let bytes = self.kv.get(&key).await?;
        Ok(bytes.map(|b| String::from_utf8_lossy(&b).to_string()))
    }

    /// Writes a forward (`alias -> id`) and reverse (`id -> alias`) pair in
    /// one batch; fails with [`Error::Conflict`] if `alias` is already
    /// bound in this scope to a different id.
    pub async fn put_alias(&self, scope: Scope, alias: &str, id: &str) -> Result<()> {
        let fwd_key = format!("map/alias2id/{}/{alias}", scope.as_str());
        if let Some(existing) = self.kv.get(&fwd_key).await? {
            if existing != id.as_bytes() {
                return Err(Error::Conflict(format!("alias {alias} already bound in scope {:?}", scope)));
            }
        }
        self.kv
            .batch(vec![
                BatchOp::Put(fwd_key, id.as_bytes().to_vec()),
                BatchOp::Put(format!("map/id2alias/{}/{id}", scope.as_str()), alias.as_bytes().to_vec()),
            ])
            .await
    }

    pub async fn del_alias(&self, scope: Scope, alias: &str) -> Result<()> {
        let fwd_key = format!("map/alias2id/{}/{alias}", scope.as_str());
        let id = self
            .kv
            .get(&fwd_key)
            .await?
            .ok_or_else(|| Error::NotFound(format!("alias not found: {alias}")))?;
        let id = String::from_utf8_lossy(&id).to_string();
        self.kv
            .batch(vec![BatchOp::Del(fwd_key), BatchOp::Del(format!("map/id2alias/{}/{id}", scope.as_str()))])
            .await
    }

    pub async fn alias_to_id(&self, scope: Scope, alias: &str) -> Result<Option<String>> {
        let bytes = self.kv.get(&format!("map/alias2id/{}/{alias}", scope.as_str())).await?;
        Ok(bytes.map(|b| String::from_utf8_lossy(&b).to_string()))
    }

    pub async fn id_to_alias(&self, scope: Scope, id: &str) -> Result<Option<String>> {
        let bytes = self.kv.get(&format!("map/id2alias/{}/{id}", scope.as_str())).await?;
        Ok(bytes.map(|b| String::from_utf8_lossy(&b).to_string()))
    }

    pub async fn list_aliases(&self, scope: Scope) -> Result<Vec<(String, String)>> {
        let prefix = format!("map/alias2id/{}/", scope.as_str());
        let entries = self.kv.list(&prefix, ListOpts::default()).await?;
        Ok(entries
            .into_iter()
            .filter_map(|(k, v)| {
                let alias = k.strip_prefix(&prefix)?.to_string();
                let id = String::from_utf8(v?).ok()?;
                Some((alias, id))
            })
            .collect())
    }

    pub async fn put_acdc(&self, said: &str, bytes: &[u8]) -> Result<()> {
        self.kv.put(&format!("acdc/{said}"), bytes.to_vec()).await
    }

    pub async fn get_acdc(&self, said: &str) -> Result<Vec<u8>> {
        self.kv
            .get(&format!("acdc/{said}"))
            .await?
            .ok_or_else(|| Error::NotFound(format!("ACDC not found: {said}")))
    }

    /// Writes a remote contact's `{aid, ...}` metadata blob, keyed by the
    /// alias under which this node knows that remote.
    pub async fn put_remote_meta(&self, alias: &str, bytes: &[u8]) -> Result<()> {
        self.kv.put(&format!("remotes/{alias}/meta.json"), bytes.to_vec()).await
    }

    pub async fn get_remote_meta(&self, alias: &str) -> Result<Vec<u8>> {
        self.kv
            .get(&format!("remotes/{alias}/meta.json"))
            .await?
            .ok_or_else(|| Error::NotFound(format!("remote metadata not found: {alias}")))
    }

    pub async fn put_schema(&self, said: &str, bytes: &[u8]) -> Result<()> {
        self.kv.put(&format!("schema/{said}"), bytes.to_vec()).await
    }

    pub async fn get_schema(&self, said: &str) -> Result<Vec<u8>> {
        self.kv
            .get(&format!("schema/{said}"))
            .await?
            .ok_or_else(|| Error::NotFound(format!("schema not found: {said}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cesr::signer::Signer;
    use crate::events::incept::InceptionEventBuilder;
    use crate::events::interact::InteractEventBuilder;

    fn store() -> Store {
        Store::new(Arc::new(MemoryKv::new()))
    }

    #[tokio::test]
    async fn put_and_get_round_trips_raw_event() {
        let store = store();
        let signer = Signer::new_random(false).unwrap();
        let icp = InceptionEventBuilder::new().with_keys(vec![signer.verfer().clone()]).build().unwrap();
        let result = store.put_event(icp.raw()).await.unwrap();
        assert_eq!(result.said, icp.said());

        let back = store.get_event(&result.said).await.unwrap();
        assert_eq!(back, icp.raw());
    }

    #[tokio::test]
    async fn rejects_duplicate_said() {
        let store = store();
        let signer = Signer::new_random(false).unwrap();
        let icp = InceptionEventBuilder::new().with_keys(vec![signer.verfer().clone()]).build().unwrap();
        store.put_event(icp.raw()).await.unwrap();
        assert!(store.put_event(icp.raw()).await.is_err());
    }

    #[tokio::test]
    async fn list_kel_orders_by_sequence_number() {
        let store = store();
        let signer = Signer::new_random(false).unwrap();
        let icp = InceptionEventBuilder::new().with_keys(vec![signer.verfer().clone()]).build().unwrap();
        store.put_event(icp.raw()).await.unwrap();

        let ixn1 = InteractEventBuilder::new(icp.pre(), icp.said()).with_sn(1).build().unwrap();
        store.put_event(ixn1.raw()).await.unwrap();
        let ixn2 = InteractEventBuilder::new(icp.pre(), ixn1.said()).with_sn(2).build().unwrap();
        store.put_event(ixn2.raw()).await.unwrap();

        let events = store.list_kel(icp.pre(), None, None).await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], icp.raw());
        assert_eq!(events[1], ixn1.raw());
        assert_eq!(events[2], ixn2.raw());

        let head = store.get_head(icp.pre(), false).await.unwrap();
        assert_eq!(head.as_deref(), Some(ixn2.said()));
    }

    #[tokio::test]
    async fn get_by_prior_follows_single_chain() {
        let store = store();
        let signer = Signer::new_random(false).unwrap();
        let icp = InceptionEventBuilder::new().with_keys(vec![signer.verfer().clone()]).build().unwrap();
        store.put_event(icp.raw()).await.unwrap();
        let ixn = InteractEventBuilder::new(icp.pre(), icp.said()).with_sn(1).build().unwrap();
        store.put_event(ixn.raw()).await.unwrap();

        let successor = store.get_by_prior(icp.said()).await.unwrap();
        assert_eq!(successor.as_deref(), Some(ixn.said()));
    }

    #[tokio::test]
    async fn alias_round_trips_both_directions() {
        let store = store();
        store.put_alias(Scope::Kel, "alice", "Eaid").await.unwrap();
        assert_eq!(store.alias_to_id(Scope::Kel, "alice").await.unwrap().as_deref(), Some("Eaid"));
        assert_eq!(store.id_to_alias(Scope::Kel, "Eaid").await.unwrap().as_deref(), Some("alice"));

        store.del_alias(Scope::Kel, "alice").await.unwrap();
        assert!(store.alias_to_id(Scope::Kel, "alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn alias_rebinding_to_different_id_conflicts() {
        let store = store();
        store.put_alias(Scope::Kel, "alice", "Eaid1").await.unwrap();
        assert!(store.put_alias(Scope::Kel, "alice", "Eaid2").await.is_err());
    }

    #[tokio::test]
    async fn remote_meta_round_trips() {
        let store = store();
        store.put_remote_meta("bob", br#"{"aid":"Ebob"}"#).await.unwrap();
        assert_eq!(store.get_remote_meta("bob").await.unwrap(), br#"{"aid":"Ebob"}"#);
        assert!(store.get_remote_meta("carol").await.is_err());
    }

    #[tokio::test]
    async fn acdc_and_schema_content_store_round_trip() {
        let store = store();
        store.put_acdc("Ecred", b"{\"d\":\"Ecred\"}").await.unwrap();
        assert_eq!(store.get_acdc("Ecred").await.unwrap(), b"{\"d\":\"Ecred\"}");
        assert!(store.get_schema("Emissing").await.is_err());
    }
}
