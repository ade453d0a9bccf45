//! Graph builder: projects the store's KEL/TEL/ACDC content into a generic
//! node/edge view for traversal and rendering layers outside this crate.
//!
//! Construction walks AIDs and registries in sorted order and each log in
//! its stored sequence, so two runs over the same store produce identical
//! node and edge orderings.

use crate::error::Result;
use crate::indexer::discover_aids_and_registries;
use crate::parser;
use crate::store::Store;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Aid,
    KelEvt,
    TelRegistry,
    TelEvt,
    Acdc,
    Schema,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeKind {
    Prior,
    Anchor,
    Issues,
    Revokes,
    ParentRegistry,
    SchemaOf,
    HolderOf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Traversal scope/limit options (§4.10).
#[derive(Debug, Clone, Default)]
pub struct GraphOpts {
    /// Restrict the walk to a single AID's KEL and the registries it anchors.
    pub aid: Option<String>,
    /// Stop once this many nodes have been added.
    pub limit: Option<usize>,
}

struct Builder {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    seen: std::collections::HashSet<String>,
    limit: Option<usize>,
}

impl Builder {
    fn at_limit(&self) -> bool {
        self.limit.is_some_and(|l| self.nodes.len() >= l)
    }

    fn add_node(&mut self, id: &str, kind: NodeKind) -> bool {
        if self.at_limit() {
            return false;
        }
        if self.seen.insert(id.to_string()) {
            self.nodes.push(Node { id: id.to_string(), kind });
        }
        true
    }

    fn add_edge(&mut self, from: &str, to: &str, kind: EdgeKind) {
        self.edges.push(Edge { from: from.to_string(), to: to.to_string(), kind });
    }
}

/// Walks `store` and builds the node/edge graph described in §4.10.
pub async fn build_graph(store: &Store, opts: GraphOpts) -> Result<Graph> {
    let (mut aids, registries) = discover_aids_and_registries(store).await?;
    if let Some(wanted) = &opts.aid {
        aids.retain(|a| a == wanted);
    }

    let mut b = Builder { nodes: Vec::new(), edges: Vec::new(), seen: Default::default(), limit: opts.limit };

    for aid in &aids {
        if !b.add_node(aid, NodeKind::Aid) {
            return Ok(Graph { nodes: b.nodes, edges: b.edges });
        }

        let raws = store.list_kel(aid, None, None).await?;
        let mut prev_said: Option<String> = None;
        for raw in &raws {
            let meta = parser::parse(raw)?.meta;
            if !b.add_node(&meta.d, NodeKind::KelEvt) {
                return Ok(Graph { nodes: b.nodes, edges: b.edges });
            }
            match &prev_said {
                Some(prior) => b.add_edge(&meta.d, prior, EdgeKind::Prior),
                None => b.add_edge(&meta.d, aid, EdgeKind::Prior),
            }
            prev_said = Some(meta.d.clone());

            if let Some(Value::Array(seals)) = &meta.a {
                for seal in seals {
                    if let Some(reg_said) = seal.get("i").and_then(|v| v.as_str()) {
                        if registries.iter().any(|r| r == reg_said) {
                            b.add_edge(&meta.d, reg_said, EdgeKind::Anchor);
                        }
                    }
                }
            }
        }
    }

    for ri in &registries {
        if opts.aid.is_some() {
            let owner = store.get_meta(ri).await.ok().and_then(|m| m.ii);
            if owner.as_deref() != opts.aid.as_deref() {
                continue;
            }
        }
        if !b.add_node(ri, NodeKind::TelRegistry) {
            return Ok(Graph { nodes: b.nodes, edges: b.edges });
        }

        let raws = store.list_tel(ri).await?;
        let mut prev_said: Option<String> = None;
        for raw in &raws {
            let meta = parser::parse(raw)?.meta;
            // The registry's own inception SAID equals `ri`; it's already
            // the TelRegistry node, so it gets no separate TelEvt node or
            // self-referencing Prior edge.
            let is_vcp_root = meta.d == *ri;

            if meta.t == "vcp" {
                if let Some(parent_said) =
                    meta.e.as_ref().and_then(|e| e.get("parent")).and_then(|p| p.get("n")).and_then(|n| n.as_str())
                {
                    b.add_node(parent_said, NodeKind::TelRegistry);
                    b.add_edge(ri, parent_said, EdgeKind::ParentRegistry);
                }
            }
            if !is_vcp_root && !b.add_node(&meta.d, NodeKind::TelEvt) {
                return Ok(Graph { nodes: b.nodes, edges: b.edges });
            }
            if !is_vcp_root {
                match &prev_said {
                    Some(prior) => b.add_edge(&meta.d, prior, EdgeKind::Prior),
                    None => b.add_edge(&meta.d, ri, EdgeKind::Prior),
                }
            }
            prev_said = Some(meta.d.clone());

            match meta.t.as_str() {
                "iss" => {
                    b.add_node(&meta.i, NodeKind::Acdc);
                    b.add_edge(&meta.d, &meta.i, EdgeKind::Issues);
                    add_acdc_links(store, &mut b, &meta.i).await?;
                }
                "rev" => {
                    b.add_node(&meta.i, NodeKind::Acdc);
                    b.add_edge(&meta.d, &meta.i, EdgeKind::Revokes);
                }
                "ixn" => {
                    if let Some(Value::Array(seals)) = &meta.a {
                        for seal in seals {
                            if let Some(child) = seal.get("i").and_then(|v| v.as_str()) {
                                if registries.iter().any(|r| r == child) {
                                    b.add_node(child, NodeKind::TelRegistry);
                                    b.add_edge(child, ri, EdgeKind::ParentRegistry);
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }

    Ok(Graph { nodes: b.nodes, edges: b.edges })
}

async fn add_acdc_links(store: &Store, b: &mut Builder, cred_said: &str) -> Result<()> {
    let Ok(bytes) = store.get_acdc(cred_said).await else { return Ok(()) };
    let Ok(acdc): std::result::Result<Value, _> = serde_json::from_slice(&bytes) else { return Ok(()) };

    if let Some(schema_said) = acdc.get("s").and_then(|v| v.as_str()) {
        b.add_node(schema_said, NodeKind::Schema);
        b.add_edge(cred_said, schema_said, EdgeKind::SchemaOf);
    }
    if let Some(holder) = acdc.get("a").and_then(|a| a.get("i")).and_then(|v| v.as_str()) {
        if b.seen.contains(holder) {
            b.add_edge(holder, cred_said, EdgeKind::HolderOf);
        } else {
            b.add_node(holder, NodeKind::Aid);
            b.add_edge(holder, cred_said, EdgeKind::HolderOf);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::build_signed_stream;
    use crate::cesr::signer::Signer;
    use crate::events::incept::InceptionEventBuilder;
    use crate::store::MemoryKv;
    use crate::tel::registry::RegistryInceptionBuilder;
    use crate::tel::ilks as tel_ilks;
    use std::sync::Arc;

    fn store() -> Store {
        Store::new(Arc::new(MemoryKv::new()))
    }

    #[tokio::test]
    async fn builds_aid_and_kel_event_nodes() {
        let store = store();
        let signer = Signer::new_random(true).unwrap();
        let icp = InceptionEventBuilder::new().with_keys(vec![signer.verfer().clone()]).build().unwrap();
        let siger = signer.sign_indexed(icp.raw(), 0, None).unwrap();
        store.put_event(&build_signed_stream(icp.raw(), &[siger]).unwrap()).await.unwrap();

        let graph = build_graph(&store, GraphOpts::default()).await.unwrap();
        assert!(graph.nodes.iter().any(|n| n.id == icp.pre() && n.kind == NodeKind::Aid));
        assert!(graph.nodes.iter().any(|n| n.id == icp.said() && n.kind == NodeKind::KelEvt));
        assert!(graph.edges.iter().any(|e| e.from == icp.said() && e.to == icp.pre() && e.kind == EdgeKind::Prior));
    }

    #[tokio::test]
    async fn builds_registry_and_issuance_nodes() {
        let store = store();
        let signer = Signer::new_random(true).unwrap();
        let icp = InceptionEventBuilder::new().with_keys(vec![signer.verfer().clone()]).build().unwrap();
        let icp_sig = signer.sign_indexed(icp.raw(), 0, None).unwrap();
        store.put_event(&build_signed_stream(icp.raw(), &[icp_sig]).unwrap()).await.unwrap();

        let vcp = RegistryInceptionBuilder::new(icp.pre()).no_backers().build().unwrap();
        assert_eq!(vcp.ilk(), tel_ilks::VCP);
        store.put_event(vcp.raw()).await.unwrap();

        let graph = build_graph(&store, GraphOpts::default()).await.unwrap();
        assert!(graph.nodes.iter().any(|n| n.id == vcp.pre() && n.kind == NodeKind::TelRegistry));
    }

    #[tokio::test]
    async fn nested_registry_gets_parent_edge() {
        let store = store();
        let signer = Signer::new_random(true).unwrap();
        let icp = InceptionEventBuilder::new().with_keys(vec![signer.verfer().clone()]).build().unwrap();
        let icp_sig = signer.sign_indexed(icp.raw(), 0, None).unwrap();
        store.put_event(&build_signed_stream(icp.raw(), &[icp_sig]).unwrap()).await.unwrap();

        let parent = RegistryInceptionBuilder::new(icp.pre()).no_backers().build().unwrap();
        store.put_event(parent.raw()).await.unwrap();
        let child = RegistryInceptionBuilder::new(icp.pre())
            .no_backers()
            .with_parent(parent.pre())
            .build()
            .unwrap();
        store.put_event(child.raw()).await.unwrap();

        let graph = build_graph(&store, GraphOpts::default()).await.unwrap();
        assert!(graph.edges.iter().any(|e| e.from == child.pre()
            && e.to == parent.pre()
            && e.kind == EdgeKind::ParentRegistry));
    }

    #[tokio::test]
    async fn respects_node_limit() {
        let store = store();
        let signer = Signer::new_random(true).unwrap();
        let icp = InceptionEventBuilder::new().with_keys(vec![signer.verfer().clone()]).build().unwrap();
        let siger = signer.sign_indexed(icp.raw(), 0, None).unwrap();
        store.put_event(&build_signed_stream(icp.raw(), &[siger]).unwrap()).await.unwrap();

        let graph = build_graph(&store, GraphOpts { aid: None, limit: Some(1) }).await.unwrap();
        assert_eq!(graph.nodes.len(), 1);
    }
}
