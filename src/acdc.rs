//! ACDC (Authentic Chained Data Container): a SAID-addressed credential.
//! The attribute block (`a`) is itself SAID-addressed before being nested
//! into the credential, so it can be referenced or disclosed independently
//! of the credential's own SAID; edges (`e`) reference other ACDCs by their
//! SAID plus the schema SAID they are expected to satisfy.

use crate::error::{Error, Result};
use crate::events::Serder;
use crate::said::{saidify, DEFAULT_SAID_CODE};
use crate::version::PROTO_ACDC;
use serde_json::{Map, Value};

pub struct AcdcBuilder {
    issuer: String,
    schema: String,
    registry: Option<String>,
    attrs: Map<String, Value>,
    edges: Vec<(String, Edge)>,
}

/// One named edge: the SAID of the referenced ACDC, and (when the edge
/// chains to a specific schema) that schema's SAID.
pub struct Edge {
    pub node: String,
    pub schema: Option<String>,
}

impl AcdcBuilder {
    pub fn new(issuer: impl Into<String>, schema: impl Into<String>) -> Self {
        Self { issuer: issuer.into(), schema: schema.into(), registry: None, attrs: Map::new(), edges: Vec::new() }
    }

    pub fn with_registry(mut self, registry: impl Into<String>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    pub fn with_edge(mut self, name: impl Into<String>, edge: Edge) -> Self {
        self.edges.push((name.into(), edge));
        self
    }

    pub fn build(mut self) -> Result<Serder> {
        self.attrs.insert("i".into(), Value::String(self.issuer.clone()));
        self.attrs.insert("d".into(), Value::String(String::new()));
        saidify(&mut self.attrs, "d", DEFAULT_SAID_CODE)?;

        let mut edges = Map::new();
        for (name, edge) in &self.edges {
            let mut e = Map::new();
            e.insert("n".into(), Value::String(edge.node.clone()));
            if let Some(schema) = &edge.schema {
                e.insert("s".into(), Value::String(schema.clone()));
            }
            edges.insert(name.clone(), Value::Object(e));
        }

        let mut ked = Map::new();
        ked.insert("v".into(), Value::String(String::new()));
        ked.insert("d".into(), Value::String(String::new()));
        ked.insert("i".into(), Value::String(self.issuer));
        if let Some(regk) = &self.registry {
            ked.insert("ri".into(), Value::String(regk.clone()));
        }
        ked.insert("s".into(), Value::String(self.schema));
        ked.insert("a".into(), Value::Object(self.attrs));
        ked.insert("e".into(), Value::Object(edges));

        Serder::from_ked(ked, PROTO_ACDC)
    }
}

/// Verifies that every edge on `acdc` resolves to an ACDC whose own `s`
/// (schema) field matches the edge's declared schema constraint, given a
/// resolver closure the caller supplies (typically backed by the store).
pub fn verify_edges(acdc: &Serder, resolve: impl Fn(&str) -> Option<Serder>) -> Result<()> {
    let edges = acdc
        .get("e")
        .and_then(|v| v.as_object())
        .ok_or_else(|| Error::MalformedEvent("ACDC missing edges block".into()))?;

    for (name, edge) in edges {
        let node = edge
            .get("n")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::MalformedEvent(format!("edge {name} missing node SAID")))?;
        let target = resolve(node).ok_or_else(|| Error::NotFound(format!("edge target not found: {node}")))?;
        if let Some(expected_schema) = edge.get("s").and_then(|v| v.as_str()) {
            let actual_schema = target.get("s").and_then(|v| v.as_str()).unwrap_or_default();
            if actual_schema != expected_schema {
                return Err(Error::ChainViolation(format!(
                    "edge {name} target schema {actual_schema} does not match declared {expected_schema}"
                )));
            }
        }
    }
    Ok(())
}
