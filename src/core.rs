// src/core.rs
//
// =============================================================================
// N8N-CLI: WORKFLOW SCHEMA AUTHORITY
// =============================================================================
//
// The data contracts shared by every subsystem.
// This file defines the in-memory shape of workflow documents as the server
// produces and consumes them.
//
// Design Principles:
// 1. Lenient on input: unknown keys are preserved, not rejected.
// 2. Deterministic on output: connection maps are ordered (BTreeMap).
// 3. Mutation happens on copies: callers clone, edit, then swap.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

/// The `main` connection class. Data connections between regular nodes.
pub const CLASS_MAIN: &str = "main";

/// Connection classes used by AI composition (model, memory, tool, parser).
pub const CLASS_AI_LANGUAGE_MODEL: &str = "ai_languageModel";
pub const CLASS_AI_MEMORY: &str = "ai_memory";
pub const CLASS_AI_TOOL: &str = "ai_tool";
pub const CLASS_AI_OUTPUT_PARSER: &str = "ai_outputParser";

// ============================================================================
// 1. CONNECTIONS
// ============================================================================

/// One endpoint of a connection: the target node, its connection class and
/// the zero-based input index on the target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionEndpoint {
    pub node: String,
    #[serde(rename = "type")]
    pub connection_type: String,
    pub index: u32,
}

/// Fan-out at one source output branch.
pub type Branch = Vec<ConnectionEndpoint>;

/// Per-source port map: output class -> branches (outer index = source
/// output index, inner vec = fan-out at that branch).
pub type PortMap = BTreeMap<String, Vec<Branch>>;

/// source node name -> port map.
///
/// BTreeMap keeps serialization order stable so that applying the same
/// operations to the same workflow yields byte-identical output.
pub type ConnectionMap = BTreeMap<String, PortMap>;

// ============================================================================
// 2. NODES
// ============================================================================

/// What happens when a node errors at runtime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OnError {
    #[serde(rename = "stopWorkflow")]
    StopWorkflow,
    #[serde(rename = "continueRegularOutput")]
    ContinueRegularOutput,
    #[serde(rename = "continueErrorOutput")]
    ContinueErrorOutput,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Opaque server-assigned identifier.
    #[serde(default)]
    pub id: String,

    /// Locally unique display name. Connection endpoints reference this.
    pub name: String,

    /// Fully-qualified type, e.g. "n8n-nodes-base.httpRequest".
    #[serde(rename = "type")]
    pub node_type: String,

    /// Integer-or-decimal version of the node type (1, 2, 3.2, ...).
    #[serde(rename = "typeVersion", default = "default_type_version")]
    pub type_version: f64,

    /// Canvas position. Exactly two finite numbers.
    #[serde(default)]
    pub position: [f64; 2],

    /// Heterogeneous parameter tree (mappings, sequences, scalars,
    /// expression strings).
    #[serde(default = "empty_object")]
    pub parameters: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Value>,

    #[serde(rename = "onError", default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<OnError>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,

    #[serde(rename = "webhookId", default, skip_serializing_if = "Option::is_none")]
    pub webhook_id: Option<String>,

    /// Anything the server sent that we don't model. Preserved verbatim so
    /// round-tripping a document never loses data.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_type_version() -> f64 {
    1.0
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Node {
    pub fn new(name: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            node_type: node_type.into(),
            type_version: 1.0,
            position: [0.0, 0.0],
            parameters: empty_object(),
            credentials: None,
            on_error: None,
            disabled: None,
            webhook_id: None,
            extra: Map::new(),
        }
    }

    /// Render typeVersion the way the catalog stores versions ("1", "3.2").
    /// f64 Display prints the shortest round-trip form, so 2.0 -> "2".
    pub fn type_version_string(&self) -> String {
        format!("{}", self.type_version)
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.unwrap_or(false)
    }
}

// ============================================================================
// 3. THE WORKFLOW
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    /// Server-assigned identifier. Absent before first create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,

    #[serde(default)]
    pub settings: Map<String, Value>,

    pub nodes: Vec<Node>,

    #[serde(default)]
    pub connections: ConnectionMap,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            active: None,
            settings: Map::new(),
            nodes: Vec::new(),
            connections: ConnectionMap::new(),
            tags: None,
            extra: Map::new(),
        }
    }

    pub fn get_node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn get_node_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.name == name)
    }

    pub fn get_node_by_id(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_names(&self) -> HashSet<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    /// Names appearing more than once, each reported once.
    pub fn duplicate_node_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut dups = Vec::new();
        for n in &self.nodes {
            if !seen.insert(n.name.as_str()) && !dups.contains(&n.name) {
                dups.push(n.name.clone());
            }
        }
        dups
    }

    /// Every endpoint of every connection, with its source name and class.
    pub fn iter_endpoints(&self) -> impl Iterator<Item = (&str, &str, &ConnectionEndpoint)> {
        self.connections.iter().flat_map(|(source, ports)| {
            ports.iter().flat_map(move |(class, branches)| {
                branches
                    .iter()
                    .flatten()
                    .map(move |ep| (source.as_str(), class.as_str(), ep))
            })
        })
    }

    /// Rewrite every reference to `old` (source key or endpoint target)
    /// to `new` in a single pass over the connection map.
    pub fn rename_in_connections(&mut self, old: &str, new: &str) {
        let mut rewritten = ConnectionMap::new();
        for (source, mut ports) in std::mem::take(&mut self.connections) {
            for branches in ports.values_mut() {
                for branch in branches.iter_mut() {
                    for ep in branch.iter_mut() {
                        if ep.node == old {
                            ep.node = new.to_string();
                        }
                    }
                }
            }
            let key = if source == old { new.to_string() } else { source };
            rewritten.insert(key, ports);
        }
        self.connections = rewritten;
    }

    /// Drop every connection where `name` is the source or a target.
    /// Used when a node is removed.
    pub fn remove_connections_touching(&mut self, name: &str) {
        self.connections.remove(name);
        for ports in self.connections.values_mut() {
            for branches in ports.values_mut() {
                for branch in branches.iter_mut() {
                    branch.retain(|ep| ep.node != name);
                }
            }
        }
        self.prune_empty_connections();
    }

    /// Remove port classes whose branches are all empty, then sources with
    /// no ports left. Keeps the serialized map free of `"main": [[]]` husks.
    pub fn prune_empty_connections(&mut self) {
        for ports in self.connections.values_mut() {
            ports.retain(|_, branches| branches.iter().any(|b| !b.is_empty()));
        }
        self.connections.retain(|_, ports| !ports.is_empty());
    }

    /// True if some connection out of `source` uses the given class with a
    /// non-empty branch at `index`.
    pub fn has_output_at(&self, source: &str, class: &str, index: usize) -> bool {
        self.connections
            .get(source)
            .and_then(|ports| ports.get(class))
            .and_then(|branches| branches.get(index))
            .map(|b| !b.is_empty())
            .unwrap_or(false)
    }

    /// Endpoints of the given class that point AT `target` (incoming).
    pub fn incoming_of_class<'a>(
        &'a self,
        target: &'a str,
        class: &'a str,
    ) -> Vec<(&'a str, &'a ConnectionEndpoint)> {
        self.iter_endpoints()
            .filter(move |(_, c, ep)| *c == class && ep.node == target)
            .map(|(source, _, ep)| (source, ep))
            .collect()
    }
}
