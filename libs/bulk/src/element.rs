//! Graph element data model.
//!
//! Elements are built by the upstream parser and handed to the bulk engine
//! already typed. The engine never mutates them; they are shared between a
//! write operation, its outcome and the batch report through `Arc`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Typed property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Boolean(v) => write!(f, "{}", v),
            PropertyValue::Integer(v) => write!(f, "{}", v),
            PropertyValue::Float(v) => write!(f, "{}", v),
            PropertyValue::String(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Boolean(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Integer(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

/// Property name to value mapping, kept in name order.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A vertex to be written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: String,
    pub label: String,
    pub partition_key: String,
    #[serde(default)]
    pub properties: Properties,
}

impl Vertex {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        partition_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            partition_key: partition_key.into(),
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

/// An edge to be written between two existing vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub label: String,
    pub partition_key: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(default)]
    pub properties: Properties,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        partition_key: impl Into<String>,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            partition_key: partition_key.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

/// A vertex or an edge.
///
/// Serialized with a `kind` tag so element records can be read one per line:
///
/// ```json
/// {"kind":"vertex","id":"v1","label":"station","partition_key":"NY","properties":{"name":"Penn"}}
/// {"kind":"edge","id":"e1","label":"route","partition_key":"NY","source_id":"v1","target_id":"v2"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphElement {
    Vertex(Vertex),
    Edge(Edge),
}

impl GraphElement {
    pub fn id(&self) -> &str {
        match self {
            GraphElement::Vertex(v) => &v.id,
            GraphElement::Edge(e) => &e.id,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            GraphElement::Vertex(v) => &v.label,
            GraphElement::Edge(e) => &e.label,
        }
    }

    pub fn partition_key(&self) -> &str {
        match self {
            GraphElement::Vertex(v) => &v.partition_key,
            GraphElement::Edge(e) => &e.partition_key,
        }
    }

    pub fn properties(&self) -> &Properties {
        match self {
            GraphElement::Vertex(v) => &v.properties,
            GraphElement::Edge(e) => &e.properties,
        }
    }

    pub fn is_vertex(&self) -> bool {
        matches!(self, GraphElement::Vertex(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GraphElement::Vertex(_) => "vertex",
            GraphElement::Edge(_) => "edge",
        }
    }
}

impl fmt::Display for GraphElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphElement::Vertex(v) => {
                write!(f, "vertex {} ({}) pk={}", v.id, v.label, v.partition_key)
            }
            GraphElement::Edge(e) => write!(
                f,
                "edge {} ({}) {} -> {} pk={}",
                e.id, e.label, e.source_id, e.target_id, e.partition_key
            ),
        }
    }
}

impl From<Vertex> for GraphElement {
    fn from(v: Vertex) -> Self {
        GraphElement::Vertex(v)
    }
}

impl From<Edge> for GraphElement {
    fn from(e: Edge) -> Self {
        GraphElement::Edge(e)
    }
}
