//! JSON graph documents: types, enums, named nodes and the roots to emit.
//!
//! ```json
//! {
//!   "enums": { "Status": ["Active", "Closed"] },
//!   "types": {
//!     "Order": { "Id": "Guid", "Lines": "List<Line>", "Next": "Order",
//!                "Audit": { "type": "string", "writable": false } },
//!     "Line": { "Qty": "int" }
//!   },
//!   "nodes": {
//!     "o1": { "$type": "Order", "Lines": [{ "Qty": 2 }], "Next": { "$ref": "o1" } }
//!   },
//!   "roots": ["o1"]
//! }
//! ```

use std::borrow::Cow;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Map, Value as Json};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::describe::MemberInfo;
use crate::generator::CodeGenerator;
use crate::path_de::{self, PathError};
use crate::registry::{GraphError, NodeId, NodeView, ObjectGraph, RegistryError, Slot, TypeRegistry};
use crate::types::DeclaredType;
use crate::value::{Point, Scalar};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Shape(#[from] PathError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("at {path}: {source}")]
    Graph {
        path: String,
        #[source]
        source: GraphError,
    },
    #[error("at {path}: {message}")]
    Value { path: String, message: String },
    #[error("at {path}: no node named `{name}`")]
    UnknownNode { path: String, name: String },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDocument {
    #[serde(default)]
    enums: IndexMap<String, Vec<String>>,
    #[serde(default)]
    types: IndexMap<String, IndexMap<String, RawMember>>,
    #[serde(default)]
    nodes: IndexMap<String, Map<String, Json>>,
    #[serde(default)]
    roots: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawMember {
    Short(String),
    Full(RawMemberSpec),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMemberSpec {
    #[serde(rename = "type")]
    ty: String,
    #[serde(default = "yes")]
    readable: bool,
    #[serde(default = "yes")]
    writable: bool,
    #[serde(default)]
    indexed: bool,
}

fn yes() -> bool {
    true
}

/// A loaded document: its graph plus the named nodes and roots.
#[derive(Debug, Clone)]
pub struct GraphDocument {
    graph: ObjectGraph,
    names: IndexMap<String, NodeId>,
    roots: Vec<NodeId>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl GraphDocument {
    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let src = std::fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&src)
    }

    pub fn from_json(src: &str) -> Result<Self, DocumentError> {
        Self::build(path_de::from_str_with_path(src)?)
    }

    pub fn from_value(value: Json) -> Result<Self, DocumentError> {
        Self::build(path_de::from_value_with_path(value)?)
    }

    pub fn graph(&self) -> &ObjectGraph {
        &self.graph
    }

    pub fn registry(&self) -> &TypeRegistry {
        self.graph.registry()
    }

    pub fn node(&self, name: &str) -> Option<NodeView<'_>> {
        self.names.get(name).map(|id| self.graph.view(*id))
    }

    pub fn root_ids(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn roots(&self) -> impl Iterator<Item = NodeView<'_>> {
        self.roots.iter().map(|id| self.graph.view(*id))
    }

    /// Generator over this document's roots with default options.
    pub fn generator(&self) -> CodeGenerator<'_> {
        CodeGenerator::new(self.roots())
    }

    fn build(raw: RawDocument) -> Result<Self, DocumentError> {
        let mut registry = TypeRegistry::new();
        for (name, variants) in raw.enums {
            registry.register_enum(&name, variants)?;
        }
        for (name, members) in &raw.types {
            let members = members
                .iter()
                .map(|(member, raw)| member_info(&registry, name, member, raw))
                .collect::<Result<Vec<_>, _>>()?;
            registry.register_object(name, members)?;
        }
        registry.validate()?;

        let mut loader = Loader { graph: ObjectGraph::new(registry), names: IndexMap::new() };

        // allocate every named node first so `$ref` can point forward
        for (name, fields) in &raw.nodes {
            let path = format!("nodes.{name}");
            let type_name = fields.get("$type").and_then(Json::as_str).ok_or_else(|| DocumentError::Value {
                path: path.clone(),
                message: "named nodes need a string \"$type\"".into(),
            })?;
            let id = loader
                .graph
                .add_node(type_name)
                .map_err(|source| DocumentError::Graph { path, source })?;
            loader.names.insert(name.clone(), id);
        }
        for (name, fields) in &raw.nodes {
            let id = loader.names[name];
            loader.fill(id, fields, &format!("nodes.{name}"))?;
        }

        let roots = raw
            .roots
            .iter()
            .enumerate()
            .map(|(i, name)| {
                loader.names.get(name).copied().ok_or_else(|| DocumentError::UnknownNode {
                    path: format!("roots[{i}]"),
                    name: name.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            types = loader.graph.registry().objects().count(),
            nodes = loader.graph.len(),
            roots = roots.len(),
            "graph document loaded"
        );
        Ok(Self { graph: loader.graph, names: loader.names, roots })
    }
}

fn member_info(
    registry: &TypeRegistry,
    owner: &str,
    member: &str,
    raw: &RawMember,
) -> Result<MemberInfo, RegistryError> {
    let (src, readable, writable, indexed) = match raw {
        RawMember::Short(src) => (src.as_str(), true, true, false),
        RawMember::Full(full) => (full.ty.as_str(), full.readable, full.writable, full.indexed),
    };
    let ty = registry.parse_type(src).map_err(|source| RegistryError::MemberType {
        owner: owner.to_string(),
        member: member.to_string(),
        source,
    })?;
    Ok(MemberInfo { name: member.to_string(), ty, readable, writable, indexed })
}

struct Loader {
    graph: ObjectGraph,
    names: IndexMap<String, NodeId>,
}

impl Loader {
    fn fill(&mut self, id: NodeId, fields: &Map<String, Json>, path: &str) -> Result<(), DocumentError> {
        let owner = self.graph.type_of(id).unwrap_or_default().to_string();
        for (key, json) in fields {
            if key == "$type" {
                continue;
            }
            let member_path = format!("{path}.{key}");
            let ty = self
                .graph
                .registry()
                .object(&owner)
                .and_then(|o| o.member(key))
                .map(|m| m.ty.clone())
                .ok_or_else(|| DocumentError::Graph {
                    path: member_path.clone(),
                    source: GraphError::UnknownMember { owner: owner.clone(), member: key.clone() },
                })?;
            let slot = self.convert(&ty, json, &member_path)?;
            self.graph
                .set(id, key, slot)
                .map_err(|source| DocumentError::Graph { path: member_path, source })?;
        }
        Ok(())
    }

    fn convert(&mut self, ty: &DeclaredType, json: &Json, path: &str) -> Result<Slot, DocumentError> {
        if json.is_null() {
            return Ok(Slot::Null);
        }
        let scalar = match ty {
            DeclaredType::Nullable(inner) => return self.convert(inner, json, path),
            DeclaredType::Collection(element) => {
                let items = json.as_array().ok_or_else(|| unexpected(path, "an array", json))?;
                let slots = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.convert(element, item, &format!("{path}[{i}]")))
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(Slot::List(slots));
            }
            DeclaredType::Object(name) => return self.object(name, json, path),
            DeclaredType::Int16 => Scalar::Int16(integer(json, path)?),
            DeclaredType::Int32 => Scalar::Int32(integer(json, path)?),
            DeclaredType::Int64 => Scalar::Int64(integer(json, path)?),
            DeclaredType::Single => Scalar::Single(float(json, path)? as f32),
            DeclaredType::Double => Scalar::Double(float(json, path)?),
            DeclaredType::Decimal => Scalar::Decimal(decimal(json, path)?),
            DeclaredType::Boolean => {
                Scalar::Boolean(json.as_bool().ok_or_else(|| unexpected(path, "a boolean", json))?)
            }
            DeclaredType::String => Scalar::String(Cow::Owned(text(json, path)?.to_string())),
            DeclaredType::DateTime => Scalar::DateTime(datetime(text(json, path)?, path)?),
            DeclaredType::DateTimeOffset => {
                let src = text(json, path)?;
                let dto = DateTime::parse_from_rfc3339(src)
                    .map_err(|e| invalid(path, format!("`{src}` is not an RFC 3339 timestamp: {e}")))?;
                Scalar::DateTimeOffset(dto)
            }
            DeclaredType::TimeSpan => {
                let ticks: i64 = integer(json, path)?;
                Scalar::TimeSpan(TimeDelta::microseconds(ticks / 10) + TimeDelta::nanoseconds((ticks % 10) * 100))
            }
            DeclaredType::Guid => {
                let src = text(json, path)?;
                Scalar::Guid(Uuid::parse_str(src).map_err(|e| invalid(path, format!("`{src}` is not a GUID: {e}")))?)
            }
            DeclaredType::Point => Scalar::Point(point(json, path)?),
            DeclaredType::Enum(_) => Scalar::Enum(Cow::Owned(text(json, path)?.to_string())),
        };
        Ok(Slot::Scalar(scalar))
    }

    /// `{"$ref": "name"}` or an inline object, optionally with its own `$type`.
    fn object(&mut self, declared: &str, json: &Json, path: &str) -> Result<Slot, DocumentError> {
        let map = json.as_object().ok_or_else(|| unexpected(path, "an object", json))?;
        if let Some(target) = map.get("$ref") {
            if map.len() != 1 {
                return Err(invalid(path, "`$ref` cannot be combined with other members".into()));
            }
            let name = target.as_str().ok_or_else(|| unexpected(path, "a node name", target))?;
            return self
                .names
                .get(name)
                .map(|id| Slot::Node(*id))
                .ok_or_else(|| DocumentError::UnknownNode { path: path.to_string(), name: name.to_string() });
        }
        let type_name = match map.get("$type") {
            Some(t) => t.as_str().ok_or_else(|| unexpected(path, "a type name", t))?,
            None => declared,
        };
        let id = self
            .graph
            .add_node(type_name)
            .map_err(|source| DocumentError::Graph { path: path.to_string(), source })?;
        self.fill(id, map, path)?;
        Ok(Slot::Node(id))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn kind_of(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

fn unexpected(path: &str, expected: &str, found: &Json) -> DocumentError {
    invalid(path, format!("expected {expected}, found {}", kind_of(found)))
}

fn invalid(path: &str, message: String) -> DocumentError {
    DocumentError::Value { path: path.to_string(), message }
}

fn text<'j>(json: &'j Json, path: &str) -> Result<&'j str, DocumentError> {
    json.as_str().ok_or_else(|| unexpected(path, "a string", json))
}

fn integer<T: TryFrom<i64>>(json: &Json, path: &str) -> Result<T, DocumentError> {
    let n = json.as_i64().ok_or_else(|| unexpected(path, "an integer", json))?;
    T::try_from(n).map_err(|_| invalid(path, format!("{n} is out of range")))
}

/// Numbers, or the strings `NaN`, `Infinity` and `-Infinity`.
fn float(json: &Json, path: &str) -> Result<f64, DocumentError> {
    match json {
        Json::Number(n) => n.as_f64().ok_or_else(|| unexpected(path, "a number", json)),
        Json::String(s) => match s.as_str() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            other => Err(invalid(path, format!("`{other}` is not a number"))),
        },
        other => Err(unexpected(path, "a number", other)),
    }
}

fn decimal(json: &Json, path: &str) -> Result<Decimal, DocumentError> {
    let src = match json {
        Json::Number(n) => n.to_string(),
        Json::String(s) => s.clone(),
        other => return Err(unexpected(path, "a decimal", other)),
    };
    Decimal::from_str(&src)
        .or_else(|_| Decimal::from_scientific(&src))
        .map_err(|e| invalid(path, format!("`{src}` is not a decimal: {e}")))
}

/// ISO-8601 date-time without offset; a bare date means midnight.
fn datetime(src: &str, path: &str) -> Result<NaiveDateTime, DocumentError> {
    src.parse::<NaiveDateTime>()
        .or_else(|_| NaiveDateTime::parse_from_str(src, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| src.parse::<NaiveDate>().ok().and_then(|d| d.and_hms_opt(0, 0, 0)))
        .ok_or_else(|| invalid(path, format!("`{src}` is not an ISO-8601 date-time")))
}

/// `[x, y]` or `[x, y, z]`; null coordinates are NaN.
fn point(json: &Json, path: &str) -> Result<Point, DocumentError> {
    let coords = json.as_array().ok_or_else(|| unexpected(path, "an array of coordinates", json))?;
    if !(2..=3).contains(&coords.len()) {
        return Err(invalid(path, format!("a point needs 2 or 3 coordinates, found {}", coords.len())));
    }
    let mut xyz = [f64::NAN; 3];
    for (i, c) in coords.iter().enumerate() {
        if !c.is_null() {
            xyz[i] = float(c, &format!("{path}[{i}]"))?;
        }
    }
    Ok(Point::new(xyz[0], xyz[1], xyz[2]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order_doc(nodes: Json, roots: Json) -> Json {
        json!({
            "enums": { "Status": ["Active", "Closed"] },
            "types": {
                "T": { "Id": "Guid", "Count": "int", "Name": "string" },
                "Order": {
                    "Name": "string",
                    "State": "Status",
                    "Total": "decimal?",
                    "Placed": "DateTimeOffset",
                    "Lines": "List<Line>",
                    "Next": "Order",
                    "Audit": { "type": "string", "writable": false }
                },
                "Line": { "Qty": "int", "Where": "Point", "Took": "TimeSpan", "At": "DateTime" }
            },
            "nodes": nodes,
            "roots": roots
        })
    }

    fn generate(doc: Json) -> String {
        GraphDocument::from_value(doc).unwrap().generator().generate().unwrap()
    }

    #[test]
    fn guid_scenario() {
        let doc = order_doc(
            json!({ "t": { "$type": "T", "Id": "11111111-1111-1111-1111-111111111111", "Count": 0, "Name": "foo" } }),
            json!(["t"]),
        );
        assert_eq!(
            generate(doc),
            "public IEnumerable<object> Generate(){\n\
             yield return new T { Id = Guid.Parse(\"11111111-1111-1111-1111-111111111111\"), Name = \"foo\" };\n\
             }"
        );
    }

    #[test]
    fn forward_refs_and_cycles() {
        let doc = order_doc(
            json!({
                "a": { "$type": "Order", "Name": "A", "Next": { "$ref": "b" } },
                "b": { "$type": "Order", "Name": "B", "State": "Closed", "Next": { "$ref": "a" } }
            }),
            json!(["a"]),
        );
        let code = generate(doc);
        assert!(code.contains(
            "new Order { Name = \"A\", State = Active, Lines = new List<Line>(), \
             Next = new Order { Name = \"B\", State = Closed, Lines = new List<Line>() } }"
        ));
    }

    #[test]
    fn inline_objects_and_typed_literals() {
        let doc = order_doc(
            json!({
                "o": {
                    "$type": "Order",
                    "Total": "0",
                    "Placed": "2024-05-06T07:08:09.5+02:00",
                    "Audit": "ignored",
                    "Lines": [
                        { "Qty": 3, "Where": [1.5, null], "Took": 15000000, "At": "2024-01-02" },
                        { "$type": "Line", "Qty": 0 }
                    ]
                }
            }),
            json!(["o"]),
        );
        assert_eq!(
            generate(doc),
            "public IEnumerable<object> Generate(){\n\
             yield return new Order { State = Active, Total = 0m, \
             Placed = new DateTimeOffset(2024,5,6,7,8,9, TimeSpan.FromTicks(72000000000)), \
             Lines = new List<Line>() { \
             new Line { Qty = 3, Where = new Point(1.5,double.NaN,double.NaN), \
             Took = TimeSpan.FromTicks(15000000), At = new DateTime(2024,1,2,0,0,0) }, \
             new Line { } } };\n\
             }"
        );
    }

    #[test]
    fn floats_accept_symbolic_strings() {
        let doc = json!({
            "types": { "M": { "V": "double", "S": "float" } },
            "nodes": { "m": { "$type": "M", "V": "NaN", "S": "-Infinity" } },
            "roots": ["m"]
        });
        assert!(generate(doc).contains("new M { V = double.NaN, S = float.NegativeInfinity }"));
    }

    #[test]
    fn errors_carry_paths() {
        let doc = order_doc(json!({ "t": { "$type": "T", "Count": "many" } }), json!(["t"]));
        let err = GraphDocument::from_value(doc).unwrap_err();
        assert_eq!(err.to_string(), "at nodes.t.Count: expected an integer, found a string");

        let doc = order_doc(
            json!({ "o": { "$type": "Order", "Lines": [{ "Qty": 1 }, { "Qty": 99999999999i64 }] } }),
            json!(["o"]),
        );
        let err = GraphDocument::from_value(doc).unwrap_err();
        assert!(err.to_string().starts_with("at nodes.o.Lines[1].Qty: 99999999999 is out of range"));

        let doc = order_doc(json!({ "o": { "$type": "Order", "State": "Open" } }), json!(["o"]));
        assert!(matches!(
            GraphDocument::from_value(doc),
            Err(DocumentError::Graph { source: GraphError::UnknownVariant { .. }, .. })
        ));

        let doc = order_doc(json!({ "o": { "$type": "Order", "Next": { "$ref": "zz" } } }), json!(["o"]));
        assert!(matches!(GraphDocument::from_value(doc), Err(DocumentError::UnknownNode { .. })));

        let doc = order_doc(json!({}), json!(["missing"]));
        assert!(matches!(
            GraphDocument::from_value(doc),
            Err(DocumentError::UnknownNode { path, .. }) if path == "roots[0]"
        ));
    }

    #[test]
    fn unsupported_member_types_are_rejected() {
        let doc = json!({ "types": { "Bag": { "Map": "Dictionary<string, int>" } } });
        assert!(matches!(
            GraphDocument::from_value(doc),
            Err(DocumentError::Registry(RegistryError::MemberType { .. }))
        ));

        let doc = json!({ "types": { "Bag": { "Owner": "Customer" } } });
        assert!(matches!(
            GraphDocument::from_value(doc),
            Err(DocumentError::Registry(RegistryError::UnknownType { .. }))
        ));
    }

    #[test]
    fn unknown_document_keys_report_their_path() {
        let err = GraphDocument::from_json(r#"{ "types": { "A": { "X": { "type": "int", "hidden": true } } } }"#)
            .unwrap_err();
        assert!(matches!(err, DocumentError::Shape(_)));

        let err = GraphDocument::from_json(r#"{ "roots": "a" }"#).unwrap_err();
        match err {
            DocumentError::Shape(e) => assert_eq!(e.path, "roots"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn member_order_follows_declaration() {
        let doc = json!({
            "types": { "P": { "Z": "int", "A": "int", "M": "int" } },
            "nodes": { "p": { "$type": "P", "A": 1, "M": 2, "Z": 3 } },
            "roots": ["p"]
        });
        assert!(generate(doc).contains("new P { Z = 3, A = 1, M = 2 }"));
    }

    #[test]
    fn named_lookup() {
        let doc = order_doc(json!({ "t": { "$type": "T", "Count": 5 } }), json!([]));
        let doc = GraphDocument::from_value(doc).unwrap();
        assert!(doc.node("t").is_some());
        assert!(doc.node("u").is_none());
        assert!(doc.root_ids().is_empty());
        assert_eq!(doc.generator().generate().unwrap(), "public IEnumerable<object> Generate(){\n}");
    }
}
