//! Runtime type registry and an arena of dynamically typed objects.
//!
//! Shapes that are only known at runtime are registered here once (type name →
//! ordered member descriptors) and their instances live in an [`ObjectGraph`].
//! Nodes reference each other by [`NodeId`], so cyclic graphs need no shared
//! ownership.

use std::borrow::Cow;

use indexmap::IndexMap;
use serde_json::json;
use thiserror::Error;

use crate::describe::{Describe, MemberInfo, NodeKey, ReadError};
use crate::types::{self, DeclaredType, TypeParseError};
use crate::value::{Scalar, Value};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectType {
    pub name: String,
    pub members: Vec<MemberInfo>,
}

impl ObjectType {
    pub fn member(&self, name: &str) -> Option<&MemberInfo> {
        self.members.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    pub name: String,
    pub variants: Vec<String>,
}

impl EnumType {
    pub fn has_variant(&self, variant: &str) -> bool {
        self.variants.iter().any(|v| v == variant)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("`{0}` is not a valid identifier")]
    InvalidName(String),
    #[error("type `{0}` is registered twice")]
    Duplicate(String),
    #[error("type `{owner}` declares member `{member}` twice")]
    DuplicateMember { owner: String, member: String },
    #[error("enum `{0}` has no variants")]
    EmptyEnum(String),
    #[error("`{owner}.{member}`: {source}")]
    MemberType {
        owner: String,
        member: String,
        #[source]
        source: TypeParseError,
    },
    #[error("`{owner}.{member}` refers to unregistered type `{missing}`")]
    UnknownType { owner: String, member: String, missing: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("type `{0}` is not registered")]
    UnknownType(String),
    #[error("type `{owner}` has no member `{member}`")]
    UnknownMember { owner: String, member: String },
    #[error("`{owner}.{member}` is declared as `{declared}` and cannot hold this value")]
    TypeMismatch { owner: String, member: String, declared: DeclaredType },
    #[error("enum `{name}` has no variant `{variant}`")]
    UnknownVariant { name: String, variant: String },
    #[error("node #{0} does not exist")]
    UnknownNode(usize),
}

// ————————————————————————————————————————————————————————————————————————————
// REGISTRY
// ————————————————————————————————————————————————————————————————————————————

/// Ordered object and enum descriptors.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    objects: IndexMap<String, ObjectType>,
    enums: IndexMap<String, EnumType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_enum<I, S>(&mut self, name: &str, variants: I) -> Result<(), RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.check_new_name(name)?;
        let variants: Vec<String> = variants.into_iter().map(Into::into).collect();
        if variants.is_empty() {
            return Err(RegistryError::EmptyEnum(name.to_string()));
        }
        if let Some(bad) = variants.iter().find(|v| !types::is_identifier(v)) {
            return Err(RegistryError::InvalidName(bad.clone()));
        }
        self.enums.insert(name.to_string(), EnumType { name: name.to_string(), variants });
        Ok(())
    }

    pub fn register_object(&mut self, name: &str, members: Vec<MemberInfo>) -> Result<(), RegistryError> {
        self.check_new_name(name)?;
        for (i, member) in members.iter().enumerate() {
            if !types::is_identifier(&member.name) {
                return Err(RegistryError::InvalidName(member.name.clone()));
            }
            if members[..i].iter().any(|m| m.name == member.name) {
                return Err(RegistryError::DuplicateMember {
                    owner: name.to_string(),
                    member: member.name.clone(),
                });
            }
        }
        self.objects.insert(name.to_string(), ObjectType { name: name.to_string(), members });
        Ok(())
    }

    fn check_new_name(&self, name: &str) -> Result<(), RegistryError> {
        if !types::is_identifier(name) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        if self.objects.contains_key(name) || self.enums.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        Ok(())
    }

    /// Parse a type expression against the enums registered so far.
    pub fn parse_type(&self, src: &str) -> Result<DeclaredType, TypeParseError> {
        DeclaredType::parse(src, &|name| self.enums.contains_key(name))
    }

    pub fn object(&self, name: &str) -> Option<&ObjectType> {
        self.objects.get(name)
    }

    pub fn enumeration(&self, name: &str) -> Option<&EnumType> {
        self.enums.get(name)
    }

    pub fn objects(&self) -> impl Iterator<Item = &ObjectType> {
        self.objects.values()
    }

    pub fn enums(&self) -> impl Iterator<Item = &EnumType> {
        self.enums.values()
    }

    /// Every nested object type a member mentions must be registered.
    pub fn validate(&self) -> Result<(), RegistryError> {
        for object in self.objects.values() {
            for member in &object.members {
                if let Some(missing) = self.first_unknown(&member.ty) {
                    return Err(RegistryError::UnknownType {
                        owner: object.name.clone(),
                        member: member.name.clone(),
                        missing: missing.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn first_unknown<'t>(&self, ty: &'t DeclaredType) -> Option<&'t str> {
        match ty {
            DeclaredType::Object(name) if !self.objects.contains_key(name) => Some(name),
            DeclaredType::Enum(name) if !self.enums.contains_key(name) => Some(name),
            DeclaredType::Nullable(inner) | DeclaredType::Collection(inner) => self.first_unknown(inner),
            _ => None,
        }
    }

    /// JSON summary of every registered type and how each member classifies.
    pub fn describe(&self) -> serde_json::Value {
        let enums: serde_json::Map<String, serde_json::Value> = self
            .enums
            .values()
            .map(|e| (e.name.clone(), json!(e.variants)))
            .collect();
        let objects: serde_json::Map<String, serde_json::Value> = self
            .objects
            .values()
            .map(|o| {
                let members: Vec<serde_json::Value> = o
                    .members
                    .iter()
                    .map(|m| {
                        json!({
                            "name": m.name,
                            "type": m.ty.name(),
                            "kind": m.ty.kind().as_str(),
                            "emitted": m.is_eligible(),
                        })
                    })
                    .collect();
                (o.name.clone(), json!(members))
            })
            .collect();
        json!({ "enums": enums, "types": objects })
    }
}

// ————————————————————————————————————————————————————————————————————————————
// GRAPH
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Stored member value.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Null,
    Scalar(Scalar<'static>),
    List(Vec<Slot>),
    Node(NodeId),
}

#[derive(Debug, Clone)]
struct Node {
    type_name: String,
    slots: IndexMap<String, Slot>,
}

/// Arena of typed nodes over a [`TypeRegistry`].
#[derive(Debug, Clone)]
pub struct ObjectGraph {
    registry: TypeRegistry,
    nodes: Vec<Node>,
}

impl ObjectGraph {
    pub fn new(registry: TypeRegistry) -> Self {
        Self { registry, nodes: Vec::new() }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add_node(&mut self, type_name: &str) -> Result<NodeId, GraphError> {
        if self.registry.object(type_name).is_none() {
            return Err(GraphError::UnknownType(type_name.to_string()));
        }
        self.nodes.push(Node { type_name: type_name.to_string(), slots: IndexMap::new() });
        Ok(NodeId(self.nodes.len() - 1))
    }

    /// Store `slot` in `member` of `node` after checking it against the
    /// member's declared type.
    pub fn set(&mut self, node: NodeId, member: &str, slot: Slot) -> Result<(), GraphError> {
        let owner = &self.node(node)?.type_name;
        let info = self
            .registry
            .object(owner)
            .and_then(|t| t.member(member))
            .ok_or_else(|| GraphError::UnknownMember { owner: owner.clone(), member: member.to_string() })?;
        if !self.slot_fits(&info.ty, &slot)? {
            return Err(GraphError::TypeMismatch {
                owner: owner.clone(),
                member: member.to_string(),
                declared: info.ty.clone(),
            });
        }
        self.nodes[node.0].slots.insert(member.to_string(), slot);
        Ok(())
    }

    pub fn get(&self, node: NodeId, member: &str) -> Option<&Slot> {
        self.nodes.get(node.0)?.slots.get(member)
    }

    pub fn type_of(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node.0).map(|n| n.type_name.as_str())
    }

    pub fn view(&self, id: NodeId) -> NodeView<'_> {
        NodeView { graph: self, id }
    }

    fn node(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.nodes.get(id.0).ok_or(GraphError::UnknownNode(id.0))
    }

    fn slot_fits(&self, ty: &DeclaredType, slot: &Slot) -> Result<bool, GraphError> {
        match slot {
            Slot::Null => Ok(true),
            Slot::Scalar(scalar) => {
                if let (DeclaredType::Enum(name), Scalar::Enum(variant)) = (ty.underlying(), scalar) {
                    let known = self.registry.enumeration(name).is_some_and(|e| e.has_variant(variant));
                    if !known {
                        return Err(GraphError::UnknownVariant {
                            name: name.clone(),
                            variant: variant.to_string(),
                        });
                    }
                }
                Ok(ty.accepts_scalar(scalar))
            }
            Slot::List(items) => match ty {
                DeclaredType::Collection(element) => {
                    for item in items {
                        if !self.slot_fits(element, item)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                _ => Ok(false),
            },
            Slot::Node(id) => {
                self.node(*id)?;
                Ok(matches!(ty, DeclaredType::Object(_)))
            }
        }
    }

    fn slot_value<'g>(&'g self, slot: &'g Slot) -> Value<'g> {
        match slot {
            Slot::Null => Value::Null,
            Slot::Scalar(scalar) => Value::Scalar(scalar.reborrow()),
            Slot::List(items) => Value::Collection(items.iter().map(|s| self.slot_value(s)).collect()),
            Slot::Node(id) => Value::object(self.view(*id)),
        }
    }
}

/// A node seen through [`Describe`]; identity is the arena handle.
#[derive(Debug, Clone, Copy)]
pub struct NodeView<'g> {
    graph: &'g ObjectGraph,
    id: NodeId,
}

impl<'g> NodeView<'g> {
    pub fn id(&self) -> NodeId {
        self.id
    }
}

impl Describe for NodeView<'_> {
    fn type_name(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.graph.type_of(self.id).unwrap_or_default())
    }

    fn identity(&self) -> Option<NodeKey> {
        Some(NodeKey::handle(self.graph, self.id.0))
    }

    fn members(&self) -> Cow<'_, [MemberInfo]> {
        match self.graph.type_of(self.id).and_then(|t| self.graph.registry.object(t)) {
            Some(object) => Cow::Borrowed(&object.members),
            None => Cow::Owned(Vec::new()),
        }
    }

    /// Unset members read as null, except non-nullable enums, which read as
    /// their first variant.
    fn read_member(&self, name: &str) -> Result<Value<'_>, ReadError> {
        let graph = self.graph;
        let info = graph
            .type_of(self.id)
            .and_then(|t| graph.registry.object(t))
            .and_then(|o| o.member(name))
            .ok_or_else(|| ReadError::UnknownMember(name.to_string()))?;
        if !info.readable {
            return Err(ReadError::NotReadable(name.to_string()));
        }
        let slot = graph.get(self.id, name).filter(|s| **s != Slot::Null);
        Ok(match (slot, &info.ty) {
            (Some(slot), _) => graph.slot_value(slot),
            (None, DeclaredType::Enum(enum_name)) => graph
                .registry
                .enumeration(enum_name)
                .and_then(|e| e.variants.first())
                .map_or(Value::Null, |first| Value::variant(first.as_str())),
            (None, _) => Value::Null,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{CodeGenerator, GeneratorOptions, render_object};

    fn registry() -> TypeRegistry {
        let mut reg = TypeRegistry::new();
        reg.register_enum("Status", ["Active", "Closed"]).unwrap();
        let member = |name: &str, ty: &str, reg: &TypeRegistry| MemberInfo::new(name, reg.parse_type(ty).unwrap());
        let order = vec![
            member("Name", "string", &reg),
            member("State", "Status", &reg),
            member("Lines", "List<Line>", &reg),
            member("Next", "Order", &reg),
        ];
        let line = vec![member("Qty", "int", &reg), member("Note", "string", &reg).read_only()];
        reg.register_object("Order", order).unwrap();
        reg.register_object("Line", line).unwrap();
        reg.validate().unwrap();
        reg
    }

    fn text(s: &str) -> Slot {
        Slot::Scalar(Scalar::String(s.to_string().into()))
    }

    #[test]
    fn registration_rejects_bad_names() {
        let mut reg = TypeRegistry::new();
        assert!(matches!(reg.register_enum("9bad", ["A"]), Err(RegistryError::InvalidName(_))));
        assert!(matches!(reg.register_enum("Empty", Vec::<String>::new()), Err(RegistryError::EmptyEnum(_))));
        reg.register_enum("Kind", ["A"]).unwrap();
        assert!(matches!(reg.register_object("Kind", Vec::new()), Err(RegistryError::Duplicate(_))));
        let twice = vec![
            MemberInfo::new("X", DeclaredType::Int32),
            MemberInfo::new("X", DeclaredType::Int64),
        ];
        assert!(matches!(reg.register_object("Pair", twice), Err(RegistryError::DuplicateMember { .. })));
    }

    #[test]
    fn validate_reports_missing_types() {
        let mut reg = TypeRegistry::new();
        let members = vec![MemberInfo::new("Owner", DeclaredType::object("Customer"))];
        reg.register_object("Order", members).unwrap();
        assert!(matches!(
            reg.validate(),
            Err(RegistryError::UnknownType { missing, .. }) if missing == "Customer"
        ));
    }

    #[test]
    fn set_checks_declared_types() {
        let mut graph = ObjectGraph::new(registry());
        let order = graph.add_node("Order").unwrap();
        assert!(graph.set(order, "Name", text("a")).is_ok());
        assert!(matches!(
            graph.set(order, "Name", Slot::Scalar(Scalar::Int32(1))),
            Err(GraphError::TypeMismatch { .. })
        ));
        assert!(matches!(
            graph.set(order, "State", Slot::Scalar(Scalar::Enum("Open".into()))),
            Err(GraphError::UnknownVariant { .. })
        ));
        assert!(matches!(graph.set(order, "Missing", Slot::Null), Err(GraphError::UnknownMember { .. })));
        assert!(matches!(graph.set(order, "Next", Slot::Node(NodeId(7))), Err(GraphError::UnknownNode(7))));
        assert!(matches!(graph.add_node("Ghost"), Err(GraphError::UnknownType(_))));
    }

    #[test]
    fn cyclic_graph_renders_once() {
        let mut graph = ObjectGraph::new(registry());
        let a = graph.add_node("Order").unwrap();
        let b = graph.add_node("Order").unwrap();
        graph.set(a, "Name", text("A")).unwrap();
        graph.set(b, "Name", text("B")).unwrap();
        graph.set(a, "Next", Slot::Node(b)).unwrap();
        graph.set(b, "Next", Slot::Node(a)).unwrap();
        graph.set(a, "State", Slot::Scalar(Scalar::Enum("Active".into()))).unwrap();

        let code = CodeGenerator::single(graph.view(a)).generate().unwrap();
        assert_eq!(
            code,
            "public IEnumerable<object> Generate(){\n\
             yield return new Order { Name = \"A\", State = Active, Lines = new List<Line>(), \
             Next = new Order { Name = \"B\", State = Active, Lines = new List<Line>() } };\n\
             }"
        );
    }

    #[test]
    fn unset_enum_falls_back_to_first_variant() {
        let mut graph = ObjectGraph::new(registry());
        let a = graph.add_node("Order").unwrap();
        let out = render_object(&graph.view(a), GeneratorOptions::default()).unwrap();
        assert_eq!(out, "new Order { State = Active, Lines = new List<Line>() }");
    }

    #[test]
    fn read_only_members_are_skipped() {
        let mut graph = ObjectGraph::new(registry());
        let line = graph.add_node("Line").unwrap();
        graph.set(line, "Qty", Slot::Scalar(Scalar::Int32(2))).unwrap();
        graph.set(line, "Note", text("hidden")).unwrap();
        let order = graph.add_node("Order").unwrap();
        graph.set(order, "Lines", Slot::List(vec![Slot::Node(line), Slot::Node(line)])).unwrap();
        let out = render_object(&graph.view(order), GeneratorOptions::default()).unwrap();
        assert_eq!(
            out,
            "new Order { State = Active, Lines = new List<Line>() { new Line { Qty = 2 } } }"
        );
    }

    #[test]
    fn views_of_one_node_share_identity() {
        let mut graph = ObjectGraph::new(registry());
        let a = graph.add_node("Order").unwrap();
        let b = graph.add_node("Order").unwrap();
        assert!(graph.view(a).identity().is_some());
        assert_eq!(graph.view(a).identity(), graph.view(a).identity());
        assert_ne!(graph.view(a).identity(), graph.view(b).identity());
    }

    #[test]
    fn describe_lists_member_kinds() {
        let summary = registry().describe();
        assert_eq!(summary["enums"]["Status"][1], "Closed");
        assert_eq!(summary["types"]["Order"][2]["type"], "List<Line>");
        assert_eq!(summary["types"]["Order"][2]["kind"], "collection");
        assert_eq!(summary["types"]["Line"][1]["emitted"], false);
    }
}
