//! Render in-memory object graphs as C# object-initializer code.
//!
//! Objects expose their members through [`Describe`]. [`CodeGenerator`] walks
//! one or more roots and produces a `Generate()` method that yields a
//! constructor literal per root, omitting default-valued members and breaking
//! cycles with a visited set. [`GraphDocument`] builds such graphs from JSON.

pub mod describe;
pub mod document;
pub mod generator;
pub mod literal;
pub mod path_de;
pub mod registry;
pub mod types;
pub mod value;

pub use describe::{Describe, MemberInfo, NodeKey, ReadError};
pub use document::{DocumentError, GraphDocument};
pub use generator::{CodeGenerator, GenerateError, GeneratorOptions, VisitedScope, render_object};
pub use literal::LiteralStyle;
pub use registry::{NodeId, NodeView, ObjectGraph, TypeRegistry};
pub use types::{Classification, DeclaredType, TypeKind};
pub use value::{Point, Scalar, Value};
