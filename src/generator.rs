//! Traversal engine: walks object graphs and emits construction literals.
//!
//! ```text
//! public IEnumerable<object> Generate(){
//! yield return new Order { Id = Guid.Parse("..."), Lines = new List<Line>() { new Line { Qty = 2 } } };
//! }
//! ```

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, trace};

use crate::describe::{self, Describe, MemberInfo, NodeKey, ReadError};
use crate::literal::{self, LiteralStyle};
use crate::types::{Classification, DeclaredType};
use crate::value::Value;

// ————————————————————————————————————————————————————————————————————————————
// CONFIG
// ————————————————————————————————————————————————————————————————————————————

/// Lifetime of the visited set in a multi-root call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum VisitedScope {
    /// One set for the whole call: objects shared between roots are expanded
    /// only under the first root that reaches them.
    #[default]
    Shared,
    /// A fresh set per root: each root is expanded independently.
    PerRoot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorOptions {
    pub visited_scope: VisitedScope,
    pub escape_strings: bool,
    pub qualify_enums: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            visited_scope: VisitedScope::Shared,
            escape_strings: true,
            qualify_enums: false,
        }
    }
}

impl GeneratorOptions {
    fn literal_style(&self) -> LiteralStyle {
        LiteralStyle {
            escape_strings: self.escape_strings,
            qualify_enums: self.qualify_enums,
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("failed to read `{type_name}.{member}`: {source}")]
    Read {
        type_name: String,
        member: String,
        #[source]
        source: ReadError,
    },
    #[error("`{type_name}.{member}` is declared as `{declared}` but holds a {found} value")]
    ShapeMismatch {
        type_name: String,
        member: String,
        declared: DeclaredType,
        found: &'static str,
    },
}

// ————————————————————————————————————————————————————————————————————————————
// VISITED SET
// ————————————————————————————————————————————————————————————————————————————

/// Identities already emitted during one generation.
#[derive(Debug, Default)]
pub struct VisitedSet {
    seen: HashSet<NodeKey>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }
    /// Returns false if `key` was already present.
    pub fn insert(&mut self, key: NodeKey) -> bool {
        self.seen.insert(key)
    }
    pub fn contains(&self, key: NodeKey) -> bool {
        self.seen.contains(&key)
    }
    pub fn remove(&mut self, key: NodeKey) -> bool {
        self.seen.remove(&key)
    }
    pub fn clear(&mut self) {
        self.seen.clear();
    }
    pub fn len(&self) -> usize {
        self.seen.len()
    }
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// ROOT DISPATCH
// ————————————————————————————————————————————————————————————————————————————

/// Generates one `yield return` per root inside a `Generate()` method.
pub struct CodeGenerator<'a> {
    roots: Vec<Box<dyn Describe + 'a>>,
    options: GeneratorOptions,
}

impl<'a> CodeGenerator<'a> {
    pub fn new<I, D>(roots: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Describe + 'a,
    {
        Self {
            roots: roots
                .into_iter()
                .map(|root| Box::new(root) as Box<dyn Describe + 'a>)
                .collect(),
            options: GeneratorOptions::default(),
        }
    }

    pub fn single(root: impl Describe + 'a) -> Self {
        Self::new([root])
    }

    /// Append a root of any type.
    pub fn with_root(mut self, root: impl Describe + 'a) -> Self {
        self.roots.push(Box::new(root));
        self
    }

    pub fn with_options(mut self, options: GeneratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn visited_scope(mut self, scope: VisitedScope) -> Self {
        self.options.visited_scope = scope;
        self
    }

    pub fn options(&self) -> &GeneratorOptions {
        &self.options
    }

    pub fn generate(&self) -> Result<String, GenerateError> {
        debug!(roots = self.roots.len(), scope = ?self.options.visited_scope, "generating");
        let mut emitter = Emitter::new(self.options);
        emitter.push_str("public IEnumerable<object> Generate(){\n");
        for (index, root) in self.roots.iter().enumerate() {
            if self.options.visited_scope == VisitedScope::PerRoot {
                emitter.visited.clear();
            }
            debug!(index, type_name = %root.type_name(), "walking root");
            emitter.push_str("yield return ");
            // roots are owned by the generator for the whole call
            emitter.walk_object(&**root, describe::borrowed_identity(&**root))?;
            emitter.push_str(";\n");
        }
        emitter.push_str("}");
        Ok(emitter.finish())
    }
}

/// Render a single object literal, e.g. `new Line { Qty = 2 }`, with a fresh
/// visited set.
pub fn render_object(object: &dyn Describe, options: GeneratorOptions) -> Result<String, GenerateError> {
    let mut emitter = Emitter::new(options);
    emitter.walk_object(object, describe::borrowed_identity(object))?;
    Ok(emitter.finish())
}

// ————————————————————————————————————————————————————————————————————————————
// WALKERS
// ————————————————————————————————————————————————————————————————————————————

/// Owns the output buffer and the visited set for one traversal.
pub struct Emitter {
    out: String,
    visited: VisitedSet,
    style: LiteralStyle,
    /// Number of identity-less objects currently being walked.
    transient: usize,
    /// Keys first marked below an identity-less object.
    scoped: Vec<NodeKey>,
}

impl Emitter {
    pub fn new(options: GeneratorOptions) -> Self {
        Self {
            out: String::with_capacity(1024),
            visited: VisitedSet::new(),
            style: options.literal_style(),
            transient: 0,
            scoped: Vec::new(),
        }
    }

    pub fn push_str(&mut self, s: &str) {
        self.out.push_str(s);
    }

    pub fn visited(&self) -> &VisitedSet {
        &self.visited
    }

    pub fn finish(self) -> String {
        self.out
    }

    /// `new T { A = 1, B = 2 }`. The object is marked visited under `key`
    /// before any member is read, so members pointing back at it are skipped.
    ///
    /// Without a key the object only lives for this read. Keys first marked
    /// while walking it are unmarked when it is done, because the memory they
    /// point into is released and may be handed out again.
    pub fn walk_object(&mut self, object: &dyn Describe, key: Option<NodeKey>) -> Result<(), GenerateError> {
        let mark = self.scoped.len();
        match key {
            Some(key) => {
                if self.visited.insert(key) && self.transient > 0 {
                    self.scoped.push(key);
                }
            }
            None => self.transient += 1,
        }
        let result = self.walk_members(object);
        if key.is_none() {
            self.transient -= 1;
            for key in self.scoped.drain(mark..) {
                self.visited.remove(key);
            }
        }
        result
    }

    fn walk_members(&mut self, object: &dyn Describe) -> Result<(), GenerateError> {
        let type_name = object.type_name();
        self.out.push_str("new ");
        self.out.push_str(&type_name);
        self.out.push_str(" {");

        let mut first = true;
        for info in object.members().iter().filter(|m| m.is_eligible()) {
            let value = object.read_member(&info.name).map_err(|source| GenerateError::Read {
                type_name: type_name.to_string(),
                member: info.name.clone(),
                source,
            })?;
            if !info.ty.accepts(&value) {
                return Err(mismatch(&type_name, &info.name, &info.ty, &value));
            }
            self.walk_member(&type_name, info, &value, &mut first)?;
        }

        self.out.push_str(" }");
        Ok(())
    }

    fn walk_member(
        &mut self,
        type_name: &str,
        info: &MemberInfo,
        value: &Value<'_>,
        first: &mut bool,
    ) -> Result<(), GenerateError> {
        let class = info.ty.classify(value);
        if class.is_omitted() {
            trace!(type_name, member = %info.name, ?class, "member omitted");
            return Ok(());
        }

        match (class, value) {
            (Classification::Collection, _) => {
                let DeclaredType::Collection(element) = &info.ty else {
                    return Err(mismatch(type_name, &info.name, &info.ty, value));
                };
                self.separator(first);
                self.member_prefix(&info.name);
                self.walk_collection(type_name, &info.name, element, value)
            }
            (Classification::NestedObject, Value::Object(child)) => {
                let key = child.identity();
                if key.is_some_and(|key| self.visited.contains(key)) {
                    trace!(type_name, member = %info.name, "already visited, member omitted");
                    return Ok(());
                }
                self.separator(first);
                self.member_prefix(&info.name);
                self.walk_object(&**child, key)
            }
            (_, Value::Scalar(scalar)) => {
                self.separator(first);
                self.member_prefix(&info.name);
                literal::write_scalar(&mut self.out, &info.ty, scalar, self.style);
                Ok(())
            }
            _ => Err(mismatch(type_name, &info.name, &info.ty, value)),
        }
    }

    /// `new List<E>()` for null, `new List<E>() { a, b }` otherwise.
    fn walk_collection(
        &mut self,
        type_name: &str,
        member: &str,
        element: &DeclaredType,
        value: &Value<'_>,
    ) -> Result<(), GenerateError> {
        self.out.push_str("new List<");
        self.out.push_str(&element.name());
        self.out.push_str(">()");

        let items = match value {
            Value::Null => return Ok(()),
            Value::Collection(items) => items,
            other => {
                return Err(mismatch(type_name, member, &DeclaredType::collection(element.clone()), other));
            }
        };

        self.out.push_str(" {");
        let mut first = true;
        for (index, item) in items.iter().enumerate() {
            if !element.accepts(item) {
                return Err(mismatch(type_name, &format!("{member}[{index}]"), element, item));
            }
            match item {
                Value::Null => {
                    self.separator(&mut first);
                    self.out.push_str("null");
                }
                Value::Scalar(scalar) => {
                    self.separator(&mut first);
                    literal::write_scalar(&mut self.out, element, scalar, self.style);
                }
                Value::Collection(_) => {
                    let DeclaredType::Collection(inner) = element else {
                        return Err(mismatch(type_name, member, element, item));
                    };
                    self.separator(&mut first);
                    self.walk_collection(type_name, member, inner, item)?;
                }
                Value::Object(child) => {
                    let key = child.identity();
                    if key.is_some_and(|key| self.visited.contains(key)) {
                        trace!(type_name, member, index, "already visited, element skipped");
                        continue;
                    }
                    self.separator(&mut first);
                    self.walk_object(&**child, key)?;
                }
            }
        }
        self.out.push_str(" }");
        Ok(())
    }

    /// Separator state tracks what was written, not the loop position.
    fn separator(&mut self, first: &mut bool) {
        if *first {
            self.out.push(' ');
            *first = false;
        } else {
            self.out.push_str(", ");
        }
    }

    fn member_prefix(&mut self, name: &str) {
        self.out.push_str(name);
        self.out.push_str(" = ");
    }
}

fn mismatch(type_name: &str, member: &str, declared: &DeclaredType, value: &Value<'_>) -> GenerateError {
    GenerateError::ShapeMismatch {
        type_name: type_name.to_string(),
        member: member.to_string(),
        declared: declared.clone(),
        found: value.kind_name(),
    }
}
