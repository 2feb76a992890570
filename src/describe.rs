//! The introspection capability the generator consumes.
//!
//! Anything that can list its members and read them back implements
//! [`Describe`]. Plain Rust types implement it by hand; shapes only known at
//! runtime go through [`crate::registry::ObjectGraph`].

use std::borrow::Cow;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

use thiserror::Error;

use crate::types::DeclaredType;
use crate::value::Value;

/// Opaque identity of an object. Equal keys mean the same object, never merely
/// equal contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKey {
    /// Address of a borrowed or shared object, tagged with its type name so a
    /// struct and its first field never share a key.
    Address { addr: usize, type_tag: u64 },
    /// Entry `index` of the arena living at `arena`.
    Handle { arena: usize, index: usize },
}

impl NodeKey {
    /// Identity taken from the address of `value`. Zero-sized values have no
    /// address of their own and get none.
    pub fn of<T: Describe + ?Sized>(value: &T) -> Option<Self> {
        if std::mem::size_of_val(value) == 0 {
            return None;
        }
        let mut hasher = DefaultHasher::new();
        value.type_name().hash(&mut hasher);
        Some(Self::Address {
            addr: (value as *const T).cast::<()>() as usize,
            type_tag: hasher.finish(),
        })
    }

    /// Identity of entry `index` inside the arena living at `arena`.
    pub fn handle<A>(arena: &A, index: usize) -> Self {
        Self::Handle { arena: arena as *const A as usize, index }
    }
}

/// The object's own identity, or its address when it has none. Only valid
/// while `value` stays alive, which holds for anything reached by reference.
pub fn borrowed_identity<T: Describe + ?Sized>(value: &T) -> Option<NodeKey> {
    value.identity().or_else(|| NodeKey::of(value))
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberInfo {
    pub name: String,
    pub ty: DeclaredType,
    pub readable: bool,
    pub writable: bool,
    /// Indexer members take parameters and are never emitted.
    pub indexed: bool,
}

impl MemberInfo {
    /// A plain read/write property.
    pub fn new(name: impl Into<String>, ty: DeclaredType) -> Self {
        Self {
            name: name.into(),
            ty,
            readable: true,
            writable: true,
            indexed: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.readable = false;
        self
    }

    pub fn indexer(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Only readable, writable, parameterless members make it into a literal.
    pub fn is_eligible(&self) -> bool {
        self.readable && self.writable && !self.indexed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("no member named `{0}`")]
    UnknownMember(String),
    #[error("member `{0}` is not readable")]
    NotReadable(String),
    #[error("{0}")]
    Failed(String),
}

pub trait Describe {
    /// Short type name written after `new`.
    fn type_name(&self) -> Cow<'_, str>;

    /// Key used to break cycles. `None` marks a value built for a single read,
    /// which is never treated as already visited. References and shared
    /// pointers (`&T`, `Rc<T>`, `Arc<T>`) fall back to the pointee's address;
    /// views created on every read (like arena handles) must override this or
    /// cycles through them will not terminate.
    fn identity(&self) -> Option<NodeKey> {
        None
    }

    /// Declared members in declaration order, eligible or not.
    fn members(&self) -> Cow<'_, [MemberInfo]>;

    fn read_member(&self, name: &str) -> Result<Value<'_>, ReadError>;
}

macro_rules! forward_describe {
    ($identity:path => $($ptr:ty),*) => {
        $(
            impl<T: Describe + ?Sized> Describe for $ptr {
                fn type_name(&self) -> Cow<'_, str> {
                    (**self).type_name()
                }
                fn identity(&self) -> Option<NodeKey> {
                    $identity(&**self)
                }
                fn members(&self) -> Cow<'_, [MemberInfo]> {
                    (**self).members()
                }
                fn read_member(&self, name: &str) -> Result<Value<'_>, ReadError> {
                    (**self).read_member(name)
                }
            }
        )*
    };
}

// a Box handed to `Value::object` is dropped after the walk, so its address
// is not an identity
forward_describe!(Describe::identity => Box<T>);
forward_describe!(borrowed_identity => &T, Rc<T>, Arc<T>);
