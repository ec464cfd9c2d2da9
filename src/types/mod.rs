//! Value kinds and type descriptors.
//!
//! A [`TypeDescriptor`] is the calling convention of a handle: an ordered list
//! of parameter kinds and one return kind. Descriptors are immutable, shared
//! by reference, and compared structurally with no implicit widening.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use crate::error::{HandleError, Result};

mod parse;

/// Name of a reference type known to the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeName(Arc<str>);

impl TypeName {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// The kind of a single parameter or return slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Kind {
    Void,
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    Ref(TypeName),
}

impl Kind {
    pub fn reference(name: impl AsRef<str>) -> Self {
        Kind::Ref(TypeName::new(name))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Kind::Void)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Kind::Ref(_))
    }

    pub fn is_primitive(&self) -> bool {
        !self.is_void() && !self.is_reference()
    }

    /// Numeric kinds take part in widening and narrowing; `boolean` does not.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Kind::Byte
                | Kind::Short
                | Kind::Char
                | Kind::Int
                | Kind::Long
                | Kind::Float
                | Kind::Double
        )
    }

    /// Whether a `self` value converts to `to` without loss of magnitude.
    ///
    /// This is the primitive widening table; `char` only widens to `int` and
    /// above, and nothing widens to `char`.
    pub fn widens_to(&self, to: &Kind) -> bool {
        use Kind::*;
        match self {
            Byte => matches!(to, Short | Int | Long | Float | Double),
            Short | Char => matches!(to, Int | Long | Float | Double),
            Int => matches!(to, Long | Float | Double),
            Long => matches!(to, Float | Double),
            Float => matches!(to, Double),
            _ => false,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Kind::Void => "void",
            Kind::Boolean => "boolean",
            Kind::Byte => "byte",
            Kind::Short => "short",
            Kind::Char => "char",
            Kind::Int => "int",
            Kind::Long => "long",
            Kind::Float => "float",
            Kind::Double => "double",
            Kind::Ref(name) => name.as_str(),
        }
    }

    pub(crate) fn from_keyword(word: &str) -> Option<Kind> {
        Some(match word {
            "void" => Kind::Void,
            "boolean" => Kind::Boolean,
            "byte" => Kind::Byte,
            "short" => Kind::Short,
            "char" => Kind::Char,
            "int" => Kind::Int,
            "long" => Kind::Long,
            "float" => Kind::Float,
            "double" => Kind::Double,
            _ => return None,
        })
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
struct Signature {
    params: Box<[Kind]>,
    ret: Kind,
}

/// Ordered parameter kinds plus a return kind.
///
/// Cloning shares the underlying signature. Equality is structural: two
/// descriptors are equal iff every parameter kind and the return kind match.
#[derive(Clone)]
pub struct TypeDescriptor(Arc<Signature>);

impl TypeDescriptor {
    /// Builds a descriptor. `void` is only legal in return position.
    pub fn new(params: impl Into<Vec<Kind>>, ret: Kind) -> Result<Self> {
        let params = params.into();
        if let Some(index) = params.iter().position(Kind::is_void) {
            return Err(HandleError::InvalidDescriptor {
                input: Self::from_parts(params, ret).to_string(),
                reason: format!("parameter {} is void", index),
            });
        }
        Ok(Self::from_parts(params, ret))
    }

    /// Builds a descriptor whose parameters are already known to be non-void.
    pub(crate) fn from_parts(params: Vec<Kind>, ret: Kind) -> Self {
        Self(Arc::new(Signature {
            params: params.into_boxed_slice(),
            ret,
        }))
    }

    pub fn params(&self) -> &[Kind] {
        &self.0.params
    }

    pub fn param(&self, index: usize) -> Option<&Kind> {
        self.0.params.get(index)
    }

    pub fn ret(&self) -> &Kind {
        &self.0.ret
    }

    pub fn arity(&self) -> usize {
        self.0.params.len()
    }

    pub fn drop_parameter(&self, index: usize) -> Result<Self> {
        self.check_index(index)?;
        let mut params = self.params().to_vec();
        params.remove(index);
        Ok(Self::from_parts(params, self.ret().clone()))
    }

    /// Inserts `kinds` before position `index`; `index == arity` appends.
    pub fn insert_parameters(&self, index: usize, kinds: &[Kind]) -> Result<Self> {
        if index > self.arity() {
            return Err(HandleError::Index {
                index,
                len: self.arity(),
            });
        }
        let mut params = self.params().to_vec();
        params.splice(index..index, kinds.iter().cloned());
        Self::new(params, self.ret().clone())
    }

    pub fn replace_parameter(&self, index: usize, kind: Kind) -> Result<Self> {
        self.check_index(index)?;
        let mut params = self.params().to_vec();
        params[index] = kind;
        Self::new(params, self.ret().clone())
    }

    pub fn with_return(&self, ret: Kind) -> Self {
        Self::from_parts(self.params().to_vec(), ret)
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.arity() {
            return Err(HandleError::Index {
                index,
                len: self.arity(),
            });
        }
        Ok(())
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.ret == other.0.ret && self.0.params == other.0.params)
    }
}

impl Eq for TypeDescriptor {}

impl Hash for TypeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.params.hash(state);
        self.0.ret.hash(state);
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, param) in self.params().iter().enumerate() {
            if i != 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ")->{}", self.ret())
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeDescriptor({})", self)
    }
}
