use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::RwLock;

use crate::types::{Kind, TypeName};

/// Shared reference to a host object.
pub type ObjRef = Arc<Instance>;

/// A value passed to or returned from a handle.
///
/// Primitives are stored unboxed. References are shared `Arc`s and compare by
/// identity; `Ref(None)` is the null reference.
#[derive(Debug, Clone)]
pub enum Value {
    /// Result of a `void` target.
    Void,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Char(u16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Ref(Option<ObjRef>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Short(a), Value::Short(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Ref(None), Value::Ref(None)) => true,
            (Value::Ref(Some(a)), Value::Ref(Some(b))) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Byte(v) => write!(f, "{}", v),
            Value::Short(v) => write!(f, "{}", v),
            Value::Char(v) => match char::from_u32(u32::from(*v)) {
                Some(ch) => write!(f, "{}", ch),
                None => write!(f, "\\u{{{:04x}}}", v),
            },
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Ref(None) => write!(f, "null"),
            Value::Ref(Some(obj)) => write!(f, "<{}>", obj.class()),
        }
    }
}

impl Value {
    pub fn null() -> Self {
        Value::Ref(None)
    }

    pub fn object(obj: ObjRef) -> Self {
        Value::Ref(Some(obj))
    }

    /// The zero value a fresh field of `kind` holds.
    pub fn default_for(kind: &Kind) -> Value {
        match kind {
            Kind::Void => Value::Void,
            Kind::Boolean => Value::Boolean(false),
            Kind::Byte => Value::Byte(0),
            Kind::Short => Value::Short(0),
            Kind::Char => Value::Char(0),
            Kind::Int => Value::Int(0),
            Kind::Long => Value::Long(0),
            Kind::Float => Value::Float(0.0),
            Kind::Double => Value::Double(0.0),
            Kind::Ref(_) => Value::Ref(None),
        }
    }

    /// Whether this value may travel through a slot of `kind`.
    ///
    /// Primitive slots need the exact primitive. Reference slots accept any
    /// reference including null; the static type is the caller's claim.
    pub fn fits(&self, kind: &Kind) -> bool {
        match (self, kind) {
            (Value::Void, Kind::Void)
            | (Value::Boolean(_), Kind::Boolean)
            | (Value::Byte(_), Kind::Byte)
            | (Value::Short(_), Kind::Short)
            | (Value::Char(_), Kind::Char)
            | (Value::Int(_), Kind::Int)
            | (Value::Long(_), Kind::Long)
            | (Value::Float(_), Kind::Float)
            | (Value::Double(_), Kind::Double)
            | (Value::Ref(_), Kind::Ref(_)) => true,
            _ => false,
        }
    }

    /// The most precise kind describing this value, used in diagnostics.
    pub fn kind(&self) -> Kind {
        match self {
            Value::Void => Kind::Void,
            Value::Boolean(_) => Kind::Boolean,
            Value::Byte(_) => Kind::Byte,
            Value::Short(_) => Kind::Short,
            Value::Char(_) => Kind::Char,
            Value::Int(_) => Kind::Int,
            Value::Long(_) => Kind::Long,
            Value::Float(_) => Kind::Float,
            Value::Double(_) => Kind::Double,
            Value::Ref(Some(obj)) => Kind::Ref(obj.class().clone()),
            Value::Ref(None) => Kind::reference("null"),
        }
    }

    pub fn as_object(&self) -> Option<&ObjRef> {
        match self {
            Value::Ref(Some(obj)) => Some(obj),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }
}

/// A host object: its runtime class plus named field storage.
pub struct Instance {
    class: TypeName,
    fields: RwLock<HashMap<Arc<str>, Value>>,
}

impl Instance {
    pub fn new(class: TypeName) -> Self {
        Self {
            class,
            fields: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_fields(
        class: TypeName,
        fields: impl IntoIterator<Item = (Arc<str>, Value)>,
    ) -> Self {
        Self {
            class,
            fields: RwLock::new(fields.into_iter().collect()),
        }
    }

    pub fn class(&self) -> &TypeName {
        &self.class
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.fields.read().get(name).cloned()
    }

    pub fn set_field(&self, name: &str, value: Value) -> bool {
        match self.fields.write().get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instance({})", self.class)
    }
}

struct ThrownInner {
    class: TypeName,
    message: String,
    payload: Value,
}

/// A failure raised by a target.
///
/// Handles never wrap a `Thrown`; the same allocation reaches the caller that
/// the target created, which [`Thrown::ptr_eq`] can observe.
#[derive(Clone)]
pub struct Thrown(Arc<ThrownInner>);

impl Thrown {
    pub fn new(class: impl AsRef<str>, message: impl Into<String>) -> Self {
        Self::with_payload(class, message, Value::Void)
    }

    pub fn with_payload(
        class: impl AsRef<str>,
        message: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self(Arc::new(ThrownInner {
            class: TypeName::new(class),
            message: message.into(),
            payload,
        }))
    }

    pub fn class(&self) -> &TypeName {
        &self.0.class
    }

    pub fn message(&self) -> &str {
        &self.0.message
    }

    pub fn payload(&self) -> &Value {
        &self.0.payload
    }

    pub fn ptr_eq(a: &Thrown, b: &Thrown) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl fmt::Debug for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thrown({}: {})", self.0.class, self.0.message)
    }
}

impl fmt::Display for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.0.class, self.0.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_compare_by_identity() {
        let a = Arc::new(Instance::new(TypeName::new("Point")));
        let b = Arc::new(Instance::new(TypeName::new("Point")));
        assert_eq!(Value::object(a.clone()), Value::object(a.clone()));
        assert_ne!(Value::object(a), Value::object(b));
        assert_eq!(Value::null(), Value::null());
    }

    #[test]
    fn fits_requires_exact_primitive() {
        assert!(Value::Int(1).fits(&Kind::Int));
        assert!(!Value::Int(1).fits(&Kind::Long));
        assert!(Value::null().fits(&Kind::reference("Point")));
        assert!(!Value::null().fits(&Kind::Int));
        assert!(!Value::Int(1).fits(&Kind::reference("Object")));
    }

    #[test]
    fn instance_fields_are_fixed_at_creation() {
        let obj = Instance::with_fields(TypeName::new("Point"), [(Arc::from("x"), Value::Int(0))]);
        assert!(obj.set_field("x", Value::Int(4)));
        assert_eq!(obj.field("x"), Some(Value::Int(4)));
        assert!(!obj.set_field("y", Value::Int(1)));
        assert_eq!(obj.field("y"), None);
    }

    #[test]
    fn thrown_identity() {
        let t = Thrown::new("IllegalState", "boom");
        let copy = t.clone();
        assert!(Thrown::ptr_eq(&t, &copy));
        assert!(!Thrown::ptr_eq(&t, &Thrown::new("IllegalState", "boom")));
        assert_eq!(t.to_string(), "IllegalState: boom");
    }
}
