//! An in-memory [`Host`]: classes and interfaces with native method bodies.
//!
//! Method resolution walks the superclass chain first and then the
//! interfaces breadth-first, so a class override always wins over an
//! interface default. Instance fields are keyed by name across the whole
//! superclass chain.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    fmt,
    sync::Arc,
};

use parking_lot::RwLock;

use crate::{
    error::{HandleError, Result},
    runtime::{
        host::{CONSTRUCTOR_NAME, Host, MemberInfo, MemberKind, Visibility},
        value::{Instance, ObjRef, Thrown, Value},
    },
    types::{Kind, TypeDescriptor, TypeName},
};

/// Native code behind a method or constructor.
///
/// Instance methods and constructors receive the receiver as argument 0.
pub type NativeFn = Arc<dyn Fn(Vec<Value>) -> Result<Value> + Send + Sync>;

/// Root of every class hierarchy in a [`ClassTable`].
pub const OBJECT: &str = "Object";

#[derive(Clone)]
struct MethodDef {
    name: Arc<str>,
    visibility: Visibility,
    ty: TypeDescriptor,
    is_static: bool,
    body: Option<NativeFn>,
}

#[derive(Clone)]
struct FieldDef {
    name: Arc<str>,
    visibility: Visibility,
    kind: Kind,
    is_static: bool,
}

#[derive(Clone)]
struct ConstructorDef {
    visibility: Visibility,
    ty: TypeDescriptor,
    body: NativeFn,
}

struct ClassDef {
    name: TypeName,
    package: Arc<str>,
    superclass: Option<TypeName>,
    interfaces: Vec<TypeName>,
    is_interface: bool,
    methods: Vec<MethodDef>,
    fields: Vec<FieldDef>,
    constructors: Vec<ConstructorDef>,
    statics: RwLock<HashMap<Arc<str>, Value>>,
}

impl ClassDef {
    fn method(&self, name: &str, ty: &TypeDescriptor, is_static: bool) -> Option<&MethodDef> {
        self.methods
            .iter()
            .find(|m| &*m.name == name && &m.ty == ty && m.is_static == is_static)
    }

    fn field(&self, name: &str, is_static: bool) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|f| &*f.name == name && f.is_static == is_static)
    }
}

/// Fluent description of one class or interface.
pub struct ClassBuilder {
    name: TypeName,
    package: Arc<str>,
    superclass: Option<TypeName>,
    interfaces: Vec<TypeName>,
    is_interface: bool,
    methods: Vec<MethodDef>,
    fields: Vec<FieldDef>,
    constructors: Vec<ConstructorDef>,
    statics: HashMap<Arc<str>, Value>,
}

impl ClassBuilder {
    pub fn class(name: impl AsRef<str>) -> Self {
        let name = TypeName::new(name);
        let superclass = (name.as_str() != OBJECT).then(|| TypeName::new(OBJECT));
        Self {
            name,
            package: Arc::from(""),
            superclass,
            interfaces: Vec::new(),
            is_interface: false,
            methods: Vec::new(),
            fields: Vec::new(),
            constructors: Vec::new(),
            statics: HashMap::new(),
        }
    }

    pub fn interface(name: impl AsRef<str>) -> Self {
        let mut builder = Self::class(name);
        builder.superclass = None;
        builder.is_interface = true;
        builder
    }

    pub fn package(mut self, package: impl AsRef<str>) -> Self {
        self.package = Arc::from(package.as_ref());
        self
    }

    pub fn extends(mut self, superclass: impl AsRef<str>) -> Self {
        self.superclass = Some(TypeName::new(superclass));
        self
    }

    pub fn implements(mut self, interface: impl AsRef<str>) -> Self {
        self.interfaces.push(TypeName::new(interface));
        self
    }

    pub fn static_method<F>(
        mut self,
        name: &str,
        visibility: Visibility,
        ty: TypeDescriptor,
        body: F,
    ) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        self.methods.push(MethodDef {
            name: Arc::from(name),
            visibility,
            ty,
            is_static: true,
            body: Some(Arc::new(body)),
        });
        self
    }

    /// An instance method; `ty` excludes the receiver, `body` receives it first.
    pub fn method<F>(
        mut self,
        name: &str,
        visibility: Visibility,
        ty: TypeDescriptor,
        body: F,
    ) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        self.methods.push(MethodDef {
            name: Arc::from(name),
            visibility,
            ty,
            is_static: false,
            body: Some(Arc::new(body)),
        });
        self
    }

    pub fn abstract_method(
        mut self,
        name: &str,
        visibility: Visibility,
        ty: TypeDescriptor,
    ) -> Self {
        self.methods.push(MethodDef {
            name: Arc::from(name),
            visibility,
            ty,
            is_static: false,
            body: None,
        });
        self
    }

    pub fn field(mut self, name: &str, visibility: Visibility, kind: Kind) -> Self {
        self.fields.push(FieldDef {
            name: Arc::from(name),
            visibility,
            kind,
            is_static: false,
        });
        self
    }

    pub fn static_field(
        mut self,
        name: &str,
        visibility: Visibility,
        kind: Kind,
        initial: Value,
    ) -> Self {
        let name: Arc<str> = Arc::from(name);
        self.statics.insert(name.clone(), initial);
        self.fields.push(FieldDef {
            name,
            visibility,
            kind,
            is_static: true,
        });
        self
    }

    /// `params` lists the constructor parameters; its return kind is ignored.
    pub fn constructor<F>(mut self, visibility: Visibility, params: TypeDescriptor, body: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        self.constructors.push(ConstructorDef {
            visibility,
            ty: params.with_return(Kind::Void),
            body: Arc::new(body),
        });
        self
    }

    fn build(self) -> ClassDef {
        ClassDef {
            name: self.name,
            package: self.package,
            superclass: self.superclass,
            interfaces: self.interfaces,
            is_interface: self.is_interface,
            methods: self.methods,
            fields: self.fields,
            constructors: self.constructors,
            statics: RwLock::new(self.statics),
        }
    }
}

/// Registry of classes implementing [`Host`].
pub struct ClassTable {
    classes: RwLock<HashMap<TypeName, Arc<ClassDef>>>,
}

impl Default for ClassTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClassTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.classes.read().keys().map(|k| k.to_string()).collect();
        names.sort();
        write!(f, "ClassTable({})", names.join(", "))
    }
}

impl ClassTable {
    /// A table holding only the root class `Object`.
    pub fn new() -> Self {
        let table = Self {
            classes: RwLock::new(HashMap::new()),
        };
        let no_args = TypeDescriptor::from_parts(vec![], Kind::Void);
        table.define(
            ClassBuilder::class(OBJECT)
                .package("lang")
                .constructor(Visibility::Public, no_args, |_| Ok(Value::Void)),
        );
        table
    }

    /// Registers a class, replacing any earlier definition of the same name.
    pub fn define(&self, builder: ClassBuilder) -> TypeName {
        let def = builder.build();
        let name = def.name.clone();
        self.classes.write().insert(name.clone(), Arc::new(def));
        name
    }

    pub fn contains(&self, name: &TypeName) -> bool {
        self.classes.read().contains_key(name)
    }

    fn class(&self, name: &TypeName) -> Option<Arc<ClassDef>> {
        self.classes.read().get(name).cloned()
    }

    /// `name`, its superclasses in order, then every reachable interface.
    fn linearize(&self, name: &TypeName) -> Vec<Arc<ClassDef>> {
        let classes = self.classes.read();
        let mut order = Vec::new();
        let mut seen = HashSet::new();

        let mut current = Some(name.clone());
        while let Some(ty) = current {
            if !seen.insert(ty.clone()) {
                break;
            }
            let Some(def) = classes.get(&ty) else { break };
            current = def.superclass.clone();
            order.push(def.clone());
        }

        let mut queue: VecDeque<TypeName> = order
            .iter()
            .flat_map(|def| def.interfaces.iter().cloned())
            .collect();
        while let Some(ty) = queue.pop_front() {
            if !seen.insert(ty.clone()) {
                continue;
            }
            if let Some(def) = classes.get(&ty) {
                queue.extend(def.interfaces.iter().cloned());
                order.push(def.clone());
            }
        }
        order
    }

    fn find_method(
        &self,
        start: &TypeName,
        name: &str,
        ty: &TypeDescriptor,
        is_static: bool,
    ) -> Option<MethodDef> {
        self.linearize(start)
            .iter()
            .find_map(|def| def.method(name, ty, is_static).cloned())
    }

    fn run_instance_method(
        &self,
        start: &TypeName,
        owner: &TypeName,
        name: &str,
        ty: &TypeDescriptor,
        receiver: &ObjRef,
        args: Vec<Value>,
    ) -> Result<Value> {
        let method = self
            .linearize(start)
            .iter()
            .find_map(|def| def.method(name, ty, false).filter(|m| m.body.is_some()).cloned());
        let Some(body) = method.and_then(|m| m.body) else {
            return Err(Thrown::new(
                "AbstractMethod",
                format!("no implementation of {}.{}{} for {}", owner, name, ty, receiver.class()),
            )
            .into());
        };
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(Value::object(receiver.clone()));
        full.extend(args);
        body(full)
    }

    fn static_slot(&self, owner: &TypeName, field: &str) -> Result<Arc<ClassDef>> {
        self.linearize(owner)
            .into_iter()
            .find(|def| def.field(field, true).is_some())
            .ok_or_else(|| not_found(owner, field))
    }
}

fn not_found(owner: &TypeName, name: &str) -> HandleError {
    HandleError::NotFound {
        owner: owner.to_string(),
        name: name.to_string(),
    }
}

impl Host for ClassTable {
    fn members(&self, owner: &TypeName, name: &str) -> Result<Vec<MemberInfo>> {
        let chain = self.linearize(owner);
        let Some(first) = chain.first() else {
            return Err(not_found(owner, name));
        };

        if name == CONSTRUCTOR_NAME {
            return Ok(first
                .constructors
                .iter()
                .map(|c| MemberInfo {
                    owner: first.name.clone(),
                    name: Arc::from(CONSTRUCTOR_NAME),
                    visibility: c.visibility,
                    kind: MemberKind::Constructor { ty: c.ty.clone() },
                })
                .collect());
        }

        let mut found: Vec<MemberInfo> = Vec::new();
        let mut field_seen = false;
        for def in &chain {
            for method in def.methods.iter().filter(|m| &*m.name == name) {
                let hidden = found.iter().any(|m| {
                    matches!(&m.kind, MemberKind::Method { ty, is_static, .. }
                        if ty == &method.ty && *is_static == method.is_static)
                });
                if !hidden {
                    found.push(MemberInfo {
                        owner: def.name.clone(),
                        name: method.name.clone(),
                        visibility: method.visibility,
                        kind: MemberKind::Method {
                            ty: method.ty.clone(),
                            is_static: method.is_static,
                            is_abstract: method.body.is_none(),
                        },
                    });
                }
            }
            if !field_seen {
                if let Some(field) = def.fields.iter().find(|f| &*f.name == name) {
                    field_seen = true;
                    found.push(MemberInfo {
                        owner: def.name.clone(),
                        name: field.name.clone(),
                        visibility: field.visibility,
                        kind: MemberKind::Field {
                            kind: field.kind.clone(),
                            is_static: field.is_static,
                        },
                    });
                }
            }
        }
        Ok(found)
    }

    fn is_subtype(&self, sub: &TypeName, sup: &TypeName) -> bool {
        sub == sup || self.linearize(sub).iter().any(|def| &def.name == sup)
    }

    fn is_interface(&self, ty: &TypeName) -> bool {
        self.class(ty).is_some_and(|def| def.is_interface)
    }

    fn package_of(&self, ty: &TypeName) -> Option<Arc<str>> {
        self.class(ty).map(|def| def.package.clone())
    }

    fn call_static(
        &self,
        owner: &TypeName,
        name: &str,
        ty: &TypeDescriptor,
        args: Vec<Value>,
    ) -> Result<Value> {
        let body = self
            .find_method(owner, name, ty, true)
            .and_then(|m| m.body)
            .ok_or_else(|| not_found(owner, name))?;
        body(args)
    }

    fn call_direct(
        &self,
        owner: &TypeName,
        name: &str,
        ty: &TypeDescriptor,
        receiver: &ObjRef,
        args: Vec<Value>,
    ) -> Result<Value> {
        self.run_instance_method(owner, owner, name, ty, receiver, args)
    }

    fn call_virtual(
        &self,
        owner: &TypeName,
        name: &str,
        ty: &TypeDescriptor,
        receiver: &ObjRef,
        args: Vec<Value>,
    ) -> Result<Value> {
        self.run_instance_method(receiver.class(), owner, name, ty, receiver, args)
    }

    fn get_field(&self, owner: &TypeName, field: &str, receiver: Option<&ObjRef>) -> Result<Value> {
        match receiver {
            Some(obj) => obj.field(field).ok_or_else(|| not_found(obj.class(), field)),
            None => {
                let def = self.static_slot(owner, field)?;
                let value = def.statics.read().get(field).cloned();
                value.ok_or_else(|| not_found(owner, field))
            }
        }
    }

    fn set_field(
        &self,
        owner: &TypeName,
        field: &str,
        receiver: Option<&ObjRef>,
        value: Value,
    ) -> Result<()> {
        match receiver {
            Some(obj) => {
                if obj.set_field(field, value) {
                    Ok(())
                } else {
                    Err(not_found(obj.class(), field))
                }
            }
            None => {
                let def = self.static_slot(owner, field)?;
                def.statics.write().insert(Arc::from(field), value);
                Ok(())
            }
        }
    }

    fn construct(&self, owner: &TypeName, ty: &TypeDescriptor, args: Vec<Value>) -> Result<Value> {
        let chain = self.linearize(owner);
        let Some(def) = chain.first() else {
            return Err(not_found(owner, CONSTRUCTOR_NAME));
        };
        if def.is_interface {
            return Err(Thrown::new("Instantiation", format!("{} is an interface", owner)).into());
        }
        let ctor = def
            .constructors
            .iter()
            .find(|c| c.ty.params() == ty.params())
            .ok_or_else(|| not_found(owner, CONSTRUCTOR_NAME))?;

        let fields = chain
            .iter()
            .filter(|d| !d.is_interface)
            .flat_map(|d| d.fields.iter().filter(|f| !f.is_static))
            .map(|f| (f.name.clone(), Value::default_for(&f.kind)));
        let obj: ObjRef = Arc::new(Instance::with_fields(def.name.clone(), fields));

        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(Value::object(obj.clone()));
        full.extend(args);
        (ctor.body)(full)?;
        Ok(Value::object(obj))
    }
}
