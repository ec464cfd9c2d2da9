use std::{fmt, sync::Arc};

use crate::{
    error::{HandleError, Result},
    runtime::{
        host::Host,
        value::{ObjRef, Thrown, Value},
    },
    types::{Kind, TypeDescriptor, TypeName},
};

/// How a bound method reaches its implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchKind {
    /// The owner's own implementation, no override lookup.
    Static,
    /// Override lookup on the receiver's runtime class.
    Virtual,
    /// Like `Virtual`, but the owner is an interface the receiver implements.
    Interface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldMode {
    Get,
    Set,
}

/// A description of how to reach code. It owns no code itself; every variant
/// is resolved against the [`Host`] at invocation time.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// A static member of `owner`, called without a receiver.
    StaticFunction {
        owner: TypeName,
        name: Arc<str>,
        ty: TypeDescriptor,
    },
    /// An instance method. `ty` is the natural signature without the
    /// receiver; the receiver travels as the first argument.
    BoundMethod {
        receiver: TypeName,
        dispatch: DispatchKind,
        name: Arc<str>,
        ty: TypeDescriptor,
    },
    FieldAccess {
        owner: TypeName,
        field: Arc<str>,
        kind: Kind,
        mode: FieldMode,
        is_static: bool,
    },
    /// `params` lists the constructor parameters and returns void.
    Constructor {
        owner: TypeName,
        params: TypeDescriptor,
    },
}

impl Target {
    /// The descriptor a handle over this target declares.
    ///
    /// Bound methods gain their receiver as a leading parameter; getters
    /// return the field, setters take it as a trailing parameter; constructors
    /// return the constructed type.
    pub fn declared_type(&self) -> TypeDescriptor {
        match self {
            Target::StaticFunction { ty, .. } => ty.clone(),
            Target::BoundMethod { receiver, ty, .. } => {
                let mut params = Vec::with_capacity(ty.arity() + 1);
                params.push(Kind::Ref(receiver.clone()));
                params.extend_from_slice(ty.params());
                TypeDescriptor::from_parts(params, ty.ret().clone())
            }
            Target::FieldAccess {
                owner,
                kind,
                mode,
                is_static,
                ..
            } => {
                let mut params = Vec::with_capacity(2);
                if !is_static {
                    params.push(Kind::Ref(owner.clone()));
                }
                match mode {
                    FieldMode::Get => TypeDescriptor::from_parts(params, kind.clone()),
                    FieldMode::Set => {
                        params.push(kind.clone());
                        TypeDescriptor::from_parts(params, Kind::Void)
                    }
                }
            }
            Target::Constructor { owner, params } => {
                params.with_return(Kind::Ref(owner.clone()))
            }
        }
    }

    /// Dispatches to the host. `args` already matches [`Target::declared_type`].
    pub(crate) fn dispatch(&self, host: &dyn Host, mut args: Vec<Value>) -> Result<Value> {
        match self {
            Target::StaticFunction { owner, name, ty } => host.call_static(owner, name, ty, args),
            Target::BoundMethod {
                receiver,
                dispatch,
                name,
                ty,
            } => {
                let this = take_receiver(&mut args, receiver)?;
                match dispatch {
                    DispatchKind::Static => host.call_direct(receiver, name, ty, &this, args),
                    DispatchKind::Virtual => host.call_virtual(receiver, name, ty, &this, args),
                    DispatchKind::Interface => {
                        if !host.is_subtype(this.class(), receiver) {
                            return Err(Thrown::new(
                                "IncompatibleClassChange",
                                format!("{} does not implement {}", this.class(), receiver),
                            )
                            .into());
                        }
                        host.call_virtual(receiver, name, ty, &this, args)
                    }
                }
            }
            Target::FieldAccess {
                owner,
                field,
                mode,
                is_static,
                ..
            } => {
                let this = if *is_static {
                    None
                } else {
                    Some(take_receiver(&mut args, owner)?)
                };
                match mode {
                    FieldMode::Get => host.get_field(owner, field, this.as_ref()),
                    FieldMode::Set => {
                        let value = args.pop().unwrap_or(Value::Void);
                        host.set_field(owner, field, this.as_ref(), value)?;
                        Ok(Value::Void)
                    }
                }
            }
            Target::Constructor { owner, params } => host.construct(owner, params, args),
        }
    }
}

fn take_receiver(args: &mut Vec<Value>, owner: &TypeName) -> Result<ObjRef> {
    if args.is_empty() {
        return Err(HandleError::Arity {
            context: "receiver",
            expected: 1,
            actual: 0,
        });
    }
    match args.remove(0) {
        Value::Ref(Some(obj)) => Ok(obj),
        _ => Err(Thrown::new("NullReference", format!("null receiver for {}", owner)).into()),
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::StaticFunction { owner, name, ty } => {
                write!(f, "static {}.{}{}", owner, name, ty)
            }
            Target::BoundMethod {
                receiver,
                dispatch,
                name,
                ty,
            } => {
                let label = match dispatch {
                    DispatchKind::Static => "special",
                    DispatchKind::Virtual => "virtual",
                    DispatchKind::Interface => "interface",
                };
                write!(f, "{} {}.{}{}", label, receiver, name, ty)
            }
            Target::FieldAccess {
                owner,
                field,
                kind,
                mode,
                is_static,
            } => {
                let mode = match mode {
                    FieldMode::Get => "get",
                    FieldMode::Set => "set",
                };
                let scope = if *is_static { "static " } else { "" };
                write!(f, "{}{} {}.{}:{}", scope, mode, owner, field, kind)
            }
            Target::Constructor { owner, params } => write!(f, "new {}{}", owner, params),
        }
    }
}
