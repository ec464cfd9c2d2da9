//! Typed handles and their invocation paths.
//!
//! Every handle is a node in an immutable graph: a leaf reaching a host
//! [`Target`], a constant, or a combinator wrapping other handles. All
//! evaluation happens in [`Handle::call`], which matches the node kind once
//! and forwards. Type checking happens at the edges: exact invocation checks
//! the caller's descriptor once, and combinators check their inputs when they
//! are built, so forwarding between nodes never re-checks.

use std::{fmt, sync::Arc};

use crate::{
    error::{HandleError, Result},
    runtime::{Runtime, call_site::CallSite, target::Target, telemetry, value::Value},
    types::{Kind, TypeDescriptor},
};

mod adapter;

pub(crate) use adapter::{AdapterCache, ConversionPlan};

pub(crate) enum Form {
    Direct(Target),
    Constant(Value),
    Identity,
    Bound {
        inner: Handle,
        index: usize,
        value: Value,
    },
    Dropped {
        inner: Handle,
        index: usize,
        count: usize,
    },
    FilterArgument {
        inner: Handle,
        index: usize,
        filter: Handle,
    },
    FilterReturn {
        inner: Handle,
        filter: Handle,
    },
    Collect {
        inner: Handle,
        index: usize,
        collector: Handle,
    },
    Permute {
        inner: Handle,
        reorder: Box<[usize]>,
    },
    Convert {
        inner: Handle,
        plan: Arc<ConversionPlan>,
    },
    Dynamic(CallSite),
}

impl Form {
    fn label(&self) -> &'static str {
        match self {
            Form::Direct(_) => "direct",
            Form::Constant(_) => "constant",
            Form::Identity => "identity",
            Form::Bound { .. } => "bound",
            Form::Dropped { .. } => "dropped",
            Form::FilterArgument { .. } => "filter",
            Form::FilterReturn { .. } => "filter-return",
            Form::Collect { .. } => "collect",
            Form::Permute { .. } => "permute",
            Form::Convert { .. } => "convert",
            Form::Dynamic(_) => "dynamic",
        }
    }
}

struct HandleInner {
    runtime: Runtime,
    ty: TypeDescriptor,
    form: Form,
    adapter: AdapterCache,
}

/// An immutable, typed reference to something invocable.
///
/// Cloning is cheap and shares the node. The adapter cache inside is the only
/// mutable state and is not observable through invocation results.
#[derive(Clone)]
pub struct Handle(Arc<HandleInner>);

impl Handle {
    pub(crate) fn new(runtime: Runtime, ty: TypeDescriptor, form: Form) -> Self {
        telemetry::record_handle();
        Self(Arc::new(HandleInner {
            runtime,
            ty,
            form,
            adapter: AdapterCache::default(),
        }))
    }

    pub(crate) fn direct(runtime: Runtime, target: Target) -> Self {
        let ty = target.declared_type();
        Self::new(runtime, ty, Form::Direct(target))
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.0.ty
    }

    pub fn arity(&self) -> usize {
        self.0.ty.arity()
    }

    pub fn runtime(&self) -> &Runtime {
        &self.0.runtime
    }

    /// The host target of a leaf handle; `None` for composed handles.
    pub fn target(&self) -> Option<&Target> {
        match &self.0.form {
            Form::Direct(target) => Some(target),
            _ => None,
        }
    }

    pub fn ptr_eq(a: &Handle, b: &Handle) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Invokes with the caller's descriptor required to equal the declared one.
    ///
    /// A mismatch, or arguments that do not fit `call_type`, fail with
    /// `WrongType`; nothing is coerced. Failures raised by the target come
    /// back exactly as raised.
    pub fn invoke_exact(&self, call_type: &TypeDescriptor, args: Vec<Value>) -> Result<Value> {
        if call_type != &self.0.ty {
            return Err(HandleError::WrongType {
                expected: self.0.ty.clone(),
                actual: call_type.clone(),
            });
        }
        check_arguments(call_type, &args)?;
        self.call(args)
    }

    /// Invokes as `requested`, converting arguments and result when it
    /// differs from the declared descriptor.
    ///
    /// The conversion is built on first use and kept in this handle's
    /// single-entry adapter cache.
    pub fn invoke(&self, requested: &TypeDescriptor, args: Vec<Value>) -> Result<Value> {
        if requested == &self.0.ty {
            return self.invoke_exact(requested, args);
        }
        check_arguments(requested, &args)?;
        let plan = self.adapter_plan(requested)?;
        plan.apply(self, args)
    }

    /// A handle declaring `requested` that converts and forwards to `self`.
    pub fn as_type(&self, requested: &TypeDescriptor) -> Result<Handle> {
        if requested == &self.0.ty {
            return Ok(self.clone());
        }
        let plan = self.adapter_plan(requested)?;
        Ok(Handle::new(
            self.0.runtime.clone(),
            requested.clone(),
            Form::Convert {
                inner: self.clone(),
                plan,
            },
        ))
    }

    /// The requested descriptor currently held by the adapter cache.
    pub fn cached_adapter_type(&self) -> Option<TypeDescriptor> {
        self.0.adapter.cached_type()
    }

    /// How many adapters this handle has synthesised so far.
    pub fn adapter_builds(&self) -> usize {
        self.0.adapter.builds()
    }

    /// Evaluates this node. `args` already matches the declared descriptor.
    pub(crate) fn call(&self, mut args: Vec<Value>) -> Result<Value> {
        match &self.0.form {
            Form::Direct(target) => target.dispatch(self.0.runtime.host(), args),
            Form::Constant(value) => Ok(value.clone()),
            Form::Identity => Ok(args.pop().unwrap_or(Value::Void)),
            Form::Bound {
                inner,
                index,
                value,
            } => {
                args.insert(*index, value.clone());
                inner.call(args)
            }
            Form::Dropped {
                inner,
                index,
                count,
            } => {
                args.drain(*index..*index + *count);
                inner.call(args)
            }
            Form::FilterArgument {
                inner,
                index,
                filter,
            } => {
                let raw = std::mem::replace(&mut args[*index], Value::Void);
                args[*index] = filter.call(vec![raw])?;
                inner.call(args)
            }
            Form::FilterReturn { inner, filter } => {
                let result = inner.call(args)?;
                if inner.descriptor().ret().is_void() {
                    filter.call(Vec::new())
                } else {
                    filter.call(vec![result])
                }
            }
            Form::Collect {
                inner,
                index,
                collector,
            } => {
                let width = collector.arity();
                let slice: Vec<Value> = args.drain(*index..*index + width).collect();
                let collected = collector.call(slice)?;
                if !collector.descriptor().ret().is_void() {
                    args.insert(*index, collected);
                }
                inner.call(args)
            }
            Form::Permute { inner, reorder } => {
                let reordered = reorder.iter().map(|&from| args[from].clone()).collect();
                inner.call(reordered)
            }
            Form::Convert { inner, plan } => plan.apply(inner, args),
            Form::Dynamic(site) => site.target().call(args),
        }
    }
}

/// Checks that `args` can travel through the slots `ty` declares.
pub(crate) fn check_arguments(ty: &TypeDescriptor, args: &[Value]) -> Result<()> {
    let fits = args.len() == ty.arity() && args.iter().zip(ty.params()).all(|(v, k)| v.fits(k));
    if fits {
        return Ok(());
    }
    let actual: Vec<Kind> = args.iter().map(Value::kind).collect();
    Err(HandleError::WrongType {
        expected: ty.clone(),
        actual: TypeDescriptor::from_parts(actual, ty.ret().clone()),
    })
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.form {
            Form::Direct(target) => write!(f, "Handle({})", target),
            form => write!(f, "Handle({} {})", form.label(), self.0.ty),
        }
    }
}
