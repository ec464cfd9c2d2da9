//! Building new handles out of existing ones.
//!
//! Every combinator validates its inputs up front and fails with `Index`,
//! `Arity` or `TypeMismatch` before a handle exists; a handle that was built
//! never fails for shape reasons when invoked. Inputs are never modified.

use crate::{
    error::{HandleError, Result},
    runtime::{
        Runtime,
        handle::{Form, Handle},
        value::Value,
    },
    types::{Kind, TypeDescriptor},
};

/// `() -> kind`, always returning `value`.
pub fn constant(runtime: &Runtime, kind: Kind, value: Value) -> Result<Handle> {
    check_value(runtime, &kind, &value)?;
    let ty = TypeDescriptor::from_parts(Vec::new(), kind);
    Ok(Handle::new(runtime.clone(), ty, Form::Constant(value)))
}

/// `(kind) -> kind`, returning its argument.
pub fn identity(runtime: &Runtime, kind: Kind) -> Result<Handle> {
    let ty = TypeDescriptor::new(vec![kind.clone()], kind)?;
    Ok(Handle::new(runtime.clone(), ty, Form::Identity))
}

/// Fixes parameter `index` of `h` to `value`.
pub fn bind_argument(h: &Handle, index: usize, value: Value) -> Result<Handle> {
    let kind = parameter(h, index)?;
    check_value(h.runtime(), kind, &value)?;
    let ty = h.descriptor().drop_parameter(index)?;
    Ok(Handle::new(
        h.runtime().clone(),
        ty,
        Form::Bound {
            inner: h.clone(),
            index,
            value,
        },
    ))
}

/// Binds a receiver as the leading argument.
pub fn bind_to(h: &Handle, receiver: Value) -> Result<Handle> {
    match h.descriptor().param(0) {
        Some(Kind::Ref(_)) => bind_argument(h, 0, receiver),
        Some(other) => Err(HandleError::type_mismatch("a reference receiver", other)),
        None => Err(HandleError::Index { index: 0, len: 0 }),
    }
}

/// Runs `filter` on argument `index` before `h` sees it.
///
/// `filter` takes one parameter and returns exactly the kind `h` expects at
/// `index`; the new handle takes `filter`'s parameter kind there.
pub fn filter_argument(h: &Handle, index: usize, filter: &Handle) -> Result<Handle> {
    let kind = parameter(h, index)?;
    if filter.arity() != 1 {
        return Err(HandleError::Arity {
            context: "argument filter",
            expected: 1,
            actual: filter.arity(),
        });
    }
    if filter.descriptor().ret() != kind {
        return Err(HandleError::type_mismatch(kind, filter.descriptor().ret()));
    }
    let ty = h
        .descriptor()
        .replace_parameter(index, filter.descriptor().params()[0].clone())?;
    Ok(Handle::new(
        h.runtime().clone(),
        ty,
        Form::FilterArgument {
            inner: h.clone(),
            index,
            filter: filter.clone(),
        },
    ))
}

/// Runs `filter` on the result of `h`.
///
/// For a void `h`, `filter` takes no parameters.
pub fn filter_return_value(h: &Handle, filter: &Handle) -> Result<Handle> {
    let ret = h.descriptor().ret();
    let expected: &[Kind] = if ret.is_void() {
        &[]
    } else {
        std::slice::from_ref(ret)
    };
    if filter.arity() != expected.len() {
        return Err(HandleError::Arity {
            context: "return filter",
            expected: expected.len(),
            actual: filter.arity(),
        });
    }
    if filter.descriptor().params() != expected {
        return Err(HandleError::type_mismatch(ret, &filter.descriptor().params()[0]));
    }
    let ty = h.descriptor().with_return(filter.descriptor().ret().clone());
    Ok(Handle::new(
        h.runtime().clone(),
        ty,
        Form::FilterReturn {
            inner: h.clone(),
            filter: filter.clone(),
        },
    ))
}

/// Replaces parameter `index` of `h` with all of `collector`'s parameters.
///
/// The collector runs on that argument slice and its result fills the slot.
/// A void collector fills nothing: its parameters are inserted before
/// `index` (which may then equal the arity) and it runs for its effect.
pub fn collect_arguments(h: &Handle, index: usize, collector: &Handle) -> Result<Handle> {
    let collected = collector.descriptor();
    let ty = if collected.ret().is_void() {
        h.descriptor().insert_parameters(index, collected.params())?
    } else {
        let kind = parameter(h, index)?;
        if collected.ret() != kind {
            return Err(HandleError::type_mismatch(kind, collected.ret()));
        }
        h.descriptor()
            .drop_parameter(index)?
            .insert_parameters(index, collected.params())?
    };
    Ok(Handle::new(
        h.runtime().clone(),
        ty,
        Form::Collect {
            inner: h.clone(),
            index,
            collector: collector.clone(),
        },
    ))
}

/// Reorders, duplicates or drops arguments.
///
/// `reorder[i]` names the `new_type` parameter that supplies `h`'s parameter
/// `i`. Parameters of `new_type` nobody names are ignored.
pub fn permute_arguments(
    h: &Handle,
    new_type: &TypeDescriptor,
    reorder: &[usize],
) -> Result<Handle> {
    let declared = h.descriptor();
    if reorder.len() != declared.arity() {
        return Err(HandleError::Arity {
            context: "permutation",
            expected: declared.arity(),
            actual: reorder.len(),
        });
    }
    if new_type.ret() != declared.ret() {
        return Err(HandleError::type_mismatch(declared.ret(), new_type.ret()));
    }
    for (to, &from) in reorder.iter().enumerate() {
        let source = new_type.param(from).ok_or(HandleError::Index {
            index: from,
            len: new_type.arity(),
        })?;
        if source != &declared.params()[to] {
            return Err(HandleError::type_mismatch(&declared.params()[to], source));
        }
    }
    Ok(Handle::new(
        h.runtime().clone(),
        new_type.clone(),
        Form::Permute {
            inner: h.clone(),
            reorder: reorder.into(),
        },
    ))
}

/// Inserts parameters of `kinds` before `index` that `h` never sees.
pub fn drop_arguments(h: &Handle, index: usize, kinds: &[Kind]) -> Result<Handle> {
    let ty = h.descriptor().insert_parameters(index, kinds)?;
    Ok(Handle::new(
        h.runtime().clone(),
        ty,
        Form::Dropped {
            inner: h.clone(),
            index,
            count: kinds.len(),
        },
    ))
}

fn parameter(h: &Handle, index: usize) -> Result<&Kind> {
    h.descriptor().param(index).ok_or(HandleError::Index {
        index,
        len: h.arity(),
    })
}

/// A bound value must fit the slot, and a non-null reference must be an
/// instance of the slot's type.
fn check_value(runtime: &Runtime, kind: &Kind, value: &Value) -> Result<()> {
    if !value.fits(kind) {
        return Err(HandleError::type_mismatch(kind, value.kind()));
    }
    if let (Kind::Ref(expected), Some(obj)) = (kind, value.as_object()) {
        if !runtime.host().is_subtype(obj.class(), expected) {
            return Err(HandleError::type_mismatch(expected, obj.class()));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "combinators_test.rs"]
mod combinators_test;
