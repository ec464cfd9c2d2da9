//! Adapter synthesis and the single-entry adapter cache.
//!
//! An adapter is a [`ConversionPlan`]: one conversion per parameter, from the
//! requested kind to the declared kind, and one for the result, from the
//! declared kind back to the requested kind. Building a plan is a pure
//! function of the two descriptors and the runtime's conversion policy.
//!
//! Each handle caches exactly one plan, keyed by its requested descriptor.
//! Asking for another descriptor replaces it. The slot is swapped as a whole
//! `Arc`, so readers see either the old plan or the new one, never a mix.
//! Concurrent builders for the same descriptor race benignly: their plans
//! are equal and the last store wins.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::{
    config::ConversionPolicy,
    error::{HandleError, Result},
    runtime::{Runtime, telemetry, value::Value},
    types::{Kind, TypeDescriptor},
};

use super::Handle;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Conversion {
    Identity,
    /// Lossless primitive widening to the given kind.
    Widen(Kind),
    /// Primitive narrowing, checked per value.
    Narrow(Kind),
    /// Drops a result the caller asked to see as void.
    Discard,
}

#[derive(Debug, PartialEq)]
pub(crate) struct ConversionPlan {
    requested: TypeDescriptor,
    params: Box<[Conversion]>,
    ret: Conversion,
}

impl ConversionPlan {
    /// Plans the conversions that let a `requested` caller reach `declared`.
    pub(crate) fn build(
        runtime: &Runtime,
        declared: &TypeDescriptor,
        requested: &TypeDescriptor,
    ) -> Result<Self> {
        if declared.arity() != requested.arity() {
            return Err(HandleError::adaptation(
                requested,
                declared,
                format!(
                    "parameter count differs ({} vs {})",
                    requested.arity(),
                    declared.arity()
                ),
            ));
        }

        let policy = runtime.policy();
        let mut params = Vec::with_capacity(declared.arity());
        for (index, (from, to)) in requested.params().iter().zip(declared.params()).enumerate() {
            let conversion = plan_conversion(runtime, policy, from, to).map_err(|reason| {
                let reason = format!("parameter {}: {}", index, reason);
                HandleError::adaptation(requested, declared, reason)
            })?;
            params.push(conversion);
        }

        let ret = match (declared.ret(), requested.ret()) {
            (_, Kind::Void) if !declared.ret().is_void() => Conversion::Discard,
            (from, to) => plan_conversion(runtime, policy, from, to).map_err(|reason| {
                HandleError::adaptation(requested, declared, format!("return: {}", reason))
            })?,
        };

        Ok(Self {
            requested: requested.clone(),
            params: params.into_boxed_slice(),
            ret,
        })
    }

    pub(crate) fn requested(&self) -> &TypeDescriptor {
        &self.requested
    }

    /// Converts `args`, calls `target`, and converts its result back.
    pub(crate) fn apply(&self, target: &Handle, args: Vec<Value>) -> Result<Value> {
        let converted = args
            .into_iter()
            .zip(self.params.iter())
            .map(|(value, conversion)| conversion.apply(value))
            .collect::<Result<Vec<_>>>()?;
        let result = target.call(converted)?;
        self.ret.apply(result)
    }
}

fn plan_conversion(
    runtime: &Runtime,
    policy: ConversionPolicy,
    from: &Kind,
    to: &Kind,
) -> std::result::Result<Conversion, String> {
    if from == to {
        return Ok(Conversion::Identity);
    }
    match (from, to) {
        (Kind::Ref(sub), Kind::Ref(sup)) => {
            let host = runtime.host();
            if host.is_subtype(sub, sup) {
                Ok(Conversion::Identity)
            } else {
                Err(format!("{} is not a subtype of {}", sub, sup))
            }
        }
        _ if from.is_numeric() && to.is_numeric() => {
            if from.widens_to(to) {
                Ok(Conversion::Widen(to.clone()))
            } else if policy.allows_narrowing() {
                Ok(Conversion::Narrow(to.clone()))
            } else {
                Err(format!("narrowing {} to {} is not permitted", from, to))
            }
        }
        _ if from.is_void() || to.is_void() => Err(format!("{} does not convert to {}", from, to)),
        _ if from.is_reference() || to.is_reference() => Err(format!(
            "{} and {} cross the primitive/reference boundary",
            from, to
        )),
        _ => Err(format!("{} does not convert to {}", from, to)),
    }
}

impl Conversion {
    fn apply(&self, value: Value) -> Result<Value> {
        match self {
            Conversion::Identity => Ok(value),
            Conversion::Discard => Ok(Value::Void),
            Conversion::Widen(kind) => widen_numeric(&value, kind)
                .ok_or_else(|| HandleError::adaptation(value.kind(), kind, "not a numeric value")),
            Conversion::Narrow(kind) => narrow_numeric(&value, kind).ok_or_else(|| {
                HandleError::adaptation(value.kind(), kind, format!("value {} does not fit", value))
            }),
        }
    }
}

enum Numeric {
    Integral(i64),
    Floating(f64),
}

fn numeric_source(value: &Value) -> Option<Numeric> {
    Some(match value {
        Value::Byte(v) => Numeric::Integral(i64::from(*v)),
        Value::Short(v) => Numeric::Integral(i64::from(*v)),
        Value::Char(v) => Numeric::Integral(i64::from(*v)),
        Value::Int(v) => Numeric::Integral(i64::from(*v)),
        Value::Long(v) => Numeric::Integral(*v),
        Value::Float(v) => Numeric::Floating(f64::from(*v)),
        Value::Double(v) => Numeric::Floating(*v),
        _ => return None,
    })
}

/// Widens along the primitive widening table.
fn widen_numeric(value: &Value, to: &Kind) -> Option<Value> {
    Some(match (numeric_source(value)?, to) {
        (Numeric::Integral(v), Kind::Byte) => Value::Byte(v as i8),
        (Numeric::Integral(v), Kind::Short) => Value::Short(v as i16),
        (Numeric::Integral(v), Kind::Char) => Value::Char(v as u16),
        (Numeric::Integral(v), Kind::Int) => Value::Int(v as i32),
        (Numeric::Integral(v), Kind::Long) => Value::Long(v),
        (Numeric::Integral(v), Kind::Float) => Value::Float(v as f32),
        (Numeric::Integral(v), Kind::Double) => Value::Double(v as f64),
        (Numeric::Floating(v), Kind::Double) => Value::Double(v),
        _ => return None,
    })
}

/// Narrows `value` to `to`, or `None` when the value has no exact image there.
fn narrow_numeric(value: &Value, to: &Kind) -> Option<Value> {
    match numeric_source(value)? {
        Numeric::Integral(v) => integral_to(v, to),
        Numeric::Floating(v) => match to {
            // NaN has an exact image in every floating kind
            Kind::Float if v.is_nan() => Some(Value::Float(f32::NAN)),
            Kind::Float => {
                let narrowed = v as f32;
                (f64::from(narrowed) == v).then_some(Value::Float(narrowed))
            }
            Kind::Double => Some(Value::Double(v)),
            _ => integral_to(float_to_i64(v)?, to),
        },
    }
}

fn integral_to(v: i64, to: &Kind) -> Option<Value> {
    match to {
        Kind::Byte => i8::try_from(v).ok().map(Value::Byte),
        Kind::Short => i16::try_from(v).ok().map(Value::Short),
        Kind::Char => u16::try_from(v).ok().map(Value::Char),
        Kind::Int => i32::try_from(v).ok().map(Value::Int),
        Kind::Long => Some(Value::Long(v)),
        Kind::Float => {
            let narrowed = v as f32;
            (float_to_i64(f64::from(narrowed)) == Some(v)).then_some(Value::Float(narrowed))
        }
        Kind::Double => {
            let narrowed = v as f64;
            (float_to_i64(narrowed) == Some(v)).then_some(Value::Double(narrowed))
        }
        _ => None,
    }
}

/// The integer `v` denotes exactly, if it lies in `[-2^63, 2^63)`.
fn float_to_i64(v: f64) -> Option<i64> {
    let min = i64::MIN as f64;
    let in_range = v.is_finite() && v.fract() == 0.0 && min <= v && v < -min;
    in_range.then_some(v as i64)
}

/// One-entry memo of the last adapter a handle built.
#[derive(Default)]
pub(crate) struct AdapterCache {
    slot: RwLock<Option<Arc<ConversionPlan>>>,
    builds: AtomicUsize,
}

impl AdapterCache {
    fn lookup(&self, requested: &TypeDescriptor) -> Option<Arc<ConversionPlan>> {
        self.slot
            .read()
            .as_ref()
            .filter(|plan| plan.requested() == requested)
            .cloned()
    }

    /// Installs `plan`, returning whether a plan for another descriptor was evicted.
    pub(crate) fn store(&self, plan: Arc<ConversionPlan>) -> bool {
        self.builds.fetch_add(1, Ordering::Relaxed);
        let previous = self.slot.write().replace(plan.clone());
        // a racing builder storing the same descriptor is not an eviction
        let evicted = previous.is_some_and(|old| old.requested() != plan.requested());
        if evicted {
            telemetry::record_adapter_eviction();
        }
        evicted
    }

    pub(crate) fn cached_type(&self) -> Option<TypeDescriptor> {
        self.slot.read().as_ref().map(|plan| plan.requested().clone())
    }

    pub(crate) fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }
}

impl Handle {
    /// The cached plan for `requested`, building and caching it on a miss.
    pub(crate) fn adapter_plan(&self, requested: &TypeDescriptor) -> Result<Arc<ConversionPlan>> {
        let cache = &self.0.adapter;
        if let Some(plan) = cache.lookup(requested) {
            telemetry::record_adapter_hit();
            trace!(declared = %self.descriptor(), requested = %requested, "adapter cache hit");
            return Ok(plan);
        }

        let plan = Arc::new(ConversionPlan::build(self.runtime(), self.descriptor(), requested)?);
        telemetry::record_adapter_build();
        debug!(declared = %self.descriptor(), requested = %requested, "built adapter");
        cache.store(plan.clone());
        Ok(plan)
    }
}
