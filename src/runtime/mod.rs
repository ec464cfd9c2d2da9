//! Handles, lookup, combinators and call sites.
//!
//! # No-Cycle Invariant
//! Handles form immutable DAGs: a composed handle owns the handles it was
//! built from, never the other way around. The one mutable slot inside a
//! handle, its adapter cache, stores a conversion plan rather than the
//! adapted handle, so a handle never owns something that owns it.
//!
//! Call sites are the only place where a cycle can be introduced, by making a
//! site's own dynamic invoker (or a chain containing it) its target. That is
//! the caller's responsibility.
use std::{fmt, sync::Arc};

use crate::{
    config::{ConversionPolicy, RuntimeConfig},
    runtime::{
        host::{AccessAuthority, Host, StandardAccess},
        lookup::{AccessContext, AccessModes, Lookup},
    },
    types::TypeName,
};

pub mod call_site;
pub mod class_table;
pub mod combinators;
pub mod handle;
pub mod host;
pub mod lookup;
pub mod target;
pub mod telemetry;
pub mod value;

struct RuntimeInner {
    host: Arc<dyn Host>,
    access: Arc<dyn AccessAuthority>,
    config: RuntimeConfig,
}

/// Shared context every handle carries: the host to dispatch into, the
/// authority deciding lookups, and the fixed configuration.
#[derive(Clone)]
pub struct Runtime(Arc<RuntimeInner>);

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.0.config)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// Standard visibility rules and the default configuration.
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self::with_parts(host, Arc::new(StandardAccess), RuntimeConfig::default())
    }

    pub fn with_config(host: Arc<dyn Host>, config: RuntimeConfig) -> Self {
        Self::with_parts(host, Arc::new(StandardAccess), config)
    }

    pub fn with_parts(
        host: Arc<dyn Host>,
        access: Arc<dyn AccessAuthority>,
        config: RuntimeConfig,
    ) -> Self {
        Self(Arc::new(RuntimeInner {
            host,
            access,
            config,
        }))
    }

    pub fn host(&self) -> &dyn Host {
        self.0.host.as_ref()
    }

    pub fn access(&self) -> &dyn AccessAuthority {
        self.0.access.as_ref()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.0.config
    }

    pub fn policy(&self) -> ConversionPolicy {
        self.0.config.conversion
    }

    /// A full-power lookup acting as `caller`.
    pub fn lookup(&self, caller: impl AsRef<str>) -> Lookup {
        Lookup::new(
            self.clone(),
            AccessContext::new(TypeName::new(caller), AccessModes::ALL),
        )
    }

    /// A lookup that can only reach public members.
    pub fn public_lookup(&self) -> Lookup {
        Lookup::new(
            self.clone(),
            AccessContext::new(TypeName::new(class_table::OBJECT), AccessModes::PUBLIC),
        )
    }

    pub fn ptr_eq(a: &Runtime, b: &Runtime) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}
