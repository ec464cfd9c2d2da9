//! Swappable call targets and the epoch protocol for code that folds them.
//!
//! A [`CallSite`] holds one handle plus an epoch that grows by one on every
//! swap. The pair lives behind a single `Arc` that is replaced as a whole, so
//! a reader sees the old target with the old epoch or the new target with
//! the new epoch.
//!
//! Code that treats the current target as a constant registers a
//! [`Dependent`] at the epoch it observed. The next swap calls every such
//! dependent exactly once and forgets it. Registration at an epoch that is
//! already stale is refused, so a dependent can never miss its invalidation.

use std::{
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::{
    error::{HandleError, Result},
    runtime::{
        handle::{Form, Handle},
        telemetry,
    },
    types::TypeDescriptor,
};

/// Something specialised on a call site's target at some epoch.
pub trait Dependent: Send + Sync {
    /// The target this dependent assumed is gone. Called at most once, after
    /// the swap is visible and with no call-site lock held.
    fn invalidate(&self, site: &CallSite, stale_epoch: u64, new_epoch: u64);
}

struct Binding {
    target: Handle,
    epoch: u64,
}

struct CallSiteInner {
    ty: TypeDescriptor,
    mutable: bool,
    binding: RwLock<Arc<Binding>>,
    dependents: Mutex<Vec<(u64, Weak<dyn Dependent>)>>,
}

#[derive(Clone)]
pub struct CallSite(Arc<CallSiteInner>);

impl CallSite {
    /// A site whose target may be replaced by one of the same type.
    pub fn mutable(target: Handle) -> Self {
        Self::build(target, true)
    }

    /// A site whose target never changes.
    pub fn constant(target: Handle) -> Self {
        Self::build(target, false)
    }

    fn build(target: Handle, mutable: bool) -> Self {
        Self(Arc::new(CallSiteInner {
            ty: target.descriptor().clone(),
            mutable,
            binding: RwLock::new(Arc::new(Binding { target, epoch: 0 })),
            dependents: Mutex::new(Vec::new()),
        }))
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.0.ty
    }

    pub fn is_mutable(&self) -> bool {
        self.0.mutable
    }

    pub fn target(&self) -> Handle {
        self.0.binding.read().target.clone()
    }

    pub fn epoch(&self) -> u64 {
        self.0.binding.read().epoch
    }

    /// The current target together with the epoch it was installed at.
    pub fn snapshot(&self) -> (Handle, u64) {
        let binding = self.0.binding.read().clone();
        (binding.target.clone(), binding.epoch)
    }

    /// Installs `target` and bumps the epoch, then invalidates dependents.
    ///
    /// On failure the target and epoch are unchanged.
    pub fn set_target(&self, target: Handle) -> Result<u64> {
        if !self.0.mutable {
            return Err(HandleError::ImmutableCallSite);
        }
        if target.descriptor() != &self.0.ty {
            return Err(HandleError::type_mismatch(&self.0.ty, target.descriptor()));
        }

        let (stale, new_epoch) = {
            let mut dependents = self.0.dependents.lock();
            let mut binding = self.0.binding.write();
            let new_epoch = binding.epoch + 1;
            *binding = Arc::new(Binding {
                target,
                epoch: new_epoch,
            });
            (std::mem::take(&mut *dependents), new_epoch)
        };

        telemetry::record_call_site_swap();
        let mut invalidated = 0;
        for (epoch, dependent) in stale {
            if let Some(dependent) = dependent.upgrade() {
                dependent.invalidate(self, epoch, new_epoch);
                invalidated += 1;
            }
        }
        telemetry::record_invalidations(invalidated);
        debug!(site = %self.0.ty, epoch = new_epoch, invalidated, "call site retargeted");
        Ok(new_epoch)
    }

    /// Records that `dependent` assumed the target installed at `epoch`.
    ///
    /// Returns `false`, registering nothing, when `epoch` is no longer
    /// current; the caller must re-read the site instead of folding. Constant
    /// sites never invalidate and accept any current-epoch registration.
    pub fn register_dependent(&self, epoch: u64, dependent: &Arc<dyn Dependent>) -> bool {
        let mut dependents = self.0.dependents.lock();
        if self.0.binding.read().epoch != epoch {
            return false;
        }
        if self.0.mutable {
            dependents.retain(|(_, weak)| weak.strong_count() > 0);
            dependents.push((epoch, Arc::downgrade(dependent)));
        }
        true
    }

    /// Live dependents waiting on the next swap.
    pub fn dependent_count(&self) -> usize {
        self.0
            .dependents
            .lock()
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }

    /// A handle of this site's type that always calls the current target.
    pub fn dynamic_invoker(&self) -> Handle {
        let runtime = self.target().runtime().clone();
        Handle::new(runtime, self.0.ty.clone(), Form::Dynamic(self.clone()))
    }

    pub fn ptr_eq(a: &CallSite, b: &CallSite) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl fmt::Debug for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.0.mutable { "mutable" } else { "constant" };
        write!(f, "CallSite({} {} @{})", kind, self.0.ty, self.epoch())
    }
}
