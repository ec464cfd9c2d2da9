//! Access-checked handle creation.
//!
//! A [`Lookup`] pairs a runtime with the context on whose behalf members are
//! resolved. Full-power lookups only come from [`Runtime::lookup`]; every
//! derived lookup carries a subset of its parent's modes, so combining
//! lookups can never produce a stronger one.

use std::{fmt, ops::BitOr, sync::Arc};

use tracing::{debug, trace};

use crate::{
    error::{HandleError, Result},
    runtime::{
        Runtime,
        handle::Handle,
        host::{CONSTRUCTOR_NAME, MemberInfo, MemberKind},
        target::{DispatchKind, FieldMode, Target},
    },
    types::{Kind, TypeDescriptor, TypeName},
};

/// Which visibility levels a lookup context may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessModes(u8);

impl AccessModes {
    pub const NONE: AccessModes = AccessModes(0);
    pub const PUBLIC: AccessModes = AccessModes(1);
    pub const PACKAGE: AccessModes = AccessModes(1 << 1);
    pub const PROTECTED: AccessModes = AccessModes(1 << 2);
    pub const PRIVATE: AccessModes = AccessModes(1 << 3);
    pub const ALL: AccessModes = AccessModes(0b1111);

    pub fn contains(self, other: AccessModes) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersect(self, other: AccessModes) -> AccessModes {
        AccessModes(self.0 & other.0)
    }

    pub fn without(self, other: AccessModes) -> AccessModes {
        AccessModes(self.0 & !other.0)
    }
}

impl BitOr for AccessModes {
    type Output = AccessModes;

    fn bitor(self, rhs: AccessModes) -> AccessModes {
        AccessModes(self.0 | rhs.0)
    }
}

/// On whose behalf a lookup resolves members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessContext {
    caller: TypeName,
    modes: AccessModes,
}

impl AccessContext {
    pub(crate) fn new(caller: TypeName, modes: AccessModes) -> Self {
        Self { caller, modes }
    }

    pub fn caller(&self) -> &TypeName {
        &self.caller
    }

    pub fn modes(&self) -> AccessModes {
        self.modes
    }
}

/// What a lookup is asked to resolve, and as which shape.
#[derive(Debug, Clone, PartialEq)]
pub enum RefKind {
    Static(TypeDescriptor),
    Virtual(TypeDescriptor),
    Interface(TypeDescriptor),
    /// Non-virtual call of the owner's own implementation.
    Special(TypeDescriptor),
    Getter(Kind),
    Setter(Kind),
    StaticGetter(Kind),
    StaticSetter(Kind),
    /// Parameters of the constructor; the return kind is ignored.
    Constructor(TypeDescriptor),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberRef {
    pub owner: TypeName,
    pub name: Arc<str>,
    pub kind: RefKind,
}

impl MemberRef {
    pub fn new(owner: impl AsRef<str>, name: impl AsRef<str>, kind: RefKind) -> Self {
        Self {
            owner: TypeName::new(owner),
            name: Arc::from(name.as_ref()),
            kind,
        }
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.name)
    }
}

#[derive(Clone)]
pub struct Lookup {
    runtime: Runtime,
    ctx: AccessContext,
}

impl fmt::Debug for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lookup({}, {:?})", self.ctx.caller, self.ctx.modes)
    }
}

impl Lookup {
    pub(crate) fn new(runtime: Runtime, ctx: AccessContext) -> Self {
        Self { runtime, ctx }
    }

    pub fn context(&self) -> &AccessContext {
        &self.ctx
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// A lookup acting as `other`.
    ///
    /// Private access survives only for the same type, package and protected
    /// access only within the same package.
    pub fn in_class(&self, other: &TypeName) -> Lookup {
        let host = self.runtime.host();
        let mut modes = self.ctx.modes;
        if other != &self.ctx.caller {
            modes = modes.without(AccessModes::PRIVATE);
            let same_package = host.package_of(other).is_some()
                && host.package_of(other) == host.package_of(&self.ctx.caller);
            if !same_package {
                modes = modes.intersect(AccessModes::PUBLIC);
            }
        }
        Lookup::new(self.runtime.clone(), AccessContext::new(other.clone(), modes))
    }

    pub fn drop_modes(&self, modes: AccessModes) -> Lookup {
        Lookup::new(
            self.runtime.clone(),
            AccessContext::new(self.ctx.caller.clone(), self.ctx.modes.without(modes)),
        )
    }

    /// Resolves `member`, checks access, and builds a leaf handle.
    ///
    /// No adaptation code is generated here.
    pub fn find(&self, member: &MemberRef) -> Result<Handle> {
        let host = self.runtime.host();
        let name: &str = match member.kind {
            RefKind::Constructor(_) => CONSTRUCTOR_NAME,
            _ => &*member.name,
        };
        let candidates = host.members(&member.owner, name)?;
        let relevant: Vec<&MemberInfo> = candidates
            .iter()
            .filter(|info| same_category(&member.kind, &info.kind))
            .collect();
        if relevant.is_empty() {
            return Err(HandleError::NotFound {
                owner: member.owner.to_string(),
                name: name.to_string(),
            });
        }

        let info = select(&relevant, &member.kind).ok_or_else(|| HandleError::Linkage {
            member: member.to_string(),
            reason: describe_mismatch(&relevant, &member.kind),
        })?;
        self.check_shape(member, info)?;

        if !self.runtime.access().is_accessible(host, &self.ctx, info) {
            debug!(caller = %self.ctx.caller, member = %member, "lookup denied");
            return Err(HandleError::Access {
                caller: self.ctx.caller.to_string(),
                member: member.to_string(),
            });
        }

        let target = make_target(member);
        trace!(caller = %self.ctx.caller, target = %target, "lookup resolved");
        Ok(Handle::direct(self.runtime.clone(), target))
    }

    pub fn find_static(
        &self,
        owner: impl AsRef<str>,
        name: &str,
        ty: TypeDescriptor,
    ) -> Result<Handle> {
        self.find(&MemberRef::new(owner, name, RefKind::Static(ty)))
    }

    pub fn find_virtual(
        &self,
        owner: impl AsRef<str>,
        name: &str,
        ty: TypeDescriptor,
    ) -> Result<Handle> {
        self.find(&MemberRef::new(owner, name, RefKind::Virtual(ty)))
    }

    pub fn find_interface(
        &self,
        owner: impl AsRef<str>,
        name: &str,
        ty: TypeDescriptor,
    ) -> Result<Handle> {
        self.find(&MemberRef::new(owner, name, RefKind::Interface(ty)))
    }

    pub fn find_special(
        &self,
        owner: impl AsRef<str>,
        name: &str,
        ty: TypeDescriptor,
    ) -> Result<Handle> {
        self.find(&MemberRef::new(owner, name, RefKind::Special(ty)))
    }

    pub fn find_getter(&self, owner: impl AsRef<str>, name: &str, kind: Kind) -> Result<Handle> {
        self.find(&MemberRef::new(owner, name, RefKind::Getter(kind)))
    }

    pub fn find_setter(&self, owner: impl AsRef<str>, name: &str, kind: Kind) -> Result<Handle> {
        self.find(&MemberRef::new(owner, name, RefKind::Setter(kind)))
    }

    pub fn find_static_getter(
        &self,
        owner: impl AsRef<str>,
        name: &str,
        kind: Kind,
    ) -> Result<Handle> {
        self.find(&MemberRef::new(owner, name, RefKind::StaticGetter(kind)))
    }

    pub fn find_static_setter(
        &self,
        owner: impl AsRef<str>,
        name: &str,
        kind: Kind,
    ) -> Result<Handle> {
        self.find(&MemberRef::new(owner, name, RefKind::StaticSetter(kind)))
    }

    pub fn find_constructor(
        &self,
        owner: impl AsRef<str>,
        params: TypeDescriptor,
    ) -> Result<Handle> {
        self.find(&MemberRef::new(owner, CONSTRUCTOR_NAME, RefKind::Constructor(params)))
    }

    fn check_shape(&self, member: &MemberRef, info: &MemberInfo) -> Result<()> {
        let host = self.runtime.host();
        let owner_is_interface = host.is_interface(&member.owner);
        let reason = match (&member.kind, &info.kind) {
            (RefKind::Virtual(_), _) if owner_is_interface => {
                Some(format!("{} is an interface, use interface dispatch", member.owner))
            }
            (RefKind::Interface(_), _) if !owner_is_interface => {
                Some(format!("{} is not an interface", member.owner))
            }
            (RefKind::Special(_), MemberKind::Method { is_abstract: true, .. }) => {
                Some("abstract methods have no implementation to call directly".to_string())
            }
            (RefKind::Constructor(_), _) if owner_is_interface => {
                Some(format!("{} is an interface", member.owner))
            }
            _ => None,
        };
        match reason {
            Some(reason) => Err(HandleError::Linkage {
                member: member.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

fn same_category(wanted: &RefKind, found: &MemberKind) -> bool {
    match wanted {
        RefKind::Static(_) | RefKind::Virtual(_) | RefKind::Interface(_) | RefKind::Special(_) => {
            matches!(found, MemberKind::Method { .. })
        }
        RefKind::Getter(_)
        | RefKind::Setter(_)
        | RefKind::StaticGetter(_)
        | RefKind::StaticSetter(_) => {
            matches!(found, MemberKind::Field { .. })
        }
        RefKind::Constructor(_) => matches!(found, MemberKind::Constructor { .. }),
    }
}

fn select<'a>(candidates: &[&'a MemberInfo], wanted: &RefKind) -> Option<&'a MemberInfo> {
    candidates.iter().copied().find(|info| match (wanted, &info.kind) {
        (RefKind::Static(want), MemberKind::Method { ty, is_static, .. }) => {
            *is_static && ty == want
        }
        (
            RefKind::Virtual(want) | RefKind::Interface(want) | RefKind::Special(want),
            MemberKind::Method { ty, is_static, .. },
        ) => !*is_static && ty == want,
        (RefKind::Getter(want) | RefKind::Setter(want), MemberKind::Field { kind, is_static }) => {
            !*is_static && kind == want
        }
        (
            RefKind::StaticGetter(want) | RefKind::StaticSetter(want),
            MemberKind::Field { kind, is_static },
        ) => *is_static && kind == want,
        (RefKind::Constructor(want), MemberKind::Constructor { ty }) => {
            ty.params() == want.params()
        }
        _ => false,
    })
}

fn describe_mismatch(candidates: &[&MemberInfo], wanted: &RefKind) -> String {
    let found: Vec<String> = candidates
        .iter()
        .map(|info| match &info.kind {
            MemberKind::Method { ty, is_static, .. } => {
                format!("{}{}", if *is_static { "static " } else { "" }, ty)
            }
            MemberKind::Field { kind, is_static } => {
                format!("{}{}", if *is_static { "static " } else { "" }, kind)
            }
            MemberKind::Constructor { ty } => ty.to_string(),
        })
        .collect();
    let wanted = match wanted {
        RefKind::Static(ty) => format!("static {}", ty),
        RefKind::Virtual(ty) | RefKind::Interface(ty) | RefKind::Special(ty) => ty.to_string(),
        RefKind::Getter(kind) | RefKind::Setter(kind) => kind.to_string(),
        RefKind::StaticGetter(kind) | RefKind::StaticSetter(kind) => format!("static {}", kind),
        RefKind::Constructor(ty) => ty.with_return(Kind::Void).to_string(),
    };
    format!("wanted {}, found {}", wanted, found.join(" | "))
}

fn make_target(member: &MemberRef) -> Target {
    let owner = member.owner.clone();
    let name = member.name.clone();
    let method = |dispatch: DispatchKind, ty: &TypeDescriptor| Target::BoundMethod {
        receiver: owner.clone(),
        dispatch,
        name: name.clone(),
        ty: ty.clone(),
    };
    let field = |kind: &Kind, mode: FieldMode, is_static: bool| Target::FieldAccess {
        owner: owner.clone(),
        field: name.clone(),
        kind: kind.clone(),
        mode,
        is_static,
    };
    match &member.kind {
        RefKind::Static(ty) => Target::StaticFunction {
            owner: owner.clone(),
            name: name.clone(),
            ty: ty.clone(),
        },
        RefKind::Virtual(ty) => method(DispatchKind::Virtual, ty),
        RefKind::Interface(ty) => method(DispatchKind::Interface, ty),
        RefKind::Special(ty) => method(DispatchKind::Static, ty),
        RefKind::Getter(kind) => field(kind, FieldMode::Get, false),
        RefKind::Setter(kind) => field(kind, FieldMode::Set, false),
        RefKind::StaticGetter(kind) => field(kind, FieldMode::Get, true),
        RefKind::StaticSetter(kind) => field(kind, FieldMode::Set, true),
        RefKind::Constructor(ty) => Target::Constructor {
            owner: owner.clone(),
            params: ty.with_return(Kind::Void),
        },
    }
}

#[cfg(test)]
#[path = "lookup_test.rs"]
mod lookup_test;
