//! The boundary to the hosting system.
//!
//! Handles never implement dispatch or visibility themselves. They resolve
//! members through [`Host::members`], ask an [`AccessAuthority`] whether a
//! lookup context may see them, and call back into the host to run code.

use std::sync::Arc;

use crate::{
    error::Result,
    runtime::{
        lookup::{AccessContext, AccessModes},
        value::{ObjRef, Value},
    },
    types::{Kind, TypeDescriptor, TypeName},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    Protected,
    /// Visible within the declaring package only.
    Package,
    Private,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberKind {
    Method {
        /// Natural signature, without any receiver.
        ty: TypeDescriptor,
        is_static: bool,
        is_abstract: bool,
    },
    Field {
        kind: Kind,
        is_static: bool,
    },
    /// `ty` lists the constructor parameters and returns void.
    Constructor { ty: TypeDescriptor },
}

/// A resolved member as the host describes it.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberInfo {
    /// The type that declares the member, which may be a supertype of the
    /// type the lookup named.
    pub owner: TypeName,
    pub name: Arc<str>,
    pub visibility: Visibility,
    pub kind: MemberKind,
}

/// Name under which hosts report constructors.
pub const CONSTRUCTOR_NAME: &str = "<init>";

/// The host's native call facility and type information.
pub trait Host: Send + Sync {
    /// Every member called `name` visible from `owner`, including inherited
    /// ones. Fails with `NotFound` when `owner` itself is unknown.
    fn members(&self, owner: &TypeName, name: &str) -> Result<Vec<MemberInfo>>;

    /// Reflexive subtype test.
    fn is_subtype(&self, sub: &TypeName, sup: &TypeName) -> bool;

    fn is_interface(&self, ty: &TypeName) -> bool;

    fn package_of(&self, ty: &TypeName) -> Option<Arc<str>>;

    fn call_static(
        &self,
        owner: &TypeName,
        name: &str,
        ty: &TypeDescriptor,
        args: Vec<Value>,
    ) -> Result<Value>;

    /// Calls `owner`'s own implementation on `receiver` without override lookup.
    fn call_direct(
        &self,
        owner: &TypeName,
        name: &str,
        ty: &TypeDescriptor,
        receiver: &ObjRef,
        args: Vec<Value>,
    ) -> Result<Value>;

    /// Calls the most specific implementation for `receiver`'s runtime class.
    fn call_virtual(
        &self,
        owner: &TypeName,
        name: &str,
        ty: &TypeDescriptor,
        receiver: &ObjRef,
        args: Vec<Value>,
    ) -> Result<Value>;

    fn get_field(&self, owner: &TypeName, field: &str, receiver: Option<&ObjRef>) -> Result<Value>;

    fn set_field(
        &self,
        owner: &TypeName,
        field: &str,
        receiver: Option<&ObjRef>,
        value: Value,
    ) -> Result<()>;

    /// Allocates an `owner` and runs the constructor with parameters `ty`.
    fn construct(&self, owner: &TypeName, ty: &TypeDescriptor, args: Vec<Value>) -> Result<Value>;
}

/// Decides whether a lookup context may observe or call a member.
pub trait AccessAuthority: Send + Sync {
    fn is_accessible(&self, host: &dyn Host, ctx: &AccessContext, member: &MemberInfo) -> bool;
}

/// The usual visibility rules:
///
/// - public members are always accessible,
/// - package members need the same package,
/// - protected members need the same package or a subtype caller,
/// - private members need the declaring type itself.
///
/// Each rule also needs the matching mode in the context.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardAccess;

impl AccessAuthority for StandardAccess {
    fn is_accessible(&self, host: &dyn Host, ctx: &AccessContext, member: &MemberInfo) -> bool {
        let modes = ctx.modes();
        let same_package = || {
            let caller = host.package_of(ctx.caller());
            caller.is_some() && caller == host.package_of(&member.owner)
        };
        match member.visibility {
            Visibility::Public => modes.contains(AccessModes::PUBLIC),
            Visibility::Package => modes.contains(AccessModes::PACKAGE) && same_package(),
            Visibility::Protected => {
                (modes.contains(AccessModes::PACKAGE) && same_package())
                    || (modes.contains(AccessModes::PROTECTED)
                        && host.is_subtype(ctx.caller(), &member.owner))
            }
            Visibility::Private => {
                modes.contains(AccessModes::PRIVATE) && ctx.caller() == &member.owner
            }
        }
    }
}
