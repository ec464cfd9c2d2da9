pub mod config;
pub mod error;
pub mod runtime;
pub mod types;

pub use config::{ConversionPolicy, RuntimeConfig};
pub use error::{HandleError, Result};
pub use runtime::{
    Runtime,
    call_site::CallSite,
    handle::Handle,
    lookup::Lookup,
    target::Target,
    value::{Thrown, Value},
};
pub use types::{Kind, TypeDescriptor, TypeName};
