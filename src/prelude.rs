//! Prelude module for convenient imports.

pub use crate::error::{EnvError, Result};
pub use crate::sandbox::{
    config::{HostFunction, SandboxConfig},
    executor::LuaSandbox,
    native::NativeModule,
};
pub use crate::whitelist::{entry::WhitelistEntry, registry::WhitelistRegistry};
