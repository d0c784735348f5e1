//! # Lua Whitelist Sandbox
//!
//! Restricted execution environments for embedded Lua.
//!
//! A full-featured interpreter state is never handed to untrusted scripts.
//! Instead, a [`WhitelistRegistry`] declares exactly which globals and which
//! module fields a script may see, and the [`Assembler`] copies those
//! bindings into a brand new namespace that becomes the script's `_ENV`:
//!
//! - **Bare globals** are copied by reference from the full environment
//! - **Library modules** are resolved with `require`, and only the listed
//!   fields are copied into a fresh table
//! - **Native modules** are opened through a restricted loader that never
//!   registers them globally, and again only listed fields are copied
//!
//! ## Example
//!
//! ```rust,ignore
//! use lua_whitelist_sandbox_rs::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let registry = WhitelistRegistry::builder()
//!         .bare("print")
//!         .module("math", ["sin", "cos"])
//!         .build()?;
//!
//!     let config = SandboxConfig::builder()
//!         .registry(registry)
//!         .capture_output(true)
//!         .build();
//!
//!     let sandbox = LuaSandbox::new(config)?;
//!     sandbox.exec("print(math.cos(0), math.pi)", "example")?;
//!
//!     assert_eq!(sandbox.output().unwrap().to_string_lossy(), "1.0\tnil\n");
//!     Ok(())
//! }
//! ```
//!
//! ## Security Model
//!
//! 1. **Closed world**: names not listed in the registry are unreachable
//! 2. **No aliasing**: module namespaces are fresh tables, never the
//!    original module objects
//! 3. **Fail closed**: duplicate or empty declarations are rejected before
//!    anything is loaded, and any unresolved name aborts assembly
//! 4. **Text only**: sandboxed chunks cannot be precompiled bytecode
//!
//! Method calls on string values go through the shared string metatable
//! and reach the full `string` library, whatever the restricted `string`
//! namespace holds.
//!
//! Whitelisted functions are trusted. The crate does not limit memory or
//! CPU time.

#[cfg(feature = "tracing")]
macro_rules! log_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! log_debug {
    ($($arg:tt)*) => { () };
}

#[cfg(feature = "tracing")]
macro_rules! log_warn {
    ($($arg:tt)*) => { tracing::warn!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! log_warn {
    ($($arg:tt)*) => { () };
}

pub(crate) use {log_debug, log_warn};

pub mod env;
pub mod error;
pub mod prelude;
pub mod sandbox;
pub mod whitelist;

// Re-export main types at crate root for convenience
pub use env::assembler::{assemble, Assembler};
pub use env::host::{NoNativeModules, RestrictedLoader, ScriptHost};
pub use env::lua::LuaHost;
pub use error::{EnvError, Result};
pub use sandbox::config::{HostFunction, SandboxConfig, SandboxConfigBuilder};
pub use sandbox::executor::LuaSandbox;
pub use sandbox::io::CapturedOutput;
pub use sandbox::native::{LoaderError, NativeLoader, NativeModule};
pub use sandbox::protect::write_protect;
pub use whitelist::entry::WhitelistEntry;
pub use whitelist::registry::{WhitelistRegistry, WhitelistRegistryBuilder};
