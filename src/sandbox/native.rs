//! Restricted loading of native modules.
//!
//! Native modules are Rust functions that build a module table for a Lua
//! state, the equivalent of a C `luaopen_*` entry point. The loader keeps
//! them out of `package.loaded` and the globals: the only way a script sees
//! a native module is through the fields the whitelist copies out of it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use mlua::{Lua, Table};
use thiserror::Error;

use crate::env::host::RestrictedLoader;
use crate::env::lua::LuaHost;

/// Prefix of the Lua registry keys caching opened modules.
const REGISTRY_PREFIX: &str = "lua_whitelist_sandbox.native.";

/// Builds the table of a native module.
pub type NativeOpener = Arc<dyn Fn(&Lua) -> mlua::Result<Table> + Send + Sync>;

/// Errors raised by the [`NativeLoader`].
#[derive(Error, Debug)]
pub enum LoaderError {
    /// The module is registered but not on the allow-list.
    #[error("native module {0} is not permitted")]
    NotPermitted(String),

    /// No module with this name is registered.
    #[error("native module {0} is not registered")]
    NotFound(String),

    /// The module opener failed.
    #[error("failed to open native module {module}: {message}")]
    Open {
        /// The module name.
        module: String,
        /// The interpreter message.
        message: String,
    },
}

/// A native module the loader can open.
#[derive(Clone)]
pub struct NativeModule {
    name: String,
    opener: NativeOpener,
    disabled: Vec<String>,
}

impl std::fmt::Debug for NativeModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeModule")
            .field("name", &self.name)
            .field("opener", &"<fn>")
            .field("disabled", &self.disabled)
            .finish()
    }
}

impl NativeModule {
    /// Create a native module from its opener.
    pub fn new<F>(name: impl Into<String>, opener: F) -> Self
    where
        F: Fn(&Lua) -> mlua::Result<Table> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            opener: Arc::new(opener),
            disabled: Vec::new(),
        }
    }

    /// Remove these entry points from the module before it is usable.
    pub fn disable<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disabled.extend(names.into_iter().map(Into::into));
        self
    }

    /// The module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entry points removed on load.
    pub fn disabled(&self) -> &[String] {
        &self.disabled
    }
}

/// A capability-gated loader for native modules.
///
/// A module loads only if it is both registered and allowed. Each module is
/// opened at most once per Lua state; the opened table lives in the Lua
/// registry, which scripts cannot reach without the debug library.
#[derive(Debug, Clone, Default)]
pub struct NativeLoader {
    modules: HashMap<String, NativeModule>,
    allowed: HashSet<String>,
}

impl NativeLoader {
    /// Create an empty loader that permits nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module. It still has to be allowed before it loads.
    pub fn register(&mut self, module: NativeModule) {
        self.modules.insert(module.name.clone(), module);
    }

    /// Register a module, builder style.
    pub fn with_module(mut self, module: NativeModule) -> Self {
        self.register(module);
        self
    }

    /// Permit `name` to load.
    pub fn allow(&mut self, name: impl Into<String>) {
        self.allowed.insert(name.into());
    }

    /// Permit every currently registered module.
    pub fn allow_all_registered(&mut self) {
        self.allowed.extend(self.modules.keys().cloned());
    }

    /// Check if `name` is on the allow-list.
    pub fn is_permitted(&self, name: &str) -> bool {
        self.allowed.contains(name)
    }

    /// Check if a module named `name` is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Get the number of registered modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if no module is registered.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Open `name` for `lua`, or return the table opened earlier.
    pub fn open(&self, lua: &Lua, name: &str) -> Result<Table, LoaderError> {
        if !self.is_permitted(name) {
            return Err(LoaderError::NotPermitted(name.to_string()));
        }
        let module = self
            .modules
            .get(name)
            .ok_or_else(|| LoaderError::NotFound(name.to_string()))?;

        let open_error = |e: mlua::Error| LoaderError::Open {
            module: name.to_string(),
            message: e.to_string(),
        };

        let key = format!("{}{}", REGISTRY_PREFIX, name);
        if let Some(table) = lua
            .named_registry_value::<Option<Table>>(&key)
            .map_err(open_error)?
        {
            return Ok(table);
        }

        let table = (module.opener)(lua).map_err(open_error)?;
        for entry_point in &module.disabled {
            table.raw_set(entry_point.as_str(), mlua::Nil).map_err(open_error)?;
            // Fields served by a metatable survive the raw removal.
            let value: mlua::Value = table.get(entry_point.as_str()).map_err(open_error)?;
            if !value.is_nil() {
                return Err(LoaderError::Open {
                    module: name.to_string(),
                    message: format!(
                        "disabled entry point {} is still reachable through the module metatable",
                        entry_point
                    ),
                });
            }
        }
        lua.set_named_registry_value(&key, table.clone())
            .map_err(open_error)?;
        crate::log_debug!("opened native module {}", name);

        Ok(table)
    }
}

impl RestrictedLoader<LuaHost<'_>> for NativeLoader {
    fn load_module_restricted(&self, host: &LuaHost<'_>, module: &str) -> anyhow::Result<Table> {
        Ok(self.open(host.lua(), module)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_module(counter: Arc<AtomicUsize>) -> NativeModule {
        NativeModule::new("netio", move |lua| {
            counter.fetch_add(1, Ordering::SeqCst);
            let table = lua.create_table()?;
            table.set("connect", lua.create_function(|_, ()| Ok(true))?)?;
            table.set("raw_socket", lua.create_function(|_, ()| Ok(()))?)?;
            Ok(table)
        })
    }

    #[test]
    fn test_loader_refuses_unpermitted() {
        let loader = NativeLoader::new().with_module(counting_module(Arc::default()));
        let lua = Lua::new();

        assert!(matches!(loader.open(&lua, "netio"), Err(LoaderError::NotPermitted(_))));
    }

    #[test]
    fn test_loader_refuses_unregistered() {
        let mut loader = NativeLoader::new();
        loader.allow("voxsdl");
        let lua = Lua::new();

        assert!(matches!(loader.open(&lua, "voxsdl"), Err(LoaderError::NotFound(_))));
    }

    #[test]
    fn test_open_once_per_state() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut loader = NativeLoader::new().with_module(counting_module(Arc::clone(&counter)));
        loader.allow_all_registered();

        let lua = Lua::new();
        let first = loader.open(&lua, "netio").unwrap();
        let second = loader.open(&lua, "netio").unwrap();
        assert_eq!(first.to_pointer(), second.to_pointer());
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let other = Lua::new();
        loader.open(&other, "netio").unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_disabled_entry_points_removed() {
        let mut loader = NativeLoader::new()
            .with_module(counting_module(Arc::default()).disable(["raw_socket"]));
        loader.allow("netio");

        let lua = Lua::new();
        let table = loader.open(&lua, "netio").unwrap();
        assert!(table.contains_key("connect").unwrap());
        assert!(!table.contains_key("raw_socket").unwrap());
    }

    /// A module whose functions live behind `__index`, built the usual Lua way.
    fn metatable_module() -> NativeModule {
        NativeModule::new("netio", |lua| {
            lua.load(
                r#"
local impl = { connect = function() return true end, raw_socket = function() end }
return setmetatable({}, { __index = impl })
"#,
            )
            .eval()
        })
    }

    #[test]
    fn test_disabled_entry_point_behind_metatable_refused() {
        let mut loader = NativeLoader::new().with_module(metatable_module().disable(["raw_socket"]));
        loader.allow("netio");

        let lua = Lua::new();
        let err = loader.open(&lua, "netio").unwrap_err();
        assert!(matches!(err, LoaderError::Open { ref module, .. } if module == "netio"));
        assert!(err.to_string().contains("raw_socket"));

        // Nothing was cached for the state
        let cached: Option<Table> = lua
            .named_registry_value(&format!("{}netio", REGISTRY_PREFIX))
            .unwrap();
        assert!(cached.is_none());
    }

    #[test]
    fn test_metatable_module_without_disabled_entries_loads() {
        let mut loader = NativeLoader::new().with_module(metatable_module());
        loader.allow("netio");

        let lua = Lua::new();
        let table = loader.open(&lua, "netio").unwrap();
        assert!(table.get::<mlua::Function>("connect").is_ok());
    }

    #[test]
    fn test_not_globally_resolvable() {
        let mut loader = NativeLoader::new().with_module(counting_module(Arc::default()));
        loader.allow_all_registered();

        let lua = Lua::new();
        loader.open(&lua, "netio").unwrap();

        let leaked: bool = lua
            .load(r#"return package.loaded.netio ~= nil or netio ~= nil or pcall(require, "netio")"#)
            .eval()
            .unwrap();
        assert!(!leaked);
    }

    #[test]
    fn test_opener_failure() {
        let mut loader = NativeLoader::new().with_module(NativeModule::new("broken", |_| {
            Err(mlua::Error::runtime("device unavailable"))
        }));
        loader.allow("broken");

        let lua = Lua::new();
        let err = loader.open(&lua, "broken").unwrap_err();
        assert!(err.to_string().contains("device unavailable"));
    }
}
