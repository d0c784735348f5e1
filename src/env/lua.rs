//! [`ScriptHost`] over an mlua state.

use mlua::{Function, Lua, Table, Value};

use crate::env::host::ScriptHost;
use crate::error::EnvError;

/// A full Lua environment seen through the [`ScriptHost`] capabilities.
///
/// Globals are read raw, so a metatable on `_G` cannot make an absent name
/// look present. Module fields go through regular indexing.
#[derive(Clone, Copy)]
pub struct LuaHost<'lua> {
    lua: &'lua Lua,
}

impl<'lua> LuaHost<'lua> {
    /// Wrap a Lua state.
    pub fn new(lua: &'lua Lua) -> Self {
        Self { lua }
    }

    /// Get the underlying state.
    pub fn lua(&self) -> &'lua Lua {
        self.lua
    }
}

impl ScriptHost for LuaHost<'_> {
    type Value = Value;
    type Module = Table;
    type Namespace = Table;

    fn global(&self, name: &str) -> anyhow::Result<Option<Value>> {
        let value: Value = self.lua.globals().raw_get(name).map_err(lua_error)?;
        Ok((!value.is_nil()).then_some(value))
    }

    fn require(&self, module: &str) -> anyhow::Result<Table> {
        let require: Value = self.lua.globals().raw_get("require").map_err(lua_error)?;
        let Value::Function(require) = require else {
            anyhow::bail!("require is not available in the full environment");
        };
        resolve_table(&require, module)
    }

    fn field(&self, module: &Table, name: &str) -> anyhow::Result<Option<Value>> {
        let value: Value = module.get(name).map_err(lua_error)?;
        Ok((!value.is_nil()).then_some(value))
    }

    fn new_namespace(&self) -> anyhow::Result<Table> {
        self.lua.create_table().map_err(lua_error)
    }

    fn bind(&self, namespace: &Table, name: &str, value: Value) -> anyhow::Result<()> {
        namespace.raw_set(name, value).map_err(lua_error)
    }

    fn install(&self, namespace: &Table, name: &str, child: Table) -> anyhow::Result<()> {
        namespace.raw_set(name, child).map_err(lua_error)
    }
}

fn resolve_table(require: &Function, module: &str) -> anyhow::Result<Table> {
    match require.call::<Value>(module).map_err(lua_error)? {
        Value::Table(table) => Ok(table),
        other => anyhow::bail!(
            "require \"{}\" returned a {} instead of a table",
            module,
            other.type_name()
        ),
    }
}

/// Convert an interpreter error into an `anyhow::Error`.
///
/// `mlua::Error` is not `Send` without mlua's `error-send` feature, so only
/// its message is carried over.
pub(crate) fn lua_error(e: mlua::Error) -> anyhow::Error {
    anyhow::anyhow!("{}", e)
}

/// Convert an interpreter error raised by a host primitive.
pub(crate) fn host_error(e: mlua::Error) -> EnvError {
    EnvError::Host(lua_error(e))
}
