//! Sandboxed script execution.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use mlua::{ChunkMode, FromLuaMulti, IntoLuaMulti, Lua, MultiValue, Table, Value};

use crate::env::assembler::Assembler;
use crate::env::lua::{host_error, LuaHost};
use crate::error::{EnvError, Result};
use crate::sandbox::config::{HostFunction, SandboxConfig};
use crate::sandbox::io::{capturing_print, CapturedOutput};
use crate::sandbox::protect::write_protect;
use crate::whitelist::registry::check_name;

/// Name of the script argument table.
const ARG_TABLE: &str = "arg";

/// A Lua state whose scripts only see a whitelisted environment.
///
/// The state itself is fully featured; every chunk loaded through the
/// sandbox gets the restricted environment as `_ENV` instead of the
/// state's globals.
pub struct LuaSandbox {
    env: Table,
    output: Option<CapturedOutput>,
    lua: Lua,
}

impl LuaSandbox {
    /// Create a new sandbox with the given configuration.
    ///
    /// Binding names are checked before the state is touched, so a
    /// misconfigured sandbox fails without loading any native module.
    pub fn new(config: SandboxConfig) -> Result<Self> {
        check_bindings(&config)?;

        let lua = Lua::new();

        let output = if config.capture_output {
            let output = CapturedOutput::new();
            let print = capturing_print(&lua, output.clone()).map_err(host_error)?;
            lua.globals().raw_set("print", print).map_err(host_error)?;
            Some(output)
        } else {
            None
        };

        let loader = config.native_loader();
        let env = Assembler::new(&LuaHost::new(&lua), &loader).assemble(&config.registry)?;

        for name in &config.trusted_native {
            let module = loader
                .open(&lua, name)
                .map_err(|e| EnvError::RestrictedLoad {
                    module: name.clone(),
                    source: e.into(),
                })?;
            env.raw_set(name.as_str(), module).map_err(host_error)?;
        }

        for function in &config.host_functions {
            let callback = function.clone();
            let func = lua
                .create_function(move |lua, args: MultiValue| callback.call(lua, args))
                .map_err(host_error)?;
            env.raw_set(function.name(), func).map_err(host_error)?;
        }

        for module in &config.script_modules {
            let table = load_script_module(&lua, &config.module_path, module)?;
            env.raw_set(module.as_str(), table).map_err(host_error)?;
        }

        if !config.args.is_empty() {
            let args = lua
                .create_sequence_from(config.args.iter().cloned())
                .map_err(host_error)?;
            env.raw_set(ARG_TABLE, args).map_err(host_error)?;
        }

        crate::log_debug!(
            "sandbox ready: {} whitelist entries, {} trusted native modules, {} host functions, {} script modules",
            config.registry.len(),
            config.trusted_native.len(),
            config.host_functions.len(),
            config.script_modules.len()
        );

        Ok(Self { env, output, lua })
    }

    /// Create a new sandbox with extra host functions on top of the ones
    /// already in `config`.
    pub fn with_functions(
        mut config: SandboxConfig,
        functions: impl IntoIterator<Item = HostFunction>,
    ) -> Result<Self> {
        config.host_functions.extend(functions);
        Self::new(config)
    }

    /// The restricted environment.
    pub fn environment(&self) -> &Table {
        &self.env
    }

    /// The underlying (unrestricted) Lua state.
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Captured `print` output, if capture is enabled.
    pub fn output(&self) -> Option<&CapturedOutput> {
        self.output.as_ref()
    }

    /// Run `source` in the restricted environment.
    pub fn exec(&self, source: &str, chunk_name: &str) -> Result<()> {
        self.eval(source, chunk_name)
    }

    /// Run `source` in the restricted environment and convert its results.
    pub fn eval<R: FromLuaMulti>(&self, source: &str, chunk_name: &str) -> Result<R> {
        self.run(source.as_bytes(), format!("={}", chunk_name), chunk_name)
    }

    /// Read and run a script file in the restricted environment.
    pub fn exec_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let source = std::fs::read(path)?;
        let chunk = path.display().to_string();
        self.run(&source, format!("@{}", chunk), &chunk)
    }

    /// Call a function stored in the restricted environment.
    pub fn call<R: FromLuaMulti>(&self, function: &str, args: impl IntoLuaMulti) -> Result<R> {
        let value: Value = self.env.raw_get(function).map_err(host_error)?;
        let Value::Function(func) = value else {
            return Err(EnvError::NotAFunction(function.to_string()));
        };
        func.call::<R>(args).map_err(|e| EnvError::ScriptRuntime {
            chunk: function.to_string(),
            message: e.to_string(),
        })
    }

    /// Wrap `table` in a write-protected proxy.
    pub fn protect(&self, table: Table) -> Result<Table> {
        write_protect(&self.lua, table).map_err(host_error)
    }

    fn run<R: FromLuaMulti>(&self, source: &[u8], lua_name: String, chunk: &str) -> Result<R> {
        let function = self
            .lua
            .load(source)
            .set_name(lua_name)
            .set_mode(ChunkMode::Text)
            .set_environment(self.env.clone())
            .into_function()
            .map_err(|e| EnvError::ScriptLoad {
                chunk: chunk.to_string(),
                message: e.to_string(),
            })?;

        crate::log_debug!("executing {}", chunk);
        function.call::<R>(()).map_err(|e| EnvError::ScriptRuntime {
            chunk: chunk.to_string(),
            message: e.to_string(),
        })
    }
}

/// Reject extra bindings that are malformed or collide with the whitelist
/// or with each other.
fn check_bindings(config: &SandboxConfig) -> Result<()> {
    let mut taken: HashSet<&str> = config.registry.target_names().collect();

    let trusted = config.trusted_native.iter().map(|name| (name.as_str(), false));
    let functions = config.host_functions.iter().map(|f| (f.name(), false));
    let modules = config.script_modules.iter().map(|name| (name.as_str(), true));
    let arg = (!config.args.is_empty()).then_some((ARG_TABLE, false));

    for (name, is_file) in trusted.chain(functions).chain(modules).chain(arg) {
        check_name(name)?;
        if is_file {
            check_module_file_name(name)?;
        }
        if !taken.insert(name) {
            return Err(EnvError::duplicate(None, name));
        }
    }

    Ok(())
}

/// A script module name must name a file directly inside the module path.
fn check_module_file_name(name: &str) -> Result<()> {
    let plain = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if !plain || name.starts_with('.') || name.contains("..") {
        return Err(EnvError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Evaluate `<module_path>/<name>.lua` in the full environment.
fn load_script_module(lua: &Lua, module_path: &Path, name: &str) -> Result<Table> {
    let path: PathBuf = module_path.join(format!("{}.lua", name));
    let script_error = |message: String| EnvError::ScriptModule {
        module: name.to_string(),
        message,
    };

    let source = std::fs::read(&path)
        .map_err(|e| script_error(format!("{}: {}", path.display(), e)))?;

    let value: Value = lua
        .load(source)
        .set_name(format!("@{}", path.display()))
        .set_mode(ChunkMode::Text)
        .eval()
        .map_err(|e| script_error(e.to_string()))?;

    match value {
        Value::Table(table) => Ok(table),
        other => Err(script_error(format!(
            "returned a {} instead of a table",
            other.type_name()
        ))),
    }
}
