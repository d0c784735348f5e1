//! Sandbox configuration with builder pattern.

use std::path::PathBuf;
use std::sync::Arc;

use mlua::{Lua, MultiValue};

use crate::sandbox::native::{NativeLoader, NativeModule};
use crate::whitelist::registry::WhitelistRegistry;

/// A Rust callback exposed to sandboxed scripts under a fixed name.
#[derive(Clone)]
pub struct HostFunction {
    name: String,
    func: Arc<dyn Fn(&Lua, MultiValue) -> mlua::Result<MultiValue> + Send + Sync>,
}

impl std::fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl HostFunction {
    /// Create a host function.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Lua, MultiValue) -> mlua::Result<MultiValue> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// The name the function is bound under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call(&self, lua: &Lua, args: MultiValue) -> mlua::Result<MultiValue> {
        (self.func)(lua, args)
    }
}

/// Configuration for a Lua sandbox.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// What the restricted environment exposes.
    pub registry: WhitelistRegistry,
    /// Native modules available to the restricted loader.
    pub native_modules: Vec<NativeModule>,
    /// Native modules permitted to load. `None` permits every registered one.
    pub allowed_native: Option<Vec<String>>,
    /// Native modules installed whole, bypassing the whitelist.
    pub trusted_native: Vec<String>,
    /// Directory holding trusted script modules.
    pub module_path: PathBuf,
    /// Trusted script modules installed whole into the environment.
    pub script_modules: Vec<String>,
    /// Rust callbacks installed into the environment.
    pub host_functions: Vec<HostFunction>,
    /// Script arguments, exposed as the `arg` table when non-empty.
    pub args: Vec<String>,
    /// Capture `print` output instead of writing to stdout.
    pub capture_output: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            registry: WhitelistRegistry::standard(),
            native_modules: Vec::new(),
            allowed_native: None,
            trusted_native: Vec::new(),
            module_path: PathBuf::from("modules"),
            script_modules: Vec::new(),
            host_functions: Vec::new(),
            args: Vec::new(),
            capture_output: false,
        }
    }
}

impl SandboxConfig {
    /// Create a new builder for SandboxConfig.
    pub fn builder() -> SandboxConfigBuilder {
        SandboxConfigBuilder::default()
    }

    /// Build the restricted loader described by this configuration.
    ///
    /// Trusted native modules are always permitted.
    pub fn native_loader(&self) -> NativeLoader {
        let mut loader = NativeLoader::new();
        for module in &self.native_modules {
            loader.register(module.clone());
        }
        match &self.allowed_native {
            Some(allowed) => allowed
                .iter()
                .chain(&self.trusted_native)
                .for_each(|name| loader.allow(name.clone())),
            None => loader.allow_all_registered(),
        }
        loader
    }
}

/// Builder for creating SandboxConfig instances.
#[derive(Debug, Clone, Default)]
pub struct SandboxConfigBuilder {
    registry: Option<WhitelistRegistry>,
    native_modules: Vec<NativeModule>,
    allowed_native: Option<Vec<String>>,
    trusted_native: Vec<String>,
    module_path: Option<PathBuf>,
    script_modules: Vec<String>,
    host_functions: Vec<HostFunction>,
    args: Vec<String>,
    capture_output: Option<bool>,
}

impl SandboxConfigBuilder {
    /// Set the whitelist.
    pub fn registry(mut self, registry: WhitelistRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Register a native module with the restricted loader.
    pub fn native_module(mut self, module: NativeModule) -> Self {
        self.native_modules.push(module);
        self
    }

    /// Register a trusted native module, installed whole under its name.
    pub fn trusted_native_module(mut self, module: NativeModule) -> Self {
        self.trusted_native.push(module.name().to_string());
        self.native_modules.push(module);
        self
    }

    /// Permit a native module. Once called, only explicitly allowed modules
    /// load.
    pub fn allow_native(mut self, name: impl Into<String>) -> Self {
        self.allowed_native
            .get_or_insert_with(Vec::new)
            .push(name.into());
        self
    }

    /// Set the directory trusted script modules are read from.
    pub fn module_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.module_path = Some(path.into());
        self
    }

    /// Install `<module_path>/<name>.lua` under `name`.
    pub fn script_module(mut self, name: impl Into<String>) -> Self {
        self.script_modules.push(name.into());
        self
    }

    /// Install a Rust callback.
    pub fn function(mut self, function: HostFunction) -> Self {
        self.host_functions.push(function);
        self
    }

    /// Append a script argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several script arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Capture `print` output.
    pub fn capture_output(mut self, capture: bool) -> Self {
        self.capture_output = Some(capture);
        self
    }

    /// Build the SandboxConfig.
    pub fn build(self) -> SandboxConfig {
        let default = SandboxConfig::default();
        SandboxConfig {
            registry: self.registry.unwrap_or(default.registry),
            native_modules: self.native_modules,
            allowed_native: self.allowed_native.or(default.allowed_native),
            trusted_native: self.trusted_native,
            module_path: self.module_path.unwrap_or(default.module_path),
            script_modules: self.script_modules,
            host_functions: self.host_functions,
            args: self.args,
            capture_output: self.capture_output.unwrap_or(default.capture_output),
        }
    }
}
