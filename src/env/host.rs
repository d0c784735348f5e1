//! The capabilities the assembler needs from an interpreter.
//!
//! The assembler never reflects over interpreter values directly. Everything
//! it does to the full environment goes through [`ScriptHost`], and native
//! modules only ever arrive through a [`RestrictedLoader`].

/// Read access to a full interpreter environment plus the primitives needed
/// to build a new namespace.
pub trait ScriptHost {
    /// An interpreter value that can be bound into a namespace.
    type Value;
    /// A resolved or loaded module.
    type Module;
    /// A namespace under construction.
    type Namespace;

    /// Look up a global by name. `Ok(None)` means the global is absent.
    fn global(&self, name: &str) -> anyhow::Result<Option<Self::Value>>;

    /// Resolve a library module through the interpreter's standard
    /// resolution mechanism.
    fn require(&self, module: &str) -> anyhow::Result<Self::Module>;

    /// Look up a field of a module. `Ok(None)` means the field is absent.
    fn field(&self, module: &Self::Module, name: &str) -> anyhow::Result<Option<Self::Value>>;

    /// Create a new, empty namespace.
    fn new_namespace(&self) -> anyhow::Result<Self::Namespace>;

    /// Bind `value` under `name` in `namespace`.
    fn bind(&self, namespace: &Self::Namespace, name: &str, value: Self::Value)
        -> anyhow::Result<()>;

    /// Install a nested namespace under `name` in `namespace`.
    fn install(
        &self,
        namespace: &Self::Namespace,
        name: &str,
        child: Self::Namespace,
    ) -> anyhow::Result<()>;
}

/// Loads native modules without making them globally resolvable.
///
/// Implementations decide whether a module may load at all and may restrict
/// it before handing it out. A loaded module must not become reachable
/// through the interpreter's regular resolution path.
pub trait RestrictedLoader<H: ScriptHost + ?Sized> {
    /// Load `module` for `host`.
    fn load_module_restricted(&self, host: &H, module: &str) -> anyhow::Result<H::Module>;
}

/// A loader that refuses every native module.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNativeModules;

impl<H: ScriptHost + ?Sized> RestrictedLoader<H> for NoNativeModules {
    fn load_module_restricted(&self, _host: &H, module: &str) -> anyhow::Result<H::Module> {
        anyhow::bail!("native module {} is not permitted", module)
    }
}
