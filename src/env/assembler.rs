//! Builds a restricted namespace from a whitelist.

use crate::env::host::{RestrictedLoader, ScriptHost};
use crate::error::{EnvError, Result};
use crate::whitelist::entry::WhitelistEntry;
use crate::whitelist::registry::WhitelistRegistry;

/// Assembles restricted namespaces out of a full environment.
///
/// Every module entry produces a fresh namespace filled by selective copy,
/// so the result never aliases a module object of the full environment.
/// Assembly stops at the first failure and the partially built namespace is
/// dropped.
pub struct Assembler<'a, H: ScriptHost + ?Sized, L: RestrictedLoader<H> + ?Sized> {
    host: &'a H,
    loader: &'a L,
}

impl<'a, H, L> Assembler<'a, H, L>
where
    H: ScriptHost + ?Sized,
    L: RestrictedLoader<H> + ?Sized,
{
    /// Create an assembler reading from `host` and loading native modules
    /// through `loader`.
    pub fn new(host: &'a H, loader: &'a L) -> Self {
        Self { host, loader }
    }

    /// Build a new namespace containing exactly the bindings of `registry`.
    pub fn assemble(&self, registry: &WhitelistRegistry) -> Result<H::Namespace> {
        let namespace = self.host.new_namespace().map_err(EnvError::Host)?;
        self.assemble_into(&namespace, registry)?;
        Ok(namespace)
    }

    /// Add the bindings of `registry` to an existing namespace.
    ///
    /// The caller owns `namespace` and must discard it if this fails.
    pub fn assemble_into(&self, namespace: &H::Namespace, registry: &WhitelistRegistry) -> Result<()> {
        for entry in registry {
            self.apply(namespace, entry)?;
        }
        crate::log_debug!("assembled restricted namespace from {} entries", registry.len());
        Ok(())
    }

    fn apply(&self, namespace: &H::Namespace, entry: &WhitelistEntry) -> Result<()> {
        match entry {
            WhitelistEntry::Bare { name } => {
                let value = self
                    .host
                    .global(name)
                    .map_err(EnvError::Host)?
                    .ok_or_else(|| EnvError::unresolved(None, name))?;
                self.host.bind(namespace, name, value).map_err(EnvError::Host)
            }
            WhitelistEntry::FromModule { module, names } => {
                let resolved = self.host.require(module).map_err(|source| EnvError::ModuleLoad {
                    module: module.clone(),
                    source,
                })?;
                let copy = self.copy_fields(module, &resolved, names)?;
                self.host.install(namespace, module, copy).map_err(EnvError::Host)?;
                crate::log_debug!("exposed {} field(s) of module {}", names.len(), module);
                Ok(())
            }
            WhitelistEntry::FromNativeModule { module, names } => {
                let loaded = self
                    .loader
                    .load_module_restricted(self.host, module)
                    .map_err(|source| {
                        crate::log_warn!("restricted loader refused {}: {}", module, source);
                        EnvError::RestrictedLoad {
                            module: module.clone(),
                            source,
                        }
                    })?;
                let copy = self.copy_fields(module, &loaded, names)?;
                self.host.install(namespace, module, copy).map_err(EnvError::Host)?;
                crate::log_debug!("exposed {} field(s) of native module {}", names.len(), module);
                Ok(())
            }
        }
    }

    fn copy_fields(&self, module: &str, source: &H::Module, names: &[String]) -> Result<H::Namespace> {
        let copy = self.host.new_namespace().map_err(EnvError::Host)?;
        for name in names {
            let value = self
                .host
                .field(source, name)
                .map_err(EnvError::Host)?
                .ok_or_else(|| EnvError::unresolved(Some(module), name))?;
            self.host.bind(&copy, name, value).map_err(EnvError::Host)?;
        }
        Ok(copy)
    }
}

/// Build a restricted namespace for `registry` in one call.
pub fn assemble<H, L>(host: &H, loader: &L, registry: &WhitelistRegistry) -> Result<H::Namespace>
where
    H: ScriptHost + ?Sized,
    L: RestrictedLoader<H> + ?Sized,
{
    Assembler::new(host, loader).assemble(registry)
}
