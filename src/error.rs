//! Error types for restricted environment assembly and sandboxed execution.

use thiserror::Error;

/// Errors that can occur while building or using a restricted environment.
#[derive(Error, Debug)]
pub enum EnvError {
    /// A whitelisted name does not exist in its source.
    #[error("unresolved name: {}", qualified(.module.as_deref(), .name))]
    UnresolvedName {
        /// The module the name was read from, or `None` for a global.
        module: Option<String>,
        /// The missing name.
        name: String,
    },

    /// A library module failed to resolve through `require`.
    #[error("cannot load module {module}: {source}")]
    ModuleLoad {
        /// The module name.
        module: String,
        /// The underlying resolution failure.
        #[source]
        source: anyhow::Error,
    },

    /// The restricted loader refused or failed to load a native module.
    #[error("restricted load of native module {module} failed: {source}")]
    RestrictedLoad {
        /// The native module name.
        module: String,
        /// The loader failure.
        #[source]
        source: anyhow::Error,
    },

    /// Two bindings target the same key of the same namespace.
    #[error("duplicate binding {}", qualified(.scope.as_deref(), .name))]
    DuplicateBinding {
        /// The key written twice.
        name: String,
        /// The module namespace, or `None` for the top level.
        scope: Option<String>,
    },

    /// A module entry declares nothing to expose.
    #[error("module {module} declares no names to expose")]
    EmptyModuleBinding {
        /// The module name.
        module: String,
    },

    /// An identifier or module name is not usable as a binding key.
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    /// The interpreter host failed a primitive operation.
    #[error("host error: {0}")]
    Host(#[source] anyhow::Error),

    /// A whitelist policy file could not be parsed or written.
    #[error("policy error: {0}")]
    Policy(String),

    /// I/O error while reading policy files or scripts.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A trusted script module could not be loaded.
    #[error("cannot load script module {module}: {message}")]
    ScriptModule {
        /// The script module name.
        module: String,
        /// The interpreter message.
        message: String,
    },

    /// A sandboxed chunk failed to compile.
    #[error("error loading script {chunk}: {message}")]
    ScriptLoad {
        /// The chunk name.
        chunk: String,
        /// The interpreter message.
        message: String,
    },

    /// A sandboxed chunk raised an error while running.
    #[error("error executing {chunk}: {message}")]
    ScriptRuntime {
        /// The chunk or function name.
        chunk: String,
        /// The interpreter message.
        message: String,
    },

    /// A named value in the restricted environment is not callable.
    #[error("{0} is not a function")]
    NotAFunction(String),
}

impl EnvError {
    pub(crate) fn unresolved(module: Option<&str>, name: &str) -> Self {
        EnvError::UnresolvedName {
            module: module.map(str::to_string),
            name: name.to_string(),
        }
    }

    pub(crate) fn duplicate(scope: Option<&str>, name: &str) -> Self {
        EnvError::DuplicateBinding {
            name: name.to_string(),
            scope: scope.map(str::to_string),
        }
    }

    /// Check if this error is a missing whitelisted name.
    pub fn is_unresolved_name(&self) -> bool {
        matches!(self, EnvError::UnresolvedName { .. })
    }

    /// Check if this error is a rejected or failed native module load.
    pub fn is_restricted_load(&self) -> bool {
        matches!(self, EnvError::RestrictedLoad { .. })
    }

    /// Check if this error is a duplicate binding.
    pub fn is_duplicate_binding(&self) -> bool {
        matches!(self, EnvError::DuplicateBinding { .. })
    }

    /// Check if this error comes from validating the whitelist itself rather
    /// than from the interpreter.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            EnvError::DuplicateBinding { .. }
                | EnvError::EmptyModuleBinding { .. }
                | EnvError::InvalidName(_)
                | EnvError::Policy(_)
        )
    }

    /// The whitelist entry this error points at, written as `module.name`,
    /// `module` or `name`.
    pub fn entry(&self) -> Option<String> {
        match self {
            EnvError::UnresolvedName { module, name } => {
                Some(qualified(module.as_deref(), name))
            }
            EnvError::DuplicateBinding { name, scope } => Some(qualified(scope.as_deref(), name)),
            EnvError::ModuleLoad { module, .. }
            | EnvError::RestrictedLoad { module, .. }
            | EnvError::EmptyModuleBinding { module }
            | EnvError::ScriptModule { module, .. } => Some(module.clone()),
            _ => None,
        }
    }
}

/// Result type alias for environment operations.
pub type Result<T> = std::result::Result<T, EnvError>;

fn qualified(scope: Option<&str>, name: &str) -> String {
    match scope {
        Some(scope) => format!("{}.{}", scope, name),
        None => name.to_string(),
    }
}
