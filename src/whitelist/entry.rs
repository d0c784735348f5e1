//! Declarative whitelist rules.

use serde::{Deserialize, Serialize};

/// One rule describing what a restricted environment exposes.
///
/// In a policy file the variant is selected by the `kind` key:
/// `"bare"`, `"module"` or `"native"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WhitelistEntry {
    /// A single identifier copied from the full global namespace.
    Bare {
        /// The global name, also used as the binding name.
        name: String,
    },

    /// Selected fields of a library module resolved through `require`.
    #[serde(rename = "module")]
    FromModule {
        /// The module name, also used as the binding name.
        module: String,
        /// The fields copied into the fresh namespace.
        names: Vec<String>,
    },

    /// Selected fields of a native module loaded through the restricted
    /// loader. The module table itself is never exposed.
    #[serde(rename = "native")]
    FromNativeModule {
        /// The native module name, also used as the binding name.
        module: String,
        /// The fields copied into the fresh namespace.
        names: Vec<String>,
    },
}

impl WhitelistEntry {
    /// Expose a global under its own name.
    pub fn bare(name: impl Into<String>) -> Self {
        WhitelistEntry::Bare { name: name.into() }
    }

    /// Expose the given fields of a library module.
    pub fn module<I, S>(module: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        WhitelistEntry::FromModule {
            module: module.into(),
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Expose the given fields of a native module.
    pub fn native<I, S>(module: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        WhitelistEntry::FromNativeModule {
            module: module.into(),
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// The key this entry writes into the restricted namespace.
    pub fn target(&self) -> &str {
        match self {
            WhitelistEntry::Bare { name } => name,
            WhitelistEntry::FromModule { module, .. }
            | WhitelistEntry::FromNativeModule { module, .. } => module,
        }
    }

    /// The fields copied from the source module, empty for bare entries.
    pub fn names(&self) -> &[String] {
        match self {
            WhitelistEntry::Bare { .. } => &[],
            WhitelistEntry::FromModule { names, .. }
            | WhitelistEntry::FromNativeModule { names, .. } => names,
        }
    }

    /// Whether this entry goes through the restricted loader.
    pub fn is_native(&self) -> bool {
        matches!(self, WhitelistEntry::FromNativeModule { .. })
    }
}
