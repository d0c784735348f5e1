//! Validated, ordered collection of whitelist entries.
//!
//! A registry can only be constructed through validation, so every registry
//! handed to the assembler is free of duplicate bindings and empty module
//! entries.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EnvError, Result};
use crate::whitelist::entry::WhitelistEntry;

/// Globals exposed by [`WhitelistRegistry::standard`].
const STANDARD_GLOBALS: &[&str] = &["pairs", "ipairs", "print", "next", "tostring", "tonumber"];

/// Library modules and fields exposed by [`WhitelistRegistry::standard`].
const STANDARD_MODULES: &[(&str, &[&str])] = &[
    ("table", &["insert", "remove", "sort", "unpack"]),
    (
        "math",
        &[
            "sin",
            "cos",
            "tan",
            "asin",
            "acos",
            "atan",
            "abs",
            "exp",
            "floor",
            "ceil",
            "huge",
            "log",
            "sqrt",
            "max",
            "min",
            "pi",
            "random",
            "randomseed",
        ],
    ),
    ("os", &["clock", "difftime", "time"]),
    ("string", &["format"]),
];

/// An immutable, validated whitelist.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WhitelistRegistry {
    entries: Vec<WhitelistEntry>,
}

/// On-disk layout of a whitelist policy file.
#[derive(Debug, Serialize, Deserialize)]
struct PolicyFile {
    #[serde(default, rename = "entry")]
    entries: Vec<WhitelistEntry>,
}

impl WhitelistRegistry {
    /// Validate `entries` and build a registry from them.
    pub fn new(entries: Vec<WhitelistEntry>) -> Result<Self> {
        validate(&entries)?;
        Ok(Self { entries })
    }

    /// Create a new builder for WhitelistRegistry.
    pub fn builder() -> WhitelistRegistryBuilder {
        WhitelistRegistryBuilder::default()
    }

    /// The safe default set: basic iteration and conversion globals plus
    /// side-effect free parts of `table`, `math`, `os` and `string`.
    pub fn standard() -> Self {
        let mut entries: Vec<WhitelistEntry> = STANDARD_GLOBALS
            .iter()
            .map(|name| WhitelistEntry::bare(*name))
            .collect();
        entries.extend(
            STANDARD_MODULES
                .iter()
                .map(|(module, names)| WhitelistEntry::module(*module, names.iter().copied())),
        );
        Self { entries }
    }

    /// Parse a TOML policy file body.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let policy: PolicyFile =
            toml::from_str(source).map_err(|e| EnvError::Policy(e.to_string()))?;
        Self::new(policy.entries)
    }

    /// Read and parse a TOML policy file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    /// Serialize the registry as a TOML policy file body.
    pub fn to_toml_string(&self) -> Result<String> {
        let policy = PolicyFile {
            entries: self.entries.clone(),
        };
        toml::to_string(&policy).map_err(|e| EnvError::Policy(e.to_string()))
    }

    /// Combine two registries; the union is validated like any other.
    pub fn merge(&self, other: &WhitelistRegistry) -> Result<Self> {
        let mut entries = self.entries.clone();
        entries.extend(other.entries.iter().cloned());
        Self::new(entries)
    }

    /// The entries in declaration order.
    pub fn entries(&self) -> &[WhitelistEntry] {
        &self.entries
    }

    /// Iterate over the entries in declaration order.
    pub fn iter(&self) -> std::slice::Iter<'_, WhitelistEntry> {
        self.entries.iter()
    }

    /// The top-level keys this registry writes.
    pub fn target_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(WhitelistEntry::target)
    }

    /// Native modules that must go through the restricted loader.
    pub fn native_modules(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|entry| entry.is_native())
            .map(WhitelistEntry::target)
    }

    /// Get the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a WhitelistRegistry {
    type Item = &'a WhitelistEntry;
    type IntoIter = std::slice::Iter<'a, WhitelistEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Builder for creating WhitelistRegistry instances.
#[derive(Debug, Clone, Default)]
pub struct WhitelistRegistryBuilder {
    entries: Vec<WhitelistEntry>,
}

impl WhitelistRegistryBuilder {
    /// Expose a global under its own name.
    pub fn bare(mut self, name: impl Into<String>) -> Self {
        self.entries.push(WhitelistEntry::bare(name));
        self
    }

    /// Expose several globals.
    pub fn globals<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries
            .extend(names.into_iter().map(|name| WhitelistEntry::bare(name)));
        self
    }

    /// Expose fields of a library module.
    pub fn module<I, S>(mut self, module: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries.push(WhitelistEntry::module(module, names));
        self
    }

    /// Expose fields of a native module.
    pub fn native<I, S>(mut self, module: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries.push(WhitelistEntry::native(module, names));
        self
    }

    /// Append a prebuilt entry.
    pub fn entry(mut self, entry: WhitelistEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Validate and build the WhitelistRegistry.
    pub fn build(self) -> Result<WhitelistRegistry> {
        WhitelistRegistry::new(self.entries)
    }
}

/// Check that `name` can be used as a binding key.
pub(crate) fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(EnvError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn validate(entries: &[WhitelistEntry]) -> Result<()> {
    let mut top_level = HashSet::new();

    for entry in entries {
        let target = entry.target();
        check_name(target)?;

        if let WhitelistEntry::FromModule { module, names }
        | WhitelistEntry::FromNativeModule { module, names } = entry
        {
            if names.is_empty() {
                return Err(EnvError::EmptyModuleBinding {
                    module: module.clone(),
                });
            }
            let mut fields = HashSet::new();
            for name in names {
                check_name(name)?;
                if !fields.insert(name.as_str()) {
                    return Err(EnvError::duplicate(Some(module), name));
                }
            }
        }

        if !top_level.insert(target) {
            return Err(EnvError::duplicate(None, target));
        }
    }

    Ok(())
}
