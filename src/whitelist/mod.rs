//! The whitelist data model: what a restricted environment may expose.

pub mod entry;
pub mod registry;
