//! Lua sandbox built on top of the restricted environment assembler.

pub mod config;
pub mod executor;
pub mod io;
pub mod native;
pub mod protect;
