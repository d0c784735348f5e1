//! Assembly of restricted namespaces from a full interpreter environment.

pub mod assembler;
pub mod host;
pub mod lua;
