//! Code generation for Forge-Bind
//!
//! This module provides generators for:
//! - the TypeScript binding surface (bindings.ts)
//! - Rust native adapters, one module per interface (native.rs)
//! - the global symbol resolver (resolver.rs)

pub mod native;
pub mod resolver;
pub mod typescript;

pub use native::NativeGenerator;
pub use resolver::ResolverGenerator;
pub use typescript::TypeScriptGenerator;

use serde::{Deserialize, Serialize};

/// Paths the generated Rust code refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenOptions {
    /// Path of the runtime contract module
    pub runtime_path: String,
    /// Module holding externally supplied callbacks, one submodule per interface
    pub custom_path: String,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            runtime_path: "forge_bind::runtime".to_string(),
            custom_path: "crate::custom".to_string(),
        }
    }
}
