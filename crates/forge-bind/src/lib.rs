//! Forge-Bind: binding generator for the Forge framework
//!
//! Translates declarative interface descriptions into a managed binding
//! surface (TypeScript, transpiled to JavaScript), native adapter functions
//! (Rust) and a global symbol resolver mapping a binding name and argument
//! count to an adapter.
//!
//! # Architecture
//!
//! - `ir`: description model, extension flags and the type registry
//! - `plan`: overload grouping, dispatch planning, callback synthesis and
//!   resolver tables
//! - `runtime`: contract the generated adapters compile against, plus an
//!   executor for adapter plans
//! - `codegen`: TypeScript, native adapter and resolver generators
//! - `build`: build script utilities
//!
//! # Usage
//!
//! In your crate's `build.rs`:
//!
//! ```rust,ignore
//! use forge_bind::build::BindingsBuilder;
//!
//! fn main() {
//!     BindingsBuilder::new()
//!         .description_path("idl/canvas.json")
//!         .build()
//!         .expect("Failed to generate bindings");
//! }
//! ```

pub mod build;
pub mod codegen;
pub mod error;
pub mod ir;
pub mod plan;
pub mod runtime;

// Re-export commonly used types
pub use build::{transpile_ts, BindingsBuilder, BindingsBuilderError, TranspileError};
pub use codegen::{CodegenOptions, NativeGenerator, ResolverGenerator, TypeScriptGenerator};
pub use error::{LoadError, Location, StructuralError};
pub use ir::{
    collect_interfaces, Attribute, CallWith, DefaultTypeRegistry, Description, ExtAttr, ExtAttrs,
    Interface, InterfaceRegistry, Operation, Parameter, Signature, TypeInfo, TypeRegistry,
    BIND_INTERFACES,
};
pub use plan::{generate, DispatchPlan, GeneratedBindings, ResolverTable};
pub use runtime::{BindingError, ManagedValue, NativeArguments, NativeFunction};

// Re-export linkme for inventory
pub use linkme;
