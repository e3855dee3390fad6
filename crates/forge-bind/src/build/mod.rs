//! Build utilities for Forge-Bind
//!
//! This module provides utilities for use in build.rs scripts and the CLI:
//! - TypeScript transpilation via deno_ast
//! - BindingsBuilder for generating and writing all artifacts

pub mod bindings;
pub mod transpile;

pub use bindings::{BindingsBuilder, BindingsBuilderError, BuildOutput, GeneratedArtifacts};
pub use transpile::{transpile_bindings, transpile_ts, TranspileError};
